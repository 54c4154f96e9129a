//! Display-refresh loop state for one session.

use std::time::Duration;

use web_time::Instant;

use crate::host::FrameTicket;
use crate::util::frame_timing::FrameTiming;

/// Lifecycle of a render loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    /// Created, no frame requested yet.
    Idle,
    /// Frames are being requested and drawn.
    Running,
    /// Stopped for good; callbacks that still arrive do nothing.
    Stopped,
}

/// Keeps at most one frame request outstanding and measures the time
/// between frames.
///
/// Every request carries a fresh [`FrameTicket`]; a callback is only run
/// when it presents the ticket of the outstanding request, so duplicate and
/// stale callbacks cannot start a second chain of frames.
pub struct RenderLoopScheduler {
    state: LoopState,
    pending: Option<FrameTicket>,
    issued: u64,
    last_tick: Option<Instant>,
    timing: FrameTiming,
}

impl Default for RenderLoopScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderLoopScheduler {
    /// Idle scheduler.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: LoopState::Idle,
            pending: None,
            issued: 0,
            last_tick: None,
            timing: FrameTiming::new(),
        }
    }

    /// Start the loop. Returns the ticket of the first frame, which the
    /// caller must request; starting twice or after [`stop`](Self::stop)
    /// returns `None`.
    pub fn start(&mut self, now: Instant) -> Option<FrameTicket> {
        if self.state != LoopState::Idle {
            return None;
        }
        self.state = LoopState::Running;
        self.last_tick = Some(now);
        Some(self.issue())
    }

    /// Enter the frame callback for `ticket`. Returns the time since the
    /// previous callback, or `None` if the loop is not running or `ticket`
    /// is not the outstanding request (the callback must then return
    /// without doing anything).
    pub fn begin_frame(&mut self, ticket: FrameTicket, now: Instant) -> Option<Duration> {
        if self.state != LoopState::Running || self.pending != Some(ticket) {
            return None;
        }
        self.pending = None;
        let delta = self
            .last_tick
            .and_then(|last| now.checked_duration_since(last))
            .unwrap_or_default();
        self.last_tick = Some(now);
        self.timing.record(delta);
        Some(delta)
    }

    /// Leave a frame callback. Returns the ticket of the next frame, which
    /// the caller must request.
    pub fn end_frame(&mut self) -> Option<FrameTicket> {
        if self.state != LoopState::Running || self.pending.is_some() {
            return None;
        }
        Some(self.issue())
    }

    fn issue(&mut self) -> FrameTicket {
        self.issued += 1;
        let ticket = FrameTicket(self.issued);
        self.pending = Some(ticket);
        ticket
    }

    /// Stop the loop. Idempotent.
    pub fn stop(&mut self) {
        self.state = LoopState::Stopped;
        self.pending = None;
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> LoopState {
        self.state
    }

    /// Ticket of the outstanding frame request, if any.
    #[must_use]
    pub fn pending_frame(&self) -> Option<FrameTicket> {
        self.pending
    }

    /// Frames entered so far.
    #[must_use]
    pub fn frames(&self) -> u64 {
        self.timing.frames()
    }

    /// Smoothed frames per second.
    #[must_use]
    pub fn fps(&self) -> f32 {
        self.timing.fps()
    }
}
