//! In-memory host element and recording GPU device.
//!
//! [`HeadlessHost`] stands in for a DOM element or window: it has bounds,
//! tracks the surfaces mounted into it and queues frame requests instead of
//! waiting for a display. Every [`HeadlessDevice`] it creates writes to a
//! shared [`GpuLedger`], so callers can check after teardown that nothing
//! was left allocated.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use rustc_hash::{FxHashMap, FxHashSet};

use crate::error::SceneryError;
use crate::events::EventSource;
use crate::gpu::device::{
    BufferDesc, BufferId, BufferKind, DrawError, FrameDraw, GpuDevice,
};
use crate::host::{FrameTicket, HostElement, HostId, MountedSurface, SurfaceId};
use crate::input::InputEvent;

static NEXT_HOST: AtomicU64 = AtomicU64::new(1);
static NEXT_SURFACE: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone)]
struct BufferRecord {
    label: String,
    kind: BufferKind,
    bytes: usize,
}

/// Allocation and draw record shared by headless devices.
#[derive(Debug, Default)]
pub struct GpuLedger {
    next_buffer: u64,
    live: FxHashMap<BufferId, BufferRecord>,
    buffers_created: usize,
    buffers_destroyed: usize,
    devices_created: usize,
    devices_released: usize,
    draws: usize,
    resizes: Vec<(u32, u32)>,
    last_frame: Option<FrameDraw>,
    buffer_budget: Option<usize>,
    draw_failures: VecDeque<DrawError>,
}

impl GpuLedger {
    /// New ledger behind a shared handle.
    #[must_use]
    pub fn shared() -> Rc<RefCell<Self>> {
        Rc::new(RefCell::new(Self::default()))
    }

    /// Buffers created and not yet destroyed, across all devices.
    #[must_use]
    pub fn live_buffers(&self) -> usize {
        self.live.len()
    }

    /// Total bytes held by live buffers.
    #[must_use]
    pub fn live_bytes(&self) -> usize {
        self.live.values().map(|r| r.bytes).sum()
    }

    /// Labels of live buffers, sorted.
    #[must_use]
    pub fn live_labels(&self) -> Vec<String> {
        let mut labels: Vec<String> = self.live.values().map(|r| r.label.clone()).collect();
        labels.sort();
        labels
    }

    /// Number of live buffers of `kind`.
    #[must_use]
    pub fn live_of_kind(&self, kind: BufferKind) -> usize {
        self.live.values().filter(|r| r.kind == kind).count()
    }

    /// Total buffers ever created.
    #[must_use]
    pub fn buffers_created(&self) -> usize {
        self.buffers_created
    }

    /// Total buffers ever destroyed.
    #[must_use]
    pub fn buffers_destroyed(&self) -> usize {
        self.buffers_destroyed
    }

    /// Devices created.
    #[must_use]
    pub fn devices_created(&self) -> usize {
        self.devices_created
    }

    /// Devices released.
    #[must_use]
    pub fn devices_released(&self) -> usize {
        self.devices_released
    }

    /// Frames drawn successfully.
    #[must_use]
    pub fn draws(&self) -> usize {
        self.draws
    }

    /// Every non-zero resize applied, in order.
    #[must_use]
    pub fn resizes(&self) -> &[(u32, u32)] {
        &self.resizes
    }

    /// The most recent successful draw.
    #[must_use]
    pub fn last_frame(&self) -> Option<&FrameDraw> {
        self.last_frame.as_ref()
    }

    /// Allow only `count` more buffer creations; later ones fail.
    pub fn set_buffer_budget(&mut self, count: Option<usize>) {
        self.buffer_budget = count;
    }

    /// Make the next draw fail with `error`.
    pub fn queue_draw_failure(&mut self, error: DrawError) {
        self.draw_failures.push_back(error);
    }
}

/// GPU device that records into a [`GpuLedger`] instead of drawing.
pub struct HeadlessDevice {
    ledger: Rc<RefCell<GpuLedger>>,
    owned: FxHashSet<BufferId>,
    size: (u32, u32),
    released: bool,
}

impl HeadlessDevice {
    /// Device of the given surface size.
    #[must_use]
    pub fn new(ledger: Rc<RefCell<GpuLedger>>, size: (u32, u32)) -> Self {
        ledger.borrow_mut().devices_created += 1;
        Self {
            ledger,
            owned: FxHashSet::default(),
            size,
            released: false,
        }
    }
}

impl GpuDevice for HeadlessDevice {
    fn create_buffer(&mut self, desc: &BufferDesc<'_>) -> Result<BufferId, SceneryError> {
        if self.released {
            return Err(SceneryError::Host(format!(
                "buffer '{}' requested from a released device",
                desc.label
            )));
        }
        let mut ledger = self.ledger.borrow_mut();
        if let Some(budget) = ledger.buffer_budget.as_mut() {
            if *budget == 0 {
                return Err(SceneryError::Host(format!(
                    "out of buffer budget creating '{}'",
                    desc.label
                )));
            }
            *budget -= 1;
        }
        ledger.next_buffer += 1;
        let id = BufferId(ledger.next_buffer);
        let _ = ledger.live.insert(
            id,
            BufferRecord {
                label: desc.label.to_owned(),
                kind: desc.kind,
                bytes: desc.contents.len(),
            },
        );
        ledger.buffers_created += 1;
        let _ = self.owned.insert(id);
        Ok(id)
    }

    fn destroy_buffer(&mut self, id: BufferId) -> bool {
        if !self.owned.remove(&id) {
            return false;
        }
        let mut ledger = self.ledger.borrow_mut();
        let _ = ledger.live.remove(&id);
        ledger.buffers_destroyed += 1;
        true
    }

    fn live_buffer_count(&self) -> usize {
        self.owned.len()
    }

    fn resize(&mut self, width: u32, height: u32) {
        if width > 0 && height > 0 && !self.released {
            self.size = (width, height);
            self.ledger.borrow_mut().resizes.push((width, height));
        }
    }

    fn size(&self) -> (u32, u32) {
        self.size
    }

    fn draw(&mut self, frame: &FrameDraw) -> Result<(), DrawError> {
        if self.released {
            return Err(DrawError::Released);
        }
        let mut ledger = self.ledger.borrow_mut();
        if let Some(error) = ledger.draw_failures.pop_front() {
            return Err(error);
        }
        let referenced = frame
            .points
            .iter()
            .flat_map(|p| [p.positions, p.material])
            .chain(
                frame
                    .mesh
                    .iter()
                    .flat_map(|m| [m.vertices, m.indices, m.material]),
            );
        for id in referenced {
            if !self.owned.contains(&id) {
                return Err(DrawError::MissingResource(id));
            }
        }
        ledger.draws += 1;
        ledger.last_frame = Some(*frame);
        Ok(())
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        let mut ledger = self.ledger.borrow_mut();
        if !self.owned.is_empty() {
            log::warn!(
                "releasing headless device with {} live buffers",
                self.owned.len()
            );
        }
        for id in self.owned.drain() {
            let _ = ledger.live.remove(&id);
            ledger.buffers_destroyed += 1;
        }
        ledger.devices_released += 1;
    }
}

struct HostState {
    bounds: (u32, u32),
    surfaces: Vec<(SurfaceId, EventSource<InputEvent>)>,
    frame_requests: Vec<(SurfaceId, FrameTicket)>,
    mounts: usize,
    refuse_mount: bool,
}

/// In-memory host element.
#[derive(Clone)]
pub struct HeadlessHost {
    id: HostId,
    state: Rc<RefCell<HostState>>,
    ledger: Rc<RefCell<GpuLedger>>,
}

impl HeadlessHost {
    /// Host of the given size with its own ledger.
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        Self::with_ledger(width, height, GpuLedger::shared())
    }

    /// Host of the given size recording into `ledger`.
    #[must_use]
    pub fn with_ledger(width: u32, height: u32, ledger: Rc<RefCell<GpuLedger>>) -> Self {
        Self {
            id: HostId(NEXT_HOST.fetch_add(1, Ordering::Relaxed)),
            state: Rc::new(RefCell::new(HostState {
                bounds: (width, height),
                surfaces: Vec::new(),
                frame_requests: Vec::new(),
                mounts: 0,
                refuse_mount: false,
            })),
            ledger,
        }
    }

    /// The ledger this host's devices record into.
    #[must_use]
    pub fn ledger(&self) -> Rc<RefCell<GpuLedger>> {
        Rc::clone(&self.ledger)
    }

    /// Change the element size (as a layout change would).
    pub fn set_bounds(&self, width: u32, height: u32) {
        self.state.borrow_mut().bounds = (width, height);
    }

    /// Number of surfaces currently mounted.
    #[must_use]
    pub fn surface_count(&self) -> usize {
        self.state.borrow().surfaces.len()
    }

    /// Total surfaces ever mounted.
    #[must_use]
    pub fn mount_count(&self) -> usize {
        self.state.borrow().mounts
    }

    /// Pointer input source of the newest mounted surface.
    #[must_use]
    pub fn input(&self) -> Option<EventSource<InputEvent>> {
        self.state
            .borrow()
            .surfaces
            .last()
            .map(|(_, input)| input.clone())
    }

    /// Drain queued frame requests, oldest first. Requests are never merged.
    pub fn take_frame_requests(&self) -> Vec<(SurfaceId, FrameTicket)> {
        std::mem::take(&mut self.state.borrow_mut().frame_requests)
    }

    /// Number of queued frame requests.
    #[must_use]
    pub fn pending_frames(&self) -> usize {
        self.state.borrow().frame_requests.len()
    }

    /// Drop every surface without going through the lifecycle manager, as
    /// when the page tears the element's children down first.
    pub fn remove_surfaces_externally(&self) {
        self.state.borrow_mut().surfaces.clear();
    }

    /// Make later mounts fail.
    pub fn refuse_mounts(&self, refuse: bool) {
        self.state.borrow_mut().refuse_mount = refuse;
    }
}

impl HostElement for HeadlessHost {
    fn host_id(&self) -> HostId {
        self.id
    }

    fn bounds(&self) -> (u32, u32) {
        self.state.borrow().bounds
    }

    fn mount_surface(&self, width: u32, height: u32) -> Result<MountedSurface, SceneryError> {
        let mut state = self.state.borrow_mut();
        if state.refuse_mount {
            return Err(SceneryError::Host(format!(
                "host {:?} refused a surface",
                self.id
            )));
        }
        let id = SurfaceId(NEXT_SURFACE.fetch_add(1, Ordering::Relaxed));
        let input = EventSource::new();
        state.surfaces.push((id, input.clone()));
        state.mounts += 1;
        Ok(MountedSurface {
            id,
            device: Box::new(HeadlessDevice::new(
                Rc::clone(&self.ledger),
                (width, height),
            )),
            input,
        })
    }

    fn unmount_surface(&self, id: SurfaceId) -> bool {
        let mut state = self.state.borrow_mut();
        let before = state.surfaces.len();
        state.surfaces.retain(|(s, _)| *s != id);
        state.frame_requests.retain(|(s, _)| *s != id);
        state.surfaces.len() != before
    }

    fn request_frame(&self, id: SurfaceId, ticket: FrameTicket) {
        let mut state = self.state.borrow_mut();
        if state.surfaces.iter().any(|(s, _)| *s == id) {
            state.frame_requests.push((id, ticket));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::device::{FrameUniform, PointsDraw};

    fn desc(contents: &[u8]) -> BufferDesc<'_> {
        BufferDesc {
            label: "test",
            kind: BufferKind::Vertex,
            contents,
        }
    }

    #[test]
    fn ledger_tracks_buffers_across_devices() {
        let ledger = GpuLedger::shared();
        let mut a = HeadlessDevice::new(Rc::clone(&ledger), (4, 4));
        let mut b = HeadlessDevice::new(Rc::clone(&ledger), (4, 4));
        let id_a = a.create_buffer(&desc(&[0; 12])).unwrap();
        let _ = b.create_buffer(&desc(&[0; 4])).unwrap();
        assert_eq!(ledger.borrow().live_buffers(), 2);
        assert_eq!(ledger.borrow().live_bytes(), 16);

        assert!(!b.destroy_buffer(id_a));
        assert!(a.destroy_buffer(id_a));
        b.release();
        b.release();
        let ledger = ledger.borrow();
        assert_eq!(ledger.live_buffers(), 0);
        assert_eq!(ledger.devices_released(), 1);
    }

    #[test]
    fn draw_rejects_foreign_buffers_and_released_devices() {
        let ledger = GpuLedger::shared();
        let mut device = HeadlessDevice::new(Rc::clone(&ledger), (4, 4));
        let frame = FrameDraw {
            uniform: FrameUniform::default(),
            clear_color: [0.0; 4],
            points: Some(PointsDraw {
                positions: BufferId(999),
                material: BufferId(998),
                count: 1,
            }),
            mesh: None,
        };
        assert_eq!(
            device.draw(&frame),
            Err(DrawError::MissingResource(BufferId(999)))
        );
        device.release();
        assert_eq!(device.draw(&frame), Err(DrawError::Released));
        assert!(device.create_buffer(&desc(&[])).is_err());
    }

    #[test]
    fn budget_and_queued_failures_are_honoured() {
        let ledger = GpuLedger::shared();
        let mut device = HeadlessDevice::new(Rc::clone(&ledger), (4, 4));
        ledger.borrow_mut().set_buffer_budget(Some(1));
        assert!(device.create_buffer(&desc(&[1])).is_ok());
        assert!(device.create_buffer(&desc(&[1])).is_err());

        ledger.borrow_mut().queue_draw_failure(DrawError::Outdated);
        let frame = FrameDraw {
            uniform: FrameUniform::default(),
            clear_color: [0.0; 4],
            points: None,
            mesh: None,
        };
        assert_eq!(device.draw(&frame), Err(DrawError::Outdated));
        assert_eq!(device.draw(&frame), Ok(()));
    }

    #[test]
    fn host_mounts_and_unmounts_surfaces() {
        let host = HeadlessHost::new(320, 200);
        let surface = host.mount_surface(320, 200).unwrap();
        assert_eq!(host.surface_count(), 1);
        assert_eq!(surface.device.size(), (320, 200));

        host.request_frame(surface.id, FrameTicket(1));
        assert_eq!(host.pending_frames(), 1);
        assert!(host.unmount_surface(surface.id));
        assert!(!host.unmount_surface(surface.id));
        assert_eq!(host.pending_frames(), 0);

        host.request_frame(surface.id, FrameTicket(2));
        assert_eq!(host.pending_frames(), 0);
    }

    #[test]
    fn refused_mount_is_a_host_error() {
        let host = HeadlessHost::new(10, 10);
        host.refuse_mounts(true);
        assert!(matches!(
            host.mount_surface(10, 10),
            Err(SceneryError::Host(_))
        ));
        assert_eq!(host.surface_count(), 0);
    }
}
