//! Viewport resize propagation.

use crate::events::{EventSource, ListenerBinding};

/// Window-level size change notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewportResize {
    /// New viewport width in physical pixels.
    pub width: u32,
    /// New viewport height in physical pixels.
    pub height: u32,
}

/// One session's subscription to the shared viewport resize source.
///
/// The listener itself decides what to resize; the adapter only owns the
/// registration so it can be removed exactly once.
#[derive(Default)]
pub struct ResizeAdapter {
    binding: Option<ListenerBinding<ViewportResize>>,
}

impl ResizeAdapter {
    /// Adapter that is not subscribed to anything.
    #[must_use]
    pub fn inactive() -> Self {
        Self::default()
    }

    /// Subscribe `on_resize` to `source`.
    pub fn subscribe(
        source: &EventSource<ViewportResize>,
        on_resize: impl FnMut(&ViewportResize) + 'static,
    ) -> Self {
        Self {
            binding: Some(source.subscribe(on_resize)),
        }
    }

    /// Remove the listener. Returns `true` only for the call that removed it.
    pub fn unsubscribe(&mut self) -> bool {
        self.binding
            .take()
            .is_some_and(|mut binding| binding.unsubscribe())
    }

    /// Whether the listener is registered.
    #[must_use]
    pub fn is_subscribed(&self) -> bool {
        self.binding.as_ref().is_some_and(ListenerBinding::is_active)
    }
}
