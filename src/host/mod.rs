//! Host elements: the UI containers a scene is mounted into.
//!
//! A host owns the place where a drawing surface can live (a DOM element, a
//! native window, an in-memory stand-in). The lifecycle manager asks it for
//! exactly one surface per attach and hands that surface back on detach.

pub mod headless;

pub use headless::{GpuLedger, HeadlessDevice, HeadlessHost};

use crate::error::SceneryError;
use crate::events::EventSource;
use crate::gpu::device::GpuDevice;
use crate::input::InputEvent;

/// Identity of a host element, stable across mount cycles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HostId(pub u64);

/// Identity of one mounted drawing surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SurfaceId(pub u64);

/// One requested display-refresh callback. The callback hands the ticket
/// back to the lifecycle manager, which only honours the newest one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FrameTicket(pub u64);

/// A freshly mounted drawing surface.
pub struct MountedSurface {
    /// Surface identity, used to unmount and to request frames.
    pub id: SurfaceId,
    /// GPU device bound to the surface.
    pub device: Box<dyn GpuDevice>,
    /// Pointer events over the surface.
    pub input: EventSource<InputEvent>,
}

/// A UI element that can hold a drawing surface.
///
/// Handles are cheap clones referring to the same element.
pub trait HostElement: Clone + 'static {
    /// Stable identity of the element.
    fn host_id(&self) -> HostId;

    /// Current content size in physical pixels. May be zero while hidden.
    fn bounds(&self) -> (u32, u32);

    /// Create a drawing surface of `width` x `height` pixels as a child of
    /// the element.
    ///
    /// # Errors
    ///
    /// Fails when the element cannot hold a surface or no GPU context can
    /// be created for it.
    fn mount_surface(
        &self,
        width: u32,
        height: u32,
    ) -> Result<MountedSurface, SceneryError>;

    /// Remove the surface. Returns `false` if it was already gone.
    fn unmount_surface(&self, id: SurfaceId) -> bool;

    /// Ask for one display-refresh callback for the surface. The callback
    /// must pass `ticket` to
    /// [`SceneLifecycleManager::frame`](crate::engine::SceneLifecycleManager::frame).
    fn request_frame(&self, id: SurfaceId, ticket: FrameTicket);
}
