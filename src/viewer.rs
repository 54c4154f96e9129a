//! Standalone window backed by winit.
//!
//! The window is the host element: the scene is attached when the event
//! loop resumes and detached when it suspends or exits. `R` remounts the
//! scene (a full detach/attach cycle), `Space` toggles it on and off.
//!
//! ```no_run
//! # use scenery::viewer::Viewer;
//! # use scenery::SceneConfig;
//! Viewer::builder()
//!     .with_config(SceneConfig::default())
//!     .build()
//!     .run()
//!     .unwrap();
//! ```

use std::cell::{Cell, RefCell};
use std::path::PathBuf;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use winit::{
    application::ApplicationHandler,
    event::{ElementState, MouseScrollDelta, WindowEvent},
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    keyboard::{KeyCode, PhysicalKey},
    window::{Window, WindowId},
};

use crate::engine::{
    FrameOutcome, SceneHandle, SceneLifecycleManager, ViewportResize,
};
use crate::error::SceneryError;
use crate::events::EventSource;
use crate::gpu::render_context::{GpuInstance, RenderContext};
use crate::host::{FrameTicket, HostElement, HostId, MountedSurface, SurfaceId};
use crate::input::{InputEvent, MouseButton};
use crate::loader::ThreadedModelLoader;
use crate::options::SceneConfig;
use crate::renderer::WgpuRenderer;

static NEXT_WINDOW_SURFACE: AtomicU64 = AtomicU64::new(1);

// ── Host ─────────────────────────────────────────────────────────────────

/// A winit window acting as a host element. Holds at most one surface.
#[derive(Clone)]
pub struct WindowHost {
    window: Arc<Window>,
    gpu: Rc<GpuInstance>,
    surface: Rc<RefCell<Option<(SurfaceId, EventSource<InputEvent>)>>>,
    ticket: Rc<Cell<Option<FrameTicket>>>,
}

impl WindowHost {
    /// Host for `window`, drawing with `gpu`.
    #[must_use]
    pub fn new(window: Arc<Window>, gpu: Rc<GpuInstance>) -> Self {
        Self {
            window,
            gpu,
            surface: Rc::new(RefCell::new(None)),
            ticket: Rc::new(Cell::new(None)),
        }
    }

    /// Ticket of the frame requested through `request_redraw`, if any.
    /// Redraws the system sends on its own carry no ticket.
    pub fn take_ticket(&self) -> Option<FrameTicket> {
        self.ticket.take()
    }

    /// Forward a pointer event to the mounted surface, if any.
    pub fn dispatch_input(&self, event: &InputEvent) {
        let source = self.surface.borrow().as_ref().map(|(_, s)| s.clone());
        if let Some(source) = source {
            let _ = source.dispatch(event);
        }
    }
}

impl HostElement for WindowHost {
    fn host_id(&self) -> HostId {
        HostId(u64::from(self.window.id()))
    }

    fn bounds(&self) -> (u32, u32) {
        let size = self.window.inner_size();
        (size.width, size.height)
    }

    fn mount_surface(&self, width: u32, height: u32) -> Result<MountedSurface, SceneryError> {
        if self.surface.borrow().is_some() {
            return Err(SceneryError::Host("window already holds a surface".to_owned()));
        }
        let context = RenderContext::for_target(
            &self.gpu,
            Arc::clone(&self.window),
            (width, height),
        )?;
        let renderer = WgpuRenderer::new(context)?;
        let id = SurfaceId(NEXT_WINDOW_SURFACE.fetch_add(1, Ordering::Relaxed));
        let input = EventSource::new();
        *self.surface.borrow_mut() = Some((id, input.clone()));
        Ok(MountedSurface {
            id,
            device: Box::new(renderer),
            input,
        })
    }

    fn unmount_surface(&self, id: SurfaceId) -> bool {
        let mut surface = self.surface.borrow_mut();
        if surface.as_ref().is_some_and(|(s, _)| *s == id) {
            *surface = None;
            self.ticket.set(None);
            true
        } else {
            false
        }
    }

    fn request_frame(&self, id: SurfaceId, ticket: FrameTicket) {
        if self.surface.borrow().as_ref().is_some_and(|(s, _)| *s == id) {
            self.ticket.set(Some(ticket));
            self.window.request_redraw();
        }
    }
}

// ── Builder ──────────────────────────────────────────────────────────────

/// Fluent builder for [`Viewer`].
pub struct ViewerBuilder {
    config: SceneConfig,
    asset_root: PathBuf,
    title: String,
}

impl ViewerBuilder {
    fn new() -> Self {
        Self {
            config: SceneConfig::default(),
            asset_root: PathBuf::from("assets"),
            title: "Scenery".into(),
        }
    }

    /// Scene configuration.
    #[must_use]
    pub fn with_config(mut self, config: SceneConfig) -> Self {
        self.config = config;
        self
    }

    /// Directory relative model URLs are resolved against.
    #[must_use]
    pub fn with_asset_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.asset_root = root.into();
        self
    }

    /// Set the window title.
    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    /// Consume the builder and produce a [`Viewer`].
    #[must_use]
    pub fn build(self) -> Viewer {
        Viewer {
            config: self.config,
            asset_root: self.asset_root,
            title: self.title,
        }
    }
}

// ── Viewer ───────────────────────────────────────────────────────────────

/// A standalone window showing one scene.
pub struct Viewer {
    config: SceneConfig,
    asset_root: PathBuf,
    title: String,
}

impl Viewer {
    /// Start a new builder.
    #[must_use]
    pub fn builder() -> ViewerBuilder {
        ViewerBuilder::new()
    }

    /// Open the window and run the event loop. Blocks until the window is
    /// closed.
    ///
    /// # Errors
    ///
    /// Fails if the event loop cannot be created or exits with an error.
    pub fn run(self) -> Result<(), SceneryError> {
        let event_loop = EventLoop::new()
            .map_err(|e| SceneryError::Viewer(e.to_string()))?;
        event_loop.set_control_flow(ControlFlow::Wait);

        let manager = scene_manager(&self.config, self.asset_root);
        let mut app = ViewerApp {
            host: None,
            gpu: None,
            manager,
            handle: None,
            config: self.config,
            title: self.title,
        };

        event_loop
            .run_app(&mut app)
            .map_err(|e| SceneryError::Viewer(e.to_string()))
    }
}

fn scene_manager(config: &SceneConfig, asset_root: PathBuf) -> SceneLifecycleManager<WindowHost> {
    let manager = SceneLifecycleManager::new(EventSource::new());
    #[cfg(feature = "net")]
    if config
        .requested_model()
        .is_some_and(|url| url.contains("://"))
    {
        return manager.with_model_loader(ThreadedModelLoader::new(
            crate::loader::HttpFetcher::new(),
        ));
    }
    #[cfg(not(feature = "net"))]
    let _ = config;
    manager.with_model_loader(ThreadedModelLoader::from_dir(&asset_root))
}

// ── Winit app ────────────────────────────────────────────────────────────

struct ViewerApp {
    host: Option<WindowHost>,
    gpu: Option<Rc<GpuInstance>>,
    manager: SceneLifecycleManager<WindowHost>,
    handle: Option<SceneHandle>,
    config: SceneConfig,
    title: String,
}

impl ViewerApp {
    fn attach(&mut self) {
        let Some(host) = self.host.clone() else {
            return;
        };
        match self.manager.attach(host, &self.config) {
            Ok(handle) => self.handle = Some(handle),
            Err(e) => log::error!("failed to attach scene: {e}"),
        }
    }

    fn detach(&mut self) {
        if let Some(handle) = self.handle.take() {
            if let Some(stats) = self.manager.stats(handle) {
                log::info!(
                    "detaching after {} frames ({:.1} fps)",
                    stats.frames,
                    stats.fps
                );
            }
            let _ = self.manager.detach(handle);
        }
    }

    fn dispatch(&self, event: &InputEvent) {
        if let Some(host) = &self.host {
            host.dispatch_input(event);
        }
    }
}

impl ApplicationHandler for ViewerApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.host.is_none() {
            let attrs = Window::default_attributes()
                .with_title(self.title.clone())
                .with_inner_size(winit::dpi::LogicalSize::new(1280, 720));
            let window = match event_loop.create_window(attrs) {
                Ok(w) => Arc::new(w),
                Err(e) => {
                    log::error!("Failed to create window: {e}");
                    event_loop.exit();
                    return;
                }
            };
            let gpu = match self.gpu.clone() {
                Some(gpu) => gpu,
                None => match pollster::block_on(GpuInstance::new()) {
                    Ok(gpu) => Rc::new(gpu),
                    Err(e) => {
                        log::error!("Failed to initialize GPU: {e}");
                        event_loop.exit();
                        return;
                    }
                },
            };
            self.gpu = Some(Rc::clone(&gpu));
            self.host = Some(WindowHost::new(window, gpu));
        }
        if self.handle.is_none() {
            self.attach();
        }
    }

    fn suspended(&mut self, _event_loop: &ActiveEventLoop) {
        self.detach();
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        self.detach();
        let _ = self.manager.detach_all();
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                self.detach();
                event_loop.exit();
            }

            WindowEvent::Resized(size) => {
                let _ = self.manager.viewport().dispatch(&ViewportResize {
                    width: size.width,
                    height: size.height,
                });
            }

            WindowEvent::RedrawRequested => {
                let ticket = self.host.as_ref().and_then(WindowHost::take_ticket);
                if let (Some(handle), Some(ticket)) = (self.handle, ticket) {
                    if let FrameOutcome::DrawFailed(e) = self.manager.frame(handle, ticket) {
                        log::debug!("frame failed: {e}");
                    }
                }
            }

            WindowEvent::MouseInput { button, state, .. } => {
                self.dispatch(&InputEvent::PointerButton {
                    button: MouseButton::from(button),
                    pressed: state == ElementState::Pressed,
                });
            }

            WindowEvent::CursorMoved { position, .. } => {
                self.dispatch(&InputEvent::PointerMoved {
                    x: position.x as f32,
                    y: position.y as f32,
                });
            }

            WindowEvent::CursorLeft { .. } => {
                self.dispatch(&InputEvent::PointerLeft);
            }

            WindowEvent::MouseWheel { delta, .. } => {
                let delta = match delta {
                    MouseScrollDelta::LineDelta(_, y) => y,
                    MouseScrollDelta::PixelDelta(pos) => pos.y as f32 * 0.01,
                };
                self.dispatch(&InputEvent::Wheel { delta });
            }

            WindowEvent::KeyboardInput { event, .. } => {
                if event.state != ElementState::Pressed || event.repeat {
                    return;
                }
                let PhysicalKey::Code(code) = event.physical_key else {
                    return;
                };
                match code {
                    KeyCode::KeyR => {
                        self.detach();
                        self.attach();
                    }
                    KeyCode::Space => {
                        if self.handle.is_some() {
                            self.detach();
                        } else {
                            self.attach();
                        }
                    }
                    KeyCode::Escape => {
                        self.detach();
                        event_loop.exit();
                    }
                    _ => {}
                }
            }

            _ => (),
        }
    }
}
