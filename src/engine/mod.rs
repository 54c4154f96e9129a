//! Scene lifecycle management.
//!
//! [`SceneLifecycleManager`] owns one scene per attached host element. Attach
//! acquires everything (surface, GPU buffers, listeners, model request,
//! render loop) and detach releases it in strict reverse order. All session
//! state lives behind one `Rc<RefCell<_>>` per session; listener closures
//! only hold `Weak` references to it and check its disposed flag, so late
//! resize, pointer or asset notifications after detach are no-ops.

pub mod resize;
pub mod scheduler;

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use rustc_hash::FxHashMap;
use web_time::Instant;

pub use resize::{ResizeAdapter, ViewportResize};
pub use scheduler::{LoopState, RenderLoopScheduler};

use crate::camera::{Camera, OrbitCameraController};
use crate::error::SceneryError;
use crate::events::EventSource;
use crate::gpu::device::{DrawError, GpuDevice};
use crate::gpu::resource_pool::GeometryResourcePool;
use crate::host::{FrameTicket, HostElement, HostId, MountedSurface, SurfaceId};
use crate::input::InputEvent;
use crate::loader::{LoadStatus, ModelLoader, PendingModel};
use crate::options::SceneConfig;
use crate::scene::{
    ModelNode, ParticleFieldGenerator, ParticleNode, SceneGraphState,
};

/// Identifier of one attach/detach session. Never reused by a manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SceneHandle(u64);

impl SceneHandle {
    /// Raw numeric value (for handing across FFI boundaries).
    #[must_use]
    pub fn raw(self) -> u64 {
        self.0
    }

    /// Rebuild a handle from [`raw`](Self::raw).
    #[must_use]
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }
}

/// What happened in one frame callback.
#[derive(Debug, Clone, PartialEq)]
pub enum FrameOutcome {
    /// The frame was drawn and the next one requested.
    Drawn,
    /// The loop is not running or the ticket is not the outstanding
    /// request; nothing ran.
    Skipped,
    /// The handle is not attached.
    Detached,
    /// Drawing failed; the loop continues.
    DrawFailed(DrawError),
}

/// Where the optional model is in its lifecycle.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelStatus {
    /// No model was requested.
    NotRequested,
    /// Waiting for the loader, with download progress in `[0, 1]`.
    Loading(f32),
    /// The model is in the scene.
    Loaded,
    /// Loading or uploading failed; the scene runs without it.
    Failed(String),
}

/// Snapshot of one session for diagnostics.
#[derive(Debug, Clone, PartialEq)]
pub struct SceneStats {
    /// Frame callbacks that ran.
    pub frames: u64,
    /// Smoothed frames per second.
    pub fps: f32,
    /// Buffers alive on the session's device.
    pub live_buffers: usize,
    /// Model lifecycle.
    pub model: ModelStatus,
    /// Particles in the field.
    pub particles: u32,
    /// Camera aspect ratio.
    pub aspect: f32,
    /// Surface size in pixels.
    pub surface_size: (u32, u32),
    /// Render loop state.
    pub loop_state: LoopState,
}

struct SceneState {
    disposed: bool,
    scene: SceneGraphState,
    controller: OrbitCameraController,
    device: Box<dyn GpuDevice>,
    pool: GeometryResourcePool,
    scheduler: RenderLoopScheduler,
    pending_model: Option<PendingModel>,
    model_status: ModelStatus,
    model_scale: f32,
}

struct Session<H> {
    host: H,
    surface: SurfaceId,
    state: Rc<RefCell<SceneState>>,
    resize: ResizeAdapter,
}

/// Owns every attached scene.
pub struct SceneLifecycleManager<H: HostElement> {
    viewport: EventSource<ViewportResize>,
    loader: Option<Box<dyn ModelLoader>>,
    sessions: FxHashMap<SceneHandle, Session<H>>,
    next_handle: u64,
}

impl<H: HostElement> SceneLifecycleManager<H> {
    /// Manager whose scenes follow `viewport` resize notifications.
    #[must_use]
    pub fn new(viewport: EventSource<ViewportResize>) -> Self {
        Self {
            viewport,
            loader: None,
            sessions: FxHashMap::default(),
            next_handle: 1,
        }
    }

    /// Use `loader` for model requests.
    #[must_use]
    pub fn with_model_loader(mut self, loader: impl ModelLoader + 'static) -> Self {
        self.loader = Some(Box::new(loader));
        self
    }

    /// The shared viewport resize source.
    #[must_use]
    pub fn viewport(&self) -> &EventSource<ViewportResize> {
        &self.viewport
    }

    /// Mount a scene into `host`. A scene already attached to the same host
    /// is detached first.
    ///
    /// # Errors
    ///
    /// Fails if `config` does not validate, the host cannot mount a surface,
    /// a GPU buffer cannot be created or the model load cannot be started.
    /// An invalid config leaves any existing scene in place. Everything acquired
    /// before the failure is released and the host is left without a
    /// surface.
    pub fn attach(&mut self, host: H, config: &SceneConfig) -> Result<SceneHandle, SceneryError> {
        config.validate()?;
        if let Some(existing) = self.handle_for(host.host_id()) {
            log::info!(
                "host {:?} already has scene {existing:?}; detaching it first",
                host.host_id()
            );
            let _ = self.detach(existing);
        }

        let (width, height) = host.bounds();
        let size = (width.max(1), height.max(1));
        let MountedSurface {
            id: surface,
            mut device,
            input,
        } = host.mount_surface(size.0, size.1)?;
        log::debug!("mounted surface {surface:?} at {}x{}", size.0, size.1);

        let mut pool = GeometryResourcePool::new();
        let particles = match upload_particles(&mut pool, device.as_mut(), config)
        {
            Ok(particles) => particles,
            Err(e) => {
                let freed = pool.release_all(device.as_mut());
                device.release();
                let _ = host.unmount_surface(surface);
                log::debug!("attach rolled back after freeing {freed} buffers");
                return Err(e);
            }
        };

        let state = Rc::new(RefCell::new(SceneState {
            disposed: false,
            scene: SceneGraphState::new(config, size, particles),
            controller: OrbitCameraController::from_config(config),
            device,
            pool,
            scheduler: RenderLoopScheduler::new(),
            pending_model: None,
            model_status: ModelStatus::NotRequested,
            model_scale: config.model_scale,
        }));
        let mut session = Session {
            host,
            surface,
            state,
            resize: ResizeAdapter::inactive(),
        };

        bind_controller(&session.state, &input);

        if let Err(e) = self.request_model(&session.state, config) {
            teardown(&mut session);
            return Err(e);
        }

        session.resize = ResizeAdapter::subscribe(
            &self.viewport,
            resize_listener(Rc::downgrade(&session.state), session.host.clone()),
        );

        let first = session.state.borrow_mut().scheduler.start(Instant::now());
        if let Some(ticket) = first {
            session.host.request_frame(surface, ticket);
        }

        let handle = SceneHandle(self.next_handle);
        self.next_handle += 1;
        log::info!(
            "attached scene {handle:?} to host {:?} ({} particles)",
            session.host.host_id(),
            config.particle_count
        );
        let _ = self.sessions.insert(handle, session);
        Ok(handle)
    }

    fn request_model(
        &self,
        state: &Rc<RefCell<SceneState>>,
        config: &SceneConfig,
    ) -> Result<(), SceneryError> {
        let Some(url) = config.requested_model() else {
            if config.enable_model {
                log::warn!("model enabled without a model URL; ignoring");
            }
            return Ok(());
        };
        let Some(loader) = self.loader.as_ref() else {
            log::warn!("no model loader configured; ignoring {url}");
            return Ok(());
        };
        let pending = loader.load(url)?;
        log::debug!("requested model {url}");
        let mut state = state.borrow_mut();
        state.pending_model = Some(pending);
        state.model_status = ModelStatus::Loading(0.0);
        Ok(())
    }

    /// Tear a scene down. Returns `false` for unknown or already detached
    /// handles.
    pub fn detach(&mut self, handle: SceneHandle) -> bool {
        let Some(mut session) = self.sessions.remove(&handle) else {
            log::debug!("detach of unknown scene {handle:?} ignored");
            return false;
        };
        teardown(&mut session);
        log::info!(
            "detached scene {handle:?} from host {:?}",
            session.host.host_id()
        );
        true
    }

    /// Detach every scene. Returns how many were detached.
    pub fn detach_all(&mut self) -> usize {
        let mut handles: Vec<SceneHandle> = self.sessions.keys().copied().collect();
        handles.sort_unstable();
        handles.into_iter().filter(|h| self.detach(*h)).count()
    }

    /// Frame callback for `handle` answering the request `ticket`, timed
    /// with the current clock.
    pub fn frame(&mut self, handle: SceneHandle, ticket: FrameTicket) -> FrameOutcome {
        self.frame_at(handle, ticket, Instant::now())
    }

    /// Frame callback for `handle` answering the request `ticket` at time
    /// `now`. Duplicate and stale callbacks return [`FrameOutcome::Skipped`]
    /// without drawing or requesting another frame.
    pub fn frame_at(
        &mut self,
        handle: SceneHandle,
        ticket: FrameTicket,
        now: Instant,
    ) -> FrameOutcome {
        let Some(session) = self.sessions.get(&handle) else {
            return FrameOutcome::Detached;
        };
        let mut guard = session.state.borrow_mut();
        let state = &mut *guard;
        if state.disposed {
            return FrameOutcome::Skipped;
        }
        let Some(delta) = state.scheduler.begin_frame(ticket, now) else {
            return FrameOutcome::Skipped;
        };

        poll_model(state);
        state.scene.advance_animation(delta.as_secs_f32());
        state.controller.update();
        state.controller.apply_to(&mut state.scene.camera);
        state.scene.advance_particles();

        let draw = state.scene.frame_draw(state.device.size());
        let outcome = match state.device.draw(&draw) {
            Ok(()) => FrameOutcome::Drawn,
            Err(e) if e.needs_reconfigure() => {
                let (width, height) = session.host.bounds();
                let (width, height) = if width > 0 && height > 0 {
                    (width, height)
                } else {
                    state.device.size()
                };
                log::debug!("{e}; reconfiguring surface at {width}x{height}");
                state.scene.camera.set_viewport(width, height);
                state.device.resize(width, height);
                FrameOutcome::DrawFailed(e)
            }
            Err(e) => {
                log::error!("frame for scene {handle:?} failed: {e}");
                FrameOutcome::DrawFailed(e)
            }
        };

        if let Some(next) = state.scheduler.end_frame() {
            session.host.request_frame(session.surface, next);
        }
        outcome
    }

    /// Whether `handle` is attached.
    #[must_use]
    pub fn is_attached(&self, handle: SceneHandle) -> bool {
        self.sessions.contains_key(&handle)
    }

    /// The scene attached to `host`, if any.
    #[must_use]
    pub fn handle_for(&self, host: HostId) -> Option<SceneHandle> {
        self.sessions
            .iter()
            .find(|(_, session)| session.host.host_id() == host)
            .map(|(handle, _)| *handle)
    }

    /// The scene whose surface is `surface`, if any.
    #[must_use]
    pub fn handle_for_surface(&self, surface: SurfaceId) -> Option<SceneHandle> {
        self.sessions
            .iter()
            .find(|(_, session)| session.surface == surface)
            .map(|(handle, _)| *handle)
    }

    /// Number of attached scenes.
    #[must_use]
    pub fn live_sessions(&self) -> usize {
        self.sessions.len()
    }

    /// Diagnostics for `handle`.
    #[must_use]
    pub fn stats(&self, handle: SceneHandle) -> Option<SceneStats> {
        let session = self.sessions.get(&handle)?;
        let state = session.state.borrow();
        Some(SceneStats {
            frames: state.scheduler.frames(),
            fps: state.scheduler.fps(),
            live_buffers: state.device.live_buffer_count(),
            model: state.model_status.clone(),
            particles: state.scene.particles.count(),
            aspect: state.scene.camera.aspect,
            surface_size: state.device.size(),
            loop_state: state.scheduler.state(),
        })
    }

    /// Current camera of `handle`.
    #[must_use]
    pub fn camera(&self, handle: SceneHandle) -> Option<Camera> {
        self.sessions
            .get(&handle)
            .map(|session| session.state.borrow().scene.camera.clone())
    }
}

impl<H: HostElement> Drop for SceneLifecycleManager<H> {
    fn drop(&mut self) {
        let detached = self.detach_all();
        if detached > 0 {
            log::debug!("detached {detached} scenes on drop");
        }
    }
}

fn upload_particles(
    pool: &mut GeometryResourcePool,
    device: &mut dyn GpuDevice,
    config: &SceneConfig,
) -> Result<ParticleNode, SceneryError> {
    let mut generator = ParticleFieldGenerator::from_seed(config.particle_seed);
    let buffer = generator.generate(config.particle_count, config.particle_extent);
    let material = ParticleFieldGenerator::material(config.particle_color, config.particle_size);
    ParticleNode::upload(
        pool,
        device,
        &buffer,
        &material,
        config.particle_rotation_step,
    )
}

fn bind_controller(state: &Rc<RefCell<SceneState>>, input: &EventSource<InputEvent>) {
    let weak = Rc::downgrade(state);
    let binding = input.subscribe(move |event| {
        let Some(state) = weak.upgrade() else {
            return;
        };
        let Ok(mut state) = state.try_borrow_mut() else {
            log::debug!("pointer event during frame dropped");
            return;
        };
        if !state.disposed {
            state.controller.handle_input(event);
        }
    });
    state.borrow_mut().controller.bind_input(binding);
}

fn resize_listener<H: HostElement>(
    weak: Weak<RefCell<SceneState>>,
    host: H,
) -> impl FnMut(&ViewportResize) + 'static {
    move |_event| {
        let Some(state) = weak.upgrade() else {
            return;
        };
        let Ok(mut guard) = state.try_borrow_mut() else {
            log::debug!("resize during frame dropped");
            return;
        };
        let state = &mut *guard;
        if state.disposed {
            return;
        }
        // The window size is only a trigger; the element is measured.
        let (width, height) = host.bounds();
        if width == 0 || height == 0 {
            return;
        }
        state.scene.camera.set_viewport(width, height);
        state.device.resize(width, height);
    }
}

/// Insert a finished model, or record why there is none. Runs at the start
/// of a frame, never during a draw.
fn poll_model(state: &mut SceneState) {
    let Some(pending) = state.pending_model.as_mut() else {
        return;
    };
    match pending.poll() {
        LoadStatus::Pending => {
            state.model_status = ModelStatus::Loading(pending.progress());
        }
        LoadStatus::Ready(asset) => {
            let url = pending.url().to_owned();
            state.pending_model = None;
            match ModelNode::upload(
                &mut state.pool,
                state.device.as_mut(),
                asset,
                state.model_scale,
            ) {
                Ok(node) => {
                    log::debug!("model {url} inserted");
                    state.scene.model = Some(node);
                    state.model_status = ModelStatus::Loaded;
                }
                Err(e) => {
                    log::warn!("model {url} could not be uploaded: {e}");
                    state.model_status = ModelStatus::Failed(e.to_string());
                }
            }
        }
        LoadStatus::Failed(e) => {
            log::warn!(
                "model {} failed to load: {e}; continuing without it",
                pending.url()
            );
            state.pending_model = None;
            state.model_status = ModelStatus::Failed(e.to_string());
        }
        LoadStatus::Cancelled => {
            state.pending_model = None;
        }
    }
}

/// Release a session in reverse acquisition order.
fn teardown<H: HostElement>(session: &mut Session<H>) {
    let mut guard = session.state.borrow_mut();
    let state = &mut *guard;

    state.scheduler.stop();
    let _ = session.resize.unsubscribe();
    let _ = state.controller.dispose();

    state.disposed = true;
    if let Some(pending) = state.pending_model.take() {
        pending.cancel();
        log::debug!("cancelled pending model {}", pending.url());
    }
    state.scene.model = None;

    let freed = state.pool.release_all(state.device.as_mut());
    state.device.release();
    drop(guard);

    if !session.host.unmount_surface(session.surface) {
        log::debug!("surface {:?} was already removed", session.surface);
    }
    log::debug!("released {freed} buffers for surface {:?}", session.surface);
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::gpu::device::BufferKind;
    use crate::host::HeadlessHost;
    use crate::input::MouseButton;
    use crate::loader::gltf::test_assets::triangle_glb;
    use crate::loader::{decode_gltf, AssetLoadError, LoadReporter};

    #[derive(Clone, Default)]
    struct ManualLoader {
        reporters: Rc<RefCell<Vec<LoadReporter>>>,
    }

    impl ModelLoader for ManualLoader {
        fn load(&self, url: &str) -> Result<PendingModel, SceneryError> {
            let (pending, reporter) = PendingModel::channel(url);
            self.reporters.borrow_mut().push(reporter);
            Ok(pending)
        }
    }

    struct FailingLoader;

    impl ModelLoader for FailingLoader {
        fn load(&self, _url: &str) -> Result<PendingModel, SceneryError> {
            Err(SceneryError::ThreadSpawn(std::io::Error::other("no threads")))
        }
    }

    fn config() -> SceneConfig {
        SceneConfig {
            particle_count: 64,
            particle_seed: Some(1),
            ..SceneConfig::default()
        }
    }

    fn model_config() -> SceneConfig {
        SceneConfig {
            enable_model: true,
            model_url: Some("robot.glb".to_owned()),
            ..config()
        }
    }

    fn manager() -> SceneLifecycleManager<HeadlessHost> {
        SceneLifecycleManager::new(EventSource::new())
    }

    /// Answer the newest frame request queued on `host`.
    fn run_frame(
        manager: &mut SceneLifecycleManager<HeadlessHost>,
        host: &HeadlessHost,
        handle: SceneHandle,
    ) -> FrameOutcome {
        run_frame_at(manager, host, handle, Instant::now())
    }

    fn run_frame_at(
        manager: &mut SceneLifecycleManager<HeadlessHost>,
        host: &HeadlessHost,
        handle: SceneHandle,
        now: Instant,
    ) -> FrameOutcome {
        match host.take_frame_requests().last() {
            Some(&(_, ticket)) => manager.frame_at(handle, ticket, now),
            None => FrameOutcome::Skipped,
        }
    }

    #[test]
    fn attach_then_detach_releases_everything() {
        let mut manager = manager();
        let host = HeadlessHost::new(800, 600);
        let ledger = host.ledger();

        let handle = manager.attach(host.clone(), &config()).unwrap();
        let input = host.input().unwrap();
        assert_eq!(host.surface_count(), 1);
        assert_eq!(ledger.borrow().live_buffers(), 2);
        assert_eq!(input.listener_count(), 1);
        assert_eq!(manager.viewport().listener_count(), 1);
        assert_eq!(host.pending_frames(), 1);

        assert!(manager.detach(handle));
        assert_eq!(host.surface_count(), 0);
        assert_eq!(ledger.borrow().live_buffers(), 0);
        assert_eq!(ledger.borrow().devices_released(), 1);
        assert_eq!(input.listener_count(), 0);
        assert_eq!(manager.viewport().listener_count(), 0);
        assert_eq!(host.pending_frames(), 0);
        assert_eq!(manager.live_sessions(), 0);
    }

    #[test]
    fn detach_is_idempotent() {
        let mut manager = manager();
        let host = HeadlessHost::new(100, 100);
        let handle = manager.attach(host, &config()).unwrap();
        assert!(manager.detach(handle));
        assert!(!manager.detach(handle));
        assert!(!manager.detach(SceneHandle::from_raw(999)));
        assert_eq!(
            manager.frame(handle, FrameTicket(1)),
            FrameOutcome::Detached
        );
    }

    #[test]
    fn repeated_cycles_never_stack_surfaces() {
        let mut manager = manager();
        let host = HeadlessHost::new(320, 240);
        let ledger = host.ledger();
        let mut previous = None;

        for cycle in 0..25 {
            let handle = manager.attach(host.clone(), &config()).unwrap();
            assert!(host.surface_count() <= 1);
            assert_ne!(previous, Some(handle));
            previous = Some(handle);
            if cycle % 3 != 0 {
                assert!(manager.detach(handle));
                assert_eq!(host.surface_count(), 0);
            }
        }
        assert_eq!(manager.live_sessions(), 1);
        assert_eq!(manager.detach_all(), 1);
        assert_eq!(host.surface_count(), 0);
        assert_eq!(host.mount_count(), 25);
        let ledger = ledger.borrow();
        assert_eq!(ledger.live_buffers(), 0);
        assert_eq!(ledger.devices_created(), ledger.devices_released());
    }

    #[test]
    fn double_attach_replaces_previous_scene() {
        let mut manager = manager();
        let host = HeadlessHost::new(200, 100);
        let first = manager.attach(host.clone(), &config()).unwrap();
        let second = manager.attach(host.clone(), &config()).unwrap();
        assert!(!manager.is_attached(first));
        assert!(manager.is_attached(second));
        assert_eq!(manager.handle_for(host.host_id()), Some(second));
        assert_eq!(host.surface_count(), 1);
        assert_eq!(host.ledger().borrow().live_buffers(), 2);
        assert_eq!(manager.viewport().listener_count(), 1);
    }

    #[test]
    fn scenes_on_different_hosts_are_independent() {
        let mut manager = manager();
        let a = HeadlessHost::new(100, 100);
        let b = HeadlessHost::new(300, 100);
        let ha = manager.attach(a.clone(), &config()).unwrap();
        let hb = manager.attach(b.clone(), &config()).unwrap();
        assert_eq!(manager.live_sessions(), 2);
        assert!(manager.detach(ha));
        assert_eq!(b.surface_count(), 1);
        assert_eq!(run_frame(&mut manager, &b, hb), FrameOutcome::Drawn);
        assert_eq!(a.pending_frames(), 0);
    }

    #[test]
    fn frames_request_exactly_one_successor() {
        let mut manager = manager();
        let host = HeadlessHost::new(640, 480);
        let handle = manager.attach(host.clone(), &config()).unwrap();
        let t0 = Instant::now();

        for i in 1..=5 {
            let requests = host.take_frame_requests();
            assert_eq!(requests.len(), 1);
            let (_, ticket) = requests[0];
            let now = t0 + Duration::from_millis(16 * i);
            assert_eq!(manager.frame_at(handle, ticket, now), FrameOutcome::Drawn);
            // A second callback for the same request neither draws nor
            // requests another frame.
            assert_eq!(manager.frame_at(handle, ticket, now), FrameOutcome::Skipped);
            assert_eq!(host.pending_frames(), 1);
        }
        assert_eq!(host.pending_frames(), 1);
        assert_eq!(host.ledger().borrow().draws(), 5);
        let stats = manager.stats(handle).unwrap();
        assert_eq!(stats.frames, 5);
        assert_eq!(stats.loop_state, LoopState::Running);
        assert_eq!(stats.particles, 64);
        assert_eq!(stats.surface_size, (640, 480));
    }

    #[test]
    fn oversized_config_is_rejected_before_mounting() {
        let mut manager = manager();
        let host = HeadlessHost::new(100, 100);
        let existing = manager.attach(host.clone(), &config()).unwrap();
        let huge =
            SceneConfig::from_json(r#"{"particleCount": 9223372036854775807}"#)
                .unwrap();
        assert!(matches!(
            manager.attach(host.clone(), &huge),
            Err(SceneryError::OptionsParse(_))
        ));
        assert!(manager.is_attached(existing));
        assert_eq!(host.mount_count(), 1);
        assert_eq!(host.ledger().borrow().live_buffers(), 2);
    }

    #[test]
    fn particle_rotation_reaches_the_draw() {
        let mut manager = manager();
        let host = HeadlessHost::new(64, 64);
        let handle = manager.attach(host.clone(), &config()).unwrap();
        let _ = run_frame(&mut manager, &host, handle);
        let frame = *host.ledger().borrow().last_frame().unwrap();
        let expected = glam::Mat4::from_rotation_y(0.0005).to_cols_array_2d();
        assert_eq!(frame.uniform.particle_model, expected);
        assert_eq!(frame.points.map(|p| p.count), Some(64));
    }

    #[test]
    fn resize_converges_to_last_size() {
        let mut manager = manager();
        let host = HeadlessHost::new(800, 600);
        let handle = manager.attach(host.clone(), &config()).unwrap();
        let viewport = manager.viewport().clone();

        for (w, h) in [(1024, 768), (300, 300), (1280, 720)] {
            host.set_bounds(w, h);
            let _ = viewport.dispatch(&ViewportResize {
                width: w,
                height: h,
            });
        }
        let camera = manager.camera(handle).unwrap();
        assert!((camera.aspect - 1280.0 / 720.0).abs() < 1e-6);
        let stats = manager.stats(handle).unwrap();
        assert_eq!(stats.surface_size, (1280, 720));
        assert_eq!(host.ledger().borrow().resizes().last(), Some(&(1280, 720)));
    }

    #[test]
    fn zero_sized_host_is_ignored_on_resize() {
        let mut manager = manager();
        let host = HeadlessHost::new(400, 200);
        let handle = manager.attach(host.clone(), &config()).unwrap();
        host.set_bounds(0, 200);
        let _ = manager.viewport().dispatch(&ViewportResize {
            width: 0,
            height: 200,
        });
        assert_eq!(manager.camera(handle).unwrap().aspect, 2.0);
        assert!(host.ledger().borrow().resizes().is_empty());
    }

    #[test]
    fn zero_sized_host_mounts_a_minimal_surface() {
        let mut manager = manager();
        let host = HeadlessHost::new(0, 0);
        let handle = manager.attach(host, &config()).unwrap();
        let stats = manager.stats(handle).unwrap();
        assert_eq!(stats.surface_size, (1, 1));
        assert_eq!(stats.aspect, 1.0);
    }

    #[test]
    fn resize_after_detach_is_inert() {
        let mut manager = manager();
        let host = HeadlessHost::new(800, 600);
        let handle = manager.attach(host.clone(), &config()).unwrap();
        let viewport = manager.viewport().clone();
        assert!(manager.detach(handle));
        host.set_bounds(10, 10);
        assert_eq!(
            viewport.dispatch(&ViewportResize {
                width: 10,
                height: 10
            }),
            0
        );
        assert!(host.ledger().borrow().resizes().is_empty());
    }

    #[test]
    fn detach_before_model_resolves_is_inert() {
        let loader = ManualLoader::default();
        let mut manager = manager().with_model_loader(loader.clone());
        let host = HeadlessHost::new(320, 240);
        let ledger = host.ledger();
        let handle = manager.attach(host.clone(), &model_config()).unwrap();
        assert_eq!(
            manager.stats(handle).unwrap().model,
            ModelStatus::Loading(0.0)
        );

        assert!(manager.detach(handle));
        let reporter = loader.reporters.borrow()[0].clone();
        assert!(reporter.is_cancelled());
        reporter.progress(0.5);
        reporter.decode_and_finish(Ok(triangle_glb(true)));

        assert_eq!(ledger.borrow().live_buffers(), 0);
        assert_eq!(host.surface_count(), 0);
        assert_eq!(
            manager.frame(handle, FrameTicket(1)),
            FrameOutcome::Detached
        );
    }

    #[test]
    fn model_is_inserted_at_frame_start_and_animates() {
        let loader = ManualLoader::default();
        let mut manager = manager().with_model_loader(loader.clone());
        let host = HeadlessHost::new(320, 240);
        let handle = manager.attach(host.clone(), &model_config()).unwrap();
        let t0 = Instant::now();

        assert_eq!(
            run_frame_at(&mut manager, &host, handle, t0),
            FrameOutcome::Drawn
        );
        assert!(host.ledger().borrow().last_frame().unwrap().mesh.is_none());

        let asset = decode_gltf(&triangle_glb(true)).unwrap();
        loader.reporters.borrow()[0].finish(Ok(asset));
        let now = t0 + Duration::from_millis(500);
        assert_eq!(
            run_frame_at(&mut manager, &host, handle, now),
            FrameOutcome::Drawn
        );

        let ledger = host.ledger();
        let frame = *ledger.borrow().last_frame().unwrap();
        assert_eq!(frame.mesh.map(|m| m.index_count), Some(3));
        assert_ne!(
            frame.uniform.mesh_model,
            glam::Mat4::IDENTITY.to_cols_array_2d()
        );
        assert_eq!(ledger.borrow().live_of_kind(BufferKind::Index), 1);
        let stats = manager.stats(handle).unwrap();
        assert_eq!(stats.model, ModelStatus::Loaded);
        assert_eq!(stats.live_buffers, 5);

        assert!(manager.detach(handle));
        assert_eq!(ledger.borrow().live_buffers(), 0);
    }

    #[test]
    fn model_failure_keeps_particles_running() {
        let loader = ManualLoader::default();
        let mut manager = manager().with_model_loader(loader.clone());
        let host = HeadlessHost::new(320, 240);
        let handle = manager.attach(host.clone(), &model_config()).unwrap();

        loader.reporters.borrow()[0].finish(Err(AssetLoadError::Fetch {
            url: "robot.glb".to_owned(),
            reason: "404".to_owned(),
        }));
        assert_eq!(run_frame(&mut manager, &host, handle), FrameOutcome::Drawn);
        let frame = *host.ledger().borrow().last_frame().unwrap();
        assert!(frame.mesh.is_none());
        assert!(frame.points.is_some());
        assert!(matches!(
            manager.stats(handle).unwrap().model,
            ModelStatus::Failed(_)
        ));
    }

    #[test]
    fn model_request_without_loader_is_ignored() {
        let mut manager = manager();
        let host = HeadlessHost::new(100, 100);
        let handle = manager.attach(host, &model_config()).unwrap();
        assert_eq!(
            manager.stats(handle).unwrap().model,
            ModelStatus::NotRequested
        );
    }

    #[test]
    fn failed_buffer_upload_rolls_back() {
        let mut manager = manager();
        let host = HeadlessHost::new(100, 100);
        let ledger = host.ledger();
        ledger.borrow_mut().set_buffer_budget(Some(1));

        assert!(manager.attach(host.clone(), &config()).is_err());
        assert_eq!(host.surface_count(), 0);
        assert_eq!(manager.live_sessions(), 0);
        let ledger = ledger.borrow();
        assert_eq!(ledger.live_buffers(), 0);
        assert_eq!(ledger.devices_released(), 1);
    }

    #[test]
    fn failed_model_request_rolls_back() {
        let mut manager = manager().with_model_loader(FailingLoader);
        let host = HeadlessHost::new(100, 100);
        assert!(matches!(
            manager.attach(host.clone(), &model_config()),
            Err(SceneryError::ThreadSpawn(_))
        ));
        assert_eq!(host.surface_count(), 0);
        assert_eq!(host.ledger().borrow().live_buffers(), 0);
        assert_eq!(manager.viewport().listener_count(), 0);
        assert_eq!(host.pending_frames(), 0);
    }

    #[test]
    fn refused_mount_leaves_no_session() {
        let mut manager = manager();
        let host = HeadlessHost::new(100, 100);
        host.refuse_mounts(true);
        assert!(matches!(
            manager.attach(host.clone(), &config()),
            Err(SceneryError::Host(_))
        ));
        assert_eq!(manager.live_sessions(), 0);
        assert_eq!(host.ledger().borrow().devices_created(), 0);
    }

    #[test]
    fn surface_removed_by_page_is_tolerated() {
        let mut manager = manager();
        let host = HeadlessHost::new(100, 100);
        let handle = manager.attach(host.clone(), &config()).unwrap();
        host.remove_surfaces_externally();
        assert!(manager.detach(handle));
        assert_eq!(host.ledger().borrow().live_buffers(), 0);
    }

    #[test]
    fn lost_surface_is_reconfigured_and_loop_continues() {
        let mut manager = manager();
        let host = HeadlessHost::new(400, 300);
        let handle = manager.attach(host.clone(), &config()).unwrap();
        host.set_bounds(500, 250);
        host.ledger()
            .borrow_mut()
            .queue_draw_failure(DrawError::Lost);

        assert_eq!(
            run_frame(&mut manager, &host, handle),
            FrameOutcome::DrawFailed(DrawError::Lost)
        );
        assert_eq!(host.pending_frames(), 1);
        let stats = manager.stats(handle).unwrap();
        assert_eq!(stats.surface_size, (500, 250));
        assert_eq!(stats.aspect, 2.0);

        host.ledger()
            .borrow_mut()
            .queue_draw_failure(DrawError::Timeout);
        assert_eq!(
            run_frame(&mut manager, &host, handle),
            FrameOutcome::DrawFailed(DrawError::Timeout)
        );
        assert_eq!(run_frame(&mut manager, &host, handle), FrameOutcome::Drawn);
    }

    #[test]
    fn pointer_drag_orbits_camera_on_next_frame() {
        let mut manager = manager();
        let host = HeadlessHost::new(400, 400);
        let handle = manager.attach(host.clone(), &config()).unwrap();
        let input = host.input().unwrap();

        let _ = input.dispatch(&InputEvent::PointerMoved { x: 0.0, y: 0.0 });
        let _ = input.dispatch(&InputEvent::PointerButton {
            button: MouseButton::Left,
            pressed: true,
        });
        let _ = input.dispatch(&InputEvent::PointerMoved { x: 100.0, y: 0.0 });
        let before = manager.camera(handle).unwrap().eye;
        let _ = run_frame(&mut manager, &host, handle);
        let after = manager.camera(handle).unwrap().eye;
        assert_ne!(before, after);
        assert!((after.length() - 5.0).abs() < 1e-4);

        assert!(manager.detach(handle));
        assert_eq!(
            input.dispatch(&InputEvent::PointerMoved { x: 5.0, y: 5.0 }),
            0
        );
    }

    #[test]
    fn dropping_manager_detaches_everything() {
        let host = HeadlessHost::new(100, 100);
        {
            let mut manager = manager();
            let _ = manager.attach(host.clone(), &config()).unwrap();
        }
        assert_eq!(host.surface_count(), 0);
        assert_eq!(host.ledger().borrow().live_buffers(), 0);
    }
}
