//! Browser bindings.
//!
//! [`WebScenes`] is the JavaScript-facing entry point: one instance per
//! page, owning the GPU device, the window resize listener and every scene
//! attached to a DOM element. Each attach appends one `<canvas>` to the
//! element; detach removes it together with its pointer listeners and any
//! pending animation frame.
//!
//! ```js
//! const scenes = await WebScenes.create();
//! const config = '{"enableModel":true,"modelURL":"robot.glb"}';
//! const handle = scenes.attach(document.getElementById("hero"), config);
//! // later, when the element goes away
//! scenes.detach(handle);
//! ```

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use wasm_bindgen::prelude::{wasm_bindgen, Closure, JsValue};
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::JsFuture;

use crate::engine::{SceneHandle, SceneLifecycleManager, ViewportResize};
use crate::error::SceneryError;
use crate::events::EventSource;
use crate::gpu::device::{BufferDesc, BufferId, DrawError, FrameDraw, GpuDevice};
use crate::gpu::render_context::{GpuInstance, RenderContext};
use crate::host::{FrameTicket, HostElement, HostId, MountedSurface, SurfaceId};
use crate::input::{InputEvent, MouseButton};
use crate::loader::{AssetLoadError, ModelLoader, PendingModel};
use crate::options::SceneConfig;
use crate::renderer::WgpuRenderer;

type SharedManager = Rc<RefCell<SceneLifecycleManager<CanvasHost>>>;
type CanvasSlot = Rc<RefCell<Option<MountedCanvas>>>;
type PointerTranslator = fn(&web_sys::Event) -> Option<InputEvent>;

static NEXT_HOST: AtomicU64 = AtomicU64::new(1);
static NEXT_CANVAS: AtomicU64 = AtomicU64::new(1);

fn js_error(e: &SceneryError) -> JsValue {
    JsValue::from_str(&e.to_string())
}

fn host_error(what: &str, e: &JsValue) -> SceneryError {
    SceneryError::Host(format!("{what}: {e:?}"))
}

fn window() -> Result<web_sys::Window, SceneryError> {
    web_sys::window().ok_or_else(|| SceneryError::Host("no global window".to_owned()))
}

#[wasm_bindgen(start)]
fn start() {
    console_error_panic_hook::set_once();
    let _ = console_log::init_with_level(log::Level::Info);
}

// ── Canvas device ────────────────────────────────────────────────────────

/// Keeps the canvas backing store in step with the surface size.
struct CanvasDevice {
    canvas: web_sys::HtmlCanvasElement,
    inner: WgpuRenderer,
}

impl GpuDevice for CanvasDevice {
    fn create_buffer(&mut self, desc: &BufferDesc<'_>) -> Result<BufferId, SceneryError> {
        self.inner.create_buffer(desc)
    }

    fn destroy_buffer(&mut self, id: BufferId) -> bool {
        self.inner.destroy_buffer(id)
    }

    fn live_buffer_count(&self) -> usize {
        self.inner.live_buffer_count()
    }

    fn resize(&mut self, width: u32, height: u32) {
        if width > 0 && height > 0 {
            self.canvas.set_width(width);
            self.canvas.set_height(height);
        }
        self.inner.resize(width, height);
    }

    fn size(&self) -> (u32, u32) {
        self.inner.size()
    }

    fn draw(&mut self, frame: &FrameDraw) -> Result<(), DrawError> {
        self.inner.draw(frame)
    }

    fn release(&mut self) {
        self.inner.release();
    }
}

// ── Host ─────────────────────────────────────────────────────────────────

struct MountedCanvas {
    id: SurfaceId,
    canvas: web_sys::HtmlCanvasElement,
    listeners: Vec<(&'static str, js_sys::Function)>,
    /// Reused for every animation frame; freed with the canvas.
    frame_callback: Closure<dyn FnMut()>,
    /// Ticket the next animation frame answers.
    frame_ticket: Rc<Cell<Option<FrameTicket>>>,
    frame_request: Option<i32>,
}

impl MountedCanvas {
    fn remove(&mut self) -> bool {
        for (event, callback) in self.listeners.drain(..) {
            let _ = self
                .canvas
                .remove_event_listener_with_callback(event, &callback);
        }
        if let Some(request) = self.frame_request.take() {
            if let Ok(window) = window() {
                let _ = window.cancel_animation_frame(request);
            }
        }
        let attached = self.canvas.parent_node().is_some();
        self.canvas.remove();
        attached
    }
}

/// A DOM element acting as a host element.
#[derive(Clone)]
pub struct CanvasHost {
    id: HostId,
    element: web_sys::HtmlElement,
    gpu: Rc<GpuInstance>,
    manager: Weak<RefCell<SceneLifecycleManager<CanvasHost>>>,
    mounted: CanvasSlot,
}

fn pointer_position(event: &web_sys::MouseEvent) -> InputEvent {
    let ratio = web_sys::window().map_or(1.0, |w| w.device_pixel_ratio());
    InputEvent::PointerMoved {
        x: (f64::from(event.offset_x()) * ratio) as f32,
        y: (f64::from(event.offset_y()) * ratio) as f32,
    }
}

/// DOM wheel deltas are pixels, positive when scrolling down.
fn wheel_delta(event: &web_sys::WheelEvent) -> f32 {
    (-event.delta_y() * 0.01) as f32
}

impl CanvasHost {
    fn listen(
        canvas: &web_sys::HtmlCanvasElement,
        input: &EventSource<InputEvent>,
    ) -> Result<Vec<(&'static str, js_sys::Function)>, SceneryError> {
        let translators: [(&'static str, PointerTranslator); 5] = [
            ("pointerdown", |e| {
                e.dyn_ref::<web_sys::MouseEvent>().map(|m| InputEvent::PointerButton {
                    button: MouseButton::from_dom_index(m.button()),
                    pressed: true,
                })
            }),
            ("pointerup", |e| {
                e.dyn_ref::<web_sys::MouseEvent>().map(|m| InputEvent::PointerButton {
                    button: MouseButton::from_dom_index(m.button()),
                    pressed: false,
                })
            }),
            ("pointermove", |e| e.dyn_ref::<web_sys::MouseEvent>().map(pointer_position)),
            ("pointerleave", |_| Some(InputEvent::PointerLeft)),
            ("wheel", |e| {
                e.dyn_ref::<web_sys::WheelEvent>()
                    .map(|w| InputEvent::Wheel { delta: wheel_delta(w) })
            }),
        ];

        let mut listeners = Vec::with_capacity(translators.len());
        for (event, translate) in translators {
            let source = input.clone();
            let callback = Closure::<dyn FnMut(web_sys::Event)>::new(
                move |e: web_sys::Event| {
                    if let Some(input) = translate(&e) {
                        let _ = source.dispatch(&input);
                    }
                },
            )
            .into_js_value()
            .unchecked_into::<js_sys::Function>();
            canvas
                .add_event_listener_with_callback(event, &callback)
                .map_err(|e| host_error("failed to add listener", &e))?;
            listeners.push((event, callback));
        }
        Ok(listeners)
    }

    /// Animation-frame callback of surface `id`. It only holds weak
    /// references, so it never keeps the manager or the canvas alive.
    fn frame_callback(
        &self,
        id: SurfaceId,
        ticket: Rc<Cell<Option<FrameTicket>>>,
    ) -> Closure<dyn FnMut()> {
        let manager = self.manager.clone();
        let slot = Rc::downgrade(&self.mounted);
        Closure::new(move || {
            if let Some(slot) = slot.upgrade() {
                if let Some(canvas) = slot.borrow_mut().as_mut() {
                    canvas.frame_request = None;
                }
            }
            let Some(ticket) = ticket.take() else {
                return;
            };
            let Some(manager) = manager.upgrade() else {
                return;
            };
            let Ok(mut manager) = manager.try_borrow_mut() else {
                return;
            };
            if let Some(handle) = manager.handle_for_surface(id) {
                let _ = manager.frame(handle, ticket);
            }
        })
    }

    fn create_canvas(
        &self,
        width: u32,
        height: u32,
    ) -> Result<web_sys::HtmlCanvasElement, SceneryError> {
        let document = self
            .element
            .owner_document()
            .ok_or_else(|| SceneryError::Host("element has no document".to_owned()))?;
        let canvas = document
            .create_element("canvas")
            .map_err(|e| host_error("failed to create canvas", &e))?
            .dyn_into::<web_sys::HtmlCanvasElement>()
            .map_err(|_| SceneryError::Host("created element is not a canvas".to_owned()))?;
        canvas.set_width(width);
        canvas.set_height(height);
        let style = canvas.style();
        let _ = style.set_property("display", "block");
        let _ = style.set_property("width", "100%");
        let _ = style.set_property("height", "100%");
        let _ = style.set_property("touch-action", "none");
        let _ = self
            .element
            .append_child(&canvas)
            .map_err(|e| host_error("failed to append canvas", &e))?;
        Ok(canvas)
    }
}

impl HostElement for CanvasHost {
    fn host_id(&self) -> HostId {
        self.id
    }

    fn bounds(&self) -> (u32, u32) {
        let ratio = web_sys::window().map_or(1.0, |w| w.device_pixel_ratio());
        let scale = |css: i32| (f64::from(css.max(0)) * ratio).round() as u32;
        (
            scale(self.element.client_width()),
            scale(self.element.client_height()),
        )
    }

    fn mount_surface(&self, width: u32, height: u32) -> Result<MountedSurface, SceneryError> {
        if self.mounted.borrow().is_some() {
            return Err(SceneryError::Host("element already holds a canvas".to_owned()));
        }
        let canvas = self.create_canvas(width, height)?;
        let input = EventSource::new();
        let prepared = RenderContext::for_target(
            &self.gpu,
            wgpu::SurfaceTarget::Canvas(canvas.clone()),
            (width, height),
        )
        .map_err(SceneryError::from)
        .and_then(WgpuRenderer::new)
        .and_then(|renderer| Ok((renderer, Self::listen(&canvas, &input)?)));
        let (renderer, listeners) = match prepared {
            Ok(prepared) => prepared,
            Err(e) => {
                canvas.remove();
                return Err(e);
            }
        };

        let id = SurfaceId(NEXT_CANVAS.fetch_add(1, Ordering::Relaxed));
        let frame_ticket = Rc::new(Cell::new(None));
        let frame_callback = self.frame_callback(id, Rc::clone(&frame_ticket));
        *self.mounted.borrow_mut() = Some(MountedCanvas {
            id,
            canvas: canvas.clone(),
            listeners,
            frame_callback,
            frame_ticket,
            frame_request: None,
        });
        Ok(MountedSurface {
            id,
            device: Box::new(CanvasDevice {
                canvas,
                inner: renderer,
            }),
            input,
        })
    }

    fn unmount_surface(&self, id: SurfaceId) -> bool {
        let taken = {
            let mut mounted = self.mounted.borrow_mut();
            if mounted.as_ref().is_some_and(|m| m.id == id) {
                mounted.take()
            } else {
                None
            }
        };
        taken.is_some_and(|mut canvas| canvas.remove())
    }

    fn request_frame(&self, id: SurfaceId, ticket: FrameTicket) {
        let mut mounted = self.mounted.borrow_mut();
        let Some(canvas) = mounted.as_mut().filter(|m| m.id == id) else {
            return;
        };
        // A frame already requested from the browser answers the newest ticket.
        canvas.frame_ticket.set(Some(ticket));
        if canvas.frame_request.is_some() {
            return;
        }
        let Ok(window) = window() else {
            return;
        };
        let callback = canvas.frame_callback.as_ref().unchecked_ref();
        match window.request_animation_frame(callback) {
            Ok(request) => canvas.frame_request = Some(request),
            Err(e) => log::error!("requestAnimationFrame failed: {e:?}"),
        }
    }
}

// ── Model loading ────────────────────────────────────────────────────────

/// Fetches models with the browser's `fetch` on the page's event loop.
pub struct FetchModelLoader;

async fn fetch_bytes(url: &str) -> Result<Vec<u8>, AssetLoadError> {
    let fetch_err = |reason: String| AssetLoadError::Fetch {
        url: url.to_owned(),
        reason,
    };
    let window = web_sys::window().ok_or_else(|| fetch_err("no global window".to_owned()))?;
    let response = JsFuture::from(window.fetch_with_str(url))
        .await
        .map_err(|e| fetch_err(format!("{e:?}")))?
        .dyn_into::<web_sys::Response>()
        .map_err(|_| fetch_err("fetch did not return a Response".to_owned()))?;
    if !response.ok() {
        return Err(fetch_err(format!("HTTP {}", response.status())));
    }
    let buffer = response
        .array_buffer()
        .map_err(|e| fetch_err(format!("{e:?}")))?;
    let buffer = JsFuture::from(buffer)
        .await
        .map_err(|e| fetch_err(format!("{e:?}")))?;
    Ok(js_sys::Uint8Array::new(&buffer).to_vec())
}

impl ModelLoader for FetchModelLoader {
    fn load(&self, url: &str) -> Result<PendingModel, SceneryError> {
        let (pending, reporter) = PendingModel::channel(url);
        let url = url.to_owned();
        wasm_bindgen_futures::spawn_local(async move {
            let fetched = fetch_bytes(&url).await;
            if reporter.is_cancelled() {
                return;
            }
            reporter.progress(1.0);
            reporter.decode_and_finish(fetched);
        });
        Ok(pending)
    }
}

// ── JS entry point ───────────────────────────────────────────────────────

/// Page-wide scene registry exported to JavaScript.
#[wasm_bindgen]
pub struct WebScenes {
    gpu: Rc<GpuInstance>,
    manager: SharedManager,
    viewport: EventSource<ViewportResize>,
    hosts: Vec<(web_sys::HtmlElement, HostId, CanvasSlot)>,
    on_resize: Option<js_sys::Function>,
}

#[wasm_bindgen]
impl WebScenes {
    /// Request the GPU and start listening for window resizes.
    ///
    /// # Errors
    ///
    /// Rejects if no GPU adapter or device is available.
    pub async fn create() -> Result<WebScenes, JsValue> {
        let gpu = GpuInstance::new()
            .await
            .map_err(|e| js_error(&SceneryError::from(e)))?;
        let viewport = EventSource::new();
        let manager = Rc::new(RefCell::new(
            SceneLifecycleManager::new(viewport.clone()).with_model_loader(FetchModelLoader),
        ));

        let source = viewport.clone();
        let on_resize = Closure::<dyn FnMut()>::new(move || {
            let Some(window) = web_sys::window() else {
                return;
            };
            let dimension = |v: Result<JsValue, JsValue>| {
                v.ok().and_then(|v| v.as_f64()).map_or(0, |v| v as u32)
            };
            let _ = source.dispatch(&ViewportResize {
                width: dimension(window.inner_width()),
                height: dimension(window.inner_height()),
            });
        })
        .into_js_value()
        .unchecked_into::<js_sys::Function>();
        window()
            .and_then(|w| {
                w.add_event_listener_with_callback("resize", &on_resize)
                    .map_err(|e| host_error("failed to add resize listener", &e))
            })
            .map_err(|e| js_error(&e))?;

        Ok(Self {
            gpu: Rc::new(gpu),
            manager,
            viewport,
            hosts: Vec::new(),
            on_resize: Some(on_resize),
        })
    }

    /// Mount a scene into `element`, configured by a JSON object (camelCase
    /// keys, all optional; empty for defaults). Returns the scene handle.
    ///
    /// # Errors
    ///
    /// Throws if the configuration does not parse or the scene cannot be
    /// mounted; nothing is left in the element in that case.
    pub fn attach(
        &mut self,
        element: web_sys::HtmlElement,
        config_json: &str,
    ) -> Result<f64, JsValue> {
        let config = if config_json.trim().is_empty() {
            SceneConfig::default()
        } else {
            SceneConfig::from_json(config_json).map_err(|e| js_error(&e))?
        };
        let host = self.host_for(element);
        let attached = match self.manager.try_borrow_mut() {
            Ok(mut manager) => manager.attach(host, &config).map_err(|e| js_error(&e)),
            Err(_) => Err(JsValue::from_str("attach called during a frame")),
        };
        if attached.is_err() {
            self.forget_unused_hosts();
        }
        attached.map(|handle| handle.raw() as f64)
    }

    /// Unmount a scene. Returns `false` if it was not attached.
    pub fn detach(&mut self, handle: f64) -> bool {
        let handle = SceneHandle::from_raw(handle as u64);
        let detached = self
            .manager
            .try_borrow_mut()
            .is_ok_and(|mut manager| manager.detach(handle));
        self.forget_unused_hosts();
        detached
    }

    /// Whether `handle` is attached.
    #[wasm_bindgen(js_name = isAttached)]
    pub fn is_attached(&self, handle: f64) -> bool {
        self.manager
            .try_borrow()
            .is_ok_and(|m| m.is_attached(SceneHandle::from_raw(handle as u64)))
    }

    /// Scene diagnostics as a JSON string, or `undefined` when detached.
    pub fn stats(&self, handle: f64) -> Option<String> {
        let stats = self
            .manager
            .try_borrow()
            .ok()?
            .stats(SceneHandle::from_raw(handle as u64))?;
        Some(
            serde_json::json!({
                "frames": stats.frames,
                "fps": stats.fps,
                "liveBuffers": stats.live_buffers,
                "particles": stats.particles,
                "model": format!("{:?}", stats.model),
                "width": stats.surface_size.0,
                "height": stats.surface_size.1,
            })
            .to_string(),
        )
    }

    /// Detach every scene and stop listening for window resizes.
    pub fn dispose(&mut self) {
        if let Ok(mut manager) = self.manager.try_borrow_mut() {
            let _ = manager.detach_all();
        }
        self.hosts.clear();
        if let (Some(callback), Ok(window)) = (self.on_resize.take(), window()) {
            let _ = window.remove_event_listener_with_callback("resize", &callback);
        }
        log::debug!("{} resize listeners left", self.viewport.listener_count());
    }
}

impl WebScenes {
    fn host_for(&mut self, element: web_sys::HtmlElement) -> CanvasHost {
        let (id, mounted) = match self.hosts.iter().find(|(e, _, _)| *e == element) {
            Some((_, id, mounted)) => (*id, Rc::clone(mounted)),
            None => {
                let id = HostId(NEXT_HOST.fetch_add(1, Ordering::Relaxed));
                let mounted: CanvasSlot = Rc::new(RefCell::new(None));
                self.hosts.push((element.clone(), id, Rc::clone(&mounted)));
                (id, mounted)
            }
        };
        CanvasHost {
            id,
            element,
            gpu: Rc::clone(&self.gpu),
            manager: Rc::downgrade(&self.manager),
            mounted,
        }
    }

    fn forget_unused_hosts(&mut self) {
        let Ok(manager) = self.manager.try_borrow() else {
            return;
        };
        self.hosts.retain(|(_, id, _)| manager.handle_for(*id).is_some());
    }
}

impl Drop for WebScenes {
    fn drop(&mut self) {
        self.dispose();
    }
}
