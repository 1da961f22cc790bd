use std::cell::RefCell;
use std::rc::{Rc, Weak};

use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::JsFuture;
use web_sys::{AnalyserNode, AudioContext, DomException, HtmlCanvasElement, MediaStream, MediaStreamConstraints};

use crate::audio::{CaptureDevice, FREQUENCY_BIN_COUNT};
use crate::config::{EngineConfig, VisualizationMode};
use crate::engine::Engine;
use crate::error::EngineError;
use crate::gpu::renderer::WgpuBackend;
use crate::scheduler::{FrameHandle, FrameScheduler};

type OrbEngine = Engine<WgpuBackend, RafScheduler>;
type FrameCallback = Rc<RefCell<Option<Closure<dyn FnMut(f64)>>>>;

#[wasm_bindgen]
pub fn init_panic_hook() {
    console_error_panic_hook::set_once();
    let _ = console_log::init_with_level(log::Level::Info);
}

fn js_error(e: impl std::fmt::Display) -> JsValue {
    JsValue::from_str(&e.to_string())
}

/// Schedules ticks with `requestAnimationFrame`.
pub struct RafScheduler {
    callback: FrameCallback,
}

impl FrameScheduler for RafScheduler {
    fn request_frame(&mut self) -> FrameHandle {
        let callback = self.callback.borrow();
        let (Some(window), Some(closure)) = (web_sys::window(), callback.as_ref()) else {
            log::warn!("requestAnimationFrame unavailable");
            return FrameHandle(0);
        };
        match window.request_animation_frame(closure.as_ref().unchecked_ref()) {
            Ok(id) => FrameHandle(id as u64),
            Err(e) => {
                log::warn!("requestAnimationFrame failed: {:?}", e);
                FrameHandle(0)
            }
        }
    }

    fn cancel_frame(&mut self, handle: FrameHandle) {
        if let Some(window) = web_sys::window() {
            let _ = window.cancel_animation_frame(handle.0 as i32);
        }
    }
}

/// Microphone read through a Web Audio `AnalyserNode`.
struct WebMicrophone {
    context: AudioContext,
    analyser: AnalyserNode,
    stream: MediaStream,
}

impl WebMicrophone {
    /// Prompt for microphone access and wire the stream into an analyser.
    async fn acquire() -> Result<Self, EngineError> {
        let devices = web_sys::window()
            .ok_or_else(|| EngineError::DeviceUnavailable("no window".into()))?
            .navigator()
            .media_devices()
            .map_err(|e| EngineError::DeviceUnavailable(format!("{:?}", e)))?;

        let constraints = MediaStreamConstraints::new();
        constraints.set_audio(&JsValue::TRUE);
        let promise = devices
            .get_user_media_with_constraints(&constraints)
            .map_err(|e| EngineError::DeviceUnavailable(format!("{:?}", e)))?;
        let stream: MediaStream = JsFuture::from(promise)
            .await
            .map_err(classify_media_error)?
            .dyn_into()
            .map_err(|_| EngineError::DeviceUnavailable("getUserMedia returned a non-stream".into()))?;

        let audio_err = |e: JsValue| EngineError::DeviceUnavailable(format!("{:?}", e));
        let context = AudioContext::new().map_err(audio_err)?;
        let analyser = context.create_analyser().map_err(audio_err)?;
        analyser.set_fft_size((FREQUENCY_BIN_COUNT * 2) as u32);
        let source = context.create_media_stream_source(&stream).map_err(audio_err)?;
        source.connect_with_audio_node(&analyser).map_err(audio_err)?;

        Ok(Self {
            context,
            analyser,
            stream,
        })
    }
}

fn classify_media_error(e: JsValue) -> EngineError {
    match e.dyn_ref::<DomException>() {
        Some(ex) if ex.name() == "NotAllowedError" || ex.name() == "SecurityError" => {
            EngineError::PermissionDenied(ex.message())
        }
        Some(ex) => EngineError::DeviceUnavailable(format!("{}: {}", ex.name(), ex.message())),
        None => EngineError::DeviceUnavailable(format!("{:?}", e)),
    }
}

impl CaptureDevice for WebMicrophone {
    fn open(&mut self) -> Result<(), EngineError> {
        Ok(())
    }

    fn read_frequency_data(&mut self, bins: &mut [u8]) {
        self.analyser.get_byte_frequency_data(bins);
    }

    fn close(&mut self) {
        for track in self.stream.get_tracks().iter() {
            if let Ok(track) = track.dyn_into::<web_sys::MediaStreamTrack>() {
                track.stop();
            }
        }
        let _ = self.context.close();
    }

    fn name(&self) -> &str {
        "web microphone"
    }
}

/// Stand-in for a microphone whose acquisition failed; reports the failure
/// on `open`.
struct FailedCapture(EngineError);

impl CaptureDevice for FailedCapture {
    fn open(&mut self) -> Result<(), EngineError> {
        Err(self.0.clone())
    }

    fn read_frequency_data(&mut self, bins: &mut [u8]) {
        bins.fill(0);
    }

    fn close(&mut self) {}
}

#[wasm_bindgen]
pub struct WasmOrb {
    engine: Rc<RefCell<OrbEngine>>,
    /// Keeps the animation frame closure alive.
    _callback: FrameCallback,
}

impl WasmOrb {
    fn with_engine<T>(&self, f: impl FnOnce(&mut OrbEngine) -> T) -> Result<T, JsValue> {
        let mut engine = self
            .engine
            .try_borrow_mut()
            .map_err(|_| JsValue::from_str("orb is busy rendering a frame"))?;
        Ok(f(&mut engine))
    }
}

#[wasm_bindgen]
impl WasmOrb {
    pub fn start(&self) -> Result<(), JsValue> {
        self.with_engine(|e| e.start())?.map_err(js_error)
    }

    pub fn stop(&self) -> Result<(), JsValue> {
        self.with_engine(|e| e.stop())
    }

    pub fn pulse(&self, intensity: f32, duration_ms: f64) -> Result<(), JsValue> {
        self.with_engine(|e| e.pulse(intensity, duration_ms))?.map_err(js_error)
    }

    pub fn set_glow(&self, intensity: f32) -> Result<(), JsValue> {
        self.with_engine(|e| e.set_glow(intensity))
    }

    pub fn change_theme(&self, theme_id: &str) -> Result<(), JsValue> {
        self.with_engine(|e| e.change_theme(theme_id))?.map_err(js_error)
    }

    pub fn set_emotion(&self, emotion_id: &str, duration_ms: Option<f64>) -> Result<(), JsValue> {
        self.with_engine(|e| {
            let duration = duration_ms.unwrap_or(e.config().emotion_transition_ms);
            e.set_emotion(emotion_id, duration)
        })?
        .map_err(js_error)
    }

    /// Returns `false` when the glitch pass is not available on this adapter.
    pub fn activate_glitch(&self, duration_ms: f64) -> Result<bool, JsValue> {
        self.with_engine(|e| e.activate_glitch(duration_ms))
    }

    pub fn get_current_theme(&self) -> Result<String, JsValue> {
        self.with_engine(|e| e.current_theme().to_string())
    }

    pub fn get_current_emotion(&self) -> Result<String, JsValue> {
        self.with_engine(|e| e.current_emotion().to_string())
    }

    pub fn get_audio_level(&self) -> Result<f32, JsValue> {
        self.with_engine(|e| e.audio_level())
    }

    pub fn resize(&self, width: u32, height: u32) -> Result<(), JsValue> {
        self.with_engine(|e| e.resize(width, height))
    }

    pub fn set_sphere_only(&self, sphere_only: bool) -> Result<(), JsValue> {
        let mode = if sphere_only {
            VisualizationMode::SphereOnly
        } else {
            VisualizationMode::Full
        };
        self.with_engine(|e| e.set_visualization_mode(mode))
    }

    pub fn set_base_color(&self, r: f32, g: f32, b: f32) -> Result<(), JsValue> {
        self.with_engine(|e| e.set_base_color([r, g, b]))
    }

    /// JSON snapshot of the GPU profile.
    pub fn get_gpu_profile_json(&self) -> Result<String, JsValue> {
        self.with_engine(|e| serde_json::to_string(e.gpu_profile()))?
            .map_err(js_error)
    }

    /// `listener(name, message)` receives engine events.
    pub fn set_event_listener(&self, listener: js_sys::Function) -> Result<(), JsValue> {
        self.with_engine(|e| {
            e.set_event_listener(move |event| {
                let name = JsValue::from_str(event.name());
                let message = JsValue::from_str(&event.message());
                if let Err(err) = listener.call2(&JsValue::NULL, &name, &message) {
                    log::warn!("Event listener threw: {:?}", err);
                }
            })
        })
    }
}

/// Build an orb on `canvas`. `config_json` is an optional partial engine
/// configuration. Resolves once the GPU is ready and microphone access has
/// been granted or refused; call `start` to begin animating.
#[wasm_bindgen]
pub async fn create_orb(canvas: HtmlCanvasElement, config_json: Option<String>) -> Result<WasmOrb, JsValue> {
    init_panic_hook();

    let config = match config_json {
        Some(json) => EngineConfig::from_json_str(&json).map_err(js_error)?,
        None => EngineConfig::default(),
    };
    let (width, height) = config.surface_size();
    canvas.set_width(width);
    canvas.set_height(height);

    let backend = WgpuBackend::new_canvas(canvas).await.map_err(js_error)?;
    let callback: FrameCallback = Rc::new(RefCell::new(None));
    let scheduler = RafScheduler {
        callback: callback.clone(),
    };

    let mut engine = Engine::new(config, backend, scheduler);
    engine.initialize().map_err(js_error)?;
    let engine = Rc::new(RefCell::new(engine));

    let weak: Weak<RefCell<OrbEngine>> = Rc::downgrade(&engine);
    *callback.borrow_mut() = Some(Closure::<dyn FnMut(f64)>::new(move |timestamp: f64| {
        let Some(engine) = weak.upgrade() else { return };
        let Ok(mut engine) = engine.try_borrow_mut() else {
            log::warn!("Skipping frame: orb already borrowed");
            return;
        };
        engine.tick(timestamp);
    }));

    let device: Box<dyn CaptureDevice> = match WebMicrophone::acquire().await {
        Ok(mic) => Box::new(mic),
        Err(e) => Box::new(FailedCapture(e)),
    };
    engine.borrow_mut().attach_audio(device);

    Ok(WasmOrb {
        engine,
        _callback: callback,
    })
}
