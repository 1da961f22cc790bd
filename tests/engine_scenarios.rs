//! End-to-end engine scenarios against the headless backend.
//!
//! Run with: cargo test --test engine_scenarios

use std::cell::RefCell;
use std::rc::Rc;

use orb_visualiser::backend::BackendOp;
use orb_visualiser::{
    CaptureDevice, Engine, EngineConfig, EngineError, EngineEvent, EngineState, FrameOutcome, ManualScheduler,
    NullBackend, RenderBackend,
};

type TestEngine = Engine<NullBackend, ManualScheduler>;

fn running(theme: &str, backend: NullBackend) -> TestEngine {
    let config = EngineConfig {
        theme: theme.to_string(),
        ..Default::default()
    };
    let mut engine = Engine::new(config, backend, ManualScheduler::new());
    engine.initialize().unwrap();
    engine.start().unwrap();
    engine
}

fn record_events(engine: &mut TestEngine) -> Rc<RefCell<Vec<EngineEvent>>> {
    let events = Rc::new(RefCell::new(Vec::new()));
    let sink = events.clone();
    engine.set_event_listener(move |event| sink.borrow_mut().push(event.clone()));
    events
}

struct DeniedMicrophone;

impl CaptureDevice for DeniedMicrophone {
    fn open(&mut self) -> Result<(), EngineError> {
        Err(EngineError::PermissionDenied("user dismissed the prompt".into()))
    }

    fn read_frequency_data(&mut self, _bins: &mut [u8]) {
        panic!("read from a device that never opened");
    }

    fn close(&mut self) {}
}

struct BrokenMicrophone;

impl CaptureDevice for BrokenMicrophone {
    fn open(&mut self) -> Result<(), EngineError> {
        Err(EngineError::Frame("driver returned garbage".into()))
    }

    fn read_frequency_data(&mut self, _bins: &mut [u8]) {}

    fn close(&mut self) {}
}

struct LoudMicrophone;

impl CaptureDevice for LoudMicrophone {
    fn open(&mut self) -> Result<(), EngineError> {
        Ok(())
    }

    fn read_frequency_data(&mut self, bins: &mut [u8]) {
        bins.fill(255);
    }

    fn close(&mut self) {}
}

#[test]
fn test_emotion_transition_eases_into_target() {
    let mut engine = running("cyberpunk", NullBackend::new());
    engine.set_emotion("excited", 1000.0).unwrap();

    engine.tick(0.0);
    engine.tick(500.0);
    engine.tick(1000.0);
    engine.tick(1500.0);

    let intensity: Vec<f32> = engine.backend().frames.iter().map(|f| f.emotion_intensity).collect();
    assert!((intensity[0] - 0.2).abs() < 1e-5);
    // Ease-out cubic puts the midpoint well past halfway.
    assert!((intensity[1] - 0.9).abs() < 1e-4);
    assert!((intensity[2] - 1.0).abs() < 1e-5);
    assert!((intensity[3] - 1.0).abs() < 1e-5);
    assert_eq!(engine.current_emotion(), "excited");
    assert_eq!(engine.frame_state().frame_index, 3);

    let bloom: Vec<f32> = engine.backend().frames.iter().map(|f| f.bloom_strength).collect();
    assert!(bloom[2] > bloom[0]);
}

#[test]
fn test_denied_microphone_keeps_rendering_silently() {
    let mut engine = running("default", NullBackend::new());
    let events = record_events(&mut engine);

    engine.attach_audio(Box::new(DeniedMicrophone));
    for i in 0..3 {
        assert_eq!(engine.tick(i as f64 * 16.0), FrameOutcome::Presented);
    }

    assert_eq!(engine.audio_level(), 0.0);
    assert!(engine.backend().frames.iter().all(|f| f.audio_level == 0.0));
    let events = events.borrow();
    assert!(events
        .iter()
        .any(|e| matches!(e, EngineEvent::AudioUnavailable(EngineError::PermissionDenied(_)))));
}

#[test]
fn test_loud_input_is_clamped() {
    let config = EngineConfig {
        audio_gain: 4.0,
        ..Default::default()
    };
    let mut engine = Engine::new(config, NullBackend::new(), ManualScheduler::new());
    engine.initialize().unwrap();
    engine.attach_audio(Box::new(LoudMicrophone));
    engine.start().unwrap();
    engine.tick(0.0);

    assert_eq!(engine.audio_level(), 1.0);
    assert_eq!(engine.backend().frames[0].audio_level, 1.0);
}

#[test]
fn test_unknown_theme_leaves_active_theme() {
    let mut engine = running("neural", NullBackend::new());
    engine.tick(0.0);

    let err = engine.change_theme("vaporwave").unwrap_err();
    assert_eq!(err, EngineError::UnknownTheme("vaporwave".into()));
    engine.tick(16.0);

    assert_eq!(engine.current_theme(), "neural");
    let last = engine.backend().frames.last().unwrap();
    assert_eq!(last.program_theme, "neural");
    assert_eq!(last.particle_theme, Some("neural"));
}

#[test]
fn test_stop_is_idempotent() {
    let mut engine = running("quantum", NullBackend::new());
    let events = record_events(&mut engine);
    engine.tick(0.0);

    engine.stop();
    engine.stop();

    assert_eq!(engine.state(), EngineState::Disposed);
    assert_eq!(engine.backend().render_target_releases(), 1);
    assert_eq!(engine.backend().live_buffer_count(), 0);
    assert_eq!(engine.backend().live_program_count(), 0);
    assert_eq!(engine.backend().released_buffer_count(), 1);
    assert_eq!(engine.backend().released_program_count(), 1);
    assert!(!engine.scheduler().has_pending());
    let disposed = events.borrow().iter().filter(|e| **e == EngineEvent::Disposed).count();
    assert_eq!(disposed, 1);
}

#[test]
fn test_repeated_theme_switches_do_not_leak() {
    let mut engine = running("default", NullBackend::new());
    let themes = ["matrix", "matrix", "ethereal", "hologram", "matrix", "fractal"];
    for (i, theme) in themes.iter().enumerate() {
        engine.change_theme(theme).unwrap();
        engine.tick(i as f64 * 16.0);
        assert_eq!(engine.backend().live_buffer_count(), 1);
        assert_eq!(engine.backend().live_program_count(), 1);
    }
    assert_eq!(engine.current_theme(), "fractal");
}

#[test]
fn test_program_and_particles_switch_together() {
    let mut engine = running("default", NullBackend::new());
    let themes = ["cyberpunk", "matrix", "neural", "quantum", "fractal", "ethereal", "hologram", "default"];
    for (i, theme) in themes.iter().enumerate() {
        engine.change_theme(theme).unwrap();
        engine.tick(i as f64 * 16.0);
    }
    for frame in &engine.backend().frames {
        assert_eq!(Some(frame.program_theme), frame.particle_theme);
    }
}

#[test]
fn test_failed_theme_compile_falls_back_to_default() {
    let mut backend = NullBackend::new();
    backend.fail_compile_for("matrix");
    let mut engine = running("neural", backend);
    let events = record_events(&mut engine);

    engine.change_theme("matrix").unwrap();
    assert_eq!(engine.tick(0.0), FrameOutcome::Presented);

    assert_eq!(engine.current_theme(), "default");
    assert_eq!(engine.backend().live_program_count(), 1);
    assert!(events.borrow().iter().any(|e| matches!(
        e,
        EngineEvent::ShaderFallback { requested, .. } if requested == "matrix"
    )));
}

#[test]
fn test_queued_theme_switches_compile_once() {
    let mut engine = running("default", NullBackend::new());
    engine.tick(0.0);
    let ops_before = engine.backend().ops.len();

    for theme in ["cyberpunk", "matrix", "neural", "quantum", "fractal", "ethereal", "hologram"] {
        engine.change_theme(theme).unwrap();
    }
    engine.tick(16.0);

    let ops = &engine.backend().ops[ops_before..];
    let compiles = ops.iter().filter(|op| matches!(op, BackendOp::CompileProgram { .. })).count();
    let buffers = ops.iter().filter(|op| matches!(op, BackendOp::CreateBuffer { .. })).count();
    assert_eq!(compiles, 1);
    assert_eq!(buffers, 1);
    assert_eq!(engine.current_theme(), "hologram");
    assert_eq!(engine.backend().live_buffer_count(), 1);
}

#[test]
fn test_capture_failures_are_reported_as_audio_errors() {
    let mut engine = running("default", NullBackend::new());
    let events = record_events(&mut engine);

    engine.attach_audio(Box::new(BrokenMicrophone));
    assert_eq!(engine.tick(0.0), FrameOutcome::Presented);

    let events = events.borrow();
    let unavailable: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            EngineEvent::AudioUnavailable(err) => Some(err),
            _ => None,
        })
        .collect();
    assert_eq!(unavailable.len(), 1);
    assert!(unavailable[0].is_audio());
    assert!(matches!(unavailable[0], EngineError::DeviceUnavailable(_)));
}
