//! Audio analysis bridge.
//!
//! A [`CaptureDevice`] fills an analyser-style frequency buffer (one byte per
//! bin, 0..=255). The bridge averages that buffer into a single normalized
//! level every frame. Acquisition is the only step that can fail; after a
//! failure the bridge keeps reporting 0 so the orb renders silent visuals.

use crate::error::EngineError;

/// Frequency bins per read, matching a 256-point analyser.
pub const FREQUENCY_BIN_COUNT: usize = 128;

/// Largest magnitude a bin can report.
pub const MAX_BIN_MAGNITUDE: f32 = 255.0;

/// Source of frequency-magnitude data.
///
/// `open` performs the (possibly permission-gated) acquisition. Once open,
/// `read_frequency_data` must not block or allocate.
pub trait CaptureDevice {
    fn open(&mut self) -> Result<(), EngineError>;

    /// Overwrite `bins` with the latest magnitudes.
    fn read_frequency_data(&mut self, bins: &mut [u8]);

    /// Release the underlying device. Called at most once by the bridge.
    fn close(&mut self);

    fn name(&self) -> &str {
        "capture device"
    }
}

/// Average `bins`, normalize by the maximum bin magnitude, apply `gain` and
/// clamp to [0, 1].
pub fn normalize_level(bins: &[u8], gain: f32) -> f32 {
    if bins.is_empty() {
        return 0.0;
    }
    let sum: u32 = bins.iter().map(|&b| b as u32).sum();
    let mean = sum as f32 / bins.len() as f32;
    let level = mean / MAX_BIN_MAGNITUDE * gain;
    if level.is_nan() {
        0.0
    } else {
        level.clamp(0.0, 1.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BridgeState {
    /// No device attached yet.
    Idle,
    Live,
    /// Acquisition failed; level pinned at 0.
    Unavailable,
    Stopped,
}

pub struct AudioBridge {
    device: Option<Box<dyn CaptureDevice>>,
    bins: [u8; FREQUENCY_BIN_COUNT],
    gain: f32,
    level: f32,
    state: BridgeState,
}

impl AudioBridge {
    pub fn new(gain: f32) -> Self {
        Self {
            device: None,
            bins: [0; FREQUENCY_BIN_COUNT],
            gain: if gain.is_finite() { gain.max(0.0) } else { 1.0 },
            level: 0.0,
            state: BridgeState::Idle,
        }
    }

    /// Acquire `device`. On failure the device is dropped and the level
    /// stays at 0 for the bridge's lifetime.
    pub fn start(&mut self, mut device: Box<dyn CaptureDevice>) -> Result<(), EngineError> {
        if self.state == BridgeState::Stopped {
            return Err(EngineError::InvalidState {
                op: "start audio",
                state: "stopped".to_string(),
            });
        }
        // Replacing a live device releases it first.
        self.release();

        match device.open() {
            Ok(()) => {
                log::info!("Audio capture started on {}", device.name());
                self.device = Some(device);
                self.state = BridgeState::Live;
                Ok(())
            }
            Err(e) => {
                self.state = BridgeState::Unavailable;
                self.level = 0.0;
                Err(e)
            }
        }
    }

    /// Read the latest spectrum and return the normalized level.
    pub fn sample(&mut self) -> f32 {
        match self.device.as_mut() {
            Some(device) if self.state == BridgeState::Live => {
                device.read_frequency_data(&mut self.bins);
                self.level = normalize_level(&self.bins, self.gain);
            }
            _ => self.level = 0.0,
        }
        self.level
    }

    /// Release the capture device. Safe to call repeatedly.
    pub fn stop(&mut self) {
        self.release();
        self.state = BridgeState::Stopped;
        self.level = 0.0;
    }

    fn release(&mut self) {
        if let Some(mut device) = self.device.take() {
            device.close();
            log::info!("Audio capture released ({})", device.name());
        }
    }

    /// Level from the most recent `sample`.
    pub fn level(&self) -> f32 {
        self.level
    }

    pub fn state(&self) -> BridgeState {
        self.state
    }
}

impl Drop for AudioBridge {
    fn drop(&mut self) {
        self.release();
    }
}

/// Deterministic stand-in for a microphone: a slow sine envelope over a
/// falling spectrum. Used for offline rendering and simulations.
pub struct SyntheticCapture {
    phase: f32,
    step: f32,
    floor: f32,
    open: bool,
}

impl SyntheticCapture {
    /// `frames_per_cycle` reads make one full envelope cycle.
    pub fn new(frames_per_cycle: u32) -> Self {
        Self {
            phase: 0.0,
            step: std::f32::consts::TAU / frames_per_cycle.max(1) as f32,
            floor: 0.1,
            open: false,
        }
    }
}

impl CaptureDevice for SyntheticCapture {
    fn open(&mut self) -> Result<(), EngineError> {
        self.open = true;
        Ok(())
    }

    fn read_frequency_data(&mut self, bins: &mut [u8]) {
        if !self.open {
            bins.fill(0);
            return;
        }
        let envelope = self.floor + (1.0 - self.floor) * (0.5 + 0.5 * self.phase.sin());
        let count = bins.len().max(1) as f32;
        for (i, bin) in bins.iter_mut().enumerate() {
            let tilt = 1.0 - i as f32 / count;
            *bin = (envelope * tilt * MAX_BIN_MAGNITUDE).clamp(0.0, MAX_BIN_MAGNITUDE) as u8;
        }
        self.phase = (self.phase + self.step) % std::f32::consts::TAU;
    }

    fn close(&mut self) {
        self.open = false;
    }

    fn name(&self) -> &str {
        "synthetic envelope"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    struct FixedDevice {
        value: u8,
        closes: Rc<Cell<u32>>,
    }

    impl CaptureDevice for FixedDevice {
        fn open(&mut self) -> Result<(), EngineError> {
            Ok(())
        }
        fn read_frequency_data(&mut self, bins: &mut [u8]) {
            bins.fill(self.value);
        }
        fn close(&mut self) {
            self.closes.set(self.closes.get() + 1);
        }
    }

    struct DeniedDevice;

    impl CaptureDevice for DeniedDevice {
        fn open(&mut self) -> Result<(), EngineError> {
            Err(EngineError::PermissionDenied("NotAllowedError".into()))
        }
        fn read_frequency_data(&mut self, bins: &mut [u8]) {
            bins.fill(255);
        }
        fn close(&mut self) {}
    }

    #[test]
    fn test_normalize_is_clamped() {
        assert_eq!(normalize_level(&[255; 16], 10.0), 1.0);
        assert_eq!(normalize_level(&[0; 16], 10.0), 0.0);
        assert_eq!(normalize_level(&[], 1.0), 0.0);
        assert_eq!(normalize_level(&[128; 4], f32::NAN), 0.0);
        assert_eq!(normalize_level(&[128; 4], -3.0), 0.0);
        let half = normalize_level(&[0, 255], 1.0);
        assert!((half - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_level_bounds_for_all_byte_patterns() {
        let mut rng = 0x2545F4914F6CDD1Du64;
        let mut bins = [0u8; FREQUENCY_BIN_COUNT];
        for gain in [0.0, 0.5, 1.0, 4.0, 1000.0] {
            for _ in 0..50 {
                for b in bins.iter_mut() {
                    rng ^= rng << 13;
                    rng ^= rng >> 7;
                    rng ^= rng << 17;
                    *b = (rng >> 56) as u8;
                }
                let level = normalize_level(&bins, gain);
                assert!((0.0..=1.0).contains(&level));
            }
        }
    }

    #[test]
    fn test_denied_device_pins_level_at_zero() {
        let mut bridge = AudioBridge::new(1.0);
        let err = bridge.start(Box::new(DeniedDevice)).unwrap_err();
        assert!(matches!(err, EngineError::PermissionDenied(_)));
        assert_eq!(bridge.state(), BridgeState::Unavailable);
        for _ in 0..10 {
            assert_eq!(bridge.sample(), 0.0);
        }
    }

    #[test]
    fn test_sample_and_stop() {
        let closes = Rc::new(Cell::new(0));
        let mut bridge = AudioBridge::new(1.0);
        bridge
            .start(Box::new(FixedDevice { value: 51, closes: closes.clone() }))
            .unwrap();
        assert!((bridge.sample() - 0.2).abs() < 1e-6);

        bridge.stop();
        bridge.stop();
        assert_eq!(closes.get(), 1);
        assert_eq!(bridge.sample(), 0.0);
        assert!(bridge.start(Box::new(DeniedDevice)).is_err());
    }

    #[test]
    fn test_synthetic_capture_cycles() {
        let mut bridge = AudioBridge::new(1.0);
        bridge.start(Box::new(SyntheticCapture::new(60))).unwrap();
        let levels: Vec<f32> = (0..60).map(|_| bridge.sample()).collect();
        let max = levels.iter().cloned().fold(0.0, f32::max);
        let min = levels.iter().cloned().fold(1.0, f32::min);
        assert!(max > min);
        assert!(levels.iter().all(|l| (0.0..=1.0).contains(l)));
    }
}
