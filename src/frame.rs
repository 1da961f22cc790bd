//! Per-frame timing and audio bookkeeping.

use serde::Serialize;

/// Peak decay per frame.
const PEAK_DECAY: f32 = 0.95;
/// Exponential moving average factor for the running average.
const AVERAGE_ALPHA: f32 = 0.05;
/// Upper bound on a single step so a stalled host does not fling particles.
const MAX_DT: f32 = 0.1;

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameState {
    /// Host timestamp of this frame in milliseconds.
    pub time_ms: f64,
    /// Seconds since the first frame.
    pub elapsed_s: f64,
    /// Seconds since the previous frame, clamped to [0, 0.1].
    pub dt: f32,
    /// Zero on the first frame.
    pub frame_index: u64,
    /// Normalized audio level in [0, 1].
    pub audio_level: f32,
    pub peak_level: f32,
    pub average_level: f32,
    #[serde(skip)]
    start_ms: Option<f64>,
}

impl FrameState {
    /// Recompute for a new tick.
    pub fn advance(&mut self, now_ms: f64, audio_level: f32) {
        match self.start_ms {
            None => {
                self.start_ms = Some(now_ms);
                self.dt = 0.0;
                self.frame_index = 0;
            }
            Some(_) => {
                self.dt = (((now_ms - self.time_ms) / 1000.0) as f32).clamp(0.0, MAX_DT);
                self.frame_index += 1;
            }
        }
        self.time_ms = now_ms;
        self.elapsed_s = ((now_ms - self.start_ms.unwrap_or(now_ms)) / 1000.0).max(0.0);

        let level = if audio_level.is_nan() { 0.0 } else { audio_level.clamp(0.0, 1.0) };
        self.audio_level = level;
        self.peak_level = level.max(self.peak_level * PEAK_DECAY);
        self.average_level += (level - self.average_level) * AVERAGE_ALPHA;
    }

    /// Copy with the audio level replaced, for consumers that see the
    /// combined microphone and glow level.
    pub fn with_audio_level(&self, audio_level: f32) -> Self {
        Self { audio_level, ..*self }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_frame_has_zero_dt() {
        let mut frame = FrameState::default();
        frame.advance(5000.0, 0.5);
        assert_eq!(frame.dt, 0.0);
        assert_eq!(frame.elapsed_s, 0.0);
        assert_eq!(frame.frame_index, 0);
    }

    #[test]
    fn test_dt_and_elapsed() {
        let mut frame = FrameState::default();
        frame.advance(1000.0, 0.0);
        frame.advance(1016.0, 0.0);
        assert!((frame.dt - 0.016).abs() < 1e-6);
        frame.advance(3000.0, 0.0);
        assert_eq!(frame.dt, MAX_DT);
        assert!((frame.elapsed_s - 2.0).abs() < 1e-9);
        assert_eq!(frame.frame_index, 2);
    }

    #[test]
    fn test_levels_are_clamped_and_tracked() {
        let mut frame = FrameState::default();
        frame.advance(0.0, 4.0);
        assert_eq!(frame.audio_level, 1.0);
        assert_eq!(frame.peak_level, 1.0);
        frame.advance(16.0, f32::NAN);
        assert_eq!(frame.audio_level, 0.0);
        assert!((frame.peak_level - PEAK_DECAY).abs() < 1e-6);
        assert!(frame.average_level > 0.0 && frame.average_level < 1.0);
    }
}
