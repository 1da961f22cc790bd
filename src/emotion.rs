//! Emotion (affect) state machine.
//!
//! Holds the current affect descriptor and animates one transition at a time
//! with a cubic ease-out. Requests that arrive while a transition is in flight
//! are dropped rather than queued so the orb never oscillates between targets.

use serde::Serialize;

use crate::error::EngineError;

pub const DEFAULT_EMOTION: &str = "idle";

/// Immutable catalog entry.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EmotionDescriptor {
    pub id: &'static str,
    /// Animation energy in [0, 1].
    pub intensity: f32,
    /// Angular speed multiplier.
    pub speed: f32,
    /// Linear RGB.
    pub color: [f32; 3],
}

pub static EMOTIONS: [EmotionDescriptor; 9] = [
    EmotionDescriptor { id: "idle", intensity: 0.2, speed: 0.5, color: [0.4, 0.6, 1.0] },
    EmotionDescriptor { id: "happy", intensity: 0.7, speed: 1.2, color: [1.0, 0.82, 0.3] },
    EmotionDescriptor { id: "excited", intensity: 1.0, speed: 2.0, color: [1.0, 0.35, 0.2] },
    EmotionDescriptor { id: "calm", intensity: 0.3, speed: 0.4, color: [0.3, 0.85, 0.75] },
    EmotionDescriptor { id: "sad", intensity: 0.25, speed: 0.3, color: [0.25, 0.35, 0.8] },
    EmotionDescriptor { id: "angry", intensity: 0.9, speed: 1.8, color: [0.95, 0.12, 0.1] },
    EmotionDescriptor { id: "thinking", intensity: 0.5, speed: 0.8, color: [0.6, 0.4, 1.0] },
    EmotionDescriptor { id: "listening", intensity: 0.45, speed: 0.7, color: [0.2, 0.8, 1.0] },
    EmotionDescriptor { id: "speaking", intensity: 0.65, speed: 1.1, color: [0.9, 0.6, 1.0] },
];

pub fn get_emotion(id: &str) -> Result<&'static EmotionDescriptor, EngineError> {
    EMOTIONS
        .iter()
        .find(|emotion| emotion.id == id)
        .ok_or_else(|| EngineError::UnknownEmotion(id.to_string()))
}

pub fn emotion_ids() -> impl Iterator<Item = &'static str> {
    EMOTIONS.iter().map(|emotion| emotion.id)
}

/// Values fed to the shader for one frame.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct EmotionSample {
    pub intensity: f32,
    pub speed: f32,
    pub color: [f32; 3],
}

impl From<&EmotionDescriptor> for EmotionSample {
    fn from(descriptor: &EmotionDescriptor) -> Self {
        Self {
            intensity: descriptor.intensity,
            speed: descriptor.speed,
            color: descriptor.color,
        }
    }
}

/// Outcome of a `set_emotion` request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransitionRequest {
    /// A new transition began (or completed at once for a zero duration).
    Started,
    /// A transition to the same target is already running.
    AlreadyTargeted,
    /// Another transition is running; the request was dropped.
    Busy,
    /// The requested emotion is already the settled state.
    Unchanged,
}

#[derive(Clone, Copy, Debug)]
struct Transition {
    source: &'static EmotionDescriptor,
    target: &'static EmotionDescriptor,
    start_ms: f64,
    duration_ms: f64,
}

impl Transition {
    fn progress(&self, now_ms: f64) -> f64 {
        ((now_ms - self.start_ms) / self.duration_ms).clamp(0.0, 1.0)
    }
}

/// Cubic ease-out: fast start, gentle arrival.
pub fn ease_out_cubic(progress: f32) -> f32 {
    let inverse = 1.0 - progress;
    1.0 - inverse * inverse * inverse
}

fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

pub struct EmotionStateMachine {
    current: &'static EmotionDescriptor,
    transition: Option<Transition>,
}

impl Default for EmotionStateMachine {
    fn default() -> Self {
        Self {
            current: &EMOTIONS[0],
            transition: None,
        }
    }
}

impl EmotionStateMachine {
    pub fn new(initial: &'static EmotionDescriptor) -> Self {
        Self {
            current: initial,
            transition: None,
        }
    }

    /// Request a transition to `id` lasting `duration_ms`.
    pub fn set_emotion(
        &mut self,
        id: &str,
        duration_ms: f64,
        now_ms: f64,
    ) -> Result<TransitionRequest, EngineError> {
        let target = get_emotion(id)?;
        self.settle(now_ms);

        if let Some(transition) = &self.transition {
            return Ok(if transition.target.id == target.id {
                TransitionRequest::AlreadyTargeted
            } else {
                TransitionRequest::Busy
            });
        }

        if self.current.id == target.id {
            return Ok(TransitionRequest::Unchanged);
        }

        if !duration_ms.is_finite() || duration_ms <= 0.0 {
            self.current = target;
            return Ok(TransitionRequest::Started);
        }

        self.transition = Some(Transition {
            source: self.current,
            target,
            start_ms: now_ms,
            duration_ms,
        });
        Ok(TransitionRequest::Started)
    }

    /// Advance to `now_ms` and return the interpolated parameters.
    pub fn tick(&mut self, now_ms: f64) -> EmotionSample {
        let Some(transition) = self.transition else {
            return EmotionSample::from(self.current);
        };

        let progress = transition.progress(now_ms);
        if progress >= 1.0 {
            self.current = transition.target;
            self.transition = None;
            return EmotionSample::from(self.current);
        }

        let eased = ease_out_cubic(progress as f32);
        let (a, b) = (transition.source, transition.target);
        EmotionSample {
            intensity: lerp(a.intensity, b.intensity, eased),
            speed: lerp(a.speed, b.speed, eased),
            color: [
                lerp(a.color[0], b.color[0], eased),
                lerp(a.color[1], b.color[1], eased),
                lerp(a.color[2], b.color[2], eased),
            ],
        }
    }

    /// Clear a transition whose duration has already elapsed.
    fn settle(&mut self, now_ms: f64) {
        if let Some(transition) = self.transition {
            if transition.progress(now_ms) >= 1.0 {
                self.current = transition.target;
                self.transition = None;
            }
        }
    }

    /// The emotion being shown or transitioned to.
    pub fn current_id(&self) -> &'static str {
        match &self.transition {
            Some(transition) => transition.target.id,
            None => self.current.id,
        }
    }

    pub fn is_transitioning(&self) -> bool {
        self.transition.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn machine() -> EmotionStateMachine {
        EmotionStateMachine::new(get_emotion("idle").unwrap())
    }

    #[test]
    fn test_initial_state_is_idle() {
        let mut m = EmotionStateMachine::default();
        assert_eq!(m.current_id(), "idle");
        assert_eq!(m.tick(0.0).intensity, 0.2);
        assert_eq!(emotion_ids().count(), EMOTIONS.len());
    }

    #[test]
    fn test_endpoints_are_exact() {
        let mut m = machine();
        assert_eq!(m.set_emotion("excited", 1000.0, 100.0).unwrap(), TransitionRequest::Started);

        let start = m.tick(100.0);
        assert_eq!(start, EmotionSample::from(get_emotion("idle").unwrap()));

        let end = m.tick(1100.0);
        assert_eq!(end, EmotionSample::from(get_emotion("excited").unwrap()));
        assert!(!m.is_transitioning());
    }

    #[test]
    fn test_midpoint_is_eased_and_convex() {
        let mut m = machine();
        m.set_emotion("excited", 1000.0, 0.0).unwrap();
        let mid = m.tick(500.0);
        // ease-out(0.5) = 0.875
        assert!((mid.intensity - (0.2 + 0.8 * 0.875)).abs() < 1e-5);
        assert!(mid.intensity > 0.2 && mid.intensity < 1.0);
        assert!(mid.speed > 0.5 && mid.speed < 2.0);
    }

    #[test]
    fn test_samples_stay_between_endpoints() {
        let mut m = machine();
        m.set_emotion("sad", 300.0, 0.0).unwrap();
        let (lo, hi) = (0.2f32.min(0.25), 0.2f32.max(0.25));
        for step in 0..=40 {
            let sample = m.tick(step as f64 * 10.0);
            assert!(sample.intensity >= lo && sample.intensity <= hi);
        }
    }

    #[test]
    fn test_requests_during_transition() {
        let mut m = machine();
        m.set_emotion("happy", 1000.0, 0.0).unwrap();
        assert_eq!(m.set_emotion("happy", 500.0, 200.0).unwrap(), TransitionRequest::AlreadyTargeted);
        assert_eq!(m.set_emotion("angry", 500.0, 200.0).unwrap(), TransitionRequest::Busy);
        assert_eq!(m.current_id(), "happy");

        // Elapsed transitions settle before a new request is judged.
        assert_eq!(m.set_emotion("angry", 500.0, 1000.0).unwrap(), TransitionRequest::Started);
    }

    #[test]
    fn test_same_emotion_is_unchanged() {
        let mut m = machine();
        assert_eq!(m.set_emotion("idle", 500.0, 0.0).unwrap(), TransitionRequest::Unchanged);
        assert!(!m.is_transitioning());
    }

    #[test]
    fn test_zero_duration_completes_immediately() {
        let mut m = machine();
        m.set_emotion("calm", 0.0, 0.0).unwrap();
        assert!(!m.is_transitioning());
        assert_eq!(m.tick(0.0).intensity, 0.3);
    }

    #[test]
    fn test_non_finite_duration_completes_immediately() {
        let mut m = machine();
        m.set_emotion("happy", f64::INFINITY, 0.0).unwrap();
        assert!(!m.is_transitioning());
        assert_eq!(m.tick(1e12).intensity, 0.7);
        assert_eq!(m.set_emotion("sad", 100.0, 1e12).unwrap(), TransitionRequest::Started);
    }

    #[test]
    fn test_unknown_emotion_leaves_state() {
        let mut m = machine();
        assert!(matches!(m.set_emotion("bored", 100.0, 0.0), Err(EngineError::UnknownEmotion(_))));
        assert_eq!(m.current_id(), "idle");
    }

    #[test]
    fn test_time_before_start_clamps_to_source() {
        let mut m = machine();
        m.set_emotion("excited", 1000.0, 500.0).unwrap();
        assert_eq!(m.tick(100.0).intensity, 0.2);
    }
}
