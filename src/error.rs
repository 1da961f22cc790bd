//! Error taxonomy for the visualization engine.
//!
//! Audio errors are recovered locally (the engine keeps rendering silent
//! visuals), caller errors leave engine state untouched, and only
//! `RenderContextUnavailable` is fatal for the component.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// Microphone access was refused by the user or platform.
    #[error("microphone permission denied: {0}")]
    PermissionDenied(String),

    /// No usable capture device, or the device failed while opening.
    #[error("audio device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("unknown theme '{0}'")]
    UnknownTheme(String),

    #[error("unknown emotion '{0}'")]
    UnknownEmotion(String),

    /// A theme program failed validation or pipeline creation.
    #[error("shader program for theme '{theme}' failed to compile: {message}")]
    ShaderCompile { theme: String, message: String },

    /// No rendering adapter or surface could be created at all.
    #[error("render context unavailable: {0}")]
    RenderContextUnavailable(String),

    #[error("'{op}' is not valid while the engine is {state}")]
    InvalidState { op: &'static str, state: String },

    /// A single frame failed to render or present.
    #[error("frame failed: {0}")]
    Frame(String),
}

impl EngineError {
    /// Audio errors never stop the engine; they pin the level at zero.
    pub fn is_audio(&self) -> bool {
        matches!(self, EngineError::PermissionDenied(_) | EngineError::DeviceUnavailable(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audio_classification() {
        assert!(EngineError::PermissionDenied("denied".into()).is_audio());
        assert!(EngineError::DeviceUnavailable("none".into()).is_audio());
        assert!(!EngineError::UnknownTheme("x".into()).is_audio());
    }

    #[test]
    fn test_messages_name_the_offender() {
        let err = EngineError::ShaderCompile { theme: "matrix".into(), message: "bad token".into() };
        let text = err.to_string();
        assert!(text.contains("matrix"));
        assert!(text.contains("bad token"));
    }
}
