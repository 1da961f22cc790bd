//! Offline WGSL validation through naga.
//!
//! Theme programs are validated before they reach the device so a broken
//! program surfaces as [`EngineError::ShaderCompile`] instead of a device
//! panic in the middle of a theme switch.

use naga::valid::{Capabilities, ValidationFlags, Validator};

use crate::error::EngineError;
use crate::theme::ThemeDescriptor;

/// Parse and validate a WGSL module, returning the diagnostic text on failure.
pub fn validate_wgsl(label: &str, source: &str) -> Result<naga::Module, String> {
    let module = naga::front::wgsl::parse_str(source)
        .map_err(|e| format!("{label}: {}", e.emit_to_string(source)))?;
    Validator::new(ValidationFlags::all(), Capabilities::empty())
        .validate(&module)
        .map_err(|e| format!("{label}: {}", e.emit_to_string(source)))?;
    Ok(module)
}

/// Validate a theme's full program, including its entry points.
pub fn validate_theme(theme: &ThemeDescriptor) -> Result<(), EngineError> {
    let source = theme.program.full_source();
    let module = validate_wgsl(theme.program.label, &source).map_err(|message| EngineError::ShaderCompile {
        theme: theme.id.to_string(),
        message,
    })?;

    for (entry, stage) in [
        (theme.program.vertex_entry, naga::ShaderStage::Vertex),
        (theme.program.fragment_entry, naga::ShaderStage::Fragment),
    ] {
        if !module.entry_points.iter().any(|ep| ep.name == entry && ep.stage == stage) {
            return Err(EngineError::ShaderCompile {
                theme: theme.id.to_string(),
                message: format!("missing {stage:?} entry point '{entry}'"),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reports_parse_errors() {
        let err = validate_wgsl("broken", "fn main( {").unwrap_err();
        assert!(err.starts_with("broken:"));
    }

    #[test]
    fn test_accepts_minimal_module() {
        let src = "@fragment fn fs_main() -> @location(0) vec4<f32> { return vec4<f32>(1.0); }";
        assert!(validate_wgsl("ok", src).is_ok());
    }
}
