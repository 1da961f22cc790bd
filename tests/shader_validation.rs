//! Every bundled WGSL program must parse and validate with naga.
//!
//! Run with: cargo test --test shader_validation

use orb_visualiser::gpu::shaders;
use orb_visualiser::shader_check::{validate_theme, validate_wgsl};
use orb_visualiser::theme::THEMES;

#[test]
fn test_theme_programs_validate() {
    let mut failures = Vec::new();
    for theme in THEMES.iter() {
        if let Err(e) = validate_theme(theme) {
            failures.push(format!("{}: {}", theme.id, e));
        }
    }
    assert!(failures.is_empty(), "invalid theme shaders:\n{}", failures.join("\n"));
}

#[test]
fn test_shared_programs_validate() {
    let mut failures = Vec::new();
    for (label, source) in shaders::ALL {
        if let Err(e) = validate_wgsl(label, source) {
            failures.push(format!("{}: {}", label, e));
        }
    }
    assert!(failures.is_empty(), "invalid shared shaders:\n{}", failures.join("\n"));
}
