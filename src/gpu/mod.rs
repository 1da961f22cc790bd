pub mod bloom_processor;
pub mod fullscreen;
pub mod mesh;
pub mod particle_pipeline;
pub mod post_processor;
pub mod renderer;
pub mod theme_pipeline;

/// WGSL sources of the shared (non-theme) programs.
pub mod shaders {
    pub const PARTICLES: &str = include_str!("shaders/particles.wgsl");
    pub const BLOOM_THRESHOLD: &str = include_str!("shaders/post_bloom_threshold.wgsl");
    pub const BLOOM_BLUR: &str = include_str!("shaders/post_bloom_blur.wgsl");
    pub const BLOOM_COMPOSITE: &str = include_str!("shaders/post_bloom_composite.wgsl");
    pub const GLITCH: &str = include_str!("shaders/post_glitch.wgsl");
    pub const FILM: &str = include_str!("shaders/post_film.wgsl");
    pub const OUTPUT: &str = include_str!("shaders/post_output.wgsl");

    /// Label and source of every shared program.
    pub const ALL: &[(&str, &str)] = &[
        ("particles", PARTICLES),
        ("bloom_threshold", BLOOM_THRESHOLD),
        ("bloom_blur", BLOOM_BLUR),
        ("bloom_composite", BLOOM_COMPOSITE),
        ("glitch", GLITCH),
        ("film", FILM),
        ("output", OUTPUT),
    ];
}
