//! Post-processing effect chain.
//!
//! The chain is configured once from the [`GpuProfile`]: only the passes the
//! tier allows are constructed, so a low tier adapter never pays for glitch or
//! film. Every frame [`PostPipeline::apply`] refreshes the pass parameters from
//! the frame state and returns the ordered pass list for the renderer.

use serde::Serialize;

use crate::frame::FrameState;
use crate::gpu_profile::{GpuProfile, ToneMapping};

/// Kinds of full-screen passes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PostPassKind {
    Bloom,
    Glitch,
    Film,
}

/// Per-frame parameters of one pass.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum PassParams {
    Bloom {
        threshold: f32,
        strength: f32,
        radius: f32,
    },
    Glitch {
        time: f32,
        amount: f32,
        seed: f32,
    },
    Film {
        time: f32,
        grain: f32,
        scanlines: f32,
    },
}

impl PassParams {
    fn initial(kind: PostPassKind) -> Self {
        match kind {
            PostPassKind::Bloom => PassParams::Bloom {
                threshold: BLOOM_THRESHOLD,
                strength: 0.0,
                radius: BLOOM_RADIUS,
            },
            PostPassKind::Glitch => PassParams::Glitch {
                time: 0.0,
                amount: 0.0,
                seed: 0.0,
            },
            PostPassKind::Film => PassParams::Film {
                time: 0.0,
                grain: FILM_GRAIN,
                scanlines: FILM_SCANLINES,
            },
        }
    }

    /// Packed as one vec4 uniform for the pass shader.
    pub fn to_uniform(&self) -> [f32; 4] {
        match *self {
            PassParams::Bloom { threshold, strength, radius } => [threshold, strength, radius, 0.0],
            PassParams::Glitch { time, amount, seed } => [time, amount, seed, 0.0],
            PassParams::Film { time, grain, scanlines } => [time, grain, scanlines, 0.0],
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct PostPass {
    pub kind: PostPassKind,
    pub params: PassParams,
    /// Disabled passes are skipped by the renderer this frame.
    pub enabled: bool,
}

const BLOOM_THRESHOLD: f32 = 0.6;
const BLOOM_RADIUS: f32 = 0.45;
const BLOOM_BASE: f32 = 0.55;
const BLOOM_AUDIO_GAIN: f32 = 1.1;
const BLOOM_INTENSITY_GAIN: f32 = 0.25;

const FILM_GRAIN: f32 = 0.06;
const FILM_SCANLINES: f32 = 0.12;

/// Ordered, tier-conditioned pass list.
pub struct PostPipeline {
    passes: Vec<PostPass>,
    bloom_scale: f32,
    tone_mapping: ToneMapping,
    glitch_until_ms: Option<f64>,
}

impl PostPipeline {
    /// Build the pass list for `profile`. Bloom always comes first.
    pub fn configure(profile: &GpuProfile) -> Self {
        let mut passes: Vec<PostPass> = Vec::with_capacity(profile.post_passes.len());
        for &kind in &profile.post_passes {
            if passes.iter().any(|p| p.kind == kind) {
                continue;
            }
            passes.push(PostPass {
                kind,
                params: PassParams::initial(kind),
                enabled: kind != PostPassKind::Glitch,
            });
        }
        passes.sort_by_key(|p| p.kind != PostPassKind::Bloom);

        log::info!(
            "Post-processing configured: {:?}",
            passes.iter().map(|p| p.kind).collect::<Vec<_>>()
        );

        Self {
            passes,
            bloom_scale: profile.bloom_strength_scale,
            tone_mapping: profile.tone_mapping,
            glitch_until_ms: None,
        }
    }

    /// Update pass parameters for this frame and return the chain.
    pub fn apply(&mut self, frame: &FrameState, intensity: f32, now_ms: f64) -> &[PostPass] {
        let glitch_active = match self.glitch_until_ms {
            Some(until) if now_ms < until => true,
            Some(_) => {
                self.glitch_until_ms = None;
                false
            }
            None => false,
        };
        let time = frame.elapsed_s as f32;
        let audio = frame.audio_level;

        for pass in &mut self.passes {
            match &mut pass.params {
                PassParams::Bloom { strength, .. } => {
                    *strength =
                        self.bloom_scale * (BLOOM_BASE + BLOOM_AUDIO_GAIN * audio + BLOOM_INTENSITY_GAIN * intensity);
                }
                PassParams::Glitch { time: t, amount, seed } => {
                    pass.enabled = glitch_active;
                    *t = time;
                    *amount = if glitch_active { 0.35 + 0.65 * audio } else { 0.0 };
                    *seed = (frame.frame_index % 997) as f32 / 997.0;
                }
                PassParams::Film { time: t, grain, .. } => {
                    *t = time;
                    *grain = FILM_GRAIN * (1.0 + intensity);
                }
            }
        }
        &self.passes
    }

    /// Enable the glitch pass until `now_ms + duration_ms`. Returns `false`
    /// when the tier has no glitch pass.
    pub fn activate_glitch(&mut self, duration_ms: f64, now_ms: f64) -> bool {
        if !self.has_pass(PostPassKind::Glitch) {
            log::debug!("Glitch requested but not available on this tier");
            return false;
        }
        let duration = if duration_ms.is_finite() { duration_ms.max(0.0) } else { 0.0 };
        let until = now_ms + duration;
        self.glitch_until_ms = Some(self.glitch_until_ms.map_or(until, |current| current.max(until)));
        true
    }

    pub fn has_pass(&self, kind: PostPassKind) -> bool {
        self.passes.iter().any(|p| p.kind == kind)
    }

    pub fn passes(&self) -> &[PostPass] {
        &self.passes
    }

    pub fn tone_mapping(&self) -> ToneMapping {
        self.tone_mapping
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu_profile::GpuTier;

    fn frame(audio: f32) -> FrameState {
        FrameState::default().with_audio_level(audio)
    }

    fn bloom_strength(passes: &[PostPass]) -> f32 {
        match passes[0].params {
            PassParams::Bloom { strength, .. } => strength,
            _ => panic!("bloom is not first"),
        }
    }

    #[test]
    fn test_low_tier_builds_bloom_only() {
        let pipeline = PostPipeline::configure(&GpuProfile::for_tier("Intel", GpuTier::Low));
        assert_eq!(pipeline.passes().len(), 1);
        assert!(!pipeline.has_pass(PostPassKind::Glitch));
        assert!(!pipeline.has_pass(PostPassKind::Film));
    }

    #[test]
    fn test_bloom_follows_audio() {
        let mut pipeline = PostPipeline::configure(&GpuProfile::for_tier("NVIDIA", GpuTier::High));
        let quiet = bloom_strength(pipeline.apply(&frame(0.0), 0.5, 0.0));
        let loud = bloom_strength(pipeline.apply(&frame(1.0), 0.5, 16.0));
        assert!(loud > quiet);
    }

    #[test]
    fn test_low_tier_bloom_is_weaker() {
        let mut high = PostPipeline::configure(&GpuProfile::for_tier("NVIDIA", GpuTier::High));
        let mut low = PostPipeline::configure(&GpuProfile::for_tier("Intel", GpuTier::Low));
        let h = bloom_strength(high.apply(&frame(0.5), 0.5, 0.0));
        let l = bloom_strength(low.apply(&frame(0.5), 0.5, 0.0));
        assert!(l < h);
    }

    #[test]
    fn test_glitch_window() {
        let mut pipeline = PostPipeline::configure(&GpuProfile::for_tier("NVIDIA", GpuTier::High));
        let glitch = |passes: &[PostPass]| passes.iter().find(|p| p.kind == PostPassKind::Glitch).map(|p| p.enabled);

        assert_eq!(glitch(pipeline.apply(&frame(0.0), 0.0, 0.0)), Some(false));
        assert!(pipeline.activate_glitch(200.0, 100.0));
        assert_eq!(glitch(pipeline.apply(&frame(0.0), 0.0, 150.0)), Some(true));
        assert_eq!(glitch(pipeline.apply(&frame(0.0), 0.0, 300.0)), Some(false));
    }

    #[test]
    fn test_glitch_extends_not_shortens() {
        let mut pipeline = PostPipeline::configure(&GpuProfile::for_tier("NVIDIA", GpuTier::High));
        pipeline.activate_glitch(1000.0, 0.0);
        pipeline.activate_glitch(10.0, 100.0);
        let passes = pipeline.apply(&frame(0.0), 0.0, 500.0);
        assert!(passes.iter().any(|p| p.kind == PostPassKind::Glitch && p.enabled));
    }

    #[test]
    fn test_glitch_is_noop_on_low_tier() {
        let mut pipeline = PostPipeline::configure(&GpuProfile::for_tier("Intel", GpuTier::Low));
        assert!(!pipeline.activate_glitch(500.0, 0.0));
        assert_eq!(pipeline.apply(&frame(1.0), 1.0, 10.0).len(), 1);
    }
}
