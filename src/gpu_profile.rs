//! GPU capability profiling.
//!
//! The adapter is inspected once at startup and classified into a coarse tier.
//! Classification goes through the [`TierClassifier`] trait so the vendor
//! string heuristic can be replaced without touching the render loop.

use serde::Serialize;

use crate::post_processing::PostPassKind;

/// Vendor/renderer identification reported by the rendering context.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AdapterIdentity {
    pub vendor: String,
    pub renderer: String,
    /// Device class as reported by the backend ("discrete", "integrated", ...).
    pub device_type: String,
}

impl AdapterIdentity {
    pub fn new(vendor: impl Into<String>, renderer: impl Into<String>) -> Self {
        Self {
            vendor: vendor.into(),
            renderer: renderer.into(),
            device_type: "unknown".to_string(),
        }
    }

    pub fn with_device_type(mut self, device_type: impl Into<String>) -> Self {
        self.device_type = device_type.into();
        self
    }

    pub fn from_adapter_info(info: &wgpu::AdapterInfo) -> Self {
        let device_type = match info.device_type {
            wgpu::DeviceType::DiscreteGpu => "discrete",
            wgpu::DeviceType::IntegratedGpu => "integrated",
            wgpu::DeviceType::VirtualGpu => "virtual",
            wgpu::DeviceType::Cpu => "cpu",
            wgpu::DeviceType::Other => "other",
        };
        Self {
            vendor: vendor_name(info.vendor).to_string(),
            renderer: info.name.clone(),
            device_type: device_type.to_string(),
        }
    }
}

/// Map a PCI vendor id to a readable vendor name.
fn vendor_name(vendor_id: u32) -> &'static str {
    match vendor_id {
        0x10DE => "NVIDIA",
        0x1002 => "AMD",
        0x8086 => "Intel",
        0x13B5 => "ARM",
        0x5143 => "Qualcomm",
        0x1010 => "Imagination Technologies",
        0x106B => "Apple",
        0x14E4 => "Broadcom",
        _ => "unknown",
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GpuTier {
    High,
    /// Integrated, mobile or software adapters.
    Low,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ShadowMode {
    /// Soft terminator self-shadowing on the sphere.
    Soft,
    Disabled,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ToneMapping {
    /// ACES filmic curve over an HDR scene target.
    Aces,
    /// Plain clamp to display range.
    Linear,
}

impl ToneMapping {
    /// Value pushed to the output shader.
    pub fn shader_mode(&self) -> f32 {
        match self {
            ToneMapping::Aces => 1.0,
            ToneMapping::Linear => 0.0,
        }
    }
}

/// Immutable result of profiling, computed once per engine.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct GpuProfile {
    pub vendor: String,
    pub tier: GpuTier,
    pub shadows: ShadowMode,
    pub tone_mapping: ToneMapping,
    /// Ordered post-processing passes to construct. Bloom is always first.
    pub post_passes: Vec<PostPassKind>,
    pub bloom_strength_scale: f32,
    pub particle_budget_scale: f32,
    /// Render the scene into a floating point target before tone mapping.
    pub hdr_scene: bool,
}

impl GpuProfile {
    pub fn for_tier(vendor: impl Into<String>, tier: GpuTier) -> Self {
        match tier {
            GpuTier::High => Self {
                vendor: vendor.into(),
                tier,
                shadows: ShadowMode::Soft,
                tone_mapping: ToneMapping::Aces,
                post_passes: vec![PostPassKind::Bloom, PostPassKind::Glitch, PostPassKind::Film],
                bloom_strength_scale: 1.0,
                particle_budget_scale: 1.0,
                hdr_scene: true,
            },
            GpuTier::Low => Self {
                vendor: vendor.into(),
                tier,
                shadows: ShadowMode::Disabled,
                tone_mapping: ToneMapping::Linear,
                post_passes: vec![PostPassKind::Bloom],
                bloom_strength_scale: 0.6,
                particle_budget_scale: 0.5,
                hdr_scene: false,
            },
        }
    }

    pub fn is_high_tier(&self) -> bool {
        self.tier == GpuTier::High
    }

    pub fn shadows_enabled(&self) -> bool {
        self.shadows == ShadowMode::Soft
    }

    pub fn has_pass(&self, kind: PostPassKind) -> bool {
        self.post_passes.contains(&kind)
    }
}

/// Decides the tier for an adapter identity.
///
/// Implementations must be pure: the same identity always yields the same tier.
pub trait TierClassifier {
    fn classify(&self, identity: &AdapterIdentity) -> GpuTier;
}

/// Lower-cased substrings that mark an integrated, mobile or software adapter.
pub const LOW_TIER_MARKERS: &[&str] = &[
    "intel",
    "mali",
    "adreno",
    "powervr",
    "apple gpu",
    "videocore",
    "swiftshader",
    "llvmpipe",
    "software",
    "microsoft basic",
    "integrated",
];

/// Best-effort substring heuristic over vendor and renderer names.
#[derive(Clone, Debug, Default)]
pub struct VendorStringClassifier;

impl TierClassifier for VendorStringClassifier {
    fn classify(&self, identity: &AdapterIdentity) -> GpuTier {
        let device_type = identity.device_type.to_lowercase();
        if matches!(device_type.as_str(), "integrated" | "cpu" | "virtual") {
            return GpuTier::Low;
        }

        let haystack = format!("{} {}", identity.vendor, identity.renderer).to_lowercase();
        if LOW_TIER_MARKERS.iter().any(|marker| haystack.contains(marker)) {
            GpuTier::Low
        } else {
            GpuTier::High
        }
    }
}

/// Profiles adapters with a pluggable classifier.
pub struct GpuProfiler {
    classifier: Box<dyn TierClassifier>,
}

impl Default for GpuProfiler {
    fn default() -> Self {
        Self::new(Box::new(VendorStringClassifier))
    }
}

impl GpuProfiler {
    pub fn new(classifier: Box<dyn TierClassifier>) -> Self {
        Self { classifier }
    }

    /// Build the profile for an adapter.
    ///
    /// `None` means the context could not be introspected; that always
    /// yields the low tier.
    pub fn profile(&self, identity: Option<&AdapterIdentity>) -> GpuProfile {
        match identity {
            Some(identity) => {
                let tier = self.classifier.classify(identity);
                log::info!(
                    "GPU profile: vendor='{}' renderer='{}' type={} -> {:?} tier",
                    identity.vendor,
                    identity.renderer,
                    identity.device_type,
                    tier
                );
                GpuProfile::for_tier(identity.vendor.clone(), tier)
            }
            None => {
                log::warn!("Adapter introspection unavailable, using low tier profile");
                GpuProfile::for_tier("unknown", GpuTier::Low)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mobile_and_integrated_are_low_tier() {
        let classifier = VendorStringClassifier;
        for (vendor, renderer) in [
            ("Intel", "Intel(R) UHD Graphics 620"),
            ("ARM", "Mali-G78"),
            ("Qualcomm", "Adreno (TM) 650"),
            ("Google Inc.", "ANGLE (Google, Vulkan 1.3.0 (SwiftShader Device))"),
            ("Mesa", "llvmpipe (LLVM 15.0.7, 256 bits)"),
        ] {
            let identity = AdapterIdentity::new(vendor, renderer);
            assert_eq!(classifier.classify(&identity), GpuTier::Low, "{renderer}");
        }
    }

    #[test]
    fn test_discrete_is_high_tier() {
        let identity = AdapterIdentity::new("NVIDIA", "NVIDIA GeForce RTX 3080")
            .with_device_type("discrete");
        assert_eq!(VendorStringClassifier.classify(&identity), GpuTier::High);
    }

    #[test]
    fn test_device_type_overrides_vendor() {
        let identity = AdapterIdentity::new("AMD", "AMD Radeon Graphics")
            .with_device_type("integrated");
        assert_eq!(VendorStringClassifier.classify(&identity), GpuTier::Low);
    }

    #[test]
    fn test_missing_identity_is_low_tier() {
        let profile = GpuProfiler::default().profile(None);
        assert_eq!(profile.tier, GpuTier::Low);
        assert_eq!(profile.post_passes, vec![PostPassKind::Bloom]);
        assert!(!profile.shadows_enabled());
    }

    #[test]
    fn test_high_tier_flags() {
        let profile = GpuProfile::for_tier("NVIDIA", GpuTier::High);
        assert!(profile.shadows_enabled());
        assert_eq!(profile.tone_mapping, ToneMapping::Aces);
        assert_eq!(profile.post_passes[0], PostPassKind::Bloom);
        assert!(profile.has_pass(PostPassKind::Glitch));
        assert!(profile.has_pass(PostPassKind::Film));
    }

    #[test]
    fn test_custom_classifier() {
        struct AlwaysHigh;
        impl TierClassifier for AlwaysHigh {
            fn classify(&self, _identity: &AdapterIdentity) -> GpuTier {
                GpuTier::High
            }
        }
        let profiler = GpuProfiler::new(Box::new(AlwaysHigh));
        let identity = AdapterIdentity::new("Intel", "Iris Xe");
        assert_eq!(profiler.profile(Some(&identity)).tier, GpuTier::High);
    }
}
