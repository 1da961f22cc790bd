//! Fixed look-at camera framing the orb.
//!
//! The orb sits at the origin with radius 1. Particles reach out to about
//! radius 3, so the default eye distance keeps everything in frame at the
//! default field of view.

use glam::{Mat4, Vec3};

#[derive(Clone, Debug, PartialEq)]
pub struct OrbCamera {
    pub position: Vec3,
    pub target: Vec3,
    pub up: Vec3,
    /// Vertical field of view in degrees.
    pub fov: f32,
    pub near: f32,
    pub far: f32,
    pub aspect: f32,
}

impl Default for OrbCamera {
    fn default() -> Self {
        Self {
            position: Vec3::new(0.0, 0.0, 6.5),
            target: Vec3::ZERO,
            up: Vec3::Y,
            fov: 45.0,
            near: 0.1,
            far: 50.0,
            aspect: 1.0,
        }
    }
}

impl OrbCamera {
    pub fn set_viewport(&mut self, width: u32, height: u32) {
        self.aspect = width.max(1) as f32 / height.max(1) as f32;
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.target, self.up)
    }

    pub fn projection_matrix(&self) -> Mat4 {
        Mat4::perspective_rh(self.fov.to_radians(), self.aspect, self.near, self.far)
    }

    pub fn view_projection_matrix(&self) -> Mat4 {
        self.projection_matrix() * self.view_matrix()
    }

    pub fn forward(&self) -> Vec3 {
        (self.target - self.position).normalize()
    }

    /// World-space right vector for billboarding.
    pub fn right(&self) -> Vec3 {
        self.forward().cross(self.up).normalize()
    }

    /// Actual camera up (orthogonal to forward).
    pub fn camera_up(&self) -> Vec3 {
        self.right().cross(self.forward())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_origin_projects_to_center() {
        let camera = OrbCamera::default();
        let clip = camera.view_projection_matrix() * glam::Vec4::new(0.0, 0.0, 0.0, 1.0);
        let ndc = clip / clip.w;
        assert!(ndc.x.abs() < 1e-5 && ndc.y.abs() < 1e-5);
        assert!(ndc.z > 0.0 && ndc.z < 1.0);
    }

    #[test]
    fn test_billboard_axes_are_orthonormal() {
        let camera = OrbCamera::default();
        let (r, u) = (camera.right(), camera.camera_up());
        assert!((r.length() - 1.0).abs() < 1e-5);
        assert!((u.length() - 1.0).abs() < 1e-5);
        assert!(r.dot(u).abs() < 1e-5);
    }

    #[test]
    fn test_viewport_guards_zero_height() {
        let mut camera = OrbCamera::default();
        camera.set_viewport(800, 0);
        assert_eq!(camera.aspect, 800.0);
    }
}
