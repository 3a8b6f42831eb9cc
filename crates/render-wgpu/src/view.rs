use glam::{Mat4, Vec3};

/// Where the particles are seen from.
///
/// Sprite attenuation needs the eye position as well as the projection, so
/// this carries both.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParticleView {
    pub eye: Vec3,
    pub target: Vec3,
    pub fov: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for ParticleView {
    fn default() -> Self {
        Self {
            eye: Vec3::new(0.0, 0.0, -25.0),
            target: Vec3::ZERO,
            fov: 45.0_f32.to_radians(),
            aspect: 16.0 / 9.0,
            near: 0.1,
            far: 500.0,
        }
    }
}

impl ParticleView {
    pub fn looking_at(eye: Vec3, target: Vec3, aspect: f32) -> Self {
        Self {
            eye,
            target,
            aspect,
            ..Self::default()
        }
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.eye, self.target, Vec3::Y)
    }

    pub fn projection_matrix(&self) -> Mat4 {
        Mat4::perspective_rh(self.fov, self.aspect, self.near, self.far)
    }

    pub fn view_projection(&self) -> Mat4 {
        self.projection_matrix() * self.view_matrix()
    }
}
