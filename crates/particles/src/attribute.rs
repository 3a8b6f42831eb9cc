use flurry_common::Color;
use glam::Vec3;

/// Full simulated state of one particle.
///
/// Attributes live inside a [`ParticleSystem`](crate::ParticleSystem) and are
/// overwritten in place when a variant respawns them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Attribute {
    pub position: Vec3,
    pub velocity: Vec3,
    /// Only variants that need it read this.
    pub acceleration: Vec3,
    /// Seconds the particle lives before dying.
    pub lifetime: f32,
    /// Seconds lived so far.
    pub age: f32,
    pub color: Color,
    /// Per-second change applied to `color` by fading variants.
    pub color_fade: Color,
    pub alive: bool,
}

impl Default for Attribute {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            velocity: Vec3::ZERO,
            acceleration: Vec3::ZERO,
            lifetime: 0.0,
            age: 0.0,
            color: Color::WHITE,
            color_fade: Color::TRANSPARENT,
            alive: true,
        }
    }
}
