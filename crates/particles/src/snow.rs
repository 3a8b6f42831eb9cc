use flurry_common::{BoundingBox, Color};
use glam::Vec3;
use rand::RngCore;

use crate::attribute::Attribute;
use crate::effect::{ParticleEffect, random_vector, sample_range};

/// Falling snow confined to a bounding box.
///
/// Flakes spawn on the top face and drift down and slightly toward -x. A
/// flake that leaves the box is respawned in place, so a snow system never
/// dies and never changes size.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Snow {
    bounds: BoundingBox,
}

impl Snow {
    /// Peak horizontal drift speed along -x.
    pub const DRIFT: f32 = 3.0;
    /// Peak fall speed along -y.
    pub const FALL: f32 = 10.0;

    pub fn new(bounds: BoundingBox) -> Self {
        Self { bounds }
    }

    pub fn bounds(&self) -> &BoundingBox {
        &self.bounds
    }
}

impl ParticleEffect for Snow {
    fn name(&self) -> &'static str {
        "snow"
    }

    fn reset_particle(&self, attribute: &mut Attribute, rng: &mut dyn RngCore) {
        let mut position = random_vector(rng, self.bounds.min, self.bounds.max);
        position.y = self.bounds.max.y;

        *attribute = Attribute {
            position,
            velocity: Vec3::new(
                sample_range(rng, 0.0, 1.0) * -Self::DRIFT,
                sample_range(rng, 0.0, 1.0) * -Self::FALL,
                0.0,
            ),
            color: Color::WHITE,
            alive: true,
            ..Attribute::default()
        };
    }

    fn update_particle(&self, attribute: &mut Attribute, dt: f32, rng: &mut dyn RngCore) {
        attribute.position += attribute.velocity * dt;

        if !self.bounds.contains(attribute.position) {
            self.reset_particle(attribute, rng);
        }
    }
}
