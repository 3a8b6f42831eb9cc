use flurry_common::Color;
use glam::Vec3;
use rand::RngCore;

use crate::attribute::Attribute;
use crate::effect::{ParticleEffect, random_vector, sample_range};

/// A single burst of sparks from a fixed origin.
///
/// Sparks fly outward, fade to transparent over their lifetime and then die.
/// Dead sparks are not respawned; call `reset` on the owning system to fire
/// the burst again.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Firework {
    origin: Vec3,
    speed: f32,
    lifetime: f32,
}

impl Firework {
    pub fn new(origin: Vec3, speed: f32, lifetime: f32) -> Self {
        Self {
            origin,
            speed,
            lifetime,
        }
    }

    pub fn origin(&self) -> Vec3 {
        self.origin
    }

    pub fn speed(&self) -> f32 {
        self.speed
    }

    pub fn lifetime(&self) -> f32 {
        self.lifetime
    }
}

impl Default for Firework {
    fn default() -> Self {
        Self::new(Vec3::new(0.0, 10.0, 0.0), 10.0, 2.0)
    }
}

impl ParticleEffect for Firework {
    fn name(&self) -> &'static str {
        "firework"
    }

    fn reset_particle(&self, attribute: &mut Attribute, rng: &mut dyn RngCore) {
        // A zero sample would leave the spark sitting at the origin.
        let direction = random_vector(rng, Vec3::splat(-1.0), Vec3::ONE)
            .try_normalize()
            .unwrap_or(Vec3::Y);

        let color = Color::rgb(
            sample_range(rng, 0.5, 1.0),
            sample_range(rng, 0.5, 1.0),
            sample_range(rng, 0.5, 1.0),
        );
        let fade = if self.lifetime > 0.0 {
            -1.0 / self.lifetime
        } else {
            -1.0
        };

        *attribute = Attribute {
            position: self.origin,
            velocity: direction * self.speed,
            lifetime: self.lifetime,
            age: 0.0,
            color,
            color_fade: Color::new(0.0, 0.0, 0.0, fade),
            alive: true,
            ..Attribute::default()
        };
    }

    fn update_particle(&self, attribute: &mut Attribute, dt: f32, _rng: &mut dyn RngCore) {
        if !attribute.alive {
            return;
        }

        attribute.velocity += attribute.acceleration * dt;
        attribute.position += attribute.velocity * dt;
        attribute.color = attribute.color.fade(attribute.color_fade, dt);
        attribute.age += dt;

        if attribute.age > attribute.lifetime {
            attribute.alive = false;
        }
    }
}
