//! Particle simulation: the attribute store and its lifecycle controllers.
//!
//! # Invariants
//! - A system owns its attributes exclusively; nothing aliases them.
//! - Particles are never freed individually. Recycling overwrites in place.
//! - Randomness comes only from the system's injected, seedable generator.

mod attribute;
mod config;
mod effect;
mod firework;
mod snow;
mod system;

pub use attribute::Attribute;
pub use config::{ConfigError, EffectConfig, SystemConfig};
pub use effect::{ParticleEffect, random_vector, sample_range};
pub use firework::Firework;
pub use snow::Snow;
pub use system::ParticleSystem;

pub fn crate_info() -> &'static str {
    "flurry-particles v0.1.0"
}
