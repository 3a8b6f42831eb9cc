use flurry_common::BoundingBox;
use glam::Vec3;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::firework::Firework;
use crate::snow::Snow;

/// Errors from loading a particle system configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Which effect drives the system, with its parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EffectConfig {
    Snow {
        bounds: BoundingBox,
    },
    Firework {
        origin: Vec3,
        speed: f32,
        lifetime: f32,
    },
}

impl EffectConfig {
    pub fn snow(&self) -> Option<Snow> {
        match *self {
            Self::Snow { bounds } => Some(Snow::new(bounds)),
            Self::Firework { .. } => None,
        }
    }

    pub fn firework(&self) -> Option<Firework> {
        match *self {
            Self::Firework {
                origin,
                speed,
                lifetime,
            } => Some(Firework::new(origin, speed, lifetime)),
            Self::Snow { .. } => None,
        }
    }
}

impl Default for EffectConfig {
    fn default() -> Self {
        Self::Snow {
            bounds: BoundingBox::default(),
        }
    }
}

/// Particle system configuration: effect, pool size and RNG seed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemConfig {
    pub effect: EffectConfig,
    pub particle_count: usize,
    pub seed: u64,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            effect: EffectConfig::default(),
            particle_count: 5000,
            seed: 123,
        }
    }
}

impl SystemConfig {
    /// Load a configuration from a JSON file. Missing fields take their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let file = std::fs::File::open(path)?;
        let config: Self = serde_json::from_reader(file)?;
        Ok(config)
    }

    /// Save the configuration as pretty-printed JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let file = std::fs::File::create(path)?;
        serde_json::to_writer_pretty(file, self)?;
        Ok(())
    }
}
