use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::attribute::Attribute;
use crate::effect::ParticleEffect;

/// A pool of particles driven by one lifecycle controller.
///
/// The system owns its attributes and its random generator. Attributes are
/// created up front and then mutated in place; a recycling effect keeps the
/// pool at a constant size for the lifetime of the system.
///
/// Randomness is injected: build with [`ParticleSystem::with_seed`] (or pass a
/// generator to [`ParticleSystem::new`]) and the same seed plus the same
/// sequence of `update` calls yields identical particle state.
#[derive(Debug, Clone)]
pub struct ParticleSystem<E: ParticleEffect> {
    effect: E,
    particles: Vec<Attribute>,
    rng: StdRng,
}

impl<E: ParticleEffect> ParticleSystem<E> {
    /// Create a system with `count` freshly spawned particles.
    pub fn new(effect: E, count: usize, rng: StdRng) -> Self {
        let mut system = Self {
            effect,
            particles: Vec::with_capacity(count),
            rng,
        };
        for _ in 0..count {
            system.add_particle();
        }
        tracing::debug!(
            effect = system.effect.name(),
            count,
            "particle system created"
        );
        system
    }

    /// Create a system whose generator is seeded with `seed`.
    pub fn with_seed(effect: E, count: usize, seed: u64) -> Self {
        Self::new(effect, count, StdRng::seed_from_u64(seed))
    }

    /// Append one particle initialised by the effect's spawn rule.
    pub fn add_particle(&mut self) {
        let mut attribute = Attribute::default();
        self.effect.reset_particle(&mut attribute, &mut self.rng);
        self.particles.push(attribute);
    }

    /// Respawn every particle.
    pub fn reset(&mut self) {
        for attribute in &mut self.particles {
            self.effect.reset_particle(attribute, &mut self.rng);
        }
        tracing::debug!(effect = self.effect.name(), "particle system reset");
    }

    /// Advance every particle by `dt` seconds.
    pub fn update(&mut self, dt: f32) {
        let _span = tracing::trace_span!("particle_update", effect = self.effect.name()).entered();
        for attribute in &mut self.particles {
            self.effect.update_particle(attribute, dt, &mut self.rng);
        }
    }

    /// True iff the pool holds no particles at all.
    pub fn is_empty(&self) -> bool {
        self.particles.is_empty()
    }

    /// True iff no particle is alive. An empty pool is dead.
    pub fn is_dead(&self) -> bool {
        !self.particles.iter().any(|p| p.alive)
    }

    /// Drop every dead particle, keeping survivors in their original order.
    /// Returns how many were removed.
    pub fn remove_dead_particles(&mut self) -> usize {
        let before = self.particles.len();
        self.particles.retain(|p| p.alive);
        let removed = before - self.particles.len();
        if removed > 0 {
            tracing::trace!(removed, remaining = self.particles.len(), "removed dead particles");
        }
        removed
    }

    /// Read-only view of the pool, in spawn order.
    pub fn particles(&self) -> &[Attribute] {
        &self.particles
    }

    /// Mutable access for callers that seed or edit particles directly.
    pub fn particles_mut(&mut self) -> &mut [Attribute] {
        &mut self.particles
    }

    pub fn len(&self) -> usize {
        self.particles.len()
    }

    pub fn alive_count(&self) -> usize {
        self.particles.iter().filter(|p| p.alive).count()
    }

    pub fn effect(&self) -> &E {
        &self.effect
    }
}
