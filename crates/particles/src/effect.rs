use glam::Vec3;
use rand::{Rng, RngCore};
use std::cmp::Ordering;

use crate::attribute::Attribute;

/// Lifecycle controller for one kind of particle effect.
///
/// A variant decides how a particle is (re)spawned and how it advances each
/// frame. Recycling variants respawn out-of-range particles in place; aging
/// variants flip `alive` to false and leave compaction to the caller.
pub trait ParticleEffect {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Spawn rule: overwrite every field of `attribute` with a fresh particle.
    fn reset_particle(&self, attribute: &mut Attribute, rng: &mut dyn RngCore);

    /// Advance one particle by `dt` seconds.
    fn update_particle(&self, attribute: &mut Attribute, dt: f32, rng: &mut dyn RngCore);
}

/// Uniform sample in `[low, high)`.
///
/// Returns `low` unchanged when the range is empty or inverted (or NaN),
/// rather than failing.
pub fn sample_range(rng: &mut dyn RngCore, low: f32, high: f32) -> f32 {
    if low.partial_cmp(&high) != Some(Ordering::Less) {
        return low;
    }
    let t: f32 = rng.gen_range(0.0..1.0);
    low + t * (high - low)
}

/// Per-component [`sample_range`] between two corners.
pub fn random_vector(rng: &mut dyn RngCore, min: Vec3, max: Vec3) -> Vec3 {
    Vec3::new(
        sample_range(rng, min.x, max.x),
        sample_range(rng, min.y, max.y),
        sample_range(rng, min.z, max.z),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn inverted_range_returns_low() {
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(sample_range(&mut rng, 5.0, 2.0), 5.0);
        assert_eq!(sample_range(&mut rng, 3.0, 3.0), 3.0);
    }

    #[test]
    fn nan_bound_returns_low() {
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(sample_range(&mut rng, 1.0, f32::NAN), 1.0);
    }

    #[test]
    fn samples_stay_in_range() {
        let mut rng = StdRng::seed_from_u64(9);
        for _ in 0..1000 {
            let v = sample_range(&mut rng, -3.0, 7.0);
            assert!((-3.0..=7.0).contains(&v), "{v} out of range");
        }
    }

    #[test]
    fn same_seed_same_samples() {
        let mut a = StdRng::seed_from_u64(42);
        let mut b = StdRng::seed_from_u64(42);
        for _ in 0..32 {
            assert_eq!(sample_range(&mut a, 0.0, 1.0), sample_range(&mut b, 0.0, 1.0));
        }
    }

    #[test]
    fn random_vector_respects_flat_axis() {
        let mut rng = StdRng::seed_from_u64(3);
        let v = random_vector(&mut rng, Vec3::new(-1.0, 4.0, -1.0), Vec3::new(1.0, 4.0, 1.0));
        assert_eq!(v.y, 4.0);
        assert!((-1.0..=1.0).contains(&v.x));
        assert!((-1.0..=1.0).contains(&v.z));
    }
}
