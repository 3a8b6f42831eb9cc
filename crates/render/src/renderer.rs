use flurry_particles::Attribute;
use serde::{Deserialize, Serialize};
use std::ops::{Deref, DerefMut};
use std::path::Path;

use crate::device::{
    BufferHandle, GraphicsDevice, ParticleVertex, PointSprite, RenderState, TextureHandle,
};
use crate::error::RenderError;
use crate::ring::RingCursor;

/// Ring geometry and sprite parameters for a [`StreamingRenderer`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    /// Total vertices in the ring buffer.
    pub capacity: u32,
    /// Vertices per segment. `capacity` must be a multiple of it.
    pub batch_size: u32,
    pub sprite: PointSprite,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            capacity: 2048,
            batch_size: 512,
            sprite: PointSprite::default(),
        }
    }
}

/// Per-frame rendering statistics for instrumentation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub draw_calls: u32,
    pub particles_drawn: u32,
    pub segments_locked: u32,
    /// Ring offset after the frame, where the next frame starts.
    pub offset: u32,
}

/// Applies the particle render state for its lifetime and restores the
/// baseline state when dropped, on every path out of `render`.
struct StateScope<'a, D: GraphicsDevice + ?Sized> {
    device: &'a mut D,
}

impl<'a, D: GraphicsDevice + ?Sized> StateScope<'a, D> {
    fn enter(device: &'a mut D, state: &RenderState) -> Self {
        device.set_render_state(state);
        Self { device }
    }
}

impl<D: GraphicsDevice + ?Sized> Deref for StateScope<'_, D> {
    type Target = D;

    fn deref(&self) -> &D {
        self.device
    }
}

impl<D: GraphicsDevice + ?Sized> DerefMut for StateScope<'_, D> {
    fn deref_mut(&mut self) -> &mut D {
        self.device
    }
}

impl<D: GraphicsDevice + ?Sized> Drop for StateScope<'_, D> {
    fn drop(&mut self) {
        self.device.set_render_state(&RenderState::baseline());
    }
}

/// Streams alive particles through a ring vertex buffer in fixed-size batches.
///
/// Each filled batch is released and drawn while the next segment is being
/// filled. Segments are locked with no-overwrite semantics except at offset 0,
/// where the ring wraps and discard is safe. The offset moves forward one
/// batch per frame on top of the per-batch moves, so consecutive frames never
/// start on the segment the previous frame just submitted.
///
/// The renderer holds only handles. The device that owns them is passed to
/// every call and must outlive the renderer; the renderer never releases it.
#[derive(Debug)]
pub struct StreamingRenderer {
    buffer: BufferHandle,
    texture: TextureHandle,
    ring: RingCursor,
    state: RenderState,
    staging: Vec<ParticleVertex>,
}

impl StreamingRenderer {
    /// Create the ring vertex buffer and load the sprite texture.
    ///
    /// Any failure is fatal for this renderer and is returned as is; nothing
    /// is retried.
    pub fn init<D: GraphicsDevice + ?Sized>(
        device: &mut D,
        texture_path: impl AsRef<Path>,
        config: RendererConfig,
    ) -> Result<Self, RenderError> {
        let texture_path = texture_path.as_ref();
        let ring = RingCursor::new(config.capacity, config.batch_size)?;

        let buffer = device
            .create_vertex_buffer(config.capacity)
            .inspect_err(|e| tracing::error!(error = %e, "particle vertex buffer creation failed"))?;
        let texture = device
            .load_texture(texture_path)
            .inspect_err(|e| tracing::error!(error = %e, "particle texture load failed"))?;

        tracing::info!(
            capacity = config.capacity,
            batch_size = config.batch_size,
            segments = ring.segment_count(),
            texture = %texture_path.display(),
            "particle renderer initialised"
        );

        Ok(Self {
            buffer,
            texture,
            ring,
            state: RenderState::particles(config.sprite),
            staging: Vec::with_capacity(config.batch_size as usize),
        })
    }

    pub fn ring(&self) -> &RingCursor {
        &self.ring
    }

    pub fn buffer(&self) -> BufferHandle {
        self.buffer
    }

    pub fn texture(&self) -> TextureHandle {
        self.texture
    }

    /// Draw every alive particle.
    ///
    /// Does nothing when `particles` is empty. A lock failure aborts the rest
    /// of the frame and is returned; the render state is still restored and
    /// the ring stays on the segment that failed.
    pub fn render<D: GraphicsDevice + ?Sized>(
        &mut self,
        device: &mut D,
        particles: &[Attribute],
    ) -> Result<FrameStats, RenderError> {
        if particles.is_empty() {
            return Ok(FrameStats {
                offset: self.ring.offset(),
                ..FrameStats::default()
            });
        }

        let _span = tracing::trace_span!("particle_render", particles = particles.len()).entered();
        let batch_size = self.ring.batch_size();
        let mut stats = FrameStats::default();
        let mut device = StateScope::enter(device, &self.state);

        let mut segment = self.ring.segment();
        device.lock(self.buffer, segment)?;
        stats.segments_locked += 1;
        self.staging.clear();

        for attribute in particles.iter().filter(|a| a.alive) {
            self.staging.push(ParticleVertex::from(attribute));

            if self.staging.len() as u32 == batch_size {
                device.unlock(self.buffer, segment, &self.staging);
                device.draw_points(self.buffer, self.texture, segment.offset, batch_size);
                stats.draw_calls += 1;
                stats.particles_drawn += batch_size;

                // Fill the next segment while the GPU draws this one.
                self.ring.advance();
                segment = self.ring.segment();
                device.lock(self.buffer, segment)?;
                stats.segments_locked += 1;
                self.staging.clear();
            }
        }

        device.unlock(self.buffer, segment, &self.staging);
        if !self.staging.is_empty() {
            let count = self.staging.len() as u32;
            device.draw_points(self.buffer, self.texture, segment.offset, count);
            stats.draw_calls += 1;
            stats.particles_drawn += count;
        }

        self.ring.advance();
        stats.offset = self.ring.offset();

        tracing::trace!(
            draw_calls = stats.draw_calls,
            drawn = stats.particles_drawn,
            offset = stats.offset,
            "particle frame rendered"
        );
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::LockMode;
    use crate::recording::{DeviceCall, RecordingDevice};
    use flurry_common::{BoundingBox, Color};
    use flurry_particles::{Firework, ParticleSystem, Snow};
    use glam::Vec3;

    fn alive(n: usize) -> Vec<Attribute> {
        (0..n)
            .map(|i| Attribute {
                position: Vec3::new(i as f32, 0.0, 0.0),
                ..Attribute::default()
            })
            .collect()
    }

    fn setup() -> (RecordingDevice, StreamingRenderer) {
        let mut dev = RecordingDevice::new();
        let renderer =
            StreamingRenderer::init(&mut dev, "snowflake.dds", RendererConfig::default()).unwrap();
        dev.clear_calls();
        (dev, renderer)
    }

    #[test]
    fn init_creates_buffer_and_texture() {
        let mut dev = RecordingDevice::new();
        let r = StreamingRenderer::init(&mut dev, "snowflake.dds", RendererConfig::default())
            .unwrap();
        assert_eq!(r.ring().offset(), 0);
        assert_eq!(r.ring().capacity(), 2048);
        assert_eq!(dev.buffer_contents(r.buffer()).unwrap().len(), 2048);
        assert_eq!(
            dev.texture_path(r.texture()),
            Some(Path::new("snowflake.dds"))
        );
    }

    #[test]
    fn init_failures_are_fatal() {
        let mut dev = RecordingDevice::new().fail_buffer_creation();
        let err = StreamingRenderer::init(&mut dev, "a.dds", RendererConfig::default()).unwrap_err();
        assert!(matches!(err, RenderError::BufferCreation(_)));
        assert!(!err.is_recoverable());

        let mut dev = RecordingDevice::new().fail_texture_load();
        let err = StreamingRenderer::init(&mut dev, "a.dds", RendererConfig::default()).unwrap_err();
        assert!(matches!(err, RenderError::TextureLoad { .. }));
    }

    #[test]
    fn init_rejects_ragged_ring() {
        let mut dev = RecordingDevice::new();
        let config = RendererConfig {
            capacity: 1000,
            batch_size: 512,
            ..RendererConfig::default()
        };
        let err = StreamingRenderer::init(&mut dev, "a.dds", config).unwrap_err();
        assert!(matches!(err, RenderError::InvalidRing { .. }));
        assert!(dev.calls().is_empty());
    }

    #[test]
    fn empty_store_is_a_no_op() {
        let (mut dev, mut r) = setup();
        let stats = r.render(&mut dev, &[]).unwrap();
        assert_eq!(stats.draw_calls, 0);
        assert!(dev.calls().is_empty());
        assert_eq!(r.ring().offset(), 0);
    }

    #[test]
    fn thirteen_hundred_particles_make_three_draws() {
        let (mut dev, mut r) = setup();
        let stats = r.render(&mut dev, &alive(1300)).unwrap();

        assert_eq!(dev.draw_counts(), vec![512, 512, 276]);
        assert_eq!(dev.draws(), vec![(0, 512), (512, 512), (1024, 276)]);
        assert_eq!(stats.draw_calls, 3);
        assert_eq!(stats.particles_drawn, 1300);
        assert_eq!(stats.segments_locked, 3);

        let modes: Vec<LockMode> = dev.locks().iter().map(|s| s.mode).collect();
        assert_eq!(
            modes,
            vec![LockMode::Discard, LockMode::NoOverwrite, LockMode::NoOverwrite]
        );
        assert_eq!(r.ring().offset(), 1536);
    }

    #[test]
    fn offset_advances_one_batch_per_light_frame() {
        let (mut dev, mut r) = setup();
        let particles = alive(100);
        for n in 1..=12u32 {
            let stats = r.render(&mut dev, &particles).unwrap();
            assert_eq!(r.ring().offset(), (n * 512) % 2048);
            assert_eq!(stats.offset, r.ring().offset());
            assert_eq!(stats.draw_calls, 1);
        }
        assert!(dev.overwrite_hazards().is_empty());
    }

    #[test]
    fn exact_multiple_has_no_terminal_draw() {
        let (mut dev, mut r) = setup();
        let stats = r.render(&mut dev, &alive(1024)).unwrap();
        assert_eq!(dev.draw_counts(), vec![512, 512]);
        assert_eq!(stats.segments_locked, 3);
        assert_eq!(r.ring().offset(), 1536);
    }

    #[test]
    fn heavy_frame_wraps_with_discard_only_at_zero() {
        let (mut dev, mut r) = setup();
        r.render(&mut dev, &alive(5000)).unwrap();

        let draws = dev.draws();
        assert_eq!(draws.len(), 10);
        assert_eq!(draws[9], (512, 392));
        for segment in dev.locks() {
            let expected = if segment.offset == 0 {
                LockMode::Discard
            } else {
                LockMode::NoOverwrite
            };
            assert_eq!(segment.mode, expected);
        }
        assert!(dev.overwrite_hazards().is_empty());
        assert_eq!(r.ring().offset(), 1024);
    }

    #[test]
    fn single_segment_ring_discards_every_lock() {
        let mut dev = RecordingDevice::new();
        let config = RendererConfig {
            capacity: 512,
            batch_size: 512,
            ..RendererConfig::default()
        };
        let mut r = StreamingRenderer::init(&mut dev, "snowflake.dds", config).unwrap();
        dev.clear_calls();

        let stats = r.render(&mut dev, &alive(1300)).unwrap();
        assert_eq!(dev.draws(), vec![(0, 512), (0, 512), (0, 276)]);
        assert_eq!(stats.segments_locked, 3);
        assert!(dev.locks().iter().all(|s| s.mode == LockMode::Discard));
        assert!(dev.overwrite_hazards().is_empty());
        assert_eq!(r.ring().offset(), 0);
    }

    #[test]
    fn many_frames_never_overwrite_in_flight_segments() {
        let (mut dev, mut r) = setup();
        for n in [1, 511, 512, 513, 1300, 2048, 3000, 7, 5000, 0, 64] {
            let mut particles = alive(n);
            particles.push(Attribute {
                alive: false,
                ..Attribute::default()
            });
            r.render(&mut dev, &particles).unwrap();
            assert!(r.ring().offset() < r.ring().capacity());
        }
        assert!(dev.overwrite_hazards().is_empty());
        assert!(!dev.is_locked());
    }

    #[test]
    fn state_is_scoped_to_the_frame() {
        let (mut dev, mut r) = setup();
        r.render(&mut dev, &alive(700)).unwrap();

        let calls = dev.calls();
        assert!(matches!(calls.first(), Some(DeviceCall::SetState(s)) if !s.is_baseline()));
        assert!(matches!(calls.last(), Some(DeviceCall::SetState(s)) if s.is_baseline()));
        assert!(dev.state().is_baseline());
        assert_eq!(dev.unscoped_draws(), 0);
    }

    #[test]
    fn dead_particles_are_skipped() {
        let (mut dev, mut r) = setup();
        let mut particles = alive(6);
        particles[1].alive = false;
        particles[4].alive = false;
        particles[2].color = Color::BLUE;

        let stats = r.render(&mut dev, &particles).unwrap();
        assert_eq!(stats.particles_drawn, 4);

        let contents = dev.buffer_contents(r.buffer()).unwrap();
        let xs: Vec<f32> = contents[..4].iter().map(|v| v.position[0]).collect();
        assert_eq!(xs, vec![0.0, 2.0, 3.0, 5.0]);
        assert_eq!(contents[1].color, Color::BLUE.to_array());
    }

    #[test]
    fn no_alive_particles_still_toggles_and_advances() {
        let (mut dev, mut r) = setup();
        let mut system = ParticleSystem::with_seed(Firework::new(Vec3::ZERO, 1.0, 0.5), 20, 1);
        for _ in 0..10 {
            system.update(0.1);
        }
        assert!(system.is_dead() && !system.is_empty());

        let stats = r.render(&mut dev, system.particles()).unwrap();
        assert_eq!(stats.draw_calls, 0);
        assert_eq!(stats.segments_locked, 1);
        assert!(dev.draws().is_empty());
        assert_eq!(r.ring().offset(), 512);
        assert!(dev.state().is_baseline());
    }

    #[test]
    fn lock_failure_skips_rest_of_frame() {
        let (mut dev, mut r) = setup();
        dev.fail_lock_at(1);

        let err = r.render(&mut dev, &alive(1300)).unwrap_err();
        assert!(matches!(err, RenderError::SegmentLock { offset: 512, .. }));
        assert!(err.is_recoverable());
        assert_eq!(dev.draw_counts(), vec![512]);
        assert!(dev.state().is_baseline());
        assert!(!dev.is_locked());
        assert_eq!(r.ring().offset(), 512);

        dev.clear_calls();
        r.render(&mut dev, &alive(1300)).unwrap();
        assert_eq!(dev.draws(), vec![(512, 512), (1024, 512), (1536, 276)]);
        assert_eq!(r.ring().offset(), 0);
        assert!(dev.overwrite_hazards().is_empty());
    }

    #[test]
    fn snow_scene_end_to_end() {
        let bounds = BoundingBox::new(Vec3::splat(-10.0), Vec3::splat(10.0));
        let mut system = ParticleSystem::with_seed(Snow::new(bounds), 5000, 123);
        let (mut dev, mut r) = setup();

        for _ in 0..30 {
            system.update(1.0 / 30.0);
            let stats = r.render(&mut dev, system.particles()).unwrap();
            assert_eq!(stats.particles_drawn, 5000);
            assert_eq!(stats.draw_calls, 10);
        }
        assert!(dev.overwrite_hazards().is_empty());
        assert_eq!(dev.unscoped_draws(), 0);
    }
}
