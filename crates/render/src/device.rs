use bytemuck::{Pod, Zeroable};
use flurry_particles::Attribute;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::RenderError;

/// Handle to a vertex buffer owned by a [`GraphicsDevice`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferHandle(pub u32);

/// Handle to a texture owned by a [`GraphicsDevice`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureHandle(pub u32);

/// One particle as written into the ring buffer.
#[repr(C)]
#[derive(Debug, Copy, Clone, Default, PartialEq, Pod, Zeroable)]
pub struct ParticleVertex {
    pub position: [f32; 3],
    pub color: [f32; 4],
}

impl From<&Attribute> for ParticleVertex {
    fn from(a: &Attribute) -> Self {
        Self {
            position: a.position.to_array(),
            color: a.color.to_array(),
        }
    }
}

/// How a buffer segment is acquired for writing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    /// The whole buffer's prior contents may be thrown away. Only used when
    /// the ring wraps back to offset 0.
    Discard,
    /// Append-only: regions the GPU may still be reading stay untouched.
    NoOverwrite,
}

/// A contiguous range of vertices in the ring buffer, plus how it is locked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    /// First vertex of the segment.
    pub offset: u32,
    /// Number of vertices reserved.
    pub len: u32,
    pub mode: LockMode,
}

impl Segment {
    pub fn end(&self) -> u32 {
        self.offset + self.len
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlendFactor {
    One,
    Zero,
    SrcAlpha,
    InvSrcAlpha,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlendState {
    pub src: BlendFactor,
    pub dst: BlendFactor,
}

impl BlendState {
    pub const ALPHA: Self = Self {
        src: BlendFactor::SrcAlpha,
        dst: BlendFactor::InvSrcAlpha,
    };
}

/// Where fragment alpha comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlphaSource {
    /// Vertex color alpha.
    Diffuse,
    /// Alpha of the bound texture.
    Texture,
}

/// Point sprite sizing. Screen size is
/// `size * sqrt(1 / (scale_a + scale_b * d + scale_c * d^2))` for eye distance
/// `d`, clamped below by `min_size`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PointSprite {
    pub size: f32,
    pub min_size: f32,
    pub scale_a: f32,
    pub scale_b: f32,
    pub scale_c: f32,
}

impl Default for PointSprite {
    fn default() -> Self {
        Self {
            size: 1.0,
            min_size: 0.0,
            scale_a: 0.0,
            scale_b: 1.0,
            scale_c: 6.0,
        }
    }
}

/// Typed device render configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RenderState {
    pub lighting: bool,
    /// `Some` enables point sprites with distance attenuation.
    pub point_sprite: Option<PointSprite>,
    /// `None` disables blending.
    pub blend: Option<BlendState>,
    pub alpha_source: AlphaSource,
}

impl RenderState {
    /// State the rest of the scene expects between particle draws.
    pub fn baseline() -> Self {
        Self {
            lighting: true,
            point_sprite: None,
            blend: None,
            alpha_source: AlphaSource::Diffuse,
        }
    }

    /// Unlit, alpha-blended, texture-alpha point sprites.
    pub fn particles(sprite: PointSprite) -> Self {
        Self {
            lighting: false,
            point_sprite: Some(sprite),
            blend: Some(BlendState::ALPHA),
            alpha_source: AlphaSource::Texture,
        }
    }

    pub fn is_baseline(&self) -> bool {
        *self == Self::baseline()
    }
}

impl Default for RenderState {
    fn default() -> Self {
        Self::baseline()
    }
}

/// The graphics device the streaming renderer draws through.
///
/// Buffers and textures belong to the device and are referred to by handle.
/// The renderer borrows the device per call and never releases it.
pub trait GraphicsDevice {
    /// Create a dynamic, write-only vertex buffer holding `capacity` vertices.
    fn create_vertex_buffer(&mut self, capacity: u32) -> Result<BufferHandle, RenderError>;

    /// Load a texture from an image file.
    fn load_texture(&mut self, path: &Path) -> Result<TextureHandle, RenderError>;

    fn set_render_state(&mut self, state: &RenderState);

    /// Acquire exclusive write access to `segment`.
    fn lock(&mut self, buffer: BufferHandle, segment: Segment) -> Result<(), RenderError>;

    /// Release `segment`, committing `vertices` to its start. `vertices` may be
    /// shorter than the segment.
    fn unlock(&mut self, buffer: BufferHandle, segment: Segment, vertices: &[ParticleVertex]);

    /// Draw `count` point sprites starting at vertex `first`.
    fn draw_points(&mut self, buffer: BufferHandle, texture: TextureHandle, first: u32, count: u32);
}

#[cfg(test)]
mod tests {
    use super::*;
    use flurry_common::Color;
    use glam::Vec3;

    #[test]
    fn vertex_is_tightly_packed() {
        assert_eq!(std::mem::size_of::<ParticleVertex>(), 28);
    }

    #[test]
    fn vertex_from_attribute() {
        let a = Attribute {
            position: Vec3::new(1.0, 2.0, 3.0),
            color: Color::RED,
            ..Attribute::default()
        };
        let v = ParticleVertex::from(&a);
        assert_eq!(v.position, [1.0, 2.0, 3.0]);
        assert_eq!(v.color, [1.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn particle_state_differs_from_baseline() {
        let p = RenderState::particles(PointSprite::default());
        assert!(!p.is_baseline());
        assert!(!p.lighting);
        assert_eq!(p.blend, Some(BlendState::ALPHA));
        assert_eq!(p.alpha_source, AlphaSource::Texture);
        assert!(RenderState::default().is_baseline());
    }

    #[test]
    fn segment_end() {
        let s = Segment {
            offset: 512,
            len: 512,
            mode: LockMode::NoOverwrite,
        };
        assert_eq!(s.end(), 1024);
    }
}
