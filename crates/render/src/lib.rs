//! Streaming particle renderer: renderer-agnostic device interface, ring
//! buffer batching, and a recording device for headless use.
//!
//! # Invariants
//! - The renderer never mutates particle state; it only reads attributes.
//! - The ring offset always satisfies `0 <= offset < capacity`.
//! - A segment is locked with discard semantics only at offset 0. Every other
//!   segment is appended with no-overwrite semantics.
//! - Render state is restored to baseline on every exit from `render`.
//!
//! # Headless use
//! [`RecordingDevice`] stands in for a GPU. It implements the same
//! [`GraphicsDevice`] trait as the wgpu backend and records every call, so the
//! batching algorithm can be exercised and inspected without hardware.

mod device;
mod error;
mod recording;
mod renderer;
mod ring;

pub use device::{
    AlphaSource, BlendFactor, BlendState, BufferHandle, GraphicsDevice, LockMode, ParticleVertex,
    PointSprite, RenderState, Segment, TextureHandle,
};
pub use error::RenderError;
pub use recording::{DeviceCall, RecordingDevice};
pub use renderer::{FrameStats, RendererConfig, StreamingRenderer};
pub use ring::RingCursor;

pub fn crate_info() -> &'static str {
    "flurry-render v0.1.0"
}
