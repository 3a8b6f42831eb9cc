//! wgpu implementation of the particle [`GraphicsDevice`](flurry_render::GraphicsDevice).
//!
//! Particles are drawn as camera-facing quads, one instance per ring-buffer
//! vertex, with distance attenuation computed in the vertex shader.
//!
//! # Invariants
//! - The device borrows `wgpu::Device` / `wgpu::Queue`; it never outlives them.
//! - Buffer writes are staged until the next submit. A discard lock submits
//!   every pending draw first, so a wrap never clobbers data still queued.
//! - A no-overwrite lock only appends; pending draws keep reading their segments.

mod gpu;
mod shaders;
mod view;

pub use gpu::WgpuParticleDevice;
pub use view::ParticleView;

pub fn crate_info() -> &'static str {
    "flurry-render-wgpu v0.1.0"
}
