//! wgpu backend for the lumen GPU resource layer.
//!
//! [`WgpuDevice`] implements [`lumen_gpu::Device`] by emulating GL-style
//! binding state on top of wgpu: every draw resolves the bound vertex
//! array, program, textures and framebuffer into a cached render pipeline
//! and a one-off render pass.
//!
//! # Invariants
//! - Draws load existing attachment contents; only clears discard them.
//! - A texture attached to the target being drawn is never sampled; a
//!   placeholder is bound in its place.
//! - The surface frame is acquired on first use and released by `present`.

mod convert;
mod device;
mod pipeline;

pub use device::WgpuDevice;
