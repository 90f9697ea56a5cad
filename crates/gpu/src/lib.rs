//! Stateless GPU resource layer.
//!
//! Buffers, vertex layouts, textures, framebuffers and shader programs are
//! plain `Copy` handles created through a [`GpuContext`], the single
//! "current binding" object every drawable receives by `&mut`. Backends sit
//! behind the [`Device`] trait; [`HeadlessDevice`] is a software backend
//! used by tests and the CLI.
//!
//! # Invariants
//! - One handle current per binding point; creation never restores the
//!   caller's previous bindings.
//! - Every texture is sampleable from creation (1x1 opaque-blue placeholder).
//! - Shader link failure is non-fatal: the handle is returned and a
//!   [`Diagnostic`] is recorded.
//! - Unresolved uniforms yield [`UniformLocation::INVALID`]; setting it is a
//!   no-op.
//! - A program declaring a shared [`UniformBlock`] draws only while a buffer
//!   is attached to the block's slot.

mod context;
mod device;
mod error;
mod handle;
pub mod headless;
pub mod loader;
mod mesh;
pub mod reflect;
mod render_target;
mod types;
mod uniform_block;

pub use context::{Bindings, Diagnostic, DiagnosticKind, DrawStats, GpuContext, ProgramStatus};
pub use device::Device;
pub use error::{BlockError, GpuError, LoadError};
pub use handle::{BufferId, FramebufferId, ProgramId, TextureId, UniformLocation, VertexArrayId};
pub use headless::HeadlessDevice;
pub use loader::TextureLoader;
pub use mesh::{FULLSCREEN_QUAD, Mesh};
pub use reflect::{ProgramReflection, ReflectError, SampleKind, UniformBlockLayout};
pub use render_target::{ColorFormat, RenderTarget, disable_render_target};
pub use types::{
    Attachment, AttribType, BufferTarget, BufferUsage, DrawCall, DrawMode, Filter, ImageData,
    MAX_TEXTURE_UNITS, MAX_UNIFORM_BLOCKS, PLACEHOLDER_TEXEL, TextureDesc, TextureFormat,
    UniformType, UniformValue, VertexAttrib, Viewport, Wrap,
};
pub use uniform_block::UniformBlock;
