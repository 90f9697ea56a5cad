use std::any::Any;

use crate::handle::{BufferId, FramebufferId, ProgramId, TextureId, VertexArrayId};
use crate::reflect::ProgramReflection;
use crate::types::{
    Attachment, BufferTarget, BufferUsage, DrawCall, Filter, TextureDesc, VertexAttrib, Viewport,
    Wrap,
};

/// Backend seam under [`GpuContext`](crate::GpuContext).
///
/// Commands are GL-style primitives that act on the device's *own* current
/// bindings: `buffer_data` writes whatever buffer is bound to the target,
/// `draw` uses the bound vertex array, program, textures and framebuffer.
/// The context issues binds before every command that needs them, so a
/// backend never has to guess.
///
/// Unknown ids are tolerated everywhere (treated as "nothing bound").
pub trait Device: Any {
    /// Short backend name for logs ("headless", "wgpu").
    fn backend_name(&self) -> &'static str;

    fn create_buffer(&mut self, id: BufferId);
    fn bind_buffer(&mut self, target: BufferTarget, id: Option<BufferId>);
    fn buffer_data(&mut self, target: BufferTarget, data: &[u8], usage: BufferUsage);
    fn buffer_sub_data(&mut self, target: BufferTarget, offset: usize, data: &[u8]);
    /// Attach a buffer to shared uniform block `slot`. Draws read the
    /// buffer's current contents for every block the program declares.
    fn bind_uniform_block(&mut self, slot: u32, id: Option<BufferId>);

    fn create_vertex_array(&mut self, id: VertexArrayId);
    fn bind_vertex_array(&mut self, id: Option<VertexArrayId>);
    /// Record `attrib` in the bound vertex array, sourcing from the buffer
    /// currently bound to [`BufferTarget::Array`].
    fn vertex_attrib(&mut self, attrib: &VertexAttrib);
    fn attrib_divisor(&mut self, location: u32, divisor: u32);

    fn create_texture(&mut self, id: TextureId);
    fn active_texture(&mut self, unit: u32);
    /// Bind to the active texture unit.
    fn bind_texture(&mut self, id: Option<TextureId>);
    /// (Re)allocate storage of the bound texture. `None` leaves it undefined.
    fn texture_data(&mut self, desc: &TextureDesc, data: Option<&[u8]>);
    fn texture_params(&mut self, filter: Filter, wrap: Wrap);

    fn create_framebuffer(&mut self, id: FramebufferId);
    fn bind_framebuffer(&mut self, id: Option<FramebufferId>);
    /// Attach to the bound framebuffer.
    fn framebuffer_texture(&mut self, attachment: Attachment, texture: TextureId);

    /// Compile and link. `Err` carries the backend's info log.
    fn link_program(
        &mut self,
        id: ProgramId,
        vertex: &str,
        fragment: &str,
        reflection: &ProgramReflection,
    ) -> Result<(), String>;
    fn use_program(&mut self, id: Option<ProgramId>);
    /// Write into the uniform block of the current program.
    fn uniform(&mut self, offset: usize, bytes: &[u8]);

    fn viewport(&mut self, viewport: Viewport);
    /// Clear colour and depth of the bound framebuffer.
    fn clear(&mut self, color: [f32; 4], depth: f32);
    /// Clear an integer colour attachment and depth of the bound framebuffer.
    fn clear_uint(&mut self, value: [u32; 4], depth: f32);
    fn draw(&mut self, call: &DrawCall);
    /// Finish the frame on the default surface.
    fn present(&mut self);
    fn resize(&mut self, width: u32, height: u32);

    /// Drain asynchronous backend errors (validation, device loss).
    fn take_errors(&mut self) -> Vec<String>;

    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}
