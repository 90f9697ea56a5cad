use crate::context::GpuContext;
use crate::handle::{BufferId, VertexArrayId};
use crate::types::DrawMode;

/// A vertex array plus the buffers feeding it, built by [`GpuContext::mesh`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mesh {
    pub(crate) vao: VertexArrayId,
    pub(crate) vertex_buffer: BufferId,
    pub(crate) index_buffer: Option<BufferId>,
    pub(crate) count: u32,
    pub(crate) mode: DrawMode,
}

impl Mesh {
    pub fn vao(&self) -> VertexArrayId {
        self.vao
    }

    pub fn vertex_buffer(&self) -> BufferId {
        self.vertex_buffer
    }

    pub fn index_buffer(&self) -> Option<BufferId> {
        self.index_buffer
    }

    /// Index count when indexed, vertex count otherwise.
    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn mode(&self) -> DrawMode {
        self.mode
    }

    /// Bind this mesh's vertex array and draw it once with the current
    /// program. Leaves the vertex array bound.
    pub fn draw(&self, ctx: &mut GpuContext) {
        self.draw_instanced(ctx, 1);
    }

    pub fn draw_instanced(&self, ctx: &mut GpuContext, instances: u32) {
        ctx.bind_vertex_array(self.vao);
        if self.index_buffer.is_some() {
            ctx.draw_elements_instanced(self.mode, 0, self.count, instances);
        } else {
            ctx.draw_arrays_instanced(self.mode, 0, self.count, instances);
        }
    }
}

/// Two triangles covering clip space, as a 4-vertex strip of `vec2` positions.
pub const FULLSCREEN_QUAD: [f32; 8] = [-1.0, -1.0, 1.0, -1.0, -1.0, 1.0, 1.0, 1.0];

impl GpuContext {
    /// Full-screen quad at attribute location 0. Leaves its vertex array bound.
    pub fn fullscreen_quad(&mut self) -> Mesh {
        self.mesh(
            &FULLSCREEN_QUAD,
            &[],
            &[crate::types::VertexAttrib::new(0, 2)],
            DrawMode::TriangleStrip,
        )
    }
}
