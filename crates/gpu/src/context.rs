//! Binding-state context over a [`Device`].
//!
//! # Invariants
//! - Exactly one handle is current per binding point; rebinding replaces it.
//! - Creation calls perform only the binds needed to configure the resource
//!   and never restore the caller's previous binding. Each method documents
//!   what it leaves bound.
//! - Shader failures never panic or return `Err`: they are logged, recorded
//!   as a [`Diagnostic`], and later draws with that program are skipped.

use std::collections::{HashMap, HashSet};

use bytemuck::Pod;

use crate::device::Device;
use crate::handle::{BufferId, FramebufferId, ProgramId, TextureId, UniformLocation, VertexArrayId};
use crate::mesh::Mesh;
use crate::reflect::{self, ProgramReflection};
use crate::types::{
    Attachment, BufferTarget, BufferUsage, DrawCall, DrawMode, Filter, ImageData,
    MAX_TEXTURE_UNITS, MAX_UNIFORM_BLOCKS, PLACEHOLDER_TEXEL, TextureDesc, UniformValue,
    VertexAttrib, Viewport, Wrap,
};

/// Mirror of what is currently bound on the device.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Bindings {
    pub array_buffer: Option<BufferId>,
    /// Element buffer of the bound vertex array.
    pub element_buffer: Option<BufferId>,
    pub uniform_buffer: Option<BufferId>,
    /// Buffers attached to the shared uniform block slots.
    pub uniform_blocks: [Option<BufferId>; MAX_UNIFORM_BLOCKS],
    pub vertex_array: Option<VertexArrayId>,
    /// `None` is the default surface.
    pub framebuffer: Option<FramebufferId>,
    pub program: Option<ProgramId>,
    pub active_unit: u32,
    pub texture_units: [Option<TextureId>; MAX_TEXTURE_UNITS],
    pub viewport: Viewport,
}

impl Bindings {
    pub fn texture(&self, unit: u32) -> Option<TextureId> {
        self.texture_units.get(unit as usize).copied().flatten()
    }

    pub fn uniform_block(&self, slot: u32) -> Option<BufferId> {
        self.uniform_blocks.get(slot as usize).copied().flatten()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgramStatus {
    Linked,
    Failed { log: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticKind {
    ShaderLink,
    Device,
}

/// Side-channel record of a degraded, non-fatal condition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub program: Option<ProgramId>,
    pub message: String,
}

/// Counters since the last [`GpuContext::take_stats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrawStats {
    pub draws: u64,
    pub skipped_draws: u64,
    pub clears: u64,
    pub presents: u64,
}

struct ProgramInfo {
    status: ProgramStatus,
    reflection: ProgramReflection,
}

/// The single "current binding" context. Every resource call goes through
/// `&mut GpuContext`.
pub struct GpuContext {
    device: Box<dyn Device>,
    bindings: Bindings,
    surface: (u32, u32),
    clear_color: [f32; 4],
    next_id: u32,
    programs: HashMap<ProgramId, ProgramInfo>,
    vao_elements: HashMap<VertexArrayId, BufferId>,
    textures: HashMap<TextureId, TextureDesc>,
    diagnostics: Vec<Diagnostic>,
    warned: HashSet<Option<ProgramId>>,
    warned_blocks: HashSet<(ProgramId, u32)>,
    stats: DrawStats,
}

impl GpuContext {
    pub fn new(device: Box<dyn Device>, width: u32, height: u32) -> Self {
        tracing::info!(backend = device.backend_name(), width, height, "GPU context created");
        let mut ctx = Self {
            device,
            bindings: Bindings::default(),
            surface: (width, height),
            clear_color: [0.0, 0.0, 0.0, 1.0],
            next_id: 0,
            programs: HashMap::new(),
            vao_elements: HashMap::new(),
            textures: HashMap::new(),
            diagnostics: Vec::new(),
            warned: HashSet::new(),
            warned_blocks: HashSet::new(),
            stats: DrawStats::default(),
        };
        ctx.viewport(0, 0, width, height);
        ctx
    }

    fn alloc(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }

    pub fn bindings(&self) -> &Bindings {
        &self.bindings
    }

    pub fn surface_size(&self) -> (u32, u32) {
        self.surface
    }

    pub fn aspect(&self) -> f32 {
        self.surface.0 as f32 / self.surface.1.max(1) as f32
    }

    pub fn device(&self) -> &dyn Device {
        self.device.as_ref()
    }

    /// Downcast the backend, e.g. to inspect a headless device in tests.
    pub fn device_as<D: Device>(&self) -> Option<&D> {
        self.device.as_any().downcast_ref::<D>()
    }

    pub fn device_as_mut<D: Device>(&mut self) -> Option<&mut D> {
        self.device.as_any_mut().downcast_mut::<D>()
    }

    pub fn clear_color(&self) -> [f32; 4] {
        self.clear_color
    }

    pub fn set_clear_color(&mut self, color: [f32; 4]) -> &mut Self {
        self.clear_color = color;
        self
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn take_diagnostics(&mut self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.diagnostics)
    }

    pub fn stats(&self) -> DrawStats {
        self.stats
    }

    pub fn take_stats(&mut self) -> DrawStats {
        std::mem::take(&mut self.stats)
    }

    /// Descriptor of the storage last allocated for `texture`.
    pub fn texture_desc(&self, texture: TextureId) -> Option<TextureDesc> {
        self.textures.get(&texture).copied()
    }

    // ---- buffers ---------------------------------------------------------

    /// Allocate a buffer handle. Binds nothing.
    pub fn create_buffer(&mut self) -> BufferId {
        let id = BufferId(self.alloc());
        self.device.create_buffer(id);
        id
    }

    /// Binding an element buffer also records it in the bound vertex array.
    pub fn bind_buffer(&mut self, target: BufferTarget, buffer: BufferId) -> &mut Self {
        self.set_buffer_binding(target, Some(buffer));
        self
    }

    pub fn unbind_buffer(&mut self, target: BufferTarget) -> &mut Self {
        self.set_buffer_binding(target, None);
        self
    }

    fn set_buffer_binding(&mut self, target: BufferTarget, buffer: Option<BufferId>) {
        match target {
            BufferTarget::Array => self.bindings.array_buffer = buffer,
            BufferTarget::Uniform => self.bindings.uniform_buffer = buffer,
            BufferTarget::ElementArray => {
                self.bindings.element_buffer = buffer;
                if let Some(vao) = self.bindings.vertex_array {
                    match buffer {
                        Some(b) => self.vao_elements.insert(vao, b),
                        None => self.vao_elements.remove(&vao),
                    };
                }
            }
        }
        self.device.bind_buffer(target, buffer);
    }

    /// Leaves `buffer` bound to `target`.
    pub fn set_buffer_data<T: Pod>(
        &mut self,
        target: BufferTarget,
        buffer: BufferId,
        data: &[T],
        usage: BufferUsage,
    ) -> &mut Self {
        self.bind_buffer(target, buffer);
        self.device
            .buffer_data(target, bytemuck::cast_slice(data), usage);
        self
    }

    /// Leaves `buffer` bound to `target`.
    pub fn set_buffer_sub_data<T: Pod>(
        &mut self,
        target: BufferTarget,
        buffer: BufferId,
        offset: usize,
        data: &[T],
    ) -> &mut Self {
        self.bind_buffer(target, buffer);
        self.device
            .buffer_sub_data(target, offset, bytemuck::cast_slice(data));
        self
    }

    /// Attach `buffer` to shared uniform block `slot`, or detach with `None`.
    /// Out-of-range slots are ignored with a warning. Leaves the
    /// [`BufferTarget::Uniform`] binding untouched.
    pub fn bind_uniform_block(&mut self, slot: u32, buffer: Option<BufferId>) -> &mut Self {
        let Some(bound) = self.bindings.uniform_blocks.get_mut(slot as usize) else {
            tracing::warn!(slot, "uniform block slot out of range, ignored");
            return self;
        };
        *bound = buffer;
        self.device.bind_uniform_block(slot, buffer);
        self
    }

    /// Upload `u16` indices. Leaves `buffer` bound as the element buffer of
    /// the current vertex array.
    pub fn set_element_data(&mut self, buffer: BufferId, indices: &[u16]) -> &mut Self {
        self.set_buffer_data(BufferTarget::ElementArray, buffer, indices, BufferUsage::Static)
    }

    // ---- vertex layouts --------------------------------------------------

    /// Create and bind a vertex array.
    pub fn create_vertex_array(&mut self) -> VertexArrayId {
        let id = VertexArrayId(self.alloc());
        self.device.create_vertex_array(id);
        self.bind_vertex_array(id);
        id
    }

    pub fn bind_vertex_array(&mut self, vao: VertexArrayId) -> &mut Self {
        self.bindings.vertex_array = Some(vao);
        self.bindings.element_buffer = self.vao_elements.get(&vao).copied();
        self.device.bind_vertex_array(Some(vao));
        self
    }

    pub fn unbind_vertex_array(&mut self) -> &mut Self {
        self.bindings.vertex_array = None;
        self.bindings.element_buffer = None;
        self.device.bind_vertex_array(None);
        self
    }

    /// Bind `vao` and point `attrib` at the currently bound array buffer.
    /// Leaves `vao` bound.
    pub fn set_vertex_attrib(&mut self, vao: VertexArrayId, attrib: VertexAttrib) -> &mut Self {
        debug_assert!(
            self.bindings.array_buffer.is_some(),
            "set_vertex_attrib requires a bound array buffer"
        );
        self.bind_vertex_array(vao);
        self.device.vertex_attrib(&attrib);
        self
    }

    /// Leaves `vao` bound.
    pub fn set_instance_divisor(
        &mut self,
        vao: VertexArrayId,
        location: u32,
        divisor: u32,
    ) -> &mut Self {
        self.bind_vertex_array(vao);
        self.device.attrib_divisor(location, divisor);
        self
    }

    /// Build a complete mesh: vertex array, vertex buffer, optional index
    /// buffer and attribute pointers. Leaves the mesh's vertex array and
    /// vertex buffer bound.
    ///
    /// With no indices the vertex count is derived from the first
    /// attribute's stride.
    pub fn mesh<T: Pod>(
        &mut self,
        vertices: &[T],
        indices: &[u16],
        attribs: &[VertexAttrib],
        mode: DrawMode,
    ) -> Mesh {
        let vao = self.create_vertex_array();
        let vbo = self.create_buffer();
        self.set_buffer_data(BufferTarget::Array, vbo, vertices, BufferUsage::Static);
        for attrib in attribs {
            self.set_vertex_attrib(vao, *attrib);
        }

        let (ibo, count) = if indices.is_empty() {
            let bytes = std::mem::size_of_val(vertices);
            let stride = attribs.first().map_or(0, |a| a.effective_stride() as usize);
            (None, if stride == 0 { 0 } else { bytes / stride })
        } else {
            let ibo = self.create_buffer();
            self.set_element_data(ibo, indices);
            (Some(ibo), indices.len())
        };

        Mesh {
            vao,
            vertex_buffer: vbo,
            index_buffer: ibo,
            count: count as u32,
            mode,
        }
    }

    // ---- textures --------------------------------------------------------

    /// Create a texture holding a 1x1 opaque-blue placeholder so it can be
    /// sampled before real data arrives. Leaves it bound on the active unit.
    pub fn create_texture(&mut self) -> TextureId {
        let id = TextureId(self.alloc());
        self.device.create_texture(id);
        self.bind_texture(id);
        let desc = TextureDesc::rgba8(1, 1);
        self.device.texture_data(&desc, Some(&PLACEHOLDER_TEXEL));
        self.device.texture_params(Filter::Nearest, Wrap::ClampToEdge);
        self.textures.insert(id, desc);
        id
    }

    /// Bind to the active unit.
    pub fn bind_texture(&mut self, texture: TextureId) -> &mut Self {
        self.set_unit_binding(Some(texture));
        self
    }

    pub fn unbind_texture(&mut self) -> &mut Self {
        self.set_unit_binding(None);
        self
    }

    fn set_unit_binding(&mut self, texture: Option<TextureId>) {
        let unit = self.bindings.active_unit as usize;
        if let Some(slot) = self.bindings.texture_units.get_mut(unit) {
            *slot = texture;
        }
        self.device.bind_texture(texture);
    }

    /// (Re)allocate texture storage. A `data` slice of the wrong length is
    /// rejected with a warning and storage is left untouched. Leaves
    /// `texture` bound on the active unit.
    pub fn set_texture_data(
        &mut self,
        texture: TextureId,
        desc: TextureDesc,
        data: Option<&[u8]>,
    ) -> &mut Self {
        self.bind_texture(texture);
        if let Some(bytes) = data {
            if bytes.len() != desc.byte_len() {
                tracing::warn!(
                    %texture,
                    expected = desc.byte_len(),
                    got = bytes.len(),
                    "texture upload size mismatch, ignored"
                );
                return self;
            }
        }
        self.device.texture_data(&desc, data);
        self.textures.insert(texture, desc);
        self
    }

    /// Upload decoded RGBA8 pixels. Leaves `texture` bound on the active unit.
    pub fn set_texture_image(&mut self, texture: TextureId, image: &ImageData) -> &mut Self {
        let desc = TextureDesc::rgba8(image.width, image.height);
        self.set_texture_data(texture, desc, Some(&image.rgba))
    }

    /// Leaves `texture` bound on the active unit.
    pub fn set_texture_params(&mut self, texture: TextureId, filter: Filter, wrap: Wrap) -> &mut Self {
        self.bind_texture(texture);
        self.device.texture_params(filter, wrap);
        self
    }

    /// Bind `texture` on `unit`, then make unit 0 active again.
    pub fn set_texture_unit(&mut self, texture: TextureId, unit: u32) -> &mut Self {
        let unit = if (unit as usize) < MAX_TEXTURE_UNITS {
            unit
        } else {
            tracing::warn!(unit, "texture unit out of range, using 0");
            0
        };
        self.active_texture(unit);
        self.bind_texture(texture);
        self.active_texture(0);
        self
    }

    pub fn active_texture(&mut self, unit: u32) -> &mut Self {
        self.bindings.active_unit = unit;
        self.device.active_texture(unit);
        self
    }

    // ---- programs --------------------------------------------------------

    /// Compile and link a program from WGSL sources.
    ///
    /// Always returns a handle. On failure the error is logged, a
    /// [`Diagnostic`] is pushed and the program stays unusable.
    pub fn create_program(&mut self, vertex: &str, fragment: &str) -> ProgramId {
        let id = ProgramId(self.alloc());
        let outcome = reflect::reflect(vertex, fragment)
            .map_err(|e| e.to_string())
            .and_then(|reflection| {
                self.device
                    .link_program(id, vertex, fragment, &reflection)
                    .map(|()| reflection)
            });

        let info = match outcome {
            Ok(reflection) => {
                tracing::debug!(program = %id, uniforms = reflection.uniforms.len(), "program linked");
                ProgramInfo {
                    status: ProgramStatus::Linked,
                    reflection,
                }
            }
            Err(log) => {
                tracing::error!(program = %id, %log, "shader program failed to link");
                self.diagnostics.push(Diagnostic {
                    kind: DiagnosticKind::ShaderLink,
                    program: Some(id),
                    message: log.clone(),
                });
                ProgramInfo {
                    status: ProgramStatus::Failed { log },
                    reflection: ProgramReflection::default(),
                }
            }
        };
        self.programs.insert(id, info);
        id
    }

    pub fn use_program(&mut self, program: ProgramId) -> &mut Self {
        self.bindings.program = Some(program);
        self.device.use_program(Some(program));
        self
    }

    pub fn program_status(&self, program: ProgramId) -> Option<&ProgramStatus> {
        self.programs.get(&program).map(|p| &p.status)
    }

    pub fn program_reflection(&self, program: ProgramId) -> Option<&ProgramReflection> {
        self.programs.get(&program).map(|p| &p.reflection)
    }

    /// Resolve a uniform name. Unknown names and unlinked programs yield
    /// [`UniformLocation::INVALID`].
    pub fn uniform_location(&self, program: ProgramId, name: &str) -> UniformLocation {
        self.programs
            .get(&program)
            .filter(|p| p.status == ProgramStatus::Linked)
            .and_then(|p| p.reflection.uniform(name))
            .map_or(UniformLocation::INVALID, |(index, _)| UniformLocation {
                program: Some(program),
                index: index as i32,
            })
    }

    /// Write a uniform of the current program. The sentinel is a no-op.
    pub fn set_uniform(&mut self, location: UniformLocation, value: impl Into<UniformValue>) -> &mut Self {
        if !location.is_valid() {
            return self;
        }
        let value = value.into();
        if location.program != self.bindings.program {
            tracing::warn!(
                program = ?location.program,
                current = ?self.bindings.program,
                "uniform set on a program that is not current, ignored"
            );
            return self;
        }
        let Some(field) = location
            .program
            .and_then(|p| self.programs.get(&p))
            .and_then(|p| p.reflection.uniforms.get(location.index as usize))
        else {
            return self;
        };
        if field.ty != value.ty() {
            tracing::warn!(name = %field.name, expected = ?field.ty, got = ?value.ty(), "uniform type mismatch, ignored");
            return self;
        }
        let offset = field.offset;
        self.device.uniform(offset, &value.to_bytes());
        self
    }

    // ---- framebuffers ----------------------------------------------------

    /// Allocate a framebuffer handle. Binds nothing.
    pub fn create_framebuffer(&mut self) -> FramebufferId {
        let id = FramebufferId(self.alloc());
        self.device.create_framebuffer(id);
        id
    }

    /// `None` binds the default surface.
    pub fn bind_framebuffer(&mut self, framebuffer: Option<FramebufferId>) -> &mut Self {
        self.bindings.framebuffer = framebuffer;
        self.device.bind_framebuffer(framebuffer);
        self
    }

    /// Leaves `framebuffer` bound.
    pub fn attach_texture(
        &mut self,
        framebuffer: FramebufferId,
        attachment: Attachment,
        texture: TextureId,
    ) -> &mut Self {
        self.bind_framebuffer(Some(framebuffer));
        self.device.framebuffer_texture(attachment, texture);
        self
    }

    pub fn viewport(&mut self, x: i32, y: i32, width: u32, height: u32) -> &mut Self {
        let vp = Viewport {
            x,
            y,
            width,
            height,
        };
        self.bindings.viewport = vp;
        self.device.viewport(vp);
        self
    }

    // ---- drawing ---------------------------------------------------------

    /// Clear colour (context clear colour) and depth of the current target.
    pub fn clear(&mut self) -> &mut Self {
        self.stats.clears += 1;
        self.device.clear(self.clear_color, 1.0);
        self
    }

    /// Clear an integer colour target (velocity buffers) and depth.
    pub fn clear_depth_uint(&mut self, value: [u32; 4]) -> &mut Self {
        self.stats.clears += 1;
        self.device.clear_uint(value, 1.0);
        self
    }

    pub fn draw_arrays(&mut self, mode: DrawMode, first: u32, count: u32) -> &mut Self {
        self.draw_arrays_instanced(mode, first, count, 1)
    }

    pub fn draw_elements(&mut self, mode: DrawMode, first: u32, count: u32) -> &mut Self {
        self.draw_elements_instanced(mode, first, count, 1)
    }

    pub fn draw_arrays_instanced(
        &mut self,
        mode: DrawMode,
        first: u32,
        count: u32,
        instances: u32,
    ) -> &mut Self {
        self.submit(DrawCall {
            mode,
            first,
            count,
            instances,
            indexed: false,
        });
        self
    }

    pub fn draw_elements_instanced(
        &mut self,
        mode: DrawMode,
        first: u32,
        count: u32,
        instances: u32,
    ) -> &mut Self {
        self.submit(DrawCall {
            mode,
            first,
            count,
            instances,
            indexed: true,
        });
        self
    }

    fn submit(&mut self, call: DrawCall) {
        debug_assert!(
            self.bindings.vertex_array.is_some(),
            "draw requires a bound vertex array"
        );
        let program = self.bindings.program;
        let Some((id, info)) = program
            .and_then(|p| self.programs.get(&p).map(|info| (p, info)))
            .filter(|(_, info)| info.status == ProgramStatus::Linked)
        else {
            if self.warned.insert(program) {
                tracing::warn!(?program, "draw skipped: no usable program");
            }
            self.stats.skipped_draws += 1;
            return;
        };
        let unbound = info
            .reflection
            .blocks
            .iter()
            .find(|b| self.bindings.uniform_block(b.slot).is_none())
            .map(|b| (b.slot, b.name.clone()));
        if let Some((slot, block)) = unbound {
            if self.warned_blocks.insert((id, slot)) {
                tracing::warn!(program = %id, slot, %block, "draw skipped: shared uniform block not bound");
            }
            self.stats.skipped_draws += 1;
            return;
        }
        if call.indexed && self.bindings.element_buffer.is_none() {
            tracing::warn!("indexed draw skipped: vertex array has no element buffer");
            self.stats.skipped_draws += 1;
            return;
        }
        if call.count == 0 || call.instances == 0 {
            return;
        }
        tracing::trace!(?call, framebuffer = ?self.bindings.framebuffer, "draw");
        self.stats.draws += 1;
        self.device.draw(&call);
    }

    /// Finish the frame and collect asynchronous backend errors.
    pub fn present(&mut self) -> &mut Self {
        self.stats.presents += 1;
        self.device.present();
        for message in self.device.take_errors() {
            tracing::error!(%message, "GPU backend error");
            self.diagnostics.push(Diagnostic {
                kind: DiagnosticKind::Device,
                program: None,
                message,
            });
        }
        self
    }

    /// Update the surface (canvas) size. The viewport follows when the
    /// default surface is bound.
    pub fn resize(&mut self, width: u32, height: u32) -> &mut Self {
        tracing::debug!(width, height, "surface resized");
        self.surface = (width, height);
        self.device.resize(width, height);
        if self.bindings.framebuffer.is_none() {
            self.viewport(0, 0, width, height);
        }
        self
    }
}

impl From<f32> for UniformValue {
    fn from(v: f32) -> Self {
        Self::F32(v)
    }
}

impl From<i32> for UniformValue {
    fn from(v: i32) -> Self {
        Self::I32(v)
    }
}

impl From<u32> for UniformValue {
    fn from(v: u32) -> Self {
        Self::U32(v)
    }
}

impl From<glam::Vec2> for UniformValue {
    fn from(v: glam::Vec2) -> Self {
        Self::Vec2(v)
    }
}

impl From<glam::Vec3> for UniformValue {
    fn from(v: glam::Vec3) -> Self {
        Self::Vec3(v)
    }
}

impl From<glam::Vec4> for UniformValue {
    fn from(v: glam::Vec4) -> Self {
        Self::Vec4(v)
    }
}

impl From<glam::Mat4> for UniformValue {
    fn from(v: glam::Mat4) -> Self {
        Self::Mat4(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headless::HeadlessDevice;
    use glam::{Mat4, Vec3};

    const PROGRAM: &str = r#"
        struct U { matrix: mat4x4<f32>, tint: vec3<f32>, };
        @group(0) @binding(0) var<uniform> u: U;
        @group(1) @binding(0) var tex: texture_2d<f32>;
        @vertex fn vs_main(@location(0) p: vec2<f32>) -> @builtin(position) vec4<f32> {
            return u.matrix * vec4<f32>(p, 0.0, 1.0);
        }
        @fragment fn fs_main() -> @location(0) vec4<f32> { return vec4<f32>(u.tint, 1.0); }
    "#;

    fn ctx() -> GpuContext {
        GpuContext::new(Box::new(HeadlessDevice::new(64, 32)), 64, 32)
    }

    #[test]
    fn handles_are_never_zero_and_unique() {
        let mut ctx = ctx();
        let a = ctx.create_buffer();
        let b = ctx.create_texture();
        let c = ctx.create_framebuffer();
        assert!(a.raw() > 0);
        assert_ne!(a.raw(), b.raw());
        assert_ne!(b.raw(), c.raw());
    }

    #[test]
    fn fresh_texture_samples_opaque_blue_everywhere() {
        let mut ctx = ctx();
        let tex = ctx.create_texture();
        let dev = ctx.device_as::<HeadlessDevice>().unwrap();
        for (u, v) in [(0.0, 0.0), (0.5, 0.5), (1.0, 1.0), (0.99, 0.01)] {
            assert_eq!(dev.texel(tex, u, v), Some(PLACEHOLDER_TEXEL));
        }
        assert_eq!(ctx.bindings().texture(0), Some(tex));
    }

    #[test]
    fn set_texture_unit_restores_active_unit_zero() {
        let mut ctx = ctx();
        let a = ctx.create_texture();
        let b = ctx.create_texture();
        ctx.set_texture_unit(a, 0).set_texture_unit(b, 3);
        assert_eq!(ctx.bindings().active_unit, 0);
        assert_eq!(ctx.bindings().texture(0), Some(a));
        assert_eq!(ctx.bindings().texture(3), Some(b));
    }

    #[test]
    fn rebinding_replaces_current_handle() {
        let mut ctx = ctx();
        let a = ctx.create_buffer();
        let b = ctx.create_buffer();
        ctx.bind_buffer(BufferTarget::Array, a);
        ctx.bind_buffer(BufferTarget::Array, b);
        assert_eq!(ctx.bindings().array_buffer, Some(b));
        ctx.unbind_buffer(BufferTarget::Array);
        assert_eq!(ctx.bindings().array_buffer, None);
    }

    #[test]
    fn element_buffer_follows_vertex_array() {
        let mut ctx = ctx();
        let mesh = ctx.mesh(
            &[0.0f32, 0.0, 1.0, 0.0, 0.0, 1.0],
            &[0, 1, 2],
            &[VertexAttrib::new(0, 2)],
            DrawMode::Triangles,
        );
        let other = ctx.create_vertex_array();
        assert_eq!(ctx.bindings().element_buffer, None);
        ctx.bind_vertex_array(mesh.vao());
        assert_eq!(ctx.bindings().element_buffer, mesh.index_buffer());
        assert_ne!(other, mesh.vao());
    }

    #[test]
    fn mesh_without_indices_counts_vertices_from_stride() {
        let mut ctx = ctx();
        let mesh = ctx.mesh(
            &[0.0f32; 12],
            &[],
            &[VertexAttrib::new(0, 2)],
            DrawMode::TriangleStrip,
        );
        assert_eq!(mesh.count(), 6);
        assert_eq!(mesh.index_buffer(), None);
    }

    #[test]
    fn broken_program_still_returns_handle_with_diagnostic() {
        let mut ctx = ctx();
        let program = ctx.create_program("not wgsl", "also not");
        assert!(matches!(
            ctx.program_status(program),
            Some(ProgramStatus::Failed { .. })
        ));
        assert_eq!(ctx.diagnostics().len(), 1);
        assert_eq!(ctx.diagnostics()[0].program, Some(program));

        let mesh = ctx.mesh(&[0.0f32; 6], &[], &[VertexAttrib::new(0, 2)], DrawMode::Triangles);
        ctx.use_program(program);
        mesh.draw(&mut ctx);
        mesh.draw(&mut ctx);
        assert_eq!(ctx.stats().draws, 0);
        assert_eq!(ctx.stats().skipped_draws, 2);
    }

    #[test]
    fn unresolved_uniform_is_sentinel_and_noop() {
        let mut ctx = ctx();
        let program = ctx.create_program(PROGRAM, PROGRAM);
        assert_eq!(ctx.program_status(program), Some(&ProgramStatus::Linked));
        let missing = ctx.uniform_location(program, "does_not_exist");
        assert_eq!(missing, UniformLocation::INVALID);

        ctx.use_program(program);
        let before = ctx
            .device_as::<HeadlessDevice>()
            .unwrap()
            .uniform_bytes(program)
            .map(<[u8]>::to_vec);
        ctx.set_uniform(missing, 1.0f32);
        let after = ctx
            .device_as::<HeadlessDevice>()
            .unwrap()
            .uniform_bytes(program)
            .map(<[u8]>::to_vec);
        assert_eq!(before, after);
    }

    #[test]
    fn uniform_writes_land_at_reflected_offset() {
        let mut ctx = ctx();
        let program = ctx.create_program(PROGRAM, PROGRAM);
        ctx.use_program(program);
        let tint = ctx.uniform_location(program, "tint");
        let matrix = ctx.uniform_location(program, "matrix");
        ctx.set_uniform(tint, Vec3::new(0.25, 0.5, 1.0));
        ctx.set_uniform(matrix, Mat4::IDENTITY);
        let dev = ctx.device_as::<HeadlessDevice>().unwrap();
        assert_eq!(dev.uniform_f32(program, 64), Some(0.25));
        assert_eq!(dev.uniform_f32(program, 72), Some(1.0));
        assert_eq!(dev.uniform_f32(program, 0), Some(1.0));
    }

    #[test]
    fn uniform_type_mismatch_is_ignored() {
        let mut ctx = ctx();
        let program = ctx.create_program(PROGRAM, PROGRAM);
        ctx.use_program(program);
        let tint = ctx.uniform_location(program, "tint");
        ctx.set_uniform(tint, 3.0f32);
        let dev = ctx.device_as::<HeadlessDevice>().unwrap();
        assert_eq!(dev.uniform_f32(program, 64), Some(0.0));
    }

    #[test]
    fn resize_moves_default_viewport_only_on_surface() {
        let mut ctx = ctx();
        ctx.resize(100, 50);
        assert_eq!(ctx.bindings().viewport, Viewport::sized(100, 50));

        let fb = ctx.create_framebuffer();
        ctx.bind_framebuffer(Some(fb)).viewport(0, 0, 8, 8);
        ctx.resize(200, 100);
        assert_eq!(ctx.bindings().viewport, Viewport::sized(8, 8));
        assert_eq!(ctx.surface_size(), (200, 100));
    }

    #[test]
    fn wrong_sized_texture_upload_is_rejected() {
        let mut ctx = ctx();
        let tex = ctx.create_texture();
        ctx.set_texture_data(tex, TextureDesc::rgba8(2, 2), Some(&[255; 3]));
        assert_eq!(ctx.texture_desc(tex), Some(TextureDesc::rgba8(1, 1)));
    }

    #[test]
    fn uniform_block_binding_leaves_uniform_target_alone() {
        let mut ctx = ctx();
        let a = ctx.create_buffer();
        let b = ctx.create_buffer();
        ctx.bind_buffer(BufferTarget::Uniform, a).bind_uniform_block(1, Some(b));
        assert_eq!(ctx.bindings().uniform_buffer, Some(a));
        assert_eq!(ctx.bindings().uniform_block(1), Some(b));
        assert_eq!(ctx.bindings().uniform_block(0), None);

        ctx.bind_uniform_block(MAX_UNIFORM_BLOCKS as u32, Some(a));
        assert_eq!(ctx.bindings().uniform_block(MAX_UNIFORM_BLOCKS as u32), None);
        ctx.bind_uniform_block(1, None);
        assert_eq!(ctx.bindings().uniform_block(1), None);
    }
}
