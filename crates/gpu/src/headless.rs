//! Software device with no GPU behind it.
//!
//! Keeps resource storage and a command log so binding behaviour can be
//! observed in tests and in the CLI. Clears write real texels; draws are
//! recorded as [`DrawRecord`]s but not rasterized.

use std::any::Any;
use std::collections::HashMap;

use crate::device::Device;
use crate::handle::{BufferId, FramebufferId, ProgramId, TextureId, VertexArrayId};
use crate::reflect::ProgramReflection;
use crate::types::{
    Attachment, BufferTarget, BufferUsage, DrawCall, Filter, MAX_TEXTURE_UNITS,
    MAX_UNIFORM_BLOCKS, TextureDesc, TextureFormat, VertexAttrib, Viewport, Wrap,
};

/// Entry of the headless command log.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    BufferData { buffer: BufferId, len: usize },
    TextureData { texture: TextureId, desc: TextureDesc },
    BindFramebuffer(Option<FramebufferId>),
    Viewport(Viewport),
    Clear { framebuffer: Option<FramebufferId> },
    LinkProgram { program: ProgramId },
    /// Index into [`HeadlessDevice::draws`].
    Draw(usize),
    Present,
    Resize { width: u32, height: u32 },
}

/// Complete binding state captured at draw time.
#[derive(Debug, Clone, PartialEq)]
pub struct DrawRecord {
    pub call: DrawCall,
    pub program: Option<ProgramId>,
    pub vertex_array: Option<VertexArrayId>,
    pub framebuffer: Option<FramebufferId>,
    pub textures: [Option<TextureId>; MAX_TEXTURE_UNITS],
    pub viewport: Viewport,
    pub uniforms: Vec<u8>,
    /// Contents of each shared block the program declares, by slot.
    pub blocks: Vec<(u32, Vec<u8>)>,
}

#[derive(Debug, Default)]
struct TextureStore {
    desc: Option<TextureDesc>,
    data: Vec<u8>,
    filter: Filter,
    wrap: Wrap,
}

#[derive(Debug, Default)]
struct VertexArrayStore {
    attribs: Vec<(VertexAttrib, Option<BufferId>, u32)>,
    elements: Option<BufferId>,
}

#[derive(Debug, Default)]
struct FramebufferStore {
    color: Option<TextureId>,
    depth: Option<TextureId>,
}

#[derive(Debug)]
struct ProgramStore {
    uniforms: Vec<u8>,
    blocks: Vec<u32>,
}

#[derive(Debug)]
pub struct HeadlessDevice {
    width: u32,
    height: u32,
    surface: Vec<u8>,
    buffers: HashMap<BufferId, Vec<u8>>,
    vertex_arrays: HashMap<VertexArrayId, VertexArrayStore>,
    textures: HashMap<TextureId, TextureStore>,
    framebuffers: HashMap<FramebufferId, FramebufferStore>,
    programs: HashMap<ProgramId, ProgramStore>,

    array_buffer: Option<BufferId>,
    uniform_buffer: Option<BufferId>,
    uniform_blocks: [Option<BufferId>; MAX_UNIFORM_BLOCKS],
    vertex_array: Option<VertexArrayId>,
    framebuffer: Option<FramebufferId>,
    program: Option<ProgramId>,
    active_unit: u32,
    units: [Option<TextureId>; MAX_TEXTURE_UNITS],
    viewport: Viewport,

    commands: Vec<Command>,
    draws: Vec<DrawRecord>,
    frames: u64,
    errors: Vec<String>,
}

impl HeadlessDevice {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            surface: vec![0; width as usize * height as usize * 4],
            buffers: HashMap::new(),
            vertex_arrays: HashMap::new(),
            textures: HashMap::new(),
            framebuffers: HashMap::new(),
            programs: HashMap::new(),
            array_buffer: None,
            uniform_buffer: None,
            uniform_blocks: [None; MAX_UNIFORM_BLOCKS],
            vertex_array: None,
            framebuffer: None,
            program: None,
            active_unit: 0,
            units: [None; MAX_TEXTURE_UNITS],
            viewport: Viewport::sized(width, height),
            commands: Vec::new(),
            draws: Vec::new(),
            frames: 0,
            errors: Vec::new(),
        }
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn draws(&self) -> &[DrawRecord] {
        &self.draws
    }

    /// Forget recorded commands and draws; resources are kept.
    pub fn clear_log(&mut self) {
        self.commands.clear();
        self.draws.clear();
    }

    pub fn frames_presented(&self) -> u64 {
        self.frames
    }

    pub fn buffer(&self, id: BufferId) -> Option<&[u8]> {
        self.buffers.get(&id).map(Vec::as_slice)
    }

    pub fn texture_params(&self, id: TextureId) -> Option<(Filter, Wrap)> {
        self.textures.get(&id).map(|t| (t.filter, t.wrap))
    }

    /// (colour, depth) attachments of a framebuffer.
    pub fn attachments(&self, id: FramebufferId) -> (Option<TextureId>, Option<TextureId>) {
        self.framebuffers
            .get(&id)
            .map_or((None, None), |fb| (fb.color, fb.depth))
    }

    /// Attribute pointers of a vertex array: (attrib, source buffer, divisor).
    pub fn vertex_attribs(&self, id: VertexArrayId) -> &[(VertexAttrib, Option<BufferId>, u32)] {
        self.vertex_arrays
            .get(&id)
            .map(|v| v.attribs.as_slice())
            .unwrap_or(&[])
    }

    /// Buffer attached to shared uniform block `slot`.
    pub fn uniform_block(&self, slot: u32) -> Option<BufferId> {
        self.uniform_blocks.get(slot as usize).copied().flatten()
    }

    pub fn uniform_bytes(&self, program: ProgramId) -> Option<&[u8]> {
        self.programs.get(&program).map(|p| p.uniforms.as_slice())
    }

    pub fn uniform_f32(&self, program: ProgramId, offset: usize) -> Option<f32> {
        let bytes = self.uniform_bytes(program)?.get(offset..offset + 4)?;
        Some(f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Nearest-neighbour sample at normalized `(u, v)`, clamped to the edge.
    ///
    /// Returns the raw texel widened to 4 bytes: `R8` as `[r, 0, 0, 255]`,
    /// other formats as stored.
    pub fn texel(&self, id: TextureId, u: f32, v: f32) -> Option<[u8; 4]> {
        let tex = self.textures.get(&id)?;
        let desc = tex.desc.filter(|d| d.width > 0 && d.height > 0)?;
        let x = ((u.clamp(0.0, 1.0) * desc.width as f32) as u32).min(desc.width - 1);
        let y = ((v.clamp(0.0, 1.0) * desc.height as f32) as u32).min(desc.height - 1);
        let bpt = desc.format.bytes_per_texel();
        let at = (y as usize * desc.width as usize + x as usize) * bpt;
        let raw = tex.data.get(at..at + bpt)?;
        Some(match desc.format {
            TextureFormat::R8 => [raw[0], 0, 0, 255],
            _ => [raw[0], raw[1], raw[2], raw[3]],
        })
    }

    /// RGBA8 pixel of the default surface.
    pub fn surface_pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let at = (y as usize * self.width as usize + x as usize) * 4;
        let p = self.surface.get(at..at + 4)?;
        Some([p[0], p[1], p[2], p[3]])
    }

    fn bound_buffer(&self, target: BufferTarget) -> Option<BufferId> {
        match target {
            BufferTarget::Array => self.array_buffer,
            BufferTarget::Uniform => self.uniform_buffer,
            BufferTarget::ElementArray => self
                .vertex_array
                .and_then(|v| self.vertex_arrays.get(&v))
                .and_then(|v| v.elements),
        }
    }

    fn bound_texture(&mut self) -> Option<&mut TextureStore> {
        let id = self.units.get(self.active_unit as usize).copied().flatten()?;
        self.textures.get_mut(&id)
    }

    fn attachment_store(&mut self, attachment: Attachment) -> Option<&mut TextureStore> {
        let fb = self.framebuffers.get(&self.framebuffer?)?;
        let id = match attachment {
            Attachment::Color => fb.color,
            Attachment::Depth => fb.depth,
        }?;
        self.textures.get_mut(&id)
    }

    fn fill_depth(&mut self, depth: f32) {
        if let Some(store) = self.attachment_store(Attachment::Depth) {
            let bytes = depth.to_le_bytes();
            for chunk in store.data.chunks_exact_mut(4) {
                chunk.copy_from_slice(&bytes);
            }
        }
    }
}

fn to_unorm(c: f32) -> u8 {
    (c.clamp(0.0, 1.0) * 255.0).round() as u8
}

impl Device for HeadlessDevice {
    fn backend_name(&self) -> &'static str {
        "headless"
    }

    fn create_buffer(&mut self, id: BufferId) {
        self.buffers.insert(id, Vec::new());
    }

    fn bind_buffer(&mut self, target: BufferTarget, id: Option<BufferId>) {
        match target {
            BufferTarget::Array => self.array_buffer = id,
            BufferTarget::Uniform => self.uniform_buffer = id,
            BufferTarget::ElementArray => match self.vertex_array {
                Some(vao) => self.vertex_arrays.entry(vao).or_default().elements = id,
                None => self.errors.push("element buffer bound without a vertex array".into()),
            },
        }
    }

    fn buffer_data(&mut self, target: BufferTarget, data: &[u8], _usage: BufferUsage) {
        let Some(id) = self.bound_buffer(target) else {
            self.errors.push(format!("buffer_data with no buffer bound to {target:?}"));
            return;
        };
        self.buffers.insert(id, data.to_vec());
        self.commands.push(Command::BufferData {
            buffer: id,
            len: data.len(),
        });
    }

    fn buffer_sub_data(&mut self, target: BufferTarget, offset: usize, data: &[u8]) {
        let Some(buf) = self
            .bound_buffer(target)
            .and_then(|id| self.buffers.get_mut(&id))
        else {
            return;
        };
        let end = offset + data.len();
        if end > buf.len() {
            self.errors
                .push(format!("buffer_sub_data out of range: {end} > {}", buf.len()));
            return;
        }
        buf[offset..end].copy_from_slice(data);
    }

    fn bind_uniform_block(&mut self, slot: u32, id: Option<BufferId>) {
        match self.uniform_blocks.get_mut(slot as usize) {
            Some(bound) => *bound = id,
            None => self.errors.push(format!("uniform block slot {slot} out of range")),
        }
    }

    fn create_vertex_array(&mut self, id: VertexArrayId) {
        self.vertex_arrays.insert(id, VertexArrayStore::default());
    }

    fn bind_vertex_array(&mut self, id: Option<VertexArrayId>) {
        self.vertex_array = id;
    }

    fn vertex_attrib(&mut self, attrib: &VertexAttrib) {
        let source = self.array_buffer;
        let Some(vao) = self
            .vertex_array
            .and_then(|v| self.vertex_arrays.get_mut(&v))
        else {
            return;
        };
        vao.attribs.retain(|(a, _, _)| a.location != attrib.location);
        vao.attribs.push((*attrib, source, 0));
    }

    fn attrib_divisor(&mut self, location: u32, divisor: u32) {
        if let Some(vao) = self
            .vertex_array
            .and_then(|v| self.vertex_arrays.get_mut(&v))
        {
            for entry in vao.attribs.iter_mut().filter(|(a, _, _)| a.location == location) {
                entry.2 = divisor;
            }
        }
    }

    fn create_texture(&mut self, id: TextureId) {
        self.textures.insert(id, TextureStore::default());
    }

    fn active_texture(&mut self, unit: u32) {
        self.active_unit = unit;
    }

    fn bind_texture(&mut self, id: Option<TextureId>) {
        if let Some(slot) = self.units.get_mut(self.active_unit as usize) {
            *slot = id;
        }
    }

    fn texture_data(&mut self, desc: &TextureDesc, data: Option<&[u8]>) {
        let Some(id) = self.units.get(self.active_unit as usize).copied().flatten() else {
            return;
        };
        if let Some(store) = self.textures.get_mut(&id) {
            store.desc = Some(*desc);
            store.data = match data {
                Some(bytes) => bytes.to_vec(),
                None => vec![0; desc.byte_len()],
            };
            self.commands.push(Command::TextureData {
                texture: id,
                desc: *desc,
            });
        }
    }

    fn texture_params(&mut self, filter: Filter, wrap: Wrap) {
        if let Some(store) = self.bound_texture() {
            store.filter = filter;
            store.wrap = wrap;
        }
    }

    fn create_framebuffer(&mut self, id: FramebufferId) {
        self.framebuffers.insert(id, FramebufferStore::default());
    }

    fn bind_framebuffer(&mut self, id: Option<FramebufferId>) {
        self.framebuffer = id;
        self.commands.push(Command::BindFramebuffer(id));
    }

    fn framebuffer_texture(&mut self, attachment: Attachment, texture: TextureId) {
        let Some(fb) = self
            .framebuffer
            .and_then(|f| self.framebuffers.get_mut(&f))
        else {
            self.errors.push("attachment on the default framebuffer".into());
            return;
        };
        match attachment {
            Attachment::Color => fb.color = Some(texture),
            Attachment::Depth => fb.depth = Some(texture),
        }
    }

    fn link_program(
        &mut self,
        id: ProgramId,
        _vertex: &str,
        _fragment: &str,
        reflection: &ProgramReflection,
    ) -> Result<(), String> {
        self.commands.push(Command::LinkProgram { program: id });
        self.programs.insert(
            id,
            ProgramStore {
                uniforms: vec![0; reflection.uniform_size],
                blocks: reflection.blocks.iter().map(|b| b.slot).collect(),
            },
        );
        Ok(())
    }

    fn use_program(&mut self, id: Option<ProgramId>) {
        self.program = id;
    }

    fn uniform(&mut self, offset: usize, bytes: &[u8]) {
        let Some(program) = self.program.and_then(|p| self.programs.get_mut(&p)) else {
            return;
        };
        if let Some(dst) = program.uniforms.get_mut(offset..offset + bytes.len()) {
            dst.copy_from_slice(bytes);
        }
    }

    fn viewport(&mut self, viewport: Viewport) {
        self.viewport = viewport;
        self.commands.push(Command::Viewport(viewport));
    }

    fn clear(&mut self, color: [f32; 4], depth: f32) {
        self.commands.push(Command::Clear {
            framebuffer: self.framebuffer,
        });
        let rgba = color.map(to_unorm);
        if self.framebuffer.is_none() {
            for px in self.surface.chunks_exact_mut(4) {
                px.copy_from_slice(&rgba);
            }
            return;
        }
        let mut integer_target = false;
        if let Some(store) = self.attachment_store(Attachment::Color) {
            match store.desc.map(|d| d.format) {
                Some(TextureFormat::Rgba8) => {
                    for px in store.data.chunks_exact_mut(4) {
                        px.copy_from_slice(&rgba);
                    }
                }
                Some(TextureFormat::R8) => store.data.fill(rgba[0]),
                Some(TextureFormat::Rg16Uint) => integer_target = true,
                _ => {}
            }
        }
        if integer_target {
            self.errors
                .push("float clear on an integer colour attachment".into());
        }
        self.fill_depth(depth);
    }

    fn clear_uint(&mut self, value: [u32; 4], depth: f32) {
        self.commands.push(Command::Clear {
            framebuffer: self.framebuffer,
        });
        if let Some(store) = self.attachment_store(Attachment::Color) {
            if store.desc.map(|d| d.format) == Some(TextureFormat::Rg16Uint) {
                let r = (value[0] as u16).to_le_bytes();
                let g = (value[1] as u16).to_le_bytes();
                let texel = [r[0], r[1], g[0], g[1]];
                for px in store.data.chunks_exact_mut(4) {
                    px.copy_from_slice(&texel);
                }
            }
        }
        self.fill_depth(depth);
    }

    fn draw(&mut self, call: &DrawCall) {
        if self.vertex_array.is_none() {
            self.errors.push("draw without a vertex array".into());
            return;
        }
        let program = self.program.and_then(|p| self.programs.get(&p));
        let uniforms = program.map(|p| p.uniforms.clone()).unwrap_or_default();
        let blocks = program
            .map(|p| {
                p.blocks
                    .iter()
                    .map(|&slot| {
                        let bytes = self
                            .uniform_block(slot)
                            .and_then(|id| self.buffers.get(&id))
                            .cloned()
                            .unwrap_or_default();
                        (slot, bytes)
                    })
                    .collect()
            })
            .unwrap_or_default();
        self.draws.push(DrawRecord {
            call: *call,
            program: self.program,
            vertex_array: self.vertex_array,
            framebuffer: self.framebuffer,
            textures: self.units,
            viewport: self.viewport,
            uniforms,
            blocks,
        });
        self.commands.push(Command::Draw(self.draws.len() - 1));
    }

    fn present(&mut self) {
        self.frames += 1;
        self.commands.push(Command::Present);
    }

    fn resize(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
        self.surface = vec![0; width as usize * height as usize * 4];
        self.commands.push(Command::Resize { width, height });
    }

    fn take_errors(&mut self) -> Vec<String> {
        std::mem::take(&mut self.errors)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::GpuContext;
    use crate::types::{DrawMode, ImageData};

    #[test]
    fn attrib_captures_bound_array_buffer() {
        let mut ctx = GpuContext::new(Box::new(HeadlessDevice::new(8, 8)), 8, 8);
        let mesh = ctx.mesh(
            &[0.0f32; 12],
            &[],
            &[VertexAttrib::new(0, 2), VertexAttrib::new(1, 1).offset(8)],
            DrawMode::Triangles,
        );
        ctx.set_instance_divisor(mesh.vao(), 1, 1);
        let dev = ctx.device_as::<HeadlessDevice>().unwrap();
        let attribs = dev.vertex_attribs(mesh.vao());
        assert_eq!(attribs.len(), 2);
        assert!(attribs.iter().all(|(_, src, _)| *src == Some(mesh.vertex_buffer())));
        assert_eq!(attribs[1].2, 1);
    }

    #[test]
    fn uploaded_image_replaces_placeholder() {
        let mut ctx = GpuContext::new(Box::new(HeadlessDevice::new(8, 8)), 8, 8);
        let tex = ctx.create_texture();
        let image = ImageData::checker(2, 2, 1, [255, 255, 255, 255], [0, 0, 0, 255]);
        ctx.set_texture_image(tex, &image);
        let dev = ctx.device_as::<HeadlessDevice>().unwrap();
        assert_eq!(dev.texel(tex, 0.0, 0.0), Some([255, 255, 255, 255]));
        assert_eq!(dev.texel(tex, 0.9, 0.0), Some([0, 0, 0, 255]));
    }

    #[test]
    fn surface_clear_and_present() {
        let mut ctx = GpuContext::new(Box::new(HeadlessDevice::new(4, 4)), 4, 4);
        ctx.set_clear_color([0.0, 1.0, 0.0, 1.0]).clear().present();
        let dev = ctx.device_as::<HeadlessDevice>().unwrap();
        assert_eq!(dev.surface_pixel(3, 3), Some([0, 255, 0, 255]));
        assert_eq!(dev.frames_presented(), 1);
        assert!(ctx.diagnostics().is_empty());
    }

    #[test]
    fn draw_record_captures_bindings() {
        let src = "@vertex fn vs_main() -> @builtin(position) vec4<f32> { return vec4<f32>(); }
            @fragment fn fs_main() -> @location(0) vec4<f32> { return vec4<f32>(1.0); }";
        let mut ctx = GpuContext::new(Box::new(HeadlessDevice::new(4, 4)), 4, 4);
        let program = ctx.create_program(src, src);
        let tex = ctx.create_texture();
        let quad = ctx.fullscreen_quad();
        ctx.set_texture_unit(tex, 2).use_program(program);
        quad.draw(&mut ctx);
        let dev = ctx.device_as::<HeadlessDevice>().unwrap();
        let draw = &dev.draws()[0];
        assert_eq!(draw.program, Some(program));
        assert_eq!(draw.textures[2], Some(tex));
        assert_eq!(draw.call.count, 4);
        assert_eq!(draw.framebuffer, None);
        assert!(draw.blocks.is_empty());
    }

    #[test]
    fn block_slot_out_of_range_is_an_error() {
        let mut dev = HeadlessDevice::new(1, 1);
        dev.bind_uniform_block(1, Some(BufferId(7)));
        dev.bind_uniform_block(MAX_UNIFORM_BLOCKS as u32, Some(BufferId(8)));
        assert_eq!(dev.uniform_block(1), Some(BufferId(7)));
        assert_eq!(dev.take_errors().len(), 1);
    }
}
