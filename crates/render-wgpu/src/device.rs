use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use lumen_gpu::reflect::TextureBinding;
use lumen_gpu::{
    Attachment, BufferId, BufferTarget, BufferUsage, Device, DrawCall, Filter, FramebufferId,
    GpuError, MAX_TEXTURE_UNITS, MAX_UNIFORM_BLOCKS, PLACEHOLDER_TEXEL, ProgramId,
    ProgramReflection, SampleKind, TextureDesc, TextureFormat, TextureId, VertexArrayId,
    VertexAttrib, Viewport, Wrap,
};
use wgpu::util::DeviceExt;

use crate::convert;
use crate::pipeline::{PipelineKey, ProgramSlot, VertexSlot};

struct SurfaceFrame {
    texture: wgpu::SurfaceTexture,
    view: wgpu::TextureView,
}

#[derive(Default)]
struct BufferSlot {
    /// CPU copy padded to the copy alignment, for partial updates.
    shadow: Vec<u8>,
    gpu: Option<wgpu::Buffer>,
}

#[derive(Clone, Copy)]
struct AttribSlot {
    attrib: VertexAttrib,
    buffer: Option<BufferId>,
    divisor: u32,
}

#[derive(Default)]
struct VertexArraySlot {
    attribs: Vec<AttribSlot>,
    elements: Option<BufferId>,
}

struct GpuTexture {
    desc: TextureDesc,
    texture: wgpu::Texture,
    view: wgpu::TextureView,
}

#[derive(Default)]
struct TextureSlot {
    gpu: Option<GpuTexture>,
    filter: Filter,
    wrap: Wrap,
}

#[derive(Default)]
struct FramebufferSlot {
    color: Option<TextureId>,
    depth: Option<TextureId>,
}

/// The device's own binding points.
struct Bound {
    array_buffer: Option<BufferId>,
    uniform_buffer: Option<BufferId>,
    blocks: [Option<BufferId>; MAX_UNIFORM_BLOCKS],
    vertex_array: Option<VertexArrayId>,
    framebuffer: Option<FramebufferId>,
    program: Option<ProgramId>,
    active_unit: u32,
    units: [Option<TextureId>; MAX_TEXTURE_UNITS],
    viewport: Viewport,
}

/// Attachment set a draw or clear lands in.
#[derive(Debug, Clone, Copy)]
struct Target {
    format: wgpu::TextureFormat,
    width: u32,
    height: u32,
    /// `None` is the surface frame.
    color: Option<TextureId>,
    depth: Option<TextureId>,
    has_depth: bool,
    integer: bool,
}

/// [`Device`] backed by wgpu, presenting to a window surface.
pub struct WgpuDevice {
    surface: wgpu::Surface<'static>,
    device: wgpu::Device,
    queue: wgpu::Queue,
    config: wgpu::SurfaceConfiguration,
    adapter_name: String,
    surface_depth: GpuTexture,
    frame: Option<SurfaceFrame>,

    buffers: HashMap<BufferId, BufferSlot>,
    vertex_arrays: HashMap<VertexArrayId, VertexArraySlot>,
    textures: HashMap<TextureId, TextureSlot>,
    framebuffers: HashMap<FramebufferId, FramebufferSlot>,
    programs: HashMap<ProgramId, ProgramSlot>,
    samplers: HashMap<(Filter, Wrap), wgpu::Sampler>,
    fallback_float: GpuTexture,
    fallback_uint: GpuTexture,

    bound: Bound,
    errors: Arc<Mutex<Vec<String>>>,
}

impl WgpuDevice {
    /// Open an adapter and device for `target` and configure its surface.
    pub fn new(
        target: impl Into<wgpu::SurfaceTarget<'static>>,
        width: u32,
        height: u32,
    ) -> Result<Self, GpuError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });
        let surface = instance
            .create_surface(target)
            .map_err(|e| GpuError::Surface(e.to_string()))?;

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: Some(&surface),
            force_fallback_adapter: false,
        }))
        .ok_or_else(|| GpuError::DeviceUnavailable("no compatible adapter".into()))?;
        let adapter_name = adapter.get_info().name;

        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("lumen_device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                memory_hints: Default::default(),
            },
            None,
        ))
        .map_err(|e| GpuError::DeviceUnavailable(e.to_string()))?;

        let errors = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&errors);
        device.on_uncaptured_error(Box::new(move |error| {
            tracing::error!(%error, "wgpu error");
            if let Ok(mut errors) = sink.lock() {
                errors.push(error.to_string());
            }
        }));

        let caps = surface.get_capabilities(&adapter);
        let format = caps
            .formats
            .iter()
            .find(|f| f.is_srgb())
            .or_else(|| caps.formats.first())
            .copied()
            .ok_or_else(|| GpuError::Surface("surface reports no formats".into()))?;
        let alpha_mode = caps
            .alpha_modes
            .first()
            .copied()
            .unwrap_or(wgpu::CompositeAlphaMode::Auto);
        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: width.max(1),
            height: height.max(1),
            present_mode: wgpu::PresentMode::AutoVsync,
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);

        let surface_depth = create_texture(
            &device,
            TextureDesc::new(TextureFormat::Depth24, config.width, config.height),
            "lumen_surface_depth",
        );
        let fallback_float = create_texture(&device, TextureDesc::rgba8(1, 1), "lumen_fallback");
        upload(&queue, &fallback_float, &PLACEHOLDER_TEXEL);
        let fallback_uint = create_texture(
            &device,
            TextureDesc::new(TextureFormat::Rg16Uint, 1, 1),
            "lumen_fallback_uint",
        );

        tracing::info!(
            adapter = %adapter_name,
            format = ?config.format,
            width = config.width,
            height = config.height,
            "wgpu device ready"
        );

        Ok(Self {
            surface,
            device,
            queue,
            config,
            adapter_name,
            surface_depth,
            frame: None,
            buffers: HashMap::new(),
            vertex_arrays: HashMap::new(),
            textures: HashMap::new(),
            framebuffers: HashMap::new(),
            programs: HashMap::new(),
            samplers: HashMap::new(),
            fallback_float,
            fallback_uint,
            bound: Bound {
                array_buffer: None,
                uniform_buffer: None,
                blocks: [None; MAX_UNIFORM_BLOCKS],
                vertex_array: None,
                framebuffer: None,
                program: None,
                active_unit: 0,
                units: [None; MAX_TEXTURE_UNITS],
                viewport: Viewport::sized(width, height),
            },
            errors,
        })
    }

    pub fn adapter_name(&self) -> &str {
        &self.adapter_name
    }

    pub fn surface_format(&self) -> wgpu::TextureFormat {
        self.config.format
    }

    fn report(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!(%message, "wgpu device");
        if let Ok(mut errors) = self.errors.lock() {
            errors.push(message);
        }
    }

    fn bound_buffer(&self, target: BufferTarget) -> Option<BufferId> {
        match target {
            BufferTarget::Array => self.bound.array_buffer,
            BufferTarget::Uniform => self.bound.uniform_buffer,
            BufferTarget::ElementArray => self
                .bound
                .vertex_array
                .and_then(|v| self.vertex_arrays.get(&v))
                .and_then(|v| v.elements),
        }
    }

    fn bound_texture(&self) -> Option<TextureId> {
        self.bound
            .units
            .get(self.bound.active_unit as usize)
            .copied()
            .flatten()
    }

    fn gpu_texture(&self, id: TextureId) -> Option<&GpuTexture> {
        self.textures.get(&id).and_then(|t| t.gpu.as_ref())
    }

    fn acquire_frame(&mut self) -> bool {
        if self.frame.is_some() {
            return true;
        }
        let texture = match self.surface.get_current_texture() {
            Ok(texture) => texture,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                self.surface.configure(&self.device, &self.config);
                return false;
            }
            Err(e) => {
                tracing::error!("surface error: {e}");
                return false;
            }
        };
        let view = texture
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        self.frame = Some(SurfaceFrame { texture, view });

        // Stale depth from the previous frame must not reject this one.
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("lumen_surface_depth_clear"),
            });
        encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("lumen_surface_depth_clear"),
            color_attachments: &[],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: &self.surface_depth.view,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(1.0),
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            ..Default::default()
        });
        self.queue.submit(std::iter::once(encoder.finish()));
        true
    }

    /// Resolve the bound framebuffer, acquiring the surface frame when the
    /// default framebuffer is bound.
    fn resolve_target(&mut self) -> Option<Target> {
        let Some(fb) = self.bound.framebuffer else {
            if !self.acquire_frame() {
                return None;
            }
            return Some(Target {
                format: self.config.format,
                width: self.config.width,
                height: self.config.height,
                color: None,
                depth: None,
                has_depth: true,
                integer: false,
            });
        };

        let Some(slot) = self.framebuffers.get(&fb) else {
            self.report(format!("{fb} was never created"));
            return None;
        };
        let (color_id, depth_id) = (slot.color, slot.depth);
        let Some(color_id) = color_id else {
            self.report(format!("{fb} has no colour attachment"));
            return None;
        };
        let Some(color) = self.gpu_texture(color_id) else {
            self.report(format!("colour attachment {color_id} has no storage"));
            return None;
        };
        if color.desc.format.is_depth() {
            self.report(format!("colour attachment {color_id} is a depth texture"));
            return None;
        }
        let desc = color.desc;
        let depth = depth_id.filter(|&id| {
            self.gpu_texture(id).is_some_and(|d| {
                d.desc.format.is_depth() && d.desc.width == desc.width && d.desc.height == desc.height
            })
        });
        if depth_id.is_some() && depth.is_none() {
            self.report(format!("depth attachment of {fb} does not match its colour size"));
        }
        Some(Target {
            format: convert::texture_format(desc.format),
            width: desc.width,
            height: desc.height,
            color: Some(color_id),
            depth,
            has_depth: depth.is_some(),
            integer: desc.format.is_integer(),
        })
    }

    fn color_view(&self, target: &Target) -> Option<&wgpu::TextureView> {
        match target.color {
            Some(id) => self.gpu_texture(id).map(|t| &t.view),
            None => self.frame.as_ref().map(|f| &f.view),
        }
    }

    fn depth_view(&self, target: &Target) -> Option<&wgpu::TextureView> {
        match target.color {
            None => Some(&self.surface_depth.view),
            Some(_) => target
                .depth
                .and_then(|id| self.gpu_texture(id))
                .map(|t| &t.view),
        }
    }

    fn sampler_key(&self, unit: u32) -> (Filter, Wrap) {
        self.bound
            .units
            .get(unit as usize)
            .copied()
            .flatten()
            .and_then(|id| self.textures.get(&id))
            .map(|t| (t.filter, t.wrap))
            .unwrap_or_default()
    }

    /// View bound for `binding`, or a placeholder when the unit is empty,
    /// of the wrong kind, or attached to the target being drawn.
    fn sampled_view(&self, binding: &TextureBinding, target: &Target) -> &wgpu::TextureView {
        let fallback = match binding.kind {
            SampleKind::Float => &self.fallback_float.view,
            SampleKind::Uint => &self.fallback_uint.view,
        };
        let Some(id) = self.bound.units.get(binding.unit as usize).copied().flatten() else {
            return fallback;
        };
        if target.color == Some(id) || target.depth == Some(id) {
            return fallback;
        }
        match self.gpu_texture(id) {
            Some(t) if convert::sample_kind(t.desc.format) == Some(binding.kind) => &t.view,
            _ => fallback,
        }
    }

    fn clear_target(&mut self, color: wgpu::Color, integer: bool, depth: f32) {
        let Some(target) = self.resolve_target() else {
            return;
        };
        if target.integer != integer {
            self.report(format!(
                "{} clear on a {:?} target",
                if integer { "integer" } else { "float" },
                target.format
            ));
            return;
        }
        let Some(color_view) = self.color_view(&target) else {
            return;
        };
        let depth_view = self.depth_view(&target);

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("lumen_clear"),
            });
        encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("lumen_clear"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: color_view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(color),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: depth_view.map(|view| {
                wgpu::RenderPassDepthStencilAttachment {
                    view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(depth),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }
            }),
            ..Default::default()
        });
        self.queue.submit(std::iter::once(encoder.finish()));
    }
}

fn create_texture(device: &wgpu::Device, desc: TextureDesc, label: &str) -> GpuTexture {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some(label),
        size: wgpu::Extent3d {
            width: desc.width.max(1),
            height: desc.height.max(1),
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: convert::texture_format(desc.format),
        usage: convert::texture_usage(desc.format),
        view_formats: &[],
    });
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    GpuTexture {
        desc,
        texture,
        view,
    }
}

fn upload(queue: &wgpu::Queue, texture: &GpuTexture, data: &[u8]) {
    let desc = texture.desc;
    queue.write_texture(
        wgpu::TexelCopyTextureInfo {
            texture: &texture.texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        data,
        wgpu::TexelCopyBufferLayout {
            offset: 0,
            bytes_per_row: Some(desc.width * desc.format.bytes_per_texel() as u32),
            rows_per_image: Some(desc.height),
        },
        wgpu::Extent3d {
            width: desc.width,
            height: desc.height,
            depth_or_array_layers: 1,
        },
    );
}

fn create_sampler(device: &wgpu::Device, (filter, wrap): (Filter, Wrap)) -> wgpu::Sampler {
    device.create_sampler(&wgpu::SamplerDescriptor {
        label: Some("lumen_sampler"),
        address_mode_u: convert::address_mode(wrap),
        address_mode_v: convert::address_mode(wrap),
        address_mode_w: convert::address_mode(wrap),
        mag_filter: convert::filter_mode(filter),
        min_filter: convert::filter_mode(filter),
        mipmap_filter: wgpu::FilterMode::Nearest,
        ..Default::default()
    })
}

impl Device for WgpuDevice {
    fn backend_name(&self) -> &'static str {
        "wgpu"
    }

    fn create_buffer(&mut self, id: BufferId) {
        self.buffers.insert(id, BufferSlot::default());
    }

    fn bind_buffer(&mut self, target: BufferTarget, id: Option<BufferId>) {
        match target {
            BufferTarget::Array => self.bound.array_buffer = id,
            BufferTarget::Uniform => self.bound.uniform_buffer = id,
            BufferTarget::ElementArray => match self.bound.vertex_array {
                Some(vao) => self.vertex_arrays.entry(vao).or_default().elements = id,
                None => self.report("element buffer bound without a vertex array"),
            },
        }
    }

    fn buffer_data(&mut self, target: BufferTarget, data: &[u8], _usage: BufferUsage) {
        let Some(id) = self.bound_buffer(target) else {
            self.report(format!("buffer_data with no buffer bound to {target:?}"));
            return;
        };
        let mut shadow = data.to_vec();
        shadow.resize(convert::align_copy(data.len()), 0);
        let gpu = (!shadow.is_empty()).then(|| {
            self.device
                .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some("lumen_buffer"),
                    contents: &shadow,
                    usage: wgpu::BufferUsages::VERTEX
                        | wgpu::BufferUsages::INDEX
                        | wgpu::BufferUsages::UNIFORM
                        | wgpu::BufferUsages::COPY_DST,
                })
        });
        self.buffers.insert(id, BufferSlot { shadow, gpu });
    }

    fn buffer_sub_data(&mut self, target: BufferTarget, offset: usize, data: &[u8]) {
        let Some(id) = self.bound_buffer(target) else {
            return;
        };
        let Some(slot) = self.buffers.get_mut(&id) else {
            return;
        };
        let end = offset + data.len();
        let len = slot.shadow.len();
        let Some(gpu) = slot.gpu.as_ref().filter(|_| end <= len) else {
            self.report(format!("buffer_sub_data out of range: {end} > {len}"));
            return;
        };
        slot.shadow[offset..end].copy_from_slice(data);
        let align = wgpu::COPY_BUFFER_ALIGNMENT as usize;
        let start = offset / align * align;
        let stop = convert::align_copy(end).min(len);
        self.queue.write_buffer(gpu, start as u64, &slot.shadow[start..stop]);
    }

    fn bind_uniform_block(&mut self, slot: u32, id: Option<BufferId>) {
        match self.bound.blocks.get_mut(slot as usize) {
            Some(bound) => *bound = id,
            None => self.report(format!("uniform block slot {slot} out of range")),
        }
    }

    fn create_vertex_array(&mut self, id: VertexArrayId) {
        self.vertex_arrays.insert(id, VertexArraySlot::default());
    }

    fn bind_vertex_array(&mut self, id: Option<VertexArrayId>) {
        self.bound.vertex_array = id;
    }

    fn vertex_attrib(&mut self, attrib: &VertexAttrib) {
        let buffer = self.bound.array_buffer;
        let Some(vao) = self
            .bound
            .vertex_array
            .and_then(|v| self.vertex_arrays.get_mut(&v))
        else {
            return;
        };
        vao.attribs.retain(|a| a.attrib.location != attrib.location);
        vao.attribs.push(AttribSlot {
            attrib: *attrib,
            buffer,
            divisor: 0,
        });
    }

    fn attrib_divisor(&mut self, location: u32, divisor: u32) {
        if let Some(vao) = self
            .bound
            .vertex_array
            .and_then(|v| self.vertex_arrays.get_mut(&v))
        {
            for slot in vao
                .attribs
                .iter_mut()
                .filter(|a| a.attrib.location == location)
            {
                slot.divisor = divisor;
            }
        }
    }

    fn create_texture(&mut self, id: TextureId) {
        self.textures.insert(id, TextureSlot::default());
    }

    fn active_texture(&mut self, unit: u32) {
        self.bound.active_unit = unit;
    }

    fn bind_texture(&mut self, id: Option<TextureId>) {
        if let Some(slot) = self.bound.units.get_mut(self.bound.active_unit as usize) {
            *slot = id;
        }
    }

    fn texture_data(&mut self, desc: &TextureDesc, data: Option<&[u8]>) {
        let Some(id) = self.bound_texture() else {
            return;
        };
        if !self.textures.contains_key(&id) {
            return;
        }
        let texture = create_texture(&self.device, *desc, "lumen_texture");
        if let Some(bytes) = data {
            if desc.format.is_depth() {
                self.report(format!("ignoring pixel upload to depth texture {id}"));
            } else if bytes.len() == desc.byte_len() && desc.byte_len() > 0 {
                upload(&self.queue, &texture, bytes);
            } else {
                self.report(format!(
                    "texture upload of {} bytes does not fit {}x{}",
                    bytes.len(),
                    desc.width,
                    desc.height
                ));
            }
        }
        if let Some(slot) = self.textures.get_mut(&id) {
            slot.gpu = Some(texture);
        }
    }

    fn texture_params(&mut self, filter: Filter, wrap: Wrap) {
        if let Some(slot) = self
            .bound_texture()
            .and_then(|id| self.textures.get_mut(&id))
        {
            slot.filter = filter;
            slot.wrap = wrap;
        }
    }

    fn create_framebuffer(&mut self, id: FramebufferId) {
        self.framebuffers.insert(id, FramebufferSlot::default());
    }

    fn bind_framebuffer(&mut self, id: Option<FramebufferId>) {
        self.bound.framebuffer = id;
    }

    fn framebuffer_texture(&mut self, attachment: Attachment, texture: TextureId) {
        let Some(fb) = self
            .bound
            .framebuffer
            .and_then(|f| self.framebuffers.get_mut(&f))
        else {
            self.report("attachment on the default framebuffer");
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
        vertex: &str,
        fragment: &str,
        reflection: &ProgramReflection,
    ) -> Result<(), String> {
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let program = ProgramSlot::new(&self.device, vertex, fragment, reflection);
        if let Some(error) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(error.to_string());
        }
        self.programs.insert(id, program);
        Ok(())
    }

    fn use_program(&mut self, id: Option<ProgramId>) {
        self.bound.program = id;
    }

    fn uniform(&mut self, offset: usize, bytes: &[u8]) {
        let Some(program) = self
            .bound
            .program
            .and_then(|p| self.programs.get_mut(&p))
        else {
            return;
        };
        if let Some(dst) = program.uniforms.get_mut(offset..offset + bytes.len()) {
            dst.copy_from_slice(bytes);
        }
    }

    fn viewport(&mut self, viewport: Viewport) {
        self.bound.viewport = viewport;
    }

    fn clear(&mut self, color: [f32; 4], depth: f32) {
        let [r, g, b, a] = color.map(f64::from);
        self.clear_target(wgpu::Color { r, g, b, a }, false, depth);
    }

    fn clear_uint(&mut self, value: [u32; 4], depth: f32) {
        let [r, g, b, a] = value.map(f64::from);
        self.clear_target(wgpu::Color { r, g, b, a }, true, depth);
    }

    fn draw(&mut self, call: &DrawCall) {
        let Some(program_id) = self.bound.program else {
            self.report("draw without a program");
            return;
        };
        if !self.programs.contains_key(&program_id) {
            self.report(format!("{program_id} is not linked"));
            return;
        }
        let Some(vao) = self
            .bound
            .vertex_array
            .and_then(|v| self.vertex_arrays.get(&v))
        else {
            self.report("draw without a vertex array");
            return;
        };
        let attribs = vao.attribs.clone();
        let elements = vao.elements;

        let Some(target) = self.resolve_target() else {
            return;
        };
        let Some([vx, vy, vw, vh]) =
            convert::clamp_viewport(self.bound.viewport, target.width, target.height)
        else {
            return;
        };

        let key = PipelineKey {
            slots: attribs
                .iter()
                .map(|a| VertexSlot::new(&a.attrib, a.divisor))
                .collect(),
            color: target.format,
            depth: target.has_depth,
            mode: call.mode,
        };
        let Some(program) = self.programs.get_mut(&program_id) else {
            return;
        };
        program.prepare(&self.device, &key);
        let bindings = program.reflection.textures.clone();
        for binding in bindings.iter().filter(|b| b.has_sampler) {
            let sampler_key = self.sampler_key(binding.unit);
            if !self.samplers.contains_key(&sampler_key) {
                let sampler = create_sampler(&self.device, sampler_key);
                self.samplers.insert(sampler_key, sampler);
            }
        }

        let mut vertex_buffers = Vec::with_capacity(attribs.len());
        for slot in &attribs {
            let buffer = slot
                .buffer
                .and_then(|id| self.buffers.get(&id))
                .and_then(|b| b.gpu.as_ref());
            match buffer {
                Some(buffer) if u64::from(slot.attrib.offset) < buffer.size() => {
                    vertex_buffers.push(buffer.slice(u64::from(slot.attrib.offset)..));
                }
                _ => {
                    self.report(format!(
                        "attribute {} has no vertex data",
                        slot.attrib.location
                    ));
                    return;
                }
            }
        }
        let index_buffer = if call.indexed {
            match elements
                .and_then(|id| self.buffers.get(&id))
                .and_then(|b| b.gpu.as_ref())
            {
                Some(buffer) => Some(buffer),
                None => {
                    self.report("indexed draw without element data");
                    return;
                }
            }
        } else {
            None
        };

        let program = &self.programs[&program_id];
        let Some(pipeline) = program.pipeline(&key) else {
            return;
        };
        if let Some(buffer) = &program.uniform_buffer {
            self.queue.write_buffer(buffer, 0, &program.uniforms);
        }

        let mut entries = Vec::with_capacity(bindings.len() * 2);
        for binding in &bindings {
            entries.push(wgpu::BindGroupEntry {
                binding: binding.unit * 2,
                resource: wgpu::BindingResource::TextureView(self.sampled_view(binding, &target)),
            });
            if binding.has_sampler {
                if let Some(sampler) = self.samplers.get(&self.sampler_key(binding.unit)) {
                    entries.push(wgpu::BindGroupEntry {
                        binding: binding.unit * 2 + 1,
                        resource: wgpu::BindingResource::Sampler(sampler),
                    });
                }
            }
        }
        let texture_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("lumen_texture_group"),
            layout: &program.texture_layout,
            entries: &entries,
        });

        let mut block_entries = Vec::with_capacity(program.reflection.blocks.len());
        for block in &program.reflection.blocks {
            let buffer = self
                .bound
                .blocks
                .get(block.slot as usize)
                .copied()
                .flatten()
                .and_then(|id| self.buffers.get(&id))
                .and_then(|b| b.gpu.as_ref());
            let Some(buffer) = buffer else {
                self.report(format!("uniform block `{}` has no buffer", block.name));
                return;
            };
            block_entries.push(wgpu::BindGroupEntry {
                binding: block.slot,
                resource: buffer.as_entire_binding(),
            });
        }
        let block_group = program.block_layout.as_ref().map(|layout| {
            self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("lumen_block_group"),
                layout,
                entries: &block_entries,
            })
        });

        let Some(color_view) = self.color_view(&target) else {
            return;
        };
        let depth_view = self.depth_view(&target);
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("lumen_draw"),
            });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("lumen_draw"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: color_view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: depth_view.map(|view| {
                    wgpu::RenderPassDepthStencilAttachment {
                        view,
                        depth_ops: Some(wgpu::Operations {
                            load: wgpu::LoadOp::Load,
                            store: wgpu::StoreOp::Store,
                        }),
                        stencil_ops: None,
                    }
                }),
                ..Default::default()
            });
            pass.set_viewport(vx, vy, vw, vh, 0.0, 1.0);
            pass.set_pipeline(pipeline);
            pass.set_bind_group(0, &program.uniform_group, &[]);
            pass.set_bind_group(1, &texture_group, &[]);
            if let Some(group) = &block_group {
                pass.set_bind_group(2, group, &[]);
            }
            for (slot, buffer) in vertex_buffers.into_iter().enumerate() {
                pass.set_vertex_buffer(slot as u32, buffer);
            }
            let range = call.first..call.first + call.count;
            match index_buffer {
                Some(indices) => {
                    pass.set_index_buffer(indices.slice(..), wgpu::IndexFormat::Uint16);
                    pass.draw_indexed(range, 0, 0..call.instances);
                }
                None => pass.draw(range, 0..call.instances),
            }
        }
        self.queue.submit(std::iter::once(encoder.finish()));
    }

    fn present(&mut self) {
        if let Some(frame) = self.frame.take() {
            frame.texture.present();
        }
    }

    fn resize(&mut self, width: u32, height: u32) {
        self.frame = None;
        self.config.width = width.max(1);
        self.config.height = height.max(1);
        self.surface.configure(&self.device, &self.config);
        self.surface_depth = create_texture(
            &self.device,
            TextureDesc::new(TextureFormat::Depth24, self.config.width, self.config.height),
            "lumen_surface_depth",
        );
        tracing::debug!(width = self.config.width, height = self.config.height, "surface resized");
    }

    fn take_errors(&mut self) -> Vec<String> {
        self.errors
            .lock()
            .map(|mut errors| std::mem::take(&mut *errors))
            .unwrap_or_default()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
