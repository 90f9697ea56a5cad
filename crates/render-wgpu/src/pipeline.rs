use std::collections::HashMap;

use lumen_gpu::{AttribType, DrawMode, ProgramReflection, VertexAttrib};

use crate::convert;

/// One vertex-buffer slot of a pipeline: a single attribute read from its
/// own buffer binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct VertexSlot {
    pub location: u32,
    pub size: u8,
    pub ty: AttribType,
    pub stride: u32,
    pub instanced: bool,
}

impl VertexSlot {
    pub fn new(attrib: &VertexAttrib, divisor: u32) -> Self {
        Self {
            location: attrib.location,
            size: attrib.size,
            ty: attrib.ty,
            stride: attrib.effective_stride(),
            instanced: divisor > 0,
        }
    }
}

/// Everything outside the program that shapes a render pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct PipelineKey {
    pub slots: Vec<VertexSlot>,
    pub color: wgpu::TextureFormat,
    pub depth: bool,
    pub mode: DrawMode,
}

/// Compiled program plus the pipelines built from it so far.
pub(crate) struct ProgramSlot {
    vertex: wgpu::ShaderModule,
    fragment: Option<wgpu::ShaderModule>,
    pub reflection: ProgramReflection,
    pub uniforms: Vec<u8>,
    pub uniform_buffer: Option<wgpu::Buffer>,
    pub uniform_group: wgpu::BindGroup,
    pub texture_layout: wgpu::BindGroupLayout,
    /// Group 2, present when the program declares shared uniform blocks.
    pub block_layout: Option<wgpu::BindGroupLayout>,
    layout: wgpu::PipelineLayout,
    pipelines: HashMap<PipelineKey, wgpu::RenderPipeline>,
}

impl ProgramSlot {
    /// Compile both stages and build the bind group layouts the reflection
    /// describes. A shared source compiles once.
    pub fn new(
        device: &wgpu::Device,
        vertex: &str,
        fragment: &str,
        reflection: &ProgramReflection,
    ) -> Self {
        let vertex_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("lumen_vertex"),
            source: wgpu::ShaderSource::Wgsl(vertex.into()),
        });
        let fragment_module = (fragment != vertex).then(|| {
            device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some("lumen_fragment"),
                source: wgpu::ShaderSource::Wgsl(fragment.into()),
            })
        });

        let uniform_entries: Vec<wgpu::BindGroupLayoutEntry> = if reflection.uniform_size > 0 {
            vec![wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }]
        } else {
            Vec::new()
        };
        let uniform_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("lumen_uniform_layout"),
            entries: &uniform_entries,
        });

        let uniform_buffer = (reflection.uniform_size > 0).then(|| {
            device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("lumen_uniforms"),
                size: reflection.uniform_size as u64,
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            })
        });
        let uniform_bindings: Vec<wgpu::BindGroupEntry> = uniform_buffer
            .iter()
            .map(|buffer| wgpu::BindGroupEntry {
                binding: 0,
                resource: buffer.as_entire_binding(),
            })
            .collect();
        let uniform_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("lumen_uniform_group"),
            layout: &uniform_layout,
            entries: &uniform_bindings,
        });

        let texture_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("lumen_texture_layout"),
            entries: &texture_layout_entries(reflection),
        });

        let block_layout = (!reflection.blocks.is_empty()).then(|| {
            let entries: Vec<wgpu::BindGroupLayoutEntry> = reflection
                .blocks
                .iter()
                .map(|block| wgpu::BindGroupLayoutEntry {
                    binding: block.slot,
                    visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                })
                .collect();
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("lumen_block_layout"),
                entries: &entries,
            })
        });

        let mut group_layouts = vec![&uniform_layout, &texture_layout];
        group_layouts.extend(block_layout.as_ref());
        let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("lumen_pipeline_layout"),
            bind_group_layouts: &group_layouts,
            push_constant_ranges: &[],
        });

        Self {
            vertex: vertex_module,
            fragment: fragment_module,
            reflection: reflection.clone(),
            uniforms: vec![0; reflection.uniform_size],
            uniform_buffer,
            uniform_group,
            texture_layout,
            block_layout,
            layout,
            pipelines: HashMap::new(),
        }
    }

    /// Build the pipeline for `key` unless it is already cached.
    pub fn prepare(&mut self, device: &wgpu::Device, key: &PipelineKey) {
        if self.pipelines.contains_key(key) {
            return;
        }
        tracing::debug!(
            slots = key.slots.len(),
            color = ?key.color,
            depth = key.depth,
            mode = ?key.mode,
            "building render pipeline"
        );
        let pipeline = self.build(device, key);
        self.pipelines.insert(key.clone(), pipeline);
    }

    pub fn pipeline(&self, key: &PipelineKey) -> Option<&wgpu::RenderPipeline> {
        self.pipelines.get(key)
    }

    fn build(&self, device: &wgpu::Device, key: &PipelineKey) -> wgpu::RenderPipeline {
        let attributes: Vec<[wgpu::VertexAttribute; 1]> = key
            .slots
            .iter()
            .map(|slot| {
                [wgpu::VertexAttribute {
                    format: convert::vertex_format(slot.ty, slot.size),
                    offset: 0,
                    shader_location: slot.location,
                }]
            })
            .collect();
        let buffers: Vec<wgpu::VertexBufferLayout> = key
            .slots
            .iter()
            .zip(&attributes)
            .map(|(slot, attribute)| wgpu::VertexBufferLayout {
                array_stride: u64::from(slot.stride),
                step_mode: if slot.instanced {
                    wgpu::VertexStepMode::Instance
                } else {
                    wgpu::VertexStepMode::Vertex
                },
                attributes: attribute,
            })
            .collect();

        // Integer targets cannot blend.
        let blend = (!is_integer_format(key.color)).then_some(wgpu::BlendState::ALPHA_BLENDING);

        device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("lumen_pipeline"),
            layout: Some(&self.layout),
            vertex: wgpu::VertexState {
                module: &self.vertex,
                entry_point: Some(&self.reflection.vertex_entry),
                compilation_options: Default::default(),
                buffers: &buffers,
            },
            fragment: Some(wgpu::FragmentState {
                module: self.fragment.as_ref().unwrap_or(&self.vertex),
                entry_point: Some(&self.reflection.fragment_entry),
                compilation_options: Default::default(),
                targets: &[Some(wgpu::ColorTargetState {
                    format: key.color,
                    blend,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            primitive: wgpu::PrimitiveState {
                topology: convert::topology(key.mode),
                strip_index_format: convert::strip_index_format(key.mode),
                cull_mode: None,
                ..Default::default()
            },
            depth_stencil: key.depth.then(|| wgpu::DepthStencilState {
                format: convert::SURFACE_DEPTH_FORMAT,
                depth_write_enabled: true,
                depth_compare: wgpu::CompareFunction::LessEqual,
                stencil: Default::default(),
                bias: Default::default(),
            }),
            multisample: Default::default(),
            multiview: None,
            cache: None,
        })
    }
}

fn texture_layout_entries(reflection: &ProgramReflection) -> Vec<wgpu::BindGroupLayoutEntry> {
    let mut entries = Vec::with_capacity(reflection.textures.len() * 2);
    for texture in &reflection.textures {
        entries.push(wgpu::BindGroupLayoutEntry {
            binding: texture.unit * 2,
            visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
            ty: wgpu::BindingType::Texture {
                sample_type: convert::sample_type(texture.kind),
                view_dimension: wgpu::TextureViewDimension::D2,
                multisampled: false,
            },
            count: None,
        });
        if texture.has_sampler {
            entries.push(wgpu::BindGroupLayoutEntry {
                binding: texture.unit * 2 + 1,
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                count: None,
            });
        }
    }
    entries
}

fn is_integer_format(format: wgpu::TextureFormat) -> bool {
    matches!(
        format.sample_type(None, None),
        Some(wgpu::TextureSampleType::Uint | wgpu::TextureSampleType::Sint)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn divisor_marks_slot_as_instanced() {
        let attrib = VertexAttrib::new(2, 4).stride(64).offset(16);
        let slot = VertexSlot::new(&attrib, 1);
        assert!(slot.instanced);
        assert_eq!(slot.stride, 64);
        assert!(!VertexSlot::new(&VertexAttrib::new(0, 3), 0).instanced);
    }

    #[test]
    fn offsets_do_not_split_the_cache() {
        // offsets are applied when binding the buffer, not in the layout
        let a = VertexSlot::new(&VertexAttrib::new(0, 3).stride(24), 0);
        let b = VertexSlot::new(&VertexAttrib::new(0, 3).stride(24).offset(12), 0);
        assert_eq!(a, b);
    }

    #[test]
    fn uint_targets_are_detected() {
        assert!(is_integer_format(wgpu::TextureFormat::Rg16Uint));
        assert!(!is_integer_format(wgpu::TextureFormat::Rgba8Unorm));
    }

    #[test]
    fn texture_entries_pair_views_with_samplers() {
        const SRC: &str = r#"
            @group(1) @binding(0) var scene: texture_2d<f32>;
            @group(1) @binding(1) var scene_sampler: sampler;
            @group(1) @binding(2) var velocity: texture_2d<u32>;
            @vertex fn vs_main(@location(0) p: vec2<f32>) -> @builtin(position) vec4<f32> {
                return vec4<f32>(p, 0.0, 1.0);
            }
            @fragment fn fs_main() -> @location(0) vec4<f32> { return vec4<f32>(1.0); }
        "#;
        let reflection = lumen_gpu::reflect::reflect(SRC, SRC);
        let Ok(reflection) = reflection else {
            panic!("reflection failed: {reflection:?}");
        };
        let bindings: Vec<u32> = texture_layout_entries(&reflection)
            .iter()
            .map(|e| e.binding)
            .collect();
        assert_eq!(bindings, vec![0, 1, 2]);
    }
}
