//! WGSL reflection on top of naga's front end.
//!
//! Programs follow a fixed binding convention so both backends can agree on
//! resource layout:
//!
//! - the vertex stage is the module's `@vertex` entry point, the fragment
//!   stage its `@fragment` entry point;
//! - uniforms are the members of the struct bound at
//!   `@group(0) @binding(0) var<uniform>`;
//! - texture unit `k` is `@group(1) @binding(2k)`, with an optional sampler
//!   at `@binding(2k + 1)`;
//! - shared uniform blocks are structs bound at
//!   `@group(2) @binding(slot) var<uniform>`, known by their struct name.
//!
//! Member offsets are the ones naga lays out, so `@align` and `@size`
//! attributes are honoured.

use naga::{
    AddressSpace, Handle, ImageClass, ImageDimension, Module, Scalar, ScalarKind, ShaderStage,
    Type, TypeInner, VectorSize,
};

use crate::types::{MAX_TEXTURE_UNITS, MAX_UNIFORM_BLOCKS, UniformType};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReflectError {
    #[error("WGSL parse error: {0}")]
    Parse(String),
    #[error("missing @{0} entry point")]
    MissingEntryPoint(&'static str),
    #[error("uniform binding `{0}` is not a struct")]
    NotAStruct(String),
    #[error("unsupported uniform field type `{ty}` for `{field}`")]
    UnsupportedType { field: String, ty: String },
    #[error("texture binding {binding} exceeds the {MAX_TEXTURE_UNITS} available units")]
    UnitOutOfRange { binding: u32 },
    #[error("uniform block slot {slot} exceeds the {MAX_UNIFORM_BLOCKS} available slots")]
    SlotOutOfRange { slot: u32 },
    #[error("unsupported binding type `{0}` in group 1")]
    UnsupportedBinding(String),
}

/// One member of a uniform struct.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniformField {
    pub name: String,
    pub ty: UniformType,
    /// Byte offset inside the block.
    pub offset: usize,
}

/// Component kind a texture binding samples as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SampleKind {
    Float,
    Uint,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureBinding {
    pub unit: u32,
    pub name: String,
    pub kind: SampleKind,
    pub has_sampler: bool,
}

/// Layout of a uniform block shared between programs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniformBlockLayout {
    pub slot: u32,
    /// Struct type name. Programs sharing a block declare the same struct.
    pub name: String,
    pub fields: Vec<UniformField>,
    /// Block size rounded up to 16 bytes.
    pub size: usize,
}

impl UniformBlockLayout {
    pub fn field(&self, name: &str) -> Option<(usize, &UniformField)> {
        self.fields.iter().enumerate().find(|(_, f)| f.name == name)
    }

    /// Same members at the same offsets, so one buffer can feed both.
    pub fn is_compatible(&self, other: &Self) -> bool {
        self.size == other.size && self.fields == other.fields
    }
}

/// Resource layout of a program, shared by every backend.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProgramReflection {
    pub vertex_entry: String,
    pub fragment_entry: String,
    pub uniforms: Vec<UniformField>,
    /// Size of the uniform block rounded up to 16 bytes; 0 without a block.
    pub uniform_size: usize,
    pub textures: Vec<TextureBinding>,
    /// Shared blocks, sorted by slot.
    pub blocks: Vec<UniformBlockLayout>,
}

impl ProgramReflection {
    /// Index and description of a uniform field.
    pub fn uniform(&self, name: &str) -> Option<(usize, &UniformField)> {
        self.uniforms.iter().enumerate().find(|(_, f)| f.name == name)
    }

    pub fn texture(&self, unit: u32) -> Option<&TextureBinding> {
        self.textures.iter().find(|t| t.unit == unit)
    }

    /// Shared block declared with struct `name`.
    pub fn block(&self, name: &str) -> Option<&UniformBlockLayout> {
        self.blocks.iter().find(|b| b.name == name)
    }

    pub fn block_at(&self, slot: u32) -> Option<&UniformBlockLayout> {
        self.blocks.iter().find(|b| b.slot == slot)
    }
}

/// Reflect a vertex/fragment source pair. The two sources may be the same
/// module text, which is then parsed once.
pub fn reflect(vertex: &str, fragment: &str) -> Result<ProgramReflection, ReflectError> {
    let vs = parse(vertex)?;
    let fs = if fragment == vertex {
        None
    } else {
        Some(parse(fragment)?)
    };

    let vertex_entry =
        entry_point(&vs, ShaderStage::Vertex).ok_or(ReflectError::MissingEntryPoint("vertex"))?;
    let fragment_entry = entry_point(fs.as_ref().unwrap_or(&vs), ShaderStage::Fragment)
        .ok_or(ReflectError::MissingEntryPoint("fragment"))?;

    let mut out = ProgramReflection {
        vertex_entry,
        fragment_entry,
        ..Default::default()
    };

    for module in std::iter::once(&vs).chain(fs.as_ref()) {
        for (_, var) in module.global_variables.iter() {
            let Some(binding) = &var.binding else {
                continue;
            };
            let name = var.name.clone().unwrap_or_default();
            match (binding.group, binding.binding, var.space) {
                (0, 0, AddressSpace::Uniform) if out.uniform_size == 0 => {
                    let (fields, size) = struct_layout(module, var.ty, &name)?;
                    out.uniforms = fields;
                    out.uniform_size = size;
                }
                (1, binding, _) => bind_texture_slot(&mut out, module, binding, &name, var.ty)?,
                (2, slot, AddressSpace::Uniform) => add_block(&mut out, module, slot, &name, var.ty)?,
                _ => {}
            }
        }
    }
    out.textures.sort_by_key(|t| t.unit);
    out.blocks.sort_by_key(|b| b.slot);
    Ok(out)
}

fn parse(source: &str) -> Result<Module, ReflectError> {
    naga::front::wgsl::parse_str(source).map_err(|e| ReflectError::Parse(e.emit_to_string(source)))
}

fn entry_point(module: &Module, stage: ShaderStage) -> Option<String> {
    module
        .entry_points
        .iter()
        .find(|e| e.stage == stage)
        .map(|e| e.name.clone())
}

fn bind_texture_slot(
    out: &mut ProgramReflection,
    module: &Module,
    binding: u32,
    name: &str,
    ty: Handle<Type>,
) -> Result<(), ReflectError> {
    let unit = binding / 2;
    if unit as usize >= MAX_TEXTURE_UNITS {
        return Err(ReflectError::UnitOutOfRange { binding });
    }
    let inner = &module.types[ty].inner;
    if binding % 2 == 1 {
        if !matches!(inner, TypeInner::Sampler { comparison: false }) {
            return Err(ReflectError::UnsupportedBinding(describe(module, ty)));
        }
        match out.textures.iter_mut().find(|t| t.unit == unit) {
            Some(tex) => tex.has_sampler = true,
            None => out.textures.push(TextureBinding {
                unit,
                name: String::new(),
                kind: SampleKind::Float,
                has_sampler: true,
            }),
        }
        return Ok(());
    }

    let kind = match *inner {
        TypeInner::Image {
            dim: ImageDimension::D2,
            arrayed: false,
            class:
                ImageClass::Sampled {
                    kind: ScalarKind::Float,
                    multi: false,
                },
        } => SampleKind::Float,
        TypeInner::Image {
            dim: ImageDimension::D2,
            arrayed: false,
            class:
                ImageClass::Sampled {
                    kind: ScalarKind::Uint,
                    multi: false,
                },
        } => SampleKind::Uint,
        _ => return Err(ReflectError::UnsupportedBinding(describe(module, ty))),
    };
    match out.textures.iter_mut().find(|t| t.unit == unit) {
        Some(tex) => {
            tex.name = name.to_string();
            tex.kind = kind;
        }
        None => out.textures.push(TextureBinding {
            unit,
            name: name.to_string(),
            kind,
            has_sampler: false,
        }),
    }
    Ok(())
}

fn add_block(
    out: &mut ProgramReflection,
    module: &Module,
    slot: u32,
    name: &str,
    ty: Handle<Type>,
) -> Result<(), ReflectError> {
    if slot as usize >= MAX_UNIFORM_BLOCKS {
        return Err(ReflectError::SlotOutOfRange { slot });
    }
    if out.block_at(slot).is_some() {
        return Ok(());
    }
    let (fields, size) = struct_layout(module, ty, name)?;
    out.blocks.push(UniformBlockLayout {
        slot,
        name: module.types[ty].name.clone().unwrap_or_else(|| name.to_string()),
        fields,
        size,
    });
    Ok(())
}

fn struct_layout(
    module: &Module,
    ty: Handle<Type>,
    var: &str,
) -> Result<(Vec<UniformField>, usize), ReflectError> {
    let TypeInner::Struct { members, span } = &module.types[ty].inner else {
        return Err(ReflectError::NotAStruct(var.to_string()));
    };
    let fields = members
        .iter()
        .map(|member| {
            let name = member.name.clone().unwrap_or_default();
            let ty = uniform_type(&module.types[member.ty].inner).ok_or_else(|| {
                ReflectError::UnsupportedType {
                    field: name.clone(),
                    ty: describe(module, member.ty),
                }
            })?;
            Ok(UniformField {
                name,
                ty,
                offset: member.offset as usize,
            })
        })
        .collect::<Result<Vec<_>, ReflectError>>()?;
    Ok((fields, (*span as usize).div_ceil(16) * 16))
}

fn uniform_type(inner: &TypeInner) -> Option<UniformType> {
    Some(match *inner {
        TypeInner::Scalar(Scalar::F32) => UniformType::F32,
        TypeInner::Scalar(Scalar::I32) => UniformType::I32,
        TypeInner::Scalar(Scalar::U32) => UniformType::U32,
        TypeInner::Vector {
            size,
            scalar: Scalar::F32,
        } => match size {
            VectorSize::Bi => UniformType::Vec2,
            VectorSize::Tri => UniformType::Vec3,
            VectorSize::Quad => UniformType::Vec4,
        },
        TypeInner::Matrix {
            columns: VectorSize::Quad,
            rows: VectorSize::Quad,
            scalar: Scalar::F32,
        } => UniformType::Mat4,
        _ => return None,
    })
}

/// WGSL-ish spelling of a type for error messages.
fn describe(module: &Module, ty: Handle<Type>) -> String {
    let ty = &module.types[ty];
    if let Some(name) = &ty.name {
        return name.clone();
    }
    let scalar = |s: Scalar| match (s.kind, s.width) {
        (ScalarKind::Float, 4) => "f32".to_string(),
        (ScalarKind::Sint, 4) => "i32".to_string(),
        (ScalarKind::Uint, 4) => "u32".to_string(),
        (ScalarKind::Bool, _) => "bool".to_string(),
        (kind, width) => format!("{kind:?}{}", u32::from(width) * 8),
    };
    match ty.inner {
        TypeInner::Scalar(s) => scalar(s),
        TypeInner::Vector { size, scalar: s } => format!("vec{}<{}>", size as u8, scalar(s)),
        TypeInner::Matrix {
            columns,
            rows,
            scalar: s,
        } => format!("mat{}x{}<{}>", columns as u8, rows as u8, scalar(s)),
        TypeInner::Array { .. } => "array".to_string(),
        TypeInner::Sampler { comparison: true } => "sampler_comparison".to_string(),
        TypeInner::Sampler { comparison: false } => "sampler".to_string(),
        TypeInner::Image { dim, class, .. } => format!("texture {dim:?} {class:?}"),
        ref other => format!("{other:?}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SHADER: &str = r#"
        // camera block
        struct Globals {
            matrix: mat4x4<f32>,
            tint: vec3<f32>,
            time: f32,
            offset: vec2f,
        };
        @group(0) @binding(0) var<uniform> globals: Globals;
        @group(1) @binding(0) var color_tex: texture_2d<f32>;
        @group(1) @binding(1) var color_smp: sampler;
        @group(1) @binding(2) var velocity_tex: texture_2d<u32>;

        @vertex
        fn vs_main(@location(0) pos: vec3<f32>) -> @builtin(position) vec4<f32> {
            return globals.matrix * vec4<f32>(pos, 1.0);
        }

        @fragment fn fs_main() -> @location(0) vec4<f32> {
            return vec4<f32>(globals.tint, 1.0);
        }
    "#;

    const VS: &str = "@vertex fn vs_main() -> @builtin(position) vec4<f32> { return vec4<f32>(); }";
    const FS: &str = "@fragment fn fs_main() -> @location(0) vec4<f32> { return vec4<f32>(1.0); }";

    fn with_entries(decls: &str) -> String {
        format!("{decls}\n{VS}\n{FS}")
    }

    #[test]
    fn finds_entry_points() {
        let r = reflect(SHADER, SHADER).unwrap();
        assert_eq!(r.vertex_entry, "vs_main");
        assert_eq!(r.fragment_entry, "fs_main");
    }

    #[test]
    fn separate_stage_sources() {
        let r = reflect(VS, FS).unwrap();
        assert_eq!((r.vertex_entry.as_str(), r.fragment_entry.as_str()), ("vs_main", "fs_main"));
    }

    #[test]
    fn uniform_offsets_follow_wgsl_layout() {
        let r = reflect(SHADER, SHADER).unwrap();
        let offsets: Vec<_> = r.uniforms.iter().map(|f| (f.name.as_str(), f.offset)).collect();
        assert_eq!(
            offsets,
            vec![("matrix", 0), ("tint", 64), ("time", 76), ("offset", 80)]
        );
        assert_eq!(r.uniform_size, 96);
        assert_eq!(r.uniform("time").map(|(i, _)| i), Some(2));
    }

    #[test]
    fn explicit_align_and_size_move_members() {
        let src = with_entries(
            r#"
            struct U { a: f32, @align(16) b: f32, @size(32) c: vec2<f32>, d: f32 }
            @group(0) @binding(0) var<uniform> u: U;
            "#,
        );
        let r = reflect(&src, &src).unwrap();
        let offset = |name: &str| r.uniform(name).map(|(_, f)| f.offset);
        assert_eq!(offset("b"), Some(16));
        assert_eq!(offset("c"), Some(24));
        assert_eq!(offset("d"), Some(56));
        assert_eq!(r.uniform_size, 64);
    }

    #[test]
    fn texture_units_from_even_bindings() {
        let r = reflect(SHADER, SHADER).unwrap();
        assert_eq!(r.textures.len(), 2);
        let unit0 = r.texture(0).unwrap();
        assert_eq!(unit0.name, "color_tex");
        assert!(unit0.has_sampler);
        let unit1 = r.texture(1).unwrap();
        assert_eq!(unit1.kind, SampleKind::Uint);
        assert!(!unit1.has_sampler);
    }

    #[test]
    fn missing_fragment_entry_is_an_error() {
        assert_eq!(
            reflect(VS, VS),
            Err(ReflectError::MissingEntryPoint("fragment"))
        );
    }

    #[test]
    fn line_commented_entry_is_ignored() {
        let src = format!("// @vertex fn old() {{}}\n{FS}");
        assert_eq!(
            reflect(&src, &src),
            Err(ReflectError::MissingEntryPoint("vertex"))
        );
    }

    #[test]
    fn block_commented_entry_is_ignored() {
        let src = format!(
            "/* @vertex fn old_main() -> @builtin(position) vec4<f32> {{ return vec4<f32>(); }} */\n{VS}\n{FS}"
        );
        let r = reflect(&src, &src).unwrap();
        assert_eq!(r.vertex_entry, "vs_main");
    }

    #[test]
    fn invalid_source_is_a_parse_error() {
        assert!(matches!(
            reflect("not wgsl", "also not"),
            Err(ReflectError::Parse(_))
        ));
    }

    #[test]
    fn unsupported_uniform_type_is_rejected() {
        let src = with_entries(
            r#"
            struct U { weights: array<vec4<f32>, 4> };
            @group(0) @binding(0) var<uniform> u: U;
            "#,
        );
        assert_eq!(
            reflect(&src, &src),
            Err(ReflectError::UnsupportedType {
                field: "weights".into(),
                ty: "array".into(),
            })
        );
    }

    #[test]
    fn non_struct_uniform_is_rejected() {
        let src = with_entries("@group(0) @binding(0) var<uniform> m: mat4x4<f32>;");
        assert_eq!(
            reflect(&src, &src),
            Err(ReflectError::NotAStruct("m".into()))
        );
    }

    #[test]
    fn shared_block_is_known_by_struct_name() {
        let src = with_entries(
            r#"
            struct Settings { color: vec3<f32>, pos: vec4<f32>, mat: mat4x4<f32> };
            @group(2) @binding(1) var<uniform> settings: Settings;
            "#,
        );
        let r = reflect(&src, &src).unwrap();
        let block = r.block("Settings").unwrap();
        assert_eq!(block.slot, 1);
        assert_eq!(block.size, 96);
        let offsets: Vec<_> = block.fields.iter().map(|f| f.offset).collect();
        assert_eq!(offsets, vec![0, 16, 32]);
        assert_eq!(block.field("mat").map(|(i, _)| i), Some(2));
        assert!(r.uniforms.is_empty());
        assert_eq!(r.block_at(1), Some(block));
    }

    #[test]
    fn block_slot_out_of_range() {
        let src = with_entries(
            r#"
            struct S { a: f32 };
            @group(2) @binding(9) var<uniform> s: S;
            "#,
        );
        assert_eq!(
            reflect(&src, &src),
            Err(ReflectError::SlotOutOfRange { slot: 9 })
        );
    }

    #[test]
    fn program_without_resources_reflects_empty() {
        let r = reflect(VS, FS).unwrap();
        assert!(r.uniforms.is_empty());
        assert_eq!(r.uniform_size, 0);
        assert!(r.textures.is_empty());
        assert!(r.blocks.is_empty());
    }
}
