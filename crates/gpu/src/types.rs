use glam::{Mat4, Vec2, Vec3, Vec4};

use crate::error::LoadError;

/// Number of texture units tracked by the binding context.
pub const MAX_TEXTURE_UNITS: usize = 8;

/// Number of shared uniform block slots (`@group(2)` bindings).
pub const MAX_UNIFORM_BLOCKS: usize = 4;

/// Texel written into every freshly created texture: opaque blue.
pub const PLACEHOLDER_TEXEL: [u8; 4] = [0, 0, 255, 255];

/// Binding point for buffer operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferTarget {
    /// Per-vertex attribute data.
    Array,
    /// Index data; recorded into the bound vertex array.
    ElementArray,
    /// Storage of a shared uniform block. Programs see it once it is
    /// attached to a slot with
    /// [`GpuContext::bind_uniform_block`](crate::GpuContext::bind_uniform_block).
    Uniform,
}

/// Update frequency hint for buffer uploads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BufferUsage {
    #[default]
    Static,
    /// Contents are expected to change often (per frame).
    Dynamic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureFormat {
    Rgba8,
    R8,
    /// Two 16-bit unsigned integer channels; used for velocity buffers.
    Rg16Uint,
    Depth24,
}

impl TextureFormat {
    pub fn bytes_per_texel(self) -> usize {
        match self {
            Self::Rgba8 => 4,
            Self::R8 => 1,
            Self::Rg16Uint => 4,
            Self::Depth24 => 4,
        }
    }

    pub fn is_depth(self) -> bool {
        matches!(self, Self::Depth24)
    }

    pub fn is_integer(self) -> bool {
        matches!(self, Self::Rg16Uint)
    }
}

/// Shape of a texture image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureDesc {
    pub format: TextureFormat,
    pub width: u32,
    pub height: u32,
}

impl TextureDesc {
    pub fn new(format: TextureFormat, width: u32, height: u32) -> Self {
        Self {
            format,
            width,
            height,
        }
    }

    pub fn rgba8(width: u32, height: u32) -> Self {
        Self::new(TextureFormat::Rgba8, width, height)
    }

    /// Byte length of a tightly packed image with this shape.
    pub fn byte_len(&self) -> usize {
        self.width as usize * self.height as usize * self.format.bytes_per_texel()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Filter {
    #[default]
    Nearest,
    Linear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Wrap {
    #[default]
    ClampToEdge,
    Repeat,
}

/// Framebuffer attachment point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Attachment {
    Color,
    Depth,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DrawMode {
    #[default]
    Triangles,
    TriangleStrip,
    Lines,
    LineStrip,
    Points,
}

/// Rectangle of the current target that draws land in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Viewport {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    pub fn sized(width: u32, height: u32) -> Self {
        Self {
            x: 0,
            y: 0,
            width,
            height,
        }
    }
}

/// Component type of a vertex attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AttribType {
    #[default]
    F32,
    U32,
}

/// One attribute pointer of a vertex array.
///
/// `stride` and `offset` are in bytes. A zero stride means tightly packed
/// (`size * 4` bytes).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexAttrib {
    pub location: u32,
    pub size: u8,
    pub stride: u32,
    pub offset: u32,
    pub ty: AttribType,
}

impl VertexAttrib {
    pub fn new(location: u32, size: u8) -> Self {
        Self {
            location,
            size: size.clamp(1, 4),
            stride: 0,
            offset: 0,
            ty: AttribType::F32,
        }
    }

    pub fn stride(mut self, stride: u32) -> Self {
        self.stride = stride;
        self
    }

    pub fn offset(mut self, offset: u32) -> Self {
        self.offset = offset;
        self
    }

    pub fn ty(mut self, ty: AttribType) -> Self {
        self.ty = ty;
        self
    }

    /// Stride actually used when fetching, resolving the packed default.
    pub fn effective_stride(&self) -> u32 {
        if self.stride == 0 {
            u32::from(self.size) * 4
        } else {
            self.stride
        }
    }
}

/// Description of a single draw submitted to the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawCall {
    pub mode: DrawMode,
    /// First vertex (arrays) or first index (elements).
    pub first: u32,
    pub count: u32,
    pub instances: u32,
    pub indexed: bool,
}

/// Reflected type of a uniform field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UniformType {
    F32,
    I32,
    U32,
    Vec2,
    Vec3,
    Vec4,
    Mat4,
}

impl UniformType {
    /// (alignment, size) under the WGSL uniform address-space rules.
    pub fn layout(self) -> (usize, usize) {
        match self {
            Self::F32 | Self::I32 | Self::U32 => (4, 4),
            Self::Vec2 => (8, 8),
            Self::Vec3 => (16, 12),
            Self::Vec4 => (16, 16),
            Self::Mat4 => (16, 64),
        }
    }
}

/// Value written through [`GpuContext::set_uniform`](crate::GpuContext::set_uniform).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UniformValue {
    F32(f32),
    I32(i32),
    U32(u32),
    Vec2(Vec2),
    Vec3(Vec3),
    Vec4(Vec4),
    Mat4(Mat4),
}

impl UniformValue {
    pub fn ty(&self) -> UniformType {
        match self {
            Self::F32(_) => UniformType::F32,
            Self::I32(_) => UniformType::I32,
            Self::U32(_) => UniformType::U32,
            Self::Vec2(_) => UniformType::Vec2,
            Self::Vec3(_) => UniformType::Vec3,
            Self::Vec4(_) => UniformType::Vec4,
            Self::Mat4(_) => UniformType::Mat4,
        }
    }

    /// Little-endian bytes as laid out in a uniform block.
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Self::F32(v) => v.to_le_bytes().to_vec(),
            Self::I32(v) => v.to_le_bytes().to_vec(),
            Self::U32(v) => v.to_le_bytes().to_vec(),
            Self::Vec2(v) => bytemuck::cast_slice(&v.to_array()).to_vec(),
            Self::Vec3(v) => bytemuck::cast_slice(&v.to_array()).to_vec(),
            Self::Vec4(v) => bytemuck::cast_slice(&v.to_array()).to_vec(),
            Self::Mat4(m) => bytemuck::cast_slice(&m.to_cols_array()).to_vec(),
        }
    }
}

/// Decoded RGBA8 pixels ready for upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageData {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

impl ImageData {
    pub fn new(width: u32, height: u32, rgba: Vec<u8>) -> Result<Self, LoadError> {
        let expected = width as usize * height as usize * 4;
        if width == 0 || height == 0 || rgba.len() != expected {
            return Err(LoadError::InvalidDimensions {
                width,
                height,
                len: rgba.len(),
            });
        }
        Ok(Self {
            width,
            height,
            rgba,
        })
    }

    pub fn solid(width: u32, height: u32, color: [u8; 4]) -> Self {
        let rgba = color
            .iter()
            .copied()
            .cycle()
            .take(width as usize * height as usize * 4)
            .collect();
        Self {
            width,
            height,
            rgba,
        }
    }

    /// Two-colour checkerboard with square cells of `cell` texels.
    pub fn checker(width: u32, height: u32, cell: u32, a: [u8; 4], b: [u8; 4]) -> Self {
        let cell = cell.max(1);
        let mut rgba = Vec::with_capacity(width as usize * height as usize * 4);
        for y in 0..height {
            for x in 0..width {
                let pick = ((x / cell) + (y / cell)) % 2 == 0;
                rgba.extend_from_slice(if pick { &a } else { &b });
            }
        }
        Self {
            width,
            height,
            rgba,
        }
    }
}
