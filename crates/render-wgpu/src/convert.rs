use lumen_gpu::{AttribType, DrawMode, Filter, SampleKind, TextureFormat, Viewport, Wrap};

pub(crate) const SURFACE_DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

pub(crate) fn texture_format(format: TextureFormat) -> wgpu::TextureFormat {
    match format {
        TextureFormat::Rgba8 => wgpu::TextureFormat::Rgba8Unorm,
        TextureFormat::R8 => wgpu::TextureFormat::R8Unorm,
        TextureFormat::Rg16Uint => wgpu::TextureFormat::Rg16Uint,
        // 24-bit depth has no portable wgpu equivalent that can be sampled.
        TextureFormat::Depth24 => wgpu::TextureFormat::Depth32Float,
    }
}

pub(crate) fn texture_usage(format: TextureFormat) -> wgpu::TextureUsages {
    let base = wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::RENDER_ATTACHMENT;
    if format.is_depth() {
        base
    } else {
        base | wgpu::TextureUsages::COPY_DST
    }
}

/// How a texture of `format` can be bound for sampling, if at all.
pub(crate) fn sample_kind(format: TextureFormat) -> Option<SampleKind> {
    match format {
        TextureFormat::Rgba8 | TextureFormat::R8 => Some(SampleKind::Float),
        TextureFormat::Rg16Uint => Some(SampleKind::Uint),
        TextureFormat::Depth24 => None,
    }
}

pub(crate) fn sample_type(kind: SampleKind) -> wgpu::TextureSampleType {
    match kind {
        SampleKind::Float => wgpu::TextureSampleType::Float { filterable: true },
        SampleKind::Uint => wgpu::TextureSampleType::Uint,
    }
}

pub(crate) fn topology(mode: DrawMode) -> wgpu::PrimitiveTopology {
    match mode {
        DrawMode::Triangles => wgpu::PrimitiveTopology::TriangleList,
        DrawMode::TriangleStrip => wgpu::PrimitiveTopology::TriangleStrip,
        DrawMode::Lines => wgpu::PrimitiveTopology::LineList,
        DrawMode::LineStrip => wgpu::PrimitiveTopology::LineStrip,
        DrawMode::Points => wgpu::PrimitiveTopology::PointList,
    }
}

pub(crate) fn strip_index_format(mode: DrawMode) -> Option<wgpu::IndexFormat> {
    match mode {
        DrawMode::TriangleStrip | DrawMode::LineStrip => Some(wgpu::IndexFormat::Uint16),
        _ => None,
    }
}

pub(crate) fn vertex_format(ty: AttribType, size: u8) -> wgpu::VertexFormat {
    match (ty, size) {
        (AttribType::F32, 1) => wgpu::VertexFormat::Float32,
        (AttribType::F32, 2) => wgpu::VertexFormat::Float32x2,
        (AttribType::F32, 3) => wgpu::VertexFormat::Float32x3,
        (AttribType::F32, _) => wgpu::VertexFormat::Float32x4,
        (AttribType::U32, 1) => wgpu::VertexFormat::Uint32,
        (AttribType::U32, 2) => wgpu::VertexFormat::Uint32x2,
        (AttribType::U32, 3) => wgpu::VertexFormat::Uint32x3,
        (AttribType::U32, _) => wgpu::VertexFormat::Uint32x4,
    }
}

pub(crate) fn filter_mode(filter: Filter) -> wgpu::FilterMode {
    match filter {
        Filter::Nearest => wgpu::FilterMode::Nearest,
        Filter::Linear => wgpu::FilterMode::Linear,
    }
}

pub(crate) fn address_mode(wrap: Wrap) -> wgpu::AddressMode {
    match wrap {
        Wrap::ClampToEdge => wgpu::AddressMode::ClampToEdge,
        Wrap::Repeat => wgpu::AddressMode::Repeat,
    }
}

/// Viewport in wgpu pass coordinates, clipped to a `width` x `height`
/// attachment.
///
/// Viewports are given with a bottom-left origin; wgpu counts rows from
/// the top. Returns `None` when nothing of the rectangle is on the target.
pub(crate) fn clamp_viewport(viewport: Viewport, width: u32, height: u32) -> Option<[f32; 4]> {
    let (w, h) = (i64::from(width), i64::from(height));
    let x0 = i64::from(viewport.x).clamp(0, w);
    let x1 = (i64::from(viewport.x) + i64::from(viewport.width)).clamp(0, w);
    let bottom = i64::from(viewport.y).clamp(0, h);
    let top = (i64::from(viewport.y) + i64::from(viewport.height)).clamp(0, h);
    if x1 <= x0 || top <= bottom {
        return None;
    }
    Some([
        x0 as f32,
        (h - top) as f32,
        (x1 - x0) as f32,
        (top - bottom) as f32,
    ])
}

/// Round `len` up to wgpu's copy alignment.
pub(crate) fn align_copy(len: usize) -> usize {
    let align = wgpu::COPY_BUFFER_ALIGNMENT as usize;
    len.div_ceil(align) * align
}
