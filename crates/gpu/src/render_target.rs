use crate::context::GpuContext;
use crate::handle::{FramebufferId, TextureId};
use crate::types::{Attachment, Filter, TextureDesc, TextureFormat, Wrap};

/// Colour attachment format of a [`RenderTarget`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColorFormat {
    #[default]
    Rgba8,
    /// Integer target for velocity data.
    Rg16Uint,
}

impl ColorFormat {
    pub fn texture_format(self) -> TextureFormat {
        match self {
            Self::Rgba8 => TextureFormat::Rgba8,
            Self::Rg16Uint => TextureFormat::Rg16Uint,
        }
    }
}

/// Offscreen framebuffer with a colour and a depth texture, always paired.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderTarget {
    framebuffer: FramebufferId,
    color: TextureId,
    depth: TextureId,
    width: u32,
    height: u32,
    format: ColorFormat,
    uint_clear: [u32; 4],
}

impl RenderTarget {
    /// Allocate framebuffer, colour and depth textures. Leaves the
    /// framebuffer bound and the depth texture bound on the active unit.
    pub fn new(ctx: &mut GpuContext, width: u32, height: u32, format: ColorFormat) -> Self {
        let framebuffer = ctx.create_framebuffer();
        let color = ctx.create_texture();
        let depth = ctx.create_texture();
        let mut target = Self {
            framebuffer,
            color,
            depth,
            width,
            height,
            format,
            uint_clear: [0; 4],
        };
        target.allocate(ctx, width, height);
        ctx.attach_texture(framebuffer, Attachment::Color, color)
            .attach_texture(framebuffer, Attachment::Depth, depth);
        tracing::debug!(%framebuffer, width, height, ?format, "render target created");
        target
    }

    fn allocate(&mut self, ctx: &mut GpuContext, width: u32, height: u32) {
        let (width, height) = (width.max(1), height.max(1));
        self.width = width;
        self.height = height;
        let filter = match self.format {
            ColorFormat::Rgba8 => Filter::Linear,
            ColorFormat::Rg16Uint => Filter::Nearest,
        };
        ctx.set_texture_data(
            self.color,
            TextureDesc::new(self.format.texture_format(), width, height),
            None,
        )
        .set_texture_params(self.color, filter, Wrap::ClampToEdge)
        .set_texture_data(
            self.depth,
            TextureDesc::new(TextureFormat::Depth24, width, height),
            None,
        );
    }

    /// Reallocate both textures at the new size, keeping the handles.
    /// Leaves the depth texture bound on the active unit.
    pub fn resize(&mut self, ctx: &mut GpuContext, width: u32, height: u32) {
        self.allocate(ctx, width, height);
    }

    /// Bind the framebuffer and set the viewport to the target size.
    pub fn enable(&self, ctx: &mut GpuContext) {
        ctx.bind_framebuffer(Some(self.framebuffer))
            .viewport(0, 0, self.width, self.height);
    }

    /// Value an integer target is cleared to by [`RenderTarget::clear`].
    /// Ignored by `Rgba8` targets, which use the context clear colour.
    pub fn with_uint_clear(mut self, value: [u32; 4]) -> Self {
        self.uint_clear = value;
        self
    }

    pub fn uint_clear(&self) -> [u32; 4] {
        self.uint_clear
    }

    /// Clear colour and depth. Integer targets clear to their
    /// [`uint_clear`](Self::uint_clear) value. Expects the target to be
    /// enabled.
    pub fn clear(&self, ctx: &mut GpuContext) {
        match self.format {
            ColorFormat::Rgba8 => ctx.clear(),
            ColorFormat::Rg16Uint => ctx.clear_depth_uint(self.uint_clear),
        };
    }

    pub fn framebuffer(&self) -> FramebufferId {
        self.framebuffer
    }

    pub fn color(&self) -> TextureId {
        self.color
    }

    pub fn depth(&self) -> TextureId {
        self.depth
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn format(&self) -> ColorFormat {
        self.format
    }
}

/// Bind the default surface and restore the surface viewport.
pub fn disable_render_target(ctx: &mut GpuContext) {
    let (width, height) = ctx.surface_size();
    ctx.bind_framebuffer(None).viewport(0, 0, width, height);
}
