//! Post-process effects. Each one samples the compositor's source on unit 0
//! and draws the full-screen quad it is handed.

use std::rc::Rc;

use glam::{Mat4, Vec2};
use lumen_gpu::{ColorFormat, GpuContext, ProgramId, RenderTarget, disable_render_target};
use lumen_pipeline::{Pipeline, PostProcessFn};

use crate::shaders;

/// Integer clear for the velocity target: encoded zero motion.
pub const VELOCITY_CLEAR: [u32; 4] = [500, 500, 0, 0];

struct EffectEntry {
    entry: Rc<PostProcessFn>,
}

impl EffectEntry {
    fn enable(&self, pipeline: &Pipeline) {
        if !pipeline.post_process.contains(&self.entry) {
            pipeline.post_process.push(self.entry.clone());
        }
    }

    fn disable(&self, pipeline: &Pipeline) {
        pipeline.post_process.remove(&self.entry);
    }

    fn is_enabled(&self, pipeline: &Pipeline) -> bool {
        pipeline.post_process.contains(&self.entry)
    }
}

macro_rules! toggles {
    ($ty:ty) => {
        impl $ty {
            pub fn enable(&self, pipeline: &Pipeline) {
                self.entry.enable(pipeline);
            }

            pub fn disable(&self, pipeline: &Pipeline) {
                self.entry.disable(pipeline);
            }

            pub fn is_enabled(&self, pipeline: &Pipeline) -> bool {
                self.entry.is_enabled(pipeline)
            }
        }
    };
}

/// Copies the source unchanged.
pub struct Passthrough {
    program: ProgramId,
    entry: EffectEntry,
}

impl Passthrough {
    pub fn new(ctx: &mut GpuContext) -> Self {
        let program = ctx.create_program(shaders::PASSTHROUGH, shaders::PASSTHROUGH);
        let entry: Rc<PostProcessFn> =
            Rc::new(move |ctx: &mut GpuContext, draw: &dyn Fn(&mut GpuContext)| {
                ctx.use_program(program);
                draw(ctx);
            });
        Self {
            program,
            entry: EffectEntry { entry },
        }
    }

    pub fn program(&self) -> ProgramId {
        self.program
    }
}

toggles!(Passthrough);

/// Fast approximate anti-aliasing at the current viewport resolution.
pub struct Fxaa {
    program: ProgramId,
    entry: EffectEntry,
}

impl Fxaa {
    pub fn new(ctx: &mut GpuContext) -> Self {
        let program = ctx.create_program(shaders::FXAA, shaders::FXAA);
        let resolution = ctx.uniform_location(program, "resolution");
        let entry: Rc<PostProcessFn> =
            Rc::new(move |ctx: &mut GpuContext, draw: &dyn Fn(&mut GpuContext)| {
                let viewport = ctx.bindings().viewport;
                let size = Vec2::new(viewport.width as f32, viewport.height as f32);
                ctx.use_program(program).set_uniform(resolution, size);
                draw(ctx);
            });
        Self {
            program,
            entry: EffectEntry { entry },
        }
    }

    pub fn program(&self) -> ProgramId {
        self.program
    }
}

toggles!(Fxaa);

/// Blurs along per-pixel screen velocity. Owns the integer velocity target
/// that the velocity stage renders into.
pub struct MotionBlur {
    program: ProgramId,
    target: RenderTarget,
    entry: EffectEntry,
}

impl MotionBlur {
    pub fn new(ctx: &mut GpuContext, width: u32, height: u32) -> Self {
        let program = ctx.create_program(shaders::MOTION_BLUR, shaders::MOTION_BLUR);
        let target = RenderTarget::new(ctx, width, height, ColorFormat::Rg16Uint)
            .with_uint_clear(VELOCITY_CLEAR);
        disable_render_target(ctx);
        let velocity = target.color();
        let entry: Rc<PostProcessFn> =
            Rc::new(move |ctx: &mut GpuContext, draw: &dyn Fn(&mut GpuContext)| {
                ctx.use_program(program).set_texture_unit(velocity, 1);
                draw(ctx);
                ctx.active_texture(1).unbind_texture().active_texture(0);
            });
        Self {
            program,
            target,
            entry: EffectEntry { entry },
        }
    }

    pub fn program(&self) -> ProgramId {
        self.program
    }

    pub fn target(&self) -> &RenderTarget {
        &self.target
    }

    /// Reallocate the velocity target. Handles are kept, so the registered
    /// effect keeps sampling the right texture.
    pub fn resize(&mut self, ctx: &mut GpuContext, width: u32, height: u32) {
        self.target.resize(ctx, width, height);
        disable_render_target(ctx);
    }

    /// Clear the velocity target to zero motion and run the velocity stage
    /// into it. Leaves the velocity target bound.
    pub fn render_velocity(&self, ctx: &mut GpuContext, pipeline: &Pipeline, matrix: &Mat4) {
        self.target.enable(ctx);
        self.target.clear(ctx);
        pipeline.run_velocity(ctx, matrix);
    }
}

toggles!(MotionBlur);

#[cfg(test)]
mod tests {
    use super::*;
    use lumen_gpu::{HeadlessDevice, Viewport};
    use lumen_pipeline::Compositor;

    fn ctx() -> GpuContext {
        GpuContext::new(Box::new(HeadlessDevice::new(40, 30)), 40, 30)
    }

    fn headless(ctx: &GpuContext) -> &HeadlessDevice {
        ctx.device_as::<HeadlessDevice>().unwrap()
    }

    #[test]
    fn shaders_link_without_diagnostics() {
        let mut ctx = ctx();
        Passthrough::new(&mut ctx);
        Fxaa::new(&mut ctx);
        MotionBlur::new(&mut ctx, 40, 30);
        assert!(ctx.diagnostics().is_empty(), "{:?}", ctx.diagnostics());
    }

    #[test]
    fn enable_is_idempotent() {
        let mut ctx = ctx();
        let pipeline = Pipeline::new();
        let fxaa = Fxaa::new(&mut ctx);
        fxaa.enable(&pipeline);
        fxaa.enable(&pipeline);
        assert_eq!(pipeline.post_process.len(), 1);
        fxaa.disable(&pipeline);
        fxaa.disable(&pipeline);
        assert!(!fxaa.is_enabled(&pipeline));
    }

    #[test]
    fn fxaa_reads_resolution_from_viewport() {
        let mut ctx = ctx();
        let pipeline = Pipeline::new();
        let mut compositor = Compositor::new(&mut ctx, 40, 30);
        let fxaa = Fxaa::new(&mut ctx);
        fxaa.enable(&pipeline);
        compositor.run(&mut ctx, &pipeline);

        let draw = headless(&ctx).draws().last().unwrap().clone();
        assert_eq!(draw.viewport, Viewport::sized(40, 30));
        let w: f32 = bytemuck::pod_read_unaligned(&draw.uniforms[0..4]);
        let h: f32 = bytemuck::pod_read_unaligned(&draw.uniforms[4..8]);
        assert_eq!((w, h), (40.0, 30.0));
    }

    #[test]
    fn motion_blur_samples_velocity_on_unit_one() {
        let mut ctx = ctx();
        let pipeline = Pipeline::new();
        let mut compositor = Compositor::new(&mut ctx, 40, 30);
        let passthrough = Passthrough::new(&mut ctx);
        let blur = MotionBlur::new(&mut ctx, 40, 30);
        passthrough.enable(&pipeline);
        blur.enable(&pipeline);
        compositor.run(&mut ctx, &pipeline);

        let draws = headless(&ctx).draws();
        let last = draws.last().unwrap();
        assert_eq!(last.program, Some(blur.program()));
        assert_eq!(last.framebuffer, None);
        assert_eq!(last.textures[1], Some(blur.target().color()));
        assert_eq!(last.textures[0], Some(compositor.targets()[1].color()));
        assert_eq!(ctx.bindings().texture(1), None);
    }

    #[test]
    fn velocity_target_clears_to_zero_motion() {
        let mut ctx = ctx();
        let pipeline = Pipeline::new();
        let blur = MotionBlur::new(&mut ctx, 40, 30);
        assert_eq!(blur.target().uint_clear(), VELOCITY_CLEAR);
        blur.render_velocity(&mut ctx, &pipeline, &Mat4::IDENTITY);

        let texel = headless(&ctx).texel(blur.target().color(), 0.5, 0.5);
        let [lo, hi] = 500u16.to_le_bytes();
        assert_eq!(texel, Some([lo, hi, lo, hi]));
        assert_eq!(ctx.bindings().framebuffer, Some(blur.target().framebuffer()));
    }

    #[test]
    fn resize_keeps_the_sampled_handle() {
        let mut ctx = ctx();
        let mut blur = MotionBlur::new(&mut ctx, 40, 30);
        let color = blur.target().color();
        blur.resize(&mut ctx, 80, 60);
        assert_eq!(blur.target().color(), color);
        assert_eq!(blur.target().size(), (80, 60));
        assert_eq!(ctx.texture_desc(color).map(|d| (d.width, d.height)), Some((80, 60)));
    }
}
