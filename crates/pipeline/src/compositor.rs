use lumen_gpu::{ColorFormat, GpuContext, Mesh, RenderTarget, disable_render_target};

use crate::stages::Pipeline;

/// What one [`Compositor::run`] did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompositeReport {
    /// Effects that rendered into an intermediate target.
    pub intermediate_passes: usize,
    /// Whether an effect rendered to the default surface.
    pub final_pass: bool,
}

/// Ping-pong chain over two render targets.
///
/// The scene renders into target A. Each intermediate effect samples the
/// current source on unit 0 and writes the other target; the final effect
/// samples the last source and writes the default surface.
pub struct Compositor {
    targets: [RenderTarget; 2],
    source: usize,
    quad: Mesh,
}

impl Compositor {
    /// Allocate both targets and the full-screen quad. Leaves the default
    /// surface bound.
    pub fn new(ctx: &mut GpuContext, width: u32, height: u32) -> Self {
        let targets = [
            RenderTarget::new(ctx, width, height, ColorFormat::Rgba8),
            RenderTarget::new(ctx, width, height, ColorFormat::Rgba8),
        ];
        let quad = ctx.fullscreen_quad();
        disable_render_target(ctx);
        Self {
            targets,
            source: 0,
            quad,
        }
    }

    /// Target the scene must be rendered into before [`run`](Self::run).
    pub fn scene_target(&self) -> &RenderTarget {
        &self.targets[0]
    }

    pub fn targets(&self) -> &[RenderTarget; 2] {
        &self.targets
    }

    pub fn quad(&self) -> Mesh {
        self.quad
    }

    /// Reallocate both targets at the new surface size.
    pub fn resize(&mut self, ctx: &mut GpuContext, width: u32, height: u32) {
        for target in &mut self.targets {
            target.resize(ctx, width, height);
        }
    }

    /// Run every post-process effect in registration order.
    pub fn run(&mut self, ctx: &mut GpuContext, pipeline: &Pipeline) -> CompositeReport {
        let effects = pipeline.post_process.snapshot();
        let Some((last, intermediate)) = effects.split_last() else {
            return CompositeReport::default();
        };
        let _span = tracing::debug_span!("post_process", effects = effects.len()).entered();

        let quad = self.quad;
        let draw_quad = move |ctx: &mut GpuContext| quad.draw(ctx);

        self.source = 0;
        for effect in intermediate {
            let source = &self.targets[self.source];
            let dest = &self.targets[1 - self.source];
            ctx.set_texture_unit(source.color(), 0);
            dest.enable(ctx);
            effect(ctx, &draw_quad);
            self.source = 1 - self.source;
        }

        ctx.set_texture_unit(self.targets[self.source].color(), 0);
        disable_render_target(ctx);
        last(ctx, &draw_quad);

        CompositeReport {
            intermediate_passes: intermediate.len(),
            final_pass: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stages::PostProcessFn;
    use lumen_gpu::{HeadlessDevice, TextureId};
    use std::rc::Rc;

    const COPY: &str = r#"
        @group(1) @binding(0) var src: texture_2d<f32>;
        @group(1) @binding(1) var smp: sampler;
        @vertex fn vs_main(@location(0) p: vec2<f32>) -> @builtin(position) vec4<f32> {
            return vec4<f32>(p, 0.0, 1.0);
        }
        @fragment fn fs_main() -> @location(0) vec4<f32> { return vec4<f32>(1.0); }
    "#;

    fn setup() -> (GpuContext, Compositor, Rc<Pipeline>) {
        let mut ctx = GpuContext::new(Box::new(HeadlessDevice::new(64, 64)), 64, 64);
        let compositor = Compositor::new(&mut ctx, 64, 64);
        (ctx, compositor, Rc::new(Pipeline::new()))
    }

    fn effect(ctx: &mut GpuContext) -> Rc<PostProcessFn> {
        let program = ctx.create_program(COPY, COPY);
        Rc::new(move |ctx: &mut GpuContext, draw: &dyn Fn(&mut GpuContext)| {
            ctx.use_program(program);
            draw(ctx);
        })
    }

    fn draws(ctx: &GpuContext) -> Vec<(Option<lumen_gpu::FramebufferId>, Option<TextureId>)> {
        ctx.device_as::<HeadlessDevice>()
            .unwrap()
            .draws()
            .iter()
            .map(|d| (d.framebuffer, d.textures[0]))
            .collect()
    }

    #[test]
    fn no_effects_is_a_noop() {
        let (mut ctx, mut compositor, pipeline) = setup();
        let report = compositor.run(&mut ctx, &pipeline);
        assert_eq!(report, CompositeReport::default());
        assert!(draws(&ctx).is_empty());
    }

    #[test]
    fn single_effect_renders_directly_to_surface() {
        let (mut ctx, mut compositor, pipeline) = setup();
        pipeline.post_process.push(effect(&mut ctx));
        let report = compositor.run(&mut ctx, &pipeline);
        assert_eq!(report.intermediate_passes, 0);
        assert!(report.final_pass);
        let a = compositor.scene_target().color();
        assert_eq!(draws(&ctx), vec![(None, Some(a))]);
        assert_eq!(ctx.bindings().viewport, lumen_gpu::Viewport::sized(64, 64));
    }

    #[test]
    fn three_effects_alternate_sources_and_targets() {
        let (mut ctx, mut compositor, pipeline) = setup();
        for _ in 0..3 {
            pipeline.post_process.push(effect(&mut ctx));
        }
        let report = compositor.run(&mut ctx, &pipeline);
        assert_eq!(report.intermediate_passes, 2);
        assert!(report.final_pass);

        let [a, b] = compositor.targets();
        assert_eq!(
            draws(&ctx),
            vec![
                (Some(b.framebuffer()), Some(a.color())),
                (Some(a.framebuffer()), Some(b.color())),
                (None, Some(a.color())),
            ]
        );
    }

    #[test]
    fn two_effects_end_sampling_target_b() {
        let (mut ctx, mut compositor, pipeline) = setup();
        pipeline.post_process.push(effect(&mut ctx));
        pipeline.post_process.push(effect(&mut ctx));
        compositor.run(&mut ctx, &pipeline);
        compositor.run(&mut ctx, &pipeline);
        let [a, b] = compositor.targets();
        let seen = draws(&ctx);
        assert_eq!(seen.len(), 4);
        // every run starts again from the scene target
        assert_eq!(seen[2], (Some(b.framebuffer()), Some(a.color())));
        assert_eq!(seen[3], (None, Some(b.color())));
    }

    #[test]
    fn resize_reallocates_both_targets() {
        let (mut ctx, mut compositor, _) = setup();
        compositor.resize(&mut ctx, 128, 32);
        for target in compositor.targets() {
            assert_eq!(target.size(), (128, 32));
        }
    }
}
