use std::rc::Rc;

use lumen_frame::{AnimationHost, FixedStep, FrameLoop, LoopStats, TickReport};
use lumen_gpu::{GpuContext, disable_render_target};
use lumen_input::InputState;
use lumen_pipeline::{CompositeReport, Compositor, Pipeline, RenderFrame};

use crate::effects::{Fxaa, MotionBlur, Passthrough};
use crate::rigs::{CameraKind, Rig, SharedCamera, demo_camera};
use crate::scene::{Scene, SceneKind};

/// Startup options shared by the hosts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DemoConfig {
    pub width: u32,
    pub height: u32,
    pub scene: SceneKind,
    pub camera: CameraKind,
    pub fxaa: bool,
    pub motion_blur: bool,
    pub clear_color: [f32; 4],
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            width: 800,
            height: 600,
            scene: SceneKind::default(),
            camera: CameraKind::default(),
            fxaa: true,
            motion_blur: false,
            clear_color: [0.05, 0.06, 0.08, 1.0],
        }
    }
}

/// What one presented frame did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameReport {
    pub tick: u64,
    /// Whether the velocity stage ran.
    pub velocity: bool,
    pub composite: CompositeReport,
}

/// Totals over one [`Demo::run_loop`].
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RunReport {
    pub loop_stats: LoopStats,
    pub presented: u64,
    pub velocity_passes: u64,
}

/// A complete demo: one pipeline, a camera rig, a scene and the
/// post-process chain, presented through the compositor.
///
/// Effects always run in the order passthrough, motion blur, FXAA.
pub struct Demo {
    pipeline: Rc<Pipeline>,
    rig: Rig,
    scene: Scene,
    compositor: Compositor,
    passthrough: Passthrough,
    motion_blur: MotionBlur,
    fxaa: Fxaa,
    config: DemoConfig,
}

impl Demo {
    /// Build everything at the context's current surface size.
    pub fn new(ctx: &mut GpuContext, config: DemoConfig) -> Self {
        let _span = tracing::info_span!("demo_init", scene = %config.scene, camera = %config.camera)
            .entered();
        ctx.set_clear_color(config.clear_color);
        let (width, height) = ctx.surface_size();
        let pipeline = Rc::new(Pipeline::new());

        let rig = Rig::new(config.camera, demo_camera(ctx.aspect()));
        rig.enable(&pipeline);
        let scene = Scene::new(ctx, config.scene);
        scene.enable(&pipeline);

        let compositor = Compositor::new(ctx, width, height);
        let passthrough = Passthrough::new(ctx);
        let motion_blur = MotionBlur::new(ctx, width, height);
        let fxaa = Fxaa::new(ctx);

        let demo = Self {
            pipeline,
            rig,
            scene,
            compositor,
            passthrough,
            motion_blur,
            fxaa,
            config,
        };
        demo.sync_effects();
        if !ctx.diagnostics().is_empty() {
            tracing::warn!(count = ctx.diagnostics().len(), "demo built with shader diagnostics");
        }
        tracing::info!(width, height, "demo ready");
        demo
    }

    pub fn pipeline(&self) -> &Rc<Pipeline> {
        &self.pipeline
    }

    pub fn camera(&self) -> &SharedCamera {
        self.rig.camera()
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    pub fn compositor(&self) -> &Compositor {
        &self.compositor
    }

    pub fn motion_blur(&self) -> &MotionBlur {
        &self.motion_blur
    }

    pub fn config(&self) -> &DemoConfig {
        &self.config
    }

    pub fn set_fxaa(&mut self, on: bool) {
        self.config.fxaa = on;
        self.sync_effects();
    }

    pub fn set_motion_blur(&mut self, on: bool) {
        self.config.motion_blur = on;
        self.sync_effects();
    }

    fn sync_effects(&self) {
        let pipeline = &self.pipeline;
        self.motion_blur.disable(pipeline);
        self.fxaa.disable(pipeline);
        self.passthrough.enable(pipeline);
        if self.config.motion_blur {
            self.motion_blur.enable(pipeline);
        }
        if self.config.fxaa {
            self.fxaa.enable(pipeline);
        }
        tracing::debug!(
            fxaa = self.config.fxaa,
            motion_blur = self.config.motion_blur,
            effects = pipeline.post_process.len(),
            "post-process chain updated"
        );
    }

    /// Replace the active scene.
    pub fn switch_scene(&mut self, ctx: &mut GpuContext, kind: SceneKind) {
        if self.scene.kind() == kind {
            return;
        }
        self.scene.disable(&self.pipeline);
        self.scene = Scene::new(ctx, kind);
        self.scene.enable(&self.pipeline);
        self.config.scene = kind;
    }

    /// One simulation step: input components, then physics.
    pub fn update(&self, input: &mut InputState, dt: f32) {
        self.pipeline.run_input(input, dt);
        self.pipeline.run_physics(dt);
    }

    /// One presentation pass: scene into the compositor's first target,
    /// velocity when motion blur is on, the post-process chain, present.
    pub fn frame(&mut self, ctx: &mut GpuContext, tick: u64) -> FrameReport {
        let _span = tracing::debug_span!("frame", tick).entered();
        let (matrix, eye) = {
            let mut camera = self.rig.camera().borrow_mut();
            camera.recalculate();
            (camera.matrix(), camera.eye())
        };

        let scene_target = self.compositor.scene_target();
        scene_target.enable(ctx);
        let frame = RenderFrame {
            matrix,
            eye,
            aspect: ctx.aspect(),
            tick,
            target: Some(scene_target.framebuffer()),
        };
        self.pipeline.run_render(ctx, &frame);
        disable_render_target(ctx);

        let velocity = self.motion_blur.is_enabled(&self.pipeline);
        if velocity {
            self.motion_blur.render_velocity(ctx, &self.pipeline, &matrix);
            disable_render_target(ctx);
        }

        let composite = self.compositor.run(ctx, &self.pipeline);
        ctx.present();
        FrameReport {
            tick,
            velocity,
            composite,
        }
    }

    /// Drive `step` to host time `now_ms`: drained updates, then one frame.
    pub fn advance(
        &mut self,
        ctx: &mut GpuContext,
        step: &mut FixedStep,
        now_ms: f64,
        input: &mut InputState,
    ) -> (TickReport, Option<FrameReport>) {
        let pipeline = self.pipeline.clone();
        let mut frame = None;
        let report = step.advance(
            now_ms,
            |dt| {
                pipeline.run_input(input, dt);
                pipeline.run_physics(dt);
            },
            |tick| frame = Some(self.frame(ctx, tick)),
        );
        (report, frame)
    }

    /// Drive the demo from `host` through `frame_loop` until the host runs
    /// dry or the loop's handle is stopped.
    pub fn run_loop<H: AnimationHost + ?Sized>(
        &mut self,
        ctx: &mut GpuContext,
        frame_loop: &mut FrameLoop,
        host: &mut H,
        input: &mut InputState,
    ) -> RunReport {
        let pipeline = self.pipeline.clone();
        let mut presented = 0;
        let mut velocity_passes = 0;
        let loop_stats = frame_loop.run(
            host,
            |dt| {
                pipeline.run_input(input, dt);
                pipeline.run_physics(dt);
            },
            |tick| {
                let frame = self.frame(ctx, tick);
                presented += 1;
                velocity_passes += u64::from(frame.velocity);
            },
        );
        RunReport {
            loop_stats,
            presented,
            velocity_passes,
        }
    }

    /// Follow a surface resize: context, camera aspect and every target.
    /// Zero-sized surfaces are ignored.
    pub fn resize(&mut self, ctx: &mut GpuContext, width: u32, height: u32) {
        if width == 0 || height == 0 {
            tracing::debug!(width, height, "ignoring empty resize");
            return;
        }
        ctx.resize(width, height);
        self.rig.camera().borrow_mut().set_aspect(ctx.aspect());
        self.compositor.resize(ctx, width, height);
        self.motion_blur.resize(ctx, width, height);
        disable_render_target(ctx);
        self.config.width = width;
        self.config.height = height;
    }
}
