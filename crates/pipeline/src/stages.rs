use glam::{Mat4, Vec3};
use lumen_gpu::{FramebufferId, GpuContext};
use lumen_input::InputState;

use crate::registry::Registry;

pub type InputFn = dyn Fn(&InputState, f32);
pub type PhysicsFn = dyn Fn(f32);
pub type RenderFn = dyn Fn(&mut GpuContext, &RenderFrame);
pub type VelocityFn = dyn Fn(&mut GpuContext, &Mat4);
/// Post-process effects receive a thunk that draws the current full-screen quad.
pub type PostProcessFn = dyn Fn(&mut GpuContext, &dyn Fn(&mut GpuContext));

/// Per-frame data handed to render components.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderFrame {
    /// Combined projection × view matrix.
    pub matrix: Mat4,
    pub eye: Vec3,
    pub aspect: f32,
    pub tick: u64,
    /// Framebuffer being rendered into; `None` is the default surface.
    pub target: Option<FramebufferId>,
}

/// The five stage registries, constructed once and shared as `Rc<Pipeline>`.
#[derive(Debug, Default)]
pub struct Pipeline {
    pub input: Registry<InputFn>,
    pub physics: Registry<PhysicsFn>,
    pub render: Registry<RenderFn>,
    pub velocity: Registry<VelocityFn>,
    pub post_process: Registry<PostProcessFn>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run every input component, then reset per-dispatch input state.
    pub fn run_input(&self, input: &mut InputState, dt: f32) {
        for entry in self.input.snapshot() {
            entry(input, dt);
        }
        input.end_dispatch();
    }

    pub fn run_physics(&self, dt: f32) {
        let _span = tracing::trace_span!("physics").entered();
        for entry in self.physics.snapshot() {
            entry(dt);
        }
    }

    /// Clear the current target, then run every render component.
    pub fn run_render(&self, ctx: &mut GpuContext, frame: &RenderFrame) {
        let _span = tracing::debug_span!("render", tick = frame.tick).entered();
        ctx.clear();
        for entry in self.render.snapshot() {
            entry(ctx, frame);
        }
    }

    pub fn run_velocity(&self, ctx: &mut GpuContext, matrix: &Mat4) {
        let _span = tracing::debug_span!("velocity").entered();
        for entry in self.velocity.snapshot() {
            entry(ctx, matrix);
        }
    }

    /// Drop every registered component.
    pub fn clear(&self) {
        self.input.clear();
        self.physics.clear();
        self.render.clear();
        self.velocity.clear();
        self.post_process.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumen_gpu::HeadlessDevice;
    use lumen_gpu::headless::Command;
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    #[test]
    fn self_removal_mid_run_still_runs_everyone() {
        let pipeline = Rc::new(Pipeline::new());
        let calls = Rc::new(RefCell::new(Vec::new()));

        let slot: Rc<RefCell<Option<Rc<PhysicsFn>>>> = Rc::new(RefCell::new(None));
        let remover: Rc<PhysicsFn> = {
            let pipeline = Rc::downgrade(&pipeline);
            let slot = slot.clone();
            let calls = calls.clone();
            Rc::new(move |_dt: f32| {
                calls.borrow_mut().push("remover");
                if let (Some(p), Some(me)) = (pipeline.upgrade(), slot.borrow().as_ref()) {
                    p.physics.remove(me);
                }
            })
        };
        *slot.borrow_mut() = Some(remover.clone());

        let c = calls.clone();
        pipeline.physics.push(Rc::new(move |_: f32| c.borrow_mut().push("first")));
        pipeline.physics.push(remover);
        let c = calls.clone();
        pipeline.physics.push(Rc::new(move |_: f32| c.borrow_mut().push("last")));

        pipeline.run_physics(1.0 / 60.0);
        assert_eq!(*calls.borrow(), vec!["first", "remover", "last"]);
        assert_eq!(pipeline.physics.len(), 2);

        calls.borrow_mut().clear();
        pipeline.run_physics(1.0 / 60.0);
        assert_eq!(*calls.borrow(), vec!["first", "last"]);
    }

    #[test]
    fn push_during_run_takes_effect_next_run() {
        let pipeline = Rc::new(Pipeline::new());
        let hits = Rc::new(Cell::new(0));
        let weak = Rc::downgrade(&pipeline);
        let h = hits.clone();
        pipeline.physics.push(Rc::new(move |_: f32| {
            if let Some(p) = weak.upgrade() {
                let h = h.clone();
                p.physics.push(Rc::new(move |_: f32| h.set(h.get() + 1)));
            }
        }));
        pipeline.run_physics(0.1);
        assert_eq!(hits.get(), 0);
        pipeline.run_physics(0.1);
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn input_dispatch_then_reset() {
        let pipeline = Pipeline::new();
        let seen = Rc::new(Cell::new(0.0f32));
        let s = seen.clone();
        pipeline
            .input
            .push(Rc::new(move |k: &InputState, _dt: f32| s.set(k.ptr_dx)));
        let mut input = InputState::new();
        input.pointer_move(0.0, 0.0, 500.0, 0.0);
        pipeline.run_input(&mut input, 0.016);
        assert_eq!(seen.get(), 0.5);
        assert_eq!(input.ptr_dx, 0.0);
    }

    #[test]
    fn render_clears_before_components() {
        let pipeline = Pipeline::new();
        let mut ctx = GpuContext::new(Box::new(HeadlessDevice::new(8, 8)), 8, 8);
        let clears_seen = Rc::new(Cell::new(0u64));
        let c = clears_seen.clone();
        pipeline
            .render
            .push(Rc::new(move |ctx: &mut GpuContext, frame: &RenderFrame| {
                assert_eq!(frame.tick, 3);
                c.set(ctx.stats().clears);
            }));
        let frame = RenderFrame {
            matrix: Mat4::IDENTITY,
            eye: Vec3::ZERO,
            aspect: 1.0,
            tick: 3,
            target: None,
        };
        pipeline.run_render(&mut ctx, &frame);
        assert_eq!(clears_seen.get(), 1);
        let dev = ctx.device_as::<HeadlessDevice>().unwrap();
        assert!(dev
            .commands()
            .iter()
            .any(|c| matches!(c, Command::Clear { framebuffer: None })));
    }

    #[test]
    fn velocity_receives_matrix() {
        let pipeline = Pipeline::new();
        let mut ctx = GpuContext::new(Box::new(HeadlessDevice::new(8, 8)), 8, 8);
        let got = Rc::new(Cell::new(Mat4::ZERO));
        let g = got.clone();
        pipeline
            .velocity
            .push(Rc::new(move |_: &mut GpuContext, m: &Mat4| g.set(*m)));
        let m = Mat4::from_translation(Vec3::X);
        pipeline.run_velocity(&mut ctx, &m);
        assert_eq!(got.get(), m);
    }
}
