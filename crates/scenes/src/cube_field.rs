use std::cell::Cell;
use std::f32::consts::TAU;
use std::rc::Rc;

use glam::Mat4;
use lumen_gpu::{GpuContext, Mesh, ProgramId, UniformBlock, UniformLocation};
use lumen_pipeline::{PhysicsFn, RenderFn, RenderFrame, VelocityFn};

use crate::geometry::{self, ModelInstances};
use crate::scene::SceneEntries;
use crate::shaders;

const RADIUS: f32 = 6.0;
const SPIN_RATE: f32 = 0.6;
const AMBIENT: f32 = 0.2;

struct Programs {
    /// Matrix and eye, shared by the cube and grid programs.
    camera: Option<UniformBlock>,
    cube: ProgramId,
    cube_ambient: UniformLocation,
    grid: ProgramId,
    velocity: ProgramId,
    velocity_matrix: UniformLocation,
    velocity_prev: UniformLocation,
}

impl Programs {
    fn new(ctx: &mut GpuContext) -> Self {
        let cube = ctx.create_program(shaders::CUBE, shaders::CUBE);
        let grid = ctx.create_program(shaders::GRID, shaders::GRID);
        let velocity = ctx.create_program(shaders::VELOCITY, shaders::VELOCITY);
        let camera = UniformBlock::new(ctx, cube, "Camera")
            .and_then(|block| block.bind_program(ctx, grid).map(|()| block));
        let camera = match camera {
            Ok(block) => Some(block),
            Err(err) => {
                tracing::error!(%err, "camera block unavailable, cube field will not draw");
                None
            }
        };
        Self {
            camera,
            cube_ambient: ctx.uniform_location(cube, "ambient"),
            velocity_matrix: ctx.uniform_location(velocity, "matrix"),
            velocity_prev: ctx.uniform_location(velocity, "prev_matrix"),
            cube,
            grid,
            velocity,
        }
    }
}

struct FieldState {
    count: usize,
    spin: Cell<f32>,
    prev_matrix: Cell<Option<Mat4>>,
    cube: Mesh,
    grid: Mesh,
    instances: ModelInstances,
    programs: Programs,
}

impl FieldState {
    fn models(&self) -> Vec<Mat4> {
        geometry::ring_models(self.count, RADIUS, self.spin.get())
    }

    fn render(&self, ctx: &mut GpuContext, frame: &RenderFrame) {
        let p = &self.programs;
        self.instances.update(ctx, &self.models());

        if let Some(camera) = &p.camera {
            camera.set(ctx, &[frame.matrix.into(), frame.eye.into()]);
        }

        ctx.use_program(p.grid);
        self.grid.draw(ctx);

        ctx.use_program(p.cube).set_uniform(p.cube_ambient, AMBIENT);
        self.cube.draw_instanced(ctx, self.count as u32);
    }

    /// Screen velocity of the cubes between the previous and the current
    /// camera matrix. The first call has no history and writes zero motion.
    fn velocity(&self, ctx: &mut GpuContext, matrix: &Mat4) {
        let p = &self.programs;
        let prev = self.prev_matrix.get().unwrap_or(*matrix);
        ctx.use_program(p.velocity)
            .set_uniform(p.velocity_matrix, *matrix)
            .set_uniform(p.velocity_prev, prev);
        self.cube.draw_instanced(ctx, self.count as u32);
        self.prev_matrix.set(Some(*matrix));
    }
}

/// A ring of lit, instanced cubes above a floor grid, spinning at a fixed
/// rate per simulation step.
pub struct CubeField {
    state: Rc<FieldState>,
    entries: SceneEntries,
}

impl CubeField {
    pub const DEFAULT_COUNT: usize = 12;

    pub fn new(ctx: &mut GpuContext, count: usize) -> Self {
        let programs = Programs::new(ctx);
        let grid = geometry::grid_mesh(ctx, 20, 1.0);
        let cube = geometry::cube_mesh(ctx);
        let models = geometry::ring_models(count, RADIUS, 0.0);
        let instances = ModelInstances::attach(ctx, cube.vao(), &models);
        geometry::attach_colors(ctx, cube.vao(), &palette(count));
        ctx.unbind_vertex_array();

        let state = Rc::new(FieldState {
            count,
            spin: Cell::new(0.0),
            prev_matrix: Cell::new(None),
            cube,
            grid,
            instances,
            programs,
        });

        let render: Rc<RenderFn> = {
            let state = state.clone();
            Rc::new(move |ctx: &mut GpuContext, frame: &RenderFrame| state.render(ctx, frame))
        };
        let physics: Rc<PhysicsFn> = {
            let state = state.clone();
            Rc::new(move |dt: f32| {
                state.spin.set((state.spin.get() + dt * SPIN_RATE) % TAU);
            })
        };
        let velocity: Rc<VelocityFn> = {
            let state = state.clone();
            Rc::new(move |ctx: &mut GpuContext, matrix: &Mat4| state.velocity(ctx, matrix))
        };

        Self {
            state,
            entries: SceneEntries {
                render,
                physics: Some(physics),
                velocity,
            },
        }
    }

    pub(crate) fn entries(&self) -> &SceneEntries {
        &self.entries
    }

    pub fn count(&self) -> usize {
        self.state.count
    }

    /// Current spin angle in radians.
    pub fn spin(&self) -> f32 {
        self.state.spin.get()
    }
}

/// Evenly spread hues, one per cube.
fn palette(count: usize) -> Vec<[f32; 3]> {
    (0..count)
        .map(|i| {
            let t = i as f32 / count.max(1) as f32;
            let channel = |phase: f32| 0.55 + 0.4 * (TAU * (t + phase)).cos();
            [channel(0.0), channel(1.0 / 3.0), channel(2.0 / 3.0)]
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;
    use lumen_gpu::{HeadlessDevice, RenderTarget, ColorFormat};
    use lumen_pipeline::Pipeline;

    fn setup() -> (GpuContext, Pipeline, CubeField) {
        let mut ctx = GpuContext::new(Box::new(HeadlessDevice::new(32, 32)), 32, 32);
        let field = CubeField::new(&mut ctx, 4);
        let pipeline = Pipeline::new();
        field.entries().enable(&pipeline);
        (ctx, pipeline, field)
    }

    fn frame(matrix: Mat4) -> RenderFrame {
        RenderFrame {
            matrix,
            eye: Vec3::new(0.0, 2.0, 20.0),
            aspect: 1.0,
            tick: 0,
            target: None,
        }
    }

    #[test]
    fn programs_link_and_resolve_uniforms() {
        let (ctx, _, field) = setup();
        let p = &field.state.programs;
        assert!(ctx.diagnostics().is_empty(), "{:?}", ctx.diagnostics());
        for loc in [p.cube_ambient, p.velocity_matrix, p.velocity_prev] {
            assert!(loc.is_valid());
        }
        let camera = p.camera.as_ref().unwrap();
        assert_eq!(ctx.bindings().uniform_block(camera.slot()), Some(camera.buffer()));
    }

    #[test]
    fn render_draws_grid_then_instanced_cubes() {
        let (mut ctx, pipeline, field) = setup();
        pipeline.run_render(&mut ctx, &frame(Mat4::IDENTITY));

        let dev = ctx.device_as::<HeadlessDevice>().unwrap();
        let draws = dev.draws();
        assert_eq!(draws.len(), 2);
        assert_eq!(draws[0].program, Some(field.state.programs.grid));
        assert_eq!(draws[1].call.instances, 4);
        assert_eq!(draws[1].call.count, 36);
        let ambient: f32 = bytemuck::pod_read_unaligned(&draws[1].uniforms[0..4]);
        assert_eq!(ambient, AMBIENT);
    }

    #[test]
    fn grid_and_cubes_read_one_camera_block() {
        let (mut ctx, pipeline, _) = setup();
        let matrix = Mat4::from_translation(Vec3::new(1.0, 2.0, 3.0));
        pipeline.run_render(&mut ctx, &frame(matrix));

        let dev = ctx.device_as::<HeadlessDevice>().unwrap();
        let draws = dev.draws();
        assert_eq!(draws[0].blocks, draws[1].blocks);
        let (slot, bytes) = &draws[0].blocks[0];
        assert_eq!(*slot, 0);
        let cols: [f32; 16] = bytemuck::pod_read_unaligned(&bytes[0..64]);
        assert_eq!(Mat4::from_cols_array(&cols), matrix);
        let eye: [f32; 3] = bytemuck::pod_read_unaligned(&bytes[64..76]);
        assert_eq!(eye, [0.0, 2.0, 20.0]);
    }

    #[test]
    fn physics_spins_by_rate() {
        let (_, pipeline, field) = setup();
        pipeline.run_physics(0.5);
        pipeline.run_physics(0.5);
        assert!((field.spin() - SPIN_RATE).abs() < 1e-6);
    }

    #[test]
    fn first_velocity_pass_uses_current_matrix_as_history() {
        let (mut ctx, pipeline, field) = setup();
        let velocity = RenderTarget::new(&mut ctx, 32, 32, ColorFormat::Rg16Uint);
        velocity.enable(&mut ctx);

        let a = Mat4::from_translation(Vec3::X);
        let b = Mat4::from_translation(Vec3::Y);
        pipeline.run_velocity(&mut ctx, &a);
        pipeline.run_velocity(&mut ctx, &b);

        let dev = ctx.device_as::<HeadlessDevice>().unwrap();
        let draws = dev.draws();
        assert_eq!(draws.len(), 2);
        let prev_of = |i: usize| -> Mat4 {
            let cols: [f32; 16] = bytemuck::pod_read_unaligned(&draws[i].uniforms[64..128]);
            Mat4::from_cols_array(&cols)
        };
        assert_eq!(prev_of(0), a);
        assert_eq!(prev_of(1), a);
        assert_eq!(draws[1].framebuffer, Some(velocity.framebuffer()));
        assert_eq!(field.count(), 4);
    }

    #[test]
    fn palette_stays_in_range() {
        for color in palette(12) {
            assert!(color.iter().all(|c| (0.0..=1.0).contains(c)));
        }
    }
}
