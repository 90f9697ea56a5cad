use std::cell::{Cell, RefCell};
use std::rc::Rc;

use glam::Mat4;
use lumen_gpu::{
    Filter, GpuContext, ImageData, Mesh, ProgramId, TextureId, TextureLoader, UniformLocation,
    Wrap,
};
use lumen_pipeline::{RenderFn, RenderFrame, VelocityFn};

use crate::geometry::{self, ModelInstances};
use crate::scene::SceneEntries;
use crate::shaders;

const COUNT: usize = 5;
const RADIUS: f32 = 4.0;
const CHECKER_SIZE: u32 = 256;

struct TexturedState {
    cube: Mesh,
    texture: TextureId,
    loader: RefCell<TextureLoader>,
    program: ProgramId,
    matrix: UniformLocation,
    velocity_program: ProgramId,
    velocity_matrix: UniformLocation,
    velocity_prev: UniformLocation,
    prev_matrix: Cell<Option<Mat4>>,
}

impl TexturedState {
    fn render(&self, ctx: &mut GpuContext, frame: &RenderFrame) {
        let installed = self.loader.borrow_mut().poll(ctx);
        if installed > 0 {
            tracing::debug!(installed, "checker texture installed");
        }
        ctx.set_texture_unit(self.texture, 0)
            .use_program(self.program)
            .set_uniform(self.matrix, frame.matrix);
        self.cube.draw_instanced(ctx, COUNT as u32);
    }

    fn velocity(&self, ctx: &mut GpuContext, matrix: &Mat4) {
        let prev = self.prev_matrix.get().unwrap_or(*matrix);
        ctx.use_program(self.velocity_program)
            .set_uniform(self.velocity_matrix, *matrix)
            .set_uniform(self.velocity_prev, prev);
        self.cube.draw_instanced(ctx, COUNT as u32);
        self.prev_matrix.set(Some(*matrix));
    }
}

/// Still ring of cubes sampling a checkerboard generated on a worker thread.
/// Until the image lands, the cubes show the placeholder texel.
pub struct TexturedCubes {
    state: Rc<TexturedState>,
    entries: SceneEntries,
}

impl TexturedCubes {
    pub fn new(ctx: &mut GpuContext) -> Self {
        Self::with_source(ctx, || {
            Ok(ImageData::checker(
                CHECKER_SIZE,
                CHECKER_SIZE,
                CHECKER_SIZE / 8,
                [235, 220, 190, 255],
                [120, 72, 40, 255],
            ))
        })
    }

    /// Build the scene with a custom image source.
    pub fn with_source<F>(ctx: &mut GpuContext, source: F) -> Self
    where
        F: FnOnce() -> Result<ImageData, lumen_gpu::LoadError> + Send + 'static,
    {
        let program = ctx.create_program(shaders::TEXTURED, shaders::TEXTURED);
        let velocity_program = ctx.create_program(shaders::VELOCITY, shaders::VELOCITY);

        let cube = geometry::cube_mesh(ctx);
        ModelInstances::attach(ctx, cube.vao(), &geometry::ring_models(COUNT, RADIUS, 0.0));
        ctx.unbind_vertex_array();

        let texture = ctx.create_texture();
        ctx.set_texture_params(texture, Filter::Linear, Wrap::Repeat);
        let mut loader = TextureLoader::new();
        loader.request(texture, source);

        let state = Rc::new(TexturedState {
            cube,
            texture,
            loader: RefCell::new(loader),
            matrix: ctx.uniform_location(program, "matrix"),
            program,
            velocity_matrix: ctx.uniform_location(velocity_program, "matrix"),
            velocity_prev: ctx.uniform_location(velocity_program, "prev_matrix"),
            velocity_program,
            prev_matrix: Cell::new(None),
        });

        let render: Rc<RenderFn> = {
            let state = state.clone();
            Rc::new(move |ctx: &mut GpuContext, frame: &RenderFrame| state.render(ctx, frame))
        };
        let velocity: Rc<VelocityFn> = {
            let state = state.clone();
            Rc::new(move |ctx: &mut GpuContext, matrix: &Mat4| state.velocity(ctx, matrix))
        };

        Self {
            state,
            entries: SceneEntries {
                render,
                physics: None,
                velocity,
            },
        }
    }

    pub(crate) fn entries(&self) -> &SceneEntries {
        &self.entries
    }

    pub fn texture(&self) -> TextureId {
        self.state.texture
    }

    pub fn is_loaded(&self) -> bool {
        self.state.loader.borrow().is_ready(self.state.texture)
    }

    /// Block until the texture is installed or `timeout` passes.
    pub fn wait_loaded(&self, ctx: &mut GpuContext, timeout: std::time::Duration) -> bool {
        self.state.loader.borrow_mut().wait_all(ctx, timeout);
        self.is_loaded()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;
    use lumen_gpu::{HeadlessDevice, PLACEHOLDER_TEXEL};
    use lumen_pipeline::Pipeline;
    use std::time::Duration;

    fn frame() -> RenderFrame {
        RenderFrame {
            matrix: Mat4::IDENTITY,
            eye: Vec3::ZERO,
            aspect: 1.0,
            tick: 0,
            target: None,
        }
    }

    #[test]
    fn samples_placeholder_until_loaded() {
        let mut ctx = GpuContext::new(Box::new(HeadlessDevice::new(16, 16)), 16, 16);
        let (tx, rx) = crossbeam_channel::bounded::<()>(1);
        let scene = TexturedCubes::with_source(&mut ctx, move || {
            let _ = rx.recv();
            Ok(ImageData::solid(2, 2, [9, 8, 7, 255]))
        });
        let texel = |ctx: &GpuContext| {
            ctx.device_as::<HeadlessDevice>()
                .unwrap()
                .texel(scene.texture(), 0.5, 0.5)
        };
        assert_eq!(texel(&ctx), Some(PLACEHOLDER_TEXEL));
        assert!(!scene.is_loaded());

        let _ = tx.send(());
        assert!(scene.wait_loaded(&mut ctx, Duration::from_secs(5)));
        assert_eq!(texel(&ctx), Some([9, 8, 7, 255]));
    }

    #[test]
    fn render_binds_texture_on_unit_zero() {
        let mut ctx = GpuContext::new(Box::new(HeadlessDevice::new(16, 16)), 16, 16);
        let scene = TexturedCubes::new(&mut ctx);
        let pipeline = Pipeline::new();
        scene.entries().enable(&pipeline);
        assert!(pipeline.physics.is_empty());

        pipeline.run_render(&mut ctx, &frame());
        let dev = ctx.device_as::<HeadlessDevice>().unwrap();
        let draw = dev.draws().last().unwrap();
        assert_eq!(draw.textures[0], Some(scene.texture()));
        assert_eq!(draw.call.instances, COUNT as u32);
        assert_eq!(
            dev.texture_params(scene.texture()),
            Some((Filter::Linear, Wrap::Repeat))
        );
    }
}
