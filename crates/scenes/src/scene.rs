use std::rc::Rc;

use lumen_gpu::GpuContext;
use lumen_pipeline::{PhysicsFn, Pipeline, RenderFn, VelocityFn};

use crate::cube_field::CubeField;
use crate::textured::TexturedCubes;

/// Demo scene selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SceneKind {
    /// Lit, instanced cubes orbiting above a floor grid.
    #[default]
    Cubes,
    /// Checker-textured cubes fed by the asynchronous loader.
    Textured,
}

impl std::str::FromStr for SceneKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "cubes" => Ok(Self::Cubes),
            "textured" => Ok(Self::Textured),
            other => Err(format!("unknown scene `{other}` (expected cubes or textured)")),
        }
    }
}

impl std::fmt::Display for SceneKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Cubes => "cubes",
            Self::Textured => "textured",
        })
    }
}

/// The registry entries one scene contributes. Enabling twice does not
/// register twice.
pub(crate) struct SceneEntries {
    pub render: Rc<RenderFn>,
    pub physics: Option<Rc<PhysicsFn>>,
    pub velocity: Rc<VelocityFn>,
}

impl SceneEntries {
    pub fn enable(&self, pipeline: &Pipeline) {
        if !pipeline.render.contains(&self.render) {
            pipeline.render.push(self.render.clone());
        }
        if let Some(physics) = &self.physics {
            if !pipeline.physics.contains(physics) {
                pipeline.physics.push(physics.clone());
            }
        }
        if !pipeline.velocity.contains(&self.velocity) {
            pipeline.velocity.push(self.velocity.clone());
        }
    }

    pub fn disable(&self, pipeline: &Pipeline) {
        pipeline.render.remove(&self.render);
        if let Some(physics) = &self.physics {
            pipeline.physics.remove(physics);
        }
        pipeline.velocity.remove(&self.velocity);
    }

    pub fn is_enabled(&self, pipeline: &Pipeline) -> bool {
        pipeline.render.contains(&self.render)
    }
}

/// One of the demo scenes, built and ready to enable.
pub enum Scene {
    Cubes(CubeField),
    Textured(TexturedCubes),
}

impl Scene {
    pub fn new(ctx: &mut GpuContext, kind: SceneKind) -> Self {
        tracing::info!(scene = %kind, "building scene");
        match kind {
            SceneKind::Cubes => Self::Cubes(CubeField::new(ctx, CubeField::DEFAULT_COUNT)),
            SceneKind::Textured => Self::Textured(TexturedCubes::new(ctx)),
        }
    }

    pub fn kind(&self) -> SceneKind {
        match self {
            Self::Cubes(_) => SceneKind::Cubes,
            Self::Textured(_) => SceneKind::Textured,
        }
    }

    fn entries(&self) -> &SceneEntries {
        match self {
            Self::Cubes(scene) => scene.entries(),
            Self::Textured(scene) => scene.entries(),
        }
    }

    pub fn enable(&self, pipeline: &Pipeline) {
        self.entries().enable(pipeline);
    }

    pub fn disable(&self, pipeline: &Pipeline) {
        self.entries().disable(pipeline);
    }

    pub fn is_enabled(&self, pipeline: &Pipeline) -> bool {
        self.entries().is_enabled(pipeline)
    }
}
