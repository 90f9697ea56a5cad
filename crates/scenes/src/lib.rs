//! Demo stages built on the lumen core: camera rigs, two scenes, a velocity
//! pass and the post-process effects, wired together by [`Demo`].
//!
//! # Invariants
//! - Every component registers at most once, however often it is enabled.
//! - The velocity target is cleared to encoded zero motion before the
//!   velocity stage runs, so untouched pixels are not blurred.
//! - Post-process effects run in the fixed order passthrough, motion blur,
//!   FXAA.

mod cube_field;
mod demo;
mod effects;
pub mod geometry;
mod rigs;
mod scene;
pub mod shaders;
mod textured;

pub use cube_field::CubeField;
pub use demo::{Demo, DemoConfig, FrameReport, RunReport};
pub use effects::{Fxaa, MotionBlur, Passthrough, VELOCITY_CLEAR};
pub use rigs::{CameraKind, FpsRig, OrbitRig, Rig, SharedCamera, demo_camera};
pub use scene::{Scene, SceneKind};
pub use textured::TexturedCubes;
