//! Stage composition: five ordered component registries and the
//! post-process compositor that chains their last stage.
//!
//! # Invariants
//! - Insertion order is execution order; duplicates run twice.
//! - A dispatch iterates the entries present when it started, so components
//!   may register or remove entries (themselves included) while running.
//! - The final post-process effect always writes to the default surface.

mod compositor;
mod registry;
mod stages;

pub use compositor::{CompositeReport, Compositor};
pub use registry::Registry;
pub use stages::{
    InputFn, Pipeline, PhysicsFn, PostProcessFn, RenderFn, RenderFrame, VelocityFn,
};
