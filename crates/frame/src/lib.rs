//! Fixed-timestep frame loop.
//!
//! Simulation advances in constant steps drained from a lag accumulator;
//! rendering happens once per host frame regardless of how many steps ran.
//!
//! # Invariants
//! - Simulation step size never varies within a run.
//! - Elapsed time is capped per frame, and backlog beyond the cap is dropped.
//! - Render is called exactly once per advanced frame.

mod host;
mod step;

pub use host::{AnimationHost, FrameLoop, LoopHandle, LoopStats, ManualHost, start_loop};
pub use step::{DEFAULT_CAP, DEFAULT_STEP, FixedStep, TickReport};
