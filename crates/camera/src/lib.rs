//! Camera transform model.
//!
//! # Invariants
//! - Pitch stays within `[-MAX_PITCH, MAX_PITCH]`.
//! - Mutators only mark the camera dirty; the combined matrix is refreshed
//!   by [`Camera::recalculate`].

mod camera;

pub use camera::{Camera, MAX_PITCH, Projection};
