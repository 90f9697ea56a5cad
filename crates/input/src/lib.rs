//! Input folding: raw keyboard, pointer and touch events become one
//! [`InputState`] record handed to every input component each tick.
//!
//! # Invariants
//! - Relative pointer deltas describe motion since the last dispatch only.
//! - `just_clicked` is true for exactly one dispatch after a press.

pub mod state;

pub use state::{InputState, Key};
