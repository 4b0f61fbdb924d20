//! Model training.
//!
//! - ordered fold construction (`splits`)
//! - per-fold fit / score, final-fold model (`trainer`)

pub mod splits;
pub mod trainer;

pub use splits::*;
pub use trainer::*;
