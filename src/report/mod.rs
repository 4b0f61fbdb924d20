//! Reporting utilities: formatted terminal output.
//!
//! Formatting lives here so the pipeline returns plain data and output
//! changes stay local.

pub mod format;

pub use format::*;
