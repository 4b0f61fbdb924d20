//! `load-forecast` library crate.
//!
//! The binary (`forecast`) is a thin wrapper around this library so that:
//!
//! - the pipeline is testable without spawning processes or touching the network
//! - the learner and explainer sit behind traits and can be swapped

pub mod app;
pub mod data;
pub mod domain;
pub mod error;
pub mod features;
pub mod fit;
pub mod io;
pub mod math;
pub mod models;
pub mod plot;
pub mod report;
