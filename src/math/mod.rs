//! Numeric utilities: histogram binning and error metrics.

pub mod binning;
pub mod metrics;

pub use binning::*;
pub use metrics::*;
