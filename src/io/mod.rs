//! Input/output helpers.
//!
//! - CSV ingest + cleaning (`ingest`)
//! - trained model read/write (`model`)

pub mod ingest;
pub mod model;

pub use ingest::*;
pub use model::*;
