//! Raw data sources.
//!
//! - Kaggle download with a local file cache (`kaggle`)
//! - seeded synthetic series for offline runs (`synthetic`)

pub mod kaggle;
pub mod synthetic;

pub use kaggle::*;
pub use synthetic::*;
