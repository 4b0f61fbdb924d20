//! PNG figures.
//!
//! - one-week forecast vs actual (`forecast`)
//! - mean |SHAP| feature importance (`importance`)
//! - chart font discovery (`font`)

pub mod font;
pub mod forecast;
pub mod importance;

pub use forecast::*;
pub use importance::*;
