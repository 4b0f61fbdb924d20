//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - static configuration (`Paths`, `BoosterParams`, `CvConfig`, `PipelineConfig`)
//! - raw and cleaned load series (`RawRecord`, `HourlySeries`)
//! - run outputs (`FoldReport`, `ForecastFrame`, `ImportanceRanking`)

pub mod types;

pub use types::*;
