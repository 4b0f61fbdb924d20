//! Top-level application orchestration.
//!
//! `src/main.rs` only installs logging and maps errors to exit codes; this
//! module is the "real main" that:
//! - resolves the working directories
//! - fetches (or reuses) the dataset
//! - runs the forecasting pipeline
//! - prints the reports

use crate::domain::{Paths, PipelineConfig};
use crate::error::AppError;

pub mod pipeline;

/// Entry point for the `forecast` binary.
pub fn run() -> Result<(), AppError> {
    let paths = Paths::from_env()?;
    paths.ensure_dirs()?;

    let raw_csv = crate::data::fetch_dataset(&paths)?;
    let run = pipeline::run_pipeline(&raw_csv, &paths, &PipelineConfig::default())?;

    println!("{}", crate::report::format_ingest_summary(&run.ingest.stats, &run.ingest.series));
    println!("{}", crate::report::format_fold_summary(&run.folds));
    println!("{}", crate::report::format_importance(&run.ranking));
    println!(
        "{}",
        crate::report::format_artifacts(&run.model_path, &run.forecast_path, &run.importance_path)
    );
    println!("Pipeline completed successfully.");

    Ok(())
}
