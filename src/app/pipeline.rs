//! The forecasting workflow, independent of where the raw CSV comes from.
//!
//! clean -> features -> cross-validated training -> persist -> evaluation
//! slice -> forecast plot -> importance plot
//!
//! The binary resolves the dataset first; tests call [`run_pipeline`] on a
//! synthetic CSV in a scratch directory.

use std::path::{Path, PathBuf};

use nalgebra::DMatrix;
use tracing::info;

use crate::domain::{FoldReport, ForecastFrame, ImportanceRanking, Paths, PipelineConfig};
use crate::error::AppError;
use crate::features::{FeatureFrame, generate_features};
use crate::fit::train_model;
use crate::io::{IngestedSeries, load_and_clean, save_model};
use crate::models::{BoostedTrees, TrainedModel, TreeShap};
use crate::plot::{plot_feature_importance, plot_forecast};

/// All computed outputs of a single run.
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub ingest: IngestedSeries,
    pub feature_rows: usize,
    pub folds: Vec<FoldReport>,
    pub model: BoostedTrees,
    pub model_path: PathBuf,
    pub forecast: ForecastFrame,
    pub forecast_path: PathBuf,
    pub ranking: ImportanceRanking,
    pub importance_path: PathBuf,
}

/// Run every step after acquisition. Output directories must exist.
pub fn run_pipeline(raw_csv: &Path, paths: &Paths, config: &PipelineConfig) -> Result<RunOutput, AppError> {
    // 1) Load + clean.
    let ingest = load_and_clean(raw_csv)?;

    // 2) Features.
    let frame = generate_features(&ingest.series, &config.lags)?;
    info!(rows = frame.len(), columns = frame.columns.len(), "features generated");

    // 3) Train (only the last fold's model survives).
    let trained = train_model(&frame, &config.booster, &config.cv)?;

    // 4) Persist.
    let model_path = save_model(&trained.model, paths)?;

    // 5) Evaluation slice: trailing share of the feature rows.
    let eval = frame.tail_fraction(config.eval_fraction);
    if eval.is_empty() {
        return Err(AppError::insufficient("Evaluation slice is empty."));
    }
    let prediction = trained.model.predict(&eval.features)?;
    if prediction.iter().any(|p| !p.is_finite()) {
        return Err(AppError::external("Non-finite model prediction on the evaluation slice."));
    }
    let forecast = ForecastFrame {
        timestamps: eval.timestamps.clone(),
        actual: eval.target.clone(),
        prediction,
    };

    // 6) Figures.
    let forecast_path = paths.forecast_figure();
    plot_forecast(&forecast, eval.timestamps.first().copied(), &forecast_path, config.forecast_size)?;

    let importance_path = paths.importance_figure();
    let explain_rows = rows_to_explain(&eval, config.shap_max_rows);
    let ranking = plot_feature_importance(
        &trained.model,
        &explain_rows,
        &TreeShap,
        &importance_path,
        config.importance_size,
    )?;

    Ok(RunOutput {
        ingest,
        feature_rows: frame.len(),
        folds: trained.folds,
        model: trained.model,
        model_path,
        forecast,
        forecast_path,
        ranking,
        importance_path,
    })
}

/// Feature rows handed to the explainer: the whole slice unless a cap applies.
fn rows_to_explain(eval: &FeatureFrame, cap: Option<usize>) -> DMatrix<f64> {
    match cap {
        Some(max_rows) if max_rows > 0 && eval.len() > max_rows => {
            let rows = eval.strided_features(max_rows);
            info!(
                explained = rows.nrows(),
                slice = eval.len(),
                "explaining an evenly strided subset of the evaluation slice"
            );
            rows
        }
        _ => eval.features.clone(),
    }
}
