//! Regression and explanation backends.
//!
//! The trainer and the visualizer only talk to these traits, so the boosted
//! trees and TreeSHAP implementations can be replaced by any backend with the
//! same capabilities:
//!
//! - `Regressor::fit(x, y, eval_sets) -> TrainedModel`
//! - `TrainedModel::predict(x) -> predictions`
//! - `Explainer::explain(model, x) -> Attributions`

use nalgebra::DMatrix;

use crate::domain::ImportanceRanking;
use crate::error::AppError;

pub mod booster;
pub mod shap;
pub mod tree;

pub use booster::*;
pub use shap::*;
pub use tree::*;

/// Labelled data monitored during fitting.
#[derive(Debug, Clone, Copy)]
pub struct EvalSet<'a> {
    pub name: &'a str,
    pub x: &'a DMatrix<f64>,
    pub y: &'a [f64],
}

pub trait Regressor {
    type Model: TrainedModel;

    /// Fit on `(x, y)`. Early stopping, when enabled, watches the last eval set.
    fn fit(&self, x: &DMatrix<f64>, y: &[f64], eval_sets: &[EvalSet<'_>]) -> Result<Self::Model, AppError>;
}

pub trait TrainedModel {
    fn predict(&self, x: &DMatrix<f64>) -> Result<Vec<f64>, AppError>;

    fn feature_names(&self) -> &[String];

    /// Boosting rounds (or equivalent model size) kept after fitting.
    fn n_rounds(&self) -> usize;
}

pub trait Explainer<M: ?Sized> {
    fn explain(&self, model: &M, x: &DMatrix<f64>) -> Result<Attributions, AppError>;
}

/// Per-row, per-feature contributions.
///
/// For every row `i`: `expected_value + sum_j values[(i, j)] == prediction(i)`.
#[derive(Debug, Clone, PartialEq)]
pub struct Attributions {
    pub feature_names: Vec<String>,
    pub values: DMatrix<f64>,
    pub expected_value: f64,
}

impl Attributions {
    /// Mean absolute attribution per feature (global importance).
    pub fn mean_abs(&self) -> Vec<f64> {
        let n = self.values.nrows().max(1) as f64;
        self.values
            .column_iter()
            .map(|col| col.iter().map(|v| v.abs()).sum::<f64>() / n)
            .collect()
    }

    /// Features sorted by mean absolute attribution, largest first.
    pub fn ranking(&self) -> ImportanceRanking {
        let mut entries: Vec<(String, f64)> = self
            .feature_names
            .iter()
            .cloned()
            .zip(self.mean_abs())
            .collect();
        entries.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        ImportanceRanking { entries }
    }
}

/// Check that a matrix has the column count a model was trained with.
pub(crate) fn ensure_width(x: &DMatrix<f64>, expected: usize, what: &str) -> Result<(), AppError> {
    if x.ncols() != expected {
        return Err(AppError::input(format!(
            "{what}: expected {expected} feature columns, got {}.",
            x.ncols()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ranking_sorts_by_mean_absolute_value() {
        let attributions = Attributions {
            feature_names: vec!["a".into(), "b".into(), "c".into()],
            values: DMatrix::from_row_slice(2, 3, &[1.0, -4.0, 0.0, -1.0, 2.0, 0.5]),
            expected_value: 0.0,
        };
        assert_eq!(attributions.mean_abs(), vec![1.0, 3.0, 0.25]);
        let ranking = attributions.ranking();
        let names: Vec<&str> = ranking.entries.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["b", "a", "c"]);
    }
}
