//! Cross-validated training.
//!
//! Every fold gets a fresh regressor fitted on its training prefix, with the
//! training and test windows as eval sets (early stopping watches the test
//! window). Only the model from the final fold is returned; the earlier
//! folds contribute their RMSE to the report and are then dropped.

use tracing::info;

use crate::domain::{BoosterParams, CvConfig, FoldReport};
use crate::error::AppError;
use crate::features::FeatureFrame;
use crate::fit::{Fold, forward_chaining_splits};
use crate::math::root_mean_squared_error;
use crate::models::{BoostedTrees, EvalSet, GradientBoosting, Regressor, TrainedModel};

#[derive(Debug, Clone)]
pub struct TrainOutput<M> {
    /// Model fitted on the last fold.
    pub model: M,
    pub folds: Vec<FoldReport>,
}

/// Train the boosted trees with forward-chaining CV.
pub fn train_model(
    frame: &FeatureFrame,
    params: &BoosterParams,
    cv: &CvConfig,
) -> Result<TrainOutput<BoostedTrees>, AppError> {
    let regressor = GradientBoosting::new(params.clone(), frame.feature_names(), frame.column_kinds());
    train_with(frame, cv, &regressor)
}

/// Cross-validate any regressor over `frame`.
pub fn train_with<R: Regressor>(
    frame: &FeatureFrame,
    cv: &CvConfig,
    regressor: &R,
) -> Result<TrainOutput<R::Model>, AppError> {
    let folds = forward_chaining_splits(frame.len(), cv)?;
    info!(rows = frame.len(), folds = folds.len(), test_size = cv.test_size, "starting cross-validation");

    let mut reports = Vec::with_capacity(folds.len());
    let mut last_model = None;
    for fold in &folds {
        let (model, report) = run_fold(frame, fold, regressor)?;
        info!("Fold {} RMSE: {:.2} MW", report.fold, report.rmse);
        reports.push(report);
        last_model = Some(model);
    }

    let model = last_model.ok_or_else(|| AppError::insufficient("Cross-validation produced no folds."))?;
    Ok(TrainOutput {
        model,
        folds: reports,
    })
}

fn run_fold<R: Regressor>(frame: &FeatureFrame, fold: &Fold, regressor: &R) -> Result<(R::Model, FoldReport), AppError> {
    let train = frame.slice(fold.train.clone());
    let test = frame.slice(fold.test.clone());

    let model = regressor.fit(
        &train.features,
        &train.target,
        &[
            EvalSet {
                name: "train",
                x: &train.features,
                y: &train.target,
            },
            EvalSet {
                name: "test",
                x: &test.features,
                y: &test.target,
            },
        ],
    )?;
    let predictions = model.predict(&test.features)?;
    let rmse = root_mean_squared_error(&test.target, &predictions)
        .ok_or_else(|| AppError::insufficient(format!("Fold {} has an empty test window.", fold.fold)))?;

    let report = FoldReport {
        fold: fold.fold,
        train_rows: train.len(),
        test_rows: test.len(),
        train_end: train.timestamps[train.len() - 1],
        test_start: test.timestamps[0],
        test_end: test.timestamps[test.len() - 1],
        rmse,
        rounds: model.n_rounds(),
    };
    Ok((model, report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::HourlySeries;
    use crate::features::generate_features;
    use chrono::NaiveDate;

    fn frame(hours: usize) -> FeatureFrame {
        let start = NaiveDate::from_ymd_opt(2015, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let values = (0..hours)
            .map(|i| {
                let h = (i % 24) as f64;
                let d = ((i / 24) % 7) as f64;
                Some(30_000.0 + 4_000.0 * (h / 24.0 * std::f64::consts::TAU).sin() - 800.0 * d)
            })
            .collect();
        generate_features(&HourlySeries { start, values }, &[24, 48, 168]).unwrap()
    }

    fn quick_params() -> BoosterParams {
        BoosterParams {
            n_estimators: 60,
            learning_rate: 0.2,
            max_depth: 4,
            early_stopping_rounds: Some(10),
            ..BoosterParams::default()
        }
    }

    #[test]
    fn reports_one_entry_per_fold_in_time_order() {
        let frame = frame(24 * 60);
        let cv = CvConfig {
            n_splits: 3,
            test_size: 24 * 7,
        };
        let out = train_model(&frame, &quick_params(), &cv).unwrap();
        assert_eq!(out.folds.len(), 3);
        for (i, report) in out.folds.iter().enumerate() {
            assert_eq!(report.fold, i + 1);
            assert_eq!(report.test_rows, 24 * 7);
            assert!(report.train_end < report.test_start);
            assert!(report.rmse.is_finite());
            assert!(report.rounds >= 1 && report.rounds <= 60);
        }
        for pair in out.folds.windows(2) {
            assert!(pair[0].test_end < pair[1].test_start);
            assert!(pair[0].train_rows < pair[1].train_rows);
        }
        assert_eq!(out.model.feature_names(), frame.feature_names().as_slice());
    }

    #[test]
    fn too_short_frame_is_rejected() {
        let frame = frame(24 * 20);
        let err = train_model(&frame, &quick_params(), &CvConfig::default()).unwrap_err();
        assert_eq!(err.exit_code(), 3);
    }
}
