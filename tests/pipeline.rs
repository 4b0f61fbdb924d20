use std::path::Path;

use load_forecast::app::pipeline::{RunOutput, run_pipeline};
use load_forecast::data::{SyntheticSpec, generate_hourly_load, write_raw_csv};
use load_forecast::domain::{BoosterParams, CvConfig, Paths, PipelineConfig};
use load_forecast::features::generate_features;
use load_forecast::io::load_model;
use load_forecast::models::TrainedModel;

fn small_config() -> PipelineConfig {
    PipelineConfig {
        booster: BoosterParams {
            n_estimators: 80,
            learning_rate: 0.1,
            max_depth: 5,
            early_stopping_rounds: Some(10),
            ..BoosterParams::default()
        },
        cv: CvConfig {
            n_splits: 5,
            test_size: 2000,
        },
        shap_max_rows: Some(300),
        forecast_size: (800, 300),
        importance_size: (600, 400),
        ..PipelineConfig::default()
    }
}

fn run_in(dir: &Path, spec: &SyntheticSpec) -> RunOutput {
    let paths = Paths::new(dir);
    paths.ensure_dirs().unwrap();
    let series = generate_hourly_load(spec).unwrap();
    write_raw_csv(&series, &paths.raw_csv()).unwrap();
    run_pipeline(&paths.raw_csv(), &paths, &small_config()).unwrap()
}

#[test]
fn three_year_synthetic_run_writes_all_artifacts() {
    let dir = tempfile::tempdir().unwrap();
    let spec = SyntheticSpec::default();
    let run = run_in(dir.path(), &spec);

    assert_eq!(run.ingest.series.len(), spec.hours);
    assert_eq!(run.feature_rows, spec.hours - 168);

    assert_eq!(run.folds.len(), 5);
    for fold in &run.folds {
        assert!(fold.rmse.is_finite() && fold.rmse > 0.0);
        assert!(fold.train_end < fold.test_start);
        assert_eq!(fold.test_rows, 2000);
    }
    let last = run.folds.last().unwrap();
    assert_eq!(last.test_end, run.ingest.series.end().unwrap());

    let observed: Vec<f64> = run.ingest.series.values.iter().flatten().copied().collect();
    let lo = observed.iter().copied().fold(f64::INFINITY, f64::min);
    let hi = observed.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    assert!(!run.forecast.prediction.is_empty());
    for p in &run.forecast.prediction {
        assert!(*p >= lo && *p <= hi, "prediction {p} outside [{lo}, {hi}]");
    }

    // Trailing 20 % of the feature rows.
    let expected_eval = run.feature_rows - (run.feature_rows as f64 * 0.8 + 1e-9).floor() as usize;
    assert_eq!(run.forecast.timestamps.len(), expected_eval);

    for path in [&run.model_path, &run.forecast_path, &run.importance_path] {
        assert!(path.is_file(), "missing {}", path.display());
        assert!(std::fs::metadata(path).unwrap().len() > 0);
    }
    assert!(run.model_path.ends_with("models/xgboost_model.pkl"));
    assert!(run.forecast_path.ends_with("figures/forecast_plot.png"));
    assert!(run.importance_path.ends_with("figures/feature_importance_plot.png"));

    assert_eq!(run.ranking.entries.len(), 13);
    for pair in run.ranking.entries.windows(2) {
        assert!(pair[0].1 >= pair[1].1);
    }
}

#[test]
fn persisted_model_reproduces_the_forecast() {
    let dir = tempfile::tempdir().unwrap();
    let spec = SyntheticSpec {
        hours: 2 * 8760,
        ..SyntheticSpec::default()
    };
    let run = run_in(dir.path(), &spec);

    let loaded = load_model(&run.model_path).unwrap();
    assert_eq!(loaded, run.model);

    let frame = generate_features(&run.ingest.series, &small_config().lags).unwrap();
    let eval = frame.tail_fraction(0.2);
    assert_eq!(eval.timestamps, run.forecast.timestamps);
    assert_eq!(loaded.predict(&eval.features).unwrap(), run.forecast.prediction);
}

#[test]
fn identical_inputs_give_identical_models() {
    let spec = SyntheticSpec {
        hours: 2 * 8760,
        ..SyntheticSpec::default()
    };
    let first = run_in(tempfile::tempdir().unwrap().path(), &spec);
    let second = run_in(tempfile::tempdir().unwrap().path(), &spec);
    assert_eq!(first.model, second.model);
    assert_eq!(first.forecast.prediction, second.forecast.prediction);
    assert_eq!(first.folds, second.folds);
}

#[test]
fn missing_input_file_is_an_input_error() {
    let dir = tempfile::tempdir().unwrap();
    let paths = Paths::new(dir.path());
    paths.ensure_dirs().unwrap();
    let err = run_pipeline(&paths.raw_csv(), &paths, &small_config()).unwrap_err();
    assert_eq!(err.exit_code(), 2);
}

#[test]
fn short_history_is_insufficient() {
    let dir = tempfile::tempdir().unwrap();
    let paths = Paths::new(dir.path());
    paths.ensure_dirs().unwrap();
    let series = generate_hourly_load(&SyntheticSpec {
        hours: 24 * 60,
        ..SyntheticSpec::default()
    })
    .unwrap();
    write_raw_csv(&series, &paths.raw_csv()).unwrap();
    let err = run_pipeline(&paths.raw_csv(), &paths, &small_config()).unwrap_err();
    assert_eq!(err.exit_code(), 3);
    assert!(!paths.model_file().exists());
}
