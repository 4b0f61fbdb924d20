//! Shared domain types and the static pipeline configuration.
//!
//! Everything here is plain data. Directory creation is an explicit call
//! (`Paths::ensure_dirs`) made once by the orchestrator.

use std::path::PathBuf;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Target column name, both in the raw CSV and in the feature frame.
pub const TARGET: &str = "PJME_MW";

/// Timestamp column in the raw CSV.
pub const TIMESTAMP_COLUMN: &str = "Datetime";

/// Lagged-target offsets in hours.
pub const LAG_HOURS: [usize; 5] = [24, 48, 72, 96, 168];

/// Catalog key of the public hourly energy consumption dataset.
pub const DATASET_KEY: &str = "robikscube/hourly-energy-consumption";

/// File inside the dataset bundle that holds the PJM East series.
pub const DATASET_FILE: &str = "PJME_hourly.csv";

pub const MODEL_FILE: &str = "xgboost_model.pkl";
pub const FORECAST_FIGURE: &str = "forecast_plot.png";
pub const IMPORTANCE_FIGURE: &str = "feature_importance_plot.png";

/// Hours in a (non-leap) year: the fixed test window of every fold.
pub const HOURS_PER_YEAR: usize = 24 * 365;

/// On-disk layout rooted at a base directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paths {
    pub base: PathBuf,
    pub data_dir: PathBuf,
    pub model_dir: PathBuf,
    pub figures_dir: PathBuf,
}

impl Paths {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        let base = base.into();
        Self {
            data_dir: base.join("data"),
            model_dir: base.join("models"),
            figures_dir: base.join("figures"),
            base,
        }
    }

    /// Resolve the base directory from `LOAD_FORECAST_HOME` (a `.env` file is
    /// honored), falling back to the current working directory.
    pub fn from_env() -> Result<Self, AppError> {
        dotenvy::dotenv().ok();
        let base = match std::env::var("LOAD_FORECAST_HOME") {
            Ok(dir) if !dir.trim().is_empty() => PathBuf::from(dir),
            _ => std::env::current_dir()
                .map_err(|e| AppError::input(format!("Cannot resolve working directory: {e}")))?,
        };
        Ok(Self::new(base))
    }

    /// Create `data/`, `models/` and `figures/` if they do not exist yet.
    pub fn ensure_dirs(&self) -> Result<(), AppError> {
        for dir in [&self.data_dir, &self.model_dir, &self.figures_dir] {
            std::fs::create_dir_all(dir).map_err(|e| {
                AppError::input(format!("Failed to create directory '{}': {e}", dir.display()))
            })?;
        }
        Ok(())
    }

    pub fn raw_csv(&self) -> PathBuf {
        self.data_dir.join(DATASET_FILE)
    }

    pub fn model_file(&self) -> PathBuf {
        self.model_dir.join(MODEL_FILE)
    }

    pub fn forecast_figure(&self) -> PathBuf {
        self.figures_dir.join(FORECAST_FIGURE)
    }

    pub fn importance_figure(&self) -> PathBuf {
        self.figures_dir.join(IMPORTANCE_FIGURE)
    }
}

/// Loss minimized by the boosted trees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Objective {
    /// `reg:squarederror`: gradient `pred - y`, hessian `1`.
    SquaredError,
}

/// Hyperparameters of the gradient-boosted tree regressor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoosterParams {
    /// Maximum number of boosting rounds.
    pub n_estimators: usize,
    /// Shrinkage applied to every leaf value (eta).
    pub learning_rate: f64,
    pub max_depth: usize,
    /// Stop once the last eval set has not improved for this many rounds.
    pub early_stopping_rounds: Option<usize>,
    pub objective: Objective,
    /// Split categorical columns one-vs-rest instead of by threshold.
    pub enable_categorical: bool,
    /// L2 penalty on leaf values (lambda).
    pub reg_lambda: f64,
    /// Minimum gain required to keep a split.
    pub gamma: f64,
    /// Minimum hessian sum in each child.
    pub min_child_weight: f64,
    /// Maximum histogram bins per feature.
    pub max_bin: usize,
}

impl Default for BoosterParams {
    fn default() -> Self {
        Self {
            n_estimators: 1000,
            learning_rate: 0.01,
            max_depth: 6,
            early_stopping_rounds: Some(50),
            objective: Objective::SquaredError,
            enable_categorical: true,
            reg_lambda: 1.0,
            gamma: 0.0,
            min_child_weight: 1.0,
            max_bin: 256,
        }
    }
}

/// Shape of the forward-chaining cross-validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CvConfig {
    pub n_splits: usize,
    pub test_size: usize,
}

impl Default for CvConfig {
    fn default() -> Self {
        Self {
            n_splits: 5,
            test_size: HOURS_PER_YEAR,
        }
    }
}

/// Everything a pipeline run needs besides paths and input data.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub booster: BoosterParams,
    pub cv: CvConfig,
    pub lags: Vec<usize>,
    /// Trailing share of feature rows used for the diagnostic plots.
    pub eval_fraction: f64,
    /// Optional bound on rows handed to the explainer (evenly strided).
    /// `None` explains the whole evaluation slice.
    pub shap_max_rows: Option<usize>,
    pub forecast_size: (u32, u32),
    pub importance_size: (u32, u32),
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            booster: BoosterParams::default(),
            cv: CvConfig::default(),
            lags: LAG_HOURS.to_vec(),
            eval_fraction: 0.2,
            shap_max_rows: None,
            forecast_size: (1500, 500),
            importance_size: (900, 600),
        }
    }
}

/// One row of the raw CSV.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawRecord {
    pub timestamp: NaiveDateTime,
    /// `None` when the load cell is empty.
    pub load_mw: Option<f64>,
}

/// Strictly hourly, gap-free load series.
///
/// `values[i]` belongs to `start + i hours`. A value can only be `None` when
/// no earlier defined reading exists to carry forward.
#[derive(Debug, Clone, PartialEq)]
pub struct HourlySeries {
    pub start: NaiveDateTime,
    pub values: Vec<Option<f64>>,
}

impl HourlySeries {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn timestamp(&self, idx: usize) -> NaiveDateTime {
        self.start + chrono::Duration::hours(idx as i64)
    }

    pub fn end(&self) -> Option<NaiveDateTime> {
        self.len().checked_sub(1).map(|last| self.timestamp(last))
    }

    pub fn iter(&self) -> impl Iterator<Item = (NaiveDateTime, Option<f64>)> + '_ {
        self.values
            .iter()
            .enumerate()
            .map(|(i, v)| (self.timestamp(i), *v))
    }
}

/// Fixed month → season lookup, fed to the model as an integer code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Season {
    Shoulder,
    Summer,
    Winter,
}

impl Season {
    pub fn from_month(month: u32) -> Self {
        match month {
            6..=9 => Season::Summer,
            12 | 1 | 2 => Season::Winter,
            _ => Season::Shoulder,
        }
    }

    pub fn code(self) -> u8 {
        match self {
            Season::Shoulder => 0,
            Season::Summer => 1,
            Season::Winter => 2,
        }
    }
}

/// How the learner treats a feature column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnKind {
    Numeric,
    Categorical,
}

/// Outcome of one cross-validation fold.
#[derive(Debug, Clone, PartialEq)]
pub struct FoldReport {
    /// 1-based fold number.
    pub fold: usize,
    pub train_rows: usize,
    pub test_rows: usize,
    pub train_end: NaiveDateTime,
    pub test_start: NaiveDateTime,
    pub test_end: NaiveDateTime,
    pub rmse: f64,
    /// Boosting rounds kept after early stopping.
    pub rounds: usize,
}

/// Actual vs predicted load over the evaluation slice.
#[derive(Debug, Clone, PartialEq)]
pub struct ForecastFrame {
    pub timestamps: Vec<NaiveDateTime>,
    pub actual: Vec<f64>,
    pub prediction: Vec<f64>,
}

/// Mean absolute attribution per feature, sorted descending.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportanceRanking {
    pub entries: Vec<(String, f64)>,
}
