//! Row-aligned feature matrix + target + timestamps.

use std::ops::Range;

use chrono::NaiveDateTime;
use nalgebra::DMatrix;

use crate::domain::ColumnKind;

/// Name and learner treatment of one feature column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureColumn {
    pub name: String,
    pub kind: ColumnKind,
}

impl FeatureColumn {
    pub fn numeric(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ColumnKind::Numeric,
        }
    }

    pub fn categorical(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ColumnKind::Categorical,
        }
    }
}

/// Feature rows in time order.
///
/// `features` is `rows x columns` and row `i` belongs to `timestamps[i]` with
/// label `target[i]`.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureFrame {
    pub timestamps: Vec<NaiveDateTime>,
    pub columns: Vec<FeatureColumn>,
    pub features: DMatrix<f64>,
    pub target: Vec<f64>,
}

impl FeatureFrame {
    pub fn len(&self) -> usize {
        self.target.len()
    }

    pub fn is_empty(&self) -> bool {
        self.target.is_empty()
    }

    pub fn feature_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn column_kinds(&self) -> Vec<ColumnKind> {
        self.columns.iter().map(|c| c.kind).collect()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// Copy of one feature column.
    pub fn column(&self, name: &str) -> Option<Vec<f64>> {
        let idx = self.column_index(name)?;
        Some(self.features.column(idx).iter().copied().collect())
    }

    /// Contiguous row range as an owned frame.
    ///
    /// # Panics
    /// Panics if `rows` is out of bounds.
    pub fn slice(&self, rows: Range<usize>) -> FeatureFrame {
        let n = rows.end - rows.start;
        FeatureFrame {
            timestamps: self.timestamps[rows.clone()].to_vec(),
            columns: self.columns.clone(),
            features: self.features.rows(rows.start, n).into_owned(),
            target: self.target[rows].to_vec(),
        }
    }

    /// Trailing `fraction` of rows, split at `floor(len * (1 - fraction))`.
    pub fn tail_fraction(&self, fraction: f64) -> FeatureFrame {
        let keep = fraction.clamp(0.0, 1.0);
        // Small epsilon so e.g. 10 * (1 - 0.2) lands on 8, not 7.
        let split = (self.len() as f64 * (1.0 - keep) + 1e-9).floor() as usize;
        self.slice(split.min(self.len())..self.len())
    }

    /// Every `step`-th row, capped at `max_rows`, for bounded-cost diagnostics.
    pub fn strided_features(&self, max_rows: usize) -> DMatrix<f64> {
        let n = self.len();
        if max_rows == 0 || n <= max_rows {
            return self.features.clone();
        }
        let step = n.div_ceil(max_rows);
        let rows: Vec<usize> = (0..n).step_by(step).collect();
        self.features.select_rows(rows.iter())
    }
}
