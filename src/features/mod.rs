//! Feature generation: calendar, holiday, season and lagged-target columns.
//!
//! Output columns, in order:
//!
//! `hour, dayofweek, quarter, month, year, dayofyear, is_holiday, season_type,
//! lag_<k>...` with the target kept separately under `PJME_MW`.
//!
//! A row is emitted only when its target and every lag are defined, so the
//! first `max(lags)` hours of a gap-free series never produce rows.

use nalgebra::DMatrix;
use tracing::info;

use crate::domain::HourlySeries;
use crate::error::AppError;

pub mod calendar;
pub mod frame;
pub mod holidays;

pub use calendar::*;
pub use frame::*;
pub use holidays::*;

/// Calendar + holiday + season columns, before the lags.
pub const BASE_COLUMNS: [&str; 8] = [
    "hour",
    "dayofweek",
    "quarter",
    "month",
    "year",
    "dayofyear",
    "is_holiday",
    "season_type",
];

pub fn lag_column_name(lag: usize) -> String {
    format!("lag_{lag}")
}

/// Column layout for the given lag set.
pub fn feature_columns(lags: &[usize]) -> Vec<FeatureColumn> {
    // Every generated column is an integer code, season included, so all of
    // them split by threshold.
    let mut columns: Vec<FeatureColumn> = BASE_COLUMNS
        .iter()
        .map(|&name| FeatureColumn::numeric(name))
        .collect();
    columns.extend(lags.iter().map(|&lag| FeatureColumn::numeric(lag_column_name(lag))));
    columns
}

/// Derive feature rows from a cleaned hourly series.
pub fn generate_features(series: &HourlySeries, lags: &[usize]) -> Result<FeatureFrame, AppError> {
    info!("Generating features...");
    if lags.iter().any(|&lag| lag == 0) {
        return Err(AppError::input("Lag offsets must be positive."));
    }

    let columns = feature_columns(lags);
    let n_cols = columns.len();

    // Dates, not timestamps: a series starting mid-day still flags the rest of
    // that day when it is a holiday.
    let holidays = match (series.is_empty(), series.end()) {
        (false, Some(end)) => federal_holidays(series.start.date(), end.date()),
        _ => Default::default(),
    };

    let mut timestamps = Vec::new();
    let mut target = Vec::new();
    let mut data: Vec<f64> = Vec::new();
    let mut row = Vec::with_capacity(n_cols);

    for (i, (ts, value)) in series.iter().enumerate() {
        let Some(y) = value else { continue };

        row.clear();
        let cal = CalendarFeatures::from_timestamp(ts);
        row.extend_from_slice(&[
            cal.hour as f64,
            cal.day_of_week as f64,
            cal.quarter as f64,
            cal.month as f64,
            cal.year as f64,
            cal.day_of_year as f64,
            if holidays.contains(&ts.date()) { 1.0 } else { 0.0 },
            cal.season.code() as f64,
        ]);

        let mut complete = true;
        for &lag in lags {
            match i.checked_sub(lag).and_then(|j| series.values[j]) {
                Some(v) => row.push(v),
                None => {
                    complete = false;
                    break;
                }
            }
        }
        if !complete {
            continue;
        }

        timestamps.push(ts);
        target.push(y);
        data.extend_from_slice(&row);
    }

    let n_rows = target.len();
    info!(rows = n_rows, dropped = series.len() - n_rows, "feature rows ready");

    Ok(FeatureFrame {
        timestamps,
        columns,
        features: DMatrix::from_row_slice(n_rows, n_cols, &data),
        target,
    })
}
