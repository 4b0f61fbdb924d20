//! Seeded synthetic hourly load series.
//!
//! Used for offline runs and tests: a level plus daily, weekly and annual
//! sinusoids with Gaussian noise. The same settings always yield the same series.

use std::f64::consts::TAU;
use std::path::Path;

use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike};
use rand::prelude::*;
use rand::rngs::StdRng;
use rand_distr::Normal;

use crate::domain::{HourlySeries, TARGET, TIMESTAMP_COLUMN};
use crate::error::AppError;

#[derive(Debug, Clone)]
pub struct SyntheticSpec {
    pub start: NaiveDateTime,
    pub hours: usize,
    /// Mean load (MW).
    pub level: f64,
    pub daily_amplitude: f64,
    pub weekly_amplitude: f64,
    pub annual_amplitude: f64,
    /// Standard deviation of the additive noise (MW).
    pub noise_sd: f64,
    pub seed: u64,
}

impl Default for SyntheticSpec {
    fn default() -> Self {
        Self {
            start: NaiveDate::from_ymd_opt(2015, 1, 1)
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .unwrap_or_default(),
            hours: 3 * 8760,
            level: 32_000.0,
            daily_amplitude: 5_000.0,
            weekly_amplitude: 2_500.0,
            annual_amplitude: 4_000.0,
            noise_sd: 400.0,
            seed: 42,
        }
    }
}

/// Generate the series described by `spec`. Every hour is defined.
pub fn generate_hourly_load(spec: &SyntheticSpec) -> Result<HourlySeries, AppError> {
    if spec.hours == 0 {
        return Err(AppError::input("Synthetic series needs at least one hour."));
    }
    let noise = Normal::new(0.0, spec.noise_sd.max(0.0))
        .map_err(|e| AppError::external(format!("Noise distribution error: {e}")))?;
    let mut rng = StdRng::seed_from_u64(spec.seed);

    let values = (0..spec.hours)
        .map(|i| {
            let ts = spec.start + chrono::Duration::hours(i as i64);
            let hour = ts.hour() as f64 + ts.minute() as f64 / 60.0;
            let weekday = ts.weekday().num_days_from_monday() as f64 + hour / 24.0;
            let yearday = ts.ordinal0() as f64;

            // Afternoon peak, weekday bump, winter + summer peaks.
            let daily = -(TAU * hour / 24.0).cos();
            let weekly = (TAU * weekday / 7.0).sin();
            let annual = (2.0 * TAU * yearday / 365.25).cos();
            let load = spec.level
                + spec.daily_amplitude * daily
                + spec.weekly_amplitude * weekly
                + spec.annual_amplitude * annual
                + noise.sample(&mut rng);
            Some(load)
        })
        .collect();

    Ok(HourlySeries {
        start: spec.start,
        values,
    })
}

/// Write a series in the raw `Datetime,PJME_MW` layout.
pub fn write_raw_csv(series: &HourlySeries, path: &Path) -> Result<(), AppError> {
    let mut writer = csv::Writer::from_path(path)
        .map_err(|e| AppError::input(format!("Failed to create '{}': {e}", path.display())))?;
    writer
        .write_record([TIMESTAMP_COLUMN, TARGET])
        .map_err(|e| AppError::input(format!("Failed to write CSV header: {e}")))?;
    for (ts, value) in series.iter() {
        let load = value.map(|v| format!("{v:.1}")).unwrap_or_default();
        writer
            .write_record([ts.format("%Y-%m-%d %H:%M:%S").to_string(), load])
            .map_err(|e| AppError::input(format!("Failed to write CSV row: {e}")))?;
    }
    writer
        .flush()
        .map_err(|e| AppError::input(format!("Failed to flush '{}': {e}", path.display())))
}
