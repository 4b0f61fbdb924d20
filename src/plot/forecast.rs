//! One-week forecast vs actual line chart.

use std::error::Error;
use std::path::Path;

use chrono::{Duration, NaiveDateTime};
use plotters::prelude::*;
use plotters::series::DashedLineSeries;
use tracing::{info, warn};

use crate::domain::ForecastFrame;
use crate::error::AppError;
use crate::plot::font::{FONT_FAMILY, ensure_font};

const TITLE: &str = "Forecast vs Actuals (1 Week Zoom)";

/// Rows of `frame` inside `[week_start, week_start + 7 days)`.
#[derive(Debug, Clone, PartialEq)]
pub struct ForecastWindow {
    pub start: NaiveDateTime,
    /// `(hours since start, actual, prediction)`
    pub points: Vec<(f64, f64, f64)>,
}

impl ForecastWindow {
    pub fn select(frame: &ForecastFrame, week_start: Option<NaiveDateTime>) -> Result<Self, AppError> {
        let start = match week_start.or_else(|| frame.timestamps.iter().min().copied()) {
            Some(ts) => ts,
            None => return Err(AppError::insufficient("Forecast frame is empty.")),
        };
        let end = start + Duration::days(7);
        let points: Vec<(f64, f64, f64)> = frame
            .timestamps
            .iter()
            .zip(frame.actual.iter().zip(&frame.prediction))
            .filter(|(ts, _)| **ts >= start && **ts < end)
            .map(|(ts, (a, p))| ((*ts - start).num_minutes() as f64 / 60.0, *a, *p))
            .collect();
        if points.is_empty() {
            return Err(AppError::insufficient(format!(
                "No forecast rows in the week starting {start}."
            )));
        }
        Ok(Self { start, points })
    }

    fn y_range(&self) -> (f64, f64) {
        let (lo, hi) = self
            .points
            .iter()
            .flat_map(|&(_, a, p)| [a, p])
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)));
        let pad = ((hi - lo) * 0.05).max(1.0);
        (lo - pad, hi + pad)
    }
}

/// Draw actual (solid) and predicted (dashed) load for one week.
///
/// Returns the number of hours drawn.
pub fn plot_forecast(
    frame: &ForecastFrame,
    week_start: Option<NaiveDateTime>,
    path: &Path,
    size: (u32, u32),
) -> Result<usize, AppError> {
    let window = ForecastWindow::select(frame, week_start)?;
    let with_text = ensure_font();
    if let Err(e) = draw(&window, path, size, with_text) {
        if !with_text {
            return Err(AppError::external(format!("Failed to render forecast plot: {e}")));
        }
        // Text failed to render: keep the chart, drop the text.
        warn!(error = %e, "redrawing forecast plot without labels");
        draw(&window, path, size, false)
            .map_err(|e| AppError::external(format!("Failed to render forecast plot: {e}")))?;
    }
    info!(path = %path.display(), hours = window.points.len(), "Forecast plot saved");
    Ok(window.points.len())
}

fn draw(window: &ForecastWindow, path: &Path, size: (u32, u32), text: bool) -> Result<(), Box<dyn Error>> {
    let root = BitMapBackend::new(path, size).into_drawing_area();
    root.fill(&WHITE)?;

    let x_max = window.points.last().map(|p| p.0).unwrap_or(0.0).max(1.0);
    let (y0, y1) = window.y_range();

    let mut builder = ChartBuilder::on(&root);
    builder.margin(15);
    if text {
        builder
            .caption(TITLE, (FONT_FAMILY, 26))
            .x_label_area_size(45)
            .y_label_area_size(80);
    }
    let mut chart = builder.build_cartesian_2d(0.0..x_max, y0..y1)?;

    let start = window.start;
    let format_x = |h: &f64| (start + Duration::minutes((h * 60.0).round() as i64)).format("%m-%d %H:%M").to_string();
    let format_y = |v: &f64| format!("{v:.0}");
    let mut mesh = chart.configure_mesh();
    if text {
        mesh.x_labels(8)
            .x_label_formatter(&format_x)
            .y_desc("Load (MW)")
            .y_label_formatter(&format_y);
    } else {
        mesh.x_labels(0).y_labels(0);
    }
    mesh.draw()?;

    let actual_color = RGBColor(31, 119, 180);
    let forecast_color = RGBColor(255, 127, 14);

    let actual = chart.draw_series(LineSeries::new(
        window.points.iter().map(|&(h, a, _)| (h, a)),
        actual_color.stroke_width(2),
    ))?;
    if text {
        actual
            .label("Actual Load")
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], actual_color.stroke_width(2)));
    }

    let forecast_points: Vec<(f64, f64)> = window.points.iter().map(|&(h, _, p)| (h, p)).collect();
    let forecast = chart.draw_series(DashedLineSeries::new(
        forecast_points,
        8,
        5,
        forecast_color.stroke_width(2),
    ))?;
    if text {
        forecast
            .label("Model Forecast")
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], forecast_color.stroke_width(2)));

        chart
            .configure_series_labels()
            .background_style(WHITE.mix(0.85))
            .border_style(BLACK)
            .draw()?;
    }

    root.present()?;
    Ok(())
}
