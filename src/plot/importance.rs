//! Global feature importance bar chart (mean |SHAP| per feature).

use std::error::Error;
use std::path::Path;

use nalgebra::DMatrix;
use plotters::prelude::*;
use tracing::{info, warn};

use crate::domain::ImportanceRanking;
use crate::error::AppError;
use crate::models::Explainer;
use crate::plot::font::{FONT_FAMILY, ensure_font};

const TITLE: &str = "Feature Importance: What drives Energy Demand?";

/// Explain `model` over `x` and draw the ranking. Returns the ranking.
pub fn plot_feature_importance<M, E>(
    model: &M,
    x: &DMatrix<f64>,
    explainer: &E,
    path: &Path,
    size: (u32, u32),
) -> Result<ImportanceRanking, AppError>
where
    M: ?Sized,
    E: Explainer<M>,
{
    if x.nrows() == 0 {
        return Err(AppError::insufficient("No rows to explain."));
    }
    let ranking = explainer.explain(model, x)?.ranking();
    plot_importance_ranking(&ranking, path, size)?;
    Ok(ranking)
}

/// Horizontal bars, most important feature on top.
pub fn plot_importance_ranking(ranking: &ImportanceRanking, path: &Path, size: (u32, u32)) -> Result<(), AppError> {
    if ranking.entries.is_empty() {
        return Err(AppError::insufficient("Importance ranking is empty."));
    }
    let with_text = ensure_font();
    if let Err(e) = draw(ranking, path, size, with_text) {
        if !with_text {
            return Err(AppError::external(format!("Failed to render importance plot: {e}")));
        }
        warn!(error = %e, "redrawing importance plot without labels");
        draw(ranking, path, size, false)
            .map_err(|e| AppError::external(format!("Failed to render importance plot: {e}")))?;
    }
    info!(path = %path.display(), features = ranking.entries.len(), "SHAP plot saved");
    Ok(())
}

fn draw(ranking: &ImportanceRanking, path: &Path, size: (u32, u32), text: bool) -> Result<(), Box<dyn Error>> {
    let n = ranking.entries.len();
    // Segment 0 is the bottom of the chart.
    let names: Vec<&str> = ranking.entries.iter().rev().map(|(name, _)| name.as_str()).collect();
    let x_max = ranking
        .entries
        .iter()
        .map(|(_, v)| *v)
        .fold(0.0_f64, f64::max);
    let x_max = if x_max > 0.0 { x_max * 1.1 } else { 1.0 };

    let root = BitMapBackend::new(path, size).into_drawing_area();
    root.fill(&WHITE)?;

    let mut builder = ChartBuilder::on(&root);
    builder.margin(15);
    if text {
        builder
            .caption(TITLE, (FONT_FAMILY, 22))
            .x_label_area_size(45)
            .y_label_area_size(110);
    }
    let mut chart = builder.build_cartesian_2d(0.0..x_max, (0..n).into_segmented())?;

    let format_y = |v: &SegmentValue<usize>| match v {
        SegmentValue::CenterOf(i) => names.get(*i).map(|s| s.to_string()).unwrap_or_default(),
        _ => String::new(),
    };
    let mut mesh = chart.configure_mesh();
    mesh.disable_y_mesh();
    if text {
        mesh.x_desc("mean(|SHAP value|)")
            .y_labels(n)
            .y_label_formatter(&format_y);
    } else {
        mesh.x_labels(0).y_labels(0);
    }
    mesh.draw()?;

    let bar_color = RGBColor(0, 139, 251);
    chart.draw_series(ranking.entries.iter().enumerate().map(|(rank, (_, value))| {
        let segment = n - 1 - rank;
        let mut bar = Rectangle::new(
            [
                (0.0, SegmentValue::Exact(segment)),
                (*value, SegmentValue::Exact(segment + 1)),
            ],
            bar_color.filled(),
        );
        bar.set_margin(4, 4, 0, 0);
        bar
    }))?;

    root.present()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Attributions;

    struct FixedExplainer;

    impl Explainer<()> for FixedExplainer {
        fn explain(&self, _model: &(), x: &DMatrix<f64>) -> Result<Attributions, AppError> {
            Ok(Attributions {
                feature_names: vec!["hour".into(), "lag_24".into(), "is_holiday".into()],
                values: DMatrix::from_fn(x.nrows(), 3, |i, j| match j {
                    0 if i % 2 == 0 => 5.0,
                    0 => -5.0,
                    1 => 20.0,
                    _ => 0.0,
                }),
                expected_value: 0.0,
            })
        }
    }

    #[test]
    fn ranking_is_returned_largest_first_and_png_written() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("feature_importance_plot.png");
        let x = DMatrix::zeros(4, 3);
        let ranking = plot_feature_importance(&(), &x, &FixedExplainer, &path, (500, 400)).unwrap();
        let names: Vec<&str> = ranking.entries.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["lag_24", "hour", "is_holiday"]);
        assert_eq!(ranking.entries[1].1, 5.0);
        assert!(path.exists());
    }

    #[test]
    fn nothing_to_explain_is_insufficient() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x.png");
        let x = DMatrix::zeros(0, 3);
        let err = plot_feature_importance(&(), &x, &FixedExplainer, &path, (500, 400)).unwrap_err();
        assert_eq!(err.exit_code(), 3);
    }
}
