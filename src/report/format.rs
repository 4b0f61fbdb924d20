//! Formatted terminal output: dataset summary, fold table, importance table.

use std::path::Path;

use crate::domain::{FoldReport, HourlySeries, ImportanceRanking};
use crate::io::ingest::IngestStats;

/// Dataset summary after cleaning.
pub fn format_ingest_summary(stats: &IngestStats, series: &HourlySeries) -> String {
    let mut out = String::new();

    out.push_str("=== load-forecast - PJM East hourly load ===\n");
    let range = match series.end() {
        Some(end) => format!("{} .. {}", series.start, end),
        None => "(empty)".to_string(),
    };
    out.push_str(&format!("Range: {range}\n"));
    out.push_str(&format!(
        "Rows read: {} | duplicate timestamps: {} | hours: {} | forward-filled: {}\n",
        stats.rows_read, stats.duplicate_timestamps, stats.hours, stats.filled_hours
    ));

    out
}

/// Per-fold cross-validation table plus the mean RMSE.
pub fn format_fold_summary(folds: &[FoldReport]) -> String {
    let mut out = String::new();

    out.push_str("Cross-validation (forward chaining):\n");
    out.push_str(
        format!(
            "{:<5} {:>9} {:>9} {:<19} {:<19} {:>7} {:>10}\n",
            "fold", "train", "test", "test_start", "test_end", "rounds", "rmse_mw"
        )
        .trim_end(),
    );
    out.push('\n');
    out.push_str(
        format!(
            "{:-<5} {:-<9} {:-<9} {:-<19} {:-<19} {:-<7} {:-<10}\n",
            "", "", "", "", "", "", ""
        )
        .trim_end(),
    );
    out.push('\n');

    for f in folds {
        out.push_str(
            format!(
                "{:<5} {:>9} {:>9} {:<19} {:<19} {:>7} {:>10.2}\n",
                f.fold,
                f.train_rows,
                f.test_rows,
                f.test_start.format("%Y-%m-%d %H:%M:%S"),
                f.test_end.format("%Y-%m-%d %H:%M:%S"),
                f.rounds,
                f.rmse
            )
            .trim_end(),
        );
        out.push('\n');
    }

    if !folds.is_empty() {
        let mean = folds.iter().map(|f| f.rmse).sum::<f64>() / folds.len() as f64;
        out.push_str(&format!("Mean RMSE: {mean:.2} MW (model kept from fold {})\n", folds.len()));
    }

    out
}

/// Feature ranking by mean |SHAP|.
pub fn format_importance(ranking: &ImportanceRanking) -> String {
    let mut out = String::new();

    out.push_str("Feature importance (mean |SHAP|, MW):\n");
    let width = ranking
        .entries
        .iter()
        .map(|(name, _)| name.len())
        .max()
        .unwrap_or(0)
        .max(7);
    for (rank, (name, value)) in ranking.entries.iter().enumerate() {
        out.push_str(&format!("{:>2}. {name:<width$} {value:>10.2}\n", rank + 1));
    }

    out
}

pub fn format_artifacts(model: &Path, forecast: &Path, importance: &Path) -> String {
    let mut out = String::new();
    out.push_str("Artifacts:\n");
    for (label, path) in [("model", model), ("forecast", forecast), ("importance", importance)] {
        out.push_str(&format!("- {label:<10} {}\n", path.display()));
    }
    out
}
