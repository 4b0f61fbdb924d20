//! Regression error metrics.

/// Mean squared error. `None` when the inputs are empty or of different length.
pub fn mean_squared_error(actual: &[f64], predicted: &[f64]) -> Option<f64> {
    if actual.is_empty() || actual.len() != predicted.len() {
        return None;
    }
    let sse: f64 = actual
        .iter()
        .zip(predicted)
        .map(|(a, p)| (a - p) * (a - p))
        .sum();
    Some(sse / actual.len() as f64)
}

pub fn root_mean_squared_error(actual: &[f64], predicted: &[f64]) -> Option<f64> {
    mean_squared_error(actual, predicted).map(f64::sqrt)
}
