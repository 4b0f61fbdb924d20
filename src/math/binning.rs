//! Per-feature histogram binning.
//!
//! Each bin is identified by its inclusive upper bound, which is always a value
//! observed in the training column. A split "bin <= b" is therefore the same
//! partition as "value <= upper_bound(b)" on raw data, so trees trained on bins
//! can be evaluated directly on unbinned feature rows.

/// Hard cap so bin indices fit in a `u8`.
pub const MAX_BINS: usize = 256;

#[derive(Debug, Clone, PartialEq)]
pub struct BinMapper {
    upper_bounds: Vec<f64>,
    /// Every bin holds exactly one distinct training value.
    exact: bool,
}

impl BinMapper {
    /// Build bins for one column.
    ///
    /// When the column has at most `max_bin` distinct values every value gets its
    /// own bin; otherwise bins are cut at evenly spaced quantiles.
    pub fn fit(values: &[f64], max_bin: usize) -> Self {
        let max_bin = max_bin.clamp(2, MAX_BINS);
        let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

        if sorted.is_empty() {
            return Self {
                upper_bounds: vec![0.0],
                exact: true,
            };
        }

        let mut distinct = sorted.clone();
        distinct.dedup();
        if distinct.len() <= max_bin {
            return Self {
                upper_bounds: distinct,
                exact: true,
            };
        }

        let n = sorted.len();
        let mut upper_bounds = Vec::with_capacity(max_bin);
        for k in 1..=max_bin {
            let idx = (k * n).div_ceil(max_bin).saturating_sub(1).min(n - 1);
            let v = sorted[idx];
            if upper_bounds.last().is_none_or(|&last| v > last) {
                upper_bounds.push(v);
            }
        }
        Self {
            upper_bounds,
            exact: false,
        }
    }

    pub fn n_bins(&self) -> usize {
        self.upper_bounds.len()
    }

    /// Bin index of `v`; values above the last bound land in the last bin.
    pub fn bin(&self, v: f64) -> u8 {
        let idx = self.upper_bounds.partition_point(|&ub| ub < v);
        idx.min(self.upper_bounds.len() - 1) as u8
    }

    pub fn upper_bound(&self, bin: usize) -> f64 {
        self.upper_bounds[bin]
    }

    pub fn upper_bounds(&self) -> &[f64] {
        &self.upper_bounds
    }

    pub fn is_exact(&self) -> bool {
        self.exact
    }
}
