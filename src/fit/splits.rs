//! Forward-chaining cross-validation splits.
//!
//! The last `n_splits * test_size` rows are cut into consecutive test windows.
//! Each fold trains on everything before its window (expanding window, no gap).

use std::ops::Range;

use crate::domain::CvConfig;
use crate::error::AppError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fold {
    /// 1-based fold number.
    pub fold: usize,
    pub train: Range<usize>,
    pub test: Range<usize>,
}

/// Build the folds for `n` rows.
pub fn forward_chaining_splits(n: usize, cv: &CvConfig) -> Result<Vec<Fold>, AppError> {
    if cv.n_splits == 0 || cv.test_size == 0 {
        return Err(AppError::input("Cross-validation needs at least one split and a non-empty test window."));
    }
    let needed = cv.n_splits.checked_mul(cv.test_size).unwrap_or(usize::MAX);
    if n <= needed {
        return Err(AppError::insufficient(format!(
            "Need more than {needed} feature rows for {} folds of {} rows, got {n}.",
            cv.n_splits, cv.test_size
        )));
    }

    Ok((0..cv.n_splits)
        .map(|k| {
            let test_start = n - (cv.n_splits - k) * cv.test_size;
            Fold {
                fold: k + 1,
                train: 0..test_start,
                test: test_start..test_start + cv.test_size,
            }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn folds_expand_and_cover_the_tail() {
        let cv = CvConfig {
            n_splits: 3,
            test_size: 10,
        };
        let folds = forward_chaining_splits(45, &cv).unwrap();
        assert_eq!(folds.len(), 3);
        assert_eq!(folds[0].train, 0..15);
        assert_eq!(folds[0].test, 15..25);
        assert_eq!(folds[2].test, 35..45);
        for pair in folds.windows(2) {
            assert_eq!(pair[0].test.end, pair[1].test.start);
            assert!(pair[1].train.end > pair[0].train.end);
        }
        for f in &folds {
            assert_eq!(f.train.end, f.test.start);
            assert_eq!(f.test.len(), 10);
        }
    }

    #[test]
    fn default_shape_on_a_pjme_sized_frame() {
        let folds = forward_chaining_splits(145_198, &CvConfig::default()).unwrap();
        assert_eq!(folds.len(), 5);
        assert_eq!(folds[4].test, 145_198 - 8760..145_198);
        assert_eq!(folds[0].train.end, 145_198 - 5 * 8760);
    }

    #[test]
    fn too_few_rows_is_insufficient() {
        let cv = CvConfig {
            n_splits: 5,
            test_size: 10,
        };
        let err = forward_chaining_splits(50, &cv).unwrap_err();
        assert_eq!(err.exit_code(), 3);
        assert!(forward_chaining_splits(51, &cv).is_ok());
    }
}
