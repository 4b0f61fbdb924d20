//! Histogram gradient-boosted regression trees.
//!
//! Trees are grown depth-wise on per-feature histograms of gradient and
//! hessian sums. A split's gain is
//!
//! ```text
//! GL²/(HL+λ) + GR²/(HR+λ) - G²/(H+λ)
//! ```
//!
//! and it is kept only when the gain exceeds `gamma`. Leaves hold
//! `-G/(H+λ) * learning_rate`. Categorical columns with one bin per value are
//! split one-vs-rest; everything else is split on a threshold.

use std::collections::VecDeque;

use nalgebra::DMatrix;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::{BoosterParams, ColumnKind, Objective};
use crate::error::AppError;
use crate::math::{BinMapper, root_mean_squared_error};
use crate::models::tree::{Node, SplitRule, Tree};
use crate::models::{EvalSet, Regressor, TrainedModel, ensure_width};

/// Gains at or below this are treated as no improvement.
const MIN_SPLIT_GAIN: f64 = 1e-6;

/// Untrained regressor: hyperparameters plus the column schema.
#[derive(Debug, Clone)]
pub struct GradientBoosting {
    params: BoosterParams,
    feature_names: Vec<String>,
    column_kinds: Vec<ColumnKind>,
}

impl GradientBoosting {
    pub fn new(params: BoosterParams, feature_names: Vec<String>, column_kinds: Vec<ColumnKind>) -> Self {
        Self {
            params,
            feature_names,
            column_kinds,
        }
    }

    pub fn params(&self) -> &BoosterParams {
        &self.params
    }

    fn validate(&self, x: &DMatrix<f64>, y: &[f64], eval_sets: &[EvalSet<'_>]) -> Result<(), AppError> {
        if x.nrows() == 0 {
            return Err(AppError::insufficient("Cannot fit a model on zero rows."));
        }
        if y.len() != x.nrows() {
            return Err(AppError::input(format!(
                "Target has {} values but the feature matrix has {} rows.",
                y.len(),
                x.nrows()
            )));
        }
        ensure_width(x, self.feature_names.len(), "fit")?;
        if !self.column_kinds.is_empty() && self.column_kinds.len() != self.feature_names.len() {
            return Err(AppError::input(format!(
                "{} column kinds given for {} features.",
                self.column_kinds.len(),
                self.feature_names.len()
            )));
        }
        if x.iter().any(|v| !v.is_finite()) || y.iter().any(|v| !v.is_finite()) {
            return Err(AppError::input("Training data contains non-finite values."));
        }
        if !self.params.learning_rate.is_finite() || self.params.learning_rate <= 0.0 {
            return Err(AppError::input("learning_rate must be positive."));
        }
        for set in eval_sets {
            ensure_width(set.x, self.feature_names.len(), set.name)?;
            if set.x.nrows() != set.y.len() || set.y.is_empty() {
                return Err(AppError::input(format!(
                    "Eval set '{}' has {} rows and {} targets.",
                    set.name,
                    set.x.nrows(),
                    set.y.len()
                )));
            }
        }
        Ok(())
    }

    fn is_categorical(&self, feature: usize) -> bool {
        self.params.enable_categorical && self.column_kinds.get(feature) == Some(&ColumnKind::Categorical)
    }
}

impl Regressor for GradientBoosting {
    type Model = BoostedTrees;

    fn fit(&self, x: &DMatrix<f64>, y: &[f64], eval_sets: &[EvalSet<'_>]) -> Result<BoostedTrees, AppError> {
        self.validate(x, y, eval_sets)?;
        let n = x.nrows();
        let n_features = x.ncols();

        let columns: Vec<Vec<f64>> = (0..n_features)
            .map(|f| x.column(f).iter().copied().collect())
            .collect();
        let mappers: Vec<BinMapper> = columns
            .par_iter()
            .map(|col| BinMapper::fit(col, self.params.max_bin))
            .collect();
        let binned: Vec<Vec<u8>> = columns
            .par_iter()
            .zip(&mappers)
            .map(|(col, mapper)| col.iter().map(|&v| mapper.bin(v)).collect())
            .collect();
        let categorical: Vec<bool> = (0..n_features)
            .map(|f| self.is_categorical(f) && mappers[f].is_exact())
            .collect();

        let builder = TreeBuilder {
            binned: &binned,
            mappers: &mappers,
            categorical: &categorical,
            params: &self.params,
        };

        let base_score = y.iter().sum::<f64>() / n as f64;
        let mut train_pred = vec![base_score; n];
        let mut eval_pred: Vec<Vec<f64>> = eval_sets.iter().map(|s| vec![base_score; s.y.len()]).collect();
        let mut grad = vec![0.0; n];
        let mut hess = vec![0.0; n];
        let mut trees: Vec<Tree> = Vec::with_capacity(self.params.n_estimators);
        let mut best: Option<(usize, f64)> = None;

        for round in 0..self.params.n_estimators {
            gradients(self.params.objective, &train_pred, y, &mut grad, &mut hess);
            let (tree, delta) = builder.build(&grad, &hess);
            for (p, d) in train_pred.iter_mut().zip(&delta) {
                *p += d;
            }

            let mut scores = Vec::with_capacity(eval_sets.len());
            for (set, preds) in eval_sets.iter().zip(eval_pred.iter_mut()) {
                preds
                    .par_iter_mut()
                    .enumerate()
                    .for_each(|(i, p)| *p += tree.predict(|f| set.x[(i, f)]));
                scores.push(root_mean_squared_error(set.y, preds).unwrap_or(f64::NAN));
            }
            trees.push(tree);

            if round % 100 == 0 {
                let train_rmse = root_mean_squared_error(y, &train_pred).unwrap_or(f64::NAN);
                debug!(round, train_rmse, eval_rmse = ?scores, "boosting round");
            }

            let Some(&score) = scores.last() else {
                continue;
            };
            if !score.is_finite() {
                return Err(AppError::external(format!(
                    "Eval RMSE became non-finite at round {round}."
                )));
            }
            if best.is_none_or(|(_, s)| score < s) {
                best = Some((round, score));
            }
            if let (Some(patience), Some((best_round, best_score))) = (self.params.early_stopping_rounds, best) {
                if round - best_round >= patience {
                    debug!(round, best_round, best_score, "early stopping");
                    break;
                }
            }
        }

        let (best_iteration, best_score) = match (self.params.early_stopping_rounds, best) {
            (Some(_), Some((round, score))) => {
                trees.truncate(round + 1);
                (round, Some(score))
            }
            _ => (trees.len().saturating_sub(1), None),
        };

        Ok(BoostedTrees {
            feature_names: self.feature_names.clone(),
            column_kinds: self.column_kinds.clone(),
            params: self.params.clone(),
            base_score,
            trees,
            best_iteration,
            best_score,
        })
    }
}

fn gradients(objective: Objective, pred: &[f64], y: &[f64], grad: &mut [f64], hess: &mut [f64]) {
    match objective {
        Objective::SquaredError => {
            for i in 0..pred.len() {
                grad[i] = pred[i] - y[i];
                hess[i] = 1.0;
            }
        }
    }
}

/// Fitted ensemble: `prediction = base_score + sum of tree outputs`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoostedTrees {
    feature_names: Vec<String>,
    column_kinds: Vec<ColumnKind>,
    params: BoosterParams,
    base_score: f64,
    trees: Vec<Tree>,
    best_iteration: usize,
    /// Best RMSE on the monitored eval set, when early stopping was active.
    best_score: Option<f64>,
}

impl BoostedTrees {
    pub fn base_score(&self) -> f64 {
        self.base_score
    }

    pub fn trees(&self) -> &[Tree] {
        &self.trees
    }

    pub fn best_iteration(&self) -> usize {
        self.best_iteration
    }

    pub fn best_score(&self) -> Option<f64> {
        self.best_score
    }

    pub fn params(&self) -> &BoosterParams {
        &self.params
    }

    pub fn column_kinds(&self) -> &[ColumnKind] {
        &self.column_kinds
    }

    pub fn predict_row<F: Fn(usize) -> f64>(&self, value_of: F) -> f64 {
        self.trees
            .iter()
            .fold(self.base_score, |acc, tree| acc + tree.predict(&value_of))
    }
}

impl TrainedModel for BoostedTrees {
    fn predict(&self, x: &DMatrix<f64>) -> Result<Vec<f64>, AppError> {
        ensure_width(x, self.feature_names.len(), "predict")?;
        Ok((0..x.nrows())
            .into_par_iter()
            .map(|i| self.predict_row(|f| x[(i, f)]))
            .collect())
    }

    fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    fn n_rounds(&self) -> usize {
        self.trees.len()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct GradStat {
    grad: f64,
    hess: f64,
}

impl GradStat {
    fn add(&mut self, grad: f64, hess: f64) {
        self.grad += grad;
        self.hess += hess;
    }

    fn merge(&mut self, other: GradStat) {
        self.add(other.grad, other.hess);
    }

    fn minus(self, other: GradStat) -> GradStat {
        GradStat {
            grad: self.grad - other.grad,
            hess: self.hess - other.hess,
        }
    }

    fn score(self, lambda: f64) -> f64 {
        self.grad * self.grad / (self.hess + lambda)
    }
}

/// `hist[feature][bin]`
type Histogram = Vec<Vec<GradStat>>;

#[derive(Debug, Clone, Copy)]
struct SplitCandidate {
    feature: usize,
    bin: usize,
    categorical: bool,
    gain: f64,
    left: GradStat,
    right: GradStat,
}

impl SplitCandidate {
    fn goes_left(&self, bin: u8) -> bool {
        if self.categorical {
            bin as usize == self.bin
        } else {
            bin as usize <= self.bin
        }
    }
}

struct PendingNode {
    slot: usize,
    rows: Vec<usize>,
    total: GradStat,
    depth: usize,
    /// `None` once the node can no longer be split.
    hist: Option<Histogram>,
}

struct TreeBuilder<'a> {
    binned: &'a [Vec<u8>],
    mappers: &'a [BinMapper],
    categorical: &'a [bool],
    params: &'a BoosterParams,
}

impl TreeBuilder<'_> {
    /// Grow one tree. Also returns each training row's leaf value.
    fn build(&self, grad: &[f64], hess: &[f64]) -> (Tree, Vec<f64>) {
        let n = grad.len();
        let rows: Vec<usize> = (0..n).collect();
        let mut total = GradStat::default();
        for r in 0..n {
            total.add(grad[r], hess[r]);
        }
        let hist = (self.params.max_depth > 0).then(|| self.histogram(&rows, grad, hess));

        let mut nodes = vec![placeholder()];
        let mut delta = vec![0.0; n];
        let mut queue = VecDeque::from([PendingNode {
            slot: 0,
            rows,
            total,
            depth: 0,
            hist,
        }]);

        while let Some(node) = queue.pop_front() {
            let split = node
                .hist
                .as_ref()
                .and_then(|hist| self.best_split(hist, node.total));
            let (Some(split), Some(parent_hist)) = (split, node.hist) else {
                let value = self.leaf_value(node.total);
                for &r in &node.rows {
                    delta[r] = value;
                }
                nodes[node.slot] = Node::Leaf {
                    value,
                    cover: node.total.hess,
                };
                continue;
            };

            let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = node
                .rows
                .iter()
                .copied()
                .partition(|&r| split.goes_left(self.binned[split.feature][r]));

            let left_slot = nodes.len();
            let right_slot = left_slot + 1;
            nodes.push(placeholder());
            nodes.push(placeholder());
            nodes[node.slot] = Node::Split {
                feature: split.feature,
                rule: self.rule(&split),
                left: left_slot,
                right: right_slot,
                cover: node.total.hess,
            };

            let depth = node.depth + 1;
            let (left_hist, right_hist) = if depth < self.params.max_depth {
                if left_rows.len() <= right_rows.len() {
                    let small = self.histogram(&left_rows, grad, hess);
                    let large = subtract(&parent_hist, &small);
                    (Some(small), Some(large))
                } else {
                    let small = self.histogram(&right_rows, grad, hess);
                    let large = subtract(&parent_hist, &small);
                    (Some(large), Some(small))
                }
            } else {
                (None, None)
            };

            queue.push_back(PendingNode {
                slot: left_slot,
                rows: left_rows,
                total: split.left,
                depth,
                hist: left_hist,
            });
            queue.push_back(PendingNode {
                slot: right_slot,
                rows: right_rows,
                total: split.right,
                depth,
                hist: right_hist,
            });
        }

        (Tree::new(nodes), delta)
    }

    fn histogram(&self, rows: &[usize], grad: &[f64], hess: &[f64]) -> Histogram {
        (0..self.binned.len())
            .into_par_iter()
            .map(|f| {
                let column = &self.binned[f];
                let mut bins = vec![GradStat::default(); self.mappers[f].n_bins()];
                for &r in rows {
                    bins[column[r] as usize].add(grad[r], hess[r]);
                }
                bins
            })
            .collect()
    }

    /// Best split over all features; ties keep the lowest feature index.
    fn best_split(&self, hist: &Histogram, total: GradStat) -> Option<SplitCandidate> {
        let per_feature: Vec<Option<SplitCandidate>> = hist
            .par_iter()
            .enumerate()
            .map(|(f, bins)| self.best_split_for_feature(f, bins, total))
            .collect();

        let mut best: Option<SplitCandidate> = None;
        for candidate in per_feature.into_iter().flatten() {
            if best.is_none_or(|b| candidate.gain > b.gain) {
                best = Some(candidate);
            }
        }
        best.filter(|b| b.gain > self.params.gamma && b.gain > MIN_SPLIT_GAIN)
    }

    fn best_split_for_feature(&self, feature: usize, bins: &[GradStat], total: GradStat) -> Option<SplitCandidate> {
        let lambda = self.params.reg_lambda;
        let min_child_weight = self.params.min_child_weight;
        let parent_score = total.score(lambda);
        let categorical = self.categorical[feature];

        let mut best: Option<SplitCandidate> = None;
        let mut consider = |bin: usize, left: GradStat| {
            let right = total.minus(left);
            if left.hess < min_child_weight || right.hess < min_child_weight {
                return;
            }
            let gain = left.score(lambda) + right.score(lambda) - parent_score;
            if best.is_none_or(|b| gain > b.gain) {
                best = Some(SplitCandidate {
                    feature,
                    bin,
                    categorical,
                    gain,
                    left,
                    right,
                });
            }
        };

        if categorical {
            for (bin, stat) in bins.iter().enumerate() {
                consider(bin, *stat);
            }
        } else {
            let mut left = GradStat::default();
            for (bin, stat) in bins.iter().enumerate().take(bins.len().saturating_sub(1)) {
                left.merge(*stat);
                consider(bin, left);
            }
        }
        best
    }

    fn leaf_value(&self, total: GradStat) -> f64 {
        -total.grad / (total.hess + self.params.reg_lambda) * self.params.learning_rate
    }

    fn rule(&self, split: &SplitCandidate) -> SplitRule {
        let value = self.mappers[split.feature].upper_bound(split.bin);
        if split.categorical {
            SplitRule::Category { category: value }
        } else {
            SplitRule::Threshold { threshold: value }
        }
    }
}

fn placeholder() -> Node {
    Node::Leaf { value: 0.0, cover: 0.0 }
}

fn subtract(parent: &Histogram, child: &Histogram) -> Histogram {
    parent
        .iter()
        .zip(child)
        .map(|(p, c)| p.iter().zip(c).map(|(a, b)| a.minus(*b)).collect())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(n_estimators: usize, learning_rate: f64, max_depth: usize) -> BoosterParams {
        BoosterParams {
            n_estimators,
            learning_rate,
            max_depth,
            early_stopping_rounds: None,
            ..BoosterParams::default()
        }
    }

    fn one_column(values: &[f64]) -> DMatrix<f64> {
        DMatrix::from_column_slice(values.len(), 1, values)
    }

    #[test]
    fn learns_a_step_function() {
        let xs: Vec<f64> = (0..200).map(|i| i as f64).collect();
        let ys: Vec<f64> = xs.iter().map(|&v| if v < 100.0 { 10.0 } else { 50.0 }).collect();
        let x = one_column(&xs);
        let model = GradientBoosting::new(params(200, 0.3, 2), vec!["x".into()], vec![ColumnKind::Numeric])
            .fit(&x, &ys, &[])
            .unwrap();
        let preds = model.predict(&x).unwrap();
        for (p, y) in preds.iter().zip(&ys) {
            assert!((p - y).abs() < 0.5, "pred {p} vs {y}");
        }
        assert_eq!(model.n_rounds(), 200);
        assert!((model.base_score() - 30.0).abs() < 1e-12);
    }

    #[test]
    fn fitting_is_deterministic() {
        let rows = 300;
        let data: Vec<f64> = (0..rows * 2)
            .map(|i| ((i * 37) % 101) as f64)
            .collect();
        let x = DMatrix::from_column_slice(rows, 2, &data);
        let y: Vec<f64> = (0..rows).map(|i| x[(i, 0)] * 2.0 - x[(i, 1)]).collect();
        let booster = GradientBoosting::new(
            params(50, 0.1, 4),
            vec!["a".into(), "b".into()],
            vec![ColumnKind::Numeric; 2],
        );
        let first = booster.fit(&x, &y, &[]).unwrap();
        let second = booster.fit(&x, &y, &[]).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.predict(&x).unwrap(), second.predict(&x).unwrap());
    }

    #[test]
    fn early_stopping_keeps_the_best_round() {
        let xs: Vec<f64> = (0..200).map(|i| i as f64).collect();
        let x = one_column(&xs);
        let y = xs.clone();
        // The eval target runs the other way, so every round makes it worse.
        let eval_y: Vec<f64> = xs.iter().map(|v| 199.0 - v).collect();
        let mut p = params(100, 0.1, 3);
        p.early_stopping_rounds = Some(5);
        let model = GradientBoosting::new(p, vec!["x".into()], vec![ColumnKind::Numeric])
            .fit(
                &x,
                &y,
                &[EvalSet {
                    name: "eval",
                    x: &x,
                    y: &eval_y,
                }],
            )
            .unwrap();
        assert_eq!(model.best_iteration(), 0);
        assert_eq!(model.n_rounds(), 1);
        assert!(model.best_score().is_some());
    }

    #[test]
    fn categorical_column_splits_one_vs_rest() {
        let cats: Vec<f64> = (0..90).map(|i| (i % 3) as f64).collect();
        let y: Vec<f64> = cats.iter().map(|&c| if c == 1.0 { 100.0 } else { 0.0 }).collect();
        let x = one_column(&cats);
        let mut p = params(1, 1.0, 1);
        p.reg_lambda = 0.0;
        let model = GradientBoosting::new(p, vec!["season".into()], vec![ColumnKind::Categorical])
            .fit(&x, &y, &[])
            .unwrap();
        match model.trees()[0].node(0) {
            Node::Split { rule, .. } => assert_eq!(*rule, SplitRule::Category { category: 1.0 }),
            other => panic!("expected a split, got {other:?}"),
        }
        let preds = model.predict(&x).unwrap();
        for (p, y) in preds.iter().zip(&y) {
            assert!((p - y).abs() < 1e-9);
        }
    }

    #[test]
    fn depth_is_bounded() {
        let xs: Vec<f64> = (0..500).map(|i| ((i * 7919) % 500) as f64).collect();
        let y: Vec<f64> = xs.iter().map(|v| (v / 10.0).sin() * 100.0).collect();
        let model = GradientBoosting::new(params(20, 0.3, 3), vec!["x".into()], vec![ColumnKind::Numeric])
            .fit(&one_column(&xs), &y, &[])
            .unwrap();
        assert!(model.trees().iter().all(|t| t.depth() <= 3));
    }

    #[test]
    fn rejects_mismatched_width_and_non_finite_data() {
        let booster = GradientBoosting::new(params(5, 0.1, 2), vec!["a".into(), "b".into()], vec![]);
        let x = one_column(&[1.0, 2.0]);
        let err = booster.fit(&x, &[1.0, 2.0], &[]).unwrap_err();
        assert_eq!(err.exit_code(), 2);

        let x = DMatrix::from_row_slice(2, 2, &[1.0, f64::NAN, 2.0, 3.0]);
        let err = booster.fit(&x, &[1.0, 2.0], &[]).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }
}
