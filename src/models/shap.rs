//! Exact path-dependent TreeSHAP for the boosted tree ensemble.
//!
//! Attributions are computed per tree with the polynomial-time recursion of
//! Lundberg et al. (2018), using node covers as the background distribution,
//! and summed over trees. For every row they add up, together with
//! [`Attributions::expected_value`], to the model's prediction.

use nalgebra::DMatrix;
use rayon::prelude::*;
use tracing::debug;

use crate::error::AppError;
use crate::models::tree::{Node, Tree};
use crate::models::{Attributions, BoostedTrees, Explainer, TrainedModel, ensure_width};

/// TreeSHAP explainer for [`BoostedTrees`].
#[derive(Debug, Clone, Copy, Default)]
pub struct TreeShap;

impl Explainer<BoostedTrees> for TreeShap {
    fn explain(&self, model: &BoostedTrees, x: &DMatrix<f64>) -> Result<Attributions, AppError> {
        let feature_names = model.feature_names().to_vec();
        let n_features = feature_names.len();
        ensure_width(x, n_features, "explain")?;

        let rows: Vec<Vec<f64>> = (0..x.nrows())
            .into_par_iter()
            .map(|i| {
                let mut phi = vec![0.0; n_features];
                for tree in model.trees() {
                    tree_shap(tree, |f| x[(i, f)], &mut phi);
                }
                phi
            })
            .collect();
        let values = DMatrix::from_fn(x.nrows(), n_features, |i, j| rows[i][j]);
        let expected_value = model.base_score() + model.trees().iter().map(Tree::expected_value).sum::<f64>();
        debug!(rows = x.nrows(), trees = model.n_rounds(), expected_value, "computed SHAP values");

        Ok(Attributions {
            feature_names,
            values,
            expected_value,
        })
    }
}

/// Add one tree's SHAP values for a single row into `phi`.
pub fn tree_shap<F: Fn(usize) -> f64>(tree: &Tree, value_of: F, phi: &mut [f64]) {
    if tree.nodes().is_empty() {
        return;
    }
    let mut walk = ShapWalk {
        tree,
        value_of: &value_of,
        phi,
    };
    walk.recurse(0, Vec::new(), 1.0, 1.0, None);
}

#[derive(Debug, Clone, Copy)]
struct PathElement {
    feature: Option<usize>,
    zero_fraction: f64,
    one_fraction: f64,
    weight: f64,
}

struct ShapWalk<'a, F> {
    tree: &'a Tree,
    value_of: &'a F,
    phi: &'a mut [f64],
}

impl<F: Fn(usize) -> f64> ShapWalk<'_, F> {
    fn recurse(
        &mut self,
        idx: usize,
        mut path: Vec<PathElement>,
        zero_fraction: f64,
        one_fraction: f64,
        feature: Option<usize>,
    ) {
        extend_path(&mut path, zero_fraction, one_fraction, feature);

        match *self.tree.node(idx) {
            Node::Leaf { value, .. } => {
                for i in 1..path.len() {
                    let w = unwound_path_sum(&path, i);
                    let el = path[i];
                    if let Some(f) = el.feature {
                        self.phi[f] += w * (el.one_fraction - el.zero_fraction) * value;
                    }
                }
            }
            Node::Split {
                feature: split_feature,
                rule,
                left,
                right,
                cover,
            } => {
                let (hot, cold) = if rule.goes_left((self.value_of)(split_feature)) {
                    (left, right)
                } else {
                    (right, left)
                };
                let hot_zero = ratio(self.tree.node(hot).cover(), cover);
                let cold_zero = ratio(self.tree.node(cold).cover(), cover);

                let mut incoming_zero = 1.0;
                let mut incoming_one = 1.0;
                if let Some(k) = path
                    .iter()
                    .skip(1)
                    .position(|el| el.feature == Some(split_feature))
                    .map(|p| p + 1)
                {
                    incoming_zero = path[k].zero_fraction;
                    incoming_one = path[k].one_fraction;
                    unwind_path(&mut path, k);
                }

                self.recurse(
                    hot,
                    path.clone(),
                    hot_zero * incoming_zero,
                    incoming_one,
                    Some(split_feature),
                );
                let cold_zero = cold_zero * incoming_zero;
                if cold_zero > 0.0 {
                    self.recurse(cold, path, cold_zero, 0.0, Some(split_feature));
                }
            }
        }
    }
}

fn ratio(part: f64, whole: f64) -> f64 {
    if whole > 0.0 { part / whole } else { 0.0 }
}

fn extend_path(path: &mut Vec<PathElement>, zero_fraction: f64, one_fraction: f64, feature: Option<usize>) {
    let depth = path.len();
    path.push(PathElement {
        feature,
        zero_fraction,
        one_fraction,
        weight: if depth == 0 { 1.0 } else { 0.0 },
    });
    for i in (0..depth).rev() {
        path[i + 1].weight += one_fraction * path[i].weight * (i + 1) as f64 / (depth + 1) as f64;
        path[i].weight = zero_fraction * path[i].weight * (depth - i) as f64 / (depth + 1) as f64;
    }
}

/// Remove element `k`, undoing its contribution to the permutation weights.
fn unwind_path(path: &mut Vec<PathElement>, k: usize) {
    let depth = path.len() - 1;
    let one_fraction = path[k].one_fraction;
    let zero_fraction = path[k].zero_fraction;
    let mut next_one_portion = path[depth].weight;

    for i in (0..depth).rev() {
        if one_fraction != 0.0 {
            let tmp = path[i].weight;
            path[i].weight = next_one_portion * (depth + 1) as f64 / ((i + 1) as f64 * one_fraction);
            next_one_portion = tmp - path[i].weight * zero_fraction * (depth - i) as f64 / (depth + 1) as f64;
        } else {
            path[i].weight = path[i].weight * (depth + 1) as f64 / (zero_fraction * (depth - i) as f64);
        }
    }

    for i in k..depth {
        path[i].feature = path[i + 1].feature;
        path[i].zero_fraction = path[i + 1].zero_fraction;
        path[i].one_fraction = path[i + 1].one_fraction;
    }
    path.pop();
}

/// Total permutation weight of the path with element `k` removed.
fn unwound_path_sum(path: &[PathElement], k: usize) -> f64 {
    let depth = path.len() - 1;
    let one_fraction = path[k].one_fraction;
    let zero_fraction = path[k].zero_fraction;
    let mut next_one_portion = path[depth].weight;
    let mut total = 0.0;

    for i in (0..depth).rev() {
        if one_fraction != 0.0 {
            let tmp = next_one_portion * (depth + 1) as f64 / ((i + 1) as f64 * one_fraction);
            total += tmp;
            next_one_portion = path[i].weight - tmp * zero_fraction * (depth - i) as f64 / (depth + 1) as f64;
        } else if zero_fraction != 0.0 {
            total += path[i].weight / zero_fraction / ((depth - i) as f64 / (depth + 1) as f64);
        }
    }
    total
}
