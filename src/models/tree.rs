//! Regression tree stored as a flat node arena.
//!
//! Node `0` is the root. Every node records its cover (sum of training
//! hessians that reached it), which the explainer needs to weight paths.

use serde::{Deserialize, Serialize};

/// Decision applied at a split node.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SplitRule {
    /// Go left when `value <= threshold`.
    Threshold { threshold: f64 },
    /// Go left when `value == category` (one-vs-rest).
    Category { category: f64 },
}

impl SplitRule {
    pub fn goes_left(&self, value: f64) -> bool {
        match *self {
            SplitRule::Threshold { threshold } => value <= threshold,
            SplitRule::Category { category } => value == category,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "node", rename_all = "snake_case")]
pub enum Node {
    Leaf {
        value: f64,
        cover: f64,
    },
    Split {
        feature: usize,
        rule: SplitRule,
        left: usize,
        right: usize,
        cover: f64,
    },
}

impl Node {
    pub fn cover(&self) -> f64 {
        match *self {
            Node::Leaf { cover, .. } | Node::Split { cover, .. } => cover,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tree {
    nodes: Vec<Node>,
}

impl Tree {
    pub fn new(nodes: Vec<Node>) -> Self {
        Self { nodes }
    }

    /// Single-leaf tree.
    pub fn constant(value: f64, cover: f64) -> Self {
        Self::new(vec![Node::Leaf { value, cover }])
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn node(&self, idx: usize) -> &Node {
        &self.nodes[idx]
    }

    /// Leaf value reached by a row; `value_of(f)` returns feature `f` of the row.
    pub fn predict<F: Fn(usize) -> f64>(&self, value_of: F) -> f64 {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                Node::Leaf { value, .. } => return *value,
                Node::Split {
                    feature,
                    rule,
                    left,
                    right,
                    ..
                } => {
                    idx = if rule.goes_left(value_of(*feature)) { *left } else { *right };
                }
            }
        }
    }

    /// Cover-weighted mean leaf value: the tree's output with no feature known.
    pub fn expected_value(&self) -> f64 {
        let root_cover = self.nodes.first().map(Node::cover).unwrap_or(0.0);
        if root_cover <= 0.0 {
            return 0.0;
        }
        self.nodes
            .iter()
            .filter_map(|n| match *n {
                Node::Leaf { value, cover } => Some(value * cover),
                Node::Split { .. } => None,
            })
            .sum::<f64>()
            / root_cover
    }

    pub fn n_leaves(&self) -> usize {
        self.nodes
            .iter()
            .filter(|n| matches!(n, Node::Leaf { .. }))
            .count()
    }

    pub fn depth(&self) -> usize {
        fn walk(nodes: &[Node], idx: usize) -> usize {
            match &nodes[idx] {
                Node::Leaf { .. } => 0,
                Node::Split { left, right, .. } => 1 + walk(nodes, *left).max(walk(nodes, *right)),
            }
        }
        if self.nodes.is_empty() { 0 } else { walk(&self.nodes, 0) }
    }
}
