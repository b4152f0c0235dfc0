//! Gradient-boosted regression trees on the logistic loss.
//!
//! Training is additive: every call to [`Booster::boost`] appends trees fitted
//! to the residuals of the current ensemble, so a booster can be warm-started
//! from a saved artifact and fed one batch at a time.

use serde::{Deserialize, Serialize};

use crate::config::ModelConfig;
use crate::error::{AppError, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Node {
    Leaf {
        value: f64,
    },
    /// Rows with `row[feature] <= threshold` go left.
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tree {
    /// Nodes in build order, root first.
    pub nodes: Vec<Node>,
}

impl Tree {
    pub fn predict(&self, row: &[f64]) -> f64 {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                Node::Leaf { value } => return *value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    idx = if row[*feature] <= *threshold {
                        *left
                    } else {
                        *right
                    };
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Booster {
    pub n_features: usize,
    pub trees: Vec<Tree>,
}

impl Booster {
    pub fn new(n_features: usize) -> Self {
        Self {
            n_features,
            trees: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.trees.is_empty()
    }

    /// Raw log-odds of a row.
    pub fn margin(&self, row: &[f64]) -> f64 {
        self.trees.iter().map(|t| t.predict(row)).sum()
    }

    /// Probability that a row is positive.
    pub fn predict_proba(&self, row: &[f64]) -> f64 {
        sigmoid(self.margin(row))
    }

    /// Append `params.rounds_per_batch` trees fitted on `rows`.
    pub fn boost(&mut self, rows: &[Vec<f64>], labels: &[bool], params: &ModelConfig) -> Result<()> {
        if rows.len() != labels.len() {
            return Err(AppError::Model(format!(
                "{} rows but {} labels",
                rows.len(),
                labels.len()
            )));
        }
        if let Some(row) = rows.iter().find(|r| r.len() != self.n_features) {
            return Err(AppError::Model(format!(
                "Expected {} features, got {}",
                self.n_features,
                row.len()
            )));
        }
        if rows.is_empty() {
            return Ok(());
        }

        let mut margins: Vec<f64> = rows.iter().map(|r| self.margin(r)).collect();
        let mut grad = vec![0.0; rows.len()];
        let mut hess = vec![0.0; rows.len()];

        for _ in 0..params.rounds_per_batch {
            for i in 0..rows.len() {
                let p = sigmoid(margins[i]);
                grad[i] = p - if labels[i] { 1.0 } else { 0.0 };
                hess[i] = (p * (1.0 - p)).max(1e-16);
            }

            let mut grower = TreeGrower {
                rows,
                grad: &grad,
                hess: &hess,
                params,
                nodes: Vec::new(),
            };
            grower.grow((0..rows.len()).collect(), 0);
            let tree = Tree {
                nodes: grower.nodes,
            };

            for (margin, row) in margins.iter_mut().zip(rows) {
                *margin += tree.predict(row);
            }
            self.trees.push(tree);
        }
        Ok(())
    }
}

pub fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

struct TreeGrower<'a> {
    rows: &'a [Vec<f64>],
    grad: &'a [f64],
    hess: &'a [f64],
    params: &'a ModelConfig,
    nodes: Vec<Node>,
}

struct BestSplit {
    feature: usize,
    threshold: f64,
    gain: f64,
}

impl TreeGrower<'_> {
    /// Grow the subtree over `idx` and return the index of its root.
    fn grow(&mut self, idx: Vec<usize>, depth: usize) -> usize {
        let g: f64 = idx.iter().map(|&i| self.grad[i]).sum();
        let h: f64 = idx.iter().map(|&i| self.hess[i]).sum();

        let node = self.nodes.len();
        self.nodes.push(Node::Leaf {
            value: self.leaf_value(g, h),
        });

        if idx.len() < 2 || depth >= self.params.max_depth || h < 2.0 * self.params.min_child_weight {
            return node;
        }
        let Some(best) = self.best_split(&idx, g, h) else {
            return node;
        };

        let (left_idx, right_idx): (Vec<usize>, Vec<usize>) = idx
            .into_iter()
            .partition(|&i| self.rows[i][best.feature] <= best.threshold);
        let left = self.grow(left_idx, depth + 1);
        let right = self.grow(right_idx, depth + 1);
        self.nodes[node] = Node::Split {
            feature: best.feature,
            threshold: best.threshold,
            left,
            right,
        };
        node
    }

    fn leaf_value(&self, g: f64, h: f64) -> f64 {
        -g / (h + self.params.lambda) * self.params.learning_rate
    }

    fn score(&self, g: f64, h: f64) -> f64 {
        g * g / (h + self.params.lambda)
    }

    fn best_split(&self, idx: &[usize], g: f64, h: f64) -> Option<BestSplit> {
        let parent = self.score(g, h);
        let mut best: Option<BestSplit> = None;

        for feature in 0..self.rows[idx[0]].len() {
            let mut sorted = idx.to_vec();
            sorted.sort_by(|&a, &b| self.rows[a][feature].total_cmp(&self.rows[b][feature]));

            let candidates = candidate_thresholds(
                sorted.iter().map(|&i| self.rows[i][feature]),
                self.params.max_bins,
            );

            let (mut gl, mut hl) = (0.0, 0.0);
            let mut pos = 0;
            for threshold in candidates {
                while pos < sorted.len() && self.rows[sorted[pos]][feature] <= threshold {
                    gl += self.grad[sorted[pos]];
                    hl += self.hess[sorted[pos]];
                    pos += 1;
                }
                if pos == sorted.len() {
                    break;
                }
                let (gr, hr) = (g - gl, h - hl);
                if hl < self.params.min_child_weight || hr < self.params.min_child_weight {
                    continue;
                }
                let gain = self.score(gl, hl) + self.score(gr, hr) - parent;
                if gain > 1e-12 && best.as_ref().map_or(true, |b| gain > b.gain) {
                    best = Some(BestSplit {
                        feature,
                        threshold,
                        gain,
                    });
                }
            }
        }
        best
    }
}

/// At most `max_bins - 1` split points taken at quantiles of the distinct
/// values of an ascending sequence.
fn candidate_thresholds(sorted: impl Iterator<Item = f64>, max_bins: usize) -> Vec<f64> {
    let mut distinct: Vec<f64> = Vec::new();
    for value in sorted {
        if distinct.last() != Some(&value) {
            distinct.push(value);
        }
    }
    if distinct.len() <= max_bins {
        return distinct;
    }
    let mut picked: Vec<f64> = (1..max_bins)
        .map(|k| distinct[k * distinct.len() / max_bins])
        .collect();
    picked.dedup();
    picked
}
