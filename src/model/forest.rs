//! Model A: bagged regression trees
//!
//! Each tree is grown on a bootstrap resample with a per-tree seeded RNG,
//! so a fixed `(config, data)` pair always produces the same forest even
//! though trees are built in parallel. Splits minimise weighted squared
//! error; sample weights scale each row's contribution to both the split
//! criterion and the leaf means.

use crate::config::ForestConfig;
use crate::{Error, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

const MIN_GAIN: f64 = 1e-12;

/// Flat tree node; children are indices into [`RegressionTree::nodes`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum Node {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        value: f64,
    },
}

/// Single CART regression tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionTree {
    nodes: Vec<Node>,
}

impl RegressionTree {
    fn predict(&self, row: &[f64]) -> f64 {
        let mut idx = 0;
        loop {
            match self.nodes[idx] {
                Node::Leaf { value } => return value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    idx = if row[feature] <= threshold { left } else { right };
                }
            }
        }
    }

    /// Number of nodes (splits + leaves)
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    fn depth(&self) -> usize {
        fn walk(nodes: &[Node], idx: usize) -> usize {
            match nodes[idx] {
                Node::Leaf { .. } => 0,
                Node::Split { left, right, .. } => 1 + walk(nodes, left).max(walk(nodes, right)),
            }
        }
        walk(&self.nodes, 0)
    }

    fn validate(&self, n_features: usize) -> Result<()> {
        if self.nodes.is_empty() {
            return Err(Error::Artifact("tree has no nodes".to_string()));
        }
        for (idx, node) in self.nodes.iter().enumerate() {
            if let Node::Split {
                feature,
                left,
                right,
                ..
            } = *node
            {
                // children always come after their parent, so traversal terminates
                if feature >= n_features
                    || left <= idx
                    || right <= idx
                    || left >= self.nodes.len()
                    || right >= self.nodes.len()
                {
                    return Err(Error::Artifact(format!("malformed tree node {idx}")));
                }
            }
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Default)]
struct Moments {
    count: usize,
    w: f64,
    wy: f64,
    wy2: f64,
}

impl Moments {
    fn add(&mut self, y: f64, w: f64) {
        self.count += 1;
        self.w += w;
        self.wy += w * y;
        self.wy2 += w * y * y;
    }

    fn minus(self, other: Self) -> Self {
        Self {
            count: self.count - other.count,
            w: self.w - other.w,
            wy: self.wy - other.wy,
            wy2: self.wy2 - other.wy2,
        }
    }

    fn sse(&self) -> f64 {
        if self.w <= 0.0 {
            return 0.0;
        }
        (self.wy2 - self.wy * self.wy / self.w).max(0.0)
    }

    fn mean(&self) -> f64 {
        if self.w <= 0.0 {
            0.0
        } else {
            self.wy / self.w
        }
    }
}

struct BestSplit {
    feature: usize,
    threshold: f64,
    gain: f64,
}

struct TreeBuilder<'a> {
    x: &'a [Vec<f64>],
    y: &'a [f64],
    w: &'a [f64],
    config: &'a ForestConfig,
    max_features: usize,
    rng: StdRng,
    nodes: Vec<Node>,
    importances: Vec<f64>,
}

impl TreeBuilder<'_> {
    fn moments(&self, indices: &[usize]) -> Moments {
        let mut m = Moments::default();
        for &i in indices {
            m.add(self.y[i], self.w[i]);
        }
        m
    }

    fn grow(&mut self, indices: &mut [usize], depth: usize) -> usize {
        let id = self.nodes.len();
        let parent = self.moments(indices);
        self.nodes.push(Node::Leaf {
            value: parent.mean(),
        });

        if depth >= self.config.max_depth
            || indices.len() < self.config.min_samples_split
            || parent.sse() <= MIN_GAIN
        {
            return id;
        }

        let Some(split) = self.best_split(indices, parent) else {
            return id;
        };

        let x = self.x;
        indices.sort_by(|&a, &b| x[a][split.feature].total_cmp(&x[b][split.feature]));
        let mid = indices.partition_point(|&i| x[i][split.feature] <= split.threshold);
        let (left_idx, right_idx) = indices.split_at_mut(mid);

        self.importances[split.feature] += split.gain;
        let left = self.grow(left_idx, depth + 1);
        let right = self.grow(right_idx, depth + 1);
        self.nodes[id] = Node::Split {
            feature: split.feature,
            threshold: split.threshold,
            left,
            right,
        };
        id
    }

    fn best_split(&mut self, indices: &[usize], parent: Moments) -> Option<BestSplit> {
        let n_features = self.x[0].len();
        let candidates = rand::seq::index::sample(&mut self.rng, n_features, self.max_features);
        let min_leaf = self.config.min_samples_leaf.max(1);
        let parent_sse = parent.sse();

        let x = self.x;
        let mut best: Option<BestSplit> = None;
        let mut order = indices.to_vec();
        for feature in candidates.iter() {
            order.sort_by(|&a, &b| x[a][feature].total_cmp(&x[b][feature]));

            let mut left = Moments::default();
            for pos in 0..order.len().saturating_sub(1) {
                let i = order[pos];
                left.add(self.y[i], self.w[i]);

                let here = x[i][feature];
                let next = x[order[pos + 1]][feature];
                if next <= here || left.count < min_leaf || order.len() - left.count < min_leaf {
                    continue;
                }

                let right = parent.minus(left);
                let gain = parent_sse - left.sse() - right.sse();
                if gain > MIN_GAIN && best.as_ref().map_or(true, |b| gain > b.gain) {
                    let mid = here + (next - here) / 2.0;
                    let threshold = if mid < next { mid } else { here };
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

/// Bagged ensemble of [`RegressionTree`]s.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForest {
    trees: Vec<RegressionTree>,
    n_features: usize,
    feature_importances: Vec<f64>,
}

impl RandomForest {
    /// Grow the forest on scaled rows.
    ///
    /// # Errors
    ///
    /// Returns `Error::TrainingFailure` on empty, ragged or mismatched input
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_precision_loss,
        clippy::cast_sign_loss
    )]
    pub fn fit(x: &[Vec<f64>], y: &[f64], weights: &[f64], config: &ForestConfig) -> Result<Self> {
        let n = x.len();
        if n == 0 || y.len() != n || weights.len() != n {
            return Err(Error::TrainingFailure(format!(
                "forest needs matching non-empty inputs (rows={n}, targets={}, weights={})",
                y.len(),
                weights.len()
            )));
        }
        let n_features = x[0].len();
        if n_features == 0 || x.iter().any(|row| row.len() != n_features) {
            return Err(Error::TrainingFailure("forest rows have unequal widths".to_string()));
        }
        if config.n_trees == 0 {
            return Err(Error::TrainingFailure("forest needs at least one tree".to_string()));
        }

        let max_features = config
            .max_features
            .unwrap_or_else(|| (n_features as f64).sqrt() as usize)
            .clamp(1, n_features);

        let grown: Vec<(RegressionTree, Vec<f64>)> = (0..config.n_trees)
            .into_par_iter()
            .map(|t| {
                let mut rng = StdRng::seed_from_u64(config.seed.wrapping_add(t as u64));
                let mut bootstrap: Vec<usize> = (0..n).map(|_| rng.gen_range(0..n)).collect();
                let mut builder = TreeBuilder {
                    x,
                    y,
                    w: weights,
                    config,
                    max_features,
                    rng,
                    nodes: Vec::new(),
                    importances: vec![0.0; n_features],
                };
                builder.grow(&mut bootstrap, 0);
                (
                    RegressionTree {
                        nodes: builder.nodes,
                    },
                    builder.importances,
                )
            })
            .collect();

        let mut feature_importances = vec![0.0; n_features];
        let mut trees = Vec::with_capacity(grown.len());
        for (tree, importances) in grown {
            let total: f64 = importances.iter().sum();
            if total > 0.0 {
                for (acc, imp) in feature_importances.iter_mut().zip(&importances) {
                    *acc += imp / total;
                }
            }
            trees.push(tree);
        }
        let total: f64 = feature_importances.iter().sum();
        if total > 0.0 {
            for imp in &mut feature_importances {
                *imp /= total;
            }
        }

        tracing::debug!(
            trees = trees.len(),
            max_features,
            max_depth = trees.iter().map(RegressionTree::depth).max().unwrap_or(0),
            "forest grown"
        );

        Ok(Self {
            trees,
            n_features,
            feature_importances,
        })
    }

    /// Mean of the per-tree predictions for one scaled row.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidInput` on a row of the wrong width
    #[allow(clippy::cast_precision_loss)]
    pub fn predict(&self, row: &[f64]) -> Result<f64> {
        if row.len() != self.n_features {
            return Err(Error::InvalidInput(format!(
                "forest expects {} features, got {}",
                self.n_features,
                row.len()
            )));
        }
        let sum: f64 = self.trees.iter().map(|tree| tree.predict(row)).sum();
        Ok(sum / self.trees.len() as f64)
    }

    /// Input width
    #[must_use]
    pub const fn n_features(&self) -> usize {
        self.n_features
    }

    /// Trees in the forest
    #[must_use]
    pub fn trees(&self) -> &[RegressionTree] {
        &self.trees
    }

    /// Normalised impurity decrease per feature (sums to 1 unless no splits)
    #[must_use]
    pub fn feature_importances(&self) -> &[f64] {
        &self.feature_importances
    }

    /// Structural check after deserialisation.
    ///
    /// # Errors
    ///
    /// Returns `Error::Artifact` for an empty forest or a malformed tree
    pub fn validate(&self) -> Result<()> {
        if self.trees.is_empty() {
            return Err(Error::Artifact("forest has no trees".to_string()));
        }
        if self.feature_importances.len() != self.n_features {
            return Err(Error::Artifact("forest importances do not match width".to_string()));
        }
        self.trees.iter().try_for_each(|tree| tree.validate(self.n_features))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(n_trees: usize) -> ForestConfig {
        ForestConfig {
            n_trees,
            ..ForestConfig::default()
        }
    }

    fn step_data() -> (Vec<Vec<f64>>, Vec<f64>, Vec<f64>) {
        let x: Vec<Vec<f64>> = (0..60).map(|i| vec![f64::from(i), f64::from(i % 3)]).collect();
        let y: Vec<f64> = (0..60).map(|i| if i < 30 { 100.0 } else { 500.0 }).collect();
        (x, y, vec![1.0; 60])
    }

    #[test]
    fn test_learns_step_function() {
        let (x, y, w) = step_data();
        let forest = RandomForest::fit(&x, &y, &w, &config(20)).unwrap();
        assert!((forest.predict(&[5.0, 2.0]).unwrap() - 100.0).abs() < 40.0);
        assert!((forest.predict(&[55.0, 1.0]).unwrap() - 500.0).abs() < 40.0);
    }

    #[test]
    fn test_deterministic_for_seed() {
        let (x, y, w) = step_data();
        let a = RandomForest::fit(&x, &y, &w, &config(8)).unwrap();
        let b = RandomForest::fit(&x, &y, &w, &config(8)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_importances_favor_informative_feature() {
        let (x, y, w) = step_data();
        let forest = RandomForest::fit(&x, &y, &w, &config(20)).unwrap();
        let imp = forest.feature_importances();
        assert!(imp[0] > imp[1]);
        assert!((imp.iter().sum::<f64>() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_weights_pull_leaf_values() {
        // identical features, conflicting targets: the leaf is the weighted mean
        let x = vec![vec![1.0]; 4];
        let y = vec![0.0, 0.0, 100.0, 100.0];
        let w = vec![1.0, 1.0, 3.0, 3.0];
        let forest = RandomForest::fit(&x, &y, &w, &config(50)).unwrap();
        let p = forest.predict(&[1.0]).unwrap();
        assert!(p > 50.0, "weighted mean should lean to heavy rows, got {p}");
    }

    #[test]
    fn test_max_depth_respected() {
        let (x, y, w) = step_data();
        let cfg = ForestConfig {
            n_trees: 4,
            max_depth: 1,
            ..ForestConfig::default()
        };
        let forest = RandomForest::fit(&x, &y, &w, &cfg).unwrap();
        assert!(forest.trees().iter().all(|t| t.depth() <= 1));
        forest.validate().unwrap();
    }

    #[test]
    fn test_wrong_width_rejected() {
        let (x, y, w) = step_data();
        let forest = RandomForest::fit(&x, &y, &w, &config(2)).unwrap();
        assert!(forest.predict(&[1.0]).is_err());
    }
}
