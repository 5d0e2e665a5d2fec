//! Bagged regression trees (variance-reduction CART), used only for the
//! feature-importance diagnostic.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ForestParams {
    pub n_trees: usize,
    pub max_depth: usize,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    pub seed: u64,
}

#[derive(Debug, Clone)]
enum Node {
    Leaf {
        value: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

#[derive(Debug, Clone)]
struct Tree {
    nodes: Vec<Node>,
}

impl Tree {
    fn predict(&self, row: &[f64]) -> f64 {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                Node::Leaf { value } => return *value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => idx = if row[*feature] <= *threshold { *left } else { *right },
            }
        }
    }
}

struct Split {
    feature: usize,
    threshold: f64,
    gain: f64,
    left: Vec<usize>,
    right: Vec<usize>,
}

/// Builds one tree and accumulates its impurity decrease per feature.
struct TreeBuilder<'a> {
    x: &'a [Vec<f64>],
    y: &'a [f64],
    params: &'a ForestParams,
    nodes: Vec<Node>,
    importance: Vec<f64>,
}

impl<'a> TreeBuilder<'a> {
    fn sse(&self, rows: &[usize]) -> f64 {
        if rows.is_empty() {
            return 0.0;
        }
        let n = rows.len() as f64;
        let sum: f64 = rows.iter().map(|&r| self.y[r]).sum();
        let sq: f64 = rows.iter().map(|&r| self.y[r] * self.y[r]).sum();
        (sq - sum * sum / n).max(0.0)
    }

    fn mean(&self, rows: &[usize]) -> f64 {
        rows.iter().map(|&r| self.y[r]).sum::<f64>() / rows.len().max(1) as f64
    }

    fn best_split(&self, rows: &[usize]) -> Option<Split> {
        let leaf = self.params.min_samples_leaf.max(1);
        let parent = self.sse(rows);
        let n = rows.len();
        let mut best: Option<(usize, f64, f64)> = None;

        for feature in 0..self.x.first().map_or(0, Vec::len) {
            let mut order: Vec<usize> = rows.to_vec();
            order.sort_by(|&a, &b| self.x[a][feature].total_cmp(&self.x[b][feature]));

            let total_sum: f64 = order.iter().map(|&r| self.y[r]).sum();
            let total_sq: f64 = order.iter().map(|&r| self.y[r] * self.y[r]).sum();
            let (mut left_sum, mut left_sq) = (0.0, 0.0);

            for i in 0..n - 1 {
                let yi = self.y[order[i]];
                left_sum += yi;
                left_sq += yi * yi;
                let left_n = i + 1;
                let right_n = n - left_n;
                if left_n < leaf || right_n < leaf {
                    continue;
                }
                let here = self.x[order[i]][feature];
                let next = self.x[order[i + 1]][feature];
                if here == next {
                    continue;
                }
                let right_sum = total_sum - left_sum;
                let right_sq = total_sq - left_sq;
                let child = (left_sq - left_sum * left_sum / left_n as f64)
                    + (right_sq - right_sum * right_sum / right_n as f64);
                let gain = parent - child;
                if gain > best.map_or(1e-12, |b| b.2) {
                    best = Some((feature, (here + next) / 2.0, gain));
                }
            }
        }

        best.map(|(feature, threshold, gain)| {
            let (left, right) = rows
                .iter()
                .copied()
                .partition(|&r| self.x[r][feature] <= threshold);
            Split {
                feature,
                threshold,
                gain,
                left,
                right,
            }
        })
    }

    fn grow(&mut self, rows: Vec<usize>, depth: usize) -> usize {
        let id = self.nodes.len();
        self.nodes.push(Node::Leaf {
            value: self.mean(&rows),
        });

        if depth >= self.params.max_depth || rows.len() < self.params.min_samples_split.max(2) {
            return id;
        }
        let Some(split) = self.best_split(&rows) else {
            return id;
        };

        self.importance[split.feature] += split.gain;
        let left = self.grow(split.left, depth + 1);
        let right = self.grow(split.right, depth + 1);
        self.nodes[id] = Node::Split {
            feature: split.feature,
            threshold: split.threshold,
            left,
            right,
        };
        id
    }
}

#[derive(Debug, Clone)]
pub struct RandomForest {
    trees: Vec<Tree>,
    importances: Vec<f64>,
}

impl RandomForest {
    /// Fit on row-major features `x` against targets `y`. Deterministic for a given seed.
    pub fn fit(x: &[Vec<f64>], y: &[f64], params: &ForestParams) -> RandomForest {
        let n = y.len();
        let n_features = x.first().map_or(0, Vec::len);
        let mut rng = StdRng::seed_from_u64(params.seed);
        let mut trees = Vec::with_capacity(params.n_trees);
        let mut importances = vec![0.0; n_features];

        for _ in 0..params.n_trees {
            let sample: Vec<usize> = (0..n).map(|_| rng.gen_range(0..n)).collect();
            let mut builder = TreeBuilder {
                x,
                y,
                params,
                nodes: Vec::new(),
                importance: vec![0.0; n_features],
            };
            builder.grow(sample, 0);

            let total: f64 = builder.importance.iter().sum();
            if total > 0.0 {
                for (acc, v) in importances.iter_mut().zip(&builder.importance) {
                    *acc += v / total;
                }
            }
            trees.push(Tree {
                nodes: builder.nodes,
            });
        }

        let total: f64 = importances.iter().sum();
        if total > 0.0 {
            importances.iter_mut().for_each(|v| *v /= total);
        }
        RandomForest { trees, importances }
    }

    pub fn predict(&self, row: &[f64]) -> f64 {
        if self.trees.is_empty() {
            return 0.0;
        }
        self.trees.iter().map(|t| t.predict(row)).sum::<f64>() / self.trees.len() as f64
    }

    /// Mean impurity decrease per feature, normalized to sum to 1.
    pub fn feature_importances(&self) -> &[f64] {
        &self.importances
    }
}
