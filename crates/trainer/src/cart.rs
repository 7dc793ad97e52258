//! CART (Classification and Regression Tree) builder
//!
//! Deterministic exact-greedy regression trees over features with missing
//! values. Each split learns which side missing values go to.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::deterministic::{gain_cmp, SplitTieBreaker};

/// Training parameters for a single tree
#[derive(Clone, Debug)]
pub struct TreeConfig {
    pub max_depth: usize,
    pub min_samples_leaf: usize,
    /// Upper bound on split candidates per feature and node
    pub max_thresholds: usize,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            max_depth: 6,
            min_samples_leaf: 20,
            max_thresholds: 64,
        }
    }
}

/// A tree node; leaves carry a value, splits carry a test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Feature index to split on (-1 for leaf nodes)
    pub feature_idx: i32,
    pub threshold: f64,
    pub left: i32,
    pub right: i32,
    /// Side taken by a missing feature value
    pub missing_left: bool,
    pub leaf: Option<f64>,
}

impl Node {
    pub fn leaf(value: f64) -> Self {
        Self {
            feature_idx: -1,
            threshold: 0.0,
            left: -1,
            right: -1,
            missing_left: false,
            leaf: Some(value),
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.leaf.is_some()
    }
}

/// A regression tree; node 0 is the root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tree {
    pub nodes: Vec<Node>,
}

impl Tree {
    /// Leaf value reached by `features`. `x <= threshold` goes left.
    pub fn evaluate(&self, features: &[Option<f64>]) -> f64 {
        let mut idx = 0usize;
        loop {
            let Some(node) = self.nodes.get(idx) else {
                return 0.0;
            };
            if let Some(value) = node.leaf {
                return value;
            }

            let go_left = match features.get(node.feature_idx as usize).copied().flatten() {
                Some(x) => x <= node.threshold,
                None => node.missing_left,
            };
            let next = if go_left { node.left } else { node.right };
            idx = next as usize;
        }
    }

    pub fn depth(&self) -> usize {
        fn walk(nodes: &[Node], idx: usize) -> usize {
            match nodes.get(idx) {
                Some(node) if !node.is_leaf() => {
                    1 + walk(nodes, node.left as usize).max(walk(nodes, node.right as usize))
                }
                _ => 0,
            }
        }
        walk(&self.nodes, 0)
    }
}

/// Split candidate with gain and tie-breaker
#[derive(Debug, Clone)]
struct SplitCandidate {
    feature_idx: usize,
    threshold: f64,
    missing_left: bool,
    gain: f64,
    tie_breaker: SplitTieBreaker,
}

impl SplitCandidate {
    fn new(feature_idx: usize, threshold: f64, missing_left: bool, gain: f64, node_id: usize) -> Self {
        Self {
            feature_idx,
            threshold,
            missing_left,
            gain,
            tie_breaker: SplitTieBreaker::new(feature_idx, threshold, node_id, missing_left),
        }
    }

    fn beats(&self, other: &SplitCandidate) -> bool {
        match gain_cmp(self.gain, other.gain) {
            Ordering::Greater => true,
            Ordering::Less => false,
            Ordering::Equal => self.tie_breaker < other.tie_breaker,
        }
    }
}

/// Running gradient/hessian sums
#[derive(Debug, Clone, Copy, Default)]
struct GradSum {
    g: f64,
    h: f64,
    n: usize,
}

impl GradSum {
    fn add(&mut self, g: f64, h: f64) {
        self.g += g;
        self.h += h;
        self.n += 1;
    }

    fn plus(self, other: GradSum) -> GradSum {
        GradSum {
            g: self.g + other.g,
            h: self.h + other.h,
            n: self.n + other.n,
        }
    }

    fn minus(self, other: GradSum) -> GradSum {
        GradSum {
            g: self.g - other.g,
            h: self.h - other.h,
            n: self.n - other.n,
        }
    }

    fn score(self) -> f64 {
        if self.h > 0.0 {
            self.g * self.g / self.h
        } else {
            0.0
        }
    }
}

/// Build a regression tree using exact-greedy CART algorithm
pub struct CartBuilder<'a> {
    config: TreeConfig,
    features: &'a [Vec<Option<f64>>],
    gradients: &'a [f64],
    hessians: &'a [f64],
    feature_count: usize,
}

impl<'a> CartBuilder<'a> {
    pub fn new(
        features: &'a [Vec<Option<f64>>],
        gradients: &'a [f64],
        hessians: &'a [f64],
        config: TreeConfig,
    ) -> Self {
        assert_eq!(features.len(), gradients.len());
        assert_eq!(features.len(), hessians.len());

        let feature_count = features.first().map_or(0, Vec::len);
        Self {
            config,
            features,
            gradients,
            hessians,
            feature_count,
        }
    }

    pub fn build(&self) -> Tree {
        let mut nodes = Vec::new();
        let indices: Vec<usize> = (0..self.features.len()).collect();
        self.build_node(&indices, 0, &mut nodes, 0);
        Tree { nodes }
    }

    fn build_node(&self, indices: &[usize], depth: usize, nodes: &mut Vec<Node>, node_id: usize) -> i32 {
        let current_idx = nodes.len();
        let leaf = Node::leaf(self.leaf_value(indices));

        if depth >= self.config.max_depth || indices.len() < 2 * self.config.min_samples_leaf.max(1) {
            nodes.push(leaf);
            return current_idx as i32;
        }

        let Some(split) = self.find_best_split(indices, node_id) else {
            nodes.push(leaf);
            return current_idx as i32;
        };

        let (left_indices, right_indices): (Vec<usize>, Vec<usize>) = indices.iter().copied().partition(|&i| {
            match self.features[i][split.feature_idx] {
                Some(x) => x <= split.threshold,
                None => split.missing_left,
            }
        });

        nodes.push(Node {
            feature_idx: split.feature_idx as i32,
            threshold: split.threshold,
            left: -1,
            right: -1,
            missing_left: split.missing_left,
            leaf: None,
        });

        let left = self.build_node(&left_indices, depth + 1, nodes, node_id * 2 + 1);
        let right = self.build_node(&right_indices, depth + 1, nodes, node_id * 2 + 2);
        nodes[current_idx].left = left;
        nodes[current_idx].right = right;

        current_idx as i32
    }

    /// Best positive-gain split over all features, if any.
    fn find_best_split(&self, indices: &[usize], node_id: usize) -> Option<SplitCandidate> {
        let parent = self.sum(indices);
        let mut best: Option<SplitCandidate> = None;

        for feature_idx in 0..self.feature_count {
            let mut present: Vec<(f64, usize)> = Vec::with_capacity(indices.len());
            let mut missing = GradSum::default();
            for &i in indices {
                match self.features[i][feature_idx] {
                    Some(x) => present.push((x, i)),
                    None => missing.add(self.gradients[i], self.hessians[i]),
                }
            }
            if present.len() < 2 {
                continue;
            }
            present.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));

            let boundaries = present.windows(2).filter(|w| w[0].0 < w[1].0).count();
            let mut boundary = 0usize;
            let mut left = GradSum::default();

            for pos in 0..present.len() - 1 {
                let (value, i) = present[pos];
                left.add(self.gradients[i], self.hessians[i]);
                if value == present[pos + 1].0 {
                    continue;
                }
                let keep = self.keep_boundary(boundary, boundaries);
                boundary += 1;
                if !keep {
                    continue;
                }

                let right = parent.minus(missing).minus(left);
                for missing_left in [false, true] {
                    let (l, r) = if missing_left {
                        (left.plus(missing), right)
                    } else {
                        (left, right.plus(missing))
                    };
                    if l.n < self.config.min_samples_leaf || r.n < self.config.min_samples_leaf {
                        continue;
                    }

                    let gain = l.score() + r.score() - parent.score();
                    if gain <= 0.0 {
                        continue;
                    }
                    let candidate = SplitCandidate::new(feature_idx, value, missing_left, gain, node_id);
                    if best.as_ref().map_or(true, |b| candidate.beats(b)) {
                        best = Some(candidate);
                    }
                }
            }
        }

        best
    }

    /// Evenly thin `total` boundaries down to at most `max_thresholds`.
    fn keep_boundary(&self, boundary: usize, total: usize) -> bool {
        let cap = self.config.max_thresholds;
        if cap == 0 || total <= cap {
            return true;
        }
        (boundary + 1) * cap / total != boundary * cap / total
    }

    fn sum(&self, indices: &[usize]) -> GradSum {
        let mut sum = GradSum::default();
        for &i in indices {
            sum.add(self.gradients[i], self.hessians[i]);
        }
        sum
    }

    /// Optimal leaf value: -G/H
    fn leaf_value(&self, indices: &[usize]) -> f64 {
        let sum = self.sum(indices);
        if sum.h > 0.0 {
            -sum.g / sum.h
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows(values: &[Option<f64>]) -> Vec<Vec<Option<f64>>> {
        values.iter().map(|v| vec![*v]).collect()
    }

    #[test]
    fn test_single_split_on_step() {
        let features = rows(&[Some(1.0), Some(2.0), Some(3.0), Some(4.0)]);
        // Residuals -10, -10, +10, +10 expressed as gradients.
        let gradients = vec![10.0, 10.0, -10.0, -10.0];
        let hessians = vec![1.0; 4];
        let config = TreeConfig {
            max_depth: 1,
            min_samples_leaf: 1,
            max_thresholds: 64,
        };

        let tree = CartBuilder::new(&features, &gradients, &hessians, config).build();
        assert_eq!(tree.nodes.len(), 3);
        assert_eq!(tree.nodes[0].threshold, 2.0);
        assert_eq!(tree.evaluate(&[Some(1.5)]), -10.0);
        assert_eq!(tree.evaluate(&[Some(3.5)]), 10.0);
        assert_eq!(tree.depth(), 1);
    }

    #[test]
    fn test_missing_values_learn_a_direction() {
        let features = rows(&[Some(1.0), Some(2.0), None, Some(8.0), Some(9.0), None]);
        // Missing rows behave like the high group.
        let gradients = vec![5.0, 5.0, -5.0, -5.0, -5.0, -5.0];
        let hessians = vec![1.0; 6];
        let config = TreeConfig {
            max_depth: 1,
            min_samples_leaf: 1,
            max_thresholds: 64,
        };

        let tree = CartBuilder::new(&features, &gradients, &hessians, config).build();
        let root = &tree.nodes[0];
        assert_eq!(root.threshold, 2.0);
        assert!(!root.missing_left);
        assert_eq!(tree.evaluate(&[None]), 5.0);
    }

    #[test]
    fn test_leaf_only_tree() {
        let features = rows(&[Some(1.0)]);
        let tree = CartBuilder::new(&features, &[-2.0], &[1.0], TreeConfig::default()).build();

        assert_eq!(tree.nodes.len(), 1);
        assert_eq!(tree.evaluate(&[Some(100.0)]), 2.0);
    }

    #[test]
    fn test_equal_gain_prefers_lower_feature() {
        // Both features separate the rows identically.
        let features = vec![
            vec![Some(1.0), Some(1.0)],
            vec![Some(2.0), Some(2.0)],
            vec![Some(3.0), Some(3.0)],
            vec![Some(4.0), Some(4.0)],
        ];
        let gradients = vec![1.0, 1.0, -1.0, -1.0];
        let config = TreeConfig {
            max_depth: 1,
            min_samples_leaf: 1,
            max_thresholds: 64,
        };

        let tree = CartBuilder::new(&features, &gradients, &[1.0; 4], config).build();
        assert_eq!(tree.nodes[0].feature_idx, 0);
    }

    #[test]
    fn test_threshold_cap() {
        let features = rows(&(0..100).map(|v| Some(v as f64)).collect::<Vec<_>>());
        let gradients: Vec<f64> = (0..100).map(|v| if v < 50 { 1.0 } else { -1.0 }).collect();
        let builder = CartBuilder::new(
            &features,
            &gradients,
            &[1.0; 100],
            TreeConfig {
                max_depth: 1,
                min_samples_leaf: 1,
                max_thresholds: 4,
            },
        );
        let kept = (0..99).filter(|&b| builder.keep_boundary(b, 99)).count();
        assert_eq!(kept, 4);
    }
}
