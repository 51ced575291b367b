//! Gini CART induction producing trees in the arena layout, and bagged
//! forests of such trees.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use std::cmp::Ordering;

use crate::error::FitError;
use crate::model::FittedEnsemble;
use crate::tree::{
    gini, Distribution, FittedTree, CHILD_LEAF_SENTINEL, FEATURE_LEAF_SENTINEL, NUM_CLASSES,
    THRESHOLD_LEAF_SENTINEL,
};

/// Number of features examined at each split.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaxFeatures {
    All,
    /// A fresh random subset of `max(1, floor(sqrt(n_features)))` per node.
    Sqrt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CartParams {
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    pub max_features: MaxFeatures,
}

struct Split {
    feature: usize,
    threshold: f64,
    impurity: f64,
}

/// Parallel arrays of the tree under construction, filled in preorder so the
/// root is node 0.
struct TreeBuilder<'a> {
    rows: &'a [Vec<f64>],
    labels: &'a [u8],
    params: &'a CartParams,
    n_features: usize,
    children_left: Vec<i64>,
    children_right: Vec<i64>,
    feature: Vec<i64>,
    threshold: Vec<f64>,
    value: Vec<Vec<f64>>,
}

impl<'a> TreeBuilder<'a> {
    fn distribution(&self, samples: &[usize]) -> Distribution {
        let mut dist = [0.0; NUM_CLASSES];
        for &s in samples {
            dist[self.labels[s] as usize] += 1.0;
        }
        dist
    }

    fn push_leaf(&mut self, dist: Distribution) -> usize {
        self.children_left.push(CHILD_LEAF_SENTINEL);
        self.children_right.push(CHILD_LEAF_SENTINEL);
        self.feature.push(FEATURE_LEAF_SENTINEL);
        self.threshold.push(THRESHOLD_LEAF_SENTINEL);
        self.value.push(dist.to_vec());
        self.value.len() - 1
    }

    fn grow(&mut self, samples: Vec<usize>, depth: usize, rng: &mut StdRng) -> usize {
        let dist = self.distribution(&samples);
        let id = self.push_leaf(dist);

        let n = samples.len();
        let depth_reached = self.params.max_depth.is_some_and(|max| depth >= max);
        if depth_reached
            || n < self.params.min_samples_split
            || n < 2 * self.params.min_samples_leaf
            || gini(&dist) == 0.0
        {
            return id;
        }
        let Some(split) = self.best_split(&samples, gini(&dist), rng) else {
            return id;
        };

        let rows = self.rows;
        let (left, right): (Vec<usize>, Vec<usize>) =
            samples.into_iter().partition(|&s| rows[s][split.feature] <= split.threshold);
        let left_id = self.grow(left, depth + 1, rng);
        let right_id = self.grow(right, depth + 1, rng);

        self.children_left[id] = left_id as i64;
        self.children_right[id] = right_id as i64;
        self.feature[id] = split.feature as i64;
        self.threshold[id] = split.threshold;
        id
    }

    fn candidate_features(&self, rng: &mut StdRng) -> Vec<usize> {
        match self.params.max_features {
            MaxFeatures::All => (0..self.n_features).collect(),
            MaxFeatures::Sqrt => {
                let amount = ((self.n_features as f64).sqrt() as usize).clamp(1, self.n_features);
                let mut picked = rand::seq::index::sample(rng, self.n_features, amount).into_vec();
                picked.sort_unstable();
                picked
            }
        }
    }

    /// Lowest weighted child impurity over the candidate features. Only
    /// splits strictly better than the parent are returned.
    fn best_split(&self, samples: &[usize], parent_impurity: f64, rng: &mut StdRng) -> Option<Split> {
        let n = samples.len() as f64;
        let min_leaf = self.params.min_samples_leaf.max(1);
        let mut best: Option<Split> = None;

        for feature in self.candidate_features(rng) {
            let mut sorted: Vec<(f64, u8)> =
                samples.iter().map(|&s| (self.rows[s][feature], self.labels[s])).collect();
            sorted.sort_by(|a, b| compare_nan_last(a.0, b.0));

            let total = self.distribution(samples);
            let mut left = [0.0; NUM_CLASSES];
            for i in 0..sorted.len() - 1 {
                left[sorted[i].1 as usize] += 1.0;
                let (a, b) = (sorted[i].0, sorted[i + 1].0);
                let left_n = i + 1;
                let right_n = sorted.len() - left_n;
                if !(a.is_finite() && b.is_finite()) || a >= b || left_n < min_leaf || right_n < min_leaf {
                    continue;
                }
                let right = [total[0] - left[0], total[1] - left[1]];
                let impurity = (left_n as f64 * gini(&left) + right_n as f64 * gini(&right)) / n;
                if impurity < parent_impurity && best.as_ref().map_or(true, |current| impurity < current.impurity) {
                    best = Some(Split { feature, threshold: midpoint(a, b), impurity });
                }
            }
        }
        best
    }
}

fn compare_nan_last(a: f64, b: f64) -> Ordering {
    a.partial_cmp(&b).unwrap_or_else(|| a.is_nan().cmp(&b.is_nan()))
}

/// Threshold between two consecutive distinct values; `b` always lands on
/// the right side.
fn midpoint(a: f64, b: f64) -> f64 {
    let mid = a / 2.0 + b / 2.0;
    if mid >= b {
        a
    } else {
        mid
    }
}

/// Grows one tree over `samples` (indices into `rows`, duplicates allowed).
pub fn fit_tree(
    rows: &[Vec<f64>],
    labels: &[u8],
    samples: Vec<usize>,
    params: &CartParams,
    rng: &mut StdRng,
) -> Result<FittedTree, FitError> {
    if samples.is_empty() {
        return Err(FitError::EmptyTrainingSet);
    }
    let mut builder = TreeBuilder {
        rows,
        labels,
        params,
        n_features: rows[0].len(),
        children_left: Vec::new(),
        children_right: Vec::new(),
        feature: Vec::new(),
        threshold: Vec::new(),
        value: Vec::new(),
    };
    if builder.n_features == 0 {
        let dist = builder.distribution(&samples);
        return Ok(FittedTree::leaf(dist));
    }
    builder.grow(samples, 0, rng);
    Ok(FittedTree::from_arrays(
        builder.children_left,
        builder.children_right,
        builder.feature,
        builder.threshold,
        builder.value,
    )?)
}

/// Bagged forest: every member is grown on its own bootstrap sample with a
/// seed derived from `seed` and its position, so the result does not depend
/// on thread scheduling.
pub fn fit_forest(
    rows: &[Vec<f64>],
    labels: &[u8],
    n_trees: usize,
    params: &CartParams,
    seed: u64,
) -> Result<FittedEnsemble, FitError> {
    if rows.is_empty() {
        return Err(FitError::EmptyTrainingSet);
    }
    let members = (0..n_trees.max(1))
        .into_par_iter()
        .map(|index| {
            let mut rng = StdRng::seed_from_u64(seed.wrapping_add(index as u64));
            let bootstrap = (0..rows.len()).map(|_| rng.gen_range(0..rows.len())).collect();
            fit_tree(rows, labels, bootstrap, params, &mut rng)
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(FittedEnsemble::new(members)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> CartParams {
        CartParams { max_depth: None, min_samples_split: 2, min_samples_leaf: 1, max_features: MaxFeatures::All }
    }

    #[test]
    fn test_pure_node_is_a_leaf() {
        let rows = vec![vec![1.0], vec![2.0]];
        let mut rng = StdRng::seed_from_u64(0);
        let tree = fit_tree(&rows, &[1, 1], vec![0, 1], &params(), &mut rng).unwrap();
        assert_eq!(tree.node_count(), 1);
        assert_eq!(tree.distribution(0), [0.0, 2.0]);
    }

    #[test]
    fn test_depth_limit() {
        let rows: Vec<Vec<f64>> = (0..8).map(|i| vec![i as f64]).collect();
        let labels = [0, 1, 0, 1, 0, 1, 0, 1];
        let mut rng = StdRng::seed_from_u64(0);
        let limited = CartParams { max_depth: Some(1), ..params() };
        let tree = fit_tree(&rows, &labels, (0..8).collect(), &limited, &mut rng).unwrap();
        assert!(tree.node_count() <= 3);
    }

    #[test]
    fn test_min_samples_leaf_respected() {
        let rows: Vec<Vec<f64>> = (0..10).map(|i| vec![i as f64]).collect();
        let labels = [0, 0, 0, 0, 0, 0, 0, 0, 0, 1];
        let mut rng = StdRng::seed_from_u64(0);
        let wide = CartParams { min_samples_leaf: 3, ..params() };
        let tree = fit_tree(&rows, &labels, (0..10).collect(), &wide, &mut rng).unwrap();
        for id in 0..tree.node_count() {
            if tree.is_leaf(id) {
                let [a, b] = tree.distribution(id);
                assert!(a + b >= 3.0);
            }
        }
    }

    #[test]
    fn test_nan_goes_right_and_threshold_is_finite() {
        let rows = vec![vec![1.0], vec![2.0], vec![f64::NAN], vec![3.0]];
        let labels = [0, 0, 1, 1];
        let mut rng = StdRng::seed_from_u64(0);
        let tree = fit_tree(&rows, &labels, (0..4).collect(), &params(), &mut rng).unwrap();
        assert!(tree.get_threshold(0).is_finite());
        assert_eq!(tree.predict_row(&[f64::NAN]), 1);
    }

    #[test]
    fn test_forest_is_reproducible() {
        let rows: Vec<Vec<f64>> = (0..30).map(|i| vec![i as f64, (i * 7 % 5) as f64]).collect();
        let labels: Vec<u8> = (0..30).map(|i| u8::from(i % 2 == 0)).collect();
        let p = CartParams { max_features: MaxFeatures::Sqrt, ..params() };
        let first = fit_forest(&rows, &labels, 4, &p, 11).unwrap();
        let second = fit_forest(&rows, &labels, 4, &p, 11).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), 4);
    }
}
