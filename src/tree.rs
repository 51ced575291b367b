//! Defines the fitted decision tree handed to the compiler: an arena of nodes
//! addressed by integer handles, stored as parallel arrays (structure of
//! arrays) using scikit-learn's sentinel conventions.
//!
//! Trees are read-only once constructed. Construction validates that the
//! arrays describe a finite, rooted, binary tree (node 0 is the root, every
//! node is reached exactly once), so the emitters and predictors below can
//! index without further checks.

use std::fmt::Write as _;

use crate::error::ModelError;

/// Type alias for a node identifier within a `FittedTree`.
pub type NodeId = usize;

/// Number of classes a leaf distribution carries: discard (0) and keep (1).
pub const NUM_CLASSES: usize = 2;

// --- Sklearn-Style Sentinels ---
/// Child index marking a leaf.
pub const CHILD_LEAF_SENTINEL: i64 = -1;
/// Feature index marking a leaf.
pub const FEATURE_LEAF_SENTINEL: i64 = -2;
/// Threshold value marking a leaf.
pub const THRESHOLD_LEAF_SENTINEL: f64 = -2.0;
// --- End Sentinels ---

/// Per-node class counts `[discard, keep]`.
pub type Distribution = [f64; NUM_CLASSES];

/// A fitted binary decision tree in arena form.
///
/// `split_feature` indexes the feature list the tree was fitted on, which is
/// not necessarily the full dataset column set.
#[derive(Debug, Clone, PartialEq)]
pub struct FittedTree {
    // --- SoA Data Storage ---
    features: Vec<i64>,
    thresholds: Vec<f64>,
    left_ids: Vec<i64>,
    right_ids: Vec<i64>,
    distributions: Vec<Distribution>,
}

impl FittedTree {
    /// Builds a tree from scikit-learn style parallel arrays and validates it.
    ///
    /// # Arguments
    /// * `children_left` / `children_right` - child node ids, `-1` for leaves.
    /// * `features` - split feature index, `-2` for leaves.
    /// * `thresholds` - split threshold, `-2.0` for leaves.
    /// * `values` - class distribution per node; must have two entries each.
    pub fn from_arrays(
        children_left: Vec<i64>,
        children_right: Vec<i64>,
        features: Vec<i64>,
        thresholds: Vec<f64>,
        values: Vec<Vec<f64>>,
    ) -> Result<Self, ModelError> {
        let len = features.len();
        if len == 0 {
            return Err(ModelError::EmptyTree);
        }
        if children_left.len() != len
            || children_right.len() != len
            || thresholds.len() != len
            || values.len() != len
        {
            return Err(ModelError::LengthMismatch(format!(
                "left={}, right={}, feature={}, threshold={}, value={}",
                children_left.len(),
                children_right.len(),
                len,
                thresholds.len(),
                values.len()
            )));
        }

        let mut distributions = Vec::with_capacity(len);
        for (node, value) in values.iter().enumerate() {
            if value.len() != NUM_CLASSES {
                return Err(ModelError::NotBinary { node, got: value.len() });
            }
            distributions.push([value[0], value[1]]);
        }

        let tree = FittedTree {
            features,
            thresholds,
            left_ids: children_left,
            right_ids: children_right,
            distributions,
        };
        tree.validate()?;
        Ok(tree)
    }

    /// A tree consisting of a single root leaf.
    pub fn leaf(distribution: Distribution) -> Self {
        FittedTree {
            features: vec![FEATURE_LEAF_SENTINEL],
            thresholds: vec![THRESHOLD_LEAF_SENTINEL],
            left_ids: vec![CHILD_LEAF_SENTINEL],
            right_ids: vec![CHILD_LEAF_SENTINEL],
            distributions: vec![distribution],
        }
    }

    /// Checks the structural invariants: child ranges, leaf/internal
    /// consistency, finite thresholds, and that every node is reached exactly
    /// once from the root.
    fn validate(&self) -> Result<(), ModelError> {
        let len = self.node_count();
        for node in 0..len {
            let (left, right) = (self.left_ids[node], self.right_ids[node]);
            let left_leaf = left == CHILD_LEAF_SENTINEL;
            let right_leaf = right == CHILD_LEAF_SENTINEL;
            if left_leaf != right_leaf {
                return Err(ModelError::HalfLeaf(node));
            }
            if left_leaf {
                continue;
            }
            for child in [left, right] {
                if child < 0 || child as usize >= len {
                    return Err(ModelError::ChildOutOfRange { node, child, len });
                }
            }
            if self.features[node] < 0 {
                return Err(ModelError::LengthMismatch(format!(
                    "internal node {} carries leaf feature sentinel {}",
                    node, self.features[node]
                )));
            }
            let threshold = self.thresholds[node];
            if !threshold.is_finite() {
                return Err(ModelError::NonFiniteThreshold { node, threshold });
            }
        }

        // Every node reached exactly once from the root: rules out cycles and
        // shared subtrees.
        let mut seen = vec![false; len];
        let mut stack: Vec<NodeId> = vec![0];
        while let Some(node) = stack.pop() {
            if seen[node] {
                return Err(ModelError::NotATree { node });
            }
            seen[node] = true;
            if !self.is_leaf(node) {
                stack.push(self.get_false_id(node));
                stack.push(self.get_true_id(node));
            }
        }
        if let Some(orphan) = seen.iter().position(|&s| !s) {
            return Err(ModelError::Unreachable(orphan));
        }
        Ok(())
    }

    // --- SoA Accessor Methods (using sklearn sentinels) ---

    /// Root node id; always 0.
    #[inline(always)]
    pub fn root(&self) -> NodeId {
        0
    }

    /// Checks if the node with the given ID is a leaf.
    #[inline(always)]
    pub fn is_leaf(&self, id: NodeId) -> bool {
        self.left_ids[id] == CHILD_LEAF_SENTINEL
    }

    /// Gets the feature index as usize for internal nodes.
    #[inline(always)]
    pub fn get_feature_usize(&self, id: NodeId) -> usize {
        debug_assert!(!self.is_leaf(id), "Called get_feature_usize on a leaf node");
        self.features[id] as usize
    }

    /// Gets the split threshold. Returns `THRESHOLD_LEAF_SENTINEL` for leaves.
    #[inline(always)]
    pub fn get_threshold(&self, id: NodeId) -> f64 {
        self.thresholds[id]
    }

    /// Child taken when `feature <= threshold`.
    #[inline(always)]
    pub fn get_true_id(&self, id: NodeId) -> NodeId {
        debug_assert!(!self.is_leaf(id), "Called get_true_id on a leaf node");
        self.left_ids[id] as NodeId
    }

    /// Child taken when `feature > threshold`.
    #[inline(always)]
    pub fn get_false_id(&self, id: NodeId) -> NodeId {
        debug_assert!(!self.is_leaf(id), "Called get_false_id on a leaf node");
        self.right_ids[id] as NodeId
    }

    /// Class distribution `[discard, keep]` recorded at the node.
    #[inline(always)]
    pub fn distribution(&self, id: NodeId) -> Distribution {
        self.distributions[id]
    }

    /// Majority class of a leaf. Ties go to the lower class index (discard).
    pub fn leaf_class(&self, id: NodeId) -> u8 {
        let [discard, keep] = self.distributions[id];
        if keep > discard {
            1
        } else {
            0
        }
    }

    /// Number of nodes in the arena.
    #[inline(always)]
    pub fn node_count(&self) -> usize {
        self.features.len()
    }

    /// Number of leaves.
    pub fn leaf_count(&self) -> usize {
        (0..self.node_count()).filter(|&id| self.is_leaf(id)).count()
    }

    /// Largest split feature index used by any internal node.
    pub fn max_feature_index(&self) -> Option<usize> {
        (0..self.node_count())
            .filter(|&id| !self.is_leaf(id))
            .map(|id| self.get_feature_usize(id))
            .max()
    }

    /// Raw parallel arrays, in the order accepted by `from_arrays`.
    pub fn raw_arrays(&self) -> (&[i64], &[i64], &[i64], &[f64], &[Distribution]) {
        (
            &self.left_ids,
            &self.right_ids,
            &self.features,
            &self.thresholds,
            &self.distributions,
        )
    }

    /// Walks the tree for one sample and returns the id of the leaf reached.
    pub fn leaf_for(&self, row: &[f64]) -> NodeId {
        let mut current = self.root();
        while !self.is_leaf(current) {
            let value = row[self.get_feature_usize(current)];
            current = if value <= self.get_threshold(current) {
                self.get_true_id(current)
            } else {
                self.get_false_id(current)
            };
        }
        current
    }

    /// Predicted class for one sample.
    pub fn predict_row(&self, row: &[f64]) -> u8 {
        self.leaf_class(self.leaf_for(row))
    }

    /// Impurity-based (mean decrease in Gini) importances, normalized to sum
    /// to 1. Internal-node distributions are used as sample counts; a tree
    /// whose internal nodes carry no counts yields all zeros.
    pub fn feature_importances(&self, n_features: usize) -> Vec<f64> {
        let mut importances = vec![0.0; n_features];
        for id in 0..self.node_count() {
            if self.is_leaf(id) {
                continue;
            }
            let feature = self.get_feature_usize(id);
            if feature >= n_features {
                continue;
            }
            let (left, right) = (self.get_true_id(id), self.get_false_id(id));
            let weighted = |node: NodeId| {
                let dist = self.distributions[node];
                (dist[0] + dist[1]) * gini(&dist)
            };
            let decrease = weighted(id) - weighted(left) - weighted(right);
            importances[feature] += decrease.max(0.0);
        }
        let total: f64 = importances.iter().sum();
        if total > 0.0 {
            for value in &mut importances {
                *value /= total;
            }
        }
        importances
    }

    /// Human-readable outline of the tree, one node per line.
    pub fn describe(&self, feature_names: &[String]) -> String {
        let mut out = String::new();
        self.describe_node(self.root(), "", feature_names, &mut out);
        out
    }

    fn describe_node(&self, id: NodeId, prefix: &str, names: &[String], out: &mut String) {
        if self.is_leaf(id) {
            let [discard, keep] = self.distributions[id];
            let _ = writeln!(out, "{}Leaf(discard = {}, keep = {}) [ID: {}]", prefix, discard, keep, id);
            return;
        }
        let feature = self.get_feature_usize(id);
        let name = names.get(feature).map(String::as_str).unwrap_or("?");
        let _ = writeln!(
            out,
            "{}Node({} <= {:.4}?) [ID: {}]",
            prefix,
            name,
            self.get_threshold(id),
            id
        );
        self.describe_node(self.get_true_id(id), &format!("{}  |-- True: ", prefix), names, out);
        self.describe_node(self.get_false_id(id), &format!("{}  `-- False:", prefix), names, out);
    }
}

/// Gini impurity of a class distribution.
pub fn gini(distribution: &[f64]) -> f64 {
    let total: f64 = distribution.iter().sum();
    if total <= 0.0 {
        return 0.0;
    }
    1.0 - distribution.iter().map(|&c| (c / total).powi(2)).sum::<f64>()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// `A <= 4.0` with leaves (5, 0) and (0, 5).
    pub(crate) fn single_split_tree() -> FittedTree {
        FittedTree::from_arrays(
            vec![1, -1, -1],
            vec![2, -1, -1],
            vec![0, -2, -2],
            vec![4.0, -2.0, -2.0],
            vec![vec![5.0, 5.0], vec![5.0, 0.0], vec![0.0, 5.0]],
        )
        .expect("valid tree")
    }

    #[test]
    fn test_accessors_follow_sentinels() {
        let tree = single_split_tree();
        assert!(!tree.is_leaf(0));
        assert!(tree.is_leaf(1));
        assert_eq!(tree.raw_arrays().2[1], FEATURE_LEAF_SENTINEL);
        assert_eq!(tree.get_threshold(2), THRESHOLD_LEAF_SENTINEL);
        assert_eq!(tree.get_true_id(0), 1);
        assert_eq!(tree.get_false_id(0), 2);
        assert_eq!(tree.leaf_count(), 2);
        assert_eq!(tree.max_feature_index(), Some(0));
    }

    #[test]
    fn test_predict_row() {
        let tree = single_split_tree();
        assert_eq!(tree.predict_row(&[3.0]), 0);
        assert_eq!(tree.predict_row(&[4.0]), 0); // <= goes left
        assert_eq!(tree.predict_row(&[6.0]), 1);
    }

    #[test]
    fn test_leaf_class_tie_goes_to_discard() {
        let tree = FittedTree::leaf([3.0, 3.0]);
        assert_eq!(tree.leaf_class(0), 0);
        assert_eq!(tree.max_feature_index(), None);
    }

    #[test]
    fn test_rejects_cycle() {
        let err = FittedTree::from_arrays(
            vec![1, 0],
            vec![1, 0],
            vec![0, 0],
            vec![1.0, 1.0],
            vec![vec![1.0, 1.0], vec![1.0, 1.0]],
        )
        .unwrap_err();
        assert!(matches!(err, ModelError::NotATree { .. }));
    }

    #[test]
    fn test_rejects_half_leaf_and_out_of_range() {
        let half = FittedTree::from_arrays(
            vec![1, -1],
            vec![-1, -1],
            vec![0, -2],
            vec![1.0, -2.0],
            vec![vec![1.0, 0.0], vec![1.0, 0.0]],
        );
        assert_eq!(half.unwrap_err(), ModelError::HalfLeaf(0));

        let out_of_range = FittedTree::from_arrays(
            vec![1, -1],
            vec![7, -1],
            vec![0, -2],
            vec![1.0, -2.0],
            vec![vec![1.0, 0.0], vec![1.0, 0.0]],
        );
        assert!(matches!(out_of_range.unwrap_err(), ModelError::ChildOutOfRange { child: 7, .. }));
    }

    #[test]
    fn test_rejects_unreachable_node() {
        let err = FittedTree::from_arrays(
            vec![-1, -1],
            vec![-1, -1],
            vec![-2, -2],
            vec![-2.0, -2.0],
            vec![vec![1.0, 0.0], vec![1.0, 0.0]],
        )
        .unwrap_err();
        assert_eq!(err, ModelError::Unreachable(1));
    }

    #[test]
    fn test_importances_credit_split_feature() {
        let tree = single_split_tree();
        let importances = tree.feature_importances(2);
        assert!((importances[0] - 1.0).abs() < 1e-12);
        assert_eq!(importances[1], 0.0);
    }

    #[test]
    fn test_gini() {
        assert_eq!(gini(&[5.0, 0.0]), 0.0);
        assert!((gini(&[5.0, 5.0]) - 0.5).abs() < 1e-12);
        assert_eq!(gini(&[0.0, 0.0]), 0.0);
    }

    #[test]
    fn test_describe_mentions_feature_names() {
        let tree = single_split_tree();
        let text = tree.describe(&["A".to_string()]);
        assert!(text.starts_with("Node(A <= 4.0000?) [ID: 0]"));
        assert!(text.contains("Leaf(discard = 5, keep = 0) [ID: 1]"));
    }
}
