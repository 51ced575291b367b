//! Fitted-model family consumed by the compiler and the feature search.
//!
//! The fitting collaborator hands back a `Classifier`; the compiler only ever
//! looks at its `compiled_form`, which is decided once at ingestion as either a
//! single tree or an ensemble of trees.

mod data;

pub use data::{load_clusters_json, load_model_json, ClusterData, ModelData, NodeValues, TreeData};

use crate::codegen::tree::leaf_ratio;
use crate::error::ModelError;
use crate::tree::FittedTree;
use crate::utils::{majority_class, majority_threshold};

/// Capability contract of a fitted model, as seen by the pipeline.
pub trait Classifier: Send + Sync {
    /// Predicted class (0 = discard, 1 = keep) for each row.
    fn predict(&self, rows: &[Vec<f64>]) -> Vec<u8>;

    /// Impurity-based importance per input feature, when the model has one.
    fn feature_importances(&self, n_features: usize) -> Option<Vec<f64>>;

    /// The tree form the compiler can emit, if this model has one.
    fn compiled_form(&self) -> Option<&FittedModel>;
}

/// Ordered, non-empty sequence of trees sharing one feature index space.
#[derive(Debug, Clone, PartialEq)]
pub struct FittedEnsemble {
    members: Vec<FittedTree>,
}

impl FittedEnsemble {
    pub fn new(members: Vec<FittedTree>) -> Result<Self, ModelError> {
        if members.is_empty() {
            return Err(ModelError::EmptyEnsemble);
        }
        Ok(FittedEnsemble { members })
    }

    pub fn members(&self) -> &[FittedTree] {
        &self.members
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Majority vote of the member predictions; ties go to discard.
    pub fn predict_row(&self, row: &[f64]) -> u8 {
        let mut votes = [0u32; 2];
        for member in &self.members {
            votes[member.predict_row(row) as usize] += 1;
        }
        majority_class(&votes) as u8
    }
}

/// A fitted tree model, tagged once at ingestion.
#[derive(Debug, Clone, PartialEq)]
pub enum FittedModel {
    SingleTree(FittedTree),
    Ensemble(FittedEnsemble),
}

impl FittedModel {
    /// Member trees in emission order; a single tree is a one-member list.
    pub fn trees(&self) -> &[FittedTree] {
        match self {
            FittedModel::SingleTree(tree) => std::slice::from_ref(tree),
            FittedModel::Ensemble(ensemble) => ensemble.members(),
        }
    }

    pub fn member_count(&self) -> usize {
        self.trees().len()
    }

    pub fn predict_row(&self, row: &[f64]) -> u8 {
        match self {
            FittedModel::SingleTree(tree) => tree.predict_row(row),
            FittedModel::Ensemble(ensemble) => ensemble.predict_row(row),
        }
    }

    /// Evaluates the keep decision exactly as the emitted tally function does:
    /// one vote per member whose leaf ratio is below 1, keep when the votes
    /// reach `ceil(n / 2)`.
    pub fn compiled_keep(&self, row: &[f64]) -> bool {
        let trees = self.trees();
        let votes = trees
            .iter()
            .filter(|tree| leaf_ratio(tree.distribution(tree.leaf_for(row))) < 1.0)
            .count();
        votes >= majority_threshold(trees.len())
    }
}

impl Classifier for FittedModel {
    fn predict(&self, rows: &[Vec<f64>]) -> Vec<u8> {
        rows.iter().map(|row| self.predict_row(row)).collect()
    }

    fn feature_importances(&self, n_features: usize) -> Option<Vec<f64>> {
        let trees = self.trees();
        let mut mean = vec![0.0; n_features];
        for tree in trees {
            for (acc, value) in mean.iter_mut().zip(tree.feature_importances(n_features)) {
                *acc += value;
            }
        }
        for value in &mut mean {
            *value /= trees.len() as f64;
        }
        Some(mean)
    }

    fn compiled_form(&self) -> Option<&FittedModel> {
        Some(self)
    }
}

/// K centroids over the ordered shape-feature subspace.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterModel {
    centers: Vec<Vec<f64>>,
}

impl ClusterModel {
    /// Validates `K >= 1` and a common dimensionality.
    pub fn new(centers: Vec<Vec<f64>>) -> Result<Self, ModelError> {
        let expected = centers.first().ok_or(ModelError::NoCentroids)?.len();
        for (index, center) in centers.iter().enumerate() {
            if center.len() != expected {
                return Err(ModelError::CentroidDimension { index, expected, got: center.len() });
            }
        }
        Ok(ClusterModel { centers })
    }

    pub fn centers(&self) -> &[Vec<f64>] {
        &self.centers
    }

    pub fn k(&self) -> usize {
        self.centers.len()
    }

    pub fn dimension(&self) -> usize {
        self.centers[0].len()
    }

    /// Index of the nearest centroid by squared Euclidean distance. Linear
    /// scan with strict `<`, so the lower index wins ties.
    ///
    /// `None` when no distance beats `f64::MAX` (a NaN or infinite point),
    /// where the emitted router returns `-1`.
    pub fn which_is_closest(&self, point: &[f64]) -> Option<usize> {
        let mut closest_dist = f64::MAX;
        let mut closest = None;
        for (index, center) in self.centers.iter().enumerate() {
            let dist = squared_distance(center, point);
            if dist < closest_dist {
                closest_dist = dist;
                closest = Some(index);
            }
        }
        closest
    }
}

/// Sum of per-feature squared differences.
pub fn squared_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::tests::single_split_tree;

    #[test]
    fn test_ensemble_tie_goes_to_discard() {
        let keep = FittedTree::leaf([0.0, 4.0]);
        let discard = FittedTree::leaf([4.0, 0.0]);
        let ensemble = FittedEnsemble::new(vec![keep.clone(), discard.clone()]).unwrap();
        assert_eq!(ensemble.predict_row(&[]), 0);

        let ensemble = FittedEnsemble::new(vec![keep.clone(), keep, discard]).unwrap();
        assert_eq!(ensemble.predict_row(&[]), 1);
    }

    #[test]
    fn test_empty_ensemble_rejected() {
        assert_eq!(FittedEnsemble::new(vec![]).unwrap_err(), ModelError::EmptyEnsemble);
    }

    #[test]
    fn test_compiled_keep_uses_ceiling_majority() {
        // With four members, two keep votes already reach ceil(4/2).
        let keep = FittedTree::leaf([0.0, 4.0]);
        let discard = FittedTree::leaf([4.0, 0.0]);
        let model = FittedModel::Ensemble(
            FittedEnsemble::new(vec![keep.clone(), discard.clone(), keep, discard]).unwrap(),
        );
        assert!(model.compiled_keep(&[]));
        assert_eq!(model.predict_row(&[]), 0);
    }

    #[test]
    fn test_single_tree_compiled_keep() {
        let model = FittedModel::SingleTree(single_split_tree());
        assert!(model.compiled_keep(&[6.0]));
        assert!(!model.compiled_keep(&[3.0]));
        assert_eq!(model.member_count(), 1);
    }

    #[test]
    fn test_which_is_closest() {
        let model = ClusterModel::new(vec![vec![0.0], vec![5.0], vec![10.0]]).unwrap();
        assert_eq!(model.which_is_closest(&[5.0]), Some(1));
        assert_eq!(model.which_is_closest(&[2.5]), Some(0)); // equidistant from 0 and 1
        assert_eq!(model.which_is_closest(&[7.5]), Some(1));
        assert_eq!(model.which_is_closest(&[100.0]), Some(2));
        assert_eq!(model.which_is_closest(&[f64::NAN]), None);
    }

    #[test]
    fn test_cluster_model_invariants() {
        assert_eq!(ClusterModel::new(vec![]).unwrap_err(), ModelError::NoCentroids);
        assert_eq!(
            ClusterModel::new(vec![vec![1.0, 2.0], vec![1.0]]).unwrap_err(),
            ModelError::CentroidDimension { index: 1, expected: 2, got: 1 }
        );
    }
}
