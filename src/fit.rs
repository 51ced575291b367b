//! Statistical fitting collaborators.
//!
//! The pipeline only talks to the `ModelFitter` and `ClusterFitter` traits.
//! `ReferenceFitter` (Gini CART trees and bagged forests) and `LloydKMeans`
//! are deterministic reference implementations so a run works end to end
//! without an external learning library.

mod cart;
mod kmeans;

pub use cart::{fit_forest, fit_tree, CartParams, MaxFeatures};
pub use kmeans::LloydKMeans;

use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::debug;

use crate::config::{ModelFamily, PipelineConfig, FINAL_FOREST_TREES, RANKING_FOREST_TREES};
use crate::error::FitError;
use crate::model::{Classifier, ClusterModel, FittedModel};

/// What a fitted model will be used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FitPurpose {
    /// Broad forest whose importances rank the candidate features.
    Ranking,
    /// Model of the configured family, used for scoring and emission.
    Final,
}

/// Training data for one fit. `rows[i]` holds the selected features of
/// sample `i` in feature order.
#[derive(Debug, Clone, Copy)]
pub struct FitRequest<'a> {
    pub purpose: FitPurpose,
    pub family: ModelFamily,
    pub rows: &'a [Vec<f64>],
    pub labels: &'a [u8],
    pub seed: u64,
}

/// Fits classifiers. Candidate scoring calls `fit` from several threads.
pub trait ModelFitter: Sync {
    fn fit(&self, request: &FitRequest<'_>) -> Result<Box<dyn Classifier>, FitError>;
}

/// Centroids plus the cluster label of every input point.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterFit {
    pub model: ClusterModel,
    pub labels: Vec<usize>,
}

pub trait ClusterFitter {
    fn fit_clusters(&self, points: &[Vec<f64>], k: usize, seed: u64) -> Result<ClusterFit, FitError>;
}

/// Tree-family fitter built on `cart`.
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceFitter {
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub ranking_trees: usize,
    pub final_forest_trees: usize,
}

impl Default for ReferenceFitter {
    fn default() -> Self {
        ReferenceFitter {
            max_depth: None,
            min_samples_split: crate::config::DEFAULT_MIN_SAMPLES_SPLIT,
            ranking_trees: RANKING_FOREST_TREES,
            final_forest_trees: FINAL_FOREST_TREES,
        }
    }
}

impl ReferenceFitter {
    pub fn from_config(config: &PipelineConfig) -> Self {
        ReferenceFitter {
            max_depth: config.tree_depth,
            min_samples_split: config.min_samples_split,
            ..ReferenceFitter::default()
        }
    }

    /// Forests grow unlimited-depth trees whose leaves hold at least
    /// `min_samples_split` samples.
    fn forest_params(&self) -> CartParams {
        CartParams {
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: self.min_samples_split.max(1),
            max_features: MaxFeatures::Sqrt,
        }
    }

    fn tree_params(&self) -> CartParams {
        CartParams {
            max_depth: self.max_depth,
            min_samples_split: self.min_samples_split.max(2),
            min_samples_leaf: 1,
            max_features: MaxFeatures::All,
        }
    }
}

impl ModelFitter for ReferenceFitter {
    fn fit(&self, request: &FitRequest<'_>) -> Result<Box<dyn Classifier>, FitError> {
        if request.rows.is_empty() {
            return Err(FitError::EmptyTrainingSet);
        }
        let model = match (request.purpose, request.family) {
            (FitPurpose::Ranking, _) => FittedModel::Ensemble(fit_forest(
                request.rows,
                request.labels,
                self.ranking_trees,
                &self.forest_params(),
                request.seed,
            )?),
            (FitPurpose::Final, ModelFamily::Forest) => FittedModel::Ensemble(fit_forest(
                request.rows,
                request.labels,
                self.final_forest_trees,
                &self.forest_params(),
                request.seed,
            )?),
            (FitPurpose::Final, ModelFamily::Tree) => {
                let samples = (0..request.rows.len()).collect();
                let mut rng = StdRng::seed_from_u64(request.seed);
                FittedModel::SingleTree(fit_tree(
                    request.rows,
                    request.labels,
                    samples,
                    &self.tree_params(),
                    &mut rng,
                )?)
            }
            (FitPurpose::Final, family) => return Err(FitError::UnsupportedFamily(family.to_string())),
        };
        debug!(
            "Fitted {:?} {} model: {} tree(s) on {} rows",
            request.purpose,
            request.family,
            model.member_count(),
            request.rows.len()
        );
        Ok(Box::new(model))
    }
}
