//! Offline training of clause keep/discard classifiers and their compilation
//! into standalone C++ decision procedures for a SAT solver's clause
//! database reduction.
//!
//! The pieces, bottom-up:
//! - `tree` / `model`: fitted trees in arena form, ensembles, centroids.
//! - `codegen`: tree serializer, ensemble compiler, name resolver, cluster
//!   router and dispatch table emitters.
//! - `select`: greedy forward feature selection.
//! - `fit`: fitting traits plus reference CART/forest/k-means fitters.
//! - `pipeline`: per-cluster training and artifact emission.

pub mod codegen;
pub mod config;
pub mod dataset;
pub mod error;
pub mod export;
pub mod fit;
pub mod metrics;
pub mod model;
pub mod pipeline;
pub mod report;
pub mod select;
pub mod tree;
pub mod utils;

pub use codegen::GeneratedArtifact;
pub use config::{HostBinding, ModelFamily, PipelineConfig};
pub use dataset::Dataset;
pub use error::{CodegenError, ConfigError, DatasetError, FitError, ModelError, PipelineError, SelectError};
pub use model::{Classifier, ClusterModel, FittedEnsemble, FittedModel};
pub use pipeline::{Pipeline, PipelineReport};
pub use tree::FittedTree;
