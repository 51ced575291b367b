//! Error types for every stage of the train-and-compile run.
//!
//! Configuration and dataset problems are fatal and surface before any model
//! is fitted. Numeric edge cases inside emitted code (empty leaf classes) are
//! never errors; see `codegen::tree`.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Invalid or contradictory run configuration.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("cluster count must be at least 1")]
    ZeroClusters,

    #[error("centroid count {centroids} does not match the configured cluster count {clusters}")]
    ClusterCountMismatch { clusters: usize, centroids: usize },

    #[error("more than one final model family was selected: {0}")]
    ConflictingFamilies(String),

    #[error("model family '{0}' cannot be compiled to source; use --tree or --forest with --code")]
    FamilyNotCompilable(String),

    #[error("greedy target feature count must be at least 1")]
    ZeroTargetFeatures,

    #[error("candidate pool size (--top) must be at least 1")]
    ZeroPoolSize,

    #[error("fraction '{name}' must be in (0, 1], got {value}")]
    FractionOutOfRange { name: &'static str, value: f64 },

    #[error("a fixed final feature list was requested but it is empty")]
    EmptyFixedFeatures,

    #[error("output base name '{0}' is not a valid C identifier fragment")]
    InvalidBaseName(String),

    #[error("no dataset file was given")]
    MissingDataset,
}

/// Problems loading or slicing the tabular dataset.
#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("failed to read dataset {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("missing required column: {0}")]
    MissingColumn(String),

    #[error("label column has {0} distinct values; only binary keep/discard labels are supported")]
    NotBinary(usize),

    #[error("unknown restart type '{value}' at row {row}")]
    UnknownRestartType { row: usize, value: String },

    #[error("row {row} has {got} fields, header has {expected}")]
    RaggedRow { row: usize, expected: usize, got: usize },

    #[error("dataset is empty")]
    Empty,

    #[error("unknown feature column: {0}")]
    UnknownFeature(String),
}

/// Structural problems in a fitted model handed to the compiler.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ModelError {
    #[error("tree has no nodes")]
    EmptyTree,

    #[error("tree arrays disagree in length: {0}")]
    LengthMismatch(String),

    #[error("node {node}: child index {child} is out of range (node count {len})")]
    ChildOutOfRange { node: usize, child: i64, len: usize },

    #[error("node {node} is reachable more than once or the tree contains a cycle")]
    NotATree { node: usize },

    #[error("node {0} is not reachable from the root")]
    Unreachable(usize),

    #[error("node {0} has exactly one child")]
    HalfLeaf(usize),

    #[error("node {node}: threshold {threshold} is not finite")]
    NonFiniteThreshold { node: usize, threshold: f64 },

    #[error("node {node}: expected a two-class distribution, got {got} values")]
    NotBinary { node: usize, got: usize },

    #[error("node {node}: expected a single output, got {got}")]
    MultiOutput { node: usize, got: usize },

    #[error("ensemble has no member trees")]
    EmptyEnsemble,

    #[error("cluster model has no centroids")]
    NoCentroids,

    #[error("centroid {index} has dimension {got}, expected {expected}")]
    CentroidDimension { index: usize, expected: usize, got: usize },

    #[error("failed to read model file {path:?}: {message}")]
    Load { path: PathBuf, message: String },
}

/// Failures reported by a model or cluster fitting collaborator.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FitError {
    #[error("model family '{0}' is not supported by this fitter")]
    UnsupportedFamily(String),

    #[error("cannot fit on an empty training set")]
    EmptyTrainingSet,

    #[error("cannot fit {k} clusters on {rows} rows")]
    TooFewRows { k: usize, rows: usize },

    #[error("training data has no feature named '{0}'")]
    UnknownFeature(String),

    #[error("row {row} was assigned cluster {label}, but only {k} clusters exist")]
    ClusterLabelOutOfRange { row: usize, label: usize, k: usize },

    #[error("fitted model is invalid: {0}")]
    InvalidModel(#[from] ModelError),
}

/// Problems while emitting source text.
#[derive(Debug, Error)]
pub enum CodegenError {
    #[error("split feature index {index} has no name (only {available} feature names given)")]
    FeatureIndexOutOfRange { index: usize, available: usize },

    #[error("shape feature list has {names} names but centroids have dimension {dimension}")]
    ShapeDimension { names: usize, dimension: usize },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to write artifact {path:?}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Failures of the greedy feature search.
#[derive(Debug, Error)]
pub enum SelectError {
    #[error("candidate pool is empty")]
    EmptyPool,

    #[error("scoring feature set {features:?} failed: {source}")]
    Scoring {
        features: Vec<String>,
        #[source]
        source: FitError,
    },
}

/// Umbrella error of a pipeline run.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Dataset(#[from] DatasetError),

    #[error(transparent)]
    Fit(#[from] FitError),

    #[error(transparent)]
    Codegen(#[from] CodegenError),

    #[error(transparent)]
    Select(#[from] SelectError),

    #[error("cluster {0} received no rows")]
    EmptyCluster(usize),

    #[error("final model for cluster {0} has no compilable tree form")]
    NotCompilable(usize),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}
