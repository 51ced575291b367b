use std::fmt;
use std::path::PathBuf;

use crate::error::ConfigError;

// --- Run Defaults ---
// Defaults of the training driver; every one can be overridden on the command line.
pub const DEFAULT_MIN_SAMPLES_SPLIT: usize = 80; // Split size for trees, leaf size for forests
pub const DEFAULT_GREEDY_TARGET: usize = 40; // Features the greedy search should end up with
pub const DEFAULT_TOP_FEATURES: usize = 40; // Candidate pool taken from the importance ranking
pub const DEFAULT_CLUSTERS: usize = 7;
pub const DEFAULT_SAMPLE_FRACTION: f64 = 0.999; // Share of the dataset used at all
pub const TEST_FRACTION: f64 = 0.33; // Held-out share for scoring
pub const BASE_SEED: u64 = 42;
pub const RANKING_FOREST_TREES: usize = 80; // Broad forest used for the importance ranking
pub const FINAL_FOREST_TREES: usize = 5;
pub const KMEANS_MAX_ITERATIONS: usize = 300;

// --- Dataset Layout ---
pub const LABEL_COLUMN: &str = "x.class";
pub const RESTART_TYPE_COLUMN: &str = "cl.cur_restart_type";
/// Restart-type categories and the integers they are mapped to before modelling.
pub const RESTART_TYPES: [(&str, f64); 3] = [("luby", 0.0), ("glue", 1.0), ("geom", 2.0)];

// --- Feature Filtering ---
/// Columns whose names contain one of these never become model inputs.
pub const EXCLUDED_COLUMN_MARKERS: [&str; 5] = ["x.num_used", "x.class", "x.lifetime", "fname", "dump_no"];
/// Dropped with `--nordb1`.
pub const NO_RDB1_MARKERS: [&str; 2] = ["rdb1", "rdb.rel"];
/// Older clause generations superseded by the `cl.` columns.
pub const SUPERSEDED_GENERATION_MARKERS: [&str; 3] = ["cl2", "cl3", "cl4"];
/// Columns describing the whole problem, used only for cluster routing.
pub const SHAPE_FEATURE_MARKER: &str = "szfeat_cur";
pub const SHAPE_FEATURE_EXCLUDED: [&str; 2] = ["szfeat_cur.conflicts", "szfeat_cur.var_cl_ratio"];

/// Final feature list used with `--final` when no explicit list is given.
pub const DEFAULT_FINAL_FEATURES: [&str; 11] = [
    "rdb0.used_for_uip_creation",
    "rdb1.used_for_uip_creation",
    "cl.size",
    "cl.size_rel",
    "cl.glue_rel_long",
    "cl.glue_rel_queue",
    "cl.glue",
    "rdb0.act_ranking_top_10",
    "rdb0.act_ranking",
    "rdb0.last_touched_diff",
    "cl.num_overlap_literals",
];

/// Family of the final per-cluster model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelFamily {
    Tree,
    Forest,
    Svm,
    LogisticRegression,
    /// Majority vote over tree, SVM and logistic regression.
    Vote,
}

impl ModelFamily {
    /// Resolves the mutually exclusive command-line flags. No flag means `Vote`.
    pub fn from_flags(tree: bool, forest: bool, svm: bool, logreg: bool) -> Result<Self, ConfigError> {
        let selected: Vec<ModelFamily> = [
            (tree, ModelFamily::Tree),
            (forest, ModelFamily::Forest),
            (svm, ModelFamily::Svm),
            (logreg, ModelFamily::LogisticRegression),
        ]
        .into_iter()
        .filter_map(|(flag, family)| flag.then_some(family))
        .collect();

        match selected.as_slice() {
            [] => Ok(ModelFamily::Vote),
            [family] => Ok(*family),
            many => Err(ConfigError::ConflictingFamilies(
                many.iter().map(|f| f.to_string()).collect::<Vec<_>>().join(", "),
            )),
        }
    }

    /// Whether models of this family can be emitted as source.
    pub fn is_compilable(self) -> bool {
        matches!(self, ModelFamily::Tree | ModelFamily::Forest)
    }
}

impl fmt::Display for ModelFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelFamily::Tree => write!(f, "tree"),
            ModelFamily::Forest => write!(f, "forest"),
            ModelFamily::Svm => write!(f, "svm"),
            ModelFamily::LogisticRegression => write!(f, "logreg"),
            ModelFamily::Vote => write!(f, "vote"),
        }
    }
}

/// A host-side statistic passed to the generated functions as an argument
/// instead of being read through the clause record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostParam {
    /// Canonical (generation-free) statistic name, e.g. `act_ranking`.
    pub stat: String,
    /// Identifier of the function parameter, e.g. `rdb0_act_ranking`.
    pub ident: String,
}

/// Shape of the code the host program expects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostBinding {
    pub namespace: String,
    pub clause_type: String,
    /// Name of the clause pointer inside generated functions.
    pub clause_var: String,
    /// Accessor expression for the clause's structural size.
    pub size_accessor: String,
    /// Member path of the per-clause statistics record.
    pub stats_member: String,
    pub param_type: String,
    pub params: Vec<HostParam>,
    pub includes: Vec<String>,
    /// Record type holding the shape features used for routing.
    pub shape_record: String,
    pub shape_include: String,
}

impl Default for HostBinding {
    fn default() -> Self {
        let param = |stat: &str| HostParam { stat: stat.to_string(), ident: format!("rdb0_{}", stat) };
        HostBinding {
            namespace: "CMSat".to_string(),
            clause_type: "CMSat::Clause".to_string(),
            clause_var: "cl".to_string(),
            size_accessor: "size()".to_string(),
            stats_member: "stats".to_string(),
            param_type: "uint32_t".to_string(),
            params: vec![param("last_touched_diff"), param("act_ranking"), param("act_ranking_top_10")],
            includes: vec!["clause.h".to_string(), "reducedb.h".to_string()],
            shape_record: "SatZillaFeatures".to_string(),
            shape_include: "satzilla_features.h".to_string(),
        }
    }
}

/// Where and under which name generated headers are written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodegenTarget {
    pub base_name: String,
    pub out_dir: PathBuf,
}

/// Explicit configuration of one train-and-compile run.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub clusters: usize,
    pub greedy_target: usize,
    pub top_features: usize,
    pub tree_depth: Option<usize>,
    pub min_samples_split: usize,
    pub sample_fraction: f64,
    pub test_fraction: f64,
    pub seed: u64,
    pub family: ModelFamily,
    /// Skip the greedy search and use exactly these features.
    pub fixed_features: Option<Vec<String>>,
    pub no_rdb1: bool,
    pub check_values: bool,
    pub confusion: bool,
    pub codegen: Option<CodegenTarget>,
    pub dot_path: Option<PathBuf>,
    pub trace_path: Option<PathBuf>,
    pub label_column: String,
    pub restart_column: String,
    pub host: HostBinding,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            clusters: DEFAULT_CLUSTERS,
            greedy_target: DEFAULT_GREEDY_TARGET,
            top_features: DEFAULT_TOP_FEATURES,
            tree_depth: None,
            min_samples_split: DEFAULT_MIN_SAMPLES_SPLIT,
            sample_fraction: DEFAULT_SAMPLE_FRACTION,
            test_fraction: TEST_FRACTION,
            seed: BASE_SEED,
            family: ModelFamily::Vote,
            fixed_features: None,
            no_rdb1: false,
            check_values: false,
            confusion: false,
            codegen: None,
            dot_path: None,
            trace_path: None,
            label_column: LABEL_COLUMN.to_string(),
            restart_column: RESTART_TYPE_COLUMN.to_string(),
            host: HostBinding::default(),
        }
    }
}

impl PipelineConfig {
    /// Rejects configurations that can never produce a run. Called before
    /// any data is fitted.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.clusters == 0 {
            return Err(ConfigError::ZeroClusters);
        }
        if self.greedy_target == 0 {
            return Err(ConfigError::ZeroTargetFeatures);
        }
        if self.top_features == 0 {
            return Err(ConfigError::ZeroPoolSize);
        }
        for (name, value) in [("only", self.sample_fraction), ("test", self.test_fraction)] {
            if !(value > 0.0 && value <= 1.0) {
                return Err(ConfigError::FractionOutOfRange { name, value });
            }
        }
        if let Some(fixed) = &self.fixed_features {
            if fixed.is_empty() {
                return Err(ConfigError::EmptyFixedFeatures);
            }
        }
        if let Some(target) = &self.codegen {
            validate_base_name(&target.base_name)?;
            if !self.family.is_compilable() {
                return Err(ConfigError::FamilyNotCompilable(self.family.to_string()));
            }
        }
        Ok(())
    }
}

/// Base names end up inside C identifiers and file names.
pub fn validate_base_name(base_name: &str) -> Result<(), ConfigError> {
    if base_name.is_empty() || !base_name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(ConfigError::InvalidBaseName(base_name.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_family_flags() {
        assert_eq!(ModelFamily::from_flags(false, false, false, false), Ok(ModelFamily::Vote));
        assert_eq!(ModelFamily::from_flags(true, false, false, false), Ok(ModelFamily::Tree));
        assert_eq!(
            ModelFamily::from_flags(true, true, false, false),
            Err(ConfigError::ConflictingFamilies("tree, forest".to_string()))
        );
    }

    #[test]
    fn test_validate_rejects_zero_clusters() {
        let config = PipelineConfig { clusters: 0, ..PipelineConfig::default() };
        assert_eq!(config.validate(), Err(ConfigError::ZeroClusters));
    }

    #[test]
    fn test_validate_rejects_uncompilable_family_with_codegen() {
        let config = PipelineConfig {
            family: ModelFamily::Svm,
            codegen: Some(CodegenTarget { base_name: "short".into(), out_dir: PathBuf::from(".") }),
            ..PipelineConfig::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::FamilyNotCompilable("svm".into())));

        let config = PipelineConfig { family: ModelFamily::Forest, ..config };
        assert_eq!(config.validate(), Ok(()));
    }

    #[test]
    fn test_validate_fractions_and_names() {
        let config = PipelineConfig { sample_fraction: 0.0, ..PipelineConfig::default() };
        assert!(matches!(config.validate(), Err(ConfigError::FractionOutOfRange { name: "only", .. })));
        assert!(validate_base_name("long_1").is_ok());
        assert!(validate_base_name("bad-name").is_err());
        assert!(validate_base_name("").is_err());
    }
}
