//! keepgen CLI
//!
//! Trains per-cluster clause keep/discard models and compiles them, or
//! compiles pre-fitted models and centroids, into C++ headers.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use keepgen::codegen::{compile_clusters, compile_model};
use keepgen::config::{
    CodegenTarget, HostBinding, ModelFamily, PipelineConfig, BASE_SEED, DEFAULT_CLUSTERS, DEFAULT_FINAL_FEATURES,
    DEFAULT_GREEDY_TARGET, DEFAULT_MIN_SAMPLES_SPLIT, DEFAULT_SAMPLE_FRACTION, DEFAULT_TOP_FEATURES, LABEL_COLUMN,
    RESTART_TYPE_COLUMN,
};
use keepgen::error::ConfigError;
use keepgen::export::export_model_to_json;
use keepgen::fit::{LloydKMeans, ReferenceFitter};
use keepgen::model::{load_clusters_json, load_model_json};
use keepgen::report::{format_confusion, format_summary};
use keepgen::{Dataset, Pipeline};

#[derive(Parser, Debug)]
#[command(name = "keepgen")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Trains clause keep/discard predictors and compiles them to C++", long_about = None)]
struct Cli {
    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Cluster, select features, train and (with --code) emit headers
    Train(TrainArgs),
    /// Compile a pre-fitted tree or ensemble (JSON) into a header
    Compile(CompileArgs),
    /// Compile pre-fitted centroids (JSON) into a router header
    Clusters(ClustersArgs),
}

#[derive(Args, Debug)]
struct TrainArgs {
    /// Input CSV dataset
    data: Option<PathBuf>,

    /// Emit headers using this base name
    #[arg(long = "code")]
    base_name: Option<String>,

    /// Output directory for generated headers
    #[arg(long, default_value = ".")]
    out: PathBuf,

    /// Number of clusters
    #[arg(long, default_value_t = DEFAULT_CLUSTERS)]
    clusters: usize,

    /// Number of features the greedy search should select
    #[arg(long, default_value_t = DEFAULT_GREEDY_TARGET)]
    greedybest: usize,

    /// Size of the candidate pool taken from the importance ranking
    #[arg(long, default_value_t = DEFAULT_TOP_FEATURES)]
    top: usize,

    /// Maximum tree depth
    #[arg(long)]
    depth: Option<usize>,

    /// Minimum samples to split a node (leaf size for forests)
    #[arg(long, default_value_t = DEFAULT_MIN_SAMPLES_SPLIT)]
    split: usize,

    /// Share of the dataset to use
    #[arg(long, default_value_t = DEFAULT_SAMPLE_FRACTION)]
    only: f64,

    /// Skip the search and use the built-in final feature list
    #[arg(long = "final")]
    only_final: bool,

    /// Skip the search and use exactly these features
    #[arg(long, value_delimiter = ',')]
    features: Option<Vec<String>>,

    /// Drop second-generation (rdb1) statistics
    #[arg(long)]
    nordb1: bool,

    /// Report non-finite or out-of-range values
    #[arg(long)]
    check: bool,

    /// Print confusion matrices
    #[arg(long)]
    conf: bool,

    /// Write the final tree(s) as Graphviz DOT
    #[arg(long)]
    dot: Option<PathBuf>,

    /// Write every scored trial of the feature search as CSV
    #[arg(long)]
    trace: Option<PathBuf>,

    /// Save each cluster's final model as JSON into this directory
    #[arg(long)]
    save_models: Option<PathBuf>,

    #[arg(long, default_value_t = BASE_SEED)]
    seed: u64,

    /// Label column
    #[arg(long, default_value = LABEL_COLUMN)]
    label: String,

    /// Final model is a single decision tree
    #[arg(long)]
    tree: bool,

    /// Final model is a random forest
    #[arg(long)]
    forest: bool,

    /// Final model is a bagged SVM (not compilable)
    #[arg(long)]
    svm: bool,

    /// Final model is logistic regression (not compilable)
    #[arg(long)]
    lreg: bool,
}

#[derive(Args, Debug)]
struct CompileArgs {
    /// Model JSON (single tree or {"estimators": [...]})
    #[arg(long)]
    model: PathBuf,

    /// Feature names in model column order
    #[arg(long, value_delimiter = ',', required = true)]
    features: Vec<String>,

    /// Base name of the function and file
    #[arg(long = "code")]
    base_name: String,

    #[arg(long, default_value = ".")]
    out: PathBuf,
}

#[derive(Args, Debug)]
struct ClustersArgs {
    /// Centroid JSON ({"centers": [[..]], "feature_names": [..]})
    #[arg(long)]
    centers: PathBuf,

    #[arg(long = "code")]
    base_name: String,

    #[arg(long, default_value = ".")]
    out: PathBuf,
}

impl TrainArgs {
    fn to_config(&self) -> Result<PipelineConfig, ConfigError> {
        let family = ModelFamily::from_flags(self.tree, self.forest, self.svm, self.lreg)?;
        let fixed_features = match (&self.features, self.only_final) {
            (Some(list), _) => Some(list.clone()),
            (None, true) => Some(DEFAULT_FINAL_FEATURES.iter().map(|s| s.to_string()).collect()),
            (None, false) => None,
        };
        let config = PipelineConfig {
            clusters: self.clusters,
            greedy_target: self.greedybest,
            top_features: self.top,
            tree_depth: self.depth,
            min_samples_split: self.split,
            sample_fraction: self.only,
            seed: self.seed,
            family,
            fixed_features,
            no_rdb1: self.nordb1,
            check_values: self.check,
            confusion: self.conf,
            codegen: self
                .base_name
                .as_ref()
                .map(|base_name| CodegenTarget { base_name: base_name.clone(), out_dir: self.out.clone() }),
            dot_path: self.dot.clone(),
            trace_path: self.trace.clone(),
            label_column: self.label.clone(),
            restart_column: RESTART_TYPE_COLUMN.to_string(),
            ..PipelineConfig::default()
        };
        config.validate()?;
        Ok(config)
    }
}

fn train(args: TrainArgs) -> Result<()> {
    let data_path = args.data.clone().ok_or(ConfigError::MissingDataset)?;
    let config = args.to_config().context("Invalid configuration")?;

    info!("Loading dataset from: {}", data_path.display());
    let dataset = Dataset::from_csv(&data_path, &config.label_column, &config.restart_column)
        .context("Failed to load dataset")?;
    info!("Loaded {} samples with {} columns", dataset.len(), dataset.feature_names().len());

    let fitter = ReferenceFitter::from_config(&config);
    let cluster_fitter = LloydKMeans::default();
    let show_confusion = config.confusion;
    let report = Pipeline::new(config, &fitter, &cluster_fitter)
        .run(&dataset)
        .context("Training run failed")?;

    println!("{}", format_summary(&report));
    if show_confusion {
        for cluster in &report.clusters {
            if let (Some(test), Some(train)) = (&cluster.confusion_test, &cluster.confusion_train) {
                println!("{}", format_confusion(&format!("cluster {} test", cluster.cluster), test));
                println!("{}", format_confusion(&format!("cluster {} train", cluster.cluster), train));
            }
        }
    }

    if let Some(dir) = &args.save_models {
        std::fs::create_dir_all(dir).context("Failed to create model directory")?;
        for cluster in &report.clusters {
            if let Some(model) = &cluster.model {
                let path = dir.join(format!("model_{}.json", cluster.cluster));
                export_model_to_json(model, &path).with_context(|| format!("Failed to write {}", path.display()))?;
                info!("Saved model to: {}", path.display());
            }
        }
    }

    for path in &report.written {
        info!("Wrote {}", path.display());
    }
    Ok(())
}

fn compile(args: CompileArgs) -> Result<()> {
    let model = load_model_json(&args.model).context("Failed to load model")?;
    let artifact = compile_model(&model, &args.features, &args.base_name, &HostBinding::default())
        .context("Failed to compile model")?;
    std::fs::create_dir_all(&args.out).context("Failed to create output directory")?;
    let path = artifact.write_to(&args.out)?;
    info!("Wrote {} ({} member tree(s))", path.display(), model.member_count());
    Ok(())
}

fn clusters(args: ClustersArgs) -> Result<()> {
    let (model, names) = load_clusters_json(&args.centers).context("Failed to load centroids")?;
    let artifact = compile_clusters(&model, &names, model.k(), &args.base_name, &HostBinding::default())
        .context("Failed to compile centroids")?;
    std::fs::create_dir_all(&args.out).context("Failed to create output directory")?;
    let path = artifact.write_to(&args.out)?;
    info!("Wrote {} ({} centers)", path.display(), model.k());
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("Failed to set tracing subscriber")?;

    info!("keepgen v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Command::Train(args) => train(args),
        Command::Compile(args) => compile(args),
        Command::Clusters(args) => clusters(args),
    }
}
