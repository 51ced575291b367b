//! Cluster-partitioned training and compilation.
//!
//! A run clusters the dataset on problem-shape features, trains one model per
//! cluster (feature search, final fit, scoring) and, when an output base name
//! is configured, emits the router, one predictor per cluster and the
//! dispatch table. All artifacts are built first and written at the end.

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::codegen::ensemble::compile_predictor;
use crate::codegen::{compile_clusters, compile_dispatch, GeneratedArtifact};
use crate::config::{
    PipelineConfig, EXCLUDED_COLUMN_MARKERS, NO_RDB1_MARKERS, SHAPE_FEATURE_EXCLUDED, SHAPE_FEATURE_MARKER,
    SUPERSEDED_GENERATION_MARKERS,
};
use crate::dataset::{train_test_split, Dataset};
use crate::error::{FitError, PipelineError};
use crate::export::export_tree_to_dot;
use crate::fit::{ClusterFitter, FitPurpose, FitRequest, ModelFitter};
use crate::metrics::{confusion_matrix, ConfusionMatrix, Scores};
use crate::model::{Classifier, ClusterModel, FittedModel};
use crate::report::{format_ranking, write_selection_trace};
use crate::select::{CandidateScorer, FeatureRanking, GreedySelector, Selection};

// --- Feature Filtering ---

/// Decides which dataset columns may become model inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FeatureFilter {
    pub no_rdb1: bool,
}

impl FeatureFilter {
    pub fn from_config(config: &PipelineConfig) -> Self {
        FeatureFilter { no_rdb1: config.no_rdb1 }
    }

    fn drops_rdb1(&self, name: &str) -> bool {
        self.no_rdb1 && NO_RDB1_MARKERS.iter().any(|m| name.contains(m))
    }

    /// Bookkeeping columns, superseded clause generations, shape features and
    /// (with `no_rdb1`) second-generation statistics are never candidates.
    pub fn is_candidate(&self, name: &str) -> bool {
        !(EXCLUDED_COLUMN_MARKERS.iter().any(|m| name.contains(m))
            || SUPERSEDED_GENERATION_MARKERS.iter().any(|m| name.contains(m))
            || name.contains(SHAPE_FEATURE_MARKER)
            || self.drops_rdb1(name))
    }

    pub fn candidate_features(&self, names: &[String]) -> Vec<String> {
        names.iter().filter(|n| self.is_candidate(n)).cloned().collect()
    }

    /// Problem-shape columns used for cluster routing, in dataset order.
    pub fn shape_features(&self, names: &[String]) -> Vec<String> {
        names
            .iter()
            .filter(|n| n.contains(SHAPE_FEATURE_MARKER) && !SHAPE_FEATURE_EXCLUDED.contains(&n.as_str()))
            .cloned()
            .collect()
    }

    /// A fixed final list, minus the second-generation features when those
    /// are dropped.
    pub fn fixed_features(&self, list: &[String]) -> Vec<String> {
        list.iter().filter(|n| !self.drops_rdb1(n)).cloned().collect()
    }
}

// --- Reports ---

/// Outcome of one cluster's training.
pub struct ClusterReport {
    pub cluster: usize,
    pub rows: usize,
    pub features: Vec<String>,
    pub ranking: Option<FeatureRanking>,
    pub selection: Option<Selection>,
    pub test: Scores,
    pub train: Scores,
    pub confusion_test: Option<ConfusionMatrix>,
    pub confusion_train: Option<ConfusionMatrix>,
    /// Tree form of the final model, when it has one.
    pub model: Option<FittedModel>,
}

/// Outcome of a whole run.
pub struct PipelineReport {
    pub clusters: Vec<ClusterReport>,
    pub cluster_model: ClusterModel,
    pub shape_features: Vec<String>,
    pub value_issues: usize,
    /// Paths of every file written, in write order.
    pub written: Vec<PathBuf>,
}

// --- Candidate Scoring ---

/// Fits the final model family on the training rows of one cluster and
/// scores it on the held-out rows.
struct HoldoutScorer<'a> {
    dataset: &'a Dataset,
    train: &'a [usize],
    test: &'a [usize],
    fitter: &'a dyn ModelFitter,
    config: &'a PipelineConfig,
    seed: u64,
}

impl HoldoutScorer<'_> {
    fn rows(&self, features: &[String], rows: &[usize]) -> Result<Vec<Vec<f64>>, FitError> {
        self.dataset.rows(features, rows).map_err(|_| {
            let missing = features.iter().find(|f| self.dataset.column(f).is_none());
            FitError::UnknownFeature(missing.cloned().unwrap_or_default())
        })
    }

    fn fit(&self, features: &[String]) -> Result<Box<dyn Classifier>, FitError> {
        let rows = self.rows(features, self.train)?;
        let labels = self.dataset.labels_at(self.train);
        self.fitter.fit(&FitRequest {
            purpose: FitPurpose::Final,
            family: self.config.family,
            rows: &rows,
            labels: &labels,
            seed: self.seed,
        })
    }

    /// Scores of `model` on the held-out and the training rows.
    fn evaluate(&self, model: &dyn Classifier, features: &[String]) -> Result<(Scores, Scores, [Vec<u8>; 2]), FitError> {
        let test_truth = self.dataset.labels_at(self.test);
        let test_pred = model.predict(&self.rows(features, self.test)?);
        let train_truth = self.dataset.labels_at(self.train);
        let train_pred = model.predict(&self.rows(features, self.train)?);
        Ok((
            Scores::compute(&test_truth, &test_pred),
            Scores::compute(&train_truth, &train_pred),
            [test_pred, train_pred],
        ))
    }
}

impl CandidateScorer for HoldoutScorer<'_> {
    fn score(&self, features: &[String]) -> Result<f64, FitError> {
        let model = self.fit(features)?;
        let test_truth = self.dataset.labels_at(self.test);
        let predicted = model.predict(&self.rows(features, self.test)?);
        let scores = Scores::compute(&test_truth, &predicted);
        debug!(
            "[SELECT] {:?}: prec {:.4} recall {:.4} accuracy {:.4}",
            features, scores.precision, scores.recall, scores.accuracy
        );
        Ok(scores.sum())
    }
}

// --- Orchestration ---

pub struct Pipeline<'a> {
    config: PipelineConfig,
    fitter: &'a dyn ModelFitter,
    cluster_fitter: &'a dyn ClusterFitter,
}

impl<'a> Pipeline<'a> {
    pub fn new(config: PipelineConfig, fitter: &'a dyn ModelFitter, cluster_fitter: &'a dyn ClusterFitter) -> Self {
        Pipeline { config, fitter, cluster_fitter }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Runs clustering, per-cluster training and (optionally) code generation.
    ///
    /// # Returns
    /// The per-cluster reports and the list of written files. Nothing is
    /// written when no output base name is configured.
    pub fn run(&self, dataset: &Dataset) -> Result<PipelineReport, PipelineError> {
        let config = &self.config;
        config.validate()?;

        let mut value_issues = 0;
        if config.check_values {
            let issues = dataset.scan_values();
            for issue in &issues {
                warn!("[DATA] {}", issue);
            }
            info!("[DATA] Value check found {} issue(s)", issues.len());
            value_issues = issues.len();
        }

        let sampled = dataset.sample_rows(config.sample_fraction, config.seed);
        let data = dataset.subset(&sampled);
        info!("[DATA] Using {} of {} samples", data.len(), dataset.len());

        let filter = FeatureFilter::from_config(config);
        let candidates = filter.candidate_features(data.feature_names());
        let shape = filter.shape_features(data.feature_names());
        debug!("[DATA] {} candidate features, {} shape features", candidates.len(), shape.len());
        if shape.is_empty() && config.clusters > 1 {
            warn!("[CLUSTER] No shape features found; every sample lands in one cluster");
        }

        // --- Clustering ---
        let all_rows: Vec<usize> = (0..data.len()).collect();
        let points = data.rows(&shape, &all_rows)?;
        let clustering = self.cluster_fitter.fit_clusters(&points, config.clusters, config.seed)?;
        let mut members: Vec<Vec<usize>> = vec![Vec::new(); config.clusters];
        for (row, &label) in clustering.labels.iter().enumerate() {
            let rows = members
                .get_mut(label)
                .ok_or(FitError::ClusterLabelOutOfRange { row, label, k: config.clusters })?;
            rows.push(row);
        }
        for (cluster, rows) in members.iter().enumerate() {
            info!("[CLUSTER] Cluster {}: {} samples", cluster, rows.len());
        }

        let mut reports = Vec::with_capacity(config.clusters);
        for (cluster, rows) in members.iter().enumerate() {
            if rows.is_empty() {
                return Err(PipelineError::EmptyCluster(cluster));
            }
            reports.push(self.train_cluster(&data, cluster, rows, &candidates, &filter)?);
        }

        // --- Artifacts ---
        let mut written = Vec::new();
        if let Some(target) = &config.codegen {
            let artifacts = self.build_artifacts(&reports, &clustering.model, &shape, &target.base_name)?;
            std::fs::create_dir_all(&target.out_dir)?;
            for artifact in &artifacts {
                let path = artifact.write_to(&target.out_dir)?;
                info!("[CODEGEN] Wrote {:?}", path);
                written.push(path);
            }
        }

        if let Some(dot_path) = &config.dot_path {
            for report in &reports {
                if let Some(model) = &report.model {
                    let path = indexed_path(dot_path, report.cluster, reports.len());
                    export_tree_to_dot(&model.trees()[0], &report.features, &path)?;
                    written.push(path);
                }
            }
        }

        if let Some(trace_path) = &config.trace_path {
            write_selection_trace(trace_path, &reports)?;
            written.push(trace_path.clone());
        }

        Ok(PipelineReport {
            clusters: reports,
            cluster_model: clustering.model,
            shape_features: shape,
            value_issues,
            written,
        })
    }

    fn train_cluster(
        &self,
        data: &Dataset,
        cluster: usize,
        rows: &[usize],
        candidates: &[String],
        filter: &FeatureFilter,
    ) -> Result<ClusterReport, PipelineError> {
        let config = &self.config;
        let seed = config.seed.wrapping_add(cluster as u64);
        let (train, test) = train_test_split(rows, config.test_fraction, seed);
        info!(
            "================ cluster {} ({} train / {} test samples) ================",
            cluster,
            train.len(),
            test.len()
        );

        let scorer = HoldoutScorer { dataset: data, train: &train, test: &test, fitter: self.fitter, config, seed };

        let (features, ranking, selection) = match &config.fixed_features {
            Some(list) => (filter.fixed_features(list), None, None),
            None => {
                let ranking = self.rank_features(data, &train, candidates, seed)?;
                for line in format_ranking(&ranking).lines() {
                    info!("{}", line);
                }
                let selection = GreedySelector::new(config.greedy_target).run(&ranking.pool(), &scorer)?;
                (selection.chosen.clone(), Some(ranking), Some(selection))
            }
        };

        let model = scorer.fit(&features)?;
        let (test_scores, train_scores, [test_pred, train_pred]) = scorer.evaluate(model.as_ref(), &features)?;
        info!(
            "[CLUSTER {}] test prec : {:.4}  recall: {:.4} accuracy: {:.4}",
            cluster, test_scores.precision, test_scores.recall, test_scores.accuracy
        );
        info!(
            "[CLUSTER {}] train prec: {:.4}  recall: {:.4} accuracy: {:.4}",
            cluster, train_scores.precision, train_scores.recall, train_scores.accuracy
        );

        if let Some(tree) = model.compiled_form().and_then(|m| m.trees().first()) {
            debug!("[CLUSTER {}] final tree:\n{}", cluster, tree.describe(&features));
        }

        let (confusion_test, confusion_train) = if config.confusion {
            (
                Some(confusion_matrix(&data.labels_at(&test), &test_pred)),
                Some(confusion_matrix(&data.labels_at(&train), &train_pred)),
            )
        } else {
            (None, None)
        };

        Ok(ClusterReport {
            cluster,
            rows: rows.len(),
            features,
            ranking,
            selection,
            test: test_scores,
            train: train_scores,
            confusion_test,
            confusion_train,
            model: model.compiled_form().cloned(),
        })
    }

    /// Importance ranking from a broad forest over every candidate feature.
    fn rank_features(
        &self,
        data: &Dataset,
        train: &[usize],
        candidates: &[String],
        seed: u64,
    ) -> Result<FeatureRanking, PipelineError> {
        let rows = data.rows(candidates, train)?;
        let labels = data.labels_at(train);
        let forest = self.fitter.fit(&FitRequest {
            purpose: FitPurpose::Ranking,
            family: self.config.family,
            rows: &rows,
            labels: &labels,
            seed,
        })?;
        let importances = forest
            .feature_importances(candidates.len())
            .unwrap_or_else(|| vec![0.0; candidates.len()]);
        Ok(FeatureRanking::from_importances(candidates, &importances, self.config.top_features))
    }

    /// Router, one predictor per cluster and the dispatch table, in that order.
    fn build_artifacts(
        &self,
        reports: &[ClusterReport],
        cluster_model: &ClusterModel,
        shape: &[String],
        base_name: &str,
    ) -> Result<Vec<GeneratedArtifact>, PipelineError> {
        let host = &self.config.host;
        let router = compile_clusters(cluster_model, shape, self.config.clusters, base_name, host)?;

        let mut predictors = Vec::with_capacity(reports.len());
        for report in reports {
            let model = report.model.as_ref().ok_or(PipelineError::NotCompilable(report.cluster))?;
            predictors.push(compile_predictor(model, &report.features, base_name, report.cluster, host)?);
        }
        let dispatch = compile_dispatch(base_name, &router, &predictors, host)?;

        let mut artifacts = vec![router];
        artifacts.extend(predictors);
        artifacts.push(dispatch);
        Ok(artifacts)
    }
}

/// `tree.dot` for a single cluster, `tree_<c>.dot` otherwise.
fn indexed_path(path: &Path, cluster: usize, clusters: usize) -> PathBuf {
    if clusters <= 1 {
        return path.to_path_buf();
    }
    let stem = path.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
    let name = match path.extension() {
        Some(ext) => format!("{}_{}.{}", stem, cluster, ext.to_string_lossy()),
        None => format!("{}_{}", stem, cluster),
    };
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fit::{ClusterFit, ReferenceFitter};

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_feature_filter() {
        let all = names(&[
            "cl.glue",
            "x.num_used",
            "x.lifetime",
            "rdb0.dump_no",
            "cl2.glue",
            "rdb1.act_ranking",
            "rdb.rel_used_for_uip_creation",
            "szfeat_cur.numVars",
            "szfeat_cur.conflicts",
        ]);
        let filter = FeatureFilter::default();
        assert_eq!(
            filter.candidate_features(&all),
            names(&["cl.glue", "rdb1.act_ranking", "rdb.rel_used_for_uip_creation"])
        );
        assert_eq!(filter.shape_features(&all), names(&["szfeat_cur.numVars"]));

        let filter = FeatureFilter { no_rdb1: true };
        assert_eq!(filter.candidate_features(&all), names(&["cl.glue"]));
        assert_eq!(
            filter.fixed_features(&names(&["cl.size", "rdb1.used_for_uip_creation"])),
            names(&["cl.size"])
        );
    }

    /// Puts every row into cluster `k`, one past the last valid label.
    struct OutOfRangeClusters;

    impl ClusterFitter for OutOfRangeClusters {
        fn fit_clusters(&self, points: &[Vec<f64>], k: usize, _seed: u64) -> Result<ClusterFit, FitError> {
            let model = ClusterModel::new(vec![vec![0.0]; k])?;
            Ok(ClusterFit { model, labels: vec![k; points.len()] })
        }
    }

    #[test]
    fn test_cluster_label_out_of_range_is_an_error() {
        let dataset = Dataset::new(
            names(&["cl.glue", "szfeat_cur.numVars"]),
            vec![vec![1.0, 2.0, 3.0, 4.0], vec![10.0, 10.0, 20.0, 20.0]],
            vec![0, 1, 0, 1],
        )
        .unwrap();
        let config = PipelineConfig { clusters: 2, sample_fraction: 1.0, ..PipelineConfig::default() };
        let fitter = ReferenceFitter::from_config(&config);
        let err = Pipeline::new(config, &fitter, &OutOfRangeClusters).run(&dataset).err().unwrap();
        assert!(matches!(
            err,
            PipelineError::Fit(FitError::ClusterLabelOutOfRange { row: 0, label: 2, k: 2 })
        ));
    }

    #[test]
    fn test_indexed_path() {
        assert_eq!(indexed_path(Path::new("out/tree.dot"), 2, 3), PathBuf::from("out/tree_2.dot"));
        assert_eq!(indexed_path(Path::new("out/tree.dot"), 0, 1), PathBuf::from("out/tree.dot"));
    }
}
