use std::fmt::Write as _;
use std::fs::File;
use std::io;
use std::path::Path;

use csv::WriterBuilder;

use crate::metrics::{normalize_rows, ConfusionMatrix};
use crate::pipeline::{ClusterReport, PipelineReport};
use crate::select::{FeatureRanking, SelectionOutcome};
use crate::utils::mean_std;

const CLASS_NAMES: [&str; 2] = ["discard", "keep"];

/// Numbered importance table, most important feature first.
pub fn format_ranking(ranking: &FeatureRanking) -> String {
    let mut out = String::from("Feature ranking:\n");
    for (position, (name, importance)) in ranking.entries().iter().enumerate() {
        let _ = writeln!(out, "{:<3}  {:<55} -- {:>8.4}", position + 1, name, importance);
    }
    out
}

fn outcome_label(report: &ClusterReport) -> String {
    match report.selection.as_ref().map(|s| s.outcome) {
        None => "fixed".to_string(),
        Some(SelectionOutcome::Complete) => "complete".to_string(),
        Some(SelectionOutcome::PoolExhausted) => "exhausted".to_string(),
        Some(SelectionOutcome::Stalled { round }) => format!("stall@{}", round),
    }
}

/// One row per cluster: size, feature count, how the search ended, and the
/// test/train precision, recall and accuracy.
pub fn format_summary(report: &PipelineReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "\n======== TRAINING SUMMARY ({} clusters) ========", report.clusters.len());
    let _ = writeln!(
        out,
        "Cluster | Samples | Feats | Search    | Test P | Test R | Test A | Train P | Train R | Train A"
    );
    let _ = writeln!(
        out,
        "--------|---------|-------|-----------|--------|--------|--------|---------|---------|--------"
    );
    for cluster in &report.clusters {
        let _ = writeln!(
            out,
            "{:>7} | {:>7} | {:>5} | {:<9} | {:>6.4} | {:>6.4} | {:>6.4} | {:>7.4} | {:>7.4} | {:>7.4}",
            cluster.cluster,
            cluster.rows,
            cluster.features.len(),
            outcome_label(cluster),
            cluster.test.precision,
            cluster.test.recall,
            cluster.test.accuracy,
            cluster.train.precision,
            cluster.train.recall,
            cluster.train.accuracy,
        );
    }
    if report.clusters.len() > 1 {
        let accuracies: Vec<f64> = report.clusters.iter().map(|c| c.test.accuracy).collect();
        let (mean, std) = mean_std(&accuracies);
        let _ = writeln!(out, "Test accuracy across clusters: {:.4} +/- {:.4}", mean, std);
    }
    if report.value_issues > 0 {
        let _ = writeln!(out, "Value check: {} problematic value(s) in the input", report.value_issues);
    }
    let _ = writeln!(out, "==================================================");
    out
}

/// Raw counts followed by the row-normalized matrix.
pub fn format_confusion(title: &str, matrix: &ConfusionMatrix) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Confusion matrix, without normalization -- {}", title);
    let _ = writeln!(out, "{:>10} | {:>8} | {:>8}", "", CLASS_NAMES[0], CLASS_NAMES[1]);
    for (class, row) in matrix.iter().enumerate() {
        let _ = writeln!(out, "{:>10} | {:>8} | {:>8}", CLASS_NAMES[class], row[0], row[1]);
    }
    let _ = writeln!(out, "Normalized confusion matrix -- {}", title);
    for (class, row) in normalize_rows(matrix).iter().enumerate() {
        let _ = writeln!(out, "{:>10} | {:>8.2} | {:>8.2}", CLASS_NAMES[class], row[0], row[1]);
    }
    out
}

/// Writes every scored trial of the greedy search, one row per candidate.
pub fn write_selection_trace(path: &Path, reports: &[ClusterReport]) -> io::Result<()> {
    let file = File::create(path)?;
    let mut wtr = WriterBuilder::new().from_writer(file);
    wtr.write_record(["cluster", "round", "candidate", "score", "winner"])?;

    for report in reports {
        let Some(selection) = &report.selection else {
            continue;
        };
        for round in &selection.rounds {
            for (candidate, score) in &round.candidates {
                let winner = round.winner.as_deref() == Some(candidate.as_str());
                wtr.write_record([
                    report.cluster.to_string(),
                    round.round.to_string(),
                    candidate.clone(),
                    format!("{:.6}", score),
                    winner.to_string(),
                ])?;
            }
        }
    }
    wtr.flush()?;
    Ok(())
}
