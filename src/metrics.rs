//! Classification metrics used to score candidate feature sets and report
//! final models. Precision and recall are macro averaged over the classes
//! present in either the truth or the prediction; undefined ratios count as 0.

use crate::tree::NUM_CLASSES;

/// `matrix[truth][predicted]` sample counts.
pub type ConfusionMatrix = [[u64; NUM_CLASSES]; NUM_CLASSES];

/// Scores of one model on one split.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Scores {
    pub precision: f64,
    pub recall: f64,
    pub accuracy: f64,
}

impl Scores {
    pub fn compute(truth: &[u8], predicted: &[u8]) -> Self {
        let matrix = confusion_matrix(truth, predicted);
        Scores {
            precision: macro_precision(&matrix),
            recall: macro_recall(&matrix),
            accuracy: accuracy(&matrix),
        }
    }

    /// Objective maximised by the greedy feature search.
    pub fn sum(&self) -> f64 {
        self.precision + self.recall + self.accuracy
    }
}

pub fn confusion_matrix(truth: &[u8], predicted: &[u8]) -> ConfusionMatrix {
    let mut matrix = [[0u64; NUM_CLASSES]; NUM_CLASSES];
    for (&t, &p) in truth.iter().zip(predicted) {
        matrix[t as usize][p as usize] += 1;
    }
    matrix
}

/// Each row divided by its total; empty rows stay zero.
pub fn normalize_rows(matrix: &ConfusionMatrix) -> [[f64; NUM_CLASSES]; NUM_CLASSES] {
    let mut out = [[0.0; NUM_CLASSES]; NUM_CLASSES];
    for (row, counts) in matrix.iter().enumerate() {
        let total: u64 = counts.iter().sum();
        if total == 0 {
            continue;
        }
        for (col, &count) in counts.iter().enumerate() {
            out[row][col] = count as f64 / total as f64;
        }
    }
    out
}

pub fn accuracy(matrix: &ConfusionMatrix) -> f64 {
    let total: u64 = matrix.iter().flatten().sum();
    if total == 0 {
        return 0.0;
    }
    let correct: u64 = (0..NUM_CLASSES).map(|c| matrix[c][c]).sum();
    correct as f64 / total as f64
}

fn present_classes(matrix: &ConfusionMatrix) -> Vec<usize> {
    (0..NUM_CLASSES)
        .filter(|&c| (0..NUM_CLASSES).any(|o| matrix[c][o] > 0 || matrix[o][c] > 0))
        .collect()
}

fn ratio(numerator: u64, denominator: u64) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

fn macro_average(matrix: &ConfusionMatrix, per_class: impl Fn(usize) -> f64) -> f64 {
    let classes = present_classes(matrix);
    if classes.is_empty() {
        return 0.0;
    }
    classes.iter().map(|&c| per_class(c)).sum::<f64>() / classes.len() as f64
}

pub fn macro_precision(matrix: &ConfusionMatrix) -> f64 {
    macro_average(matrix, |c| {
        let predicted: u64 = (0..NUM_CLASSES).map(|t| matrix[t][c]).sum();
        ratio(matrix[c][c], predicted)
    })
}

pub fn macro_recall(matrix: &ConfusionMatrix) -> f64 {
    macro_average(matrix, |c| ratio(matrix[c][c], matrix[c].iter().sum()))
}
