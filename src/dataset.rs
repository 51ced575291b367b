//! Tabular training data: named numeric feature columns plus a binary
//! keep/discard label.
//!
//! Loading is CSV based. The restart-type column is categorical in the logs
//! and is mapped to integers here, before any modelling. Columns that are not
//! numeric (file names and the like) are skipped.

use std::fmt;
use std::path::Path;

use csv::ReaderBuilder;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rustc_hash::FxHashMap;
use tracing::{debug, warn};

use crate::config::RESTART_TYPES;
use crate::error::DatasetError;

/// A value that is not finite or does not fit the host's `float` range.
#[derive(Debug, Clone, PartialEq)]
pub struct ValueIssue {
    pub row: usize,
    pub column: String,
    pub value: f64,
}

impl fmt::Display for ValueIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "row {}: issue with data for feature {}: {}", self.row, self.column, self.value)
    }
}

/// Column-major feature matrix with labels.
#[derive(Debug, Clone)]
pub struct Dataset {
    names: Vec<String>,
    index: FxHashMap<String, usize>,
    columns: Vec<Vec<f64>>,
    labels: Vec<u8>,
}

impl Dataset {
    /// Builds a dataset from named columns and labels (0 = discard, 1 = keep).
    pub fn new(names: Vec<String>, columns: Vec<Vec<f64>>, labels: Vec<u8>) -> Result<Self, DatasetError> {
        if names.len() != columns.len() {
            return Err(DatasetError::RaggedRow { row: 0, expected: names.len(), got: columns.len() });
        }
        if labels.is_empty() {
            return Err(DatasetError::Empty);
        }
        for (i, column) in columns.iter().enumerate() {
            if column.len() != labels.len() {
                return Err(DatasetError::RaggedRow { row: i, expected: labels.len(), got: column.len() });
            }
        }
        if let Some(&bad) = labels.iter().find(|&&l| l > 1) {
            return Err(DatasetError::NotBinary(bad as usize + 1));
        }
        let index = names.iter().enumerate().map(|(i, n)| (n.clone(), i)).collect();
        Ok(Dataset { names, index, columns, labels })
    }

    /// Loads a CSV file with a header row.
    ///
    /// # Arguments
    /// * `label_column` - binary label; `0`/`1` values are taken as-is, any other
    ///   two-valued labels are ordered lexicographically.
    /// * `restart_column` - categorical restart type, mapped through `RESTART_TYPES`.
    ///   It may be absent.
    pub fn from_csv<P: AsRef<Path>>(path: P, label_column: &str, restart_column: &str) -> Result<Self, DatasetError> {
        let path = path.as_ref();
        let read_err = |source: csv::Error| DatasetError::Read { path: path.to_path_buf(), source };

        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_path(path)
            .map_err(read_err)?;
        let headers: Vec<String> = reader.headers().map_err(read_err)?.iter().map(str::to_string).collect();
        let label_idx = headers
            .iter()
            .position(|h| h == label_column)
            .ok_or_else(|| DatasetError::MissingColumn(label_column.to_string()))?;

        let mut raw: Vec<Vec<String>> = vec![Vec::new(); headers.len()];
        for (row, record) in reader.records().enumerate() {
            let record = record.map_err(read_err)?;
            if record.len() != headers.len() {
                return Err(DatasetError::RaggedRow { row, expected: headers.len(), got: record.len() });
            }
            for (column, field) in raw.iter_mut().zip(record.iter()) {
                column.push(field.to_string());
            }
        }
        if raw[label_idx].is_empty() {
            return Err(DatasetError::Empty);
        }

        let labels = encode_labels(&raw[label_idx])?;
        let mut names = Vec::new();
        let mut columns = Vec::new();
        for (idx, (name, values)) in headers.iter().zip(raw).enumerate() {
            if idx == label_idx {
                continue;
            }
            if name == restart_column {
                columns.push(encode_restart_types(&values)?);
                names.push(name.clone());
                continue;
            }
            match parse_numeric(&values) {
                Some(parsed) => {
                    columns.push(parsed);
                    names.push(name.clone());
                }
                None => warn!("[DATA] Skipping non-numeric column '{}'", name),
            }
        }
        debug!("[DATA] Loaded {} rows, {} numeric columns from {:?}", labels.len(), names.len(), path);
        Dataset::new(names, columns, labels)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn feature_names(&self) -> &[String] {
        &self.names
    }

    pub fn column(&self, name: &str) -> Option<&[f64]> {
        self.index.get(name).map(|&i| self.columns[i].as_slice())
    }

    pub fn labels(&self) -> &[u8] {
        &self.labels
    }

    /// Row-major values of `features` for the given rows.
    pub fn rows(&self, features: &[String], rows: &[usize]) -> Result<Vec<Vec<f64>>, DatasetError> {
        let columns = features
            .iter()
            .map(|name| self.column(name).ok_or_else(|| DatasetError::UnknownFeature(name.clone())))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows
            .iter()
            .map(|&row| columns.iter().map(|column| column[row]).collect())
            .collect())
    }

    pub fn labels_at(&self, rows: &[usize]) -> Vec<u8> {
        rows.iter().map(|&row| self.labels[row]).collect()
    }

    /// A new dataset holding only `rows`, in the given order.
    pub fn subset(&self, rows: &[usize]) -> Dataset {
        Dataset {
            names: self.names.clone(),
            index: self.index.clone(),
            columns: self
                .columns
                .iter()
                .map(|column| rows.iter().map(|&row| column[row]).collect())
                .collect(),
            labels: self.labels_at(rows),
        }
    }

    /// Every `(row, feature)` whose value is non-finite or exceeds the host's
    /// `float` range. Reporting only; nothing is altered.
    pub fn scan_values(&self) -> Vec<ValueIssue> {
        let mut issues = Vec::new();
        for row in 0..self.len() {
            for (name, column) in self.names.iter().zip(&self.columns) {
                let value = column[row];
                if !value.is_finite() || value.abs() > f32::MAX as f64 {
                    issues.push(ValueIssue { row, column: name.clone(), value });
                }
            }
        }
        issues
    }

    /// Seeded random sample of `ceil(fraction * len)` row indices (at least one).
    pub fn sample_rows(&self, fraction: f64, seed: u64) -> Vec<usize> {
        let mut rows: Vec<usize> = (0..self.len()).collect();
        let mut rng = StdRng::seed_from_u64(seed);
        rows.shuffle(&mut rng);
        let keep = ((fraction * self.len() as f64).ceil() as usize).clamp(1, self.len().max(1));
        rows.truncate(keep);
        rows
    }
}

/// Seeded shuffle-split of `rows` into `(train, test)`. The test side gets
/// `ceil(test_fraction * n)` rows.
pub fn train_test_split(rows: &[usize], test_fraction: f64, seed: u64) -> (Vec<usize>, Vec<usize>) {
    let mut shuffled = rows.to_vec();
    let mut rng = StdRng::seed_from_u64(seed);
    shuffled.shuffle(&mut rng);
    let n_test = ((test_fraction * shuffled.len() as f64).ceil() as usize).min(shuffled.len());
    let train = shuffled.split_off(n_test);
    (train, shuffled)
}

fn parse_numeric(values: &[String]) -> Option<Vec<f64>> {
    values
        .iter()
        .map(|v| if v.is_empty() { Some(f64::NAN) } else { v.parse::<f64>().ok() })
        .collect()
}

fn encode_restart_types(values: &[String]) -> Result<Vec<f64>, DatasetError> {
    values
        .iter()
        .enumerate()
        .map(|(row, value)| {
            RESTART_TYPES
                .iter()
                .find(|(name, _)| name == value)
                .map(|&(_, code)| code)
                .or_else(|| value.parse::<f64>().ok())
                .ok_or_else(|| DatasetError::UnknownRestartType { row, value: value.clone() })
        })
        .collect()
}

fn encode_labels(values: &[String]) -> Result<Vec<u8>, DatasetError> {
    let numeric: Option<Vec<u8>> = values
        .iter()
        .map(|v| match v.parse::<f64>() {
            Ok(x) if x == 0.0 => Some(0),
            Ok(x) if x == 1.0 => Some(1),
            _ => None,
        })
        .collect();
    if let Some(labels) = numeric {
        return Ok(labels);
    }

    let mut classes: Vec<&String> = values.iter().collect();
    classes.sort();
    classes.dedup();
    if classes.len() > 2 {
        return Err(DatasetError::NotBinary(classes.len()));
    }
    Ok(values
        .iter()
        .map(|v| if classes.len() == 2 && v == classes[1] { 1 } else { 0 })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_test_csv() -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "fname,cl.size,cl.cur_restart_type,cl.glue,x.class").unwrap();
        writeln!(file, "a.cnf,10,luby,3,1").unwrap();
        writeln!(file, "b.cnf,20,glue,inf,0").unwrap();
        writeln!(file, "c.cnf,30,geom,,1").unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_load_csv_maps_restart_types_and_skips_text() {
        let file = create_test_csv();
        let dataset = Dataset::from_csv(file.path(), "x.class", "cl.cur_restart_type").unwrap();

        assert_eq!(dataset.len(), 3);
        assert_eq!(dataset.feature_names(), &["cl.size", "cl.cur_restart_type", "cl.glue"]);
        assert_eq!(dataset.column("cl.cur_restart_type").unwrap(), &[0.0, 1.0, 2.0]);
        assert_eq!(dataset.labels(), &[1, 0, 1]);
        assert!(dataset.column("fname").is_none());
    }

    #[test]
    fn test_scan_values_reports_every_issue() {
        let file = create_test_csv();
        let dataset = Dataset::from_csv(file.path(), "x.class", "cl.cur_restart_type").unwrap();
        let issues = dataset.scan_values();

        assert_eq!(issues.len(), 2);
        assert_eq!((issues[0].row, issues[0].column.as_str()), (1, "cl.glue"));
        assert_eq!((issues[1].row, issues[1].column.as_str()), (2, "cl.glue"));
        assert!(issues[1].value.is_nan());
    }

    #[test]
    fn test_unknown_restart_type() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "cl.cur_restart_type,x.class\nfixed,1").unwrap();
        let err = Dataset::from_csv(file.path(), "x.class", "cl.cur_restart_type").unwrap_err();
        assert!(matches!(err, DatasetError::UnknownRestartType { row: 0, .. }));
    }

    #[test]
    fn test_string_labels_are_ordered() {
        let labels = encode_labels(&["throw".into(), "keep".into(), "throw".into()]).unwrap();
        assert_eq!(labels, vec![1, 0, 1]);
        assert!(matches!(
            encode_labels(&["a".into(), "b".into(), "c".into()]),
            Err(DatasetError::NotBinary(3))
        ));
    }

    #[test]
    fn test_rows_subset_and_split() {
        let dataset = Dataset::new(
            vec!["A".into(), "B".into()],
            vec![vec![1.0, 2.0, 3.0], vec![10.0, 20.0, 30.0]],
            vec![0, 1, 0],
        )
        .unwrap();
        let rows = dataset.rows(&["B".into(), "A".into()], &[2, 0]).unwrap();
        assert_eq!(rows, vec![vec![30.0, 3.0], vec![10.0, 1.0]]);
        assert!(matches!(dataset.rows(&["C".into()], &[0]), Err(DatasetError::UnknownFeature(_))));

        let sub = dataset.subset(&[1]);
        assert_eq!(sub.len(), 1);
        assert_eq!(sub.column("B").unwrap(), &[20.0]);

        let (train, test) = train_test_split(&[0, 1, 2], 0.33, 7);
        assert_eq!(test.len(), 1);
        assert_eq!(train.len(), 2);
        assert_eq!(train_test_split(&[0, 1, 2], 0.33, 7), (train, test));
    }

    #[test]
    fn test_sample_rows_is_seeded() {
        let dataset = Dataset::new(vec!["A".into()], vec![vec![0.0; 10]], vec![0; 10]).unwrap();
        assert_eq!(dataset.sample_rows(0.5, 3).len(), 5);
        assert_eq!(dataset.sample_rows(0.5, 3), dataset.sample_rows(0.5, 3));
        assert_eq!(dataset.sample_rows(0.999, 3).len(), 10);
    }
}
