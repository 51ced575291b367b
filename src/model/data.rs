//! JSON layouts for pre-fitted models and centroids, and their loaders.
//!
//! This module does not have performance critical code. Safety checks are allowed!

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use super::{ClusterModel, FittedEnsemble, FittedModel};
use crate::error::ModelError;
use crate::tree::FittedTree;

/// Per-node class distributions, with or without scikit-learn's output axis.
///
/// `tree_.value.tolist()` gives `[[[c0, c1]]]` per node; exports from this
/// crate drop the single output and write `[[c0, c1]]`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum NodeValues {
    Flat(Vec<Vec<f64>>),
    PerOutput(Vec<Vec<Vec<f64>>>),
}

impl NodeValues {
    fn into_flat(self) -> Result<Vec<Vec<f64>>, ModelError> {
        match self {
            NodeValues::Flat(values) => Ok(values),
            NodeValues::PerOutput(values) => values
                .into_iter()
                .enumerate()
                .map(|(node, mut outputs)| match outputs.len() {
                    1 => Ok(outputs.remove(0)),
                    got => Err(ModelError::MultiOutput { node, got }),
                })
                .collect(),
        }
    }
}

/// One tree in scikit-learn's `tree_` array layout.
///
/// `value[node]` is the two-entry class distribution `[discard, keep]`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TreeData {
    pub children_left: Vec<i64>,
    pub children_right: Vec<i64>,
    pub feature: Vec<i64>,
    pub threshold: Vec<f64>,
    pub value: NodeValues,
}

impl TreeData {
    pub fn from_tree(tree: &FittedTree) -> Self {
        let (left, right, feature, threshold, distributions) = tree.raw_arrays();
        TreeData {
            children_left: left.to_vec(),
            children_right: right.to_vec(),
            feature: feature.to_vec(),
            threshold: threshold.to_vec(),
            value: NodeValues::Flat(distributions.iter().map(|d| d.to_vec()).collect()),
        }
    }

    pub fn into_tree(self) -> Result<FittedTree, ModelError> {
        FittedTree::from_arrays(
            self.children_left,
            self.children_right,
            self.feature,
            self.threshold,
            self.value.into_flat()?,
        )
    }
}

/// File-level model layout: either a bare tree or `{ "estimators": [...] }`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum ModelData {
    Ensemble { estimators: Vec<TreeData> },
    Tree(TreeData),
}

impl ModelData {
    pub fn from_model(model: &FittedModel) -> Self {
        match model {
            FittedModel::SingleTree(tree) => ModelData::Tree(TreeData::from_tree(tree)),
            FittedModel::Ensemble(ensemble) => ModelData::Ensemble {
                estimators: ensemble.members().iter().map(TreeData::from_tree).collect(),
            },
        }
    }

    /// Decides the model variant once, here.
    pub fn into_model(self) -> Result<FittedModel, ModelError> {
        match self {
            ModelData::Tree(tree) => Ok(FittedModel::SingleTree(tree.into_tree()?)),
            ModelData::Ensemble { estimators } => {
                let members = estimators
                    .into_iter()
                    .map(TreeData::into_tree)
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(FittedModel::Ensemble(FittedEnsemble::new(members)?))
            }
        }
    }
}

/// Centroids plus the ordered shape-feature names they were fitted on.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ClusterData {
    pub centers: Vec<Vec<f64>>,
    pub feature_names: Vec<String>,
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T, ModelError> {
    let content = fs::read_to_string(path).map_err(|e| ModelError::Load {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    serde_json::from_str(&content).map_err(|e| ModelError::Load {
        path: path.to_path_buf(),
        message: format!("invalid JSON: {}", e),
    })
}

/// Loads a fitted tree or ensemble from a JSON file and validates every tree.
pub fn load_model_json<P: AsRef<Path>>(path: P) -> Result<FittedModel, ModelError> {
    let data: ModelData = read_json(path.as_ref())?;
    data.into_model()
}

/// Loads centroids and their feature names from a JSON file.
pub fn load_clusters_json<P: AsRef<Path>>(path: P) -> Result<(ClusterModel, Vec<String>), ModelError> {
    let path = path.as_ref();
    let data: ClusterData = read_json(path)?;
    let model = ClusterModel::new(data.centers)?;
    if model.dimension() != data.feature_names.len() {
        return Err(ModelError::CentroidDimension {
            index: 0,
            expected: data.feature_names.len(),
            got: model.dimension(),
        });
    }
    Ok((model, data.feature_names))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_untagged_layouts() {
        let tree = r#"{"children_left":[-1],"children_right":[-1],"feature":[-2],"threshold":[-2.0],"value":[[3.0,1.0]]}"#;
        let parsed: ModelData = serde_json::from_str(tree).unwrap();
        assert!(matches!(parsed.into_model().unwrap(), FittedModel::SingleTree(_)));

        let ensemble = format!(r#"{{"estimators":[{},{}]}}"#, tree, tree);
        let parsed: ModelData = serde_json::from_str(&ensemble).unwrap();
        match parsed.into_model().unwrap() {
            FittedModel::Ensemble(e) => assert_eq!(e.len(), 2),
            other => panic!("expected ensemble, got {:?}", other),
        }
    }

    #[test]
    fn test_per_output_values_are_accepted() {
        let nested = r#"{"children_left":[1,-1,-1],"children_right":[2,-1,-1],"feature":[0,-2,-2],
            "threshold":[4.0,-2.0,-2.0],"value":[[[5.0,5.0]],[[5.0,0.0]],[[0.0,5.0]]]}"#;
        let parsed: ModelData = serde_json::from_str(nested).unwrap();
        let FittedModel::SingleTree(tree) = parsed.into_model().unwrap() else {
            panic!("expected a single tree");
        };
        assert_eq!(tree.distribution(2), [0.0, 5.0]);

        let two_outputs = r#"{"children_left":[-1],"children_right":[-1],"feature":[-2],"threshold":[-2.0],
            "value":[[[1.0,0.0],[0.0,1.0]]]}"#;
        let parsed: ModelData = serde_json::from_str(two_outputs).unwrap();
        assert_eq!(parsed.into_model().err(), Some(ModelError::MultiOutput { node: 0, got: 2 }));
    }

    #[test]
    fn test_invalid_tree_is_reported() {
        let bad = r#"{"children_left":[1],"children_right":[-1],"feature":[0],"threshold":[1.0],"value":[[1.0,1.0]]}"#;
        let parsed: ModelData = serde_json::from_str(bad).unwrap();
        assert!(parsed.into_model().is_err());
    }
}
