//! Exports fitted trees for inspection outside the crate: Graphviz DOT for
//! viewing, and JSON in the same array layout `model::load_model_json` reads.
//!
//! Note: nothing here feeds back into code generation.

use std::cmp;
use std::fmt::Write as _;
use std::fs;
use std::io;
use std::path::Path;

use tracing::info;

use crate::model::{FittedModel, ModelData};
use crate::tree::{gini, FittedTree, NodeId};

const CLASS_NAMES: [&str; 2] = ["discard", "keep"];

/// Recursive helper writing one node, its outgoing edges and its subtree.
fn write_dot_node(tree: &FittedTree, id: NodeId, names: &[String], out: &mut String) {
    let dist = tree.distribution(id);
    let stats = format!(
        "gini = {:.3}\\nsamples = {}\\nvalue = [{:.1}, {:.1}]\\nclass = {}",
        gini(&dist),
        dist[0] + dist[1],
        dist[0],
        dist[1],
        CLASS_NAMES[tree.leaf_class(id) as usize]
    );

    if tree.is_leaf(id) {
        let _ = writeln!(out, "{} [label=\"{}\"] ;", id, stats);
        return;
    }

    let feature = tree.get_feature_usize(id);
    let name = names.get(feature).map(String::as_str).unwrap_or("?");
    let _ = writeln!(out, "{} [label=\"{} <= {:?}\\n{}\"] ;", id, name, tree.get_threshold(id), stats);

    let (true_id, false_id) = (tree.get_true_id(id), tree.get_false_id(id));
    write_dot_node(tree, true_id, names, out);
    let _ = writeln!(out, "{} -> {} [labeldistance=2.5, labelangle=45, headlabel=\"True\"] ;", id, true_id);
    write_dot_node(tree, false_id, names, out);
    let _ = writeln!(out, "{} -> {} [labeldistance=2.5, labelangle=-45, headlabel=\"False\"] ;", id, false_id);
}

/// Graphviz source of a tree; split nodes are labelled with `feature_names`.
pub fn tree_to_dot(tree: &FittedTree, feature_names: &[String]) -> String {
    let mut out = String::from("digraph Tree {\nnode [shape=box] ;\n");
    write_dot_node(tree, tree.root(), feature_names, &mut out);
    out.push_str("}\n");
    out
}

/// Writes `tree_to_dot` output to `path`.
///
/// # Arguments
/// * `tree` - The tree to export. For ensembles callers pass the first member.
/// * `feature_names` - Names indexed by split feature.
/// * `path` - Output file.
pub fn export_tree_to_dot<P: AsRef<Path>>(tree: &FittedTree, feature_names: &[String], path: P) -> io::Result<()> {
    let path = path.as_ref();
    fs::write(path, tree_to_dot(tree, feature_names))?;
    info!(
        "[EXPORT] DOT written to {:?} (nodes: {}, height: {})",
        path,
        tree.node_count(),
        calculate_tree_height(tree)
    );
    Ok(())
}

/// Writes a fitted model as JSON (`{ "estimators": [...] }` for ensembles).
pub fn export_model_to_json<P: AsRef<Path>>(model: &FittedModel, path: P) -> io::Result<()> {
    let json = serde_json::to_string_pretty(&ModelData::from_model(model))?;
    fs::write(path.as_ref(), json)?;
    Ok(())
}

/// Recursive helper to calculate the height of a subtree.
fn calculate_height_recursive(tree: &FittedTree, id: NodeId) -> usize {
    if tree.is_leaf(id) {
        0
    } else {
        let left = calculate_height_recursive(tree, tree.get_true_id(id));
        let right = calculate_height_recursive(tree, tree.get_false_id(id));
        1 + cmp::max(left, right)
    }
}

/// Height (maximum depth) of a tree; a root-only tree has height 0.
pub fn calculate_tree_height(tree: &FittedTree) -> usize {
    calculate_height_recursive(tree, tree.root())
}
