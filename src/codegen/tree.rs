//! Emits a single fitted tree as nested `if`/`else` source.
//!
//! Each internal node becomes `if ( <feature> <= <threshold>f ) { .. } else { .. }`
//! and each leaf returns the discard/keep ratio of its training samples,
//! so callers treat any value below 1 as a keep vote.

use super::{write_signature, CodeWriter, Resolver};
use crate::config::HostBinding;
use crate::error::CodegenError;
use crate::tree::{Distribution, FittedTree, NodeId};

/// Return literal of a leaf.
///
/// Both counts are printed with one decimal: `5.0/2.0`. A leaf whose keep
/// count prints as `0.0` returns `1` instead of a division by zero.
pub fn leaf_literal(distribution: Distribution) -> String {
    let [discard, keep] = distribution;
    if one_decimal(keep) == 0.0 {
        "1".to_string()
    } else {
        format!("{:.1}/{:.1}", discard, keep)
    }
}

/// The value a leaf's emitted literal evaluates to in the host.
pub fn leaf_ratio(distribution: Distribution) -> f64 {
    let [discard, keep] = distribution;
    let keep = one_decimal(keep);
    if keep == 0.0 {
        return 1.0;
    }
    one_decimal(discard) / keep
}

fn one_decimal(value: f64) -> f64 {
    format!("{:.1}", value).parse().unwrap_or(value)
}

/// Threshold as a `float` literal: shortest round-trip decimal, integral
/// values keep their `.0`, e.g. `4.0f`, `0.125f`.
pub fn threshold_literal(threshold: f64) -> String {
    format!("{:?}f", threshold)
}

/// Emits the body (nested conditionals and returns) of one tree.
///
/// # Arguments
/// * `tree` - The tree to emit.
/// * `feature_names` - Dataset column names, indexed by split feature.
/// * `resolver` - Maps column names to host expressions.
/// * `indent` - Indentation level of the outermost statement.
///
/// # Returns
/// The body text, or `FeatureIndexOutOfRange` when a split refers to a
/// feature with no name.
pub fn serialize_body(
    tree: &FittedTree,
    feature_names: &[String],
    resolver: &Resolver,
    indent: usize,
) -> Result<String, CodegenError> {
    if let Some(index) = tree.max_feature_index() {
        if index >= feature_names.len() {
            return Err(CodegenError::FeatureIndexOutOfRange { index, available: feature_names.len() });
        }
    }
    let accessors = resolver.resolve_all(feature_names);
    let mut w = CodeWriter::new();
    emit_node(tree, tree.root(), &accessors, indent, &mut w);
    Ok(w.finish())
}

fn emit_node(tree: &FittedTree, id: NodeId, accessors: &[String], indent: usize, w: &mut CodeWriter) {
    if tree.is_leaf(id) {
        w.line(indent, format!("return {};", leaf_literal(tree.distribution(id))));
        return;
    }
    let accessor = &accessors[tree.get_feature_usize(id)];
    w.line(
        indent,
        format!("if ( {} <= {} ) {{", accessor, threshold_literal(tree.get_threshold(id))),
    );
    emit_node(tree, tree.get_true_id(id), accessors, indent + 1, w);
    w.line(indent, "} else {");
    emit_node(tree, tree.get_false_id(id), accessors, indent + 1, w);
    w.line(indent, "}");
}

/// Emits one tree as a complete `static double <function_name>(...)` function
/// taking the host's clause pointer and parameters.
pub fn serialize_tree(
    tree: &FittedTree,
    feature_names: &[String],
    function_name: &str,
    host: &HostBinding,
    indent: usize,
) -> Result<String, CodegenError> {
    let body = serialize_body(tree, feature_names, &Resolver::for_host(host), indent + 1)?;
    let mut w = CodeWriter::new();
    write_signature(&mut w, indent, "double", function_name, host);
    w.raw(&body);
    w.line(indent, "}");
    Ok(w.finish())
}
