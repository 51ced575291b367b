//! Emits a fitted tree or tree ensemble as one keep/discard function.
//!
//! Each member becomes its own `estimator_<name>_<i>` function; the entry
//! point counts the members whose ratio is below 1 and keeps the clause when
//! that count reaches `ceil(n / 2)`.

use tracing::debug;

use super::tree::serialize_tree;
use super::{guard_name, write_call_args, write_signature, CodeWriter, GeneratedArtifact};
use crate::config::HostBinding;
use crate::error::CodegenError;
use crate::model::FittedModel;
use crate::utils::majority_threshold;

pub fn estimator_name(function_name: &str, index: usize) -> String {
    format!("estimator_{}_{}", function_name, index)
}

/// Emits the member functions and the tally function, without any file
/// framing (license, guards, includes, namespace).
pub fn render_model(
    model: &FittedModel,
    feature_names: &[String],
    function_name: &str,
    host: &HostBinding,
) -> Result<String, CodegenError> {
    let trees = model.trees();
    let mut w = CodeWriter::new();

    for (index, tree) in trees.iter().enumerate() {
        w.raw(&serialize_tree(tree, feature_names, &estimator_name(function_name, index), host, 0)?);
        w.blank();
    }

    write_signature(&mut w, 0, "bool", function_name, host);
    w.line(1, "int votes = 0;");
    for index in 0..trees.len() {
        w.line(1, format!("votes += {}(", estimator_name(function_name, index)));
        write_call_args(&mut w, 2, host);
        w.line(1, ") < 1.0;");
    }
    w.line(1, format!("return votes >= {};", majority_threshold(trees.len())));
    w.line(0, "}");

    debug!(
        "[CODEGEN] Rendered '{}' with {} member(s), keep threshold {}",
        function_name,
        trees.len(),
        majority_threshold(trees.len())
    );
    Ok(w.finish())
}

/// Wraps a rendered model in a complete header.
pub(crate) fn build_header(
    model: &FittedModel,
    feature_names: &[String],
    function_name: &str,
    file_name: String,
    host: &HostBinding,
) -> Result<GeneratedArtifact, CodegenError> {
    let body = render_model(model, feature_names, function_name, host)?;
    let guard = guard_name("KEEP_PREDICTOR", function_name);

    let mut w = CodeWriter::with_license();
    w.line(0, format!("#ifndef {}", guard));
    w.line(0, format!("#define {}", guard));
    w.blank();
    for include in &host.includes {
        w.line(0, format!("#include \"{}\"", include));
    }
    w.blank();
    w.line(0, format!("namespace {} {{", host.namespace));
    w.blank();
    w.raw(&body);
    w.blank();
    w.line(0, "} //end namespace");
    w.blank();
    w.line(0, format!("#endif //{}", guard));

    Ok(GeneratedArtifact::new(file_name, vec![function_name.to_string()], w.finish()))
}

/// Compiles a fitted model into `<base_name>.h` declaring `<base_name>(...)`.
pub fn compile_model(
    model: &FittedModel,
    feature_names: &[String],
    base_name: &str,
    host: &HostBinding,
) -> Result<GeneratedArtifact, CodegenError> {
    crate::config::validate_base_name(base_name)?;
    build_header(model, feature_names, base_name, format!("{}.h", base_name), host)
}

/// Compiles the model of one cluster into `final_predictor_<base><cluster>.h`
/// declaring `should_keep_<base><cluster>(...)`.
pub fn compile_predictor(
    model: &FittedModel,
    feature_names: &[String],
    base_name: &str,
    cluster: usize,
    host: &HostBinding,
) -> Result<GeneratedArtifact, CodegenError> {
    crate::config::validate_base_name(base_name)?;
    build_header(
        model,
        feature_names,
        &predictor_function(base_name, cluster),
        predictor_file(base_name, cluster),
        host,
    )
}

pub fn predictor_function(base_name: &str, cluster: usize) -> String {
    format!("should_keep_{}{}", base_name, cluster)
}

pub fn predictor_file(base_name: &str, cluster: usize) -> String {
    format!("final_predictor_{}{}.h", base_name, cluster)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::FittedEnsemble;
    use crate::tree::tests::single_split_tree;
    use crate::tree::FittedTree;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_single_tree_tally() {
        let model = FittedModel::SingleTree(single_split_tree());
        let text = render_model(&model, &names(&["cl.glue"]), "short", &HostBinding::default()).unwrap();
        assert!(text.contains("static double estimator_short_0(\n"));
        assert!(text.contains("static bool short(\n"));
        assert!(text.contains("    votes += estimator_short_0(\n        cl\n        , rdb0_last_touched_diff\n"));
        assert!(text.contains("    ) < 1.0;\n    return votes >= 1;\n}\n"));
        assert!(!text.contains("estimator_short_1"));
    }

    #[test]
    fn test_ensemble_emits_every_member_in_order() {
        let members = vec![single_split_tree(), FittedTree::leaf([1.0, 3.0]), single_split_tree(), FittedTree::leaf([3.0, 0.0])];
        let model = FittedModel::Ensemble(FittedEnsemble::new(members).unwrap());
        let text = render_model(&model, &names(&["cl.glue"]), "f", &HostBinding::default()).unwrap();
        let positions: Vec<usize> = (0..4)
            .map(|i| text.find(&format!("static double estimator_f_{}(", i)).unwrap())
            .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));
        assert!(text.contains("return votes >= 2;"));
    }

    #[test]
    fn test_compile_predictor_framing() {
        let model = FittedModel::SingleTree(single_split_tree());
        let artifact =
            compile_predictor(&model, &names(&["cl.size"]), "long", 3, &HostBinding::default()).unwrap();
        assert_eq!(artifact.file_name(), "final_predictor_long3.h");
        assert_eq!(artifact.entry_points(), ["should_keep_long3".to_string()]);
        let text = artifact.text();
        assert!(text.starts_with("/******************************************\n"));
        assert!(text.contains("#include \"clause.h\"\n#include \"reducedb.h\"\n"));
        assert!(text.contains("namespace CMSat {\n"));
        assert!(text.contains("#ifndef KEEP_PREDICTOR_SHOULD_KEEP_LONG3_H\n"));
    }

    #[test]
    fn test_invalid_base_name_rejected() {
        let model = FittedModel::SingleTree(single_split_tree());
        let err = compile_model(&model, &names(&["cl.size"]), "not valid", &HostBinding::default()).unwrap_err();
        assert!(matches!(err, CodegenError::Config(_)));
    }
}
