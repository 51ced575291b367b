//! Emits the umbrella header tying the cluster router to the per-cluster
//! predictors: one function-pointer table indexed by cluster id.

use super::{guard_name, signature_types, CodeWriter, GeneratedArtifact};
use crate::config::{validate_base_name, HostBinding};
use crate::error::{CodegenError, ConfigError};

pub fn dispatch_file(base_name: &str) -> String {
    format!("all_predictors_{}.h", base_name)
}

pub fn table_name(base_name: &str) -> String {
    format!("should_keep_{}_funcs", base_name)
}

/// Builds `all_predictors_<base>.h`.
///
/// Includes the router and every predictor header, then declares
/// `keep_func_type_<base>` and the table `should_keep_<base>_funcs[K]`
/// whose entry `c` is the entry point of `predictors[c]`.
pub fn compile_dispatch(
    base_name: &str,
    router: &GeneratedArtifact,
    predictors: &[GeneratedArtifact],
    host: &HostBinding,
) -> Result<GeneratedArtifact, CodegenError> {
    validate_base_name(base_name)?;
    if predictors.is_empty() {
        return Err(ConfigError::ZeroClusters.into());
    }

    let guard = guard_name("ALL_PREDICTORS", base_name);
    let func_type = format!("keep_func_type_{}", base_name);
    let table = table_name(base_name);
    let entries: Vec<&String> = predictors.iter().flat_map(|p| p.entry_points()).collect();

    let mut w = CodeWriter::with_license();
    w.line(0, "///auto-generated code. Under MIT license.");
    w.line(0, format!("#ifndef {}", guard));
    w.line(0, format!("#define {}", guard));
    w.blank();
    for include in &host.includes {
        w.line(0, format!("#include \"{}\"", include));
    }
    w.line(0, format!("#include \"{}\"", router.file_name()));
    for predictor in predictors {
        w.line(0, format!("#include \"{}\"", predictor.file_name()));
    }
    w.blank();
    w.line(0, format!("namespace {} {{", host.namespace));
    w.blank();
    w.line(0, format!("typedef bool (*{})({});", func_type, signature_types(host)));
    w.blank();
    w.line(0, format!("{} {}[{}] = {{", func_type, table, entries.len()));
    for entry in &entries {
        w.line(1, format!("{}::{},", host.namespace, entry));
    }
    w.line(0, "};");
    w.blank();
    w.line(0, "} //end namespace");
    w.blank();
    w.line(0, format!("#endif //{}", guard));

    let mut entry_points = vec![table];
    entry_points.extend(router.entry_points().iter().cloned());
    Ok(GeneratedArtifact::new(dispatch_file(base_name), entry_points, w.finish()))
}
