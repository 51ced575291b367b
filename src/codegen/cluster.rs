//! Emits fitted centroids as a nearest-centroid router class.

use tracing::debug;

use super::{guard_name, CodeWriter, GeneratedArtifact, Resolver};
use crate::config::{validate_base_name, HostBinding};
use crate::error::{CodegenError, ConfigError};
use crate::model::ClusterModel;

pub fn cluster_class(base_name: &str) -> String {
    format!("Clustering_{}", base_name)
}

pub fn cluster_file(base_name: &str) -> String {
    format!("clustering_{}.h", base_name)
}

/// Compiles `model` into `clustering_<base>.h`.
///
/// The emitted class stores the centroids as shape records, measures squared
/// Euclidean distance over every shape feature and routes a point to the
/// closest centroid, lower index first on ties.
///
/// # Arguments
/// * `model` - Fitted centroids.
/// * `shape_feature_names` - Dataset names of the centroid dimensions, in order.
/// * `k` - Configured cluster count; must match the model.
/// * `base_name` - Suffix of the class and file names.
/// * `host` - Supplies the shape record type and its include.
pub fn compile_clusters(
    model: &ClusterModel,
    shape_feature_names: &[String],
    k: usize,
    base_name: &str,
    host: &HostBinding,
) -> Result<GeneratedArtifact, CodegenError> {
    validate_base_name(base_name)?;
    if k == 0 {
        return Err(ConfigError::ZeroClusters.into());
    }
    if k != model.k() {
        return Err(ConfigError::ClusterCountMismatch { clusters: k, centroids: model.k() }.into());
    }
    if shape_feature_names.len() != model.dimension() {
        return Err(CodegenError::ShapeDimension {
            names: shape_feature_names.len(),
            dimension: model.dimension(),
        });
    }

    let members = Resolver::shape_features().resolve_all(shape_feature_names);
    let class = cluster_class(base_name);
    let record = &host.shape_record;
    let guard = guard_name("CLUSTERING", base_name);

    let mut w = CodeWriter::with_license();
    w.line(0, format!("#ifndef {}", guard));
    w.line(0, format!("#define {}", guard));
    w.blank();
    w.line(0, format!("#include \"{}\"", host.shape_include));
    w.line(0, "#include <cmath>");
    w.line(0, "#include <limits>");
    w.blank();
    w.line(0, format!("namespace {} {{", host.namespace));
    w.blank();
    w.line(0, format!("class {} {{", class));
    w.line(0, "public:");
    w.line(1, format!("{}() {{", class));
    w.line(2, "set_up_centers();");
    w.line(1, "}");
    w.blank();
    w.line(1, format!("{} center[{}];", record, k));
    w.blank();

    w.line(1, "void set_up_centers() {");
    for (index, center) in model.centers().iter().enumerate() {
        w.blank();
        w.line(2, format!("// center {}", index));
        for (member, value) in members.iter().zip(center) {
            w.line(2, format!("center[{}].{} = {:?};", index, member, value));
        }
    }
    w.line(1, "}");
    w.blank();

    w.line(1, "double sq(double x) const {");
    w.line(2, "return x*x;");
    w.line(1, "}");
    w.blank();

    w.line(1, format!("double norm_dist(const {}& a, const {}& b) const {{", record, record));
    w.line(2, "double dist = 0;");
    for member in &members {
        w.line(2, format!("dist+=sq(a.{}-b.{});", member, member));
    }
    w.line(2, "return dist;");
    w.line(1, "}");
    w.blank();

    w.line(1, format!("int which_is_closest(const {}& p) const {{", record));
    w.line(2, "double closest_dist = std::numeric_limits<double>::max();");
    w.line(2, "int closest = -1;");
    w.line(2, format!("for (int i = 0; i < {}; i++) {{", k));
    w.line(3, "double dist = norm_dist(center[i], p);");
    w.line(3, "if (dist < closest_dist) {");
    w.line(4, "closest_dist = dist;");
    w.line(4, "closest = i;");
    w.line(3, "}");
    w.line(2, "}");
    w.line(2, "return closest;");
    w.line(1, "}");
    w.line(0, "};");
    w.blank();
    w.line(0, "} //end namespace");
    w.blank();
    w.line(0, format!("#endif //{}", guard));

    debug!("[CODEGEN] Cluster router '{}': {} centers over {} shape features", class, k, members.len());
    Ok(GeneratedArtifact::new(cluster_file(base_name), vec![class], w.finish()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model() -> ClusterModel {
        ClusterModel::new(vec![vec![0.0, 1.0], vec![5.0, 2.5], vec![10.0, 0.0]]).unwrap()
    }

    fn shape_names() -> Vec<String> {
        vec!["szfeat_cur.numVars".to_string(), "szfeat_cur.red_glue_distr_mean".to_string()]
    }

    #[test]
    fn test_cluster_header_content() {
        let artifact = compile_clusters(&model(), &shape_names(), 3, "short", &HostBinding::default()).unwrap();
        assert_eq!(artifact.file_name(), "clustering_short.h");
        assert_eq!(artifact.entry_points(), ["Clustering_short".to_string()]);
        let text = artifact.text();
        assert!(text.contains("#ifndef CLUSTERING_SHORT_H\n"));
        assert!(text.contains("    SatZillaFeatures center[3];\n"));
        assert!(text.contains("        center[1].numVars = 5.0;\n"));
        assert!(text.contains("        center[1].red_cl_distrib.glue_distr_mean = 2.5;\n"));
        assert!(text.contains("        dist+=sq(a.numVars-b.numVars);\n"));
        assert!(text.contains("            if (dist < closest_dist) {\n"));
    }

    #[test]
    fn test_cluster_count_checks() {
        let host = HostBinding::default();
        let err = compile_clusters(&model(), &shape_names(), 0, "short", &host).unwrap_err();
        assert!(matches!(err, CodegenError::Config(ConfigError::ZeroClusters)));

        let err = compile_clusters(&model(), &shape_names(), 2, "short", &host).unwrap_err();
        assert!(matches!(
            err,
            CodegenError::Config(ConfigError::ClusterCountMismatch { clusters: 2, centroids: 3 })
        ));

        let err = compile_clusters(&model(), &shape_names()[..1], 3, "short", &host).unwrap_err();
        assert!(matches!(err, CodegenError::ShapeDimension { names: 1, dimension: 2 }));
    }
}
