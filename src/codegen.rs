//! Compiles fitted models into standalone C++ decision procedures.
//!
//! Every emitted file is built as one `String` in memory and written with a
//! single `fs::write`, so a failed run never leaves a half-written header.

pub mod cluster;
pub mod dispatch;
pub mod ensemble;
pub mod resolve;
pub mod tree;

pub use cluster::{cluster_class, cluster_file, compile_clusters};
pub use dispatch::{compile_dispatch, dispatch_file};
pub use ensemble::{compile_model, compile_predictor, estimator_name, predictor_file, predictor_function, render_model};
pub use resolve::{Resolver, RewriteRule};
pub use tree::{leaf_literal, leaf_ratio, serialize_body, serialize_tree, threshold_literal};

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::HostBinding;
use crate::error::CodegenError;

/// One indentation level in emitted code.
pub const INDENT: &str = "    ";

const LICENSE_HEADER: &str = "\
/******************************************
Copyright (c) the keepgen contributors

Permission is hereby granted, free of charge, to any person obtaining a copy
of this software and associated documentation files (the \"Software\"), to deal
in the Software without restriction, including without limitation the rights
to use, copy, modify, merge, publish, distribute, sublicense, and/or sell
copies of the Software, and to permit persons to whom the Software is
furnished to do so, subject to the following conditions:

The above copyright notice and this permission notice shall be included in
all copies or substantial portions of the Software.

THE SOFTWARE IS PROVIDED \"AS IS\", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN
THE SOFTWARE.
***********************************************/
";

/// A generated source file. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedArtifact {
    file_name: String,
    entry_points: Vec<String>,
    text: String,
}

impl GeneratedArtifact {
    pub fn new(file_name: String, entry_points: Vec<String>, text: String) -> Self {
        GeneratedArtifact { file_name, entry_points, text }
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Functions (or classes) this file declares for the host to call.
    pub fn entry_points(&self) -> &[String] {
        &self.entry_points
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Writes the artifact into `dir` and returns the full path.
    pub fn write_to<P: AsRef<Path>>(&self, dir: P) -> Result<PathBuf, CodegenError> {
        let path = dir.as_ref().join(&self.file_name);
        fs::write(&path, &self.text).map_err(|source| CodegenError::Write { path: path.clone(), source })?;
        Ok(path)
    }
}

/// Text builder for indented source lines.
#[derive(Debug, Default)]
pub(crate) struct CodeWriter {
    out: String,
}

impl CodeWriter {
    pub(crate) fn new() -> Self {
        CodeWriter::default()
    }

    /// Starts a file with the license header.
    pub(crate) fn with_license() -> Self {
        CodeWriter { out: LICENSE_HEADER.to_string() }
    }

    pub(crate) fn line(&mut self, indent: usize, text: impl AsRef<str>) {
        for _ in 0..indent {
            self.out.push_str(INDENT);
        }
        self.out.push_str(text.as_ref());
        self.out.push('\n');
    }

    pub(crate) fn blank(&mut self) {
        self.out.push('\n');
    }

    pub(crate) fn raw(&mut self, text: &str) {
        self.out.push_str(text);
    }

    pub(crate) fn finish(self) -> String {
        self.out
    }
}

/// `NAME_H`-style include guard for a base name.
pub(crate) fn guard_name(prefix: &str, base_name: &str) -> String {
    format!("{}_{}_H", prefix, base_name.to_ascii_uppercase())
}

/// Opening line(s) of a host-callable function: return type, name and the
/// clause pointer followed by the host's extra parameters, one per line.
pub(crate) fn write_signature(w: &mut CodeWriter, indent: usize, return_type: &str, name: &str, host: &HostBinding) {
    w.line(indent, format!("static {} {}(", return_type, name));
    w.line(indent + 1, format!("const {}* {}", host.clause_type, host.clause_var));
    for param in &host.params {
        w.line(indent + 1, format!(", const {} {}", host.param_type, param.ident));
    }
    w.line(indent, ") {");
}

/// Argument list forwarding the caller's own parameters, one per line.
pub(crate) fn write_call_args(w: &mut CodeWriter, indent: usize, host: &HostBinding) {
    w.line(indent, &host.clause_var);
    for param in &host.params {
        w.line(indent, format!(", {}", param.ident));
    }
}

/// Parameter types of the host signature, comma separated, for typedefs.
pub(crate) fn signature_types(host: &HostBinding) -> String {
    let mut out = format!("const {}*", host.clause_type);
    for _ in &host.params {
        let _ = write!(out, ", const {}", host.param_type);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature_layout() {
        let host = HostBinding::default();
        let mut w = CodeWriter::new();
        write_signature(&mut w, 0, "bool", "should_keep_short0", &host);
        let text = w.finish();
        assert_eq!(
            text,
            "static bool should_keep_short0(\n    const CMSat::Clause* cl\n    , const uint32_t rdb0_last_touched_diff\n    , const uint32_t rdb0_act_ranking\n    , const uint32_t rdb0_act_ranking_top_10\n) {\n"
        );
        assert_eq!(
            signature_types(&host),
            "const CMSat::Clause*, const uint32_t, const uint32_t, const uint32_t"
        );
    }

    #[test]
    fn test_artifact_written_once() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = GeneratedArtifact::new("x.h".into(), vec!["f".into()], "int f();\n".into());
        let path = artifact.write_to(dir.path()).unwrap();
        assert_eq!(fs::read_to_string(path).unwrap(), "int f();\n");
        assert_eq!(artifact.entry_points(), ["f".to_string()]);
    }
}
