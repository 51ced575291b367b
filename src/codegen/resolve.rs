//! Maps dataset column names to expressions valid in the host program.
//!
//! Resolution is a fixed, ordered table of textual rewrites followed by a
//! binding step that picks the accessor: the clause's size, one of the
//! host-supplied parameters, or a member of the clause statistics record.

use crate::config::{HostBinding, HostParam, SHAPE_FEATURE_MARKER};

/// One textual rewrite step. Rules run in table order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RewriteRule {
    /// Removes a leading structural prefix such as `cl.`.
    StripPrefix(String),
    /// Replaces every occurrence of `from` with `to`.
    ReplaceAll { from: String, to: String },
    /// Renames a whole name.
    Rename { from: String, to: String },
    /// Collapses a leading `<stem><digits>_` generation qualifier, so every
    /// generation of a statistic maps to the same unqualified name.
    CollapseGeneration { stem: String },
    /// Replaces a leading `from` with `to`, unless the name already starts
    /// with `to`.
    PrefixRename { from: String, to: String },
}

impl RewriteRule {
    pub fn apply(&self, name: &str) -> String {
        match self {
            RewriteRule::StripPrefix(prefix) => name.strip_prefix(prefix.as_str()).unwrap_or(name).to_string(),
            RewriteRule::ReplaceAll { from, to } => name.replace(from.as_str(), to),
            RewriteRule::Rename { from, to } => {
                if name == from {
                    to.clone()
                } else {
                    name.to_string()
                }
            }
            RewriteRule::CollapseGeneration { stem } => collapse_generation(name, stem),
            RewriteRule::PrefixRename { from, to } => {
                if name.starts_with(to.as_str()) {
                    return name.to_string();
                }
                match name.strip_prefix(from.as_str()) {
                    Some(rest) => format!("{}{}", to, rest),
                    None => name.to_string(),
                }
            }
        }
    }
}

fn collapse_generation(name: &str, stem: &str) -> String {
    let Some(rest) = name.strip_prefix(stem) else {
        return name.to_string();
    };
    let digits = rest.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits == 0 {
        return name.to_string();
    }
    match rest[digits..].strip_prefix('_') {
        Some(unqualified) if !unqualified.is_empty() => unqualified.to_string(),
        _ => name.to_string(),
    }
}

/// How a rewritten name becomes an expression.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Binding {
    /// Clause statistics: `cl->size()`, a parameter identifier, or `cl->stats.<name>`.
    Clause {
        clause_var: String,
        size_accessor: String,
        stats_member: String,
        params: Vec<HostParam>,
    },
    /// The rewritten name is used verbatim as a member path.
    Member,
}

/// Ordered rewrite table plus the final binding step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolver {
    rules: Vec<RewriteRule>,
    binding: Binding,
}

impl Resolver {
    /// Resolver for per-clause features of the given host.
    pub fn for_host(host: &HostBinding) -> Self {
        Resolver {
            rules: vec![
                RewriteRule::StripPrefix("cl.".to_string()),
                RewriteRule::ReplaceAll { from: ".".to_string(), to: "_".to_string() },
                RewriteRule::CollapseGeneration { stem: "rdb".to_string() },
                // Runs on the unqualified name, so `rdb0.dump_no` is renamed too.
                RewriteRule::Rename { from: "dump_no".to_string(), to: "dump_number".to_string() },
            ],
            binding: Binding::Clause {
                clause_var: host.clause_var.clone(),
                size_accessor: host.size_accessor.clone(),
                stats_member: host.stats_member.clone(),
                params: host.params.clone(),
            },
        }
    }

    /// Resolver for the problem-shape features used by the cluster router.
    pub fn shape_features() -> Self {
        Resolver {
            rules: vec![
                RewriteRule::StripPrefix(format!("{}.", SHAPE_FEATURE_MARKER)),
                RewriteRule::PrefixRename { from: "red_".to_string(), to: "red_cl_distrib.".to_string() },
                RewriteRule::PrefixRename { from: "irred_".to_string(), to: "irred_cl_distrib.".to_string() },
            ],
            binding: Binding::Member,
        }
    }

    pub fn rules(&self) -> &[RewriteRule] {
        &self.rules
    }

    /// Host expression for a dataset column name. Total; resolving an
    /// already-resolved name returns it unchanged.
    pub fn resolve(&self, raw: &str) -> String {
        if self.is_resolved(raw) {
            return raw.to_string();
        }
        let name = self.rules.iter().fold(raw.to_string(), |name, rule| rule.apply(&name));
        self.bind(name)
    }

    pub fn resolve_all(&self, raw: &[String]) -> Vec<String> {
        raw.iter().map(|name| self.resolve(name)).collect()
    }

    fn is_resolved(&self, name: &str) -> bool {
        match &self.binding {
            Binding::Clause { clause_var, params, .. } => {
                name.starts_with(&format!("{}->", clause_var)) || params.iter().any(|p| p.ident == name)
            }
            Binding::Member => false,
        }
    }

    fn bind(&self, name: String) -> String {
        match &self.binding {
            Binding::Clause { clause_var, size_accessor, stats_member, params } => {
                if name == "size" {
                    format!("{}->{}", clause_var, size_accessor)
                } else if let Some(param) = params.iter().find(|p| p.stat == name) {
                    param.ident.clone()
                } else {
                    format!("{}->{}.{}", clause_var, stats_member, name)
                }
            }
            Binding::Member => name,
        }
    }
}
