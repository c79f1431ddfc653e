//! Findings and diagnostics.

mod render;

pub use render::{render, ReportFormat};

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::analysis::{AcquisitionSite, Confidence, SiteState};
use crate::catalog::ResourceKind;

/// Severity of a finding. Ordered so thresholds can compare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    /// JDBC handles, streams and locks exhaust deterministically; executor
    /// leaks are bounded by process lifetime but still defects.
    pub fn for_kind(kind: ResourceKind) -> Severity {
        match kind {
            ResourceKind::ThreadPool => Severity::Medium,
            ResourceKind::Stream
            | ResourceKind::Statement
            | ResourceKind::PreparedStatement
            | ResourceKind::ResultSet
            | ResourceKind::Connection
            | ResourceKind::Lock => Severity::High,
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "low" => Some(Severity::Low),
            "medium" | "med" => Some(Severity::Medium),
            "high" => Some(Severity::High),
            _ => None,
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Low => write!(f, "low"),
            Severity::Medium => write!(f, "medium"),
            Severity::High => write!(f, "high"),
        }
    }
}

/// One reported resource acquired without a guaranteed release.
/// Immutable once emitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    pub kind: ResourceKind,
    pub path: PathBuf,
    pub method: String,
    pub line: u32,
    pub col: u32,
    pub var: String,
    pub severity: Severity,
    pub confidence: Confidence,
}

/// A non-fatal problem encountered during analysis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub path: PathBuf,
    pub method: Option<String>,
    pub line: Option<u32>,
    pub message: String,
}

/// What one analysis run produced. Always returned, possibly partial,
/// possibly empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub findings: Vec<Finding>,
    pub diagnostics: Vec<Diagnostic>,
}

impl AnalysisResult {
    pub fn merge(&mut self, other: AnalysisResult) {
        self.findings.extend(other.findings);
        self.diagnostics.extend(other.diagnostics);
    }
}

/// Convert the leaked sites of one method into findings, ordered by source
/// location ascending. The sort is stable, so equal locations keep their
/// observation order.
pub fn report(path: &Path, method: &str, sites: &[AcquisitionSite]) -> Vec<Finding> {
    let mut findings: Vec<Finding> = sites
        .iter()
        .filter(|s| s.state == SiteState::Leaked)
        .map(|s| Finding {
            kind: s.kind,
            path: path.to_path_buf(),
            method: method.to_owned(),
            line: s.loc.line,
            col: s.loc.col,
            var: s.var.clone(),
            severity: Severity::for_kind(s.kind),
            confidence: s.confidence,
        })
        .collect();
    findings.sort_by_key(|f| (f.line, f.col));
    findings
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{Confidence, SiteState};
    use crate::syntax::{Loc, ScopeId};
    use std::path::Path;

    fn site(var: &str, kind: ResourceKind, line: u32, state: SiteState) -> AcquisitionSite {
        AcquisitionSite {
            kind,
            var: var.into(),
            loc: Loc::new(line, 9),
            scope: ScopeId(0),
            depth: 0,
            scoped: false,
            state,
            confidence: Confidence::Certain,
            release: &["close"],
            auto_closeable: true,
        }
    }

    #[test]
    fn only_leaked_sites_become_findings() {
        let sites = vec![
            site("a", ResourceKind::Stream, 2, SiteState::Leaked),
            site("b", ResourceKind::Stream, 3, SiteState::Resolved),
        ];
        let findings = report(Path::new("A.java"), "m", &sites);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].var, "a");
    }

    #[test]
    fn findings_are_ordered_by_location() {
        let sites = vec![
            site("late", ResourceKind::ResultSet, 9, SiteState::Leaked),
            site("early", ResourceKind::Statement, 3, SiteState::Leaked),
            site("mid", ResourceKind::PreparedStatement, 5, SiteState::Leaked),
        ];
        let findings = report(Path::new("A.java"), "m", &sites);
        let vars: Vec<_> = findings.iter().map(|f| f.var.as_str()).collect();
        assert_eq!(vars, vec!["early", "mid", "late"]);
    }

    #[test]
    fn severity_policy_by_kind() {
        assert_eq!(Severity::for_kind(ResourceKind::ThreadPool), Severity::Medium);
        assert_eq!(Severity::for_kind(ResourceKind::Stream), Severity::High);
        assert_eq!(Severity::for_kind(ResourceKind::ResultSet), Severity::High);
        assert_eq!(Severity::for_kind(ResourceKind::Connection), Severity::High);
        assert!(Severity::Low < Severity::Medium && Severity::Medium < Severity::High);
    }

    #[test]
    fn severity_parses_case_insensitively() {
        assert_eq!(Severity::parse("HIGH"), Some(Severity::High));
        assert_eq!(Severity::parse("med"), Some(Severity::Medium));
        assert_eq!(Severity::parse("none"), None);
    }
}
