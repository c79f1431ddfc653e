//! Rendering of analysis results for the report sink.

use super::{AnalysisResult, Severity};
use crate::analysis::Confidence;

/// Available output formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReportFormat {
    #[default]
    Text,
    Json,
}

impl ReportFormat {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "text" | "plain" => Some(Self::Text),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

/// Render a result for the given format.
pub fn render(result: &AnalysisResult, format: ReportFormat) -> String {
    match format {
        ReportFormat::Text => render_text(result),
        ReportFormat::Json => {
            serde_json::to_string_pretty(result).unwrap_or_else(|e| format!("{{\"error\":\"{e}\"}}"))
        }
    }
}

fn render_text(result: &AnalysisResult) -> String {
    let mut out = String::new();

    for f in &result.findings {
        let mut line = format!(
            "{}:{}:{}: {}: `{}` {} acquired in {}() is never released",
            f.path.display(),
            f.line,
            f.col,
            f.severity,
            f.var,
            f.kind,
            f.method,
        );
        if f.confidence == Confidence::Possible {
            line.push_str(" (handle escapes to an unknown callee)");
        }
        out.push_str(&line);
        out.push('\n');
    }

    for d in &result.diagnostics {
        match d.line {
            Some(line) => out.push_str(&format!(
                "warning: {}:{}: {}\n",
                d.path.display(),
                line,
                d.message
            )),
            None => out.push_str(&format!("warning: {}: {}\n", d.path.display(), d.message)),
        }
    }

    let high = count(result, Severity::High);
    let medium = count(result, Severity::Medium);
    out.push_str(&format!(
        "{} finding(s) ({} high, {} medium), {} diagnostic(s)\n",
        result.findings.len(),
        high,
        medium,
        result.diagnostics.len()
    ));
    out
}

fn count(result: &AnalysisResult, severity: Severity) -> usize {
    result
        .findings
        .iter()
        .filter(|f| f.severity == severity)
        .count()
}
