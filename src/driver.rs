//! Rule driver: the public entry point.
//!
//! Runs the scope tracker over every method of every source unit, merging
//! per-unit fragments into one [`AnalysisResult`]. Nothing here is fatal:
//! a method that cannot be parsed, or that trips an internal error, costs a
//! diagnostic and nothing else.

use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rayon::prelude::*;
use tracing::{debug, warn};

use crate::analysis::ScopeTracker;
use crate::catalog::ResourceCatalog;
use crate::report::{report, AnalysisResult, Diagnostic};
use crate::syntax::{self, MethodBody};

/// One unit of source text, as handed over by the source provider.
/// The text is assumed to be UTF-8 Java; discovery and decoding happen
/// before analysis.
#[derive(Debug, Clone)]
pub struct SourceUnit {
    pub path: PathBuf,
    pub text: String,
}

impl SourceUnit {
    pub fn new(path: impl Into<PathBuf>, text: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            text: text.into(),
        }
    }
}

/// Cooperative cancellation, checked between methods. Never preemptive:
/// a method body is small, bounded work.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Orchestrates catalog, tracker and reporter.
pub struct RuleDriver {
    catalog: Arc<ResourceCatalog>,
    cancel: CancelFlag,
}

impl RuleDriver {
    pub fn new(catalog: ResourceCatalog) -> Self {
        Self {
            catalog: Arc::new(catalog),
            cancel: CancelFlag::new(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn catalog(&self) -> &ResourceCatalog {
        &self.catalog
    }

    /// Analyze one source unit. Always returns a result; partial when some
    /// methods could not be handled.
    pub fn analyze(&self, unit: &SourceUnit) -> AnalysisResult {
        let mut result = AnalysisResult::default();

        let lowered = match syntax::lower_unit(&unit.text) {
            Ok(lowered) => lowered,
            Err(e) => {
                warn!(path = %unit.path.display(), error = %e, "source unit not analyzable");
                result.diagnostics.push(Diagnostic {
                    path: unit.path.clone(),
                    method: None,
                    line: None,
                    message: e.to_string(),
                });
                return result;
            }
        };

        for failure in &lowered.failures {
            result.diagnostics.push(Diagnostic {
                path: unit.path.clone(),
                method: Some(failure.name.clone()),
                line: Some(failure.line),
                message: format!("method body of `{}` could not be parsed; skipped", failure.name),
            });
        }

        for (idx, method) in lowered.methods.iter().enumerate() {
            if self.cancel.is_cancelled() {
                let remaining = lowered.methods.len() - idx;
                debug!(path = %unit.path.display(), remaining, "analysis cancelled");
                result.diagnostics.push(Diagnostic {
                    path: unit.path.clone(),
                    method: None,
                    line: None,
                    message: format!("analysis cancelled; {remaining} method(s) skipped"),
                });
                break;
            }
            self.analyze_method(unit, method, &mut result);
        }

        result
    }

    /// Per-method boundary: an unexpected panic in one method's analysis is
    /// isolated here and reported as a diagnostic.
    fn analyze_method(&self, unit: &SourceUnit, method: &MethodBody, result: &mut AnalysisResult) {
        let catalog = &*self.catalog;
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            let sites = ScopeTracker::new(catalog).run(method);
            report(&unit.path, &method.name, &sites)
        }));
        match outcome {
            Ok(findings) => result.findings.extend(findings),
            Err(_) => {
                warn!(
                    path = %unit.path.display(),
                    method = %method.name,
                    "internal error while analyzing method"
                );
                result.diagnostics.push(Diagnostic {
                    path: unit.path.clone(),
                    method: Some(method.name.clone()),
                    line: Some(method.line),
                    message: format!(
                        "internal error while analyzing `{}`; method skipped",
                        method.name
                    ),
                });
            }
        }
    }

    /// Analyze many units on the rayon pool. Each worker produces an
    /// independent fragment; fragments are concatenated, then ordered, so
    /// no locking is involved and worker scheduling cannot change the
    /// output.
    pub fn analyze_all(&self, units: &[SourceUnit]) -> AnalysisResult {
        let mut result = units
            .par_iter()
            .map(|unit| self.analyze(unit))
            .reduce(AnalysisResult::default, |mut acc, fragment| {
                acc.merge(fragment);
                acc
            });

        result
            .findings
            .sort_by(|a, b| (&a.path, a.line, a.col).cmp(&(&b.path, b.line, b.col)));
        result
            .diagnostics
            .sort_by(|a, b| (&a.path, a.line).cmp(&(&b.path, b.line)));
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{ResourceCatalog, ResourceKind};
    use crate::report::Severity;

    fn driver() -> RuleDriver {
        RuleDriver::new(ResourceCatalog::builtin())
    }

    #[test]
    fn unclosed_executor_is_one_medium_thread_pool_finding() {
        let unit = SourceUnit::new(
            "Scenario.java",
            r#"
            class Scenario {
                void leak() {
                    ExecutorService exec = Executors.newSingleThreadExecutor();
                    exec.submit(task);
                }
            }
            "#,
        );
        let result = driver().analyze(&unit);
        assert_eq!(result.findings.len(), 1);
        let f = &result.findings[0];
        assert_eq!(f.kind, ResourceKind::ThreadPool);
        assert_eq!(f.severity, Severity::Medium);
        assert_eq!(f.var, "exec");
        assert!(result.diagnostics.is_empty());
    }

    #[test]
    fn scoped_jdbc_method_is_clean() {
        let unit = SourceUnit::new(
            "Scenario.java",
            r#"
            class Scenario {
                void tidy(Connection conn) throws SQLException {
                    try (Statement stmt = conn.createStatement();
                         PreparedStatement ps = conn.prepareStatement("SELECT 1");
                         ResultSet rs = stmt.executeQuery("SELECT NOW()")) {
                        ps.setInt(1, 42);
                        if (rs.next()) {
                            System.out.println(rs.getString(1));
                        }
                    }
                }
            }
            "#,
        );
        let result = driver().analyze(&unit);
        assert!(result.findings.is_empty(), "{:?}", result.findings);
    }

    #[test]
    fn unclosed_jdbc_method_yields_one_finding_per_handle() {
        let unit = SourceUnit::new(
            "Scenario.java",
            r#"
            class Scenario {
                void leakJdbc(Connection conn) throws SQLException {
                    Statement stmt = conn.createStatement();
                    PreparedStatement ps = conn.prepareStatement("SELECT 1");
                    ps.setInt(1, 42);
                    ResultSet rs = stmt.executeQuery("SELECT NOW()");
                    System.out.println(rs);
                }
            }
            "#,
        );
        let result = driver().analyze(&unit);
        assert_eq!(result.findings.len(), 3);
        let kinds: Vec<_> = result.findings.iter().map(|f| f.kind).collect();
        assert_eq!(
            kinds,
            vec![
                ResourceKind::Statement,
                ResourceKind::PreparedStatement,
                ResourceKind::ResultSet
            ]
        );
        assert!(result.findings.iter().all(|f| f.severity == Severity::High));
    }

    #[test]
    fn analyze_is_idempotent() {
        let unit = SourceUnit::new(
            "Scenario.java",
            r#"
            class Scenario {
                void leak() throws IOException {
                    FileInputStream in = new FileInputStream("/tmp/data.txt");
                    System.out.println(in.read());
                }
            }
            "#,
        );
        let d = driver();
        let first = d.analyze(&unit);
        let second = d.analyze(&unit);
        assert_eq!(first, second);
        assert_eq!(first.findings.len(), 1);
    }

    #[test]
    fn broken_method_is_a_diagnostic_not_a_failure() {
        let unit = SourceUnit::new(
            "Scenario.java",
            r#"
            class Scenario {
                void broken() { int = ; }
                void leak() throws IOException {
                    FileInputStream in = new FileInputStream("/tmp/data.txt");
                }
            }
            "#,
        );
        let result = driver().analyze(&unit);
        assert_eq!(result.diagnostics.len(), 1);
        assert_eq!(result.diagnostics[0].method.as_deref(), Some("broken"));
        // The parseable sibling is still analyzed.
        assert_eq!(result.findings.len(), 1);
    }

    #[test]
    fn cancellation_skips_remaining_methods() {
        let cancel = CancelFlag::new();
        cancel.cancel();
        let driver = RuleDriver::new(ResourceCatalog::builtin()).with_cancel(cancel);
        let unit = SourceUnit::new(
            "Scenario.java",
            r#"
            class Scenario {
                void leak() throws IOException {
                    FileInputStream in = new FileInputStream("/tmp/data.txt");
                }
            }
            "#,
        );
        let result = driver.analyze(&unit);
        assert!(result.findings.is_empty());
        assert_eq!(result.diagnostics.len(), 1);
        assert!(result.diagnostics[0].message.contains("cancelled"));
    }

    #[test]
    fn analyze_all_orders_findings_by_path_then_location() {
        let a = SourceUnit::new(
            "b/Late.java",
            r#"
            class Late {
                void leak() throws IOException {
                    FileInputStream in = new FileInputStream("/tmp/x");
                }
            }
            "#,
        );
        let b = SourceUnit::new(
            "a/Early.java",
            r#"
            class Early {
                void leak(Connection conn) throws SQLException {
                    Statement s = conn.createStatement();
                }
            }
            "#,
        );
        let result = driver().analyze_all(&[a, b]);
        assert_eq!(result.findings.len(), 2);
        assert_eq!(result.findings[0].path, PathBuf::from("a/Early.java"));
        assert_eq!(result.findings[1].path, PathBuf::from("b/Late.java"));
    }

    #[test]
    fn process_launches_are_never_flagged() {
        let unit = SourceUnit::new(
            "Scenario.java",
            r#"
            class Scenario {
                void spawn() throws IOException {
                    Process p = new ProcessBuilder("ls").start();
                    Runtime.getRuntime().exec("true");
                }
            }
            "#,
        );
        let result = driver().analyze(&unit);
        assert!(result.findings.is_empty());
    }
}
