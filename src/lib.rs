//! leakcheck: resource-leak detector for Java source.
//!
//! Lowers method bodies into a language-agnostic scope tree, then tracks
//! every acquired resource (streams, executor services, JDBC handles,
//! locks) through its scopes and reports any acquisition with no
//! guaranteed release.

pub mod analysis;
pub mod catalog;
pub mod driver;
pub mod report;
pub mod syntax;

pub use analysis::{AcquisitionSite, Confidence, ScopeTracker, SiteState};
pub use catalog::{CatalogEntry, ResourceCatalog, ResourceKind, SignatureMatcher};
pub use driver::{CancelFlag, RuleDriver, SourceUnit};
pub use report::{render, AnalysisResult, Diagnostic, Finding, ReportFormat, Severity};
