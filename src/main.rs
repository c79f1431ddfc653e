use std::fs;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::Result;
use bpaf::Bpaf;
use leakcheck::{render, ReportFormat, ResourceCatalog, RuleDriver, Severity, SourceUnit};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use walkdir::WalkDir;

/// Output format for findings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum Format {
    #[default]
    Text,
    Json,
}

impl FromStr for Format {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        ReportFormat::parse(s)
            .map(|f| match f {
                ReportFormat::Text => Format::Text,
                ReportFormat::Json => Format::Json,
            })
            .ok_or_else(|| format!("unknown format '{}'; expected: text, json", s))
    }
}

impl From<Format> for ReportFormat {
    fn from(f: Format) -> Self {
        match f {
            Format::Text => ReportFormat::Text,
            Format::Json => ReportFormat::Json,
        }
    }
}

/// Minimum severity worth reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Threshold(Severity);

impl Default for Threshold {
    fn default() -> Self {
        Threshold(Severity::Low)
    }
}

impl FromStr for Threshold {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Severity::parse(s)
            .map(Threshold)
            .ok_or_else(|| format!("unknown severity '{}'; expected: low, medium, high", s))
    }
}

#[derive(Debug, Clone, Bpaf)]
#[bpaf(options, version, fallback_to_usage)]
/// Static detector for resource leaks in Java source
///
/// Reports resources acquired without a guaranteed release: unclosed
/// streams, executor services that are never shut down, dangling JDBC
/// handles, locks without unlock.
enum Cmd {
    /// Scan Java files or directories for resource leaks
    #[bpaf(command)]
    Scan {
        /// Output format [text (default), json]
        #[bpaf(short, long, argument("FORMAT"), fallback(Format::default()))]
        format: Format,

        /// Minimum severity to report [low (default), medium, high]
        #[bpaf(long, argument("SEVERITY"), fallback(Threshold::default()))]
        severity_threshold: Threshold,

        /// Files or directories to scan
        #[bpaf(positional("PATH"), some("at least one path is required"))]
        paths: Vec<PathBuf>,
    },
}

fn main() -> Result<()> {
    use bpaf::Args;

    let cmd = match cmd().run_inner(Args::current_args()) {
        Ok(cmd) => cmd,
        Err(bpaf::ParseFailure::Stdout(msg, _)) => {
            print!("{}", msg);
            std::process::exit(0);
        }
        Err(bpaf::ParseFailure::Completion(c)) => {
            print!("{}", c);
            std::process::exit(0);
        }
        Err(bpaf::ParseFailure::Stderr(msg)) => {
            eprintln!("{}", msg);
            std::process::exit(1);
        }
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    match cmd {
        Cmd::Scan {
            format,
            severity_threshold,
            paths,
        } => {
            let units = collect_units(&paths);
            if units.is_empty() {
                eprintln!("no Java sources found under the given paths");
                return Ok(());
            }

            let driver = RuleDriver::new(ResourceCatalog::builtin());
            let mut result = driver.analyze_all(&units);
            result.findings.retain(|f| f.severity >= severity_threshold.0);

            print!("{}", render(&result, format.into()));

            if !result.findings.is_empty() {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}

/// Walk the given paths and read every `.java` file into a source unit.
/// Unreadable files are skipped with a note on stderr; discovery problems
/// never abort the scan.
fn collect_units(paths: &[PathBuf]) -> Vec<SourceUnit> {
    let mut units = Vec::new();
    for root in paths {
        for entry in WalkDir::new(root).into_iter().filter_map(|e| e.ok()) {
            let path = entry.path();
            if !path.is_file() || path.extension().and_then(|e| e.to_str()) != Some("java") {
                continue;
            }
            match fs::read_to_string(path) {
                Ok(text) => units.push(SourceUnit::new(path, text)),
                Err(e) => eprintln!("skipping {}: {}", path.display(), e),
            }
        }
    }
    units
}
