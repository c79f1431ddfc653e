//! Registry of resource acquisition and release signatures.
//!
//! The catalog is built once, is read-only afterwards, and is shared by
//! reference across analysis workers. Each entry carries its own matching
//! capability so new acquisition shapes slot in without touching the
//! tracker.

use serde::{Deserialize, Serialize};

use crate::syntax::Call;

/// Category of acquired handle requiring deterministic release.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceKind {
    Stream,
    ThreadPool,
    Statement,
    PreparedStatement,
    ResultSet,
    Connection,
    Lock,
}

impl ResourceKind {
    pub fn label(&self) -> &'static str {
        match self {
            ResourceKind::Stream => "stream",
            ResourceKind::ThreadPool => "thread-pool",
            ResourceKind::Statement => "statement",
            ResourceKind::PreparedStatement => "prepared-statement",
            ResourceKind::ResultSet => "result-set",
            ResourceKind::Connection => "connection",
            ResourceKind::Lock => "lock",
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Matching capability: does a call fit this signature?
pub trait SignatureMatcher: Send + Sync {
    fn matches(&self, call: &Call) -> bool;
}

/// Constructor whose type name ends with one of the given suffixes
/// (`new FileInputStream(..)`, `new BufferedReader(..)`).
pub struct ConstructorSuffix {
    pub suffixes: &'static [&'static str],
}

impl SignatureMatcher for ConstructorSuffix {
    fn matches(&self, call: &Call) -> bool {
        call.constructor && self.suffixes.iter().any(|s| call.method.ends_with(s))
    }
}

/// Static factory call: fixed receiver, method-name prefix
/// (`Executors.newFixedThreadPool(..)`).
pub struct StaticFactory {
    pub receiver: &'static str,
    pub prefix: &'static str,
}

impl SignatureMatcher for StaticFactory {
    fn matches(&self, call: &Call) -> bool {
        !call.constructor
            && call.receiver.as_deref() == Some(self.receiver)
            && call.method.starts_with(self.prefix)
    }
}

/// Instance method matched by name alone, on any receiver
/// (`conn.createStatement()`).
pub struct MethodNamed {
    pub name: &'static str,
}

impl SignatureMatcher for MethodNamed {
    fn matches(&self, call: &Call) -> bool {
        !call.constructor && call.receiver.is_some() && call.method == self.name
    }
}

/// Method matched by receiver text and name
/// (`DriverManager.getConnection(..)`).
pub struct ReceiverMethod {
    pub receiver: &'static str,
    pub name: &'static str,
}

impl SignatureMatcher for ReceiverMethod {
    fn matches(&self, call: &Call) -> bool {
        !call.constructor
            && call.receiver.as_deref() == Some(self.receiver)
            && call.method == self.name
    }
}

/// One acquisition pattern and the obligation it creates.
pub struct CatalogEntry {
    pub kind: ResourceKind,
    /// Method names that discharge the obligation on the bound variable.
    pub release: &'static [&'static str],
    /// Whether the acquired type participates in scoped-acquisition
    /// constructs (Java: implements AutoCloseable).
    pub auto_closeable: bool,
    /// For acquisitions observed as bare call statements (`mutex.lock()`),
    /// the receiver is the tracked binding instead of a declarator.
    pub binds_receiver: bool,
    matcher: Box<dyn SignatureMatcher>,
}

impl CatalogEntry {
    pub fn new(
        kind: ResourceKind,
        release: &'static [&'static str],
        matcher: Box<dyn SignatureMatcher>,
    ) -> Self {
        Self {
            kind,
            release,
            auto_closeable: true,
            binds_receiver: false,
            matcher,
        }
    }

    pub fn not_auto_closeable(mut self) -> Self {
        self.auto_closeable = false;
        self
    }

    pub fn binds_receiver(mut self) -> Self {
        self.binds_receiver = true;
        self
    }

    pub fn matches(&self, call: &Call) -> bool {
        self.matcher.matches(call)
    }

    pub fn releases(&self, method: &str) -> bool {
        self.release.contains(&method)
    }
}

impl std::fmt::Debug for CatalogEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CatalogEntry")
            .field("kind", &self.kind)
            .field("release", &self.release)
            .field("auto_closeable", &self.auto_closeable)
            .finish()
    }
}

/// Immutable acquisition registry. Construct once, pass by reference into
/// every analysis.
pub struct ResourceCatalog {
    entries: Vec<CatalogEntry>,
    transfers: Vec<Box<dyn SignatureMatcher>>,
}

impl ResourceCatalog {
    pub fn empty() -> Self {
        Self {
            entries: Vec::new(),
            transfers: Vec::new(),
        }
    }

    /// The built-in Java catalog.
    ///
    /// Process launches (`Runtime.exec`, `new ProcessBuilder(..)`) have no
    /// paired release and are deliberately absent.
    pub fn builtin() -> Self {
        Self::empty()
            .with_entry(CatalogEntry::new(
                ResourceKind::Stream,
                &["close"],
                Box::new(ConstructorSuffix {
                    suffixes: &["InputStream", "OutputStream", "Reader", "Writer"],
                }),
            ))
            .with_entry(
                CatalogEntry::new(
                    ResourceKind::ThreadPool,
                    &["shutdown", "shutdownNow"],
                    Box::new(StaticFactory {
                        receiver: "Executors",
                        prefix: "new",
                    }),
                )
                .not_auto_closeable(),
            )
            .with_entry(CatalogEntry::new(
                ResourceKind::Statement,
                &["close"],
                Box::new(MethodNamed {
                    name: "createStatement",
                }),
            ))
            .with_entry(CatalogEntry::new(
                ResourceKind::PreparedStatement,
                &["close"],
                Box::new(MethodNamed {
                    name: "prepareStatement",
                }),
            ))
            // Callable statements are statement handles as far as release
            // obligations go.
            .with_entry(CatalogEntry::new(
                ResourceKind::Statement,
                &["close"],
                Box::new(MethodNamed { name: "prepareCall" }),
            ))
            .with_entry(CatalogEntry::new(
                ResourceKind::ResultSet,
                &["close"],
                Box::new(MethodNamed {
                    name: "executeQuery",
                }),
            ))
            .with_entry(CatalogEntry::new(
                ResourceKind::Connection,
                &["close"],
                Box::new(ReceiverMethod {
                    receiver: "DriverManager",
                    name: "getConnection",
                }),
            ))
            .with_entry(
                CatalogEntry::new(
                    ResourceKind::Lock,
                    &["unlock"],
                    Box::new(MethodNamed { name: "lock" }),
                )
                .not_auto_closeable()
                .binds_receiver(),
            )
    }

    pub fn with_entry(mut self, entry: CatalogEntry) -> Self {
        self.entries.push(entry);
        self
    }

    /// Register a call signature that takes over release responsibility for
    /// handles passed to it. Empty by default: an unknown callee never
    /// silently discharges an obligation.
    pub fn with_transfer(mut self, matcher: Box<dyn SignatureMatcher>) -> Self {
        self.transfers.push(matcher);
        self
    }

    /// First matching entry wins. Pure; a miss means "not a tracked
    /// resource".
    pub fn lookup(&self, call: &Call) -> Option<&CatalogEntry> {
        self.entries.iter().find(|e| e.matches(call))
    }

    pub fn transfers_ownership(&self, call: &Call) -> bool {
        self.transfers.iter().any(|m| m.matches(call))
    }
}

impl std::fmt::Debug for ResourceCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceCatalog")
            .field("entries", &self.entries.len())
            .field("transfers", &self.transfers.len())
            .finish()
    }
}
