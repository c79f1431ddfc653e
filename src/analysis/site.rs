//! Lifecycle state for one tracked acquisition.
//!
//! State transitions are centralized in [`SiteState::transition`]. The
//! machine is small: a site opens when an acquisition is observed and ends
//! in exactly one of two terminal states.
//!
//! ```text
//! From     | Event           | To
//! ---------|-----------------|----------
//! Open     | ExplicitRelease | Resolved
//! Open     | ScopedExit      | Resolved
//! Open     | MethodExit      | Leaked
//! Resolved | (any)           | Resolved
//! Leaked   | (any)           | Leaked
//! ```

use serde::{Deserialize, Serialize};

use crate::catalog::ResourceKind;
use crate::syntax::{Loc, ScopeId};

/// Events that move a site through its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// A call matching the site's release obligation, on the site's binding.
    ExplicitRelease,
    /// The scoped-acquisition construct owning the site exited.
    ScopedExit,
    /// The method ended with the site still open.
    MethodExit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SiteState {
    Open,
    Resolved,
    Leaked,
}

impl SiteState {
    /// Apply a lifecycle event. `Resolved` and `Leaked` are terminal and
    /// absorb further events.
    pub fn transition(self, event: LifecycleEvent) -> SiteState {
        match (self, event) {
            (SiteState::Open, LifecycleEvent::ExplicitRelease)
            | (SiteState::Open, LifecycleEvent::ScopedExit) => SiteState::Resolved,
            (SiteState::Open, LifecycleEvent::MethodExit) => SiteState::Leaked,
            (terminal, _) => terminal,
        }
    }
}

/// How sure the tracker is that an open site really leaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    /// The handle never left the method.
    Certain,
    /// The handle was passed to a call the catalog knows nothing about;
    /// the callee might release it.
    Possible,
}

/// One tracked acquisition within a method's analysis.
#[derive(Debug, Clone)]
pub struct AcquisitionSite {
    pub kind: ResourceKind,
    /// The variable bound to the handle.
    pub var: String,
    /// Acquisition location.
    pub loc: Loc,
    /// Frame the site was created in.
    pub scope: ScopeId,
    /// Nesting depth of that frame.
    pub depth: u32,
    /// Declared in a scoped-acquisition header; resolved on construct exit.
    pub scoped: bool,
    pub state: SiteState,
    pub confidence: Confidence,
    /// Release obligation: method names that discharge this site.
    pub release: &'static [&'static str],
    pub auto_closeable: bool,
}

impl AcquisitionSite {
    pub fn is_open(&self) -> bool {
        self.state == SiteState::Open
    }

    pub fn apply(&mut self, event: LifecycleEvent) {
        self.state = self.state.transition(event);
    }
}
