//! Lifecycle tracking: the acquisition-site state machine and the
//! single-pass scope tracker that drives it.

mod site;
mod tracker;

pub use site::{AcquisitionSite, Confidence, LifecycleEvent, SiteState};
pub use tracker::ScopeTracker;
