//! Single-pass scope tracker.
//!
//! Walks one method body, opening an [`AcquisitionSite`] for every call the
//! catalog recognizes as an acquisition and resolving sites as releases are
//! observed. Everything the walk cannot interpret is inert: malformed or
//! unmodeled code degrades to "no findings", never to a failure.
//!
//! The walk is deliberately flow-insensitive beyond lexical scope: each
//! branch arm and loop body is visited exactly once, and a release anywhere
//! in the method discharges the obligation. That trades missed leaks on
//! exotic paths for a near-zero false-positive rate on the common shapes.

use tracing::debug;

use crate::catalog::ResourceCatalog;
use crate::syntax::{Call, MethodBody, ScopeId, ScopeKind, Stmt};

use super::site::{AcquisitionSite, Confidence, LifecycleEvent, SiteState};

pub struct ScopeTracker<'a> {
    catalog: &'a ResourceCatalog,
    sites: Vec<AcquisitionSite>,
}

impl<'a> ScopeTracker<'a> {
    pub fn new(catalog: &'a ResourceCatalog) -> Self {
        Self {
            catalog,
            sites: Vec::new(),
        }
    }

    /// Walk the body and return every site observed, each in a terminal
    /// state. Unresolved sites come back as [`SiteState::Leaked`].
    pub fn run(mut self, body: &MethodBody) -> Vec<AcquisitionSite> {
        debug!(method = %body.name, "tracking method body");
        self.walk(body, body.root(), 0);

        for site in &mut self.sites {
            if site.is_open() {
                site.apply(LifecycleEvent::MethodExit);
                debug!(var = %site.var, kind = %site.kind, "site leaked at method exit");
            }
        }
        self.sites
    }

    fn walk(&mut self, body: &MethodBody, frame: ScopeId, depth: u32) {
        let fr = body.frame(frame);

        for stmt in &fr.resources {
            self.visit(stmt, frame, depth, true);
        }
        for stmt in &fr.stmts {
            match stmt {
                Stmt::Block(inner) => self.walk(body, *inner, depth + 1),
                other => self.visit(other, frame, depth, false),
            }
        }

        // Guaranteed-release-on-exit: everything declared in the construct
        // header is resolved no matter what the block did.
        if fr.kind == ScopeKind::ScopedAcquisition {
            for site in &mut self.sites {
                if site.scoped && site.scope == frame && site.is_open() {
                    site.apply(LifecycleEvent::ScopedExit);
                    debug!(var = %site.var, "site resolved by scoped exit");
                }
            }
        }
        // Try and plain frames propagate their open sites outward.
    }

    fn visit(&mut self, stmt: &Stmt, frame: ScopeId, depth: u32, in_header: bool) {
        match stmt {
            Stmt::Decl {
                var,
                init: Some(call),
                ..
            } => {
                self.observe_escapes(call);
                self.acquire(call, var, frame, depth, in_header);
            }

            // A header resource without an initializer names an existing
            // binding; the construct now owns its release.
            Stmt::Decl {
                var, init: None, ..
            } if in_header => {
                if let Some(site) = self.open_site_mut(var) {
                    site.scoped = true;
                    site.scope = frame;
                }
            }

            Stmt::Assign {
                var,
                value: Some(call),
                ..
            } => {
                // A reassignment does not release the previous handle; the
                // original site stays open and a second one begins.
                self.observe_escapes(call);
                self.acquire(call, var, frame, depth, in_header);
            }

            Stmt::Invoke(call) => {
                if self.try_release(call) {
                    return;
                }
                self.observe_escapes(call);
                if let Some(entry) = self.catalog.lookup(call) {
                    if entry.binds_receiver {
                        if let Some(receiver) = call.receiver.as_deref() {
                            if is_simple_binding(receiver) {
                                self.acquire(call, receiver, frame, depth, in_header);
                            }
                        }
                    }
                }
            }

            // Uninitialized declarations, assignments from non-calls, and
            // statements the model does not represent.
            _ => {}
        }
    }

    fn acquire(&mut self, call: &Call, var: &str, frame: ScopeId, depth: u32, scoped: bool) {
        let entry = match self.catalog.lookup(call) {
            Some(entry) => entry,
            None => return, // not a tracked resource
        };
        debug!(var = %var, kind = %entry.kind, loc = %call.loc, "acquisition site opened");
        self.sites.push(AcquisitionSite {
            kind: entry.kind,
            var: var.to_owned(),
            loc: call.loc,
            scope: frame,
            depth,
            scoped,
            state: SiteState::Open,
            confidence: Confidence::Certain,
            release: entry.release,
            auto_closeable: entry.auto_closeable,
        });
    }

    /// Resolve the most recent open site whose binding is the call's
    /// receiver and whose obligation names the called method. Binding
    /// match, not type match: `a.close()` never discharges `b`.
    fn try_release(&mut self, call: &Call) -> bool {
        let receiver = match call.receiver.as_deref() {
            Some(r) => r,
            None => return false,
        };
        for site in self.sites.iter_mut().rev() {
            if site.is_open() && site.var == receiver && site.release.contains(&call.method.as_str())
            {
                site.apply(LifecycleEvent::ExplicitRelease);
                debug!(var = %site.var, method = %call.method, "site resolved by explicit release");
                return true;
            }
        }
        false
    }

    /// A handle passed by name to some call either transfers its release
    /// obligation (catalog says so) or leaves the site open with lowered
    /// confidence. Never silently suppressed.
    fn observe_escapes(&mut self, call: &Call) {
        if call.args.is_empty() {
            return;
        }
        let transfers = self.catalog.transfers_ownership(call);
        for arg in &call.args {
            for site in self.sites.iter_mut().rev() {
                if site.is_open() && &site.var == arg {
                    if transfers {
                        site.apply(LifecycleEvent::ExplicitRelease);
                        debug!(var = %site.var, "release responsibility transferred");
                    } else {
                        site.confidence = Confidence::Possible;
                    }
                    break;
                }
            }
        }
    }

    fn open_site_mut(&mut self, var: &str) -> Option<&mut AcquisitionSite> {
        self.sites
            .iter_mut()
            .rev()
            .find(|s| s.is_open() && s.var == var)
    }
}

fn is_simple_binding(receiver: &str) -> bool {
    !receiver.is_empty()
        && receiver
            .chars()
            .all(|c| c.is_alphanumeric() || c == '_' || c == '$')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{MethodNamed, ResourceCatalog, ResourceKind};
    use crate::syntax::{Call, Loc, MethodBody, ScopeKind, Stmt};

    fn decl(var: &str, call: Call) -> Stmt {
        let loc = call.loc;
        Stmt::Decl {
            var: var.into(),
            init: Some(call),
            loc,
        }
    }

    fn leaked(sites: &[AcquisitionSite]) -> Vec<&AcquisitionSite> {
        sites.iter().filter(|s| s.state == SiteState::Leaked).collect()
    }

    #[test]
    fn unreleased_acquisition_leaks_at_method_exit() {
        let catalog = ResourceCatalog::builtin();
        let mut body = MethodBody::new("leak", 1);
        body.push_stmt(
            body.root(),
            decl("in", Call::constructor("FileInputStream", Loc::new(2, 9))),
        );

        let sites = ScopeTracker::new(&catalog).run(&body);
        let leaked = leaked(&sites);
        assert_eq!(leaked.len(), 1);
        assert_eq!(leaked[0].kind, ResourceKind::Stream);
        assert_eq!(leaked[0].var, "in");
        assert_eq!(leaked[0].confidence, Confidence::Certain);
    }

    #[test]
    fn explicit_release_resolves_the_binding() {
        let catalog = ResourceCatalog::builtin();
        let mut body = MethodBody::new("tidy", 1);
        let root = body.root();
        body.push_stmt(
            root,
            decl("in", Call::constructor("FileInputStream", Loc::new(2, 9))),
        );
        body.push_stmt(root, Stmt::Invoke(Call::method(Some("in"), "close", Loc::new(3, 9))));

        let sites = ScopeTracker::new(&catalog).run(&body);
        assert!(leaked(&sites).is_empty());
        assert_eq!(sites[0].state, SiteState::Resolved);
    }

    #[test]
    fn release_matches_binding_not_kind() {
        let catalog = ResourceCatalog::builtin();
        let mut body = MethodBody::new("m", 1);
        let root = body.root();
        body.push_stmt(
            root,
            decl("a", Call::constructor("FileInputStream", Loc::new(2, 9))),
        );
        body.push_stmt(
            root,
            decl("b", Call::constructor("FileInputStream", Loc::new(3, 9))),
        );
        body.push_stmt(root, Stmt::Invoke(Call::method(Some("b"), "close", Loc::new(4, 9))));

        let sites = ScopeTracker::new(&catalog).run(&body);
        let leaked = leaked(&sites);
        assert_eq!(leaked.len(), 1);
        assert_eq!(leaked[0].var, "a");
    }

    #[test]
    fn scoped_header_resolves_without_explicit_release() {
        let catalog = ResourceCatalog::builtin();
        let mut body = MethodBody::new("tidy", 1);
        let scope = body.push_frame(body.root(), ScopeKind::ScopedAcquisition);
        body.push_resource(
            scope,
            decl(
                "stmt",
                Call::method(Some("conn"), "createStatement", Loc::new(2, 14)),
            ),
        );

        let sites = ScopeTracker::new(&catalog).run(&body);
        assert!(leaked(&sites).is_empty());
    }

    #[test]
    fn try_frame_propagates_open_sites() {
        let catalog = ResourceCatalog::builtin();
        let mut body = MethodBody::new("m", 1);
        let try_frame = body.push_frame(body.root(), ScopeKind::Try);
        body.push_stmt(
            try_frame,
            decl("in", Call::constructor("FileInputStream", Loc::new(3, 13))),
        );

        let sites = ScopeTracker::new(&catalog).run(&body);
        assert_eq!(leaked(&sites).len(), 1);
    }

    #[test]
    fn reassignment_creates_a_second_independent_site() {
        let catalog = ResourceCatalog::builtin();
        let mut body = MethodBody::new("m", 1);
        let root = body.root();
        body.push_stmt(
            root,
            decl("s", Call::method(Some("conn"), "createStatement", Loc::new(2, 13))),
        );
        body.push_stmt(
            root,
            Stmt::Assign {
                var: "s".into(),
                value: Some(Call::method(Some("conn"), "createStatement", Loc::new(3, 9))),
                loc: Loc::new(3, 5),
            },
        );
        body.push_stmt(root, Stmt::Invoke(Call::method(Some("s"), "close", Loc::new(4, 5))));

        let sites = ScopeTracker::new(&catalog).run(&body);
        assert_eq!(sites.len(), 2);
        // close() discharges the most recent acquisition; the first handle
        // was overwritten and leaks.
        let leaked = leaked(&sites);
        assert_eq!(leaked.len(), 1);
        assert_eq!(leaked[0].loc.line, 2);
    }

    #[test]
    fn escape_to_unknown_call_lowers_confidence_but_reports() {
        let catalog = ResourceCatalog::builtin();
        let mut body = MethodBody::new("m", 1);
        let root = body.root();
        body.push_stmt(
            root,
            decl(
                "rs",
                Call::method(Some("stmt"), "executeQuery", Loc::new(2, 20)),
            ),
        );
        body.push_stmt(
            root,
            Stmt::Invoke(Call::method(Some("System.out"), "println", Loc::new(3, 9)).with_args(&["rs"])),
        );

        let sites = ScopeTracker::new(&catalog).run(&body);
        let leaked = leaked(&sites);
        assert_eq!(leaked.len(), 1);
        assert_eq!(leaked[0].confidence, Confidence::Possible);
    }

    #[test]
    fn transfer_signature_discharges_the_obligation() {
        let catalog =
            ResourceCatalog::builtin().with_transfer(Box::new(MethodNamed { name: "adopt" }));
        let mut body = MethodBody::new("m", 1);
        let root = body.root();
        body.push_stmt(
            root,
            decl("in", Call::constructor("FileInputStream", Loc::new(2, 9))),
        );
        body.push_stmt(
            root,
            Stmt::Invoke(Call::method(Some("registry"), "adopt", Loc::new(3, 9)).with_args(&["in"])),
        );

        let sites = ScopeTracker::new(&catalog).run(&body);
        assert!(leaked(&sites).is_empty());
    }

    #[test]
    fn lock_acquisition_binds_the_receiver() {
        let catalog = ResourceCatalog::builtin();
        let mut body = MethodBody::new("m", 1);
        let root = body.root();
        body.push_stmt(root, Stmt::Invoke(Call::method(Some("mutex"), "lock", Loc::new(2, 9))));

        let sites = ScopeTracker::new(&catalog).run(&body);
        let leaked = leaked(&sites);
        assert_eq!(leaked.len(), 1);
        assert_eq!(leaked[0].kind, ResourceKind::Lock);
        assert_eq!(leaked[0].var, "mutex");

        // And unlock() resolves it.
        body.push_stmt(root, Stmt::Invoke(Call::method(Some("mutex"), "unlock", Loc::new(3, 9))));
        let sites = ScopeTracker::new(&catalog).run(&body);
        assert!(sites.iter().all(|s| s.state == SiteState::Resolved));
    }

    #[test]
    fn predeclared_resource_is_adopted_by_the_construct() {
        let catalog = ResourceCatalog::builtin();
        let mut body = MethodBody::new("m", 1);
        let root = body.root();
        body.push_stmt(
            root,
            decl("in", Call::constructor("FileInputStream", Loc::new(2, 9))),
        );
        let scope = body.push_frame(root, ScopeKind::ScopedAcquisition);
        body.push_resource(
            scope,
            Stmt::Decl {
                var: "in".into(),
                init: None,
                loc: Loc::new(3, 10),
            },
        );

        let sites = ScopeTracker::new(&catalog).run(&body);
        assert!(leaked(&sites).is_empty());
    }

    #[test]
    fn unrecognized_statements_are_inert() {
        let catalog = ResourceCatalog::builtin();
        let mut body = MethodBody::new("m", 1);
        let root = body.root();
        body.push_stmt(root, Stmt::Opaque);
        body.push_stmt(
            root,
            Stmt::Invoke(Call::method(Some("widget"), "refresh", Loc::new(2, 9))),
        );
        body.push_stmt(
            root,
            decl("p", Call::constructor("ProcessBuilder", Loc::new(3, 9))),
        );

        let sites = ScopeTracker::new(&catalog).run(&body);
        assert!(sites.is_empty());
    }
}
