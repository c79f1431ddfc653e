//! Syntax model and the Java front end that produces it.

pub mod java;
pub mod model;

pub use java::{lower_unit, LoweredUnit, MethodFailure, ParseError};
pub use model::{Call, Loc, MethodBody, ScopeFrame, ScopeId, ScopeKind, Stmt};
