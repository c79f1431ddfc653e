//! Language-agnostic model of a method body.
//!
//! A method body is a tree of [`ScopeFrame`]s held in an arena indexed by
//! [`ScopeId`]; parents are referenced by index, never by pointer, so nested
//! and re-entrant scope structures cannot form ownership cycles. Statements
//! keep only what lifecycle tracking needs: bindings, calls, and nesting.

use serde::{Deserialize, Serialize};

/// Arena index of a scope frame within one method body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScopeId(pub u32);

/// What kind of block a scope frame models.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    /// Ordinary block: method body, branch arm, loop body, finally block.
    Plain,
    /// A `try` block without a resource header.
    Try,
    /// A construct that guarantees release of its header resources on every
    /// exit path (Java try-with-resources).
    ScopedAcquisition,
}

/// A source location, 1-based line and column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Loc {
    pub line: u32,
    pub col: u32,
}

impl Loc {
    pub fn new(line: u32, col: u32) -> Self {
        Self { line, col }
    }
}

impl std::fmt::Display for Loc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.line, self.col)
    }
}

/// A call expression reduced to the parts signature matching needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    /// Receiver text before the dot (`conn`, `Executors`, `System.out`).
    /// `None` for constructors and unqualified calls.
    pub receiver: Option<String>,
    /// Method name, or the constructed type name for constructors.
    pub method: String,
    /// True for `new T(..)` expressions.
    pub constructor: bool,
    /// Bare identifier arguments. Nested expressions are dropped; only a
    /// handle passed directly by name can escape.
    pub args: Vec<String>,
    pub loc: Loc,
}

impl Call {
    pub fn constructor(type_name: impl Into<String>, loc: Loc) -> Self {
        Self {
            receiver: None,
            method: type_name.into(),
            constructor: true,
            args: Vec::new(),
            loc,
        }
    }

    pub fn method(
        receiver: Option<&str>,
        method: impl Into<String>,
        loc: Loc,
    ) -> Self {
        Self {
            receiver: receiver.map(str::to_owned),
            method: method.into(),
            constructor: false,
            args: Vec::new(),
            loc,
        }
    }

    pub fn with_args(mut self, args: &[&str]) -> Self {
        self.args = args.iter().map(|a| (*a).to_owned()).collect();
        self
    }
}

/// One statement as the tracker sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stmt {
    /// Local declaration, possibly initialized by a call.
    Decl {
        var: String,
        init: Option<Call>,
        loc: Loc,
    },
    /// Reassignment of an existing binding.
    Assign {
        var: String,
        value: Option<Call>,
        loc: Loc,
    },
    /// Expression statement consisting of a call.
    Invoke(Call),
    /// A nested scope frame.
    Block(ScopeId),
    /// Anything the model does not represent. Inert during tracking.
    Opaque,
}

/// One scope frame in the method-body arena.
#[derive(Debug, Clone)]
pub struct ScopeFrame {
    pub kind: ScopeKind,
    pub parent: Option<ScopeId>,
    /// Header declarations of a scoped-acquisition construct; empty for
    /// every other kind.
    pub resources: Vec<Stmt>,
    pub stmts: Vec<Stmt>,
}

/// A parsed method body: frame arena plus the root frame.
#[derive(Debug, Clone)]
pub struct MethodBody {
    pub name: String,
    /// Line of the method's declaration, 1-based.
    pub line: u32,
    frames: Vec<ScopeFrame>,
    root: ScopeId,
}

impl MethodBody {
    pub fn new(name: impl Into<String>, line: u32) -> Self {
        let root = ScopeFrame {
            kind: ScopeKind::Plain,
            parent: None,
            resources: Vec::new(),
            stmts: Vec::new(),
        };
        Self {
            name: name.into(),
            line,
            frames: vec![root],
            root: ScopeId(0),
        }
    }

    pub fn root(&self) -> ScopeId {
        self.root
    }

    /// Allocate a child frame and link it into its parent's statement list.
    pub fn push_frame(&mut self, parent: ScopeId, kind: ScopeKind) -> ScopeId {
        let id = ScopeId(self.frames.len() as u32);
        self.frames.push(ScopeFrame {
            kind,
            parent: Some(parent),
            resources: Vec::new(),
            stmts: Vec::new(),
        });
        self.frames[parent.0 as usize].stmts.push(Stmt::Block(id));
        id
    }

    pub fn frame(&self, id: ScopeId) -> &ScopeFrame {
        &self.frames[id.0 as usize]
    }

    pub fn frame_mut(&mut self, id: ScopeId) -> &mut ScopeFrame {
        &mut self.frames[id.0 as usize]
    }

    pub fn push_stmt(&mut self, frame: ScopeId, stmt: Stmt) {
        self.frames[frame.0 as usize].stmts.push(stmt);
    }

    pub fn push_resource(&mut self, frame: ScopeId, stmt: Stmt) {
        self.frames[frame.0 as usize].resources.push(stmt);
    }

    /// Depth of a frame below the root. The root is depth 0.
    pub fn depth(&self, id: ScopeId) -> u32 {
        let mut depth = 0;
        let mut cur = self.frame(id).parent;
        while let Some(p) = cur {
            depth += 1;
            cur = self.frame(p).parent;
        }
        depth
    }
}
