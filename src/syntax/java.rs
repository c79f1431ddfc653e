//! Java front end.
//!
//! Parses source text with tree-sitter and lowers each method body into the
//! language-agnostic model. Only the constructs lifecycle tracking cares
//! about are modeled; everything else lowers to [`Stmt::Opaque`].
//!
//! Parser instances are reused per thread: creating a parser and installing
//! the grammar touches native state, and the driver runs units on a worker
//! pool.

use std::cell::RefCell;

use thiserror::Error;
use tracing::warn;
use tree_sitter::{Node, Parser};

use super::model::{Call, Loc, MethodBody, ScopeId, ScopeKind, Stmt};

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("failed to load the Java grammar: {0}")]
    Language(String),
    #[error("tree-sitter produced no tree for this source")]
    Unparseable,
}

/// A method whose body could not be modeled.
#[derive(Debug, Clone)]
pub struct MethodFailure {
    pub name: String,
    pub line: u32,
}

/// Result of lowering one source unit: every method body that parsed, plus
/// the ones that did not.
#[derive(Debug, Default)]
pub struct LoweredUnit {
    pub methods: Vec<MethodBody>,
    pub failures: Vec<MethodFailure>,
}

thread_local! {
    static PARSER: RefCell<Option<Parser>> = const { RefCell::new(None) };
}

fn with_parser<F, R>(f: F) -> Result<R, ParseError>
where
    F: FnOnce(&mut Parser) -> Result<R, ParseError>,
{
    PARSER.with(|cell| {
        let mut slot = cell.borrow_mut();
        if slot.is_none() {
            let mut parser = Parser::new();
            parser
                .set_language(&tree_sitter_java::language())
                .map_err(|e| ParseError::Language(e.to_string()))?;
            *slot = Some(parser);
        }
        match slot.as_mut() {
            Some(parser) => f(parser),
            None => Err(ParseError::Language("thread-local parser unavailable".into())),
        }
    })
}

/// Parse one source unit and lower every method body found in it.
pub fn lower_unit(text: &str) -> Result<LoweredUnit, ParseError> {
    with_parser(|parser| {
        let tree = parser.parse(text, None).ok_or(ParseError::Unparseable)?;
        let mut unit = LoweredUnit::default();
        collect_methods(tree.root_node(), text, &mut unit);
        Ok(unit)
    })
}

fn collect_methods(node: Node<'_>, src: &str, unit: &mut LoweredUnit) {
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        if matches!(
            child.kind(),
            "method_declaration" | "constructor_declaration"
        ) {
            lower_method(child, src, unit);
        }
        // Keep descending either way: local classes declare methods of
        // their own inside method bodies.
        collect_methods(child, src, unit);
    }
}

fn lower_method(node: Node<'_>, src: &str, unit: &mut LoweredUnit) {
    let name = match node.child_by_field_name("name") {
        Some(n) => node_text(&n, src).to_owned(),
        None => return,
    };
    let line = node.start_position().row as u32 + 1;

    // Abstract and interface methods have no body to analyze.
    let body_node = match node.child_by_field_name("body") {
        Some(b) => b,
        None => return,
    };

    if body_node.has_error() {
        warn!(method = %name, line, "method body has parse errors, skipping");
        unit.failures.push(MethodFailure { name, line });
        return;
    }

    let mut body = MethodBody::new(name, line);
    let root = body.root();
    lower_block_into(body_node, src, &mut body, root);
    unit.methods.push(body);
}

fn lower_block_into(block: Node<'_>, src: &str, body: &mut MethodBody, frame: ScopeId) {
    let mut cursor = block.walk();
    for stmt in block.named_children(&mut cursor) {
        lower_stmt(stmt, src, body, frame);
    }
}

fn lower_stmt(node: Node<'_>, src: &str, body: &mut MethodBody, frame: ScopeId) {
    match node.kind() {
        "local_variable_declaration" => {
            let mut cursor = node.walk();
            for decl in node.children_by_field_name("declarator", &mut cursor) {
                let var = match decl.child_by_field_name("name") {
                    Some(n) => node_text(&n, src).to_owned(),
                    None => continue,
                };
                let init = decl
                    .child_by_field_name("value")
                    .and_then(|v| lower_call(v, src));
                body.push_stmt(
                    frame,
                    Stmt::Decl {
                        var,
                        init,
                        loc: loc_of(decl),
                    },
                );
            }
        }

        "expression_statement" => {
            let stmt = node
                .named_child(0)
                .map(|e| lower_expr_stmt(e, src))
                .unwrap_or(Stmt::Opaque);
            body.push_stmt(frame, stmt);
        }

        "block" => {
            let inner = body.push_frame(frame, ScopeKind::Plain);
            lower_block_into(node, src, body, inner);
        }

        "try_statement" => {
            let inner = body.push_frame(frame, ScopeKind::Try);
            if let Some(b) = node.child_by_field_name("body") {
                lower_block_into(b, src, body, inner);
            }
            lower_handlers(node, src, body, frame);
        }

        "try_with_resources_statement" => {
            let inner = body.push_frame(frame, ScopeKind::ScopedAcquisition);
            if let Some(header) = node.child_by_field_name("resources") {
                let mut cursor = header.walk();
                for res in header.named_children(&mut cursor) {
                    if res.kind() == "resource" {
                        lower_resource(res, src, body, inner);
                    }
                }
            }
            if let Some(b) = node.child_by_field_name("body") {
                lower_block_into(b, src, body, inner);
            }
            lower_handlers(node, src, body, frame);
        }

        "if_statement" => {
            if let Some(c) = node.child_by_field_name("consequence") {
                lower_branch(c, src, body, frame);
            }
            if let Some(a) = node.child_by_field_name("alternative") {
                lower_branch(a, src, body, frame);
            }
        }

        // Loop bodies are visited once; repeated execution is out of model.
        "while_statement" | "for_statement" | "enhanced_for_statement" | "do_statement"
        | "synchronized_statement" => {
            if let Some(b) = node.child_by_field_name("body") {
                lower_branch(b, src, body, frame);
            }
        }

        _ => body.push_stmt(frame, Stmt::Opaque),
    }
}

/// Lower a branch or loop body, which may be a block or a bare statement.
fn lower_branch(node: Node<'_>, src: &str, body: &mut MethodBody, frame: ScopeId) {
    let inner = body.push_frame(frame, ScopeKind::Plain);
    if node.kind() == "block" {
        lower_block_into(node, src, body, inner);
    } else {
        lower_stmt(node, src, body, inner);
    }
}

/// Lower catch and finally clauses as plain sibling frames of the try frame.
/// Walking the finally block is what lets explicit `close()` in `finally`
/// resolve a site.
fn lower_handlers(try_node: Node<'_>, src: &str, body: &mut MethodBody, frame: ScopeId) {
    let mut cursor = try_node.walk();
    for child in try_node.named_children(&mut cursor) {
        match child.kind() {
            "catch_clause" => {
                if let Some(b) = child.child_by_field_name("body") {
                    let inner = body.push_frame(frame, ScopeKind::Plain);
                    lower_block_into(b, src, body, inner);
                }
            }
            "finally_clause" => {
                let mut fc = child.walk();
                for grand in child.named_children(&mut fc) {
                    if grand.kind() == "block" {
                        let inner = body.push_frame(frame, ScopeKind::Plain);
                        lower_block_into(grand, src, body, inner);
                    }
                }
            }
            _ => {}
        }
    }
}

fn lower_resource(res: Node<'_>, src: &str, body: &mut MethodBody, frame: ScopeId) {
    if let Some(name) = res.child_by_field_name("name") {
        let init = res
            .child_by_field_name("value")
            .and_then(|v| lower_call(v, src));
        body.push_resource(
            frame,
            Stmt::Decl {
                var: node_text(&name, src).to_owned(),
                init,
                loc: loc_of(res),
            },
        );
        return;
    }
    // `try (existing)` — the resource names an already-bound variable.
    if let Some(id) = res.named_child(0) {
        if id.kind() == "identifier" {
            body.push_resource(
                frame,
                Stmt::Decl {
                    var: node_text(&id, src).to_owned(),
                    init: None,
                    loc: loc_of(res),
                },
            );
        }
    }
}

fn lower_expr_stmt(expr: Node<'_>, src: &str) -> Stmt {
    match expr.kind() {
        "method_invocation" | "object_creation_expression" => match lower_call(expr, src) {
            Some(call) => Stmt::Invoke(call),
            None => Stmt::Opaque,
        },
        "assignment_expression" => {
            let left = match expr.child_by_field_name("left") {
                Some(l) if l.kind() == "identifier" => l,
                _ => return Stmt::Opaque,
            };
            let value = expr
                .child_by_field_name("right")
                .and_then(|r| lower_call(r, src));
            Stmt::Assign {
                var: node_text(&left, src).to_owned(),
                value,
                loc: loc_of(expr),
            }
        }
        _ => Stmt::Opaque,
    }
}

fn lower_call(node: Node<'_>, src: &str) -> Option<Call> {
    match node.kind() {
        "object_creation_expression" => {
            let ty = node.child_by_field_name("type")?;
            let mut name = node_text(&ty, src).to_owned();
            // `new ArrayList<String>()` carries its type arguments in the
            // type node text.
            if let Some(idx) = name.find('<') {
                name.truncate(idx);
            }
            let mut call = Call::constructor(name.trim(), loc_of(node));
            call.args = args_of(node, src);
            Some(call)
        }
        "method_invocation" => {
            let method = node.child_by_field_name("name")?;
            let receiver = node
                .child_by_field_name("object")
                .map(|o| node_text(&o, src).to_owned());
            Some(Call {
                receiver,
                method: node_text(&method, src).to_owned(),
                constructor: false,
                args: args_of(node, src),
                loc: loc_of(node),
            })
        }
        "parenthesized_expression" => node.named_child(0).and_then(|e| lower_call(e, src)),
        "cast_expression" => node
            .child_by_field_name("value")
            .and_then(|e| lower_call(e, src)),
        _ => None,
    }
}

/// Bare identifier arguments only; a handle buried in a nested expression
/// does not count as being passed by name.
fn args_of(call: Node<'_>, src: &str) -> Vec<String> {
    let mut args = Vec::new();
    if let Some(list) = call.child_by_field_name("arguments") {
        let mut cursor = list.walk();
        for arg in list.named_children(&mut cursor) {
            if arg.kind() == "identifier" {
                args.push(node_text(&arg, src).to_owned());
            }
        }
    }
    args
}

fn loc_of(node: Node<'_>) -> Loc {
    let pos = node.start_position();
    Loc::new(pos.row as u32 + 1, pos.column as u32 + 1)
}

fn node_text<'a>(node: &Node<'_>, src: &'a str) -> &'a str {
    node.utf8_text(src.as_bytes()).unwrap_or("")
}
