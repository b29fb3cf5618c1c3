//! thtml Parser
//!
//! Builds a node tree from the entity stream produced by `thtml-lexer`, and
//! parses the expression language used inside `{{ }}` and directive
//! attributes.
//!
//! The tree is an arena ([`Document`]) addressed by [`NodeId`]; parent and
//! sibling links are indices, never pointers.

pub mod ast;
pub mod expr_lexer;
pub mod expr_parser;
pub mod parser;

pub use ast::{quote_attribute, Attributes, Document, Expression, Node, NodeId, NodeKind};
pub use expr_parser::ExprParser;
pub use parser::Parser;

/// Parser error with position information.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("Parse error at line {line}, column {column}: {message}")]
pub struct ParseError {
    pub message: String,
    pub line: usize,
    pub column: usize,
}

/// Format a number the way templates print it: integral values without a
/// fractional part.
pub fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.is_finite() {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}
