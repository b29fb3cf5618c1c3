//! Syntax trees for thtml.
//!
//! Contains the document node arena produced by the tree builder and the
//! expression AST produced by the expression parser.

use indexmap::IndexMap;

// ---------------------------------------------------------------------------
// Document tree
// ---------------------------------------------------------------------------

/// Index of a node inside its [`Document`] arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub usize);

/// Node classification, mirroring the entity kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Element,
    Text,
    Comment,
    CDataSection,
    ProcessingInstruction,
    DocType,
}

/// Ordered attribute map. Names are unique; setting an existing name
/// replaces its value but keeps its original position.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Attributes(IndexMap<String, String>);

impl Attributes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// One node of a parsed template.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub kind: NodeKind,
    /// Lowercased tag name; empty for non-element nodes.
    pub tag: String,
    pub attributes: Attributes,
    pub children: Vec<NodeId>,
    /// `None` for top-level nodes.
    pub parent: Option<NodeId>,
    /// Position among the parent's children (or among the top-level nodes).
    pub index: usize,
    /// Decoded source text: the opening tag for elements, the literal text otherwise.
    pub raw: String,
    pub line: usize,
    /// Set once the matching closing tag has been consumed.
    pub closed: bool,
    /// Element written as `<x/>` or a void element.
    pub self_closing: bool,
}

impl Node {
    pub fn is_element(&self) -> bool {
        self.kind == NodeKind::Element
    }
}

/// A parsed template: an arena of nodes plus the top-level forest.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Document {
    pub nodes: Vec<Node>,
    pub roots: Vec<NodeId>,
}

impl Document {
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.node(id).children
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).parent
    }

    /// The sibling list `id` belongs to.
    pub fn siblings(&self, id: NodeId) -> &[NodeId] {
        match self.parent(id) {
            Some(parent) => self.children(parent),
            None => &self.roots,
        }
    }

    pub fn next_sibling(&self, id: NodeId) -> Option<NodeId> {
        self.siblings(id).get(self.node(id).index + 1).copied()
    }

    pub fn prev_sibling(&self, id: NodeId) -> Option<NodeId> {
        let index = self.node(id).index.checked_sub(1)?;
        self.siblings(id).get(index).copied()
    }

    pub fn next_element_sibling(&self, id: NodeId) -> Option<NodeId> {
        let siblings = self.siblings(id);
        siblings[self.node(id).index + 1..]
            .iter()
            .copied()
            .find(|&s| self.node(s).is_element())
    }

    pub fn prev_element_sibling(&self, id: NodeId) -> Option<NodeId> {
        let siblings = self.siblings(id);
        siblings[..self.node(id).index]
            .iter()
            .rev()
            .copied()
            .find(|&s| self.node(s).is_element())
    }

    /// Depth-first iterator over every node id, in document order.
    pub fn descendants(&self) -> impl Iterator<Item = NodeId> + '_ {
        let mut stack: Vec<NodeId> = self.roots.iter().rev().copied().collect();
        std::iter::from_fn(move || {
            let id = stack.pop()?;
            stack.extend(self.children(id).iter().rev().copied());
            Some(id)
        })
    }

    /// Re-serialize a node (and its subtree) as markup.
    pub fn to_markup(&self, id: NodeId) -> String {
        let node = self.node(id);
        if !node.is_element() {
            return node.raw.clone();
        }
        let mut out = format!("<{}", node.tag);
        for (name, value) in node.attributes.iter() {
            out.push_str(&format!(" {name}={}", quote_attribute(value)));
        }
        out.push('>');
        if node.self_closing && node.children.is_empty() {
            return out;
        }
        for &child in &node.children {
            out.push_str(&self.to_markup(child));
        }
        out.push_str(&format!("</{}>", node.tag));
        out
    }
}

/// Quote an attribute value for output.
///
/// Double quotes unless the value contains one, then single quotes. A value
/// holding both kinds is double-quoted with `"` written as `&quot;`.
pub fn quote_attribute(value: &str) -> String {
    if !value.contains('"') {
        format!("\"{value}\"")
    } else if !value.contains('\'') {
        format!("'{value}'")
    } else {
        format!("\"{}\"", value.replace('"', "&quot;"))
    }
}

// ---------------------------------------------------------------------------
// Expression AST
// ---------------------------------------------------------------------------

/// A position in expression text (relative to the expression string, not the template).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExprSpan {
    pub start: usize,
    pub end: usize,
}

impl ExprSpan {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }
}

/// A complete expression node.
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    pub kind: ExprKind,
    pub span: ExprSpan,
}

/// Expression variants.
#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    /// Numeric literal: `42`, `3.14`
    Number(f64),

    /// String literal: `"hello"`, `'world'`
    String(String),

    /// Boolean literal: `true`, `false`
    Boolean(bool),

    /// `null`
    Null,

    /// `undefined`, evaluated as `null`
    Undefined,

    /// Identifier: `user`, `items`
    Identifier(String),

    /// Binary operation: `a + b`, `count > 0`
    Binary {
        left: Box<Expression>,
        op: BinaryOp,
        right: Box<Expression>,
    },

    /// Unary operation: `!active`, `-count`
    Unary {
        op: UnaryOp,
        operand: Box<Expression>,
    },

    /// Member access: `user.name`, `items[0]`, `user?.name`
    Member {
        object: Box<Expression>,
        property: Box<Expression>,
        computed: bool,
        optional: bool,
    },

    /// Ternary: `count > 0 ? 'yes' : 'no'`
    Ternary {
        condition: Box<Expression>,
        consequent: Box<Expression>,
        alternate: Box<Expression>,
    },

    /// Object literal: `{ count: 0, name: 'test' }`
    Object(Vec<ObjectProperty>),

    /// Array literal: `[1, 2, 3]`
    Array(Vec<Expression>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ObjectProperty {
    pub key: String,
    pub value: Expression,
    pub shorthand: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    Neq,
    StrictEq,
    StrictNeq,
    Lt,
    Gt,
    Lte,
    Gte,
    And,
    Or,
    NullishCoalescing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
}
