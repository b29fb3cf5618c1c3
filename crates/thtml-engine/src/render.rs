//! The directive interpreter.
//!
//! Walks a parsed document and produces output text. Every sibling list is
//! rendered with a fan-out: the nodes are independent futures joined back
//! by position, so output order is document order whatever order they
//! finish in. The first failure aborts the whole join.
//!
//! Each node wraps any error escaping it with its own location, which is
//! how a [`RenderError`] collects its trace.

use crate::cache::{TreeCache, TreeFrame, Unit};
use crate::context::Scope;
use crate::directive::{self, ForLoop, LoopKind, LoopSource, TreeBinding};
use crate::engine::Engine;
use crate::error::{ErrorKind, Frame, RenderError};
use crate::eval::truthy;
use crate::interpolate::interpolate;
use crate::loader::read_text;
use crate::options::RenderOptions;
use futures::future::{try_join_all, BoxFuture, FutureExt};
use serde_json::{json, Map, Value};
use std::collections::{HashMap, HashSet};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use thtml_lexer::is_void_element;
use thtml_parser::{quote_attribute, Document, Node, NodeId, NodeKind, ParseError, Parser};
use tracing::{debug, trace, warn};

type RenderResult = Result<String, RenderError>;

/// State of an if/elif/else chain while scanning one sibling list.
#[derive(Debug, Clone, Copy)]
enum Chain {
    /// No chain head before this point.
    Closed,
    /// Inside a chain; `matched` once any branch was taken.
    Open { matched: bool },
}

/// One render invocation.
pub(crate) struct Renderer<'e> {
    engine: &'e Engine,
    options: RenderOptions,
    trees: TreeCache,
}

impl<'e> Renderer<'e> {
    pub fn new(engine: &'e Engine, options: RenderOptions) -> Self {
        Self {
            engine,
            options,
            trees: TreeCache::default(),
        }
    }

    /// Parse template text into a unit, through the parse cache when enabled.
    ///
    /// Also rejects documents declaring the same hole name twice.
    pub fn load_unit(&self, text: &str, filename: Option<PathBuf>) -> Result<Arc<Unit>, RenderError> {
        let document = self.parse(text).map_err(|e| {
            let line = e.line;
            let source = text.lines().nth(line.saturating_sub(1)).unwrap_or_default();
            let file = filename.as_ref().map(|p| p.display().to_string());
            RenderError::new(e).at(Frame::new(file, line, source))
        })?;
        let unit = Arc::new(Unit { document, filename });
        check_unique_holes(&unit)?;
        Ok(unit)
    }

    fn parse(&self, text: &str) -> Result<Arc<Document>, ParseError> {
        if self.options.cache {
            self.engine.parse_cache().get_or_parse(text)
        } else {
            Parser::parse(text).map(Arc::new)
        }
    }

    // =========================================================================
    // Tree walk
    // =========================================================================

    /// Render a sibling list and concatenate the results in order.
    pub fn render_nodes<'a>(
        &'a self,
        unit: &'a Arc<Unit>,
        ids: &'a [NodeId],
        scope: &'a Scope,
    ) -> BoxFuture<'a, RenderResult> {
        async move {
            let branches = self.resolve_branches(unit, ids, scope)?;
            let parts = try_join_all(
                ids.iter()
                    .zip(branches)
                    .map(|(&id, branch)| self.render_node(unit, id, scope, branch)),
            )
            .await?;
            Ok(parts.concat())
        }
        .boxed()
    }

    /// Decide every if/elif/else in a sibling list up front.
    ///
    /// Text and comments between branches keep a chain alive; any other
    /// element ends it. A `t-elif` after a taken branch is not evaluated.
    fn resolve_branches(
        &self,
        unit: &Unit,
        ids: &[NodeId],
        scope: &Scope,
    ) -> Result<Vec<Option<bool>>, RenderError> {
        let mut chain = Chain::Closed;
        let mut branches = Vec::with_capacity(ids.len());

        for &id in ids {
            let node = unit.document.node(id);
            if !node.is_element() {
                branches.push(None);
                continue;
            }
            let at = |e: RenderError| e.at(self.frame(unit, node));
            let branch = match (node.tag.as_str(), chain) {
                (directive::IF, _) => {
                    let matched = self.condition(node, scope).map_err(at)?;
                    chain = Chain::Open { matched };
                    Some(matched)
                }
                (directive::ELIF, Chain::Closed) | (directive::ELSE, Chain::Closed) => {
                    if node.tag == directive::ELIF {
                        require(node, "on").map_err(at)?;
                    }
                    return Err(at(ErrorKind::StructuralOrder(format!(
                        "{} must follow t-if or t-elif",
                        node.tag
                    ))
                    .into()));
                }
                (directive::ELIF, Chain::Open { matched: true }) => {
                    require(node, "on").map_err(at)?;
                    Some(false)
                }
                (directive::ELIF, Chain::Open { matched: false }) => {
                    let matched = self.condition(node, scope).map_err(at)?;
                    chain = Chain::Open { matched };
                    Some(matched)
                }
                (directive::ELSE, Chain::Open { matched }) => {
                    chain = Chain::Closed;
                    Some(!matched)
                }
                _ => {
                    chain = Chain::Closed;
                    None
                }
            };
            branches.push(branch);
        }

        Ok(branches)
    }

    fn condition(&self, node: &Node, scope: &Scope) -> Result<bool, RenderError> {
        let on = require(node, "on")?;
        Ok(truthy(&self.evaluate(on, scope)?))
    }

    fn render_node<'a>(
        &'a self,
        unit: &'a Arc<Unit>,
        id: NodeId,
        scope: &'a Scope,
        branch: Option<bool>,
    ) -> BoxFuture<'a, RenderResult> {
        async move {
            let node = unit.document.node(id);
            let result = match node.kind {
                NodeKind::DocType | NodeKind::ProcessingInstruction => return Ok(node.raw.clone()),
                NodeKind::Text | NodeKind::Comment | NodeKind::CDataSection => {
                    self.render_text(&node.raw, scope)
                }
                NodeKind::Element => self.render_element(unit, node, scope, branch).await,
            };
            result.map_err(|e| e.at(self.frame(unit, node)))
        }
        .boxed()
    }

    fn render_text(&self, raw: &str, scope: &Scope) -> RenderResult {
        if raw.trim().is_empty() {
            return Ok(raw.to_string());
        }
        Ok(interpolate(
            raw,
            &scope.context,
            self.engine.evaluator(),
            scope.raw_html,
        )?)
    }

    async fn render_element(
        &self,
        unit: &Arc<Unit>,
        node: &Node,
        scope: &Scope,
        branch: Option<bool>,
    ) -> RenderResult {
        trace!(tag = %node.tag, line = node.line, "render element");
        let body = match node.tag.as_str() {
            directive::IF | directive::ELIF | directive::ELSE => {
                self.render_branch(unit, node, scope, branch.unwrap_or(false))
                    .await?
            }
            directive::FOR => self.render_for(unit, node, scope).await?,
            directive::WITH => self.render_with(unit, node, scope).await?,
            directive::TREE => self.render_tree(unit, node, scope).await?,
            directive::INCLUDE => self.render_include(unit, node, scope).await?,
            directive::HTML => {
                let scope = Scope {
                    raw_html: true,
                    ..scope.clone()
                };
                self.render_nodes(unit, &node.children, &scope).await?
            }
            directive::CHILDREN => return self.render_tree_children(node, scope).await,
            directive::HOLE => return self.render_hole(unit, node, scope).await,
            directive::FILL => {
                return Err(ErrorKind::StructuralOrder(
                    "t-fill must be a direct child of t-include".into(),
                )
                .into())
            }
            _ => return self.render_generic(unit, node, scope).await,
        };
        Ok(self.wrap(&node.tag, body))
    }

    fn wrap(&self, tag: &str, body: String) -> String {
        if !self.options.debug || !directive::has_debug_markers(tag) {
            return body;
        }
        let tag = tag.to_uppercase();
        format!("<!-- {tag} BEGIN -->\n{body}\n<!-- {tag} END -->")
    }

    // =========================================================================
    // Directives
    // =========================================================================

    async fn render_branch(
        &self,
        unit: &Arc<Unit>,
        node: &Node,
        scope: &Scope,
        taken: bool,
    ) -> RenderResult {
        if taken {
            self.render_nodes(unit, &node.children, scope).await
        } else if self.options.debug {
            Ok("<!-- FALSE -->".to_string())
        } else {
            Ok(String::new())
        }
    }

    async fn render_for(&self, unit: &Arc<Unit>, node: &Node, scope: &Scope) -> RenderResult {
        let on = require(node, "on")?;
        let for_loop = ForLoop::parse(on).ok_or_else(|| {
            ErrorKind::InvalidDirectiveExpression(format!(
                "Invalid expression for t-for: \"{on}\", expected \"<value>[, <key>] of|in <data>\""
            ))
        })?;

        let step = match (node.attributes.get("step"), for_loop.kind) {
            (Some(step), LoopKind::Of) => parse_step(step)?,
            (Some(_), LoopKind::In) => {
                warn!(line = node.line, "step is ignored for t-for ... in");
                1
            }
            (None, _) => 1,
        };
        let items = self.loop_items(&for_loop, step, scope)?;

        let stop = node.attributes.get("break");
        let skip = node.attributes.get("continue");
        let mut scopes = Vec::with_capacity(items.len());
        for (key, value) in items {
            let mut vars = Map::new();
            match (&for_loop.kind, &for_loop.key) {
                (LoopKind::In, None) => {
                    vars.insert(for_loop.value.clone(), json!({ "key": key, "value": value }));
                }
                (_, Some(key_var)) => {
                    vars.insert(for_loop.value.clone(), value);
                    vars.insert(key_var.clone(), key);
                }
                (LoopKind::Of, None) => {
                    vars.insert(for_loop.value.clone(), value);
                }
            }
            let item_scope = scope.with_context(scope.context.extend(vars));

            if let Some(expr) = stop {
                if truthy(&self.evaluate(expr, &item_scope)?) {
                    break;
                }
            }
            if let Some(expr) = skip {
                if truthy(&self.evaluate(expr, &item_scope)?) {
                    continue;
                }
            }
            scopes.push(item_scope);
        }

        let parts = try_join_all(
            scopes
                .iter()
                .map(|item_scope| self.render_nodes(unit, &node.children, item_scope)),
        )
        .await?;
        Ok(parts.concat())
    }

    /// `(key, value)` pairs in iteration order, every `step`-th item.
    fn loop_items(
        &self,
        for_loop: &ForLoop,
        step: usize,
        scope: &Scope,
    ) -> Result<Vec<(Value, Value)>, RenderError> {
        let expression = match &for_loop.source {
            LoopSource::Range(from, to) => {
                if to.saturating_sub(*from) >= directive::MAX_RANGE_LEN {
                    return Err(ErrorKind::InvalidDirectiveExpression(format!(
                        "t-for range {from}-{to} is longer than {} items",
                        directive::MAX_RANGE_LEN
                    ))
                    .into());
                }
                return Ok((*from..=*to)
                    .enumerate()
                    .step_by(step)
                    .map(|(i, n)| (Value::from(i), Value::from(n)))
                    .collect());
            }
            LoopSource::Expression(expression) => expression,
        };

        let items = match (for_loop.kind, self.evaluate(expression, scope)?) {
            (LoopKind::Of, Value::Array(items)) => items
                .into_iter()
                .enumerate()
                .step_by(step)
                .map(|(i, v)| (Value::from(i), v))
                .collect(),
            (LoopKind::In, Value::Object(map)) => {
                map.into_iter().map(|(k, v)| (Value::String(k), v)).collect()
            }
            (LoopKind::In, Value::Array(items)) => items
                .into_iter()
                .enumerate()
                .map(|(i, v)| (Value::String(i.to_string()), v))
                .collect(),
            (kind, other) => {
                let expected = match kind {
                    LoopKind::Of => "an array",
                    LoopKind::In => "an object or array",
                };
                return Err(ErrorKind::TypeMismatch(format!(
                    "t-for data must be {expected}, got {}: {expression}",
                    type_name(&other)
                ))
                .into());
            }
        };
        Ok(items)
    }

    async fn render_with(&self, unit: &Arc<Unit>, node: &Node, scope: &Scope) -> RenderResult {
        if node.attributes.is_empty() {
            return Err(ErrorKind::MissingAttribute(
                "Must specify at least one attribute for t-with".into(),
            )
            .into());
        }
        let mut vars = Map::new();
        for (name, expression) in node.attributes.iter() {
            vars.insert(name.to_string(), self.evaluate(expression, scope)?);
        }
        let scope = scope.with_context(scope.context.extend(vars));
        self.render_nodes(unit, &node.children, &scope).await
    }

    async fn render_tree(&self, unit: &Arc<Unit>, node: &Node, scope: &Scope) -> RenderResult {
        let on = require(node, "on")?;
        let binding = TreeBinding::parse(on).ok_or_else(|| {
            ErrorKind::InvalidDirectiveExpression(format!(
                "Invalid expression for t-tree: \"{on}\", expected \"<data> as <name>\""
            ))
        })?;
        let Value::Array(items) = self.evaluate(&binding.data, scope)? else {
            return Err(ErrorKind::TypeMismatch(format!(
                "Data must be an Array for t-tree: {}",
                binding.data
            ))
            .into());
        };

        let guard = self.trees.enter(TreeFrame {
            unit: Arc::clone(unit),
            template: node.children.clone(),
            item_var: binding.item_var,
        });
        let scope = Scope {
            tree: Some(guard.id()),
            ..scope.clone()
        };
        let result = self.render_tree_items(guard.id(), items, &scope).await;
        drop(guard);
        result
    }

    /// Render the tree template once per item.
    async fn render_tree_items(&self, tree: u64, items: Vec<Value>, scope: &Scope) -> RenderResult {
        let frame = self.trees.get(tree).ok_or_else(outside_tree)?;
        let scopes: Vec<Scope> = items
            .into_iter()
            .map(|item| scope.with_context(scope.context.with(frame.item_var.clone(), item)))
            .collect();
        let parts = try_join_all(
            scopes
                .iter()
                .map(|item_scope| self.render_nodes(&frame.unit, &frame.template, item_scope)),
        )
        .await?;
        Ok(parts.concat())
    }

    async fn render_tree_children(&self, node: &Node, scope: &Scope) -> RenderResult {
        let tree = scope.tree.ok_or_else(outside_tree)?;
        let frame = self.trees.get(tree).ok_or_else(outside_tree)?;
        let field = node.attributes.get("field").unwrap_or("children");
        let nested = match scope.context.get(&frame.item_var) {
            Some(Value::Object(item)) => item.get(field).cloned().unwrap_or(Value::Null),
            _ => Value::Null,
        };
        match nested {
            Value::Array(items) => self.render_tree_items(tree, items, scope).await,
            other if !truthy(&other) => Ok(String::new()),
            other => Err(ErrorKind::TypeMismatch(format!(
                "t-children field \"{field}\" must be an Array, got {}",
                type_name(&other)
            ))
            .into()),
        }
    }

    async fn render_include(&self, unit: &Arc<Unit>, node: &Node, scope: &Scope) -> RenderResult {
        let file = require(node, "file")?;
        let fills = self.collect_fills(unit, node)?;
        let base = unit.filename.as_deref().ok_or_else(|| ErrorKind::Io {
            path: PathBuf::from(file),
            source: io::Error::new(
                io::ErrorKind::NotFound,
                "t-include needs the including template's filename",
            ),
        })?;
        let path = self.engine.loader().resolve(base, file);
        debug!(path = %path.display(), "include");

        let render_fills = async {
            let parts = try_join_all(fills.iter().map(|&(_, id)| {
                let fill = unit.document.node(id);
                self.render_nodes(unit, &fill.children, scope)
                    .map(move |r| r.map_err(|e| e.at(self.frame(unit, fill))))
            }))
            .await?;
            let names = fills.iter().map(|(name, _)| name.clone());
            Ok::<_, RenderError>(names.zip(parts).collect::<HashMap<_, _>>())
        };
        let load = async {
            read_text(self.engine.loader(), &path)
                .await
                .map_err(|source| {
                    RenderError::new(ErrorKind::Io {
                        path: path.clone(),
                        source,
                    })
                })
        };
        let (filled, text) = futures::try_join!(render_fills, load)?;

        let included = self.load_unit(&text, Some(path))?;
        let scope = Scope {
            context: scope.context.clone(),
            tree: None,
            raw_html: scope.raw_html,
            fills: Some(Arc::new(filled)),
        };
        self.render_nodes(&included, &included.document.roots, &scope)
            .await
    }

    /// The `t-fill` children of a `t-include`, checked before any I/O.
    fn collect_fills(&self, unit: &Unit, node: &Node) -> Result<Vec<(String, NodeId)>, RenderError> {
        let mut seen = HashSet::new();
        let mut fills = Vec::new();
        for &id in &node.children {
            let child = unit.document.node(id);
            if !child.is_element() {
                continue;
            }
            if child.tag != directive::FILL {
                return Err(RenderError::new(ErrorKind::InvalidCompositionChild(format!(
                    "t-include only accepts t-fill children, found <{}>",
                    child.tag
                )))
                .at(self.frame(unit, child)));
            }
            let name = child.attributes.get("name").unwrap_or_default();
            if !seen.insert(name) {
                return Err(RenderError::new(ErrorKind::DuplicateSlotName(
                    duplicate_slot_message(directive::FILL, name),
                ))
                .at(self.frame(unit, child)));
            }
            fills.push((name.to_string(), id));
        }
        Ok(fills)
    }

    async fn render_hole(&self, unit: &Arc<Unit>, node: &Node, scope: &Scope) -> RenderResult {
        let name = node.attributes.get("name").unwrap_or_default();
        if let Some(content) = scope.fills.as_ref().and_then(|fills| fills.get(name)) {
            return Ok(content.clone());
        }
        self.render_nodes(unit, &node.children, scope).await
    }

    // =========================================================================
    // Plain elements
    // =========================================================================

    async fn render_generic(&self, unit: &Arc<Unit>, node: &Node, scope: &Scope) -> RenderResult {
        let mut out = format!("<{}", node.tag);
        for (name, value) in node.attributes.iter() {
            let value = interpolate(
                value,
                &scope.context,
                self.engine.evaluator(),
                scope.raw_html,
            )?;
            out.push_str(&format!(" {name}={}", quote_attribute(&value)));
        }
        out.push('>');

        if is_void_element(&node.tag) {
            return Ok(out);
        }
        out.push_str(&self.render_nodes(unit, &node.children, scope).await?);
        out.push_str(&format!("</{}>", node.tag));
        Ok(out)
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    fn evaluate(&self, expression: &str, scope: &Scope) -> Result<Value, RenderError> {
        Ok(self
            .engine
            .evaluator()
            .evaluate(expression, &scope.context)?)
    }

    fn frame(&self, unit: &Unit, node: &Node) -> Frame {
        let file = unit.filename.as_ref().map(|p| p.display().to_string());
        Frame::new(file, node.line, &node.raw)
    }
}

/// Reject a document that declares the same `t-hole` name twice.
fn check_unique_holes(unit: &Unit) -> Result<(), RenderError> {
    let document = &unit.document;
    let mut seen = HashSet::new();
    for id in document.descendants() {
        let node = document.node(id);
        if node.tag != directive::HOLE {
            continue;
        }
        let name = node.attributes.get("name").unwrap_or_default();
        if !seen.insert(name) {
            let file = unit.filename.as_ref().map(|p| p.display().to_string());
            return Err(RenderError::new(ErrorKind::DuplicateSlotName(
                duplicate_slot_message(directive::HOLE, name),
            ))
            .at(Frame::new(file, node.line, &node.raw)));
        }
    }
    Ok(())
}

fn duplicate_slot_message(tag: &str, name: &str) -> String {
    if name.is_empty() {
        format!("Duplicate default {tag}")
    } else {
        format!("Duplicate {tag} name \"{name}\"")
    }
}

fn require<'n>(node: &'n Node, attribute: &str) -> Result<&'n str, RenderError> {
    node.attributes.get(attribute).ok_or_else(|| {
        ErrorKind::MissingAttribute(format!(
            "Missing attribute \"{attribute}\" for {}",
            node.tag
        ))
        .into()
    })
}

fn parse_step(text: &str) -> Result<usize, RenderError> {
    match text.trim().parse::<usize>() {
        Ok(step) if step > 0 => Ok(step),
        _ => Err(ErrorKind::InvalidDirectiveExpression(format!(
            "step must be a positive integer, got \"{text}\""
        ))
        .into()),
    }
}

fn outside_tree() -> RenderError {
    ErrorKind::StructuralOrder("t-children must be used inside t-tree".into()).into()
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
