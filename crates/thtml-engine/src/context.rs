//! Variable scopes.
//!
//! A [`Context`] is an immutable chain of binding layers. Extending it pushes
//! a new layer that shadows the ones below; the parent is never touched, so
//! concurrently rendered siblings can share it freely.

use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// Variables visible to expressions at one point of the tree.
#[derive(Debug, Clone, Default)]
pub struct Context {
    layer: Option<Arc<Layer>>,
}

#[derive(Debug)]
struct Layer {
    vars: Map<String, Value>,
    parent: Option<Arc<Layer>>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a root context from a JSON value. `null` gives an empty context;
    /// anything other than an object is rejected.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(vars) => Some(Self::from(vars)),
            Value::Null => Some(Self::new()),
            _ => None,
        }
    }

    /// Look a name up, innermost binding first.
    pub fn get(&self, name: &str) -> Option<&Value> {
        let mut layer = self.layer.as_deref();
        while let Some(current) = layer {
            if let Some(value) = current.vars.get(name) {
                return Some(value);
            }
            layer = current.parent.as_deref();
        }
        None
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// A child context with all of `vars` bound at once.
    pub fn extend(&self, vars: Map<String, Value>) -> Self {
        Self {
            layer: Some(Arc::new(Layer {
                vars,
                parent: self.layer.clone(),
            })),
        }
    }

    /// A child context with a single extra binding.
    pub fn with(&self, name: impl Into<String>, value: Value) -> Self {
        let mut vars = Map::new();
        vars.insert(name.into(), value);
        self.extend(vars)
    }

    /// Flatten every visible binding into one JSON object.
    pub fn to_value(&self) -> Value {
        let mut layers = Vec::new();
        let mut layer = self.layer.as_deref();
        while let Some(current) = layer {
            layers.push(&current.vars);
            layer = current.parent.as_deref();
        }
        let mut flat = Map::new();
        for vars in layers.into_iter().rev() {
            for (name, value) in vars {
                flat.insert(name.clone(), value.clone());
            }
        }
        Value::Object(flat)
    }
}

impl From<Map<String, Value>> for Context {
    fn from(vars: Map<String, Value>) -> Self {
        Self::new().extend(vars)
    }
}

/// Everything a node renders with: the user-visible [`Context`] plus the
/// engine's own channels, kept out of the variable namespace.
#[derive(Debug, Clone, Default)]
pub(crate) struct Scope {
    pub context: Context,
    /// Id of the innermost active `t-tree` expansion.
    pub tree: Option<u64>,
    /// Set under `t-html`: interpolated values are not escaped.
    pub raw_html: bool,
    /// Rendered `t-fill` content of the include being resolved, by name.
    pub fills: Option<Arc<HashMap<String, String>>>,
}

impl Scope {
    pub fn new(context: Context) -> Self {
        Self {
            context,
            ..Self::default()
        }
    }

    pub fn with_context(&self, context: Context) -> Self {
        Self {
            context,
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn root() -> Context {
        Context::from_value(json!({ "a": 1, "b": { "c": 2 } })).unwrap()
    }

    #[test]
    fn test_lookup() {
        let ctx = root();
        assert_eq!(ctx.get("a"), Some(&json!(1)));
        assert_eq!(ctx.get("b"), Some(&json!({ "c": 2 })));
        assert_eq!(ctx.get("missing"), None);
    }

    #[test]
    fn test_child_shadows_without_touching_parent() {
        let parent = root();
        let child = parent.with("a", json!("shadow"));
        assert_eq!(child.get("a"), Some(&json!("shadow")));
        assert_eq!(child.get("b"), Some(&json!({ "c": 2 })));
        assert_eq!(parent.get("a"), Some(&json!(1)));
    }

    #[test]
    fn test_extend_binds_all_at_once() {
        let mut vars = Map::new();
        vars.insert("x".into(), json!(1));
        vars.insert("y".into(), json!(2));
        let ctx = Context::new().extend(vars);
        assert!(ctx.contains("x"));
        assert!(ctx.contains("y"));
    }

    #[test]
    fn test_from_value() {
        assert!(Context::from_value(Value::Null).is_some());
        assert!(Context::from_value(json!([1, 2])).is_none());
        assert!(Context::from_value(json!("text")).is_none());
    }

    #[test]
    fn test_to_value_flattens_in_order() {
        let ctx = root().with("a", json!(3)).with("d", json!(4));
        assert_eq!(ctx.to_value(), json!({ "a": 3, "b": { "c": 2 }, "d": 4 }));
    }

    #[test]
    fn test_scope_keeps_channels() {
        let scope = Scope {
            tree: Some(7),
            raw_html: true,
            ..Scope::new(root())
        };
        let child = scope.with_context(scope.context.with("z", json!(0)));
        assert_eq!(child.tree, Some(7));
        assert!(child.raw_html);
        assert!(child.context.contains("z"));
    }
}
