//! thtml template engine.
//!
//! Templates are HTML with `{{ expression }}` interpolation and `t-*`
//! directive elements: conditionals, loops, scoped bindings, recursive
//! trees and file composition through holes and fills.
//!
//! ```ignore
//! let html = thtml_engine::render(
//!     Source::file("views/index.html"),
//!     json!({ "user": { "name": "Ada" } }),
//!     &RenderOptions::default(),
//! )
//! .await?;
//! ```

pub mod cache;
pub mod context;
pub mod directive;
pub mod engine;
pub mod error;
pub mod eval;
pub mod interpolate;
pub mod loader;
pub mod options;
mod render;

pub use cache::ParseCache;
pub use context::Context;
pub use engine::Engine;
pub use error::{ErrorKind, Frame, RenderError};
pub use eval::{BuiltinEvaluator, EvalError, Evaluator};
pub use loader::{FsLoader, Loader, MemoryLoader};
pub use options::{RenderOptions, Source};

use serde_json::Value;

/// Render with a default [`Engine`]: templates from disk, the built-in
/// expression language and the process-wide parse cache.
pub async fn render(
    source: Source,
    context: Value,
    options: &RenderOptions,
) -> Result<String, RenderError> {
    Engine::default().render(source, context, options).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[tokio::test]
    async fn test_render_with_default_engine() {
        let out = render(
            Source::text("<ul><t-for on=\"x of xs\"><li>{{ x }}</li></t-for></ul>"),
            json!({ "xs": ["a", "b"] }),
            &RenderOptions::default(),
        )
        .await
        .unwrap();
        assert_eq!(out, "<ul><li>a</li><li>b</li></ul>");
    }
}
