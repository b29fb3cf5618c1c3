use crate::cache::ParseCache;
use crate::context::{Context, Scope};
use crate::error::{ErrorKind, RenderError};
use crate::eval::{BuiltinEvaluator, Evaluator};
use crate::interpolate::{restore_literal_braces, TIMESTAMP_MARKER};
use crate::loader::{read_text, FsLoader, Loader};
use crate::options::{RenderOptions, Source};
use crate::render::Renderer;
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, instrument, Span};

/// Renders templates.
///
/// An engine is cheap to share: the loader, evaluator and parse cache sit
/// behind `Arc`s, and every render keeps its own state.
///
/// ```ignore
/// let engine = Engine::new();
/// let html = engine
///     .render(Source::text("<p>{{ name }}</p>"), json!({ "name": "Ada" }), &RenderOptions::default())
///     .await?;
/// ```
pub struct Engine {
    loader: Arc<dyn Loader>,
    evaluator: Arc<dyn Evaluator>,
    parse_cache: Arc<ParseCache>,
}

impl Default for Engine {
    fn default() -> Self {
        Self {
            loader: Arc::new(FsLoader),
            evaluator: Arc::new(BuiltinEvaluator::new()),
            parse_cache: ParseCache::global(),
        }
    }
}

impl Engine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_loader(mut self, loader: impl Loader + 'static) -> Self {
        self.loader = Arc::new(loader);
        self
    }

    pub fn with_evaluator(mut self, evaluator: impl Evaluator + 'static) -> Self {
        self.evaluator = Arc::new(evaluator);
        self
    }

    /// Use a private parse cache instead of the process-wide one.
    pub fn with_parse_cache(mut self, cache: Arc<ParseCache>) -> Self {
        self.parse_cache = cache;
        self
    }

    pub fn loader(&self) -> &dyn Loader {
        self.loader.as_ref()
    }

    pub fn evaluator(&self) -> &dyn Evaluator {
        self.evaluator.as_ref()
    }

    pub fn parse_cache(&self) -> &ParseCache {
        &self.parse_cache
    }

    /// Render a template against a JSON context.
    ///
    /// The context must be an object (or `null` for an empty one). A
    /// [`Source::File`] is read through the loader and, unless
    /// `options.filename` is set, also becomes the base for `t-include`.
    #[instrument(skip_all, fields(filename = tracing::field::Empty))]
    pub async fn render(
        &self,
        source: Source,
        context: Value,
        options: &RenderOptions,
    ) -> Result<String, RenderError> {
        let started = Instant::now();
        let context = Context::from_value(context).ok_or_else(|| {
            ErrorKind::TypeMismatch("Render context must be an object".into())
        })?;

        let mut options = options.clone();
        let text = match source {
            Source::Text(text) => text,
            Source::File(path) => {
                let text = read_text(self.loader(), &path)
                    .await
                    .map_err(|source| ErrorKind::Io {
                        path: path.clone(),
                        source,
                    })?;
                options.filename.get_or_insert(path);
                text
            }
        };
        if let Some(filename) = &options.filename {
            Span::current().record("filename", tracing::field::display(filename.display()));
        }

        let filename = options.filename.clone();
        let renderer = Renderer::new(self, options);
        let unit = renderer.load_unit(&text, filename)?;
        let output = renderer
            .render_nodes(&unit, &unit.document.roots, &Scope::new(context))
            .await?;

        let elapsed = started.elapsed().as_millis();
        debug!(elapsed_ms = elapsed as u64, "render complete");
        let output = output.replacen(TIMESTAMP_MARKER, &elapsed.to_string(), 1);
        Ok(restore_literal_braces(&output))
    }

    /// Parse a template and run the static checks without rendering it.
    pub fn check(&self, text: &str, filename: Option<&Path>) -> Result<(), RenderError> {
        Renderer::new(self, RenderOptions::default())
            .load_unit(text, filename.map(Path::to_path_buf))
            .map(|_| ())
    }
}
