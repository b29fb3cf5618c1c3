use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Per-render settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderOptions {
    /// Reuse parsed trees across renders of identical text.
    pub cache: bool,
    /// Wrap directive output in `<!-- T-NAME BEGIN/END -->` comments.
    pub debug: bool,
    /// Template path: base for `t-include` and name shown in errors.
    pub filename: Option<PathBuf>,
}

impl RenderOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cache(mut self, cache: bool) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn with_filename(mut self, filename: impl Into<PathBuf>) -> Self {
        self.filename = Some(filename.into());
        self
    }
}

/// What to render: template text, or a file read through the loader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    Text(String),
    File(PathBuf),
}

impl Source {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self::File(path.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults() {
        let options = RenderOptions::default();
        assert!(!options.cache);
        assert!(!options.debug);
        assert_eq!(options.filename, None);
    }

    #[test]
    fn test_deserialize_partial() {
        let options: RenderOptions = serde_json::from_str(r#"{ "debug": true }"#).unwrap();
        assert_eq!(options, RenderOptions::new().with_debug(true));
    }

    #[test]
    fn test_builders() {
        let options = RenderOptions::new()
            .with_cache(true)
            .with_filename("views/index.html");
        assert!(options.cache);
        assert_eq!(options.filename, Some(PathBuf::from("views/index.html")));
    }
}
