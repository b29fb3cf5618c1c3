//! Render errors and the positional trace they accumulate.

use crate::eval::EvalError;
use std::fmt;
use std::path::PathBuf;
use thtml_parser::ParseError;

/// What went wrong, independent of where.
#[derive(Debug, thiserror::Error)]
pub enum ErrorKind {
    /// A directive is missing a required attribute.
    #[error("{0}")]
    MissingAttribute(String),

    /// A malformed `t-for` / `t-tree` expression or `step` value.
    #[error("{0}")]
    InvalidDirectiveExpression(String),

    /// A directive appears where it is not allowed, e.g. `t-else` without `t-if`.
    #[error("{0}")]
    StructuralOrder(String),

    #[error("{0}")]
    TypeMismatch(String),

    /// Two fills or two holes share a name.
    #[error("{0}")]
    DuplicateSlotName(String),

    /// A `t-include` child that is not a `t-fill`.
    #[error("{0}")]
    InvalidCompositionChild(String),

    #[error(transparent)]
    Expression(#[from] EvalError),

    #[error("Cannot read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Parse(#[from] ParseError),
}

/// One template location in an error trace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Template file, `None` for inline sources.
    pub file: Option<String>,
    pub line: usize,
    /// The offending source, trimmed, first line only.
    pub source: String,
}

impl Frame {
    pub fn new(file: Option<String>, line: usize, raw: &str) -> Self {
        let source = raw.trim().lines().next().unwrap_or_default().to_string();
        Self { file, line, source }
    }
}

/// An error raised while rendering, plus the template locations it
/// propagated through. `trace[0]` is where it was raised; every enclosing
/// node appends one frame on the way out.
#[derive(Debug)]
pub struct RenderError {
    pub kind: ErrorKind,
    pub trace: Vec<Frame>,
}

impl RenderError {
    pub fn new(kind: impl Into<ErrorKind>) -> Self {
        Self {
            kind: kind.into(),
            trace: Vec::new(),
        }
    }

    /// Record one more enclosing location.
    pub fn at(mut self, frame: Frame) -> Self {
        self.trace.push(frame);
        self
    }

    /// Nesting depth of the outermost recorded frame.
    pub fn level(&self) -> usize {
        self.trace.len().saturating_sub(1)
    }
}

impl fmt::Display for RenderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        let Some((origin, enclosing)) = self.trace.split_first() else {
            return Ok(());
        };

        let file = origin.file.as_deref().unwrap_or("<inline>");
        let line = origin.line.to_string();
        write!(f, "\n\t{file}:{line}")?;
        write!(f, "\n\t{line}: {}", origin.source)?;
        write!(
            f,
            "\n\t{}{}",
            " ".repeat(line.len() + 2),
            "^".repeat(origin.source.chars().count())
        )?;

        for (i, frame) in enclosing.iter().enumerate() {
            let level = i + 1;
            let indent = " ".repeat(level * 2);
            write!(f, "\n\t{indent}{}: {}", frame.line, frame.source)?;
        }
        Ok(())
    }
}

impl std::error::Error for RenderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.kind)
    }
}

impl From<ErrorKind> for RenderError {
    fn from(kind: ErrorKind) -> Self {
        Self::new(kind)
    }
}

impl From<EvalError> for RenderError {
    fn from(err: EvalError) -> Self {
        Self::new(err)
    }
}

impl From<ParseError> for RenderError {
    fn from(err: ParseError) -> Self {
        Self::new(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn frame(file: Option<&str>, line: usize, raw: &str) -> Frame {
        Frame::new(file.map(str::to_string), line, raw)
    }

    #[test]
    fn test_frame_keeps_first_trimmed_line() {
        let f = frame(None, 3, "  <t-if\n on=\"x\">  ");
        assert_eq!(f.source, "<t-if");
    }

    #[test]
    fn test_display_without_trace() {
        let err = RenderError::new(ErrorKind::StructuralOrder("t-else must follow t-if".into()));
        assert_eq!(err.to_string(), "t-else must follow t-if");
        assert_eq!(err.level(), 0);
    }

    #[test]
    fn test_display_origin_with_carets() {
        let err = RenderError::new(ErrorKind::MissingAttribute(
            "Missing attribute \"on\" for t-if".into(),
        ))
        .at(frame(Some("page.html"), 12, "<t-if>"));
        assert_eq!(
            err.to_string(),
            "Missing attribute \"on\" for t-if\n\tpage.html:12\n\t12: <t-if>\n\t    ^^^^^^"
        );
    }

    #[test]
    fn test_display_nested_levels() {
        let err = RenderError::new(ErrorKind::TypeMismatch("bad".into()))
            .at(frame(None, 4, "{{ x }}"))
            .at(frame(Some("ignored.html"), 3, "<li>"))
            .at(frame(None, 1, "<ul>"));
        assert_eq!(err.level(), 2);
        assert_eq!(
            err.to_string(),
            "bad\n\t<inline>:4\n\t4: {{ x }}\n\t   ^^^^^^^\n\t  3: <li>\n\t    1: <ul>"
        );
    }

    #[test]
    fn test_io_error_message() {
        let err = ErrorKind::Io {
            path: PathBuf::from("a/b.html"),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "not found"),
        };
        assert_eq!(err.to_string(), "Cannot read a/b.html: not found");
    }
}
