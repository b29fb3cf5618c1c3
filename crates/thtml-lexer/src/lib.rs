//! thtml Lexer
//!
//! Turns raw template text into a flat stream of lexical entities.
//! Quoted attribute values, `{{ expr }}` spans, backslash escapes and
//! `<style>`/`<script>` bodies are first hidden behind placeholders so the
//! `<`/`>` scanner only ever sees real tag boundaries.
//!
//! # Example
//!
//! ```
//! use thtml_lexer::{lex, EntityKind};
//!
//! let lexed = lex("<p title=\"a > b\">hi</p>");
//! assert_eq!(lexed.entities.len(), 3);
//! assert_eq!(lexed.entities[0].kind, EntityKind::Element);
//! ```

pub mod entity;
pub mod escape;
pub mod scanner;

pub use entity::{is_void_element, Disposition, Entity, EntityKind, VOID_ELEMENTS};
pub use escape::{escape, PlaceholderTable};
pub use scanner::Scanner;

/// Output of [`lex`]: the entities plus the placeholder table needed to
/// decode their `raw` text.
#[derive(Debug, Clone)]
pub struct Lexed {
    pub entities: Vec<Entity>,
    pub placeholders: PlaceholderTable,
}

/// Escape and tokenize a template source.
pub fn lex(source: &str) -> Lexed {
    let mut placeholders = PlaceholderTable::new();
    let escaped = escape(source, &mut placeholders);
    let entities = Scanner::tokenize(&escaped, &placeholders);
    Lexed {
        entities,
        placeholders,
    }
}
