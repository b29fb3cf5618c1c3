use crate::entity::Entity;
use crate::escape::PlaceholderTable;

/// Entity scanner.
///
/// Splits escaped template text into a flat sequence of entities: every
/// `<...>` span is one entity, every run of text between them is another.
/// The scanner never fails; malformed markup simply produces text entities
/// or unterminated element entities that the tree builder tolerates.
pub struct Scanner<'a> {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    placeholders: &'a PlaceholderTable,
}

impl<'a> Scanner<'a> {
    /// Create a scanner over escaped text. `placeholders` is consulted only to
    /// count newlines hidden inside placeholder tokens.
    pub fn new(escaped: &str, placeholders: &'a PlaceholderTable) -> Self {
        Self {
            chars: escaped.chars().collect(),
            pos: 0,
            line: 1,
            placeholders,
        }
    }

    /// Scan the whole input into entities.
    pub fn tokenize(escaped: &str, placeholders: &PlaceholderTable) -> Vec<Entity> {
        let mut scanner = Scanner::new(escaped, placeholders);
        let mut entities = Vec::new();
        while let Some(entity) = scanner.next_entity() {
            entities.push(entity);
        }
        entities
    }

    /// Scan the next entity starting at the current offset.
    pub fn next_entity(&mut self) -> Option<Entity> {
        if self.is_at_end() {
            return None;
        }

        let mut buffer = String::new();
        let mut in_tag = false;

        while !self.is_at_end() {
            let ch = self.peek();
            match ch {
                '<' if !buffer.is_empty() => break,
                '<' => in_tag = true,
                '>' if in_tag => {
                    buffer.push(ch);
                    self.advance();
                    break;
                }
                _ => {}
            }
            buffer.push(ch);
            self.advance();
        }

        // An entity spanning lines reports the line after its start, keeping
        // leading-newline text runs pointed at their content.
        let rows = self.placeholders.count_newlines(&buffer);
        let line = self.line + usize::from(rows > 0);
        self.line += rows;
        Some(Entity::new(buffer, line))
    }

    fn peek(&self) -> char {
        self.chars[self.pos]
    }

    fn advance(&mut self) {
        self.pos += 1;
    }

    fn is_at_end(&self) -> bool {
        self.pos >= self.chars.len()
    }
}
