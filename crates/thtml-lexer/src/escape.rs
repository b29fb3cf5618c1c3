//! Placeholder escaping.
//!
//! Before the tokenizer looks for `<` and `>`, every span that could confuse
//! it is swapped for an opaque placeholder token:
//!
//! 1. backslash escapes (`\x`)
//! 2. whole `<style>` / `<script>` elements, one placeholder per line
//! 3. `{{ ... }}` expressions, one placeholder per line
//! 4. quoted attribute values (`="..."`), one placeholder for the value
//!
//! Newlines are never hidden inside a placeholder except for quoted values,
//! whose line count the tokenizer recovers through [`PlaceholderTable::decode`].

use std::collections::HashMap;

/// First character of every placeholder token (Unicode private use area).
pub const PLACEHOLDER_OPEN: char = '\u{E000}';
/// Last character of every placeholder token.
pub const PLACEHOLDER_CLOSE: char = '\u{E001}';

/// Maps generated placeholder tokens back to the text they replaced.
///
/// One table is owned by each parse; it is never shared between documents.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PlaceholderTable {
    entries: HashMap<String, String>,
    next_id: usize,
}

impl PlaceholderTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `original` and return the token that stands in for it.
    pub fn insert(&mut self, original: &str) -> String {
        self.next_id += 1;
        let token = format!("{PLACEHOLDER_OPEN}{}{PLACEHOLDER_CLOSE}", self.next_id);
        self.entries.insert(token.clone(), original.to_string());
        token
    }

    /// Look up a single, complete placeholder token.
    pub fn get(&self, token: &str) -> Option<&str> {
        self.entries.get(token).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Replace every placeholder in `text`, recursively, keeping the entries.
    ///
    /// Unknown tokens are left in place.
    pub fn decode(&self, text: &str) -> String {
        let mut out = String::with_capacity(text.len());
        let mut rest = text;
        while let Some((before, token, after)) = split_token(rest) {
            out.push_str(before);
            match self.entries.get(token) {
                Some(original) => out.push_str(&self.decode(original)),
                None => out.push_str(token),
            }
            rest = after;
        }
        out.push_str(rest);
        out
    }

    /// Like [`decode`](Self::decode), but evicts every entry it resolves.
    pub fn take(&mut self, text: &str) -> String {
        let mut out = String::with_capacity(text.len());
        let mut rest = text;
        while let Some((before, token, after)) = split_token(rest) {
            out.push_str(before);
            match self.entries.remove(token) {
                Some(original) => {
                    let resolved = self.take(&original);
                    out.push_str(&resolved);
                }
                None => out.push_str(token),
            }
            rest = after;
        }
        out.push_str(rest);
        out
    }

    /// Count the newlines `text` contains once decoded.
    pub fn count_newlines(&self, text: &str) -> usize {
        let mut count = 0;
        let mut rest = text;
        while let Some((before, token, after)) = split_token(rest) {
            count += before.matches('\n').count();
            if let Some(original) = self.entries.get(token) {
                count += self.count_newlines(original);
            }
            rest = after;
        }
        count + rest.matches('\n').count()
    }
}

/// Split `text` around its first placeholder token.
fn split_token(text: &str) -> Option<(&str, &str, &str)> {
    let start = text.find(PLACEHOLDER_OPEN)?;
    let end = text[start..].find(PLACEHOLDER_CLOSE)? + start + PLACEHOLDER_CLOSE.len_utf8();
    Some((&text[..start], &text[start..end], &text[end..]))
}

/// Hide every span the tag scanner must not see.
pub fn escape(source: &str, table: &mut PlaceholderTable) -> String {
    let text = escape_backslashes(source, table);
    let text = escape_raw_text_elements(&text, table);
    let text = escape_expressions(&text, table);
    escape_quoted_values(&text, table)
}

/// Replace a multi-line span with one placeholder per line.
fn push_per_line(out: &mut String, span: &str, table: &mut PlaceholderTable) {
    let lines: Vec<String> = span.split('\n').map(|line| table.insert(line)).collect();
    out.push_str(&lines.join("\n"));
}

fn escape_backslashes(text: &str, table: &mut PlaceholderTable) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        match (c, chars.peek().copied()) {
            ('\\', Some(next)) if next != '\n' && next != '\r' => {
                chars.next();
                let token = table.insert(&format!("\\{next}"));
                out.push_str(&token);
            }
            _ => out.push(c),
        }
    }
    out
}

const RAW_TEXT_ELEMENTS: &[&str] = &["style", "script"];

fn escape_raw_text_elements(text: &str, table: &mut PlaceholderTable) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pos = 0;
    while let Some(rel) = text[pos..].find('<') {
        let start = pos + rel;
        let Some(name) = raw_text_open_at(text, start) else {
            out.push_str(&text[pos..=start]);
            pos = start + 1;
            continue;
        };
        let close = format!("</{name}>");
        // The element needs at least one character between `<name` and its close tag.
        let search_from = start + 1 + name.len() + 1;
        match find_ignore_ascii_case(text, search_from, &close) {
            Some(close_at) => {
                let end = close_at + close.len();
                out.push_str(&text[pos..start]);
                push_per_line(&mut out, &text[start..end], table);
                pos = end;
            }
            None => {
                out.push_str(&text[pos..=start]);
                pos = start + 1;
            }
        }
    }
    out.push_str(&text[pos..]);
    out
}

/// If a raw text element opens at `at`, return its lowercase name.
fn raw_text_open_at(text: &str, at: usize) -> Option<&'static str> {
    let bytes = text.as_bytes();
    RAW_TEXT_ELEMENTS.iter().copied().find(|name| {
        let end = at + 1 + name.len();
        end < bytes.len()
            && bytes[at + 1..end].eq_ignore_ascii_case(name.as_bytes())
            && matches!(bytes[end], b'>' | b'/' | b' ' | b'\t' | b'\r' | b'\n')
    })
}

fn find_ignore_ascii_case(text: &str, from: usize, needle: &str) -> Option<usize> {
    let hay = text.as_bytes();
    let needle = needle.as_bytes();
    if from > hay.len() || needle.len() > hay.len() {
        return None;
    }
    (from..=hay.len() - needle.len()).find(|&i| hay[i..i + needle.len()].eq_ignore_ascii_case(needle))
}

fn escape_expressions(text: &str, table: &mut PlaceholderTable) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pos = 0;
    while let Some(rel) = text[pos..].find("{{") {
        let start = pos + rel;
        // `{{` must be followed by at least one character before `}}`.
        let body_start = start + 2;
        let Some(first) = text[body_start..].chars().next() else {
            break;
        };
        let search_from = body_start + first.len_utf8();
        let Some(close_rel) = text[search_from..].find("}}") else {
            break;
        };
        let end = search_from + close_rel + 2;
        out.push_str(&text[pos..start]);
        push_per_line(&mut out, &text[start..end], table);
        pos = end;
    }
    out.push_str(&text[pos..]);
    out
}

fn escape_quoted_values(text: &str, table: &mut PlaceholderTable) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pos = 0;
    while let Some(rel) = text[pos..].find('=') {
        let eq = pos + rel;
        let after_eq = eq + 1;
        let ws_len = text[after_eq..]
            .find(|c: char| !c.is_whitespace())
            .unwrap_or(text.len() - after_eq);
        let quote_at = after_eq + ws_len;
        let quote = match text[quote_at..].chars().next() {
            Some(q @ ('"' | '\'')) => q,
            _ => {
                out.push_str(&text[pos..after_eq]);
                pos = after_eq;
                continue;
            }
        };
        let value_start = quote_at + 1;
        let Some(value_len) = text[value_start..].find(quote) else {
            out.push_str(&text[pos..after_eq]);
            pos = after_eq;
            continue;
        };
        let value_end = value_start + value_len;
        out.push_str(&text[pos..quote_at]);
        out.push(quote);
        out.push_str(&table.insert(&text[value_start..value_end]));
        out.push(quote);
        pos = value_end + 1;
    }
    out.push_str(&text[pos..]);
    out
}
