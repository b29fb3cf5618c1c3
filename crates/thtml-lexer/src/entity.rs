use crate::escape::PLACEHOLDER_OPEN;

/// Lexical classification of one scanned entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Element,
    Text,
    Comment,
    CDataSection,
    ProcessingInstruction,
    DocType,
}

/// How an element entity affects nesting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Open,
    Close,
    SelfClose,
}

/// One lexical unit produced by the tokenizer.
///
/// `raw` is the escaped source slice: placeholders are still in place and are
/// resolved by the tree builder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entity {
    pub kind: EntityKind,
    pub raw: String,
    pub line: usize,
    /// Only set for [`EntityKind::Element`].
    pub disposition: Option<Disposition>,
}

impl Entity {
    pub fn new(raw: String, line: usize) -> Self {
        let kind = classify(&raw);
        let disposition = (kind == EntityKind::Element).then(|| disposition_of(&raw));
        Self {
            kind,
            raw,
            line,
            disposition,
        }
    }

    pub fn is_element(&self) -> bool {
        self.kind == EntityKind::Element
    }
}

/// Derive the entity kind from its leading characters.
pub fn classify(raw: &str) -> EntityKind {
    if raw.starts_with("<!--") {
        return EntityKind::Comment;
    }
    if raw.starts_with("<!CDATA[[") || raw.starts_with("<![CDATA[") {
        return EntityKind::CDataSection;
    }
    if raw.starts_with("<?") {
        return EntityKind::ProcessingInstruction;
    }
    if raw
        .get(..10)
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case("<!doctype "))
    {
        return EntityKind::DocType;
    }
    let mut chars = raw.chars();
    if chars.next() == Some('<') {
        if let Some(c) = chars.next() {
            if c.is_ascii_alphabetic() || matches!(c, '_' | '-' | '/' | PLACEHOLDER_OPEN) {
                return EntityKind::Element;
            }
        }
    }
    EntityKind::Text
}

fn disposition_of(raw: &str) -> Disposition {
    if raw.starts_with("</") {
        Disposition::Close
    } else if raw.ends_with("/>") || is_void_element(&open_tag_name(raw).to_ascii_lowercase()) {
        Disposition::SelfClose
    } else {
        Disposition::Open
    }
}

/// The tag name of an opening tag: everything after `<` up to whitespace, `/` or `>`.
pub fn open_tag_name(raw: &str) -> &str {
    let body = raw.strip_prefix('<').unwrap_or(raw);
    let end = body
        .find(|c: char| c.is_whitespace() || c == '/' || c == '>')
        .unwrap_or(body.len());
    &body[..end]
}

/// HTML5 void elements (self-closing, no children).
pub const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param",
    "source", "track", "wbr",
];

/// Check if a tag name is an HTML5 void element.
pub fn is_void_element(tag: &str) -> bool {
    VOID_ELEMENTS.contains(&tag)
}
