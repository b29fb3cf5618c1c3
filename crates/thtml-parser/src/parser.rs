//! Document parser for thtml.
//!
//! Consumes the entity stream from `thtml-lexer` and rebuilds the node tree
//! with an explicit stack of open elements:
//!
//! - non-element entities and self-closing elements attach to the innermost
//!   open element (or the top level);
//! - an opening tag attaches the same way and becomes the innermost open element;
//! - a closing tag closes the innermost open element, whatever its name.
//!   Stray closing tags (nothing open, or naming a void element) are dropped.
//!
//! Elements still open at the end of input keep `closed == false`.

use crate::ast::{Attributes, Document, Node, NodeId, NodeKind};
use crate::ParseError;
use thtml_lexer::{entity::open_tag_name, is_void_element, Disposition, Entity, EntityKind, PlaceholderTable};

/// thtml document parser.
pub struct Parser {
    placeholders: PlaceholderTable,
    document: Document,
    open: Vec<NodeId>,
}

impl Parser {
    /// Create a parser that resolves placeholders through `placeholders`.
    pub fn new(placeholders: PlaceholderTable) -> Self {
        Self {
            placeholders,
            document: Document::default(),
            open: Vec::new(),
        }
    }

    /// Parse template source into a document.
    pub fn parse(source: &str) -> Result<Document, ParseError> {
        let lexed = thtml_lexer::lex(source);
        let mut parser = Parser::new(lexed.placeholders);
        for entity in lexed.entities {
            parser.push_entity(entity)?;
        }
        Ok(parser.finish())
    }

    /// Feed one entity to the tree builder.
    pub fn push_entity(&mut self, entity: Entity) -> Result<(), ParseError> {
        match entity.disposition {
            None => {
                let raw = self.placeholders.take(&entity.raw);
                self.append(Node {
                    kind: node_kind(entity.kind),
                    tag: String::new(),
                    attributes: Attributes::new(),
                    children: Vec::new(),
                    parent: None,
                    index: 0,
                    raw,
                    line: entity.line,
                    closed: false,
                    self_closing: false,
                });
            }
            Some(Disposition::Close) => self.close(&entity)?,
            Some(disposition) => {
                let tag = self.tag_name(open_tag_name(&entity.raw));
                let attributes = self.parse_attributes(&entity.raw);
                let raw = self.placeholders.take(&entity.raw);
                let self_closing = disposition == Disposition::SelfClose;
                let id = self.append(Node {
                    kind: NodeKind::Element,
                    tag,
                    attributes,
                    children: Vec::new(),
                    parent: None,
                    index: 0,
                    raw,
                    line: entity.line,
                    closed: false,
                    self_closing,
                });
                if !self_closing {
                    self.open.push(id);
                }
            }
        }
        Ok(())
    }

    /// Return the finished document.
    pub fn finish(self) -> Document {
        self.document
    }

    // =========================================================================
    // Tree building
    // =========================================================================

    fn append(&mut self, mut node: Node) -> NodeId {
        let id = NodeId(self.document.nodes.len());
        let parent = self.open.last().copied();
        let siblings = match parent {
            Some(parent) => &mut self.document.nodes[parent.0].children,
            None => &mut self.document.roots,
        };
        node.parent = parent;
        node.index = siblings.len();
        siblings.push(id);
        self.document.nodes.push(node);
        id
    }

    fn close(&mut self, entity: &Entity) -> Result<(), ParseError> {
        let body = entity.raw.strip_prefix("</").unwrap_or(&entity.raw);
        let name = body.split('>').next().unwrap_or_default().trim();
        if name.is_empty() {
            return Err(ParseError {
                message: "Malformed closing tag".into(),
                line: entity.line,
                column: 1,
            });
        }
        let name = self.tag_name(name);
        self.placeholders.take(&entity.raw);

        if is_void_element(&name) {
            return Ok(());
        }
        if let Some(id) = self.open.pop() {
            self.document.nodes[id.0].closed = true;
        }
        Ok(())
    }

    fn tag_name(&self, escaped: &str) -> String {
        self.placeholders.decode(&escaped.to_lowercase())
    }

    // =========================================================================
    // Attributes
    // =========================================================================

    /// Parse `name="value"` pairs out of an escaped opening tag.
    ///
    /// Only values that resolve to a placeholder (i.e. were quoted) are kept.
    /// Valueless and unquoted attributes are dropped.
    fn parse_attributes(&self, raw: &str) -> Attributes {
        let mut attributes = Attributes::new();
        let name_len = open_tag_name(raw).len();
        let body = raw.get(1 + name_len..).unwrap_or_default();
        let trimmed = body.trim_end_matches(['>', '\r', '\n']);
        let body = if trimmed.len() < body.len() {
            trimmed.strip_suffix('/').unwrap_or(trimmed)
        } else {
            body
        };

        let mut rest = body;
        loop {
            rest = rest.trim_start();
            if rest.is_empty() {
                break;
            }
            let name_end = rest
                .find(|c: char| c.is_whitespace() || c == '=')
                .unwrap_or(rest.len());
            if name_end == 0 {
                // A stray `=`
                rest = &rest[1..];
                continue;
            }
            let name = &rest[..name_end];
            rest = &rest[name_end..];

            let after_ws = rest.trim_start();
            let Some(value_part) = after_ws.strip_prefix('=') else {
                continue;
            };
            let value_part = value_part.trim_start();
            let quote = value_part
                .chars()
                .next()
                .filter(|c| matches!(c, '"' | '\''));
            let value_part = match quote {
                Some(q) => &value_part[q.len_utf8()..],
                None => value_part,
            };
            let token_end = value_part
                .find(char::is_whitespace)
                .unwrap_or(value_part.len());
            let mut token = &value_part[..token_end];
            rest = &value_part[token_end..];
            if let Some(q) = quote {
                token = token.strip_suffix(q).unwrap_or(token);
            }

            if self.placeholders.get(token).is_some() {
                attributes.set(
                    self.placeholders.decode(name),
                    unescape_quotes(&self.placeholders.decode(token)),
                );
            }
        }

        attributes
    }
}

/// Turn the quote references written by [`crate::ast::quote_attribute`]
/// back into quote characters.
fn unescape_quotes(value: &str) -> String {
    value.replace("&quot;", "\"").replace("&#39;", "'")
}

fn node_kind(kind: EntityKind) -> NodeKind {
    match kind {
        EntityKind::Element => NodeKind::Element,
        EntityKind::Text => NodeKind::Text,
        EntityKind::Comment => NodeKind::Comment,
        EntityKind::CDataSection => NodeKind::CDataSection,
        EntityKind::ProcessingInstruction => NodeKind::ProcessingInstruction,
        EntityKind::DocType => NodeKind::DocType,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn parse(source: &str) -> Document {
        Parser::parse(source).unwrap()
    }

    fn root(doc: &Document, index: usize) -> &Node {
        doc.node(doc.roots[index])
    }

    fn child(doc: &Document, id: NodeId, index: usize) -> NodeId {
        doc.children(id)[index]
    }

    fn attrs(node: &Node) -> Vec<(String, String)> {
        node.attributes
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    // =========================================================================
    // Empty / simple
    // =========================================================================

    #[test]
    fn test_empty_document() {
        let doc = parse("");
        assert!(doc.roots.is_empty());
        assert!(doc.nodes.is_empty());
    }

    #[test]
    fn test_single_element() {
        let doc = parse("<div>hello</div>");
        assert_eq!(doc.roots.len(), 1);
        let div = root(&doc, 0);
        assert_eq!(div.kind, NodeKind::Element);
        assert_eq!(div.tag, "div");
        assert!(div.closed);
        assert_eq!(div.raw, "<div>");
        let text = doc.node(child(&doc, doc.roots[0], 0));
        assert_eq!(text.kind, NodeKind::Text);
        assert_eq!(text.raw, "hello");
    }

    #[test]
    fn test_multiple_top_level_nodes() {
        let doc = parse("<!DOCTYPE html>\n<p>a</p><p>b</p>");
        let kinds: Vec<NodeKind> = doc.roots.iter().map(|&id| doc.node(id).kind).collect();
        assert_eq!(
            kinds,
            vec![
                NodeKind::DocType,
                NodeKind::Text,
                NodeKind::Element,
                NodeKind::Element,
            ]
        );
    }

    #[test]
    fn test_tag_names_are_lowercased() {
        let doc = parse("<DIV></DIV>");
        assert_eq!(root(&doc, 0).tag, "div");
    }

    // =========================================================================
    // Nesting
    // =========================================================================

    #[test]
    fn test_nested_children() {
        let doc = parse("<ul><li>a</li><li>b</li></ul>");
        let ul = doc.roots[0];
        assert_eq!(doc.children(ul).len(), 2);
        let second = child(&doc, ul, 1);
        assert_eq!(doc.node(second).tag, "li");
        assert_eq!(doc.parent(second), Some(ul));
        assert_eq!(doc.node(second).index, 1);
    }

    #[test]
    fn test_self_closing_does_not_nest() {
        let doc = parse("<div><br><img src=\"a.png\"/><span>x</span></div>");
        let div = doc.roots[0];
        let tags: Vec<&str> = doc
            .children(div)
            .iter()
            .map(|&id| doc.node(id).tag.as_str())
            .collect();
        assert_eq!(tags, vec!["br", "img", "span"]);
        assert!(doc.node(child(&doc, div, 0)).self_closing);
        assert!(!doc.node(child(&doc, div, 0)).closed);
    }

    #[test]
    fn test_close_tags_are_not_matched_by_name() {
        let doc = parse("<a><b></a></b><c></c>");
        let a = doc.roots[0];
        let b = child(&doc, a, 0);
        assert!(doc.node(b).closed, "</a> closes the innermost element");
        assert!(doc.node(a).closed);
        assert_eq!(doc.roots.len(), 2);
        assert_eq!(root(&doc, 1).tag, "c");
    }

    #[test]
    fn test_stray_close_at_top_level_is_dropped() {
        let doc = parse("</div><p>x</p>");
        assert_eq!(doc.roots.len(), 1);
        assert_eq!(root(&doc, 0).tag, "p");
    }

    #[test]
    fn test_void_close_tag_is_dropped() {
        let doc = parse("<p><br></br>x</p>");
        let p = doc.roots[0];
        assert!(doc.node(p).closed);
        assert_eq!(doc.children(p).len(), 2);
    }

    #[test]
    fn test_unclosed_element_at_eof() {
        let doc = parse("<div><span>x");
        let div = doc.roots[0];
        let span = child(&doc, div, 0);
        assert!(!doc.node(div).closed);
        assert!(!doc.node(span).closed);
        assert_eq!(doc.children(span).len(), 1);
    }

    #[test]
    fn test_malformed_closing_tag() {
        let err = Parser::parse("<div>\n</ >").unwrap_err();
        assert_eq!(err.message, "Malformed closing tag");
        assert_eq!(err.line, 2);
    }

    // =========================================================================
    // Sibling navigation
    // =========================================================================

    #[test]
    fn test_sibling_navigation() {
        let doc = parse("<div><a></a> <!-- c --> <b></b></div>");
        let div = doc.roots[0];
        let a = child(&doc, div, 0);
        let b = child(&doc, div, 4);
        assert_eq!(doc.next_sibling(a), Some(child(&doc, div, 1)));
        assert_eq!(doc.next_element_sibling(a), Some(b));
        assert_eq!(doc.prev_element_sibling(b), Some(a));
        assert_eq!(doc.prev_sibling(a), None);
        assert_eq!(doc.next_element_sibling(b), None);
    }

    #[test]
    fn test_top_level_siblings() {
        let doc = parse("<a></a><b></b>");
        assert_eq!(doc.next_sibling(doc.roots[0]), Some(doc.roots[1]));
        assert_eq!(doc.prev_sibling(doc.roots[1]), Some(doc.roots[0]));
    }

    // =========================================================================
    // Attributes
    // =========================================================================

    #[test]
    fn test_quoted_attributes() {
        let doc = parse("<a href=\"/x\" title='Hi > there'></a>");
        assert_eq!(
            attrs(root(&doc, 0)),
            vec![
                ("href".to_string(), "/x".to_string()),
                ("title".to_string(), "Hi > there".to_string()),
            ]
        );
    }

    #[test]
    fn test_attribute_with_spaces_around_equals() {
        let doc = parse("<t-if on = \"a > 1\"></t-if>");
        assert_eq!(root(&doc, 0).attributes.get("on"), Some("a > 1"));
    }

    #[test]
    fn test_expression_in_attribute_is_kept_literally() {
        let doc = parse("<div class=\"item {{ active ? 'on' : 'off' }}\"></div>");
        assert_eq!(
            root(&doc, 0).attributes.get("class"),
            Some("item {{ active ? 'on' : 'off' }}")
        );
    }

    #[test]
    fn test_empty_quoted_value_is_kept() {
        let doc = parse("<input value=\"\">");
        assert_eq!(root(&doc, 0).attributes.get("value"), Some(""));
    }

    #[test]
    fn test_valueless_and_unquoted_attributes_are_dropped() {
        let doc = parse("<input disabled type=text name=\"q\">");
        assert_eq!(
            attrs(root(&doc, 0)),
            vec![("name".to_string(), "q".to_string())]
        );
    }

    #[test]
    fn test_self_closing_attributes() {
        let doc = parse("<t-children field=\"replies\"/>");
        let node = root(&doc, 0);
        assert!(node.self_closing);
        assert_eq!(node.attributes.get("field"), Some("replies"));
    }

    #[test]
    fn test_duplicate_attribute_keeps_first_position() {
        let doc = parse("<a x=\"1\" y=\"2\" x=\"3\"></a>");
        assert_eq!(
            attrs(root(&doc, 0)),
            vec![
                ("x".to_string(), "3".to_string()),
                ("y".to_string(), "2".to_string()),
            ]
        );
    }

    #[test]
    fn test_multiline_attributes() {
        let doc = parse("<t-for\n  on=\"item of items\"\n  step=\"2\"\n></t-for>");
        let node = root(&doc, 0);
        assert_eq!(node.tag, "t-for");
        assert_eq!(node.attributes.get("on"), Some("item of items"));
        assert_eq!(node.attributes.get("step"), Some("2"));
    }

    // =========================================================================
    // Raw text and decoding
    // =========================================================================

    #[test]
    fn test_raw_text_is_decoded() {
        let doc = parse("<p>{{ a > b }} \\{{ c }}</p>");
        let text = doc.node(child(&doc, doc.roots[0], 0));
        assert_eq!(text.raw, "{{ a > b }} \\{{ c }}");
    }

    #[test]
    fn test_element_raw_is_decoded_open_tag() {
        let doc = parse("<a title=\"x > y\">z</a>");
        assert_eq!(root(&doc, 0).raw, "<a title=\"x > y\">");
    }

    #[test]
    fn test_script_body_is_text() {
        let doc = parse("<div><script>if (a < b) { go(); }</script></div>");
        let div = doc.roots[0];
        assert_eq!(doc.children(div).len(), 1);
        let script = doc.node(child(&doc, div, 0));
        assert_eq!(script.kind, NodeKind::Text);
        assert_eq!(script.raw, "<script>if (a < b) { go(); }</script>");
    }

    #[test]
    fn test_comment_and_cdata() {
        let doc = parse("<!-- {{ x }} --><![CDATA[ y ]]>");
        assert_eq!(root(&doc, 0).kind, NodeKind::Comment);
        assert_eq!(root(&doc, 0).raw, "<!-- {{ x }} -->");
        assert_eq!(root(&doc, 1).kind, NodeKind::CDataSection);
    }

    // =========================================================================
    // Lines
    // =========================================================================

    #[test]
    fn test_node_lines() {
        let doc = parse("<ul>\n  <li>a</li>\n  <li>b</li>\n</ul>");
        let ul = doc.roots[0];
        let lines: Vec<usize> = doc
            .children(ul)
            .iter()
            .filter(|&&id| doc.node(id).is_element())
            .map(|&id| doc.node(id).line)
            .collect();
        assert_eq!(lines, vec![2, 3]);
    }

    // =========================================================================
    // Re-serialization
    // =========================================================================

    #[test]
    fn test_markup_round_trip() {
        let source = "<div class=\"a\" id=\"main\"><p title=\"t\">hi <b>you</b></p><br></div>";
        let doc = parse(source);
        assert_eq!(doc.to_markup(doc.roots[0]), source);
    }

    #[test]
    fn test_markup_keeps_values_with_quotes() {
        let doc = parse("<a title='say \"hi\"'>x</a>");
        let markup = doc.to_markup(doc.roots[0]);
        assert_eq!(markup, "<a title='say \"hi\"'>x</a>");
        let again = parse(&markup);
        assert_eq!(
            attrs(root(&again, 0)),
            vec![("title".to_string(), "say \"hi\"".to_string())]
        );
    }

    #[test]
    fn test_markup_round_trip_mixed_quotes() {
        let doc = parse("<a title=\"it's &quot;x&quot;\" alt='&#39;'>y</a>");
        assert_eq!(
            attrs(root(&doc, 0)),
            vec![
                ("title".to_string(), "it's \"x\"".to_string()),
                ("alt".to_string(), "'".to_string()),
            ]
        );
        let markup = doc.to_markup(doc.roots[0]);
        assert_eq!(markup, "<a title=\"it's &quot;x&quot;\" alt=\"'\">y</a>");
        let again = parse(&markup);
        assert_eq!(attrs(root(&again, 0)), attrs(root(&doc, 0)));
    }

    #[test]
    fn test_markup_round_trip_normalizes_quotes() {
        let doc = parse("<a href='x'>y</a>");
        let again = parse(&doc.to_markup(doc.roots[0]));
        assert_eq!(attrs(root(&again, 0)), attrs(root(&doc, 0)));
    }

    #[test]
    fn test_descendants_in_document_order() {
        let doc = parse("<a><b></b><c><d></d></c></a><e></e>");
        let tags: Vec<&str> = doc
            .descendants()
            .map(|id| doc.node(id).tag.as_str())
            .collect();
        assert_eq!(tags, vec!["a", "b", "c", "d", "e"]);
    }
}
