//! Directive tag names and the mini-grammars of their `on` attributes.

pub const IF: &str = "t-if";
pub const ELIF: &str = "t-elif";
pub const ELSE: &str = "t-else";
pub const FOR: &str = "t-for";
pub const WITH: &str = "t-with";
pub const TREE: &str = "t-tree";
pub const CHILDREN: &str = "t-children";
pub const INCLUDE: &str = "t-include";
pub const HOLE: &str = "t-hole";
pub const FILL: &str = "t-fill";
pub const HTML: &str = "t-html";

/// Whether the interpreter wraps this directive's output in debug markers.
pub fn has_debug_markers(tag: &str) -> bool {
    matches!(tag, IF | ELIF | ELSE | FOR | WITH | TREE | INCLUDE | HTML)
}

/// Longest numeric range a `t-for` may expand.
pub const MAX_RANGE_LEN: i64 = 100_000;

/// `of` iterates values, `in` iterates keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopKind {
    Of,
    In,
}

/// Where a `t-for` gets its items from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopSource {
    /// Inclusive integer range, from `N` (`0..=N`) or `A-B`.
    Range(i64, i64),
    Expression(String),
}

/// A parsed `t-for on="value[, key] (of|in) source"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForLoop {
    pub value: String,
    pub key: Option<String>,
    pub kind: LoopKind,
    pub source: LoopSource,
}

impl ForLoop {
    pub fn parse(on: &str) -> Option<Self> {
        let words: Vec<&str> = on.split_whitespace().collect();
        let at = words.iter().position(|w| *w == "of" || *w == "in")?;
        let kind = if words[at] == "of" {
            LoopKind::Of
        } else {
            LoopKind::In
        };

        let names = words[..at].join(" ");
        let mut names = names.split(',').map(str::trim);
        let value = names.next().filter(|n| is_identifier(n))?.to_string();
        let key = match names.next() {
            Some(key) if is_identifier(key) => Some(key.to_string()),
            Some(_) => return None,
            None => None,
        };
        if names.next().is_some() {
            return None;
        }

        let source = words[at + 1..].join(" ");
        if source.is_empty() {
            return None;
        }
        let source = match kind {
            LoopKind::Of => parse_range(&source).unwrap_or(LoopSource::Expression(source)),
            LoopKind::In => LoopSource::Expression(source),
        };

        Some(Self {
            value,
            key,
            kind,
            source,
        })
    }
}

fn parse_range(text: &str) -> Option<LoopSource> {
    let all_digits = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());
    match text.split_once('-') {
        None if all_digits(text) => Some(LoopSource::Range(0, text.parse().ok()?)),
        Some((from, to)) if all_digits(from) && all_digits(to) => {
            Some(LoopSource::Range(from.parse().ok()?, to.parse().ok()?))
        }
        _ => None,
    }
}

/// A parsed `t-tree on="data as item"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeBinding {
    pub data: String,
    pub item_var: String,
}

impl TreeBinding {
    pub fn parse(on: &str) -> Option<Self> {
        let (data, item_var) = on.split_once(" as ")?;
        let (data, item_var) = (data.trim(), item_var.trim());
        if data.is_empty() || !is_identifier(item_var) {
            return None;
        }
        Some(Self {
            data: data.to_string(),
            item_var: item_var.to_string(),
        })
    }
}

/// A name usable as a template variable.
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c.is_alphabetic() || c == '_' || c == '$')
        && chars.all(|c| c.is_alphanumeric() || c == '_' || c == '$')
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn for_loop(on: &str) -> ForLoop {
        ForLoop::parse(on).unwrap()
    }

    #[test]
    fn test_for_of_expression() {
        assert_eq!(
            for_loop("item of user.items"),
            ForLoop {
                value: "item".into(),
                key: None,
                kind: LoopKind::Of,
                source: LoopSource::Expression("user.items".into()),
            }
        );
    }

    #[test]
    fn test_for_with_key() {
        let parsed = for_loop("v, k in map");
        assert_eq!(parsed.value, "v");
        assert_eq!(parsed.key.as_deref(), Some("k"));
        assert_eq!(parsed.kind, LoopKind::In);

        assert_eq!(for_loop("v,k of list").key.as_deref(), Some("k"));
        assert_eq!(for_loop("v ,k of list").key.as_deref(), Some("k"));
    }

    #[test]
    fn test_for_ranges() {
        assert_eq!(for_loop("i of 3-5").source, LoopSource::Range(3, 5));
        assert_eq!(for_loop("i of 4").source, LoopSource::Range(0, 4));
        assert_eq!(
            for_loop("i in 4").source,
            LoopSource::Expression("4".into()),
            "ranges only apply to `of`"
        );
        assert_eq!(
            for_loop("i of a-b").source,
            LoopSource::Expression("a-b".into())
        );
    }

    #[test]
    fn test_for_source_may_contain_spaces() {
        assert_eq!(
            for_loop("x of items ?? []").source,
            LoopSource::Expression("items ?? []".into())
        );
    }

    #[test]
    fn test_for_rejects_malformed() {
        for on in ["", "item", "item of", "of items", "1x of items", "a, b, c of items", "a, of x"] {
            assert_eq!(ForLoop::parse(on), None, "{on:?} should be rejected");
        }
    }

    #[test]
    fn test_tree_binding() {
        assert_eq!(
            TreeBinding::parse("comments as comment"),
            Some(TreeBinding {
                data: "comments".into(),
                item_var: "comment".into(),
            })
        );
        assert_eq!(TreeBinding::parse("comments"), None);
        assert_eq!(TreeBinding::parse("comments as"), None);
        assert_eq!(TreeBinding::parse(" as x"), None);
    }

    #[test]
    fn test_debug_markers() {
        assert!(has_debug_markers(IF));
        assert!(has_debug_markers(INCLUDE));
        assert!(!has_debug_markers(CHILDREN));
        assert!(!has_debug_markers(HOLE));
        assert!(!has_debug_markers("div"));
    }
}
