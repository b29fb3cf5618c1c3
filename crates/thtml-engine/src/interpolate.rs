//! `{{ expr }}` interpolation.

use crate::context::Context;
use crate::eval::{stringify, EvalError, Evaluator};

/// Marker replaced with the render time once the whole output is produced.
pub const TIMESTAMP_MARKER: &str = "@{timestamp}@";

/// Replace every `{{ expr }}` in `text` with the expression's value.
///
/// Values are stringified, then `<` and `>` are escaped unless `raw_html`
/// is set. An expression needs at least one character between the braces
/// and ends at the first `}}`.
pub fn interpolate(
    text: &str,
    context: &Context,
    evaluator: &dyn Evaluator,
    raw_html: bool,
) -> Result<String, EvalError> {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(open) = rest.find("{{") {
        let body = &rest[open + 2..];
        let Some(first) = body.chars().next() else {
            break;
        };
        let Some(close) = body[first.len_utf8()..].find("}}") else {
            break;
        };
        let close = close + first.len_utf8();

        out.push_str(&rest[..open]);
        let value = evaluator.evaluate(body[..close].trim(), context)?;
        let value = stringify(&value);
        if raw_html {
            out.push_str(&value);
        } else {
            out.push_str(&escape_html(&value));
        }
        rest = &body[close + 2..];
    }

    out.push_str(rest);
    Ok(out)
}

/// Escape the characters that would open or close markup.
pub fn escape_html(text: &str) -> String {
    text.replace('<', "&lt;").replace('>', "&gt;")
}

/// Turn the literal-brace escapes `{!{` / `}!}` back into `{{` / `}}`.
pub fn restore_literal_braces(text: &str) -> String {
    text.replace("{!{", "{{").replace("}!}", "}}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eval::BuiltinEvaluator;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn render(text: &str, raw_html: bool) -> String {
        let ctx = Context::from_value(json!({
            "name": "<Al>",
            "n": 2,
            "user": { "id": 1 },
            "list": [1, 2]
        }))
        .unwrap();
        interpolate(text, &ctx, &BuiltinEvaluator::new(), raw_html).unwrap()
    }

    #[test]
    fn test_plain_text_untouched() {
        assert_eq!(render("no expressions", false), "no expressions");
    }

    #[test]
    fn test_values_are_escaped() {
        assert_eq!(render("Hi {{name}}!", false), "Hi &lt;Al&gt;!");
    }

    #[test]
    fn test_raw_html_skips_escaping() {
        assert_eq!(render("Hi {{ name }}!", true), "Hi <Al>!");
    }

    #[test]
    fn test_multiple_expressions() {
        assert_eq!(render("{{ n }} + {{ n }} = {{ n + n }}", false), "2 + 2 = 4");
    }

    #[test]
    fn test_objects_and_arrays() {
        assert_eq!(render("{{ user }} {{ list }}", false), "{\"id\":1} 1,2");
    }

    #[test]
    fn test_expression_spanning_lines() {
        assert_eq!(render("{{ n\n * 3 }}", false), "6");
    }

    #[test]
    fn test_literal_braces_are_not_evaluated() {
        let text = render("{!{ name }!}", false);
        assert_eq!(text, "{!{ name }!}");
        assert_eq!(restore_literal_braces(&text), "{{ name }}");
    }

    #[test]
    fn test_unterminated_expression_is_text() {
        assert_eq!(render("a {{ b", false), "a {{ b");
    }

    #[test]
    fn test_evaluation_error_propagates() {
        let ctx = Context::new();
        let err = interpolate("{{ missing }}", &ctx, &BuiltinEvaluator::new(), false).unwrap_err();
        assert_eq!(err, EvalError::Undefined("missing".into()));
    }
}
