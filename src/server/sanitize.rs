use std::sync::LazyLock;

use regex::Regex;

/// Tags allowed in announcement content. Everything else is stripped,
/// attributes included.
const ALLOWED_TAGS: [&str; 7] = ["strong", "em", "u", "p", "ul", "li", "br"];

static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").unwrap());
static ALLOWED_RE: LazyLock<Regex> = LazyLock::new(|| {
    let names = ALLOWED_TAGS.join("|");
    Regex::new(&format!(r"(?i)^<\s*(/?)\s*({names})\s*(/?)\s*>$")).unwrap()
});

/// Reduces announcement markup to a small allowlist of formatting tags.
/// Kept tags are re-emitted in canonical lowercase form with no attributes;
/// anything else, scripts and event handlers included, is dropped.
#[must_use]
pub fn sanitize_html(input: &str) -> String {
    TAG_RE
        .replace_all(input, |caps: &regex::Captures<'_>| {
            match ALLOWED_RE.captures(&caps[0]) {
                Some(tag) => {
                    let closing = &tag[1];
                    let name = tag[2].to_lowercase();
                    let self_closing = &tag[3];
                    format!("<{closing}{name}{self_closing}>")
                }
                None => String::new(),
            }
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keeps_allowed_tags() {
        assert_eq!(
            sanitize_html("<p>Hello <strong>world</strong></p>"),
            "<p>Hello <strong>world</strong></p>"
        );
    }

    #[test]
    fn test_strips_scripts() {
        assert_eq!(
            sanitize_html("<script>alert(1)</script>hi"),
            "alert(1)hi"
        );
    }

    #[test]
    fn test_strips_attributes() {
        assert_eq!(
            sanitize_html(r#"<p onclick="evil()">x</p>"#),
            "x</p>"
        );
    }

    #[test]
    fn test_normalizes_case_and_whitespace() {
        assert_eq!(sanitize_html("<P>a</ P>line<BR/>"), "<p>a</p>line<br/>");
    }

    #[test]
    fn test_plain_text_untouched() {
        assert_eq!(sanitize_html("no markup, 2 < 3"), "no markup, 2 < 3");
    }
}
