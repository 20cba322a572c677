//! Markup Element Scanner
//!
//! A small, deterministic tag scanner over loosely-structured generated
//! markup. It maintains an open-element stack so captured elements know
//! their ancestors, tolerates unclosed tags (they are dropped when an
//! enclosing element closes), and records the text immediately around each
//! captured element for semantic naming.
//!
//! This is deliberately not a conforming HTML parser: generated markup is
//! best-effort input, and the extractor's contract is determinism, not
//! spec-grade parsing.

use regex::Regex;
use std::sync::OnceLock;

/// Ancestor summary, nearest-first
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AncestorInfo {
    pub tag: String,
    pub class: String,
}

/// One captured element of interest
#[derive(Debug, Clone)]
pub struct CapturedElement {
    /// Lowercased tag name
    pub tag: String,
    /// Attributes in source order, names lowercased
    pub attrs: Vec<(String, String)>,
    /// Raw inner markup (empty for self-closing elements)
    pub inner: String,
    /// Outer byte range in the source
    pub span: (usize, usize),
    /// Enclosing elements, nearest-first
    pub ancestors: Vec<AncestorInfo>,
    /// Trimmed text immediately before the open tag
    pub preceding_text: String,
    /// Trimmed text immediately after the close tag
    pub following_text: String,
}

impl CapturedElement {
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }
}

struct OpenTag {
    tag: String,
    class: String,
    attrs: Vec<(String, String)>,
    outer_start: usize,
    content_start: usize,
}

fn tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)<!--.*?-->|<!\[CDATA\[.*?\]\]>|<![^>]*>|</?[a-zA-Z][^>]*>")
            .expect("tag regex")
    })
}

fn attr_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"([a-zA-Z_:][-a-zA-Z0-9_:.]*)\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'>/]+))"#)
            .expect("attr regex")
    })
}

/// HTML void elements: never pushed on the open stack
const VOID_TAGS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

/// Capture every element with one of the target tag names, in document
/// order of their open tags. Raw `<script>`/`<style>` bodies are treated
/// as opaque (no tag scanning inside them).
pub fn capture_elements(markup: &str, targets: &[&str]) -> Vec<CapturedElement> {
    let mut open_stack: Vec<OpenTag> = Vec::new();
    let mut captured: Vec<CapturedElement> = Vec::new();
    // Inside a raw-text element (script/style), tags are inert until the
    // matching close tag.
    let mut raw_until: Option<String> = None;

    for m in tag_re().find_iter(markup) {
        let text = m.as_str();

        if text.starts_with("<!") {
            continue;
        }

        if let Some(raw_tag) = raw_until.take() {
            if is_close_of(text, &raw_tag) {
                close_element(markup, &mut open_stack, &mut captured, targets, &raw_tag, &m);
            } else {
                raw_until = Some(raw_tag);
            }
            continue;
        }

        if let Some(rest) = text.strip_prefix("</") {
            let tag = tag_name(rest);
            close_element(markup, &mut open_stack, &mut captured, targets, &tag, &m);
            continue;
        }

        let tag = tag_name(&text[1..]);
        let attrs = parse_attrs(text);
        let self_closing = text.ends_with("/>") || VOID_TAGS.contains(&tag.as_str());

        if self_closing {
            if targets.contains(&tag.as_str()) {
                captured.push(make_capture(
                    markup,
                    &open_stack,
                    tag,
                    attrs,
                    String::new(),
                    (m.start(), m.end()),
                ));
            }
            continue;
        }

        if tag == "script" || tag == "style" {
            raw_until = Some(tag.clone());
        }

        let class = attrs
            .iter()
            .find(|(n, _)| n == "class")
            .map(|(_, v)| v.clone())
            .unwrap_or_default();
        open_stack.push(OpenTag {
            tag,
            class,
            attrs,
            outer_start: m.start(),
            content_start: m.end(),
        });
    }

    captured.sort_by_key(|c| c.span.0);
    captured
}

fn is_close_of(text: &str, tag: &str) -> bool {
    text.strip_prefix("</")
        .map(|rest| tag_name(rest) == tag)
        .unwrap_or(false)
}

fn close_element(
    markup: &str,
    open_stack: &mut Vec<OpenTag>,
    captured: &mut Vec<CapturedElement>,
    targets: &[&str],
    tag: &str,
    m: &regex::Match<'_>,
) {
    let Some(pos) = open_stack.iter().rposition(|o| o.tag == tag) else {
        // Stray close tag, ignore
        return;
    };
    // Entries above the match are unclosed descendants; drop them
    open_stack.truncate(pos + 1);
    let open = match open_stack.pop() {
        Some(open) => open,
        None => return,
    };

    if targets.contains(&tag) {
        let inner = markup[open.content_start..m.start()].to_string();
        captured.push(make_capture(
            markup,
            open_stack,
            open.tag,
            open.attrs,
            inner,
            (open.outer_start, m.end()),
        ));
    }
}

fn make_capture(
    markup: &str,
    open_stack: &[OpenTag],
    tag: String,
    attrs: Vec<(String, String)>,
    inner: String,
    span: (usize, usize),
) -> CapturedElement {
    let ancestors = open_stack
        .iter()
        .rev()
        .map(|o| AncestorInfo {
            tag: o.tag.clone(),
            class: o.class.clone(),
        })
        .collect();

    CapturedElement {
        tag,
        attrs,
        inner,
        span,
        ancestors,
        preceding_text: text_before(markup, span.0),
        following_text: text_after(markup, span.1),
    }
}

fn tag_name(rest: &str) -> String {
    rest.chars()
        .take_while(|c| c.is_ascii_alphanumeric() || *c == '-')
        .collect::<String>()
        .to_lowercase()
}

fn parse_attrs(tag_text: &str) -> Vec<(String, String)> {
    attr_re()
        .captures_iter(tag_text)
        .map(|cap| {
            let name = cap[1].to_lowercase();
            let value = cap
                .get(2)
                .or_else(|| cap.get(3))
                .or_else(|| cap.get(4))
                .map(|v| v.as_str().to_string())
                .unwrap_or_default();
            (name, value)
        })
        .collect()
}

/// Text between the previous tag and `pos`, trimmed
fn text_before(markup: &str, pos: usize) -> String {
    let head = &markup[..pos];
    let start = head.rfind('>').map(|i| i + 1).unwrap_or(0);
    head[start..].trim().to_string()
}

/// Text between `pos` and the next tag, trimmed
fn text_after(markup: &str, pos: usize) -> String {
    let tail = &markup[pos..];
    let end = tail.find('<').unwrap_or(tail.len());
    tail[..end].trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_captures_simple_element() {
        let markup = r#"<div><svg viewBox="0 0 24 24"><path d="M1 1"/></svg></div>"#;
        let elements = capture_elements(markup, &["svg"]);
        assert_eq!(elements.len(), 1);
        assert_eq!(elements[0].tag, "svg");
        assert_eq!(elements[0].attr("viewbox"), Some("0 0 24 24"));
        assert!(elements[0].inner.contains("<path"));
    }

    #[test]
    fn test_ancestors_nearest_first() {
        let markup = r#"<nav class="top"><ul><li><svg></svg></li></ul></nav>"#;
        let elements = capture_elements(markup, &["svg"]);
        let tags: Vec<&str> = elements[0].ancestors.iter().map(|a| a.tag.as_str()).collect();
        assert_eq!(tags, vec!["li", "ul", "nav"]);
        assert_eq!(elements[0].ancestors[2].class, "top");
    }

    #[test]
    fn test_sibling_order_is_document_order() {
        let markup = "<svg id=\"a\"></svg><svg id=\"b\"></svg><svg id=\"c\"></svg>";
        let elements = capture_elements(markup, &["svg"]);
        let ids: Vec<_> = elements.iter().filter_map(|e| e.attr("id")).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_unclosed_child_tolerated() {
        // The <g> never closes; the svg still captures
        let markup = "<svg><g><path d=\"M0 0\"/></svg>";
        let elements = capture_elements(markup, &["svg"]);
        assert_eq!(elements.len(), 1);
        assert!(elements[0].inner.contains("<g>"));
    }

    #[test]
    fn test_surrounding_text_captured() {
        let markup = "<div>Home <svg></svg> sweet</div>";
        let elements = capture_elements(markup, &["svg"]);
        assert_eq!(elements[0].preceding_text, "Home");
        assert_eq!(elements[0].following_text, "sweet");
    }

    #[test]
    fn test_style_content_is_opaque() {
        // A '<' inside a style body must not derail the scanner
        let markup = "<style>.a { color: red; } /* < not a tag */</style><svg></svg>";
        let styles = capture_elements(markup, &["style", "svg"]);
        assert_eq!(styles.len(), 2);
        assert!(styles[0].inner.contains("color: red"));
        assert_eq!(styles[1].tag, "svg");
    }

    #[test]
    fn test_comments_and_doctype_skipped() {
        let markup = "<!DOCTYPE html><!-- <svg></svg> --><svg></svg>";
        let elements = capture_elements(markup, &["svg"]);
        assert_eq!(elements.len(), 1);
    }

    #[test]
    fn test_single_quoted_and_bare_attrs() {
        let markup = "<svg width='32' height=16></svg>";
        let elements = capture_elements(markup, &["svg"]);
        assert_eq!(elements[0].attr("width"), Some("32"));
        assert_eq!(elements[0].attr("height"), Some("16"));
    }

    #[test]
    fn test_no_targets_found() {
        let elements = capture_elements("<div>plain</div>", &["svg"]);
        assert!(elements.is_empty());
    }
}
