//! Icon Extraction
//!
//! Selects every vector-graphic element from generated markup and derives
//! a stable id, a semantic name, a bounding size, and a category for each.
//! Pure and deterministic: identical markup always yields identical icons.

use regex::Regex;
use std::sync::OnceLock;

use super::markup::{AncestorInfo, CapturedElement, capture_elements};
use crate::constants::extract as consts;
use crate::types::{IconArtifact, IconCategory};

fn title_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<title[^>]*>(.*?)</title>").expect("title regex"))
}

/// Extract every `<svg>` element as an icon.
///
/// Zero vector elements is not an error: the result is simply empty and
/// callers decide whether that is acceptable.
pub fn extract_icons(markup: &str) -> Vec<IconArtifact> {
    capture_elements(markup, &["svg"])
        .iter()
        .enumerate()
        .map(|(index, element)| IconArtifact {
            id: format!("icon-{}", index),
            semantic_name: semantic_name(element, index),
            raw_markup: markup[element.span.0..element.span.1].to_string(),
            bounding_size: bounding_size(element),
            category: category(&element.ancestors),
        })
        .collect()
}

/// Concatenate all embedded stylesheet text in document order
pub fn extract_stylesheet(markup: &str) -> String {
    capture_elements(markup, &["style"])
        .iter()
        .map(|e| e.inner.trim())
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Name priority: explicit name attribute, then title child, then short
/// enclosing text, then an `icon-` class fragment, then the cyclic
/// fallback list indexed by position.
fn semantic_name(element: &CapturedElement, index: usize) -> String {
    if let Some(name) = element
        .attr("data-name")
        .or_else(|| element.attr("aria-label"))
        .filter(|v| !v.trim().is_empty())
    {
        return sanitize(name);
    }

    if let Some(cap) = title_re().captures(&element.inner) {
        let title = cap[1].trim();
        if !title.is_empty() {
            return sanitize(title);
        }
    }

    let enclosing = if !element.preceding_text.is_empty() {
        element.preceding_text.as_str()
    } else {
        element.following_text.as_str()
    };
    if !enclosing.is_empty() && enclosing.len() <= consts::MAX_TEXT_NAME_LEN {
        return sanitize(enclosing);
    }

    if let Some(fragment) = icon_class_fragment(element) {
        return fragment;
    }

    consts::FALLBACK_NAMES[index % consts::FALLBACK_NAMES.len()].to_string()
}

/// First class token containing `icon-`, on the element or an ancestor,
/// with the prefix stripped
fn icon_class_fragment(element: &CapturedElement) -> Option<String> {
    let own = element.attr("class").unwrap_or_default();
    let candidates = std::iter::once(own).chain(element.ancestors.iter().map(|a| a.class.as_str()));

    for class in candidates {
        for token in class.split_whitespace() {
            if let Some(pos) = token.find("icon-") {
                let fragment = &token[pos + "icon-".len()..];
                if !fragment.is_empty() {
                    return Some(sanitize(fragment));
                }
            }
        }
    }
    None
}

/// Bounding size: max of the parsed viewBox width/height, else declared
/// width/height attributes, else the default
fn bounding_size(element: &CapturedElement) -> u32 {
    if let Some(viewbox) = element.attr("viewbox")
        && let Some(size) = viewbox_size(viewbox)
    {
        return size;
    }

    let width = dimension(element.attr("width"));
    let height = dimension(element.attr("height"));
    match (width, height) {
        (Some(w), Some(h)) => w.max(h),
        (Some(w), None) => w,
        (None, Some(h)) => h,
        (None, None) => consts::DEFAULT_BOUNDING_SIZE,
    }
}

fn viewbox_size(viewbox: &str) -> Option<u32> {
    let parts: Vec<f32> = viewbox
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|s| !s.is_empty())
        .filter_map(|s| s.parse().ok())
        .collect();
    if parts.len() != 4 {
        return None;
    }
    let size = parts[2].max(parts[3]);
    if size <= 0.0 {
        return None;
    }
    Some(size.round() as u32)
}

fn dimension(value: Option<&str>) -> Option<u32> {
    let raw = value?.trim().trim_end_matches("px");
    let parsed: f32 = raw.parse().ok()?;
    if parsed <= 0.0 {
        return None;
    }
    Some(parsed.round() as u32)
}

/// Category from the nearest matching ancestor container
fn category(ancestors: &[AncestorInfo]) -> IconCategory {
    for ancestor in ancestors {
        let class = ancestor.class.to_lowercase();
        match ancestor.tag.as_str() {
            "nav" => return IconCategory::Navigation,
            "form" | "fieldset" | "label" => return IconCategory::Form,
            "button" => return IconCategory::Button,
            _ => {}
        }
        if class.contains("nav") {
            return IconCategory::Navigation;
        }
        if class.contains("form") {
            return IconCategory::Form;
        }
        if class.contains("social") {
            return IconCategory::Social;
        }
        if class.contains("btn") || class.contains("button") {
            return IconCategory::Button;
        }
    }
    IconCategory::General
}

fn sanitize(name: &str) -> String {
    name.trim()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("-")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_five_nameless_svgs_use_fallback_names() {
        let markup = "<svg></svg><svg></svg><svg></svg><svg></svg><svg></svg>";
        let icons = extract_icons(markup);
        assert_eq!(icons.len(), 5);
        let names: Vec<&str> = icons.iter().map(|i| i.semantic_name.as_str()).collect();
        assert_eq!(names, vec!["home", "user", "settings", "search", "menu"]);
        assert!(icons.iter().all(|i| i.category == IconCategory::General));
        assert!(icons.iter().all(|i| i.bounding_size == 24));
    }

    #[test]
    fn test_ids_are_unique_and_stable() {
        let markup = "<svg></svg><svg></svg>";
        let icons = extract_icons(markup);
        assert_eq!(icons[0].id, "icon-0");
        assert_eq!(icons[1].id, "icon-1");
    }

    #[test]
    fn test_explicit_name_attribute_wins() {
        let markup = r#"<svg data-name="Arrow Left" class="icon-misc"></svg>"#;
        let icons = extract_icons(markup);
        assert_eq!(icons[0].semantic_name, "arrow-left");
    }

    #[test]
    fn test_aria_label_used_when_no_data_name() {
        let markup = r#"<svg aria-label="close"></svg>"#;
        assert_eq!(extract_icons(markup)[0].semantic_name, "close");
    }

    #[test]
    fn test_title_child_beats_enclosing_text() {
        let markup = "<div>Other<svg><title>Trash</title></svg></div>";
        assert_eq!(extract_icons(markup)[0].semantic_name, "trash");
    }

    #[test]
    fn test_enclosing_text_used_when_short() {
        let markup = "<li><svg></svg> Dashboard</li>";
        assert_eq!(extract_icons(markup)[0].semantic_name, "dashboard");
    }

    #[test]
    fn test_long_enclosing_text_skipped() {
        let markup = "<li><svg class=\"icon-gear\"></svg> a much much too long descriptive sentence here</li>";
        assert_eq!(extract_icons(markup)[0].semantic_name, "gear");
    }

    #[test]
    fn test_icon_class_fragment_from_ancestor() {
        let markup = r#"<span class="wrap icon-upload"><svg></svg></span>"#;
        assert_eq!(extract_icons(markup)[0].semantic_name, "upload");
    }

    #[test]
    fn test_viewbox_size_uses_max_dimension() {
        let markup = r#"<svg viewBox="0 0 32 16"></svg>"#;
        assert_eq!(extract_icons(markup)[0].bounding_size, 32);
    }

    #[test]
    fn test_width_height_fallback() {
        let markup = r#"<svg width="18px" height="20"></svg>"#;
        assert_eq!(extract_icons(markup)[0].bounding_size, 20);
    }

    #[test]
    fn test_malformed_viewbox_defaults() {
        let markup = r#"<svg viewBox="bogus"></svg>"#;
        assert_eq!(extract_icons(markup)[0].bounding_size, 24);
    }

    #[test]
    fn test_category_from_nav_ancestor() {
        let markup = "<nav><svg></svg></nav>";
        assert_eq!(extract_icons(markup)[0].category, IconCategory::Navigation);
    }

    #[test]
    fn test_category_from_form_and_button() {
        let markup = "<form><svg></svg></form><button><svg></svg></button>";
        let icons = extract_icons(markup);
        assert_eq!(icons[0].category, IconCategory::Form);
        assert_eq!(icons[1].category, IconCategory::Button);
    }

    #[test]
    fn test_category_social_from_class() {
        let markup = r#"<div class="social-links"><svg></svg></div>"#;
        assert_eq!(extract_icons(markup)[0].category, IconCategory::Social);
    }

    #[test]
    fn test_nearest_ancestor_wins() {
        let markup = "<nav><button><svg></svg></button></nav>";
        assert_eq!(extract_icons(markup)[0].category, IconCategory::Button);
    }

    #[test]
    fn test_zero_svgs_is_empty_not_error() {
        assert!(extract_icons("<div>no icons here</div>").is_empty());
    }

    #[test]
    fn test_stylesheet_concatenated_in_order() {
        let markup = "<style>.a{}</style><svg></svg><style>.b{}</style>";
        assert_eq!(extract_stylesheet(markup), ".a{}\n.b{}");
    }

    #[test]
    fn test_raw_markup_is_complete_element() {
        let markup = r#"<p><svg viewBox="0 0 24 24"><path d="M1 1"/></svg></p>"#;
        let icons = extract_icons(markup);
        assert!(icons[0].raw_markup.starts_with("<svg"));
        assert!(icons[0].raw_markup.ends_with("</svg>"));
    }
}
