//! Bundle Separation
//!
//! Splits generated markup into independent stylesheet, script, and markup
//! artifacts, with icon extraction nested over the same input.

use super::icons::extract_icons;
use super::markup::capture_elements;
use crate::types::BundleArtifact;

/// Separate embedded stylesheet text, embedded script text, and the
/// remaining markup. Each part stands alone; icons found in the markup are
/// attached as a nested list.
pub fn extract_bundle(markup: &str) -> BundleArtifact {
    let embedded = capture_elements(markup, &["style", "script"]);

    let css = embedded
        .iter()
        .filter(|e| e.tag == "style")
        .map(|e| e.inner.trim())
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("\n");

    let js = embedded
        .iter()
        .filter(|e| e.tag == "script")
        .map(|e| e.inner.trim())
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("\n");

    // Splice embedded elements out of the markup, back to front so spans
    // stay valid
    let mut html = markup.to_string();
    let mut spans: Vec<(usize, usize)> = embedded.iter().map(|e| e.span).collect();
    spans.sort_by_key(|s| std::cmp::Reverse(s.0));
    for (start, end) in spans {
        html.replace_range(start..end, "");
    }

    BundleArtifact {
        html: html.trim().to_string(),
        css,
        js,
        icons: extract_icons(markup),
    }
}
