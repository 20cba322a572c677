//! Output Normalization
//!
//! Accumulated generation text often arrives wrapped in presentation
//! fencing, and bundle output sometimes omits its document preamble. This
//! is a normalization step, not validation: malformed content passes
//! through untouched, because the extractor performs real validation.

use crate::types::TargetKind;

/// Clean accumulated text for the given target kind
pub fn normalize_output(raw: &str, kind: TargetKind) -> String {
    let text = strip_code_fences(raw);

    if let Some(marker) = kind.document_marker()
        && !has_document_marker(&text, marker)
    {
        return format!("{}\n{}", marker, text);
    }

    text.to_string()
}

/// Strip a surrounding code fence, including a language tag on the opening
/// fence. Inner fences are left alone.
fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();

    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };

    // Drop the rest of the opening fence line (```html, ```svg, ...)
    let body = match rest.find('\n') {
        Some(idx) => &rest[idx + 1..],
        None => return trimmed,
    };

    let body = body.strip_suffix("```").unwrap_or(body);
    body.trim()
}

fn has_document_marker(text: &str, _marker: &str) -> bool {
    let head: String = text.trim_start().chars().take(16).collect::<String>().to_lowercase();
    head.starts_with("<!doctype") || head.starts_with("<html")
}
