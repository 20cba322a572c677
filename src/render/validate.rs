//! Pre-Render Validation
//!
//! Cheap structural checks applied to component-kind artifacts before any
//! sandbox execution is attempted: non-empty source, an explicit
//! export/entry marker, and balanced brackets via a simple stack scan.
//! Validation failure short-circuits the render and is reported as a
//! `syntax` error carrying the offending byte position.

use crate::types::{RenderError, RenderErrorKind};

/// Validate component source ahead of execution
pub fn validate_component_source(source: &str) -> Result<(), RenderError> {
    if source.trim().is_empty() {
        return Err(RenderError::new(
            RenderErrorKind::Syntax,
            "component source is empty",
        ));
    }

    if !source.contains("export") {
        return Err(RenderError::new(
            RenderErrorKind::Syntax,
            "component source declares no export entry point",
        ));
    }

    scan_brackets(source)
}

/// Stack scan over `()[]{}`.
///
/// An unmatched closer is reported at its own position; a scan that ends
/// with openers still on the stack reports the earliest unclosed opener.
fn scan_brackets(source: &str) -> Result<(), RenderError> {
    let mut stack: Vec<(char, usize)> = Vec::new();

    for (pos, c) in source.char_indices() {
        match c {
            '(' | '[' | '{' => stack.push((c, pos)),
            ')' | ']' | '}' => {
                let expected = match c {
                    ')' => '(',
                    ']' => '[',
                    _ => '{',
                };
                match stack.pop() {
                    Some((open, _)) if open == expected => {}
                    _ => {
                        return Err(RenderError::new(
                            RenderErrorKind::Syntax,
                            format!("unmatched '{}'", c),
                        )
                        .at(pos));
                    }
                }
            }
            _ => {}
        }
    }

    if let Some(&(open, pos)) = stack.first() {
        return Err(
            RenderError::new(RenderErrorKind::Syntax, format!("unclosed '{}'", open)).at(pos),
        );
    }

    Ok(())
}
