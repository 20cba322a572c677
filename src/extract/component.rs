//! Component Description Extraction
//!
//! Derives a component name, a loose props schema, and an import list from
//! generated component source. The source itself passes through unchanged;
//! pre-render validation is the render scheduler's concern.

use regex::Regex;
use std::sync::OnceLock;

use crate::types::ComponentArtifact;

fn name_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?:export\s+default\s+function\s+([A-Za-z_][A-Za-z0-9_]*))|(?:function\s+([A-Z][A-Za-z0-9_]*))|(?:(?:const|let)\s+([A-Z][A-Za-z0-9_]*)\s*=)",
        )
        .expect("name regex")
    })
}

fn props_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\(\s*\{([^}]*)\}").expect("props regex"))
}

fn import_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?:import\s+[^;]*?from\s+['"]([^'"]+)['"])|(?:require\(\s*['"]([^'"]+)['"]\s*\))"#)
            .expect("import regex")
    })
}

/// Extract a component description from generated source
pub fn extract_component(source: &str) -> ComponentArtifact {
    ComponentArtifact {
        name: component_name(source),
        props_schema: props_schema(source),
        source_code: source.to_string(),
        dependencies: dependencies(source),
    }
}

fn component_name(source: &str) -> String {
    name_re()
        .captures(source)
        .and_then(|cap| {
            cap.get(1)
                .or_else(|| cap.get(2))
                .or_else(|| cap.get(3))
                .map(|m| m.as_str().to_string())
        })
        .unwrap_or_else(|| "Component".to_string())
}

/// Loose schema from the first destructured-props parameter list: every
/// prop maps to "any" since generated source carries no type information
fn props_schema(source: &str) -> serde_json::Value {
    let Some(cap) = props_re().captures(source) else {
        return serde_json::Value::Object(serde_json::Map::new());
    };

    let mut schema = serde_json::Map::new();
    for entry in cap[1].split(',') {
        // Strip defaults (`size = 24`) and renames (`icon: glyph`)
        let name = entry
            .split(['=', ':'])
            .next()
            .unwrap_or("")
            .trim()
            .trim_start_matches("...");
        if !name.is_empty() && name.chars().all(|c| c.is_alphanumeric() || c == '_') {
            schema.insert(name.to_string(), serde_json::Value::String("any".into()));
        }
    }
    serde_json::Value::Object(schema)
}

fn dependencies(source: &str) -> Vec<String> {
    let mut deps: Vec<String> = import_re()
        .captures_iter(source)
        .filter_map(|cap| cap.get(1).or_else(|| cap.get(2)))
        .map(|m| m.as_str().to_string())
        .collect();
    deps.dedup();
    deps
}

#[cfg(test)]
mod tests {
    use super::*;

    const SOURCE: &str = r#"
import React from 'react';
import { colors } from './theme';

export default function BadgeCard({ title, count = 0, onPress }) {
  return <div className="badge">{title}: {count}</div>;
}
"#;

    #[test]
    fn test_name_from_export_default() {
        let component = extract_component(SOURCE);
        assert_eq!(component.name, "BadgeCard");
    }

    #[test]
    fn test_name_fallbacks() {
        assert_eq!(
            extract_component("const StatTile = () => null;").name,
            "StatTile"
        );
        assert_eq!(extract_component("let x = 1;").name, "Component");
    }

    #[test]
    fn test_props_schema_keys() {
        let component = extract_component(SOURCE);
        let schema = component.props_schema.as_object().expect("object");
        let mut keys: Vec<&String> = schema.keys().collect();
        keys.sort();
        assert_eq!(keys, vec!["count", "onPress", "title"]);
    }

    #[test]
    fn test_dependencies_collected() {
        let component = extract_component(SOURCE);
        assert_eq!(component.dependencies, vec!["react", "./theme"]);
    }

    #[test]
    fn test_source_passes_through_unchanged() {
        let component = extract_component(SOURCE);
        assert_eq!(component.source_code, SOURCE);
    }

    #[test]
    fn test_no_props_yields_empty_schema() {
        let component = extract_component("export default function Spinner() { return null; }");
        assert_eq!(
            component.props_schema,
            serde_json::Value::Object(serde_json::Map::new())
        );
    }
}
