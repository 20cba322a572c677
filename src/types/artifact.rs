//! Artifact Types
//!
//! Typed, structured results of generation. Produced by the extractor from
//! raw markup; immutable; owned by whichever caller requested generation.

use serde::{Deserialize, Serialize};

/// Category inferred for an icon by walking its ancestor containers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum IconCategory {
    Navigation,
    Form,
    Social,
    Button,
    #[default]
    General,
}

impl std::fmt::Display for IconCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Navigation => write!(f, "navigation"),
            Self::Form => write!(f, "form"),
            Self::Social => write!(f, "social"),
            Self::Button => write!(f, "button"),
            Self::General => write!(f, "general"),
        }
    }
}

/// One extracted vector icon
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IconArtifact {
    /// Stable index-based id (`icon-0`, `icon-1`, ...)
    pub id: String,
    /// Name derived from markup attributes, enclosing text, class
    /// fragments, or the positional fallback list
    pub semantic_name: String,
    /// The complete `<svg>...</svg>` markup
    pub raw_markup: String,
    /// Max of the declared viewable-area width/height (default 24)
    pub bounding_size: u32,
    pub category: IconCategory,
}

/// A complete HTML/CSS/JS bundle with nested icon extraction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BundleArtifact {
    /// Markup with embedded stylesheet/script elements removed
    pub html: String,
    /// Embedded stylesheet text, concatenated in document order
    pub css: String,
    /// Embedded script text, concatenated in document order
    pub js: String,
    /// Icons found in the same markup
    pub icons: Vec<IconArtifact>,
}

/// A single component description
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentArtifact {
    pub name: String,
    /// Loose schema of the component's props, keyed by prop name
    pub props_schema: serde_json::Value,
    pub source_code: String,
    /// External modules the source imports
    pub dependencies: Vec<String>,
}

/// Discriminated union over everything the extractor can produce
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Artifact {
    Icon(IconArtifact),
    Bundle(BundleArtifact),
    Component(ComponentArtifact),
    /// Embedded stylesheet text collected alongside an icon pack
    Stylesheet { css: String },
}

impl Artifact {
    /// Short label for logs and CLI output
    pub fn label(&self) -> &'static str {
        match self {
            Self::Icon(_) => "icon",
            Self::Bundle(_) => "bundle",
            Self::Component(_) => "component",
            Self::Stylesheet { .. } => "stylesheet",
        }
    }

    /// Rough payload size in bytes, used for render-result reporting
    pub fn estimated_size(&self) -> usize {
        match self {
            Self::Icon(icon) => icon.raw_markup.len(),
            Self::Bundle(bundle) => bundle.html.len() + bundle.css.len() + bundle.js.len(),
            Self::Component(component) => component.source_code.len(),
            Self::Stylesheet { css } => css.len(),
        }
    }
}
