//! Generation Request Types
//!
//! The immutable request record submitted by callers, plus the target-kind
//! discriminant that steers dispatch normalization, extraction, and
//! validation.

use serde::{Deserialize, Serialize};

/// What kind of artifact the caller wants generated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum TargetKind {
    /// A set of vector icons
    #[default]
    IconPack,
    /// A complete HTML/CSS/JS bundle
    UiBundle,
    /// A single component description with source
    Component,
}

impl std::fmt::Display for TargetKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::IconPack => write!(f, "icon-pack"),
            Self::UiBundle => write!(f, "ui-bundle"),
            Self::Component => write!(f, "component"),
        }
    }
}

impl TargetKind {
    /// Parse from the kebab-case wire form
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "icon-pack" => Some(Self::IconPack),
            "ui-bundle" => Some(Self::UiBundle),
            "component" => Some(Self::Component),
            _ => None,
        }
    }

    /// Opening document marker prepended during output normalization when a
    /// complete markup document is expected but the marker is missing.
    /// Only bundles are full documents; icon markup and component source
    /// are fragments.
    pub fn document_marker(&self) -> Option<&'static str> {
        match self {
            Self::UiBundle => Some("<!DOCTYPE html>"),
            Self::IconPack | Self::Component => None,
        }
    }

    /// Entry-point marker the generated output must declare to pass
    /// validation
    pub fn entry_marker(&self) -> &'static str {
        match self {
            Self::IconPack => "<svg",
            Self::UiBundle => "<html",
            Self::Component => "export",
        }
    }

    /// Top-level keywords the structural quality heuristic expects
    pub fn expected_keywords(&self) -> &'static [&'static str] {
        match self {
            Self::IconPack => &["<svg", "</svg>"],
            Self::UiBundle => &["<html", "</html>"],
            Self::Component => &["export", "return"],
        }
    }
}

/// A free-text generation request. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// Free-text description of what to generate
    pub description: String,
    /// Target artifact kind
    pub kind: TargetKind,
    /// Opaque style hint forwarded into prompt templates
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style_hint: Option<String>,
    /// Opaque color hint forwarded into prompt templates
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color_hint: Option<String>,
    /// Whether the analysis step may pause for user input on vague requests
    #[serde(default)]
    pub analyze: bool,
}

impl GenerationRequest {
    pub fn new(description: impl Into<String>, kind: TargetKind) -> Self {
        Self {
            description: description.into(),
            kind,
            style_hint: None,
            color_hint: None,
            analyze: false,
        }
    }

    pub fn with_style(mut self, style: impl Into<String>) -> Self {
        self.style_hint = Some(style.into());
        self
    }

    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color_hint = Some(color.into());
        self
    }

    pub fn with_analysis(mut self) -> Self {
        self.analyze = true;
        self
    }
}

/// Per-submission options that shape the pipeline, distinct from the
/// request content itself
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenerationOptions {
    /// Append the variant-generation step to the pipeline
    #[serde(default)]
    pub include_variants: bool,
}
