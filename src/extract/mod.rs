//! Output Artifact Extractor
//!
//! Turns raw generated markup into typed artifacts. Pure and
//! deterministic: identical input always yields identical output, no
//! network, no randomness.

mod bundle;
mod component;
mod icons;
mod markup;

pub use bundle::extract_bundle;
pub use component::extract_component;
pub use icons::{extract_icons, extract_stylesheet};
pub use markup::{AncestorInfo, CapturedElement, capture_elements};

use crate::types::{Artifact, TargetKind};

/// Extract typed artifacts from raw markup for the given target kind.
///
/// Icon packs yield one artifact per vector element plus a stylesheet
/// side artifact when embedded styles exist; bundles yield a single
/// bundle artifact with nested icons; components yield a single component
/// description.
pub fn extract(raw_markup: &str, kind: TargetKind) -> Vec<Artifact> {
    match kind {
        TargetKind::IconPack => {
            let mut artifacts: Vec<Artifact> = extract_icons(raw_markup)
                .into_iter()
                .map(Artifact::Icon)
                .collect();
            let css = extract_stylesheet(raw_markup);
            if !css.is_empty() {
                artifacts.push(Artifact::Stylesheet { css });
            }
            artifacts
        }
        TargetKind::UiBundle => vec![Artifact::Bundle(extract_bundle(raw_markup))],
        TargetKind::Component => vec![Artifact::Component(extract_component(raw_markup))],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::IconCategory;
    use proptest::prelude::*;

    #[test]
    fn test_icon_pack_with_styles_has_side_artifact() {
        let markup = "<style>.icon{fill:none}</style><svg></svg>";
        let artifacts = extract(markup, TargetKind::IconPack);
        assert_eq!(artifacts.len(), 2);
        assert!(matches!(artifacts[0], Artifact::Icon(_)));
        assert!(matches!(artifacts[1], Artifact::Stylesheet { .. }));
    }

    #[test]
    fn test_icon_count_matches_svg_count() {
        for n in 0..8 {
            let markup = "<svg></svg>".repeat(n);
            let icons: Vec<_> = extract(&markup, TargetKind::IconPack)
                .into_iter()
                .filter(|a| matches!(a, Artifact::Icon(_)))
                .collect();
            assert_eq!(icons.len(), n);
        }
    }

    #[test]
    fn test_icon_ids_unique() {
        let markup = "<svg></svg>".repeat(6);
        let ids: Vec<String> = extract(&markup, TargetKind::IconPack)
            .into_iter()
            .filter_map(|a| match a {
                Artifact::Icon(icon) => Some(icon.id),
                _ => None,
            })
            .collect();
        let mut deduped = ids.clone();
        deduped.sort();
        deduped.dedup();
        assert_eq!(deduped.len(), ids.len());
    }

    #[test]
    fn test_navigation_icon_scenario() {
        // "set of 5 navigation icons" against markup with 5 bare svgs
        let markup = "<div><svg></svg><svg></svg><svg></svg><svg></svg><svg></svg></div>";
        let artifacts = extract(markup, TargetKind::IconPack);
        let icons: Vec<_> = artifacts
            .iter()
            .filter_map(|a| match a {
                Artifact::Icon(icon) => Some(icon),
                _ => None,
            })
            .collect();
        assert_eq!(icons.len(), 5);
        let names: Vec<&str> = icons.iter().map(|i| i.semantic_name.as_str()).collect();
        assert_eq!(names, vec!["home", "user", "settings", "search", "menu"]);
        assert!(icons.iter().all(|i| i.category == IconCategory::General));
    }

    #[test]
    fn test_bundle_kind_yields_single_bundle() {
        let artifacts = extract("<html><body></body></html>", TargetKind::UiBundle);
        assert_eq!(artifacts.len(), 1);
        assert!(matches!(artifacts[0], Artifact::Bundle(_)));
    }

    #[test]
    fn test_component_kind_yields_single_component() {
        let artifacts = extract(
            "export default function X({ a }) { return null; }",
            TargetKind::Component,
        );
        assert_eq!(artifacts.len(), 1);
        assert!(matches!(artifacts[0], Artifact::Component(_)));
    }

    proptest! {
        /// extract is pure: two calls with identical arguments yield
        /// structurally identical artifact lists
        #[test]
        fn prop_extract_is_pure(input in ".{0,400}") {
            for kind in [TargetKind::IconPack, TargetKind::UiBundle, TargetKind::Component] {
                let first = extract(&input, kind);
                let second = extract(&input, kind);
                prop_assert_eq!(first, second);
            }
        }

        /// N generated svg elements always produce exactly N icons with
        /// unique ids
        #[test]
        fn prop_icon_count_and_unique_ids(n in 0usize..12) {
            let markup = "<span><svg viewBox=\"0 0 24 24\"></svg></span>".repeat(n);
            let icons: Vec<_> = extract(&markup, TargetKind::IconPack)
                .into_iter()
                .filter_map(|a| match a {
                    Artifact::Icon(icon) => Some(icon),
                    _ => None,
                })
                .collect();
            prop_assert_eq!(icons.len(), n);
            let mut ids: Vec<String> = icons.iter().map(|i| i.id.clone()).collect();
            ids.sort();
            ids.dedup();
            prop_assert_eq!(ids.len(), n);
        }
    }
}
