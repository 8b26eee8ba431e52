//! Classifies a changed file path as a top-level class artifact, an
//! inner-class artifact, or not an artifact at all.

use std::path::Path;

use hotswap_core::model::artifact::{ArtifactKind, ArtifactOrigin, ArtifactPath};
use regex::Regex;

const SOURCE_ROOT_MARKERS: &[&str] = &[
    "src/main/java",
    "src/test/java",
    "src/main/kotlin",
    "build/classes",
    "target/classes",
    "out/production",
    "bin",
];

/// Policy for whether synthetic/anonymous inner classes (`Outer$1`,
/// `Outer$Lambda$7`, ...) are surfaced as hot-swap candidates at all, or
/// only named inner classes (`Outer$Inner`) are. Left as configuration
/// per the open design question this resolves: there is no universally
/// correct default.
#[derive(Debug, Clone)]
pub struct ClassifierPolicy {
    pub classify_synthetic_inner_classes: bool,
    pub synthetic_inner_class_pattern: Regex,
}

impl Default for ClassifierPolicy {
    fn default() -> Self {
        Self {
            classify_synthetic_inner_classes: false,
            synthetic_inner_class_pattern: Regex::new(r"\$\d+(\$.*)?$").expect("valid regex"),
        }
    }
}

/// Result of classifying a single changed path: `None` when the path
/// should be ignored outright (not a `.class` file, or under no
/// recognized output root).
pub fn classify(path: &Path, policy: &ClassifierPolicy) -> Option<(ArtifactPath, ArtifactKind)> {
    if path.extension().and_then(|e| e.to_str()) != Some("class") {
        return None;
    }

    let file_name = path.file_name()?.to_str()?;
    if file_name.starts_with('.') {
        // Editor/toolchain temp artifacts (`.Widget.class.swp`-style
        // hidden files that still happen to end in `.class`).
        return None;
    }

    let path_str = path.to_string_lossy();
    if !SOURCE_ROOT_MARKERS.iter().any(|m| path_str.contains(m)) {
        return None;
    }

    let origin = ArtifactOrigin::from_path(path);
    let stem = path.file_stem()?.to_str()?;
    if !stem
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
    {
        // Not a conservative Java identifier (possibly `$`-qualified for
        // inner classes); refuse to guess at what produced it.
        return None;
    }
    let package = package_from_path(path);
    let dotted = if package.is_empty() {
        stem.to_string()
    } else {
        format!("{package}.{stem}")
    };

    let kind = if !stem.contains('$') {
        ArtifactKind::TopLevelClass
    } else if policy.synthetic_inner_class_pattern.is_match(stem)
        && !policy.classify_synthetic_inner_classes
    {
        ArtifactKind::NotAnArtifact
    } else {
        ArtifactKind::InnerClass
    };

    Some((ArtifactPath::new(path, origin, dotted), kind))
}

/// Derives the dotted package name from everything between the
/// recognized output-root marker and the file's own directory.
fn package_from_path(path: &Path) -> String {
    let path_str = path.to_string_lossy();
    for marker in SOURCE_ROOT_MARKERS {
        if let Some(idx) = path_str.find(marker) {
            let after_marker = &path_str[idx + marker.len()..];
            let trimmed = after_marker.trim_start_matches(['/', '\\']);
            let dir = Path::new(trimmed).parent().unwrap_or_else(|| Path::new(""));
            let package = dir
                .components()
                .filter_map(|c| c.as_os_str().to_str())
                .collect::<Vec<_>>()
                .join(".");
            return package;
        }
    }
    String::new()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_top_level_class_under_maven_output() {
        let policy = ClassifierPolicy::default();
        let (artifact, kind) = classify(
            Path::new("/repo/target/classes/com/acme/Widget.class"),
            &policy,
        )
        .unwrap();
        assert_eq!(kind, ArtifactKind::TopLevelClass);
        assert_eq!(artifact.dotted_class_name, "com.acme.Widget");
    }

    #[test]
    fn ignores_non_class_files() {
        let policy = ClassifierPolicy::default();
        assert!(classify(Path::new("/repo/target/classes/readme.txt"), &policy).is_none());
    }

    #[test]
    fn ignores_paths_outside_known_roots() {
        let policy = ClassifierPolicy::default();
        assert!(classify(Path::new("/tmp/scratch/Widget.class"), &policy).is_none());
    }

    #[test]
    fn synthetic_inner_classes_are_dropped_by_default() {
        let policy = ClassifierPolicy::default();
        let (_, kind) = classify(
            Path::new("/repo/target/classes/com/acme/Widget$1.class"),
            &policy,
        )
        .unwrap();
        assert_eq!(kind, ArtifactKind::NotAnArtifact);
    }

    #[test]
    fn named_inner_classes_are_classified_as_inner() {
        let policy = ClassifierPolicy::default();
        let (_, kind) = classify(
            Path::new("/repo/target/classes/com/acme/Widget$Builder.class"),
            &policy,
        )
        .unwrap();
        assert_eq!(kind, ArtifactKind::InnerClass);
    }

    #[test]
    fn policy_can_opt_in_to_synthetic_inner_classes() {
        let mut policy = ClassifierPolicy::default();
        policy.classify_synthetic_inner_classes = true;
        let (_, kind) = classify(
            Path::new("/repo/target/classes/com/acme/Widget$1.class"),
            &policy,
        )
        .unwrap();
        assert_eq!(kind, ArtifactKind::InnerClass);
    }
}
