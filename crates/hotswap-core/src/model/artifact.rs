//! Filesystem artifacts the watcher observes and classifies.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Absolute path to a compiled class artifact, plus the bits of structure
/// the classifier derived from it. Constructing one does not touch the
/// filesystem; `ArtifactPath::classify` is what does that work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactPath {
    pub path: PathBuf,
    pub origin: ArtifactOrigin,
    pub dotted_class_name: String,
}

impl ArtifactPath {
    pub fn new(path: impl Into<PathBuf>, origin: ArtifactOrigin, dotted_class_name: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            origin,
            dotted_class_name: dotted_class_name.into(),
        }
    }

    pub fn file_stem(&self) -> Option<&str> {
        self.path.file_stem().and_then(|s| s.to_str())
    }

    pub fn as_path(&self) -> &Path {
        &self.path
    }
}

/// The toolchain that produced an artifact's output root, inferred from
/// which conventional source/output marker directory the path sits under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArtifactOrigin {
    MavenLike,
    GradleLike,
    IntelliJLike,
    EclipseLike,
    Unknown,
}

impl ArtifactOrigin {
    /// Classifies an origin from a path by checking for the fixed set of
    /// conventional output-root markers, closest match wins (first marker
    /// found walking from the file toward the root).
    pub fn from_path(path: &Path) -> Self {
        let s = path.to_string_lossy();
        if s.contains("target/classes") {
            Self::MavenLike
        } else if s.contains("build/classes") {
            Self::GradleLike
        } else if s.contains("out/production") {
            Self::IntelliJLike
        } else if s.contains("/bin/") || s.ends_with("/bin") {
            Self::EclipseLike
        } else {
            Self::Unknown
        }
    }
}

/// Whether a changed file is itself a candidate hot-swap artifact, a
/// nested/inner-class artifact, or something the watcher should ignore.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArtifactKind {
    TopLevelClass,
    InnerClass,
    NotAnArtifact,
}

/// The filesystem transition that produced an [`ArtifactEvent`]. Carries
/// the observed size for `Created`/`Modified`; `Deleted` never has one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArtifactChange {
    Created { size: u64 },
    Modified { size: u64 },
    Deleted,
}

impl ArtifactChange {
    pub fn size(&self) -> Option<u64> {
        match self {
            Self::Created { size } | Self::Modified { size } => Some(*size),
            Self::Deleted => None,
        }
    }
}

/// Emitted by the filesystem watcher for one observable transition on a
/// candidate artifact, after write-settling (for `Created`) has run.
/// `bytes` is empty for `Deleted`, which carries no content to validate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactEvent {
    pub id: Uuid,
    pub artifact: ArtifactPath,
    pub kind: ArtifactKind,
    pub change: ArtifactChange,
    pub bytes: Vec<u8>,
    pub detected_at: chrono::DateTime<chrono::Utc>,
    pub correlation_id: Uuid,
}

impl ArtifactEvent {
    pub fn new(artifact: ArtifactPath, kind: ArtifactKind, change: ArtifactChange, bytes: Vec<u8>) -> Self {
        Self {
            id: Uuid::new_v4(),
            artifact,
            kind,
            change,
            bytes,
            detected_at: chrono::Utc::now(),
            correlation_id: Uuid::new_v4(),
        }
    }

    pub fn is_deleted(&self) -> bool {
        matches!(self.change, ArtifactChange::Deleted)
    }
}

/// Top-level stream the watcher emits on: either a settled, classified
/// artifact change, or a signal that the underlying OS notification
/// queue overflowed before `notify` could drain it. An overflow must
/// never be dropped silently: downstream code treats it as a prompt to
/// fall back to a full rescan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WatchEvent {
    Artifact(ArtifactEvent),
    OverflowDetected { at: chrono::DateTime<chrono::Utc> },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn origin_from_path_prefers_known_markers() {
        assert_eq!(
            ArtifactOrigin::from_path(Path::new("/repo/target/classes/com/acme/Foo.class")),
            ArtifactOrigin::MavenLike
        );
        assert_eq!(
            ArtifactOrigin::from_path(Path::new("/repo/build/classes/java/main/Foo.class")),
            ArtifactOrigin::GradleLike
        );
        assert_eq!(
            ArtifactOrigin::from_path(Path::new("/repo/out/production/classes/Foo.class")),
            ArtifactOrigin::IntelliJLike
        );
        assert_eq!(
            ArtifactOrigin::from_path(Path::new("/repo/somewhere/Foo.class")),
            ArtifactOrigin::Unknown
        );
    }
}
