//! Builders for domain values commonly needed in tests: a minimal valid
//! class file, a couple of variants of it, and sample config/identity
//! values.

use std::path::PathBuf;
use std::time::Duration;

use crate::config::{HotswapConfig, ValidationVerbosity};
use crate::model::artifact::{ArtifactKind, ArtifactOrigin, ArtifactPath};
use crate::model::user::UserIdentity;

const CLASS_MAGIC: [u8; 4] = [0xCA, 0xFE, 0xBA, 0xBE];

/// Builds the smallest well-formed class file byte sequence the
/// validator's parser can index: magic, a trivial constant pool, no
/// interfaces, no fields, no methods, no attributes.
///
/// `field_count` and `method_count` let tests construct "add a field" /
/// "remove a method" variants without hand-assembling constant pool
/// entries for each one; every synthesized field/method reuses constant
/// pool entry 1 for both name and descriptor, which is enough for the
/// validator's structural comparisons even though it would not be valid
/// bytecode for an actual JVM to load.
pub fn minimal_class_bytes(field_count: u16, method_count: u16) -> Vec<u8> {
    let mut buf = Vec::new();
    buf.extend_from_slice(&CLASS_MAGIC);
    buf.extend_from_slice(&[0x00, 0x00]); // minor version
    buf.extend_from_slice(&[0x00, 0x3D]); // major version (Java 17)

    // Constant pool: one UTF8 entry ("x"), count field includes the
    // implicit zero slot so count = 2.
    buf.extend_from_slice(&2u16.to_be_bytes());
    buf.push(0x01); // CONSTANT_Utf8
    buf.extend_from_slice(&1u16.to_be_bytes());
    buf.push(b'x');

    buf.extend_from_slice(&0x0021u16.to_be_bytes()); // access_flags: ACC_PUBLIC | ACC_SUPER
    buf.extend_from_slice(&1u16.to_be_bytes()); // this_class
    buf.extend_from_slice(&0u16.to_be_bytes()); // super_class

    buf.extend_from_slice(&0u16.to_be_bytes()); // interfaces_count

    buf.extend_from_slice(&field_count.to_be_bytes());
    for i in 0..field_count {
        buf.extend_from_slice(&0u16.to_be_bytes()); // access_flags
        buf.extend_from_slice(&1u16.to_be_bytes()); // name_index (reused)
        buf.extend_from_slice(&1u16.to_be_bytes()); // descriptor_index
        buf.extend_from_slice(&(i).to_be_bytes()); // attributes_count (0 unless i==0)
    }

    buf.extend_from_slice(&method_count.to_be_bytes());
    for _ in 0..method_count {
        buf.extend_from_slice(&0u16.to_be_bytes());
        buf.extend_from_slice(&1u16.to_be_bytes());
        buf.extend_from_slice(&1u16.to_be_bytes());
        buf.extend_from_slice(&0u16.to_be_bytes()); // attributes_count
    }

    buf.extend_from_slice(&0u16.to_be_bytes()); // class attributes_count
    buf
}

pub fn sample_artifact_path(dotted_class_name: &str) -> ArtifactPath {
    let rel = dotted_class_name.replace('.', "/");
    ArtifactPath::new(
        PathBuf::from(format!("/repo/target/classes/{rel}.class")),
        ArtifactOrigin::MavenLike,
        dotted_class_name,
    )
}

pub fn sample_artifact_kind() -> ArtifactKind {
    ArtifactKind::TopLevelClass
}

pub fn sample_user_identity() -> UserIdentity {
    UserIdentity::Explicit {
        identifier: "test-user".to_string(),
    }
}

/// A config with the minimum fields set to pass validation, pointed at
/// a caller-supplied temp directory for `watch_paths` and
/// `event_log_root`.
pub fn test_config(root: &std::path::Path) -> HotswapConfig {
    HotswapConfig {
        watch_paths: vec![root.join("classes")],
        poll_interval: Duration::from_millis(10),
        settling_attempts: 2,
        settling_delay: Duration::from_millis(5),
        rollback_snapshot_retention_per_class: 3,
        instance_update_strict_mode: true,
        validation_session_verbosity: ValidationVerbosity::Detailed,
        event_log_root: root.join("events"),
        user_identity_override: Some("test-user".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_class_bytes_starts_with_magic() {
        let bytes = minimal_class_bytes(0, 0);
        assert_eq!(&bytes[0..4], &CLASS_MAGIC);
    }
}
