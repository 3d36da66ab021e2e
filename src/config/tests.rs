//! Tests for config functionality.

use crate::config::{LockConfig, SnapshotPlacement};
use std::path::{Path, PathBuf};

#[test]
fn test_default_config() {
    let config = LockConfig::default();

    assert_eq!(config.snapshot_separator, "-");
    assert_eq!(config.snapshot_extension, None);
    assert_eq!(config.sanitize_snapshot_names, cfg!(windows));
    assert_eq!(config.max_snapshot_name_attempts, 16);
    assert_eq!(config.snapshot_placement, SnapshotPlacement::Alongside);
    assert!(config.snapshot_dir.is_none());
    assert!(config.remove_snapshots_on_reset);
    assert!(config.validate().is_ok());
}

#[test]
fn test_parse_minimal_yaml() {
    let config = LockConfig::from_yaml("").unwrap();
    assert_eq!(config, LockConfig::default());
}

#[test]
fn test_parse_full_yaml() {
    let yaml = r#"
snapshot_separator: "~"
snapshot_extension: snap
sanitize_snapshot_names: true
max_snapshot_name_attempts: 4
snapshot_placement: directory
snapshot_dir: /var/tmp/vigil
remove_snapshots_on_reset: false
"#;
    let config = LockConfig::from_yaml(yaml).unwrap();

    assert_eq!(config.snapshot_separator, "~");
    assert_eq!(config.snapshot_extension.as_deref(), Some("snap"));
    assert!(config.sanitize_snapshot_names);
    assert_eq!(config.max_snapshot_name_attempts, 4);
    assert_eq!(config.snapshot_placement, SnapshotPlacement::Directory);
    assert_eq!(config.snapshot_dir, Some(PathBuf::from("/var/tmp/vigil")));
    assert!(!config.remove_snapshots_on_reset);
}

#[test]
fn test_unknown_fields_are_ignored() {
    let config = LockConfig::from_yaml("future_option: 42\nsnapshot_separator: _\n").unwrap();
    assert_eq!(config.snapshot_separator, "_");
}

#[test]
fn test_yaml_roundtrip_preserves_values() {
    let mut config = LockConfig::default();
    config.snapshot_extension = Some("tmp".to_string());
    config.max_snapshot_name_attempts = 3;

    let yaml = config.to_yaml().unwrap();
    let parsed = LockConfig::from_yaml(&yaml).unwrap();
    assert_eq!(parsed, config);
}

#[test]
fn test_validation_rejects_empty_separator() {
    let err = LockConfig::from_yaml("snapshot_separator: \"\"").unwrap_err();
    assert!(err.to_string().contains("snapshot_separator"));
}

#[test]
fn test_validation_rejects_path_separator_in_separator() {
    let err = LockConfig::from_yaml("snapshot_separator: \"/\"").unwrap_err();
    assert!(err.to_string().contains("path separators"));
}

#[test]
fn test_validation_rejects_leading_dot_extension() {
    let err = LockConfig::from_yaml("snapshot_extension: .tmp").unwrap_err();
    let msg = err.to_string();
    assert!(msg.contains("leading dot"));
    assert!(msg.contains("'tmp'"));
}

#[test]
fn test_validation_rejects_zero_attempts() {
    let err = LockConfig::from_yaml("max_snapshot_name_attempts: 0").unwrap_err();
    assert!(err.to_string().contains("max_snapshot_name_attempts"));
}

#[test]
fn test_validation_requires_dir_for_directory_placement() {
    let err = LockConfig::from_yaml("snapshot_placement: directory").unwrap_err();
    assert!(err.to_string().contains("snapshot_dir"));
}

#[test]
fn test_invalid_yaml_is_reported() {
    let err = LockConfig::from_yaml("snapshot_separator: [unclosed").unwrap_err();
    assert!(err.to_string().contains("failed to parse config YAML"));
}

#[test]
fn test_load_from_file() {
    let temp_dir = tempfile::TempDir::new().unwrap();
    let path = temp_dir.path().join("locks.yaml");
    std::fs::write(&path, "snapshot_extension: copy\n").unwrap();

    let config = LockConfig::load(&path).unwrap();
    assert_eq!(config.snapshot_extension.as_deref(), Some("copy"));

    let err = LockConfig::load(temp_dir.path().join("missing.yaml")).unwrap_err();
    assert!(err.to_string().contains("failed to read config file"));
}

#[test]
fn test_snapshot_file_names() {
    let config = LockConfig {
        sanitize_snapshot_names: false,
        ..LockConfig::default()
    };
    assert_eq!(config.snapshot_prefix("issue.xml"), "issue.xml-");
    assert_eq!(config.snapshot_file_name("issue.xml", 3, 0), "issue.xml-3");
    assert_eq!(config.snapshot_file_name("issue.xml", 3, 2), "issue.xml-3-2");

    let config = LockConfig {
        sanitize_snapshot_names: true,
        snapshot_extension: Some("tmp".to_string()),
        ..LockConfig::default()
    };
    assert_eq!(config.snapshot_file_name("issue.xml", 1, 0), "issue_xml-1.tmp");
}

#[test]
fn test_snapshot_parent() {
    let config = LockConfig::default();
    assert_eq!(
        config.snapshot_parent(Path::new("/data/issue.xml")),
        Some(PathBuf::from("/data"))
    );

    let config = LockConfig {
        snapshot_placement: SnapshotPlacement::Directory,
        snapshot_dir: Some(PathBuf::from("/scratch")),
        ..LockConfig::default()
    };
    assert_eq!(
        config.snapshot_parent(Path::new("/data/issue.xml")),
        Some(PathBuf::from("/scratch"))
    );
}

#[test]
fn test_placement_from_str() {
    assert_eq!(
        SnapshotPlacement::from_str("alongside"),
        Some(SnapshotPlacement::Alongside)
    );
    assert_eq!(
        SnapshotPlacement::from_str("directory"),
        Some(SnapshotPlacement::Directory)
    );
    assert_eq!(SnapshotPlacement::from_str("elsewhere"), None);
}
