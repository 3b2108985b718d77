//! Unit tests for configuration and root folder resolution
//!
//! Tests that manipulate SLB_ROOT_FOLDER are marked with #[serial] so they
//! run sequentially, not in parallel.

use serial_test::serial;
use slb_common::config::{
    load_config, RootFolderInitializer, RootFolderResolver, ROOT_FOLDER_ENV,
};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

#[test]
#[serial]
fn test_cli_arg_wins_over_env() {
    env::set_var(ROOT_FOLDER_ENV, "/tmp/slb-from-env");

    let resolver =
        RootFolderResolver::new("test-module").with_cli_arg(Some(PathBuf::from("/tmp/slb-from-cli")));
    assert_eq!(resolver.resolve(), PathBuf::from("/tmp/slb-from-cli"));

    env::remove_var(ROOT_FOLDER_ENV);
}

#[test]
#[serial]
fn test_env_var_used_without_cli_arg() {
    env::set_var(ROOT_FOLDER_ENV, "/tmp/slb-from-env");

    let resolver = RootFolderResolver::new("test-module");
    assert_eq!(resolver.resolve(), PathBuf::from("/tmp/slb-from-env"));

    env::remove_var(ROOT_FOLDER_ENV);
}

#[test]
#[serial]
fn test_blank_env_var_is_ignored() {
    env::set_var(ROOT_FOLDER_ENV, "   ");

    let resolver = RootFolderResolver::new("test-module");
    let root = resolver.resolve();
    assert_ne!(root, PathBuf::from("   "));
    assert!(!root.as_os_str().is_empty());

    env::remove_var(ROOT_FOLDER_ENV);
}

#[test]
fn test_initializer_creates_layout() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("nested").join("root");

    let initializer = RootFolderInitializer::new(root.clone());
    initializer.ensure_directory_exists().unwrap();

    assert!(root.is_dir());
    assert!(initializer.attachments_path().is_dir());
    assert_eq!(initializer.root_folder(), root.as_path());
}

#[test]
fn test_load_config_from_root_folder() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("slb.toml"),
        r#"
        [handshake]
        known_dwell_ms = 2000
        ack_poll_ms = 250
        enrollment_timeout_secs = 300

        [web]
        bind = "127.0.0.1:8080"
        "#,
    )
    .unwrap();

    let config = load_config(dir.path());
    assert_eq!(config.handshake.known_dwell(), Duration::from_secs(2));
    assert_eq!(config.handshake.ack_poll(), Duration::from_millis(250));
    assert_eq!(config.handshake.enrollment_timeout(), Some(Duration::from_secs(300)));
    assert_eq!(config.handshake.idle_poll_ms, 100);
    assert_eq!(config.web.bind, "127.0.0.1:8080");
}

#[test]
fn test_malformed_root_config_is_not_fatal() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("slb.toml"), "[handshake\nknown_dwell_ms = ").unwrap();

    // Falls through to the user config or defaults; must not panic
    let config = load_config(dir.path());
    assert_ne!(config.handshake.known_dwell_ms, 0);
    assert!(!config.web.bind.is_empty());
}
