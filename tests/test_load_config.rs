use serial_test::serial;
use smolder::load_config::{load_config, resolve_config, OUTPUT_DIR_ENV};
use smolder::ClientConfig;
use std::env;
use std::fs::write;
use std::path::PathBuf;
use tempfile::NamedTempFile;

/// Keys present in the file win over defaults; the rest keep their default.
#[test]
#[serial]
fn test_load_config_merges_file_over_defaults() {
    env::remove_var(OUTPUT_DIR_ENV);
    let config_yaml = r#"
output_dir: ./tmp/mirror
max_depth: 2
concurrency: 8
filter: ".png"
retry_backoff_ms: 250
"#;
    let config_file = NamedTempFile::new().expect("temp file");
    write(config_file.path(), config_yaml).unwrap();

    let config = load_config(config_file.path()).expect("Config should load");

    assert_eq!(config.output_dir, PathBuf::from("./tmp/mirror"));
    assert_eq!(config.max_depth, 2);
    assert_eq!(config.concurrency, 8);
    assert_eq!(config.active_filter(), Some(".png"));
    assert_eq!(config.retries, 3);
    assert!(config.overwrite_output);
    assert_eq!(config.root_url, "https://raw.communitydragon.org");
}

/// An empty file is a valid config made entirely of defaults.
#[test]
#[serial]
fn test_load_config_accepts_empty_file() {
    env::remove_var(OUTPUT_DIR_ENV);
    let config_file = NamedTempFile::new().expect("temp file");

    let config = load_config(config_file.path()).expect("Config should load");
    assert_eq!(config, ClientConfig::default());
}

/// The output directory from the environment replaces the file's value.
#[test]
#[serial]
fn test_load_config_env_overrides_output_dir() {
    let config_file = NamedTempFile::new().expect("temp file");
    write(config_file.path(), "output_dir: ./from-file\n").unwrap();

    env::set_var(OUTPUT_DIR_ENV, "/tmp/from-env");
    let loaded = load_config(config_file.path());
    let resolved = resolve_config(None);
    env::remove_var(OUTPUT_DIR_ENV);

    assert_eq!(loaded.unwrap().output_dir, PathBuf::from("/tmp/from-env"));
    assert_eq!(resolved.unwrap().output_dir, PathBuf::from("/tmp/from-env"));
}

/// This test ensures that if the config file is not valid YAML, load_config errors and reports as such.
#[test]
#[serial]
fn test_load_config_errors_for_invalid_file() {
    let config_file = NamedTempFile::new().expect("temp file");
    write(config_file.path(), "concurrency: [not, a, number").unwrap();

    let err = load_config(config_file.path()).unwrap_err();
    assert!(
        err.to_string().contains("Failed to parse config YAML"),
        "unexpected error: {err}"
    );
}

#[test]
#[serial]
fn test_load_config_errors_for_missing_file() {
    let err = load_config("/definitely/not/here.yaml").unwrap_err();
    assert!(err.to_string().contains("Failed to read config file"));
}
