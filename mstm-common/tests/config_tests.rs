//! Tests for configuration file discovery and loading
//!
//! Note: tests that set or clear `MSTM_TEST_CONFIG` are marked `#[serial]` so
//! they never race each other on the process environment.

use mstm_common::config::{load_toml, load_toml_or_default, resolve_config_file};
use mstm_common::Error;
use serde::Deserialize;
use serial_test::serial;
use std::env;
use std::fs;
use std::path::Path;

const ENV_VAR: &str = "MSTM_TEST_CONFIG";

#[derive(Debug, Default, Deserialize, PartialEq)]
#[serde(default)]
struct SampleConfig {
    port: u16,
    name: String,
}

#[test]
#[serial]
fn test_env_var_used_when_no_cli_arg() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("streaming.toml");
    fs::write(&path, "port = 1").unwrap();

    env::set_var(ENV_VAR, &path);
    let resolved = resolve_config_file(None, ENV_VAR, "streaming.toml");
    env::remove_var(ENV_VAR);

    assert_eq!(resolved.as_deref(), Some(path.as_path()));
}

#[test]
#[serial]
fn test_cli_arg_beats_env_var() {
    env::set_var(ENV_VAR, "/from/env.toml");
    let resolved = resolve_config_file(
        Some(Path::new("/from/cli.toml")),
        ENV_VAR,
        "streaming.toml",
    );
    env::remove_var(ENV_VAR);

    assert_eq!(resolved.as_deref(), Some(Path::new("/from/cli.toml")));
}

#[test]
#[serial]
fn test_empty_env_var_ignored() {
    env::set_var(ENV_VAR, "");
    let resolved = resolve_config_file(None, ENV_VAR, "mstm-test-no-such-file.toml");
    env::remove_var(ENV_VAR);

    assert!(resolved.is_none());
}

#[test]
fn test_load_toml_parses_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sample.toml");
    fs::write(&path, "port = 8080\nname = \"stream\"\n").unwrap();

    let config: SampleConfig = load_toml(&path).unwrap();
    assert_eq!(
        config,
        SampleConfig {
            port: 8080,
            name: "stream".to_string()
        }
    );
}

#[test]
fn test_load_toml_missing_file() {
    let result = load_toml::<SampleConfig>(Path::new("/nonexistent/sample.toml"));
    assert!(matches!(result, Err(Error::NotFound(_))));
}

#[test]
fn test_load_toml_invalid_syntax() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.toml");
    fs::write(&path, "port = [unterminated").unwrap();

    let result = load_toml::<SampleConfig>(&path);
    assert!(matches!(result, Err(Error::ConfigParse(_))));
}

#[test]
fn test_missing_file_falls_back_to_defaults() {
    let config: SampleConfig = load_toml_or_default(None).unwrap();
    assert_eq!(config, SampleConfig::default());
}
