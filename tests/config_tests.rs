//! Configuration loading and plugin directory override tests

mod module;

use module::test_utils::MockHost;
use serial_test::serial;
use std::io::Write;
use tempfile::NamedTempFile;

use bundle_loader::config::{
    ListenerMode, LoaderConfig, ResolveStrategy, PLUGINS_DIR_ENV, PLUGINS_DIR_PROPERTY,
};

fn write_config(suffix: &str, contents: &str) -> NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[test]
fn test_load_toml_file() {
    let file = write_config(
        ".toml",
        r#"
plugins_dir = "/srv/plugins"
archive_suffix = ".bundle"
resolve_strategy = "per_module"
listener_mode = "inline"

[logging]
filter = "bundle_loader=debug"
json_format = true
"#,
    );

    let config = LoaderConfig::from_file(file.path()).unwrap();

    assert_eq!(config.plugins_dir, "/srv/plugins");
    assert_eq!(config.archive_suffix, ".bundle");
    assert_eq!(config.resolve_strategy, ResolveStrategy::PerModule);
    assert_eq!(config.listener_mode, ListenerMode::Inline);
    let logging = config.logging.unwrap();
    assert_eq!(logging.filter.as_deref(), Some("bundle_loader=debug"));
    assert!(logging.json_format);
}

#[test]
fn test_load_json_file() {
    let file = write_config(".json", r#"{ "plugins_dir": "drop-in" }"#);

    let config = LoaderConfig::from_file(file.path()).unwrap();

    assert_eq!(config.plugins_dir, "drop-in");
    assert_eq!(config.archive_suffix, ".jar");
}

#[test]
fn test_unknown_strategy_is_an_error() {
    let file = write_config(".toml", "resolve_strategy = \"eventually\"\n");
    assert!(LoaderConfig::from_file(file.path()).is_err());
}

#[test]
#[serial]
fn test_file_value_without_overrides() {
    std::env::remove_var(PLUGINS_DIR_ENV);
    let mut config = LoaderConfig {
        plugins_dir: "from-file".to_string(),
        ..LoaderConfig::default()
    };

    config.apply_overrides(&MockHost::new());

    assert_eq!(config.plugins_dir, "from-file");
}

#[test]
#[serial]
fn test_environment_overrides_file() {
    std::env::set_var(PLUGINS_DIR_ENV, "/from/env");
    let mut config = LoaderConfig::default();

    config.apply_overrides(&MockHost::new());
    std::env::remove_var(PLUGINS_DIR_ENV);

    assert_eq!(config.plugins_dir, "/from/env");
}

#[test]
#[serial]
fn test_host_property_overrides_environment() {
    std::env::set_var(PLUGINS_DIR_ENV, "/from/env");
    let host = MockHost::new().with_property(PLUGINS_DIR_PROPERTY, "/from/property");
    let mut config = LoaderConfig::default();

    config.apply_overrides(&host);
    std::env::remove_var(PLUGINS_DIR_ENV);

    assert_eq!(config.plugins_dir, "/from/property");
}

#[test]
#[serial]
fn test_blank_overrides_are_ignored() {
    std::env::set_var(PLUGINS_DIR_ENV, "   ");
    let host = MockHost::new().with_property(PLUGINS_DIR_PROPERTY, "");
    let mut config = LoaderConfig::default();

    config.apply_overrides(&host);
    std::env::remove_var(PLUGINS_DIR_ENV);

    assert_eq!(config.plugins_dir, "plugins");
}
