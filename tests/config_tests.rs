// ABOUTME: Tests for configuration loading from disk and environment overrides
// ABOUTME: Env-mutating tests are serialized so they don't contaminate each other

use std::io::Write;
use std::time::Duration;

use serial_test::serial;
use slackbot::config::Config;

/// Helper to clear all config-related env vars
fn clear_config_env_vars() {
    std::env::remove_var("SLACKBOT_CONFIG_PATH");
    std::env::remove_var("SLACK_TOKEN");
    std::env::remove_var("SLACK_API_BASE_URL");
    std::env::remove_var("SLACKBOT_RECONNECT_DELAY_SECS");
    std::env::remove_var("SLACKBOT_LOG_DIR");
}

fn write_config(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

#[test]
#[serial]
fn test_config_loads_from_toml_file() {
    clear_config_env_vars();

    let file = write_config(
        r#"
[slack]
token = "xoxb-file"
api_base_url = "https://chat.internal/api"

[[sinks]]
name = "tfs"
project_collection = "https://tfs.internal/DefaultCollection"
project = "Projects"
access_token = "pat"

[logging]
dir = "/var/log/slackbot"
"#,
    );

    let config = Config::load_from(file.path()).unwrap();

    assert_eq!(config.slack.token, "xoxb-file");
    assert_eq!(config.slack.api_base_url, "https://chat.internal/api");
    assert_eq!(config.slack.reconnect_delay(), Duration::from_secs(5));
    assert_eq!(config.sinks.len(), 1);
    assert_eq!(config.sinks[0].project, "Projects");
    assert_eq!(config.logging.dir.as_deref(), Some("/var/log/slackbot"));
}

#[test]
#[serial]
fn test_env_vars_override_file_values() {
    clear_config_env_vars();
    std::env::set_var("SLACK_TOKEN", "xoxb-env");
    std::env::set_var("SLACKBOT_RECONNECT_DELAY_SECS", "12");
    std::env::set_var("SLACKBOT_LOG_DIR", "/tmp/slackbot-logs");

    let file = write_config("[slack]\ntoken = \"xoxb-file\"\n");
    let config = Config::load_from(file.path()).unwrap();

    assert_eq!(config.slack.token, "xoxb-env");
    assert_eq!(config.slack.reconnect_delay(), Duration::from_secs(12));
    assert_eq!(config.logging.dir.as_deref(), Some("/tmp/slackbot-logs"));

    clear_config_env_vars();
}

#[test]
#[serial]
fn test_invalid_reconnect_delay_env_is_an_error() {
    clear_config_env_vars();
    std::env::set_var("SLACKBOT_RECONNECT_DELAY_SECS", "soon");

    let file = write_config("[slack]\ntoken = \"xoxb-file\"\n");
    let err = Config::load_from(file.path()).unwrap_err();
    assert!(format!("{:#}", err).contains("SLACKBOT_RECONNECT_DELAY_SECS"));

    clear_config_env_vars();
}

#[test]
#[serial]
fn test_token_can_come_from_env_alone() {
    clear_config_env_vars();

    let file = write_config("[slack]\n");
    assert!(Config::load_from(file.path()).is_err());

    std::env::set_var("SLACK_TOKEN", "xoxb-env");
    let config = Config::load_from(file.path()).unwrap();
    assert_eq!(config.slack.token, "xoxb-env");

    clear_config_env_vars();
}

#[test]
#[serial]
fn test_load_honors_config_path_env() {
    clear_config_env_vars();

    let file = write_config("[slack]\ntoken = \"xoxb-pointed\"\n");
    std::env::set_var("SLACKBOT_CONFIG_PATH", file.path());

    let config = Config::load().unwrap();
    assert_eq!(config.slack.token, "xoxb-pointed");

    clear_config_env_vars();
}

#[test]
#[serial]
fn test_malformed_file_reports_path() {
    clear_config_env_vars();

    let file = write_config("[slack\ntoken = ");
    let err = Config::load_from(file.path()).unwrap_err();
    assert!(err
        .to_string()
        .contains(&file.path().display().to_string()));
}
