// ABOUTME: Configuration parsing from TOML file with environment variable overrides
// ABOUTME: Validates required fields and provides sensible defaults for optional ones
use crate::paths;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub slack: SlackConfig,
    #[serde(default)]
    pub sinks: Vec<WorkItemSinkConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pull_requests: Option<PullRequestFeedConfig>,
    #[serde(default)]
    pub logging: LoggingConfig,
}

// ─── SlackConfig ────────────────────────────────────────────────

#[derive(Clone, Serialize, Deserialize)]
pub struct SlackConfig {
    #[serde(default)]
    pub token: String,
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    /// Fixed delay before each reconnect attempt
    #[serde(default = "default_reconnect_delay_secs")]
    pub reconnect_delay_secs: u64,
}

impl SlackConfig {
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay_secs)
    }
}

impl Default for SlackConfig {
    fn default() -> Self {
        Self {
            token: String::new(),
            api_base_url: default_api_base_url(),
            reconnect_delay_secs: default_reconnect_delay_secs(),
        }
    }
}

// Custom Debug impl to redact token
impl std::fmt::Debug for SlackConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlackConfig")
            .field("token", &"[REDACTED]")
            .field("api_base_url", &self.api_base_url)
            .field("reconnect_delay_secs", &self.reconnect_delay_secs)
            .finish()
    }
}

// ─── WorkItemSinkConfig ─────────────────────────────────────────

#[derive(Clone, Serialize, Deserialize)]
pub struct WorkItemSinkConfig {
    /// Key the sink is registered under
    pub name: String,
    /// Collection URL, e.g. https://dev.azure.com/contoso
    pub project_collection: String,
    pub project: String,
    /// How to authenticate: 0 = personal access token, 1 = username/password
    #[serde(default)]
    pub login_method: LoginMethod,
    /// Personal access token (sent as basic auth with an empty user)
    #[serde(default)]
    pub access_token: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    /// Text that triggers a saved-query search, e.g. "!searchtfs"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_string: Option<String>,
    /// Saved query id used by the search command
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_id: Option<String>,
    /// Attachment color per work item type, merged over the built-in table
    #[serde(default)]
    pub colors: HashMap<String, String>,
}

// Custom Debug impl to redact access_token
impl std::fmt::Debug for WorkItemSinkConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkItemSinkConfig")
            .field("name", &self.name)
            .field("project_collection", &self.project_collection)
            .field("project", &self.project)
            .field("login_method", &self.login_method)
            .field("access_token", &"[REDACTED]")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .field("search_string", &self.search_string)
            .field("query_id", &self.query_id)
            .field("colors", &self.colors)
            .finish()
    }
}

/// Credential scheme for a work item sink, stored as the numeric code used in
/// existing deployments. Unknown codes fall back to the access token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "u8", into = "u8")]
pub enum LoginMethod {
    #[default]
    AccessToken,
    Password,
}

impl From<u8> for LoginMethod {
    fn from(code: u8) -> Self {
        match code {
            1 => LoginMethod::Password,
            _ => LoginMethod::AccessToken,
        }
    }
}

impl From<LoginMethod> for u8 {
    fn from(method: LoginMethod) -> Self {
        match method {
            LoginMethod::AccessToken => 0,
            LoginMethod::Password => 1,
        }
    }
}

// ─── PullRequestFeedConfig ──────────────────────────────────────

#[derive(Clone, Serialize, Deserialize)]
pub struct PullRequestFeedConfig {
    pub project_collection: String,
    pub project: String,
    pub username: String,
    pub password: String,
    #[serde(default = "default_pr_channel")]
    pub channel: String,
    #[serde(default = "default_pr_interval_secs")]
    pub interval_secs: u64,
}

impl PullRequestFeedConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

// Custom Debug impl to redact password
impl std::fmt::Debug for PullRequestFeedConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PullRequestFeedConfig")
            .field("project_collection", &self.project_collection)
            .field("project", &self.project)
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .field("channel", &self.channel)
            .field("interval_secs", &self.interval_secs)
            .finish()
    }
}

// ─── LoggingConfig ──────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Directory for daily JSON log files; console-only logging when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<String>,
}

fn default_api_base_url() -> String {
    "https://slack.com/api".to_string()
}

fn default_reconnect_delay_secs() -> u64 {
    5
}

fn default_pr_channel() -> String {
    "general".to_string()
}

fn default_pr_interval_secs() -> u64 {
    180 // 3 minutes
}

/// Expand tilde (~) to home directory in paths
fn expand_tilde(path: &str) -> String {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(base_dirs) = directories::BaseDirs::new() {
            return base_dirs
                .home_dir()
                .join(stripped)
                .to_string_lossy()
                .to_string();
        }
        tracing::warn!(
            path = %path,
            "Failed to expand tilde in path: could not determine home directory"
        );
    }
    path.to_string()
}

impl Config {
    /// Find the config file, checking multiple locations in order:
    /// 1. SLACKBOT_CONFIG_PATH env var (if set)
    /// 2. ./config.toml (current directory - for development)
    /// 3. ~/.config/slackbot/config.toml (XDG config dir)
    fn find_config_file() -> Option<PathBuf> {
        if let Ok(env_path) = std::env::var("SLACKBOT_CONFIG_PATH") {
            let path = PathBuf::from(&env_path);
            if path.exists() {
                return Some(path);
            }
        }

        let local_config = PathBuf::from("config.toml");
        if local_config.exists() {
            return Some(local_config);
        }

        let xdg_config = paths::config_file();
        if xdg_config.exists() {
            return Some(xdg_config);
        }

        None
    }

    /// Load configuration from the first config file found, then apply
    /// environment overrides and validate.
    pub fn load() -> Result<Self> {
        match Self::find_config_file() {
            Some(path) => Self::load_from(&path),
            None => {
                tracing::info!("No config file found, using environment variables and defaults");
                Self::finish(Config {
                    slack: SlackConfig::default(),
                    sinks: Vec::new(),
                    pull_requests: None,
                    logging: LoggingConfig::default(),
                })
            }
        }
    }

    /// Load configuration from an explicit path.
    pub fn load_from(path: &Path) -> Result<Self> {
        tracing::info!(path = %path.display(), "Loading configuration from file");
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config = toml::from_str::<Config>(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        Self::finish(config)
    }

    fn finish(mut config: Config) -> Result<Self> {
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(val) = std::env::var("SLACK_TOKEN") {
            self.slack.token = val;
        }
        if let Ok(val) = std::env::var("SLACK_API_BASE_URL") {
            self.slack.api_base_url = val;
        }
        if let Ok(val) = std::env::var("SLACKBOT_RECONNECT_DELAY_SECS") {
            self.slack.reconnect_delay_secs = val.parse().with_context(|| {
                format!(
                    "SLACKBOT_RECONNECT_DELAY_SECS must be a valid number, got: {}",
                    val
                )
            })?;
        }
        if let Ok(val) = std::env::var("SLACKBOT_LOG_DIR") {
            self.logging.dir = Some(val);
        }
        if let Some(dir) = self.logging.dir.as_mut() {
            *dir = expand_tilde(dir);
        }
        Ok(())
    }

    /// Check required fields and cross-field constraints.
    pub fn validate(&self) -> Result<()> {
        if self.slack.token.trim().is_empty() {
            anyhow::bail!("slack.token is required (set in config.toml or SLACK_TOKEN env var)");
        }
        if self.slack.api_base_url.trim().is_empty() {
            anyhow::bail!("slack.api_base_url must not be empty");
        }

        let mut seen = std::collections::HashSet::new();
        for sink in &self.sinks {
            if sink.name.trim().is_empty() {
                anyhow::bail!("sinks[].name must not be empty");
            }
            if !seen.insert(sink.name.as_str()) {
                anyhow::bail!("Duplicate sink name '{}'", sink.name);
            }
            match sink.login_method {
                LoginMethod::AccessToken if sink.access_token.trim().is_empty() => {
                    anyhow::bail!("Sink '{}' requires access_token", sink.name);
                }
                LoginMethod::Password if sink.username.trim().is_empty() => {
                    anyhow::bail!(
                        "Sink '{}' uses login_method = 1 but sets no username",
                        sink.name
                    );
                }
                _ => {}
            }
            if sink.search_string.is_some() && sink.query_id.is_none() {
                anyhow::bail!(
                    "Sink '{}' sets search_string but no query_id to search with",
                    sink.name
                );
            }
        }

        if let Some(ref prs) = self.pull_requests {
            if prs.interval_secs == 0 {
                anyhow::bail!("pull_requests.interval_secs must be greater than zero");
            }
        }

        Ok(())
    }

    /// Look up a work item sink entry by its registration name.
    pub fn sink(&self, name: &str) -> Option<&WorkItemSinkConfig> {
        self.sinks.iter().find(|s| s.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: &str = r##"
[slack]
token = "xoxb-test"
reconnect_delay_secs = 2

[[sinks]]
name = "tfs"
project_collection = "https://dev.azure.com/contoso"
project = "Projects"
access_token = "pat"
search_string = "!searchtfs"
query_id = "5b3ad3a0-7a1f-4c49-9c43-0d5b2f4d1e11"

[sinks.colors]
Bug = "#ff0000"

[pull_requests]
project_collection = "https://dev.azure.com/contoso"
project = "Projects"
username = "bot"
password = "secret"
"##;

    #[test]
    fn test_parse_full_config() {
        let config: Config = toml::from_str(FULL).unwrap();
        config.validate().unwrap();

        assert_eq!(config.slack.api_base_url, "https://slack.com/api");
        assert_eq!(config.slack.reconnect_delay(), Duration::from_secs(2));
        let sink = config.sink("tfs").unwrap();
        assert_eq!(sink.colors.get("Bug").map(String::as_str), Some("#ff0000"));
        let prs = config.pull_requests.as_ref().unwrap();
        assert_eq!(prs.channel, "general");
        assert_eq!(prs.interval(), Duration::from_secs(180));
    }

    #[test]
    fn test_minimal_config_defaults() {
        let config: Config = toml::from_str("[slack]\ntoken = \"t\"\n").unwrap();
        assert!(config.sinks.is_empty());
        assert!(config.pull_requests.is_none());
        assert!(config.logging.dir.is_none());
        assert_eq!(config.slack.reconnect_delay_secs, 5);
    }

    #[test]
    fn test_missing_token_rejected() {
        let config: Config = toml::from_str("[slack]\n").unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("slack.token"));
    }

    #[test]
    fn test_duplicate_sink_names_rejected() {
        let toml_str = r#"
[slack]
token = "t"

[[sinks]]
name = "tfs"
project_collection = "a"
project = "p"
access_token = "x"

[[sinks]]
name = "tfs"
project_collection = "b"
project = "p"
access_token = "y"
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert!(config.validate().unwrap_err().to_string().contains("Duplicate"));
    }

    #[test]
    fn test_search_without_query_rejected() {
        let toml_str = r#"
[slack]
token = "t"

[[sinks]]
name = "tfs"
project_collection = "a"
project = "p"
access_token = "x"
search_string = "!searchtfs"
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert!(config.validate().unwrap_err().to_string().contains("query_id"));
    }

    #[test]
    fn test_login_method_codes() {
        let toml_str = r#"
[slack]
token = "t"

[[sinks]]
name = "onprem"
project_collection = "http://tfs:8080/tfs/DefaultCollection"
project = "p"
login_method = 1
username = "DOMAIN\\bot"
password = "hunter2"

[[sinks]]
name = "cloud"
project_collection = "https://dev.azure.com/contoso"
project = "p"
access_token = "x"
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        config.validate().unwrap();

        let onprem = config.sink("onprem").unwrap();
        assert_eq!(onprem.login_method, LoginMethod::Password);
        assert_eq!(onprem.username, "DOMAIN\\bot");
        assert_eq!(config.sink("cloud").unwrap().login_method, LoginMethod::AccessToken);
        assert_eq!(LoginMethod::from(7), LoginMethod::AccessToken);

        let rendered = format!("{:?}", onprem);
        assert!(!rendered.contains("hunter2"));
    }

    #[test]
    fn test_password_login_requires_username() {
        let toml_str = r#"
[slack]
token = "t"

[[sinks]]
name = "onprem"
project_collection = "a"
project = "p"
login_method = 1
password = "hunter2"
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert!(config.validate().unwrap_err().to_string().contains("username"));
    }

    #[test]
    fn test_token_login_requires_access_token() {
        let toml_str = "[slack]\ntoken = \"t\"\n\n[[sinks]]\nname = \"tfs\"\nproject_collection = \"a\"\nproject = \"p\"\n";
        let config: Config = toml::from_str(toml_str).unwrap();
        assert!(config.validate().unwrap_err().to_string().contains("access_token"));
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let config: Config = toml::from_str(FULL).unwrap();
        let rendered = format!("{:?}", config);
        assert!(!rendered.contains("xoxb-test"));
        assert!(!rendered.contains("secret"));
        assert!(!rendered.contains("\"pat\""));
        assert!(rendered.contains("[REDACTED]"));
    }
}
