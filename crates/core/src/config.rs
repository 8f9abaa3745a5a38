use serde::Deserialize;

/// Root application configuration. Loaded from environment variables
/// with the prefix `CHATPROBE__` and an optional TOML config file.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_node_id")]
    pub node_id: String,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub target: TargetConfig,
    #[serde(default)]
    pub reports: ReportsConfig,
    #[serde(default)]
    pub suite: SuiteDefaults,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_http_port")]
    pub http_port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_enabled")]
    pub enabled: bool,
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

/// Connection settings for the system under test.
#[derive(Debug, Clone, Deserialize)]
pub struct TargetConfig {
    #[serde(default = "default_target_url")]
    pub base_url: String,
    #[serde(default = "default_message_path")]
    pub message_path: String,
    #[serde(default = "default_target_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default)]
    pub auth_token: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReportsConfig {
    #[serde(default = "default_reports_dir")]
    pub dir: String,
}

/// Values applied to incoming suite requests that omit them.
#[derive(Debug, Clone, Deserialize)]
pub struct SuiteDefaults {
    #[serde(default = "default_max_turns")]
    pub max_turns_per_conversation: u32,
    #[serde(default = "default_turn_delay_ms")]
    pub delay_between_turns_ms: u64,
    #[serde(default = "default_conversation_delay_ms")]
    pub delay_between_conversations_ms: u64,
    #[serde(default = "default_follow_ups")]
    pub scripted_follow_ups: u32,
    /// How long a completed or failed suite stays pollable before it is
    /// evicted from the registry.
    #[serde(default = "default_finished_retention_secs")]
    pub finished_retention_secs: u64,
}

// Default functions
fn default_node_id() -> String {
    "probe-01".to_string()
}
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_http_port() -> u16 {
    8080
}
fn default_metrics_enabled() -> bool {
    true
}
fn default_metrics_port() -> u16 {
    9091
}
fn default_target_url() -> String {
    "http://localhost:3000".to_string()
}
fn default_message_path() -> String {
    "/api/chat".to_string()
}
fn default_target_timeout_ms() -> u64 {
    12_000
}
fn default_reports_dir() -> String {
    "reports".to_string()
}
fn default_max_turns() -> u32 {
    10
}
fn default_turn_delay_ms() -> u64 {
    1000
}
fn default_conversation_delay_ms() -> u64 {
    2000
}
fn default_follow_ups() -> u32 {
    4
}
fn default_finished_retention_secs() -> u64 {
    3600
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            http_port: default_http_port(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_metrics_enabled(),
            port: default_metrics_port(),
        }
    }
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            base_url: default_target_url(),
            message_path: default_message_path(),
            timeout_ms: default_target_timeout_ms(),
            auth_token: None,
        }
    }
}

impl Default for ReportsConfig {
    fn default() -> Self {
        Self {
            dir: default_reports_dir(),
        }
    }
}

impl Default for SuiteDefaults {
    fn default() -> Self {
        Self {
            max_turns_per_conversation: default_max_turns(),
            delay_between_turns_ms: default_turn_delay_ms(),
            delay_between_conversations_ms: default_conversation_delay_ms(),
            scripted_follow_ups: default_follow_ups(),
            finished_retention_secs: default_finished_retention_secs(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            node_id: default_node_id(),
            api: ApiConfig::default(),
            metrics: MetricsConfig::default(),
            target: TargetConfig::default(),
            reports: ReportsConfig::default(),
            suite: SuiteDefaults::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables and an optional config file.
    pub fn load(file: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();

        if let Some(path) = file {
            builder = builder.add_source(config::File::with_name(path).required(true));
        }

        let config = builder
            .add_source(
                config::Environment::with_prefix("CHATPROBE")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(","),
            )
            .build()?;
        config.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.api.http_port, 8080);
        assert_eq!(config.target.timeout_ms, 12_000);
        assert_eq!(config.suite.max_turns_per_conversation, 10);
        assert_eq!(config.suite.finished_retention_secs, 3600);
    }

    #[test]
    fn test_partial_deserialize_fills_defaults() {
        let config: AppConfig =
            serde_json::from_str(r#"{"target": {"base_url": "http://bot:9000"}}"#).unwrap();
        assert_eq!(config.target.base_url, "http://bot:9000");
        assert_eq!(config.target.message_path, "/api/chat");
        assert_eq!(config.reports.dir, "reports");
    }
}
