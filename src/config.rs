use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Process-level settings. Trading parameters and credentials live in the
/// config documents managed by `ConfigStore`, not here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    pub server: ServerConfig,
    pub paths: PathsConfig,
    pub decision: DecisionConfig,
    pub refresh: RefreshConfig,
    pub telemetry: TelemetryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub max_in_flight: usize, // 1 = one signal fully processed before the next
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    pub config_dir: PathBuf,
    pub ledger_path: PathBuf,
    pub log_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionConfig {
    pub endpoint: Option<String>, // None = hold everything locally
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshConfig {
    pub remote_base: Option<String>, // None = no remote config refresh
    pub interval_secs: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    pub log_format: LogFormat,
    pub summary_interval_secs: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".into(),
                port: 8000,
                max_in_flight: 1,
            },
            paths: PathsConfig {
                config_dir: "config".into(),
                ledger_path: "logs/trading_log.csv".into(),
                log_dir: "logs".into(),
            },
            decision: DecisionConfig {
                endpoint: None,
                timeout_secs: 10,
            },
            refresh: RefreshConfig {
                remote_base: None,
                interval_secs: 3600,
            },
            telemetry: TelemetryConfig {
                log_format: LogFormat::Text,
                summary_interval_secs: 300,
            },
        }
    }
}

impl AgentConfig {
    /// Load settings from environment variables (.env file) with defaults.
    ///
    /// Optional env vars:
    ///   AGENT_HOST, AGENT_PORT: listen address (default 0.0.0.0:8000)
    ///   MAX_IN_FLIGHT: signals processed concurrently (default 1)
    ///   CONFIG_DIR: directory of the config documents (default config)
    ///   LEDGER_PATH: trade ledger CSV (default logs/trading_log.csv)
    ///   LOG_DIR: rolling log files (default logs)
    ///   DECISION_ENDPOINT: remote decision service URL; unset = local HOLD
    ///   DECISION_TIMEOUT_SECS: remote decision timeout (default 10)
    ///   CONFIG_REMOTE_BASE: base URL serving the config documents
    ///   CONFIG_REFRESH_SECS: remote refresh period (default 3600)
    ///   SUMMARY_INTERVAL_SECS: telemetry summary period (default 300)
    ///   LOG_FORMAT: "text" or "json" (default text)
    ///
    /// Values that fail to parse keep their default and are returned as
    /// warnings, to be logged once tracing is up.
    pub fn load_or_default() -> (Self, Vec<String>) {
        dotenv::dotenv().ok();

        let mut config = Self::default();
        let mut warnings = Vec::new();

        if let Some(host) = non_empty_var("AGENT_HOST") {
            config.server.host = host;
        }
        if let Some(port) = parsed_var("AGENT_PORT", &mut warnings) {
            config.server.port = port;
        }
        if let Some(n) = parsed_var("MAX_IN_FLIGHT", &mut warnings) {
            config.server.max_in_flight = n;
        }

        if let Some(dir) = non_empty_var("CONFIG_DIR") {
            config.paths.config_dir = dir.into();
        }
        if let Some(path) = non_empty_var("LEDGER_PATH") {
            config.paths.ledger_path = path.into();
        }
        if let Some(dir) = non_empty_var("LOG_DIR") {
            config.paths.log_dir = dir.into();
        }

        config.decision.endpoint = non_empty_var("DECISION_ENDPOINT");
        if let Some(secs) = parsed_var("DECISION_TIMEOUT_SECS", &mut warnings) {
            config.decision.timeout_secs = secs;
        }

        config.refresh.remote_base = non_empty_var("CONFIG_REMOTE_BASE");
        if let Some(secs) = parsed_var("CONFIG_REFRESH_SECS", &mut warnings) {
            config.refresh.interval_secs = secs;
        }

        if let Some(secs) = parsed_var("SUMMARY_INTERVAL_SECS", &mut warnings) {
            config.telemetry.summary_interval_secs = secs;
        }
        if let Some(format) = non_empty_var("LOG_FORMAT") {
            config.telemetry.log_format = if format.eq_ignore_ascii_case("json") {
                LogFormat::Json
            } else {
                LogFormat::Text
            };
        }

        (config, warnings)
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    pub fn decision_timeout(&self) -> Duration {
        Duration::from_secs(self.decision.timeout_secs)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh.interval_secs)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.server.max_in_flight >= 1,
            "MAX_IN_FLIGHT must be at least 1"
        );
        anyhow::ensure!(
            self.decision.timeout_secs >= 1,
            "DECISION_TIMEOUT_SECS must be at least 1"
        );
        anyhow::ensure!(
            self.refresh.interval_secs >= 60,
            "CONFIG_REFRESH_SECS must be at least 60, got {}",
            self.refresh.interval_secs
        );
        if let Some(endpoint) = &self.decision.endpoint {
            anyhow::ensure!(
                endpoint.starts_with("http://") || endpoint.starts_with("https://"),
                "DECISION_ENDPOINT must be an http(s) URL"
            );
        }
        Ok(())
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parsed_var<T: std::str::FromStr>(key: &str, warnings: &mut Vec<String>) -> Option<T> {
    let raw = non_empty_var(key)?;
    match raw.parse() {
        Ok(v) => Some(v),
        Err(_) => {
            warnings.push(format!("Ignoring {key}={raw}: not a valid value, using default"));
            None
        }
    }
}
