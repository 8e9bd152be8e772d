use std::time::Duration;

use figment::providers::{Env, Format, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::config::deserialize_non_zero;
use crate::error::{CommonError, CommonResult};

const DEFAULT_CONFIG: &str = include_str!("default.toml");

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub client: ClientConfig,
    pub poll: PollConfig,
    pub telemetry: TelemetryConfig,
}

impl AppConfig {
    pub fn load() -> CommonResult<Self> {
        let config: Self = Figment::from(Toml::string(DEFAULT_CONFIG))
            .admerge(Env::prefixed("DREMIO__").map(|p| p.as_str().replace("__", ".").into()))
            .extract()
            .map_err(|e| CommonError::InvalidArgument(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> CommonResult<()> {
        if self.poll.interval_secs == 0 {
            return Err(CommonError::invalid("poll.interval_secs must be positive"));
        }
        if self.poll.timeout_secs == 0 {
            return Err(CommonError::invalid("poll.timeout_secs must be positive"));
        }
        if self.client.api_version.trim_matches('/').is_empty() {
            return Err(CommonError::invalid("client.api_version must not be empty"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    pub api_version: String,
    pub login_path: String,
    #[serde(deserialize_with = "deserialize_non_zero")]
    pub request_timeout_secs: Option<u64>,
}

impl ClientConfig {
    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_version: "api/v3".to_string(),
            login_path: "apiv2/login".to_string(),
            request_timeout_secs: Some(300),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollConfig {
    pub interval_secs: u64,
    pub timeout_secs: u64,
    pub max_transient_errors: usize,
}

impl PollConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_secs: 60,
            timeout_secs: 60 * 60 * 24 * 7,
            max_transient_errors: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    pub export_traces: bool,
    pub otlp_endpoint: String,
    pub otlp_timeout_secs: u64,
    pub traces_export_interval_secs: u64,
}
