use std::fmt;

use serde::Deserialize;
use serde_json::Value;
use url::Url;

use crate::error::{DremioError, DremioResult};

const DEFAULT_SCHEMA: &str = "http";

/// A named Dremio connection as stored by the host.
///
/// The `extra` field may hold either a JSON object or a string containing
/// a JSON object.
#[derive(Clone, Default, Deserialize)]
pub struct ConnectionRecord {
    #[serde(default)]
    pub conn_id: String,
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub schema: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub login: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub extra: Option<Value>,
}

impl fmt::Debug for ConnectionRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionRecord")
            .field("conn_id", &self.conn_id)
            .field("host", &self.host)
            .field("schema", &self.schema)
            .field("port", &self.port)
            .field("login", &self.login)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .finish_non_exhaustive()
    }
}

/// The keys of the connection `extra` blob understood by the client.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConnectionExtra {
    /// Either `AuthToken` or `PAT`.
    #[serde(default)]
    pub auth: Option<String>,
    #[serde(default)]
    pub pat: Option<String>,
    #[serde(default, alias = "verify_ssl")]
    pub verify: Option<bool>,
    /// A proxy URL, or an object mapping `http`/`https` to proxy URLs.
    #[serde(default, alias = "proxies")]
    pub proxy: Option<Value>,
    #[serde(default)]
    pub max_redirects: Option<usize>,
    /// Request timeout in seconds.
    #[serde(default)]
    pub timeout: Option<u64>,
}

impl ConnectionRecord {
    pub fn new(conn_id: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            conn_id: conn_id.into(),
            host: Some(host.into()),
            ..Default::default()
        }
    }

    pub fn with_login(mut self, login: impl Into<String>, password: impl Into<String>) -> Self {
        self.login = Some(login.into());
        self.password = Some(password.into());
        self
    }

    pub fn with_extra(mut self, extra: Value) -> Self {
        self.extra = Some(extra);
        self
    }

    /// The base URL of the Dremio endpoint, always ending with `/`.
    pub fn base_url(&self) -> DremioResult<Url> {
        let host = self
            .host
            .as_deref()
            .map(str::trim)
            .filter(|h| !h.is_empty())
            .ok_or_else(|| {
                DremioError::InvalidArgument(format!("connection '{}' has no host", self.conn_id))
            })?;
        let mut base = if host.contains("://") {
            host.to_string()
        } else {
            let schema = self
                .schema
                .as_deref()
                .filter(|s| !s.is_empty())
                .unwrap_or(DEFAULT_SCHEMA);
            format!("{schema}://{host}")
        };
        if let Some(port) = self.port {
            base = format!("{}:{port}", base.trim_end_matches('/'));
        }
        if !base.ends_with('/') {
            base.push('/');
        }
        Url::parse(&base).map_err(|e| {
            DremioError::InvalidArgument(format!(
                "invalid host for connection '{}': {e}",
                self.conn_id
            ))
        })
    }

    pub fn extra(&self) -> DremioResult<ConnectionExtra> {
        let value = match &self.extra {
            None | Some(Value::Null) => return Ok(ConnectionExtra::default()),
            Some(Value::String(s)) if s.trim().is_empty() => {
                return Ok(ConnectionExtra::default())
            }
            Some(Value::String(s)) => serde_json::from_str(s).map_err(|e| {
                DremioError::AuthConfig(format!(
                    "connection '{}' extra is not valid JSON: {e}",
                    self.conn_id
                ))
            })?,
            Some(v) => v.clone(),
        };
        serde_json::from_value(value).map_err(|e| {
            DremioError::AuthConfig(format!(
                "invalid extra for connection '{}': {e}",
                self.conn_id
            ))
        })
    }
}
