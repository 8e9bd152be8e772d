use std::str::FromStr;

use log::debug;
use reqwest::header::{HeaderValue, CONTENT_TYPE};
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::connection::ConnectionRecord;
use crate::error::{DremioError, DremioResult};

// https://docs.dremio.com/current/reference/api/#authentication

const AUTH_TOKEN_PREFIX: &str = "_dremio";
const CONTENT_TYPE_JSON: &str = "application/json";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthKind {
    /// A session token obtained by logging in with a username and password.
    AuthToken,
    /// A personal access token.
    Pat,
}

impl FromStr for AuthKind {
    type Err = DremioError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "AuthToken" => Ok(AuthKind::AuthToken),
            "PAT" => Ok(AuthKind::Pat),
            _ => Err(DremioError::AuthConfig(format!(
                "invalid auth type '{s}', expected either 'AuthToken' or 'PAT'"
            ))),
        }
    }
}

/// The credentials of a connection, validated and ready to be exchanged for a token.
#[derive(Debug)]
pub enum AuthMode {
    AuthToken {
        login: String,
        password: SecretString,
    },
    Pat(SecretString),
}

impl AuthMode {
    pub fn from_connection(connection: &ConnectionRecord) -> DremioResult<Self> {
        let extra = connection.extra()?;
        let kind = match extra.auth.as_deref() {
            None => AuthKind::AuthToken,
            Some(auth) => auth.parse()?,
        };
        match kind {
            AuthKind::AuthToken => {
                let login = connection.login.as_deref().filter(|s| !s.is_empty());
                let password = connection.password.as_deref().filter(|s| !s.is_empty());
                match (login, password) {
                    (Some(login), Some(password)) => Ok(AuthMode::AuthToken {
                        login: login.to_string(),
                        password: SecretString::new(password.into()),
                    }),
                    _ => Err(DremioError::AuthConfig(format!(
                        "both login and password must be set in connection '{}' to use AuthToken",
                        connection.conn_id
                    ))),
                }
            }
            AuthKind::Pat => match extra.pat.filter(|s| !s.is_empty()) {
                Some(pat) => Ok(AuthMode::Pat(SecretString::new(pat.into_boxed_str()))),
                None => Err(DremioError::AuthConfig(format!(
                    "auth method 'PAT' requires a value for key 'pat' in the extra of connection '{}'",
                    connection.conn_id
                ))),
            },
        }
    }

    pub fn kind(&self) -> AuthKind {
        match self {
            AuthMode::AuthToken { .. } => AuthKind::AuthToken,
            AuthMode::Pat(_) => AuthKind::Pat,
        }
    }
}

/// A bearer credential together with the mode that produced it.
#[derive(Debug)]
pub struct AuthToken {
    kind: AuthKind,
    secret: SecretString,
}

impl AuthToken {
    pub fn new(kind: AuthKind, secret: impl Into<String>) -> Self {
        let secret: String = secret.into();
        Self {
            kind,
            secret: SecretString::new(secret.into_boxed_str()),
        }
    }

    pub fn kind(&self) -> AuthKind {
        self.kind
    }

    pub fn secret(&self) -> &SecretString {
        &self.secret
    }

    /// The value of the `Authorization` header.
    pub fn header_value(&self) -> DremioResult<HeaderValue> {
        let secret = self.secret.expose_secret();
        let value = match self.kind {
            AuthKind::AuthToken => format!("{AUTH_TOKEN_PREFIX}{secret}"),
            AuthKind::Pat => format!("Bearer {secret}"),
        };
        let mut value = HeaderValue::from_str(&value)
            .map_err(|e| DremioError::AuthConfig(format!("invalid token: {e}")))?;
        value.set_sensitive(true);
        Ok(value)
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LoginRequest<'a> {
    user_name: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
struct LoginResponse {
    token: Option<String>,
}

/// Turns connection credentials into a single [`AuthToken`].
pub struct CredentialResolver<'a> {
    client: &'a Client,
    login_url: Url,
}

impl<'a> CredentialResolver<'a> {
    pub fn new(client: &'a Client, login_url: Url) -> Self {
        Self { client, login_url }
    }

    pub async fn resolve(&self, connection: &ConnectionRecord) -> DremioResult<AuthToken> {
        let mode = AuthMode::from_connection(connection)?;
        self.resolve_mode(mode).await
    }

    pub async fn resolve_mode(&self, mode: AuthMode) -> DremioResult<AuthToken> {
        match mode {
            AuthMode::Pat(pat) => {
                debug!("using personal access token");
                Ok(AuthToken {
                    kind: AuthKind::Pat,
                    secret: pat,
                })
            }
            AuthMode::AuthToken { login, password } => self.login(&login, &password).await,
        }
    }

    async fn login(&self, login: &str, password: &SecretString) -> DremioResult<AuthToken> {
        debug!("fetching auth token for user {login} from {}", self.login_url);
        let request = LoginRequest {
            user_name: login,
            password: password.expose_secret(),
        };
        let response = self
            .client
            .post(self.login_url.clone())
            .header(CONTENT_TYPE, HeaderValue::from_static(CONTENT_TYPE_JSON))
            .json(&request)
            .send()
            .await
            .map_err(|e| DremioError::Connection(format!("failed to fetch auth token: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(match status {
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                    DremioError::Authentication {
                        status: status.as_u16(),
                        body,
                    }
                }
                _ => DremioError::Connection(format!(
                    "login request failed with HTTP {status}: {body}"
                )),
            });
        }

        let response: LoginResponse = response
            .json()
            .await
            .map_err(|e| DremioError::InvalidResponse(format!("failed to parse login response: {e}")))?;
        let token = response.token.filter(|t| !t.is_empty()).ok_or_else(|| {
            DremioError::InvalidResponse("login response does not contain a token".to_string())
        })?;
        Ok(AuthToken::new(AuthKind::AuthToken, token))
    }
}
