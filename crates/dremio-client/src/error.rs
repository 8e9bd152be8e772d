use std::time::Duration;

use reqwest::StatusCode;
use thiserror::Error;

pub type DremioResult<T> = Result<T, DremioError>;

#[derive(Debug, Error)]
pub enum DremioError {
    #[error("invalid authentication config: {0}")]
    AuthConfig(String),
    #[error("authentication failed (HTTP {status}): {body}")]
    Authentication { status: u16, body: String },
    #[error("connection error: {0}")]
    Connection(String),
    #[error("Dremio API error (HTTP {status}): {body}")]
    Api { status: u16, body: String },
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("timed out after {} seconds", .0.as_secs())]
    TimedOut(Duration),
    #[error("{subject} ended in state {state}: {message}")]
    JobFailed {
        subject: String,
        state: String,
        message: String,
    },
    #[error("interrupted: {0}")]
    Interrupted(String),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl DremioError {
    /// Maps a non-2xx response to an error variant.
    pub fn from_status(status: StatusCode, body: String) -> Self {
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => DremioError::Authentication {
                status: status.as_u16(),
                body,
            },
            StatusCode::NOT_FOUND => DremioError::NotFound(body),
            StatusCode::CONFLICT => DremioError::Conflict(body),
            _ => DremioError::Api {
                status: status.as_u16(),
                body,
            },
        }
    }

    /// Errors that may go away on their own if the request is repeated later.
    pub fn is_transient(&self) -> bool {
        match self {
            DremioError::Connection(_) => true,
            DremioError::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for DremioError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            DremioError::InvalidResponse(e.to_string())
        } else {
            DremioError::Connection(e.to_string())
        }
    }
}

impl From<serde_json::Error> for DremioError {
    fn from(e: serde_json::Error) -> Self {
        DremioError::InvalidResponse(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_status() {
        assert!(matches!(
            DremioError::from_status(StatusCode::NOT_FOUND, "missing".to_string()),
            DremioError::NotFound(_)
        ));
        assert!(matches!(
            DremioError::from_status(StatusCode::CONFLICT, "exists".to_string()),
            DremioError::Conflict(_)
        ));
        assert!(matches!(
            DremioError::from_status(StatusCode::FORBIDDEN, String::new()),
            DremioError::Authentication { status: 403, .. }
        ));
        assert!(matches!(
            DremioError::from_status(StatusCode::BAD_REQUEST, String::new()),
            DremioError::Api { status: 400, .. }
        ));
    }

    #[test]
    fn test_is_transient() {
        assert!(DremioError::Connection("refused".to_string()).is_transient());
        assert!(DremioError::Api {
            status: 503,
            body: String::new()
        }
        .is_transient());
        assert!(!DremioError::Api {
            status: 400,
            body: String::new()
        }
        .is_transient());
        assert!(!DremioError::NotFound(String::new()).is_transient());
    }
}
