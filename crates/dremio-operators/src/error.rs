use dremio_client::error::DremioError;
use dremio_common::error::CommonError;
use thiserror::Error;

pub type OperatorResult<T> = Result<T, OperatorError>;

#[derive(Debug, Error)]
pub enum OperatorError {
    #[error(transparent)]
    Client(#[from] DremioError),
    #[error(transparent)]
    Common(#[from] CommonError),
    #[error("connection not found: {0}")]
    ConnectionNotFound(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("{0}")]
    Failed(String),
    #[error("internal error: {0}")]
    InternalError(String),
}

impl OperatorError {
    pub fn invalid(message: impl Into<String>) -> Self {
        OperatorError::InvalidArgument(message.into())
    }

    pub fn failed(message: impl Into<String>) -> Self {
        OperatorError::Failed(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        OperatorError::InternalError(message.into())
    }
}
