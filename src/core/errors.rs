use thiserror::Error;
use super::types::{GameId, UploadStep};

#[derive(Error, Debug)]
pub enum WorkflowError {
    #[error("IO error {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error {0}")]
    Http(#[from] reqwest::Error),

    #[error("Server error: status code {status_code}, message: {message}")]
    ServerError {
        status_code: u16,
        message: String,
    },

    #[error("Upload rejected by storage: status code {status_code}")]
    UploadRejected {
        status_code: u16,
    },

    #[error("Unauthorized, login required")]
    Unauthorized,

    #[error("Forbidden")]
    Forbidden,

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid step transition from {from} to {to}")]
    InvalidTransition {
        from: UploadStep,
        to: UploadStep,
    },

    #[error("Tags cannot be changed in step {0}")]
    TagsLocked(UploadStep),

    #[error("Game id not assigned yet")]
    MissingGameId,

    #[error("A transfer is already in progress")]
    TransferInProgress,

    #[error("No transfer in progress")]
    NoTransfer,

    #[error("No existing package for game {0}")]
    NoExistingAsset(GameId),

    #[error("Operation only available when editing an existing game")]
    NotEditing,

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Invalid url: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Invalid header value: {0}")]
    InvalidHeaderValue(#[from] reqwest::header::InvalidHeaderValue),

    #[error("Config error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("Serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Upload was cancelled")]
    Cancelled,

    #[error("Workflow shut down")]
    WorkflowShutdown,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl WorkflowError {
    pub fn server_error(status_code: u16, message: impl Into<String>) -> Self {
        Self::ServerError {
            status_code,
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// 网络抖动、超时或 5xx 视为可重试
    pub fn is_transient(&self) -> bool {
        match self {
            WorkflowError::Http(_) | WorkflowError::Timeout(_) | WorkflowError::Io(_) => true,
            WorkflowError::ServerError { status_code, .. } => *status_code >= 500,
            _ => false,
        }
    }
}

/// Error alias
pub type Result<T, E = WorkflowError> = std::result::Result<T, E>;
