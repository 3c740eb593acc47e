//! Error taxonomy of the dispatch pipeline.
//!
//! Errors raised before a message is durably queued reach the caller through
//! `DispatchError`. Errors raised while consuming are `ProviderError`s and are
//! only ever logged.

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error("unknown notification type: {0}")]
    UnknownType(String),

    #[error("unknown priority: {0}")]
    UnknownPriority(String),

    #[error("invalid {channel} address: {reason}")]
    InvalidChannel {
        channel: &'static str,
        reason: String,
    },
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("failed to persist notification: {0}")]
    Storage(String),

    /// The record exists but could not be queued. Resubmission is up to the caller.
    #[error("notification {notification_id} persisted but not queued: {reason}")]
    Publish {
        notification_id: Uuid,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    #[error("{channel} provider is disabled")]
    Disabled { channel: &'static str },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("provider rejected request with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("provider call timed out after {0} ms")]
    Timeout(u64),
}

impl ProviderError {
    /// Whether another attempt could reasonably succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            ProviderError::Disabled { .. } => false,
            ProviderError::Transport(_) | ProviderError::Timeout(_) => true,
            ProviderError::Rejected { status, .. } => *status == 429 || *status >= 500,
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        ProviderError::Transport(err.to_string())
    }
}
