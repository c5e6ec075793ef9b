//! Errors from starting a category's provider.

use cirrus_types::CirrusError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("Unknown tool category '{0}'")]
    UnknownCategory(String),

    #[error("Tool category '{category}' is unavailable: {reason}")]
    Unavailable { category: String, reason: String },

    #[error("Tools are disabled")]
    Disabled,

    #[error("Failed to start '{category}' tools: {message}")]
    Failed { category: String, message: String },
}

impl From<LaunchError> for CirrusError {
    fn from(err: LaunchError) -> Self {
        match err {
            LaunchError::Failed { category, message } => {
                CirrusError::ProviderLaunch { category, message }
            }
            other => CirrusError::Other(other.to_string()),
        }
    }
}
