use thiserror::Error;

use crate::form::ValidationError;

/// Failure reported by a [`crate::FlashLoanBackend`] call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    /// Non-2xx response; `message` comes from the body when the backend sent one.
    #[error("{message}")]
    Http { status: u16, message: String },
    #[error("{0}")]
    Transport(String),
    #[error("{0}")]
    Decode(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkflowError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("Please connect your wallet")]
    WalletNotConnected,
    #[error("Please get a quote first")]
    MissingQuote,
    #[error(transparent)]
    Backend(#[from] BackendError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Validation,
    Wallet,
    Http,
    Transport,
    Decode,
}

impl WorkflowError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            WorkflowError::Validation(_) | WorkflowError::MissingQuote => {
                ErrorCategory::Validation
            }
            WorkflowError::WalletNotConnected => ErrorCategory::Wallet,
            WorkflowError::Backend(BackendError::Http { .. }) => ErrorCategory::Http,
            WorkflowError::Backend(BackendError::Transport(_)) => ErrorCategory::Transport,
            WorkflowError::Backend(BackendError::Decode(_)) => ErrorCategory::Decode,
        }
    }

    /// Local failures never reached the network.
    pub fn is_local(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::Validation | ErrorCategory::Wallet
        )
    }
}
