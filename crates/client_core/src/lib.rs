//! Client-side workflow for multi-recipient flash-loan batches: form
//! validation, quote/risk/execute orchestration against the remote backend,
//! and batch history.

pub mod backend;
pub mod config;
pub mod error;
pub mod form;
pub mod history;
pub mod store;

pub use backend::{FlashLoanBackend, HttpFlashLoanBackend};
pub use config::{load_settings, ClientSettings};
pub use error::{BackendError, ErrorCategory, WorkflowError};
pub use form::{BatchForm, RecipientInput, ValidatedBatch, ValidationError, MAX_RECIPIENTS};
pub use history::{spawn_history_poller, BatchStatus, HistoryRow, HistoryViewer};
pub use store::{BatchStore, Phase, RiskSummary, StoreEvent, StoreSnapshot};
