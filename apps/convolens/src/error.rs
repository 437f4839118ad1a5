// ============================================================================
// ERROR HANDLING
// ============================================================================
// One error type per subsystem, all convertible into `ConvoError`.
// Per-record and per-call failures are recovered locally and only surface as
// counts; ingestion-fatal and configuration errors reach the caller as a
// single failure with no partial result.
// ============================================================================

use std::path::PathBuf;

use thiserror::Error;

use crate::store::RowId;

// ----------------------------------------------------------------------------
// Core Engine Errors
// ----------------------------------------------------------------------------

/// The main error type for the engine.
#[derive(Error, Debug)]
pub enum ConvoError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Ingestion error: {0}")]
    Ingest(#[from] IngestError),

    #[error("Query error: {0}")]
    Query(#[from] QueryError),

    #[error("Scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),

    #[error("Inference error: {0}")]
    Inference(#[from] InferenceError),

    #[error("Summarization error: {0}")]
    Summarize(#[from] SummarizeError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ConvoError {
    /// Check if this error is recoverable
    pub fn is_recoverable(&self) -> bool {
        match self {
            ConvoError::Config(_) => false,
            ConvoError::Ingest(e) => e.is_recoverable(),
            ConvoError::Query(e) => e.is_recoverable(),
            ConvoError::Scheduler(_) => true,
            ConvoError::Inference(e) => e.is_recoverable(),
            ConvoError::Summarize(e) => e.is_recoverable(),
            ConvoError::Io(_) => true,
            ConvoError::Internal(_) => false,
        }
    }

    /// Get the error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            ConvoError::Config(_) => "config",
            ConvoError::Ingest(_) => "ingest",
            ConvoError::Query(_) => "query",
            ConvoError::Scheduler(_) => "scheduler",
            ConvoError::Inference(_) => "inference",
            ConvoError::Summarize(_) => "summarize",
            ConvoError::Io(_) => "io",
            ConvoError::Internal(_) => "internal",
        }
    }

    /// Get suggested recovery action
    pub fn recovery_hint(&self) -> RecoveryHint {
        match self {
            ConvoError::Config(_) => RecoveryHint::FixConfiguration,
            ConvoError::Ingest(_) => RecoveryHint::ReloadDataset,
            ConvoError::Query(QueryError::NotLoaded) => RecoveryHint::ReloadDataset,
            ConvoError::Query(_) => RecoveryHint::None,
            ConvoError::Inference(e) => e.recovery_hint(),
            ConvoError::Summarize(SummarizeError::Cancelled) => RecoveryHint::None,
            ConvoError::Internal(_) => RecoveryHint::None,
            _ => RecoveryHint::RetryWithBackoff,
        }
    }
}

/// Hints for how to recover from an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryHint {
    /// No recovery possible
    None,
    /// Retry with exponential backoff
    RetryWithBackoff,
    /// Skip this item and continue
    Skip,
    /// Fix configuration and restart
    FixConfiguration,
    /// Load the dataset again
    ReloadDataset,
}

// ----------------------------------------------------------------------------
// Configuration Errors
// ----------------------------------------------------------------------------

/// Errors related to configuration loading and validation
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("Failed to parse configuration: {message}")]
    ParseError { message: String },

    #[error("Invalid configuration value for '{field}': {message}")]
    InvalidValue { field: String, message: String },
}

impl ConfigError {
    pub fn invalid_value(field: impl Into<String>, message: impl Into<String>) -> Self {
        ConfigError::InvalidValue {
            field: field.into(),
            message: message.into(),
        }
    }
}

// ----------------------------------------------------------------------------
// Ingestion Errors
// ----------------------------------------------------------------------------

/// Fatal ingestion failures. Malformed individual records are never reported
/// here; they are skipped and counted in the ingest report.
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Input stream is unreadable: {message}")]
    Unreadable { message: String },

    #[error("Input has no header row")]
    MissingHeader,

    #[error("Failed to open '{path}': {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Ingestion task failed: {message}")]
    TaskFailed { message: String },
}

impl IngestError {
    pub fn unreadable(message: impl Into<String>) -> Self {
        IngestError::Unreadable {
            message: message.into(),
        }
    }

    pub fn is_recoverable(&self) -> bool {
        false
    }
}

// ----------------------------------------------------------------------------
// Query Errors
// ----------------------------------------------------------------------------

/// Errors from the query surface
#[derive(Error, Debug)]
pub enum QueryError {
    #[error("No dataset loaded")]
    NotLoaded,

    #[error("Invalid page request: page={page}, page_size={page_size}")]
    InvalidPage { page: usize, page_size: usize },

    #[error("Unknown row id: {row_id}")]
    UnknownRow { row_id: RowId },

    #[error("Export failed: {message}")]
    ExportFailed { message: String },

    #[error("Unrecognized date bound: '{value}'")]
    InvalidDate { value: String },
}

impl QueryError {
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, QueryError::NotLoaded)
    }
}

// ----------------------------------------------------------------------------
// Scheduler Errors
// ----------------------------------------------------------------------------

/// Errors surfaced by task handles
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("Task was cancelled before dispatch")]
    Cancelled,

    #[error("Scheduler has shut down")]
    Closed,

    #[error("Task panicked: {message}")]
    TaskPanicked { message: String },
}

// ----------------------------------------------------------------------------
// Inference Errors
// ----------------------------------------------------------------------------

/// Per-call failures. These are recorded against the one row or batch that
/// produced them and never stop sibling tasks.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InferenceError {
    #[error("Transport error: {message}")]
    Transport { message: String },

    #[error("Quota exceeded: {message}")]
    Quota { message: String },

    #[error("HTTP error {status}: {message}")]
    Http { status: u16, message: String },

    #[error("Unparseable response: {message}")]
    Format { message: String },

    #[error("Task did not complete: {0}")]
    Scheduler(#[from] SchedulerError),
}

impl InferenceError {
    pub fn transport(message: impl Into<String>) -> Self {
        InferenceError::Transport {
            message: message.into(),
        }
    }

    pub fn format(message: impl Into<String>) -> Self {
        InferenceError::Format {
            message: message.into(),
        }
    }

    pub fn is_recoverable(&self) -> bool {
        !matches!(self, InferenceError::Scheduler(SchedulerError::Cancelled))
    }

    pub fn recovery_hint(&self) -> RecoveryHint {
        match self {
            InferenceError::Transport { .. } => RecoveryHint::RetryWithBackoff,
            InferenceError::Quota { .. } => RecoveryHint::RetryWithBackoff,
            InferenceError::Http { status, .. } if *status >= 500 => RecoveryHint::RetryWithBackoff,
            InferenceError::Http { .. } => RecoveryHint::FixConfiguration,
            InferenceError::Format { .. } => RecoveryHint::Skip,
            InferenceError::Scheduler(_) => RecoveryHint::None,
        }
    }
}

// ----------------------------------------------------------------------------
// Summarization Errors
// ----------------------------------------------------------------------------

/// Failures of a whole map-reduce run
#[derive(Error, Debug)]
pub enum SummarizeError {
    #[error("No usable row results to summarize")]
    NoUsableResults,

    #[error("All {batches} intermediate batches failed")]
    AllBatchesFailed { batches: usize },

    #[error("Final reduction failed: {0}")]
    FinalReduceFailed(InferenceError),

    #[error("Analysis run was cancelled")]
    Cancelled,
}

impl SummarizeError {
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, SummarizeError::Cancelled)
    }
}

// ----------------------------------------------------------------------------
// Result Type Aliases
// ----------------------------------------------------------------------------

/// Standard result type for engine operations
pub type ConvoResult<T> = Result<T, ConvoError>;

/// Result type for ingestion
pub type IngestResult<T> = Result<T, IngestError>;

/// Result type for queries
pub type QueryResult<T> = Result<T, QueryError>;

/// Result type for scheduled tasks
pub type SchedulerResult<T> = Result<T, SchedulerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categories_and_hints() {
        let err: ConvoError = QueryError::NotLoaded.into();
        assert_eq!(err.category(), "query");
        assert_eq!(err.recovery_hint(), RecoveryHint::ReloadDataset);
        assert!(!err.is_recoverable());

        let err: ConvoError = ConfigError::invalid_value("scheduler.requests_per_minute", "zero").into();
        assert_eq!(err.recovery_hint(), RecoveryHint::FixConfiguration);
        assert!(err.to_string().contains("scheduler.requests_per_minute"));
    }

    #[test]
    fn test_inference_hints() {
        assert_eq!(
            InferenceError::format("not json").recovery_hint(),
            RecoveryHint::Skip
        );
        assert_eq!(
            InferenceError::Http { status: 503, message: "busy".into() }.recovery_hint(),
            RecoveryHint::RetryWithBackoff
        );
        assert!(!InferenceError::Scheduler(SchedulerError::Cancelled).is_recoverable());
    }
}
