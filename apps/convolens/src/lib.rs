//! # Convolens - Conversation Dataset Engine
//!
//! Loads a delimited export of timestamped conversation events into an
//! in-memory inverted index and answers interactive queries against it, and
//! drives rate-limited per-row inference followed by a map-reduce summary.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────────┐
//! │  CSV STREAM → RECORD STORE + INDEX → FILTER → SORT/PAGE → ROWS + STATISTICS │
//! │                                   └→ SWEEP-LINE / DAILY ANALYSIS            │
//! │  SELECTED ROWS → SCHEDULER → ROW INSIGHTS → BATCH REDUCE → FINAL SUMMARY    │
//! └─────────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The two halves share no mutable state. The record store is immutable once
//! ingestion finishes, so every query is a pure function of `(store, request)`.
//! The scheduler is the only component with concurrent bookkeeping, and that
//! bookkeeping is owned by a single dispatch loop.

#![warn(rust_2018_idioms)]
#![warn(missing_debug_implementations)]

pub mod analysis;
pub mod config;
pub mod constants;
pub mod engine;
pub mod error;
pub mod filter;
pub mod inference;
pub mod logging;
pub mod pipeline;
pub mod query;
pub mod scheduler;
pub mod store;
pub mod summarizer;
pub mod sweep;
pub mod timestamp;

pub use analysis::{analyze, AnalysisReport};
pub use config::{
    EngineConfig, InferenceConfig, LoggingConfig, QueryConfig, SchedulerConfig, SchemaConfig,
    SummarizerConfig,
};
pub use constants::ENGINE_VERSION;
pub use engine::Engine;
pub use error::{
    ConfigError, ConvoError, ConvoResult, IngestError, InferenceError, QueryError,
    RecoveryHint, SchedulerError, SummarizeError,
};
pub use filter::{apply_filters, FieldFilter, FilterSpec, RowIdSet};
pub use inference::{HttpInferenceClient, InferenceClient, Prompts};
pub use pipeline::{AnalysisRun, RowOutcome};
pub use query::{
    export_rows, fetch_full_rows, query_page, DisplayRow, PageSpec, QueryPage, SortDirection,
    SortSpec,
};
pub use scheduler::{Scheduler, SchedulerLimits, SchedulerStats, TaskHandle};
pub use store::{FieldCatalog, FieldInfo, FilterKind, IngestReport, Record, RecordStore, RowId, StandardField};
pub use summarizer::{FinalSummary, Summarizer};
pub use sweep::{summarize, SummaryStatistics};
pub use timestamp::Timestamp;
