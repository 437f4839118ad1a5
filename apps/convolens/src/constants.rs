// ============================================================================
// CONSTANTS & VERSION INFORMATION
// ============================================================================
// Limits and defaults shared across the engine. Anything a deployment may want
// to change is also exposed through `EngineConfig`; these are the fallbacks.
// ============================================================================

/// Engine version - follows semantic versioning
pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");
pub const ENGINE_FULL_NAME: &str = "Convolens Conversation Engine";

// ----------------------------------------------------------------------------
// Ingestion & Catalog
// ----------------------------------------------------------------------------

/// Fields with at most this many distinct non-empty values become discrete filters
pub const DEFAULT_DISCRETE_VALUE_LIMIT: usize = 200;

/// Separator between `key=value` pairs inside the packed metrics field
pub const DEFAULT_PAIR_DELIMITER: &str = "||";

/// Separator between a key and its value inside one packed pair
pub const DEFAULT_KV_DELIMITER: &str = "=";

/// Appended to a custom metric key that collides with a standard or input field
pub const DEFAULT_COLLISION_SUFFIX: &str = "_custom";

/// Bucket used by the daily breakdown when a dimension value is missing
pub const UNKNOWN_DIMENSION: &str = "unknown";

/// Warn when a single ingestion pass takes longer than this (milliseconds)
pub const INGEST_SLOW_THRESHOLD_MS: u64 = 5_000;

// ----------------------------------------------------------------------------
// Query
// ----------------------------------------------------------------------------

/// Default page size for interactive queries
pub const DEFAULT_PAGE_SIZE: usize = 50;

/// Upper bound accepted for a single page
pub const MAX_PAGE_SIZE: usize = 10_000;

/// Warn when a single query takes longer than this (milliseconds)
pub const QUERY_SLOW_THRESHOLD_MS: u64 = 250;

// ----------------------------------------------------------------------------
// Scheduler & Inference
// ----------------------------------------------------------------------------

/// Default external request budget per minute
pub const DEFAULT_REQUESTS_PER_MINUTE: u32 = 60;

/// Hard ceiling on simultaneous in-flight inference calls
pub const MAX_CONCURRENT_REQUESTS: usize = 50;

/// Default number of row insights consolidated by one intermediate reduce call
pub const DEFAULT_BATCH_SIZE: usize = 25;

/// Default JSON pointer used to pull the completion text out of a response body
pub const DEFAULT_RESPONSE_POINTER: &str = "/choices/0/text";
