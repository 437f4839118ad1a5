// ============================================================================
// CONFIGURATION SYSTEM
// ============================================================================
// TOML file parsing with environment variable overrides (CONVOLENS_ prefix,
// `__` as the section separator), validation, and sensible defaults for every
// field so an empty file is a valid configuration.
// ============================================================================

use std::path::Path;

use figment::providers::{Env, Format, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::constants::*;
use crate::error::ConfigError;

// ----------------------------------------------------------------------------
// Main Configuration Structure
// ----------------------------------------------------------------------------

/// Root configuration for the engine
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Designated fields and parsing rules for the input dataset
    #[serde(default)]
    pub schema: SchemaConfig,

    /// Query limits
    #[serde(default)]
    pub query: QueryConfig,

    /// External call budget
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Map-reduce batching
    #[serde(default)]
    pub summarizer: SummarizerConfig,

    /// HTTP inference endpoint
    #[serde(default)]
    pub inference: InferenceConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl EngineConfig {
    /// Load configuration from file with environment overrides
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::FileNotFound {
                path: path.to_path_buf(),
            });
        }

        let figment = Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("CONVOLENS_").split("__"));

        let config: Self = figment.extract().map_err(|e| ConfigError::ParseError {
            message: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Load from string (for testing)
    pub fn from_toml_str(toml_str: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(toml_str).map_err(|e| ConfigError::ParseError {
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        crate::logging::parse_level(&self.logging.level)?;
        crate::logging::check_format(&self.logging.format)?;

        if self.scheduler.requests_per_minute == 0 {
            return Err(ConfigError::invalid_value(
                "scheduler.requests_per_minute",
                "must be at least 1",
            ));
        }

        if self.scheduler.max_concurrency == Some(0) {
            return Err(ConfigError::invalid_value(
                "scheduler.max_concurrency",
                "must be at least 1 when set",
            ));
        }

        if self.summarizer.batch_size == 0 {
            return Err(ConfigError::invalid_value(
                "summarizer.batch_size",
                "must be at least 1",
            ));
        }

        if self.schema.discrete_value_limit == 0 {
            return Err(ConfigError::invalid_value(
                "schema.discrete_value_limit",
                "must be at least 1",
            ));
        }

        if self.schema.pair_delimiter.is_empty() || self.schema.kv_delimiter.is_empty() {
            return Err(ConfigError::invalid_value(
                "schema.pair_delimiter",
                "packed metric delimiters cannot be empty",
            ));
        }

        if !self.schema.delimiter.is_ascii() {
            return Err(ConfigError::invalid_value(
                "schema.delimiter",
                "must be a single ASCII character",
            ));
        }

        if self.query.max_page_size == 0 {
            return Err(ConfigError::invalid_value(
                "query.max_page_size",
                "must be at least 1",
            ));
        }

        Ok(())
    }

    /// Create a default config file
    pub fn generate_default_config() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

// ----------------------------------------------------------------------------
// Schema Configuration
// ----------------------------------------------------------------------------

/// Which input columns play which role. All names are matched after
/// normalization (trimmed, lower-cased).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaConfig {
    /// Column delimiter of the input stream (single byte)
    #[serde(default = "default_delimiter")]
    pub delimiter: char,

    /// Conversation identifier
    #[serde(default = "default_id_field")]
    pub id_field: String,

    /// Conversation start timestamp; also the date-range filter field
    #[serde(default = "default_start_field")]
    pub start_field: String,

    /// Conversation end timestamp
    #[serde(default = "default_end_field")]
    pub end_field: String,

    /// Packed `key=value||key=value` metrics column
    #[serde(default = "default_packed_field")]
    pub packed_field: String,

    #[serde(default = "default_pair_delimiter")]
    pub pair_delimiter: String,

    #[serde(default = "default_kv_delimiter")]
    pub kv_delimiter: String,

    /// Full-text column, always offered as a free-text filter
    #[serde(default = "default_full_text_field")]
    pub full_text_field: String,

    /// Column holding the containment outcome
    #[serde(default = "default_contained_field")]
    pub contained_field: String,

    /// Values (case-insensitive) that count as contained
    #[serde(default = "default_contained_values")]
    pub contained_values: Vec<String>,

    /// First volume breakdown dimension
    #[serde(default = "default_domain_field")]
    pub domain_field: String,

    /// Second volume breakdown dimension
    #[serde(default = "default_channel_field")]
    pub channel_field: String,

    /// Maximum distinct values for a discrete filter
    #[serde(default = "default_discrete_value_limit")]
    pub discrete_value_limit: usize,

    /// Suffix appended to colliding custom metric keys
    #[serde(default = "default_collision_suffix")]
    pub collision_suffix: String,
}

impl Default for SchemaConfig {
    fn default() -> Self {
        Self {
            delimiter: default_delimiter(),
            id_field: default_id_field(),
            start_field: default_start_field(),
            end_field: default_end_field(),
            packed_field: default_packed_field(),
            pair_delimiter: default_pair_delimiter(),
            kv_delimiter: default_kv_delimiter(),
            full_text_field: default_full_text_field(),
            contained_field: default_contained_field(),
            contained_values: default_contained_values(),
            domain_field: default_domain_field(),
            channel_field: default_channel_field(),
            discrete_value_limit: default_discrete_value_limit(),
            collision_suffix: default_collision_suffix(),
        }
    }
}

impl SchemaConfig {
    /// Whether a raw containment value counts as contained
    pub fn is_contained(&self, value: &str) -> bool {
        let value = value.trim();
        self.contained_values
            .iter()
            .any(|accepted| accepted.eq_ignore_ascii_case(value))
    }
}

fn default_delimiter() -> char {
    ','
}

fn default_id_field() -> String {
    "conversation_id".to_string()
}

fn default_start_field() -> String {
    "start_time".into()
}

fn default_end_field() -> String {
    "end_time".into()
}

fn default_packed_field() -> String {
    "custom_metrics".into()
}

fn default_pair_delimiter() -> String {
    DEFAULT_PAIR_DELIMITER.into()
}

fn default_kv_delimiter() -> String {
    DEFAULT_KV_DELIMITER.into()
}

fn default_full_text_field() -> String {
    "transcript".into()
}

fn default_contained_field() -> String {
    "contained".into()
}

fn default_contained_values() -> Vec<String> {
    vec!["true".into(), "yes".into(), "1".into(), "contained".into()]
}

fn default_domain_field() -> String {
    "domain".into()
}

fn default_channel_field() -> String {
    "channel".into()
}

fn default_discrete_value_limit() -> usize {
    DEFAULT_DISCRETE_VALUE_LIMIT
}

fn default_collision_suffix() -> String {
    DEFAULT_COLLISION_SUFFIX.into()
}

// ----------------------------------------------------------------------------
// Query Configuration
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryConfig {
    #[serde(default = "default_page_size")]
    pub default_page_size: usize,

    #[serde(default = "default_max_page_size")]
    pub max_page_size: usize,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            default_page_size: default_page_size(),
            max_page_size: default_max_page_size(),
        }
    }
}

fn default_page_size() -> usize {
    DEFAULT_PAGE_SIZE
}

fn default_max_page_size() -> usize {
    MAX_PAGE_SIZE
}

// ----------------------------------------------------------------------------
// Scheduler Configuration
// ----------------------------------------------------------------------------

/// The scheduler is configured by a single request budget; spacing and the
/// concurrency cap are derived from it (see `SchedulerLimits`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_requests_per_minute")]
    pub requests_per_minute: u32,

    /// Optional tighter cap than the derived one
    #[serde(default)]
    pub max_concurrency: Option<usize>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            requests_per_minute: default_requests_per_minute(),
            max_concurrency: None,
        }
    }
}

impl SchedulerConfig {
    pub fn with_rate(requests_per_minute: u32) -> Self {
        Self {
            requests_per_minute,
            max_concurrency: None,
        }
    }
}

fn default_requests_per_minute() -> u32 {
    DEFAULT_REQUESTS_PER_MINUTE
}

// ----------------------------------------------------------------------------
// Summarizer Configuration
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummarizerConfig {
    /// Insights per intermediate reduce call
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// At or below this many usable results the batch phase is skipped.
    /// Defaults to `batch_size`.
    #[serde(default)]
    pub direct_reduce_limit: Option<usize>,
}

impl Default for SummarizerConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            direct_reduce_limit: None,
        }
    }
}

impl SummarizerConfig {
    pub fn effective_direct_limit(&self) -> usize {
        self.direct_reduce_limit.unwrap_or(self.batch_size)
    }
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

// ----------------------------------------------------------------------------
// Inference Configuration
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferenceConfig {
    /// Completion endpoint URL
    #[serde(default = "default_inference_endpoint")]
    pub endpoint: String,

    /// Model name sent with every request
    #[serde(default = "default_inference_model")]
    pub model: String,

    /// Environment variable holding the bearer token (never the token itself)
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// JSON pointer to the completion text in the response body
    #[serde(default = "default_response_pointer")]
    pub response_pointer: String,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            endpoint: default_inference_endpoint(),
            model: default_inference_model(),
            api_key_env: default_api_key_env(),
            response_pointer: default_response_pointer(),
        }
    }
}

fn default_inference_endpoint() -> String {
    "http://127.0.0.1:8000/v1/completions".into()
}

fn default_inference_model() -> String {
    "default".into()
}

fn default_api_key_env() -> String {
    "CONVOLENS_API_KEY".into()
}

fn default_response_pointer() -> String {
    DEFAULT_RESPONSE_POINTER.into()
}

// ----------------------------------------------------------------------------
// Logging Configuration
// ----------------------------------------------------------------------------

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format (json, pretty, compact)
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Enable ANSI colors
    #[serde(default = "default_true")]
    pub colors: bool,

    /// Include source location
    #[serde(default)]
    pub source_location: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            colors: true,
            source_location: false,
        }
    }
}

fn default_log_level() -> String {
    "info".into()
}

fn default_log_format() -> String {
    "pretty".into()
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn test_config_defaults() {
        let config = EngineConfig::default();

        assert_eq!(config.schema.discrete_value_limit, DEFAULT_DISCRETE_VALUE_LIMIT);
        assert_eq!(config.schema.pair_delimiter, "||");
        assert_eq!(config.scheduler.requests_per_minute, DEFAULT_REQUESTS_PER_MINUTE);
        assert_eq!(config.summarizer.effective_direct_limit(), DEFAULT_BATCH_SIZE);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_document_is_valid() {
        let config = EngineConfig::from_toml_str("").unwrap();
        assert_eq!(config.schema.start_field, "start_time");
    }

    #[test]
    fn test_partial_override() {
        let config = EngineConfig::from_toml_str(
            r#"
            [schema]
            start_field = "began_at"
            contained_values = ["Y"]

            [scheduler]
            requests_per_minute = 600
            max_concurrency = 4
            "#,
        )
        .unwrap();

        assert_eq!(config.schema.start_field, "began_at");
        assert_eq!(config.schema.end_field, "end_time");
        assert!(config.schema.is_contained(" y "));
        assert!(!config.schema.is_contained("true"));
        assert_eq!(config.scheduler.max_concurrency, Some(4));
    }

    #[test]
    fn test_zero_rate_rejected() {
        let err = EngineConfig::from_toml_str("[scheduler]\nrequests_per_minute = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref field, .. } if field == "scheduler.requests_per_minute"));
    }

    #[test]
    fn test_unknown_log_level_rejected() {
        let mut config = EngineConfig::default();
        config.logging.level = "chatty".into();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { ref field, .. }) if field == "logging.level"
        ));
    }

    #[test]
    fn test_zero_batch_rejected() {
        let err = EngineConfig::from_toml_str("[summarizer]\nbatch_size = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[query]\ndefault_page_size = 10").unwrap();

        let config = EngineConfig::load(file.path()).unwrap();
        assert_eq!(config.query.default_page_size, 10);
        assert_eq!(config.query.max_page_size, MAX_PAGE_SIZE);
    }

    #[test]
    fn test_missing_file() {
        let err = EngineConfig::load("/definitely/not/here.toml").unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound { .. }));
    }

    #[test]
    fn test_generated_config_roundtrips() {
        let text = EngineConfig::generate_default_config();
        let parsed = EngineConfig::from_toml_str(&text).unwrap();
        assert_eq!(parsed.schema.packed_field, "custom_metrics");
    }
}
