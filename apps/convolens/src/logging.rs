// ============================================================================
// LOGGING & TRACING
// ============================================================================
// Structured logging through `tracing`. Every subsystem logs under its own
// `convolens::<subsystem>` target so output can be filtered with RUST_LOG.
// ============================================================================

use std::str::FromStr;
use std::time::{Duration, Instant};

use tracing::level_filters::LevelFilter;
use tracing::{info, trace, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

use crate::config::LoggingConfig;
use crate::error::{ConfigError, ConvoError, ConvoResult};

/// Output formats accepted in `logging.format`
pub const LOG_FORMATS: &[&str] = &["json", "compact", "pretty"];

// ----------------------------------------------------------------------------
// Logger Initialization
// ----------------------------------------------------------------------------

/// Level name from config or the command line. `warning` is accepted as an
/// alias for `warn`.
pub fn parse_level(level: &str) -> Result<LevelFilter, ConfigError> {
    let normalized = level.trim().to_ascii_lowercase();
    let normalized = if normalized == "warning" { "warn" } else { normalized.as_str() };
    LevelFilter::from_str(normalized).map_err(|_| {
        ConfigError::invalid_value(
            "logging.level",
            format!("unknown level '{}' (trace, debug, info, warn, error, off)", level),
        )
    })
}

pub fn check_format(format: &str) -> Result<(), ConfigError> {
    if LOG_FORMATS.contains(&format) {
        Ok(())
    } else {
        Err(ConfigError::invalid_value(
            "logging.format",
            format!("unknown format '{}' (expected one of {:?})", format, LOG_FORMATS),
        ))
    }
}

/// Install the global subscriber. RUST_LOG directives override the
/// configured level. Output goes to stderr so stdout stays machine-readable.
pub fn init_logging(config: &LoggingConfig) -> ConvoResult<()> {
    let env_filter = EnvFilter::builder()
        .with_default_directive(parse_level(&config.level)?.into())
        .from_env_lossy();
    check_format(&config.format)?;

    let location = config.source_location;
    let base = fmt::layer().with_target(true).with_writer(std::io::stderr);
    let output = match config.format.as_str() {
        "json" => base
            .json()
            .with_file(location)
            .with_line_number(location)
            .boxed(),
        "compact" => base.compact().with_ansi(config.colors).boxed(),
        _ => base
            .pretty()
            .with_ansi(config.colors)
            .with_file(location)
            .with_line_number(location)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(output)
        .try_init()
        .map_err(|e| ConvoError::Internal(format!("Failed to set logger: {}", e)))?;

    info!(
        target: "convolens::init",
        level = %config.level,
        format = %config.format,
        "Logging initialized"
    );
    Ok(())
}

// ----------------------------------------------------------------------------
// Performance Timer
// ----------------------------------------------------------------------------

/// Times one named operation; `stop` warns when it ran past its budget.
#[derive(Debug)]
pub struct PerfTimer {
    operation: &'static str,
    started: Instant,
    budget: Duration,
}

impl PerfTimer {
    pub fn start(operation: &'static str, budget_ms: u64) -> Self {
        Self {
            operation,
            started: Instant::now(),
            budget: Duration::from_millis(budget_ms),
        }
    }

    /// Elapsed milliseconds, logged at warn when over budget
    pub fn stop(self) -> u64 {
        let elapsed = self.started.elapsed();
        let elapsed_ms = elapsed.as_millis() as u64;
        if elapsed > self.budget {
            warn!(
                target: "convolens::perf",
                operation = self.operation,
                elapsed_ms,
                budget_ms = self.budget.as_millis() as u64,
                "Slow operation"
            );
        } else {
            trace!(target: "convolens::perf", operation = self.operation, elapsed_ms);
        }
        elapsed_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_perf_timer_measures() {
        let timer = PerfTimer::start("test", 10_000);
        std::thread::sleep(Duration::from_millis(5));
        assert!(timer.stop() >= 5);
    }

    #[rstest]
    #[case("trace", LevelFilter::TRACE)]
    #[case("DEBUG", LevelFilter::DEBUG)]
    #[case(" info ", LevelFilter::INFO)]
    #[case("warning", LevelFilter::WARN)]
    #[case("error", LevelFilter::ERROR)]
    #[case("off", LevelFilter::OFF)]
    fn test_parse_level(#[case] raw: &str, #[case] expected: LevelFilter) {
        assert_eq!(parse_level(raw).unwrap(), expected);
    }

    #[test]
    fn test_unknown_level_and_format_rejected() {
        assert!(matches!(
            parse_level("verbose"),
            Err(ConfigError::InvalidValue { ref field, .. }) if field == "logging.level"
        ));
        assert!(check_format("compact").is_ok());
        assert!(check_format("xml").is_err());
    }

    #[test]
    fn test_init_rejects_unknown_level() {
        let config = LoggingConfig {
            level: "loud".into(),
            ..LoggingConfig::default()
        };
        assert!(matches!(init_logging(&config), Err(ConvoError::Config(_))));
    }
}
