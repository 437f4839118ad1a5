// ============================================================================
// CONVOLENS CLI
// ============================================================================

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result as AnyhowResult};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use convolens::constants::ENGINE_FULL_NAME;
use convolens::logging::init_logging;
use convolens::{
    Engine, EngineConfig, FieldFilter, FilterSpec, HttpInferenceClient, PageSpec, Prompts,
    SortSpec, ENGINE_VERSION,
};

// ----------------------------------------------------------------------------
// CLI Argument Parser
// ----------------------------------------------------------------------------

/// Convolens CLI
#[derive(Parser, Debug)]
#[command(
    name = "convolens",
    version,
    about = "Index, query and summarize conversation exports",
    long_about = "Convolens loads a delimited export of timestamped conversation \
                  records into an in-memory index, answers filter/sort/page and \
                  concurrency queries against it, and runs rate-limited per-row \
                  inference followed by a map-reduce summary."
)]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "convolens.toml", env = "CONVOLENS_CONFIG")]
    pub config: PathBuf,

    /// Log level override
    #[arg(short, long, env = "CONVOLENS_LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Enable debug mode
    #[arg(short, long, env = "CONVOLENS_DEBUG")]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Load a dataset and print its field catalog and summary
    Ingest {
        /// Delimited input file
        file: PathBuf,
    },

    /// Filter, sort and page a dataset
    Query {
        file: PathBuf,

        #[command(flatten)]
        filter: FilterArgs,

        /// Sort key
        #[arg(long)]
        sort: Option<String>,

        /// Sort descending
        #[arg(long, requires = "sort")]
        desc: bool,

        /// One-based page number
        #[arg(long, default_value_t = 1)]
        page: usize,

        #[arg(long)]
        page_size: Option<usize>,
    },

    /// Daily volume, handle time, containment and concurrency
    Analyze {
        file: PathBuf,

        #[command(flatten)]
        filter: FilterArgs,
    },

    /// Write the filtered rows as delimited text
    Export {
        file: PathBuf,

        #[command(flatten)]
        filter: FilterArgs,

        /// Output path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Per-row inference and map-reduce summary of the filtered rows
    Summarize {
        file: PathBuf,

        #[command(flatten)]
        filter: FilterArgs,

        /// Maximum number of rows to send
        #[arg(long, default_value_t = 100)]
        limit: usize,
    },

    /// Validate configuration file
    Validate {
        /// Show full parsed configuration
        #[arg(short, long)]
        verbose: bool,
    },

    /// Generate default configuration file
    GenerateConfig {
        /// Output path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show version and build info
    Version,
}

#[derive(Args, Debug, Default)]
pub struct FilterArgs {
    /// Exact match, `field=value`; repeat a field to match any of its values
    #[arg(long = "filter", value_name = "FIELD=VALUE")]
    pub values: Vec<String>,

    /// Case-insensitive substring match, `field=needle`
    #[arg(long = "contains", value_name = "FIELD=NEEDLE")]
    pub contains: Vec<String>,

    /// Earliest start time (inclusive)
    #[arg(long)]
    pub from: Option<String>,

    /// Latest start time (inclusive; a bare date covers the whole day)
    #[arg(long)]
    pub to: Option<String>,
}

impl FilterArgs {
    fn to_spec(&self, date_field: &str) -> AnyhowResult<FilterSpec> {
        let mut values: std::collections::BTreeMap<String, Vec<String>> = Default::default();
        for raw in &self.values {
            let (field, value) = split_pair(raw)?;
            values.entry(field.to_string()).or_default().push(value.to_string());
        }

        let mut spec = FilterSpec::new();
        for (field, options) in values {
            spec.insert(field, FieldFilter::values(options));
        }
        for raw in &self.contains {
            let (field, needle) = split_pair(raw)?;
            spec.insert(field, FieldFilter::contains(needle));
        }
        if self.from.is_some() || self.to.is_some() {
            spec.insert(
                date_field,
                FieldFilter::date_range_from_strs(self.from.as_deref(), self.to.as_deref())?,
            );
        }
        Ok(spec)
    }
}

fn split_pair(raw: &str) -> AnyhowResult<(&str, &str)> {
    match raw.split_once('=') {
        Some((field, value)) if !field.trim().is_empty() => Ok((field.trim(), value)),
        _ => bail!("expected FIELD=VALUE, got '{}'", raw),
    }
}

// ----------------------------------------------------------------------------
// Subcommand Handlers
// ----------------------------------------------------------------------------

fn print_json<T: Serialize>(value: &T) -> AnyhowResult<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn handle_validate(config_path: &Path, verbose: bool) -> AnyhowResult<()> {
    println!("Validating configuration file: {}", config_path.display());
    let config = EngineConfig::load(config_path)
        .with_context(|| format!("Invalid configuration in {}", config_path.display()))?;
    println!("Configuration is valid");

    if verbose {
        println!("{}", toml::to_string_pretty(&config)?);
    }
    println!("  requests per minute: {}", config.scheduler.requests_per_minute);
    println!("  batch size: {}", config.summarizer.batch_size);
    println!("  discrete value limit: {}", config.schema.discrete_value_limit);
    println!("  inference endpoint: {}", config.inference.endpoint);
    Ok(())
}

fn handle_generate_config(output: Option<&Path>) -> AnyhowResult<()> {
    let config_str = EngineConfig::generate_default_config();
    match output {
        Some(path) => {
            fs::write(path, &config_str)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            println!("Default configuration written to: {}", path.display());
        }
        None => println!("{}", config_str),
    }
    Ok(())
}

fn handle_version() {
    println!("{} v{}", ENGINE_FULL_NAME, ENGINE_VERSION);
    println!();
    println!("Build Information:");
    println!("  Target: {}", std::env::consts::ARCH);
    println!("  OS: {}", std::env::consts::OS);
}

fn load_engine(config: EngineConfig, file: &Path) -> AnyhowResult<Engine> {
    let engine = Engine::new(config)?;
    let report = engine
        .load_path(file)
        .with_context(|| format!("Failed to ingest {}", file.display()))?;
    info!(
        target: "convolens::cli",
        rows = report.total_rows,
        skipped = report.skipped_records,
        "Loaded {}",
        file.display()
    );
    Ok(engine)
}

async fn handle_summarize(engine: Engine, filter: FilterSpec, limit: usize) -> AnyhowResult<()> {
    let mut rows = engine.filter_rows(&filter)?.into_vec();
    rows.truncate(limit);
    if rows.is_empty() {
        bail!("No rows match the filter");
    }
    let rows = engine.fetch_full_rows(&rows)?;

    let client = Arc::new(HttpInferenceClient::new(&engine.config().inference)?);
    let cancel = CancellationToken::new();
    let run = engine.analysis_run(client, Prompts::default(), cancel.clone())?;

    let watcher = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!(target: "convolens::cli", "Interrupt received, cancelling analysis run");
            cancel.cancel();
        }
    });

    info!(target: "convolens::cli", rows = rows.len(), "Starting analysis run");
    let result = run.run(rows).await;
    watcher.abort();

    let summary = result?;
    info!(target: "convolens::cli", stats = ?run.stats(), "Analysis run finished");
    print_json(&summary)
}

// ----------------------------------------------------------------------------
// Main Entry Point
// ----------------------------------------------------------------------------

#[tokio::main]
async fn main() -> AnyhowResult<()> {
    let cli = Cli::parse();

    match &cli.command {
        Commands::Version => {
            handle_version();
            return Ok(());
        }
        Commands::GenerateConfig { output } => return handle_generate_config(output.as_deref()),
        Commands::Validate { verbose } => return handle_validate(&cli.config, *verbose),
        _ => {}
    }

    let config_exists = cli.config.exists();
    let config = if config_exists {
        EngineConfig::load(&cli.config)
            .with_context(|| format!("Failed to load config from {}", cli.config.display()))?
    } else {
        EngineConfig::default()
    };

    let mut logging_config = config.logging.clone();
    if let Some(level) = &cli.log_level {
        logging_config.level = level.clone();
    }
    if cli.debug {
        logging_config.level = "debug".into();
    }
    init_logging(&logging_config)?;
    if !config_exists {
        warn!(target: "convolens::cli", "Config file not found at {}, using defaults", cli.config.display());
    }
    info!(target: "convolens::cli", "{} v{}", ENGINE_FULL_NAME, ENGINE_VERSION);

    let date_field = config.schema.start_field.clone();
    match cli.command {
        Commands::Ingest { file } => {
            let engine = Engine::new(config)?;
            let report = engine
                .load_path(&file)
                .with_context(|| format!("Failed to ingest {}", file.display()))?;
            print_json(&report)?;
        }
        Commands::Query {
            file,
            filter,
            sort,
            desc,
            page,
            page_size,
        } => {
            let page_size = page_size.unwrap_or(config.query.default_page_size);
            let spec = filter.to_spec(&date_field)?;
            let engine = load_engine(config, &file)?;
            let sort = sort.map(|key| {
                if desc {
                    SortSpec::descending(key)
                } else {
                    SortSpec::ascending(key)
                }
            });
            let result = engine.query_page(&spec, sort.as_ref(), PageSpec::new(page, page_size))?;
            print_json(&result)?;
        }
        Commands::Analyze { file, filter } => {
            let spec = filter.to_spec(&date_field)?;
            let engine = load_engine(config, &file)?;
            print_json(&engine.analyze(&spec)?)?;
        }
        Commands::Export {
            file,
            filter,
            output,
        } => {
            let spec = filter.to_spec(&date_field)?;
            let engine = load_engine(config, &file)?;
            let rows = engine.filter_rows(&spec)?;
            let blob = engine.export_rows(rows.as_slice())?;
            match output {
                Some(path) => {
                    fs::write(&path, blob)
                        .with_context(|| format!("Failed to write {}", path.display()))?;
                    info!(target: "convolens::cli", rows = rows.len(), "Exported to {}", path.display());
                }
                None => print!("{}", blob),
            }
        }
        Commands::Summarize {
            file,
            filter,
            limit,
        } => {
            let spec = filter.to_spec(&date_field)?;
            let engine = load_engine(config, &file)?;
            handle_summarize(engine, spec, limit).await?;
        }
        Commands::Validate { .. } | Commands::GenerateConfig { .. } | Commands::Version => {}
    }

    Ok(())
}
