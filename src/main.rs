//! rustcrossref - Crossref REST API harvester
//!
//! Streams every record of a Crossref component to disk, riding out
//! transient network and server failures.
//!
//! ## Usage
//!
//! ```bash
//! rustcrossref fetch --cursor '*' --max-items 1000 --param filter=from-pub-date:2024
//! rustcrossref fetch --component journals --format jsonl
//! ```

use anyhow::{Context, Result};
use chrono::Local;
use clap::{Parser, Subcommand, ValueEnum};
use futures::StreamExt;
use rustcrossref::paginate::{DEFAULT_BATCH_SIZE, DEFAULT_COMPONENT};
use rustcrossref::progress::{log_progress, progress_bar};
use rustcrossref::rate_limit::DEFAULT_MAX_CALLS;
use rustcrossref::works::WorkSummary;
use rustcrossref::{
    ClientConfig, CrossrefClient, PaginateOptions, Paginator, RateLimiterConfig, Record, RetryPolicy,
};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, Level};
use tracing_subscriber::{fmt, EnvFilter};

// ============================================================================
// CLI Definition
// ============================================================================

/// Crossref REST API harvester
#[derive(Parser)]
#[command(name = "rustcrossref")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Page through a component and save every record
    Fetch {
        /// Crossref component path (e.g., "works", "members/98/works")
        #[arg(long, default_value = DEFAULT_COMPONENT)]
        component: String,

        /// Records per API call
        #[arg(long, default_value_t = DEFAULT_BATCH_SIZE)]
        batch_size: u32,

        /// Start cursor ('*' for a fresh deep-paging run); offset paging if omitted
        #[arg(long)]
        cursor: Option<String>,

        /// Stop after this many records
        #[arg(long)]
        max_items: Option<u64>,

        /// Extra query parameter, repeatable (e.g., filter=type:journal-article)
        #[arg(long = "param", value_parser = parse_key_val)]
        params: Vec<(String, String)>,

        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Jsonl)]
        format: OutputFormat,

        /// Output directory
        #[arg(short, long, default_value = "./output")]
        output: PathBuf,

        /// Contact email for Crossref's polite pool
        #[arg(long)]
        mailto: Option<String>,

        /// Maximum API calls per second
        #[arg(long, default_value_t = DEFAULT_MAX_CALLS)]
        rate_limit: u32,

        /// Per-call timeout in seconds
        #[arg(long, default_value_t = 60)]
        timeout: u64,

        /// Give up after this many consecutive failures (0 = never)
        #[arg(long, default_value_t = 10)]
        max_retries: u32,

        /// Cap on a single backoff sleep, in seconds
        #[arg(long)]
        max_delay: Option<u64>,

        /// Log progress instead of drawing a progress bar
        #[arg(long)]
        no_progress: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    /// One raw JSON record per line
    Jsonl,
    /// Flattened work summaries
    Csv,
}

impl OutputFormat {
    fn extension(self) -> &'static str {
        match self {
            Self::Jsonl => "jsonl",
            Self::Csv => "csv",
        }
    }
}

/// Parse a `key=value` pair
fn parse_key_val(s: &str) -> std::result::Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got {:?}", s))?;
    if key.is_empty() {
        return Err(format!("empty key in {:?}", s));
    }
    Ok((key.to_string(), value.to_string()))
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.debug { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.to_string()));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Fetch {
            component,
            batch_size,
            cursor,
            max_items,
            params,
            format,
            output,
            mailto,
            rate_limit,
            timeout,
            max_retries,
            max_delay,
            no_progress,
        } => {
            let mut config =
                ClientConfig::default().rate_limit(RateLimiterConfig::per_second(rate_limit));
            if let Some(mailto) = mailto {
                config = config.mailto(mailto);
            }
            let client = CrossrefClient::new(config).context("Failed to create Crossref client")?;

            let mut options = PaginateOptions::default()
                .component(component)
                .batch_size(batch_size)
                .timeout(Duration::from_secs(timeout))
                .retry(RetryPolicy {
                    max_retries: (max_retries > 0).then_some(max_retries),
                    max_delay: max_delay.map(Duration::from_secs),
                })
                .progress(if no_progress { log_progress() } else { progress_bar() });
            options.cursor = cursor;
            options.max_items = max_items;
            options.params = params;

            run_fetch(Arc::new(client), options, format, &output).await
        }
    }
}

/// Stream records into a timestamped file under `output_dir`
async fn run_fetch(
    client: Arc<CrossrefClient>,
    options: PaginateOptions,
    format: OutputFormat,
    output_dir: &Path,
) -> Result<()> {
    std::fs::create_dir_all(output_dir).context("Failed to create output directory")?;
    let path = output_dir.join(output_file_name(&options.component, format));

    info!(
        component = %options.component,
        path = %path.display(),
        "Starting Crossref fetch"
    );

    let mut sink = RecordSink::create(&path, format)?;
    let stream = Paginator::new(client).paginate(options);
    futures::pin_mut!(stream);

    let mut count = 0u64;
    while let Some(record) = stream.next().await {
        match record {
            Ok(record) => {
                sink.write(&record)?;
                count += 1;
            }
            Err(e) => {
                sink.finish()?;
                error!(error = %e, saved = count, "Fetch aborted");
                return Err(e).context(format!("Fetch aborted after {} records", count));
            }
        }
    }
    sink.finish()?;

    println!("Saved {} records to {}", count, path.display());
    Ok(())
}

/// `{component}_{timestamp}.{ext}` with path separators flattened
fn output_file_name(component: &str, format: OutputFormat) -> String {
    let timestamp = Local::now().format("%Y%m%d_%H%M%S").to_string();
    let safe_component: String = component
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect::<String>()
        .trim_matches('_')
        .to_string();
    format!("{}_{}.{}", safe_component, timestamp, format.extension())
}

/// Incremental writer for streamed records
enum RecordSink {
    Jsonl(BufWriter<File>),
    Csv(csv::Writer<File>),
}

impl RecordSink {
    fn create(path: &Path, format: OutputFormat) -> Result<Self> {
        Ok(match format {
            OutputFormat::Jsonl => {
                let file = File::create(path).context("Failed to create output file")?;
                Self::Jsonl(BufWriter::new(file))
            }
            OutputFormat::Csv => Self::Csv(
                csv::WriterBuilder::new()
                    .has_headers(true)
                    .from_path(path)
                    .context("Failed to create CSV writer")?,
            ),
        })
    }

    fn write(&mut self, record: &Record) -> Result<()> {
        match self {
            Self::Jsonl(writer) => {
                serde_json::to_writer(&mut *writer, record).context("Failed to write record")?;
                writer.write_all(b"\n").context("Failed to write record")?;
            }
            Self::Csv(writer) => {
                writer
                    .serialize(WorkSummary::from_record(record))
                    .context("Failed to write CSV record")?;
            }
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        match self {
            Self::Jsonl(writer) => writer.flush().context("Failed to flush output")?,
            Self::Csv(writer) => writer.flush().context("Failed to flush CSV")?,
        }
        Ok(())
    }
}
