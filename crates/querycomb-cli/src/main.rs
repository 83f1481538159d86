use std::io;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use log::{debug, error, info, warn};
use querycomb_eval::{
    BatchSummary, Combiner, CompiledConfig, Event, JsonLinesEmitter, Reaper, TaggedRecord,
    TimeFormatter, event_time_or_now, open_store,
};
use querycomb_parser::{parse_condition, parse_time_format};
use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::time::Instant;

/// Tag attached to records read from stdin.
const INPUT_TAG: &str = "stdin";

#[derive(Parser)]
#[command(name = "querycomb")]
#[command(about = "Correlate event records into combined session records")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse a slot condition and print its AST and referenced fields
    Condition {
        /// The condition expression to parse
        expr: String,
    },

    /// Check a time format expression and render a timestamp with it
    TimeFormat {
        /// The time format expression, e.g. `iso8601($time)`
        expr: String,

        /// Epoch seconds to render (defaults to now)
        #[arg(long)]
        at: Option<i64>,
    },

    /// Load and compile a combiner configuration, then print a summary
    Validate {
        /// Path to a YAML configuration file
        path: PathBuf,
    },

    /// Combine NDJSON records read from stdin
    ///
    /// Records are buffered and handed to the combiner every
    /// `flush_interval` seconds and at end of input. Combined records are
    /// written to stdout as JSON lines.
    Run {
        /// Path to a YAML configuration file
        #[arg(short, long)]
        config: PathBuf,

        /// Pretty-print JSON output
        #[arg(short, long)]
        pretty: bool,
    },
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Condition { expr } => cmd_condition(expr),
        Commands::TimeFormat { expr, at } => cmd_time_format(expr, at),
        Commands::Validate { path } => cmd_validate(path),
        Commands::Run { config, pretty } => cmd_run(config, pretty),
    }
}

// ---------------------------------------------------------------------------
// Subcommand implementations
// ---------------------------------------------------------------------------

fn cmd_condition(expr: String) {
    match parse_condition(&expr) {
        Ok(ast) => {
            let fields = ast.fields();
            print_json(&json!({ "ast": ast, "fields": fields }), true);
        }
        Err(e) => {
            eprintln!("Condition parse error: {e}");
            process::exit(1);
        }
    }
}

fn cmd_time_format(expr: String, at: Option<i64>) {
    let format = match parse_time_format(&expr) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("Time format parse error: {e}");
            process::exit(1);
        }
    };
    let formatter = match TimeFormatter::new(format) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    };
    let at = at.unwrap_or_else(|| chrono::Utc::now().timestamp());
    print_json(&formatter.format(at), false);
}

fn cmd_validate(path: PathBuf) {
    let config = load_config(&path);

    println!("Configuration {} is valid", path.display());
    println!("  Identify:        {}", config.key_extractor.fields().join(", "));
    for slot in &config.slots {
        println!("  {:<16} {}", format!("{}:", slot.kind), slot.condition.source());
    }
    println!("  TTL:             {}s", config.ttl_secs);
    println!("  Buffer size:     {}", config.buffer_size);
    println!("  Continuous dump: {}", config.continuous_dump);
    println!("  Time format:     {}", config.formatter.time_format());
    println!("  Tag:             {}", config.tag);
    println!("  Store:           {:?}", config.store.backend);
}

fn cmd_run(path: PathBuf, pretty: bool) {
    let config = Arc::new(load_config(&path));

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Error starting runtime: {e}");
            process::exit(1);
        }
    };

    let totals = runtime.block_on(run(config, pretty));
    eprintln!(
        "Processed {} records, {} combined records emitted.",
        totals.records, totals.emitted
    );
}

// ---------------------------------------------------------------------------
// Ingestion loop
// ---------------------------------------------------------------------------

async fn run(config: Arc<CompiledConfig>, pretty: bool) -> BatchSummary {
    let store = match open_store(&config.store) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error opening store: {e}");
            process::exit(1);
        }
    };

    let emitter = Arc::new(JsonLinesEmitter::new(io::stdout(), pretty));
    let combiner = Arc::new(Combiner::new(config.clone(), store.clone(), emitter));
    let reaper = Reaper::new(config.clone(), store).spawn();

    let period = config.flush_interval;
    let mut flush = tokio::time::interval_at(Instant::now() + period, period);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let mut batch = Vec::new();
    let mut totals = BatchSummary::default();
    let mut line_num = 0u64;

    loop {
        tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    line_num += 1;
                    if let Some(record) = parse_line(&line, line_num, &config) {
                        batch.push(record);
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    eprintln!("Error reading stdin: {e}");
                    break;
                }
            },
            _ = flush.tick() => {
                flush_batch(&combiner, &mut batch, &mut totals).await;
            }
            _ = &mut ctrl_c => {
                info!("interrupted, flushing remaining records");
                break;
            }
        }
    }

    flush_batch(&combiner, &mut batch, &mut totals).await;
    reaper.shutdown().await;
    totals
}

fn parse_line(line: &str, line_num: u64, config: &CompiledConfig) -> Option<TaggedRecord> {
    if line.trim().is_empty() {
        return None;
    }
    match serde_json::from_str::<Value>(line) {
        Ok(Value::Object(record)) => {
            let time = event_time_or_now(&Event::new(&record), &config.timestamp_fields);
            Some(TaggedRecord {
                tag: INPUT_TAG.to_string(),
                time,
                record,
            })
        }
        Ok(_) => {
            warn!("line {line_num}: not a JSON object, skipped");
            None
        }
        Err(e) => {
            warn!("line {line_num}: invalid JSON, skipped: {e}");
            None
        }
    }
}

/// Hand the buffered records to the combiner. A failed batch is dropped.
async fn flush_batch(
    combiner: &Arc<Combiner>,
    batch: &mut Vec<TaggedRecord>,
    totals: &mut BatchSummary,
) {
    if batch.is_empty() {
        return;
    }
    let records = std::mem::take(batch);
    let count = records.len();
    let worker = Arc::clone(combiner);

    match tokio::task::spawn_blocking(move || worker.process_batch(records)).await {
        Ok(Ok(summary)) => {
            debug!(
                "batch of {count}: {} caught, {} emitted, {} released",
                summary.caught, summary.emitted, summary.released
            );
            totals.merge(&summary);
        }
        Ok(Err(e)) => error!("batch of {count} failed: {e}"),
        Err(e) => error!("batch of {count} panicked: {e}"),
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn load_config(path: &std::path::Path) -> CompiledConfig {
    match CompiledConfig::from_file(path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading configuration {}: {e}", path.display());
            process::exit(1);
        }
    }
}

fn print_json(value: &impl serde::Serialize, pretty: bool) {
    let json = if pretty {
        serde_json::to_string_pretty(value)
    } else {
        serde_json::to_string(value)
    };
    match json {
        Ok(j) => println!("{j}"),
        Err(e) => {
            eprintln!("JSON serialization error: {e}");
            process::exit(1);
        }
    }
}
