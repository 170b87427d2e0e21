//! harnesslog CLI
//!
//! Publish into, inspect, and maintain a harness log store.

use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand};
use harnesslog::model::level;
use harnesslog::view::{channel_listener, FilterState, ViewEvent};
use harnesslog::{Config, LogEngine, LogRecord, SeverityBucket};
use tracing_subscriber::{fmt, EnvFilter};

/// harnesslog
#[derive(Parser, Debug)]
#[command(name = "harnesslog")]
#[command(about = "Diagnostic log store for the test harness")]
#[command(version)]
struct Args {
    /// Main log file
    #[arg(short, long, default_value = "./harness.log")]
    log: PathBuf,

    /// Records per page
    #[arg(long, default_value = "1000")]
    page_size: usize,

    /// Poll interval in milliseconds
    #[arg(long, default_value = "300")]
    poll_ms: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Append one record
    Publish {
        /// Logger name
        #[arg(short = 'n', long)]
        logger: String,

        /// Level name (SEVERE, WARNING, INFO, CONFIG, FINE, ...) or number
        #[arg(short = 'L', long, default_value = "INFO")]
        level: String,

        /// Message text
        message: String,
    },

    /// Print records, optionally filtered
    Dump {
        /// Keep only records whose header or message contains this text
        #[arg(short, long)]
        grep: Option<String>,

        /// Hide a logger (short name); repeatable
        #[arg(long)]
        hide: Vec<String>,

        /// Hide a severity bucket (debug, monitoring, warning, critical); repeatable
        #[arg(long)]
        hide_bucket: Vec<String>,

        /// Keep printing new records as they arrive
        #[arg(short, long)]
        follow: bool,

        /// Give up waiting for the initial catch-up after this many milliseconds
        #[arg(long, default_value = "10000")]
        timeout_ms: u64,
    },

    /// Truncate the log and both indexes
    Erase,

    /// Move the log and indexes to their `~` backups
    Backup,

    /// Print sizes and counts
    Stat,
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,harnesslog=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    tracing::debug!("harnesslog v{}", harnesslog::VERSION);
    tracing::debug!("Log file: {}", args.log.display());

    let autostart = matches!(args.command, Commands::Dump { .. } | Commands::Stat);
    let config = Config::builder()
        .log_path(&args.log)
        .page_size(args.page_size)
        .poll_interval_ms(args.poll_ms)
        .autostart(autostart)
        .build();

    let engine = match LogEngine::open(config) {
        Ok(e) => e,
        Err(e) => {
            tracing::error!("Failed to open log store: {}", e);
            std::process::exit(1);
        }
    };

    let result = match args.command {
        Commands::Publish {
            logger,
            level,
            message,
        } => publish(&engine, &logger, &level, &message),
        Commands::Dump {
            grep,
            hide,
            hide_bucket,
            follow,
            timeout_ms,
        } => dump(&engine, grep, &hide, &hide_bucket, follow, timeout_ms),
        Commands::Erase => engine.erase().map_err(|e| e.to_string()),
        Commands::Backup => match engine.backup() {
            Ok(moved) => {
                println!("backup {}", if moved { "done" } else { "incomplete" });
                Ok(())
            }
            Err(e) => Err(e.to_string()),
        },
        Commands::Stat => stat(&engine, Duration::from_secs(10)),
    };

    if let Err(e) = result {
        tracing::error!("{}", e);
        std::process::exit(1);
    }

    if let Err(e) = engine.close() {
        tracing::error!("Failed to close log store: {}", e);
        std::process::exit(1);
    }
}

fn publish(engine: &LogEngine, logger: &str, level_name: &str, message: &str) -> Result<(), String> {
    let severity = level::parse(level_name).ok_or_else(|| format!("unknown level: {}", level_name))?;
    engine
        .write(severity, harnesslog::store::now_millis(), logger, message)
        .map(|_| ())
        .map_err(|e| e.to_string())
}

fn dump(
    engine: &LogEngine,
    grep: Option<String>,
    hide: &[String],
    hide_bucket: &[String],
    follow: bool,
    timeout_ms: u64,
) -> Result<(), String> {
    // Wait for the replay before building the predicate so every logger is known
    wait_stable(|| engine.tail().is_stable(), Duration::from_millis(timeout_ms));

    let mut state = FilterState::new();
    for name in engine.tail().loggers() {
        state.register_logger(&name);
    }
    for name in hide {
        state.set_logger_enabled(name, false);
    }
    for label in hide_bucket {
        let bucket = parse_bucket(label).ok_or_else(|| format!("unknown bucket: {}", label))?;
        state.set_bucket_enabled(bucket, false);
    }
    if let Some(term) = grep {
        state.set_term(&term);
    }

    let (listener, events) = channel_listener();
    engine.filter().add_listener(listener);
    engine.apply_filter(state).map_err(|e| e.to_string())?;

    wait_stable(|| engine.filter().is_stable(), Duration::from_millis(timeout_ms));

    let mut printed = 0;
    printed = print_range(engine, printed, engine.filter().len());

    if !follow {
        return Ok(());
    }

    for event in events.iter() {
        match event {
            ViewEvent::NewPage { end, .. } if end > printed => {
                printed = print_range(engine, printed, end);
            }
            ViewEvent::RemoveAllLoggers => {
                println!("-- log erased --");
                printed = 0;
            }
            _ => {}
        }
    }
    Ok(())
}

fn stat(engine: &LogEngine, timeout: Duration) -> Result<(), String> {
    wait_stable(|| engine.tail().is_stable(), timeout);

    let store = engine.store();
    println!("log:        {}", store.log_path().display());
    println!("bytes:      {}", store.main_len());
    println!("records:    {}", engine.tail().len());
    println!("loggers:    {}", engine.tail().loggers().len());
    println!("backup due: {}", store.needs_backup());
    Ok(())
}

fn print_range(engine: &LogEngine, from: usize, to: usize) -> usize {
    let records = engine.filter().records(from..to);
    for record in &records {
        print_record(engine, record);
    }
    from + records.len()
}

fn print_record(engine: &LogEngine, record: &LogRecord) {
    let tail = engine.tail();
    println!(
        "{} [{}] {}",
        tail.render_header(record),
        record.bucket(),
        tail.message(record)
    );
}

fn parse_bucket(label: &str) -> Option<SeverityBucket> {
    SeverityBucket::ALL
        .into_iter()
        .find(|b| b.label().eq_ignore_ascii_case(label.trim()))
}

fn wait_stable(is_stable: impl Fn() -> bool, timeout: Duration) {
    let deadline = Instant::now() + timeout;
    while !is_stable() && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(20));
    }
}
