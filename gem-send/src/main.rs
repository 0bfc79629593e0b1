//! gem-send - Background daemon for scheduled Gem jobs
//!
//! Polls the schedule store and, for every job that is due, generates
//! content from its Gem and publishes it to the configured platforms.

use clap::Parser;
use libgemcast::config::resolve_db_path;
use libgemcast::generation::create_pipeline;
use libgemcast::logging::{LogFormat, LoggingConfig};
use libgemcast::poll::PollLoop;
use libgemcast::poster::create_dispatcher;
use libgemcast::{Config, Database, GemcastError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "gem-send")]
#[command(version)]
#[command(about = "Background daemon for scheduled Gem jobs")]
#[command(long_about = "\
gem-send - Background daemon for scheduled Gem jobs

DESCRIPTION:
    gem-send is a long-running daemon that watches the Gemcast schedule
    store and fires jobs when they are due.

    Each cycle it evaluates every active job against the current time. For
    a due job it loads the Gem, generates a caption (falling back across
    the configured Gemini models), optionally generates an image, publishes
    to the default platforms and records the run time.

    Only one cycle runs at a time; a tick that arrives while a cycle is
    still running is skipped.

USAGE:
    # Run in foreground (logs to stderr)
    gem-send

    # Poll every 30 seconds, captions only
    gem-send --poll-interval 30 --no-images

    # Run a single cycle and exit
    gem-send --once

SIGNALS:
    SIGTERM, SIGINT - Graceful shutdown (finishes the current cycle)

CONFIGURATION:
    Configuration file: ~/.config/gemcast/config.toml
    Database location: ~/.local/share/gemcast/gemcast.db

    [scheduler]
    poll_interval = 60     # seconds between cycles
    initial_delay = 5      # seconds before the first cycle
    generate_images = true

    Override with environment variables:
        GEMCAST_CONFIG      - Path to config file
        GEMCAST_DB_PATH     - Path to database file
        GEMCAST_LOG_FORMAT  - text, json or pretty
        GEMCAST_LOG_LEVEL   - Log level (default: info)

EXIT CODES:
    0 - Clean shutdown
    1 - Runtime error
    2 - Configuration error
")]
struct Cli {
    /// Poll interval in seconds (overrides config)
    #[arg(long, value_name = "SECONDS")]
    #[arg(help = "How often to check for due jobs (default: 60)")]
    poll_interval: Option<u64>,

    /// Delay before the first cycle in seconds (overrides config)
    #[arg(long, value_name = "SECONDS")]
    initial_delay: Option<u64>,

    /// Generate captions only
    #[arg(long)]
    no_images: bool,

    /// Log output format: text, json or pretty
    #[arg(long, value_name = "FORMAT")]
    log_format: Option<LogFormat>,

    /// Enable verbose logging to stderr
    #[arg(short, long)]
    #[arg(help = "Enable verbose logging (useful for debugging)")]
    verbose: bool,

    /// Run one cycle and exit
    #[arg(long)]
    once: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();

    let mut logging = LoggingConfig::from_env(cli.verbose);
    if let Some(format) = cli.log_format {
        logging.format = format;
    }
    logging.init();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(exit_code(&e));
    }
}

/// 2 for configuration problems, 1 for everything else
fn exit_code(error: &anyhow::Error) -> i32 {
    match error.downcast_ref::<GemcastError>() {
        Some(GemcastError::Config(_)) => 2,
        _ => 1,
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = Config::load()?;
    let db = Database::new(&resolve_db_path(&config.database.path)).await?;

    info!("gem-send daemon starting");

    let poll_interval = cli.poll_interval.unwrap_or(config.scheduler.poll_interval);
    if poll_interval == 0 {
        return Err(
            GemcastError::InvalidInput("--poll-interval must be at least 1".to_string()).into(),
        );
    }
    let initial_delay = cli.initial_delay.unwrap_or(config.scheduler.initial_delay);
    let want_image = config.scheduler.generate_images && !cli.no_images;
    info!("Poll interval: {}s", poll_interval);

    let pipeline = create_pipeline(&config)?;
    let dispatcher = create_dispatcher(&config);
    let store = Arc::new(db.clone());

    let poll = Arc::new(
        PollLoop::new(
            store.clone(),
            store,
            Arc::new(pipeline),
            Arc::new(dispatcher),
            config.default_platforms(),
        )
        .with_images(want_image),
    );

    if cli.once {
        poll.tick().await?;
        info!("gem-send: processed jobs once, exiting");
    } else {
        // Set up graceful shutdown
        let shutdown = Arc::new(AtomicBool::new(false));
        setup_signal_handlers(shutdown.clone())?;

        poll.run(
            Duration::from_secs(poll_interval),
            Duration::from_secs(initial_delay),
            shutdown,
        )
        .await;
    }

    db.close().await;
    info!("gem-send daemon stopped");
    Ok(())
}

/// Set up signal handlers for graceful shutdown
#[cfg(unix)]
fn setup_signal_handlers(shutdown: Arc<AtomicBool>) -> anyhow::Result<()> {
    use signal_hook::consts::{SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;

    let mut signals = Signals::new([SIGINT, SIGTERM])
        .map_err(|e| GemcastError::InvalidInput(format!("Signal setup failed: {}", e)))?;

    // Spawn thread to handle signals
    std::thread::spawn(move || {
        for sig in signals.forever() {
            match sig {
                SIGTERM | SIGINT => {
                    info!("Received shutdown signal, stopping gracefully...");
                    shutdown.store(true, Ordering::Relaxed);
                    break;
                }
                _ => {}
            }
        }
    });

    Ok(())
}

#[cfg(not(unix))]
fn setup_signal_handlers(shutdown: Arc<AtomicBool>) -> anyhow::Result<()> {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received shutdown signal, stopping gracefully...");
            shutdown.store(true, Ordering::Relaxed);
        }
    });
    Ok(())
}
