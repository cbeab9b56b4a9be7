//! adsb-streamer: tail an ADS-B receiver log and post a notification for
//! each aircraft once its callsign and position are known.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tokio::sync::mpsc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use adsb_core::{Clock, SystemClock, Tracker};
use adsb_streamer::config::{FileConfig, Overrides, Settings};
use adsb_streamer::notification::build_sink;
use adsb_streamer::pipeline::{Pipeline, LINE_CHANNEL_CAPACITY};
use adsb_streamer::source::FileTail;
use adsb_streamer::Result;

#[derive(Parser)]
#[command(
    name = "adsb-streamer",
    version,
    about = "Stream ADS-B messages from a receiver log to a webhook"
)]
struct Cli {
    /// JSON config file [default: ./config.json when present]
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Receiver log to follow (overrides FILENAME)
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Webhook endpoint (overrides WEBHOOK_URL from the config file)
    #[arg(long, env = "WEBHOOK_URL")]
    webhook: Option<String>,

    /// strftime pattern of the date field, e.g. "%a %b %d %Y"
    #[arg(long)]
    timestamp_format: Option<String>,

    /// Leave the triggering message's own fields out of notifications
    #[arg(long)]
    no_extended: bool,

    /// Print console notifications as JSON
    #[arg(long)]
    json: bool,

    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let file = FileConfig::discover(cli.config.as_deref())?;
    let settings = Settings::resolve(
        file,
        Overrides {
            input: cli.input,
            webhook: cli.webhook,
            timestamp_format: cli.timestamp_format,
            no_extended: cli.no_extended,
            json: cli.json,
        },
    )?;

    match &settings.webhook {
        Some(url) => tracing::info!(
            host = url.host_str().unwrap_or_default(),
            "posting notifications to webhook"
        ),
        None => tracing::warn!("no valid webhook configured, printing notifications instead"),
    }

    let sink = build_sink(
        settings.webhook.clone(),
        settings.retry,
        settings.console_format,
    )?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let tracker = Tracker::new(
        settings.policy,
        settings.timestamp_format.clone(),
        clock.clone(),
    );
    let pipeline = Pipeline::new(tracker, sink, clock, settings.queue_capacity)
        .with_idle_eviction(settings.aircraft_idle);

    let (lines_tx, lines_rx) = mpsc::channel(LINE_CHANNEL_CAPACITY);
    tracing::info!(
        input = %settings.input.display(),
        timestamp_format = settings.timestamp_format.pattern(),
        "following receiver log"
    );
    let source = tokio::spawn(FileTail::new(&settings.input).run(lines_tx));
    let pipeline = tokio::spawn(pipeline.run(lines_rx));

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result?;
            tracing::info!("Received Ctrl+C, shutting down...");
            source.abort();
            Ok(())
        }
        result = pipeline => {
            let tracker = result?;
            let c = tracker.counters;
            tracing::info!(
                lines = c.lines,
                malformed = c.malformed_lines,
                positions = c.positions_resolved,
                notifications = c.notifications,
                aircraft = tracker.store().len(),
                "input closed"
            );
            Ok(())
        }
    }
}
