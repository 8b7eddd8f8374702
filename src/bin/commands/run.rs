use super::required_arg;
use crate::error::{CliError, CliResult};
use clap::ArgMatches;
use log::{LevelFilter, debug, info, warn};
use simplelog::{Config, SimpleLogger};
use std::sync::Arc;
use std::time::Duration;
use tocsin::config::AlarmConfig;
use tocsin::event::Event;
use tocsin::metrics;
use tocsin::notify::CommandInvoker;
use tocsin::service::AlarmService;
use tocsin::shutdown::Shutdown;
use tocsin::store::MemoryMirror;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};

const METRICS_LOG_INTERVAL: Duration = Duration::from_secs(60);

fn init_logging(level: &str) {
    let filter = level.parse::<LevelFilter>().unwrap_or(LevelFilter::Info);
    if SimpleLogger::init(filter, Config::default()).is_err() {
        eprintln!("Logger already initialized");
    }
}

/// Feeds JSON-lines events into the service until EOF or a stop request.
async fn ingest(
    service: &AlarmService,
    source: Box<dyn AsyncRead + Unpin + Send>,
    shutdown: Shutdown,
) -> CliResult<usize> {
    let mut lines = BufReader::new(source).lines();
    let mut accepted = 0;
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = shutdown.wait() => break,
        };
        let line = match line {
            Some(line) => line,
            None => break,
        };
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<Event>(&line) {
            Ok(event) => {
                service.receive(vec![event]);
                accepted += 1;
            }
            Err(e) => warn!("Skipping malformed event line: {}", e),
        }
    }
    Ok(accepted)
}

pub async fn handle_run_command(matches: &ArgMatches) -> CliResult<()> {
    let path = required_arg(matches, "config")?;
    let config = AlarmConfig::load(path)?;
    init_logging(&config.logging.level);

    let service = AlarmService::new(
        config,
        Arc::new(MemoryMirror::new()),
        Arc::new(CommandInvoker::new()),
    )?;
    let shutdown = service.shutdown_handle();
    shutdown
        .initialize_signal_handlers()
        .await
        .map_err(|e| CliError::IoError(std::io::Error::other(e.to_string())))?;
    service.start()?;

    let metrics_shutdown = shutdown.clone();
    tokio::spawn(async move {
        while metrics_shutdown.sleep(METRICS_LOG_INTERVAL).await {
            debug!("Metrics:\n{}", metrics::gather_text());
        }
    });

    let source: Box<dyn AsyncRead + Unpin + Send> = match matches.value_of("events") {
        Some(events) => Box::new(tokio::fs::File::open(events).await?),
        None => Box::new(tokio::io::stdin()),
    };
    let accepted = ingest(&service, source, shutdown.clone()).await?;
    info!("Ingested {} events, waiting for a stop signal", accepted);

    shutdown.wait().await;
    service.shutdown().await?;
    println!("✅ Stopped");
    Ok(())
}
