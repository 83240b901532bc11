//! Occupancy worker binary.

use anyhow::Context;
use metrics_exporter_prometheus::PrometheusBuilder;
use tokio::io::{AsyncBufRead, BufReader};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use roomsense_worker::{build_aggregator, Replayer, RoomsFile, WorkerConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Colored output for dev, JSON for production
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::from_default_env().add_directive("roomsense=info".parse()?);

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false)
                    .with_writer(std::io::stderr),
            )
            .with(env_filter)
            .init();
    }

    info!("Starting roomsense-worker");

    let config = WorkerConfig::from_env()?;
    info!("Worker config: {:?}", config);

    if let Some(addr) = config.metrics_addr {
        PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .context("failed to install Prometheus exporter")?;
        info!(%addr, "Serving metrics");
    }

    let rooms = RoomsFile::load(&config.rooms_file)
        .with_context(|| format!("failed to load {}", config.rooms_file.display()))?;
    let (aggregator, stream_clock) = build_aggregator(&config, &rooms)?;

    let input: Box<dyn AsyncBufRead + Unpin + Send> = match &config.input {
        Some(path) => {
            let file = tokio::fs::File::open(path)
                .await
                .with_context(|| format!("failed to open {}", path.display()))?;
            Box::new(BufReader::new(file))
        }
        None => Box::new(BufReader::new(tokio::io::stdin())),
    };

    let stop = async {
        if tokio::signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
        info!("Received shutdown signal");
    };

    let summary = Replayer::new(&config, aggregator, stream_clock)
        .run(input, stop)
        .await?;

    info!(
        lines = summary.lines_read,
        queued = summary.detections_queued,
        skipped = summary.lines_skipped,
        "Worker shutdown complete"
    );
    println!("{}", serde_json::to_string_pretty(&summary.occupancy)?);
    Ok(())
}
