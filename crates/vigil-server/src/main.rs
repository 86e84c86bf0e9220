use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use vigil_config::{ConfigManager, FileSource, Thresholds};
use vigil_ingest::{HickoryDns, HostResolver, Ingestor, TelemetryRecord};
use vigil_monitor::{MonitorPipeline, MonitorScheduler};
use vigil_monitor::scheduler::ScheduledCheck;
use vigil_notify::{AlertChannel, AlertManager, LogSink};
use vigil_store::MemoryEventStore;

#[derive(Parser, Debug)]
#[command(author, version, about = "VIGIL SOC telemetry monitor", long_about = None)]
struct Args {
    /// Threshold configuration file (toml or json)
    #[arg(short, long, default_value = "thresholds.toml")]
    config: PathBuf,

    /// NDJSON telemetry input, `-` for stdin
    #[arg(short, long, default_value = "-")]
    input: String,

    /// DNS resolution timeout in milliseconds
    #[arg(long, default_value_t = 2000)]
    dns_timeout_ms: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    info!(config = %args.config.display(), input = %args.input, "Starting VIGIL server");

    let thresholds: Arc<ConfigManager<Thresholds>> =
        Arc::new(ConfigManager::new(Arc::new(FileSource::new(&args.config))));
    let initial = thresholds
        .load()
        .await
        .with_context(|| format!("loading thresholds from {}", args.config.display()))?;
    initial.validate().context("initial threshold configuration invalid")?;
    thresholds.spawn_hot_reload()?;

    let store = Arc::new(MemoryEventStore::new());

    let alerts = Arc::new(AlertManager::default());
    alerts.register(AlertChannel::Log, Box::new(LogSink::new())).await;

    let pipeline = Arc::new(MonitorPipeline::new(
        store.clone(),
        thresholds.clone(),
        alerts,
    ));
    let (events_tx, events_rx) = mpsc::channel(256);
    pipeline.spawn_event_subscriber(events_rx);

    let mut scheduler = MonitorScheduler::new(pipeline.clone()).await?;
    for check in ScheduledCheck::defaults(&initial) {
        scheduler.add_check(check).await?;
    }
    scheduler.start().await?;

    let dns = HickoryDns::system().context("initializing system DNS resolver")?;
    let resolver = HostResolver::new(
        Arc::new(dns),
        Duration::from_millis(args.dns_timeout_ms),
    );
    let ingestor = Ingestor::new(store, thresholds, resolver).with_publisher(events_tx);

    let reader: Box<dyn AsyncBufRead + Unpin> = if args.input == "-" {
        Box::new(BufReader::new(tokio::io::stdin()))
    } else {
        let file = tokio::fs::File::open(&args.input)
            .await
            .with_context(|| format!("opening telemetry input {}", args.input))?;
        Box::new(BufReader::new(file))
    };

    let mut lines = reader.lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<TelemetryRecord>(&line) {
            Ok(record) => {
                // 入库失败的细节已在入库路径记录
                if let Err(e) = ingestor.ingest(record).await {
                    warn!(error = %e, "Telemetry rejected");
                }
            }
            Err(e) => warn!(error = %e, "Malformed telemetry line"),
        }
    }

    info!("Telemetry input exhausted, shutting down");
    scheduler.shutdown().await?;
    Ok(())
}
