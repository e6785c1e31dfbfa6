//! geoq CLI: produce, work, collect, reconcile.

use clap::{Parser, Subcommand};
use geoq::broker::Broker;
use geoq::collector::{Collector, CollectorConfig};
use geoq::config::Config;
use geoq::db::Db;
use geoq::geocode::GoogleGeocoder;
use geoq::producer::enqueue_jobs;
use geoq::reconcile::reconcile_files;
use geoq::record::RecordWriter;
use geoq::seed::load_seed;
use geoq::telemetry::{TelemetryConfig, init_telemetry};
use geoq::worker::{WorkerConfig, WorkerPool};
use secrecy::{ExposeSecret, SecretString};
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "geoq", about = "Geocode postal codes through a durable work queue")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    #[command(flatten)]
    Broker(BrokerCommand),
    /// Write the seed keys that have no found result
    Reconcile {
        #[arg(long)]
        seed: PathBuf,
        #[arg(long, default_value = "results.jsonl")]
        record: PathBuf,
        /// Output JSON array, usable as a new seed
        #[arg(long, default_value = "lost.json")]
        out: PathBuf,
    },
}

/// Commands that need the queue broker.
#[derive(Subcommand)]
enum BrokerCommand {
    /// Publish every key in a seed file to the todo queue
    Produce {
        /// JSON array of job keys
        #[arg(long)]
        seed: PathBuf,
    },
    /// Run geocoding workers against the todo queue
    Work {
        /// Independent workers to run in this process
        #[arg(long, default_value_t = 1)]
        instances: usize,
        /// Exit once the todo queue is empty
        #[arg(long)]
        drain: bool,
        /// Override PACING_MS
        #[arg(long)]
        pacing_ms: Option<u64>,
    },
    /// Append results from the done queue to the record file
    Collect {
        /// JSON-lines record file
        #[arg(long, default_value = "results.jsonl")]
        record: PathBuf,
        /// Exit once the done queue is empty
        #[arg(long)]
        drain: bool,
    },
    /// Show queue depths
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    match cli.command {
        Command::Reconcile { seed, record, out } => {
            let log_level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
            let _telemetry = init_telemetry(TelemetryConfig::local(log_level))?;
            let report = reconcile_files(&seed, &record, &out).await?;
            println!(
                "{} of {} keys found, {} lost -> {}",
                report.found,
                report.total,
                report.lost.len(),
                out.display()
            );
            Ok(())
        }
        Command::Broker(command) => {
            let config = Config::from_env()?;
            let _telemetry = init_telemetry(TelemetryConfig::from_config(&config))?;
            with_broker(&config, |db| run(command, &config, db)).await
        }
    }
}

/// Open the broker, run `f`, and close the pool whatever `f` returned.
async fn with_broker<F, Fut>(config: &Config, f: F) -> anyhow::Result<()>
where
    F: FnOnce(Arc<Db>) -> Fut,
    Fut: Future<Output = anyhow::Result<()>>,
{
    let db = Arc::new(Db::open(config).await?);
    let result = f(Arc::clone(&db)).await;
    db.close().await;
    result
}

fn shutdown_on_ctrl_c() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, finishing current message");
            let _ = tx.send(true);
        }
    });
    rx
}

async fn run(command: BrokerCommand, config: &Config, db: Arc<Db>) -> anyhow::Result<()> {
    match command {
        BrokerCommand::Produce { seed } => {
            let keys = load_seed(&seed).await?;
            let sent = enqueue_jobs(db.as_ref(), &config.todo_queue, &keys).await?;
            println!("enqueued {sent} job(s) on {}", config.todo_queue);
        }
        BrokerCommand::Work {
            instances,
            drain,
            pacing_ms,
        } => {
            if config.lookup_timeout.as_secs() >= config.visibility_timeout_secs.max(0) as u64 {
                warn!(
                    lookup_timeout = ?config.lookup_timeout,
                    visibility_timeout = config.visibility_timeout_secs,
                    "lookup timeout reaches the visibility timeout; slow jobs may be redelivered"
                );
            }
            let geocoder = GoogleGeocoder::new(
                SecretString::from(config.require_api_key()?.expose_secret().to_owned()),
                config.geocode_url.clone(),
                config.lookup_timeout,
            )?;
            let mut worker_config = WorkerConfig::from_config(config);
            worker_config.drain = drain;
            if let Some(ms) = pacing_ms {
                worker_config.pacing = Duration::from_millis(ms);
            }

            let pool = WorkerPool::new(db, Arc::new(geocoder), worker_config, instances);
            let summary = pool.run(shutdown_on_ctrl_c()).await?;
            println!(
                "processed {} job(s): {} found, {} failed, {} poisoned",
                summary.processed, summary.found, summary.failed, summary.poisoned
            );
        }
        BrokerCommand::Collect { record, drain } => {
            let writer = RecordWriter::open(&record).await?;
            let mut collector_config = CollectorConfig::from_config(config);
            collector_config.drain = drain;

            let mut collector = Collector::new(db, writer, collector_config);
            let summary = collector.run(shutdown_on_ctrl_c()).await?;
            println!(
                "appended {} result(s) to {}, {} poisoned",
                summary.appended,
                record.display(),
                summary.poisoned
            );
        }
        BrokerCommand::Status => {
            db.health_check().await?;
            for queue in [&config.todo_queue, &config.done_queue] {
                println!("{:<20}  {}", queue, db.queue_length(queue).await?);
            }
        }
    }
    Ok(())
}
