//! Result collector: drain `done` into the record file.
//!
//! One message at a time: append, sync, then ack. Duplicate keys are
//! appended as they come; deduplication is the reconciler's job.

use crate::broker::Broker;
use crate::config::{Config, DEFAULT_DONE_QUEUE};
use crate::error::Result;
use crate::model::JobResult;
use crate::record::RecordWriter;
use crate::telemetry::metrics;
use crate::worker::wait;
use opentelemetry::KeyValue;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info};

/// Configuration for the collector.
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    pub done_queue: String,
    /// Visibility timeout (seconds) for pgmq reads.
    pub visibility_timeout: i32,
    pub poll_interval: Duration,
    /// Stop once `done` has nothing visible.
    pub drain: bool,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            done_queue: DEFAULT_DONE_QUEUE.to_string(),
            visibility_timeout: 60,
            poll_interval: Duration::from_secs(1),
            drain: false,
        }
    }
}

impl CollectorConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            done_queue: config.done_queue.clone(),
            visibility_timeout: config.visibility_timeout_secs,
            poll_interval: config.poll_interval,
            drain: false,
        }
    }
}

/// Result of a single fetch attempt.
#[derive(Debug)]
pub enum Collected {
    Appended(JobResult),
    /// The message was not a single-key result and was archived.
    Poisoned { msg_id: i64 },
    Idle,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CollectSummary {
    pub appended: u64,
    pub poisoned: u64,
}

pub struct Collector<B> {
    broker: Arc<B>,
    writer: RecordWriter,
    config: CollectorConfig,
}

impl<B: Broker> Collector<B> {
    pub fn new(broker: Arc<B>, writer: RecordWriter, config: CollectorConfig) -> Self {
        Self {
            broker,
            writer,
            config,
        }
    }

    /// Move one result from `done` into the record.
    pub async fn process_one(&mut self) -> Result<Collected> {
        let queue = self.config.done_queue.as_str();
        let Some(msg) = self
            .broker
            .read_from_queue(queue, self.config.visibility_timeout)
            .await?
        else {
            return Ok(Collected::Idle);
        };

        let result = match JobResult::from_entry(msg.message.clone()) {
            Ok(r) => r,
            Err(reason) => {
                error!(
                    msg_id = msg.msg_id,
                    body = %msg.message,
                    %reason,
                    "malformed result message, archiving"
                );
                self.broker.archive_message(queue, msg.msg_id).await?;
                return Ok(Collected::Poisoned { msg_id: msg.msg_id });
            }
        };

        self.writer.append(&result).await?;
        metrics::records_appended().add(1, &[KeyValue::new("outcome", result.outcome.label())]);
        self.broker.delete_message(queue, msg.msg_id).await?;
        debug!(key = %result.key, outcome = result.outcome.label(), "result recorded");

        Ok(Collected::Appended(result))
    }

    /// Loop until shutdown, or until `done` runs dry in drain mode.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> Result<CollectSummary> {
        let mut summary = CollectSummary::default();
        info!(
            queue = %self.config.done_queue,
            record = %self.writer.path().display(),
            "collector started"
        );

        loop {
            if *shutdown.borrow() {
                info!(?summary, "collector shutting down");
                return Ok(summary);
            }

            match self.process_one().await? {
                Collected::Appended(_) => summary.appended += 1,
                Collected::Poisoned { .. } => summary.poisoned += 1,
                Collected::Idle if self.config.drain => {
                    info!(?summary, "done queue drained");
                    return Ok(summary);
                }
                Collected::Idle => wait(&mut shutdown, self.config.poll_interval).await,
            }
        }
    }
}
