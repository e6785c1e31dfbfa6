//! Worker: fetch one job, geocode it, publish the result, then ack.
//!
//! Each [`Worker`] is strictly sequential and holds at most one
//! unacknowledged job. The ack happens only after the result is on the
//! `done` queue; if publishing fails the job stays on `todo` and the
//! broker hands it out again once its visibility timeout lapses. That
//! redelivery is the only retry in the system.
//!
//! [`WorkerPool`] runs several independent workers in one process. They
//! share the broker connection and nothing else.

use crate::broker::Broker;
use crate::config::{Config, DEFAULT_DONE_QUEUE, DEFAULT_TODO_QUEUE};
use crate::error::{Error, Result};
use crate::geocode::Geocoder;
use crate::model::{Job, JobResult, Outcome};
use crate::telemetry::job::{record_outcome, record_state_transition, start_job_span};
use crate::telemetry::metrics;
use opentelemetry::KeyValue;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{Instrument, error, info, warn};

/// Configuration for a worker.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub todo_queue: String,
    pub done_queue: String,
    /// Visibility timeout (seconds) for pgmq reads.
    pub visibility_timeout: i32,
    /// Minimum delay after each processed job, to stay under API rate limits.
    pub pacing: Duration,
    /// Wait before polling again when `todo` is empty.
    pub poll_interval: Duration,
    /// Stop once `todo` has nothing visible instead of polling forever.
    pub drain: bool,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            todo_queue: DEFAULT_TODO_QUEUE.to_string(),
            done_queue: DEFAULT_DONE_QUEUE.to_string(),
            visibility_timeout: 60,
            pacing: Duration::from_millis(200),
            poll_interval: Duration::from_secs(1),
            drain: false,
        }
    }
}

impl WorkerConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            todo_queue: config.todo_queue.clone(),
            done_queue: config.done_queue.clone(),
            visibility_timeout: config.visibility_timeout_secs,
            pacing: config.pacing,
            poll_interval: config.poll_interval,
            drain: false,
        }
    }
}

/// What happened to one processed job.
#[derive(Debug, Clone)]
pub struct JobReport {
    pub key: String,
    pub outcome: Outcome,
    /// Delivery count from the broker; above 1 means a redelivery.
    pub delivery: i32,
}

/// Result of a single fetch attempt.
#[derive(Debug)]
pub enum Step {
    /// A job was resolved, published and acknowledged.
    Processed(JobReport),
    /// The message was not a job key and was archived.
    Poisoned { msg_id: i64 },
    /// Nothing visible on the queue.
    Idle,
}

/// Totals over a worker's run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub processed: u64,
    pub found: u64,
    pub failed: u64,
    pub poisoned: u64,
}

impl RunSummary {
    fn record(&mut self, step: &Step) {
        match step {
            Step::Processed(report) => {
                self.processed += 1;
                if report.outcome.is_found() {
                    self.found += 1;
                } else {
                    self.failed += 1;
                }
            }
            Step::Poisoned { .. } => self.poisoned += 1,
            Step::Idle => {}
        }
    }

    pub fn merge(&mut self, other: RunSummary) {
        self.processed += other.processed;
        self.found += other.found;
        self.failed += other.failed;
        self.poisoned += other.poisoned;
    }
}

/// A single sequential worker.
pub struct Worker<B, G> {
    id: String,
    broker: Arc<B>,
    geocoder: Arc<G>,
    config: WorkerConfig,
}

impl<B, G> Clone for Worker<B, G> {
    fn clone(&self) -> Self {
        Self {
            id: self.id.clone(),
            broker: Arc::clone(&self.broker),
            geocoder: Arc::clone(&self.geocoder),
            config: self.config.clone(),
        }
    }
}

impl<B: Broker, G: Geocoder> Worker<B, G> {
    pub fn new(broker: Arc<B>, geocoder: Arc<G>, config: WorkerConfig) -> Self {
        let id = uuid::Uuid::new_v4().to_string()[..8].to_string();
        Self {
            id,
            broker,
            geocoder,
            config,
        }
    }

    /// Short identifier used in logs and spans.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Run one fetch → resolve → publish → ack cycle.
    ///
    /// # Errors
    ///
    /// Any broker error. When it happens after the read, the job has not
    /// been acknowledged and will be redelivered.
    pub async fn process_one(&self) -> Result<Step> {
        let todo = self.config.todo_queue.as_str();
        let done = self.config.done_queue.as_str();

        let Some(msg) = self
            .broker
            .read_from_queue(todo, self.config.visibility_timeout)
            .await?
        else {
            return Ok(Step::Idle);
        };

        let Some(job) = Job::from_message(&msg.message) else {
            error!(
                worker = %self.id,
                msg_id = msg.msg_id,
                body = %msg.message,
                "job message is not a string key, archiving"
            );
            self.broker.archive_message(todo, msg.msg_id).await?;
            metrics::jobs_processed().add(1, &[KeyValue::new("outcome", "poisoned")]);
            return Ok(Step::Poisoned { msg_id: msg.msg_id });
        };

        let span = start_job_span(&self.id, &job.key, msg.msg_id, msg.read_ct);

        async {
            if msg.read_ct > 1 {
                warn!(delivery = msg.read_ct, "job redelivered");
            }

            record_state_transition(&span, "fetching", "resolving");
            let started = Instant::now();
            let outcome = self.geocoder.lookup(&job.key).await;
            metrics::lookup_duration_ms().record(
                started.elapsed().as_secs_f64() * 1000.0,
                &[KeyValue::new("outcome", outcome.label())],
            );
            record_outcome(&span, outcome.label());

            record_state_transition(&span, "resolving", "publishing");
            let result = JobResult::new(job.key.clone(), outcome);
            self.broker.send_to_queue(done, &result.to_entry()).await?;

            record_state_transition(&span, "publishing", "acking");
            if !self.broker.delete_message(todo, msg.msg_id).await? {
                // Visibility timeout lapsed mid-job and another delivery acked it.
                warn!("job already acknowledged elsewhere");
            }

            metrics::jobs_processed().add(1, &[KeyValue::new("outcome", result.outcome.label())]);
            info!(outcome = result.outcome.label(), "job processed");

            Ok(Step::Processed(JobReport {
                key: result.key,
                outcome: result.outcome,
                delivery: msg.read_ct,
            }))
        }
        .instrument(span.clone())
        .await
    }

    /// Loop until `shutdown` flips to true, or until the queue runs dry in
    /// drain mode. Broker errors end the loop.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<RunSummary> {
        let mut summary = RunSummary::default();
        info!(worker = %self.id, queue = %self.config.todo_queue, "worker started");

        loop {
            if *shutdown.borrow() {
                info!(worker = %self.id, "worker shutting down");
                return Ok(summary);
            }

            let step = self.process_one().await?;
            summary.record(&step);

            let pause = match step {
                Step::Processed(_) => self.config.pacing,
                Step::Poisoned { .. } => Duration::ZERO,
                Step::Idle if self.config.drain => {
                    info!(worker = %self.id, ?summary, "todo queue drained");
                    return Ok(summary);
                }
                Step::Idle => self.config.poll_interval,
            };
            wait(&mut shutdown, pause).await;
        }
    }
}

/// Sleep for `duration`, cut short by a shutdown signal.
pub(crate) async fn wait(shutdown: &mut watch::Receiver<bool>, duration: Duration) {
    if duration.is_zero() {
        return;
    }
    tokio::select! {
        changed = shutdown.changed() => {
            // Sender gone: nobody can signal shutdown any more, so just pace.
            if changed.is_err() {
                tokio::time::sleep(duration).await;
            }
        }
        _ = tokio::time::sleep(duration) => {}
    }
}

/// A set of workers sharing one broker and one geocoder.
pub struct WorkerPool<B, G> {
    broker: Arc<B>,
    geocoder: Arc<G>,
    config: WorkerConfig,
    instances: usize,
}

impl<B, G> WorkerPool<B, G>
where
    B: Broker + 'static,
    G: Geocoder + 'static,
{
    pub fn new(broker: Arc<B>, geocoder: Arc<G>, config: WorkerConfig, instances: usize) -> Self {
        Self {
            broker,
            geocoder,
            config,
            instances: instances.max(1),
        }
    }

    /// Run every worker to completion and sum their summaries.
    ///
    /// The first fatal worker error stops the rest of the pool and is
    /// returned once they have all exited.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> Result<RunSummary> {
        let (stop_tx, stop_rx) = watch::channel(false);

        let forward_tx = stop_tx.clone();
        let forwarder = tokio::spawn(async move {
            while shutdown.changed().await.is_ok() {
                if *shutdown.borrow() {
                    let _ = forward_tx.send(true);
                    break;
                }
            }
        });

        let mut set = JoinSet::new();
        for _ in 0..self.instances {
            let worker = Worker::new(
                Arc::clone(&self.broker),
                Arc::clone(&self.geocoder),
                self.config.clone(),
            );
            let rx = stop_rx.clone();
            set.spawn(async move { worker.run(rx).await });
        }
        info!(instances = self.instances, "worker pool started");

        let mut total = RunSummary::default();
        let mut first_err: Option<Error> = None;
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(Ok(summary)) => total.merge(summary),
                Ok(Err(e)) => {
                    error!(error = %e, "worker failed, stopping pool");
                    let _ = stop_tx.send(true);
                    first_err.get_or_insert(e);
                }
                Err(e) => {
                    error!(error = %e, "worker task panicked, stopping pool");
                    let _ = stop_tx.send(true);
                    first_err.get_or_insert(Error::Other(format!("worker task failed: {e}")));
                }
            }
        }
        forwarder.abort();

        match first_err {
            Some(e) => Err(e),
            None => {
                info!(?total, "worker pool finished");
                Ok(total)
            }
        }
    }
}
