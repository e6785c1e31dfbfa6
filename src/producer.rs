//! Job producer: seeds the `todo` queue.
//!
//! One persistent message per input key. Keys are not deduplicated, and
//! whatever the queue already holds from an earlier run is left alone.

use crate::broker::Broker;
use crate::error::Result;
use crate::model::Job;
use crate::telemetry::metrics;
use tracing::{debug, info};

/// Publish every key to `queue_name`, in order. Returns how many were sent.
pub async fn enqueue_jobs<B: Broker>(
    broker: &B,
    queue_name: &str,
    keys: &[String],
) -> Result<usize> {
    let mut sent = 0;
    for key in keys {
        let msg_id = broker
            .send_to_queue(queue_name, &Job::new(key.as_str()).to_message())
            .await?;
        debug!(key = %key, msg_id, "job enqueued");
        sent += 1;
    }
    metrics::jobs_enqueued().add(sent as u64, &[]);
    info!(queue = queue_name, count = sent, "seeded job queue");
    Ok(sent)
}
