//! Queue broker abstraction.
//!
//! The pipeline talks to its two durable queues only through [`Broker`].
//! Production runs on pgmq (see `db::pgmq`); tests and dry runs use
//! [`MemoryBroker`], which keeps the same visibility-timeout semantics:
//! a read hides the message for `vt` seconds, a delete acknowledges it, and
//! an unacknowledged message becomes readable again once `vt` expires.

pub mod memory;

pub use memory::MemoryBroker;

use crate::error::Result;
use std::future::Future;

/// A message read from a queue. Owned by the broker until deleted.
#[derive(Debug, Clone)]
pub struct Message {
    pub msg_id: i64,
    /// Number of times this message has been delivered, this read included.
    pub read_ct: i32,
    pub enqueued_at: chrono::DateTime<chrono::Utc>,
    pub vt: chrono::DateTime<chrono::Utc>,
    pub message: serde_json::Value,
}

/// Durable, at-least-once queue operations.
pub trait Broker: Send + Sync {
    /// Declare a queue. Safe to repeat.
    fn create_queue(&self, queue_name: &str) -> impl Future<Output = Result<()>> + Send;

    /// Publish a persistent message. Returns the message ID.
    fn send_to_queue(
        &self,
        queue_name: &str,
        payload: &serde_json::Value,
    ) -> impl Future<Output = Result<i64>> + Send;

    /// Read at most one message, hiding it for `vt_seconds`.
    /// Returns None if no message is visible.
    fn read_from_queue(
        &self,
        queue_name: &str,
        vt_seconds: i32,
    ) -> impl Future<Output = Result<Option<Message>>> + Send;

    /// Acknowledge a message. Returns false if it was already gone.
    fn delete_message(
        &self,
        queue_name: &str,
        msg_id: i64,
    ) -> impl Future<Output = Result<bool>> + Send;

    /// Move a message to the queue's archive (for poison messages).
    fn archive_message(
        &self,
        queue_name: &str,
        msg_id: i64,
    ) -> impl Future<Output = Result<bool>> + Send;

    /// Messages currently in the queue, visible or not.
    fn queue_length(&self, queue_name: &str) -> impl Future<Output = Result<i64>> + Send;
}

/// Declare every named queue.
pub async fn declare_queues<B: Broker>(broker: &B, queue_names: &[&str]) -> Result<()> {
    for name in queue_names {
        broker.create_queue(name).await?;
    }
    Ok(())
}
