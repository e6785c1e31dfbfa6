//! pgmq queue operations via direct SQLx.
//!
//! Calls pgmq's SQL functions: pgmq.create, pgmq.send, pgmq.read,
//! pgmq.archive, pgmq.delete, pgmq.metrics. Messages live in ordinary
//! Postgres tables, so every send is persistent.

use crate::broker::{Broker, Message};
use crate::error::Result;
use crate::telemetry::metrics;
use opentelemetry::KeyValue;

fn record_op(queue_name: &str, operation: &'static str) {
    metrics::queue_operations().add(
        1,
        &[
            KeyValue::new("queue", queue_name.to_string()),
            KeyValue::new("operation", operation),
        ],
    );
}

impl Broker for super::Db {
    /// Create a pgmq queue (idempotent).
    async fn create_queue(&self, queue_name: &str) -> Result<()> {
        sqlx::query("SELECT pgmq.create($1)")
            .bind(queue_name)
            .execute(&self.pool)
            .await?;
        record_op(queue_name, "create");
        Ok(())
    }

    async fn send_to_queue(&self, queue_name: &str, payload: &serde_json::Value) -> Result<i64> {
        let row: (i64,) = sqlx::query_as("SELECT pgmq.send($1, $2, 0)")
            .bind(queue_name)
            .bind(payload)
            .fetch_one(&self.pool)
            .await?;
        record_op(queue_name, "send");
        Ok(row.0)
    }

    /// Read the next message with quantity 1, so a consumer never holds
    /// more than one unacknowledged message.
    async fn read_from_queue(&self, queue_name: &str, vt_seconds: i32) -> Result<Option<Message>> {
        let row = sqlx::query_as::<
            _,
            (
                i64,
                i32,
                chrono::DateTime<chrono::Utc>,
                chrono::DateTime<chrono::Utc>,
                serde_json::Value,
            ),
        >("SELECT msg_id, read_ct, enqueued_at, vt, message FROM pgmq.read($1, $2, 1)")
        .bind(queue_name)
        .bind(vt_seconds)
        .fetch_optional(&self.pool)
        .await?;

        let msg = row.map(|(msg_id, read_ct, enqueued_at, vt, message)| Message {
            msg_id,
            read_ct,
            enqueued_at,
            vt,
            message,
        });

        record_op(
            queue_name,
            if msg.is_some() { "read" } else { "read_empty" },
        );

        Ok(msg)
    }

    async fn delete_message(&self, queue_name: &str, msg_id: i64) -> Result<bool> {
        let row: (bool,) = sqlx::query_as("SELECT pgmq.delete($1, $2)")
            .bind(queue_name)
            .bind(msg_id)
            .fetch_one(&self.pool)
            .await?;
        record_op(queue_name, "delete");
        Ok(row.0)
    }

    /// Archive a message (moves to archive table, preserves for audit).
    async fn archive_message(&self, queue_name: &str, msg_id: i64) -> Result<bool> {
        let row: (bool,) = sqlx::query_as("SELECT pgmq.archive($1, $2)")
            .bind(queue_name)
            .bind(msg_id)
            .fetch_one(&self.pool)
            .await?;
        record_op(queue_name, "archive");
        Ok(row.0)
    }

    async fn queue_length(&self, queue_name: &str) -> Result<i64> {
        let row: (i64,) = sqlx::query_as("SELECT queue_length FROM pgmq.metrics($1)")
            .bind(queue_name)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.0)
    }
}
