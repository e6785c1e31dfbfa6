//! In-process broker with pgmq-like visibility timeouts.

use super::{Broker, Message};
use crate::error::{Error, Result};
use chrono::Utc;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Default)]
struct Inner {
    queues: HashMap<String, VecDeque<Message>>,
    archives: HashMap<String, Vec<Message>>,
    next_id: i64,
}

/// A broker held entirely in memory. Clones share the same queues.
#[derive(Clone, Default)]
pub struct MemoryBroker {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|_| Error::Broker("memory broker lock poisoned".to_string()))
    }

    /// Snapshot of every message still in a queue, in enqueue order.
    pub fn messages(&self, queue_name: &str) -> Result<Vec<Message>> {
        let inner = self.lock()?;
        Ok(inner
            .queues
            .get(queue_name)
            .map(|q| q.iter().cloned().collect())
            .unwrap_or_default())
    }

    /// Snapshot of a queue's archive.
    pub fn archived(&self, queue_name: &str) -> Result<Vec<Message>> {
        let inner = self.lock()?;
        Ok(inner.archives.get(queue_name).cloned().unwrap_or_default())
    }
}

fn missing(queue_name: &str) -> Error {
    Error::Broker(format!("queue {queue_name} does not exist"))
}

impl Broker for MemoryBroker {
    async fn create_queue(&self, queue_name: &str) -> Result<()> {
        let mut inner = self.lock()?;
        inner.queues.entry(queue_name.to_string()).or_default();
        inner.archives.entry(queue_name.to_string()).or_default();
        Ok(())
    }

    async fn send_to_queue(&self, queue_name: &str, payload: &serde_json::Value) -> Result<i64> {
        let mut inner = self.lock()?;
        inner.next_id += 1;
        let msg_id = inner.next_id;
        let now = Utc::now();
        let queue = inner
            .queues
            .get_mut(queue_name)
            .ok_or_else(|| missing(queue_name))?;
        queue.push_back(Message {
            msg_id,
            read_ct: 0,
            enqueued_at: now,
            vt: now,
            message: payload.clone(),
        });
        Ok(msg_id)
    }

    async fn read_from_queue(&self, queue_name: &str, vt_seconds: i32) -> Result<Option<Message>> {
        let mut inner = self.lock()?;
        let queue = inner
            .queues
            .get_mut(queue_name)
            .ok_or_else(|| missing(queue_name))?;
        let now = Utc::now();
        let Some(msg) = queue.iter_mut().find(|m| m.vt <= now) else {
            return Ok(None);
        };
        msg.vt = now + chrono::Duration::seconds(i64::from(vt_seconds));
        msg.read_ct += 1;
        Ok(Some(msg.clone()))
    }

    async fn delete_message(&self, queue_name: &str, msg_id: i64) -> Result<bool> {
        let mut inner = self.lock()?;
        let queue = inner
            .queues
            .get_mut(queue_name)
            .ok_or_else(|| missing(queue_name))?;
        match queue.iter().position(|m| m.msg_id == msg_id) {
            Some(pos) => {
                queue.remove(pos);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn archive_message(&self, queue_name: &str, msg_id: i64) -> Result<bool> {
        let mut inner = self.lock()?;
        let queue = inner
            .queues
            .get_mut(queue_name)
            .ok_or_else(|| missing(queue_name))?;
        let Some(pos) = queue.iter().position(|m| m.msg_id == msg_id) else {
            return Ok(false);
        };
        let Some(msg) = queue.remove(pos) else {
            return Ok(false);
        };
        inner
            .archives
            .entry(queue_name.to_string())
            .or_default()
            .push(msg);
        Ok(true)
    }

    async fn queue_length(&self, queue_name: &str) -> Result<i64> {
        let inner = self.lock()?;
        let queue = inner.queues.get(queue_name).ok_or_else(|| missing(queue_name))?;
        Ok(queue.len() as i64)
    }
}
