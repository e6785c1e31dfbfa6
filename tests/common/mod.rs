//! Shared fixtures: a scripted geocoder and fault-injecting brokers.

#![allow(dead_code)]

use geoq::broker::{Broker, MemoryBroker, Message};
use geoq::collector::CollectorConfig;
use geoq::error::{Error, Result};
use geoq::geocode::Geocoder;
use geoq::model::Outcome;
use geoq::worker::WorkerConfig;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

pub const TODO: &str = "todo_test";
pub const DONE: &str = "done_test";

pub fn keys(ks: &[&str]) -> Vec<String> {
    ks.iter().map(|k| k.to_string()).collect()
}

pub fn viewport(lat: f64) -> Value {
    json!({
        "northeast": {"lat": lat + 0.01, "lng": -73.98},
        "southwest": {"lat": lat - 0.01, "lng": -74.00}
    })
}

pub fn worker_config() -> WorkerConfig {
    WorkerConfig {
        todo_queue: TODO.to_string(),
        done_queue: DONE.to_string(),
        visibility_timeout: 30,
        pacing: Duration::ZERO,
        poll_interval: Duration::from_millis(10),
        drain: true,
    }
}

pub fn collector_config() -> CollectorConfig {
    CollectorConfig {
        done_queue: DONE.to_string(),
        visibility_timeout: 30,
        poll_interval: Duration::from_millis(10),
        drain: true,
    }
}

pub async fn memory_broker() -> MemoryBroker {
    let broker = MemoryBroker::new();
    geoq::broker::declare_queues(&broker, &[TODO, DONE])
        .await
        .unwrap();
    broker
}

/// Resolves the keys it was given; fails every other key.
#[derive(Default)]
pub struct StubGeocoder {
    viewports: HashMap<String, Value>,
    calls: AtomicUsize,
}

impl StubGeocoder {
    pub fn with(entries: &[(&str, Value)]) -> Self {
        Self {
            viewports: entries
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
            calls: AtomicUsize::new(0),
        }
    }

    /// Resolves every key to the same viewport.
    pub fn resolving(all: &[String]) -> Self {
        Self {
            viewports: all.iter().map(|k| (k.clone(), viewport(40.7))).collect(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Geocoder for StubGeocoder {
    async fn lookup(&self, key: &str) -> Outcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.viewports.get(key) {
            Some(v) => Outcome::from_value(v.clone()),
            None => Outcome::Failed,
        }
    }
}

/// Which broker call a [`FaultyBroker`] should fail.
#[derive(Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Publishing to the done queue fails.
    Publish,
    /// Acknowledging on any queue fails, as if the worker died before the ack.
    Ack,
}

/// Delegates to a [`MemoryBroker`] except for one injected failure.
pub struct FaultyBroker {
    pub inner: MemoryBroker,
    pub fault: Fault,
}

fn connection_lost() -> Error {
    Error::Broker("connection lost".to_string())
}

impl Broker for FaultyBroker {
    async fn create_queue(&self, queue_name: &str) -> Result<()> {
        self.inner.create_queue(queue_name).await
    }

    async fn send_to_queue(&self, queue_name: &str, payload: &Value) -> Result<i64> {
        if self.fault == Fault::Publish && queue_name == DONE {
            return Err(connection_lost());
        }
        self.inner.send_to_queue(queue_name, payload).await
    }

    async fn read_from_queue(&self, queue_name: &str, vt_seconds: i32) -> Result<Option<Message>> {
        self.inner.read_from_queue(queue_name, vt_seconds).await
    }

    async fn delete_message(&self, queue_name: &str, msg_id: i64) -> Result<bool> {
        if self.fault == Fault::Ack {
            return Err(connection_lost());
        }
        self.inner.delete_message(queue_name, msg_id).await
    }

    async fn archive_message(&self, queue_name: &str, msg_id: i64) -> Result<bool> {
        self.inner.archive_message(queue_name, msg_id).await
    }

    async fn queue_length(&self, queue_name: &str) -> Result<i64> {
        self.inner.queue_length(queue_name).await
    }
}
