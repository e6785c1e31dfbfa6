//! Metric instrument factories for geoq.
//!
//! Uses the OTel Meter API with the globally-registered `MeterProvider`.
//! All instruments are created lazily from the `"geoq"` meter.

use opentelemetry::metrics::{Counter, Histogram, Meter};

fn meter() -> Meter {
    opentelemetry::global::meter("geoq")
}

/// Counter: queue-level operations (create, send, read, archive, delete).
/// Labels: `queue`, `operation`.
pub fn queue_operations() -> Counter<u64> {
    meter()
        .u64_counter("geoq.queue.operations")
        .with_description("Number of queue operations")
        .build()
}

/// Counter: jobs taken through a full worker cycle.
/// Labels: `outcome` ("found" | "failed" | "poisoned").
pub fn jobs_processed() -> Counter<u64> {
    meter()
        .u64_counter("geoq.jobs.processed")
        .with_description("Number of jobs processed by workers")
        .build()
}

/// Counter: jobs published by the producer.
pub fn jobs_enqueued() -> Counter<u64> {
    meter()
        .u64_counter("geoq.jobs.enqueued")
        .with_description("Number of jobs published to the todo queue")
        .build()
}

/// Histogram: external lookup latency in milliseconds.
/// Labels: `outcome`.
pub fn lookup_duration_ms() -> Histogram<f64> {
    meter()
        .f64_histogram("geoq.lookup.duration_ms")
        .with_description("Geocoding lookup duration in milliseconds")
        .with_unit("ms")
        .build()
}

/// Counter: entries appended to the record file.
pub fn records_appended() -> Counter<u64> {
    meter()
        .u64_counter("geoq.records.appended")
        .with_description("Number of results appended to the record")
        .build()
}

/// Counter: keys found lost by reconciliation.
pub fn lost_jobs() -> Counter<u64> {
    meter()
        .u64_counter("geoq.jobs.lost")
        .with_description("Number of seed keys without a found result")
        .build()
}
