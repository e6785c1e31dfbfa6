//! # geoq
//!
//! Durable fan-out of geocoding jobs over pgmq.
//!
//! A producer seeds the `todo` queue with postal codes. Any number of
//! workers take one job at a time, geocode it, and publish the result to
//! `done` before acknowledging. A collector appends results to a JSON-lines
//! record, and an offline reconciler lists the keys that never got a
//! viewport so they can be submitted again.
//!
//! Delivery is at-least-once: a job whose worker dies before the ack is
//! redelivered, so a key can appear more than once in the record.

pub mod broker;
pub mod collector;
pub mod config;
pub mod db;
pub mod error;
pub mod geocode;
pub mod model;
pub mod producer;
pub mod reconcile;
pub mod record;
pub mod seed;
pub mod telemetry;
pub mod worker;
