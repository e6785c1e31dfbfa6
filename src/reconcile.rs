//! Offline reconciliation of the seed set against the record.
//!
//! A key is found if any record entry for it carries a non-empty viewport.
//! `null` entries never count, however many there are, and neither do
//! empty payloads (`{}`, `[]`, `""`, `false`, `0`). Everything in the
//! seed that is not found is lost and goes back to the producer.

use crate::error::Result;
use crate::model::{JobResult, Outcome};
use crate::record::read_record;
use crate::seed::{load_seed, write_keys};
use crate::telemetry::metrics;
use serde_json::Value;
use std::collections::HashSet;
use std::path::Path;
use tracing::{info, warn};

/// Outcome of a reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reconciliation {
    /// Distinct seed keys.
    pub total: usize,
    /// Distinct seed keys with a found result.
    pub found: usize,
    /// Seed keys without a found result, in seed order, deduplicated.
    pub lost: Vec<String>,
    /// Record entries whose key had already appeared earlier in the record.
    pub duplicates: usize,
    /// Distinct record keys that are not in the seed.
    pub unknown: usize,
}

/// Compute the lost set. Pure; the same inputs always give the same output.
pub fn reconcile<'a, I>(seed: &[String], record: I) -> Reconciliation
where
    I: IntoIterator<Item = &'a JobResult>,
{
    let mut seen: HashSet<&str> = HashSet::new();
    let mut found: HashSet<&str> = HashSet::new();
    let mut duplicates = 0;

    for entry in record {
        if !seen.insert(entry.key.as_str()) {
            duplicates += 1;
        }
        if marks_found(&entry.outcome) {
            found.insert(entry.key.as_str());
        }
    }

    let mut seed_keys: HashSet<&str> = HashSet::new();
    let mut lost = Vec::new();
    let mut found_count = 0;
    for key in seed {
        if !seed_keys.insert(key.as_str()) {
            continue;
        }
        if found.contains(key.as_str()) {
            found_count += 1;
        } else {
            lost.push(key.clone());
        }
    }

    let unknown = seen.iter().filter(|k| !seed_keys.contains(*k)).count();

    Reconciliation {
        total: seed_keys.len(),
        found: found_count,
        lost,
        duplicates,
        unknown,
    }
}

/// Whether an outcome counts as a successful lookup.
pub fn marks_found(outcome: &Outcome) -> bool {
    outcome.payload().is_some_and(|v| !is_empty(v))
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
    }
}

/// Read the seed and record files, reconcile, and write the lost set to
/// `out`. A malformed record entry aborts before anything is written.
pub async fn reconcile_files(
    seed_path: &Path,
    record_path: &Path,
    out: &Path,
) -> Result<Reconciliation> {
    let seed = load_seed(seed_path).await?;
    let record = read_record(record_path).await?;

    let report = reconcile(&seed, &record);
    write_keys(out, &report.lost).await?;

    metrics::lost_jobs().add(report.lost.len() as u64, &[]);
    if report.unknown > 0 {
        warn!(unknown = report.unknown, "record contains keys that are not in the seed");
    }
    info!(
        total = report.total,
        found = report.found,
        lost = report.lost.len(),
        duplicates = report.duplicates,
        out = %out.display(),
        "reconciliation complete"
    );

    Ok(report)
}
