//! External lookup capability: postal code in, viewport or failure out.
//!
//! [`Geocoder::lookup`] never fails. Every lower-level error (transport,
//! status, body shape) is logged and folded into [`Outcome::Failed`], so
//! a worker records it as data and moves on. There is no retry here.

pub mod google;

pub use google::GoogleGeocoder;

use crate::model::Outcome;
use std::future::Future;
use thiserror::Error;
use tracing::warn;

/// Why a single lookup attempt produced no viewport.
#[derive(Debug, Error)]
pub enum LookupError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("unexpected status {0}")]
    Status(reqwest::StatusCode),

    #[error("malformed response: {0}")]
    Malformed(String),
}

/// Resolve a job key to a geographic viewport.
pub trait Geocoder: Send + Sync {
    fn lookup(&self, key: &str) -> impl Future<Output = Outcome> + Send;
}

/// Fold a lookup attempt into an outcome, logging the failure branch.
pub fn into_outcome(key: &str, attempt: Result<serde_json::Value, LookupError>) -> Outcome {
    match attempt {
        Ok(viewport) => Outcome::from_value(viewport),
        Err(e) => {
            warn!(key, error = %e, "lookup failed");
            Outcome::Failed
        }
    }
}
