//! Job processing span helpers.
//!
//! One span per delivery of a job, with the worker state machine
//! (fetching → resolving → publishing → acking) recorded as events.

use tracing::Span;

/// Start a span for one delivery attempt of a job.
///
/// The `job.outcome` field is declared empty and can be filled via
/// [`record_outcome`].
pub fn start_job_span(worker_id: &str, key: &str, msg_id: i64, read_ct: i32) -> Span {
    tracing::info_span!(
        "job.process",
        "job.worker" = worker_id,
        "job.key" = key,
        "job.msg_id" = msg_id,
        "job.delivery" = read_ct,
        "job.outcome" = tracing::field::Empty,
    )
}

/// Record a state transition event on the given span.
pub fn record_state_transition(span: &Span, from: &str, to: &str) {
    span.in_scope(|| {
        tracing::debug!(from = from, to = to, "state_transition");
    });
}

/// Record the lookup outcome label on the span.
pub fn record_outcome(span: &Span, outcome: &str) {
    span.record("job.outcome", outcome);
}
