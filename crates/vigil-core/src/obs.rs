//! Structured observability hooks for engine lifecycle events.
//!
//! Emission functions for the moments an operator cares about: records
//! ingested, incidents opened/matched, sweeps, diagnosis attempts and
//! outcomes. Events are emitted at `info!`/`warn!` level; use `RUST_LOG`
//! for filtering and `init_tracing(json, ...)` for JSON output.

use tracing::{info, warn};

/// Emit event: one stream record persisted.
pub fn emit_record_ingested(service: &str, level: &str, position: u64) {
    info!(event = "ingest.record_persisted", service = %service, level = %level, position = position);
}

/// Emit event: malformed stream record skipped.
pub fn emit_record_rejected(position: u64, reason: &dyn std::fmt::Display) {
    warn!(event = "ingest.record_rejected", position = position, reason = %reason);
}

/// Emit event: ingestion retrying after a store failure.
pub fn emit_ingest_backoff(delay_ms: u64, error: &dyn std::fmt::Display) {
    warn!(event = "ingest.backoff", delay_ms = delay_ms, error = %error);
}

/// Emit event: a new incident was opened.
pub fn emit_incident_opened(incident_id: &str, fingerprint: &str, service: &str) {
    info!(event = "incident.opened", incident_id = %incident_id, fingerprint = %fingerprint, service = %service);
}

/// Emit event: an occurrence matched an existing incident.
pub fn emit_incident_matched(incident_id: &str, count: u64) {
    info!(event = "incident.matched", incident_id = %incident_id, count = count);
}

/// Emit event: one auto-resolution sweep finished.
pub fn emit_sweep_completed(resolved: u64) {
    info!(event = "sweep.completed", resolved = resolved);
}

/// Emit event: a sweep failed; the loop continues on the next tick.
pub fn emit_sweep_failed(error: &dyn std::fmt::Display) {
    warn!(event = "sweep.failed", error = %error);
}

/// Emit event: one diagnosis generator attempt starting.
pub fn emit_diagnosis_attempt(scope: &str, attempt: u32) {
    info!(event = "diagnosis.attempt", scope = %scope, attempt = attempt);
}

/// Emit event: a diagnosis verified against evidence.
pub fn emit_diagnosis_verified(scope: &str, attempt: u32, confidence: f64) {
    info!(event = "diagnosis.verified", scope = %scope, attempt = attempt, confidence = confidence);
}

/// Emit event: every attempt exhausted without grounding.
pub fn emit_diagnosis_exhausted(scope: &str, attempts: u32) {
    warn!(event = "diagnosis.exhausted", scope = %scope, attempts = attempts);
}

/// Emit event: evidence retrieval degraded to an empty set.
pub fn emit_evidence_degraded(scope: &str, error: &dyn std::fmt::Display) {
    warn!(event = "evidence.degraded", scope = %scope, error = %error);
}
