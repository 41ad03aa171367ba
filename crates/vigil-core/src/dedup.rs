//! Fingerprint & dedup engine.
//!
//! Decides whether an ERROR occurrence belongs to an existing incident
//! or opens a new one. Normalization strips the numeric noise (ids,
//! counters, timestamps embedded in text) that makes textually distinct
//! messages the same error class.

use chrono::{DateTime, Utc};
use std::sync::Arc;

use vigil_state::{Fingerprint, Incident, IncidentSeed, IncidentStore, StorageResult};

use crate::metrics::METRICS;
use crate::obs;

/// Normalize a raw log message for fingerprinting.
///
/// Lower-cases, removes every maximal digit run, collapses whitespace
/// runs to a single space, and trims. `"Timeout after 30s on request
/// 8812"` and `"Timeout after 45s on request 9044"` normalize
/// identically.
pub fn normalize_message(message: &str) -> String {
    let lowered = message.to_lowercase();
    let without_digits: String = lowered.chars().filter(|c| !c.is_ascii_digit()).collect();

    let mut normalized = String::with_capacity(without_digits.len());
    let mut in_whitespace = false;
    for ch in without_digits.chars() {
        if ch.is_whitespace() {
            if !in_whitespace {
                normalized.push(' ');
            }
            in_whitespace = true;
        } else {
            normalized.push(ch);
            in_whitespace = false;
        }
    }
    normalized.trim().to_string()
}

/// Dedup engine: maps one error occurrence to its incident.
pub struct DedupEngine {
    incidents: Arc<dyn IncidentStore>,
}

impl DedupEngine {
    pub fn new(incidents: Arc<dyn IncidentStore>) -> Self {
        Self { incidents }
    }

    /// Record one ERROR occurrence, returning the incident it belongs to.
    ///
    /// Find-or-create runs as a single atomic store upsert keyed on
    /// `(project_id, fingerprint, status = ACTIVE)`; concurrent workers
    /// ingesting the same fingerprint converge on one incident.
    pub async fn record_error(
        &self,
        project_id: &str,
        service: &str,
        message: &str,
        file: Option<&str>,
        line: Option<u32>,
        now: DateTime<Utc>,
    ) -> StorageResult<Incident> {
        let normalized = normalize_message(message);
        let fingerprint = Fingerprint::derive(project_id, service, &normalized, file, line);

        let seed = IncidentSeed {
            project_id: project_id.to_string(),
            service: service.to_string(),
            fingerprint,
            normalized_message: normalized,
            file: file.map(str::to_string),
            line,
        };

        let incident = self.incidents.record_occurrence(seed, now).await?;
        if incident.count == 1 {
            METRICS.inc_incidents_opened();
            obs::emit_incident_opened(&incident.id.0, incident.fingerprint.short(), service);
        } else {
            obs::emit_incident_matched(&incident.id.0, incident.count);
        }
        Ok(incident)
    }
}
