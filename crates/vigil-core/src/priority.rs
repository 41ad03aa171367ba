//! Priority scorer: deterministic, explainable ranking of active incidents.
//!
//! Score = frequency + recency + service criticality + message severity,
//! each sub-score independently capped. Every sub-score that clears its
//! "interesting" threshold appends a reason fragment so the ranking can
//! be explained, not just read as a number.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use vigil_state::{Incident, IncidentId, IncidentStatus};

/// Criticality weights for known service names (case-insensitive).
const SERVICE_WEIGHTS: &[(&str, i64)] = &[("backend", 40), ("auth", 30), ("worker", 20)];

/// Weight for a service not in the table.
const DEFAULT_SERVICE_WEIGHT: i64 = 10;

/// Severity keywords, scanned in declaration order; first match wins.
const SEVERITY_WEIGHTS: &[(&str, i64)] = &[
    ("crash", 30),
    ("exception", 30),
    ("failed", 30),
    ("error", 20),
    ("warning", 10),
];

/// Severity when no keyword matches.
const DEFAULT_SEVERITY: i64 = 5;

/// One scored incident in a priority report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriorityEntry {
    pub incident_id: IncidentId,
    pub priority_score: i64,
    pub reason: String,
}

/// Ranked incidents plus the single recommended one (highest score).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriorityReport {
    pub recommended_incident_id: Option<IncidentId>,
    pub entries: Vec<PriorityEntry>,
}

fn frequency_score(count: u64) -> i64 {
    ((count as i64) * 5).min(25)
}

fn recency_score(last_seen: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    let minutes_ago = (now - last_seen).num_minutes();
    if minutes_ago < 10 {
        25
    } else if minutes_ago < 60 {
        20
    } else if minutes_ago < 360 {
        10
    } else {
        5
    }
}

fn service_score(service: &str) -> i64 {
    let lowered = service.to_lowercase();
    SERVICE_WEIGHTS
        .iter()
        .find(|(name, _)| *name == lowered)
        .map(|(_, weight)| *weight)
        .unwrap_or(DEFAULT_SERVICE_WEIGHT)
}

fn severity_score(message: &str) -> i64 {
    let lowered = message.to_lowercase();
    SEVERITY_WEIGHTS
        .iter()
        .find(|(keyword, _)| lowered.contains(keyword))
        .map(|(_, weight)| *weight)
        .unwrap_or(DEFAULT_SEVERITY)
}

/// Rank ACTIVE incidents by composite priority, highest first.
///
/// Pure and deterministic: the same incidents and `now` always produce
/// the same order and scores. Ties keep input order (stable sort, no
/// secondary key).
pub fn prioritize_incidents(incidents: &[Incident], now: DateTime<Utc>) -> PriorityReport {
    let mut entries: Vec<PriorityEntry> = Vec::new();

    for incident in incidents {
        if incident.status != IncidentStatus::Active {
            continue;
        }

        let mut score = 0i64;
        let mut reasons: Vec<String> = Vec::new();

        let freq = frequency_score(incident.count);
        score += freq;
        if freq > 0 {
            reasons.push("high frequency".to_string());
        }

        let rec = recency_score(incident.last_seen, now);
        score += rec;
        if rec >= 20 {
            reasons.push("very recent".to_string());
        }

        let svc = service_score(&incident.service);
        score += svc;
        reasons.push(format!("{} service", incident.service));

        let sev = severity_score(&incident.normalized_message);
        score += sev;
        if sev >= 20 {
            reasons.push("severe error".to_string());
        }

        entries.push(PriorityEntry {
            incident_id: incident.id.clone(),
            priority_score: score,
            reason: reasons.join(", "),
        });
    }

    entries.sort_by(|a, b| b.priority_score.cmp(&a.priority_score));

    PriorityReport {
        recommended_incident_id: entries.first().map(|e| e.incident_id.clone()),
        entries,
    }
}
