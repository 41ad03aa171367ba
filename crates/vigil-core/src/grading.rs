//! Evidence sufficiency gate ("grading").
//!
//! Decides whether an evidence set is good enough to spend generator
//! attempts on. Rejections here are cheap and terminal for the request;
//! they are not system faults.

use std::collections::HashSet;

use vigil_state::{LogEvent, LogLevel};

use crate::config::GradingConfig;

/// Decide if the evidence set is sufficient to attempt a diagnosis.
///
/// Requirements:
/// - at least `min_events` events;
/// - at least one ERROR-level event;
/// - when the set is large (`noise_threshold` or more), more than one
///   distinct non-empty message. Small batches of identical messages
///   are allowed: repetition there is expected and still informative.
pub fn grade_evidence(evidence: &[LogEvent], config: &GradingConfig) -> bool {
    if evidence.is_empty() {
        return false;
    }

    if evidence.len() < config.min_events {
        return false;
    }

    if !evidence.iter().any(|e| e.level == LogLevel::Error) {
        return false;
    }

    if evidence.len() >= config.noise_threshold {
        let distinct: HashSet<&str> = evidence
            .iter()
            .map(|e| e.message.as_str())
            .filter(|m| !m.is_empty())
            .collect();
        if distinct.len() <= 1 {
            return false;
        }
    }

    true
}
