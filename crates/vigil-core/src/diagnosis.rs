//! Diagnosis orchestrator.
//!
//! This module provides:
//! - the per-request state machine (Pending → Attempting(n) →
//!   Verified | Exhausted) bounding generator retries
//! - the confidence formula rewarding early grounded answers
//! - the public `diagnose` entry point tying evidence retrieval,
//!   grading, generation, and verification together
//!
//! Insufficient evidence and exhausted retries are *outcomes*, not
//! errors: they come back as `failed` results with a reason and a
//! confidence floor. `Err` is reserved for malformed scopes, unknown
//! incidents, and collaborator lookups that must reject the request.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use vigil_state::{Incident, IncidentStore, StorageError};

use crate::config::{DiagnosisConfig, GradingConfig};
use crate::error::{EngineError, Result};
use crate::evidence::{EvidenceRetriever, EvidenceScope};
use crate::generator::{prompt_for_scope, DiagnosisGenerator};
use crate::grading::grade_evidence;
use crate::metrics::METRICS;
use crate::obs;
use crate::verify::verify_answer;

/// Reason attached to a sufficiency-gate rejection.
pub const REASON_INSUFFICIENT: &str = "insufficient evidence";

/// Reason attached to retry exhaustion.
pub const REASON_EXHAUSTED: &str = "could not verify any diagnosis against evidence";

/// Confidence for a sufficiency-gate rejection.
pub const CONFIDENCE_INSUFFICIENT: f64 = 0.0;

/// Confidence floor signaling "we tried but could not confirm".
pub const CONFIDENCE_EXHAUSTED: f64 = 0.2;

/// Outcome tag of a diagnosis request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosisStatus {
    Success,
    Failed,
}

/// The ephemeral result of one diagnosis request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosisResult {
    pub status: DiagnosisStatus,
    /// The grounded diagnosis text (success only).
    pub diagnosis: Option<String>,
    /// 1-based attempt that verified; 0 when no attempt ran.
    pub attempt: u32,
    /// Confidence in [0, 1], rounded to 2 decimals.
    pub confidence: f64,
    /// Failure reason (failed only).
    pub reason: Option<String>,
}

impl DiagnosisResult {
    fn success(diagnosis: String, attempt_index: u32, max_retries: u32) -> Self {
        Self {
            status: DiagnosisStatus::Success,
            diagnosis: Some(diagnosis),
            attempt: attempt_index + 1,
            confidence: confidence_for_attempt(attempt_index, max_retries),
            reason: None,
        }
    }

    fn insufficient() -> Self {
        Self {
            status: DiagnosisStatus::Failed,
            diagnosis: None,
            attempt: 0,
            confidence: CONFIDENCE_INSUFFICIENT,
            reason: Some(REASON_INSUFFICIENT.to_string()),
        }
    }

    fn exhausted(attempts: u32) -> Self {
        Self {
            status: DiagnosisStatus::Failed,
            diagnosis: None,
            attempt: attempts,
            confidence: CONFIDENCE_EXHAUSTED,
            reason: Some(REASON_EXHAUSTED.to_string()),
        }
    }
}

/// Confidence for a verified answer on the given 0-based attempt.
///
/// `clamp(0.7 + 0.1 * (max_retries - 1 - attempt), 0, 1)` rounded to
/// 2 decimals: highest when the first attempt verifies, dropping with
/// each retry consumed.
pub fn confidence_for_attempt(attempt: u32, max_retries: u32) -> f64 {
    let steps = max_retries.saturating_sub(1).saturating_sub(attempt) as f64;
    let raw = (0.7 + 0.1 * steps).clamp(0.0, 1.0);
    (raw * 100.0).round() / 100.0
}

// ---------------------------------------------------------------------------
// State machine
// ---------------------------------------------------------------------------

/// Explicit retry-loop state, so the termination condition is testable
/// apart from the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosisState {
    /// Request accepted, no attempt started.
    Pending,
    /// Generator attempt `n` (0-based) in flight.
    Attempting(u32),
    /// Attempt `attempt` produced a grounded answer.
    Verified { attempt: u32 },
    /// Every allowed attempt ran without grounding.
    Exhausted,
}

impl DiagnosisState {
    /// Move from Pending into the first attempt.
    pub fn begin(self) -> DiagnosisState {
        match self {
            DiagnosisState::Pending => DiagnosisState::Attempting(0),
            other => other,
        }
    }

    /// Advance after one attempt completed.
    pub fn after_attempt(self, verified: bool, max_retries: u32) -> DiagnosisState {
        match self {
            DiagnosisState::Attempting(attempt) => {
                if verified {
                    DiagnosisState::Verified { attempt }
                } else if attempt + 1 >= max_retries {
                    DiagnosisState::Exhausted
                } else {
                    DiagnosisState::Attempting(attempt + 1)
                }
            }
            other => other,
        }
    }
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Drives one diagnosis request end to end.
pub struct DiagnosisOrchestrator {
    retriever: EvidenceRetriever,
    incidents: Arc<dyn IncidentStore>,
    generator: Arc<dyn DiagnosisGenerator>,
    grading: GradingConfig,
    config: DiagnosisConfig,
}

impl DiagnosisOrchestrator {
    pub fn new(
        retriever: EvidenceRetriever,
        incidents: Arc<dyn IncidentStore>,
        generator: Arc<dyn DiagnosisGenerator>,
        grading: GradingConfig,
        config: DiagnosisConfig,
    ) -> Self {
        Self {
            retriever,
            incidents,
            generator,
            grading,
            config,
        }
    }

    fn validate_scope(scope: &EvidenceScope) -> Result<()> {
        match scope {
            EvidenceScope::Service {
                project_id,
                service,
            } => {
                if project_id.is_empty() {
                    return Err(EngineError::Validation(
                        "project_id must not be empty".to_string(),
                    ));
                }
                if service.is_empty() {
                    return Err(EngineError::Validation(
                        "service must not be empty".to_string(),
                    ));
                }
            }
            EvidenceScope::Incident {
                project_id,
                incident_id,
            } => {
                if project_id.is_empty() {
                    return Err(EngineError::Validation(
                        "project_id must not be empty".to_string(),
                    ));
                }
                if incident_id.0.is_empty() {
                    return Err(EngineError::Validation(
                        "incident_id must not be empty".to_string(),
                    ));
                }
            }
        }
        Ok(())
    }

    /// Load the incident aggregate for incident-scoped requests.
    async fn load_incident(&self, scope: &EvidenceScope) -> Result<Option<Incident>> {
        match scope {
            EvidenceScope::Incident { incident_id, .. } => {
                let incident = self.incidents.get(incident_id).await.map_err(|err| {
                    match err {
                        StorageError::IncidentNotFound { .. } => {
                            EngineError::IncidentNotFound(incident_id.clone())
                        }
                        other => EngineError::Storage(other),
                    }
                })?;
                Ok(Some(incident))
            }
            EvidenceScope::Service { .. } => Ok(None),
        }
    }

    /// Run one diagnosis request.
    ///
    /// Generator failures count as a failed attempt and the loop moves
    /// on; they never abort the request.
    pub async fn diagnose(&self, scope: &EvidenceScope) -> Result<DiagnosisResult> {
        Self::validate_scope(scope)?;
        METRICS.inc_diagnoses_requested();

        let incident = self.load_incident(scope).await?;
        let evidence = self
            .retriever
            .retrieve(scope, self.config.evidence_limit)
            .await;

        if !grade_evidence(&evidence, &self.grading) {
            return Ok(DiagnosisResult::insufficient());
        }

        let prompt = prompt_for_scope(scope, incident.as_ref(), &evidence);
        let label = scope.label();

        let mut state = DiagnosisState::Pending.begin();
        let mut grounded: Option<(String, u32)> = None;

        while let DiagnosisState::Attempting(attempt) = state {
            obs::emit_diagnosis_attempt(&label, attempt);

            let answer = match self.generator.generate(&prompt).await {
                Ok(answer) => answer,
                Err(err) => {
                    // A failed collaborator call burns the attempt; an
                    // empty answer can never verify.
                    tracing::warn!(event = "diagnosis.generator_error", scope = %label, attempt = attempt, error = %err);
                    String::new()
                }
            };

            let verified = verify_answer(&answer, &evidence);
            if verified {
                grounded = Some((answer, attempt));
            }
            state = state.after_attempt(verified, self.config.max_retries);
        }

        match state {
            DiagnosisState::Verified { attempt } => {
                let (answer, _) = grounded.expect("verified state implies grounded answer");
                let result = DiagnosisResult::success(answer, attempt, self.config.max_retries);
                obs::emit_diagnosis_verified(&label, result.attempt, result.confidence);
                Ok(result)
            }
            DiagnosisState::Exhausted => {
                obs::emit_diagnosis_exhausted(&label, self.config.max_retries);
                Ok(DiagnosisResult::exhausted(self.config.max_retries))
            }
            // begin() leaves Pending and the loop only exits on a
            // terminal state.
            DiagnosisState::Pending | DiagnosisState::Attempting(_) => {
                unreachable!("diagnosis loop exited in a non-terminal state")
            }
        }
    }
}
