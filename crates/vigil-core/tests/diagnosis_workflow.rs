//! Integration tests for the diagnosis orchestrator with in-memory fakes.
//!
//! Covers the full request flow: validation, evidence retrieval with
//! its fail-safe contract, the sufficiency gate, the bounded retry
//! loop, grounding verification, and the confidence schedule.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use vigil_core::{
    DiagnosisConfig, DiagnosisGenerator, DiagnosisOrchestrator, DiagnosisStatus, EngineError,
    EvidenceRetriever, EvidenceScope, GeneratorError, GradingConfig, CONFIDENCE_EXHAUSTED,
    REASON_EXHAUSTED, REASON_INSUFFICIENT,
};
use vigil_state::fakes::{MemoryEventStore, MemoryIncidentStore};
use vigil_state::{
    EventStore, Fingerprint, IncidentId, IncidentSeed, IncidentStore, LogEvent, LogLevel,
    StorageError, StorageResult, StreamPosition,
};

/// One scripted generator step.
enum Step {
    Answer(&'static str),
    Fail,
}

/// Generator double that replays a fixed script and counts calls.
struct ScriptedGenerator {
    script: Mutex<VecDeque<Step>>,
    calls: AtomicU32,
}

impl ScriptedGenerator {
    fn new(steps: Vec<Step>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(steps.into()),
            calls: AtomicU32::new(0),
        })
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl DiagnosisGenerator for ScriptedGenerator {
    async fn generate(&self, _prompt: &str) -> Result<String, GeneratorError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        match self.script.lock().unwrap().pop_front() {
            Some(Step::Answer(text)) => Ok(text.to_string()),
            Some(Step::Fail) => Err(GeneratorError::Transport("connection reset".to_string())),
            None => Ok(String::new()),
        }
    }
}

/// EventStore double whose reads always fail, for the fail-safe contract.
struct OfflineEventStore;

#[async_trait]
impl EventStore for OfflineEventStore {
    async fn append(&self, _event: LogEvent) -> StorageResult<()> {
        Err(StorageError::Backend("offline".to_string()))
    }
    async fn recent_for_service(
        &self,
        _project_id: &str,
        _service: &str,
        _limit: usize,
    ) -> StorageResult<Vec<LogEvent>> {
        Err(StorageError::Backend("offline".to_string()))
    }
    async fn recent_for_incident(
        &self,
        _project_id: &str,
        _incident_id: &IncidentId,
        _limit: usize,
    ) -> StorageResult<Vec<LogEvent>> {
        Err(StorageError::Backend("offline".to_string()))
    }
    async fn last_position(&self) -> StorageResult<Option<StreamPosition>> {
        Err(StorageError::Backend("offline".to_string()))
    }
}

fn event(level: LogLevel, message: &str) -> LogEvent {
    LogEvent {
        project_id: "p1".to_string(),
        service: "backend".to_string(),
        level,
        message: message.to_string(),
        file: None,
        line: None,
        timestamp: Utc::now(),
        incident_id: None,
        stream_position: None,
    }
}

async fn seed_service_evidence(store: &MemoryEventStore, n: usize, message: &str) {
    for _ in 0..n {
        store.append(event(LogLevel::Error, message)).await.unwrap();
    }
}

fn service_scope() -> EvidenceScope {
    EvidenceScope::Service {
        project_id: "p1".to_string(),
        service: "backend".to_string(),
    }
}

fn orchestrator(
    events: Arc<dyn EventStore>,
    incidents: Arc<dyn IncidentStore>,
    generator: Arc<dyn DiagnosisGenerator>,
) -> DiagnosisOrchestrator {
    DiagnosisOrchestrator::new(
        EvidenceRetriever::new(events),
        incidents,
        generator,
        GradingConfig::default(),
        DiagnosisConfig::default(),
    )
}

#[tokio::test]
async fn first_attempt_verifies_with_highest_confidence() {
    let events = Arc::new(MemoryEventStore::new());
    seed_service_evidence(&events, 5, "redis econnrefused on connect").await;
    let generator = ScriptedGenerator::new(vec![Step::Answer(
        "The cache is down: econnrefused from redis.",
    )]);

    let orch = orchestrator(events, Arc::new(MemoryIncidentStore::new()), generator.clone());
    let result = orch.diagnose(&service_scope()).await.unwrap();

    assert_eq!(result.status, DiagnosisStatus::Success);
    assert_eq!(result.attempt, 1);
    assert_eq!(result.confidence, 0.9);
    assert!(result.diagnosis.unwrap().contains("econnrefused"));
    assert_eq!(generator.calls(), 1);
}

#[tokio::test]
async fn second_attempt_verifies_with_lower_confidence() {
    let events = Arc::new(MemoryEventStore::new());
    seed_service_evidence(&events, 5, "redis econnrefused on connect").await;
    let generator = ScriptedGenerator::new(vec![
        Step::Answer("Something failed somewhere."), // ungrounded
        Step::Answer("econnrefused points at redis"),
    ]);

    let orch = orchestrator(events, Arc::new(MemoryIncidentStore::new()), generator.clone());
    let result = orch.diagnose(&service_scope()).await.unwrap();

    assert_eq!(result.status, DiagnosisStatus::Success);
    assert_eq!(result.attempt, 2);
    assert_eq!(result.confidence, 0.8);
    assert_eq!(generator.calls(), 2);
}

#[tokio::test]
async fn third_attempt_verifies_at_confidence_floor() {
    let events = Arc::new(MemoryEventStore::new());
    seed_service_evidence(&events, 5, "redis econnrefused on connect").await;
    let generator = ScriptedGenerator::new(vec![
        Step::Answer("vague"),
        Step::Answer("still vague"),
        Step::Answer("econnrefused from the cache"),
    ]);

    let orch = orchestrator(events, Arc::new(MemoryIncidentStore::new()), generator);
    let result = orch.diagnose(&service_scope()).await.unwrap();

    assert_eq!(result.attempt, 3);
    assert_eq!(result.confidence, 0.7);
}

#[tokio::test]
async fn exhaustion_returns_failed_with_floor_confidence() {
    let events = Arc::new(MemoryEventStore::new());
    seed_service_evidence(&events, 5, "redis econnrefused on connect").await;
    let generator = ScriptedGenerator::new(vec![
        Step::Answer("nothing relevant"),
        Step::Answer("generic words"),
        Step::Answer("more generic words"),
    ]);

    let orch = orchestrator(events, Arc::new(MemoryIncidentStore::new()), generator.clone());
    let result = orch.diagnose(&service_scope()).await.unwrap();

    assert_eq!(result.status, DiagnosisStatus::Failed);
    assert_eq!(result.confidence, CONFIDENCE_EXHAUSTED);
    assert_eq!(result.reason.as_deref(), Some(REASON_EXHAUSTED));
    assert!(result.diagnosis.is_none());
    assert_eq!(generator.calls(), 3, "retries are bounded by max_retries");
}

#[tokio::test]
async fn generator_errors_burn_attempts() {
    let events = Arc::new(MemoryEventStore::new());
    seed_service_evidence(&events, 5, "redis econnrefused on connect").await;
    let generator = ScriptedGenerator::new(vec![
        Step::Fail,
        Step::Answer("econnrefused from redis"),
    ]);

    let orch = orchestrator(events, Arc::new(MemoryIncidentStore::new()), generator);
    let result = orch.diagnose(&service_scope()).await.unwrap();

    // The failed call consumed attempt 0; success lands on attempt 2.
    assert_eq!(result.status, DiagnosisStatus::Success);
    assert_eq!(result.attempt, 2);
    assert_eq!(result.confidence, 0.8);
}

#[tokio::test]
async fn all_generator_errors_exhaust_not_crash() {
    let events = Arc::new(MemoryEventStore::new());
    seed_service_evidence(&events, 5, "redis econnrefused on connect").await;
    let generator = ScriptedGenerator::new(vec![Step::Fail, Step::Fail, Step::Fail]);

    let orch = orchestrator(events, Arc::new(MemoryIncidentStore::new()), generator);
    let result = orch.diagnose(&service_scope()).await.unwrap();

    assert_eq!(result.status, DiagnosisStatus::Failed);
    assert_eq!(result.reason.as_deref(), Some(REASON_EXHAUSTED));
}

#[tokio::test]
async fn too_little_evidence_fails_without_generator_calls() {
    let events = Arc::new(MemoryEventStore::new());
    seed_service_evidence(&events, 4, "redis econnrefused").await;
    let generator = ScriptedGenerator::new(vec![Step::Answer("econnrefused")]);

    let orch = orchestrator(events, Arc::new(MemoryIncidentStore::new()), generator.clone());
    let result = orch.diagnose(&service_scope()).await.unwrap();

    assert_eq!(result.status, DiagnosisStatus::Failed);
    assert_eq!(result.confidence, 0.0);
    assert_eq!(result.reason.as_deref(), Some(REASON_INSUFFICIENT));
    assert_eq!(generator.calls(), 0, "gate rejects before any generation");
}

#[tokio::test]
async fn evidence_without_errors_fails_sufficiency() {
    let events = Arc::new(MemoryEventStore::new());
    for _ in 0..6 {
        events
            .append(event(LogLevel::Warning, "slow query"))
            .await
            .unwrap();
    }
    let generator = ScriptedGenerator::new(vec![]);

    let orch = orchestrator(events, Arc::new(MemoryIncidentStore::new()), generator);
    let result = orch.diagnose(&service_scope()).await.unwrap();
    assert_eq!(result.reason.as_deref(), Some(REASON_INSUFFICIENT));
}

#[tokio::test]
async fn store_outage_degrades_to_insufficiency_not_error() {
    // Evidence retrieval fails safe to an empty set, which the gate
    // then rejects: the caller sees a failed result, never an Err.
    let generator = ScriptedGenerator::new(vec![Step::Answer("anything")]);
    let orch = orchestrator(
        Arc::new(OfflineEventStore),
        Arc::new(MemoryIncidentStore::new()),
        generator.clone(),
    );

    let result = orch.diagnose(&service_scope()).await.unwrap();
    assert_eq!(result.status, DiagnosisStatus::Failed);
    assert_eq!(result.confidence, 0.0);
    assert_eq!(generator.calls(), 0);
}

#[tokio::test]
async fn empty_project_id_is_a_validation_error() {
    let generator = ScriptedGenerator::new(vec![]);
    let orch = orchestrator(
        Arc::new(MemoryEventStore::new()),
        Arc::new(MemoryIncidentStore::new()),
        generator,
    );

    let scope = EvidenceScope::Service {
        project_id: String::new(),
        service: "backend".to_string(),
    };
    let err = orch.diagnose(&scope).await.unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));
}

#[tokio::test]
async fn unknown_incident_is_rejected() {
    let generator = ScriptedGenerator::new(vec![]);
    let orch = orchestrator(
        Arc::new(MemoryEventStore::new()),
        Arc::new(MemoryIncidentStore::new()),
        generator,
    );

    let scope = EvidenceScope::Incident {
        project_id: "p1".to_string(),
        incident_id: IncidentId("no-such-incident".to_string()),
    };
    let err = orch.diagnose(&scope).await.unwrap_err();
    assert!(matches!(err, EngineError::IncidentNotFound(_)));
}

#[tokio::test]
async fn incident_scope_grades_only_tied_events() {
    // 4 ERROR events tied to the incident plus an untied INFO event:
    // incident-scoped grading sees 4 and fails. A fifth tied ERROR
    // flips it to success.
    let events = Arc::new(MemoryEventStore::new());
    let incidents = Arc::new(MemoryIncidentStore::new());
    let now = Utc::now();

    let incident = incidents
        .record_occurrence(
            IncidentSeed {
                project_id: "p1".to_string(),
                service: "backend".to_string(),
                fingerprint: Fingerprint::derive("p1", "backend", "database timeout", None, None),
                normalized_message: "database timeout".to_string(),
                file: None,
                line: None,
            },
            now,
        )
        .await
        .unwrap();

    for _ in 0..4 {
        let mut tied = event(LogLevel::Error, "database timeout");
        tied.incident_id = Some(incident.id.clone());
        events.append(tied).await.unwrap();
    }
    events
        .append(event(LogLevel::Info, "database timeout"))
        .await
        .unwrap();

    let scope = EvidenceScope::Incident {
        project_id: "p1".to_string(),
        incident_id: incident.id.clone(),
    };

    let generator = ScriptedGenerator::new(vec![
        Step::Answer("database timeout caused this"),
        Step::Answer("database timeout caused this"),
    ]);
    let orch = orchestrator(events.clone(), incidents.clone(), generator);

    let result = orch.diagnose(&scope).await.unwrap();
    assert_eq!(result.reason.as_deref(), Some(REASON_INSUFFICIENT));

    // One more tied ERROR reaches the minimum of five.
    let mut fifth = event(LogLevel::Error, "database timeout");
    fifth.incident_id = Some(incident.id.clone());
    events.append(fifth).await.unwrap();

    let result = orch.diagnose(&scope).await.unwrap();
    assert_eq!(result.status, DiagnosisStatus::Success);
    assert_eq!(result.confidence, 0.9);
}
