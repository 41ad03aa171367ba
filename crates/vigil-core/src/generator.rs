//! Diagnosis generator collaborator.
//!
//! The engine owns the prompt contract (what evidence goes in, what
//! rules the generator must follow); producing the natural-language
//! answer is the collaborator's job. Its output is untrusted and always
//! passes grounding verification before anyone sees it.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use vigil_state::{Incident, LogEvent};

use crate::evidence::EvidenceScope;

/// Errors from the generator collaborator.
///
/// Inside the diagnosis retry loop these count as a failed attempt,
/// never as a crash of the request.
#[derive(Debug, thiserror::Error)]
pub enum GeneratorError {
    #[error("generator transport error: {0}")]
    Transport(String),

    #[error("generator returned status {0}")]
    Status(u16),

    #[error("generator response malformed: {0}")]
    MalformedResponse(String),
}

/// External diagnosis generator (e.g. an LLM service).
#[async_trait]
pub trait DiagnosisGenerator: Send + Sync {
    /// Produce a candidate diagnosis for the prompt. The answer is
    /// treated as untrusted text requiring verification.
    async fn generate(&self, prompt: &str) -> Result<String, GeneratorError>;
}

// ---------------------------------------------------------------------------
// Prompt contract
// ---------------------------------------------------------------------------

/// Render evidence lines for the prompt: `[LEVEL] timestamp - message`.
pub fn format_evidence(evidence: &[LogEvent]) -> String {
    evidence
        .iter()
        .map(|e| {
            format!(
                "[{}] {} - {}",
                e.level,
                e.timestamp.to_rfc3339(),
                e.message
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Build the service-scoped diagnosis prompt.
pub fn service_prompt(service: &str, evidence: &[LogEvent]) -> String {
    let evidence_text = format_evidence(evidence);
    format!(
        r#"You are a senior backend engineer helping diagnose production incidents.

You MUST strictly follow these rules:
- ONLY use the log evidence provided below.
- If the evidence is insufficient or ambiguous, say that you cannot determine the exact root cause from it.
- Do NOT speculate about configuration, code, or infrastructure that is not visible in the evidence.
- Do NOT invent services, files, or errors that are not in the evidence.

Service: {service}

Evidence:
{evidence_text}

Task:
1. Briefly state the most likely root cause OR clearly state that the evidence is insufficient.
2. Mention at least one specific message or pattern that supports your conclusion.

Answer in 1-3 short sentences.
"#
    )
}

/// Build the incident-scoped diagnosis prompt.
pub fn incident_prompt(incident: &Incident, evidence: &[LogEvent]) -> String {
    let evidence_text = format_evidence(evidence);
    format!(
        r#"You are diagnosing a SINGLE INCIDENT.

Incident ID: {incident_id}
Incident message: {incident_message}

Rules:
- Use ONLY the evidence below.
- Do NOT assume anything outside this incident.

Evidence:
{evidence_text}

Task:
State the most likely root cause OR say the evidence is insufficient.
"#,
        incident_id = incident.id,
        incident_message = incident.normalized_message,
    )
}

/// Build the right prompt for a scope.
pub fn prompt_for_scope(
    scope: &EvidenceScope,
    incident: Option<&Incident>,
    evidence: &[LogEvent],
) -> String {
    match (scope, incident) {
        (_, Some(incident)) => incident_prompt(incident, evidence),
        (EvidenceScope::Service { service, .. }, None) => service_prompt(service, evidence),
        (EvidenceScope::Incident { .. }, None) => {
            // Incident scope without the aggregate loaded: fall back to
            // the scope label so the prompt stays self-describing.
            service_prompt(&scope.label(), evidence)
        }
    }
}

// ---------------------------------------------------------------------------
// HTTP-backed implementation
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct GenerateRequest<'a> {
    prompt: &'a str,
}

#[derive(Deserialize)]
struct GenerateResponse {
    answer: String,
}

/// Diagnosis generator behind an HTTP endpoint.
///
/// POSTs `{"prompt": ...}` to `{base_url}/generate` and expects
/// `{"answer": ...}` back. Every call runs under a timeout so a hung
/// generator bounds request latency instead of wedging the orchestrator.
pub struct HttpDiagnosisGenerator {
    base_url: String,
    client: reqwest::Client,
}

impl HttpDiagnosisGenerator {
    /// Default per-call timeout.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .user_agent("vigil-core/0.2.0")
            .timeout(timeout)
            .build()
            .expect("Failed to create HTTP client");

        Self {
            base_url: base_url.into(),
            client,
        }
    }

    /// Create from `VIGIL_GENERATOR_URL`.
    pub fn from_env() -> Option<Self> {
        std::env::var("VIGIL_GENERATOR_URL")
            .ok()
            .map(|url| Self::new(url, Self::DEFAULT_TIMEOUT))
    }
}

#[async_trait]
impl DiagnosisGenerator for HttpDiagnosisGenerator {
    async fn generate(&self, prompt: &str) -> Result<String, GeneratorError> {
        let url = format!("{}/generate", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&GenerateRequest { prompt })
            .send()
            .await
            .map_err(|e| GeneratorError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(GeneratorError::Status(response.status().as_u16()));
        }

        let body: GenerateResponse = response
            .json()
            .await
            .map_err(|e| GeneratorError::MalformedResponse(e.to_string()))?;

        Ok(body.answer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use vigil_state::{IncidentId, LogLevel};

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

    #[test]
    fn test_format_evidence_lines() {
        let evidence = vec![
            event(LogLevel::Error, "db timeout"),
            event(LogLevel::Info, "retrying"),
        ];
        let text = format_evidence(&evidence);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("[ERROR]"));
        assert!(lines[0].ends_with("db timeout"));
        assert!(lines[1].starts_with("[INFO]"));
    }

    #[test]
    fn test_service_prompt_embeds_scope_and_evidence() {
        let evidence = vec![event(LogLevel::Error, "redis econnrefused")];
        let prompt = service_prompt("backend", &evidence);
        assert!(prompt.contains("Service: backend"));
        assert!(prompt.contains("redis econnrefused"));
        assert!(prompt.contains("ONLY use the log evidence"));
    }

    #[test]
    fn test_incident_prompt_embeds_incident() {
        let incident = Incident {
            id: IncidentId("inc-1".to_string()),
            project_id: "p1".to_string(),
            service: "backend".to_string(),
            fingerprint: vigil_state::Fingerprint::derive("p1", "backend", "db timeout", None, None),
            normalized_message: "db timeout".to_string(),
            file: None,
            line: None,
            status: vigil_state::IncidentStatus::Active,
            count: 3,
            first_seen: Utc::now(),
            last_seen: Utc::now(),
            attempted_files: Vec::new(),
            resolved_at: None,
            resolved_by: None,
            resolution_type: None,
        };
        let evidence = vec![event(LogLevel::Error, "db timeout again")];
        let prompt = incident_prompt(&incident, &evidence);
        assert!(prompt.contains("Incident ID: inc-1"));
        assert!(prompt.contains("Incident message: db timeout"));
        assert!(prompt.contains("db timeout again"));
    }
}
