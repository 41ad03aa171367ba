//! Evidence retrieval for diagnosis requests.
//!
//! The retriever's public contract is: **never fails; degrades to an
//! empty set**. Any storage error is logged and swallowed, which routes
//! the request into the sufficiency gate's rejection branch instead of
//! crashing it. Downstream grading depends on this contract.

use std::sync::Arc;

use vigil_state::{EventStore, IncidentId, LogEvent};

use crate::obs;

/// What slice of the event history a diagnosis request is about.
#[derive(Debug, Clone, PartialEq)]
pub enum EvidenceScope {
    /// All events for one service in a project.
    Service {
        project_id: String,
        service: String,
    },
    /// Events tied to one incident.
    Incident {
        project_id: String,
        incident_id: IncidentId,
    },
}

impl EvidenceScope {
    /// Short label for log lines and reports.
    pub fn label(&self) -> String {
        match self {
            EvidenceScope::Service {
                project_id,
                service,
            } => format!("{project_id}/{service}"),
            EvidenceScope::Incident {
                project_id,
                incident_id,
            } => format!("{project_id}/incident/{incident_id}"),
        }
    }
}

/// Pulls the most recent events in scope, newest first.
pub struct EvidenceRetriever {
    events: Arc<dyn EventStore>,
}

impl EvidenceRetriever {
    pub fn new(events: Arc<dyn EventStore>) -> Self {
        Self { events }
    }

    /// Retrieve up to `limit` events for the scope, most recent first.
    ///
    /// Infallible by contract: storage errors degrade to an empty
    /// vector (emitted as an `evidence.degraded` event).
    pub async fn retrieve(&self, scope: &EvidenceScope, limit: usize) -> Vec<LogEvent> {
        let result = match scope {
            EvidenceScope::Service {
                project_id,
                service,
            } => {
                self.events
                    .recent_for_service(project_id, service, limit)
                    .await
            }
            EvidenceScope::Incident {
                project_id,
                incident_id,
            } => {
                self.events
                    .recent_for_incident(project_id, incident_id, limit)
                    .await
            }
        };

        match result {
            Ok(events) => events,
            Err(err) => {
                obs::emit_evidence_degraded(&scope.label(), &err);
                Vec::new()
            }
        }
    }
}
