//! In-memory fakes for storage traits (testing only)
//!
//! Provides `MemoryEventStore`, `MemoryIncidentStore`, `MemoryErrorTally`,
//! and `MemoryLogStream` that satisfy the trait contracts without any
//! external dependencies. The incident fake holds its mutex across the
//! whole find-or-create, giving the same atomicity the SurrealDB
//! implementation gets from a transaction.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{StorageError, StorageResult};
use crate::storage_traits::*;

// ---------------------------------------------------------------------------
// MemoryEventStore
// ---------------------------------------------------------------------------

/// In-memory append-only event store backed by a `Vec<LogEvent>`.
#[derive(Debug, Default)]
pub struct MemoryEventStore {
    events: Mutex<Vec<LogEvent>>,
}

impl MemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of stored events (test helper).
    pub fn len(&self) -> usize {
        self.events.lock().unwrap().len()
    }

    /// Whether the store is empty (test helper).
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl EventStore for MemoryEventStore {
    async fn append(&self, event: LogEvent) -> StorageResult<()> {
        let mut events = self.events.lock().unwrap();
        events.push(event);
        Ok(())
    }

    async fn recent_for_service(
        &self,
        project_id: &str,
        service: &str,
        limit: usize,
    ) -> StorageResult<Vec<LogEvent>> {
        let events = self.events.lock().unwrap();
        let mut matched: Vec<LogEvent> = events
            .iter()
            .filter(|e| e.project_id == project_id && e.service == service)
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        matched.truncate(limit);
        Ok(matched)
    }

    async fn recent_for_incident(
        &self,
        project_id: &str,
        incident_id: &IncidentId,
        limit: usize,
    ) -> StorageResult<Vec<LogEvent>> {
        let events = self.events.lock().unwrap();
        let mut matched: Vec<LogEvent> = events
            .iter()
            .filter(|e| {
                e.project_id == project_id && e.incident_id.as_ref() == Some(incident_id)
            })
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        matched.truncate(limit);
        Ok(matched)
    }

    async fn last_position(&self) -> StorageResult<Option<StreamPosition>> {
        let events = self.events.lock().unwrap();
        Ok(events
            .iter()
            .filter_map(|e| e.stream_position)
            .max()
            .map(StreamPosition))
    }
}

// ---------------------------------------------------------------------------
// MemoryIncidentStore
// ---------------------------------------------------------------------------

/// In-memory incident store backed by a `HashMap<id, Incident>`.
#[derive(Debug, Default)]
pub struct MemoryIncidentStore {
    incidents: Mutex<HashMap<String, Incident>>,
}

impl MemoryIncidentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every stored incident regardless of status (test helper).
    pub fn all(&self) -> Vec<Incident> {
        self.incidents.lock().unwrap().values().cloned().collect()
    }
}

#[async_trait]
impl IncidentStore for MemoryIncidentStore {
    async fn record_occurrence(
        &self,
        seed: IncidentSeed,
        now: chrono::DateTime<chrono::Utc>,
    ) -> StorageResult<Incident> {
        // The lock spans find + mutate + insert: two concurrent callers
        // with the same fingerprint serialize here, matching the atomic
        // upsert contract.
        let mut incidents = self.incidents.lock().unwrap();

        let existing = incidents.values_mut().find(|i| {
            i.project_id == seed.project_id
                && i.fingerprint == seed.fingerprint
                && i.status == IncidentStatus::Active
        });

        if let Some(incident) = existing {
            incident.count += 1;
            if now > incident.last_seen {
                incident.last_seen = now;
            }
            return Ok(incident.clone());
        }

        let incident = Incident {
            id: IncidentId::new(),
            project_id: seed.project_id,
            service: seed.service,
            fingerprint: seed.fingerprint,
            normalized_message: seed.normalized_message,
            file: seed.file,
            line: seed.line,
            status: IncidentStatus::Active,
            count: 1,
            first_seen: now,
            last_seen: now,
            attempted_files: Vec::new(),
            resolved_at: None,
            resolved_by: None,
            resolution_type: None,
        };
        incidents.insert(incident.id.0.clone(), incident.clone());
        Ok(incident)
    }

    async fn get(&self, id: &IncidentId) -> StorageResult<Incident> {
        let incidents = self.incidents.lock().unwrap();
        incidents
            .get(&id.0)
            .cloned()
            .ok_or_else(|| StorageError::IncidentNotFound {
                incident_id: id.0.clone(),
            })
    }

    async fn list_active(&self, project_id: &str) -> StorageResult<Vec<Incident>> {
        let incidents = self.incidents.lock().unwrap();
        let mut active: Vec<Incident> = incidents
            .values()
            .filter(|i| i.project_id == project_id && i.status == IncidentStatus::Active)
            .cloned()
            .collect();
        active.sort_by(|a, b| b.last_seen.cmp(&a.last_seen));
        Ok(active)
    }

    async fn resolve_stale(
        &self,
        cutoff: chrono::DateTime<chrono::Utc>,
        now: chrono::DateTime<chrono::Utc>,
    ) -> StorageResult<u64> {
        let mut incidents = self.incidents.lock().unwrap();
        let mut resolved = 0u64;
        for incident in incidents.values_mut() {
            if incident.status == IncidentStatus::Active && incident.last_seen < cutoff {
                incident.status = IncidentStatus::Resolved;
                incident.resolved_at = Some(now);
                incident.resolution_type = Some("auto_resolved".to_string());
                resolved += 1;
            }
        }
        Ok(resolved)
    }

    async fn resolve(
        &self,
        id: &IncidentId,
        resolved_by: &str,
        now: chrono::DateTime<chrono::Utc>,
    ) -> StorageResult<Incident> {
        let mut incidents = self.incidents.lock().unwrap();
        let incident = incidents
            .get_mut(&id.0)
            .ok_or_else(|| StorageError::IncidentNotFound {
                incident_id: id.0.clone(),
            })?;
        if incident.status != IncidentStatus::Active {
            return Err(StorageError::InvalidIncidentState {
                incident_id: id.0.clone(),
                status: incident.status.as_str().to_string(),
                expected: "ACTIVE".to_string(),
            });
        }
        incident.status = IncidentStatus::Resolved;
        incident.resolved_at = Some(now);
        incident.resolved_by = Some(resolved_by.to_string());
        incident.resolution_type = Some("user_confirmed".to_string());
        Ok(incident.clone())
    }

    async fn add_attempted_file(&self, id: &IncidentId, path: &str) -> StorageResult<Incident> {
        let mut incidents = self.incidents.lock().unwrap();
        let incident = incidents
            .get_mut(&id.0)
            .ok_or_else(|| StorageError::IncidentNotFound {
                incident_id: id.0.clone(),
            })?;
        if !incident.attempted_files.iter().any(|p| p == path) {
            incident.attempted_files.push(path.to_string());
        }
        Ok(incident.clone())
    }
}

// ---------------------------------------------------------------------------
// MemoryErrorTally
// ---------------------------------------------------------------------------

/// In-memory error tally backed by a `HashMap<service, u64>`.
#[derive(Debug, Default)]
pub struct MemoryErrorTally {
    counts: Mutex<HashMap<String, u64>>,
}

impl MemoryErrorTally {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ErrorTally for MemoryErrorTally {
    async fn increment(&self, service: &str) -> StorageResult<()> {
        let mut counts = self.counts.lock().unwrap();
        *counts.entry(service.to_string()).or_insert(0) += 1;
        Ok(())
    }

    async fn snapshot(&self) -> StorageResult<HashMap<String, u64>> {
        let counts = self.counts.lock().unwrap();
        Ok(counts.clone())
    }
}

// ---------------------------------------------------------------------------
// MemoryLogStream
// ---------------------------------------------------------------------------

/// In-memory replayable stream backed by a `Vec<(position, record)>`.
///
/// Positions start at 1 and increase by 1 per published record.
#[derive(Debug, Default)]
pub struct MemoryLogStream {
    records: Mutex<Vec<(StreamPosition, StreamRecord)>>,
}

impl MemoryLogStream {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LogStream for MemoryLogStream {
    async fn publish(&self, record: StreamRecord) -> StorageResult<StreamPosition> {
        let mut records = self.records.lock().unwrap();
        let position = StreamPosition(records.len() as u64 + 1);
        records.push((position, record));
        Ok(position)
    }

    async fn read_batch(
        &self,
        after: Option<StreamPosition>,
        max: usize,
    ) -> StorageResult<Vec<(StreamPosition, StreamRecord)>> {
        let records = self.records.lock().unwrap();
        let batch: Vec<(StreamPosition, StreamRecord)> = records
            .iter()
            .filter(|(pos, _)| after.map(|a| *pos > a).unwrap_or(true))
            .take(max)
            .cloned()
            .collect();
        Ok(batch)
    }
}
