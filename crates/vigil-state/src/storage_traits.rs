//! Storage trait definitions for vigil
//!
//! These traits define the core storage abstractions:
//! - `EventStore`: append-only log event persistence and evidence queries
//! - `IncidentStore`: incident aggregates (atomic upsert-by-fingerprint)
//! - `ErrorTally`: fast per-service error counters for live dashboards
//! - `LogStream`: the durable, replayable ingestion stream
//!
//! All traits are async and backend-agnostic. In-memory fakes are provided
//! for testing via the `fakes` module.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::collections::HashMap;

use crate::error::{StorageError, StorageResult};

// ---------------------------------------------------------------------------
// Fingerprint — error-class identity
// ---------------------------------------------------------------------------

/// Fingerprint of a recurring error class (SHA-256 hex string).
///
/// The inner field is private to guarantee the string is always valid
/// lowercase hex produced by `derive` or validated via `TryFrom<String>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Derive the fingerprint for one error signature.
    ///
    /// Hashes `project_id : service : normalized_message : file : line`,
    /// with absent file/line rendered as `-` so the layout stays stable.
    pub fn derive(
        project_id: &str,
        service: &str,
        normalized_message: &str,
        file: Option<&str>,
        line: Option<u32>,
    ) -> Self {
        use sha2::Digest;
        let line_part = line.map(|l| l.to_string());
        let input = format!(
            "{}:{}:{}:{}:{}",
            project_id,
            service,
            normalized_message,
            file.unwrap_or("-"),
            line_part.as_deref().unwrap_or("-"),
        );
        let mut hasher = Sha256::new();
        hasher.update(input.as_bytes());
        Fingerprint(hex::encode(hasher.finalize()))
    }

    /// Return the full hex string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short form (first 12 hex chars), for log lines.
    pub fn short(&self) -> &str {
        &self.0[..12.min(self.0.len())]
    }
}

impl TryFrom<String> for Fingerprint {
    type Error = StorageError;

    fn try_from(s: String) -> std::result::Result<Self, Self::Error> {
        if s.len() != 64 || !s.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(StorageError::InvalidFingerprint { fingerprint: s });
        }
        Ok(Fingerprint(s.to_ascii_lowercase()))
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Log events
// ---------------------------------------------------------------------------

/// Unique identifier for an incident
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IncidentId(pub String);

impl IncidentId {
    /// Generate a new random IncidentId
    pub fn new() -> Self {
        IncidentId(uuid::Uuid::new_v4().to_string())
    }
}

impl Default for IncidentId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for IncidentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Severity level of a log event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

impl LogLevel {
    /// Canonical uppercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warning => "WARNING",
            LogLevel::Error => "ERROR",
        }
    }
}

impl std::str::FromStr for LogLevel {
    type Err = StorageError;

    /// Case-insensitive parse. Unknown names are rejected, not defaulted.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "DEBUG" => Ok(LogLevel::Debug),
            "INFO" => Ok(LogLevel::Info),
            "WARNING" => Ok(LogLevel::Warning),
            "ERROR" => Ok(LogLevel::Error),
            other => Err(StorageError::InvalidRecord(format!(
                "unknown log level: {other}"
            ))),
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An immutable log event fact.
///
/// Created by ingestion, never mutated, retained for evidence retrieval.
/// `incident_id` is set only for ERROR events that matched or created an
/// incident. `stream_position` records where in the ingestion stream the
/// event came from, enabling idempotent replay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEvent {
    pub project_id: String,
    pub service: String,
    pub level: LogLevel,
    pub message: String,
    pub file: Option<String>,
    pub line: Option<u32>,
    pub timestamp: DateTime<Utc>,
    pub incident_id: Option<IncidentId>,
    pub stream_position: Option<u64>,
}

// ---------------------------------------------------------------------------
// Incidents
// ---------------------------------------------------------------------------

/// Lifecycle status of an incident
///
/// Transitions one way: Active → Resolved. Reopening is not supported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum IncidentStatus {
    Active,
    Resolved,
}

impl IncidentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IncidentStatus::Active => "ACTIVE",
            IncidentStatus::Resolved => "RESOLVED",
        }
    }
}

/// The mutable aggregate tracking one recurring error signature.
///
/// Invariant: at most one ACTIVE incident exists per
/// `(project_id, fingerprint)` tuple. `count` and `last_seen` are
/// monotonically non-decreasing; `first_seen` and `fingerprint` are
/// immutable after creation. Incidents are never physically deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Incident {
    pub id: IncidentId,
    pub project_id: String,
    pub service: String,
    pub fingerprint: Fingerprint,
    pub normalized_message: String,
    pub file: Option<String>,
    pub line: Option<u32>,
    pub status: IncidentStatus,
    pub count: u64,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    /// Paths tried and rejected during manual resolution (set semantics).
    pub attempted_files: Vec<String>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolved_by: Option<String>,
    pub resolution_type: Option<String>,
}

/// The immutable identity of a would-be incident, used by the upsert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncidentSeed {
    pub project_id: String,
    pub service: String,
    pub fingerprint: Fingerprint,
    pub normalized_message: String,
    pub file: Option<String>,
    pub line: Option<u32>,
}

// ---------------------------------------------------------------------------
// Ingestion stream
// ---------------------------------------------------------------------------

/// Monotonic position within the ingestion stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StreamPosition(pub u64);

impl std::fmt::Display for StreamPosition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One raw record on the ingestion stream.
///
/// `level` stays a raw string here: producers are untrusted, so the
/// consumer parses and rejects malformed levels at the boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamRecord {
    pub project_id: String,
    pub service: String,
    pub level: String,
    pub message: String,
    pub file: Option<String>,
    pub line: Option<u32>,
    pub timestamp: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// EventStore — durable log event persistence
// ---------------------------------------------------------------------------

/// Append-only log event store.
///
/// Guarantees:
/// - Appended events are immutable.
/// - `recent_*` queries return events most recent first.
/// - `last_position` reports the highest stream position ever persisted,
///   letting a restarted consumer skip already-ingested records.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Persist one log event.
    async fn append(&self, event: LogEvent) -> StorageResult<()>;

    /// Most recent events for a project + service, newest first.
    async fn recent_for_service(
        &self,
        project_id: &str,
        service: &str,
        limit: usize,
    ) -> StorageResult<Vec<LogEvent>>;

    /// Most recent events tied to one incident, newest first.
    async fn recent_for_incident(
        &self,
        project_id: &str,
        incident_id: &IncidentId,
        limit: usize,
    ) -> StorageResult<Vec<LogEvent>>;

    /// Highest stream position ever durably persisted, if any.
    async fn last_position(&self) -> StorageResult<Option<StreamPosition>>;
}

// ---------------------------------------------------------------------------
// IncidentStore — incident aggregates
// ---------------------------------------------------------------------------

/// Incident aggregate store.
///
/// Guarantees:
/// - `record_occurrence` is an atomic find-or-create keyed on
///   `(project_id, fingerprint, status = ACTIVE)`: concurrent callers
///   with the same fingerprint never produce two ACTIVE incidents.
/// - `resolve_stale` is one bulk transition, safe to re-run.
/// - Resolution is one-way; resolved incidents are never reactivated.
#[async_trait]
pub trait IncidentStore: Send + Sync {
    /// Find-or-create for one error occurrence.
    ///
    /// Hit: atomically increment `count` and set `last_seen = now`.
    /// Miss: create with `count = 1`, `first_seen = last_seen = now`.
    /// Returns the incident the occurrence belongs to.
    async fn record_occurrence(
        &self,
        seed: IncidentSeed,
        now: DateTime<Utc>,
    ) -> StorageResult<Incident>;

    /// Point lookup by id.
    async fn get(&self, id: &IncidentId) -> StorageResult<Incident>;

    /// All ACTIVE incidents for a project, most recently seen first.
    async fn list_active(&self, project_id: &str) -> StorageResult<Vec<Incident>>;

    /// Bulk-resolve every ACTIVE incident with `last_seen < cutoff`.
    ///
    /// Stamps `resolved_at = now` and `resolution_type = "auto_resolved"`.
    /// Returns how many incidents were transitioned.
    async fn resolve_stale(
        &self,
        cutoff: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> StorageResult<u64>;

    /// Manually resolve an incident, recording what fixed it.
    ///
    /// Sets `resolved_by` and `resolution_type = "user_confirmed"`.
    /// Fails if the incident is not ACTIVE.
    async fn resolve(
        &self,
        id: &IncidentId,
        resolved_by: &str,
        now: DateTime<Utc>,
    ) -> StorageResult<Incident>;

    /// Record a file path that was tried and rejected (set semantics:
    /// adding the same path twice keeps one entry).
    async fn add_attempted_file(&self, id: &IncidentId, path: &str) -> StorageResult<Incident>;
}

// ---------------------------------------------------------------------------
// ErrorTally — fast per-service error counters
// ---------------------------------------------------------------------------

/// Per-service error counters backing live dashboards.
///
/// Eventually consistent by contract: increments may race and the
/// snapshot may lag, which the dashboard use case tolerates.
#[async_trait]
pub trait ErrorTally: Send + Sync {
    /// Bump the error counter for a service.
    async fn increment(&self, service: &str) -> StorageResult<()>;

    /// Current counter values per service.
    async fn snapshot(&self) -> StorageResult<HashMap<String, u64>>;
}

// ---------------------------------------------------------------------------
// LogStream — durable, replayable ingestion stream
// ---------------------------------------------------------------------------

/// Append-only, ordered, replayable event stream.
///
/// The consumer commits progress by remembering the position of the last
/// record it durably persisted; `read_batch` with that position replays
/// everything after it. Positions are strictly increasing.
#[async_trait]
pub trait LogStream: Send + Sync {
    /// Publish one record, returning its assigned position.
    async fn publish(&self, record: StreamRecord) -> StorageResult<StreamPosition>;

    /// Read up to `max` records strictly after `after` (or from the
    /// beginning when `after` is `None`), in stream order.
    async fn read_batch(
        &self,
        after: Option<StreamPosition>,
        max: usize,
    ) -> StorageResult<Vec<(StreamPosition, StreamRecord)>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_fingerprint_derive_is_stable() {
        let a = Fingerprint::derive("p1", "backend", "db timeout", Some("db.py"), Some(42));
        let b = Fingerprint::derive("p1", "backend", "db timeout", Some("db.py"), Some(42));
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), 64);
    }

    #[test]
    fn test_fingerprint_derive_distinguishes_parts() {
        let base = Fingerprint::derive("p1", "backend", "db timeout", None, None);
        assert_ne!(
            base,
            Fingerprint::derive("p2", "backend", "db timeout", None, None)
        );
        assert_ne!(
            base,
            Fingerprint::derive("p1", "worker", "db timeout", None, None)
        );
        assert_ne!(
            base,
            Fingerprint::derive("p1", "backend", "db timeout", Some("db.py"), None)
        );
        assert_ne!(
            base,
            Fingerprint::derive("p1", "backend", "db timeout", None, Some(7))
        );
    }

    #[test]
    fn test_fingerprint_try_from_validates() {
        assert!(Fingerprint::try_from("zz".to_string()).is_err());
        let hex64 = "a".repeat(64);
        let fp = Fingerprint::try_from(hex64.clone()).expect("valid hex");
        assert_eq!(fp.as_str(), hex64);
        assert_eq!(fp.short().len(), 12);
    }

    #[test]
    fn test_log_level_parse() {
        assert_eq!(LogLevel::from_str("error").unwrap(), LogLevel::Error);
        assert_eq!(LogLevel::from_str("Warning").unwrap(), LogLevel::Warning);
        assert_eq!(LogLevel::from_str("INFO").unwrap(), LogLevel::Info);
        assert!(LogLevel::from_str("fatal").is_err());
    }

    #[test]
    fn test_log_level_serde_uppercase() {
        let json = serde_json::to_string(&LogLevel::Error).unwrap();
        assert_eq!(json, "\"ERROR\"");
        let back: LogLevel = serde_json::from_str("\"WARNING\"").unwrap();
        assert_eq!(back, LogLevel::Warning);
    }

    #[test]
    fn test_stream_position_ordering() {
        assert!(StreamPosition(1) < StreamPosition(2));
        assert_eq!(StreamPosition(3), StreamPosition(3));
    }
}
