//! Schema definitions for vigil SurrealDB tables
//!
//! Tables:
//! - incidents: incident aggregates (one ACTIVE row per fingerprint)
//! - log_events: immutable log event facts
//! - error_tallies: per-service error counters

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StorageResult;
use crate::storage_traits::{
    Fingerprint, Incident, IncidentId, IncidentSeed, IncidentStatus, LogEvent, LogLevel,
};

/// Module for serializing chrono DateTime to SurrealDB datetime format
mod surreal_datetime {
    use chrono::{DateTime, Utc};
    use serde::{self, Deserialize, Deserializer, Serializer};
    use surrealdb::sql::Datetime as SurrealDatetime;

    pub fn serialize<S>(date: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let sd = SurrealDatetime::from(*date);
        serde::Serialize::serialize(&sd, serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let sd = SurrealDatetime::deserialize(deserializer)?;
        Ok(DateTime::from(sd))
    }
}

/// Module for serializing optional chrono DateTime to SurrealDB datetime format
mod surreal_datetime_opt {
    use chrono::{DateTime, Utc};
    use serde::{self, Deserialize, Deserializer, Serializer};
    use surrealdb::sql::Datetime as SurrealDatetime;

    pub fn serialize<S>(date: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match date {
            Some(d) => {
                let sd = SurrealDatetime::from(*d);
                serde::Serialize::serialize(&Some(sd), serializer)
            }
            None => serde::Serialize::serialize(&None::<SurrealDatetime>, serializer),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let sd = Option::<SurrealDatetime>::deserialize(deserializer)?;
        Ok(sd.map(DateTime::from))
    }
}

/// DB row for the `incidents` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncidentRecord {
    pub incident_id: String,
    pub project_id: String,
    pub service: String,
    pub fingerprint: String,
    pub normalized_message: String,
    pub file: Option<String>,
    pub line: Option<u32>,
    pub status: String,
    pub count: u64,
    #[serde(with = "surreal_datetime")]
    pub first_seen: DateTime<Utc>,
    #[serde(with = "surreal_datetime")]
    pub last_seen: DateTime<Utc>,
    pub attempted_files: Vec<String>,
    #[serde(with = "surreal_datetime_opt")]
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolved_by: Option<String>,
    pub resolution_type: Option<String>,
}

impl IncidentRecord {
    /// Fresh ACTIVE row for a first occurrence.
    pub fn open(seed: IncidentSeed, now: DateTime<Utc>) -> Self {
        Self {
            incident_id: IncidentId::new().0,
            project_id: seed.project_id,
            service: seed.service,
            fingerprint: seed.fingerprint.as_str().to_string(),
            normalized_message: seed.normalized_message,
            file: seed.file,
            line: seed.line,
            status: IncidentStatus::Active.as_str().to_string(),
            count: 1,
            first_seen: now,
            last_seen: now,
            attempted_files: Vec::new(),
            resolved_at: None,
            resolved_by: None,
            resolution_type: None,
        }
    }

    /// Convert a DB row into the domain aggregate.
    pub fn into_incident(self) -> StorageResult<Incident> {
        let status = match self.status.as_str() {
            "ACTIVE" => IncidentStatus::Active,
            "RESOLVED" => IncidentStatus::Resolved,
            other => {
                return Err(crate::error::StorageError::InvalidRecord(format!(
                    "unknown incident status: {other}"
                )))
            }
        };
        Ok(Incident {
            id: IncidentId(self.incident_id),
            project_id: self.project_id,
            service: self.service,
            fingerprint: Fingerprint::try_from(self.fingerprint)?,
            normalized_message: self.normalized_message,
            file: self.file,
            line: self.line,
            status,
            count: self.count,
            first_seen: self.first_seen,
            last_seen: self.last_seen,
            attempted_files: self.attempted_files,
            resolved_at: self.resolved_at,
            resolved_by: self.resolved_by,
            resolution_type: self.resolution_type,
        })
    }
}

/// DB row for the `log_events` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEventRecord {
    pub project_id: String,
    pub service: String,
    pub level: String,
    pub message: String,
    pub file: Option<String>,
    pub line: Option<u32>,
    #[serde(with = "surreal_datetime")]
    pub timestamp: DateTime<Utc>,
    pub incident_id: Option<String>,
    pub stream_position: Option<u64>,
}

impl LogEventRecord {
    pub fn from_event(event: LogEvent) -> Self {
        Self {
            project_id: event.project_id,
            service: event.service,
            level: event.level.as_str().to_string(),
            message: event.message,
            file: event.file,
            line: event.line,
            timestamp: event.timestamp,
            incident_id: event.incident_id.map(|i| i.0),
            stream_position: event.stream_position,
        }
    }

    pub fn into_event(self) -> StorageResult<LogEvent> {
        let level: LogLevel = self.level.parse()?;
        Ok(LogEvent {
            project_id: self.project_id,
            service: self.service,
            level,
            message: self.message,
            file: self.file,
            line: self.line,
            timestamp: self.timestamp,
            incident_id: self.incident_id.map(IncidentId),
            stream_position: self.stream_position,
        })
    }
}

/// DB row for the `error_tallies` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TallyRecord {
    pub service: String,
    pub count: u64,
}

/// DB row for the `stream_records` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamRow {
    pub position: u64,
    pub project_id: String,
    pub service: String,
    pub level: String,
    pub message: String,
    pub file: Option<String>,
    pub line: Option<u32>,
    #[serde(with = "surreal_datetime")]
    pub timestamp: DateTime<Utc>,
}

impl StreamRow {
    pub fn into_record(self) -> (u64, crate::storage_traits::StreamRecord) {
        (
            self.position,
            crate::storage_traits::StreamRecord {
                project_id: self.project_id,
                service: self.service,
                level: self.level,
                message: self.message,
                file: self.file,
                line: self.line,
                timestamp: self.timestamp,
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn seed() -> IncidentSeed {
        IncidentSeed {
            project_id: "p1".to_string(),
            service: "backend".to_string(),
            fingerprint: Fingerprint::derive("p1", "backend", "db down", None, None),
            normalized_message: "db down".to_string(),
            file: None,
            line: None,
        }
    }

    #[test]
    fn test_open_row_defaults() {
        let row = IncidentRecord::open(seed(), Utc::now());
        assert_eq!(row.status, "ACTIVE");
        assert_eq!(row.count, 1);
        assert_eq!(row.first_seen, row.last_seen);
        assert!(row.attempted_files.is_empty());
        assert!(row.resolved_at.is_none());
    }

    #[test]
    fn test_row_round_trips_to_incident() {
        let row = IncidentRecord::open(seed(), Utc::now());
        let incident = row.into_incident().expect("convert");
        assert_eq!(incident.status, IncidentStatus::Active);
        assert_eq!(incident.count, 1);
        assert_eq!(incident.service, "backend");
    }

    #[test]
    fn test_unknown_status_rejected() {
        let mut row = IncidentRecord::open(seed(), Utc::now());
        row.status = "REOPENED".to_string();
        assert!(row.into_incident().is_err());
    }
}
