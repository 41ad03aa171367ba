//! SurrealDB-backed implementations of the vigil storage traits
//!
//! Uses `schema::IncidentRecord`, `schema::LogEventRecord`, and
//! `schema::TallyRecord` for persistence, converting to/from
//! `storage_traits` types at the boundary. The incident upsert runs as a
//! single transaction so concurrent ingesters of the same fingerprint
//! never open two ACTIVE incidents.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use surrealdb::engine::any::Any;
use surrealdb::Surreal;
use tracing::{debug, info};

use crate::error::{StorageError, StorageResult};
use crate::migrations;
use crate::schema::{IncidentRecord, LogEventRecord, StreamRow, TallyRecord};
use crate::storage_traits::{
    ErrorTally, EventStore, Incident, IncidentId, IncidentSeed, IncidentStore, LogEvent,
    LogStream, StreamPosition, StreamRecord,
};

/// SurrealDB-backed store implementing [`EventStore`], [`IncidentStore`],
/// and [`ErrorTally`] over one connection.
pub struct SurrealStore {
    db: Surreal<Any>,
}

impl SurrealStore {
    /// Create an in-memory instance for testing.
    ///
    /// Connects to `mem://`, selects `vigil/main`, and runs `init_schema`.
    pub async fn in_memory() -> StorageResult<Self> {
        let db = surrealdb::engine::any::connect("mem://")
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        db.use_ns("vigil")
            .use_db("main")
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        migrations::init_schema(&db).await?;

        info!("SurrealStore connected (in-memory)");
        Ok(Self { db })
    }

    /// Create from environment variables.
    ///
    /// Honors `VIGIL_DB_URL` (any SurrealDB endpoint); falls back to local
    /// persistence in `.vigil/db` when unset.
    pub async fn from_env() -> StorageResult<Self> {
        if let Ok(url) = std::env::var("VIGIL_DB_URL") {
            let db = surrealdb::engine::any::connect(&url)
                .await
                .map_err(|e| StorageError::Connection(e.to_string()))?;

            db.use_ns("vigil")
                .use_db("main")
                .await
                .map_err(|e| StorageError::Connection(e.to_string()))?;

            migrations::init_schema(&db).await?;
            info!("SurrealStore connected ({})", url);
            return Ok(Self { db });
        }

        let path = ".vigil/db";
        std::fs::create_dir_all(path).map_err(|e| {
            StorageError::Connection(format!("failed to create database directory {path}: {e}"))
        })?;
        let url = format!("surrealkv://{}", path);
        info!("VIGIL_DB_URL not set, using local persistence: {}", url);

        let db = surrealdb::engine::any::connect(&url)
            .await
            .map_err(|e| StorageError::Connection(format!("failed to connect to {url}: {e}")))?;

        db.use_ns("vigil")
            .use_db("main")
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        migrations::init_schema(&db).await?;
        Ok(Self { db })
    }

    // -- private helpers -----------------------------------------------------

    /// Fetch an incident row by external id, or IncidentNotFound.
    async fn fetch_incident(&self, id: &str) -> StorageResult<IncidentRecord> {
        let id_owned = id.to_string();
        let mut res = self
            .db
            .query("SELECT * FROM incidents WHERE incident_id = $iid")
            .bind(("iid", id_owned))
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        let rows: Vec<IncidentRecord> = res
            .take(0)
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        rows.into_iter()
            .next()
            .ok_or_else(|| StorageError::IncidentNotFound {
                incident_id: id.to_string(),
            })
    }
}

#[async_trait]
impl IncidentStore for SurrealStore {
    async fn record_occurrence(
        &self,
        seed: IncidentSeed,
        now: DateTime<Utc>,
    ) -> StorageResult<Incident> {
        let fingerprint = seed.fingerprint.as_str().to_string();
        let project_id = seed.project_id.clone();
        let fresh = IncidentRecord::open(seed, now);

        debug!(fingerprint = %&fingerprint[..12], "recording occurrence");

        // Find-or-create inside one transaction: the SELECT, the branch,
        // and the final read see a consistent snapshot, so two concurrent
        // writers of the same fingerprint serialize on the table.
        let mut res = self
            .db
            .query(
                r#"
                BEGIN TRANSACTION;
                LET $existing = (
                    SELECT * FROM incidents
                    WHERE project_id = $project_id
                      AND fingerprint = $fingerprint
                      AND status = 'ACTIVE'
                    LIMIT 1
                );
                IF array::len($existing) > 0 {
                    UPDATE incidents
                        SET count += 1, last_seen = $now
                        WHERE incident_id = $existing[0].incident_id;
                } ELSE {
                    CREATE incidents CONTENT $fresh;
                };
                SELECT * FROM incidents
                    WHERE project_id = $project_id
                      AND fingerprint = $fingerprint
                      AND status = 'ACTIVE'
                    LIMIT 1;
                COMMIT TRANSACTION;
                "#,
            )
            .bind(("project_id", project_id))
            .bind(("fingerprint", fingerprint.clone()))
            .bind(("now", surrealdb::sql::Datetime::from(now)))
            .bind(("fresh", fresh))
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        let rows: Vec<IncidentRecord> = res
            .take(2)
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        let row = rows.into_iter().next().ok_or_else(|| {
            StorageError::Backend(format!(
                "upsert for fingerprint {} produced no ACTIVE incident",
                &fingerprint[..12]
            ))
        })?;
        row.into_incident()
    }

    async fn get(&self, id: &IncidentId) -> StorageResult<Incident> {
        let row = self.fetch_incident(&id.0).await?;
        row.into_incident()
    }

    async fn list_active(&self, project_id: &str) -> StorageResult<Vec<Incident>> {
        let pid = project_id.to_string();
        let mut res = self
            .db
            .query(
                "SELECT * FROM incidents WHERE project_id = $pid AND status = 'ACTIVE' \
                 ORDER BY last_seen DESC",
            )
            .bind(("pid", pid))
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        let rows: Vec<IncidentRecord> = res
            .take(0)
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        rows.into_iter().map(|r| r.into_incident()).collect()
    }

    async fn resolve_stale(
        &self,
        cutoff: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> StorageResult<u64> {
        let mut res = self
            .db
            .query(
                "UPDATE incidents \
                 SET status = 'RESOLVED', resolved_at = $now, resolution_type = 'auto_resolved' \
                 WHERE status = 'ACTIVE' AND last_seen < $cutoff",
            )
            .bind(("cutoff", surrealdb::sql::Datetime::from(cutoff)))
            .bind(("now", surrealdb::sql::Datetime::from(now)))
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        let rows: Vec<IncidentRecord> = res
            .take(0)
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        Ok(rows.len() as u64)
    }

    async fn resolve(
        &self,
        id: &IncidentId,
        resolved_by: &str,
        now: DateTime<Utc>,
    ) -> StorageResult<Incident> {
        let row = self.fetch_incident(&id.0).await?;
        if row.status != "ACTIVE" {
            return Err(StorageError::InvalidIncidentState {
                incident_id: id.0.clone(),
                status: row.status,
                expected: "ACTIVE".to_string(),
            });
        }

        let iid = id.0.clone();
        let by = resolved_by.to_string();
        let mut res = self
            .db
            .query(
                "UPDATE incidents \
                 SET status = 'RESOLVED', resolved_at = $now, resolved_by = $by, \
                     resolution_type = 'user_confirmed' \
                 WHERE incident_id = $iid",
            )
            .bind(("iid", iid))
            .bind(("by", by))
            .bind(("now", surrealdb::sql::Datetime::from(now)))
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        let rows: Vec<IncidentRecord> = res
            .take(0)
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        rows.into_iter()
            .next()
            .ok_or_else(|| StorageError::IncidentNotFound {
                incident_id: id.0.clone(),
            })?
            .into_incident()
    }

    async fn add_attempted_file(&self, id: &IncidentId, path: &str) -> StorageResult<Incident> {
        // Existence check first so unknown ids surface as IncidentNotFound.
        self.fetch_incident(&id.0).await?;

        let iid = id.0.clone();
        let p = path.to_string();
        let mut res = self
            .db
            .query(
                "UPDATE incidents \
                 SET attempted_files = array::union(attempted_files, [$path]) \
                 WHERE incident_id = $iid",
            )
            .bind(("iid", iid))
            .bind(("path", p))
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        let rows: Vec<IncidentRecord> = res
            .take(0)
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        rows.into_iter()
            .next()
            .ok_or_else(|| StorageError::IncidentNotFound {
                incident_id: id.0.clone(),
            })?
            .into_incident()
    }
}

#[async_trait]
impl EventStore for SurrealStore {
    async fn append(&self, event: LogEvent) -> StorageResult<()> {
        let row = LogEventRecord::from_event(event);
        let _created: Option<LogEventRecord> = self
            .db
            .create("log_events")
            .content(row)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn recent_for_service(
        &self,
        project_id: &str,
        service: &str,
        limit: usize,
    ) -> StorageResult<Vec<LogEvent>> {
        let pid = project_id.to_string();
        let svc = service.to_string();
        let mut res = self
            .db
            .query(
                "SELECT * FROM log_events \
                 WHERE project_id = $pid AND service = $svc \
                 ORDER BY timestamp DESC LIMIT $limit",
            )
            .bind(("pid", pid))
            .bind(("svc", svc))
            .bind(("limit", limit))
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        let rows: Vec<LogEventRecord> = res
            .take(0)
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        rows.into_iter().map(|r| r.into_event()).collect()
    }

    async fn recent_for_incident(
        &self,
        project_id: &str,
        incident_id: &IncidentId,
        limit: usize,
    ) -> StorageResult<Vec<LogEvent>> {
        let pid = project_id.to_string();
        let iid = incident_id.0.clone();
        let mut res = self
            .db
            .query(
                "SELECT * FROM log_events \
                 WHERE project_id = $pid AND incident_id = $iid \
                 ORDER BY timestamp DESC LIMIT $limit",
            )
            .bind(("pid", pid))
            .bind(("iid", iid))
            .bind(("limit", limit))
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        let rows: Vec<LogEventRecord> = res
            .take(0)
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        rows.into_iter().map(|r| r.into_event()).collect()
    }

    async fn last_position(&self) -> StorageResult<Option<StreamPosition>> {
        let mut res = self
            .db
            .query(
                "SELECT VALUE stream_position FROM log_events \
                 WHERE stream_position != NONE \
                 ORDER BY stream_position DESC LIMIT 1",
            )
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        let positions: Vec<u64> = res
            .take(0)
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        Ok(positions.into_iter().next().map(StreamPosition))
    }
}

#[async_trait]
impl LogStream for SurrealStore {
    async fn publish(&self, record: StreamRecord) -> StorageResult<StreamPosition> {
        // Position comes from the counter singleton inside the same
        // transaction, keeping positions strictly increasing even with
        // several producers.
        let mut res = self
            .db
            .query(
                r#"
                BEGIN TRANSACTION;
                LET $next = (UPSERT stream_counter:main SET value += 1 RETURN VALUE value);
                CREATE stream_records CONTENT {
                    position: $next[0],
                    project_id: $project_id,
                    service: $service,
                    level: $level,
                    message: $message,
                    file: $file,
                    line: $line,
                    timestamp: $timestamp
                };
                COMMIT TRANSACTION;
                "#,
            )
            .bind(("project_id", record.project_id))
            .bind(("service", record.service))
            .bind(("level", record.level))
            .bind(("message", record.message))
            .bind(("file", record.file))
            .bind(("line", record.line))
            .bind(("timestamp", surrealdb::sql::Datetime::from(record.timestamp)))
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        let rows: Vec<StreamRow> = res
            .take(1)
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        rows.into_iter()
            .next()
            .map(|row| StreamPosition(row.position))
            .ok_or_else(|| StorageError::Backend("stream publish returned no row".to_string()))
    }

    async fn read_batch(
        &self,
        after: Option<StreamPosition>,
        max: usize,
    ) -> StorageResult<Vec<(StreamPosition, StreamRecord)>> {
        let floor = after.map(|p| p.0).unwrap_or(0);
        let mut res = self
            .db
            .query(
                "SELECT * FROM stream_records WHERE position > $floor \
                 ORDER BY position ASC LIMIT $max",
            )
            .bind(("floor", floor))
            .bind(("max", max))
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        let rows: Vec<StreamRow> = res
            .take(0)
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        Ok(rows
            .into_iter()
            .map(|row| {
                let (position, record) = row.into_record();
                (StreamPosition(position), record)
            })
            .collect())
    }
}

#[async_trait]
impl ErrorTally for SurrealStore {
    async fn increment(&self, service: &str) -> StorageResult<()> {
        let svc = service.to_string();
        self.db
            .query(
                "UPSERT type::thing('error_tallies', $svc) \
                 SET service = $svc, count += 1",
            )
            .bind(("svc", svc))
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn snapshot(&self) -> StorageResult<HashMap<String, u64>> {
        let mut res = self
            .db
            .query("SELECT service, count FROM error_tallies")
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        let rows: Vec<TallyRecord> = res
            .take(0)
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        Ok(rows.into_iter().map(|r| (r.service, r.count)).collect())
    }
}
