//! SurrealDB schema migrations and initialization
//!
//! Sets up the vigil tables with indexes on the lookup paths the engine
//! uses. Safe to call multiple times (idempotent).

use surrealdb::engine::any::Any;
use surrealdb::Surreal;
use tracing::{debug, info};

use crate::error::StorageResult;

/// Initialize all vigil tables in SurrealDB
pub async fn init_schema(db: &Surreal<Any>) -> StorageResult<()> {
    info!("Initializing vigil SurrealDB schema");

    init_incidents_table(db).await?;
    init_log_events_table(db).await?;
    init_error_tallies_table(db).await?;
    init_stream_table(db).await?;

    info!("vigil schema initialization complete");
    Ok(())
}

/// Initialize the `incidents` table.
///
/// The dedup lookup is `(project_id, fingerprint, status)`; incidents are
/// never deleted, so deletes are denied at the table level. Uniqueness of
/// the ACTIVE row per fingerprint is enforced by the upsert transaction,
/// not by an index (resolved rows share the fingerprint).
async fn init_incidents_table(db: &Surreal<Any>) -> StorageResult<()> {
    debug!("Initializing incidents table");

    let sql = r#"
        DEFINE TABLE incidents AS
            SCHEMALESS
            PERMISSIONS
                FOR create FULL
                FOR read FULL
                FOR update FULL
                FOR delete NONE;

        -- incident_id is the external identifier
        DEFINE INDEX idx_incident_id ON TABLE incidents COLUMNS incident_id UNIQUE;

        -- Dedup lookup path
        DEFINE INDEX idx_incident_fingerprint ON TABLE incidents COLUMNS project_id, fingerprint, status;

        -- Sweeper scan and active listing
        DEFINE INDEX idx_incident_status_seen ON TABLE incidents COLUMNS status, last_seen;
    "#;

    db.query(sql).await?;
    Ok(())
}

/// Initialize the `log_events` table.
///
/// Events are immutable facts: updates and deletes are denied.
async fn init_log_events_table(db: &Surreal<Any>) -> StorageResult<()> {
    debug!("Initializing log_events table");

    let sql = r#"
        DEFINE TABLE log_events AS
            SCHEMALESS
            PERMISSIONS
                FOR create FULL
                FOR read FULL
                FOR update NONE
                FOR delete NONE;

        -- Evidence retrieval by service
        DEFINE INDEX idx_event_service ON TABLE log_events COLUMNS project_id, service, timestamp;

        -- Evidence retrieval by incident
        DEFINE INDEX idx_event_incident ON TABLE log_events COLUMNS project_id, incident_id, timestamp;

        -- Replay cursor recovery
        DEFINE INDEX idx_event_position ON TABLE log_events COLUMNS stream_position;
    "#;

    db.query(sql).await?;
    Ok(())
}

/// Initialize the `stream_records` table and its position counter.
///
/// The stream is append-only and replayable: records are never updated
/// or deleted, and `position` is assigned from the `stream_counter`
/// singleton inside the publish transaction.
async fn init_stream_table(db: &Surreal<Any>) -> StorageResult<()> {
    debug!("Initializing stream_records table");

    let sql = r#"
        DEFINE TABLE stream_records AS
            SCHEMALESS
            PERMISSIONS
                FOR create FULL
                FOR read FULL
                FOR update NONE
                FOR delete NONE;

        DEFINE INDEX idx_stream_position ON TABLE stream_records COLUMNS position UNIQUE;

        DEFINE TABLE stream_counter AS
            SCHEMALESS
            PERMISSIONS
                FOR create FULL
                FOR read FULL
                FOR update FULL
                FOR delete NONE;
    "#;

    db.query(sql).await?;
    Ok(())
}

/// Initialize the `error_tallies` table (one row per service).
async fn init_error_tallies_table(db: &Surreal<Any>) -> StorageResult<()> {
    debug!("Initializing error_tallies table");

    let sql = r#"
        DEFINE TABLE error_tallies AS
            SCHEMALESS
            PERMISSIONS
                FOR create FULL
                FOR read FULL
                FOR update FULL
                FOR delete NONE;

        DEFINE INDEX idx_tally_service ON TABLE error_tallies COLUMNS service UNIQUE;
    "#;

    db.query(sql).await?;
    Ok(())
}
