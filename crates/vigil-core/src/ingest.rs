//! Ingestion pipeline.
//!
//! Single consumer per stream partition, processing in stream order.
//! For every record: persist it as a LogEvent, run ERROR records
//! through the dedup engine (stamping the incident id on the stored
//! event), and bump the per-service error tally. The cursor advances
//! only after durable persistence, so a crash replays the in-flight
//! record (at-least-once).

use std::str::FromStr;
use std::sync::Arc;

use tokio::sync::watch;
use tracing::info;

use vigil_state::{
    ErrorTally, EventStore, IncidentStore, LogEvent, LogLevel, LogStream, StorageResult,
    StreamPosition, StreamRecord,
};

use crate::config::IngestConfig;
use crate::dedup::DedupEngine;
use crate::metrics::METRICS;
use crate::obs;

/// Stream consumer feeding the incident engine.
pub struct Ingestor {
    stream: Arc<dyn LogStream>,
    events: Arc<dyn EventStore>,
    tally: Arc<dyn ErrorTally>,
    dedup: DedupEngine,
    config: IngestConfig,
    cursor: Option<StreamPosition>,
    /// Records at or below this position are already persisted; only
    /// consulted when idempotent replay is on.
    replay_floor: Option<StreamPosition>,
}

impl Ingestor {
    /// Build a consumer starting from the beginning of the stream.
    ///
    /// With `idempotent_replay` on, the store's `last_position` becomes
    /// the replay floor: records at or below it are skipped instead of
    /// double-counted. A failure reading the floor degrades to no floor
    /// (plain at-least-once behavior) rather than blocking startup.
    pub async fn new(
        stream: Arc<dyn LogStream>,
        events: Arc<dyn EventStore>,
        incidents: Arc<dyn IncidentStore>,
        tally: Arc<dyn ErrorTally>,
        config: IngestConfig,
    ) -> Self {
        let replay_floor = if config.idempotent_replay {
            match events.last_position().await {
                Ok(position) => position,
                Err(err) => {
                    tracing::warn!(event = "ingest.floor_unavailable", error = %err);
                    None
                }
            }
        } else {
            None
        };

        Self {
            stream,
            events,
            tally,
            dedup: DedupEngine::new(incidents),
            config,
            cursor: None,
            replay_floor,
        }
    }

    /// Current stream cursor (position of the last processed record).
    pub fn cursor(&self) -> Option<StreamPosition> {
        self.cursor
    }

    /// Process one record: dedup, persist, tally.
    ///
    /// Malformed records (unparsable level) are rejected and skipped;
    /// returning `Ok` advances the cursor past them. Store failures
    /// return `Err` so the caller retries without advancing.
    async fn process_record(
        &self,
        position: StreamPosition,
        record: &StreamRecord,
    ) -> StorageResult<()> {
        let level = match LogLevel::from_str(&record.level) {
            Ok(level) => level,
            Err(err) => {
                obs::emit_record_rejected(position.0, &err);
                return Ok(());
            }
        };

        let mut incident_id = None;
        if level == LogLevel::Error {
            let incident = self
                .dedup
                .record_error(
                    &record.project_id,
                    &record.service,
                    &record.message,
                    record.file.as_deref(),
                    record.line,
                    record.timestamp,
                )
                .await?;
            incident_id = Some(incident.id);
        }

        let event = LogEvent {
            project_id: record.project_id.clone(),
            service: record.service.clone(),
            level,
            message: record.message.clone(),
            file: record.file.clone(),
            line: record.line,
            timestamp: record.timestamp,
            incident_id,
            stream_position: Some(position.0),
        };
        self.events.append(event).await?;

        if level == LogLevel::Error {
            self.tally.increment(&record.service).await?;
        }

        METRICS.inc_events_ingested();
        obs::emit_record_ingested(&record.service, level.as_str(), position.0);
        Ok(())
    }

    /// Read and process one batch. Returns how many records were
    /// processed (skipped replays included). The cursor advances record
    /// by record, never past a failure.
    pub async fn run_once(&mut self) -> StorageResult<usize> {
        let batch = self
            .stream
            .read_batch(self.cursor, self.config.batch_size)
            .await?;

        let mut processed = 0usize;
        for (position, record) in &batch {
            let already_persisted = self
                .replay_floor
                .map(|floor| *position <= floor)
                .unwrap_or(false);

            if !already_persisted {
                self.process_record(*position, record).await?;
            }

            self.cursor = Some(*position);
            processed += 1;
        }
        Ok(processed)
    }

    /// Consume the stream until shutdown.
    ///
    /// Store failures back off exponentially and retry the same records;
    /// the loop never terminates on its own.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) {
        info!(event = "ingest.started", batch_size = self.config.batch_size);
        let mut backoff = self.config.backoff_base;

        loop {
            if *shutdown.borrow() {
                break;
            }

            let outcome = tokio::select! {
                _ = shutdown.changed() => break,
                outcome = self.run_once() => outcome,
            };

            match outcome {
                Ok(0) => {
                    backoff = self.config.backoff_base;
                    tokio::time::sleep(self.config.poll_interval).await;
                }
                Ok(_) => {
                    backoff = self.config.backoff_base;
                }
                Err(err) => {
                    obs::emit_ingest_backoff(backoff.as_millis() as u64, &err);
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(self.config.backoff_max);
                }
            }
        }

        info!(event = "ingest.stopped", cursor = self.cursor.map(|c| c.0).unwrap_or(0));
    }
}

/// Spawn the consumer loop as a background task.
pub fn spawn_ingestor(
    mut ingestor: Ingestor,
    shutdown: watch::Receiver<bool>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        ingestor.run(shutdown).await;
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::time::Duration;
    use vigil_state::fakes::{
        MemoryErrorTally, MemoryEventStore, MemoryIncidentStore, MemoryLogStream,
    };

    fn record(service: &str, level: &str, message: &str) -> StreamRecord {
        StreamRecord {
            project_id: "p1".to_string(),
            service: service.to_string(),
            level: level.to_string(),
            message: message.to_string(),
            file: None,
            line: None,
            timestamp: Utc::now(),
        }
    }

    async fn ingestor_with(
        stream: Arc<MemoryLogStream>,
        events: Arc<MemoryEventStore>,
        incidents: Arc<MemoryIncidentStore>,
        tally: Arc<MemoryErrorTally>,
        config: IngestConfig,
    ) -> Ingestor {
        Ingestor::new(stream, events, incidents, tally, config).await
    }

    #[tokio::test]
    async fn test_run_once_persists_and_advances_cursor() {
        let stream = Arc::new(MemoryLogStream::new());
        let events = Arc::new(MemoryEventStore::new());
        let incidents = Arc::new(MemoryIncidentStore::new());
        let tally = Arc::new(MemoryErrorTally::new());

        stream.publish(record("backend", "INFO", "hello")).await.unwrap();
        stream.publish(record("backend", "ERROR", "boom")).await.unwrap();

        let mut ingestor = ingestor_with(
            stream.clone(),
            events.clone(),
            incidents.clone(),
            tally,
            IngestConfig::default(),
        )
        .await;

        let processed = ingestor.run_once().await.unwrap();
        assert_eq!(processed, 2);
        assert_eq!(events.len(), 2);
        assert_eq!(ingestor.cursor(), Some(StreamPosition(2)));

        // Nothing left: the next poll is empty.
        assert_eq!(ingestor.run_once().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_error_records_open_incidents_and_tally() {
        let stream = Arc::new(MemoryLogStream::new());
        let events = Arc::new(MemoryEventStore::new());
        let incidents = Arc::new(MemoryIncidentStore::new());
        let tally = Arc::new(MemoryErrorTally::new());

        stream.publish(record("backend", "ERROR", "db timeout 1")).await.unwrap();
        stream.publish(record("backend", "ERROR", "db timeout 2")).await.unwrap();
        stream.publish(record("backend", "INFO", "fine")).await.unwrap();

        let mut ingestor = ingestor_with(
            stream,
            events.clone(),
            incidents.clone(),
            tally.clone(),
            IngestConfig::default(),
        )
        .await;
        ingestor.run_once().await.unwrap();

        // Numeric suffixes normalize away: one incident, count 2.
        let active = incidents.list_active("p1").await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].count, 2);

        // ERROR events carry the incident id; INFO events do not.
        let recent = events.recent_for_service("p1", "backend", 10).await.unwrap();
        let stamped = recent.iter().filter(|e| e.incident_id.is_some()).count();
        assert_eq!(stamped, 2);

        let snapshot = tally.snapshot().await.unwrap();
        assert_eq!(snapshot.get("backend"), Some(&2));
    }

    #[tokio::test]
    async fn test_malformed_level_skipped_without_stall() {
        let stream = Arc::new(MemoryLogStream::new());
        let events = Arc::new(MemoryEventStore::new());
        let incidents = Arc::new(MemoryIncidentStore::new());
        let tally = Arc::new(MemoryErrorTally::new());

        stream.publish(record("backend", "FATAL", "unknown level")).await.unwrap();
        stream.publish(record("backend", "ERROR", "boom")).await.unwrap();

        let mut ingestor = ingestor_with(
            stream,
            events.clone(),
            incidents,
            tally,
            IngestConfig::default(),
        )
        .await;
        let processed = ingestor.run_once().await.unwrap();

        assert_eq!(processed, 2);
        assert_eq!(events.len(), 1, "malformed record is skipped, not stored");
        assert_eq!(ingestor.cursor(), Some(StreamPosition(2)));
    }

    #[tokio::test]
    async fn test_idempotent_replay_skips_persisted_positions() {
        let stream = Arc::new(MemoryLogStream::new());
        let events = Arc::new(MemoryEventStore::new());
        let incidents = Arc::new(MemoryIncidentStore::new());
        let tally = Arc::new(MemoryErrorTally::new());

        stream.publish(record("backend", "ERROR", "boom")).await.unwrap();
        stream.publish(record("backend", "ERROR", "boom")).await.unwrap();

        // First consumer run persists both records.
        let mut first = ingestor_with(
            stream.clone(),
            events.clone(),
            incidents.clone(),
            tally.clone(),
            IngestConfig {
                idempotent_replay: true,
                ..IngestConfig::default()
            },
        )
        .await;
        first.run_once().await.unwrap();
        assert_eq!(events.len(), 2);
        let count_before = incidents.list_active("p1").await.unwrap()[0].count;

        // A restarted consumer replays from the beginning but skips
        // everything at or below the persisted floor.
        let mut replayed = ingestor_with(
            stream,
            events.clone(),
            incidents.clone(),
            tally,
            IngestConfig {
                idempotent_replay: true,
                ..IngestConfig::default()
            },
        )
        .await;
        replayed.run_once().await.unwrap();

        assert_eq!(events.len(), 2, "no duplicate events after replay");
        let count_after = incidents.list_active("p1").await.unwrap()[0].count;
        assert_eq!(count_after, count_before, "no double-counted occurrences");
    }

    #[tokio::test]
    async fn test_replay_double_counts_by_default() {
        // With idempotent replay off (the default), a restarted consumer
        // re-processes the stream: documented at-least-once behavior.
        let stream = Arc::new(MemoryLogStream::new());
        let events = Arc::new(MemoryEventStore::new());
        let incidents = Arc::new(MemoryIncidentStore::new());
        let tally = Arc::new(MemoryErrorTally::new());

        stream.publish(record("backend", "ERROR", "boom")).await.unwrap();

        let mut first = ingestor_with(
            stream.clone(),
            events.clone(),
            incidents.clone(),
            tally.clone(),
            IngestConfig::default(),
        )
        .await;
        first.run_once().await.unwrap();

        let mut replayed = ingestor_with(
            stream,
            events.clone(),
            incidents.clone(),
            tally,
            IngestConfig::default(),
        )
        .await;
        replayed.run_once().await.unwrap();

        assert_eq!(events.len(), 2);
        assert_eq!(incidents.list_active("p1").await.unwrap()[0].count, 2);
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let stream = Arc::new(MemoryLogStream::new());
        let events = Arc::new(MemoryEventStore::new());
        let incidents = Arc::new(MemoryIncidentStore::new());
        let tally = Arc::new(MemoryErrorTally::new());

        let ingestor = ingestor_with(stream, events, incidents, tally, IngestConfig::default()).await;

        let (tx, rx) = watch::channel(false);
        let handle = spawn_ingestor(ingestor, rx);

        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("consumer must stop on shutdown signal")
            .unwrap();
    }
}
