//! Engine configuration.
//!
//! Every tunable the engine honors lives here, with `Default` impls
//! and optional environment overrides via `from_env`. Components take
//! the config struct they need, never read the environment themselves.

use std::time::Duration;

/// Sufficiency gate thresholds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GradingConfig {
    /// Minimum evidence set size to attempt a diagnosis.
    pub min_events: usize,
    /// From this size on, a single distinct message is treated as noise.
    pub noise_threshold: usize,
}

impl Default for GradingConfig {
    fn default() -> Self {
        Self {
            min_events: 5,
            noise_threshold: 20,
        }
    }
}

/// Diagnosis orchestrator bounds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagnosisConfig {
    /// Maximum generator attempts per request.
    pub max_retries: u32,
    /// How many recent events to pull as evidence.
    pub evidence_limit: usize,
}

impl Default for DiagnosisConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            evidence_limit: 20,
        }
    }
}

/// Ingestion consumer tuning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestConfig {
    /// Records read per stream poll.
    pub batch_size: usize,
    /// Idle delay between polls when the stream is empty.
    pub poll_interval: Duration,
    /// Base delay for exponential backoff after a store failure.
    pub backoff_base: Duration,
    /// Ceiling for the backoff delay.
    pub backoff_max: Duration,
    /// When true, skip records at or before the last durably persisted
    /// stream position, so crash-and-replay does not double-count.
    /// Off by default: at-least-once delivery tolerates occasional
    /// double-counting rather than risking data loss.
    pub idempotent_replay: bool,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            batch_size: 64,
            poll_interval: Duration::from_millis(100),
            backoff_base: Duration::from_millis(500),
            backoff_max: Duration::from_secs(30),
            idempotent_replay: false,
        }
    }
}

/// Auto-resolution sweeper schedule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweeperConfig {
    /// Wall-clock interval between sweeps.
    pub interval: Duration,
    /// An ACTIVE incident idle longer than this is auto-resolved.
    pub stale_after: chrono::Duration,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            stale_after: chrono::Duration::minutes(200),
        }
    }
}

/// File relevance ranker limits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RankingConfig {
    /// Maximum ranked files returned.
    pub max_files: usize,
    /// Files below this size get the small-file bonus.
    pub small_file_bytes: u64,
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            max_files: 5,
            small_file_bytes: 20_000,
        }
    }
}

/// Aggregate engine configuration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EngineConfig {
    pub grading: GradingConfig,
    pub diagnosis: DiagnosisConfig,
    pub ingest: IngestConfig,
    pub sweeper: SweeperConfig,
    pub ranking: RankingConfig,
}

impl EngineConfig {
    /// Build from environment variables, falling back to the defaults
    /// for anything unset or unparsable.
    ///
    /// Honored variables:
    /// - `VIGIL_MAX_RETRIES`
    /// - `VIGIL_EVIDENCE_LIMIT`
    /// - `VIGIL_MIN_EVENTS`
    /// - `VIGIL_SWEEP_INTERVAL_SECS`
    /// - `VIGIL_STALE_AFTER_MINUTES`
    /// - `VIGIL_IDEMPOTENT_REPLAY` ("1"/"true")
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(v) = env_parse::<u32>("VIGIL_MAX_RETRIES") {
            config.diagnosis.max_retries = v;
        }
        if let Some(v) = env_parse::<usize>("VIGIL_EVIDENCE_LIMIT") {
            config.diagnosis.evidence_limit = v;
        }
        if let Some(v) = env_parse::<usize>("VIGIL_MIN_EVENTS") {
            config.grading.min_events = v;
        }
        if let Some(v) = env_parse::<u64>("VIGIL_SWEEP_INTERVAL_SECS") {
            config.sweeper.interval = Duration::from_secs(v);
        }
        if let Some(v) = env_parse::<i64>("VIGIL_STALE_AFTER_MINUTES") {
            config.sweeper.stale_after = chrono::Duration::minutes(v);
        }
        if let Ok(v) = std::env::var("VIGIL_IDEMPOTENT_REPLAY") {
            config.ingest.idempotent_replay = v == "1" || v.eq_ignore_ascii_case("true");
        }

        config
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}
