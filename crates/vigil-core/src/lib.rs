//! Vigil Core Library
//!
//! The incident engine: fingerprint dedup, stream ingestion, stale
//! auto-resolution, priority scoring, evidence-grounded diagnosis, and
//! file relevance ranking. Storage and collaborators are trait seams
//! (see `vigil-state` and the `generator`/`project_files` modules) so
//! every component runs against in-memory fakes in tests.

pub mod config;
pub mod dedup;
pub mod diagnosis;
pub mod error;
pub mod evidence;
pub mod file_rank;
pub mod generator;
pub mod grading;
pub mod ingest;
pub mod metrics;
pub mod obs;
pub mod priority;
pub mod project_files;
pub mod sweeper;
pub mod telemetry;
pub mod verify;

pub use config::{
    DiagnosisConfig, EngineConfig, GradingConfig, IngestConfig, RankingConfig, SweeperConfig,
};

pub use dedup::{normalize_message, DedupEngine};

pub use diagnosis::{
    confidence_for_attempt, DiagnosisOrchestrator, DiagnosisResult, DiagnosisState,
    DiagnosisStatus, CONFIDENCE_EXHAUSTED, CONFIDENCE_INSUFFICIENT, REASON_EXHAUSTED,
    REASON_INSUFFICIENT,
};

pub use error::{EngineError, Result};

pub use evidence::{EvidenceRetriever, EvidenceScope};

pub use file_rank::{rank_files, rank_files_for_incident, score_file, RankedFile};

pub use generator::{
    format_evidence, incident_prompt, prompt_for_scope, service_prompt, DiagnosisGenerator,
    GeneratorError, HttpDiagnosisGenerator,
};

pub use grading::grade_evidence;

pub use ingest::{spawn_ingestor, Ingestor};

pub use metrics::METRICS;

pub use priority::{prioritize_incidents, PriorityEntry, PriorityReport};

pub use project_files::{FileCandidate, HttpProjectFiles, ProjectFiles};

pub use sweeper::{spawn_sweeper, Sweeper};

pub use telemetry::init_tracing;

pub use verify::{extract_tokens, verify_answer};

/// Vigil version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
