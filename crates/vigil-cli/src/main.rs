//! Vigil - incident engine CLI
//!
//! The `vigil` command drives the request-side of the engine against
//! the shared store.
//!
//! ## Commands
//!
//! - `publish`: push a log record onto the ingestion stream
//! - `incidents`: list ACTIVE incidents for a project
//! - `priority`: rank ACTIVE incidents with explainable scores
//! - `diagnose`: run the evidence-grounded diagnosis flow
//! - `files`: rank candidate files for an incident
//! - `resolve` / `reject`: record the outcome of a fix attempt
//! - `tally`: dump the per-service error counters

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing::Level;

use vigil_core::{
    init_tracing, prioritize_incidents, rank_files_for_incident, DiagnosisOrchestrator,
    EngineConfig, EvidenceRetriever, EvidenceScope, HttpDiagnosisGenerator, HttpProjectFiles,
    ProjectFiles,
};
use vigil_state::{
    ErrorTally, EventStore, IncidentId, IncidentStore, LogStream, StreamRecord, SurrealStore,
};

#[derive(Parser)]
#[command(name = "vigil")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Vigil incident engine", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Push one log record onto the ingestion stream
    Publish {
        /// Project the record belongs to
        #[arg(long)]
        project: String,

        /// Emitting service name
        #[arg(long)]
        service: String,

        /// Log level (DEBUG | INFO | WARNING | ERROR)
        #[arg(long, default_value = "ERROR")]
        level: String,

        /// Raw log message
        message: String,

        /// Source file the log points at
        #[arg(long)]
        file: Option<String>,

        /// Source line the log points at
        #[arg(long)]
        line: Option<u32>,
    },

    /// List ACTIVE incidents for a project, most recently seen first
    Incidents {
        /// Project to list
        #[arg(long)]
        project: String,
    },

    /// Rank ACTIVE incidents by priority with explainable scores
    Priority {
        /// Project to rank
        #[arg(long)]
        project: String,
    },

    /// Diagnose a service or one incident from its evidence
    Diagnose {
        /// Project in scope
        #[arg(long)]
        project: String,

        /// Service scope (mutually exclusive with --incident)
        #[arg(long, conflicts_with = "incident")]
        service: Option<String>,

        /// Incident scope
        #[arg(long)]
        incident: Option<String>,
    },

    /// Rank candidate files for an incident
    Files {
        /// Project in scope
        #[arg(long)]
        project: String,

        /// Incident whose evidence guides the ranking
        #[arg(long)]
        incident: String,
    },

    /// Confirm that a file fixed an incident (resolves it)
    Resolve {
        /// Incident to resolve
        #[arg(long)]
        incident: String,

        /// File path that fixed it
        #[arg(long)]
        file: String,
    },

    /// Record a file that did NOT fix an incident
    Reject {
        /// Incident the attempt was for
        #[arg(long)]
        incident: String,

        /// File path that was tried
        #[arg(long)]
        file: String,
    },

    /// Dump the per-service error tally
    Tally,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let level = if cli.verbose { Level::DEBUG } else { Level::WARN };
    init_tracing(cli.json, level);

    let store = Arc::new(SurrealStore::from_env().await?);
    let config = EngineConfig::from_env();

    match cli.command {
        Commands::Publish {
            project,
            service,
            level,
            message,
            file,
            line,
        } => {
            let position = store
                .publish(StreamRecord {
                    project_id: project,
                    service,
                    level,
                    message,
                    file,
                    line,
                    timestamp: Utc::now(),
                })
                .await?;
            println!("published at position {position}");
        }

        Commands::Incidents { project } => {
            let incidents = store.list_active(&project).await?;
            println!("{}", serde_json::to_string_pretty(&incidents)?);
        }

        Commands::Priority { project } => {
            let incidents = store.list_active(&project).await?;
            let report = prioritize_incidents(&incidents, Utc::now());
            println!("{}", serde_json::to_string_pretty(&report)?);
        }

        Commands::Diagnose {
            project,
            service,
            incident,
        } => {
            let scope = match (service, incident) {
                (Some(service), None) => EvidenceScope::Service {
                    project_id: project,
                    service,
                },
                (None, Some(incident)) => EvidenceScope::Incident {
                    project_id: project,
                    incident_id: IncidentId(incident),
                },
                _ => anyhow::bail!("exactly one of --service or --incident is required"),
            };

            let generator = HttpDiagnosisGenerator::from_env()
                .context("VIGIL_GENERATOR_URL must point at a diagnosis generator")?;

            let orchestrator = DiagnosisOrchestrator::new(
                EvidenceRetriever::new(store.clone()),
                store.clone(),
                Arc::new(generator),
                config.grading.clone(),
                config.diagnosis.clone(),
            );
            let result = orchestrator.diagnose(&scope).await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }

        Commands::Files { project, incident } => {
            let incident_id = IncidentId(incident);
            let incident = store.get(&incident_id).await?;
            let evidence = store
                .recent_for_incident(&project, &incident_id, config.diagnosis.evidence_limit)
                .await?;

            let agent = HttpProjectFiles::from_env()
                .context("VIGIL_FILE_AGENT_URL must point at a file agent")?;
            let files = agent.list_files().await?;

            let ranked = rank_files_for_incident(&files, &evidence, &incident, &config.ranking);
            println!("{}", serde_json::to_string_pretty(&ranked)?);
        }

        Commands::Resolve { incident, file } => {
            let resolved = store
                .resolve(&IncidentId(incident), &file, Utc::now())
                .await?;
            println!("{}", serde_json::to_string_pretty(&resolved)?);
        }

        Commands::Reject { incident, file } => {
            let updated = store.add_attempted_file(&IncidentId(incident), &file).await?;
            println!("{}", serde_json::to_string_pretty(&updated)?);
        }

        Commands::Tally => {
            let snapshot = store.snapshot().await?;
            println!("{}", serde_json::to_string_pretty(&snapshot)?);
        }
    }

    Ok(())
}
