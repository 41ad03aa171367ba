//! File relevance ranker.
//!
//! Deterministic scoring of candidate source files against incident
//! evidence, used to point the file-content collaborator at the files
//! most likely to matter. Works from either a free-form service name or
//! an incident's derived service field; the formula is identical.

use serde::{Deserialize, Serialize};

use vigil_state::{Incident, LogEvent};

use crate::config::RankingConfig;
use crate::project_files::FileCandidate;

/// Directory keywords that suggest a file is load-bearing.
const IMPORTANT_DIR_KEYWORDS: &[&str] = &[
    "service",
    "services",
    "controller",
    "route",
    "api",
    "handler",
    "model",
    "repo",
    "config",
];

/// Source extensions that get the code-file bonus.
const SOURCE_EXTENSIONS: &[&str] = &[".py", ".js", ".ts", ".tsx"];

/// A candidate annotated with its relevance score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedFile {
    pub path: String,
    pub size: u64,
    pub score: i64,
}

fn basename(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

fn extension(path: &str) -> Option<&str> {
    let name = basename(path);
    name.rfind('.').map(|idx| &name[idx..])
}

/// Score one candidate file against the evidence text and service hint.
pub fn score_file(
    file: &FileCandidate,
    evidence_text: &str,
    service: &str,
    config: &RankingConfig,
) -> i64 {
    let mut score = 0i64;
    let path = file.path.to_lowercase();
    let name = basename(&path);
    let evidence_lowered = evidence_text.to_lowercase();

    // Filename referenced directly by the evidence.
    if !name.is_empty() && evidence_lowered.contains(name) {
        score += 50;
    }

    // Folder relevance, once per keyword.
    for keyword in IMPORTANT_DIR_KEYWORDS {
        if path.contains(keyword) {
            score += 10;
        }
    }

    // Service name hint.
    if !service.is_empty() && path.contains(&service.to_lowercase()) {
        score += 15;
    }

    // Code file extension.
    if let Some(ext) = extension(&path) {
        if SOURCE_EXTENSIONS.contains(&ext) {
            score += 10;
        }
    }

    // Smaller files first.
    if file.size > 0 && file.size < config.small_file_bytes {
        score += 5;
    }

    score
}

/// Rank candidates against evidence, service-scoped.
///
/// Zero-score files are excluded; the result is capped at
/// `config.max_files`, descending score, ties in input order.
pub fn rank_files(
    files: &[FileCandidate],
    evidence: &[LogEvent],
    service: &str,
    config: &RankingConfig,
) -> Vec<RankedFile> {
    let evidence_text = evidence
        .iter()
        .map(|e| e.message.as_str())
        .collect::<Vec<_>>()
        .join(" ");

    let mut ranked: Vec<RankedFile> = files
        .iter()
        .filter_map(|f| {
            let score = score_file(f, &evidence_text, service, config);
            (score > 0).then(|| RankedFile {
                path: f.path.clone(),
                size: f.size,
                score,
            })
        })
        .collect();

    ranked.sort_by(|a, b| b.score.cmp(&a.score));
    ranked.truncate(config.max_files);
    ranked
}

/// Rank candidates for one incident: same formula, service drawn from
/// the incident aggregate instead of a free-form hint.
pub fn rank_files_for_incident(
    files: &[FileCandidate],
    evidence: &[LogEvent],
    incident: &Incident,
    config: &RankingConfig,
) -> Vec<RankedFile> {
    rank_files(files, evidence, &incident.service, config)
}
