//! File listing / file content collaborators.
//!
//! The engine never touches the monitored project's filesystem itself;
//! a per-project agent exposes a small HTTP surface for listing and
//! reading files. Transport failures surface as collaborator errors to
//! the caller; the ranker itself stays pure.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{EngineError, Result};

/// A candidate source file as reported by the file agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileCandidate {
    pub path: String,
    pub size: u64,
}

/// File listing and content access for one monitored project.
#[async_trait]
pub trait ProjectFiles: Send + Sync {
    /// List candidate files, relative paths with sizes.
    async fn list_files(&self) -> Result<Vec<FileCandidate>>;

    /// Read one file's content; `None` when missing or not readable.
    async fn read_file(&self, path: &str) -> Result<Option<String>>;
}

// ---------------------------------------------------------------------------
// HTTP-backed implementation
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct ListFilesResponse {
    files: Vec<FileCandidate>,
}

#[derive(Serialize)]
struct ReadFileRequest<'a> {
    path: &'a str,
}

#[derive(Deserialize)]
struct ReadFileResponse {
    content: Option<String>,
}

/// File agent behind an HTTP endpoint.
///
/// GETs `{base_url}/files` for the listing and POSTs `{"path": ...}`
/// to `{base_url}/file` for content.
pub struct HttpProjectFiles {
    base_url: String,
    client: reqwest::Client,
}

impl HttpProjectFiles {
    /// Default per-call timeout.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .user_agent("vigil-core/0.2.0")
            .timeout(timeout)
            .build()
            .expect("Failed to create HTTP client");

        Self {
            base_url: base_url.into(),
            client,
        }
    }

    /// Create from `VIGIL_FILE_AGENT_URL`.
    pub fn from_env() -> Option<Self> {
        std::env::var("VIGIL_FILE_AGENT_URL")
            .ok()
            .map(|url| Self::new(url, Self::DEFAULT_TIMEOUT))
    }
}

#[async_trait]
impl ProjectFiles for HttpProjectFiles {
    async fn list_files(&self) -> Result<Vec<FileCandidate>> {
        let url = format!("{}/files", self.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| EngineError::Collaborator(e.to_string()))?;

        if !response.status().is_success() {
            return Err(EngineError::Collaborator(format!(
                "file agent returned status {}",
                response.status()
            )));
        }

        let body: ListFilesResponse = response
            .json()
            .await
            .map_err(|e| EngineError::Collaborator(e.to_string()))?;
        Ok(body.files)
    }

    async fn read_file(&self, path: &str) -> Result<Option<String>> {
        let url = format!("{}/file", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&ReadFileRequest { path })
            .send()
            .await
            .map_err(|e| EngineError::Collaborator(e.to_string()))?;

        if !response.status().is_success() {
            return Err(EngineError::Collaborator(format!(
                "file agent returned status {}",
                response.status()
            )));
        }

        let body: ReadFileResponse = response
            .json()
            .await
            .map_err(|e| EngineError::Collaborator(e.to_string()))?;
        Ok(body.content)
    }
}
