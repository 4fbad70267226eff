//! Run result artifact

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::Result;

/// Final status of a run as written to disk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactStatus {
    Starting,
    /// Creation finished, the rest was handed to the operator
    Created,
    Success,
    Failed,
}

impl ArtifactStatus {
    /// Process exit code: 0 success, 2 created, 1 otherwise
    pub fn exit_code(&self) -> u8 {
        match self {
            ArtifactStatus::Success => 0,
            ArtifactStatus::Created => 2,
            ArtifactStatus::Starting | ArtifactStatus::Failed => 1,
        }
    }
}

impl fmt::Display for ArtifactStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArtifactStatus::Starting => write!(f, "starting"),
            ArtifactStatus::Created => write!(f, "created"),
            ArtifactStatus::Success => write!(f, "success"),
            ArtifactStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Named points where evidence is captured
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Checkpoint {
    PreLogin,
    PostLogin,
    PreEdit,
    PostEdit,
    ManualHandoff,
    OnError,
}

impl Checkpoint {
    pub fn as_str(&self) -> &'static str {
        match self {
            Checkpoint::PreLogin => "pre-login",
            Checkpoint::PostLogin => "post-login",
            Checkpoint::PreEdit => "pre-edit",
            Checkpoint::PostEdit => "post-edit",
            Checkpoint::ManualHandoff => "manual-handoff",
            Checkpoint::OnError => "on-error",
        }
    }
}

impl fmt::Display for Checkpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Durable record of one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultArtifact {
    pub run_id: String,
    pub step_set: String,
    pub status: ArtifactStatus,
    /// Ordered run log
    pub steps: Vec<String>,
    pub url: Option<String>,
    pub error: Option<String>,
    /// Checkpoint name to screenshot path
    pub screenshots: BTreeMap<String, PathBuf>,
    /// Engine state the run ended in
    pub final_state: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl ResultArtifact {
    pub fn new(run_id: impl Into<String>, step_set: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            step_set: step_set.into(),
            status: ArtifactStatus::Starting,
            steps: Vec::new(),
            url: None,
            error: None,
            screenshots: BTreeMap::new(),
            final_state: String::new(),
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    /// Every artifact in `dir`, newest first. Files that are not run
    /// artifacts are skipped; a missing directory has none.
    pub fn load_all(dir: &Path) -> Result<Vec<(PathBuf, ResultArtifact)>> {
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut artifacts = Vec::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if !path.extension().is_some_and(|ext| ext == "json") {
                continue;
            }
            match serde_json::from_str::<ResultArtifact>(&fs::read_to_string(&path)?) {
                Ok(artifact) => artifacts.push((path, artifact)),
                Err(e) => debug!(path = %path.display(), error = %e, "not a run artifact"),
            }
        }
        artifacts.sort_by(|(_, a), (_, b)| b.started_at.cmp(&a.started_at).then(b.run_id.cmp(&a.run_id)));
        Ok(artifacts)
    }
}
