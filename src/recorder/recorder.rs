//! Result recorder
//!
//! Captures checkpoint screenshots under per-run unique names and writes the
//! run artifact once, whatever way the run ended.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::browser::Browser;
use crate::core::{Result, SitepilotError};
use crate::recorder::artifact::{ArtifactStatus, Checkpoint, ResultArtifact};
use crate::workflow::state::WorkflowRun;

const REDACTED: &str = "***";

/// Shorter secrets are not scrubbed by substring: they would match ordinary
/// words and URLs. Such values never reach the log in the first place.
pub const MIN_SECRET_LEN: usize = 6;

/// Collects evidence for a single run
#[derive(Debug)]
pub struct ResultRecorder {
    dir: PathBuf,
    artifact: ResultArtifact,
    secrets: Vec<String>,
    finalized: bool,
}

/// Timestamp plus a random suffix, e.g. `20261018T101500-3fa9`
pub fn new_run_id() -> String {
    format!(
        "{}-{:04x}",
        Utc::now().format("%Y%m%dT%H%M%S"),
        rand::random::<u16>()
    )
}

impl ResultRecorder {
    /// Create a recorder writing into `dir` with a fresh run id
    pub fn new(dir: impl Into<PathBuf>, step_set: &str) -> Result<Self> {
        Self::with_run_id(dir, step_set, new_run_id())
    }

    pub fn with_run_id(dir: impl Into<PathBuf>, step_set: &str, run_id: impl Into<String>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            artifact: ResultArtifact::new(run_id, step_set),
            secrets: Vec::new(),
            finalized: false,
        })
    }

    pub fn run_id(&self) -> &str {
        &self.artifact.run_id
    }

    /// Where the artifact is (or will be) written
    pub fn artifact_path(&self) -> PathBuf {
        self.dir.join(format!("{}.json", self.artifact.run_id))
    }

    /// Screenshots captured so far
    pub fn screenshots(&self) -> impl Iterator<Item = (&str, &Path)> {
        self.artifact
            .screenshots
            .iter()
            .map(|(name, path)| (name.as_str(), path.as_path()))
    }

    /// Value that must never appear in the artifact. Values shorter than
    /// [`MIN_SECRET_LEN`] characters are ignored.
    pub fn register_secret(&mut self, secret: impl Into<String>) {
        let secret = secret.into();
        if secret.chars().count() >= MIN_SECRET_LEN {
            self.secrets.push(secret);
        } else {
            debug!("secret too short to scrub by substring");
        }
    }

    /// Checkpoint key and file path that do not collide with earlier
    /// captures; a repeated checkpoint becomes `name-2`, `name-3`, ...
    fn reserve(&self, checkpoint: Checkpoint) -> (String, PathBuf) {
        let base = checkpoint.as_str();
        let mut n = 1;
        loop {
            let key = if n == 1 {
                base.to_string()
            } else {
                format!("{}-{}", base, n)
            };
            let path = self
                .dir
                .join(format!("{}-{}.png", self.artifact.run_id, key));
            if !self.artifact.screenshots.contains_key(&key) && !path.exists() {
                return (key, path);
            }
            n += 1;
        }
    }

    /// Capture a screenshot for `checkpoint`. Best-effort: a failed capture
    /// is logged and returns `None`.
    pub async fn checkpoint(&mut self, browser: &dyn Browser, checkpoint: Checkpoint) -> Option<PathBuf> {
        if self.finalized {
            return None;
        }

        let (key, path) = self.reserve(checkpoint);
        match browser.screenshot(&path).await {
            Ok(()) => {
                info!(checkpoint = %key, path = %path.display(), "checkpoint captured");
                self.artifact.screenshots.insert(key, path.clone());
                Some(path)
            }
            Err(e) => {
                warn!(checkpoint = %key, error = %e, "checkpoint capture failed");
                None
            }
        }
    }

    fn redact(&self, text: &str) -> String {
        self.secrets
            .iter()
            .fold(text.to_string(), |acc, secret| acc.replace(secret.as_str(), REDACTED))
    }

    /// Write the artifact for `run`. Only the first call writes; later calls
    /// are refused so a run can never produce two artifacts.
    pub fn finalize(&mut self, run: &WorkflowRun) -> Result<ResultArtifact> {
        if self.finalized {
            return Err(SitepilotError::Other(format!(
                "artifact for run {} already written",
                self.artifact.run_id
            )));
        }
        self.finalized = true;

        let mut artifact = self.artifact.clone();
        artifact.status = match run.artifact_status() {
            ArtifactStatus::Starting => ArtifactStatus::Failed,
            status => status,
        };
        artifact.steps = run.log().iter().map(|entry| self.redact(entry)).collect();
        artifact.url = run.url().map(|u| self.redact(u));
        artifact.error = run.error().map(|e| self.redact(e));
        if artifact.status == ArtifactStatus::Failed && artifact.error.is_none() {
            artifact.error = Some(format!("run ended in state {}", run.state()));
        }
        artifact.final_state = run.state().to_string();
        artifact.finished_at = Some(Utc::now());

        let path = self.artifact_path();
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_string_pretty(&artifact)?)?;
        fs::rename(&tmp, &path)?;

        info!(status = %artifact.status, path = %path.display(), "artifact written");
        self.artifact = artifact.clone();
        Ok(artifact)
    }
}
