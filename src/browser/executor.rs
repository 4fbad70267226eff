//! Browser executor - wraps agent-browser CLI
//!
//! Implements [`Browser`] by shelling out to agent-browser, one command per
//! capability.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::browser::snapshot::Snapshot;
use crate::browser::traits::{Browser, ElementHandle};
use crate::core::config::BrowserConfig;
use crate::core::{LocatorCandidate, Result, SitepilotError, Strategy};

/// stderr fragments that mean the browser itself is gone
const FATAL_MARKERS: &[&str] = &[
    "Target closed",
    "Browser has been closed",
    "browser has been closed",
    "Target page, context or browser has been closed",
    "disconnected",
    "ECONNREFUSED",
];

/// Executor for browser automation via agent-browser CLI
pub struct AgentBrowser {
    /// agent-browser executable
    binary: String,
    /// Session name for isolation
    session_name: String,
    /// Whether to run in headed mode
    headed: bool,
    /// Persistent profile directory
    profile_dir: Option<PathBuf>,
    /// Per-command timeout
    command_timeout: Duration,
}

impl AgentBrowser {
    /// Create a new browser executor
    pub fn new(session_name: impl Into<String>) -> Self {
        Self {
            binary: "agent-browser".to_string(),
            session_name: session_name.into(),
            headed: false,
            profile_dir: None,
            command_timeout: Duration::from_secs(60),
        }
    }

    /// Create an executor from configuration
    pub fn from_config(config: &BrowserConfig) -> Self {
        Self {
            binary: config.binary.clone(),
            session_name: config.session_name.clone(),
            headed: config.headed,
            profile_dir: config.profile_dir.clone(),
            command_timeout: Duration::from_secs(config.command_timeout_secs.max(1)),
        }
    }

    /// Check if agent-browser is installed
    pub async fn is_available(binary: &str) -> bool {
        Command::new(binary)
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|s| s.success())
            .unwrap_or(false)
    }

    /// Arguments safe to log; typed text is never printed
    fn loggable(args: &[&str]) -> String {
        match args {
            ["fill", selector, _] => format!("fill {} <redacted>", selector),
            _ => args.join(" "),
        }
    }

    /// Run an agent-browser command
    async fn run_command(&self, args: &[&str]) -> Result<String> {
        let mut cmd = Command::new(&self.binary);
        cmd.args(["--session", &self.session_name]);

        if self.headed {
            cmd.arg("--headed");
        }

        if let Some(profile) = &self.profile_dir {
            cmd.arg("--profile").arg(profile);
        }

        cmd.args(args);
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.kill_on_drop(true);

        debug!(session = %self.session_name, command = %Self::loggable(args), "agent-browser");

        let output = match tokio::time::timeout(self.command_timeout, cmd.output()).await {
            Ok(result) => result.map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    SitepilotError::AgentBrowserNotFound
                } else {
                    SitepilotError::driver(format!("Failed to run agent-browser: {}", e))
                }
            })?,
            Err(_) => {
                return Err(SitepilotError::timeout(
                    format!("agent-browser {}", args.first().unwrap_or(&"")),
                    self.command_timeout,
                ))
            }
        };

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).into_owned())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let message = format!("agent-browser {} failed: {}", args.first().unwrap_or(&""), stderr.trim());
            if FATAL_MARKERS.iter().any(|m| stderr.contains(m)) {
                Err(SitepilotError::driver(message))
            } else {
                Err(SitepilotError::browser(message))
            }
        }
    }

    /// Run a command and return JSON output
    async fn run_json_command(&self, args: &[&str]) -> Result<String> {
        let mut full_args: Vec<&str> = args.to_vec();
        full_args.push("--json");
        self.run_command(&full_args).await
    }

    /// Interactive-element snapshot of the current page
    async fn snapshot(&self) -> Result<Snapshot> {
        let output = self.run_json_command(&["snapshot", "-i"]).await?;
        Ok(serde_json::from_str(&output)?)
    }

    /// Selector for attribute- and path-based strategies; `None` for
    /// strategies resolved through the snapshot
    fn selector_for(candidate: &LocatorCandidate) -> Option<String> {
        let quoted = |attr: &str| {
            format!(
                "[{}=\"{}\"]",
                attr,
                candidate.value.replace('\\', "\\\\").replace('"', "\\\"")
            )
        };
        match candidate.strategy {
            Strategy::Css => Some(candidate.value.clone()),
            Strategy::Xpath => Some(format!("xpath={}", candidate.value)),
            Strategy::Id => Some(quoted("id")),
            Strategy::Name => Some(quoted("name")),
            Strategy::AriaLabel => Some(quoted("aria-label")),
            Strategy::Placeholder => Some(quoted("placeholder")),
            Strategy::Text | Strategy::Role => None,
        }
    }

    async fn count(&self, selector: &str) -> Result<usize> {
        let output = self.run_command(&["get", "count", selector]).await?;
        Self::parse_count(&output)
    }

    fn parse_count(output: &str) -> Result<usize> {
        output.trim().parse().map_err(|_| {
            SitepilotError::browser(format!("unexpected `get count` output: '{}'", output.trim()))
        })
    }
}

#[async_trait]
impl Browser for AgentBrowser {
    async fn navigate(&self, url: &str) -> Result<()> {
        self.run_command(&["open", url]).await?;
        Ok(())
    }

    async fn current_url(&self) -> Result<String> {
        self.run_command(&["get", "url"])
            .await
            .map(|s| s.trim().to_string())
    }

    async fn find(&self, candidate: &LocatorCandidate) -> Result<Option<ElementHandle>> {
        if let Some(selector) = Self::selector_for(candidate) {
            if self.count(&selector).await? == 0 {
                return Ok(None);
            }
            // Several matches are common on these pages; address the first.
            let first = format!("{} >> nth=0", selector);
            return Ok(Some(ElementHandle::new(first, candidate.clone())));
        }

        let snapshot = self.snapshot().await?;
        let found = match candidate.strategy {
            Strategy::Role => {
                let (role, name) = candidate.role_parts();
                snapshot.first_by_role(role, name)
            }
            _ => snapshot.first_by_text(&candidate.value),
        };

        Ok(found.map(|ref_id| ElementHandle::new(format!("@{}", ref_id), candidate.clone())))
    }

    async fn click(&self, element: &ElementHandle) -> Result<()> {
        self.run_command(&["click", &element.selector]).await?;
        Ok(())
    }

    async fn type_text(&self, element: &ElementHandle, text: &str) -> Result<()> {
        self.run_command(&["fill", &element.selector, text]).await?;
        Ok(())
    }

    async fn attribute(&self, element: &ElementHandle, name: &str) -> Result<Option<String>> {
        let output = self
            .run_command(&["get", "attr", &element.selector, name])
            .await?;
        let value = output.trim();
        Ok((!value.is_empty() && value != "null").then(|| value.to_string()))
    }

    async fn screenshot(&self, path: &Path) -> Result<()> {
        let path = path.to_string_lossy();
        self.run_command(&["screenshot", &path]).await?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.run_command(&["close"]).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_executor_creation() {
        let executor = AgentBrowser::new("test-session");
        assert_eq!(executor.session_name, "test-session");
        assert!(!executor.headed);
        assert!(executor.profile_dir.is_none());
    }

    #[test]
    fn test_selector_mapping() {
        assert_eq!(
            AgentBrowser::selector_for(&LocatorCandidate::name("identifier")).as_deref(),
            Some("[name=\"identifier\"]")
        );
        assert_eq!(
            AgentBrowser::selector_for(&LocatorCandidate::xpath("//button")).as_deref(),
            Some("xpath=//button")
        );
        assert_eq!(
            AgentBrowser::selector_for(&LocatorCandidate::placeholder("Say \"hi\"")).as_deref(),
            Some("[placeholder=\"Say \\\"hi\\\"\"]")
        );
        assert!(AgentBrowser::selector_for(&LocatorCandidate::text("Publish")).is_none());
        assert!(AgentBrowser::selector_for(&LocatorCandidate::role("button[Next]")).is_none());
    }

    #[test]
    fn test_count_output_must_be_a_number() {
        assert_eq!(AgentBrowser::parse_count("3\n").unwrap(), 3);
        assert_eq!(AgentBrowser::parse_count(" 0 ").unwrap(), 0);
        let err = AgentBrowser::parse_count("Error: no such selector").unwrap_err();
        assert!(!err.is_fatal());
        assert!(err.to_string().contains("get count"));
    }

    #[test]
    fn test_fill_is_redacted_in_logs() {
        let shown = AgentBrowser::loggable(&["fill", "@e3", "hunter2"]);
        assert!(!shown.contains("hunter2"));
        assert_eq!(AgentBrowser::loggable(&["click", "@e1"]), "click @e1");
    }

    #[tokio::test]
    async fn test_missing_binary_is_fatal() {
        let mut executor = AgentBrowser::new("missing");
        executor.binary = "sitepilot-no-such-agent-browser".to_string();
        let err = executor.navigate("https://example.com").await.unwrap_err();
        assert!(matches!(err, SitepilotError::AgentBrowserNotFound));
        assert!(err.is_fatal());
    }
}
