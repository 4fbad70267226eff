//! Custom error types for sitepilot
//!
//! Provides a unified error handling system across all modules.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Main error type for sitepilot operations
#[derive(Error, Debug)]
pub enum SitepilotError {
    /// A required login field could not be found, or sign-in did not complete
    #[error("Authentication error: {0}")]
    Authentication(String),

    /// A bounded poll expired before its condition held
    #[error("Timed out after {waited:?} waiting for {what}")]
    LoadTimeout { what: String, waited: Duration },

    /// A single browser command failed; the browser is still usable
    #[error("Browser error: {0}")]
    Browser(String),

    /// The browser process or driver itself failed
    #[error("Browser driver fault: {0}")]
    DriverFault(String),

    /// Agent-browser not installed
    #[error("agent-browser not found. Install with: npm install -g agent-browser && agent-browser install")]
    AgentBrowserNotFound,

    /// Another run holds the browser profile
    #[error("Browser profile or session at {path} is locked by another run ({holder}). Wait for it to finish or remove the lock file if it is stale")]
    ProfileLocked { path: PathBuf, holder: String },

    /// A critical step exhausted its attempts
    #[error("Step '{step}' failed after {attempts} attempt(s): {reason}")]
    StepFailed {
        step: String,
        attempts: u32,
        reason: String,
    },

    /// The operator ended the run during a manual handoff
    #[error("Operator ended the run at step '{0}'")]
    OperatorAborted(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// JSON parsing errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing errors
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error for other cases
    #[error("{0}")]
    Other(String),
}

/// Convenience Result type for sitepilot operations
pub type Result<T> = std::result::Result<T, SitepilotError>;

impl SitepilotError {
    /// Create a browser command error
    pub fn browser(msg: impl Into<String>) -> Self {
        Self::Browser(msg.into())
    }

    /// Create a driver fault
    pub fn driver(msg: impl Into<String>) -> Self {
        Self::DriverFault(msg.into())
    }

    /// Create an authentication error
    pub fn auth(msg: impl Into<String>) -> Self {
        Self::Authentication(msg.into())
    }

    /// Create a config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a load timeout
    pub fn timeout(what: impl Into<String>, waited: Duration) -> Self {
        Self::LoadTimeout {
            what: what.into(),
            waited,
        }
    }

    /// Whether this error means the browser can no longer be driven.
    ///
    /// Fatal errors abort the run immediately; everything else is handled by
    /// the locator or the engine's retry policy.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::DriverFault(_) | Self::AgentBrowserNotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(SitepilotError::driver("chrome crashed").is_fatal());
        assert!(SitepilotError::AgentBrowserNotFound.is_fatal());
        assert!(!SitepilotError::auth("no email field").is_fatal());
        assert!(!SitepilotError::browser("element detached").is_fatal());
        assert!(!SitepilotError::timeout("publish button", Duration::from_secs(15)).is_fatal());
    }

    #[test]
    fn test_step_failed_message() {
        let err = SitepilotError::StepFailed {
            step: "site-name".to_string(),
            attempts: 3,
            reason: "no candidate matched".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Step 'site-name' failed after 3 attempt(s): no candidate matched"
        );
    }
}
