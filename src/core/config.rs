//! Configuration management for sitepilot
//!
//! Supports environment variables, config files, and runtime overrides.
//! Credentials are deliberately absent: they only ever arrive through CLI
//! arguments or the environment at run time.
//!
//! Config file location: ~/.config/sitepilot/config.toml

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::core::error::{Result, SitepilotError};
use crate::core::types::LocatorCandidate;

/// Main configuration for sitepilot
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Browser driver configuration
    #[serde(default)]
    pub browser: BrowserConfig,
    /// Wait budgets
    #[serde(default)]
    pub waits: WaitConfig,
    /// Identity provider configuration
    #[serde(default)]
    pub auth: AuthConfig,
    /// Where artifacts and screenshots go
    #[serde(default)]
    pub output: OutputConfig,
}

/// Browser automation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    /// agent-browser executable
    pub binary: String,
    /// Session name for agent-browser
    pub session_name: String,
    /// Whether to run in headed mode (visible browser)
    pub headed: bool,
    /// Persistent browser profile directory; one run at a time per directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_dir: Option<PathBuf>,
    /// Where session locks live when no profile directory is set
    /// (default: `<config dir>/sessions`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lock_dir: Option<PathBuf>,
    /// Timeout for a single driver command in seconds
    pub command_timeout_secs: u64,
    /// Seconds to keep a headed browser open after the run
    pub linger_secs: u64,
}

/// Wait budgets used by the locator and the engine
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WaitConfig {
    /// Fixed delay after every navigation
    pub after_navigation_ms: u64,
    /// Fixed delay after every mutating action
    pub after_action_ms: u64,
    /// Bounded poll budget for an element to appear
    pub element_timeout_secs: u64,
    /// Bounded poll budget for each login field
    pub login_field_timeout_secs: u64,
    /// Poll interval for bounded polls
    pub poll_interval_ms: u64,
    /// Attempts per critical step before escalation
    pub max_step_attempts: u32,
}

/// Identity provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// URL fragments that mean "not signed in"
    pub unauthenticated_markers: Vec<String>,
    pub email_candidates: Vec<LocatorCandidate>,
    pub email_next_candidates: Vec<LocatorCandidate>,
    pub password_candidates: Vec<LocatorCandidate>,
    pub password_next_candidates: Vec<LocatorCandidate>,
}

/// Output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Directory for run artifacts and screenshots
    pub dir: PathBuf,
}

fn env_flag(key: &str) -> Option<bool> {
    env::var(key).ok().map(|v| v == "true" || v == "1")
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            binary: env::var("SITEPILOT_BROWSER_BINARY")
                .unwrap_or_else(|_| "agent-browser".to_string()),
            session_name: env::var("SITEPILOT_BROWSER_SESSION")
                .unwrap_or_else(|_| "sitepilot".to_string()),
            headed: env_flag("SITEPILOT_BROWSER_HEADED").unwrap_or(false),
            profile_dir: env::var("SITEPILOT_PROFILE_DIR").ok().map(PathBuf::from),
            lock_dir: env::var("SITEPILOT_LOCK_DIR").ok().map(PathBuf::from),
            command_timeout_secs: 60,
            linger_secs: 0,
        }
    }
}

impl Default for WaitConfig {
    fn default() -> Self {
        Self {
            after_navigation_ms: 3000,
            after_action_ms: 1000,
            element_timeout_secs: 15,
            login_field_timeout_secs: 20,
            poll_interval_ms: 500,
            max_step_attempts: 3,
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            unauthenticated_markers: vec![
                "accounts.google.com".to_string(),
                "signin".to_string(),
                "ServiceLogin".to_string(),
            ],
            email_candidates: vec![
                LocatorCandidate::name("identifier"),
                LocatorCandidate::css("input[type='email']"),
                LocatorCandidate::id("identifierId"),
            ],
            email_next_candidates: vec![
                LocatorCandidate::id("identifierNext"),
                LocatorCandidate::role("button[Next]"),
            ],
            password_candidates: vec![
                LocatorCandidate::name("Passwd"),
                LocatorCandidate::css("input[type='password']"),
            ],
            password_next_candidates: vec![
                LocatorCandidate::id("passwordNext"),
                LocatorCandidate::role("button[Next]"),
            ],
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: env::var("SITEPILOT_OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("runs")),
        }
    }
}

impl WaitConfig {
    pub fn after_navigation(&self) -> Duration {
        Duration::from_millis(self.after_navigation_ms)
    }

    pub fn after_action(&self) -> Duration {
        Duration::from_millis(self.after_action_ms)
    }

    pub fn element_timeout(&self) -> Duration {
        Duration::from_secs(self.element_timeout_secs)
    }

    pub fn login_field_timeout(&self) -> Duration {
        Duration::from_secs(self.login_field_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

impl BrowserConfig {
    /// Directory whose lock a run must hold: the profile directory when set,
    /// else one per agent-browser session, since runs sharing a session name
    /// drive the same live browser.
    pub fn run_lock_dir(&self) -> PathBuf {
        if let Some(dir) = &self.profile_dir {
            return dir.clone();
        }
        let session: String = self
            .session_name
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.lock_dir
            .clone()
            .unwrap_or_else(|| Config::config_dir().join("sessions"))
            .join(session)
    }
}

impl AuthConfig {
    /// Whether a URL carries one of the unauthenticated markers
    pub fn is_unauthenticated_url(&self, url: &str) -> bool {
        self.unauthenticated_markers
            .iter()
            .any(|marker| !marker.is_empty() && url.contains(marker.as_str()))
    }
}

impl Config {
    /// Get the config directory path
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("sitepilot")
    }

    /// Get the config file path
    pub fn config_file() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// Load configuration from file, environment, and defaults
    /// Priority: CLI args > env vars > config file > defaults
    ///
    /// A missing config file means defaults; a file that cannot be read,
    /// parsed or validated is an error naming the file.
    pub fn load() -> Result<Self> {
        let _ = dotenvy::dotenv();
        Self::load_from(&Self::config_file())
    }

    /// Load configuration from `path`, or defaults when it does not exist
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|e| {
            SitepilotError::config(format!("Failed to read {}: {}", path.display(), e))
        })?;

        Self::from_toml(&content).map_err(|e| {
            SitepilotError::config(format!("Rejected config file {}: {}", path.display(), e))
        })
    }

    /// Parse a TOML document; missing sections fall back to defaults
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)
            .map_err(|e| SitepilotError::config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would make every wait or retry degenerate
    pub fn validate(&self) -> Result<()> {
        if self.waits.max_step_attempts == 0 {
            return Err(SitepilotError::config("waits.max_step_attempts must be at least 1"));
        }
        if self.waits.element_timeout_secs == 0 || self.waits.login_field_timeout_secs == 0 {
            return Err(SitepilotError::config("element and login field timeouts must be non-zero"));
        }
        if self.auth.email_candidates.is_empty() || self.auth.password_candidates.is_empty() {
            return Err(SitepilotError::config("auth needs at least one email and one password locator"));
        }
        Ok(())
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<PathBuf> {
        let config_dir = Self::config_dir();
        let config_path = Self::config_file();

        if !config_dir.exists() {
            fs::create_dir_all(&config_dir).map_err(|e| {
                SitepilotError::config(format!("Failed to create config dir: {}", e))
            })?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| SitepilotError::config(format!("Failed to serialize config: {}", e)))?;

        fs::write(&config_path, content)
            .map_err(|e| SitepilotError::config(format!("Failed to write config: {}", e)))?;

        Ok(config_path)
    }

    /// Check if a config file exists
    pub fn config_exists() -> bool {
        Self::config_file().exists()
    }

    /// Generate a default config file content for display
    pub fn default_config_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config)
            .unwrap_or_else(|_| String::from("# Error generating config"))
    }
}
