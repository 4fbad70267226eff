//! Sitepilot - declarative browser automation
//!
//! Signs in to an identity provider, creates or edits a hosted site or
//! business listing through a sequence of declarative steps, publishes it,
//! and leaves a JSON artifact plus screenshots describing what happened.
//!
//! # Architecture
//!
//! - **Core**: Shared types, configuration, and error handling
//! - **Browser**: Browser capability trait, agent-browser driver, test fake
//! - **Automation**: Waits, ordered-fallback element location, sign-in
//! - **Workflow**: Step catalog, state machine, engine, run lifecycle
//! - **Recorder**: Checkpoint screenshots and the run artifact
//! - **CLI**: Command-line interface
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::collections::BTreeMap;
//! use std::sync::Arc;
//!
//! use sitepilot::browser::AgentBrowser;
//! use sitepilot::workflow::{Runner, StepCatalog};
//! use sitepilot::{Config, Credentials};
//!
//! #[tokio::main]
//! async fn main() -> sitepilot::Result<()> {
//!     let config = Config::load()?;
//!     let mut vars = BTreeMap::new();
//!     vars.insert("site_name".to_string(), "Evans Mathibe".to_string());
//!     let plan = StepCatalog::builtin().get("site-builder")?.resolve(&vars)?;
//!
//!     let browser = Arc::new(AgentBrowser::from_config(&config.browser));
//!     let credentials = Credentials::new("ops@example.com", std::env::var("SITEPILOT_PASSWORD").unwrap_or_default());
//!     let report = Runner::new(config).execute(browser, plan, &credentials).await?;
//!     println!("{}", report.artifact.status);
//!     Ok(())
//! }
//! ```

pub mod automation;
pub mod browser;
pub mod cli;
pub mod core;
pub mod recorder;
pub mod workflow;

// Re-export commonly used items
pub use crate::core::{Config, Credentials, Result, SitepilotError};
pub use recorder::{ArtifactStatus, ResultArtifact};
pub use workflow::{RunReport, Runner};
