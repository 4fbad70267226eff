//! Command-line arguments

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::core::Config;

/// Sitepilot - declarative browser automation for hosted sites and listings
#[derive(Parser)]
#[command(name = "sitepilot")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Enable debug logging
    #[arg(long, short = 'd', global = true)]
    pub debug: bool,
}

#[derive(Subcommand)]
pub enum Command {
    /// Sign in and run a step set to publication
    Run(RunArgs),

    /// List the available step sets
    Steps {
        /// Extra step sets to load (TOML, `[[step_set]]` tables)
        #[arg(long)]
        steps_file: Option<PathBuf>,
    },

    /// Open a URL, or a step set's start page, in the desktop browser
    Open {
        /// URL to open
        url: Option<String>,

        /// Open this step set's start page instead
        #[arg(long, conflicts_with = "url")]
        step_set: Option<String>,
    },

    /// Show the latest run result
    Status {
        /// List every recorded run, newest first
        #[arg(long)]
        all: bool,
    },

    /// Show the effective configuration
    Config {
        /// Write the defaults to the config file if it does not exist
        #[arg(long)]
        init: bool,
    },
}

/// Arguments for `sitepilot run`. No `Debug`: it carries the password.
#[derive(Args, Clone)]
pub struct RunArgs {
    /// Step set to run
    #[arg(long, short = 's', default_value = "site-builder")]
    pub step_set: String,

    /// Extra step sets to load (TOML, `[[step_set]]` tables)
    #[arg(long)]
    pub steps_file: Option<PathBuf>,

    /// Account email
    #[arg(long, env = "SITEPILOT_EMAIL")]
    pub email: String,

    /// Account password
    #[arg(long, env = "SITEPILOT_PASSWORD", hide_env_values = true)]
    pub password: String,

    /// Show the browser window
    #[arg(long)]
    pub visible: bool,

    /// Hand stalled steps to the operator instead of failing
    #[arg(long, short = 'i')]
    pub interactive: bool,

    /// Step-set variable, e.g. `--var site_name="Evans Mathibe"`
    #[arg(long = "var", value_name = "KEY=VALUE", value_parser = parse_var)]
    pub vars: Vec<(String, String)>,

    /// Directory for artifacts and screenshots
    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    /// Persistent browser profile directory
    #[arg(long)]
    pub profile_dir: Option<PathBuf>,

    /// Seconds to keep a visible browser open after the run
    #[arg(long)]
    pub linger: Option<u64>,
}

impl RunArgs {
    /// Fold CLI overrides into `config`
    pub fn apply(&self, config: &mut Config) {
        if self.visible {
            config.browser.headed = true;
        }
        if let Some(dir) = &self.output_dir {
            config.output.dir = dir.clone();
        }
        if let Some(dir) = &self.profile_dir {
            config.browser.profile_dir = Some(dir.clone());
        }
        if let Some(secs) = self.linger {
            config.browser.linger_secs = secs;
        }
    }
}

/// Parse `key=value`
pub fn parse_var(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{}'", raw))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty variable name in '{}'", raw));
    }
    Ok((key.to_string(), value.to_string()))
}
