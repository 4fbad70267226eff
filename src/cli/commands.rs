//! CLI commands
//!
//! Handlers behind each subcommand. `run` returns the process exit code
//! taken from the run artifact.

use std::collections::BTreeMap;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context};
use tracing::info;

use crate::browser::AgentBrowser;
use crate::cli::args::RunArgs;
use crate::core::{Config, Credentials, SitepilotError};
use crate::recorder::ResultArtifact;
use crate::workflow::{ConsoleOperator, RunReport, Runner, StepCatalog};

fn catalog(steps_file: Option<&Path>) -> anyhow::Result<StepCatalog> {
    let mut catalog = StepCatalog::builtin();
    if let Some(path) = steps_file {
        let added = catalog.extend_from_file(path)?;
        info!(path = %path.display(), added, "loaded step sets");
    }
    Ok(catalog)
}

/// `sitepilot run`
pub async fn run<I>(args: RunArgs, mut config: Config, interrupt: I) -> anyhow::Result<u8>
where
    I: Future<Output = ()>,
{
    args.apply(&mut config);
    config.validate()?;

    if args.email.trim().is_empty() || args.password.is_empty() {
        bail!("email and password are required (--email/--password or SITEPILOT_EMAIL/SITEPILOT_PASSWORD)");
    }
    let credentials = Credentials::new(args.email.trim(), args.password.as_str());

    let mut runner = Runner::new(config);
    if args.interactive {
        runner = runner.with_operator(Arc::new(ConsoleOperator));
    }

    let vars: BTreeMap<String, String> = args.vars.iter().cloned().collect();
    let plan = catalog(args.steps_file.as_deref())
        .and_then(|c| Ok(c.get(&args.step_set)?.resolve(&vars)?));
    let plan = match plan {
        Ok(plan) => plan,
        Err(e) => {
            let report = runner.reject(&args.step_set, &e.to_string())?;
            print_report(&report);
            return Ok(report.exit_code());
        }
    };

    let binary = &runner.config().browser.binary;
    if !AgentBrowser::is_available(binary).await {
        return Err(SitepilotError::AgentBrowserNotFound.into());
    }
    let browser = Arc::new(AgentBrowser::from_config(&runner.config().browser));

    let report = runner
        .execute_until(browser, plan, &credentials, interrupt)
        .await
        .context("failed to write the run artifact")?;

    print_report(&report);
    Ok(report.exit_code())
}

fn print_report(report: &RunReport) {
    let artifact = &report.artifact;
    println!("Run {}: {}", artifact.run_id, artifact.status);
    if let Some(url) = &artifact.url {
        println!("URL:      {}", url);
    }
    if let Some(error) = &artifact.error {
        println!("Error:    {}", error);
    }
    println!("Artifact: {}", report.artifact_path.display());
}

/// `sitepilot steps`
pub fn list_steps(steps_file: Option<&Path>) -> anyhow::Result<()> {
    let catalog = catalog(steps_file)?;
    for set in catalog.iter() {
        println!("{}", set.name);
        if !set.description.is_empty() {
            println!("  {}", set.description);
        }
        println!("  start: {}", set.start_url);
        for step in &set.steps {
            println!(
                "  - {:<16} {:<8} {}{}",
                step.name,
                step.kind,
                step.action.describe(),
                if step.is_critical() { "" } else { " (best-effort)" }
            );
        }
        let required: Vec<&str> = set
            .variables
            .iter()
            .filter(|(_, v)| v.is_empty())
            .map(|(k, _)| k.as_str())
            .collect();
        if !required.is_empty() {
            println!("  requires: {}", required.join(", "));
        }
        println!();
    }
    Ok(())
}

/// `sitepilot open`
pub fn open(url: Option<String>, step_set: Option<String>) -> anyhow::Result<()> {
    let catalog = StepCatalog::builtin();
    let url = match (url, &step_set) {
        (Some(url), _) => url,
        (None, Some(name)) => {
            let set = catalog.get(name)?;
            println!("Sign in, then complete '{}' by hand:", set.name);
            for (i, step) in set.steps.iter().enumerate() {
                println!("  {}. {} ({})", i + 1, step.name, step.action.describe());
            }
            set.start_url.clone()
        }
        (None, None) => bail!("give a URL or --step-set"),
    };
    let parsed = url::Url::parse(&url).with_context(|| format!("invalid URL '{}'", url))?;

    if webbrowser::open(parsed.as_str()).is_err() {
        println!("Could not open a browser. Visit:\n  {}", parsed);
    }
    Ok(())
}

/// `sitepilot status`
pub fn status(config: &Config, all: bool) -> anyhow::Result<()> {
    let dir = &config.output.dir;
    let artifacts = ResultArtifact::load_all(dir)
        .with_context(|| format!("failed to read runs in {}", dir.display()))?;

    let Some((path, latest)) = artifacts.first() else {
        println!("No runs recorded in {}", dir.display());
        return Ok(());
    };

    if all {
        for (_, artifact) in &artifacts {
            println!(
                "{}  {:<14} {:<8} {}",
                artifact.started_at.format("%Y-%m-%d %H:%M:%S"),
                artifact.step_set,
                artifact.status,
                artifact.url.as_deref().unwrap_or("-")
            );
        }
        return Ok(());
    }

    println!("Run {} ({})", latest.run_id, latest.step_set);
    println!("Status:   {}", latest.status);
    println!("Started:  {}", latest.started_at.format("%Y-%m-%d %H:%M:%S"));
    if let Some(url) = &latest.url {
        println!("URL:      {}", url);
    }
    if let Some(error) = &latest.error {
        println!("Error:    {}", error);
    }
    for step in &latest.steps {
        println!("  - {}", step);
    }
    println!("Artifact: {}", path.display());
    Ok(())
}

/// `sitepilot config`
pub fn show_config(config: &Config, init: bool) -> anyhow::Result<()> {
    let path = Config::config_file();
    if init {
        if Config::config_exists() {
            println!("Config already exists at {}", path.display());
        } else {
            let written = Config::default().save()?;
            println!("Wrote defaults to {}", written.display());
        }
        return Ok(());
    }

    println!(
        "# {} ({})",
        path.display(),
        if Config::config_exists() { "loaded" } else { "not found, defaults" }
    );
    println!("{}", toml::to_string_pretty(config)?);
    Ok(())
}
