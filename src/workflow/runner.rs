//! Run lifecycle
//!
//! Wraps one engine run with everything that must happen whatever the
//! outcome: the profile or session lock, browser teardown and the single
//! artifact write. Panics inside the engine and an external interrupt both
//! end in a failed artifact rather than a missing one.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tracing::{error, info, warn};

use crate::automation::{Clock, TokioClock, Waiter};
use crate::browser::{Browser, ProfileLock};
use crate::core::{Config, Credentials, Result};
use crate::recorder::{Checkpoint, ResultArtifact, ResultRecorder};
use crate::workflow::engine::WorkflowEngine;
use crate::workflow::handoff::Operator;
use crate::workflow::state::WorkflowRun;
use crate::workflow::steps::WorkflowPlan;

/// What a finished run left behind
#[derive(Debug, Clone)]
pub struct RunReport {
    pub artifact: ResultArtifact,
    pub artifact_path: PathBuf,
}

impl RunReport {
    pub fn exit_code(&self) -> u8 {
        self.artifact.status.exit_code()
    }
}

/// Executes plans with guaranteed finalization
pub struct Runner {
    config: Config,
    clock: Arc<dyn Clock>,
    operator: Option<Arc<dyn Operator>>,
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

impl Runner {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            clock: Arc::new(TokioClock::new()),
            operator: None,
        }
    }

    /// Use `clock` for every wait
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Interactive mode: exhausted critical steps go to `operator`
    pub fn with_operator(mut self, operator: Arc<dyn Operator>) -> Self {
        self.operator = Some(operator);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run `plan` to completion
    pub async fn execute(
        &self,
        browser: Arc<dyn Browser>,
        plan: WorkflowPlan,
        credentials: &Credentials,
    ) -> Result<RunReport> {
        self.execute_until(browser, plan, credentials, std::future::pending::<()>())
            .await
    }

    /// Run `plan` until it finishes or `interrupt` resolves.
    ///
    /// Returns `Err` only when the artifact itself cannot be written; every
    /// workflow outcome, including panics and interrupts, is in the report.
    pub async fn execute_until<I>(
        &self,
        browser: Arc<dyn Browser>,
        plan: WorkflowPlan,
        credentials: &Credentials,
        interrupt: I,
    ) -> Result<RunReport>
    where
        I: Future<Output = ()>,
    {
        let mut recorder = ResultRecorder::new(&self.config.output.dir, &plan.name)?;
        recorder.register_secret(credentials.password());
        info!(run_id = %recorder.run_id(), workflow = %plan.name, "run starting");

        let waiter = Waiter::new(self.clock.clone(), self.config.waits.poll_interval());
        let mut engine = WorkflowEngine::new(browser.clone(), waiter.clone(), &self.config, plan);
        if let Some(operator) = &self.operator {
            engine = engine.with_operator(operator.clone());
        }
        let mut run = engine.new_run();

        let lock = match ProfileLock::acquire(&self.config.browser.run_lock_dir(), recorder.run_id()) {
            Ok(lock) => lock,
            Err(e) => {
                error!(error = %e, "cannot start run");
                run.fail(e.to_string());
                return self.finish(recorder, &run);
            }
        };

        let mut interrupt = std::pin::pin!(interrupt);
        let outcome = {
            let drive = AssertUnwindSafe(engine.drive(&mut run, &mut recorder, credentials))
                .catch_unwind();
            tokio::select! {
                biased;
                _ = &mut interrupt => None,
                result = drive => Some(result),
            }
        };

        let abnormal = match outcome {
            Some(Ok(Ok(()))) => false,
            Some(Ok(Err(e))) => {
                warn!(error = %e, "run failed");
                false
            }
            Some(Err(payload)) => {
                let message = panic_message(&*payload);
                error!(panic = %message, "engine panicked");
                run.fail(format!("internal error: {}", message));
                true
            }
            None => {
                warn!("run interrupted");
                run.fail("interrupted before completion");
                true
            }
        };
        if abnormal {
            recorder.checkpoint(browser.as_ref(), Checkpoint::OnError).await;
        }

        let browser_cfg = &self.config.browser;
        if browser_cfg.headed && browser_cfg.linger_secs > 0 && !abnormal {
            info!(seconds = browser_cfg.linger_secs, "keeping browser open");
            tokio::select! {
                _ = &mut interrupt => info!("interrupted, closing early"),
                _ = waiter.fixed_delay(Duration::from_secs(browser_cfg.linger_secs)) => {}
            }
        }

        if run.operator_closed() {
            info!("leaving the browser to the operator");
        } else if let Err(e) = browser.close().await {
            warn!(error = %e, "closing browser failed");
        }
        drop(lock);

        self.finish(recorder, &run)
    }

    /// Record a run that was refused before any browser work, e.g. for an
    /// unresolved step-set variable
    pub fn reject(&self, step_set: &str, reason: &str) -> Result<RunReport> {
        let recorder = ResultRecorder::new(&self.config.output.dir, step_set)?;
        let mut run = WorkflowRun::new(Vec::new());
        error!(workflow = %step_set, %reason, "run rejected");
        run.fail(reason);
        self.finish(recorder, &run)
    }

    fn finish(&self, mut recorder: ResultRecorder, run: &WorkflowRun) -> Result<RunReport> {
        let artifact = recorder.finalize(run)?;
        Ok(RunReport {
            artifact,
            artifact_path: recorder.artifact_path(),
        })
    }
}
