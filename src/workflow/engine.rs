//! Workflow engine
//!
//! Drives one [`WorkflowRun`] through sign-in, the ordered steps and
//! publishing. Each step is located with ordered fallback, retried up to the
//! configured budget, and on exhaustion either skipped (best-effort steps),
//! handed to the operator (interactive runs) or turned into a failure.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::automation::{AuthOutcome, CredentialSession, ElementLocator, Located, Waiter};
use crate::browser::Browser;
use crate::core::config::{Config, WaitConfig};
use crate::core::{CompletionCheck, Credentials, Result, SitepilotError, StepKind, WorkflowStep};
use crate::recorder::{Checkpoint, ResultRecorder};
use crate::workflow::handoff::{HandoffRequest, Operator, OperatorDecision};
use crate::workflow::state::{WorkflowRun, WorkflowState};
use crate::workflow::steps::WorkflowPlan;

/// How a single step ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// The action ran and its completion check held
    Done { attempts: u32 },
    /// A best-effort step could not be performed
    Skipped { reason: String },
    /// A critical step used up its attempts
    Exhausted { reason: String, attempts: u32 },
}

/// Executes a resolved plan against a browser
pub struct WorkflowEngine {
    browser: Arc<dyn Browser>,
    locator: ElementLocator,
    waiter: Waiter,
    session: CredentialSession,
    /// Present in interactive mode
    operator: Option<Arc<dyn Operator>>,
    waits: WaitConfig,
    plan: WorkflowPlan,
}

impl WorkflowEngine {
    pub fn new(browser: Arc<dyn Browser>, waiter: Waiter, config: &Config, plan: WorkflowPlan) -> Self {
        let locator = ElementLocator::new(browser.clone(), waiter.clone());
        let session = CredentialSession::new(
            browser.clone(),
            waiter.clone(),
            config.auth.clone(),
            config.waits.clone(),
            plan.login_url.clone(),
        );
        Self {
            browser,
            locator,
            waiter,
            session,
            operator: None,
            waits: config.waits.clone(),
            plan,
        }
    }

    /// Hand exhausted critical steps to `operator` instead of failing
    pub fn with_operator(mut self, operator: Arc<dyn Operator>) -> Self {
        self.operator = Some(operator);
        self
    }

    pub fn is_interactive(&self) -> bool {
        self.operator.is_some()
    }

    pub fn plan(&self) -> &WorkflowPlan {
        &self.plan
    }

    /// A fresh run over this engine's plan
    pub fn new_run(&self) -> WorkflowRun {
        WorkflowRun::new(self.plan.steps.clone())
    }

    /// Run the workflow to a terminal state.
    ///
    /// On error the run is marked failed and an on-error screenshot is
    /// attempted before the error is returned.
    pub async fn drive(
        &mut self,
        run: &mut WorkflowRun,
        recorder: &mut ResultRecorder,
        credentials: &Credentials,
    ) -> Result<()> {
        match self.execute(run, recorder, credentials).await {
            Ok(()) => Ok(()),
            Err(e) => {
                run.fail(e.to_string());
                recorder.checkpoint(self.browser.as_ref(), Checkpoint::OnError).await;
                Err(e)
            }
        }
    }

    async fn execute(
        &mut self,
        run: &mut WorkflowRun,
        recorder: &mut ResultRecorder,
        credentials: &Credentials,
    ) -> Result<()> {
        run.transition(WorkflowState::LoggingIn)?;
        run.record(format!("signing in via {}", self.plan.login_url));
        recorder.checkpoint(self.browser.as_ref(), Checkpoint::PreLogin).await;

        match self.session.authenticate(credentials).await? {
            AuthOutcome::AlreadyAuthenticated => run.record("session already signed in"),
            AuthOutcome::SignedIn => run.record("signed in"),
        }
        recorder.checkpoint(self.browser.as_ref(), Checkpoint::PostLogin).await;

        run.transition(WorkflowState::Creating)?;
        self.browser.navigate(&self.plan.start_url).await?;
        self.waiter.fixed_delay(self.waits.after_navigation()).await;
        run.record(format!("opened {}", self.plan.start_url));
        recorder.checkpoint(self.browser.as_ref(), Checkpoint::PreEdit).await;

        let mut post_edit_taken = false;
        while let Some(step) = run.current_step().cloned() {
            let index = run.index();
            if step.kind == StepKind::Publish && !post_edit_taken {
                recorder.checkpoint(self.browser.as_ref(), Checkpoint::PostEdit).await;
                post_edit_taken = true;
            }
            run.transition(WorkflowState::for_step(step.kind, index))?;

            match self.run_step(&step).await? {
                StepOutcome::Done { attempts } => {
                    run.record(format!(
                        "step '{}' done: {} (attempt {})",
                        step.name,
                        step.action.describe(),
                        attempts
                    ));
                    if step.kind == StepKind::Create {
                        run.mark_created();
                    }
                    run.advance();
                }
                StepOutcome::Skipped { reason } => {
                    run.record(format!("step '{}' skipped: {}", step.name, reason));
                    run.advance();
                }
                StepOutcome::Exhausted { reason, attempts } => {
                    self.escalate(run, recorder, &step, index, reason, attempts)
                        .await?;
                }
            }
        }

        if !post_edit_taken {
            recorder.checkpoint(self.browser.as_ref(), Checkpoint::PostEdit).await;
        }
        run.transition(WorkflowState::Publishing)?;

        if let Some(url) = run.url().map(str::to_string) {
            run.record(format!("published at {} (reported by operator)", url));
        } else {
            let url = self.capture_url().await?;
            match &url {
                Some(url) => run.record(format!("published at {}", url)),
                None => run.record("published; page URL unavailable"),
            }
            run.set_url(url);
        }
        run.transition(WorkflowState::Succeeded)?;
        info!(workflow = %self.plan.name, "workflow succeeded");
        Ok(())
    }

    /// Deal with an exhausted critical step. Returns `Ok` when the run should
    /// go on (the index tells where), `Err` when it ends here.
    async fn escalate(
        &mut self,
        run: &mut WorkflowRun,
        recorder: &mut ResultRecorder,
        step: &WorkflowStep,
        index: usize,
        reason: String,
        attempts: u32,
    ) -> Result<()> {
        let Some(operator) = self.operator.clone() else {
            return Err(SitepilotError::StepFailed {
                step: step.name.clone(),
                attempts,
                reason,
            });
        };

        let state = WorkflowState::for_step(step.kind, index);
        run.transition(WorkflowState::PausedForManual(index))?;
        run.record(format!("step '{}' handed to operator: {}", step.name, reason));
        recorder.checkpoint(self.browser.as_ref(), Checkpoint::ManualHandoff).await;

        let request = HandoffRequest {
            step: step.name.clone(),
            kind: step.kind,
            state: state.to_string(),
            attempts,
            reason,
            candidates: step.candidates.iter().map(ToString::to_string).collect(),
            current_url: self.browser.current_url().await.ok(),
        };

        match operator.request_manual(&request).await? {
            OperatorDecision::Resume { url } => {
                run.record(format!("operator completed '{}' by hand", step.name));
                if step.kind == StepKind::Create {
                    run.mark_created();
                }
                if let Some(url) = url {
                    run.set_url(Some(url));
                }
                let next = match step.kind {
                    StepKind::Publish => run.steps().len(),
                    StepKind::Create | StepKind::Fill => {
                        run.first_publish_index().unwrap_or(run.steps().len())
                    }
                };
                run.skip_to(next);
                Ok(())
            }
            OperatorDecision::Retry => {
                run.record(format!("operator asked to retry '{}'", step.name));
                Ok(())
            }
            OperatorDecision::Abort => {
                run.mark_operator_closed();
                Err(SitepilotError::OperatorAborted(step.name.clone()))
            }
        }
    }

    /// Attempt a step up to its budget. Best-effort steps get one attempt.
    pub async fn run_step(&self, step: &WorkflowStep) -> Result<StepOutcome> {
        let critical = step.is_critical();
        let max_attempts = if critical {
            self.waits.max_step_attempts.max(1)
        } else {
            1
        };

        let mut reason = String::new();
        for attempt in 1..=max_attempts {
            match self.attempt_step(step).await {
                Ok(()) => return Ok(StepOutcome::Done { attempts: attempt }),
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => reason = e.to_string(),
            }
            warn!(step = %step.name, attempt, max_attempts, %reason, "step attempt failed");
        }

        if critical {
            Ok(StepOutcome::Exhausted {
                reason,
                attempts: max_attempts,
            })
        } else {
            Ok(StepOutcome::Skipped { reason })
        }
    }

    async fn attempt_step(&self, step: &WorkflowStep) -> Result<()> {
        if let Some(url) = &step.navigate {
            self.browser.navigate(url).await?;
            self.waiter.fixed_delay(self.waits.after_navigation()).await;
        }

        let before = match step.completion {
            CompletionCheck::UrlChanged => Some(self.browser.current_url().await?),
            _ => None,
        };

        let located = self
            .locator
            .locate_within(&step.candidates, self.waits.element_timeout())
            .await?;
        let Located::Found { element, index } = located else {
            return Err(SitepilotError::browser(format!(
                "none of {} candidate(s) matched",
                step.candidates.len()
            )));
        };
        debug!(step = %step.name, candidate = %element.candidate, index, "step target located");

        for (i, interaction) in step.action.interactions().iter().enumerate() {
            if i > 0 {
                self.waiter.fixed_delay(self.waits.after_action()).await;
            }
            self.locator.act(&element, interaction).await?;
        }
        self.waiter.fixed_delay(self.waits.after_action()).await;

        self.check_completion(&step.completion, before.as_deref()).await
    }

    async fn check_completion(&self, check: &CompletionCheck, before: Option<&str>) -> Result<()> {
        let timeout = self.waits.element_timeout();
        match check {
            CompletionCheck::None => Ok(()),
            CompletionCheck::UrlContains { fragment } => {
                let browser = self.browser.clone();
                self.waiter
                    .poll_until(&format!("URL containing '{}'", fragment), timeout, || {
                        let browser = browser.clone();
                        let fragment = fragment.clone();
                        async move {
                            let url = browser.current_url().await?;
                            Ok::<_, SitepilotError>(url.contains(&fragment))
                        }
                    })
                    .await
            }
            CompletionCheck::UrlChanged => {
                let browser = self.browser.clone();
                let before = before.unwrap_or_default().to_string();
                self.waiter
                    .poll_until("URL to change", timeout, || {
                        let browser = browser.clone();
                        let before = before.clone();
                        async move {
                            let url = browser.current_url().await?;
                            Ok::<_, SitepilotError>(url != before)
                        }
                    })
                    .await
            }
            CompletionCheck::ElementPresent { candidates } => {
                match self.locator.locate_within(candidates, timeout).await? {
                    Located::Found { .. } => Ok(()),
                    Located::NotFound { .. } => {
                        Err(SitepilotError::timeout("completion element", timeout))
                    }
                }
            }
        }
    }

    /// Published URL: the capture element's attribute when configured and
    /// present, else the current page URL. Non-fatal lookup errors leave it
    /// unknown.
    async fn capture_url(&self) -> Result<Option<String>> {
        if let Some(capture) = &self.plan.url_capture {
            match self.locator.locate(&capture.candidates).await? {
                Located::Found { element, .. } => {
                    match self.browser.attribute(&element, &capture.attribute).await {
                        Ok(Some(value)) if !value.trim().is_empty() => {
                            return Ok(Some(value.trim().to_string()))
                        }
                        Ok(_) => debug!(attribute = %capture.attribute, "capture element has no value"),
                        Err(e) if e.is_fatal() => return Err(e),
                        Err(e) => warn!(error = %e, "reading published URL failed"),
                    }
                }
                Located::NotFound { .. } => debug!("no published link on page, using current URL"),
            }
        }

        match self.browser.current_url().await {
            Ok(url) if !url.is_empty() => Ok(Some(url)),
            Ok(_) => Ok(None),
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                warn!(error = %e, "reading current URL failed");
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::automation::FakeClock;
    use crate::browser::{FakeAction, FakeBrowser};
    use crate::core::{LocatorCandidate, StepAction};
    use crate::recorder::ArtifactStatus;
    use crate::workflow::handoff::ScriptedOperator;
    use crate::workflow::steps::UrlCapture;
    use std::time::Duration;

    const START: &str = "https://builder.example.com/";

    fn plan(steps: Vec<WorkflowStep>) -> WorkflowPlan {
        WorkflowPlan {
            name: "test".to_string(),
            login_url: START.to_string(),
            start_url: START.to_string(),
            steps,
            url_capture: None,
        }
    }

    fn publish_step() -> WorkflowStep {
        WorkflowStep::new(
            "publish",
            StepKind::Publish,
            vec![LocatorCandidate::id("publish")],
            StepAction::Click,
        )
    }

    fn engine(browser: Arc<FakeBrowser>, plan: WorkflowPlan) -> (Arc<FakeClock>, WorkflowEngine) {
        let clock = Arc::new(FakeClock::new());
        let waiter = Waiter::new(clock.clone(), Duration::from_millis(500));
        (clock, WorkflowEngine::new(browser, waiter, &Config::default(), plan))
    }

    fn creds() -> Credentials {
        Credentials::new("ops@example.com", "secret")
    }

    #[tokio::test]
    async fn test_best_effort_step_is_skipped_once() {
        let browser = Arc::new(FakeBrowser::new());
        let step = WorkflowStep::new(
            "open-create",
            StepKind::Create,
            vec![LocatorCandidate::id("a"), LocatorCandidate::id("b")],
            StepAction::Click,
        );
        let (_clock, engine) = engine(browser.clone(), plan(vec![publish_step()]));

        let outcome = engine.run_step(&step).await.unwrap();
        assert!(matches!(outcome, StepOutcome::Skipped { .. }));
        assert!(browser.finds().len() >= 2);
        assert!(browser.actions().is_empty());
    }

    #[tokio::test]
    async fn test_critical_step_exhausts_budget() {
        let browser = Arc::new(FakeBrowser::new());
        let step = WorkflowStep::new(
            "site-name",
            StepKind::Create,
            vec![LocatorCandidate::id("name")],
            StepAction::type_text("Evans Mathibe"),
        );
        let (_clock, engine) = engine(browser, plan(vec![publish_step()]));

        match engine.run_step(&step).await.unwrap() {
            StepOutcome::Exhausted { attempts, reason } => {
                assert_eq!(attempts, 3);
                assert!(reason.contains("none of 1 candidate(s) matched"));
            }
            other => panic!("expected exhaustion, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_composite_action_runs_in_order() {
        let field = LocatorCandidate::id("title");
        let browser = Arc::new(FakeBrowser::new().with_element(field.clone()));
        let step = WorkflowStep::new(
            "title",
            StepKind::Fill,
            vec![field.clone()],
            StepAction::Composite {
                sequence: vec![
                    crate::core::Interaction::Click,
                    crate::core::Interaction::type_text("Hello"),
                ],
            },
        );
        let (_clock, engine) = engine(browser.clone(), plan(vec![publish_step()]));

        let outcome = engine.run_step(&step).await.unwrap();
        assert_eq!(outcome, StepOutcome::Done { attempts: 1 });
        assert_eq!(
            browser.actions(),
            vec![
                FakeAction::Click(field.to_string()),
                FakeAction::Type {
                    selector: field.to_string(),
                    text: "Hello".to_string()
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_url_change_completion() {
        let next = LocatorCandidate::id("next");
        let browser = Arc::new(
            FakeBrowser::new().with_link(next.clone(), "https://builder.example.com/edit/1"),
        );
        browser.navigate(START).await.unwrap();
        let step = WorkflowStep::new("next", StepKind::Fill, vec![next], StepAction::Click)
            .with_completion(CompletionCheck::UrlChanged);
        let (_clock, engine) = engine(browser, plan(vec![publish_step()]));

        assert_eq!(engine.run_step(&step).await.unwrap(), StepOutcome::Done { attempts: 1 });
    }

    #[tokio::test]
    async fn test_unmet_completion_retries() {
        let button = LocatorCandidate::id("save");
        let browser = Arc::new(FakeBrowser::new().with_element(button.clone()));
        let step = WorkflowStep::new("save", StepKind::Fill, vec![button.clone()], StepAction::Click)
            .with_completion(CompletionCheck::UrlContains {
                fragment: "/saved".to_string(),
            });
        let (_clock, engine) = engine(browser.clone(), plan(vec![publish_step()]));

        let outcome = engine.run_step(&step).await.unwrap();
        assert!(matches!(outcome, StepOutcome::Exhausted { attempts: 3, .. }));
        assert_eq!(browser.actions().len(), 3);
    }

    #[tokio::test]
    async fn test_drive_captures_published_link() {
        let publish = LocatorCandidate::id("publish");
        let link = LocatorCandidate::css("a.published");
        let browser = Arc::new(
            FakeBrowser::new()
                .with_element(publish)
                .with_attribute(link.clone(), "href", "https://example.com/view/evans"),
        );
        let mut plan = plan(vec![publish_step()]);
        plan.url_capture = Some(UrlCapture {
            candidates: vec![link],
            attribute: "href".to_string(),
        });
        let (_clock, mut engine) = engine(browser, plan);
        let dir = tempfile::tempdir().unwrap();
        let mut recorder = ResultRecorder::with_run_id(dir.path(), "test", "r").unwrap();
        let mut run = engine.new_run();

        engine.drive(&mut run, &mut recorder, &creds()).await.unwrap();

        assert_eq!(run.state(), WorkflowState::Succeeded);
        assert_eq!(run.url(), Some("https://example.com/view/evans"));
    }

    #[tokio::test]
    async fn test_operator_resume_skips_to_publish() {
        let browser = Arc::new(FakeBrowser::new().with_element(LocatorCandidate::id("publish")));
        let name = WorkflowStep::new(
            "site-name",
            StepKind::Create,
            vec![LocatorCandidate::id("name")],
            StepAction::type_text("Evans Mathibe"),
        );
        let about = WorkflowStep::new(
            "about",
            StepKind::Fill,
            vec![LocatorCandidate::id("about")],
            StepAction::type_text("text"),
        );
        let operator = Arc::new(ScriptedOperator::new([OperatorDecision::Resume { url: None }]));
        let (_clock, engine) = engine(browser, plan(vec![name, about, publish_step()]));
        let mut engine = engine.with_operator(operator.clone());
        let dir = tempfile::tempdir().unwrap();
        let mut recorder = ResultRecorder::with_run_id(dir.path(), "test", "r").unwrap();
        let mut run = engine.new_run();

        engine.drive(&mut run, &mut recorder, &creds()).await.unwrap();

        assert_eq!(run.state(), WorkflowState::Succeeded);
        let requests = operator.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].step, "site-name");
        assert!(run.log().iter().any(|e| e.contains("by hand")));
        assert!(!run.log().iter().any(|e| e.contains("'about'")));
    }

    #[tokio::test]
    async fn test_operator_abort_after_creation_is_created() {
        let browser = Arc::new(FakeBrowser::new().with_element(LocatorCandidate::id("name")));
        let name = WorkflowStep::new(
            "site-name",
            StepKind::Create,
            vec![LocatorCandidate::id("name")],
            StepAction::type_text("Evans Mathibe"),
        );
        let operator = Arc::new(ScriptedOperator::new([OperatorDecision::Abort]));
        let (_clock, engine) = engine(browser, plan(vec![name, publish_step()]));
        let mut engine = engine.with_operator(operator);
        let dir = tempfile::tempdir().unwrap();
        let mut recorder = ResultRecorder::with_run_id(dir.path(), "test", "r").unwrap();
        let mut run = engine.new_run();

        let err = engine.drive(&mut run, &mut recorder, &creds()).await.unwrap_err();

        assert!(matches!(err, SitepilotError::OperatorAborted(ref s) if s == "publish"));
        assert_eq!(run.artifact_status(), ArtifactStatus::Created);
    }

    #[tokio::test]
    async fn test_driver_fault_fails_run() {
        let browser = Arc::new(FakeBrowser::new().crash_after(3));
        let (_clock, mut engine) = engine(browser, plan(vec![publish_step()]));
        let dir = tempfile::tempdir().unwrap();
        let mut recorder = ResultRecorder::with_run_id(dir.path(), "test", "r").unwrap();
        let mut run = engine.new_run();

        let err = engine.drive(&mut run, &mut recorder, &creds()).await.unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(run.state(), WorkflowState::Failed);
        assert!(run.error().is_some());
    }

    #[tokio::test]
    async fn test_abort_without_create_step_is_failed() {
        let browser = Arc::new(FakeBrowser::new());
        let name = WorkflowStep::new(
            "business-name",
            StepKind::Fill,
            vec![LocatorCandidate::aria_label("Business name")],
            StepAction::type_text("Evans Mathibe"),
        );
        let operator = Arc::new(ScriptedOperator::new([OperatorDecision::Abort]));
        let (_clock, engine) = engine(browser, plan(vec![name, publish_step()]));
        let mut engine = engine.with_operator(operator);
        let dir = tempfile::tempdir().unwrap();
        let mut recorder = ResultRecorder::with_run_id(dir.path(), "test", "r").unwrap();
        let mut run = engine.new_run();

        let err = engine.drive(&mut run, &mut recorder, &creds()).await.unwrap_err();

        assert!(matches!(err, SitepilotError::OperatorAborted(ref s) if s == "business-name"));
        assert!(!run.is_created());
        assert_eq!(run.artifact_status(), ArtifactStatus::Failed);
        assert_eq!(run.artifact_status().exit_code(), 1);
    }

    #[tokio::test]
    async fn test_operator_reported_url_wins_over_page() {
        let browser = Arc::new(FakeBrowser::new());
        let operator = Arc::new(ScriptedOperator::new([OperatorDecision::Resume {
            url: Some("https://sites.google.com/view/evans-mathibe".to_string()),
        }]));
        let (_clock, engine) = engine(browser, plan(vec![publish_step()]));
        let mut engine = engine.with_operator(operator.clone());
        let dir = tempfile::tempdir().unwrap();
        let mut recorder = ResultRecorder::with_run_id(dir.path(), "test", "r").unwrap();
        let mut run = engine.new_run();

        engine.drive(&mut run, &mut recorder, &creds()).await.unwrap();

        assert_eq!(run.state(), WorkflowState::Succeeded);
        assert_eq!(run.url(), Some("https://sites.google.com/view/evans-mathibe"));
        assert_eq!(operator.requests()[0].kind, StepKind::Publish);
        assert!(run.log().iter().any(|e| e.contains("reported by operator")));
    }
}
