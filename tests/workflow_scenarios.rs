//! End-to-end workflow scenarios
//!
//! Full runs through [`Runner`] against the in-memory browser on virtual
//! time: sign-in, step execution, manual handoff, profile locking and the
//! artifact each run leaves behind.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use sitepilot::automation::FakeClock;
use sitepilot::browser::{FakeAction, FakeBrowser, ProfileLock};
use sitepilot::core::{LocatorCandidate, StepAction, StepKind, WorkflowStep};
use sitepilot::workflow::{
    HandoffRequest, Operator, OperatorDecision, ScriptedOperator, StepCatalog, WorkflowPlan,
};
use sitepilot::{ArtifactStatus, Config, Credentials, RunReport, Runner};
use tokio::sync::Notify;

const LOGIN: &str = "https://sites.example.com/";
const SIGNIN: &str = "https://accounts.google.com/v3/signin/identifier";
const HOME: &str = "https://sites.example.com/home";
const START: &str = "https://sites.example.com/new";
const PASSWORD: &str = "correct-horse-battery";

fn config(dir: &Path) -> Config {
    let mut config = Config::default();
    config.output.dir = dir.join("runs");
    config.browser.profile_dir = None;
    config.browser.lock_dir = Some(dir.join("locks"));
    config.browser.headed = false;
    config
}

fn runner(config: Config) -> Runner {
    Runner::new(config).with_clock(Arc::new(FakeClock::new()))
}

fn creds() -> Credentials {
    Credentials::new("operator@example.com", PASSWORD)
}

fn name_field() -> LocatorCandidate {
    LocatorCandidate::placeholder("Site name")
}

fn publish_button() -> LocatorCandidate {
    LocatorCandidate::text("Publish")
}

/// `[login, create("Evans Mathibe"), publish]`; the name field is the last
/// of three candidates
fn plan() -> WorkflowPlan {
    WorkflowPlan {
        name: "site-builder".to_string(),
        login_url: LOGIN.to_string(),
        start_url: START.to_string(),
        steps: vec![
            WorkflowStep::new(
                "site-name",
                StepKind::Create,
                vec![
                    LocatorCandidate::css("input.name"),
                    LocatorCandidate::aria_label("Site name"),
                    name_field(),
                ],
                StepAction::type_text("Evans Mathibe"),
            ),
            WorkflowStep::new("publish", StepKind::Publish, vec![publish_button()], StepAction::Click),
        ],
        url_capture: None,
    }
}

/// Identity provider that asks for email, then password
fn signin_browser() -> FakeBrowser {
    FakeBrowser::new()
        .with_redirect(LOGIN, SIGNIN)
        .with_element(LocatorCandidate::name("identifier"))
        .with_element(LocatorCandidate::id("identifierNext"))
        .with_element(LocatorCandidate::name("Passwd"))
        .with_link(LocatorCandidate::id("passwordNext"), HOME)
}

fn typed(browser: &FakeBrowser) -> Vec<String> {
    browser
        .actions()
        .into_iter()
        .filter_map(|a| match a {
            FakeAction::Type { text, .. } => Some(text),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn test_sign_in_create_and_publish() {
    let dir = tempfile::tempdir().unwrap();
    let browser = Arc::new(signin_browser().with_element(name_field()).with_element(publish_button()));

    let report = runner(config(dir.path()))
        .execute(browser.clone(), plan(), &creds())
        .await
        .unwrap();

    let artifact = &report.artifact;
    assert_eq!(artifact.status, ArtifactStatus::Success);
    assert_eq!(artifact.url.as_deref(), Some(START));
    assert!(artifact.error.is_none());
    assert_eq!(artifact.final_state, "SUCCEEDED");
    assert_eq!(report.exit_code(), 0);

    assert_eq!(
        typed(&browser),
        vec!["operator@example.com", PASSWORD, "Evans Mathibe"]
    );
    for checkpoint in ["pre-login", "post-login", "pre-edit", "post-edit"] {
        let path = artifact.screenshots.get(checkpoint).unwrap();
        assert!(path.exists(), "{} screenshot missing", checkpoint);
    }
    assert!(!artifact.screenshots.contains_key("on-error"));
    assert!(browser.is_closed());

    let written = fs::read_to_string(&report.artifact_path).unwrap();
    assert!(!written.contains(PASSWORD));
    assert!(written.contains("\"status\": \"success\""));
}

#[tokio::test]
async fn test_sign_in_happens_before_creation() {
    let dir = tempfile::tempdir().unwrap();
    let browser = Arc::new(signin_browser().with_element(name_field()).with_element(publish_button()));

    runner(config(dir.path()))
        .execute(browser.clone(), plan(), &creds())
        .await
        .unwrap();

    let actions = browser.actions();
    let password_at = actions
        .iter()
        .position(|a| matches!(a, FakeAction::Type { text, .. } if text == PASSWORD))
        .unwrap();
    let start_at = actions
        .iter()
        .position(|a| *a == FakeAction::Navigate(START.to_string()))
        .unwrap();
    assert!(password_at < start_at);
}

#[tokio::test]
async fn test_missing_create_target_fails_run() {
    let dir = tempfile::tempdir().unwrap();
    let browser = Arc::new(signin_browser().with_element(publish_button()));

    let report = runner(config(dir.path()))
        .execute(browser.clone(), plan(), &creds())
        .await
        .unwrap();

    let artifact = &report.artifact;
    assert_eq!(artifact.status, ArtifactStatus::Failed);
    assert_eq!(report.exit_code(), 1);
    let error = artifact.error.as_deref().unwrap();
    assert!(error.contains("site-name"), "unexpected error: {}", error);
    assert!(error.contains("3 attempt(s)"), "unexpected error: {}", error);
    assert!(artifact.screenshots.contains_key("on-error"));

    assert!(!artifact.steps.is_empty());
    assert!(artifact.steps.iter().any(|s| s.contains("opened")));
    let last = artifact.steps.last().unwrap();
    assert!(last.starts_with("failed:") && last.contains("site-name"), "{}", last);

    let tried: Vec<String> = browser.finds().iter().map(ToString::to_string).collect();
    for candidate in ["css=input.name", "aria-label=Site name", "placeholder=Site name"] {
        assert!(tried.iter().any(|t| t == candidate), "{} never tried", candidate);
    }
    assert!(!browser
        .actions()
        .iter()
        .any(|a| *a == FakeAction::Click(publish_button().to_string())));
}

#[tokio::test]
async fn test_missing_login_field_is_authentication_failure() {
    let dir = tempfile::tempdir().unwrap();
    let browser = Arc::new(FakeBrowser::new().with_redirect(LOGIN, SIGNIN));

    let report = runner(config(dir.path()))
        .execute(browser.clone(), plan(), &creds())
        .await
        .unwrap();

    assert_eq!(report.artifact.status, ArtifactStatus::Failed);
    let error = report.artifact.error.unwrap();
    assert!(error.contains("Authentication error"), "unexpected error: {}", error);
    assert!(!browser.actions().contains(&FakeAction::Navigate(START.to_string())));
}

#[tokio::test]
async fn test_operator_finishes_stalled_step() {
    let dir = tempfile::tempdir().unwrap();
    let browser = Arc::new(FakeBrowser::new().with_element(publish_button()));
    let operator = Arc::new(ScriptedOperator::new([OperatorDecision::Resume { url: None }]));

    let report = runner(config(dir.path()))
        .with_operator(operator.clone())
        .execute(browser, plan(), &creds())
        .await
        .unwrap();

    assert_eq!(report.artifact.status, ArtifactStatus::Success);
    assert!(report.artifact.screenshots.contains_key("manual-handoff"));
    let requests = operator.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].step, "site-name");
    assert_eq!(requests[0].attempts, 3);
    assert_eq!(
        requests[0].candidates,
        vec![
            "css=input.name".to_string(),
            "aria-label=Site name".to_string(),
            "placeholder=Site name".to_string()
        ]
    );
}

#[tokio::test]
async fn test_operator_retry_reenters_step() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config(dir.path());
    config.waits.element_timeout_secs = 1;
    config.waits.poll_interval_ms = 500;

    // Three lookups per attempt, three attempts: visible from the retry on
    let late_field = LocatorCandidate::placeholder("Site name");
    let browser = Arc::new(
        FakeBrowser::new()
            .with_delayed_element(late_field, 9)
            .with_element(publish_button()),
    );
    let mut plan = plan();
    plan.steps[0].candidates = vec![name_field()];
    let operator = Arc::new(ScriptedOperator::new([OperatorDecision::Retry]));

    let report = runner(config)
        .with_operator(operator.clone())
        .execute(browser.clone(), plan, &creds())
        .await
        .unwrap();

    assert_eq!(report.artifact.status, ArtifactStatus::Success);
    assert_eq!(operator.requests().len(), 1);
    assert_eq!(typed(&browser), vec!["Evans Mathibe"]);
}

#[tokio::test]
async fn test_operator_close_after_creation_is_created() {
    let dir = tempfile::tempdir().unwrap();
    let browser = Arc::new(FakeBrowser::new().with_element(name_field()));
    let operator = Arc::new(ScriptedOperator::new([OperatorDecision::Abort]));

    let report = runner(config(dir.path()))
        .with_operator(operator)
        .execute(browser.clone(), plan(), &creds())
        .await
        .unwrap();

    assert_eq!(report.artifact.status, ArtifactStatus::Created);
    assert_eq!(report.exit_code(), 2);
    assert!(!browser.is_closed(), "the operator keeps the browser");
}

/// Keeps the handoff open until released, then ends the run
struct GatedOperator {
    entered: Arc<Notify>,
    release: Arc<Notify>,
}

#[async_trait]
impl Operator for GatedOperator {
    async fn request_manual(&self, _request: &HandoffRequest) -> sitepilot::Result<OperatorDecision> {
        self.entered.notify_one();
        self.release.notified().await;
        Ok(OperatorDecision::Abort)
    }
}

/// Start a run that stalls in a manual handoff, then a second run with the
/// same config while the first is still open
async fn overlapping_runs(config: Config) -> (RunReport, RunReport, Arc<FakeBrowser>) {
    let entered = Arc::new(Notify::new());
    let release = Arc::new(Notify::new());
    let first = runner(config.clone()).with_operator(Arc::new(GatedOperator {
        entered: entered.clone(),
        release: release.clone(),
    }));
    let second = runner(config);
    let second_browser = Arc::new(FakeBrowser::new().with_element(name_field()).with_element(publish_button()));
    let creds = creds();

    let (first_report, second_report) = tokio::join!(
        first.execute(Arc::new(FakeBrowser::new()), plan(), &creds),
        async {
            entered.notified().await;
            let report = second.execute(second_browser.clone(), plan(), &creds).await;
            release.notify_one();
            report
        }
    );
    (first_report.unwrap(), second_report.unwrap(), second_browser)
}

#[tokio::test]
async fn test_overlapping_runs_on_default_session_are_exclusive() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());
    assert!(config.browser.profile_dir.is_none());
    let lock_dir = config.browser.run_lock_dir();

    let (first, second, second_browser) = overlapping_runs(config).await;

    assert_eq!(second.artifact.status, ArtifactStatus::Failed);
    let error = second.artifact.error.unwrap();
    assert!(error.contains("locked"), "unexpected error: {}", error);
    assert!(error.contains(&first.artifact.run_id), "unexpected error: {}", error);
    assert!(second_browser.actions().is_empty());

    assert_eq!(first.artifact.status, ArtifactStatus::Failed);
    assert!(first.artifact.error.unwrap().contains("Operator ended the run"));
    assert!(!lock_dir.join(ProfileLock::FILE_NAME).exists());
}

#[tokio::test]
async fn test_overlapping_runs_on_same_profile_are_exclusive() {
    let dir = tempfile::tempdir().unwrap();
    let profile = dir.path().join("profile");
    let mut config = config(dir.path());
    config.browser.profile_dir = Some(profile.clone());

    let (first, second, second_browser) = overlapping_runs(config).await;

    assert_eq!(second.artifact.status, ArtifactStatus::Failed);
    assert_eq!(second.exit_code(), 1);
    let error = second.artifact.error.unwrap();
    assert!(error.contains("locked"), "unexpected error: {}", error);
    assert!(error.contains(&first.artifact.run_id), "unexpected error: {}", error);
    assert!(second_browser.actions().is_empty());
    assert!(!profile.join(ProfileLock::FILE_NAME).exists());
}

#[tokio::test]
async fn test_short_password_does_not_mangle_artifact() {
    let dir = tempfile::tempdir().unwrap();
    let browser = Arc::new(FakeBrowser::new().with_element(name_field()).with_element(publish_button()));

    let report = runner(config(dir.path()))
        .execute(browser, plan(), &Credentials::new("operator@example.com", "e"))
        .await
        .unwrap();

    let artifact = &report.artifact;
    assert_eq!(artifact.status, ArtifactStatus::Success);
    assert_eq!(artifact.url.as_deref(), Some(START));
    assert!(artifact.steps.iter().any(|s| s == "session already signed in"));
    assert!(artifact.steps.iter().all(|s| !s.contains("***")));
}

#[tokio::test]
async fn test_listing_abort_is_failed_not_created() {
    let dir = tempfile::tempdir().unwrap();
    let mut vars = BTreeMap::new();
    vars.insert("business_name".to_string(), "Evans Mathibe".to_string());
    vars.insert("description".to_string(), "Web design".to_string());
    let plan = StepCatalog::builtin()
        .get("listing-console")
        .unwrap()
        .resolve(&vars)
        .unwrap();
    let operator = Arc::new(ScriptedOperator::new([OperatorDecision::Abort]));

    let report = runner(config(dir.path()))
        .with_operator(operator.clone())
        .execute(Arc::new(FakeBrowser::new()), plan, &creds())
        .await
        .unwrap();

    assert_eq!(operator.requests()[0].step, "business-name");
    assert_eq!(report.artifact.status, ArtifactStatus::Failed);
    assert_eq!(report.exit_code(), 1);
}

#[tokio::test]
async fn test_profile_lock_released_after_run() {
    let dir = tempfile::tempdir().unwrap();
    let profile = dir.path().join("profile");
    let mut config = config(dir.path());
    config.browser.profile_dir = Some(profile.clone());
    let browser = Arc::new(FakeBrowser::new().with_element(name_field()).with_element(publish_button()));

    let report = runner(config)
        .execute(browser, plan(), &creds())
        .await
        .unwrap();

    assert_eq!(report.artifact.status, ArtifactStatus::Success);
    assert!(!profile.join(ProfileLock::FILE_NAME).exists());
}

#[tokio::test]
async fn test_builtin_site_builder_captures_published_link() {
    let dir = tempfile::tempdir().unwrap();
    let mut vars = BTreeMap::new();
    vars.insert("site_name".to_string(), "Evans Mathibe".to_string());
    let plan = StepCatalog::builtin()
        .get("site-builder")
        .unwrap()
        .resolve(&vars)
        .unwrap();

    // Session already signed in; no create button, the editor is open
    let browser = Arc::new(
        FakeBrowser::new()
            .with_element(LocatorCandidate::placeholder("Enter a site name"))
            .with_element(LocatorCandidate::xpath("//button[contains(text(),'Continue')]"))
            .with_element(LocatorCandidate::xpath("//button[contains(text(),'Publish')]"))
            .with_attribute(
                LocatorCandidate::css("a[href*='sites.google.com/view']"),
                "href",
                "https://sites.google.com/view/evans-mathibe",
            ),
    );

    let report = runner(config(dir.path()))
        .execute(browser.clone(), plan, &creds())
        .await
        .unwrap();

    let artifact = &report.artifact;
    assert_eq!(artifact.status, ArtifactStatus::Success, "{:?}", artifact.error);
    assert_eq!(
        artifact.url.as_deref(),
        Some("https://sites.google.com/view/evans-mathibe")
    );
    assert!(artifact.steps.iter().any(|s| s.contains("'open-create' skipped")));
    assert!(artifact.steps.iter().any(|s| s.contains("'confirm-publish' skipped")));
    assert_eq!(typed(&browser), vec!["Evans Mathibe"]);
}

#[tokio::test]
async fn test_every_run_leaves_one_terminal_artifact() {
    let dir = tempfile::tempdir().unwrap();
    let runs = dir.path().join("runs");

    for browser in [
        FakeBrowser::new().with_element(name_field()).with_element(publish_button()),
        FakeBrowser::new(),
        FakeBrowser::new().crash_after(4),
    ] {
        runner(config(dir.path()))
            .execute(Arc::new(browser), plan(), &creds())
            .await
            .unwrap();
    }

    let artifacts: Vec<_> = fs::read_dir(&runs)
        .unwrap()
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.extension().is_some_and(|x| x == "json"))
        .collect();
    assert_eq!(artifacts.len(), 3);
    for path in artifacts {
        let value: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        let status = value["status"].as_str().unwrap();
        assert!(["success", "failed"].contains(&status), "{}: {}", path.display(), status);
        assert_ne!(status, "starting");
    }
}
