//! Workflow run state
//!
//! The state machine's states, its legal transitions, and the mutable record
//! of one run. The step index is private and only moves forward.

use std::fmt;

use tracing::info;

use crate::core::{Result, SitepilotError, StepKind, WorkflowStep};
use crate::recorder::ArtifactStatus;

/// Engine state. Indexed states carry the position in the run's step list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowState {
    Pending,
    LoggingIn,
    Creating,
    FillingStep(usize),
    Publishing,
    PausedForManual(usize),
    Succeeded,
    Failed,
}

impl WorkflowState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, WorkflowState::Succeeded | WorkflowState::Failed)
    }

    /// State a step of `kind` at `index` runs in
    pub fn for_step(kind: StepKind, index: usize) -> Self {
        match kind {
            StepKind::Create => WorkflowState::Creating,
            StepKind::Fill => WorkflowState::FillingStep(index),
            StepKind::Publish => WorkflowState::Publishing,
        }
    }

    fn allows(&self, next: &WorkflowState) -> bool {
        use WorkflowState::*;

        match (self, next) {
            (Succeeded | Failed, _) => false,
            (_, Failed) => true,
            (Pending, LoggingIn) => true,
            (LoggingIn, Creating) => true,
            (Creating, Creating | Publishing | PausedForManual(_) | FillingStep(_)) => true,
            (FillingStep(i), FillingStep(j)) => j >= i,
            (FillingStep(_), Publishing | PausedForManual(_)) => true,
            (PausedForManual(i), FillingStep(j)) => j >= i,
            (PausedForManual(_), Creating | Publishing) => true,
            (Publishing, Publishing | PausedForManual(_) | Succeeded) => true,
            _ => false,
        }
    }
}

impl fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkflowState::Pending => write!(f, "PENDING"),
            WorkflowState::LoggingIn => write!(f, "LOGGING_IN"),
            WorkflowState::Creating => write!(f, "CREATING"),
            WorkflowState::FillingStep(i) => write!(f, "FILLING_STEP({})", i),
            WorkflowState::Publishing => write!(f, "PUBLISHING"),
            WorkflowState::PausedForManual(i) => write!(f, "PAUSED_FOR_MANUAL({})", i),
            WorkflowState::Succeeded => write!(f, "SUCCEEDED"),
            WorkflowState::Failed => write!(f, "FAILED"),
        }
    }
}

/// One execution of a workflow
#[derive(Debug, Clone)]
pub struct WorkflowRun {
    steps: Vec<WorkflowStep>,
    index: usize,
    state: WorkflowState,
    log: Vec<String>,
    url: Option<String>,
    error: Option<String>,
    /// A create step completed, by automation or by hand
    created: bool,
    /// The operator ended the run from a manual handoff
    operator_closed: bool,
}

impl WorkflowRun {
    pub fn new(steps: Vec<WorkflowStep>) -> Self {
        Self {
            steps,
            index: 0,
            state: WorkflowState::Pending,
            log: Vec::new(),
            url: None,
            error: None,
            created: false,
            operator_closed: false,
        }
    }

    pub fn steps(&self) -> &[WorkflowStep] {
        &self.steps
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn state(&self) -> WorkflowState {
        self.state
    }

    pub fn log(&self) -> &[String] {
        &self.log
    }

    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn is_created(&self) -> bool {
        self.created
    }

    pub fn operator_closed(&self) -> bool {
        self.operator_closed
    }

    /// Step at the current index, if any remain
    pub fn current_step(&self) -> Option<&WorkflowStep> {
        self.steps.get(self.index)
    }

    /// Index of the first publish step
    pub fn first_publish_index(&self) -> Option<usize> {
        self.steps.iter().position(|s| s.kind == StepKind::Publish)
    }

    /// Append to the run log
    pub fn record(&mut self, entry: impl Into<String>) {
        let entry = entry.into();
        info!(state = %self.state, "{}", entry);
        self.log.push(entry);
    }

    /// Move to `next`, rejecting transitions the state machine does not have
    pub fn transition(&mut self, next: WorkflowState) -> Result<()> {
        if self.state == next {
            return Ok(());
        }
        if !self.state.allows(&next) {
            return Err(SitepilotError::Other(format!(
                "illegal workflow transition {} -> {}",
                self.state, next
            )));
        }
        self.state = next;
        Ok(())
    }

    /// Move to the next step
    pub fn advance(&mut self) {
        self.index = (self.index + 1).min(self.steps.len());
    }

    /// Jump forward to `index`; never moves backwards
    pub fn skip_to(&mut self, index: usize) {
        self.index = self.index.max(index.min(self.steps.len()));
    }

    /// Record that a create step completed
    pub fn mark_created(&mut self) {
        self.created = true;
    }

    pub fn mark_operator_closed(&mut self) {
        self.operator_closed = true;
    }

    pub fn set_url(&mut self, url: Option<String>) {
        self.url = url;
    }

    /// Terminal failure with a reason. A run that already ended keeps its
    /// first outcome.
    pub fn fail(&mut self, reason: impl Into<String>) {
        if self.state.is_terminal() {
            return;
        }
        let reason = reason.into();
        self.record(format!("failed: {}", reason));
        self.error = Some(reason);
        self.state = WorkflowState::Failed;
    }

    /// Status the artifact should carry for this run
    pub fn artifact_status(&self) -> ArtifactStatus {
        match self.state {
            WorkflowState::Succeeded => ArtifactStatus::Success,
            WorkflowState::Failed if self.operator_closed && self.created => ArtifactStatus::Created,
            WorkflowState::Failed => ArtifactStatus::Failed,
            _ => ArtifactStatus::Starting,
        }
    }
}
