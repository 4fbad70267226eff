//! Manual handoff
//!
//! When a critical step cannot be automated in interactive mode the engine
//! hands the open browser to the operator and blocks until they decide how
//! to continue.

use std::collections::VecDeque;
use std::io::{self, BufRead, Write};
use std::sync::Mutex;
use std::thread;

use async_trait::async_trait;
use tokio::sync::oneshot;

use crate::core::{Result, SitepilotError, StepKind};

/// What the engine tells the operator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandoffRequest {
    pub step: String,
    pub kind: StepKind,
    pub state: String,
    pub attempts: u32,
    pub reason: String,
    /// Candidates that were tried, in `kind=value` form
    pub candidates: Vec<String>,
    pub current_url: Option<String>,
}

impl HandoffRequest {
    /// Operator-facing explanation
    pub fn prompt(&self) -> String {
        let mut out = format!(
            "\nAutomation stalled at step '{}' ({}) after {} attempt(s): {}\n",
            self.step, self.state, self.attempts, self.reason
        );
        if let Some(url) = &self.current_url {
            out.push_str(&format!("Page: {}\n", url));
        }
        out.push_str("Tried:\n");
        for candidate in &self.candidates {
            out.push_str(&format!("  - {}\n", candidate));
        }
        out.push_str(
            "\nComplete this step in the open browser, then choose:\n\
             \x20 [c]ontinue  - step done by hand, go on to publishing\n\
             \x20 [r]etry     - try this step again\n\
             \x20 [q]uit      - stop here and leave the browser open\n",
        );
        out
    }
}

/// Operator's answer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperatorDecision {
    /// The operator finished by hand; continue at publishing. `url` is the
    /// published address when the operator read it off the page.
    Resume { url: Option<String> },
    /// Re-enter the stalled step
    Retry,
    /// End the run
    Abort,
}

impl OperatorDecision {
    pub fn parse(input: &str) -> Option<Self> {
        match input.trim().to_lowercase().as_str() {
            "c" | "continue" | "resume" | "done" => Some(Self::Resume { url: None }),
            "r" | "retry" => Some(Self::Retry),
            "q" | "quit" | "abort" | "close" => Some(Self::Abort),
            _ => None,
        }
    }
}

/// Someone who can take over a stalled run
#[async_trait]
pub trait Operator: Send + Sync {
    async fn request_manual(&self, request: &HandoffRequest) -> Result<OperatorDecision>;
}

/// Operator at the terminal
#[derive(Debug, Default)]
pub struct ConsoleOperator;

/// Parse an operator-typed published URL; blank means "not given"
pub fn parse_published_url(input: &str) -> std::result::Result<Option<String>, url::ParseError> {
    let input = input.trim();
    if input.is_empty() {
        return Ok(None);
    }
    url::Url::parse(input).map(|u| Some(u.to_string()))
}

impl ConsoleOperator {
    fn ask(prompt: String, publishing: bool) -> io::Result<OperatorDecision> {
        let stdin = io::stdin();
        let mut stderr = io::stderr();
        write!(stderr, "{}", prompt)?;

        let decision = loop {
            write!(stderr, "choice [c/r/q]: ")?;
            stderr.flush()?;

            let mut input = String::new();
            if stdin.lock().read_line(&mut input)? == 0 {
                // EOF: nobody is there to continue
                return Ok(OperatorDecision::Abort);
            }
            match OperatorDecision::parse(&input) {
                Some(decision) => break decision,
                None => writeln!(stderr, "Unknown choice '{}'", input.trim())?,
            }
        };

        if !publishing || !matches!(decision, OperatorDecision::Resume { .. }) {
            return Ok(decision);
        }
        loop {
            write!(stderr, "published URL (blank to read it from the page): ")?;
            stderr.flush()?;

            let mut input = String::new();
            if stdin.lock().read_line(&mut input)? == 0 {
                return Ok(OperatorDecision::Resume { url: None });
            }
            match parse_published_url(&input) {
                Ok(url) => return Ok(OperatorDecision::Resume { url }),
                Err(e) => writeln!(stderr, "Not a URL ({}): '{}'", e, input.trim())?,
            }
        }
    }
}

#[async_trait]
impl Operator for ConsoleOperator {
    /// The prompt runs on a detached thread: an interrupted run must be able
    /// to exit while the thread is still blocked on stdin.
    async fn request_manual(&self, request: &HandoffRequest) -> Result<OperatorDecision> {
        let prompt = request.prompt();
        let publishing = request.kind == StepKind::Publish;
        let (tx, rx) = oneshot::channel();
        thread::Builder::new()
            .name("operator-prompt".to_string())
            .spawn(move || {
                let _ = tx.send(Self::ask(prompt, publishing));
            })?;

        rx.await
            .map_err(|_| SitepilotError::Other("operator prompt ended without an answer".to_string()))?
            .map_err(SitepilotError::from)
    }
}

/// Operator that replays fixed decisions; aborts once they run out
#[derive(Debug, Default)]
pub struct ScriptedOperator {
    decisions: Mutex<VecDeque<OperatorDecision>>,
    requests: Mutex<Vec<HandoffRequest>>,
}

impl ScriptedOperator {
    pub fn new(decisions: impl IntoIterator<Item = OperatorDecision>) -> Self {
        Self {
            decisions: Mutex::new(decisions.into_iter().collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Requests received so far
    pub fn requests(&self) -> Vec<HandoffRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Operator for ScriptedOperator {
    async fn request_manual(&self, request: &HandoffRequest) -> Result<OperatorDecision> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }
        Ok(self
            .decisions
            .lock()
            .ok()
            .and_then(|mut d| d.pop_front())
            .unwrap_or(OperatorDecision::Abort))
    }
}
