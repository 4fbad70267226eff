//! Shared types used across sitepilot modules
//!
//! Contains the declarative step model (locator candidates, actions,
//! completion checks) and the credential pair supplied by the caller.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::core::error::SitepilotError;

/// How a locator candidate finds an element
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    /// CSS selector
    Css,
    /// XPath expression
    Xpath,
    /// `id` attribute
    Id,
    /// `name` attribute
    Name,
    /// `aria-label` attribute
    AriaLabel,
    /// `placeholder` attribute
    Placeholder,
    /// Visible text / accessible name, case-insensitive substring
    Text,
    /// ARIA role, optionally narrowed by name: `button` or `button[Publish]`
    Role,
}

impl Strategy {
    /// Prefix used in the compact `kind=value` form
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Css => "css",
            Strategy::Xpath => "xpath",
            Strategy::Id => "id",
            Strategy::Name => "name",
            Strategy::AriaLabel => "aria-label",
            Strategy::Placeholder => "placeholder",
            Strategy::Text => "text",
            Strategy::Role => "role",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Strategy {
    type Err = SitepilotError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "css" => Ok(Strategy::Css),
            "xpath" => Ok(Strategy::Xpath),
            "id" => Ok(Strategy::Id),
            "name" => Ok(Strategy::Name),
            "aria-label" | "aria" => Ok(Strategy::AriaLabel),
            "placeholder" => Ok(Strategy::Placeholder),
            "text" => Ok(Strategy::Text),
            "role" => Ok(Strategy::Role),
            other => Err(SitepilotError::config(format!(
                "Unknown locator strategy '{}'",
                other
            ))),
        }
    }
}

/// One way to find an element
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocatorCandidate {
    pub strategy: Strategy,
    pub value: String,
}

impl LocatorCandidate {
    pub fn new(strategy: Strategy, value: impl Into<String>) -> Self {
        Self {
            strategy,
            value: value.into(),
        }
    }

    pub fn css(value: impl Into<String>) -> Self {
        Self::new(Strategy::Css, value)
    }

    pub fn xpath(value: impl Into<String>) -> Self {
        Self::new(Strategy::Xpath, value)
    }

    pub fn id(value: impl Into<String>) -> Self {
        Self::new(Strategy::Id, value)
    }

    pub fn name(value: impl Into<String>) -> Self {
        Self::new(Strategy::Name, value)
    }

    pub fn aria_label(value: impl Into<String>) -> Self {
        Self::new(Strategy::AriaLabel, value)
    }

    pub fn placeholder(value: impl Into<String>) -> Self {
        Self::new(Strategy::Placeholder, value)
    }

    pub fn text(value: impl Into<String>) -> Self {
        Self::new(Strategy::Text, value)
    }

    pub fn role(value: impl Into<String>) -> Self {
        Self::new(Strategy::Role, value)
    }

    /// Split a role value into `(role, name)`
    pub fn role_parts(&self) -> (&str, Option<&str>) {
        let value = self.value.trim();
        match value.split_once('[') {
            Some((role, rest)) => {
                let name = rest.strip_suffix(']').unwrap_or(rest).trim();
                (role.trim(), (!name.is_empty()).then_some(name))
            }
            None => (value, None),
        }
    }
}

impl fmt::Display for LocatorCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.strategy, self.value)
    }
}

impl FromStr for LocatorCandidate {
    type Err = SitepilotError;

    /// Parse the compact `kind=value` form, e.g. `css=button.primary`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, value) = s.split_once('=').ok_or_else(|| {
            SitepilotError::config(format!("Locator '{}' is not of the form kind=value", s))
        })?;
        if value.is_empty() {
            return Err(SitepilotError::config(format!(
                "Locator '{}' has an empty value",
                s
            )));
        }
        Ok(Self::new(kind.parse()?, value))
    }
}

/// A single mutating interaction with a located element
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Interaction {
    Click,
    Type { text: String },
}

impl Interaction {
    pub fn type_text(text: impl Into<String>) -> Self {
        Interaction::Type { text: text.into() }
    }
}

/// What a step does with the element it located
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum StepAction {
    Click,
    Type { text: String },
    /// Several interactions against the same element, in order
    Composite { sequence: Vec<Interaction> },
}

impl StepAction {
    pub fn type_text(text: impl Into<String>) -> Self {
        StepAction::Type { text: text.into() }
    }

    /// Flatten into the interactions the locator performs one at a time
    pub fn interactions(&self) -> Vec<Interaction> {
        match self {
            StepAction::Click => vec![Interaction::Click],
            StepAction::Type { text } => vec![Interaction::Type { text: text.clone() }],
            StepAction::Composite { sequence } => sequence.clone(),
        }
    }

    /// Short description for the run log
    pub fn describe(&self) -> String {
        match self {
            StepAction::Click => "click".to_string(),
            StepAction::Type { text } => format!("type {} char(s)", text.chars().count()),
            StepAction::Composite { sequence } => format!("composite of {}", sequence.len()),
        }
    }
}

/// Which phase of the workflow a step belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepKind {
    Create,
    Fill,
    Publish,
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepKind::Create => write!(f, "create"),
            StepKind::Fill => write!(f, "fill"),
            StepKind::Publish => write!(f, "publish"),
        }
    }
}

/// Condition that must hold after a step's action for the step to count as done
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum CompletionCheck {
    /// The action itself is the completion
    #[default]
    None,
    /// The current URL contains a fragment
    UrlContains { fragment: String },
    /// The current URL differs from the URL before the action
    UrlChanged,
    /// An element matching any of the candidates appears
    ElementPresent { candidates: Vec<LocatorCandidate> },
}

/// One logical action in a workflow
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowStep {
    pub name: String,
    pub kind: StepKind,
    pub candidates: Vec<LocatorCandidate>,
    pub action: StepAction,
    #[serde(default)]
    pub completion: CompletionCheck,
    /// Explicit criticality; see [`WorkflowStep::is_critical`]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub critical: Option<bool>,
    /// URL to open before locating
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub navigate: Option<String>,
}

impl WorkflowStep {
    pub fn new(
        name: impl Into<String>,
        kind: StepKind,
        candidates: Vec<LocatorCandidate>,
        action: StepAction,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            candidates,
            action,
            completion: CompletionCheck::None,
            critical: None,
            navigate: None,
        }
    }

    pub fn with_completion(mut self, completion: CompletionCheck) -> Self {
        self.completion = completion;
        self
    }

    pub fn with_critical(mut self, critical: bool) -> Self {
        self.critical = Some(critical);
        self
    }

    pub fn with_navigate(mut self, url: impl Into<String>) -> Self {
        self.navigate = Some(url.into());
        self
    }

    /// Whether exhausting this step's attempts stops the run.
    ///
    /// Unless set explicitly, a create step that only clicks the creation
    /// control is best-effort (creation may already have happened in an
    /// earlier partial run); every step that carries content, and every fill
    /// and publish step, is critical.
    pub fn is_critical(&self) -> bool {
        self.critical.unwrap_or(match self.kind {
            StepKind::Create => !matches!(self.action, StepAction::Click),
            StepKind::Fill | StepKind::Publish => true,
        })
    }
}

/// Login credentials supplied by the caller.
///
/// `Debug` never prints the password.
#[derive(Clone)]
pub struct Credentials {
    pub email: String,
    password: String,
}

impl Credentials {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }

    pub fn password(&self) -> &str {
        &self.password
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"***")
            .finish()
    }
}
