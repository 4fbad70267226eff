//! Step-set catalog
//!
//! A step set is the declarative description of one target: where to sign
//! in, where the workflow starts, the ordered steps, and how to read back the
//! published URL. Two sets are built in; more can be loaded from TOML.

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::core::{
    CompletionCheck, Interaction, LocatorCandidate, Result, SitepilotError, StepAction, StepKind,
    WorkflowStep,
};

/// Where the published URL is read from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlCapture {
    pub candidates: Vec<LocatorCandidate>,
    #[serde(default = "default_attribute")]
    pub attribute: String,
}

fn default_attribute() -> String {
    "href".to_string()
}

/// Declarative workflow for one target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepSet {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub login_url: String,
    pub start_url: String,
    /// Defaults for `${name}` placeholders; an empty default means required
    #[serde(default)]
    pub variables: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url_capture: Option<UrlCapture>,
    pub steps: Vec<WorkflowStep>,
}

/// A step set with its placeholders filled in, ready to run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowPlan {
    pub name: String,
    pub login_url: String,
    pub start_url: String,
    pub steps: Vec<WorkflowStep>,
    pub url_capture: Option<UrlCapture>,
}

/// Replace `${name}` placeholders from `vars`
pub fn expand_placeholders(text: &str, vars: &BTreeMap<String, String>) -> Result<String> {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after.find('}').ok_or_else(|| {
            SitepilotError::config(format!("Unterminated placeholder in '{}'", text))
        })?;
        let name = after[..end].trim();
        match vars.get(name) {
            Some(value) if !value.is_empty() => out.push_str(value),
            _ => {
                return Err(SitepilotError::config(format!(
                    "Variable '{}' is required (pass --var {}=...)",
                    name, name
                )))
            }
        }
        rest = &after[end + 1..];
    }

    out.push_str(rest);
    Ok(out)
}

fn check_url(field: &str, value: &str) -> Result<()> {
    // Placeholders are checked after expansion
    if value.contains("${") {
        return Ok(());
    }
    Url::parse(value)
        .map(|_| ())
        .map_err(|e| SitepilotError::config(format!("{} '{}' is not a valid URL: {}", field, value, e)))
}

impl StepSet {
    /// Structural checks: URLs, candidates, unique names, and phase order
    /// create* fill* publish+
    pub fn validate(&self) -> Result<()> {
        check_url("login_url", &self.login_url)?;
        check_url("start_url", &self.start_url)?;

        if self.steps.is_empty() {
            return Err(SitepilotError::config(format!("Step set '{}' has no steps", self.name)));
        }

        let mut names = HashSet::new();
        let mut phase = StepKind::Create;
        for step in &self.steps {
            if !names.insert(step.name.as_str()) {
                return Err(SitepilotError::config(format!(
                    "Step set '{}' has two steps named '{}'",
                    self.name, step.name
                )));
            }
            if step.candidates.is_empty() {
                return Err(SitepilotError::config(format!(
                    "Step '{}' has no locator candidates",
                    step.name
                )));
            }
            if let Some(url) = &step.navigate {
                check_url("navigate", url)?;
            }
            let rank = |k: StepKind| match k {
                StepKind::Create => 0,
                StepKind::Fill => 1,
                StepKind::Publish => 2,
            };
            if rank(step.kind) < rank(phase) {
                return Err(SitepilotError::config(format!(
                    "Step '{}' ({}) comes after a {} step; order must be create, fill, publish",
                    step.name, step.kind, phase
                )));
            }
            phase = step.kind;
        }

        if phase != StepKind::Publish {
            return Err(SitepilotError::config(format!(
                "Step set '{}' needs at least one publish step",
                self.name
            )));
        }
        Ok(())
    }

    /// Fill in placeholders, `overrides` taking precedence over defaults
    pub fn resolve(&self, overrides: &BTreeMap<String, String>) -> Result<WorkflowPlan> {
        self.validate()?;

        let mut vars = self.variables.clone();
        vars.extend(overrides.iter().map(|(k, v)| (k.clone(), v.clone())));

        let expand_action = |action: &StepAction| -> Result<StepAction> {
            Ok(match action {
                StepAction::Click => StepAction::Click,
                StepAction::Type { text } => StepAction::Type {
                    text: expand_placeholders(text, &vars)?,
                },
                StepAction::Composite { sequence } => StepAction::Composite {
                    sequence: sequence
                        .iter()
                        .map(|i| match i {
                            Interaction::Type { text } => Ok(Interaction::Type {
                                text: expand_placeholders(text, &vars)?,
                            }),
                            other => Ok(other.clone()),
                        })
                        .collect::<Result<_>>()?,
                },
            })
        };

        let steps = self
            .steps
            .iter()
            .map(|step| {
                let mut step = step.clone();
                step.action = expand_action(&step.action)?;
                step.navigate = step
                    .navigate
                    .as_deref()
                    .map(|u| expand_placeholders(u, &vars))
                    .transpose()?;
                Ok(step)
            })
            .collect::<Result<Vec<_>>>()?;

        let login_url = expand_placeholders(&self.login_url, &vars)?;
        let start_url = expand_placeholders(&self.start_url, &vars)?;
        check_url("login_url", &login_url)?;
        check_url("start_url", &start_url)?;

        Ok(WorkflowPlan {
            name: self.name.clone(),
            login_url,
            start_url,
            steps,
            url_capture: self.url_capture.clone(),
        })
    }

    /// Site builder: create a named site and publish it
    pub fn site_builder() -> Self {
        let create_buttons = vec![
            LocatorCandidate::xpath("//button[contains(text(),'Create')]"),
            LocatorCandidate::xpath("//a[contains(text(),'Create new site')]"),
            LocatorCandidate::xpath("//div[contains(text(),'Create new site')]"),
            LocatorCandidate::xpath("//button[contains(@aria-label,'Create')]"),
        ];
        let publish_buttons = vec![
            LocatorCandidate::xpath("//button[contains(text(),'Publish')]"),
            LocatorCandidate::xpath("//button[contains(@aria-label,'Publish')]"),
            LocatorCandidate::role("button[Publish]"),
        ];

        let mut variables = BTreeMap::new();
        variables.insert("site_name".to_string(), String::new());

        Self {
            name: "site-builder".to_string(),
            description: "Create a new site, name it, and publish it".to_string(),
            login_url: "https://sites.google.com".to_string(),
            start_url: "https://sites.google.com".to_string(),
            variables,
            url_capture: Some(UrlCapture {
                candidates: vec![
                    LocatorCandidate::css("a[href*='sites.google.com/view']"),
                    LocatorCandidate::css("div[role='dialog'] a[href^='https://']"),
                ],
                attribute: default_attribute(),
            }),
            steps: vec![
                WorkflowStep::new("open-create", StepKind::Create, create_buttons, StepAction::Click),
                WorkflowStep::new(
                    "site-name",
                    StepKind::Create,
                    vec![
                        LocatorCandidate::placeholder("Enter a site name"),
                        LocatorCandidate::placeholder("Site name"),
                        LocatorCandidate::css("input[class*='name-input']"),
                    ],
                    StepAction::type_text("${site_name}"),
                ),
                WorkflowStep::new(
                    "confirm-create",
                    StepKind::Create,
                    vec![
                        LocatorCandidate::xpath("//button[contains(text(),'Create')]"),
                        LocatorCandidate::xpath("//button[contains(text(),'Continue')]"),
                        LocatorCandidate::css("button[type='submit']"),
                    ],
                    StepAction::Click,
                ),
                WorkflowStep::new("publish", StepKind::Publish, publish_buttons, StepAction::Click),
                WorkflowStep::new(
                    "confirm-publish",
                    StepKind::Publish,
                    vec![
                        LocatorCandidate::xpath("//div[@role='dialog']//button[contains(text(),'Publish')]"),
                        LocatorCandidate::css("div[role='dialog'] button[data-id='publish']"),
                    ],
                    StepAction::Click,
                )
                .with_critical(false),
            ],
        }
    }

    /// Listing console: update an existing business listing's name and
    /// description
    pub fn listing_console() -> Self {
        let mut variables = BTreeMap::new();
        variables.insert("business_name".to_string(), String::new());
        variables.insert("description".to_string(), String::new());

        Self {
            name: "listing-console".to_string(),
            description: "Open the business listing, edit name and description, save".to_string(),
            login_url: "https://business.google.com/manage/".to_string(),
            start_url: "https://business.google.com/manage/".to_string(),
            variables,
            url_capture: None,
            steps: vec![
                WorkflowStep::new(
                    "open-listing",
                    StepKind::Fill,
                    vec![LocatorCandidate::css("a[href*='/w/']")],
                    StepAction::Click,
                )
                .with_critical(false),
                WorkflowStep::new(
                    "edit-profile",
                    StepKind::Fill,
                    vec![
                        LocatorCandidate::xpath("//button[contains(text(),'Edit')]"),
                        LocatorCandidate::role("button[Edit profile]"),
                    ],
                    StepAction::Click,
                )
                .with_critical(false),
                WorkflowStep::new(
                    "business-name",
                    StepKind::Fill,
                    vec![
                        LocatorCandidate::aria_label("Business name"),
                        LocatorCandidate::css("input[aria-label*='Business']"),
                        LocatorCandidate::css("input[name*='name']"),
                    ],
                    StepAction::type_text("${business_name}"),
                ),
                WorkflowStep::new(
                    "description",
                    StepKind::Fill,
                    vec![
                        LocatorCandidate::css("textarea[aria-label*='escription']"),
                        LocatorCandidate::css("textarea[name*='description']"),
                        LocatorCandidate::css("textarea[aria-label*='About']"),
                    ],
                    StepAction::type_text("${description}"),
                ),
                WorkflowStep::new(
                    "save",
                    StepKind::Publish,
                    vec![
                        LocatorCandidate::xpath("//button[contains(text(),'Save')]"),
                        LocatorCandidate::role("button[Save]"),
                    ],
                    StepAction::Click,
                )
                .with_completion(CompletionCheck::None),
            ],
        }
    }
}

/// File format for extra step sets
#[derive(Debug, Deserialize)]
struct StepSetFile {
    #[serde(default)]
    step_set: Vec<StepSet>,
}

/// Named step sets available to the CLI
#[derive(Debug, Clone)]
pub struct StepCatalog {
    sets: BTreeMap<String, StepSet>,
}

impl StepCatalog {
    /// Catalog with the built-in sets
    pub fn builtin() -> Self {
        let mut sets = BTreeMap::new();
        for set in [StepSet::site_builder(), StepSet::listing_console()] {
            sets.insert(set.name.clone(), set);
        }
        Self { sets }
    }

    /// Add the `[[step_set]]` entries of a TOML document; same-named sets
    /// replace earlier ones
    pub fn extend_from_toml(&mut self, content: &str) -> Result<usize> {
        let file: StepSetFile = toml::from_str(content)?;
        let count = file.step_set.len();
        for set in file.step_set {
            set.validate()?;
            self.sets.insert(set.name.clone(), set);
        }
        Ok(count)
    }

    pub fn extend_from_file(&mut self, path: &Path) -> Result<usize> {
        let content = fs::read_to_string(path).map_err(|e| {
            SitepilotError::config(format!("Failed to read step file {}: {}", path.display(), e))
        })?;
        self.extend_from_toml(&content)
    }

    pub fn get(&self, name: &str) -> Result<&StepSet> {
        self.sets.get(name).ok_or_else(|| {
            SitepilotError::config(format!(
                "Unknown step set '{}'. Available: {}",
                name,
                self.names().join(", ")
            ))
        })
    }

    pub fn names(&self) -> Vec<&str> {
        self.sets.keys().map(String::as_str).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &StepSet> {
        self.sets.values()
    }
}

impl Default for StepCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}
