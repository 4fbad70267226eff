//! In-memory browser for tests
//!
//! Models a page as a URL plus a set of elements addressable by exact
//! candidate. Every lookup and action is recorded so tests can assert on
//! ordering and on what was (and was not) attempted.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use crate::browser::traits::{Browser, ElementHandle};
use crate::core::{LocatorCandidate, Result, SitepilotError};

/// An action the fake observed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FakeAction {
    Navigate(String),
    Click(String),
    Type { selector: String, text: String },
    Close,
}

#[derive(Debug, Clone)]
struct FakeElement {
    candidate: LocatorCandidate,
    /// Lookups that must miss before the element shows up
    hidden_for: usize,
    /// Page URL after a click
    navigates_to: Option<String>,
    attributes: HashMap<String, String>,
}

#[derive(Debug, Default)]
struct FakeState {
    url: String,
    elements: Vec<FakeElement>,
    redirects: HashMap<String, String>,
    finds: Vec<LocatorCandidate>,
    actions: Vec<FakeAction>,
    screenshots: Vec<PathBuf>,
    /// Operations left before the driver "crashes"
    crash_after: Option<usize>,
    closed: bool,
}

/// Scriptable [`Browser`] that never launches a real browser
#[derive(Debug, Default)]
pub struct FakeBrowser {
    state: Mutex<FakeState>,
}

impl FakeBrowser {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Add an element matched by exactly this candidate
    pub fn with_element(self, candidate: LocatorCandidate) -> Self {
        self.push(FakeElement {
            candidate,
            hidden_for: 0,
            navigates_to: None,
            attributes: HashMap::new(),
        })
    }

    /// Add an element that only appears after `misses` lookups of it
    pub fn with_delayed_element(self, candidate: LocatorCandidate, misses: usize) -> Self {
        self.push(FakeElement {
            candidate,
            hidden_for: misses,
            navigates_to: None,
            attributes: HashMap::new(),
        })
    }

    /// Add an element whose click moves the page to `url`
    pub fn with_link(self, candidate: LocatorCandidate, url: impl Into<String>) -> Self {
        self.push(FakeElement {
            candidate,
            hidden_for: 0,
            navigates_to: Some(url.into()),
            attributes: HashMap::new(),
        })
    }

    /// Add an element carrying one attribute
    pub fn with_attribute(
        self,
        candidate: LocatorCandidate,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        let mut attributes = HashMap::new();
        attributes.insert(name.into(), value.into());
        self.push(FakeElement {
            candidate,
            hidden_for: 0,
            navigates_to: None,
            attributes,
        })
    }

    /// Navigating to `from` lands on `to`
    pub fn with_redirect(self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.state().redirects.insert(from.into(), to.into());
        self
    }

    /// Every operation after the first `ops` fails with a driver fault
    pub fn crash_after(self, ops: usize) -> Self {
        self.state().crash_after = Some(ops);
        self
    }

    fn push(self, element: FakeElement) -> Self {
        self.state().elements.push(element);
        self
    }

    /// Candidates passed to `find`, in call order
    pub fn finds(&self) -> Vec<LocatorCandidate> {
        self.state().finds.clone()
    }

    /// Mutating actions, in call order
    pub fn actions(&self) -> Vec<FakeAction> {
        self.state().actions.clone()
    }

    /// Screenshot paths written
    pub fn screenshots(&self) -> Vec<PathBuf> {
        self.state().screenshots.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.state().closed
    }

    /// Count an operation against the crash budget
    fn tick(state: &mut FakeState) -> Result<()> {
        if state.closed {
            return Err(SitepilotError::driver("Browser has been closed"));
        }
        match state.crash_after {
            Some(0) => Err(SitepilotError::driver("Target closed")),
            Some(ref mut left) => {
                *left -= 1;
                Ok(())
            }
            None => Ok(()),
        }
    }

    fn element_for<'a>(state: &'a FakeState, handle: &ElementHandle) -> Result<&'a FakeElement> {
        state
            .elements
            .iter()
            .find(|el| el.candidate == handle.candidate)
            .ok_or_else(|| SitepilotError::browser(format!("{} is detached", handle.selector)))
    }
}

#[async_trait]
impl Browser for FakeBrowser {
    async fn navigate(&self, url: &str) -> Result<()> {
        let mut state = self.state();
        Self::tick(&mut state)?;
        state.actions.push(FakeAction::Navigate(url.to_string()));
        state.url = state
            .redirects
            .get(url)
            .cloned()
            .unwrap_or_else(|| url.to_string());
        Ok(())
    }

    async fn current_url(&self) -> Result<String> {
        let mut state = self.state();
        Self::tick(&mut state)?;
        Ok(state.url.clone())
    }

    async fn find(&self, candidate: &LocatorCandidate) -> Result<Option<ElementHandle>> {
        let mut state = self.state();
        Self::tick(&mut state)?;
        state.finds.push(candidate.clone());

        let Some(element) = state
            .elements
            .iter_mut()
            .find(|el| &el.candidate == candidate)
        else {
            return Ok(None);
        };

        if element.hidden_for > 0 {
            element.hidden_for -= 1;
            return Ok(None);
        }

        Ok(Some(ElementHandle::new(candidate.to_string(), candidate.clone())))
    }

    async fn click(&self, element: &ElementHandle) -> Result<()> {
        let mut state = self.state();
        Self::tick(&mut state)?;
        let target = Self::element_for(&state, element)?.navigates_to.clone();
        state.actions.push(FakeAction::Click(element.selector.clone()));
        if let Some(url) = target {
            state.url = url;
        }
        Ok(())
    }

    async fn type_text(&self, element: &ElementHandle, text: &str) -> Result<()> {
        let mut state = self.state();
        Self::tick(&mut state)?;
        Self::element_for(&state, element)?;
        state.actions.push(FakeAction::Type {
            selector: element.selector.clone(),
            text: text.to_string(),
        });
        Ok(())
    }

    async fn attribute(&self, element: &ElementHandle, name: &str) -> Result<Option<String>> {
        let mut state = self.state();
        Self::tick(&mut state)?;
        Ok(Self::element_for(&state, element)?.attributes.get(name).cloned())
    }

    async fn screenshot(&self, path: &Path) -> Result<()> {
        {
            let mut state = self.state();
            Self::tick(&mut state)?;
            state.screenshots.push(path.to_path_buf());
        }
        tokio::fs::write(path, b"fake screenshot").await?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        let mut state = self.state();
        state.actions.push(FakeAction::Close);
        state.closed = true;
        Ok(())
    }
}
