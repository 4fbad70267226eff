//! Browser capability trait
//!
//! The locator, session and engine only talk to this trait, so the real
//! agent-browser driver and the in-memory fake are interchangeable.

use std::path::Path;

use async_trait::async_trait;

use crate::core::{LocatorCandidate, Result};

/// A live element resolved by the driver
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementHandle {
    /// Driver-level selector that addresses the element (`@e3`, a CSS or
    /// `xpath=` selector)
    pub selector: String,
    /// Candidate that produced this handle
    pub candidate: LocatorCandidate,
}

impl ElementHandle {
    pub fn new(selector: impl Into<String>, candidate: LocatorCandidate) -> Self {
        Self {
            selector: selector.into(),
            candidate,
        }
    }
}

/// Capabilities the automation core needs from a browser.
///
/// `find` reports absence as `Ok(None)`. Errors are reserved for commands
/// that could not run; [`crate::core::SitepilotError::is_fatal`] tells the
/// caller whether the browser is still usable.
#[async_trait]
pub trait Browser: Send + Sync {
    /// Navigate to a URL
    async fn navigate(&self, url: &str) -> Result<()>;

    /// Current page URL
    async fn current_url(&self) -> Result<String>;

    /// Resolve one candidate to an element, if present
    async fn find(&self, candidate: &LocatorCandidate) -> Result<Option<ElementHandle>>;

    /// Click an element
    async fn click(&self, element: &ElementHandle) -> Result<()>;

    /// Replace an input's value with text
    async fn type_text(&self, element: &ElementHandle, text: &str) -> Result<()>;

    /// Read an attribute from an element
    async fn attribute(&self, element: &ElementHandle, name: &str) -> Result<Option<String>>;

    /// Write a screenshot of the current page to `path`
    async fn screenshot(&self, path: &Path) -> Result<()>;

    /// Close the browser
    async fn close(&self) -> Result<()>;
}
