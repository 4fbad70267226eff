//! Element locator
//!
//! Resolves a logical target to a live element by trying an ordered list of
//! candidates. Exhausting the list is a value ([`Located::NotFound`]), not an
//! error; only a fatal driver fault propagates.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::automation::wait::Waiter;
use crate::browser::{Browser, ElementHandle};
use crate::core::{Interaction, LocatorCandidate, Result, SitepilotError};

/// Outcome of a locate pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Located {
    /// First matching candidate and its index in the list
    Found { element: ElementHandle, index: usize },
    /// No candidate matched
    NotFound { attempted: usize },
}

impl Located {
    pub fn element(&self) -> Option<&ElementHandle> {
        match self {
            Located::Found { element, .. } => Some(element),
            Located::NotFound { .. } => None,
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, Located::Found { .. })
    }
}

/// Ordered-fallback element locator
#[derive(Clone)]
pub struct ElementLocator {
    browser: Arc<dyn Browser>,
    waiter: Waiter,
}

impl ElementLocator {
    pub fn new(browser: Arc<dyn Browser>, waiter: Waiter) -> Self {
        Self { browser, waiter }
    }

    /// One pass over the candidates, in order, stopping at the first match.
    ///
    /// Non-fatal lookup errors count as a miss for that candidate.
    pub async fn locate(&self, candidates: &[LocatorCandidate]) -> Result<Located> {
        for (index, candidate) in candidates.iter().enumerate() {
            match self.browser.find(candidate).await {
                Ok(Some(element)) => {
                    debug!(%candidate, index, "located");
                    return Ok(Located::Found { element, index });
                }
                Ok(None) => debug!(%candidate, "no match"),
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => warn!(%candidate, error = %e, "lookup failed, trying next candidate"),
            }
        }

        Ok(Located::NotFound {
            attempted: candidates.len(),
        })
    }

    /// Repeat [`ElementLocator::locate`] until something matches or `timeout`
    /// passes. Expiry still yields `NotFound`.
    pub async fn locate_within(
        &self,
        candidates: &[LocatorCandidate],
        timeout: Duration,
    ) -> Result<Located> {
        let polled = self
            .waiter
            .bounded_poll("element", timeout, self.waiter.poll_interval(), || async {
                match self.locate(candidates).await? {
                    found @ Located::Found { .. } => Ok::<_, SitepilotError>(Some(found)),
                    Located::NotFound { .. } => Ok(None),
                }
            })
            .await;

        match polled {
            Ok(found) => Ok(found),
            Err(SitepilotError::LoadTimeout { .. }) => Ok(Located::NotFound {
                attempted: candidates.len(),
            }),
            Err(e) => Err(e),
        }
    }

    /// Perform exactly one click or one fill
    pub async fn act(&self, element: &ElementHandle, interaction: &Interaction) -> Result<()> {
        match interaction {
            Interaction::Click => self.browser.click(element).await,
            Interaction::Type { text } => self.browser.type_text(element, text).await,
        }
    }
}
