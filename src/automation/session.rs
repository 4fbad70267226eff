//! Credential session
//!
//! Signs in against the identity provider. The provider takes the email and
//! the password on two separate forms, so they are submitted one after the
//! other with waits in between.

use std::sync::Arc;

use tracing::{debug, info};

use crate::automation::locator::{ElementLocator, Located};
use crate::automation::wait::Waiter;
use crate::browser::Browser;
use crate::core::config::{AuthConfig, WaitConfig};
use crate::core::{Credentials, Interaction, LocatorCandidate, Result, SitepilotError};

/// How authentication concluded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthOutcome {
    /// The login URL showed no unauthenticated marker
    AlreadyAuthenticated,
    /// Email and password were submitted and the marker went away
    SignedIn,
}

/// Browser session owned by a single run
pub struct CredentialSession {
    browser: Arc<dyn Browser>,
    locator: ElementLocator,
    waiter: Waiter,
    auth: AuthConfig,
    waits: WaitConfig,
    login_url: String,
    authenticated: bool,
    current_url: Option<String>,
}

impl CredentialSession {
    pub fn new(
        browser: Arc<dyn Browser>,
        waiter: Waiter,
        auth: AuthConfig,
        waits: WaitConfig,
        login_url: impl Into<String>,
    ) -> Self {
        let locator = ElementLocator::new(browser.clone(), waiter.clone());
        Self {
            browser,
            locator,
            waiter,
            auth,
            waits,
            login_url: login_url.into(),
            authenticated: false,
            current_url: None,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    /// Last URL observed by the session
    pub fn current_url(&self) -> Option<&str> {
        self.current_url.as_deref()
    }

    /// Sign in, or confirm an existing sign-in.
    ///
    /// Fails with [`SitepilotError::Authentication`] when a login field does
    /// not appear within its budget or the provider keeps showing the sign-in
    /// page after both forms were submitted.
    pub async fn authenticate(&mut self, credentials: &Credentials) -> Result<AuthOutcome> {
        self.browser.navigate(&self.login_url).await?;
        self.waiter.fixed_delay(self.waits.after_navigation()).await;

        let url = self.refresh_url().await?;
        if !self.auth.is_unauthenticated_url(&url) {
            info!("already signed in");
            self.authenticated = true;
            return Ok(AuthOutcome::AlreadyAuthenticated);
        }

        info!("sign-in required");
        let email_fields = self.auth.email_candidates.clone();
        let email_next = self.auth.email_next_candidates.clone();
        self.submit_field("email", &email_fields, &email_next, &credentials.email)
            .await?;

        let password_fields = self.auth.password_candidates.clone();
        let password_next = self.auth.password_next_candidates.clone();
        self.submit_field("password", &password_fields, &password_next, credentials.password())
            .await?;

        let browser = self.browser.clone();
        let auth = self.auth.clone();
        let verified = self
            .waiter
            .poll_until("sign-in to complete", self.waits.login_field_timeout(), || {
                let browser = browser.clone();
                let auth = auth.clone();
                async move {
                    let url = browser.current_url().await?;
                    Ok::<_, SitepilotError>(!auth.is_unauthenticated_url(&url))
                }
            })
            .await;

        match verified {
            Ok(()) => {}
            Err(SitepilotError::LoadTimeout { .. }) => {
                return Err(SitepilotError::auth(
                    "still on the sign-in page after submitting credentials",
                ))
            }
            Err(e) => return Err(e),
        }

        self.refresh_url().await?;
        self.authenticated = true;
        info!("signed in");
        Ok(AuthOutcome::SignedIn)
    }

    /// Type into one login form and advance it
    async fn submit_field(
        &mut self,
        field: &str,
        candidates: &[LocatorCandidate],
        next: &[LocatorCandidate],
        value: &str,
    ) -> Result<()> {
        let located = self
            .locator
            .locate_within(candidates, self.waits.login_field_timeout())
            .await?;

        let Located::Found { element, .. } = located else {
            return Err(SitepilotError::auth(format!(
                "{} field not found within {}s",
                field, self.waits.login_field_timeout_secs
            )));
        };

        self.locator
            .act(&element, &Interaction::type_text(value))
            .await
            .map_err(|e| match e {
                e if e.is_fatal() => e,
                e => SitepilotError::auth(format!("could not fill the {} field: {}", field, e)),
            })?;
        self.waiter.fixed_delay(self.waits.after_action()).await;

        match self.locator.locate(next).await? {
            Located::Found { element, .. } => {
                self.locator.act(&element, &Interaction::Click).await?;
            }
            Located::NotFound { .. } => {
                debug!(field, "no next button, assuming the form advances on its own");
            }
        }

        self.waiter.fixed_delay(self.waits.after_navigation()).await;
        Ok(())
    }

    async fn refresh_url(&mut self) -> Result<String> {
        let url = self.browser.current_url().await?;
        self.current_url = Some(url.clone());
        Ok(url)
    }
}
