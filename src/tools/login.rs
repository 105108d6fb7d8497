//! Session authenticator: portal login past the numeric image CAPTCHA.
//!
//! Each attempt yields a tagged [`AttemptOutcome`]; the [`AttemptLedger`]
//! owns the policy (every attempt, unreadable ones included, counts against
//! the ceiling) so the browser-driving loop stays flat.

use crate::core::config::Credentials;
use crate::core::{Emm11Config, PortalError, PortalResult, Progress};
use crate::features::captcha::{is_usable_captcha, CaptchaRecognizer};
use crate::scraping::portal::{
    PortalPage, LOGGED_IN_MARKER, LOGIN_CAPTCHA_IMAGE, LOGIN_CAPTCHA_INPUT, LOGIN_ID_INPUT,
    LOGIN_PASSWORD_INPUT, LOGIN_SUBMIT,
};
use crate::scraping::{PortalSession, SessionState};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug)]
pub enum AttemptOutcome {
    /// CAPTCHA read was empty or not purely numeric; the form was not submitted.
    Unreadable(String),
    /// Submitted, but the logged-in marker never appeared.
    Rejected,
    /// Something failed mid-attempt (fill, screenshot, click, ...).
    Errored(PortalError),
    Success,
}

/// Bounded attempt counter with per-outcome diagnostics.
#[derive(Debug, Clone)]
pub struct AttemptLedger {
    max_attempts: u32,
    attempts: u32,
    unreadable: u32,
    rejected: u32,
    errored: u32,
    succeeded: bool,
}

impl AttemptLedger {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            attempts: 0,
            unreadable: 0,
            rejected: 0,
            errored: 0,
            succeeded: false,
        }
    }

    /// Start the next attempt; `None` once succeeded or out of attempts.
    pub fn begin(&mut self) -> Option<u32> {
        if self.succeeded || self.attempts >= self.max_attempts {
            return None;
        }
        self.attempts += 1;
        Some(self.attempts)
    }

    /// Record the outcome of the current attempt. Returns `true` on success.
    pub fn record(&mut self, outcome: &AttemptOutcome) -> bool {
        match outcome {
            AttemptOutcome::Unreadable(_) => self.unreadable += 1,
            AttemptOutcome::Rejected => self.rejected += 1,
            AttemptOutcome::Errored(_) => self.errored += 1,
            AttemptOutcome::Success => self.succeeded = true,
        }
        self.succeeded
    }

    pub fn has_remaining(&self) -> bool {
        !self.succeeded && self.attempts < self.max_attempts
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn exhausted(&self) -> PortalError {
        PortalError::AuthenticationExhausted {
            attempts: self.attempts,
            unreadable: self.unreadable,
            rejected: self.rejected,
            errored: self.errored,
        }
    }
}

pub struct Authenticator {
    login_url: String,
    max_attempts: u32,
    page_load: Duration,
    marker_wait: Duration,
    settle: Duration,
    recognizer: Arc<dyn CaptchaRecognizer>,
    progress: Progress,
}

impl Authenticator {
    pub fn new(cfg: &Emm11Config, recognizer: Arc<dyn CaptchaRecognizer>, progress: Progress) -> Self {
        Self {
            login_url: cfg.resolve_login_url(),
            max_attempts: cfg.resolve_login_max_attempts(),
            page_load: cfg.timing.page_load(),
            marker_wait: cfg.timing.login_marker(),
            settle: cfg.timing.settle(),
            recognizer,
            progress,
        }
    }

    /// Log `session` in. On success the session sits on the authenticated
    /// landing page. A login-page load failure aborts without retrying;
    /// exhausting the attempt ceiling yields `AuthenticationExhausted`, after
    /// which the session must not be navigated further.
    pub async fn login(&self, session: &mut PortalSession, credentials: &Credentials) -> PortalResult<()> {
        if session.is_authenticated() {
            return Ok(());
        }

        self.progress.line("🔹 Navigating to login page...");
        if let Err(e) = session.page().goto(&self.login_url, self.page_load).await {
            self.progress
                .warn(format!("❌ Failed to load login page. Server may be down. ({e})"));
            return Err(e);
        }
        session.page().pause(self.settle).await;

        let mut ledger = AttemptLedger::new(self.max_attempts);
        while let Some(attempt) = ledger.begin() {
            self.progress.line(format!("🔹 Login attempt #{attempt}"));
            let outcome = self.attempt(session.page(), credentials).await;
            match &outcome {
                AttemptOutcome::Success => self.progress.line("✅ Login successful"),
                AttemptOutcome::Unreadable(text) => self.progress.warn(format!(
                    "⚠️ Captcha recognition failed ({text:?}), reloading page..."
                )),
                AttemptOutcome::Rejected => self.progress.warn("⚠️ Login failed, retrying..."),
                AttemptOutcome::Errored(e) => {
                    self.progress.warn(format!("❌ Exception during login attempt: {e}"))
                }
            }

            if ledger.record(&outcome) {
                session.transition(SessionState::Authenticated);
                return Ok(());
            }
            if ledger.has_remaining() {
                self.reset_form(session.page()).await;
            }
        }

        self.progress.warn("❌ All login attempts failed.");
        Err(ledger.exhausted())
    }

    async fn attempt(&self, page: &mut dyn PortalPage, credentials: &Credentials) -> AttemptOutcome {
        let captcha = match self.read_captcha(page, credentials).await {
            Ok(text) => text,
            Err(PortalError::RecognitionFailure(text)) => return AttemptOutcome::Unreadable(text),
            Err(e) => return AttemptOutcome::Errored(e),
        };
        self.progress.line(format!("🔹 Captcha recognized: '{captcha}'"));
        if !is_usable_captcha(&captcha) {
            return AttemptOutcome::Unreadable(captcha);
        }

        let submitted = async {
            page.fill(LOGIN_CAPTCHA_INPUT, &captcha).await?;
            page.click(LOGIN_SUBMIT).await?;
            page.wait_visible(LOGGED_IN_MARKER, self.marker_wait).await
        }
        .await;

        match submitted {
            Ok(true) => AttemptOutcome::Success,
            Ok(false) => AttemptOutcome::Rejected,
            Err(e) => AttemptOutcome::Errored(e),
        }
    }

    async fn read_captcha(&self, page: &mut dyn PortalPage, credentials: &Credentials) -> PortalResult<String> {
        page.fill(LOGIN_ID_INPUT, &credentials.login_id).await?;
        page.fill(LOGIN_PASSWORD_INPUT, &credentials.password).await?;
        let image = page.screenshot_element(LOGIN_CAPTCHA_IMAGE).await?;
        let text = self.recognizer.recognize(&image).await?;
        Ok(text.trim().to_string())
    }

    async fn reset_form(&self, page: &mut dyn PortalPage) {
        if let Err(e) = page.reload().await {
            self.progress.warn(format!("⚠️ Reload failed: {e}"));
        }
        page.pause(self.settle).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unreadable_attempts_count_against_ceiling() {
        let mut ledger = AttemptLedger::new(5);
        let mut seen = 0;
        while ledger.begin().is_some() {
            seen += 1;
            assert!(!ledger.record(&AttemptOutcome::Unreadable("ab".into())));
        }
        assert_eq!(seen, 5);
        match ledger.exhausted() {
            PortalError::AuthenticationExhausted {
                attempts,
                unreadable,
                rejected,
                errored,
            } => {
                assert_eq!((attempts, unreadable, rejected, errored), (5, 5, 0, 0));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn success_stops_the_ledger() {
        let mut ledger = AttemptLedger::new(5);
        ledger.begin();
        ledger.record(&AttemptOutcome::Rejected);
        ledger.begin();
        assert!(ledger.record(&AttemptOutcome::Success));
        assert!(ledger.begin().is_none());
        assert!(!ledger.has_remaining());
        assert_eq!(ledger.attempts(), 2);
    }

    #[test]
    fn mixed_outcomes_are_tallied() {
        let mut ledger = AttemptLedger::new(3);
        ledger.begin();
        ledger.record(&AttemptOutcome::Unreadable(String::new()));
        ledger.begin();
        ledger.record(&AttemptOutcome::Errored(PortalError::PerUnit("x".into())));
        ledger.begin();
        ledger.record(&AttemptOutcome::Rejected);
        assert!(ledger.begin().is_none());
        let msg = ledger.exhausted().to_string();
        assert!(msg.contains("all 3 login attempts failed (1 unreadable captcha, 1 rejected, 1 errored)"));
    }
}
