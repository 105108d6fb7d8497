//! Validity prober: classifies TP pairs as unused through the portal's
//! stateful pair-submission workflow.
//!
//! Workflow setup (menu → licensee → mode) runs once per call; pairs are then
//! submitted strictly in input order on the same page, because every
//! submission reuses the form state the previous one left behind.

use crate::core::types::TpPair;
use crate::core::{Emm11Config, PortalError, PortalResult, Progress};
use crate::scraping::extract::normalize_text;
use crate::scraping::portal::{
    PortalPage, MENU_MASTER_ENTRIES, MENU_PAIR_WORKFLOW, WORKFLOW_ERROR_LABEL,
    WORKFLOW_ISTP_INPUT, WORKFLOW_LICENSEE, WORKFLOW_LICENSEE_INDEX, WORKFLOW_MODE,
    WORKFLOW_OSTP_INPUT, WORKFLOW_SUBMIT,
};
use crate::scraping::{PortalSession, SessionState};
use std::time::Duration;
use tracing::debug;

/// Case-insensitive match of the portal's "pass not yet linked" wording.
#[derive(Debug, Clone)]
pub struct UnusedMatcher {
    phrase: String,
}

impl UnusedMatcher {
    pub fn new(phrase: &str) -> Self {
        Self {
            phrase: normalize_text(phrase).to_lowercase(),
        }
    }

    pub fn matches(&self, error_text: &str) -> bool {
        !self.phrase.is_empty() && normalize_text(error_text).to_lowercase().contains(&self.phrase)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PairVerdict {
    Unused,
    /// Any other error text, or none at all (empty string).
    NotUnused(String),
}

pub struct ValidityProber {
    matcher: UnusedMatcher,
    menu_wait: Duration,
    error_wait: Duration,
    settle: Duration,
    progress: Progress,
}

impl ValidityProber {
    pub fn new(cfg: &Emm11Config, progress: Progress) -> Self {
        Self {
            matcher: UnusedMatcher::new(&cfg.resolve_unused_phrase()),
            menu_wait: cfg.timing.menu_wait(),
            error_wait: cfg.timing.error_label(),
            settle: cfg.timing.settle(),
            progress,
        }
    }

    /// Return the pairs the portal reports as unused, in input order.
    ///
    /// A setup failure returns an empty list; a per-pair failure only marks
    /// that pair as not unused.
    pub async fn probe(&self, session: &mut PortalSession, pairs: &[TpPair]) -> Vec<TpPair> {
        if let Err(e) = self.enter_workflow(session).await {
            self.progress.warn(format!("🔥 Fatal error opening pair workflow: {e}"));
            return Vec::new();
        }

        let mut unused = Vec::new();
        let (mut skipped, mut failed) = (0usize, 0usize);
        for pair in pairs {
            if !pair.is_well_formed() {
                skipped += 1;
                self.progress
                    .warn(format!("⚠️ Skipping malformed TP pair ({:?}, {:?})", pair.istp, pair.ostp));
                continue;
            }

            match self.submit(session.page(), pair).await {
                Ok(PairVerdict::Unused) => {
                    self.progress.line(format!("✅ Unused: {pair}"));
                    unused.push(pair.clone());
                }
                Ok(PairVerdict::NotUnused(text)) => {
                    debug!("pair {} not unused ({:?})", pair, text);
                }
                Err(e) => {
                    failed += 1;
                    self.progress.warn(format!("⚠️ TP pair ({pair}) failed: {e}"));
                }
            }
        }

        self.progress.line(format!(
            "📄 Total unused TP pairs: {} of {} ({} skipped, {} failed)",
            unused.len(),
            pairs.len(),
            skipped,
            failed
        ));
        unused
    }

    /// Guarded transition into [`SessionState::WorkflowReady`]. A no-op when
    /// already there; tolerates the submenu being open already.
    pub async fn enter_workflow(&self, session: &mut PortalSession) -> PortalResult<()> {
        match session.state() {
            SessionState::WorkflowReady => return Ok(()),
            SessionState::Unauthenticated => {
                return Err(PortalError::WorkflowNavigationFailure(
                    "session is not authenticated".into(),
                ))
            }
            SessionState::Authenticated => {}
        }

        self.open_workflow(session.page()).await.map_err(|e| match e {
            PortalError::WorkflowNavigationFailure(_) => e,
            other => PortalError::WorkflowNavigationFailure(other.to_string()),
        })?;
        session.transition(SessionState::WorkflowReady);
        Ok(())
    }

    async fn open_workflow(&self, page: &mut dyn PortalPage) -> PortalResult<()> {
        if !page.is_visible(MENU_PAIR_WORKFLOW).await? {
            if !page.wait_visible(MENU_MASTER_ENTRIES, self.menu_wait).await? {
                return Err(PortalError::WorkflowNavigationFailure(format!(
                    "{MENU_MASTER_ENTRIES} not visible"
                )));
            }
            page.click(MENU_MASTER_ENTRIES).await?;
            page.pause(self.settle).await;
            if !page.wait_visible(MENU_PAIR_WORKFLOW, self.menu_wait).await? {
                return Err(PortalError::WorkflowNavigationFailure(format!(
                    "{MENU_PAIR_WORKFLOW} not visible"
                )));
            }
        }
        page.click(MENU_PAIR_WORKFLOW).await?;
        page.pause(self.settle).await;

        if !page.wait_visible(WORKFLOW_LICENSEE, self.menu_wait).await? {
            return Err(PortalError::WorkflowNavigationFailure(
                "licensee selector not visible".into(),
            ));
        }
        page.select_index(WORKFLOW_LICENSEE, WORKFLOW_LICENSEE_INDEX).await?;
        page.click(WORKFLOW_MODE).await?;
        page.pause(self.settle).await;
        Ok(())
    }

    async fn submit(&self, page: &mut dyn PortalPage, pair: &TpPair) -> PortalResult<PairVerdict> {
        page.fill(WORKFLOW_OSTP_INPUT, &pair.ostp).await?;
        page.fill(WORKFLOW_ISTP_INPUT, &pair.istp).await?;
        page.click(WORKFLOW_SUBMIT).await?;
        page.wait_network_idle().await?;

        let error_text = match page.wait_visible(WORKFLOW_ERROR_LABEL, self.error_wait).await {
            Ok(true) => page.inner_text(WORKFLOW_ERROR_LABEL).await.unwrap_or_default(),
            _ => String::new(),
        };

        if self.matcher.matches(&error_text) {
            Ok(PairVerdict::Unused)
        } else {
            Ok(PairVerdict::NotUnused(normalize_text(&error_text)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::DEFAULT_UNUSED_PHRASE;

    #[test]
    fn phrase_match_ignores_case_and_nbsp() {
        let m = UnusedMatcher::new(DEFAULT_UNUSED_PHRASE);
        assert!(m.matches("Other Destination District ISTP Not Allowed"));
        assert!(m.matches("\u{a0}other\u{a0}destination district istp\u{a0}not allowed\u{a0}"));
        assert!(m.matches("Error: OTHER DESTINATION DISTRICT ISTP NOT ALLOWED."));
    }

    #[test]
    fn other_text_is_not_unused() {
        let m = UnusedMatcher::new(DEFAULT_UNUSED_PHRASE);
        assert!(!m.matches(""));
        assert!(!m.matches("ISTP already used"));
        assert!(!m.matches("other destination district"));
    }

    #[test]
    fn empty_phrase_never_matches() {
        assert!(!UnusedMatcher::new("  ").matches("anything"));
    }
}
