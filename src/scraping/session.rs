//! One stateful, authenticated portal context.
//!
//! The portal behaves like a session-scoped form protocol:
//!
//! ```text
//! Unauthenticated ──login──▶ Authenticated ──workflow setup──▶ WorkflowReady ──submit(pair)──▶ WorkflowReady
//! ```
//!
//! A session is used by one task at a time (`&mut` access) and is closed by
//! its owner on every exit path. Dropping an unclosed session still releases
//! the browser through the backend's `Drop`.

use crate::core::PortalResult;
use crate::scraping::portal::{BrowserProvider, PortalBrowser, PortalPage};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unauthenticated,
    Authenticated,
    WorkflowReady,
}

pub struct PortalSession {
    browser: Box<dyn PortalBrowser>,
    page: Box<dyn PortalPage>,
    state: SessionState,
}

impl PortalSession {
    /// Launch a dedicated browser and open the session's single tab.
    pub async fn open(provider: &dyn BrowserProvider) -> PortalResult<Self> {
        let mut browser = provider.launch().await?;
        let page = match browser.new_page().await {
            Ok(page) => page,
            Err(e) => {
                browser.close().await;
                return Err(e);
            }
        };
        Ok(Self {
            browser,
            page,
            state: SessionState::Unauthenticated,
        })
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_authenticated(&self) -> bool {
        self.state != SessionState::Unauthenticated
    }

    pub fn page(&mut self) -> &mut dyn PortalPage {
        self.page.as_mut()
    }

    pub(crate) fn transition(&mut self, to: SessionState) {
        debug!("session: {:?} → {:?}", self.state, to);
        self.state = to;
    }

    pub async fn close(mut self) {
        self.page.close().await;
        self.browser.close().await;
    }
}
