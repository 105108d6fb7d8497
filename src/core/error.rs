//! Failure taxonomy for portal interactions.
//!
//! Batch loops (per id, per pair, per identifier) log and skip the failed
//! unit. Login exhaustion and workflow setup failure end their stage.

use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PortalError {
    /// Page load / navigation / element wait ran out of time.
    #[error("timed out after {timeout:?} during {during}")]
    TransientNetwork { during: String, timeout: Duration },

    /// The loaded page describes a different record than the one requested.
    #[error("page mismatch: expected {expected}, page shows {found:?}")]
    ExtractionMismatch { expected: String, found: String },

    /// CAPTCHA text was unreadable or not purely numeric.
    #[error("captcha unreadable: {0:?}")]
    RecognitionFailure(String),

    #[error(
        "all {attempts} login attempts failed ({unreadable} unreadable captcha, {rejected} rejected, {errored} errored)"
    )]
    AuthenticationExhausted {
        attempts: u32,
        unreadable: u32,
        rejected: u32,
        errored: u32,
    },

    /// Menu, licensee or mode selection could not be completed.
    #[error("workflow setup failed: {0}")]
    WorkflowNavigationFailure(String),

    #[error("{0}")]
    PerUnit(String),

    /// Driver-level failure (CDP, element lookup, script evaluation).
    #[error("browser: {0}")]
    Browser(String),

    #[error("render: {0}")]
    Render(String),

    /// Missing or unusable settings (credentials, recognizer, browser).
    #[error("config: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl PortalError {
    pub fn timeout(during: impl Into<String>, timeout: Duration) -> Self {
        Self::TransientNetwork {
            during: during.into(),
            timeout,
        }
    }

    pub fn browser(e: impl std::fmt::Display) -> Self {
        Self::Browser(e.to_string())
    }

    pub fn render(e: impl std::fmt::Display) -> Self {
        Self::Render(e.to_string())
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::TransientNetwork { .. })
    }
}

impl From<lopdf::Error> for PortalError {
    fn from(e: lopdf::Error) -> Self {
        Self::Render(format!("pdf: {e}"))
    }
}

pub type PortalResult<T> = std::result::Result<T, PortalError>;
