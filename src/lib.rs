pub mod core;
pub mod document;
pub mod features;
pub mod scraping;
pub mod tools;

// --- Primary core exports ---
pub use core::types;
pub use core::types::*;
pub use core::{Credentials, Emm11Config, PortalError, PortalResult, Progress, SynthesisStrategy};

// --- Stage entry points ---
pub use features::captcha::{CaptchaRecognizer, TesseractRecognizer};
pub use scraping::{BrowserProvider, ChromeProvider, PortalSession, SessionState};
pub use tools::{
    Authenticator, DocumentSynthesizer, Pipeline, RecordFetcher, RunReport, ValidityProber,
};
