//! CAPTCHA recognition.
//!
//! The login CAPTCHA is a short run of digits on a noisy background. The
//! default recognizer pipes the element screenshot through the `tesseract`
//! CLI in single-line mode with a digit whitelist; anything it cannot read
//! comes back as text the authenticator will reject as non-numeric.

use crate::core::{PortalError, PortalResult};
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

#[async_trait]
pub trait CaptchaRecognizer: Send + Sync {
    /// Best-effort text read from a PNG image.
    async fn recognize(&self, png: &[u8]) -> PortalResult<String>;
}

/// A CAPTCHA read is usable only when it is a non-empty run of ASCII digits.
pub fn is_usable_captcha(text: &str) -> bool {
    !text.is_empty() && text.chars().all(|c| c.is_ascii_digit())
}

/// Recognizer backed by the `tesseract` executable.
#[derive(Debug, Clone)]
pub struct TesseractRecognizer {
    program: PathBuf,
}

impl TesseractRecognizer {
    /// Locate `command` on PATH (or accept it as a path).
    pub fn locate(command: &str) -> PortalResult<Self> {
        let program = which::which(command).map_err(|e| {
            PortalError::RecognitionFailure(format!("captcha recognizer '{command}' not found: {e}"))
        })?;
        Ok(Self { program })
    }

    /// Use `program` as given; a missing binary only shows up on first use.
    pub fn unchecked(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

#[async_trait]
impl CaptchaRecognizer for TesseractRecognizer {
    async fn recognize(&self, png: &[u8]) -> PortalResult<String> {
        let mut child = Command::new(&self.program)
            .args([
                "stdin",
                "stdout",
                "--psm",
                "7",
                "-c",
                "tessedit_char_whitelist=0123456789",
            ])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| PortalError::RecognitionFailure(format!("failed to start recognizer: {e}")))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(png).await?;
        }

        let output = child.wait_with_output().await?;
        if !output.status.success() {
            return Err(PortalError::RecognitionFailure(format!(
                "recognizer exited with {}",
                output.status
            )));
        }

        let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
        debug!("captcha recognizer read {:?}", text);
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_digit_runs_are_usable() {
        assert!(is_usable_captcha("48213"));
        assert!(!is_usable_captcha(""));
        assert!(!is_usable_captcha("48 213"));
        assert!(!is_usable_captcha("4B213"));
        assert!(!is_usable_captcha("٤٨"));
    }

    #[test]
    fn missing_program_is_a_recognition_failure() {
        let err = TesseractRecognizer::locate("definitely-not-a-real-ocr-binary").unwrap_err();
        assert!(matches!(err, PortalError::RecognitionFailure(_)));
    }
}
