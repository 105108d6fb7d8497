//! Verification QR code pointing back at the pass's detail page.

use crate::core::{PortalError, PortalResult};
use qrcode::{Color, QrCode};

/// Modules of blank margin around the symbol on every side.
pub const QUIET_ZONE: usize = 4;

#[derive(Debug, Clone)]
pub struct VerificationCode {
    width: usize,
    dark: Vec<bool>,
}

impl VerificationCode {
    pub fn encode(url: &str) -> PortalResult<Self> {
        if url.trim().is_empty() {
            return Err(PortalError::Render("empty verification url".into()));
        }
        let code = QrCode::new(url.as_bytes()).map_err(|e| PortalError::Render(format!("qr: {e}")))?;
        let width = code.width();
        let dark = code.to_colors().into_iter().map(|c| c == Color::Dark).collect();
        Ok(Self {
            width,
            dark,
        })
    }

    /// Modules per side, quiet zone excluded.
    pub fn width(&self) -> usize {
        self.width
    }

    pub fn is_dark(&self, x: usize, y: usize) -> bool {
        x < self.width && y < self.width && self.dark[y * self.width + x]
    }

    /// `(column, row)` of every dark module, row-major from the top left.
    pub fn dark_modules(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        (0..self.width * self.width)
            .map(move |i| (i % self.width, i / self.width))
            .filter(move |&(x, y)| self.is_dark(x, y))
    }
}
