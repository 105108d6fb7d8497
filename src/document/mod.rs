//! PDF side of document synthesis: field layout, verification code,
//! template overlay and merging.

pub mod layout;
pub mod merge;
pub mod overlay;
pub mod qr;

pub use merge::{merge_documents, merge_files};
pub use overlay::FormTemplate;
pub use qr::VerificationCode;
