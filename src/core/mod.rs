pub mod config;
pub mod error;
pub mod progress;
pub mod types;

pub use config::{Credentials, Emm11Config, SynthesisStrategy};
pub use error::{PortalError, PortalResult};
pub use progress::Progress;
