pub mod browser_manager;
pub mod extract;
pub mod portal;
pub mod session;

pub use browser_manager::ChromeProvider;
pub use portal::{BrowserProvider, Locator, PortalBrowser, PortalPage};
pub use session::{PortalSession, SessionState};
