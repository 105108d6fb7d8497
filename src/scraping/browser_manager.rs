//! Native Chromium backend using `chromiumoxide`.
//!
//! This module is the single source of truth for:
//! * Finding a usable browser executable (Brave → Chrome → Chromium, cross-platform).
//! * Launching one isolated headless browser per [`BrowserProvider::launch`].
//! * Implementing the [`PortalPage`] primitives over CDP.
//! * The network-quiescence heuristic used after form submissions.
//!
//! Element lookup goes through small injected scripts so CSS selectors and
//! link-text locators behave identically.

use crate::core::{Emm11Config, PortalError, PortalResult};
use crate::scraping::portal::{BrowserProvider, Locator, PortalBrowser, PortalPage};
use async_trait::async_trait;
use chromiumoxide::browser::BrowserConfig;
use chromiumoxide::cdp::browser_protocol::page::{CaptureScreenshotFormat, PrintToPdfParams};
use chromiumoxide::handler::viewport::Viewport;
use chromiumoxide::{Browser, Page};
use futures::StreamExt;
use rand::seq::IndexedRandom;
use std::path::Path;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

// ── Realistic User-Agent pool ────────────────────────────────────────────────

const DESKTOP_USER_AGENTS: &[&str] = &[
    // Chrome 132 – Windows
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/132.0.0.0 Safari/537.36",
    // Chrome 131 – Linux
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    // Edge 132 – Windows
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/132.0.0.0 Safari/537.36 Edg/132.0.0.0",
];

/// Returns a randomly-chosen desktop Chromium User-Agent string.
pub fn random_user_agent() -> &'static str {
    let mut rng = rand::rng();
    DESKTOP_USER_AGENTS
        .choose(&mut rng)
        .copied()
        .unwrap_or(DESKTOP_USER_AGENTS[0])
}

// ── Browser executable discovery ─────────────────────────────────────────────

/// Find a usable Chromium-family browser executable.
///
/// Resolution order:
/// 1. `CHROME_EXECUTABLE` env var (explicit override)
/// 2. PATH lookup of the usual binary names.
/// 3. OS-specific well-known install paths.
pub fn find_chrome_executable() -> Option<String> {
    if let Some(p) = crate::core::config::chrome_executable_override() {
        return Some(p);
    }

    for exe in [
        "brave-browser",
        "brave",
        "google-chrome",
        "chromium",
        "chromium-browser",
        "chrome",
    ] {
        if let Ok(full) = which::which(exe) {
            return Some(full.to_string_lossy().to_string());
        }
    }

    #[cfg(target_os = "macos")]
    {
        let candidates = [
            "/Applications/Brave Browser.app/Contents/MacOS/Brave Browser",
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
            "/Applications/Chromium.app/Contents/MacOS/Chromium",
        ];
        for c in candidates {
            if Path::new(c).exists() {
                return Some(c.to_string());
            }
        }
    }

    #[cfg(target_os = "linux")]
    {
        let candidates = [
            "/usr/bin/brave-browser",
            "/usr/bin/chromium",
            "/usr/bin/chromium-browser",
            "/usr/bin/google-chrome",
            "/usr/local/bin/chromium",
        ];
        for c in candidates {
            if Path::new(c).exists() {
                return Some(c.to_string());
            }
        }
    }

    #[cfg(target_os = "windows")]
    {
        let candidates = [
            r"C:\Program Files\BraveSoftware\Brave-Browser\Application\brave.exe",
            r"C:\Program Files\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files (x86)\Microsoft\Edge\Application\msedge.exe",
        ];
        for c in candidates {
            if Path::new(c).exists() {
                return Some(c.to_string());
            }
        }
    }

    None
}

// ── Browser config builder ───────────────────────────────────────────────────

/// Fresh throwaway profile directory for one browser process. Chromium holds
/// a `SingletonLock` per profile, so concurrent launches must never share one.
pub fn new_profile_dir() -> PortalResult<TempDir> {
    tempfile::Builder::new()
        .prefix("emm11-profile-")
        .tempdir()
        .map_err(|e| PortalError::Browser(format!("failed to create browser profile dir: {e}")))
}

/// Build a `BrowserConfig` with CI-safe defaults.
///
/// `--no-sandbox` / `--disable-dev-shm-usage` keep Chromium alive in
/// containers; `--disable-blink-features=AutomationControlled` hides the
/// `navigator.webdriver` flag.
pub fn build_browser_config(
    exe: &str,
    headless: bool,
    width: u32,
    height: u32,
    profile: &Path,
) -> PortalResult<BrowserConfig> {
    let ua = random_user_agent();

    let mut builder = BrowserConfig::builder()
        .chrome_executable(exe)
        .user_data_dir(profile)
        .viewport(Viewport {
            width,
            height,
            device_scale_factor: Some(1.0),
            emulating_mobile: false,
            is_landscape: true,
            has_touch: false,
        })
        .window_size(width, height)
        .arg("--disable-gpu")
        .arg("--no-sandbox")
        .arg("--disable-setuid-sandbox")
        .arg("--disable-dev-shm-usage")
        .arg("--disable-extensions")
        .arg("--disable-sync")
        .arg("--disable-translate")
        .arg("--no-first-run")
        .arg("--no-default-browser-check")
        .arg("--mute-audio")
        .arg("--disable-blink-features=AutomationControlled")
        .arg(format!("--user-agent={}", ua));

    if !headless {
        builder = builder.with_head();
    }

    builder
        .build()
        .map_err(|e| PortalError::Browser(format!("failed to build browser config: {e}")))
}

// ── Provider ─────────────────────────────────────────────────────────────────

/// Launches a fresh Chromium process per [`BrowserProvider::launch`].
#[derive(Debug, Clone)]
pub struct ChromeProvider {
    exe: String,
    headless: bool,
    network_idle: Duration,
}

impl ChromeProvider {
    pub fn new(exe: impl Into<String>, headless: bool, network_idle: Duration) -> Self {
        Self {
            exe: exe.into(),
            headless,
            network_idle,
        }
    }

    /// Provider for the auto-discovered executable.
    pub fn from_config(cfg: &Emm11Config) -> PortalResult<Self> {
        let exe = find_chrome_executable().ok_or_else(|| {
            PortalError::Browser(
                "No browser found. Install Brave, Chrome, or Chromium. Set CHROME_EXECUTABLE if installed in a non-standard location.".to_string(),
            )
        })?;
        Ok(Self::new(exe, cfg.resolve_headless(), cfg.timing.network_idle()))
    }
}

#[async_trait]
impl BrowserProvider for ChromeProvider {
    async fn launch(&self) -> PortalResult<Box<dyn PortalBrowser>> {
        debug!("🚀 launching browser ({})", self.exe);
        let profile = new_profile_dir()?;
        let config = build_browser_config(&self.exe, self.headless, 1280, 900, profile.path())?;
        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| PortalError::Browser(format!("failed to launch ({}): {e}", self.exe)))?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    warn!("CDP handler error: {}", e);
                }
            }
        });

        Ok(Box::new(ChromeBrowser {
            browser: Some(browser),
            handler_task,
            network_idle: self.network_idle,
            profile: Some(profile),
        }))
    }
}

pub struct ChromeBrowser {
    browser: Option<Browser>,
    handler_task: JoinHandle<()>,
    network_idle: Duration,
    // removed once the process has exited
    profile: Option<TempDir>,
}

#[async_trait]
impl PortalBrowser for ChromeBrowser {
    async fn new_page(&mut self) -> PortalResult<Box<dyn PortalPage>> {
        let browser = self
            .browser
            .as_ref()
            .ok_or_else(|| PortalError::Browser("browser already closed".into()))?;
        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| PortalError::Browser(format!("failed to open tab: {e}")))?;
        Ok(Box::new(ChromePage {
            page,
            network_idle: self.network_idle,
        }))
    }

    async fn close(&mut self) {
        if let Some(mut browser) = self.browser.take() {
            if let Err(e) = browser.close().await {
                warn!("Browser close error (non-fatal): {}", e);
            }
            let _ = browser.wait().await;
        }
        self.handler_task.abort();
        if let Some(profile) = self.profile.take() {
            if let Err(e) = profile.close() {
                debug!("profile cleanup failed (non-fatal): {}", e);
            }
        }
    }
}

impl Drop for ChromeBrowser {
    fn drop(&mut self) {
        // Drop cannot await; if we're inside a tokio runtime, spawn the close
        // so an early-return path does not leave a zombie Chromium behind.
        self.handler_task.abort();
        let profile = self.profile.take();
        let Some(mut browser) = self.browser.take() else {
            return;
        };
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                let _ = browser.close().await;
                let _ = browser.wait().await;
                drop(profile);
            });
        }
    }
}

// ── Page primitives ──────────────────────────────────────────────────────────

pub struct ChromePage {
    page: Page,
    network_idle: Duration,
}

const POLL: Duration = Duration::from_millis(200);

/// JS expression yielding the located element or `null`.
fn element_expr(locator: Locator) -> String {
    match locator {
        Locator::Css(selector) => format!(
            "document.querySelector({})",
            serde_json::Value::from(selector)
        ),
        Locator::LinkText(text) => format!(
            "(Array.from(document.querySelectorAll('a')).find(a => (a.textContent || '').replace(/\\s+/g, ' ').trim() === {}) || null)",
            serde_json::Value::from(text)
        ),
    }
}

fn visible_script(locator: Locator) -> String {
    format!(
        "(() => {{ const el = {}; if (!el) return false; \
         const s = window.getComputedStyle(el); \
         if (s.visibility === 'hidden' || s.display === 'none') return false; \
         const r = el.getBoundingClientRect(); return r.width > 0 && r.height > 0; }})()",
        element_expr(locator)
    )
}

impl ChromePage {
    async fn eval<T: serde::de::DeserializeOwned>(&self, script: String) -> PortalResult<T> {
        self.page
            .evaluate(script)
            .await
            .map_err(PortalError::browser)?
            .into_value::<T>()
            .map_err(PortalError::browser)
    }

    async fn element_action(&self, locator: Locator, body: &str, what: &str) -> PortalResult<()> {
        let script = format!(
            "(() => {{ const el = {}; if (!el) return false; {} return true; }})()",
            element_expr(locator),
            body
        );
        if self.eval::<bool>(script).await? {
            Ok(())
        } else {
            Err(PortalError::Browser(format!("{what}: element {locator} not found")))
        }
    }
}

#[async_trait]
impl PortalPage for ChromePage {
    async fn goto(&mut self, url: &str, timeout: Duration) -> PortalResult<()> {
        match tokio::time::timeout(timeout, self.page.goto(url)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(PortalError::Browser(format!("navigation to {url} failed: {e}"))),
            Err(_) => Err(PortalError::timeout(format!("loading {url}"), timeout)),
        }
    }

    async fn reload(&mut self) -> PortalResult<()> {
        self.page
            .reload()
            .await
            .map(|_| ())
            .map_err(|e| PortalError::Browser(format!("reload failed: {e}")))
    }

    async fn wait_visible(&mut self, locator: Locator, timeout: Duration) -> PortalResult<bool> {
        let script = visible_script(locator);
        let deadline = Instant::now() + timeout;
        loop {
            // Evaluation errors while a postback swaps the document count as "not yet".
            if self.eval::<bool>(script.clone()).await.unwrap_or(false) {
                return Ok(true);
            }
            if Instant::now() >= deadline {
                return Ok(false);
            }
            tokio::time::sleep(POLL).await;
        }
    }

    async fn is_visible(&mut self, locator: Locator) -> PortalResult<bool> {
        self.eval(visible_script(locator)).await
    }

    async fn inner_text(&mut self, locator: Locator) -> PortalResult<String> {
        let script = format!(
            "(() => {{ const el = {}; return el ? el.innerText : null; }})()",
            element_expr(locator)
        );
        self.eval::<Option<String>>(script)
            .await?
            .ok_or_else(|| PortalError::Browser(format!("element {locator} not found")))
    }

    async fn content(&mut self) -> PortalResult<String> {
        self.page
            .content()
            .await
            .map_err(|e| PortalError::Browser(format!("failed to get page content: {e}")))
    }

    async fn fill(&mut self, locator: Locator, value: &str) -> PortalResult<()> {
        let body = format!(
            "el.focus(); el.value = {}; \
             el.dispatchEvent(new Event('input', {{ bubbles: true }})); \
             el.dispatchEvent(new Event('change', {{ bubbles: true }}));",
            serde_json::Value::from(value)
        );
        self.element_action(locator, &body, "fill").await
    }

    async fn click(&mut self, locator: Locator) -> PortalResult<()> {
        match locator {
            Locator::Css(selector) => {
                let element = self
                    .page
                    .find_element(selector)
                    .await
                    .map_err(|e| PortalError::Browser(format!("click: {selector}: {e}")))?;
                element
                    .click()
                    .await
                    .map(|_| ())
                    .map_err(|e| PortalError::Browser(format!("click: {selector}: {e}")))
            }
            Locator::LinkText(_) => self.element_action(locator, "el.click();", "click").await,
        }
    }

    async fn select_index(&mut self, locator: Locator, index: usize) -> PortalResult<()> {
        let body = format!(
            "if (el.options.length <= {index}) return false; el.selectedIndex = {index}; \
             el.dispatchEvent(new Event('change', {{ bubbles: true }}));"
        );
        self.element_action(locator, &body, "select").await
    }

    async fn screenshot_element(&mut self, locator: Locator) -> PortalResult<Vec<u8>> {
        let Locator::Css(selector) = locator else {
            return Err(PortalError::Browser(format!(
                "screenshot needs a CSS locator, got {locator}"
            )));
        };
        let element = self
            .page
            .find_element(selector)
            .await
            .map_err(|e| PortalError::Browser(format!("screenshot: {selector}: {e}")))?;
        element
            .screenshot(CaptureScreenshotFormat::Png)
            .await
            .map_err(|e| PortalError::Browser(format!("screenshot capture failed: {e}")))
    }

    async fn wait_network_idle(&mut self) -> PortalResult<()> {
        wait_until_stable(&self.page, 500, self.network_idle).await
    }

    async fn print_pdf(&mut self) -> PortalResult<Vec<u8>> {
        let params = PrintToPdfParams {
            print_background: Some(true),
            prefer_css_page_size: Some(true),
            ..Default::default()
        };
        self.page
            .pdf(params)
            .await
            .map_err(|e| PortalError::Render(format!("print to pdf failed: {e}")))
    }

    async fn close(&mut self) {
        if let Err(e) = self.page.clone().close().await {
            debug!("page close error (non-fatal): {}", e);
        }
    }
}

// ── Network quiescence ───────────────────────────────────────────────────────

/// Wait until the page network goes idle (no new resource entries for
/// `quiet_ms` consecutive ms) or until `timeout` has elapsed.
///
/// Polls `performance.getEntriesByType("resource").length` every 250 ms, a
/// networkidle heuristic that works without CDP Network events.
pub async fn wait_until_stable(page: &Page, quiet_ms: u64, timeout: Duration) -> PortalResult<()> {
    let poll = Duration::from_millis(250);
    let start = Instant::now();
    let mut last_count: u64 = 0;
    let mut stable_since = Instant::now();

    loop {
        if start.elapsed() >= timeout {
            info!("wait_until_stable: timeout after {}ms", timeout.as_millis());
            break;
        }

        let count: u64 = page
            .evaluate("performance.getEntriesByType('resource').length")
            .await
            .ok()
            .and_then(|v| v.into_value::<serde_json::Value>().ok())
            .and_then(|j| j.as_u64())
            .unwrap_or(0);

        let ready_complete: bool = page
            .evaluate("document.readyState")
            .await
            .ok()
            .and_then(|v| v.into_value::<serde_json::Value>().ok())
            .and_then(|j| j.as_str().map(|s| s == "complete"))
            .unwrap_or(false);

        if !ready_complete {
            stable_since = Instant::now();
            last_count = count;
        } else if count != last_count {
            last_count = count;
            stable_since = Instant::now();
        } else if stable_since.elapsed().as_millis() as u64 >= quiet_ms {
            debug!(
                "wait_until_stable: idle after {}ms ({} resources)",
                start.elapsed().as_millis(),
                count
            );
            break;
        }

        tokio::time::sleep(poll).await;
    }
    Ok(())
}
