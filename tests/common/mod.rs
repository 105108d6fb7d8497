//! Scripted in-memory portal used by the stage tests.
//!
//! One [`FakePortal`] plays every portal screen (detail pages, login, menu,
//! pair workflow) and records what the stages did to it.

#![allow(dead_code)]

use async_trait::async_trait;
use emm11_scout::core::types::DocField;
use emm11_scout::document::{FormTemplate, VerificationCode};
use emm11_scout::features::captcha::CaptchaRecognizer;
use emm11_scout::scraping::extract::text_of;
use emm11_scout::scraping::portal::*;
use emm11_scout::{Emm11Config, PortalError, PortalResult, TpPair};
use scraper::Html;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const DETAIL_URL: &str = "http://portal.test/detail?eId={}";
pub const LOGIN_URL: &str = "http://portal.test/login";
pub const UNUSED_TEXT: &str = "Other\u{a0}Destination District ISTP Not Allowed";

pub fn init_logger() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

/// Config pointing at the fake portal with near-zero waits.
pub fn test_config(output_dir: &Path) -> Emm11Config {
    serde_json::from_value(serde_json::json!({
        "portal": {
            "detail_url": DETAIL_URL,
            "login_url": LOGIN_URL,
            "login_id": "operator",
            "password": "secret"
        },
        "timing": {
            "page_load_ms": 50,
            "field_wait_ms": 10,
            "error_label_ms": 10,
            "login_marker_ms": 10,
            "menu_wait_ms": 10,
            "network_idle_ms": 10,
            "settle_ms": 0
        },
        "output_dir": output_dir,
        "template_path": output_dir.join("missing_template.pdf"),
        "headless": true
    }))
    .expect("test config")
}

/// Detail page carrying every document field.
pub fn detail_html(istp: &str, ostp: &str, district: &str) -> String {
    let mut body = String::new();
    for field in DocField::ALL {
        let value = match field {
            DocField::IstpNo => istp.to_string(),
            DocField::OriginTransitPassNo => ostp.to_string(),
            DocField::DestinationDistrict => district.to_string(),
            DocField::QtyTransportedCubicMeter => "18.00".to_string(),
            DocField::TransitPassGeneratedOn => "12/03/2024 10:15:00".to_string(),
            DocField::TransitPassValidUpto => "13/03/2024 10:15:00".to_string(),
            DocField::TransporterName => "Shree Ganesh Road Carriers".to_string(),
            DocField::TransporterAddress => "Plot 14 Industrial Area Phase Two Ring Road".to_string(),
            DocField::VehicleNumber => "UP32AB1234".to_string(),
            other => format!("{other:?}"),
        };
        let id = field.selector().trim_start_matches('#');
        body.push_str(&format!("<span id=\"{id}\">{value}</span>\n"));
    }
    format!("<html><body>{body}</body></html>")
}

#[derive(Debug, Clone)]
pub enum DetailPage {
    Html(String),
    Timeout,
}

#[derive(Debug, Clone)]
enum Screen {
    Blank,
    Detail(String),
    Login,
    Home { submenu_open: bool },
    Workflow { error: Option<String> },
}

#[derive(Debug, Default)]
pub struct Ledger {
    pub detail_gotos: Vec<String>,
    pub launched: usize,
    pub browsers_closed: usize,
    pub pages_opened: usize,
    pub pages_closed: usize,
    pub active_browsers: usize,
    pub max_active_browsers: usize,
    pub captcha_shots: usize,
    pub failed_captcha_shots: usize,
    pub failed_fills: usize,
    pub login_submits: u32,
    pub reloads: usize,
    pub menu_clicks: usize,
    pub pair_submits: Vec<TpPair>,
}

#[derive(Default)]
struct Script {
    details: HashMap<String, DetailPage>,
    accept_login_on: Option<u32>,
    probe_errors: HashMap<String, String>,
    failing_submits: Vec<String>,
    workflow_broken: bool,
    submenu_preopened: bool,
    login_page_timeout: bool,
    captcha_shot_failures: usize,
    login_fill_failures: usize,
}

#[derive(Clone, Default)]
pub struct FakePortal {
    script: Arc<Mutex<Script>>,
    ledger: Arc<Mutex<Ledger>>,
}

impl FakePortal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_detail(self, eid: &str, page: DetailPage) -> Self {
        self.script.lock().unwrap().details.insert(eid.to_string(), page);
        self
    }

    /// Login succeeds on the `n`th submit (1-based).
    pub fn accept_login_on(self, n: u32) -> Self {
        self.script.lock().unwrap().accept_login_on = Some(n);
        self
    }

    /// Error label text shown after submitting the pair with inbound `istp`.
    pub fn with_probe_error(self, istp: &str, text: &str) -> Self {
        self.script.lock().unwrap().probe_errors.insert(istp.to_string(), text.to_string());
        self
    }

    /// Submitting the pair with inbound `istp` fails at the driver level.
    pub fn with_failing_submit(self, istp: &str) -> Self {
        self.script.lock().unwrap().failing_submits.push(istp.to_string());
        self
    }

    pub fn with_broken_workflow(self) -> Self {
        self.script.lock().unwrap().workflow_broken = true;
        self
    }

    /// Loading the login page times out.
    pub fn with_login_page_timeout(self) -> Self {
        self.script.lock().unwrap().login_page_timeout = true;
        self
    }

    /// The first `n` CAPTCHA screenshots fail at the driver level.
    pub fn with_failing_captcha_shots(self, n: usize) -> Self {
        self.script.lock().unwrap().captcha_shot_failures = n;
        self
    }

    /// The first `n` fills on the login form fail at the driver level.
    pub fn with_failing_login_fills(self, n: usize) -> Self {
        self.script.lock().unwrap().login_fill_failures = n;
        self
    }

    pub fn with_submenu_open(self) -> Self {
        self.script.lock().unwrap().submenu_preopened = true;
        self
    }

    pub fn ledger(&self) -> std::sync::MutexGuard<'_, Ledger> {
        self.ledger.lock().unwrap()
    }

    pub fn provider(&self) -> Arc<dyn BrowserProvider> {
        Arc::new(self.clone())
    }
}

#[async_trait]
impl BrowserProvider for FakePortal {
    async fn launch(&self) -> PortalResult<Box<dyn PortalBrowser>> {
        let mut ledger = self.ledger.lock().unwrap();
        ledger.launched += 1;
        ledger.active_browsers += 1;
        ledger.max_active_browsers = ledger.max_active_browsers.max(ledger.active_browsers);
        Ok(Box::new(FakeBrowser {
            portal: self.clone(),
            logged_in: Arc::new(Mutex::new(false)),
            closed: false,
        }))
    }
}

struct FakeBrowser {
    portal: FakePortal,
    logged_in: Arc<Mutex<bool>>,
    closed: bool,
}

#[async_trait]
impl PortalBrowser for FakeBrowser {
    async fn new_page(&mut self) -> PortalResult<Box<dyn PortalPage>> {
        self.portal.ledger().pages_opened += 1;
        Ok(Box::new(FakePage {
            portal: self.portal.clone(),
            logged_in: Arc::clone(&self.logged_in),
            screen: Screen::Blank,
            inputs: HashMap::new(),
        }))
    }

    async fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            let mut ledger = self.portal.ledger();
            ledger.browsers_closed += 1;
            ledger.active_browsers -= 1;
        }
    }
}

struct FakePage {
    portal: FakePortal,
    logged_in: Arc<Mutex<bool>>,
    screen: Screen,
    inputs: HashMap<Locator, String>,
}

impl FakePage {
    fn visible(&self, locator: Locator) -> bool {
        let script = self.portal.script.lock().unwrap();
        match (&self.screen, locator) {
            (Screen::Detail(html), Locator::Css(css)) => {
                matches!(text_of(&Html::parse_document(html), css), Ok(Some(_)))
            }
            (Screen::Login, l) => {
                l == LOGIN_ID_INPUT
                    || l == LOGIN_PASSWORD_INPUT
                    || l == LOGIN_CAPTCHA_IMAGE
                    || l == LOGIN_CAPTCHA_INPUT
                    || l == LOGIN_SUBMIT
            }
            (Screen::Home { submenu_open }, l) => {
                l == LOGGED_IN_MARKER
                    || (l == MENU_MASTER_ENTRIES && !script.workflow_broken)
                    || (l == MENU_PAIR_WORKFLOW && *submenu_open)
            }
            (Screen::Workflow { error }, l) => {
                l == LOGGED_IN_MARKER
                    || l == WORKFLOW_LICENSEE
                    || l == WORKFLOW_MODE
                    || l == WORKFLOW_ISTP_INPUT
                    || l == WORKFLOW_OSTP_INPUT
                    || l == WORKFLOW_SUBMIT
                    || (l == WORKFLOW_ERROR_LABEL && error.is_some())
            }
            _ => false,
        }
    }

    fn missing(locator: Locator) -> PortalError {
        PortalError::Browser(format!("element not found: {locator}"))
    }
}

#[async_trait]
impl PortalPage for FakePage {
    async fn goto(&mut self, url: &str, timeout: Duration) -> PortalResult<()> {
        if url == LOGIN_URL {
            if self.portal.script.lock().unwrap().login_page_timeout {
                return Err(PortalError::timeout(format!("loading {url}"), timeout));
            }
            let logged_in = *self.logged_in.lock().unwrap();
            let preopened = self.portal.script.lock().unwrap().submenu_preopened;
            self.screen = if logged_in {
                Screen::Home { submenu_open: preopened }
            } else {
                Screen::Login
            };
            return Ok(());
        }

        let eid = url.rsplit("eId=").next().unwrap_or_default().to_string();
        self.portal.ledger().detail_gotos.push(eid.clone());
        // yield so concurrent fetches overlap
        tokio::time::sleep(Duration::from_millis(5)).await;
        let page = self.portal.script.lock().unwrap().details.get(&eid).cloned();
        match page {
            Some(DetailPage::Html(html)) => {
                self.screen = Screen::Detail(html);
                Ok(())
            }
            Some(DetailPage::Timeout) => Err(PortalError::timeout(format!("loading {url}"), timeout)),
            None => {
                self.screen = Screen::Detail("<html><body>Record not found</body></html>".into());
                Ok(())
            }
        }
    }

    async fn reload(&mut self) -> PortalResult<()> {
        self.portal.ledger().reloads += 1;
        self.inputs.clear();
        Ok(())
    }

    async fn wait_visible(&mut self, locator: Locator, _timeout: Duration) -> PortalResult<bool> {
        Ok(self.visible(locator))
    }

    async fn is_visible(&mut self, locator: Locator) -> PortalResult<bool> {
        Ok(self.visible(locator))
    }

    async fn inner_text(&mut self, locator: Locator) -> PortalResult<String> {
        match (&self.screen, locator) {
            (Screen::Workflow { error: Some(text) }, l) if l == WORKFLOW_ERROR_LABEL => Ok(text.clone()),
            (Screen::Detail(html), Locator::Css(css)) => text_of(&Html::parse_document(html), css)?
                .ok_or_else(|| Self::missing(locator)),
            _ => Err(Self::missing(locator)),
        }
    }

    async fn content(&mut self) -> PortalResult<String> {
        Ok(match &self.screen {
            Screen::Detail(html) => html.clone(),
            _ => "<html><body></body></html>".to_string(),
        })
    }

    async fn fill(&mut self, locator: Locator, value: &str) -> PortalResult<()> {
        if !self.visible(locator) {
            return Err(Self::missing(locator));
        }
        if matches!(self.screen, Screen::Login) {
            let mut script = self.portal.script.lock().unwrap();
            if script.login_fill_failures > 0 {
                script.login_fill_failures -= 1;
                self.portal.ledger().failed_fills += 1;
                return Err(PortalError::Browser(format!("fill: {locator} detached")));
            }
        }
        self.inputs.insert(locator, value.to_string());
        Ok(())
    }

    async fn click(&mut self, locator: Locator) -> PortalResult<()> {
        if !self.visible(locator) {
            return Err(Self::missing(locator));
        }
        if locator == LOGIN_SUBMIT {
            let submits = {
                let mut ledger = self.portal.ledger();
                ledger.login_submits += 1;
                ledger.login_submits
            };
            let accept_on = self.portal.script.lock().unwrap().accept_login_on;
            if accept_on.is_some_and(|n| submits >= n) {
                *self.logged_in.lock().unwrap() = true;
                self.screen = Screen::Home { submenu_open: false };
            }
        } else if locator == MENU_MASTER_ENTRIES {
            self.portal.ledger().menu_clicks += 1;
            self.screen = Screen::Home { submenu_open: true };
        } else if locator == MENU_PAIR_WORKFLOW {
            self.screen = Screen::Workflow { error: None };
        } else if locator == WORKFLOW_SUBMIT {
            let istp = self.inputs.get(&WORKFLOW_ISTP_INPUT).cloned().unwrap_or_default();
            let ostp = self.inputs.get(&WORKFLOW_OSTP_INPUT).cloned().unwrap_or_default();
            let (error, fails) = {
                let script = self.portal.script.lock().unwrap();
                (script.probe_errors.get(&istp).cloned(), script.failing_submits.contains(&istp))
            };
            self.portal.ledger().pair_submits.push(TpPair { istp, ostp });
            if fails {
                return Err(PortalError::Browser("submit button detached".into()));
            }
            self.screen = Screen::Workflow { error };
        }
        Ok(())
    }

    async fn select_index(&mut self, locator: Locator, _index: usize) -> PortalResult<()> {
        if !self.visible(locator) {
            return Err(Self::missing(locator));
        }
        Ok(())
    }

    async fn screenshot_element(&mut self, locator: Locator) -> PortalResult<Vec<u8>> {
        if !self.visible(locator) {
            return Err(Self::missing(locator));
        }
        {
            let mut script = self.portal.script.lock().unwrap();
            if script.captcha_shot_failures > 0 {
                script.captcha_shot_failures -= 1;
                self.portal.ledger().failed_captcha_shots += 1;
                return Err(PortalError::Browser("screenshot capture failed".into()));
            }
        }
        self.portal.ledger().captcha_shots += 1;
        Ok(b"\x89PNG fake".to_vec())
    }

    async fn wait_network_idle(&mut self) -> PortalResult<()> {
        Ok(())
    }

    async fn print_pdf(&mut self) -> PortalResult<Vec<u8>> {
        let code = VerificationCode::encode("http://portal.test/print")?;
        FormTemplate::blank_a4().render_bytes(&Default::default(), &code)
    }

    async fn pause(&mut self, _duration: Duration) {}

    async fn close(&mut self) {
        self.portal.ledger().pages_closed += 1;
    }
}

/// Recognizer replaying canned reads; the last one repeats.
pub struct ScriptedRecognizer {
    replies: Vec<String>,
    calls: AtomicUsize,
}

impl ScriptedRecognizer {
    pub fn new(replies: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            replies: replies.iter().map(|s| s.to_string()).collect(),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CaptchaRecognizer for ScriptedRecognizer {
    async fn recognize(&self, _png: &[u8]) -> PortalResult<String> {
        let i = self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .replies
            .get(i)
            .or_else(|| self.replies.last())
            .cloned()
            .unwrap_or_default())
    }
}
