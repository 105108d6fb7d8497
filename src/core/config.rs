use crate::core::error::{PortalError, PortalResult};
use std::path::{Path, PathBuf};
use std::time::Duration;

// ---------------------------------------------------------------------------
// Emm11Config: file-based config loader (emm11.json) with env-var fallback
// ---------------------------------------------------------------------------

pub const ENV_CONFIG_PATH: &str = "EMM11_CONFIG";
pub const ENV_CHROME_EXECUTABLE: &str = "CHROME_EXECUTABLE";
pub const ENV_LOGIN_ID: &str = "EMM11_LOGIN_ID";
pub const ENV_PASSWORD: &str = "EMM11_PASSWORD";

pub const DEFAULT_DETAIL_URL: &str =
    "https://upmines.upsdc.gov.in//Transporter/PrintTransporterFormVehicleCheckValidOrNot.aspx?eId={}";
pub const DEFAULT_LOGIN_URL: &str = "https://upmines.upsdc.gov.in/DefaultLicense.aspx";
pub const DEFAULT_UNUSED_PHRASE: &str = "other destination district istp not allowed";

/// Which synthesis strategy renders a per-identifier page.
#[derive(serde::Deserialize, serde::Serialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SynthesisStrategy {
    /// Field values composited onto the printed-form template.
    #[default]
    Overlay,
    /// Print-to-PDF of the live detail view.
    Raster,
}

impl std::str::FromStr for SynthesisStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "overlay" | "template" => Ok(Self::Overlay),
            "raster" | "page" => Ok(Self::Raster),
            other => Err(format!("unknown synthesis strategy: {other}")),
        }
    }
}

/// Portal addresses and login credentials (mirrors the `portal` key).
#[derive(serde::Deserialize, Default, Clone)]
pub struct PortalConfig {
    /// Detail-page template; `{}` is replaced by the numeric id.
    pub detail_url: Option<String>,
    pub login_url: Option<String>,
    pub login_id: Option<String>,
    /// Never logged.
    pub password: Option<String>,
    /// Case-insensitive phrase the validity workflow shows for an unused pair.
    pub unused_phrase: Option<String>,
}

impl std::fmt::Debug for PortalConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PortalConfig")
            .field("detail_url", &self.detail_url)
            .field("login_url", &self.login_url)
            .field("login_id", &self.login_id)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("unused_phrase", &self.unused_phrase)
            .finish()
    }
}

/// Timeouts and settle pauses, all in milliseconds (mirrors the `timing` key).
#[derive(serde::Deserialize, Default, Clone, Debug)]
pub struct TimingConfig {
    pub page_load_ms: Option<u64>,
    pub field_wait_ms: Option<u64>,
    pub error_label_ms: Option<u64>,
    pub login_marker_ms: Option<u64>,
    pub menu_wait_ms: Option<u64>,
    pub network_idle_ms: Option<u64>,
    pub settle_ms: Option<u64>,
}

impl TimingConfig {
    pub fn page_load(&self) -> Duration {
        Duration::from_millis(self.page_load_ms.unwrap_or(20_000))
    }

    pub fn field_wait(&self) -> Duration {
        Duration::from_millis(self.field_wait_ms.unwrap_or(10_000))
    }

    pub fn error_label(&self) -> Duration {
        Duration::from_millis(self.error_label_ms.unwrap_or(5_000))
    }

    pub fn login_marker(&self) -> Duration {
        Duration::from_millis(self.login_marker_ms.unwrap_or(5_000))
    }

    pub fn menu_wait(&self) -> Duration {
        Duration::from_millis(self.menu_wait_ms.unwrap_or(6_000))
    }

    pub fn network_idle(&self) -> Duration {
        Duration::from_millis(self.network_idle_ms.unwrap_or(30_000))
    }

    /// Pause after reloads and menu clicks so the portal's postbacks settle.
    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms.unwrap_or(1_500))
    }
}

/// Top-level config loaded from `emm11.json`.
#[derive(serde::Deserialize, Default, Clone, Debug)]
pub struct Emm11Config {
    #[serde(default)]
    pub portal: PortalConfig,
    #[serde(default)]
    pub timing: TimingConfig,
    pub fetch_concurrency: Option<usize>,
    pub login_max_attempts: Option<u32>,
    pub output_dir: Option<PathBuf>,
    pub merged_file_name: Option<String>,
    pub template_path: Option<PathBuf>,
    pub strategy: Option<SynthesisStrategy>,
    /// CAPTCHA OCR command (default `tesseract`).
    pub captcha_command: Option<String>,
    pub headless: Option<bool>,
}

fn env_nonempty(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn nonempty(v: &Option<String>) -> Option<String> {
    v.as_ref().filter(|s| !s.trim().is_empty()).cloned()
}

impl Emm11Config {
    /// Detail URL template: JSON → `EMM11_DETAIL_URL` → upmines default.
    pub fn resolve_detail_url(&self) -> String {
        nonempty(&self.portal.detail_url)
            .or_else(|| env_nonempty("EMM11_DETAIL_URL"))
            .unwrap_or_else(|| DEFAULT_DETAIL_URL.to_string())
    }

    /// Login URL: JSON → `EMM11_LOGIN_URL` → upmines default.
    pub fn resolve_login_url(&self) -> String {
        nonempty(&self.portal.login_url)
            .or_else(|| env_nonempty("EMM11_LOGIN_URL"))
            .unwrap_or_else(|| DEFAULT_LOGIN_URL.to_string())
    }

    /// Login identifier and secret. `None` when either is missing.
    pub fn resolve_credentials(&self) -> Option<Credentials> {
        let login_id = nonempty(&self.portal.login_id).or_else(|| env_nonempty(ENV_LOGIN_ID))?;
        let password = nonempty(&self.portal.password).or_else(|| env_nonempty(ENV_PASSWORD))?;
        Some(Credentials { login_id, password })
    }

    /// Unused-pair phrase: JSON → `EMM11_UNUSED_PHRASE` → built-in wording.
    pub fn resolve_unused_phrase(&self) -> String {
        nonempty(&self.portal.unused_phrase)
            .or_else(|| env_nonempty("EMM11_UNUSED_PHRASE"))
            .unwrap_or_else(|| DEFAULT_UNUSED_PHRASE.to_string())
    }

    /// Fetch admission ceiling: JSON → `EMM11_CONCURRENCY` → 5. Never below 1.
    pub fn resolve_fetch_concurrency(&self) -> usize {
        self.fetch_concurrency
            .or_else(|| env_nonempty("EMM11_CONCURRENCY").and_then(|v| v.trim().parse().ok()))
            .unwrap_or(5)
            .max(1)
    }

    /// Login attempt ceiling: JSON → `EMM11_LOGIN_ATTEMPTS` → 5. Never below 1.
    pub fn resolve_login_max_attempts(&self) -> u32 {
        self.login_max_attempts
            .or_else(|| env_nonempty("EMM11_LOGIN_ATTEMPTS").and_then(|v| v.trim().parse().ok()))
            .unwrap_or(5)
            .max(1)
    }

    pub fn resolve_output_dir(&self) -> PathBuf {
        self.output_dir
            .clone()
            .or_else(|| env_nonempty("EMM11_OUTPUT_DIR").map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from("pdf"))
    }

    pub fn resolve_merged_file_name(&self) -> String {
        nonempty(&self.merged_file_name).unwrap_or_else(|| "merged_tp.pdf".to_string())
    }

    /// The fixed well-known location of the combined output.
    pub fn merged_path(&self) -> PathBuf {
        self.resolve_output_dir().join(self.resolve_merged_file_name())
    }

    pub fn resolve_template_path(&self) -> PathBuf {
        self.template_path
            .clone()
            .or_else(|| env_nonempty("EMM11_TEMPLATE").map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from("mp_format.pdf"))
    }

    /// Strategy: JSON → `EMM11_STRATEGY` → overlay.
    pub fn resolve_strategy(&self) -> SynthesisStrategy {
        self.strategy
            .or_else(|| env_nonempty("EMM11_STRATEGY").and_then(|v| v.parse().ok()))
            .unwrap_or_default()
    }

    pub fn resolve_captcha_command(&self) -> String {
        nonempty(&self.captcha_command)
            .or_else(|| env_nonempty("EMM11_CAPTCHA_COMMAND"))
            .unwrap_or_else(|| "tesseract".to_string())
    }

    /// Headless: JSON → `EMM11_HEADLESS` ("0"/"false" shows the window) → true.
    pub fn resolve_headless(&self) -> bool {
        if let Some(b) = self.headless {
            return b;
        }
        std::env::var("EMM11_HEADLESS")
            .map(|v| !matches!(v.trim().to_ascii_lowercase().as_str(), "0" | "false" | "no" | "off"))
            .unwrap_or(true)
    }

    /// Detail-page URL for one record id (also the QR verification payload).
    pub fn detail_url_for(&self, id: &str) -> String {
        detail_url(&self.resolve_detail_url(), id)
    }

    /// Reject portal addresses that are not absolute http(s) URLs before any
    /// browser is launched.
    pub fn validate(&self) -> PortalResult<()> {
        for (name, raw) in [
            ("detail_url", self.detail_url_for("0")),
            ("login_url", self.resolve_login_url()),
        ] {
            let parsed = url::Url::parse(&raw)
                .map_err(|e| PortalError::Config(format!("{name} {raw:?} is not a valid URL: {e}")))?;
            if !matches!(parsed.scheme(), "http" | "https") {
                return Err(PortalError::Config(format!("{name} must be http(s), got {raw:?}")));
            }
        }
        Ok(())
    }
}

/// Substitute `id` into a `…?eId={}` template; a template without a
/// placeholder gets the id appended.
pub fn detail_url(template: &str, id: &str) -> String {
    if template.contains("{}") {
        template.replacen("{}", id.trim(), 1)
    } else {
        format!("{}{}", template, id.trim())
    }
}

/// Portal login. The secret is redacted from `Debug`.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub login_id: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("login_id", &self.login_id)
            .field("password", &"***")
            .finish()
    }
}

/// Load `emm11.json` from standard locations.
///
/// Search order (first found wins):
/// 1. `EMM11_CONFIG` env var path
/// 2. `./emm11.json`
/// 3. `../emm11.json`
/// 4. `~/.emm11/emm11.json`
///
/// Missing file → `Emm11Config::default()` (all env-var fallbacks apply).
/// Parse error → log a warning, return `Emm11Config::default()`.
pub fn load_config() -> Emm11Config {
    let mut candidates = vec![PathBuf::from("emm11.json"), PathBuf::from("../emm11.json")];
    if let Some(home) = dirs::home_dir() {
        candidates.push(home.join(".emm11").join("emm11.json"));
    }
    if let Ok(env_path) = std::env::var(ENV_CONFIG_PATH) {
        candidates.insert(0, PathBuf::from(env_path));
    }

    for path in &candidates {
        if let Some(cfg) = load_config_from(path) {
            return cfg;
        }
    }

    Emm11Config::default()
}

/// Read one config file. `None` when the file is absent or unreadable; a
/// parse error logs a warning and yields the defaults.
pub fn load_config_from(path: &Path) -> Option<Emm11Config> {
    let contents = std::fs::read_to_string(path).ok()?;
    match serde_json::from_str::<Emm11Config>(&contents) {
        Ok(cfg) => {
            tracing::info!("emm11.json loaded from {}", path.display());
            Some(cfg)
        }
        Err(e) => {
            tracing::warn!(
                "emm11.json parse error at {}: {}, using defaults",
                path.display(),
                e
            );
            Some(Emm11Config::default())
        }
    }
}

/// Optional override for the Chromium-family browser executable.
pub fn chrome_executable_override() -> Option<String> {
    let p = env_nonempty(ENV_CHROME_EXECUTABLE)?;
    let p = p.trim();
    if Path::new(p).exists() {
        Some(p.to_string())
    } else {
        None
    }
}
