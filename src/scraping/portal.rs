//! Browser seam and the portal's fixed integration contract.
//!
//! Stages talk to the portal only through [`PortalPage`], [`PortalBrowser`]
//! and [`BrowserProvider`]. The Chromium backend lives in
//! `browser_manager`; tests drive the same stages with scripted fakes.
//!
//! Every selector and link text below is dictated by the remote portal and is
//! not configurable.

use crate::core::types::DocField;
use crate::core::PortalResult;
use async_trait::async_trait;
use std::fmt;
use std::time::Duration;

/// How an element is located on a portal page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Locator {
    Css(&'static str),
    /// An `<a>` whose whitespace-normalised text equals this string.
    LinkText(&'static str),
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Locator::Css(s) => write!(f, "{s}"),
            Locator::LinkText(t) => write!(f, "link '{t}'"),
        }
    }
}

/// One scriptable tab.
#[async_trait]
pub trait PortalPage: Send {
    /// Navigate and wait for the load, failing with `TransientNetwork` after `timeout`.
    async fn goto(&mut self, url: &str, timeout: Duration) -> PortalResult<()>;

    async fn reload(&mut self) -> PortalResult<()>;

    /// `Ok(true)` once the element is visible, `Ok(false)` if `timeout` elapses first.
    async fn wait_visible(&mut self, locator: Locator, timeout: Duration) -> PortalResult<bool>;

    async fn is_visible(&mut self, locator: Locator) -> PortalResult<bool>;

    async fn inner_text(&mut self, locator: Locator) -> PortalResult<String>;

    /// Serialized DOM of the current document.
    async fn content(&mut self) -> PortalResult<String>;

    /// Replace an input's value.
    async fn fill(&mut self, locator: Locator, value: &str) -> PortalResult<()>;

    async fn click(&mut self, locator: Locator) -> PortalResult<()>;

    /// Select the `<option>` at `index` and fire `change`.
    async fn select_index(&mut self, locator: Locator, index: usize) -> PortalResult<()>;

    /// PNG of a single element.
    async fn screenshot_element(&mut self, locator: Locator) -> PortalResult<Vec<u8>>;

    /// Wait until the page stops loading resources.
    async fn wait_network_idle(&mut self) -> PortalResult<()>;

    /// The rendered page as a PDF document.
    async fn print_pdf(&mut self) -> PortalResult<Vec<u8>>;

    /// Settle delay between interactions.
    async fn pause(&mut self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }

    async fn close(&mut self);
}

/// One browser instance; pages opened from it share cookies.
#[async_trait]
pub trait PortalBrowser: Send {
    async fn new_page(&mut self) -> PortalResult<Box<dyn PortalPage>>;

    /// Release the instance. Must be called on every exit path.
    async fn close(&mut self);
}

/// Source of isolated browser instances.
#[async_trait]
pub trait BrowserProvider: Send + Sync {
    async fn launch(&self) -> PortalResult<Box<dyn PortalBrowser>>;
}

// ── Detail page ──────────────────────────────────────────────────────────────

pub const DETAIL_ISTP: Locator = Locator::Css("#lbl_istp");
pub const DETAIL_OSTP: Locator = Locator::Css("#lbl_Origin_Transit_Pass_No");
pub const DETAIL_DISTRICT: Locator = Locator::Css("#lbl_destination_district");
pub const DETAIL_QTY: Locator = Locator::Css("#lbl_qty_to_Transport");
pub const DETAIL_GENERATED_ON: Locator = Locator::Css("#txt_etp_generated_on");
pub const DETAIL_VALID_UPTO: Locator = Locator::Css("#txt_istp_valid_upto");

/// Fields the fetcher waits for before extracting a record, with a flag for
/// the short (5 s) wait used on the pass-number labels.
pub const RECORD_WAITS: [(Locator, bool); 6] = [
    (DETAIL_DISTRICT, false),
    (DETAIL_QTY, false),
    (DETAIL_GENERATED_ON, false),
    (DETAIL_VALID_UPTO, false),
    (DETAIL_ISTP, true),
    (DETAIL_OSTP, true),
];

impl DocField {
    /// Element id of this field on the detail page.
    pub fn selector(self) -> &'static str {
        match self {
            DocField::IstpNo => "#lbl_istp",
            DocField::TransporterName => "#lbl_name_of_Transporter",
            DocField::TransporterId => "#lbl_TransporterId",
            DocField::TransporterMobile => "#lbl_mobile_no",
            DocField::TransporterAddress => "#lbl_TransporterDetails",
            DocField::QtyTransportedCubicMeter => "#lbl_qty_to_Transport",
            DocField::MineralName => "#lbl_type_of_mining_mineral",
            DocField::DestinationDistrict => "#lbl_destination_district",
            DocField::DistanceKm => "#lbl_distrance",
            DocField::TravelDuration => "#lbl_travel_duration",
            DocField::TransitPassGeneratedOn => "#txt_etp_generated_on",
            DocField::TransitPassValidUpto => "#txt_istp_valid_upto",
            DocField::LoadingFromDistrict => "#lbl_loadingfrom",
            DocField::LoadingFromState => "#lbl_loadingfromState",
            DocField::OriginTransitPassNo => "#lbl_Origin_Transit_Pass_No",
            DocField::OriginTransitPassDate => "#lbl_Origin_Transit_Pass_Generation_Date",
            DocField::DestinationAddress => "#lbl_destination_address",
            DocField::VehicleNumber => "#lbl_registraton_number_of_vehicle",
            DocField::VehicleType => "#lbl_vehicleType",
            DocField::DriverName => "#lbl_name_of_driver",
            DocField::DriverMobile => "#lbl_mobile_number_of_driver",
            DocField::DriverDlNumber => "#lbl_dl_number",
            DocField::FormValidUpto => "#lbl_formValidUpTo",
        }
    }
}

// ── Login page ───────────────────────────────────────────────────────────────

pub const LOGIN_ID_INPUT: Locator = Locator::Css("#ContentPlaceHolder1_txtAadharNumber");
pub const LOGIN_PASSWORD_INPUT: Locator = Locator::Css("#ContentPlaceHolder1_txtPassword");
pub const LOGIN_CAPTCHA_IMAGE: Locator = Locator::Css("#Captcha");
pub const LOGIN_CAPTCHA_INPUT: Locator = Locator::Css("#ContentPlaceHolder1_txtCaptcha");
pub const LOGIN_SUBMIT: Locator = Locator::Css("#ContentPlaceHolder1_btn_captcha");
/// Only rendered once the session is authenticated.
pub const LOGGED_IN_MARKER: Locator = Locator::Css("#pnlMenuEng");

// ── Pair-validity workflow ───────────────────────────────────────────────────

pub const MENU_MASTER_ENTRIES: Locator = Locator::LinkText("Master Entries");
pub const MENU_PAIR_WORKFLOW: Locator =
    Locator::LinkText("Apply for eFormC Quantity by Transit Pass Number");
pub const WORKFLOW_LICENSEE: Locator = Locator::Css("#ContentPlaceHolder1_ddl_LicenseeID");
/// First real licensee; index 0 is the "--Select--" placeholder.
pub const WORKFLOW_LICENSEE_INDEX: usize = 1;
pub const WORKFLOW_MODE: Locator = Locator::Css("#ContentPlaceHolder1_RbtWise_1");
pub const WORKFLOW_OSTP_INPUT: Locator =
    Locator::Css("input[name='ctl00$ContentPlaceHolder1$txtOSTP']");
pub const WORKFLOW_ISTP_INPUT: Locator =
    Locator::Css("input[name='ctl00$ContentPlaceHolder1$txtISTP']");
pub const WORKFLOW_SUBMIT: Locator =
    Locator::Css("input[name='ctl00$ContentPlaceHolder1$btnProceed1']");
pub const WORKFLOW_ERROR_LABEL: Locator = Locator::Css("span#ContentPlaceHolder1_ErrorLbl");
