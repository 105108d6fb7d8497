use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// One eMM11 transit document as surfaced by the record fetcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Numeric `eId` the detail page is addressed by.
    pub id: u64,
    /// Inbound transit pass number.
    pub istp: String,
    /// Outbound (origin) transit pass number.
    pub ostp: String,
    pub destination_district: String,
    pub qty: String,
    pub valid_upto: String,
    pub generated_on: String,
    /// `None` until the validity prober has run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unused: Option<bool>,
}

impl Record {
    pub fn in_district(&self, district: &str) -> bool {
        district_matches(&self.destination_district, district)
    }

    /// The probe pair, or `None` when either pass number is missing.
    pub fn tp_pair(&self) -> Option<TpPair> {
        TpPair::new(&self.istp, &self.ostp)
    }

    /// Operator-facing notification for an accepted record.
    pub fn notification(&self) -> String {
        format!(
            "ISTP: {}\nOSTP: {}\nDistrict: {}\nValid Up To: {}\nGenerated On: {}\nQty: {}",
            self.istp,
            self.ostp,
            self.destination_district,
            self.valid_upto,
            self.generated_on,
            self.qty
        )
    }
}

/// Case-insensitive district comparison, ignoring surrounding whitespace.
pub fn district_matches(found: &str, wanted: &str) -> bool {
    found.trim().to_uppercase() == wanted.trim().to_uppercase()
}

/// (inbound, outbound) pass pair submitted to the validity workflow.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TpPair {
    pub istp: String,
    pub ostp: String,
}

impl TpPair {
    pub fn new(istp: &str, ostp: &str) -> Option<Self> {
        let (istp, ostp) = (istp.trim(), ostp.trim());
        if istp.is_empty() || ostp.is_empty() {
            return None;
        }
        Some(Self {
            istp: istp.to_string(),
            ostp: ostp.to_string(),
        })
    }

    pub fn is_well_formed(&self) -> bool {
        !self.istp.trim().is_empty() && !self.ostp.trim().is_empty()
    }
}

impl fmt::Display for TpPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} / {}", self.istp, self.ostp)
    }
}

/// Display fields rendered onto the printable transit form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocField {
    IstpNo,
    TransporterName,
    TransporterId,
    TransporterMobile,
    TransporterAddress,
    QtyTransportedCubicMeter,
    MineralName,
    DestinationDistrict,
    DistanceKm,
    TravelDuration,
    TransitPassGeneratedOn,
    TransitPassValidUpto,
    LoadingFromDistrict,
    LoadingFromState,
    OriginTransitPassNo,
    OriginTransitPassDate,
    DestinationAddress,
    VehicleNumber,
    VehicleType,
    DriverName,
    DriverMobile,
    DriverDlNumber,
    FormValidUpto,
}

impl DocField {
    pub const ALL: [DocField; 23] = [
        DocField::IstpNo,
        DocField::TransporterName,
        DocField::TransporterId,
        DocField::TransporterMobile,
        DocField::TransporterAddress,
        DocField::QtyTransportedCubicMeter,
        DocField::MineralName,
        DocField::DestinationDistrict,
        DocField::DistanceKm,
        DocField::TravelDuration,
        DocField::TransitPassGeneratedOn,
        DocField::TransitPassValidUpto,
        DocField::LoadingFromDistrict,
        DocField::LoadingFromState,
        DocField::OriginTransitPassNo,
        DocField::OriginTransitPassDate,
        DocField::DestinationAddress,
        DocField::VehicleNumber,
        DocField::VehicleType,
        DocField::DriverName,
        DocField::DriverMobile,
        DocField::DriverDlNumber,
        DocField::FormValidUpto,
    ];
}

/// Snapshot of one detail page's display fields. Missing fields read as "".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentFieldSet {
    values: BTreeMap<DocField, String>,
}

impl DocumentFieldSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, field: DocField, value: impl Into<String>) {
        self.values.insert(field, value.into());
    }

    pub fn with(mut self, field: DocField, value: impl Into<String>) -> Self {
        self.set(field, value);
        self
    }

    pub fn get(&self, field: DocField) -> &str {
        self.values.get(&field).map(String::as_str).unwrap_or("")
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
