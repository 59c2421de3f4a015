//! Common types shared between TrackView engines and their collaborators.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A WGS84 coordinate in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl LatLng {
    pub const fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Linear interpolation towards `other` by `t` in [0, 1].
    pub fn lerp(&self, other: &LatLng, t: f64) -> LatLng {
        LatLng {
            lat: self.lat + (other.lat - self.lat) * t,
            lng: self.lng + (other.lng - self.lng) * t,
        }
    }

    /// True when both axes differ by strictly less than `epsilon_deg`.
    pub fn near(&self, other: &LatLng, epsilon_deg: f64) -> bool {
        (self.lat - other.lat).abs() < epsilon_deg && (self.lng - other.lng).abs() < epsilon_deg
    }
}

/// Identifier of one route-resolution run.
///
/// Uses UUID v4 so log lines from overlapping runs can be told apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(pub Uuid);

impl RunId {
    /// Creates a new random RunId.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a deterministic RunId from a seed (for simulation).
    pub fn from_seed(seed: u64) -> Self {
        let mut bytes = [0u8; 16];
        bytes[0..8].copy_from_slice(&seed.to_le_bytes());
        bytes[8..16].copy_from_slice(&seed.wrapping_mul(0x517cc1b727220a95).to_le_bytes());
        Self(Uuid::from_bytes(bytes))
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Show first 8 chars for readability
        write!(f, "{}", &self.0.to_string()[..8])
    }
}

// =============================================================================
// ROUTING COLLABORATOR
// =============================================================================

/// Travel-mode hypothesis sent to the routing service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TravelMode {
    Driving,
    Walking,
}

impl TravelMode {
    pub fn name(&self) -> &'static str {
        match self {
            TravelMode::Driving => "driving",
            TravelMode::Walking => "walking",
        }
    }
}

impl std::fmt::Display for TravelMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// One directions query.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RouteRequest {
    pub origin: LatLng,
    pub destination: LatLng,
    pub travel_mode: TravelMode,
}

/// A candidate route returned by the routing service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateRoute {
    /// Ordered overview path
    pub path: Vec<LatLng>,

    /// Total reported distance in meters, if the service gave one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance_m: Option<f64>,
}

/// Routing service answer; the first route is the preferred one.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DirectionsResponse {
    pub routes: Vec<CandidateRoute>,
}

impl DirectionsResponse {
    pub fn single(path: Vec<LatLng>, distance_m: Option<f64>) -> Self {
        Self {
            routes: vec![CandidateRoute { path, distance_m }],
        }
    }
}

// =============================================================================
// BACKEND COLLABORATOR
// =============================================================================

/// Battery status as the backend sends it: a packed integer, either as a
/// JSON number or as text (`"133"` or `"0b10000101"`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawBatteryStatus {
    Int(i64),
    Float(f64),
    Text(String),
}

impl std::fmt::Display for RawBatteryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RawBatteryStatus::Int(v) => write!(f, "{}", v),
            RawBatteryStatus::Float(v) => write!(f, "{}", v),
            RawBatteryStatus::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for RawBatteryStatus {
    fn from(value: i64) -> Self {
        RawBatteryStatus::Int(value)
    }
}

impl From<&str> for RawBatteryStatus {
    fn from(value: &str) -> Self {
        RawBatteryStatus::Text(value.to_string())
    }
}

/// One timestamped device observation (poll-log row).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fix {
    /// Device name or part number
    #[serde(rename = "part_name")]
    pub device_label: String,

    /// Observation time as sent by the backend (ISO-8601 or SQL style)
    pub timestamp: String,

    pub latitude: f64,
    pub longitude: f64,

    pub battery_status: RawBatteryStatus,
}

impl Fix {
    pub fn coordinate(&self) -> LatLng {
        LatLng::new(self.latitude, self.longitude)
    }
}

/// Filters for the poll-log endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchLogsParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub part: Option<String>,

    pub limit: u32,
    pub offset: u32,
}

impl Default for FetchLogsParams {
    fn default() -> Self {
        Self {
            start: None,
            end: None,
            part: None,
            limit: 100,
            offset: 0,
        }
    }
}

/// Successful poll-log response body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollLogResponse {
    pub status: String,
    pub count: usize,
    pub data: Vec<Fix>,
}
