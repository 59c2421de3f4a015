//! TrackView Core - Route reconstruction and playback for location-tracker telemetry
//!
//! This library turns a page of GPS fixes into something a map can show:
//! 1. **Battery**: decodes the packed charging flag + percentage byte
//! 2. **Route**: routes every consecutive pair of fixes by driving and walking,
//!    keeps the shorter, and stitches the winners into one path
//! 3. **Playback**: animates a marker along that path at a chosen speed
//!
//! All time, routing and log access goes through `trackview_env`, so the same
//! engines run against tokio + HTTP or inside the deterministic simulator.

pub mod battery;
pub mod feed;
pub mod fixes;
pub mod geodesy;
pub mod layers;
pub mod playback;
pub mod route;
pub mod runtime;
pub mod session;

#[cfg(feature = "http")]
pub mod backend;
#[cfg(feature = "http")]
pub mod osrm;

// Re-export key types for convenience
pub use battery::{decode as decode_battery, BatteryLevel, BatteryReading};
pub use feed::{FeedQuery, FeedState, LogFeed, Page};
pub use fixes::{filtered_sequence, parse_timestamp, MIN_SEPARATION_M};
pub use geodesy::{distance_between, distance_meters, path_length_meters};
pub use layers::{HeatCell, MapBounds};
pub use playback::{
    PlaybackConfig, PlaybackController, PlaybackDriver, PlaybackEvent, PlaybackFrame,
    PlaybackState, PlaybackStatus,
};
pub use route::{
    Resolution, ResolvedRoute, ResolverConfig, RouteObserver, RouteResolver, RouteSegment,
    SegmentSource,
};
pub use runtime::{DashboardConfig, DashboardRuntime, DashboardSnapshot, TableRow};
pub use session::{RouteSession, RouteView};

#[cfg(feature = "http")]
pub use backend::HttpLogSource;
#[cfg(feature = "http")]
pub use osrm::OsrmDirections;
