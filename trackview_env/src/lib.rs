//! TrackView Environment Abstraction Layer
//!
//! This crate provides the "Sans-IO" seams that let the TrackView engines
//! run against **Production** collaborators (tokio, HTTP) and against a
//! **Simulation** (virtual clock, scripted services).
//!
//! # Core Concept
//!
//! Everything the route resolver and playback driver cannot compute on
//! their own is intercepted here:
//! - Time (`now()`, `sleep()`)
//! - Routing (`DirectionsService::route()`)
//! - Poll logs (`LogSource::fetch()`)
//! - Cancellation (`CancellationToken`, re-exported from `tokio-util`)
//!
//! # Example
//!
//! ```ignore
//! use trackview_env::{TrackViewContext, DirectionsService};
//!
//! async fn resolve_pairs<Ctx: TrackViewContext, Dir: DirectionsService>(
//!     ctx: &Ctx,
//!     directions: &Dir,
//! ) {
//!     for pair in pairs {
//!         let route = directions.route(pair.request()).await;
//!         ctx.sleep(Duration::from_millis(300)).await;
//!     }
//! }
//! ```

mod context;
mod network;
mod types;
mod error;
mod tokio_impl;

pub use tokio_util::sync::CancellationToken;
pub use context::TrackViewContext;
pub use network::{DirectionsService, LogSource};
pub use types::{
    CandidateRoute, DirectionsResponse, FetchLogsParams, Fix, LatLng, PollLogResponse,
    RawBatteryStatus, RouteRequest, RunId, TravelMode,
};
pub use error::EnvError;
pub use tokio_impl::TokioContext;
