//! Network collaborator abstractions for TrackView engines.

use async_trait::async_trait;
use crate::error::EnvError;
use crate::types::{DirectionsResponse, FetchLogsParams, PollLogResponse, RouteRequest};

/// Abstraction over the external directions service.
///
/// # Implementations
///
/// - **Production**: `OsrmDirections` (HTTP, OSRM route API)
/// - **Simulation**: `SimDirections` with scripted paths and seeded failures
///
/// # Request Flow
///
/// ```text
/// Resolver                  Directions                 Resolver
///   |-- route(driving) ------->|                          |
///   |-- route(walking) ------->|                          |
///   |                          |-- [latency / failure] -->|
///   |                          |                          |-- pick shorter
/// ```
#[async_trait]
pub trait DirectionsService: Send + Sync + 'static {
    /// Requests candidate routes for one origin/destination pair.
    ///
    /// # Returns
    /// * `Ok(response)` - zero or more candidate routes, best first
    /// * `Err(EnvError)` - this request failed; other requests are unaffected
    async fn route(&self, request: RouteRequest) -> Result<DirectionsResponse, EnvError>;
}

/// Abstraction over the backend poll-log API.
#[async_trait]
pub trait LogSource: Send + Sync + 'static {
    /// Fetches one page of poll logs.
    ///
    /// # Returns
    /// * `Ok(response)` - status, row count and rows
    /// * `Err(EnvError::Backend)` - non-2xx answer with the server's message
    /// * `Err(EnvError::Connection)` - the backend could not be reached
    async fn fetch(&self, params: &FetchLogsParams) -> Result<PollLogResponse, EnvError>;
}
