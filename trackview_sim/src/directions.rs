//! Simulated routing collaborator with failure injection.

use async_trait::async_trait;
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use trackview_core::geodesy::path_length_meters;
use trackview_env::{
    DirectionsResponse, DirectionsService, EnvError, LatLng, RouteRequest, TrackViewContext,
    TravelMode,
};

use crate::context::SimContext;

/// RNG stream reserved for routing failures.
const DIRECTIONS_STREAM: u64 = 0xD1;

/// Behaviour of one travel mode.
#[derive(Debug, Clone, Copy)]
pub struct ModeProfile {
    /// Probability that a request fails (0.0 - 1.0)
    pub failure_rate: f64,

    /// Routed length relative to the straight line (>= 1.0)
    pub detour: f64,

    /// Virtual time a request takes
    pub latency: Duration,
}

/// Configuration for [`SimDirections`].
#[derive(Debug, Clone, Copy)]
pub struct SimDirectionsConfig {
    pub driving: ModeProfile,
    pub walking: ModeProfile,
}

impl Default for SimDirectionsConfig {
    fn default() -> Self {
        Self {
            driving: ModeProfile {
                failure_rate: 0.0,
                detour: 1.4,
                latency: Duration::from_millis(80),
            },
            walking: ModeProfile {
                failure_rate: 0.0,
                detour: 1.1,
                latency: Duration::from_millis(120),
            },
        }
    }
}

impl SimDirectionsConfig {
    /// Same failure rate for both modes.
    pub fn with_failure_rate(mut self, rate: f64) -> Self {
        self.driving.failure_rate = rate;
        self.walking.failure_rate = rate;
        self
    }
}

/// Counters for one simulated router.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DirectionsStats {
    pub requests: usize,
    pub failures: usize,
}

/// Scripted [`DirectionsService`].
///
/// Every route is origin → bent midpoint → destination, with the bend
/// sized so the path is `detour` times the straight line. Failures are
/// drawn from the context's seeded RNG, so a seed replays the same run.
pub struct SimDirections {
    context: Arc<SimContext>,
    config: SimDirectionsConfig,
    rng: Mutex<ChaCha8Rng>,
    outage: AtomicBool,
    calls: Mutex<Vec<RouteRequest>>,
    stats: Mutex<DirectionsStats>,
}

impl SimDirections {
    pub fn new(context: Arc<SimContext>, config: SimDirectionsConfig) -> Self {
        let rng = context.rng(DIRECTIONS_STREAM);
        Self {
            context,
            config,
            rng: Mutex::new(rng),
            outage: AtomicBool::new(false),
            calls: Mutex::new(Vec::new()),
            stats: Mutex::new(DirectionsStats::default()),
        }
    }

    /// Every request fails while the outage is on.
    pub fn set_outage(&self, on: bool) {
        self.outage.store(on, Ordering::SeqCst);
    }

    /// Requests seen so far, in arrival order.
    pub fn calls(&self) -> Vec<RouteRequest> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn stats(&self) -> DirectionsStats {
        self.stats.lock().map(|s| *s).unwrap_or_default()
    }

    fn profile(&self, mode: TravelMode) -> ModeProfile {
        match mode {
            TravelMode::Driving => self.config.driving,
            TravelMode::Walking => self.config.walking,
        }
    }

    /// Decides the outcome up front so draws happen in request order.
    fn draw_failure(&self, profile: &ModeProfile) -> bool {
        if self.outage.load(Ordering::SeqCst) {
            return true;
        }
        match self.rng.lock() {
            Ok(mut rng) => rng.gen_bool(profile.failure_rate.clamp(0.0, 1.0)),
            Err(_) => true,
        }
    }

    fn record(&self, request: &RouteRequest, failed: bool) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(*request);
        }
        if let Ok(mut stats) = self.stats.lock() {
            stats.requests += 1;
            if failed {
                stats.failures += 1;
            }
        }
    }
}

/// Origin → midpoint → destination with the midpoint pushed sideways so the
/// polyline is `detour` times as long as the chord (in degree space).
pub fn detour_path(origin: LatLng, destination: LatLng, detour: f64) -> Vec<LatLng> {
    let mid = origin.lerp(&destination, 0.5);
    let k = (detour.max(1.0).powi(2) - 1.0).sqrt() / 2.0;
    let (dlat, dlng) = (destination.lat - origin.lat, destination.lng - origin.lng);
    let bend = LatLng::new(mid.lat - dlng * k, mid.lng + dlat * k);
    vec![origin, bend, destination]
}

#[async_trait]
impl DirectionsService for SimDirections {
    async fn route(&self, request: RouteRequest) -> Result<DirectionsResponse, EnvError> {
        let profile = self.profile(request.travel_mode);
        let failed = self.draw_failure(&profile);
        self.record(&request, failed);

        self.context.sleep(profile.latency).await;

        if failed {
            return Err(EnvError::routing(format!(
                "simulated {} failure",
                request.travel_mode
            )));
        }

        let path = detour_path(request.origin, request.destination, profile.detour);
        let distance = path_length_meters(&path);
        Ok(DirectionsResponse::single(path, Some(distance)))
    }
}
