//! The ROUTE engine: turns noisy fixes into routed, stitched paths.
//!
//! ```text
//! fixes ──sort──► filter(50 m) ──► pairs ──► [driving ‖ walking] ──► pick ──► stitch
//!                                    │            (per pair, sequential,        │
//!                                    │             300 ms apart)                ▼
//!                                    └──────────── RouteSegment per pair ─► ConcatenatedPath
//! ```
//!
//! Pairs are resolved one at a time to stay under the routing service's
//! rate limit. The two travel-mode requests of a pair run concurrently and
//! settle independently. Every externally visible write is preceded by a
//! cancellation check, and the waits (requests, rate limit) race the token.

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use trackview_env::{
    CancellationToken, DirectionsResponse, DirectionsService, EnvError, Fix, LatLng, RouteRequest,
    RunId, TrackViewContext, TravelMode,
};

use crate::fixes::{filtered_sequence, MIN_SEPARATION_M};

/// Tuning for the resolver.
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// Fixes closer than this to the last kept fix are dropped (default: 50 m)
    pub min_separation_m: f64,

    /// Pause between consecutive pairs (default: 300 ms)
    pub rate_limit: Duration,

    /// Joint dedup tolerance on both axes, degrees (default: 0.0001)
    pub dedup_epsilon_deg: f64,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            min_separation_m: MIN_SEPARATION_M,
            rate_limit: Duration::from_millis(300),
            dedup_epsilon_deg: 1e-4,
        }
    }
}

/// Where a segment's geometry came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentSource {
    Routed(TravelMode),
    /// Both travel modes failed
    StraightLine,
}

/// Routed path between two consecutive retained fixes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouteSegment {
    /// Position of the pair in the filtered sequence
    pub index: usize,
    pub path: Vec<LatLng>,
    /// `hsl(<hue>, 80%, 50%)`
    pub color: String,
    pub source: SegmentSource,
}

/// Result of a completed resolution.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct ResolvedRoute {
    /// Segments in index order
    pub segments: Vec<RouteSegment>,
    pub path: Vec<LatLng>,
}

impl ResolvedRoute {
    /// Number of segments that fell back to a straight line.
    pub fn degraded_count(&self) -> usize {
        self.segments
            .iter()
            .filter(|s| s.source == SegmentSource::StraightLine)
            .count()
    }
}

/// Outcome of one resolution run.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// Fewer than two usable fixes; nothing was requested
    Empty,
    Complete(ResolvedRoute),
    /// Superseded or torn down before the path was published
    Cancelled,
}

/// Receives incremental results. Calls only happen while the run's token
/// is live.
pub trait RouteObserver: Send {
    fn segment_resolved(&mut self, segment: &RouteSegment);
    fn path_resolved(&mut self, path: &[LatLng]);
}

impl RouteObserver for () {
    fn segment_resolved(&mut self, _segment: &RouteSegment) {}
    fn path_resolved(&mut self, _path: &[LatLng]) {}
}

// =============================================================================
// PURE HELPERS
// =============================================================================

/// Hue for segment `index` of `total`: 240 at the first, 0 at the last.
pub fn segment_hue(index: usize, total: usize) -> f64 {
    let span = total.saturating_sub(1).max(1) as f64;
    240.0 * (1.0 - index as f64 / span)
}

pub fn segment_color(index: usize, total: usize) -> String {
    format!("hsl({}, 80%, 50%)", segment_hue(index, total))
}

/// Reported distance with missing, zero or non-finite treated as infinite.
fn effective_distance(route: &trackview_env::CandidateRoute) -> f64 {
    match route.distance_m {
        Some(d) if d.is_finite() && d > 0.0 => d,
        _ => f64::INFINITY,
    }
}

/// Picks the segment geometry from the two settled requests.
///
/// Both succeeded: shorter reported distance wins, ties go to driving.
/// One succeeded: that one. None: straight `[start, end]`. A response with
/// no candidate routes counts as a failure.
pub fn select_path(
    driving: &Result<DirectionsResponse, EnvError>,
    walking: &Result<DirectionsResponse, EnvError>,
    start: LatLng,
    end: LatLng,
) -> (Vec<LatLng>, SegmentSource) {
    let first = |r: &Result<DirectionsResponse, EnvError>| {
        r.as_ref().ok().and_then(|resp| resp.routes.first()).cloned()
    };

    match (first(driving), first(walking)) {
        (Some(d), Some(w)) => {
            if effective_distance(&d) <= effective_distance(&w) {
                (d.path, SegmentSource::Routed(TravelMode::Driving))
            } else {
                (w.path, SegmentSource::Routed(TravelMode::Walking))
            }
        }
        (Some(d), None) => (d.path, SegmentSource::Routed(TravelMode::Driving)),
        (None, Some(w)) => (w.path, SegmentSource::Routed(TravelMode::Walking)),
        (None, None) => (vec![start, end], SegmentSource::StraightLine),
    }
}

/// Appends `segment` to `accumulated`, skipping its first point when it
/// duplicates the current tail within `epsilon_deg` on both axes.
pub fn stitch(accumulated: &mut Vec<LatLng>, segment: &[LatLng], epsilon_deg: f64) {
    let Some(first) = segment.first() else {
        return;
    };
    let skip_first = accumulated
        .last()
        .map_or(false, |last| last.near(first, epsilon_deg));
    let rest = if skip_first { &segment[1..] } else { segment };
    accumulated.extend_from_slice(rest);
}

// =============================================================================
// RESOLVER
// =============================================================================

/// Sequential, cancellable route resolver.
///
/// Generic over the context and directions implementations so the same
/// code runs against tokio + HTTP and against the simulation harness.
pub struct RouteResolver<Ctx, Dir>
where
    Ctx: TrackViewContext,
    Dir: DirectionsService,
{
    context: Arc<Ctx>,
    directions: Arc<Dir>,
    config: ResolverConfig,
}

impl<Ctx, Dir> Clone for RouteResolver<Ctx, Dir>
where
    Ctx: TrackViewContext,
    Dir: DirectionsService,
{
    fn clone(&self) -> Self {
        Self {
            context: Arc::clone(&self.context),
            directions: Arc::clone(&self.directions),
            config: self.config.clone(),
        }
    }
}

impl<Ctx, Dir> RouteResolver<Ctx, Dir>
where
    Ctx: TrackViewContext,
    Dir: DirectionsService,
{
    pub fn new(context: Arc<Ctx>, directions: Arc<Dir>, config: ResolverConfig) -> Self {
        Self {
            context,
            directions,
            config,
        }
    }

    pub fn context(&self) -> &Arc<Ctx> {
        &self.context
    }

    /// Resolves `fixes` into segments and a concatenated path.
    ///
    /// Segments are handed to `observer` as each pair settles. The token is
    /// checked before each pair, before each segment is published and
    /// before the final path; in-flight requests and the rate-limit pause
    /// are abandoned as soon as it fires. Once raised nothing more is
    /// published.
    pub async fn resolve<O: RouteObserver>(
        &self,
        fixes: &[Fix],
        token: &CancellationToken,
        observer: &mut O,
    ) -> Resolution {
        let run = RunId::new();

        if fixes.len() < 2 {
            return Resolution::Empty;
        }

        let filtered = filtered_sequence(fixes, self.config.min_separation_m);
        if filtered.len() < 2 {
            debug!(%run, input = fixes.len(), "fewer than two fixes survive the separation filter");
            return Resolution::Empty;
        }

        let points: Vec<LatLng> = filtered.iter().map(Fix::coordinate).collect();
        let total = points.len() - 1;
        debug!(%run, fixes = fixes.len(), retained = points.len(), segments = total, "resolving route");

        let mut segments = Vec::with_capacity(total);
        let mut accumulated = vec![points[0]];

        for (index, pair) in points.windows(2).enumerate() {
            if token.is_cancelled() {
                debug!(%run, index, "cancelled before pair");
                return Resolution::Cancelled;
            }

            let (start, end) = (pair[0], pair[1]);
            let color = segment_color(index, total);

            let requests = async {
                tokio::join!(
                    self.request(start, end, TravelMode::Driving),
                    self.request(start, end, TravelMode::Walking),
                )
            };
            let (driving, walking) = tokio::select! {
                biased;
                _ = token.cancelled() => {
                    debug!(%run, index, "cancelled while routing, dropping requests");
                    return Resolution::Cancelled;
                }
                settled = requests => settled,
            };

            for (mode, result) in [(TravelMode::Driving, &driving), (TravelMode::Walking, &walking)] {
                if let Err(e) = result {
                    debug!(%run, index, %mode, error = %e, "routing request failed");
                }
            }

            let (path, source) = select_path(&driving, &walking, start, end);
            if source == SegmentSource::StraightLine {
                warn!(%run, index, "both travel modes failed, using straight line");
            }

            if token.is_cancelled() {
                debug!(%run, index, "cancelled while routing, discarding segment");
                return Resolution::Cancelled;
            }

            let segment = RouteSegment {
                index,
                path,
                color,
                source,
            };
            observer.segment_resolved(&segment);
            stitch(&mut accumulated, &segment.path, self.config.dedup_epsilon_deg);
            segments.push(segment);

            if index + 1 < total {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => {
                        debug!(%run, index, "cancelled during rate limit");
                        return Resolution::Cancelled;
                    }
                    _ = self.context.sleep(self.config.rate_limit) => {}
                }
            }
        }

        if token.is_cancelled() {
            debug!(%run, "cancelled before publishing path");
            return Resolution::Cancelled;
        }

        observer.path_resolved(&accumulated);

        let resolved = ResolvedRoute {
            segments,
            path: accumulated,
        };
        info!(
            %run,
            segments = resolved.segments.len(),
            points = resolved.path.len(),
            degraded = resolved.degraded_count(),
            "route resolved"
        );
        Resolution::Complete(resolved)
    }

    async fn request(
        &self,
        origin: LatLng,
        destination: LatLng,
        travel_mode: TravelMode,
    ) -> Result<DirectionsResponse, EnvError> {
        self.directions
            .route(RouteRequest {
                origin,
                destination,
                travel_mode,
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::time::SystemTime;
    use tokio::sync::Notify;
    use trackview_env::{CandidateRoute, RawBatteryStatus};

    /// Context whose sleep returns immediately and records the request.
    #[derive(Default)]
    struct InstantContext {
        sleeps: Mutex<Vec<Duration>>,
    }

    #[async_trait]
    impl TrackViewContext for InstantContext {
        fn now(&self) -> Duration {
            Duration::ZERO
        }
        fn system_time(&self) -> SystemTime {
            SystemTime::UNIX_EPOCH
        }
        async fn sleep(&self, duration: Duration) {
            self.sleeps.lock().unwrap().push(duration);
        }
        fn spawn<F>(&self, _name: &str, future: F)
        where
            F: std::future::Future<Output = ()> + Send + 'static,
        {
            tokio::spawn(future);
        }
        fn seed(&self) -> u64 {
            0
        }
    }

    /// Context whose sleep never finishes; signals once a sleep begins.
    #[derive(Default)]
    struct StalledContext {
        sleeping: Notify,
    }

    #[async_trait]
    impl TrackViewContext for StalledContext {
        fn now(&self) -> Duration {
            Duration::ZERO
        }
        fn system_time(&self) -> SystemTime {
            SystemTime::UNIX_EPOCH
        }
        async fn sleep(&self, _duration: Duration) {
            self.sleeping.notify_one();
            std::future::pending::<()>().await;
        }
        fn spawn<F>(&self, _name: &str, future: F)
        where
            F: std::future::Future<Output = ()> + Send + 'static,
        {
            tokio::spawn(future);
        }
        fn seed(&self) -> u64 {
            0
        }
    }

    /// Each travel mode answers only once the other has been issued.
    #[derive(Default)]
    struct RendezvousDirections {
        driving_issued: Notify,
        walking_issued: Notify,
    }

    #[async_trait]
    impl DirectionsService for RendezvousDirections {
        async fn route(&self, request: RouteRequest) -> Result<DirectionsResponse, EnvError> {
            let (mine, other) = match request.travel_mode {
                TravelMode::Driving => (&self.driving_issued, &self.walking_issued),
                TravelMode::Walking => (&self.walking_issued, &self.driving_issued),
            };
            mine.notify_one();
            other.notified().await;
            Ok(DirectionsResponse::single(
                vec![request.origin, request.destination],
                Some(1.0),
            ))
        }
    }

    /// Directions stub: driving detours via a midpoint, walking goes direct.
    struct StubDirections {
        driving: Option<f64>,
        walking: Option<f64>,
        calls: Mutex<Vec<RouteRequest>>,
        cancel_on_call: Option<(usize, CancellationToken)>,
    }

    impl StubDirections {
        fn new(driving: Option<f64>, walking: Option<f64>) -> Self {
            Self {
                driving,
                walking,
                calls: Mutex::new(Vec::new()),
                cancel_on_call: None,
            }
        }
    }

    #[async_trait]
    impl DirectionsService for StubDirections {
        async fn route(&self, request: RouteRequest) -> Result<DirectionsResponse, EnvError> {
            let n = {
                let mut calls = self.calls.lock().unwrap();
                calls.push(request);
                calls.len()
            };
            if let Some((at, token)) = &self.cancel_on_call {
                if n == *at {
                    token.cancel();
                }
            }
            let (o, d) = (request.origin, request.destination);
            match request.travel_mode {
                TravelMode::Driving => match self.driving {
                    Some(dist) => {
                        let mid = LatLng::new(o.lat + 0.001, (o.lng + d.lng) / 2.0);
                        Ok(DirectionsResponse::single(vec![o, mid, d], Some(dist)))
                    }
                    None => Err(EnvError::routing("ZERO_RESULTS")),
                },
                TravelMode::Walking => match self.walking {
                    Some(dist) => Ok(DirectionsResponse::single(vec![o, d], Some(dist))),
                    None => Err(EnvError::routing("ZERO_RESULTS")),
                },
            }
        }
    }

    #[derive(Default)]
    struct Recorder {
        segments: Vec<RouteSegment>,
        paths: Vec<Vec<LatLng>>,
    }

    impl RouteObserver for Recorder {
        fn segment_resolved(&mut self, segment: &RouteSegment) {
            self.segments.push(segment.clone());
        }
        fn path_resolved(&mut self, path: &[LatLng]) {
            self.paths.push(path.to_vec());
        }
    }

    fn fix(minute: u32, lat: f64, lng: f64) -> Fix {
        Fix {
            device_label: "tracker".to_string(),
            timestamp: format!("2024-03-01T00:{:02}:00Z", minute),
            latitude: lat,
            longitude: lng,
            battery_status: RawBatteryStatus::Int(80),
        }
    }

    fn resolver(dir: StubDirections) -> (RouteResolver<InstantContext, StubDirections>, Arc<InstantContext>, Arc<StubDirections>) {
        let ctx = Arc::new(InstantContext::default());
        let dir = Arc::new(dir);
        (
            RouteResolver::new(ctx.clone(), dir.clone(), ResolverConfig::default()),
            ctx,
            dir,
        )
    }

    #[test]
    fn test_segment_hue_endpoints() {
        assert_eq!(segment_hue(0, 1), 240.0);
        assert_eq!(segment_hue(0, 3), 240.0);
        assert_eq!(segment_hue(1, 3), 120.0);
        assert_eq!(segment_hue(2, 3), 0.0);
        assert_eq!(segment_color(0, 1), "hsl(240, 80%, 50%)");
    }

    #[test]
    fn test_select_prefers_shorter_and_ties_to_driving() {
        let a = LatLng::new(0.0, 0.0);
        let b = LatLng::new(0.0, 0.01);
        let d = Ok(DirectionsResponse::single(vec![a, b], Some(900.0)));
        let w = Ok(DirectionsResponse::single(vec![a, a, b], Some(800.0)));
        assert_eq!(select_path(&d, &w, a, b).1, SegmentSource::Routed(TravelMode::Walking));

        let w_tie = Ok(DirectionsResponse::single(vec![a, b], Some(900.0)));
        assert_eq!(select_path(&d, &w_tie, a, b).1, SegmentSource::Routed(TravelMode::Driving));
    }

    #[test]
    fn test_select_missing_distance_is_infinite() {
        let a = LatLng::new(0.0, 0.0);
        let b = LatLng::new(0.0, 0.01);
        let d = Ok(DirectionsResponse {
            routes: vec![CandidateRoute { path: vec![a, b], distance_m: None }],
        });
        let w = Ok(DirectionsResponse::single(vec![a, b], Some(5_000.0)));
        assert_eq!(select_path(&d, &w, a, b).1, SegmentSource::Routed(TravelMode::Walking));
    }

    #[test]
    fn test_select_fallbacks() {
        let a = LatLng::new(0.0, 0.0);
        let b = LatLng::new(0.0, 0.01);
        let ok = || Ok(DirectionsResponse::single(vec![a, b], Some(1.0)));
        let err = || Err(EnvError::routing("down"));
        let empty = || Ok(DirectionsResponse::default());

        assert_eq!(select_path(&ok(), &err(), a, b).1, SegmentSource::Routed(TravelMode::Driving));
        assert_eq!(select_path(&err(), &ok(), a, b).1, SegmentSource::Routed(TravelMode::Walking));
        assert_eq!(select_path(&empty(), &ok(), a, b).1, SegmentSource::Routed(TravelMode::Walking));

        let (path, source) = select_path(&err(), &empty(), a, b);
        assert_eq!(source, SegmentSource::StraightLine);
        assert_eq!(path, vec![a, b]);
    }

    #[test]
    fn test_stitch_skips_duplicate_joint() {
        let mut acc = vec![LatLng::new(0.0, 0.0)];
        stitch(&mut acc, &[LatLng::new(0.00005, 0.0), LatLng::new(0.0, 0.01)], 1e-4);
        assert_eq!(acc.len(), 2);

        stitch(&mut acc, &[LatLng::new(0.0, 0.0102), LatLng::new(0.0, 0.02)], 1e-4);
        assert_eq!(acc.len(), 4);

        stitch(&mut acc, &[], 1e-4);
        assert_eq!(acc.len(), 4);
    }

    #[tokio::test]
    async fn test_single_fix_makes_no_requests() {
        let (resolver, _, dir) = resolver(StubDirections::new(Some(1.0), Some(1.0)));
        let out = resolver
            .resolve(&[fix(0, 0.0, 0.0)], &CancellationToken::new(), &mut ())
            .await;
        assert_eq!(out, Resolution::Empty);
        assert!(dir.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_close_fixes_resolve_empty() {
        let (resolver, _, dir) = resolver(StubDirections::new(Some(1.0), Some(1.0)));
        let fixes = [fix(0, 48.8566, 2.3522), fix(1, 48.8566, 2.3525)];
        let mut rec = Recorder::default();
        let out = resolver.resolve(&fixes, &CancellationToken::new(), &mut rec).await;
        assert_eq!(out, Resolution::Empty);
        assert!(rec.segments.is_empty());
        assert!(rec.paths.is_empty());
        assert!(dir.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_two_far_fixes_one_blue_segment() {
        let (resolver, ctx, dir) = resolver(StubDirections::new(Some(1_500.0), Some(1_200.0)));
        let fixes = [fix(1, 0.0, 0.01), fix(0, 0.0, 0.0)];
        let mut rec = Recorder::default();

        let Resolution::Complete(route) = resolver.resolve(&fixes, &CancellationToken::new(), &mut rec).await else {
            panic!("expected a complete route");
        };

        assert_eq!(route.segments.len(), 1);
        assert_eq!(route.segments[0].color, "hsl(240, 80%, 50%)");
        assert_eq!(route.segments[0].source, SegmentSource::Routed(TravelMode::Walking));
        // Requests were issued in timestamp order.
        let calls = dir.calls.lock().unwrap();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].origin, LatLng::new(0.0, 0.0));
        // No delay after the last pair.
        assert!(ctx.sleeps.lock().unwrap().is_empty());
        assert_eq!(route.path, vec![LatLng::new(0.0, 0.0), LatLng::new(0.0, 0.01)]);
        assert_eq!(rec.paths, vec![route.path.clone()]);
    }

    #[tokio::test]
    async fn test_rate_limit_between_pairs() {
        let (resolver, ctx, _) = resolver(StubDirections::new(Some(1.0), None));
        let fixes = [fix(0, 0.0, 0.0), fix(1, 0.0, 0.01), fix(2, 0.0, 0.02), fix(3, 0.0, 0.03)];
        let Resolution::Complete(route) = resolver.resolve(&fixes, &CancellationToken::new(), &mut ()).await else {
            panic!("expected a complete route");
        };

        assert_eq!(route.segments.len(), 3);
        assert_eq!(*ctx.sleeps.lock().unwrap(), vec![Duration::from_millis(300); 2]);

        // Driving paths have a midpoint; joints are deduplicated.
        assert_eq!(route.path.len(), 1 + 3 * 2);
        for w in route.path.windows(2) {
            assert!(!w[0].near(&w[1], 1e-4));
        }
        let hues: Vec<&str> = route.segments.iter().map(|s| s.color.as_str()).collect();
        assert_eq!(hues, vec!["hsl(240, 80%, 50%)", "hsl(120, 80%, 50%)", "hsl(0, 80%, 50%)"]);
    }

    #[tokio::test]
    async fn test_total_failure_degrades_to_straight_lines() {
        let (resolver, _, _) = resolver(StubDirections::new(None, None));
        let fixes = [fix(0, 0.0, 0.0), fix(1, 0.0, 0.01), fix(2, 0.0, 0.02)];
        let Resolution::Complete(route) = resolver.resolve(&fixes, &CancellationToken::new(), &mut ()).await else {
            panic!("expected a complete route");
        };
        assert_eq!(route.degraded_count(), 2);
        assert_eq!(
            route.path,
            vec![LatLng::new(0.0, 0.0), LatLng::new(0.0, 0.01), LatLng::new(0.0, 0.02)]
        );
    }

    #[tokio::test]
    async fn test_cancel_mid_run_publishes_no_path() {
        let token = CancellationToken::new();
        let mut dir = StubDirections::new(Some(1.0), Some(2.0));
        // Raised during the second pair's requests.
        dir.cancel_on_call = Some((3, token.clone()));
        let (resolver, _, dir) = resolver(dir);

        let fixes = [fix(0, 0.0, 0.0), fix(1, 0.0, 0.01), fix(2, 0.0, 0.02), fix(3, 0.0, 0.03)];
        let mut rec = Recorder::default();
        let out = resolver.resolve(&fixes, &token, &mut rec).await;

        assert_eq!(out, Resolution::Cancelled);
        assert_eq!(rec.segments.len(), 1);
        assert!(rec.paths.is_empty());
        // Third pair was never requested.
        assert_eq!(dir.calls.lock().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_pre_cancelled_token_requests_nothing() {
        let (resolver, _, dir) = resolver(StubDirections::new(Some(1.0), Some(1.0)));
        let token = CancellationToken::new();
        token.cancel();
        let out = resolver
            .resolve(&[fix(0, 0.0, 0.0), fix(1, 0.0, 0.01)], &token, &mut ())
            .await;
        assert_eq!(out, Resolution::Cancelled);
        assert!(dir.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_travel_modes_are_in_flight_together() {
        let resolver = RouteResolver::new(
            Arc::new(InstantContext::default()),
            Arc::new(RendezvousDirections::default()),
            ResolverConfig::default(),
        );
        let fixes = [fix(0, 0.0, 0.0), fix(1, 0.0, 0.01)];

        // Issuing the modes one after the other never completes.
        let out = tokio::time::timeout(
            Duration::from_secs(5),
            resolver.resolve(&fixes, &CancellationToken::new(), &mut ()),
        )
        .await
        .expect("driving and walking requests overlap");

        let Resolution::Complete(route) = out else {
            panic!("expected a complete route");
        };
        assert_eq!(route.segments.len(), 1);
    }

    #[tokio::test]
    async fn test_cancel_interrupts_rate_limit() {
        let ctx = Arc::new(StalledContext::default());
        let dir = Arc::new(StubDirections::new(Some(1.0), Some(2.0)));
        let resolver = RouteResolver::new(ctx.clone(), dir.clone(), ResolverConfig::default());
        let token = CancellationToken::new();

        let run = {
            let token = token.clone();
            tokio::spawn(async move {
                let fixes = [fix(0, 0.0, 0.0), fix(1, 0.0, 0.01), fix(2, 0.0, 0.02)];
                let mut rec = Recorder::default();
                let out = resolver.resolve(&fixes, &token, &mut rec).await;
                (out, rec)
            })
        };

        ctx.sleeping.notified().await;
        token.cancel();

        let (out, rec) = tokio::time::timeout(Duration::from_secs(5), run)
            .await
            .expect("cancellation ends the pause")
            .unwrap();
        assert_eq!(out, Resolution::Cancelled);
        assert_eq!(rec.segments.len(), 1);
        assert!(rec.paths.is_empty());
        // The second pair was never requested.
        assert_eq!(dir.calls.lock().unwrap().len(), 2);
    }
}
