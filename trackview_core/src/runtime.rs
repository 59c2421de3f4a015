//! Dashboard Runtime - orchestrates the engines with environment context.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    DashboardRuntime                         │
//! │  ┌──────────────────────────────────────────────────────┐   │
//! │  │           Context: TrackViewContext                  │   │
//! │  │  • now()   → playback deltas                         │   │
//! │  │  • sleep() → rate limit, frame interval              │   │
//! │  │  • spawn() → background route resolution             │   │
//! │  └──────────────────────────────────────────────────────┘   │
//! │                              │                              │
//! │  ┌─────────┐   fixes   ┌─────────┐  path   ┌────────────┐    │
//! │  │  FEED   │ ────────► │  ROUTE  │ ──────► │  PLAYBACK  │    │
//! │  │LogSource│           │ Session │         │ Controller │    │
//! │  └─────────┘           └─────────┘         └────────────┘    │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! A successful fetch restarts route resolution (cancelling the previous
//! one). The previous path keeps playing until the new run publishes; only
//! then is playback hard-reset.

use h3o::Resolution;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use trackview_env::{DirectionsService, Fix, LatLng, LogSource, TrackViewContext};

use crate::battery::{decode, BatteryReading};
use crate::feed::{FeedQuery, FeedState, LogFeed};
use crate::layers::{self, HeatCell, MapBounds, DEFAULT_HEAT_RESOLUTION};
use crate::playback::{PlaybackConfig, PlaybackController, PlaybackDriver, PlaybackEvent, PlaybackFrame, PlaybackState};
use crate::route::{ResolverConfig, RouteResolver};
use crate::session::{RouteSession, RouteView};

/// Configuration for a dashboard runtime.
#[derive(Debug, Clone)]
pub struct DashboardConfig {
    pub resolver: ResolverConfig,
    pub playback: PlaybackConfig,

    /// Initial filters and page size
    pub query: FeedQuery,

    /// H3 resolution for heat cells (default: 9)
    pub heat_resolution: Resolution,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            resolver: ResolverConfig::default(),
            playback: PlaybackConfig::default(),
            query: FeedQuery::default(),
            heat_resolution: DEFAULT_HEAT_RESOLUTION,
        }
    }
}

/// One table row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableRow {
    pub device: String,
    pub battery: BatteryReading,
    /// `lat, lng` to six decimals
    pub coordinates: String,
    pub timestamp: String,
}

impl TableRow {
    pub fn from_fix(fix: &Fix) -> Self {
        Self {
            device: fix.device_label.clone(),
            battery: decode(&fix.battery_status),
            coordinates: format!("{:.6}, {:.6}", fix.latitude, fix.longitude),
            timestamp: fix.timestamp.clone(),
        }
    }
}

/// Everything the UI needs for one render.
#[derive(Debug, Clone, Serialize)]
pub struct DashboardSnapshot {
    pub feed: FeedState,
    pub rows: Vec<TableRow>,
    /// Fixes drawn as individual markers
    pub markers: Vec<Fix>,
    pub route: RouteView,
    pub playback: PlaybackState,
    pub marker: Option<LatLng>,
    pub heat: Vec<HeatCell>,
    pub bounds: Option<MapBounds>,
    pub center: LatLng,
}

/// Feed, route session and playback bound to one context.
///
/// Generic over the context and collaborator implementations, allowing
/// the same runtime to run in production (tokio + HTTP) or simulation.
pub struct DashboardRuntime<Ctx, Src, Dir>
where
    Ctx: TrackViewContext,
    Src: LogSource,
    Dir: DirectionsService,
{
    context: Arc<Ctx>,
    feed: LogFeed<Src>,
    session: RouteSession<Ctx, Dir>,
    playback: Arc<Mutex<PlaybackController>>,
    /// Generation of the path currently loaded into playback
    loaded_path: AtomicU64,
    config: DashboardConfig,
}

impl<Ctx, Src, Dir> DashboardRuntime<Ctx, Src, Dir>
where
    Ctx: TrackViewContext,
    Src: LogSource,
    Dir: DirectionsService,
{
    pub fn new(context: Arc<Ctx>, source: Arc<Src>, directions: Arc<Dir>, config: DashboardConfig) -> Self {
        let resolver = RouteResolver::new(context.clone(), directions, config.resolver.clone());
        Self {
            context,
            feed: LogFeed::with_query(source, config.query.clone()),
            session: RouteSession::new(resolver),
            playback: Arc::new(Mutex::new(PlaybackController::default())),
            loaded_path: AtomicU64::new(0),
            config,
        }
    }

    pub fn context(&self) -> &Arc<Ctx> {
        &self.context
    }

    pub fn feed(&self) -> &FeedState {
        self.feed.state()
    }

    pub fn route(&self) -> RouteView {
        self.session.view()
    }

    fn controller(&self) -> MutexGuard<'_, PlaybackController> {
        match self.playback.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Reloads the current page; on success restarts route resolution.
    pub async fn refresh(&mut self) -> bool {
        let fetched = self.feed.load().await;
        if fetched {
            self.restart_route();
        }
        fetched
    }

    pub async fn search(&mut self, term: &str) -> bool {
        let fetched = self.feed.search(term).await;
        if fetched {
            self.restart_route();
        }
        fetched
    }

    pub async fn set_window(&mut self, start: Option<String>, end: Option<String>) -> bool {
        let fetched = self.feed.set_window(start, end).await;
        if fetched {
            self.restart_route();
        }
        fetched
    }

    pub async fn page_to(&mut self, offset: u32) -> bool {
        let fetched = self.feed.page_to(offset).await;
        if fetched {
            self.restart_route();
        }
        fetched
    }

    fn restart_route(&mut self) {
        self.session.start(self.feed.logs().to_vec());
        self.sync_playback();
    }

    /// Waits for the current resolution and hands its path to playback.
    pub async fn route_settled(&mut self) -> Option<RouteView> {
        let view = self.session.settled(self.session.generation()).await;
        self.sync_playback();
        view
    }

    /// Hands a newly published path to playback, resetting it.
    pub fn sync_playback(&self) {
        let view = self.session.view();
        let mut ctl = self.controller();
        if self.loaded_path.swap(view.path_generation, Ordering::SeqCst) != view.path_generation {
            ctl.set_path(view.path);
        }
    }

    /// Applies a playback event stamped with the context clock where needed.
    pub fn playback(&self, event: PlaybackEvent) -> PlaybackState {
        self.sync_playback();
        self.controller().apply(event)
    }

    pub fn play(&self) -> PlaybackState {
        self.playback(PlaybackEvent::Play { now: self.context.now() })
    }

    pub fn pause(&self) -> PlaybackState {
        self.playback(PlaybackEvent::Pause)
    }

    pub fn set_speed(&self, speed: f64) -> PlaybackState {
        self.playback(PlaybackEvent::SetSpeed(speed))
    }

    /// Runs the frame loop until playback stops.
    pub async fn animate<F>(&self, on_frame: F) -> PlaybackState
    where
        F: FnMut(&PlaybackFrame),
    {
        let driver = PlaybackDriver::new(self.context.clone(), self.config.playback.clone());
        driver.run(&self.playback, on_frame).await
    }

    pub fn snapshot(&self) -> DashboardSnapshot {
        self.sync_playback();
        let feed = self.feed.state().clone();
        let logs = &feed.logs;
        let (playback, marker) = {
            let ctl = self.controller();
            (ctl.state(), ctl.position())
        };

        DashboardSnapshot {
            rows: logs.iter().map(TableRow::from_fix).collect(),
            markers: layers::marker_fixes(logs).to_vec(),
            route: self.session.view(),
            playback,
            marker,
            heat: layers::heat_cells(logs, self.config.heat_resolution),
            bounds: layers::bounds(logs),
            center: layers::default_center(logs),
            feed,
        }
    }

    /// Cancels background work (teardown).
    pub fn shutdown(&self) {
        self.session.cancel();
        self.controller().apply(PlaybackEvent::Pause);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::playback::PlaybackStatus;
    use async_trait::async_trait;
    use std::time::Duration;
    use trackview_env::{
        DirectionsResponse, EnvError, FetchLogsParams, PollLogResponse, RawBatteryStatus,
        RouteRequest, TokioContext,
    };

    struct FixedSource {
        fail: std::sync::atomic::AtomicBool,
    }

    #[async_trait]
    impl LogSource for FixedSource {
        async fn fetch(&self, _params: &FetchLogsParams) -> Result<PollLogResponse, EnvError> {
            if self.fail.load(std::sync::atomic::Ordering::SeqCst) {
                return Err(EnvError::backend(500, Some("db down".to_string())));
            }
            let data: Vec<Fix> = (0..3)
                .map(|i| Fix {
                    device_label: "tracker-1".to_string(),
                    timestamp: format!("2024-03-01 00:0{}:00", i),
                    latitude: 0.0,
                    longitude: i as f64 * 0.01,
                    battery_status: RawBatteryStatus::Text("0b10000101".to_string()),
                })
                .collect();
            Ok(PollLogResponse {
                status: "success".to_string(),
                count: data.len(),
                data,
            })
        }
    }

    struct Straight;

    #[async_trait]
    impl DirectionsService for Straight {
        async fn route(&self, r: RouteRequest) -> Result<DirectionsResponse, EnvError> {
            Ok(DirectionsResponse::single(vec![r.origin, r.destination], Some(1.0)))
        }
    }

    fn runtime() -> (DashboardRuntime<TokioContext, FixedSource, Straight>, Arc<FixedSource>) {
        let source = Arc::new(FixedSource {
            fail: std::sync::atomic::AtomicBool::new(false),
        });
        let rt = DashboardRuntime::new(
            TokioContext::shared(),
            source.clone(),
            Arc::new(Straight),
            DashboardConfig::default(),
        );
        (rt, source)
    }

    #[test]
    fn test_dashboard_config_default() {
        let config = DashboardConfig::default();
        assert_eq!(config.resolver.rate_limit, Duration::from_millis(300));
        assert_eq!(config.query.limit, 100);
        assert_eq!(config.heat_resolution, Resolution::Nine);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_routes_and_plays() {
        let (mut rt, _) = runtime();
        assert!(rt.refresh().await);

        let view = rt.route_settled().await.expect("route completes");
        assert_eq!(view.segments.len(), 2);

        let snap = rt.snapshot();
        assert_eq!(snap.rows.len(), 3);
        assert_eq!(snap.markers.len(), 3);
        assert_eq!(snap.heat.len(), 3);
        assert!(snap.bounds.is_some());
        assert_eq!(snap.rows[0].battery.label, "Critical (5%) ⚡");
        assert_eq!(snap.rows[1].coordinates, "0.000000, 0.010000");
        assert_eq!(snap.playback.path_len, 3);
        assert_eq!(snap.marker, Some(LatLng::new(0.0, 0.0)));

        assert!(rt.play().is_animating());
        let end = rt.animate(|_| {}).await;
        assert_eq!(end.status, PlaybackStatus::Finished);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_refresh_keeps_route_and_rows() {
        let (mut rt, source) = runtime();
        rt.refresh().await;
        let before = rt.route_settled().await.expect("route completes");

        source.fail.store(true, std::sync::atomic::Ordering::SeqCst);
        assert!(!rt.refresh().await);

        let snap = rt.snapshot();
        assert_eq!(snap.feed.error.as_deref(), Some("db down"));
        assert_eq!(snap.rows.len(), 3);
        assert_eq!(snap.route, before);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_keeps_playing_until_new_path() {
        let (mut rt, _) = runtime();
        rt.refresh().await;
        rt.route_settled().await.expect("route completes");
        rt.play();
        rt.playback(PlaybackEvent::Seek(1.0));

        assert!(rt.refresh().await);
        let snap = rt.snapshot();
        assert_eq!(snap.playback.status, PlaybackStatus::Playing);
        assert_eq!(snap.playback.index, 1.0);
        assert_eq!(snap.route.path.len(), 3);
        assert!(snap.route.segments.is_empty());
        assert!(snap.marker.is_some());

        let view = rt.route_settled().await.expect("second route completes");
        assert_eq!(view.path_generation, 2);
        let state = rt.playback(PlaybackEvent::Pause);
        assert_eq!(state.status, PlaybackStatus::Idle);
        assert_eq!(state.index, 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_mid_resolution_keeps_published_path() {
        let (mut rt, _) = runtime();
        rt.refresh().await;
        let first = rt.route_settled().await.expect("route completes");

        assert!(rt.refresh().await);
        rt.shutdown();
        assert_eq!(rt.route_settled().await, None);

        let snap = rt.snapshot();
        assert_eq!(snap.route.path, first.path);
        assert_eq!(snap.playback.path_len, 3);
    }
}
