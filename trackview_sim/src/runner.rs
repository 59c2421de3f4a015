//! Scenario runner - executes deterministic route and playback scenarios.

use crate::context::SimContext;
use crate::directions::{SimDirections, SimDirectionsConfig};
use crate::exporter::RouteExport;
use crate::scenarios::ScenarioId;
use crate::source::SimLogSource;
use crate::trace::{Trace, TraceConfig, TraceGenerator};

use rand::seq::SliceRandom;
use serde::Serialize;
use std::sync::Arc;
use trackview_core::fixes::{filtered_sequence, MIN_SEPARATION_M};
use trackview_core::{
    DashboardConfig, DashboardRuntime, PlaybackEvent, PlaybackFrame, PlaybackStatus, Resolution,
    ResolverConfig, RouteResolver, RouteSession, RouteView, SegmentSource, TableRow,
};
use trackview_env::{CancellationToken, EnvError, Fix, LatLng, TrackViewContext};
use tracing::{debug, info, warn};

/// RNG streams, one per consumer so they never shift each other.
const TRACE_STREAM: u64 = 0x71;
const ALT_TRACE_STREAM: u64 = 0x72;
const SHUFFLE_STREAM: u64 = 0x73;

/// Every n-th playback frame goes into the export.
const EXPORT_FRAME_STRIDE: usize = 10;

type SimRuntime = DashboardRuntime<SimContext, SimLogSource, SimDirections>;

/// Results from running a scenario.
#[derive(Debug, Clone)]
pub struct ScenarioResult {
    /// Scenario that was run
    pub scenario: ScenarioId,

    /// Seed used
    pub seed: u64,

    /// Whether scenario passed all assertions
    pub passed: bool,

    /// Failure message if any
    pub failure_reason: Option<String>,

    /// Metrics collected during run
    pub metrics: ScenarioMetrics,

    /// Route and frames, when export was requested
    pub export: Option<RouteExport>,
}

/// Metrics collected during scenario execution.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScenarioMetrics {
    /// Fixes handed to the resolver
    pub fixes: usize,

    /// Fixes left after sorting and the separation filter
    pub retained: usize,

    pub segments: usize,

    /// Segments that fell back to a straight line
    pub degraded: usize,

    pub path_points: usize,

    pub router_requests: usize,
    pub router_failures: usize,

    /// Playback frames emitted
    pub frames: usize,

    /// Virtual time consumed (ms)
    pub virtual_time_ms: u64,
}

/// Collected assertion failures.
#[derive(Debug, Default)]
struct Checks {
    failures: Vec<String>,
}

impl Checks {
    fn check(&mut self, ok: bool, message: impl Into<String>) {
        if !ok {
            let message = message.into();
            warn!("check failed: {}", message);
            self.failures.push(message);
        }
    }

    fn reason(&self) -> Option<String> {
        (!self.failures.is_empty()).then(|| self.failures.join("; "))
    }
}

/// What a playback run produced.
#[derive(Debug, Default)]
struct PlaybackRun {
    frames: usize,
    sampled: Vec<PlaybackFrame>,
}

/// Runs scenarios.
pub struct ScenarioRunner {
    /// Configuration seed
    seed: u64,

    /// Shape of the generated tracker trace
    trace: TraceConfig,

    /// Playback speed multiplier
    playback_speed: f64,

    /// Keep route and frames for export
    export: bool,
}

impl ScenarioRunner {
    /// Creates a new scenario runner.
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            trace: TraceConfig::default(),
            playback_speed: 1.0,
            export: false,
        }
    }

    /// Sets the number of fixes per trace.
    pub fn with_fixes(mut self, fixes: usize) -> Self {
        self.trace.fixes = fixes;
        self
    }

    /// Sets the playback speed.
    pub fn with_speed(mut self, speed: f64) -> Self {
        self.playback_speed = speed;
        self
    }

    /// Keeps route and frames in the result.
    pub fn with_export(mut self, export: bool) -> Self {
        self.export = export;
        self
    }

    /// Runs a scenario and returns the result.
    pub async fn run(&self, scenario: ScenarioId) -> ScenarioResult {
        info!("Starting scenario: {} (seed={})", scenario.name(), self.seed);

        match scenario {
            ScenarioId::Commute => self.run_commute().await,
            ScenarioId::FlakyRouter => self.run_flaky_router().await,
            ScenarioId::RouterOutage => self.run_router_outage().await,
            ScenarioId::Parked => self.run_parked().await,
            ScenarioId::Supersede => self.run_supersede().await,
            ScenarioId::Teardown => self.run_teardown().await,
            ScenarioId::BackendDown => self.run_backend_down().await,
            ScenarioId::ShuffledPage => self.run_shuffled_page().await,
        }
    }

    // =========================================================================
    // SCENARIOS
    // =========================================================================

    /// TV-001: Healthy router, moving tracker.
    async fn run_commute(&self) -> ScenarioResult {
        let context = SimContext::shared(self.seed);
        let trace = self.trace(&context, TRACE_STREAM, self.trace.clone());
        let (mut runtime, _source, directions) =
            self.dashboard(&context, trace.newest_first(), SimDirectionsConfig::default());

        let mut checks = Checks::default();
        checks.check(runtime.refresh().await, "initial fetch failed");

        let view = runtime.route_settled().await;
        checks.check(view.is_some(), "route never settled");
        let view = view.unwrap_or_default();
        check_route(&mut checks, &trace.fixes, &view);
        checks.check(
            view.segments.iter().all(|s| s.source != SegmentSource::StraightLine),
            "healthy router produced straight-line segments",
        );

        // Each pair asks for both travel modes before the next pair starts.
        let calls = directions.calls();
        checks.check(
            calls.len() == 2 * view.segments.len(),
            format!("{} router calls for {} segments", calls.len(), view.segments.len()),
        );
        checks.check(
            calls.chunks(2).all(|pair| {
                pair.len() == 2
                    && pair[0].origin == pair[1].origin
                    && pair[0].destination == pair[1].destination
                    && pair[0].travel_mode != pair[1].travel_mode
            }),
            "pair requests were not issued as a driving/walking fan-out",
        );

        let playback = self.play(&runtime, &mut checks).await;
        self.finish(ScenarioId::Commute, &context, &directions, &trace.fixes, view, playback, checks)
    }

    /// TV-002: Each travel mode fails 30% of the time.
    async fn run_flaky_router(&self) -> ScenarioResult {
        let context = SimContext::shared(self.seed);
        let trace = self.trace(&context, TRACE_STREAM, self.trace.clone());
        let (mut runtime, _source, directions) = self.dashboard(
            &context,
            trace.newest_first(),
            SimDirectionsConfig::default().with_failure_rate(0.3),
        );

        let mut checks = Checks::default();
        runtime.refresh().await;
        let view = runtime.route_settled().await.unwrap_or_default();
        check_route(&mut checks, &trace.fixes, &view);

        let retained = retained_points(&trace.fixes);
        for segment in &view.segments {
            if segment.source == SegmentSource::StraightLine {
                let expected = retained.get(segment.index..segment.index + 2);
                checks.check(
                    expected == Some(segment.path.as_slice()),
                    format!("segment {} fallback is not the straight pair", segment.index),
                );
            }
        }

        let playback = self.play(&runtime, &mut checks).await;
        self.finish(ScenarioId::FlakyRouter, &context, &directions, &trace.fixes, view, playback, checks)
    }

    /// TV-003: Router down for the whole run.
    async fn run_router_outage(&self) -> ScenarioResult {
        let context = SimContext::shared(self.seed);
        let trace = self.trace(&context, TRACE_STREAM, self.trace.clone());
        let (mut runtime, _source, directions) =
            self.dashboard(&context, trace.newest_first(), SimDirectionsConfig::default());
        directions.set_outage(true);

        let mut checks = Checks::default();
        runtime.refresh().await;
        let view = runtime.route_settled().await.unwrap_or_default();
        check_route(&mut checks, &trace.fixes, &view);
        checks.check(
            view.segments.iter().all(|s| s.source == SegmentSource::StraightLine),
            "outage produced a routed segment",
        );
        checks.check(
            view.path == retained_points(&trace.fixes),
            "outage path differs from the retained fixes",
        );

        let playback = self.play(&runtime, &mut checks).await;
        self.finish(ScenarioId::RouterOutage, &context, &directions, &trace.fixes, view, playback, checks)
    }

    /// TV-004: Tracker never leaves its parking spot.
    async fn run_parked(&self) -> ScenarioResult {
        let context = SimContext::shared(self.seed);
        let config = TraceConfig {
            dwell_probability: 1.0,
            ..self.trace.clone()
        };
        let trace = self.trace(&context, TRACE_STREAM, config);
        let (mut runtime, _source, directions) =
            self.dashboard(&context, trace.newest_first(), SimDirectionsConfig::default());

        let mut checks = Checks::default();
        runtime.refresh().await;
        let view = runtime.route_settled().await;
        checks.check(view.is_some(), "empty resolution never settled");
        let view = view.unwrap_or_default();
        checks.check(view.segments.is_empty(), "parked tracker produced segments");
        checks.check(view.path.is_empty(), "parked tracker produced a path");
        checks.check(directions.stats().requests == 0, "parked tracker hit the router");

        let state = runtime.play();
        checks.check(state.status == PlaybackStatus::Idle, "play started on an empty path");

        self.finish(ScenarioId::Parked, &context, &directions, &trace.fixes, view, PlaybackRun::default(), checks)
    }

    /// TV-005: New page arrives while a resolution is in flight.
    async fn run_supersede(&self) -> ScenarioResult {
        let context = SimContext::shared(self.seed);
        let first_trace = self.trace(&context, TRACE_STREAM, self.trace.clone());
        let second_trace = self.trace(
            &context,
            ALT_TRACE_STREAM,
            TraceConfig {
                start: LatLng::new(51.5074, -0.1278),
                ..self.trace.clone()
            },
        );
        let directions = Arc::new(SimDirections::new(context.clone(), SimDirectionsConfig::default()));
        let session = RouteSession::new(RouteResolver::new(
            context.clone(),
            directions.clone(),
            ResolverConfig::default(),
        ));

        let mut checks = Checks::default();
        let first = session.start(first_trace.fixes.clone());

        let mut rx = session.subscribe();
        let started = rx
            .wait_for(|v| v.generation == first && (!v.segments.is_empty() || v.complete))
            .await
            .is_ok();
        checks.check(started, "first resolution never published");

        let second = session.start(second_trace.fixes.clone());
        let view = session.settled(second).await;
        checks.check(view.is_some(), "second resolution never settled");
        let view = view.unwrap_or_default();
        checks.check(view.generation == second, "view belongs to the wrong generation");
        check_route(&mut checks, &second_trace.fixes, &view);

        settle_background(&context).await;
        checks.check(session.view() == view, "stale resolution overwrote the view");
        checks.check(session.settled(first).await.is_none(), "stale resolution reported completion");

        self.finish(ScenarioId::Supersede, &context, &directions, &second_trace.fixes, view, PlaybackRun::default(), checks)
    }

    /// TV-006: Dashboard torn down mid-resolution.
    async fn run_teardown(&self) -> ScenarioResult {
        let context = SimContext::shared(self.seed);
        let trace = self.trace(&context, TRACE_STREAM, self.trace.clone());
        let directions = Arc::new(SimDirections::new(context.clone(), SimDirectionsConfig::default()));
        let session = RouteSession::new(RouteResolver::new(
            context.clone(),
            directions.clone(),
            ResolverConfig::default(),
        ));

        let mut checks = Checks::default();
        let first = session.start(trace.fixes.clone());
        let published = session.settled(first).await;
        checks.check(published.is_some(), "first resolution never settled");
        let published = published.unwrap_or_default();

        let generation = session.start(trace.fixes.clone());
        let mut rx = session.subscribe();
        let started = rx
            .wait_for(|v| v.generation == generation && (!v.segments.is_empty() || v.complete))
            .await
            .is_ok();
        checks.check(started, "restarted resolution never published");

        session.cancel();
        settle_background(&context).await;

        let view = session.view();
        let multi_segment = retained_points(&trace.fixes).len() > 2;
        if multi_segment {
            checks.check(!view.complete, "cancelled resolution marked complete");
            checks.check(view.path == published.path, "cancelled resolution replaced the path");
            checks.check(view.path_generation == first, "cancelled resolution claimed the path");
            checks.check(
                session.settled(generation).await.is_none(),
                "cancelled resolution reported completion",
            );
        }
        let requests = directions.stats().requests;
        settle_background(&context).await;
        checks.check(
            directions.stats().requests == requests,
            "cancelled resolution kept calling the router",
        );

        self.finish(ScenarioId::Teardown, &context, &directions, &trace.fixes, view, PlaybackRun::default(), checks)
    }

    /// TV-007: Backend fails after the first page.
    async fn run_backend_down(&self) -> ScenarioResult {
        let context = SimContext::shared(self.seed);
        let trace = self.trace(&context, TRACE_STREAM, self.trace.clone());
        let (mut runtime, source, directions) =
            self.dashboard(&context, trace.newest_first(), SimDirectionsConfig::default());

        let mut checks = Checks::default();
        checks.check(runtime.refresh().await, "initial fetch failed");
        let before = runtime.route_settled().await.unwrap_or_default();
        let rows = runtime.feed().logs.len();

        source.set_failure(Some(EnvError::backend(500, Some("db down".to_string()))));
        checks.check(!runtime.refresh().await, "fetch succeeded while backend was down");
        checks.check(
            runtime.feed().error.as_deref() == Some("db down"),
            format!("unexpected feed error {:?}", runtime.feed().error),
        );
        checks.check(runtime.feed().logs.len() == rows, "rows dropped on fetch failure");
        checks.check(runtime.route() == before, "route changed on fetch failure");

        source.set_failure(None);
        checks.check(runtime.refresh().await, "fetch failed after recovery");
        checks.check(runtime.feed().error.is_none(), "error kept after recovery");
        let view = runtime.route_settled().await.unwrap_or_default();
        checks.check(view.path == before.path, "recovered route differs");

        self.finish(ScenarioId::BackendDown, &context, &directions, &trace.fixes, view, PlaybackRun::default(), checks)
    }

    /// TV-008: Page arrives newest-first and shuffled.
    async fn run_shuffled_page(&self) -> ScenarioResult {
        let context = SimContext::shared(self.seed);
        let trace = self.trace(&context, TRACE_STREAM, self.trace.clone());
        let mut rows = trace.fixes.clone();
        rows.shuffle(&mut context.rng(SHUFFLE_STREAM));

        let (mut runtime, _source, directions) =
            self.dashboard(&context, rows, SimDirectionsConfig::default());

        let mut checks = Checks::default();
        runtime.refresh().await;
        let view = runtime.route_settled().await.unwrap_or_default();
        check_route(&mut checks, &trace.fixes, &view);

        let reference = RouteResolver::new(context.clone(), directions.clone(), ResolverConfig::default())
            .resolve(&trace.fixes, &CancellationToken::new(), &mut ())
            .await;
        let expected = match reference {
            Resolution::Complete(route) => route.path,
            _ => Vec::new(),
        };
        checks.check(view.path == expected, "shuffled rows resolved differently");

        let playback = self.play(&runtime, &mut checks).await;
        self.finish(ScenarioId::ShuffledPage, &context, &directions, &trace.fixes, view, playback, checks)
    }

    // =========================================================================
    // HELPERS
    // =========================================================================

    fn trace(&self, context: &SimContext, stream: u64, config: TraceConfig) -> Trace {
        TraceGenerator::new(context.rng(stream), config).generate()
    }

    fn dashboard(
        &self,
        context: &Arc<SimContext>,
        rows: Vec<Fix>,
        directions: SimDirectionsConfig,
    ) -> (SimRuntime, Arc<SimLogSource>, Arc<SimDirections>) {
        let rows_len = rows.len();
        let source = Arc::new(SimLogSource::new(context.clone(), rows));
        let directions = Arc::new(SimDirections::new(context.clone(), directions));
        let mut config = DashboardConfig::default();
        config.query.limit = config.query.limit.max(rows_len as u32);
        let runtime = DashboardRuntime::new(context.clone(), source.clone(), directions.clone(), config);
        (runtime, source, directions)
    }

    /// Plays the loaded path to the end, checking the index never goes back.
    async fn play(&self, runtime: &SimRuntime, checks: &mut Checks) -> PlaybackRun {
        runtime.set_speed(self.playback_speed);
        let start = runtime.play();
        if start.path_len < 2 {
            checks.check(!start.is_animating(), "playback started on a short path");
            return PlaybackRun::default();
        }

        let last_index = (start.path_len - 1) as f64;
        let mut run = PlaybackRun::default();
        let mut previous = start.index;
        let mut regressed = false;
        let mut overshot = false;

        let end = runtime
            .animate(|frame| {
                regressed |= frame.index < previous;
                overshot |= frame.index > last_index;
                previous = frame.index;
                if self.export && run.frames % EXPORT_FRAME_STRIDE == 0 {
                    run.sampled.push(*frame);
                }
                run.frames += 1;
            })
            .await;

        checks.check(!regressed, "playback index went backwards");
        checks.check(!overshot, "playback index passed the last point");
        checks.check(end.status == PlaybackStatus::Finished, format!("playback ended {:?}", end.status));
        checks.check(end.index == last_index, "playback did not stop on the last point");

        let after = runtime.playback(PlaybackEvent::Tick { now: runtime.context().now() });
        checks.check(!after.is_animating(), "finished playback kept animating");

        debug!(frames = run.frames, "playback finished");
        run
    }

    #[allow(clippy::too_many_arguments)]
    fn finish(
        &self,
        scenario: ScenarioId,
        context: &SimContext,
        directions: &SimDirections,
        fixes: &[Fix],
        view: RouteView,
        playback: PlaybackRun,
        checks: Checks,
    ) -> ScenarioResult {
        let stats = directions.stats();
        let metrics = ScenarioMetrics {
            fixes: fixes.len(),
            retained: filtered_sequence(fixes, MIN_SEPARATION_M).len(),
            segments: view.segments.len(),
            degraded: view
                .segments
                .iter()
                .filter(|s| s.source == SegmentSource::StraightLine)
                .count(),
            path_points: view.path.len(),
            router_requests: stats.requests,
            router_failures: stats.failures,
            frames: playback.frames,
            virtual_time_ms: context.now().as_millis() as u64,
        };

        let failure_reason = checks.reason();
        let passed = failure_reason.is_none();

        let export = self.export.then(|| {
            let mut export = RouteExport::new(scenario.name(), self.seed);
            export.rows = fixes.iter().map(TableRow::from_fix).collect();
            export.set_route(view.segments.clone(), view.path.clone());
            for frame in &playback.sampled {
                export.add_frame(frame);
            }
            export.finalize(passed, failure_reason.clone());
            export
        });

        ScenarioResult {
            scenario,
            seed: self.seed,
            passed,
            failure_reason,
            metrics,
            export,
        }
    }
}

/// Retained fixes as coordinates.
fn retained_points(fixes: &[Fix]) -> Vec<LatLng> {
    filtered_sequence(fixes, MIN_SEPARATION_M)
        .iter()
        .map(Fix::coordinate)
        .collect()
}

/// Lets spawned resolution tasks run until they park or finish.
async fn settle_background(context: &SimContext) {
    for _ in 0..256 {
        tokio::task::yield_now().await;
    }
    debug!(virtual_ms = context.now().as_millis() as u64, "background settled");
}

/// Structural checks every completed route must pass.
fn check_route(checks: &mut Checks, fixes: &[Fix], view: &RouteView) {
    let retained = retained_points(fixes);

    checks.check(view.complete, "route not complete");
    if retained.len() < 2 {
        checks.check(view.segments.is_empty() && view.path.is_empty(), "short input produced a route");
        return;
    }

    checks.check(
        view.segments.len() == retained.len() - 1,
        format!("{} segments for {} retained fixes", view.segments.len(), retained.len()),
    );
    checks.check(
        view.segments.iter().enumerate().all(|(i, s)| s.index == i),
        "segments out of order",
    );
    checks.check(view.path.len() >= retained.len(), "path shorter than retained fixes");
    checks.check(view.path.first() == retained.first(), "path does not start at the first fix");
    checks.check(view.path.last() == retained.last(), "path does not end at the last fix");
    checks.check(
        view.path.windows(2).all(|w| !w[0].near(&w[1], 1e-4)),
        "duplicate point at a segment joint",
    );

    if let (Some(first), Some(last)) = (view.segments.first(), view.segments.last()) {
        checks.check(first.color == "hsl(240, 80%, 50%)", format!("first segment colour {}", first.color));
        if view.segments.len() > 1 {
            checks.check(last.color == "hsl(0, 80%, 50%)", format!("last segment colour {}", last.color));
        }
    }
}
