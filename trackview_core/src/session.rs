//! Route session - owns the single live resolution.
//!
//! Every `start()` bumps the generation, raises the previous run's token and
//! clears the published segments. The last published path stays until the
//! new run publishes its own. A run may only write while its generation is
//! current; the check and the write happen under the same lock, so a stale
//! run can never overwrite a newer one.

use serde::Serialize;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tracing::debug;
use trackview_env::{CancellationToken, DirectionsService, Fix, LatLng, TrackViewContext};

use crate::route::{Resolution, RouteObserver, RouteResolver, RouteSegment};

/// Published state of the current resolution.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RouteView {
    /// Which `start()` this view belongs to
    pub generation: u64,

    /// Segments in completion order
    pub segments: Vec<RouteSegment>,

    /// Last published concatenated path; may belong to an earlier run
    pub path: Vec<LatLng>,

    /// Generation that published `path` (0 before any run finished)
    pub path_generation: u64,

    /// True once the run published its final path (or had nothing to route)
    pub complete: bool,
}

struct SessionState {
    generation: u64,
    token: CancellationToken,
    view: RouteView,
}

/// Writes results of one run into the shared view while it is current.
struct ViewPublisher {
    generation: u64,
    token: CancellationToken,
    state: Arc<Mutex<SessionState>>,
    tx: Arc<watch::Sender<RouteView>>,
}

impl ViewPublisher {
    fn publish<F: FnOnce(&mut RouteView)>(&self, update: F) -> bool {
        let Ok(mut state) = self.state.lock() else {
            return false;
        };
        if state.generation != self.generation || self.token.is_cancelled() {
            return false;
        }
        update(&mut state.view);
        self.tx.send_replace(state.view.clone());
        true
    }
}

impl RouteObserver for ViewPublisher {
    fn segment_resolved(&mut self, segment: &RouteSegment) {
        let segment = segment.clone();
        self.publish(move |view| view.segments.push(segment));
    }

    fn path_resolved(&mut self, path: &[LatLng]) {
        let generation = self.generation;
        self.publish(|view| {
            view.path = path.to_vec();
            view.path_generation = generation;
            view.complete = true;
        });
    }
}

/// Re-derives the route whenever the fix list changes.
pub struct RouteSession<Ctx, Dir>
where
    Ctx: TrackViewContext,
    Dir: DirectionsService,
{
    resolver: RouteResolver<Ctx, Dir>,
    state: Arc<Mutex<SessionState>>,
    tx: Arc<watch::Sender<RouteView>>,
}

impl<Ctx, Dir> RouteSession<Ctx, Dir>
where
    Ctx: TrackViewContext,
    Dir: DirectionsService,
{
    pub fn new(resolver: RouteResolver<Ctx, Dir>) -> Self {
        let (tx, _rx) = watch::channel(RouteView::default());
        Self {
            resolver,
            state: Arc::new(Mutex::new(SessionState {
                generation: 0,
                token: CancellationToken::new(),
                view: RouteView::default(),
            })),
            tx: Arc::new(tx),
        }
    }

    /// Subscribes to view snapshots.
    pub fn subscribe(&self) -> watch::Receiver<RouteView> {
        self.tx.subscribe()
    }

    /// Latest published view.
    pub fn view(&self) -> RouteView {
        self.tx.borrow().clone()
    }

    pub fn generation(&self) -> u64 {
        self.state.lock().map(|s| s.generation).unwrap_or(0)
    }

    /// Supersedes any running resolution and starts one for `fixes`.
    /// Returns the new generation.
    pub fn start(&self, fixes: Vec<Fix>) -> u64 {
        let (generation, token) = {
            let mut state = match self.state.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            state.token.cancel();
            state.generation += 1;
            state.token = CancellationToken::new();
            state.view.generation = state.generation;
            state.view.segments.clear();
            state.view.complete = false;
            self.tx.send_replace(state.view.clone());
            (state.generation, state.token.clone())
        };

        debug!(generation, fixes = fixes.len(), "starting route resolution");

        let mut publisher = ViewPublisher {
            generation,
            token: token.clone(),
            state: Arc::clone(&self.state),
            tx: Arc::clone(&self.tx),
        };
        let resolver = self.resolver.clone();

        self.resolver.context().spawn("route-resolution", async move {
            match resolver.resolve(&fixes, &token, &mut publisher).await {
                Resolution::Empty => {
                    publisher.publish(|view| {
                        view.path.clear();
                        view.path_generation = generation;
                        view.complete = true;
                    });
                }
                Resolution::Cancelled => {
                    debug!(generation, "route resolution superseded");
                }
                Resolution::Complete(_) => {}
            }
        });

        generation
    }

    /// Cancels the running resolution without starting another (teardown).
    pub fn cancel(&self) {
        if let Ok(state) = self.state.lock() {
            state.token.cancel();
        }
    }

    /// Waits until `generation` completes. `None` if it was superseded or
    /// cancelled first.
    pub async fn settled(&self, generation: u64) -> Option<RouteView> {
        let mut rx = self.subscribe();
        loop {
            {
                let view = rx.borrow_and_update();
                if view.generation > generation {
                    return None;
                }
                if view.generation == generation && view.complete {
                    return Some(view.clone());
                }
            }
            let cancelled = self
                .state
                .lock()
                .map(|s| s.generation != generation || s.token.is_cancelled())
                .unwrap_or(true);
            if cancelled {
                return None;
            }
            if rx.changed().await.is_err() {
                return None;
            }
        }
    }
}

impl<Ctx, Dir> Drop for RouteSession<Ctx, Dir>
where
    Ctx: TrackViewContext,
    Dir: DirectionsService,
{
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::route::ResolverConfig;
    use async_trait::async_trait;
    use std::time::{Duration, SystemTime};
    use tokio::sync::Notify;
    use trackview_env::{DirectionsResponse, EnvError, RawBatteryStatus, RouteRequest};

    struct TestContext;

    #[async_trait]
    impl TrackViewContext for TestContext {
        fn now(&self) -> Duration {
            Duration::ZERO
        }
        fn system_time(&self) -> SystemTime {
            SystemTime::UNIX_EPOCH
        }
        async fn sleep(&self, _duration: Duration) {
            tokio::task::yield_now().await;
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

    /// Straight-line directions that block requests from `gate_from` until
    /// released.
    struct GatedDirections {
        gate_lng: f64,
        gate: Notify,
    }

    #[async_trait]
    impl DirectionsService for GatedDirections {
        async fn route(&self, request: RouteRequest) -> Result<DirectionsResponse, EnvError> {
            if request.origin.lng == self.gate_lng {
                self.gate.notified().await;
            }
            Ok(DirectionsResponse::single(
                vec![request.origin, request.destination],
                Some(100.0),
            ))
        }
    }

    fn fix(minute: u32, lng: f64) -> Fix {
        Fix {
            device_label: "t".to_string(),
            timestamp: format!("2024-03-01T00:{:02}:00Z", minute),
            latitude: 0.0,
            longitude: lng,
            battery_status: RawBatteryStatus::Int(1),
        }
    }

    fn session(gate_lng: f64) -> (RouteSession<TestContext, GatedDirections>, Arc<GatedDirections>) {
        let dir = Arc::new(GatedDirections {
            gate_lng,
            gate: Notify::new(),
        });
        let resolver = RouteResolver::new(Arc::new(TestContext), dir.clone(), ResolverConfig::default());
        (RouteSession::new(resolver), dir)
    }

    #[tokio::test]
    async fn test_completed_run_is_published() {
        let (session, _) = session(f64::NAN);
        let generation = session.start(vec![fix(0, 0.0), fix(1, 0.01), fix(2, 0.02)]);

        let view = session.settled(generation).await.expect("run completes");
        assert_eq!(view.segments.len(), 2);
        assert_eq!(view.path.len(), 3);
        assert!(view.complete);
    }

    #[tokio::test]
    async fn test_empty_input_completes_empty() {
        let (session, _) = session(f64::NAN);
        let generation = session.start(vec![fix(0, 0.0)]);
        let view = session.settled(generation).await.expect("run completes");
        assert!(view.segments.is_empty());
        assert!(view.path.is_empty());
    }

    #[tokio::test]
    async fn test_superseded_run_never_overwrites() {
        // The first run blocks on its second pair.
        let (session, dir) = session(0.01);
        let first = session.start(vec![fix(0, 0.0), fix(1, 0.01), fix(2, 0.02)]);

        // Let the first run publish its first segment.
        let mut rx = session.subscribe();
        rx.wait_for(|v| v.generation == first && v.segments.len() == 1)
            .await
            .unwrap();

        let second = session.start(vec![fix(0, 1.0), fix(1, 1.01)]);
        let view = session.settled(second).await.expect("second run completes");
        assert_eq!(view.generation, second);
        assert_eq!(view.segments.len(), 1);
        assert_eq!(view.path[0], LatLng::new(0.0, 1.0));

        // Release the stale run; it must not touch the view.
        dir.gate.notify_one();
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert_eq!(session.view(), view);
        assert_eq!(session.settled(first).await, None);
    }

    #[tokio::test]
    async fn test_cancel_stops_publication() {
        let (session, dir) = session(0.01);
        let generation = session.start(vec![fix(0, 0.0), fix(1, 0.01), fix(2, 0.02)]);

        let mut rx = session.subscribe();
        rx.wait_for(|v| v.segments.len() == 1).await.unwrap();

        session.cancel();
        dir.gate.notify_one();
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }

        let view = session.view();
        assert_eq!(view.generation, generation);
        assert_eq!(view.segments.len(), 1);
        assert!(view.path.is_empty());
        assert!(!view.complete);
        assert_eq!(session.settled(generation).await, None);
    }

    #[tokio::test]
    async fn test_restart_keeps_last_path_until_replaced() {
        let (session, dir) = session(1.01);
        let first = session.start(vec![fix(0, 0.0), fix(1, 0.01), fix(2, 0.02)]);
        let published = session.settled(first).await.expect("first run completes");
        assert_eq!(published.path_generation, first);

        let second = session.start(vec![fix(0, 1.0), fix(1, 1.01), fix(2, 1.02)]);
        let mut rx = session.subscribe();
        rx.wait_for(|v| v.generation == second && v.segments.len() == 1)
            .await
            .unwrap();

        let pending = session.view();
        assert!(!pending.complete);
        assert_eq!(pending.path, published.path);
        assert_eq!(pending.path_generation, first);

        dir.gate.notify_one();
        let view = session.settled(second).await.expect("second run completes");
        assert_eq!(view.path_generation, second);
        assert_eq!(view.path[0], LatLng::new(0.0, 1.0));
    }

    #[tokio::test]
    async fn test_cancelled_restart_leaves_previous_path() {
        let (session, _dir) = session(1.01);
        let first = session.start(vec![fix(0, 0.0), fix(1, 0.01), fix(2, 0.02)]);
        let published = session.settled(first).await.expect("first run completes");

        let second = session.start(vec![fix(0, 1.0), fix(1, 1.01), fix(2, 1.02)]);
        session.cancel();

        assert_eq!(session.settled(second).await, None);
        let view = session.view();
        assert_eq!(view.generation, second);
        assert!(view.segments.is_empty());
        assert_eq!(view.path, published.path);
        assert_eq!(view.path_generation, first);
    }
}
