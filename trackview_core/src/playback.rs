//! Route playback - animated marker along the concatenated path.
//!
//! The state machine is a pure function `PlaybackState::apply(event)`, so
//! it can be driven by a real frame loop or stepped by hand in tests.
//!
//! ```text
//!            play                  pause
//!   Idle ───────────► Playing ◄──────────► Paused
//!    ▲                   │        play
//!    │ path changed      │ index reaches len-1
//!    │ (from any state)  ▼
//!    └──────────────  Finished ──play (restart at 0)──► Playing
//! ```

use serde::Serialize;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use trackview_env::{LatLng, TrackViewContext};

/// Path points advanced per second at speed 1.0.
pub const BASE_POINTS_PER_SECOND: f64 = 10.0;

/// Speed range offered to users. Not enforced by the controller.
pub const MIN_SPEED: f64 = 0.1;
pub const MAX_SPEED: f64 = 3.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackStatus {
    Idle,
    Playing,
    Paused,
    /// Stopped at the last point
    Finished,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PlaybackEvent {
    /// Start, resume, or restart when finished
    Play { now: Duration },
    Pause,
    /// Animation frame at monotonic time `now`
    Tick { now: Duration },
    SetSpeed(f64),
    /// Jump to a fractional index (scrubber)
    Seek(f64),
    /// The concatenated path was replaced
    PathChanged { len: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PlaybackState {
    pub status: PlaybackStatus,

    /// Fractional position in [0, path_len - 1]
    pub index: f64,

    pub speed: f64,

    pub path_len: usize,

    /// Time of the previous tick (or of play) while Playing
    #[serde(skip)]
    last_tick: Option<Duration>,
}

impl Default for PlaybackState {
    fn default() -> Self {
        Self::new(0)
    }
}

impl PlaybackState {
    pub fn new(path_len: usize) -> Self {
        Self {
            status: PlaybackStatus::Idle,
            index: 0.0,
            speed: 1.0,
            path_len,
            last_tick: None,
        }
    }

    pub fn is_animating(&self) -> bool {
        self.status == PlaybackStatus::Playing
    }

    fn last_index(&self) -> f64 {
        self.path_len.saturating_sub(1) as f64
    }

    /// Returns the state after `event`.
    pub fn apply(self, event: PlaybackEvent) -> PlaybackState {
        let mut next = self;
        match event {
            PlaybackEvent::Play { now } => {
                if self.path_len < 2 || self.status == PlaybackStatus::Playing {
                    return self;
                }
                if self.index >= self.last_index() {
                    next.index = 0.0;
                }
                next.status = PlaybackStatus::Playing;
                next.last_tick = Some(now);
            }
            PlaybackEvent::Pause => {
                if self.status == PlaybackStatus::Playing {
                    next.status = PlaybackStatus::Paused;
                    next.last_tick = None;
                }
            }
            PlaybackEvent::Tick { now } => {
                if self.status != PlaybackStatus::Playing {
                    return self;
                }
                let previous = self.last_tick.unwrap_or(now);
                let delta = now.saturating_sub(previous).as_secs_f64();
                let advanced = self.index + delta * BASE_POINTS_PER_SECOND * self.speed;

                if advanced >= self.last_index() {
                    next.index = self.last_index();
                    next.status = PlaybackStatus::Finished;
                    next.last_tick = None;
                } else {
                    next.index = advanced;
                    next.last_tick = Some(now);
                }
            }
            PlaybackEvent::SetSpeed(speed) => {
                next.speed = speed;
            }
            PlaybackEvent::Seek(index) => {
                let last = self.last_index();
                next.index = index.clamp(0.0, last);
                match self.status {
                    PlaybackStatus::Playing if next.index >= last => {
                        next.status = PlaybackStatus::Finished;
                        next.last_tick = None;
                    }
                    PlaybackStatus::Finished if next.index < last => {
                        next.status = PlaybackStatus::Idle;
                    }
                    _ => {}
                }
            }
            PlaybackEvent::PathChanged { len } => {
                next = PlaybackState {
                    speed: self.speed,
                    ..PlaybackState::new(len)
                };
            }
        }
        next
    }

    /// Interpolated marker position, `None` for an empty path.
    pub fn position(&self, path: &[LatLng]) -> Option<LatLng> {
        interpolate(path, self.index)
    }
}

/// Linear interpolation between `floor(index)` and the next point.
pub fn interpolate(path: &[LatLng], index: f64) -> Option<LatLng> {
    let last = path.len().checked_sub(1)?;
    let index = index.clamp(0.0, last as f64);
    let i = index.floor() as usize;
    let j = (i + 1).min(last);
    let frac = index - i as f64;
    Some(path[i].lerp(&path[j], frac))
}

// =============================================================================
// CONTROLLER + DRIVER
// =============================================================================

/// Owns the path being played and the playback state.
#[derive(Debug, Clone, Default)]
pub struct PlaybackController {
    path: Vec<LatLng>,
    state: PlaybackState,
}

impl PlaybackController {
    pub fn new(path: Vec<LatLng>) -> Self {
        let state = PlaybackState::new(path.len());
        Self { path, state }
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    /// Replaces the path; playback hard-resets to Idle at index 0.
    pub fn set_path(&mut self, path: Vec<LatLng>) -> PlaybackState {
        let len = path.len();
        self.path = path;
        self.apply(PlaybackEvent::PathChanged { len })
    }

    pub fn apply(&mut self, event: PlaybackEvent) -> PlaybackState {
        self.state = self.state.apply(event);
        self.state
    }

    pub fn position(&self) -> Option<LatLng> {
        self.state.position(&self.path)
    }
}

/// Frame emitted while playing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PlaybackFrame {
    pub at: Duration,
    pub index: f64,
    pub position: Option<LatLng>,
    pub status: PlaybackStatus,
}

/// Configuration for the frame loop.
#[derive(Debug, Clone)]
pub struct PlaybackConfig {
    /// Time between ticks (default: 16 ms, ~60 Hz)
    pub frame_interval: Duration,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            frame_interval: Duration::from_millis(16),
        }
    }
}

/// Runs the tick loop against a context clock.
pub struct PlaybackDriver<Ctx: TrackViewContext> {
    context: Arc<Ctx>,
    config: PlaybackConfig,
}

impl<Ctx: TrackViewContext> PlaybackDriver<Ctx> {
    pub fn new(context: Arc<Ctx>, config: PlaybackConfig) -> Self {
        Self { context, config }
    }

    /// Ticks `controller` until it leaves Playing (finished, paused or
    /// reset from elsewhere), handing each frame to `on_frame`.
    pub async fn run<F>(&self, controller: &Mutex<PlaybackController>, mut on_frame: F) -> PlaybackState
    where
        F: FnMut(&PlaybackFrame),
    {
        loop {
            self.context.sleep(self.config.frame_interval).await;

            let now = self.context.now();
            let frame = {
                let mut ctl = match controller.lock() {
                    Ok(guard) => guard,
                    Err(poisoned) => poisoned.into_inner(),
                };
                if !ctl.state().is_animating() {
                    return ctl.state();
                }
                let state = ctl.apply(PlaybackEvent::Tick { now });
                PlaybackFrame {
                    at: now,
                    index: state.index,
                    position: ctl.position(),
                    status: state.status,
                }
            };

            on_frame(&frame);
        }
    }
}
