//! Core environment context trait for TrackView engines.

use async_trait::async_trait;
use std::future::Future;
use std::time::{Duration, SystemTime};

/// The central interface for Environment Interaction.
///
/// This trait abstracts the clock and the task scheduler so that the
/// route resolver and the playback driver run unchanged in production
/// (tokio) and in deterministic simulation (virtual clock).
///
/// # Implementations
///
/// - **Production**: `TokioContext` - wraps `tokio::time`
/// - **Simulation**: `SimContext` - virtual clock advanced by `sleep`
#[async_trait]
pub trait TrackViewContext: Send + Sync + 'static {
    /// Returns the current monotonic time since context creation.
    ///
    /// Playback deltas are measured against this clock.
    fn now(&self) -> Duration;

    /// Returns the wall-clock time.
    ///
    /// Used for default backend query windows and export stamps.
    fn system_time(&self) -> SystemTime;

    /// Suspends execution for the given duration.
    ///
    /// In production: wraps `tokio::time::sleep`
    /// In simulation: advances virtual clock
    async fn sleep(&self, duration: Duration);

    /// Spawns a background task.
    fn spawn<F>(&self, name: &str, future: F)
    where
        F: Future<Output = ()> + Send + 'static;

    /// Returns the context's seed (for logging/debugging).
    ///
    /// In production, returns 0 (not seeded).
    /// In simulation, returns the master seed.
    fn seed(&self) -> u64;
}
