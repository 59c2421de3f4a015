//! TrackView Deterministic Simulation Harness
//!
//! This crate provides a controlled environment where the route resolver,
//! the route session and the playback driver run deterministically.
//!
//! # Core Principle
//!
//! All sources of non-determinism are intercepted and controlled:
//! - **Time**: Virtual clock advances only when something sleeps
//! - **Routing**: Scripted directions service with seeded failures
//! - **Backend**: In-memory poll-log source with injectable errors
//! - **Randomness**: All entropy derived from a single 64-bit seed
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       ScenarioRunner                        │
//! │  ┌──────────────────────────────────────────────────────┐   │
//! │  │ SimContext (Virtual Clock + seeded RNG streams)      │   │
//! │  └──────────────────────────────────────────────────────┘   │
//! │       │                                                     │
//! │  ┌────▼─────────┐   rows   ┌──────────────────┐             │
//! │  │ SimLogSource │ ───────► │ DashboardRuntime │             │
//! │  └──────────────┘          └────────┬─────────┘             │
//! │       ▲                             │ RouteRequest          │
//! │       │                        ┌────▼──────────┐            │
//! │  ┌────┴───────────┐            │ SimDirections │            │
//! │  │ TraceGenerator │            │ (failures)    │            │
//! │  │ (ground truth) │            └───────────────┘            │
//! │  └────────────────┘                                         │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use trackview_sim::{ScenarioRunner, scenarios::ScenarioId};
//!
//! let result = ScenarioRunner::new(42).run(ScenarioId::FlakyRouter).await;
//! assert!(result.passed);
//! ```

mod context;
mod directions;
mod exporter;
mod runner;
mod source;
mod trace;
pub mod scenarios;

pub use context::SimContext;
pub use directions::{detour_path, DirectionsStats, ModeProfile, SimDirections, SimDirectionsConfig};
pub use exporter::{ExportSummary, FrameRecord, RouteExport};
pub use runner::{ScenarioMetrics, ScenarioResult, ScenarioRunner};
pub use source::SimLogSource;
pub use trace::{Trace, TraceConfig, TraceGenerator};
