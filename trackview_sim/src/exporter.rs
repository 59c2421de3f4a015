//! JSON exporter for resolved routes and playback runs.
//!
//! One file holds everything a map front-end needs to replay a run offline:
//! the table rows, coloured segments, the concatenated path and sampled
//! playback frames.

use serde::Serialize;
use std::fs::File;
use std::io::Write;
use trackview_core::geodesy::path_length_meters;
use trackview_core::{PlaybackFrame, RouteSegment, SegmentSource, TableRow};
use trackview_env::{LatLng, RunId};

/// A sampled playback frame.
#[derive(Debug, Clone, Serialize)]
pub struct FrameRecord {
    /// Clock time of the tick in seconds
    pub time_sec: f64,
    pub index: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<LatLng>,
}

impl From<&PlaybackFrame> for FrameRecord {
    fn from(frame: &PlaybackFrame) -> Self {
        Self {
            time_sec: frame.at.as_secs_f64(),
            index: frame.index,
            position: frame.position,
        }
    }
}

/// Totals for the run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ExportSummary {
    pub segments: usize,
    /// Segments that fell back to a straight line
    pub degraded: usize,
    pub path_points: usize,
    pub path_length_m: f64,
    pub passed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}

/// Complete route export.
#[derive(Debug, Clone, Serialize)]
pub struct RouteExport {
    /// Scenario name (or `"live"` for the CLI)
    pub scenario: String,

    pub seed: u64,

    pub run_id: String,

    pub rows: Vec<TableRow>,

    pub segments: Vec<RouteSegment>,

    pub path: Vec<LatLng>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub frames: Vec<FrameRecord>,

    pub summary: ExportSummary,
}

impl RouteExport {
    /// Creates a new export container.
    pub fn new(scenario: &str, seed: u64) -> Self {
        Self {
            scenario: scenario.to_string(),
            seed,
            run_id: RunId::from_seed(seed).to_string(),
            rows: Vec::new(),
            segments: Vec::new(),
            path: Vec::new(),
            frames: Vec::new(),
            summary: ExportSummary::default(),
        }
    }

    /// Records the resolved route.
    pub fn set_route(&mut self, segments: Vec<RouteSegment>, path: Vec<LatLng>) {
        self.summary.segments = segments.len();
        self.summary.degraded = segments
            .iter()
            .filter(|s| s.source == SegmentSource::StraightLine)
            .count();
        self.summary.path_points = path.len();
        self.summary.path_length_m = path_length_meters(&path);
        self.segments = segments;
        self.path = path;
    }

    /// Adds a frame.
    pub fn add_frame(&mut self, frame: &PlaybackFrame) {
        self.frames.push(FrameRecord::from(frame));
    }

    /// Finalizes the export.
    pub fn finalize(&mut self, passed: bool, failure_reason: Option<String>) {
        self.summary.passed = passed;
        self.summary.failure_reason = failure_reason;
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Writes to a JSON file.
    pub fn write_to_file(&self, path: &str) -> std::io::Result<()> {
        let json = self.to_json()?;
        let mut file = File::create(path)?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }
}
