//! Map layer data - heat cells, marker subset and viewport.
//!
//! Drawing belongs to the map surface; this module only prepares what it
//! draws. Heat is binned into H3 cells so dense clusters of fixes collapse
//! into one weighted sample.

use geo::{BoundingRect, MultiPoint, Point};
use h3o::{CellIndex, Resolution};
use serde::Serialize;
use std::collections::HashMap;
use tracing::debug;
use trackview_env::{Fix, LatLng};

/// Static markers are capped; the heat layer covers the rest.
pub const MARKER_LIMIT: usize = 50;

/// Default heat resolution (~174 m edge, neighbourhood scale).
pub const DEFAULT_HEAT_RESOLUTION: Resolution = Resolution::Nine;

/// One weighted heat sample.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HeatCell {
    pub cell: CellIndex,
    pub center: LatLng,
    pub count: u32,
    /// `count` relative to the busiest cell, in (0, 1]
    pub weight: f64,
}

/// Axis-aligned viewport around a set of fixes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MapBounds {
    pub south_west: LatLng,
    pub north_east: LatLng,
}

/// Bins fixes into H3 cells, busiest first. Fixes with invalid
/// coordinates are skipped.
pub fn heat_cells(fixes: &[Fix], resolution: Resolution) -> Vec<HeatCell> {
    let mut counts: HashMap<CellIndex, u32> = HashMap::new();
    for fix in fixes {
        match h3o::LatLng::new(fix.latitude, fix.longitude) {
            Ok(ll) => *counts.entry(ll.to_cell(resolution)).or_insert(0) += 1,
            Err(e) => debug!(device = %fix.device_label, error = ?e, "skipping fix outside heat grid"),
        }
    }

    let busiest = counts.values().copied().max().unwrap_or(0);
    let mut cells: Vec<HeatCell> = counts
        .into_iter()
        .map(|(cell, count)| {
            let center = h3o::LatLng::from(cell);
            HeatCell {
                cell,
                center: LatLng::new(center.lat(), center.lng()),
                count,
                weight: count as f64 / busiest as f64,
            }
        })
        .collect();

    cells.sort_by(|a, b| b.count.cmp(&a.count).then(a.cell.cmp(&b.cell)));
    cells
}

/// Bounding box of all fixes, `None` when there are none.
pub fn bounds(fixes: &[Fix]) -> Option<MapBounds> {
    let points: MultiPoint<f64> = fixes
        .iter()
        .map(|f| Point::new(f.longitude, f.latitude))
        .collect();
    let rect = points.bounding_rect()?;
    Some(MapBounds {
        south_west: LatLng::new(rect.min().y, rect.min().x),
        north_east: LatLng::new(rect.max().y, rect.max().x),
    })
}

/// Initial map center: the first fix, or the origin.
pub fn default_center(fixes: &[Fix]) -> LatLng {
    fixes.first().map(Fix::coordinate).unwrap_or_default()
}

/// Fixes that get an individual marker.
pub fn marker_fixes(fixes: &[Fix]) -> &[Fix] {
    &fixes[..fixes.len().min(MARKER_LIMIT)]
}
