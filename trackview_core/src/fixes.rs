//! Fix ordering and the minimum-separation filter.

use chrono::{DateTime, NaiveDateTime, Utc};
use thiserror::Error;
use trackview_env::Fix;

use crate::geodesy::distance_meters;

/// Fixes closer than this to the previously kept fix are merged into it.
pub const MIN_SEPARATION_M: f64 = 50.0;

const NAIVE_FORMATS: [&str; 3] = [
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

#[derive(Debug, Error, PartialEq)]
#[error("unrecognised timestamp `{0}`")]
pub struct TimestampError(pub String);

/// Parses a backend timestamp. RFC 3339 first, then naive SQL/ISO forms
/// read as UTC.
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, TimestampError> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }
    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
        .ok_or_else(|| TimestampError(raw.to_string()))
}

/// Sorts fixes ascending by time. Stable; fixes with unparseable
/// timestamps come first in their original order.
pub fn sort_chronologically(fixes: &[Fix]) -> Vec<Fix> {
    let mut keyed: Vec<(Option<DateTime<Utc>>, &Fix)> = fixes
        .iter()
        .map(|f| (parse_timestamp(&f.timestamp).ok(), f))
        .collect();
    keyed.sort_by_key(|(t, _)| *t);
    keyed.into_iter().map(|(_, f)| f.clone()).collect()
}

/// Drops every fix within `min_separation_m` of the last *retained* fix.
/// The first fix is always retained. Input order is preserved.
pub fn filter_min_separation(sorted: &[Fix], min_separation_m: f64) -> Vec<Fix> {
    let mut retained: Vec<Fix> = Vec::with_capacity(sorted.len());
    for fix in sorted {
        let keep = match retained.last() {
            None => true,
            Some(prev) => {
                distance_meters(prev.latitude, prev.longitude, fix.latitude, fix.longitude)
                    > min_separation_m
            }
        };
        if keep {
            retained.push(fix.clone());
        }
    }
    retained
}

/// Sort then filter: the sequence the resolver routes over.
pub fn filtered_sequence(fixes: &[Fix], min_separation_m: f64) -> Vec<Fix> {
    filter_min_separation(&sort_chronologically(fixes), min_separation_m)
}
