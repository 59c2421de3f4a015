//! Ground truth trace generator for simulation.
//!
//! The generator walks one device along a wandering heading and emits the
//! poll-log rows a real tracker would have sent:
//! - True positions (kept for comparison)
//! - GPS noise on every reported fix
//! - Parked stretches that the separation filter should drop
//! - Battery bytes in every encoding the backend mixes

use chrono::{NaiveDate, NaiveDateTime};
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};
use std::time::Duration;
use trackview_env::{Fix, LatLng, RawBatteryStatus};

/// Meters per degree of latitude (spherical approximation).
const METERS_PER_DEG_LAT: f64 = 111_320.0;

/// Backend timestamp layout.
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone)]
pub struct TraceConfig {
    pub device: String,

    /// Number of fixes to emit
    pub fixes: usize,

    pub start: LatLng,
    pub start_time: NaiveDateTime,

    /// Time between fixes
    pub interval: Duration,

    /// Ground speed while moving
    pub speed_mps: f64,

    /// Std-dev of the heading change per fix (radians)
    pub heading_jitter_rad: f64,

    /// Std-dev of the reported position per axis (meters)
    pub gps_noise_m: f64,

    /// Probability the device stays parked for a fix
    pub dwell_probability: f64,

    /// Probability the battery field arrives unreadable
    pub garbage_battery_rate: f64,
}

impl Default for TraceConfig {
    fn default() -> Self {
        Self {
            device: "tracker-1".to_string(),
            fixes: 40,
            start: LatLng::new(48.8566, 2.3522),
            start_time: NaiveDate::from_ymd_opt(2024, 3, 1)
                .and_then(|d| d.and_hms_opt(8, 0, 0))
                .unwrap_or_default(),
            interval: Duration::from_secs(60),
            speed_mps: 5.0,
            heading_jitter_rad: 0.35,
            gps_noise_m: 4.0,
            dwell_probability: 0.15,
            garbage_battery_rate: 0.05,
        }
    }
}

/// Generated trace: what happened and what the backend would report.
#[derive(Debug, Clone)]
pub struct Trace {
    pub truth: Vec<LatLng>,
    /// Chronological order
    pub fixes: Vec<Fix>,
}

impl Trace {
    /// Rows newest first, the order the poll-log endpoint returns them.
    pub fn newest_first(&self) -> Vec<Fix> {
        self.fixes.iter().rev().cloned().collect()
    }
}

/// Deterministic trace generator.
pub struct TraceGenerator {
    rng: ChaCha8Rng,
    config: TraceConfig,
}

impl TraceGenerator {
    pub fn new(rng: ChaCha8Rng, config: TraceConfig) -> Self {
        Self { rng, config }
    }

    pub fn generate(&mut self) -> Trace {
        let noise = Normal::new(0.0, self.config.gps_noise_m.max(0.0)).ok();
        let turn = Normal::new(0.0, self.config.heading_jitter_rad.max(0.0)).ok();
        let step_m = self.config.speed_mps * self.config.interval.as_secs_f64();

        let mut truth = Vec::with_capacity(self.config.fixes);
        let mut fixes = Vec::with_capacity(self.config.fixes);

        let mut position = self.config.start;
        let mut heading: f64 = self.rng.gen_range(0.0..std::f64::consts::TAU);
        let mut battery: u8 = self.rng.gen_range(60..=100);
        let mut charging = false;

        for i in 0..self.config.fixes {
            if i > 0 && !self.rng.gen_bool(self.config.dwell_probability.clamp(0.0, 1.0)) {
                heading += turn.map(|d| d.sample(&mut self.rng)).unwrap_or(0.0);
                position = offset(position, step_m * heading.cos(), step_m * heading.sin());
            }
            truth.push(position);

            let (north, east) = match noise {
                Some(d) => (d.sample(&mut self.rng), d.sample(&mut self.rng)),
                None => (0.0, 0.0),
            };
            let reported = offset(position, north, east);

            (battery, charging) = self.step_battery(battery, charging);

            fixes.push(Fix {
                device_label: self.config.device.clone(),
                timestamp: self.timestamp(i),
                latitude: reported.lat,
                longitude: reported.lng,
                battery_status: self.battery_field(battery, charging),
            });
        }

        Trace { truth, fixes }
    }

    fn timestamp(&self, i: usize) -> String {
        let elapsed = chrono::Duration::seconds((self.config.interval.as_secs() * i as u64) as i64);
        (self.config.start_time + elapsed)
            .format(TIMESTAMP_FORMAT)
            .to_string()
    }

    /// Drains while unplugged, charges from 15% until full.
    fn step_battery(&mut self, level: u8, charging: bool) -> (u8, bool) {
        if charging {
            let level = level.saturating_add(3).min(100);
            (level, level < 100)
        } else if level <= 15 {
            (level, true)
        } else if self.rng.gen_bool(0.5) {
            (level - 1, false)
        } else {
            (level, false)
        }
    }

    fn battery_field(&mut self, percentage: u8, charging: bool) -> RawBatteryStatus {
        if self.rng.gen_bool(self.config.garbage_battery_rate.clamp(0.0, 1.0)) {
            return RawBatteryStatus::Text("n/a".to_string());
        }
        let raw = ((charging as i64) << 7) | percentage as i64;
        match self.rng.gen_range(0..3) {
            0 => RawBatteryStatus::Int(raw),
            1 => RawBatteryStatus::Text(raw.to_string()),
            _ => RawBatteryStatus::Text(format!("0b{:08b}", raw)),
        }
    }
}

/// Moves `p` by local north/east offsets in meters.
pub fn offset(p: LatLng, north_m: f64, east_m: f64) -> LatLng {
    let dlat = north_m / METERS_PER_DEG_LAT;
    let dlng = east_m / (METERS_PER_DEG_LAT * p.lat.to_radians().cos());
    LatLng::new(p.lat + dlat, p.lng + dlng)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use trackview_core::battery::{decode, BatteryLevel};
    use trackview_core::fixes::parse_timestamp;
    use trackview_core::geodesy::distance_between;

    fn generate(seed: u64, config: TraceConfig) -> Trace {
        TraceGenerator::new(ChaCha8Rng::seed_from_u64(seed), config).generate()
    }

    #[test]
    fn test_same_seed_same_trace() {
        let a = generate(3, TraceConfig::default());
        let b = generate(3, TraceConfig::default());
        assert_eq!(a.fixes, b.fixes);
        assert_eq!(a.fixes.len(), 40);
    }

    #[test]
    fn test_timestamps_parse_and_ascend() {
        let trace = generate(5, TraceConfig::default());
        let times: Vec<_> = trace
            .fixes
            .iter()
            .map(|f| parse_timestamp(&f.timestamp).unwrap())
            .collect();
        assert!(times.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(trace.fixes[0].timestamp, "2024-03-01 08:00:00");
        assert_eq!(trace.fixes[1].timestamp, "2024-03-01 08:01:00");
    }

    #[test]
    fn test_noise_stays_near_truth() {
        let trace = generate(11, TraceConfig::default());
        for (fix, truth) in trace.fixes.iter().zip(&trace.truth) {
            assert!(distance_between(&fix.coordinate(), truth) < 40.0);
        }
    }

    #[test]
    fn test_moving_steps_match_speed() {
        let config = TraceConfig {
            gps_noise_m: 0.0,
            dwell_probability: 0.0,
            ..TraceConfig::default()
        };
        let trace = generate(2, config);
        for w in trace.truth.windows(2) {
            let d = distance_between(&w[0], &w[1]);
            assert!((d - 300.0).abs() < 3.0, "step was {d} m");
        }
    }

    #[test]
    fn test_battery_fields_decode() {
        let config = TraceConfig {
            fixes: 200,
            garbage_battery_rate: 0.0,
            ..TraceConfig::default()
        };
        let trace = generate(8, config);
        for fix in &trace.fixes {
            let reading = decode(&fix.battery_status);
            assert_ne!(reading.level, BatteryLevel::Unknown, "{}", fix.battery_status);
            assert!(reading.percentage <= 100);
        }
    }

    #[test]
    fn test_newest_first() {
        let trace = generate(1, TraceConfig::default());
        let rows = trace.newest_first();
        assert_eq!(rows.first(), trace.fixes.last());
    }
}
