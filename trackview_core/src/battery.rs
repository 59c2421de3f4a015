//! Battery status bitmask decoding.
//!
//! Trackers report battery state as one packed byte:
//!
//! ```text
//!   bit  7   6   5   4   3   2   1   0
//!      [chg][      percentage 0-127      ]
//! ```
//!
//! The percentage field is seven bits wide and is not clamped, so 101-127
//! are representable and land in the `Full` bucket.

use serde::Serialize;
use trackview_env::RawBatteryStatus;

/// Severity bucket for a battery percentage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum BatteryLevel {
    Unknown,
    Empty,
    Critical,
    Low,
    MidLow,
    Medium,
    MidHigh,
    High,
    Full,
}

impl BatteryLevel {
    /// Buckets a decoded percentage. Boundaries: 0 | 1-10 | 11-25 | 26-50 |
    /// 51-70 | 71-85 | 86-99 | >=100.
    pub fn from_percentage(percentage: u8) -> Self {
        match percentage {
            0 => BatteryLevel::Empty,
            1..=10 => BatteryLevel::Critical,
            11..=25 => BatteryLevel::Low,
            26..=50 => BatteryLevel::MidLow,
            51..=70 => BatteryLevel::Medium,
            71..=85 => BatteryLevel::MidHigh,
            86..=99 => BatteryLevel::High,
            _ => BatteryLevel::Full,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            BatteryLevel::Unknown => "Unknown",
            BatteryLevel::Empty => "Empty",
            BatteryLevel::Critical => "Critical",
            BatteryLevel::Low => "Low",
            BatteryLevel::MidLow => "Mid-Low",
            BatteryLevel::Medium => "Medium",
            BatteryLevel::MidHigh => "Mid-High",
            BatteryLevel::High => "High",
            BatteryLevel::Full => "Full",
        }
    }

    /// Display color token for the table badge.
    pub fn color(&self) -> &'static str {
        match self {
            BatteryLevel::Unknown => "bg-slate-100 text-slate-500",
            BatteryLevel::Empty => "bg-red-200 text-red-900",
            BatteryLevel::Critical => "bg-red-100 text-red-700",
            BatteryLevel::Low => "bg-orange-100 text-orange-700",
            BatteryLevel::MidLow => "bg-yellow-100 text-yellow-700",
            BatteryLevel::Medium => "bg-blue-100 text-blue-700",
            BatteryLevel::MidHigh => "bg-emerald-50 text-emerald-600",
            BatteryLevel::High => "bg-emerald-100 text-emerald-700",
            BatteryLevel::Full => "bg-green-100 text-green-800",
        }
    }
}

/// Decoded battery status.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatteryReading {
    /// Low seven bits of the raw value (0-127)
    pub percentage: u8,
    /// Bit 7 of the raw value
    pub is_charging: bool,
    pub level: BatteryLevel,
    /// Human label, e.g. `Critical (5%) ⚡`
    pub label: String,
    pub color: &'static str,
}

impl BatteryReading {
    pub fn unknown() -> Self {
        Self {
            percentage: 0,
            is_charging: false,
            level: BatteryLevel::Unknown,
            label: BatteryLevel::Unknown.label().to_string(),
            color: BatteryLevel::Unknown.color(),
        }
    }

    /// Decodes an already-parsed raw integer.
    pub fn from_raw(raw: i64) -> Self {
        let is_charging = (raw >> 7) & 0x01 == 1;
        let percentage = (raw & 0x7F) as u8;
        let level = BatteryLevel::from_percentage(percentage);

        let label = if is_charging {
            format!("{} ({}%) ⚡", level.label(), percentage)
        } else {
            format!("{} ({}%)", level.label(), percentage)
        };

        Self {
            percentage,
            is_charging,
            level,
            label,
            color: level.color(),
        }
    }
}

/// Decodes a raw battery status. Never fails: unparseable input yields
/// [`BatteryReading::unknown`].
pub fn decode(status: &RawBatteryStatus) -> BatteryReading {
    match parse_raw(status) {
        Some(raw) => BatteryReading::from_raw(raw),
        None => BatteryReading::unknown(),
    }
}

/// 2^63; truncated floats outside `-2^63..2^63` have no `i64` value.
const I64_BOUND: f64 = 9_223_372_036_854_775_808.0;

fn parse_raw(status: &RawBatteryStatus) -> Option<i64> {
    match status {
        RawBatteryStatus::Int(v) => Some(*v),
        RawBatteryStatus::Float(v) => {
            let whole = v.trunc();
            (-I64_BOUND..I64_BOUND).contains(&whole).then(|| whole as i64)
        }
        RawBatteryStatus::Text(s) => match s.strip_prefix("0b") {
            Some(bits) => parse_leading_int(bits, 2),
            None => parse_leading_int(s, 10),
        },
    }
}

/// Parses the longest run of leading digits in `radix`, after optional
/// whitespace and sign. Trailing garbage is ignored; no digits is `None`.
fn parse_leading_int(text: &str, radix: u32) -> Option<i64> {
    let text = text.trim_start();
    let (negative, digits) = match text.as_bytes().first() {
        Some(b'-') => (true, &text[1..]),
        Some(b'+') => (false, &text[1..]),
        _ => (false, text),
    };

    let mut value: i64 = 0;
    let mut seen = false;
    for c in digits.chars() {
        let Some(d) = c.to_digit(radix) else { break };
        value = value.checked_mul(radix as i64)?.checked_add(d as i64)?;
        seen = true;
    }

    if !seen {
        return None;
    }
    Some(if negative { -value } else { value })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> RawBatteryStatus {
        RawBatteryStatus::Text(s.to_string())
    }

    #[test]
    fn test_bucket_edges() {
        let table = [
            (0u8, BatteryLevel::Empty),
            (1, BatteryLevel::Critical),
            (10, BatteryLevel::Critical),
            (11, BatteryLevel::Low),
            (25, BatteryLevel::Low),
            (26, BatteryLevel::MidLow),
            (50, BatteryLevel::MidLow),
            (51, BatteryLevel::Medium),
            (70, BatteryLevel::Medium),
            (71, BatteryLevel::MidHigh),
            (85, BatteryLevel::MidHigh),
            (86, BatteryLevel::High),
            (99, BatteryLevel::High),
            (100, BatteryLevel::Full),
            (101, BatteryLevel::Full),
            (127, BatteryLevel::Full),
        ];
        for (pct, expected) in table {
            assert_eq!(BatteryLevel::from_percentage(pct), expected, "pct={}", pct);
            let reading = decode(&RawBatteryStatus::Int(pct as i64));
            assert_eq!(reading.level, expected, "pct={}", pct);
            assert_eq!(reading.percentage, pct);
        }
    }

    #[test]
    fn test_charging_critical_from_binary_text() {
        let reading = decode(&text("0b10000101"));
        assert!(reading.is_charging);
        assert_eq!(reading.percentage, 5);
        assert_eq!(reading.level, BatteryLevel::Critical);
        assert_eq!(reading.label, "Critical (5%) ⚡");
        assert_eq!(reading.color, "bg-red-100 text-red-700");
    }

    #[test]
    fn test_decimal_text_and_number_agree() {
        assert_eq!(decode(&text("133")), decode(&RawBatteryStatus::Int(133)));
        assert_eq!(decode(&text("  64")).percentage, 64);
        assert_eq!(decode(&text("64%")).percentage, 64);
        assert_eq!(decode(&RawBatteryStatus::Float(64.9)).percentage, 64);
        assert_eq!(decode(&RawBatteryStatus::Float(1e15)), decode(&RawBatteryStatus::Int(1_000_000_000_000_000)));
    }

    #[test]
    fn test_not_charging_label() {
        let reading = decode(&RawBatteryStatus::Int(100));
        assert!(!reading.is_charging);
        assert_eq!(reading.label, "Full (100%)");
    }

    #[test]
    fn test_unparseable_is_unknown() {
        for bad in [
            text("abc"),
            text(""),
            text("0b"),
            text("0b2"),
            text("99999999999999999999"),
            RawBatteryStatus::Float(f64::NAN),
            RawBatteryStatus::Float(f64::INFINITY),
            RawBatteryStatus::Float(1e20),
            RawBatteryStatus::Float(-1e20),
        ] {
            let reading = decode(&bad);
            assert_eq!(reading.level, BatteryLevel::Unknown, "{:?}", bad);
            assert_eq!(reading.label, "Unknown");
            assert_eq!(reading.percentage, 0);
            assert!(!reading.is_charging);
        }
    }

    #[test]
    fn test_total_over_byte_range() {
        for raw in 0..=255i64 {
            let reading = decode(&RawBatteryStatus::Int(raw));
            assert_ne!(reading.level, BatteryLevel::Unknown);
            assert_eq!(reading.is_charging, (raw >> 7) & 1 == 1);
            assert_eq!(reading.percentage as i64, raw & 0x7F);
        }
    }
}
