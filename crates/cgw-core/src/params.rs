//! Request parameter parsing: timestamps, spatial bounds and flags.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{GatewayError, GatewayResult};

/// Resolve an optional `timestamp` parameter (seconds since epoch, may be
/// fractional) to a UTC instant, falling back to `default` when absent.
pub fn parse_timestamp(raw: Option<&str>, default: DateTime<Utc>) -> GatewayResult<DateTime<Utc>> {
    let Some(raw) = raw else {
        return Ok(default);
    };

    let invalid = || GatewayError::client_input("Timestamp parameter is not a valid unix timestamp");

    let secs: f64 = raw.trim().parse().map_err(|_| invalid())?;
    if !secs.is_finite() {
        return Err(invalid());
    }

    let whole = secs.floor();
    let nanos = ((secs - whole) * 1e9).round() as u32;
    DateTime::from_timestamp(whole as i64, nanos.min(999_999_999)).ok_or_else(invalid)
}

/// Axis-aligned integer box. A point `p` is inside when `min <= p < max`
/// on every axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bounds {
    pub min: [i64; 3],
    pub max: [i64; 3],
}

impl Bounds {
    /// Parse the `x0-x1_y0-y1_z0-z1` query form.
    pub fn parse(raw: &str) -> GatewayResult<Self> {
        let invalid = || {
            GatewayError::client_input(format!(
                "Malformed bounds '{raw}', expected x0-x1_y0-y1_z0-z1"
            ))
        };

        let axes: Vec<&str> = raw.trim().split('_').collect();
        if axes.len() != 3 {
            return Err(invalid());
        }

        let mut min = [0i64; 3];
        let mut max = [0i64; 3];
        for (axis, part) in axes.iter().enumerate() {
            let (lo, hi) = part.split_once('-').ok_or_else(invalid)?;
            min[axis] = lo.parse().map_err(|_| invalid())?;
            max[axis] = hi.parse().map_err(|_| invalid())?;
            if min[axis] > max[axis] {
                return Err(invalid());
            }
        }

        Ok(Self { min, max })
    }

    /// Parse an optional bounds parameter; empty strings count as absent.
    pub fn parse_opt(raw: Option<&str>) -> GatewayResult<Option<Self>> {
        match raw.map(str::trim) {
            None | Some("") => Ok(None),
            Some(raw) => Self::parse(raw).map(Some),
        }
    }

    pub fn contains(&self, point: [i64; 3]) -> bool {
        (0..3).all(|axis| self.min[axis] <= point[axis] && point[axis] < self.max[axis])
    }
}

/// Parse a boolean query flag (`true/false/1/0`, case-insensitive).
pub fn parse_flag(raw: Option<&str>, name: &str) -> GatewayResult<bool> {
    match raw.map(|s| s.trim().to_ascii_lowercase()).as_deref() {
        None | Some("") => Ok(false),
        Some("true") | Some("1") => Ok(true),
        Some("false") | Some("0") => Ok(false),
        Some(other) => Err(GatewayError::client_input(format!(
            "Parameter '{name}' must be a boolean, got '{other}'"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp_default_and_parse() {
        let now = Utc::now();
        assert_eq!(parse_timestamp(None, now).unwrap(), now);

        let ts = parse_timestamp(Some("1600000000.5"), now).unwrap();
        assert_eq!(ts.timestamp(), 1_600_000_000);
        assert_eq!(ts.timestamp_subsec_millis(), 500);
    }

    #[test]
    fn test_timestamp_rejects_garbage() {
        let now = Utc::now();
        for raw in ["yesterday", "", "NaN", "inf", "1e300"] {
            let err = parse_timestamp(Some(raw), now).unwrap_err();
            assert_eq!(err.status_code(), 400, "{raw}");
        }
    }

    #[test]
    fn test_bounds_parse() {
        let b = Bounds::parse("0-10_0-10_0-5").unwrap();
        assert_eq!(b.min, [0, 0, 0]);
        assert_eq!(b.max, [10, 10, 5]);
        assert!(b.contains([9, 0, 4]));
        assert!(!b.contains([10, 0, 4]));
    }

    #[test]
    fn test_bounds_malformed() {
        for raw in ["abc", "0-10_0-10", "0-10_0-10_5-0", "0-10_a-b_0-5", "0_1_2"] {
            assert_eq!(Bounds::parse(raw).unwrap_err().status_code(), 400, "{raw}");
        }
        assert_eq!(Bounds::parse_opt(Some("")).unwrap(), None);
    }

    #[test]
    fn test_flag() {
        assert!(parse_flag(Some("True"), "partners").unwrap());
        assert!(!parse_flag(None, "partners").unwrap());
        assert!(parse_flag(Some("maybe"), "partners").is_err());
    }
}
