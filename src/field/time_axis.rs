use super::FieldError;
use chrono::{Duration, NaiveDate, NaiveDateTime};

/// Decoded CF time units, e.g. `seconds since 1950-01-01 00:00:00`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeUnits {
    pub seconds_per_unit: f64,
    pub epoch: NaiveDateTime,
}

impl TimeUnits {
    pub fn parse(units: &str) -> Result<Self, FieldError> {
        let err = || FieldError::TimeUnits(units.to_string());
        let (unit, epoch) = units.trim().split_once(" since ").ok_or_else(err)?;

        let seconds_per_unit = match unit.trim().to_ascii_lowercase().as_str() {
            "seconds" | "second" | "secs" | "sec" | "s" => 1.0,
            "minutes" | "minute" | "mins" | "min" => 60.0,
            "hours" | "hour" | "hrs" | "hr" | "h" => 3600.0,
            "days" | "day" | "d" => 86_400.0,
            _ => return Err(err()),
        };

        Ok(TimeUnits {
            seconds_per_unit,
            epoch: parse_epoch(epoch.trim()).ok_or_else(err)?,
        })
    }

    pub fn to_datetime(&self, value: f64) -> NaiveDateTime {
        let millis = (value * self.seconds_per_unit * 1000.0).round() as i64;
        self.epoch + Duration::milliseconds(millis)
    }
}

fn parse_epoch(epoch: &str) -> Option<NaiveDateTime> {
    // Drop a trailing UTC marker, NEMO files sometimes carry one
    let epoch = epoch
        .trim_end_matches(" UTC")
        .trim_end_matches('Z')
        .trim();
    for fmt in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(epoch, fmt) {
            return Some(dt);
        }
    }
    NaiveDate::parse_from_str(epoch, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

/// Position of a time inside the axis: interpolate between `lower` and
/// `upper` with weight `weight` on `upper`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeBracket {
    pub lower: usize,
    pub upper: usize,
    pub weight: f64,
}

/// Field time axis in seconds relative to `origin`, strictly increasing.
#[derive(Debug, Clone)]
pub struct TimeAxis {
    pub origin: NaiveDateTime,
    pub times: Vec<f64>,
    pub allow_extrapolation: bool,
}

impl TimeAxis {
    pub fn new(
        origin: NaiveDateTime,
        times: Vec<f64>,
        allow_extrapolation: bool,
    ) -> Result<Self, FieldError> {
        if times.is_empty() {
            return Err(FieldError::InvalidData("empty time axis".to_string()));
        }
        if let Some(w) = times.windows(2).position(|w| w[1] <= w[0]) {
            return Err(FieldError::InvalidData(format!(
                "time axis not increasing at index {}: {} -> {}",
                w + 1,
                times[w],
                times[w + 1]
            )));
        }
        Ok(TimeAxis {
            origin,
            times,
            allow_extrapolation,
        })
    }

    /// Build the axis from absolute datetimes, with the first one as origin.
    pub fn from_datetimes(
        datetimes: &[NaiveDateTime],
        allow_extrapolation: bool,
    ) -> Result<Self, FieldError> {
        let origin = *datetimes
            .first()
            .ok_or_else(|| FieldError::InvalidData("empty time axis".to_string()))?;
        let times = datetimes
            .iter()
            .map(|dt| (*dt - origin).num_milliseconds() as f64 / 1000.0)
            .collect();
        TimeAxis::new(origin, times, allow_extrapolation)
    }

    pub fn n_times(&self) -> usize {
        self.times.len()
    }

    pub fn first(&self) -> f64 {
        self.times[0]
    }

    pub fn last(&self) -> f64 {
        self.times[self.times.len() - 1]
    }

    pub fn bracket(&self, t: f64) -> Result<TimeBracket, FieldError> {
        let n = self.times.len();
        let clamp = |index: usize| TimeBracket {
            lower: index,
            upper: index,
            weight: 0.0,
        };

        if t < self.first() || t > self.last() {
            if !self.allow_extrapolation {
                return Err(FieldError::TimeExtrapolation(t));
            }
            return Ok(if t < self.first() { clamp(0) } else { clamp(n - 1) });
        }
        if n == 1 {
            return Ok(clamp(0));
        }

        // Last index with times[i] <= t
        let lower = self.times.partition_point(|&x| x <= t).saturating_sub(1).min(n - 2);
        let (t0, t1) = (self.times[lower], self.times[lower + 1]);
        Ok(TimeBracket {
            lower,
            upper: lower + 1,
            weight: (t - t0) / (t1 - t0),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd_hms(y: i32, m: u32, d: u32, h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_parse_units() {
        let units = TimeUnits::parse("seconds since 1950-01-01 00:00:00").unwrap();
        assert_eq!(units.seconds_per_unit, 1.0);
        assert_eq!(units.epoch, ymd_hms(1950, 1, 1, 0));

        let units = TimeUnits::parse("hours since 2006-11-01").unwrap();
        assert_eq!(units.seconds_per_unit, 3600.0);
        assert_eq!(units.to_datetime(12.0), ymd_hms(2006, 11, 1, 12));

        let units = TimeUnits::parse("days since 1900-01-01T00:00:00Z").unwrap();
        assert_eq!(units.to_datetime(1.5), ymd_hms(1900, 1, 2, 12));

        assert!(TimeUnits::parse("fortnights since 1950-01-01").is_err());
        assert!(TimeUnits::parse("seconds").is_err());
    }

    #[test]
    fn test_from_datetimes() {
        let axis = TimeAxis::from_datetimes(
            &[ymd_hms(2006, 11, 1, 12), ymd_hms(2006, 11, 2, 12)],
            true,
        )
        .unwrap();
        assert_eq!(axis.origin, ymd_hms(2006, 11, 1, 12));
        assert_eq!(axis.times, vec![0.0, 86_400.0]);
    }

    #[test]
    fn test_rejects_non_increasing_axis() {
        let origin = ymd_hms(2000, 1, 1, 0);
        assert!(TimeAxis::new(origin, vec![0.0, 10.0, 10.0], true).is_err());
        assert!(TimeAxis::new(origin, vec![], true).is_err());
    }

    #[test]
    fn test_bracket_interior_and_edges() {
        let origin = ymd_hms(2000, 1, 1, 0);
        let axis = TimeAxis::new(origin, vec![0.0, 100.0, 200.0], false).unwrap();

        let b = axis.bracket(150.0).unwrap();
        assert_eq!((b.lower, b.upper), (1, 2));
        assert!((b.weight - 0.5).abs() < 1e-12);

        let b = axis.bracket(100.0).unwrap();
        assert_eq!((b.lower, b.upper), (1, 2));
        assert_eq!(b.weight, 0.0);

        let b = axis.bracket(200.0).unwrap();
        assert_eq!((b.lower, b.upper), (1, 2));
        assert_eq!(b.weight, 1.0);

        assert!(matches!(
            axis.bracket(250.0),
            Err(FieldError::TimeExtrapolation(_))
        ));
    }

    #[test]
    fn test_extrapolation_clamps() {
        let origin = ymd_hms(2000, 1, 1, 0);
        let axis = TimeAxis::new(origin, vec![0.0, 100.0], true).unwrap();

        let b = axis.bracket(-50.0).unwrap();
        assert_eq!((b.lower, b.upper, b.weight), (0, 0, 0.0));
        let b = axis.bracket(1e9).unwrap();
        assert_eq!((b.lower, b.upper, b.weight), (1, 1, 0.0));

        let single = TimeAxis::new(origin, vec![0.0], true).unwrap();
        let b = single.bracket(3600.0).unwrap();
        assert_eq!((b.lower, b.upper), (0, 0));
    }
}
