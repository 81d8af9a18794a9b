use chrono::{
    DateTime, DurationRound, FixedOffset, Local, MappedLocalTime, NaiveDate, NaiveDateTime,
    NaiveTime, TimeDelta,
};
use itertools::Itertools;

use crate::{
    api::provider::IntervalReading, core::series::Series, prelude::*, quantity::energy::WattHours,
};

/// Convert raw load-curve readings into hourly means.
///
/// The provider timestamps each reading at the *end* of the interval it covers,
/// so every timestamp is shifted back by the interval length before it is floored
/// to its hour. Readings landing in the same hour are averaged, rounded to two decimals.
pub fn normalize_load_curve(
    readings: &[IntervalReading],
) -> Series<DateTime<FixedOffset>, WattHours> {
    const ONE_HOUR: TimeDelta = TimeDelta::hours(1);

    readings
        .iter()
        .filter_map(|reading| {
            let timestamp = parse_timestamp(&reading.date)?;
            let shift = TimeDelta::minutes(interval_minutes(reading.interval_length.as_deref()));
            let start = (timestamp - shift).duration_trunc(ONE_HOUR).unwrap();
            Some((resolve_local(start)?, reading.value))
        })
        .into_group_map_by(|(start, _)| *start)
        .into_iter()
        .map(|(start, readings)| {
            #[allow(clippy::cast_precision_loss)]
            let n = readings.len() as f64;
            let mean = readings.into_iter().map(|(_, value)| value).sum::<f64>() / n;
            (start, WattHours::from((mean * 100.0).round() / 100.0))
        })
        .sorted_by_key(|(start, _)| *start)
        .collect()
}

/// Convert daily totals into points at local midnight, one point per reading.
pub fn normalize_daily(readings: &[IntervalReading]) -> Series<DateTime<FixedOffset>, WattHours> {
    readings
        .iter()
        .filter_map(|reading| {
            let timestamp = parse_timestamp(&reading.date)?;
            Some((resolve_local(timestamp)?, WattHours::from(reading.value)))
        })
        .collect()
}

/// Parse a provider timestamp, accepting either a full timestamp or a bare date at midnight.
fn parse_timestamp(date: &str) -> Option<NaiveDateTime> {
    if let Ok(timestamp) = NaiveDateTime::parse_from_str(date, "%Y-%m-%d %H:%M:%S") {
        return Some(timestamp);
    }
    if let Ok(date) = NaiveDate::parse_from_str(date, "%Y-%m-%d") {
        return Some(date.and_time(NaiveTime::MIN));
    }
    warn!(date, "failed to parse the reading timestamp");
    None
}

/// Minutes covered by a reading: the first number in the period designator,
/// or one minute when the designator is absent.
fn interval_minutes(interval_length: Option<&str>) -> i64 {
    interval_length
        .and_then(|interval| {
            interval
                .chars()
                .skip_while(|char| !char.is_ascii_digit())
                .take_while(char::is_ascii_digit)
                .collect::<String>()
                .parse()
                .ok()
        })
        .unwrap_or(1)
}

fn resolve_local(timestamp: NaiveDateTime) -> Option<DateTime<FixedOffset>> {
    match timestamp.and_local_timezone(Local) {
        MappedLocalTime::Single(timestamp) | MappedLocalTime::Ambiguous(timestamp, _) => {
            Some(timestamp.fixed_offset())
        }

        MappedLocalTime::None => {
            warn!(%timestamp, "the timestamp does not exist in the local time zone");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reading(date: &str, value: f64, interval_length: Option<&str>) -> IntervalReading {
        IntervalReading {
            value,
            date: date.to_string(),
            interval_length: interval_length.map(str::to_string),
        }
    }

    fn datetime(year: i32, month: u32, day: u32, hour: u32, minute: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(year, month, day).unwrap().and_hms_opt(hour, minute, 0).unwrap()
    }

    #[test]
    fn test_load_curve_half_hourly() {
        let readings = [
            reading("2024-01-01 00:30:00", 100.0, Some("PT30M")),
            reading("2024-01-01 01:00:00", 300.0, Some("PT30M")),
            reading("2024-01-01 01:30:00", 500.0, Some("PT30M")),
        ];
        let series = normalize_load_curve(&readings);

        assert_eq!(series.len(), 2);

        assert_eq!(series[0].0.naive_local(), datetime(2024, 1, 1, 0, 0));
        assert_eq!(series[0].1, WattHours::from(200.0));

        assert_eq!(series[1].0.naive_local(), datetime(2024, 1, 1, 1, 0));
        assert_eq!(series[1].1, WattHours::from(500.0));
    }

    /// Without a period designator the reading is assumed to cover one minute,
    /// so a reading stamped at the top of an hour belongs to the previous hour.
    #[test]
    fn test_load_curve_default_interval() {
        let readings = [reading("2024-01-01 02:00:00", 100.0, None)];
        let series = normalize_load_curve(&readings);

        assert_eq!(series.len(), 1);
        assert_eq!(series[0].0.naive_local(), datetime(2024, 1, 1, 1, 0));
        assert_eq!(series[0].1, WattHours::from(100.0));
    }

    #[test]
    fn test_load_curve_rounds_the_mean() {
        let readings = [
            reading("2024-01-01 00:20:00", 1.0, Some("PT20M")),
            reading("2024-01-01 00:40:00", 2.0, Some("PT20M")),
            reading("2024-01-01 01:00:00", 2.0, Some("PT20M")),
        ];
        let series = normalize_load_curve(&readings);

        assert_eq!(series.len(), 1);
        assert_eq!(series[0].0.naive_local(), datetime(2024, 1, 1, 0, 0));
        assert_eq!(series[0].1, WattHours::from(1.67));
    }

    #[test]
    fn test_load_curve_empty() {
        assert!(normalize_load_curve(&[]).is_empty());
    }

    #[test]
    fn test_load_curve_skips_unparseable_timestamps() {
        let readings = [
            reading("whenever", 100.0, Some("PT30M")),
            reading("2024-01-01 00:30:00", 300.0, Some("PT30M")),
        ];
        let series = normalize_load_curve(&readings);

        assert_eq!(series.len(), 1);
        assert_eq!(series[0].0.naive_local(), datetime(2024, 1, 1, 0, 0));
        assert_eq!(series[0].1, WattHours::from(300.0));
    }

    #[test]
    fn test_daily_at_local_midnight() {
        let readings = [reading("2024-03-01", 4000.0, None), reading("2024-03-02", 5000.0, None)];
        let series = normalize_daily(&readings);

        assert_eq!(series.len(), 2);

        assert_eq!(series[0].0.naive_local(), datetime(2024, 3, 1, 0, 0));
        assert_eq!(series[0].1, WattHours::from(4000.0));

        assert_eq!(series[1].0.naive_local(), datetime(2024, 3, 2, 0, 0));
        assert_eq!(series[1].1, WattHours::from(5000.0));
    }

    #[test]
    fn test_interval_minutes() {
        assert_eq!(interval_minutes(Some("PT30M")), 30);
        assert_eq!(interval_minutes(Some("PT60M")), 60);
        assert_eq!(interval_minutes(Some("PT1H30M")), 1);
        assert_eq!(interval_minutes(Some("soon")), 1);
        assert_eq!(interval_minutes(None), 1);
    }
}
