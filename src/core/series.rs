use std::ops::Add;

use chrono::{DateTime, FixedOffset};
use serde::Serialize;

pub type Point<K, V> = (K, V);
pub type Series<K, V> = Vec<Point<K, V>>;

/// One point of a long-term statistic: the hour's own value and the running total.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct StatisticPoint<V> {
    pub start: DateTime<FixedOffset>,
    pub state: V,
    pub sum: V,
}

impl<T> Accumulate for T where T: ?Sized {}

pub trait Accumulate {
    /// Turn a value series into a cumulative statistic series.
    ///
    /// Each point keeps its own value as `state`, and `sum` carries the total of all states
    /// up to and including the point. The first point's sum equals its state.
    #[must_use]
    fn accumulate<V>(self) -> Vec<StatisticPoint<V>>
    where
        Self: Sized + Iterator<Item = Point<DateTime<FixedOffset>, V>>,
        V: Copy + Add<V, Output = V>,
    {
        let mut running: Option<V> = None;
        self.map(|(start, state)| {
            let sum = running.map_or(state, |total| total + state);
            running = Some(sum);
            StatisticPoint { start, state, sum }
        })
        .collect()
    }
}

/// Raise every `sum` by `offset`, leaving the states untouched.
///
/// Continues a previously persisted series from its stored total.
#[must_use]
pub fn shift_sums<V>(points: &[StatisticPoint<V>], offset: V) -> Vec<StatisticPoint<V>>
where
    V: Copy + Add<V, Output = V>,
{
    points.iter().map(|point| StatisticPoint { sum: point.sum + offset, ..*point }).collect()
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use chrono::{NaiveDate, TimeDelta};

    use super::*;
    use crate::quantity::energy::{KilowattHours, WattHours};

    fn hour(hour: u32) -> DateTime<FixedOffset> {
        NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
            .and_local_timezone(FixedOffset::east_opt(3600).unwrap())
            .unwrap()
    }

    #[test]
    fn test_accumulate_running_sums() {
        let series = vec![(hour(0), WattHours(100.0)), (hour(1), WattHours(50.0))];
        let statistics = series.into_iter().accumulate();
        assert_eq!(statistics.len(), 2);
        assert_eq!(statistics[0].state, WattHours(100.0));
        assert_eq!(statistics[0].sum, WattHours(100.0));
        assert_eq!(statistics[1].state, WattHours(50.0));
        assert_eq!(statistics[1].sum, WattHours(150.0));
    }

    #[test]
    fn test_accumulate_empty() {
        let statistics = Vec::<(DateTime<FixedOffset>, WattHours)>::new().into_iter().accumulate();
        assert!(statistics.is_empty());
    }

    #[test]
    fn test_accumulate_monotonic() {
        let series: Series<_, _> =
            (0..10).map(|index| (hour(index), WattHours(f64::from(index % 3)))).collect();
        let statistics = series.into_iter().accumulate();
        for window in statistics.windows(2) {
            assert!(window[1].sum >= window[0].sum);
            assert_eq!(window[1].sum - window[0].sum, window[1].state);
        }
    }

    #[test]
    fn test_shift_sums_by_zero_is_identity() {
        let statistics =
            vec![(hour(0), WattHours(100.0)), (hour(1), WattHours(50.0))].into_iter().accumulate();
        assert_eq!(shift_sums(&statistics, WattHours::ZERO), statistics);
    }

    #[test]
    fn test_shift_sums_keeps_states() {
        let statistics = vec![(hour(0), WattHours(100.0))].into_iter().accumulate();
        let shifted = shift_sums(&statistics, WattHours(1500.0));
        assert_eq!(shifted[0].state, WattHours(100.0));
        assert_eq!(shifted[0].sum, WattHours(1600.0));
    }

    /// One day of hourly readings, rising to 1.2 kWh at noon and falling back.
    #[test]
    fn test_accumulate_full_day() {
        let start = hour(0);
        let series: Series<_, _> = (0..24)
            .map(|index| {
                let value = 0.1 * f64::from(if index <= 12 { index } else { 24 - index });
                (start + TimeDelta::hours(i64::from(index)), WattHours::from(KilowattHours(value)))
            })
            .collect();
        let statistics = series.into_iter().accumulate();
        assert_eq!(statistics[0].state, WattHours::ZERO);
        assert_eq!(statistics[0].sum, WattHours::ZERO);
        assert_abs_diff_eq!(statistics[1].state.0, 100.0, epsilon = 1e-9);
        assert_abs_diff_eq!(statistics[1].sum.0, 100.0, epsilon = 1e-9);
        assert_abs_diff_eq!(statistics[12].state.0, 1200.0, epsilon = 1e-9);
        assert_abs_diff_eq!(statistics[12].sum.0, 7800.0, epsilon = 1e-9);
        assert_abs_diff_eq!(statistics[23].sum.0, 14400.0, epsilon = 1e-9);
    }
}
