use chrono::{DateTime, FixedOffset, NaiveDate, TimeDelta};

use crate::{
    api::provider::{DateRange, FetchError, MeteringProvider},
    core::{
        normalize::{normalize_daily, normalize_load_curve},
        series::Series,
    },
    prelude::*,
    quantity::energy::WattHours,
};

/// The provider keeps the load curve for the last week only.
const LOAD_CURVE_DAYS: i64 = 7;

/// Daily history is bounded too, requested in chunks going backward.
const DAILY_CHUNK_DAYS: i64 = 150;
const DAILY_MAX_CHUNKS: usize = 10;

/// Fetch hourly history covering `[first_day, today)`, or as much of it as
/// the provider holds when `first_day` is `None`.
///
/// The walk starts at `today` and goes backward: first the fine-grained load
/// curve, then daily totals in coarser chunks until `first_day` is reached,
/// the provider runs out of history, or a request fails. Failures terminate
/// the walk and keep whatever has been fetched, down to an empty series.
pub async fn fetch_history(
    provider: &impl MeteringProvider,
    first_day: Option<NaiveDate>,
    today: NaiveDate,
) -> Series<DateTime<FixedOffset>, WattHours> {
    let mut blocks = Vec::new();
    let mut offset_days = 0;

    // Reaching `first_day` ends the walk even when the request itself fails:
    // the daily tier never covers the load-curve window.
    let (range, complete) = chunk_range(today, offset_days, LOAD_CURVE_DAYS, first_day);
    match provider.load_curve(range.clone()).await {
        Ok(readings) => {
            blocks.push(normalize_load_curve(&readings));
            offset_days += LOAD_CURVE_DAYS;
        }
        Err(FetchError::NoData) => {
            info!(?range, "no load curve is available");
        }
        Err(FetchError::Transport(error)) => {
            warn!(?range, "failed to fetch the load curve: {error:#}");
        }
    }

    if !complete {
        for _ in 0..DAILY_MAX_CHUNKS {
            let (range, clamped) = chunk_range(today, offset_days, DAILY_CHUNK_DAYS, first_day);
            match provider.daily_energy(range.clone()).await {
                Ok(readings) => {
                    blocks.push(normalize_daily(&readings));
                    offset_days += DAILY_CHUNK_DAYS;
                    if clamped {
                        break;
                    }
                }
                Err(FetchError::NoData) => {
                    info!(?range, "reached the end of the daily history");
                    break;
                }
                Err(FetchError::Transport(error)) => {
                    warn!(?range, "failed to fetch daily readings: {error:#}");
                    break;
                }
            }
        }
    }

    assemble(blocks, first_day)
}

/// Chunk of `chunk_days` days ending `offset_days` before `today`,
/// clamped to `first_day` when the walk would step at or past it.
fn chunk_range(
    today: NaiveDate,
    offset_days: i64,
    chunk_days: i64,
    first_day: Option<NaiveDate>,
) -> (DateRange, bool) {
    let until = today - TimeDelta::days(offset_days);
    let since = until - TimeDelta::days(chunk_days);
    match first_day {
        Some(first_day) if since <= first_day => (first_day..until, true),
        _ => (since..until, false),
    }
}

/// Concatenate the blocks in chronological order.
///
/// Blocks arrive newest-first and may overlap at tier boundaries: a coarser
/// point is kept only when it falls strictly before the earliest instant
/// already covered, and never before `first_day`.
fn assemble(
    blocks: Vec<Series<DateTime<FixedOffset>, WattHours>>,
    first_day: Option<NaiveDate>,
) -> Series<DateTime<FixedOffset>, WattHours> {
    let mut earliest: Option<DateTime<FixedOffset>> = None;
    let mut filtered = Vec::with_capacity(blocks.len());
    for block in blocks {
        let cutoff = earliest;
        let block: Series<DateTime<FixedOffset>, WattHours> = block
            .into_iter()
            .filter(|(start, _)| {
                cutoff.is_none_or(|cutoff| *start < cutoff)
                    && first_day.is_none_or(|first_day| start.date_naive() >= first_day)
            })
            .collect();
        if let Some((start, _)) = block.first() {
            earliest = Some(cutoff.map_or(*start, |cutoff| cutoff.min(*start)));
        }
        filtered.push(block);
    }
    filtered.into_iter().rev().flatten().collect()
}
