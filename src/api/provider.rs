use std::ops::Range;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Deserialize;
use serde_with::serde_as;

use crate::prelude::*;

/// Requested day range: the start is inclusive, the end is exclusive.
pub type DateRange = Range<NaiveDate>;

/// One raw meter reading as reported by the provider.
///
/// Load-curve readings carry an `interval_length` such as `PT30M`, meaning the value covers
/// the preceding interval ending at `date`. Daily readings carry a bare date.
#[serde_as]
#[derive(Clone, Debug, Deserialize)]
pub struct IntervalReading {
    #[serde_as(as = "serde_with::DisplayFromStr")]
    pub value: f64,

    pub date: String,

    #[serde(default)]
    pub interval_length: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// The provider has no readings in the requested range.
    #[error("no data available in the requested range")]
    NoData,

    #[error(transparent)]
    Transport(#[from] Error),
}

pub type FetchResult<T> = Result<T, FetchError>;

/// Meter history endpoints of the energy provider.
#[async_trait]
pub trait MeteringProvider: Sync {
    /// Fetch sub-hourly load-curve readings, available for the recent past only.
    async fn load_curve(&self, range: DateRange) -> FetchResult<Vec<IntervalReading>>;

    /// Fetch daily totals, available further back in time.
    async fn daily_energy(&self, range: DateRange) -> FetchResult<Vec<IntervalReading>>;
}
