use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, NaiveTime};
use enumset::{EnumSet, EnumSetType};
use serde::{Deserialize, Deserializer, Serialize};

use crate::{
    core::series::{Point, Series},
    quantity::{cost::Euros, energy::WattHours, rate::KilowattHourRate},
};

/// Day-of-week literal as it appears in the configuration.
#[derive(EnumSetType, Debug, Deserialize, Serialize)]
#[enumset(serialize_repr = "list")]
#[serde(rename_all = "lowercase")]
pub enum Weekday {
    Mon,
    Tue,
    Wed,
    Thu,
    Fri,
    Sat,
    Sun,
}

impl From<chrono::Weekday> for Weekday {
    fn from(weekday: chrono::Weekday) -> Self {
        match weekday {
            chrono::Weekday::Mon => Self::Mon,
            chrono::Weekday::Tue => Self::Tue,
            chrono::Weekday::Wed => Self::Wed,
            chrono::Weekday::Thu => Self::Thu,
            chrono::Weekday::Fri => Self::Fri,
            chrono::Weekday::Sat => Self::Sat,
            chrono::Weekday::Sun => Self::Sun,
        }
    }
}

/// One pricing rule. Rules are tried in configuration order,
/// and the first rule whose filters all pass prices the point.
#[derive(Debug, Default, Deserialize)]
pub struct CostRule {
    /// Static price.
    pub price: Option<KilowattHourRate>,

    /// Entity whose recorded history provides the price.
    pub entity_id: Option<String>,

    /// Inclusive lower `HH:MM` bound.
    #[serde(default, deserialize_with = "deserialize_hour_minute")]
    pub after: Option<NaiveTime>,

    /// Exclusive upper `HH:MM` bound.
    #[serde(default, deserialize_with = "deserialize_hour_minute")]
    pub before: Option<NaiveTime>,

    /// Empty set means any day.
    #[serde(default)]
    pub weekdays: EnumSet<Weekday>,

    /// Inclusive.
    pub start_date: Option<NaiveDate>,

    /// Exclusive.
    pub end_date: Option<NaiveDate>,
}

impl CostRule {
    /// Check whether the rule applies to the hour starting at `start`,
    /// comparing in local wall-clock time.
    fn matches(&self, start: DateTime<FixedOffset>) -> bool {
        if self.price.is_none() && self.entity_id.is_none() {
            return false;
        }
        let local = start.naive_local();
        if let Some(start_date) = self.start_date
            && local.date() < start_date
        {
            return false;
        }
        if let Some(end_date) = self.end_date
            && local.date() >= end_date
        {
            return false;
        }
        if !self.weekdays.is_empty() && !self.weekdays.contains(Weekday::from(local.weekday())) {
            return false;
        }
        if let Some(after) = self.after
            && local.time() < after
        {
            return false;
        }
        if let Some(before) = self.before
            && local.time() >= before
        {
            return false;
        }
        true
    }
}

fn deserialize_hour_minute<'de, D>(deserializer: D) -> Result<Option<NaiveTime>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<String>::deserialize(deserializer)? {
        Some(time) => NaiveTime::parse_from_str(&time, "%H:%M")
            .map(Some)
            .map_err(serde::de::Error::custom),
        None => Ok(None),
    }
}

/// Recorded price history per entity, for the entity-based rules.
#[derive(Debug, Default)]
pub struct PriceIndex(HashMap<String, BTreeMap<DateTime<FixedOffset>, KilowattHourRate>>);

impl PriceIndex {
    pub fn push(&mut self, entity_id: &str, at: DateTime<FixedOffset>, rate: KilowattHourRate) {
        self.0.entry(entity_id.to_string()).or_default().insert(at, rate);
    }

    /// Latest rate recorded at or before the given instant.
    pub fn resolve(&self, entity_id: &str, at: DateTime<FixedOffset>) -> Option<KilowattHourRate> {
        self.0.get(entity_id)?.range(..=at).next_back().map(|(_, rate)| *rate)
    }
}

/// Price each energy point with the first matching rule, rounding to mills.
///
/// A point with no matching rule produces no cost. Neither does a point priced
/// by an entity whose history starts only after the point.
pub fn compute_costs(
    energy: &[Point<DateTime<FixedOffset>, WattHours>],
    rules: &[CostRule],
    prices: &PriceIndex,
) -> Series<DateTime<FixedOffset>, Euros> {
    energy
        .iter()
        .filter_map(|(start, state)| {
            let rule = rules.iter().find(|rule| rule.matches(*start))?;
            let rate = match rule.price {
                Some(price) => price,
                None => prices.resolve(rule.entity_id.as_deref()?, *start)?,
            };
            Some((*start, (*state * rate).round_to_mills()))
        })
        .collect()
}
