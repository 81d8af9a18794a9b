use std::{fmt, path::PathBuf, time::SystemTime};

use chrono::{DateTime, FixedOffset, Local, TimeDelta, Timelike};
use clap::Parser;
use itertools::Itertools;
use tokio::time::sleep;

use crate::{
    api::{
        enedis,
        home_assistant::{self, Client, StatisticsMetadata},
    },
    cli::HomeAssistantArgs,
    config::{Action, MeterConfig, UserConfig},
    core::{
        cost::{CostRule, PriceIndex, compute_costs},
        planner::fetch_history,
        series::{Accumulate, Point, StatisticPoint, shift_sums},
    },
    prelude::*,
    quantity::{cost::Euros, energy::WattHours, rate::KilowattHourRate},
    tables::build_sync_table,
};

#[derive(Parser)]
pub struct SyncArgs {
    /// Path to the meter configuration file.
    #[clap(long, env = "MARMOT_CONFIG", default_value = "/data/options.toml")]
    pub config: PathBuf,

    /// Base URL of the metering gateway.
    #[clap(long = "gateway-url", env = "CONSO_API_URL", default_value = enedis::DEFAULT_URL)]
    pub gateway_url: String,

    /// Keep running and repeat on the morning schedule.
    #[clap(long)]
    pub watch: bool,

    #[clap(flatten)]
    pub home_assistant: HomeAssistantArgs,
}

#[instrument(skip_all)]
pub async fn sync(args: &SyncArgs) -> Result {
    let config = UserConfig::load(&args.config)?;
    run(args, &config, true).await?;

    if !args.watch {
        return Ok(());
    }

    let schedule = Schedule::with_jitter();
    info!(daily_at = %schedule, "watching…");
    loop {
        let now = Local::now();
        let tick = schedule.next_tick(now).context("failed to compute the next run time")?;
        debug!(%tick, "sleeping…");
        sleep((tick - now).to_std().unwrap_or_default()).await;
        if let Err(error) = run(args, &config, false).await {
            error!("synchronization failed: {error:#}");
        }
    }
}

/// One pass over the configured meters. Resets run on the first pass only.
async fn run(args: &SyncArgs, config: &UserConfig, with_resets: bool) -> Result {
    let mut client = args.home_assistant.connect().await?;

    if with_resets {
        reset_meters(&mut client, &config.meters).await?;
    }

    let meters = config.meters.iter().filter(|meter| meter.action == Action::Sync).collect_vec();
    if meters.is_empty() {
        client.disconnect().await?;
        info!("nothing to sync");
        return Ok(());
    }

    let mut summaries = Vec::new();
    for meter in meters {
        summaries.extend(sync_meter(&mut client, args, meter).await?);
    }
    client.disconnect().await?;

    if !summaries.is_empty() {
        println!("{}", build_sync_table(&summaries));
    }
    Ok(())
}

async fn reset_meters(client: &mut Client, meters: &[MeterConfig]) -> Result {
    for meter in meters.iter().filter(|meter| meter.action == Action::Reset) {
        let statistic_ids = vec![
            home_assistant::statistic_id(&meter.prm, meter.production),
            home_assistant::cost_statistic_id(&meter.prm, meter.production),
        ];
        client.clear_statistics(&statistic_ids).await?;
        info!(prm = meter.prm, "removed the recorded statistics");
    }
    Ok(())
}

/// Import the missing statistics of one meter: the energy series, and the cost
/// series when pricing rules are configured.
///
/// Returns a summary row per imported series, and nothing when the meter is
/// already up to date or the gateway has no history to offer.
#[instrument(skip_all, fields(prm = meter.prm, mode = meter.mode()))]
async fn sync_meter(
    client: &mut Client,
    args: &SyncArgs,
    meter: &MeterConfig,
) -> Result<Vec<SyncSummary>> {
    let api = enedis::Api::try_new(&args.gateway_url, &meter.token, &meter.prm, meter.production)?;
    let statistic_id = home_assistant::statistic_id(&meter.prm, meter.production);
    let now = Local::now();

    let (first_day, energy_offset) = if client.is_new_series(&statistic_id).await? {
        info!("new meter, starting the initial import…");
        (None, WattHours::ZERO)
    } else {
        let Some(last) = client.find_last_statistic(&statistic_id, now).await? else {
            warn!("the store lists the series but returned no points");
            return Ok(Vec::new());
        };
        if !sync_needed(last.start, now) {
            debug!("up to date");
            return Ok(Vec::new());
        }
        (Some(last.start.date_naive() + TimeDelta::days(1)), WattHours::from(last.sum))
    };

    let energy = fetch_history(&api, first_day, now.date_naive()).await;
    if energy.is_empty() {
        warn!("the gateway returned no history");
        return Ok(Vec::new());
    }

    let name = meter.display_name();
    let statistics = shift_sums(&energy.iter().copied().accumulate(), energy_offset);
    client
        .import_statistics(
            &StatisticsMetadata::builder()
                .name(&name)
                .statistic_id(&statistic_id)
                .unit_of_measurement("Wh")
                .build(),
            &statistics,
        )
        .await?;

    let mut summaries = Vec::new();
    summaries.extend(SyncSummary::try_new(&name, &statistic_id, &statistics));

    if !meter.prices.is_empty() {
        let prices = fetch_price_index(client, &meter.prices, &energy).await?;
        let costs = compute_costs(&energy, &meter.prices, &prices);
        if costs.is_empty() {
            warn!("no cost rule matched any energy point");
        } else {
            let statistic_id = home_assistant::cost_statistic_id(&meter.prm, meter.production);
            let offset = match first_day {
                Some(_) => client
                    .find_last_statistic(&statistic_id, now)
                    .await?
                    .map_or(Euros::ZERO, |last| Euros::from(last.sum)),
                None => Euros::ZERO,
            };
            let name = format!("{name} (costs)");
            let statistics = shift_sums(&costs.iter().copied().accumulate(), offset);
            client
                .import_statistics(
                    &StatisticsMetadata::builder()
                        .name(&name)
                        .statistic_id(&statistic_id)
                        .unit_of_measurement("EUR")
                        .build(),
                    &statistics,
                )
                .await?;
            summaries.extend(SyncSummary::try_new(&name, &statistic_id, &statistics));
        }
    }

    Ok(summaries)
}

/// The gateway publishes a finished day in the early morning, so a sync
/// is due only when the newest stored point is older than two days and
/// the local morning has passed.
fn sync_needed(last_start: DateTime<Local>, now: DateTime<Local>) -> bool {
    last_start < now - TimeDelta::days(2) && now.hour() >= 6
}

/// Recorded price history of every entity the rules refer to.
///
/// History entries carrying no unit fall back to the unit the entity
/// reports right now.
async fn fetch_price_index(
    client: &mut Client,
    rules: &[CostRule],
    energy: &[Point<DateTime<FixedOffset>, WattHours>],
) -> Result<PriceIndex> {
    let mut prices = PriceIndex::default();
    let Some(((since, _), (until, _))) = energy.first().zip(energy.last()) else {
        return Ok(prices);
    };
    let until = *until + TimeDelta::hours(1);

    for entity_id in rules.iter().filter_map(|rule| rule.entity_id.as_deref()).unique() {
        let fallback_unit = client
            .current_state(entity_id)
            .await?
            .and_then(|state| state.attributes.unit_of_measurement);
        for state in client.price_history(entity_id, *since, until).await? {
            let unit = state.attributes.unit_of_measurement.as_deref().or(fallback_unit.as_deref());
            prices.push(
                entity_id,
                state.last_updated_at.fixed_offset(),
                KilowattHourRate::from_unit(state.value, unit),
            );
        }
    }
    Ok(prices)
}

/// One row of the per-run summary table.
pub struct SyncSummary {
    pub name: String,
    pub statistic_id: String,
    pub n_points: usize,
    pub since: DateTime<FixedOffset>,
    pub until: DateTime<FixedOffset>,
    pub last_sum: String,
}

impl SyncSummary {
    fn try_new<V>(name: &str, statistic_id: &str, statistics: &[StatisticPoint<V>]) -> Option<Self>
    where
        V: Copy + fmt::Display,
    {
        let first = statistics.first()?;
        let last = statistics.last()?;
        Some(Self {
            name: name.to_string(),
            statistic_id: statistic_id.to_string(),
            n_points: statistics.len(),
            since: first.start,
            until: last.start,
            last_sum: last.sum.to_string(),
        })
    }
}

/// Daily run times, randomized once at startup so that a fleet of add-ons
/// does not hit the gateway at the same instant.
struct Schedule {
    minute: u32,
    second: u32,
}

impl Schedule {
    const HOURS: [u32; 2] = [6, 9];

    fn with_jitter() -> Self {
        let nanos = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .unwrap_or_default()
            .subsec_nanos();
        Self { minute: nanos % 59, second: (nanos / 59) % 59 }
    }

    /// First scheduled instant strictly after `now`.
    fn next_tick(&self, now: DateTime<Local>) -> Option<DateTime<Local>> {
        (0..=1)
            .flat_map(|days_ahead| {
                let date = now.date_naive() + TimeDelta::days(days_ahead);
                Self::HOURS.iter().filter_map(move |hour| {
                    date.and_hms_opt(*hour, self.minute, self.second)?
                        .and_local_timezone(Local)
                        .earliest()
                })
            })
            .find(|tick| *tick > now)
    }
}

impl fmt::Display for Schedule {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut ticks = Self::HOURS
            .iter()
            .map(|hour| format!("{hour:02}:{:02}:{:02}", self.minute, self.second));
        write!(formatter, "{}", ticks.join(" and "))
    }
}
