use chrono::{Local, TimeDelta};
use clap::{Parser, Subcommand};

use crate::{
    api::{
        enedis, home_assistant,
        provider::{FetchError, MeteringProvider},
    },
    cli::HomeAssistantArgs,
    prelude::*,
    tables::{build_last_statistic_table, build_price_table, build_readings_table},
};

#[derive(Parser)]
pub struct PeekArgs {
    #[command(subcommand)]
    command: PeekCommand,
}

impl PeekArgs {
    pub async fn run(self) -> Result {
        match self.command {
            PeekCommand::LoadCurve(args) => args.run().await,
            PeekCommand::Daily(args) => args.run().await,
            PeekCommand::LastStatistic(args) => args.run().await,
            PeekCommand::Prices(args) => args.run().await,
        }
    }
}

#[derive(Subcommand)]
pub enum PeekCommand {
    /// Print the raw load curve of the last days.
    LoadCurve(LoadCurveArgs),

    /// Print the raw daily readings of the last days.
    Daily(DailyArgs),

    /// Print the newest statistic recorded for a meter.
    LastStatistic(LastStatisticArgs),

    /// Print the recorded price history of an entity.
    Prices(PricesArgs),
}

#[derive(Parser)]
struct GatewayArgs {
    /// Base URL of the metering gateway.
    #[clap(long = "gateway-url", env = "CONSO_API_URL", default_value = enedis::DEFAULT_URL)]
    url: String,

    /// Gateway token scoped to the meter.
    #[clap(long, env = "CONSO_TOKEN", hide_env_values = true)]
    token: String,

    /// Meter delivery point identifier.
    #[clap(long, env = "CONSO_PRM")]
    prm: String,

    /// Read the production registers instead of consumption.
    #[clap(long)]
    production: bool,
}

impl GatewayArgs {
    fn api(&self) -> Result<enedis::Api> {
        enedis::Api::try_new(&self.url, &self.token, &self.prm, self.production)
    }
}

#[derive(Parser)]
pub struct LoadCurveArgs {
    #[clap(flatten)]
    gateway: GatewayArgs,

    /// Number of days to look back.
    #[clap(long, default_value = "7")]
    days: i64,
}

impl LoadCurveArgs {
    async fn run(self) -> Result {
        let today = Local::now().date_naive();
        let range = (today - TimeDelta::days(self.days))..today;
        match self.gateway.api()?.load_curve(range).await {
            Ok(readings) => println!("{}", build_readings_table(&readings)),
            Err(FetchError::NoData) => info!("no data in the requested range"),
            Err(error) => return Err(error.into()),
        }
        Ok(())
    }
}

#[derive(Parser)]
pub struct DailyArgs {
    #[clap(flatten)]
    gateway: GatewayArgs,

    /// Number of days to look back.
    #[clap(long, default_value = "7")]
    days: i64,
}

impl DailyArgs {
    async fn run(self) -> Result {
        let today = Local::now().date_naive();
        let range = (today - TimeDelta::days(self.days))..today;
        match self.gateway.api()?.daily_energy(range).await {
            Ok(readings) => println!("{}", build_readings_table(&readings)),
            Err(FetchError::NoData) => info!("no data in the requested range"),
            Err(error) => return Err(error.into()),
        }
        Ok(())
    }
}

#[derive(Parser)]
pub struct LastStatisticArgs {
    #[clap(flatten)]
    home_assistant: HomeAssistantArgs,

    /// Meter delivery point identifier.
    #[clap(long, env = "CONSO_PRM")]
    prm: String,

    /// Look at the production series.
    #[clap(long)]
    production: bool,

    /// Look at the derived cost series instead of the energy itself.
    #[clap(long)]
    cost: bool,
}

impl LastStatisticArgs {
    async fn run(self) -> Result {
        let statistic_id = if self.cost {
            home_assistant::cost_statistic_id(&self.prm, self.production)
        } else {
            home_assistant::statistic_id(&self.prm, self.production)
        };
        let mut client = self.home_assistant.connect().await?;
        let statistic = client.find_last_statistic(&statistic_id, Local::now()).await?;
        client.disconnect().await?;
        match statistic {
            Some(statistic) => println!("{}", build_last_statistic_table(&statistic)),
            None => info!(statistic_id, "nothing is recorded under the id"),
        }
        Ok(())
    }
}

#[derive(Parser)]
pub struct PricesArgs {
    #[clap(flatten)]
    home_assistant: HomeAssistantArgs,

    /// Price entity, for example `sensor.electricity_price`.
    #[clap(long)]
    entity_id: String,

    /// Number of days to look back.
    #[clap(long, default_value = "7")]
    days: i64,
}

impl PricesArgs {
    async fn run(self) -> Result {
        let until = Local::now().fixed_offset();
        let since = until - TimeDelta::days(self.days);
        let mut client = self.home_assistant.connect().await?;
        let states = client.price_history(&self.entity_id, since, until).await?;
        client.disconnect().await?;
        if states.is_empty() {
            info!(entity_id = self.entity_id, "no recorded history");
        } else {
            println!("{}", build_price_table(&states));
        }
        Ok(())
    }
}
