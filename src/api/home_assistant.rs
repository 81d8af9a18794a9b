//! Home Assistant [WebSocket API](https://developers.home-assistant.io/docs/api/websocket/) client.

use std::collections::HashMap;

use bon::Builder;
use chrono::{DateTime, FixedOffset, Local, TimeDelta};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::json;
use serde_with::serde_as;
use tokio::net::TcpStream;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};

use crate::{core::series::StatisticPoint, prelude::*};

/// Core proxy address inside the add-on network.
pub const DEFAULT_URL: &str = "ws://supervisor/core/websocket";

/// Statistics source, also the id prefix.
pub const SOURCE: &str = "linky";

/// Statistic id under which a meter's energy is recorded.
pub fn statistic_id(prm: &str, production: bool) -> String {
    if production { format!("{SOURCE}:{prm}_production") } else { format!("{SOURCE}:{prm}") }
}

/// Statistic id of the cost series derived from the meter.
pub fn cost_statistic_id(prm: &str, production: bool) -> String {
    format!("{}_cost", statistic_id(prm, production))
}

pub struct Client {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    next_message_id: u64,
}

impl Client {
    /// Connect and run the authentication handshake.
    #[instrument(skip_all, fields(url = url))]
    pub async fn connect(url: &str, token: &str) -> Result<Self> {
        let (stream, _) =
            connect_async(url).await.context("failed to connect to Home Assistant")?;
        let mut this = Self { stream, next_message_id: 1 };

        let hello: HandshakeMessage = serde_json::from_str(&this.receive_text().await?)?;
        ensure!(
            hello.message_type == "auth_required",
            "unexpected handshake message: `{}`",
            hello.message_type,
        );

        this.send(&json!({"type": "auth", "access_token": token})).await?;
        let outcome: HandshakeMessage = serde_json::from_str(&this.receive_text().await?)?;
        ensure!(
            outcome.message_type == "auth_ok",
            "failed to authenticate: `{}`",
            outcome.message_type,
        );

        info!("authenticated");
        Ok(this)
    }

    pub async fn disconnect(mut self) -> Result {
        self.stream.close(None).await.context("failed to close the connection")?;
        debug!("disconnected");
        Ok(())
    }

    #[instrument(
        skip_all,
        fields(statistic_id = metadata.statistic_id, n_points = statistics.len()),
    )]
    pub async fn import_statistics<V: Serialize>(
        &mut self,
        metadata: &StatisticsMetadata<'_>,
        statistics: &[StatisticPoint<V>],
    ) -> Result {
        let request = json!({
            "type": "recorder/import_statistics",
            "metadata": metadata,
            "stats": statistics,
        });
        self.call::<serde_json::Value>(request).await?;
        info!("imported");
        Ok(())
    }

    /// Check whether nothing has been recorded under the statistic id yet.
    #[instrument(skip_all, fields(statistic_id = statistic_id))]
    pub async fn is_new_series(&mut self, statistic_id: &str) -> Result<bool> {
        #[derive(Deserialize)]
        struct ListedStatistic {
            statistic_id: String,
        }

        let ids: Vec<ListedStatistic> = self
            .call(json!({"type": "recorder/list_statistic_ids", "statistic_type": "sum"}))
            .await?;
        Ok(!ids.iter().any(|listed| listed.statistic_id == statistic_id))
    }

    /// Newest recorded statistic, scanning backward one week at a time
    /// for up to a year.
    #[instrument(skip_all, fields(statistic_id = statistic_id))]
    pub async fn find_last_statistic(
        &mut self,
        statistic_id: &str,
        now: DateTime<Local>,
    ) -> Result<Option<LastStatistic>> {
        for weeks_back in 0..52 {
            let since = (now - TimeDelta::days(7 * (weeks_back + 1))).date_naive();
            let until = (now - TimeDelta::days(7 * weeks_back)).date_naive();
            let request = json!({
                "type": "recorder/statistics_during_period",
                "start_time": format!("{since}T00:00:00.00Z"),
                "end_time": format!("{until}T00:00:00.00Z"),
                "statistic_ids": [statistic_id],
                "period": "day",
            });
            let mut result: HashMap<String, Vec<LastStatistic>> = self.call(request).await?;
            if let Some(point) = result.remove(statistic_id).unwrap_or_default().pop() {
                debug!(start = %point.start, "found the last statistic");
                return Ok(Some(point));
            }
        }
        Ok(None)
    }

    #[instrument(skip_all, fields(statistic_ids = ?statistic_ids))]
    pub async fn clear_statistics(&mut self, statistic_ids: &[String]) -> Result {
        let request = json!({"type": "recorder/clear_statistics", "statistic_ids": statistic_ids});
        self.call::<serde_json::Value>(request).await?;
        info!("cleared");
        Ok(())
    }

    /// Recorded history of a price entity, oldest first.
    #[instrument(skip_all, fields(entity_id = entity_id))]
    pub async fn price_history(
        &mut self,
        entity_id: &str,
        since: DateTime<FixedOffset>,
        until: DateTime<FixedOffset>,
    ) -> Result<Vec<PriceState>> {
        let request = json!({
            "type": "history/history_during_period",
            "start_time": since.to_rfc3339(),
            "end_time": until.to_rfc3339(),
            "entity_ids": [entity_id],
            "significant_changes_only": false,
            "minimal_response": true,
            "no_attributes": false,
        });
        let mut response: HistoryResponse = self.call(request).await?;
        let states = response.0.remove(entity_id).unwrap_or_default();
        debug!(n_states = states.len(), "fetched");
        Ok(states)
    }

    /// Current state of an entity, `None` when it does not exist.
    #[instrument(skip_all, fields(entity_id = entity_id))]
    pub async fn current_state(&mut self, entity_id: &str) -> Result<Option<EntityState>> {
        let states: Vec<EntityState> = self.call(json!({"type": "get_states"})).await?;
        Ok(states.into_iter().find(|state| state.entity_id == entity_id))
    }

    /// Send a command with the next message id and wait for the matching result.
    async fn call<R: DeserializeOwned>(&mut self, mut request: serde_json::Value) -> Result<R> {
        let message_id = self.next_message_id;
        self.next_message_id += 1;
        request
            .as_object_mut()
            .context("the request must be a JSON object")?
            .insert("id".to_string(), message_id.into());
        self.send(&request).await?;

        loop {
            let text = self.receive_text().await?;
            let response: ResultMessage = serde_json::from_str(&text)
                .with_context(|| format!("failed to deserialize the response: {text}"))?;
            if response.id != Some(message_id) {
                debug!(id = ?response.id, "skipping an unrelated message");
                continue;
            }
            if !response.success {
                let message =
                    response.error.map_or_else(|| "unknown".to_string(), |error| error.message);
                bail!("Home Assistant returned an error: {message}");
            }
            return serde_json::from_value(response.result)
                .context("failed to deserialize the result");
        }
    }

    async fn send(&mut self, message: &impl Serialize) -> Result {
        let message = serde_json::to_string(message)?;
        self.stream.send(Message::Text(message)).await.context("failed to send the message")
    }

    async fn receive_text(&mut self) -> Result<String> {
        loop {
            let frame = self
                .stream
                .next()
                .await
                .context("the connection closed unexpectedly")?
                .context("failed to receive a message")?;
            if let Message::Text(text) = frame {
                return Ok(text);
            }
        }
    }
}

#[derive(Deserialize)]
struct HandshakeMessage {
    #[serde(rename = "type")]
    message_type: String,
}

#[derive(Deserialize)]
struct ResultMessage {
    #[serde(default)]
    id: Option<u64>,

    #[serde(default)]
    success: bool,

    #[serde(default)]
    result: serde_json::Value,

    #[serde(default)]
    error: Option<ErrorDetails>,
}

#[derive(Deserialize)]
struct ErrorDetails {
    message: String,
}

#[derive(Builder, Serialize)]
pub struct StatisticsMetadata<'a> {
    #[builder(default)]
    pub has_mean: bool,

    #[builder(default = true)]
    pub has_sum: bool,

    pub name: &'a str,

    #[builder(default = SOURCE)]
    pub source: &'a str,

    pub statistic_id: &'a str,

    pub unit_of_measurement: &'a str,
}

/// Day-period statistic as returned by `recorder/statistics_during_period`.
#[must_use]
#[serde_as]
#[derive(Clone, Copy, Debug, Deserialize)]
pub struct LastStatistic {
    #[serde_as(as = "serde_with::TimestampMilliSeconds<i64>")]
    pub start: DateTime<Local>,

    #[serde(default)]
    pub state: Option<f64>,

    pub sum: f64,
}

#[serde_as]
#[derive(Deserialize)]
struct HistoryResponse(
    #[serde_as(as = "HashMap<_, serde_with::VecSkipError<_>>")]
    HashMap<String, Vec<PriceState>>,
);

/// Minimal-response history row.
#[must_use]
#[serde_as]
#[derive(Clone, Debug, Deserialize)]
pub struct PriceState {
    /// Numeric state. Rows with states like `unavailable` fail here
    /// and are skipped by the container.
    #[serde_as(as = "serde_with::DisplayFromStr")]
    #[serde(rename = "s")]
    pub value: f64,

    #[serde_as(as = "serde_with::TimestampSecondsWithFrac<f64>")]
    #[serde(rename = "lu")]
    pub last_updated_at: DateTime<Local>,

    #[serde(default, rename = "a")]
    pub attributes: Attributes,
}

#[must_use]
#[derive(Clone, Debug, Deserialize)]
pub struct EntityState {
    pub entity_id: String,

    pub state: String,

    #[serde(default)]
    pub attributes: Attributes,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct Attributes {
    #[serde(default)]
    pub unit_of_measurement: Option<String>,
}
