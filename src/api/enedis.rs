//! Client for a [Conso API](https://conso.boris.sh/)-compatible gateway.

use std::time::Duration;

use async_trait::async_trait;
use http::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;

use crate::{
    api::provider::{DateRange, FetchError, FetchResult, IntervalReading, MeteringProvider},
    prelude::*,
};

pub const DEFAULT_URL: &str = "https://conso.boris.sh/api";

/// Per-meter client: the gateway scopes each token to its PRM.
pub struct Api {
    client: Client,
    base_url: Url,
    prm: String,
    production: bool,
}

impl Api {
    pub fn try_new(base_url: &str, token: &str, prm: &str, production: bool) -> Result<Self> {
        let headers = HeaderMap::from_iter([(
            HeaderName::from_static("authorization"),
            HeaderValue::from_str(&format!("Bearer {token}"))?,
        )]);
        let client = Client::builder()
            .user_agent(concat!("marmot/", env!("CARGO_PKG_VERSION")))
            .default_headers(headers)
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            base_url: Url::parse(base_url).context("failed to parse the provider URL")?,
            prm: prm.to_string(),
            production,
        })
    }

    async fn get(&self, path: &str, range: &DateRange) -> FetchResult<Vec<IntervalReading>> {
        let mut url = self.base_url.clone();
        url.path_segments_mut().map_err(|()| anyhow!("invalid base URL"))?.push(path);
        url.query_pairs_mut()
            .append_pair("prm", &self.prm)
            .append_pair("start", &range.start.to_string())
            .append_pair("end", &range.end.to_string());

        let response = self.client.get(url).send().await.context("failed to call the gateway")?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(FetchError::NoData);
        }
        let body = response.text().await.context("failed to read the response")?;
        if !status.is_success() {
            return Err(anyhow!("the gateway responded with {status}: {body}").into());
        }
        let response: ReadingsResponse = serde_json::from_str(&body)
            .with_context(|| format!("failed to deserialize the response: {body}"))?;
        debug!(n_readings = response.interval_reading.len(), "fetched");
        Ok(response.interval_reading)
    }
}

#[async_trait]
impl MeteringProvider for Api {
    #[instrument(skip_all, fields(prm = self.prm, since = %range.start, until = %range.end))]
    async fn load_curve(&self, range: DateRange) -> FetchResult<Vec<IntervalReading>> {
        let path = if self.production { "production_load_curve" } else { "load_curve" };
        self.get(path, &range).await
    }

    #[instrument(skip_all, fields(prm = self.prm, since = %range.start, until = %range.end))]
    async fn daily_energy(&self, range: DateRange) -> FetchResult<Vec<IntervalReading>> {
        let path = if self.production { "daily_production" } else { "daily_consumption" };
        self.get(path, &range).await
    }
}

#[derive(Deserialize)]
struct ReadingsResponse {
    interval_reading: Vec<IntervalReading>,
}
