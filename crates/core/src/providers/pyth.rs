use async_trait::async_trait;
use futures::{Stream, StreamExt};
use reqwest::header::ACCEPT;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

use crate::errors::CoreError;
use crate::models::feed::normalize_feed_id;
use crate::models::rate::RawTick;
use super::sse::SseDecoder;
use super::traits::{PriceFeed, TickSink, TickStream};

const PROVIDER: &str = "Pyth Hermes";
const LATEST_PATH: &str = "/v2/updates/price/latest";
const STREAM_PATH: &str = "/v2/updates/price/stream";

/// Pyth Network Hermes provider for FX price feeds.
///
/// - **Free**: No API key.
/// - **Endpoint**: `/v2/updates/price/latest?ids[]=...`
/// - **Streaming**: `/v2/updates/price/stream?ids[]=...` (server-sent
///   events, one `latest`-shaped JSON payload per event)
/// - **Format**: each price is an integer mantissa (sent as a string) with
///   a power-of-ten exponent.
pub struct PythHermesFeed {
    client: Client,
    /// No overall timeout: a stream stays open for as long as it delivers.
    stream_client: Client,
    endpoint: String,
}

impl PythHermesFeed {
    /// Build a client for the given Hermes base URL.
    /// An empty endpoint is a configuration error.
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self, CoreError> {
        let endpoint = endpoint.trim().trim_end_matches('/').to_string();
        if endpoint.is_empty() {
            return Err(CoreError::ConfigMissing("Pyth Hermes endpoint".into()));
        }
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| Client::new());
        let stream_client = Client::builder()
            .connect_timeout(timeout)
            .build()
            .unwrap_or_else(|_| Client::new());
        Ok(Self {
            client,
            stream_client,
            endpoint,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Parse a `/v2/updates/price/latest` response body into ticks.
    ///
    /// Entries without a price, or whose mantissa is not an integer, are
    /// skipped rather than failing the whole batch.
    pub fn parse_latest(body: &str) -> Result<Vec<RawTick>, CoreError> {
        let resp: LatestResponse = serde_json::from_str(body).map_err(|e| CoreError::Api {
            provider: PROVIDER.into(),
            message: format!("Failed to parse latest price response: {e}"),
        })?;

        let ticks = resp
            .parsed
            .into_iter()
            .filter_map(|update| {
                let price = update.price?;
                let mantissa = match price.price.trim().parse::<i64>() {
                    Ok(m) => m,
                    Err(_) => {
                        log::warn!("Skipping feed {}: bad mantissa {:?}", update.id, price.price);
                        return None;
                    }
                };
                Some(RawTick {
                    feed_id: normalize_feed_id(&update.id),
                    mantissa,
                    exponent: price.expo,
                    publish_time: price.publish_time,
                })
            })
            .collect();

        Ok(ticks)
    }

    /// Decode a server-sent event body and hand every price batch to `sink`.
    ///
    /// Each event's data is parsed like a `latest` response. Events that do
    /// not parse, or carry no usable price, are logged and skipped. Returns
    /// when the body ends; a transport error ends it early.
    pub async fn consume_stream<S, B, E>(body: S, sink: TickSink<'_>) -> Result<(), CoreError>
    where
        S: Stream<Item = Result<B, E>>,
        B: AsRef<[u8]>,
        E: Into<CoreError>,
    {
        let mut body = std::pin::pin!(body);
        let mut decoder = SseDecoder::new();

        while let Some(chunk) = body.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => return Err(e.into()),
            };
            for payload in decoder.push(chunk.as_ref()) {
                match Self::parse_latest(&payload) {
                    Ok(ticks) if ticks.is_empty() => {}
                    Ok(ticks) => sink(ticks),
                    Err(e) => log::warn!("Ignoring stream event that is not a price update: {e}"),
                }
            }
        }

        if decoder.has_pending() {
            log::debug!("Price stream ended inside an event; partial data dropped");
        }
        Ok(())
    }
}

// ── Hermes API response types ───────────────────────────────────────

#[derive(Deserialize)]
struct LatestResponse {
    #[serde(default)]
    parsed: Vec<ParsedUpdate>,
}

#[derive(Deserialize)]
struct ParsedUpdate {
    id: String,
    price: Option<HermesPrice>,
}

#[derive(Deserialize)]
struct HermesPrice {
    price: String,
    expo: i32,
    publish_time: i64,
}

#[async_trait]
impl PriceFeed for PythHermesFeed {
    fn name(&self) -> &str {
        PROVIDER
    }

    async fn fetch_latest(&self, feed_ids: &[String]) -> Result<Vec<RawTick>, CoreError> {
        if feed_ids.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!("{}{LATEST_PATH}", self.endpoint);
        let query: Vec<(&str, &str)> = feed_ids.iter().map(|id| ("ids[]", id.as_str())).collect();

        let body = self
            .client
            .get(&url)
            .query(&query)
            .query(&[("parsed", "true")])
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        Self::parse_latest(&body)
    }
}

#[async_trait]
impl TickStream for PythHermesFeed {
    fn name(&self) -> &str {
        PROVIDER
    }

    async fn stream(&self, feed_ids: &[String], sink: TickSink<'_>) -> Result<(), CoreError> {
        if feed_ids.is_empty() {
            return Ok(());
        }

        let url = format!("{}{STREAM_PATH}", self.endpoint);
        let query: Vec<(&str, &str)> = feed_ids.iter().map(|id| ("ids[]", id.as_str())).collect();

        let response = self
            .stream_client
            .get(&url)
            .header(ACCEPT, "text/event-stream")
            .query(&query)
            .query(&[("parsed", "true")])
            .send()
            .await?
            .error_for_status()?;

        log::info!("Connected to {PROVIDER} price stream ({} feeds)", feed_ids.len());
        Self::consume_stream(response.bytes_stream(), sink).await
    }
}
