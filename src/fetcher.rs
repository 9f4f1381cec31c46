//! quote service からの取得層
//!
//! 取得の失敗は全てこの層で `FetchError` に変換し、ログに残す。
//! リトライはしない（必要なら呼び出し側の責務）。

use crate::Result;
use crate::logging::*;
use crate::types::{Asset, HistoricalSeries, Interval, Quote, SeriesPoint, Snapshot};
use bigdecimal::BigDecimal;
use chrono::DateTime;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::future::Future;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// 取得失敗の分類
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("network error: {0}")]
    Network(String),
    #[error("HTTP status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("parse error: {0}")]
    Parse(String),
    #[error("snapshot is missing {0}")]
    Incomplete(Asset),
}

/// リモートの気配値サービス
///
/// 各メソッドはネットワーク往復をちょうど1回行う。
pub trait QuoteSource {
    fn fetch_snapshot(&self) -> impl Future<Output = Result<Snapshot, FetchError>> + Send;

    fn fetch_price_history(
        &self,
        asset: Asset,
        lookback_days: u32,
    ) -> impl Future<Output = Result<HistoricalSeries, FetchError>> + Send;

    fn fetch_volume_series(
        &self,
        asset: Asset,
        lookback_days: u32,
        interval: Interval,
    ) -> impl Future<Output = Result<HistoricalSeries, FetchError>> + Send;
}

#[derive(Debug, Deserialize)]
struct RawQuote {
    usd: serde_json::Number,
    usd_market_cap: serde_json::Number,
    usd_24h_vol: serde_json::Number,
}

#[derive(Debug, Deserialize)]
struct RawMarketChart {
    #[serde(default)]
    prices: Vec<(serde_json::Number, serde_json::Number)>,
    #[serde(default)]
    total_volumes: Vec<(serde_json::Number, serde_json::Number)>,
}

fn decimal(n: &serde_json::Number) -> Result<BigDecimal, FetchError> {
    BigDecimal::from_str(&n.to_string()).map_err(|e| FetchError::Parse(format!("{n}: {e}")))
}

fn parse_snapshot(raw: HashMap<String, RawQuote>) -> Result<Snapshot, FetchError> {
    let mut quotes = HashMap::new();
    for asset in Asset::ALL {
        let Some(q) = raw.get(asset.id()) else {
            return Err(FetchError::Incomplete(asset));
        };
        quotes.insert(
            asset,
            Quote {
                spot_price: decimal(&q.usd)?,
                market_cap_usd: decimal(&q.usd_market_cap)?,
                volume_24h_usd: decimal(&q.usd_24h_vol)?,
            },
        );
    }
    Snapshot::new(quotes).map_err(FetchError::Incomplete)
}

fn parse_series(
    raw: &[(serde_json::Number, serde_json::Number)],
) -> Result<HistoricalSeries, FetchError> {
    let points = raw
        .iter()
        .map(|(ms, value)| {
            let millis = ms
                .as_i64()
                .or_else(|| ms.as_f64().map(|f| f as i64))
                .ok_or_else(|| FetchError::Parse(format!("bad timestamp: {ms}")))?;
            let at = DateTime::from_timestamp_millis(millis)
                .ok_or_else(|| FetchError::Parse(format!("timestamp out of range: {millis}")))?;
            Ok(SeriesPoint {
                at,
                value: decimal(value)?,
            })
        })
        .collect::<Result<Vec<_>, FetchError>>()?;
    Ok(HistoricalSeries::new(points))
}

/// CoinGecko 互換 API のクライアント
pub struct CoinGeckoClient {
    client: reqwest::Client,
    base_url: String,
}

impl CoinGeckoClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(CoinGeckoClient {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get_json<T>(&self, path: &str, query: &[(&str, String)]) -> Result<T, FetchError>
    where
        T: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .get(&url)
            .query(query)
            .send()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FetchError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;
        serde_json::from_slice(&bytes).map_err(|e| FetchError::Parse(e.to_string()))
    }

    async fn market_chart(
        &self,
        asset: Asset,
        lookback_days: u32,
        interval: Option<Interval>,
    ) -> Result<RawMarketChart, FetchError> {
        let mut query = vec![
            ("vs_currency", "usd".to_string()),
            ("days", lookback_days.to_string()),
        ];
        if let Some(interval) = interval {
            query.push(("interval", interval.as_str().to_string()));
        }
        let path = format!("/coins/{}/market_chart", asset.id());
        self.get_json(&path, &query).await
    }
}

fn report<T>(log: &Logger, result: Result<T, FetchError>) -> Result<T, FetchError> {
    if let Err(e) = &result {
        warn!(log, "fetch failed"; "error" => %e);
    }
    result
}

impl QuoteSource for CoinGeckoClient {
    async fn fetch_snapshot(&self) -> Result<Snapshot, FetchError> {
        let log = DEFAULT.new(o!("function" => "fetch_snapshot"));
        let ids: Vec<_> = Asset::ALL.iter().map(|a| a.id()).collect();
        let query = [
            ("ids", ids.join(",")),
            ("vs_currencies", "usd".to_string()),
            ("include_market_cap", "true".to_string()),
            ("include_24hr_vol", "true".to_string()),
        ];
        let result = self
            .get_json::<HashMap<String, RawQuote>>("/simple/price", &query)
            .await
            .and_then(parse_snapshot);
        if result.is_ok() {
            debug!(log, "snapshot fetched");
        }
        report(&log, result)
    }

    async fn fetch_price_history(
        &self,
        asset: Asset,
        lookback_days: u32,
    ) -> Result<HistoricalSeries, FetchError> {
        let log = DEFAULT.new(o!(
            "function" => "fetch_price_history",
            "asset" => asset.id(),
            "lookback_days" => lookback_days,
        ));
        let result = self
            .market_chart(asset, lookback_days, None)
            .await
            .and_then(|chart| parse_series(&chart.prices));
        if let Ok(series) = &result {
            debug!(log, "price history fetched"; "points" => series.len());
        }
        report(&log, result)
    }

    async fn fetch_volume_series(
        &self,
        asset: Asset,
        lookback_days: u32,
        interval: Interval,
    ) -> Result<HistoricalSeries, FetchError> {
        let log = DEFAULT.new(o!(
            "function" => "fetch_volume_series",
            "asset" => asset.id(),
            "lookback_days" => lookback_days,
            "interval" => interval.as_str(),
        ));
        let result = self
            .market_chart(asset, lookback_days, Some(interval))
            .await
            .and_then(|chart| parse_series(&chart.total_volumes));
        if let Ok(series) = &result {
            debug!(log, "volume series fetched"; "points" => series.len());
        }
        report(&log, result)
    }
}
