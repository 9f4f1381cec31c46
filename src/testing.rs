//! テスト用のモック quote service と記録用 sink

use crate::fetcher::{FetchError, QuoteSource};
use crate::sink::*;
use crate::types::{Asset, HistoricalSeries, Interval, Quote, SeriesPoint, Snapshot};
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

pub fn dec(s: &str) -> BigDecimal {
    BigDecimal::from_str(s).unwrap()
}

/// 資産ごとに (価格, 時価総額, 24h出来高) を指定してスナップショットを作る
pub fn snapshot_of(values: [(&str, &str, &str); 4]) -> Snapshot {
    let quotes = Asset::ALL
        .into_iter()
        .zip(values)
        .map(|(asset, (price, cap, vol))| {
            (
                asset,
                Quote {
                    spot_price: dec(price),
                    market_cap_usd: dec(cap),
                    volume_24h_usd: dec(vol),
                },
            )
        })
        .collect::<HashMap<_, _>>();
    Snapshot::new(quotes).unwrap()
}

/// 価格だけ変えた標準的なスナップショット
pub fn sample_snapshot(btc_price: &str) -> Snapshot {
    snapshot_of([
        (btc_price, "1290000000000", "31000000000"),
        ("3456.78", "415000000000", "15000000000"),
        ("0.1234", "17800000000", "900000000"),
        ("145.5", "67000000000", "2500000000"),
    ])
}

pub fn series(points: &[(DateTime<Utc>, &str)]) -> HistoricalSeries {
    HistoricalSeries::new(
        points
            .iter()
            .map(|(at, v)| SeriesPoint {
                at: *at,
                value: dec(v),
            })
            .collect(),
    )
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeCall {
    pub asset: Asset,
    pub lookback_days: u32,
    pub interval: Interval,
}

/// 呼び出し回数を記録するモック
pub struct MockSource {
    delay: Mutex<Duration>,
    snapshot: Mutex<Result<Snapshot, FetchError>>,
    history: Mutex<HashMap<Asset, Result<HistoricalSeries, FetchError>>>,
    history_delay: Mutex<HashMap<Asset, Duration>>,
    volume: Mutex<Result<HistoricalSeries, FetchError>>,
    pub snapshot_calls: AtomicUsize,
    pub history_calls: Mutex<Vec<(Asset, u32)>>,
    pub volume_calls: Mutex<Vec<VolumeCall>>,
}

impl MockSource {
    pub fn new(snapshot: Snapshot) -> Self {
        MockSource {
            delay: Mutex::new(Duration::ZERO),
            snapshot: Mutex::new(Ok(snapshot)),
            history: Mutex::new(HashMap::new()),
            history_delay: Mutex::new(HashMap::new()),
            volume: Mutex::new(Ok(HistoricalSeries::default())),
            snapshot_calls: AtomicUsize::new(0),
            history_calls: Mutex::new(vec![]),
            volume_calls: Mutex::new(vec![]),
        }
    }

    pub fn failing() -> Self {
        let source = MockSource::new(sample_snapshot("1"));
        source.set_snapshot(Err(FetchError::Network("down".to_string())));
        source
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }

    pub fn set_snapshot(&self, result: Result<Snapshot, FetchError>) {
        *self.snapshot.lock().unwrap() = result;
    }

    pub fn set_history(&self, asset: Asset, result: Result<HistoricalSeries, FetchError>) {
        self.history.lock().unwrap().insert(asset, result);
    }

    pub fn set_history_delay(&self, asset: Asset, delay: Duration) {
        self.history_delay.lock().unwrap().insert(asset, delay);
    }

    pub fn set_volume(&self, result: Result<HistoricalSeries, FetchError>) {
        *self.volume.lock().unwrap() = result;
    }

    pub fn snapshot_calls(&self) -> usize {
        self.snapshot_calls.load(Ordering::SeqCst)
    }

    pub fn history_calls(&self) -> Vec<(Asset, u32)> {
        self.history_calls.lock().unwrap().clone()
    }

    pub fn volume_calls(&self) -> Vec<VolumeCall> {
        self.volume_calls.lock().unwrap().clone()
    }
}

impl QuoteSource for MockSource {
    async fn fetch_snapshot(&self) -> Result<Snapshot, FetchError> {
        self.snapshot_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.snapshot.lock().unwrap().clone()
    }

    async fn fetch_price_history(
        &self,
        asset: Asset,
        lookback_days: u32,
    ) -> Result<HistoricalSeries, FetchError> {
        self.history_calls
            .lock()
            .unwrap()
            .push((asset, lookback_days));
        let delay = self
            .history_delay
            .lock()
            .unwrap()
            .get(&asset)
            .copied()
            .unwrap_or_default();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.history
            .lock()
            .unwrap()
            .get(&asset)
            .cloned()
            .unwrap_or_else(|| Ok(HistoricalSeries::default()))
    }

    async fn fetch_volume_series(
        &self,
        asset: Asset,
        lookback_days: u32,
        interval: Interval,
    ) -> Result<HistoricalSeries, FetchError> {
        self.volume_calls.lock().unwrap().push(VolumeCall {
            asset,
            lookback_days,
            interval,
        });
        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.volume.lock().unwrap().clone()
    }
}

#[derive(Default)]
pub struct RecordingIndicators(pub Mutex<Vec<Vec<Indicator>>>);

impl IndicatorSink for RecordingIndicators {
    fn replace_indicators(&self, indicators: Vec<Indicator>) {
        self.0.lock().unwrap().push(indicators);
    }
}

impl RecordingIndicators {
    pub fn updates(&self) -> Vec<Vec<Indicator>> {
        self.0.lock().unwrap().clone()
    }
}

#[derive(Default)]
pub struct RecordingTable(pub Mutex<Vec<Vec<TableRow>>>);

impl TableSink for RecordingTable {
    fn replace_rows(&self, rows: Vec<TableRow>) {
        self.0.lock().unwrap().push(rows);
    }
}

impl RecordingTable {
    pub fn updates(&self) -> Vec<Vec<TableRow>> {
        self.0.lock().unwrap().clone()
    }
}

#[derive(Default)]
pub struct RecordingChart(pub Mutex<Vec<ChartData>>);

impl ChartSink for RecordingChart {
    fn replace(&self, data: ChartData) {
        self.0.lock().unwrap().push(data);
    }
}

impl RecordingChart {
    pub fn updates(&self) -> Vec<ChartData> {
        self.0.lock().unwrap().clone()
    }

    pub fn last(&self) -> Option<ChartData> {
        self.0.lock().unwrap().last().cloned()
    }
}

#[derive(Default)]
pub struct RecordingGauge(pub Mutex<Vec<f64>>);

impl GaugeSink for RecordingGauge {
    fn set_value(&self, value: f64) {
        self.0.lock().unwrap().push(value);
    }
}

impl RecordingGauge {
    pub fn values(&self) -> Vec<f64> {
        self.0.lock().unwrap().clone()
    }
}

#[derive(Default)]
pub struct RecordingDrilldown {
    pub overviews: Mutex<Vec<Vec<DrilldownPoint>>>,
    pub children: Mutex<Vec<DrilldownSeries>>,
}

impl DrilldownSink for RecordingDrilldown {
    fn replace_overview(&self, points: Vec<DrilldownPoint>) {
        self.overviews.lock().unwrap().push(points);
    }

    fn append_child(&self, series: DrilldownSeries) {
        self.children.lock().unwrap().push(series);
    }
}

impl RecordingDrilldown {
    pub fn overviews(&self) -> Vec<Vec<DrilldownPoint>> {
        self.overviews.lock().unwrap().clone()
    }

    pub fn children(&self) -> Vec<DrilldownSeries> {
        self.children.lock().unwrap().clone()
    }
}

#[derive(Default)]
pub struct RecordingDiagnostics(pub Mutex<Vec<Diagnostic>>);

impl DiagnosticSink for RecordingDiagnostics {
    fn emit(&self, diagnostic: Diagnostic) {
        self.0.lock().unwrap().push(diagnostic);
    }
}

impl RecordingDiagnostics {
    pub fn emitted(&self) -> Vec<Diagnostic> {
        self.0.lock().unwrap().clone()
    }
}

/// f64 列を相対誤差で比較する
pub fn assert_close(actual: &[f64], expected: &[f64]) {
    assert_eq!(actual.len(), expected.len(), "{actual:?} vs {expected:?}");
    for (a, e) in actual.iter().zip(expected) {
        let tolerance = e.abs().max(1.0) * 1e-9;
        assert!((a - e).abs() <= tolerance, "{actual:?} vs {expected:?}");
    }
}
