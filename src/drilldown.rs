//! 出来高のドリルダウン（月 → 日 → 時間）
//!
//! 子系列は親の点が展開されたときに初めて取得する。展開済みのキーは
//! 二度と取得しない。

use crate::Result;
use crate::cache::QuoteCache;
use crate::fanout::billions_f64;
use crate::fetcher::{FetchError, QuoteSource};
use crate::logging::*;
use crate::sink::{Diagnostic, DiagnosticSink, DrilldownPoint, DrilldownSeries, DrilldownSink};
use crate::types::{Asset, HistoricalSeries, Interval, SeriesPoint};
use bigdecimal::BigDecimal;
use chrono::{DateTime, Datelike, Months, NaiveTime, TimeDelta, Utc};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::{Arc, Mutex};

/// 粒度と、下位レベルの起点時刻
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DrilldownLevel {
    /// 資産ごとの最上位。月別合計。
    Monthly,
    /// 月初を起点とする日別
    Daily(DateTime<Utc>),
    /// 日の始まりを起点とする時間別
    Hourly(DateTime<Utc>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DrilldownKey {
    pub asset: Asset,
    pub level: DrilldownLevel,
}

impl DrilldownKey {
    pub fn monthly(asset: Asset) -> Self {
        DrilldownKey {
            asset,
            level: DrilldownLevel::Monthly,
        }
    }

    /// `at` を含む月の日別
    pub fn daily(asset: Asset, at: DateTime<Utc>) -> Self {
        DrilldownKey {
            asset,
            level: DrilldownLevel::Daily(month_start(at)),
        }
    }

    /// `at` を含む日の時間別
    pub fn hourly(asset: Asset, at: DateTime<Utc>) -> Self {
        DrilldownKey {
            asset,
            level: DrilldownLevel::Hourly(day_start(at)),
        }
    }
}

impl fmt::Display for DrilldownKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.level {
            DrilldownLevel::Monthly => write!(f, "{}", self.asset.id()),
            DrilldownLevel::Daily(at) => write!(f, "{}-{}", self.asset.id(), at.format("%Y-%m")),
            DrilldownLevel::Hourly(at) => {
                write!(f, "{}-{}", self.asset.id(), at.format("%Y-%m-%d"))
            }
        }
    }
}

pub fn day_start(at: DateTime<Utc>) -> DateTime<Utc> {
    at.date_naive().and_time(NaiveTime::MIN).and_utc()
}

pub fn month_start(at: DateTime<Utc>) -> DateTime<Utc> {
    let day = day_start(at);
    day - TimeDelta::days(i64::from(day.day0()))
}

fn next_month(month_start: DateTime<Utc>) -> DateTime<Utc> {
    month_start
        .checked_add_months(Months::new(1))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// 日別の時系列を暦月（UTC）ごとに合計する
pub fn monthly_totals(series: &HistoricalSeries) -> Vec<SeriesPoint> {
    let mut totals: BTreeMap<DateTime<Utc>, BigDecimal> = BTreeMap::new();
    for point in series.points() {
        *totals.entry(month_start(point.at)).or_default() += &point.value;
    }
    totals
        .into_iter()
        .map(|(at, value)| SeriesPoint { at, value })
        .collect()
}

/// `now` から遡って `anchor` に届く最小の日数（1..=max_days + 1）
///
/// 上限では `now - max_days` 日が属する日の 0 時まで届く。
pub fn hourly_lookback(anchor: DateTime<Utc>, now: DateTime<Utc>, max_days: u32) -> u32 {
    let secs = (now - anchor).num_seconds();
    let days = secs.div_euclid(86_400) + i64::from(secs.rem_euclid(86_400) != 0);
    days.clamp(1, i64::from(max_days) + 1) as u32
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpandOutcome {
    /// 子系列を追加した（点の数）
    Expanded(usize),
    /// 展開済み、または展開中
    AlreadyExpanded,
    /// 取得できなかったので何もしていない。再試行できる。
    NoData,
}

pub struct DrilldownController<S> {
    cache: Arc<QuoteCache<S>>,
    sink: Arc<dyn DrilldownSink>,
    diagnostics: Arc<dyn DiagnosticSink>,
    lookback_days: u32,
    expanded: Mutex<HashSet<DrilldownKey>>,
}

impl<S> DrilldownController<S>
where
    S: QuoteSource + Send + Sync + 'static,
{
    pub fn new(
        cache: Arc<QuoteCache<S>>,
        sink: Arc<dyn DrilldownSink>,
        diagnostics: Arc<dyn DiagnosticSink>,
        lookback_days: u32,
    ) -> Self {
        DrilldownController {
            cache,
            sink,
            diagnostics,
            lookback_days,
            expanded: Mutex::new(HashSet::new()),
        }
    }

    /// 資産ごとの 24h 出来高を最上位に表示する
    pub async fn load_overview(&self) -> bool {
        let log = DEFAULT.new(o!("function" => "DrilldownController::load_overview"));
        let Some(snapshot) = self.cache.get().await else {
            self.emit("overview unavailable: no snapshot".to_string());
            return false;
        };
        let points = snapshot
            .iter()
            .map(|(asset, quote)| DrilldownPoint {
                label: asset.label().to_string(),
                value: billions_f64(&quote.volume_24h_usd),
                child: Some(DrilldownKey::monthly(asset)),
            })
            .collect();
        self.sink.replace_overview(points);
        debug!(log, "overview displayed");
        true
    }

    pub fn is_expanded(&self, key: &DrilldownKey) -> bool {
        self.lock().contains(key)
    }

    /// `key` の子系列を取得して追加する。同じキーは一度しか展開しない。
    pub async fn expand(&self, key: DrilldownKey) -> ExpandOutcome {
        let log = DEFAULT.new(o!("function" => "DrilldownController::expand", "key" => key.to_string()));
        if !self.lock().insert(key) {
            debug!(log, "already expanded");
            return ExpandOutcome::AlreadyExpanded;
        }

        let result = self.fetch(key).await;
        let series = match result {
            Ok(series) if !series.points.is_empty() => series,
            Ok(_) => {
                self.release(key);
                self.emit(format!("no volume data for {key}"));
                return ExpandOutcome::NoData;
            }
            Err(e) => {
                self.release(key);
                self.emit(format!("volume for {key} unavailable: {e}"));
                return ExpandOutcome::NoData;
            }
        };

        let count = series.points.len();
        self.sink.append_child(series);
        info!(log, "expanded"; "points" => count);
        ExpandOutcome::Expanded(count)
    }

    async fn fetch(&self, key: DrilldownKey) -> Result<DrilldownSeries, FetchError> {
        let source = self.cache.source();
        let asset = key.asset;
        let (name, points) = match key.level {
            DrilldownLevel::Monthly => {
                let daily = source
                    .fetch_volume_series(asset, self.lookback_days, Interval::Daily)
                    .await?;
                let points = monthly_totals(&daily)
                    .iter()
                    .map(|p| to_point(p, "%Y-%m", Some(DrilldownKey::daily(asset, p.at))))
                    .collect();
                (format!("{} Monthly Volume", asset.label()), points)
            }
            DrilldownLevel::Daily(from) => {
                let daily = source
                    .fetch_volume_series(asset, self.lookback_days, Interval::Daily)
                    .await?;
                let points = daily
                    .window(from, next_month(from))
                    .points()
                    .iter()
                    .map(|p| to_point(p, "%Y-%m-%d", Some(DrilldownKey::hourly(asset, p.at))))
                    .collect();
                (format!("{} Daily Volume", asset.label()), points)
            }
            DrilldownLevel::Hourly(from) => {
                let lookback = hourly_lookback(from, Utc::now(), self.lookback_days);
                let hourly = source
                    .fetch_volume_series(asset, lookback, Interval::Hourly)
                    .await?;
                let points = hourly
                    .window(from, from + TimeDelta::hours(24))
                    .points()
                    .iter()
                    .map(|p| to_point(p, "%H:%M", None))
                    .collect();
                ("24 Hour Volume".to_string(), points)
            }
        };
        Ok(DrilldownSeries { key, name, points })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashSet<DrilldownKey>> {
        self.expanded.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn release(&self, key: DrilldownKey) {
        self.lock().remove(&key);
    }

    fn emit(&self, message: String) {
        self.diagnostics.emit(Diagnostic {
            source: "drilldown",
            message,
        });
    }
}

fn to_point(point: &SeriesPoint, label: &str, child: Option<DrilldownKey>) -> DrilldownPoint {
    DrilldownPoint {
        label: point.at.format(label).to_string(),
        value: billions_f64(&point.value),
        child,
    }
}
