//! 1つのスナップショットを全 sink へ配る

use crate::selection::Selection;
use crate::sink::{ChartData, ChartSink, Indicator, IndicatorSink, TableRow, TableSink};
use crate::types::{Asset, HistoricalSeries, Snapshot};
use bigdecimal::{BigDecimal, RoundingMode};
use num_traits::ToPrimitive;
use std::sync::Arc;

/// 単一資産表示時の折れ線ラベル
pub const CURRENT_LABEL: &str = "Current";

fn kpi_scale(asset: Asset) -> i64 {
    match asset {
        Asset::Bitcoin => 0,
        Asset::Ethereum => 1,
        Asset::Dogecoin => 4,
        Asset::Solana => 2,
    }
}

fn table_price_scale(asset: Asset) -> i64 {
    match asset {
        Asset::Dogecoin => 4,
        _ => 2,
    }
}

fn billions(value: &BigDecimal) -> BigDecimal {
    value / BigDecimal::from(1_000_000_000)
}

pub fn format_usd(value: &BigDecimal, scale: i64) -> String {
    format!("${}", value.with_scale_round(scale, RoundingMode::HalfUp))
}

pub fn format_usd_billions(value: &BigDecimal) -> String {
    format!(
        "${}B",
        billions(value).with_scale_round(2, RoundingMode::HalfUp)
    )
}

pub(crate) fn to_f64(value: &BigDecimal) -> f64 {
    value.to_f64().unwrap_or_default()
}

pub(crate) fn billions_f64(value: &BigDecimal) -> f64 {
    to_f64(&billions(value))
}

pub fn indicators(snapshot: &Snapshot) -> Vec<Indicator> {
    snapshot
        .iter()
        .map(|(asset, quote)| Indicator {
            asset,
            price: format_usd(&quote.spot_price, kpi_scale(asset)),
        })
        .collect()
}

pub fn table_rows(snapshot: &Snapshot) -> Vec<TableRow> {
    snapshot
        .iter()
        .map(|(asset, quote)| TableRow {
            asset,
            market_cap: format_usd_billions(&quote.market_cap_usd),
            price: format_usd(&quote.spot_price, table_price_scale(asset)),
            volume: format_usd_billions(&quote.volume_24h_usd),
        })
        .collect()
}

fn selected(selection: Selection) -> Vec<Asset> {
    match selection {
        Selection::All => Asset::ALL.to_vec(),
        Selection::Focused(asset) => vec![asset],
    }
}

/// 時価総額（十億ドル単位）
pub fn bar_data(snapshot: &Snapshot, selection: Selection) -> ChartData {
    let assets = selected(selection);
    ChartData {
        labels: assets.iter().map(|a| a.label().to_string()).collect(),
        values: assets
            .iter()
            .map(|a| billions_f64(&snapshot.quote(*a).market_cap_usd))
            .collect(),
    }
}

/// 現在価格
pub fn trend_data(snapshot: &Snapshot, selection: Selection) -> ChartData {
    let labels = match selection {
        Selection::All => Asset::ALL.iter().map(|a| a.label().to_string()).collect(),
        Selection::Focused(_) => vec![CURRENT_LABEL.to_string()],
    };
    ChartData {
        labels,
        values: selected(selection)
            .iter()
            .map(|a| to_f64(&snapshot.quote(*a).spot_price))
            .collect(),
    }
}

/// 価格履歴を日付ラベル付きの折れ線データにする
pub fn history_data(series: &HistoricalSeries) -> ChartData {
    let (labels, values) = series
        .points()
        .iter()
        .map(|p| (p.at.format("%Y-%m-%d").to_string(), to_f64(&p.value)))
        .unzip();
    ChartData { labels, values }
}

pub struct DataFanout {
    indicators: Arc<dyn IndicatorSink>,
    table: Arc<dyn TableSink>,
    bar: Arc<dyn ChartSink>,
    trend: Arc<dyn ChartSink>,
}

impl DataFanout {
    pub fn new(
        indicators: Arc<dyn IndicatorSink>,
        table: Arc<dyn TableSink>,
        bar: Arc<dyn ChartSink>,
        trend: Arc<dyn ChartSink>,
    ) -> Self {
        DataFanout {
            indicators,
            table,
            bar,
            trend,
        }
    }

    /// KPI → テーブル → 棒グラフ → 折れ線 の順に、同じスナップショットで更新する
    pub fn apply(&self, snapshot: &Snapshot, selection: Selection) {
        self.pass(snapshot, selection, true);
    }

    /// 定期更新用
    ///
    /// `apply` と違い、全 sink を更新するとは限らない。単一資産表示中は
    /// 折れ線（価格履歴）に触れず、表示を全資産に戻すこともしない。
    /// 選択は呼び出し側が渡したものをそのまま使う。
    pub fn refresh(&self, snapshot: &Snapshot, selection: Selection) {
        self.pass(snapshot, selection, selection == Selection::All);
    }

    fn pass(&self, snapshot: &Snapshot, selection: Selection, with_trend: bool) {
        self.indicators.replace_indicators(indicators(snapshot));
        self.table.replace_rows(table_rows(snapshot));
        self.bar.replace(bar_data(snapshot, selection));
        if with_trend {
            self.trend.replace(trend_data(snapshot, selection));
        }
    }
}
