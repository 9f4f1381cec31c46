//! 表示側（ウィジェット）とのインターフェース
//!
//! コアは sink に書き込むだけで、状態を読み戻すことはない。

use crate::drilldown::DrilldownKey;
use crate::types::Asset;

/// KPI 表示1件
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Indicator {
    pub asset: Asset,
    pub price: String,
}

/// テーブル1行
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRow {
    pub asset: Asset,
    pub market_cap: String,
    pub price: String,
    pub volume: String,
}

/// カテゴリ（ラベル）と値の組
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ChartData {
    pub labels: Vec<String>,
    pub values: Vec<f64>,
}

impl ChartData {
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

pub trait IndicatorSink: Send + Sync {
    fn replace_indicators(&self, indicators: Vec<Indicator>);
}

pub trait TableSink: Send + Sync {
    fn replace_rows(&self, rows: Vec<TableRow>);
}

/// 棒グラフ・折れ線グラフ・スパークライン
pub trait ChartSink: Send + Sync {
    fn replace(&self, data: ChartData);
}

pub trait GaugeSink: Send + Sync {
    fn set_value(&self, value: f64);
}

/// ドリルダウングラフの1点。`child` があれば展開できる。
#[derive(Debug, Clone, PartialEq)]
pub struct DrilldownPoint {
    pub label: String,
    pub value: f64,
    pub child: Option<DrilldownKey>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DrilldownSeries {
    pub key: DrilldownKey,
    pub name: String,
    pub points: Vec<DrilldownPoint>,
}

pub trait DrilldownSink: Send + Sync {
    /// 最上位（資産ごと）の系列を置き換える
    fn replace_overview(&self, points: Vec<DrilldownPoint>);

    /// 展開された点の下に子系列を追加する
    fn append_child(&self, series: DrilldownSeries);
}

/// 運用者向けの診断メッセージ
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub source: &'static str,
    pub message: String,
}

pub trait DiagnosticSink: Send + Sync {
    fn emit(&self, diagnostic: Diagnostic);
}
