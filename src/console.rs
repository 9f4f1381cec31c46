//! 端末用の sink 実装と、標準入力のコマンド
//!
//! 描画ウィジェットの代わりに、受け取った内容を構造化ログとして出力する。

use crate::Result;
use crate::drilldown::DrilldownKey;
use crate::logging::*;
use crate::sink::*;
use crate::types::{Asset, UnknownAsset};
use chrono::{NaiveDate, NaiveTime};
use std::str::FromStr;

/// すべての sink をログ出力で実装する
#[derive(Clone)]
pub struct ConsoleSink {
    log: Logger,
}

impl ConsoleSink {
    pub fn new(widget: &'static str) -> Self {
        ConsoleSink {
            log: DEFAULT.new(o!("widget" => widget)),
        }
    }
}

fn pairs(data: &ChartData) -> String {
    data.labels
        .iter()
        .zip(&data.values)
        .map(|(l, v)| format!("{l}={v}"))
        .collect::<Vec<_>>()
        .join(", ")
}

impl IndicatorSink for ConsoleSink {
    fn replace_indicators(&self, indicators: Vec<Indicator>) {
        for indicator in indicators {
            info!(self.log, "indicator"; "asset" => indicator.asset.label(), "price" => indicator.price);
        }
    }
}

impl TableSink for ConsoleSink {
    fn replace_rows(&self, rows: Vec<TableRow>) {
        for row in rows {
            info!(self.log, "row";
                "asset" => row.asset.label(),
                "market_cap" => row.market_cap,
                "price" => row.price,
                "volume" => row.volume
            );
        }
    }
}

impl ChartSink for ConsoleSink {
    fn replace(&self, data: ChartData) {
        info!(self.log, "chart"; "points" => data.len(), "data" => pairs(&data));
    }
}

impl GaugeSink for ConsoleSink {
    fn set_value(&self, value: f64) {
        info!(self.log, "gauge"; "value" => format!("{value:.2}%"));
    }
}

impl DrilldownSink for ConsoleSink {
    fn replace_overview(&self, points: Vec<DrilldownPoint>) {
        for point in points {
            info!(self.log, "overview";
                "label" => point.label,
                "value" => point.value,
                "expand" => point.child.map(|k| k.to_string())
            );
        }
    }

    fn append_child(&self, series: DrilldownSeries) {
        info!(self.log, "expanded"; "key" => %series.key, "name" => &series.name, "points" => series.points.len());
        for point in series.points {
            debug!(self.log, "point";
                "label" => point.label,
                "value" => point.value,
                "expand" => point.child.map(|k| k.to_string())
            );
        }
    }
}

/// 診断を warn ログに流す
pub struct LogDiagnostics {
    log: Logger,
}

impl Default for LogDiagnostics {
    fn default() -> Self {
        LogDiagnostics {
            log: DEFAULT.new(o!("function" => "diagnostics")),
        }
    }
}

impl DiagnosticSink for LogDiagnostics {
    fn emit(&self, diagnostic: Diagnostic) {
        warn!(self.log, "{}", diagnostic.message; "source" => diagnostic.source);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Select(Asset),
    Expand(DrilldownKey),
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    #[error("empty command")]
    Empty,
    #[error("unknown command: {0}")]
    UnknownCommand(String),
    #[error("missing asset")]
    MissingAsset,
    #[error(transparent)]
    UnknownAsset(#[from] UnknownAsset),
    #[error("invalid anchor (expected YYYY-MM or YYYY-MM-DD): {0}")]
    InvalidAnchor(String),
    #[error("unexpected argument: {0}")]
    UnexpectedArgument(String),
}

fn parse_anchor(asset: Asset, anchor: &str) -> Result<DrilldownKey, CommandError> {
    let invalid = || CommandError::InvalidAnchor(anchor.to_string());
    match anchor.len() {
        7 => NaiveDate::parse_from_str(&format!("{anchor}-01"), "%Y-%m-%d")
            .map(|d| DrilldownKey::daily(asset, d.and_time(NaiveTime::MIN).and_utc()))
            .map_err(|_| invalid()),
        10 => NaiveDate::parse_from_str(anchor, "%Y-%m-%d")
            .map(|d| DrilldownKey::hourly(asset, d.and_time(NaiveTime::MIN).and_utc()))
            .map_err(|_| invalid()),
        _ => Err(invalid()),
    }
}

impl FromStr for Command {
    type Err = CommandError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut words = line.split_whitespace();
        let command = words.next().ok_or(CommandError::Empty)?;
        let parsed = match command {
            "quit" | "exit" => Command::Quit,
            "select" => {
                let asset = words.next().ok_or(CommandError::MissingAsset)?.parse::<Asset>()?;
                Command::Select(asset)
            }
            "expand" => {
                let asset = words.next().ok_or(CommandError::MissingAsset)?.parse::<Asset>()?;
                match words.next() {
                    None => Command::Expand(DrilldownKey::monthly(asset)),
                    Some(anchor) => Command::Expand(parse_anchor(asset, anchor)?),
                }
            }
            other => return Err(CommandError::UnknownCommand(other.to_string())),
        };
        match words.next() {
            Some(extra) => Err(CommandError::UnexpectedArgument(extra.to_string())),
            None => Ok(parsed),
        }
    }
}
