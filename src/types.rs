//! ダッシュボードが扱う市場データの型

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// 表示対象の暗号資産（固定集合）
///
/// `ALL` の並びが全画面共通の表示順になる。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Asset {
    Bitcoin,
    Ethereum,
    Dogecoin,
    Solana,
}

impl Asset {
    pub const ALL: [Asset; 4] = [
        Asset::Bitcoin,
        Asset::Ethereum,
        Asset::Dogecoin,
        Asset::Solana,
    ];

    /// quote service 上の識別子
    pub fn id(self) -> &'static str {
        match self {
            Asset::Bitcoin => "bitcoin",
            Asset::Ethereum => "ethereum",
            Asset::Dogecoin => "dogecoin",
            Asset::Solana => "solana",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Asset::Bitcoin => "Bitcoin",
            Asset::Ethereum => "Ethereum",
            Asset::Dogecoin => "Dogecoin",
            Asset::Solana => "Solana",
        }
    }
}

impl fmt::Display for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown asset: {0}")]
pub struct UnknownAsset(pub String);

impl FromStr for Asset {
    type Err = UnknownAsset;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        Asset::ALL
            .into_iter()
            .find(|a| a.id() == lower)
            .ok_or_else(|| UnknownAsset(s.to_string()))
    }
}

/// 1資産分の気配値（USD建て）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Quote {
    pub spot_price: BigDecimal,
    pub market_cap_usd: BigDecimal,
    pub volume_24h_usd: BigDecimal,
}

/// 全資産の気配値をまとめたスナップショット
///
/// 全ての `Asset` を含む場合にだけ構築できる。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    quotes: HashMap<Asset, Quote>,
}

impl Snapshot {
    /// 欠けている資産があれば、その資産を `Err` で返す
    pub fn new(quotes: HashMap<Asset, Quote>) -> Result<Self, Asset> {
        if let Some(missing) = Asset::ALL.into_iter().find(|a| !quotes.contains_key(a)) {
            return Err(missing);
        }
        Ok(Snapshot { quotes })
    }

    pub fn quote(&self, asset: Asset) -> &Quote {
        // new() で全資産が揃っている
        &self.quotes[&asset]
    }

    /// 列挙順に (資産, 気配値) を返す
    pub fn iter(&self) -> impl Iterator<Item = (Asset, &Quote)> + '_ {
        Asset::ALL.into_iter().map(move |a| (a, self.quote(a)))
    }
}

/// 時系列の1点
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeriesPoint {
    pub at: DateTime<Utc>,
    pub value: BigDecimal,
}

/// 時刻昇順に並んだ時系列
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HistoricalSeries {
    points: Vec<SeriesPoint>,
}

impl HistoricalSeries {
    pub fn new(mut points: Vec<SeriesPoint>) -> Self {
        points.sort_by_key(|p| p.at);
        HistoricalSeries { points }
    }

    pub fn points(&self) -> &[SeriesPoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// `[from, to)` に入る点だけを取り出す
    pub fn window(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> HistoricalSeries {
        HistoricalSeries {
            points: self
                .points
                .iter()
                .filter(|p| p.at >= from && p.at < to)
                .cloned()
                .collect(),
        }
    }
}

/// quote service に要求する時系列の粒度
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Interval {
    Daily,
    Hourly,
}

impl Interval {
    pub fn as_str(self) -> &'static str {
        match self {
            Interval::Daily => "daily",
            Interval::Hourly => "hourly",
        }
    }
}
