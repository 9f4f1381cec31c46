//! 補助ウィジェット（スパークライン・ゲージ）
//!
//! どちらもキャッシュ済みのスナップショットを `peek` で読むだけで、
//! ネットワークには触れない。

use crate::cache::QuoteCache;
use crate::fanout::to_f64;
use crate::fetcher::QuoteSource;
use crate::logging::*;
use crate::selection::{Selection, SelectionState};
use crate::sink::{ChartData, ChartSink, GaugeSink};
use crate::types::{Asset, Snapshot};
use bigdecimal::BigDecimal;
use num_traits::Zero;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

pub trait Widget: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    fn tick(&self);
}

/// ウィジェットを一定間隔で動かすタスク。drop で止まる。
pub struct WidgetTicker {
    name: &'static str,
    task: JoinHandle<()>,
}

impl WidgetTicker {
    pub fn start<W: Widget>(widget: Arc<W>, interval: Duration) -> Self {
        let log = DEFAULT.new(o!("function" => "WidgetTicker::start", "widget" => widget.name()));
        info!(log, "started"; "interval" => %humantime::format_duration(interval));
        let name = widget.name();
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                widget.tick();
            }
        });
        WidgetTicker { name, task }
    }

    pub fn stop(&self) {
        let log = DEFAULT.new(o!("function" => "WidgetTicker::stop", "widget" => self.name));
        self.task.abort();
        debug!(log, "stopped");
    }
}

impl Drop for WidgetTicker {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// 注目中の資産（無ければ Bitcoin）の価格を直近 `capacity` 件だけ表示する
pub struct Sparkline<S> {
    cache: Arc<QuoteCache<S>>,
    selection: Arc<SelectionState>,
    sink: Arc<dyn ChartSink>,
    capacity: usize,
    window: Mutex<VecDeque<(String, f64)>>,
}

impl<S> Sparkline<S> {
    pub fn new(
        cache: Arc<QuoteCache<S>>,
        selection: Arc<SelectionState>,
        sink: Arc<dyn ChartSink>,
        capacity: usize,
    ) -> Self {
        Sparkline {
            cache,
            selection,
            sink,
            capacity: capacity.max(1),
            window: Mutex::new(VecDeque::new()),
        }
    }
}

impl<S> Widget for Sparkline<S>
where
    S: QuoteSource + Send + Sync + 'static,
{
    fn name(&self) -> &'static str {
        "sparkline"
    }

    fn tick(&self) {
        let Some(snapshot) = self.cache.peek() else {
            return;
        };
        let asset = match self.selection.current() {
            Selection::Focused(asset) => asset,
            Selection::All => Asset::Bitcoin,
        };
        let price = to_f64(&snapshot.quote(asset).spot_price);
        let label = chrono::Utc::now().format("%H:%M:%S").to_string();

        let data = {
            let mut window = self.window.lock().unwrap_or_else(|e| e.into_inner());
            window.push_back((label, price));
            while window.len() > self.capacity {
                window.pop_front();
            }
            let (labels, values) = window.iter().cloned().unzip();
            ChartData { labels, values }
        };
        self.sink.replace(data);
    }
}

/// 全資産の時価総額に占める Bitcoin の割合（%）
pub fn btc_dominance(snapshot: &Snapshot) -> Option<f64> {
    let total: BigDecimal = snapshot.iter().map(|(_, q)| &q.market_cap_usd).sum();
    if total.is_zero() {
        return None;
    }
    let share = &snapshot.quote(Asset::Bitcoin).market_cap_usd * BigDecimal::from(100) / total;
    Some(to_f64(&share))
}

pub struct Gauge<S> {
    cache: Arc<QuoteCache<S>>,
    sink: Arc<dyn GaugeSink>,
}

impl<S> Gauge<S> {
    pub fn new(cache: Arc<QuoteCache<S>>, sink: Arc<dyn GaugeSink>) -> Self {
        Gauge { cache, sink }
    }
}

impl<S> Widget for Gauge<S>
where
    S: QuoteSource + Send + Sync + 'static,
{
    fn name(&self) -> &'static str {
        "gauge"
    }

    fn tick(&self) {
        let log = DEFAULT.new(o!("function" => "Gauge::tick"));
        let Some(snapshot) = self.cache.peek() else {
            return;
        };
        match btc_dominance(&snapshot) {
            Some(value) => self.sink.set_value(value),
            None => trace!(log, "total market cap is zero"),
        }
    }
}
