//! 各コンポーネントを設定と sink から組み立てる

use crate::Result;
use crate::cache::QuoteCache;
use crate::config::Settings;
use crate::console::{ConsoleSink, LogDiagnostics};
use crate::debounce::Debouncer;
use crate::drilldown::{DrilldownController, DrilldownKey, ExpandOutcome};
use crate::fanout::DataFanout;
use crate::fetcher::{CoinGeckoClient, QuoteSource};
use crate::logging::*;
use crate::scheduler::RefreshScheduler;
use crate::selection::{Selection, SelectionController, SelectionState};
use crate::sink::*;
use crate::types::Asset;
use crate::widgets::{Gauge, Sparkline, WidgetTicker};
use std::sync::{Arc, Mutex};

/// 表示側の sink 一式
#[derive(Clone)]
pub struct Sinks {
    pub indicators: Arc<dyn IndicatorSink>,
    pub table: Arc<dyn TableSink>,
    pub bar: Arc<dyn ChartSink>,
    pub trend: Arc<dyn ChartSink>,
    pub drilldown: Arc<dyn DrilldownSink>,
    pub sparkline: Arc<dyn ChartSink>,
    pub gauge: Arc<dyn GaugeSink>,
    pub diagnostics: Arc<dyn DiagnosticSink>,
}

impl Sinks {
    /// すべてログに出力する
    pub fn console() -> Self {
        Sinks {
            indicators: Arc::new(ConsoleSink::new("indicators")),
            table: Arc::new(ConsoleSink::new("table")),
            bar: Arc::new(ConsoleSink::new("bar")),
            trend: Arc::new(ConsoleSink::new("trend")),
            drilldown: Arc::new(ConsoleSink::new("drilldown")),
            sparkline: Arc::new(ConsoleSink::new("sparkline")),
            gauge: Arc::new(ConsoleSink::new("gauge")),
            diagnostics: Arc::new(LogDiagnostics::default()),
        }
    }
}

pub struct Dashboard<S> {
    settings: Settings,
    cache: Arc<QuoteCache<S>>,
    selection: Arc<SelectionState>,
    scheduler: Arc<RefreshScheduler<S>>,
    selector: Debouncer<Asset>,
    drilldown: DrilldownController<S>,
    sparkline: Arc<Sparkline<S>>,
    gauge: Arc<Gauge<S>>,
    widgets: Mutex<Vec<WidgetTicker>>,
}

impl Dashboard<CoinGeckoClient> {
    /// 設定の quote service に接続する
    pub fn connect(settings: Settings, sinks: Sinks) -> Result<Self> {
        let client = CoinGeckoClient::new(settings.base_url.clone(), settings.request_timeout)?;
        Ok(Dashboard::new(Arc::new(client), settings, sinks))
    }
}

impl<S> Dashboard<S>
where
    S: QuoteSource + Send + Sync + 'static,
{
    pub fn new(source: Arc<S>, settings: Settings, sinks: Sinks) -> Self {
        let cache = Arc::new(QuoteCache::new(source, settings.cache_ttl));
        let selection = Arc::new(SelectionState::default());
        let fanout = Arc::new(DataFanout::new(
            sinks.indicators,
            sinks.table,
            sinks.bar,
            Arc::clone(&sinks.trend),
        ));
        let scheduler = Arc::new(RefreshScheduler::new(
            Arc::clone(&cache),
            Arc::clone(&fanout),
            Arc::clone(&selection),
            settings.refresh_interval,
        ));
        let selector = Arc::new(SelectionController::new(
            Arc::clone(&cache),
            fanout,
            sinks.trend,
            Arc::clone(&selection),
            Arc::clone(&sinks.diagnostics),
            settings.price_history_days,
        ))
        .debounced(settings.selection_debounce);
        let drilldown = DrilldownController::new(
            Arc::clone(&cache),
            sinks.drilldown,
            sinks.diagnostics,
            settings.drilldown_lookback_days,
        );
        let sparkline = Arc::new(Sparkline::new(
            Arc::clone(&cache),
            Arc::clone(&selection),
            sinks.sparkline,
            settings.sparkline_points,
        ));
        let gauge = Arc::new(Gauge::new(Arc::clone(&cache), sinks.gauge));

        Dashboard {
            settings,
            cache,
            selection,
            scheduler,
            selector,
            drilldown,
            sparkline,
            gauge,
            widgets: Mutex::new(vec![]),
        }
    }

    pub fn cache(&self) -> &Arc<QuoteCache<S>> {
        &self.cache
    }

    pub fn selection(&self) -> Selection {
        self.selection.current()
    }

    /// 定期更新と補助ウィジェットを開始する
    pub fn start(&self) {
        let log = DEFAULT.new(o!("function" => "Dashboard::start"));
        self.scheduler.start();
        let mut widgets = self.widgets.lock().unwrap_or_else(|e| e.into_inner());
        if widgets.is_empty() {
            widgets.push(WidgetTicker::start(
                Arc::clone(&self.sparkline),
                self.settings.sparkline_interval,
            ));
            widgets.push(WidgetTicker::start(
                Arc::clone(&self.gauge),
                self.settings.gauge_interval,
            ));
        }
        info!(log, "dashboard started");
    }

    pub fn stop(&self) {
        let log = DEFAULT.new(o!("function" => "Dashboard::stop"));
        self.scheduler.stop();
        self.selector.cancel();
        for widget in self
            .widgets
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .drain(..)
        {
            widget.stop();
        }
        info!(log, "dashboard stopped");
    }

    /// 資産を選択する。デバウンスされ、最後の選択だけが反映される。
    pub fn select(&self, asset: Asset) {
        self.selector.call(asset);
    }

    pub async fn load_overview(&self) -> bool {
        self.drilldown.load_overview().await
    }

    pub async fn expand(&self, key: DrilldownKey) -> ExpandOutcome {
        self.drilldown.expand(key).await
    }
}
