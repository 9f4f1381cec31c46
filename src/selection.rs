//! 資産選択の状態と、その選択に応じた画面更新

use crate::cache::QuoteCache;
use crate::debounce::{Debouncer, debounce};
use crate::fanout::{DataFanout, history_data};
use crate::fetcher::QuoteSource;
use crate::logging::*;
use crate::sink::{ChartSink, Diagnostic, DiagnosticSink};
use crate::types::Asset;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// 全資産表示か、単一資産へのフォーカスか
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Selection {
    #[default]
    All,
    Focused(Asset),
}

/// 現在の選択と、選択ごとに増える世代番号
///
/// 書き換えるのは `SelectionController` だけ。
#[derive(Debug, Default)]
pub struct SelectionState {
    inner: Mutex<(Selection, u64)>,
}

impl SelectionState {
    pub fn current(&self) -> Selection {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).0
    }

    pub(crate) fn accept(&self, asset: Asset) -> u64 {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.0 = Selection::Focused(asset);
        inner.1 += 1;
        inner.1
    }

    fn is_current(&self, generation: u64) -> bool {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).1 == generation
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectionOutcome {
    /// 価格履歴まで反映した
    Applied { history_points: usize },
    /// 価格履歴が得られず、折れ線はそのまま
    NoHistory,
    /// 処理中に新しい選択が来たので結果を捨てた
    Superseded,
}

pub struct SelectionController<S> {
    cache: Arc<QuoteCache<S>>,
    fanout: Arc<DataFanout>,
    trend: Arc<dyn ChartSink>,
    state: Arc<SelectionState>,
    diagnostics: Arc<dyn DiagnosticSink>,
    history_days: u32,
}

impl<S> SelectionController<S>
where
    S: QuoteSource + Send + Sync + 'static,
{
    pub fn new(
        cache: Arc<QuoteCache<S>>,
        fanout: Arc<DataFanout>,
        trend: Arc<dyn ChartSink>,
        state: Arc<SelectionState>,
        diagnostics: Arc<dyn DiagnosticSink>,
        history_days: u32,
    ) -> Self {
        SelectionController {
            cache,
            fanout,
            trend,
            state,
            diagnostics,
            history_days,
        }
    }

    /// `window` 内の連続した選択を最後の1件にまとめるハンドラを作る
    pub fn debounced(self: &Arc<Self>, window: Duration) -> Debouncer<Asset> {
        let controller = Arc::clone(self);
        debounce(window, move |asset: Asset| {
            let controller = Arc::clone(&controller);
            async move {
                controller.handle(asset).await;
            }
        })
    }

    /// 選択を受理して画面を更新する
    pub async fn handle(&self, asset: Asset) -> SelectionOutcome {
        let log = DEFAULT.new(o!("function" => "SelectionController::handle", "asset" => asset.id()));
        let generation = self.state.accept(asset);
        debug!(log, "selection accepted"; "generation" => generation);

        let snapshot = self.cache.get().await;
        if !self.state.is_current(generation) {
            debug!(log, "superseded before fan-out");
            return SelectionOutcome::Superseded;
        }
        match &snapshot {
            Some(snapshot) => self.fanout.apply(snapshot, Selection::Focused(asset)),
            None => self.emit(format!("no snapshot available for {asset}")),
        }

        let history = self
            .cache
            .source()
            .fetch_price_history(asset, self.history_days)
            .await;
        if !self.state.is_current(generation) {
            debug!(log, "superseded before history update");
            return SelectionOutcome::Superseded;
        }

        match history {
            Ok(series) if !series.is_empty() => {
                let points = series.len();
                self.trend.replace(history_data(&series));
                info!(log, "price history displayed"; "points" => points);
                SelectionOutcome::Applied {
                    history_points: points,
                }
            }
            Ok(_) => {
                self.emit(format!("price history for {asset} is empty"));
                SelectionOutcome::NoHistory
            }
            Err(e) => {
                self.emit(format!("price history for {asset} unavailable: {e}"));
                SelectionOutcome::NoHistory
            }
        }
    }

    fn emit(&self, message: String) {
        self.diagnostics.emit(Diagnostic {
            source: "selection",
            message,
        });
    }
}
