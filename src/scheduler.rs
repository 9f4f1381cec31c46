//! 定期更新
//!
//! 一定間隔でキャッシュ経由のスナップショットを取り、現在の選択で全 sink を更新する。
//! キャッシュの TTL が更新間隔より長いので、ほとんどの tick はネットワークに触れない。

use crate::cache::QuoteCache;
use crate::fanout::DataFanout;
use crate::fetcher::QuoteSource;
use crate::logging::*;
use crate::selection::SelectionState;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

pub struct RefreshScheduler<S> {
    cache: Arc<QuoteCache<S>>,
    fanout: Arc<DataFanout>,
    selection: Arc<SelectionState>,
    interval: Duration,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl<S> RefreshScheduler<S>
where
    S: QuoteSource + Send + Sync + 'static,
{
    pub fn new(
        cache: Arc<QuoteCache<S>>,
        fanout: Arc<DataFanout>,
        selection: Arc<SelectionState>,
        interval: Duration,
    ) -> Self {
        RefreshScheduler {
            cache,
            fanout,
            selection,
            interval,
            task: Mutex::new(None),
        }
    }

    /// 直ちに1回更新し、以降 `interval` ごとに更新する。起動済みなら何もしない。
    pub fn start(self: &Arc<Self>) {
        let log = DEFAULT.new(o!("function" => "RefreshScheduler::start"));
        let mut task = self.task.lock().unwrap_or_else(|e| e.into_inner());
        if task.as_ref().is_some_and(|t| !t.is_finished()) {
            debug!(log, "already running");
            return;
        }
        let weak = Arc::downgrade(self);
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        *task = Some(tokio::spawn(async move {
            loop {
                ticker.tick().await;
                // 破棄されたら終了
                let Some(this) = weak.upgrade() else {
                    break;
                };
                this.tick().await;
            }
        }));
        info!(log, "started"; "interval" => %humantime::format_duration(self.interval));
    }

    pub fn stop(&self) {
        let log = DEFAULT.new(o!("function" => "RefreshScheduler::stop"));
        if let Some(task) = self.task.lock().unwrap_or_else(|e| e.into_inner()).take() {
            task.abort();
            info!(log, "stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .is_some_and(|t| !t.is_finished())
    }

    /// 1回分の更新。スナップショットが無ければ sink には触れない。
    pub async fn tick(&self) {
        let log = DEFAULT.new(o!("function" => "RefreshScheduler::tick"));
        match self.cache.get().await {
            Some(snapshot) => {
                let selection = self.selection.current();
                trace!(log, "refreshing"; "selection" => ?selection);
                self.fanout.refresh(&snapshot, selection);
            }
            None => {
                warn!(log, "no snapshot available; skipping refresh");
            }
        }
    }
}

impl<S> Drop for RefreshScheduler<S> {
    fn drop(&mut self) {
        if let Some(task) = self.task.get_mut().unwrap_or_else(|e| e.into_inner()).take() {
            task.abort();
        }
    }
}
