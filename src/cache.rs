//! 全資産スナップショットの単一スロット TTL キャッシュ
//!
//! - 有効期限内ならネットワークに触れずに返す
//! - 期限切れ・未取得なら取得する。同時に来た呼び出しは進行中の取得を共有する
//! - 取得に失敗したら、古くても直前のスナップショットを返す

use crate::fetcher::QuoteSource;
use crate::logging::*;
use crate::types::Snapshot;
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;

type Inflight = Shared<BoxFuture<'static, Option<Arc<Snapshot>>>>;

/// 取得済みスナップショットと取得時刻。常に組で置き換える。
#[derive(Debug, Clone)]
struct CacheEntry {
    snapshot: Arc<Snapshot>,
    fetched_at: Instant,
}

impl CacheEntry {
    fn is_fresh(&self, now: Instant, ttl: Duration) -> bool {
        now.saturating_duration_since(self.fetched_at) < ttl
    }
}

#[derive(Default)]
struct CacheState {
    entry: Option<CacheEntry>,
    inflight: Option<Inflight>,
}

fn lock(state: &Mutex<CacheState>) -> MutexGuard<'_, CacheState> {
    state.lock().unwrap_or_else(|e| e.into_inner())
}

pub struct QuoteCache<S> {
    source: Arc<S>,
    ttl: Duration,
    state: Arc<Mutex<CacheState>>,
}

impl<S> QuoteCache<S>
where
    S: QuoteSource + Send + Sync + 'static,
{
    pub fn new(source: Arc<S>, ttl: Duration) -> Self {
        QuoteCache {
            source,
            ttl,
            state: Arc::new(Mutex::new(CacheState::default())),
        }
    }

    pub fn source(&self) -> &Arc<S> {
        &self.source
    }

    /// 現在のスナップショットを返す。一度も取得できていなければ `None`。
    pub async fn get(&self) -> Option<Arc<Snapshot>> {
        let flight = {
            let mut state = lock(&self.state);
            if let Some(entry) = &state.entry
                && entry.is_fresh(Instant::now(), self.ttl)
            {
                return Some(Arc::clone(&entry.snapshot));
            }
            match &state.inflight {
                Some(flight) => flight.clone(),
                None => {
                    let flight = self.start_fetch();
                    state.inflight = Some(flight.clone());
                    flight
                }
            }
        };
        flight.await
    }

    /// ネットワークに触れず、キャッシュ済みの値（期限切れを含む）を返す
    pub fn peek(&self) -> Option<Arc<Snapshot>> {
        lock(&self.state)
            .entry
            .as_ref()
            .map(|entry| Arc::clone(&entry.snapshot))
    }

    fn start_fetch(&self) -> Inflight {
        let source = Arc::clone(&self.source);
        let state = Arc::clone(&self.state);
        async move {
            let log = DEFAULT.new(o!("function" => "QuoteCache::refresh"));
            let result = source.fetch_snapshot().await;

            let mut state = lock(&state);
            state.inflight = None;
            match result {
                Ok(snapshot) => {
                    let snapshot = Arc::new(snapshot);
                    state.entry = Some(CacheEntry {
                        snapshot: Arc::clone(&snapshot),
                        fetched_at: Instant::now(),
                    });
                    debug!(log, "cache refreshed");
                    Some(snapshot)
                }
                Err(e) => {
                    let fallback = state.entry.as_ref().map(|entry| Arc::clone(&entry.snapshot));
                    warn!(log, "refresh failed";
                        "error" => %e, "serving_stale" => fallback.is_some());
                    fallback
                }
            }
        }
        .boxed()
        .shared()
    }
}
