//! 後縁（trailing-edge）デバウンス
//!
//! 呼び出すたびに保留中の実行を取り消し、最後の呼び出しから `window`
//! 経過後に、その引数で1回だけ実行する。実行が始まったアクションは
//! 取り消さない。

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;

pub struct Debouncer<T> {
    window: Duration,
    action: Arc<dyn Fn(T) -> futures::future::BoxFuture<'static, ()> + Send + Sync>,
    pending: Mutex<Option<JoinHandle<()>>>,
}

/// `action` を `window` でデバウンスする
pub fn debounce<T, F, Fut>(window: Duration, action: F) -> Debouncer<T>
where
    T: Send + 'static,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Debouncer::new(window, action)
}

impl<T> Debouncer<T>
where
    T: Send + 'static,
{
    pub fn new<F, Fut>(window: Duration, action: F) -> Self
    where
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        use futures::FutureExt;
        Debouncer {
            window,
            action: Arc::new(move |arg: T| action(arg).boxed()),
            pending: Mutex::new(None),
        }
    }

    pub fn call(&self, arg: T) {
        let window = self.window;
        let action = Arc::clone(&self.action);
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(previous) = pending.take() {
            previous.abort();
        }
        *pending = Some(tokio::spawn(async move {
            tokio::time::sleep(window).await;
            // 待機後は独立したタスクで実行し、後続の abort の影響を受けない
            tokio::spawn(action(arg));
        }));
    }

    /// 保留中の実行を破棄する
    pub fn cancel(&self) {
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(previous) = pending.take() {
            previous.abort();
        }
    }
}

impl<T> Drop for Debouncer<T> {
    fn drop(&mut self) {
        let pending = self.pending.get_mut().unwrap_or_else(|e| e.into_inner());
        if let Some(previous) = pending.take() {
            previous.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recorder() -> (Arc<Mutex<Vec<&'static str>>>, Debouncer<&'static str>) {
        let calls = Arc::new(Mutex::new(vec![]));
        let debouncer = debounce(Duration::from_millis(500), {
            let calls = Arc::clone(&calls);
            move |name: &'static str| {
                let calls = Arc::clone(&calls);
                async move {
                    calls.lock().unwrap().push(name);
                }
            }
        });
        (calls, debouncer)
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_call_runs_after_window() {
        let (calls, debouncer) = recorder();
        debouncer.call("bitcoin");

        tokio::time::sleep(Duration::from_millis(499)).await;
        assert!(calls.lock().unwrap().is_empty());

        tokio::time::sleep(Duration::from_millis(2)).await;
        assert_eq!(*calls.lock().unwrap(), vec!["bitcoin"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_runs_only_last() {
        let (calls, debouncer) = recorder();
        debouncer.call("bitcoin");
        tokio::time::sleep(Duration::from_millis(100)).await;
        debouncer.call("ethereum");

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(*calls.lock().unwrap(), vec!["ethereum"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_each_call_restarts_window() {
        let (calls, debouncer) = recorder();
        for name in ["a", "b", "c", "d"] {
            debouncer.call(name);
            tokio::time::sleep(Duration::from_millis(400)).await;
        }
        // 最後の呼び出しから 400ms しか経っていない
        assert!(calls.lock().unwrap().is_empty());

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(*calls.lock().unwrap(), vec!["d"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_quiet_periods_run_separately() {
        let (calls, debouncer) = recorder();
        debouncer.call("bitcoin");
        tokio::time::sleep(Duration::from_millis(600)).await;
        debouncer.call("solana");
        tokio::time::sleep(Duration::from_millis(600)).await;

        assert_eq!(*calls.lock().unwrap(), vec!["bitcoin", "solana"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_discards_pending() {
        let (calls, debouncer) = recorder();
        debouncer.call("bitcoin");
        tokio::time::sleep(Duration::from_millis(100)).await;
        debouncer.cancel();

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(calls.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_started_action_not_aborted_by_new_call() {
        let started = Arc::new(Mutex::new(vec![]));
        let finished = Arc::new(Mutex::new(vec![]));
        let debouncer = debounce(Duration::from_millis(500), {
            let started = Arc::clone(&started);
            let finished = Arc::clone(&finished);
            move |name: &'static str| {
                let started = Arc::clone(&started);
                let finished = Arc::clone(&finished);
                async move {
                    started.lock().unwrap().push(name);
                    tokio::time::sleep(Duration::from_secs(2)).await;
                    finished.lock().unwrap().push(name);
                }
            }
        });

        debouncer.call("bitcoin");
        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(*started.lock().unwrap(), vec!["bitcoin"]);

        // 実行中に次の呼び出しが来ても、実行中のアクションは最後まで走る
        debouncer.call("ethereum");
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(*finished.lock().unwrap(), vec!["bitcoin", "ethereum"]);
    }
}
