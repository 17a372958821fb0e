//! Debounced per-path refreshes.
//!
//! File watchers report changes path by path. Requests arriving within the
//! configured delay of each other are collected into one batch; when the
//! delay passes without a new request, every distinct path is refreshed
//! concurrently. These refreshes bypass the task queue and the busy tracker.

use bridge_traits::ImportEngine;
use core_async::sync::{oneshot, Notify};
use core_async::time::{sleep, Duration};
use core_runtime::events::{AssetDbEvent, EventBus};
use futures::future::{join_all, BoxFuture};
use futures::FutureExt;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, trace, warn};

#[derive(Default)]
struct Pending {
    paths: Vec<String>,
    waiters: Vec<oneshot::Sender<bool>>,
    timer_running: bool,
}

#[derive(Clone)]
pub struct LazyRefreshDebouncer {
    pending: Arc<Mutex<Pending>>,
    reset: Arc<Notify>,
    engine: Arc<dyn ImportEngine>,
    delay: Duration,
    events: EventBus,
}

impl LazyRefreshDebouncer {
    pub fn new(engine: Arc<dyn ImportEngine>, delay: Duration, events: EventBus) -> Self {
        Self {
            pending: Arc::new(Mutex::new(Pending::default())),
            reset: Arc::new(Notify::new()),
            engine,
            delay,
            events,
        }
    }

    /// Queue `path` for the next batch and restart the delay.
    ///
    /// Resolves `true` once the batch was attempted, whatever the outcome of
    /// the individual refreshes; `false` if the debouncer was cancelled first.
    pub fn request(&self, path: impl Into<String>) -> BoxFuture<'static, bool> {
        let path = path.into();
        let (sender, receiver) = oneshot::channel();

        let start_timer = {
            let mut pending = self.pending.lock();
            if !pending.paths.contains(&path) {
                pending.paths.push(path);
            }
            pending.waiters.push(sender);
            !std::mem::replace(&mut pending.timer_running, true)
        };

        if start_timer {
            let debouncer = self.clone();
            core_async::spawn(async move {
                debouncer.run_timer().await;
            });
        } else {
            self.reset.notify_one();
        }

        receiver.map(|result| result.unwrap_or(false)).boxed()
    }

    /// One timer per batch; every request restarts its delay.
    async fn run_timer(&self) {
        loop {
            core_async::select! {
                _ = self.reset.notified() => trace!("Lazy refresh delay restarted"),
                _ = sleep(self.delay) => break,
            }
        }
        self.flush().await;
    }

    async fn flush(&self) {
        let (paths, waiters) = {
            let mut pending = self.pending.lock();
            pending.timer_running = false;
            (
                std::mem::take(&mut pending.paths),
                std::mem::take(&mut pending.waiters),
            )
        };

        if paths.is_empty() {
            return;
        }

        debug!(paths = paths.len(), "Flushing lazy refresh batch");
        let results = join_all(paths.iter().map(|path| self.engine.refresh_path(path))).await;
        for (path, result) in paths.iter().zip(results) {
            if let Err(err) = result {
                warn!(path = %path, error = %err, "Lazy refresh failed");
            }
        }

        self.events
            .publish(AssetDbEvent::LazyRefreshFlushed { paths });

        for waiter in waiters {
            let _ = waiter.send(true);
        }
    }

    /// Paths waiting for the next flush.
    pub fn pending_paths(&self) -> Vec<String> {
        self.pending.lock().paths.clone()
    }

    /// Whether a batch timer is counting down.
    pub fn is_scheduled(&self) -> bool {
        self.pending.lock().timer_running
    }

    /// Drop the pending batch; its waiters resolve `false`. A running timer
    /// still fires, finds nothing and stops.
    pub fn cancel(&self) -> usize {
        let waiters = {
            let mut pending = self.pending.lock();
            pending.paths.clear();
            std::mem::take(&mut pending.waiters)
        };

        let count = waiters.len();
        for waiter in waiters {
            let _ = waiter.send(false);
        }
        count
    }
}

impl std::fmt::Debug for LazyRefreshDebouncer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LazyRefreshDebouncer")
            .field("delay", &self.delay)
            .field("pending", &self.pending.lock().paths.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_traits::{BridgeError, DatabaseConfig};
    use core_runtime::events::CoreEvent;

    #[derive(Default)]
    struct PathRecorder {
        refreshed: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ImportEngine for PathRecorder {
        async fn pre_import(
            &self,
            _db: &DatabaseConfig,
            _extensions: &[String],
        ) -> bridge_traits::Result<()> {
            Ok(())
        }

        async fn full_import(&self, _db: &DatabaseConfig) -> bridge_traits::Result<()> {
            Ok(())
        }

        async fn restore_from_cache(&self, _db: &DatabaseConfig) -> bridge_traits::Result<()> {
            Ok(())
        }

        async fn refresh_database(&self, _db: &DatabaseConfig) -> bridge_traits::Result<()> {
            Ok(())
        }

        async fn refresh_path(&self, path: &str) -> bridge_traits::Result<()> {
            self.refreshed.lock().push(path.to_string());
            if path.ends_with(".broken") {
                return Err(BridgeError::OperationFailed("unreadable".to_string()));
            }
            Ok(())
        }

        async fn stop(&self, _db: &DatabaseConfig) -> bridge_traits::Result<()> {
            Ok(())
        }
    }

    fn debouncer(engine: Arc<PathRecorder>, events: EventBus) -> LazyRefreshDebouncer {
        LazyRefreshDebouncer::new(engine, Duration::from_millis(30), events)
    }

    #[core_async::test]
    async fn test_duplicate_requests_flush_once() {
        let engine = Arc::new(PathRecorder::default());
        let events = EventBus::new(16);
        let mut receiver = events.subscribe();
        let lazy = debouncer(Arc::clone(&engine), events);

        let first = lazy.request("a");
        let second = lazy.request("a");
        assert_eq!(lazy.pending_paths(), vec!["a"]);

        assert!(first.await);
        assert!(second.await);
        assert_eq!(*engine.refreshed.lock(), vec!["a"]);

        let event = receiver.recv().await.unwrap();
        assert_eq!(
            event,
            CoreEvent::AssetDb(AssetDbEvent::LazyRefreshFlushed {
                paths: vec!["a".to_string()]
            })
        );
    }

    #[core_async::test]
    async fn test_requests_within_delay_share_batch() {
        let engine = Arc::new(PathRecorder::default());
        let lazy = LazyRefreshDebouncer::new(
            Arc::clone(&engine) as Arc<dyn ImportEngine>,
            Duration::from_millis(60),
            EventBus::new(16),
        );

        let first = lazy.request("textures/a.png");
        sleep(Duration::from_millis(25)).await;
        let second = lazy.request("textures/b.png");
        sleep(Duration::from_millis(45)).await;
        // The first timer would have fired; the second request reset it.
        assert!(engine.refreshed.lock().is_empty());

        assert!(first.await);
        assert!(second.await);

        let mut refreshed = engine.refreshed.lock().clone();
        refreshed.sort();
        assert_eq!(refreshed, vec!["textures/a.png", "textures/b.png"]);
    }

    #[core_async::test]
    async fn test_failed_path_still_resolves_true() {
        let engine = Arc::new(PathRecorder::default());
        let lazy = debouncer(Arc::clone(&engine), EventBus::new(16));

        let broken = lazy.request("scene.broken");
        let fine = lazy.request("scene.json");

        assert!(broken.await);
        assert!(fine.await);
        assert_eq!(engine.refreshed.lock().len(), 2);
    }

    #[core_async::test]
    async fn test_cancel_resolves_false() {
        let engine = Arc::new(PathRecorder::default());
        let lazy = debouncer(Arc::clone(&engine), EventBus::new(16));

        let waiting = lazy.request("a");
        assert_eq!(lazy.cancel(), 1);
        assert!(!waiting.await);

        sleep(Duration::from_millis(50)).await;
        assert!(engine.refreshed.lock().is_empty());
        assert!(lazy.pending_paths().is_empty());
    }

    #[core_async::test]
    async fn test_burst_shares_one_timer() {
        let engine = Arc::new(PathRecorder::default());
        let events = EventBus::new(64);
        let mut receiver = events.subscribe();
        let lazy = LazyRefreshDebouncer::new(
            Arc::clone(&engine) as Arc<dyn ImportEngine>,
            Duration::from_millis(40),
            events,
        );

        let mut waiting = Vec::new();
        for index in 0..10 {
            waiting.push(lazy.request(format!("textures/{}.png", index)));
            assert!(lazy.is_scheduled());
            sleep(Duration::from_millis(5)).await;
        }
        assert!(engine.refreshed.lock().is_empty());

        for request in waiting {
            assert!(request.await);
        }
        assert!(!lazy.is_scheduled());
        assert_eq!(engine.refreshed.lock().len(), 10);

        let event = receiver.recv().await.unwrap();
        match event {
            CoreEvent::AssetDb(AssetDbEvent::LazyRefreshFlushed { paths }) => {
                assert_eq!(paths.len(), 10)
            }
            other => panic!("unexpected event {:?}", other),
        }
        assert!(receiver.try_recv().is_err());
    }
}
