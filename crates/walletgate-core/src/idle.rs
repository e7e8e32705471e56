//! Inactivity watchdog.
//!
//! `IdleTimer` runs a callback once the host has been silent for the
//! configured timeout. At most one deadline is pending at a time: every
//! reset cancels the previous deadline before scheduling a new one, and a
//! generation counter stops a cancelled deadline that already woke up from
//! firing. Nothing here returns an error or panics.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use futures::future::BoxFuture;
use futures::{FutureExt, Stream, StreamExt};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Callback run when the timer expires.
pub type IdleCallback = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

/// Wrap an async closure as an `IdleCallback`.
pub fn idle_callback<F, Fut>(f: F) -> IdleCallback
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Arc::new(move || f().boxed())
}

/// User interaction reported by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityKind {
    Pointer,
    Key,
    Scroll,
    Touch,
}

/// Host application visibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppLifecycle {
    Foreground,
    Background,
}

/// Events a host feeds into the timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostEvent {
    Activity(ActivityKind),
    Lifecycle(AppLifecycle),
}

struct TimerState {
    timeout: Duration,
    on_idle: IdleCallback,
    enabled: bool,
    lifecycle: AppLifecycle,
    pending: Option<JoinHandle<()>>,
    generation: u64,
}

impl TimerState {
    fn cancel(&mut self) {
        // Invalidate a deadline that already woke but has not taken the lock yet
        self.generation = self.generation.wrapping_add(1);
        if let Some(handle) = self.pending.take() {
            handle.abort();
        }
    }
}

#[derive(Clone)]
pub struct IdleTimer {
    state: Arc<Mutex<TimerState>>,
}

impl std::fmt::Debug for IdleTimer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("IdleTimer")
            .field("timeout", &state.timeout)
            .field("enabled", &state.enabled)
            .field("lifecycle", &state.lifecycle)
            .field("armed", &state.pending.is_some())
            .finish()
    }
}

impl IdleTimer {
    /// Create a disabled, unarmed timer.
    pub fn new(timeout: Duration, on_idle: IdleCallback) -> Self {
        Self {
            state: Arc::new(Mutex::new(TimerState {
                timeout,
                on_idle,
                enabled: false,
                lifecycle: AppLifecycle::Foreground,
                pending: None,
                generation: 0,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, TimerState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn timeout(&self) -> Duration {
        self.lock().timeout
    }

    pub fn is_enabled(&self) -> bool {
        self.lock().enabled
    }

    /// True while a deadline is pending.
    pub fn is_armed(&self) -> bool {
        self.lock().pending.is_some()
    }

    /// Enable or disable the timer. Disabling cancels any pending deadline;
    /// enabling does not arm by itself.
    pub fn set_enabled(&self, enabled: bool) {
        let mut state = self.lock();
        state.enabled = enabled;
        if !enabled {
            state.cancel();
        }
    }

    /// Change the timeout used by subsequent resets.
    pub fn set_timeout(&self, timeout: Duration) {
        if timeout.is_zero() {
            warn!("Ignoring zero idle timeout");
            return;
        }
        self.lock().timeout = timeout;
    }

    /// Replace timeout and callback, then restart the countdown.
    pub fn reset_with(&self, timeout: Duration, on_idle: IdleCallback) {
        if timeout.is_zero() {
            warn!("Ignoring zero idle timeout");
            return;
        }
        {
            let mut state = self.lock();
            state.timeout = timeout;
            state.on_idle = on_idle;
        }
        self.reset();
    }

    /// Cancel the pending deadline and schedule a new one. No-op while
    /// disabled or backgrounded.
    pub fn reset(&self) {
        let mut state = self.lock();
        state.cancel();
        if !state.enabled || state.lifecycle == AppLifecycle::Background {
            return;
        }

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("Idle timer reset outside a tokio runtime; not armed");
            return;
        };

        let generation = state.generation;
        let timeout = state.timeout;
        let shared = Arc::downgrade(&self.state);
        state.pending = Some(runtime.spawn(Self::countdown(shared, generation, timeout)));
    }

    /// Cancel the pending deadline, if any.
    pub fn clear(&self) {
        self.lock().cancel();
    }

    pub fn on_activity(&self, kind: ActivityKind) {
        debug!(?kind, "Activity");
        self.reset();
    }

    /// Backgrounding cancels the deadline; foregrounding starts a fresh one.
    pub fn on_lifecycle(&self, lifecycle: AppLifecycle) {
        debug!(?lifecycle, "Lifecycle transition");
        match lifecycle {
            AppLifecycle::Background => {
                let mut state = self.lock();
                state.lifecycle = AppLifecycle::Background;
                state.cancel();
            }
            AppLifecycle::Foreground => {
                self.lock().lifecycle = AppLifecycle::Foreground;
                self.reset();
            }
        }
    }

    pub fn handle(&self, event: HostEvent) {
        match event {
            HostEvent::Activity(kind) => self.on_activity(kind),
            HostEvent::Lifecycle(lifecycle) => self.on_lifecycle(lifecycle),
        }
    }

    /// Feed host events from a stream until it ends or the timer is dropped.
    pub fn attach<S>(&self, events: S) -> JoinHandle<()>
    where
        S: Stream<Item = HostEvent> + Send + 'static,
    {
        let shared = Arc::downgrade(&self.state);
        tokio::spawn(async move {
            let mut events = Box::pin(events);
            while let Some(event) = events.next().await {
                let Some(state) = shared.upgrade() else {
                    break;
                };
                IdleTimer { state }.handle(event);
            }
        })
    }

    async fn countdown(shared: Weak<Mutex<TimerState>>, generation: u64, timeout: Duration) {
        tokio::time::sleep(timeout).await;

        let callback = {
            let Some(state) = shared.upgrade() else {
                return;
            };
            let mut state = state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            if state.generation != generation {
                return;
            }
            // Detach our own handle; the deadline is spent
            state.pending = None;
            state.on_idle.clone()
        };

        debug!(timeout_ms = timeout.as_millis() as u64, "Idle timeout reached");
        callback().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const TIMEOUT: Duration = Duration::from_millis(100);

    fn counting_callback() -> (Arc<AtomicUsize>, IdleCallback) {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = count.clone();
        let callback = idle_callback(move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });
        (count, callback)
    }

    fn enabled_timer() -> (Arc<AtomicUsize>, IdleTimer) {
        let (count, callback) = counting_callback();
        let timer = IdleTimer::new(TIMEOUT, callback);
        timer.set_enabled(true);
        (count, timer)
    }

    async fn wait(ms: u64) {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_fires_once_after_last_reset() {
        let (count, timer) = enabled_timer();

        timer.reset();
        wait(60).await;
        timer.reset();
        wait(60).await;
        timer.reset();
        timer.reset();
        wait(99).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);

        wait(2).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(!timer.is_armed());

        wait(1000).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_cancels_and_is_idempotent() {
        let (count, timer) = enabled_timer();
        timer.clear();
        timer.reset();
        assert!(timer.is_armed());
        timer.clear();
        timer.clear();
        assert!(!timer.is_armed());

        wait(500).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_never_fires() {
        let (count, timer) = enabled_timer();
        timer.reset();
        wait(50).await;
        timer.on_lifecycle(AppLifecycle::Background);
        wait(1000).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert!(!timer.is_armed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_foreground_starts_fresh_grace_period() {
        let (count, timer) = enabled_timer();
        timer.reset();
        wait(90).await;
        timer.on_lifecycle(AppLifecycle::Background);
        wait(500).await;
        timer.on_lifecycle(AppLifecycle::Foreground);
        wait(99).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);

        wait(2).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_activity_while_backgrounded_does_not_arm() {
        let (count, timer) = enabled_timer();
        timer.on_lifecycle(AppLifecycle::Background);
        timer.on_activity(ActivityKind::Touch);
        assert!(!timer.is_armed());
        wait(500).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disabled_timer_ignores_activity() {
        let (count, timer) = enabled_timer();
        timer.reset();
        timer.set_enabled(false);
        assert!(!timer.is_armed());

        timer.on_activity(ActivityKind::Key);
        timer.on_lifecycle(AppLifecycle::Foreground);
        assert!(!timer.is_armed());

        wait(500).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_with_replaces_timeout_and_callback() {
        let (old_count, timer) = enabled_timer();
        let (new_count, new_callback) = counting_callback();

        timer.reset();
        timer.reset_with(Duration::from_millis(300), new_callback);
        assert_eq!(timer.timeout(), Duration::from_millis(300));

        wait(299).await;
        assert_eq!(new_count.load(Ordering::SeqCst), 0);
        wait(2).await;
        assert_eq!(new_count.load(Ordering::SeqCst), 1);
        assert_eq!(old_count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_timeout_is_ignored() {
        let (count, timer) = enabled_timer();
        let (_, other) = counting_callback();
        timer.reset_with(Duration::ZERO, other);
        timer.set_timeout(Duration::ZERO);
        assert_eq!(timer.timeout(), TIMEOUT);

        timer.reset();
        wait(101).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_attach_feeds_events() {
        let (count, timer) = enabled_timer();
        let (tx, rx) = futures::channel::mpsc::unbounded();
        let listener = timer.attach(rx);

        tx.unbounded_send(HostEvent::Activity(ActivityKind::Pointer)).unwrap();
        wait(60).await;
        assert!(timer.is_armed());

        tx.unbounded_send(HostEvent::Activity(ActivityKind::Scroll)).unwrap();
        wait(60).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);

        tx.unbounded_send(HostEvent::Lifecycle(AppLifecycle::Background)).unwrap();
        wait(500).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);

        drop(tx);
        listener.await.unwrap();
    }

    #[test]
    fn test_reset_outside_runtime_does_not_panic() {
        let (_, timer) = enabled_timer();
        timer.reset();
        assert!(!timer.is_armed());
        timer.clear();
    }
}
