use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

/// How often a front end should recompute `progress`.
pub const PROGRESS_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Buffer size for the notifier event channel.
const EVENT_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    Success,
    Error,
    Warning,
    Info,
}

impl NotificationKind {
    pub fn default_duration(&self) -> Duration {
        match self {
            NotificationKind::Error => Duration::from_millis(8000),
            NotificationKind::Warning => Duration::from_millis(6000),
            NotificationKind::Success | NotificationKind::Info => Duration::from_millis(5000),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            NotificationKind::Success => "success",
            NotificationKind::Error => "error",
            NotificationKind::Warning => "warning",
            NotificationKind::Info => "info",
        }
    }
}

/// Affordance rendered alongside the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationAction {
    Retry,
    Login,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub id: u64,
    pub key: String,
    pub kind: NotificationKind,
    pub message: String,
    pub duration: Duration,
    pub persistent: bool,
    pub action: Option<NotificationAction>,
}

#[derive(Debug, Clone, Default)]
pub struct NotifyOptions {
    /// Overrides the kind's default duration.
    pub duration: Option<Duration>,
    /// No auto-dismiss; only `dismiss` or a later notify with the same key removes it.
    pub persistent: bool,
    pub action: Option<NotificationAction>,
}

impl NotifyOptions {
    pub fn persistent() -> Self {
        Self {
            persistent: true,
            ..Self::default()
        }
    }

    pub fn with_action(mut self, action: NotificationAction) -> Self {
        self.action = Some(action);
        self
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DismissReason {
    Expired,
    Replaced,
    Dismissed,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NotifierEvent {
    Shown(Notification),
    Dismissed { key: String, id: u64, reason: DismissReason },
}

struct LiveEntry {
    notification: Notification,
    shown_at: Instant,
    timer: Option<JoinHandle<()>>,
}

impl LiveEntry {
    fn cancel_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

struct Inner {
    live: Mutex<HashMap<String, LiveEntry>>,
    next_id: AtomicU64,
    events: broadcast::Sender<NotifierEvent>,
}

impl Inner {
    fn live(&self) -> MutexGuard<'_, HashMap<String, LiveEntry>> {
        self.live.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: NotifierEvent) {
        // No subscribers is the normal case when nothing renders toasts.
        let _ = self.events.send(event);
    }

    /// Timer callback: remove `key` only if it still holds notification `id`.
    fn expire(&self, key: &str, id: u64) {
        let removed = {
            let mut live = self.live();
            match live.get(key) {
                Some(entry) if entry.notification.id == id => live.remove(key),
                _ => None,
            }
        };
        if removed.is_some() {
            debug!(key = key, id = id, "Notification expired");
            self.emit(NotifierEvent::Dismissed {
                key: key.to_string(),
                id,
                reason: DismissReason::Expired,
            });
        }
    }
}

/// Deduplicating notifier. Clone is cheap and clones share state.
///
/// Must be used from within a Tokio runtime: auto-dismiss timers are
/// spawned tasks.
#[derive(Clone)]
pub struct UniqueNotifier {
    inner: Arc<Inner>,
}

impl Default for UniqueNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl UniqueNotifier {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                live: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
                events,
            }),
        }
    }

    /// Show `message` under `key` with the kind's default duration.
    pub fn notify(&self, key: &str, kind: NotificationKind, message: impl Into<String>) -> u64 {
        self.notify_with(key, kind, message, NotifyOptions::default())
    }

    /// Show `message` under `key`, replacing any live notification with the
    /// same key. Returns the new notification's id.
    pub fn notify_with(
        &self,
        key: &str,
        kind: NotificationKind,
        message: impl Into<String>,
        options: NotifyOptions,
    ) -> u64 {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let notification = Notification {
            id,
            key: key.to_string(),
            kind,
            message: message.into(),
            duration: options.duration.unwrap_or_else(|| kind.default_duration()),
            persistent: options.persistent,
            action: options.action,
        };

        let timer = (!notification.persistent).then(|| {
            let inner = Arc::downgrade(&self.inner);
            let key = key.to_string();
            let duration = notification.duration;
            tokio::spawn(async move {
                tokio::time::sleep(duration).await;
                if let Some(inner) = inner.upgrade() {
                    inner.expire(&key, id);
                }
            })
        });

        let previous = {
            let mut live = self.inner.live();
            live.insert(
                key.to_string(),
                LiveEntry {
                    notification: notification.clone(),
                    shown_at: Instant::now(),
                    timer,
                },
            )
        };

        if let Some(mut previous) = previous {
            previous.cancel_timer();
            debug!(key = key, replaced = previous.notification.id, id = id, "Notification replaced");
            self.inner.emit(NotifierEvent::Dismissed {
                key: key.to_string(),
                id: previous.notification.id,
                reason: DismissReason::Replaced,
            });
        }

        debug!(key = key, kind = kind.label(), id = id, "Notification shown");
        self.inner.emit(NotifierEvent::Shown(notification));
        id
    }

    /// Remove the live notification under `key`, if any.
    pub fn dismiss(&self, key: &str) -> bool {
        let removed = self.inner.live().remove(key);
        match removed {
            Some(mut entry) => {
                entry.cancel_timer();
                self.inner.emit(NotifierEvent::Dismissed {
                    key: key.to_string(),
                    id: entry.notification.id,
                    reason: DismissReason::Dismissed,
                });
                true
            }
            None => false,
        }
    }

    pub fn dismiss_all(&self) {
        let drained: Vec<LiveEntry> = self.inner.live().drain().map(|(_, entry)| entry).collect();
        for mut entry in drained {
            entry.cancel_timer();
            self.inner.emit(NotifierEvent::Dismissed {
                key: entry.notification.key.clone(),
                id: entry.notification.id,
                reason: DismissReason::Dismissed,
            });
        }
    }

    pub fn get(&self, key: &str) -> Option<Notification> {
        self.inner.live().get(key).map(|e| e.notification.clone())
    }

    pub fn is_live(&self, key: &str) -> bool {
        self.inner.live().contains_key(key)
    }

    /// Live notifications, oldest first.
    pub fn live(&self) -> Vec<Notification> {
        let mut live: Vec<Notification> =
            self.inner.live().values().map(|e| e.notification.clone()).collect();
        live.sort_by_key(|n| n.id);
        live
    }

    /// Elapsed fraction of the dismiss timer for `key`, in `0.0..=1.0`.
    /// `None` for absent or persistent notifications.
    pub fn progress(&self, key: &str) -> Option<f32> {
        let live = self.inner.live();
        let entry = live.get(key)?;
        if entry.notification.persistent {
            return None;
        }
        Some(progress_at(entry.shown_at.elapsed(), entry.notification.duration))
    }

    pub fn subscribe(&self) -> broadcast::Receiver<NotifierEvent> {
        self.inner.events.subscribe()
    }
}

/// Progress bar position: elapsed time over total duration, clamped.
pub fn progress_at(elapsed: Duration, duration: Duration) -> f32 {
    if duration.is_zero() {
        return 1.0;
    }
    (elapsed.as_secs_f32() / duration.as_secs_f32()).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Let spawned timer tasks observe the advanced clock.
    async fn advance(ms: u64) {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_same_key_replaces_instead_of_stacking() {
        let notifier = UniqueNotifier::new();
        notifier.notify("x", NotificationKind::Info, "first");
        advance(3000).await;
        let second = notifier.notify("x", NotificationKind::Info, "second");

        assert_eq!(notifier.live().len(), 1);
        assert_eq!(notifier.get("x").unwrap().message, "second");

        // The first timer would have fired at 5000ms; the second governs.
        advance(2500).await;
        assert_eq!(notifier.get("x").map(|n| n.id), Some(second));
        advance(3000).await;
        assert!(!notifier.is_live("x"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_default_durations_by_kind() {
        let notifier = UniqueNotifier::new();
        notifier.notify("err", NotificationKind::Error, "boom");
        notifier.notify("warn", NotificationKind::Warning, "hmm");
        notifier.notify("ok", NotificationKind::Success, "yay");

        advance(5001).await;
        assert!(!notifier.is_live("ok"));
        assert!(notifier.is_live("warn"));
        advance(1000).await;
        assert!(!notifier.is_live("warn"));
        assert!(notifier.is_live("err"));
        advance(2000).await;
        assert!(notifier.live().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_persistent_needs_explicit_dismiss() {
        let notifier = UniqueNotifier::new();
        notifier.notify_with("auth-required", NotificationKind::Error, "log in", NotifyOptions::persistent());
        advance(60_000).await;
        assert!(notifier.is_live("auth-required"));
        assert_eq!(notifier.progress("auth-required"), None);

        assert!(notifier.dismiss("auth-required"));
        assert!(!notifier.dismiss("auth-required"));
        assert!(notifier.live().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dismiss_all_cancels_timers() {
        let notifier = UniqueNotifier::new();
        let mut events = notifier.subscribe();
        notifier.notify("a", NotificationKind::Info, "a");
        notifier.notify("b", NotificationKind::Info, "b");
        notifier.dismiss_all();
        advance(10_000).await;

        let mut dismissed = Vec::new();
        while let Ok(event) = events.try_recv() {
            if let NotifierEvent::Dismissed { key, reason, .. } = event {
                dismissed.push((key, reason));
            }
        }
        dismissed.sort_by(|a, b| a.0.cmp(&b.0));
        assert_eq!(
            dismissed,
            vec![
                ("a".to_string(), DismissReason::Dismissed),
                ("b".to_string(), DismissReason::Dismissed),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_events_report_replacement() {
        let notifier = UniqueNotifier::new();
        let mut events = notifier.subscribe();
        let first = notifier.notify("x", NotificationKind::Info, "first");
        notifier.notify("x", NotificationKind::Info, "second");

        assert!(matches!(events.try_recv().unwrap(), NotifierEvent::Shown(n) if n.id == first));
        assert_eq!(
            events.try_recv().unwrap(),
            NotifierEvent::Dismissed { key: "x".to_string(), id: first, reason: DismissReason::Replaced }
        );
        assert!(matches!(events.try_recv().unwrap(), NotifierEvent::Shown(n) if n.message == "second"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_progress_tracks_elapsed_time() {
        let notifier = UniqueNotifier::new();
        notifier.notify_with(
            "upload",
            NotificationKind::Info,
            "uploading",
            NotifyOptions::default().with_duration(Duration::from_millis(1000)),
        );
        assert_eq!(notifier.progress("upload"), Some(0.0));
        advance(250).await;
        assert_eq!(notifier.progress("upload"), Some(0.25));
        assert_eq!(notifier.progress("missing"), None);
    }

    #[test]
    fn test_progress_at_clamps() {
        assert_eq!(progress_at(Duration::from_secs(10), Duration::from_secs(5)), 1.0);
        assert_eq!(progress_at(Duration::from_secs(1), Duration::ZERO), 1.0);
        assert_eq!(progress_at(Duration::ZERO, Duration::from_secs(5)), 0.0);
    }
}
