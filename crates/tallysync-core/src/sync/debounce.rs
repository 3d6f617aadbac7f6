use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;

struct Scheduled {
    generation: u64,
    handle: JoinHandle<()>,
}

type Slot = Arc<Mutex<Option<Scheduled>>>;

fn lock(slot: &Mutex<Option<Scheduled>>) -> MutexGuard<'_, Option<Scheduled>> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Collapses bursts of calls into one action after a quiet period.
///
/// Each `call` cancels the pending action, if any, and schedules the new
/// one `delay` later. An action leaves the pending slot when its delay
/// elapses; from then on it runs to completion and later calls cannot
/// abort it. The action should read whatever state it needs when it runs,
/// not capture it at call time, so that it sees the final state of the
/// burst.
pub struct Debouncer {
    delay: Duration,
    generation: AtomicU64,
    pending: Slot,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            generation: AtomicU64::new(0),
            pending: Arc::new(Mutex::new(None)),
        }
    }

    fn pending(&self) -> MutexGuard<'_, Option<Scheduled>> {
        lock(&self.pending)
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Schedule `action`, superseding any action not yet started.
    pub fn call<F>(&self, action: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let delay = self.delay;
        let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
        let slot = Arc::clone(&self.pending);

        // Held until the new entry is in place, so the task cannot look
        // for itself before it is recorded.
        let mut pending = self.pending();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let current = {
                let mut pending = lock(&slot);
                match pending.as_ref() {
                    Some(scheduled) if scheduled.generation == generation => {
                        pending.take();
                        true
                    }
                    _ => false,
                }
            };
            if current {
                action.await;
            }
        });

        if let Some(previous) = pending.replace(Scheduled { generation, handle }) {
            previous.handle.abort();
        }
    }

    /// Drop the pending action, if any. An action already running is left
    /// to finish.
    pub fn cancel(&self) {
        if let Some(scheduled) = self.pending().take() {
            scheduled.handle.abort();
        }
    }

    /// Whether an action is scheduled and has not started.
    pub fn is_pending(&self) -> bool {
        self.pending()
            .as_ref()
            .map(|scheduled| !scheduled.handle.is_finished())
            .unwrap_or(false)
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_burst_collapses_into_one_call() {
        let debouncer = Debouncer::new(Duration::from_millis(1000));
        let fired = Arc::new(AtomicUsize::new(0));
        let latest = Arc::new(Mutex::new(0u32));
        let observed = Arc::new(Mutex::new(None::<u32>));

        for value in 1..=3 {
            *latest.lock().unwrap() = value;
            let fired = Arc::clone(&fired);
            let latest = Arc::clone(&latest);
            let observed = Arc::clone(&observed);
            debouncer.call(async move {
                *observed.lock().unwrap() = Some(*latest.lock().unwrap());
                fired.fetch_add(1, Ordering::SeqCst);
            });
            tokio::time::sleep(Duration::from_millis(300)).await;
        }

        // 700ms after the last call
        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert!(debouncer.is_pending());

        tokio::time::sleep(Duration::from_millis(301)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(*observed.lock().unwrap(), Some(3));
        assert!(!debouncer.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn test_started_action_is_not_superseded() {
        let debouncer = Debouncer::new(Duration::from_millis(100));
        let finished = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&finished);
        debouncer.call(async move {
            tokio::time::sleep(Duration::from_millis(500)).await;
            counter.fetch_add(1, Ordering::SeqCst);
        });
        // First action is now mid-flight.
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(!debouncer.is_pending());

        let counter = Arc::clone(&finished);
        debouncer.call(async move {
            counter.fetch_add(10, Ordering::SeqCst);
        });
        debouncer.cancel();
        let counter = Arc::clone(&finished);
        debouncer.call(async move {
            counter.fetch_add(100, Ordering::SeqCst);
        });

        tokio::time::sleep(Duration::from_millis(1000)).await;
        assert_eq!(finished.load(Ordering::SeqCst), 101);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_drops_pending_action() {
        let debouncer = Debouncer::new(Duration::from_millis(100));
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        debouncer.call(async move {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        debouncer.cancel();
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }
}
