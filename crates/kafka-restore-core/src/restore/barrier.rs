use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Notify;
use tracing::warn;

/// Counts down once per finished task and wakes waiters at zero.
///
/// Extra `done` calls after the count reached zero are ignored, so the
/// barrier releases at most once.
#[derive(Debug)]
pub struct CompletionBarrier {
    remaining: AtomicUsize,
    notify: Notify,
}

impl CompletionBarrier {
    pub fn new(count: usize) -> Self {
        Self {
            remaining: AtomicUsize::new(count),
            notify: Notify::new(),
        }
    }

    /// Mark one task finished. Returns true if this call released the barrier.
    pub fn done(&self) -> bool {
        let previous = self
            .remaining
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));

        match previous {
            Ok(1) => {
                self.notify.notify_waiters();
                true
            }
            Ok(_) => false,
            Err(_) => {
                warn!("Completion barrier signalled after it was released");
                false
            }
        }
    }

    pub fn is_released(&self) -> bool {
        self.remaining.load(Ordering::Acquire) == 0
    }

    /// Wait until the count reaches zero.
    pub async fn wait(&self) {
        loop {
            // Register before checking so a release in between is not missed
            let notified = self.notify.notified();
            if self.is_released() {
                return;
            }
            notified.await;
        }
    }
}
