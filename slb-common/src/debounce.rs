//! Per-tag delayed tasks
//!
//! Flag resets (presence after the dwell, the acknowledgment pulse) run after
//! a fixed delay. Scheduling a new task for a tag cancels the one still
//! waiting for that tag, so a newer event supersedes an older reset instead
//! of racing it.

use crate::tag::TagId;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::trace;

struct Scheduled {
    token: CancellationToken,
    generation: u64,
}

/// Cancellable delayed tasks keyed by tag
#[derive(Clone, Default)]
pub struct DebounceScheduler {
    tasks: Arc<Mutex<HashMap<TagId, Scheduled>>>,
    generation: Arc<AtomicU64>,
}

impl DebounceScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `task` after `delay`, replacing any task still waiting for `id`
    ///
    /// Must be called from within a tokio runtime.
    pub fn schedule<F, Fut>(&self, id: TagId, delay: Duration, task: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let token = CancellationToken::new();
        let generation = self.generation.fetch_add(1, Ordering::Relaxed);

        if let Some(previous) = self.lock().insert(
            id.clone(),
            Scheduled {
                token: token.clone(),
                generation,
            },
        ) {
            trace!("Superseding scheduled task for {}", id);
            previous.token.cancel();
        }

        let tasks = Arc::clone(&self.tasks);
        tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = token.cancelled() => return,
                _ = tokio::time::sleep(delay) => {}
            }

            // A newer schedule or a cancel may land after the delay ran out but
            // before this task got polled. Both swap the map entry under the lock.
            {
                let mut tasks = tasks.lock().unwrap_or_else(|e| e.into_inner());
                let current = tasks.get(&id).map(|s| s.generation) == Some(generation);
                if token.is_cancelled() || !current {
                    trace!("Dropping superseded task for {}", id);
                    return;
                }
                tasks.remove(&id);
            }

            task().await;
        });
    }

    /// Cancel the waiting task for `id`. Returns true if one was pending.
    pub fn cancel(&self, id: &TagId) -> bool {
        match self.lock().remove(id) {
            Some(scheduled) => {
                scheduled.token.cancel();
                true
            }
            None => false,
        }
    }

    /// True while a task for `id` is waiting for its delay
    pub fn is_pending(&self, id: &TagId) -> bool {
        self.lock().contains_key(id)
    }

    pub fn cancel_all(&self) {
        for (_, scheduled) in self.lock().drain() {
            scheduled.token.cancel();
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<TagId, Scheduled>> {
        self.tasks.lock().unwrap_or_else(|e| e.into_inner())
    }
}
