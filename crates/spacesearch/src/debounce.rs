//! Per-space debouncing of reindex requests
//!
//! Every change inside a space asks for that space to be reindexed. A burst
//! of requests collapses into one reindex that fires once the space has been
//! quiet for the debounce window, or when the burst reaches its maximum wait.
//! The acknowledgement of every request in the burst runs after the reindex.
//! Bursts still waiting when the debouncer is cancelled are dropped without
//! acknowledgement, leaving their events to be redelivered.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use parking_lot::Mutex;
use spacesearch_core::SpaceId;
use tokio::task::JoinSet;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace, warn};

/// The reindex run for a space once its burst settles
pub type ReindexAction = Arc<dyn Fn(SpaceId) -> BoxFuture<'static, ()> + Send + Sync>;

/// Completion callback of one debounced request
pub type Acknowledgement = Box<dyn FnOnce() + Send>;

struct PendingWork {
    deadline: Instant,
    ceiling: Instant,
    acks: Vec<Acknowledgement>,
}

#[derive(Default)]
struct DebounceState {
    pending: HashMap<SpaceId, PendingWork>,
    in_progress: HashSet<SpaceId>,
}

struct Inner {
    after: Duration,
    max_wait: Duration,
    action: ReindexAction,
    state: Mutex<DebounceState>,
    cancel: CancellationToken,
    tasks: Mutex<JoinSet<()>>,
}

/// Collapses reindex requests per space
#[derive(Clone)]
pub struct SpaceDebouncer {
    inner: Arc<Inner>,
}

impl SpaceDebouncer {
    pub fn new(after: Duration, max_wait: Duration, action: ReindexAction) -> Self {
        Self::with_cancellation(after, max_wait, action, CancellationToken::new())
    }

    /// Like [`new`](Self::new), stopping pending bursts once `cancel` fires
    pub fn with_cancellation(
        after: Duration,
        max_wait: Duration,
        action: ReindexAction,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                after,
                max_wait: max_wait.max(after),
                action,
                state: Mutex::new(DebounceState::default()),
                cancel,
                tasks: Mutex::new(JoinSet::new()),
            }),
        }
    }

    /// Request a reindex of `space`; `ack` runs once that reindex has finished.
    ///
    /// Must be called from within a tokio runtime.
    pub fn debounce(&self, space: SpaceId, ack: Acknowledgement) {
        if self.inner.cancel.is_cancelled() {
            warn!(space_id = %space, "debouncer stopped, request left unacknowledged");
            return;
        }
        let now = Instant::now();
        let mut state = self.inner.state.lock();

        if let Some(pending) = state.pending.get_mut(&space) {
            pending.deadline = (now + self.inner.after).min(pending.ceiling);
            pending.acks.push(ack);
            trace!(space_id = %space, waiting = pending.acks.len(), "extended debounce window");
            return;
        }

        state.pending.insert(
            space.clone(),
            PendingWork {
                deadline: now + self.inner.after,
                ceiling: now + self.inner.max_wait,
                acks: vec![ack],
            },
        );
        drop(state);

        trace!(space_id = %space, "armed debounce timer");
        let mut tasks = self.inner.tasks.lock();
        while tasks.try_join_next().is_some() {}
        tasks.spawn(Arc::clone(&self.inner).fire_when_due(space));
    }

    /// Wait for every armed burst to either fire or be cancelled
    pub async fn wait(&self) {
        let mut tasks = std::mem::take(&mut *self.inner.tasks.lock());
        while let Some(joined) = tasks.join_next().await {
            if let Err(err) = joined {
                error!(error = %err, "debounce task failed");
            }
        }
    }

    /// Drop every pending burst and wait for running reindexes to finish
    pub async fn shutdown(&self) {
        self.inner.cancel.cancel();
        self.wait().await;
    }

    /// Spaces with a burst waiting to fire
    pub fn pending(&self) -> usize {
        self.inner.state.lock().pending.len()
    }
}

impl Inner {
    async fn fire_when_due(self: Arc<Self>, space: SpaceId) {
        let acks = loop {
            let deadline = {
                let state = self.state.lock();
                match state.pending.get(&space) {
                    Some(pending) => pending.deadline,
                    None => return,
                }
            };
            tokio::select! {
                _ = sleep_until(deadline) => {}
                _ = self.cancel.cancelled() => {
                    let dropped = self
                        .state
                        .lock()
                        .pending
                        .remove(&space)
                        .map_or(0, |pending| pending.acks.len());
                    warn!(
                        space_id = %space,
                        unacknowledged = dropped,
                        "dropped pending reindex on shutdown"
                    );
                    return;
                }
            }

            let mut state = self.state.lock();
            let now = Instant::now();
            let busy = state.in_progress.contains(&space);
            let pending = match state.pending.get_mut(&space) {
                Some(pending) => pending,
                None => return,
            };
            if now < pending.deadline {
                continue;
            }
            if busy {
                pending.deadline = now + self.after;
                continue;
            }

            let acks = state
                .pending
                .remove(&space)
                .map(|pending| pending.acks)
                .unwrap_or_default();
            state.in_progress.insert(space.clone());
            break acks;
        };

        debug!(space_id = %space, requests = acks.len(), "reindexing space");
        (self.action)(space.clone()).await;
        for ack in acks {
            ack();
        }
        self.state.lock().in_progress.remove(&space);
    }
}
