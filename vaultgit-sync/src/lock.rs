//! Single-holder async lock over one working tree.
//!
//! Every write path (auto-commit, network queue, merge resolver, shallow
//! resync) serializes its git invocations through one shared `RepoLock`
//! instance per working tree. Waiters are granted strictly FIFO; there is
//! no priority.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::oneshot;

struct LockState {
    locked: bool,
    waiters: VecDeque<oneshot::Sender<()>>,
}

/// FIFO async mutual exclusion for one working tree.
///
/// `acquire` returns a guard; dropping the guard hands the lock to the
/// oldest waiter, or unlocks when none are waiting. One `Arc<RepoLock>`
/// must be shared by every writer that can touch the same repository.
pub struct RepoLock {
    state: StdMutex<LockState>,
}

impl RepoLock {
    /// Creates an unlocked lock.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: StdMutex::new(LockState {
                locked: false,
                waiters: VecDeque::new(),
            }),
        })
    }

    /// Acquires the lock, waiting FIFO behind earlier callers.
    pub async fn acquire(self: &Arc<Self>) -> RepoLockGuard {
        let rx = {
            let mut state = self.lock_state();
            if !state.locked {
                state.locked = true;
                None
            } else {
                let (tx, rx) = oneshot::channel();
                state.waiters.push_back(tx);
                Some(rx)
            }
        };

        if let Some(rx) = rx {
            // The grantor keeps `locked` set; a closed channel means the
            // lock was torn down, in which case we hold it vacuously.
            let _ = rx.await;
        }

        RepoLockGuard {
            lock: Arc::clone(self),
        }
    }

    /// Whether a holder currently exists. Diagnostics only.
    pub fn is_locked(&self) -> bool {
        self.lock_state().locked
    }

    /// Number of queued waiters. Diagnostics only.
    pub fn pending_count(&self) -> usize {
        self.lock_state().waiters.len()
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, LockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Release capability for [`RepoLock`]; releases on drop.
pub struct RepoLockGuard {
    lock: Arc<RepoLock>,
}

impl Drop for RepoLockGuard {
    fn drop(&mut self) {
        let mut state = self.lock.lock_state();
        loop {
            match state.waiters.pop_front() {
                // Skip waiters whose acquire future was dropped.
                Some(tx) => {
                    if tx.send(()).is_ok() {
                        return;
                    }
                }
                None => {
                    state.locked = false;
                    return;
                }
            }
        }
    }
}
