//! The FIFO-fair serialization primitive (component E) that turns a sequence of engine calls
//! into one atomic-looking composite operation from the caller's point of view.
//!
//! Stock async mutexes (including `tokio::sync::Mutex`, which the teacher crate already
//! depends on and uses for its session guards in `session.rs`) do not guarantee FIFO wakeup
//! order under contention. This is a hand-rolled ticket lock so "the caller that asked first
//! runs first" actually holds, per §5's single-threaded-per-filesystem scheduling model.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex as SyncMutex;

use crate::error::{raise, Result};

/// Default time a ticket may hold the lock before a waiter's `lock()` gives up with
/// `EDEADLK`, per §5.
pub const DEFAULT_DEADLOCK_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Default)]
struct State {
    /// `true` while some ticket holds the lock.
    held: bool,
    /// FIFO queue of waiters, oldest first.
    queue: VecDeque<u64>,
}

/// A FIFO ticket lock guarding one filesystem instance's composite operations.
pub struct FairMutex {
    state: SyncMutex<State>,
    next_ticket: AtomicU64,
    deadlock_timeout: Duration,
}

impl std::fmt::Debug for FairMutex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("FairMutex")
            .field("held", &state.held)
            .field("waiters", &state.queue.len())
            .finish()
    }
}

impl Default for FairMutex {
    fn default() -> Self {
        Self::new(DEFAULT_DEADLOCK_TIMEOUT)
    }
}

impl FairMutex {
    /// Build a mutex with a custom deadlock timeout (tests use a short one to avoid
    /// slow-running suites).
    pub fn new(deadlock_timeout: Duration) -> Self {
        FairMutex {
            state: SyncMutex::new(State::default()),
            next_ticket: AtomicU64::new(0),
            deadlock_timeout,
        }
    }

    /// Take a ticket and block (asynchronously) until every earlier ticket has released the
    /// lock. Raises `EDEADLK` if the wait exceeds the configured deadlock timeout.
    #[cfg(feature = "async")]
    pub async fn lock(&self) -> Result<FairMutexGuard<'_>> {
        let ticket = self.enqueue();
        let deadline = tokio::time::Instant::now() + self.deadlock_timeout;
        loop {
            if self.try_advance_to(ticket) {
                return Ok(FairMutexGuard { owner: self });
            }
            if tokio::time::Instant::now() >= deadline {
                self.abandon(ticket);
                log::warn!("ticket {ticket} timed out waiting for the filesystem mutex");
                return Err(raise::edeadlk("lock", format!("ticket {ticket}")));
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    }

    /// Attempt to take the lock without queueing. Raises `EBUSY` if it is currently held by
    /// another ticket, matching the non-blocking contract `lock_sync` promises.
    pub fn lock_sync(&self) -> Result<FairMutexGuard<'_>> {
        let mut state = self.state.lock();
        if state.held || !state.queue.is_empty() {
            return Err(raise::ebusy("lock_sync"));
        }
        state.held = true;
        Ok(FairMutexGuard { owner: self })
    }

    fn enqueue(&self) -> u64 {
        let ticket = self.next_ticket.fetch_add(1, Ordering::SeqCst);
        self.state.lock().queue.push_back(ticket);
        ticket
    }

    fn abandon(&self, ticket: u64) {
        let mut state = self.state.lock();
        state.queue.retain(|&t| t != ticket);
    }

    /// `true` iff `ticket` is now at the front of the queue and the lock is free, in which
    /// case it is claimed atomically.
    fn try_advance_to(&self, ticket: u64) -> bool {
        let mut state = self.state.lock();
        if !state.held && state.queue.front() == Some(&ticket) {
            state.queue.pop_front();
            state.held = true;
            true
        } else {
            false
        }
    }

    fn release(&self) {
        let mut state = self.state.lock();
        state.held = false;
    }
}

/// RAII guard releasing the lock on every exit path, including panics.
pub struct FairMutexGuard<'a> {
    owner: &'a FairMutex,
}

impl Drop for FairMutexGuard<'_> {
    fn drop(&mut self) {
        self.owner.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_sync_rejects_when_already_held() {
        let mutex = FairMutex::default();
        let guard = mutex.lock_sync().unwrap();
        let err = mutex.lock_sync().unwrap_err();
        assert_eq!(err.code(), crate::error::ErrCode::Ebusy);
        drop(guard);
        assert!(mutex.lock_sync().is_ok());
    }

    #[cfg(feature = "async")]
    #[tokio::test]
    async fn lock_serializes_fifo() {
        use std::sync::Arc;
        let mutex = Arc::new(FairMutex::default());
        let order = Arc::new(SyncMutex::new(Vec::new()));

        let g0 = mutex.lock().await.unwrap();
        let mutex2 = mutex.clone();
        let order2 = order.clone();
        let waiter = tokio::spawn(async move {
            let _g = mutex2.lock().await.unwrap();
            order2.lock().push(1);
        });
        tokio::task::yield_now().await;
        order.lock().push(0);
        drop(g0);
        waiter.await.unwrap();
        assert_eq!(*order.lock(), vec![0, 1]);
    }

    #[cfg(feature = "async")]
    #[tokio::test]
    async fn lock_times_out_with_edeadlk() {
        let mutex = FairMutex::new(Duration::from_millis(20));
        let guard = mutex.lock().await.unwrap();
        let err = mutex.lock().await.unwrap_err();
        assert_eq!(err.code(), crate::error::ErrCode::Edeadlk);
        drop(guard);
    }
}
