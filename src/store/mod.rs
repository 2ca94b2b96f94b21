//! The transactional key→bytes store (component B) underneath the store-backed filesystem
//! engine (component C).
//!
//! A [`Store`] is a flat `ino -> bytes` map with transaction semantics: `begin` starts
//! recording, `commit` discards the recording, `abort` restores every touched key to its
//! pre-transaction value. This is deliberately a much smaller surface than a general KV
//! store — the engine is the only caller, and it always wraps a sequence of `get`/`put`/
//! `remove` calls in exactly one `begin`/`commit`-or-`abort` pair.

mod memory;

pub use memory::MemoryStore;

/// The synchronous store capability set.
pub trait Store: std::fmt::Debug + Send + Sync {
    /// Fetch the bytes stored under `ino`, or `None` if absent.
    fn get(&self, ino: u64) -> Option<Vec<u8>>;

    /// Store `bytes` under `ino`. If `overwrite` is `false` and `ino` already has a value,
    /// this is a no-op that returns `false`; otherwise it writes and returns `true`.
    fn put(&mut self, ino: u64, bytes: Vec<u8>, overwrite: bool) -> bool;

    /// Remove any value stored under `ino`. A no-op if absent.
    fn remove(&mut self, ino: u64);

    /// Begin recording pre-mutation values so a later `abort` can undo everything written
    /// since this call. Transactions do not nest; a second `begin` before `commit`/`abort`
    /// resets the recording.
    fn begin(&mut self);

    /// Stop recording and discard the pre-mutation log. The mutations made since `begin`
    /// are now permanent.
    fn commit(&mut self);

    /// Restore every key touched since `begin` to its value (or absence) at that point.
    fn abort(&mut self);

    /// Drop every key in the store. Used by `empty`/test teardown, not by normal operation.
    fn clear(&mut self);
}

/// The asynchronous store capability set, for backends where storage I/O genuinely
/// suspends (e.g. the remote-port backend, §4.K). Mirrors [`Store`] one-for-one.
#[cfg(feature = "async")]
#[async_trait::async_trait]
pub trait AsyncStore: std::fmt::Debug + Send + Sync {
    /// See [`Store::get`].
    async fn get(&self, ino: u64) -> Option<Vec<u8>>;
    /// See [`Store::put`].
    async fn put(&mut self, ino: u64, bytes: Vec<u8>, overwrite: bool) -> bool;
    /// See [`Store::remove`].
    async fn remove(&mut self, ino: u64);
    /// See [`Store::begin`].
    async fn begin(&mut self);
    /// See [`Store::commit`].
    async fn commit(&mut self);
    /// See [`Store::abort`].
    async fn abort(&mut self);
    /// See [`Store::clear`].
    async fn clear(&mut self);
}

/// Adapts any synchronous [`Store`] to [`AsyncStore`] by resolving immediately. Used to run
/// the reference in-memory store underneath an async-facing engine without a second
/// implementation of the same bookkeeping.
#[cfg(feature = "async")]
#[derive(Debug)]
pub struct SyncStoreAsAsync<S>(pub S);

#[cfg(feature = "async")]
#[async_trait::async_trait]
impl<S: Store> AsyncStore for SyncStoreAsAsync<S> {
    async fn get(&self, ino: u64) -> Option<Vec<u8>> {
        Store::get(&self.0, ino)
    }

    async fn put(&mut self, ino: u64, bytes: Vec<u8>, overwrite: bool) -> bool {
        Store::put(&mut self.0, ino, bytes, overwrite)
    }

    async fn remove(&mut self, ino: u64) {
        Store::remove(&mut self.0, ino)
    }

    async fn begin(&mut self) {
        Store::begin(&mut self.0)
    }

    async fn commit(&mut self) {
        Store::commit(&mut self.0)
    }

    async fn abort(&mut self) {
        Store::abort(&mut self.0)
    }

    async fn clear(&mut self) {
        Store::clear(&mut self.0)
    }
}
