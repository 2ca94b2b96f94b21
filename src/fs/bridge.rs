//! The async/sync bridge mixin (component G): presents a synchronous [`Filesystem`] surface
//! backed by an async source of truth, using an in-memory shadow engine as a write-through
//! cache so the synchronous side never actually blocks on network or disk I/O for a read
//! that has already been seen.
//!
//! Grounded in the teacher crate's own sync/async duality (`Session` drives the blocking
//! loop; `Session::new`/its async counterpart share the same request-dispatch core) — here
//! the duality is inverted: the source of truth is async, and the synchronous facade is the
//! bridge.

use std::sync::Arc;

use crate::error::{raise, Result};
use crate::fs::engine::StoreEngine;
use crate::fs::{CreateOpts, FsAttributes, Filesystem};
use crate::inode::StatsUpdate;
use crate::stats::Stats;
use crate::store::MemoryStore;

/// The capability contract for a backend whose operations may genuinely suspend — the
/// remote-port backend (§4.K) is the motivating implementer. Mirrors [`Filesystem`]
/// one-for-one, `async fn` for `fn`.
#[async_trait::async_trait]
pub trait AsyncFilesystem: std::fmt::Debug + Send + Sync {
    fn name(&self) -> &str;
    async fn stat(&self, path: &str) -> Result<Stats>;
    async fn touch(&self, path: &str, update: StatsUpdate) -> Result<()>;
    async fn create_file(&self, path: &str, opts: CreateOpts) -> Result<Stats>;
    async fn unlink(&self, path: &str) -> Result<()>;
    async fn rmdir(&self, path: &str) -> Result<()>;
    async fn mkdir(&self, path: &str, opts: CreateOpts) -> Result<Stats>;
    async fn readdir(&self, path: &str) -> Result<Vec<String>>;
    async fn exists(&self, path: &str) -> bool;
    async fn link(&self, existing: &str, new: &str) -> Result<()>;
    async fn symlink(&self, target: &str, link_path: &str, opts: CreateOpts) -> Result<Stats>;
    async fn readlink(&self, path: &str) -> Result<String>;
    async fn rename(&self, old: &str, new: &str) -> Result<()>;
    async fn sync(&self, path: &str, data: Option<&[u8]>, update: Option<StatsUpdate>) -> Result<()>;
    async fn read(&self, path: &str, buf: &mut [u8], offset: u64) -> Result<usize>;
    async fn write(&self, path: &str, buf: &[u8], offset: u64) -> Result<usize>;
}

/// Synchronous [`Filesystem`] facade over an [`AsyncFilesystem`] source of truth, with a
/// [`StoreEngine`]-backed shadow cache.
///
/// Every mutation is applied to `source` first (via [`tokio::runtime::Handle::block_on`] on
/// the calling thread), and mirrored into `shadow` only once `source` confirms it — so the
/// cache never observes a write the source of truth rejected. Reads are served straight from
/// `shadow`, which is kept current by every prior write this bridge made.
pub struct BridgeFs {
    source: Arc<dyn AsyncFilesystem>,
    shadow: StoreEngine<MemoryStore>,
    disable_async_cache: bool,
}

impl std::fmt::Debug for BridgeFs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeFs")
            .field("source", &self.source.name())
            .field("disable_async_cache", &self.disable_async_cache)
            .finish()
    }
}

impl BridgeFs {
    /// Wrap `source`. Must be called from within a Tokio runtime, since every sync method
    /// below blocks the calling thread on an async call into `source`.
    pub fn new(source: Arc<dyn AsyncFilesystem>, disable_async_cache: bool) -> Self {
        BridgeFs {
            source,
            shadow: StoreEngine::new(MemoryStore::new(), "bridge-shadow"),
            disable_async_cache,
        }
    }

    fn block_on<F: std::future::Future>(&self, fut: F) -> F::Output {
        tokio::runtime::Handle::current().block_on(fut)
    }

    fn check_enabled(&self, syscall: &'static str) -> Result<()> {
        if self.disable_async_cache {
            return Err(raise::enotsup(syscall));
        }
        Ok(())
    }
}

impl Filesystem for BridgeFs {
    fn name(&self) -> &str {
        self.source.name()
    }

    fn attributes(&self) -> FsAttributes {
        self.shadow.attributes()
    }

    fn rename(&self, old: &str, new: &str) -> Result<()> {
        self.check_enabled("rename")?;
        self.block_on(self.source.rename(old, new))?;
        self.shadow.rename(old, new)
    }

    fn stat(&self, path: &str) -> Result<Stats> {
        self.check_enabled("stat")?;
        match self.shadow.stat(path) {
            Ok(stats) => Ok(stats),
            Err(_) => {
                let stats = self.block_on(self.source.stat(path))?;
                Ok(stats)
            }
        }
    }

    fn touch(&self, path: &str, update: StatsUpdate) -> Result<()> {
        self.check_enabled("touch")?;
        self.block_on(self.source.touch(path, update))?;
        self.shadow.touch(path, update)
    }

    fn create_file(&self, path: &str, opts: CreateOpts) -> Result<Stats> {
        self.check_enabled("createFile")?;
        self.block_on(self.source.create_file(path, opts))?;
        self.shadow.create_file(path, opts)
    }

    fn unlink(&self, path: &str) -> Result<()> {
        self.check_enabled("unlink")?;
        self.block_on(self.source.unlink(path))?;
        self.shadow.unlink(path)
    }

    fn rmdir(&self, path: &str) -> Result<()> {
        self.check_enabled("rmdir")?;
        self.block_on(self.source.rmdir(path))?;
        self.shadow.rmdir(path)
    }

    fn mkdir(&self, path: &str, opts: CreateOpts) -> Result<Stats> {
        self.check_enabled("mkdir")?;
        self.block_on(self.source.mkdir(path, opts))?;
        self.shadow.mkdir(path, opts)
    }

    fn readdir(&self, path: &str) -> Result<Vec<String>> {
        self.check_enabled("readdir")?;
        match self.shadow.readdir(path) {
            Ok(entries) => Ok(entries),
            Err(_) => self.block_on(self.source.readdir(path)),
        }
    }

    fn exists(&self, path: &str) -> bool {
        if self.disable_async_cache {
            return false;
        }
        self.shadow.exists(path) || self.block_on(self.source.exists(path))
    }

    fn link(&self, existing: &str, new: &str) -> Result<()> {
        self.check_enabled("link")?;
        self.block_on(self.source.link(existing, new))?;
        self.shadow.link(existing, new)
    }

    fn symlink(&self, target: &str, link_path: &str, opts: CreateOpts) -> Result<Stats> {
        self.check_enabled("symlink")?;
        self.block_on(self.source.symlink(target, link_path, opts))?;
        self.shadow.symlink(target, link_path, opts)
    }

    fn readlink(&self, path: &str) -> Result<String> {
        self.check_enabled("readlink")?;
        match self.shadow.readlink(path) {
            Ok(target) => Ok(target),
            Err(_) => self.block_on(self.source.readlink(path)),
        }
    }

    fn sync(&self, path: &str, data: Option<&[u8]>, update: Option<StatsUpdate>) -> Result<()> {
        self.check_enabled("sync")?;
        self.block_on(self.source.sync(path, data, update))?;
        self.shadow.sync(path, data, update)
    }

    fn read(&self, path: &str, buf: &mut [u8], offset: u64) -> Result<usize> {
        self.check_enabled("read")?;
        match self.shadow.read(path, buf, offset) {
            Ok(n) => Ok(n),
            Err(_) => self.block_on(self.source.read(path, buf, offset)),
        }
    }

    fn write(&self, path: &str, buf: &[u8], offset: u64) -> Result<usize> {
        self.check_enabled("write")?;
        let n = self.block_on(self.source.write(path, buf, offset))?;
        self.shadow.write(path, buf, offset)?;
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    #[derive(Debug)]
    struct RecordingAsyncFs {
        inner: StoreEngine<MemoryStore>,
        writes: StdMutex<u32>,
    }

    #[async_trait::async_trait]
    impl AsyncFilesystem for RecordingAsyncFs {
        fn name(&self) -> &str {
            "recording"
        }
        async fn stat(&self, path: &str) -> Result<Stats> {
            self.inner.stat(path)
        }
        async fn touch(&self, path: &str, update: StatsUpdate) -> Result<()> {
            self.inner.touch(path, update)
        }
        async fn create_file(&self, path: &str, opts: CreateOpts) -> Result<Stats> {
            self.inner.create_file(path, opts)
        }
        async fn unlink(&self, path: &str) -> Result<()> {
            self.inner.unlink(path)
        }
        async fn rmdir(&self, path: &str) -> Result<()> {
            self.inner.rmdir(path)
        }
        async fn mkdir(&self, path: &str, opts: CreateOpts) -> Result<Stats> {
            self.inner.mkdir(path, opts)
        }
        async fn readdir(&self, path: &str) -> Result<Vec<String>> {
            self.inner.readdir(path)
        }
        async fn exists(&self, path: &str) -> bool {
            self.inner.exists(path)
        }
        async fn link(&self, existing: &str, new: &str) -> Result<()> {
            self.inner.link(existing, new)
        }
        async fn symlink(&self, target: &str, link_path: &str, opts: CreateOpts) -> Result<Stats> {
            self.inner.symlink(target, link_path, opts)
        }
        async fn readlink(&self, path: &str) -> Result<String> {
            self.inner.readlink(path)
        }
        async fn rename(&self, old: &str, new: &str) -> Result<()> {
            self.inner.rename(old, new)
        }
        async fn sync(&self, path: &str, data: Option<&[u8]>, update: Option<StatsUpdate>) -> Result<()> {
            self.inner.sync(path, data, update)
        }
        async fn read(&self, path: &str, buf: &mut [u8], offset: u64) -> Result<usize> {
            self.inner.read(path, buf, offset)
        }
        async fn write(&self, path: &str, buf: &[u8], offset: u64) -> Result<usize> {
            *self.writes.lock().unwrap() += 1;
            self.inner.write(path, buf, offset)
        }
    }

    impl RecordingAsyncFs {
        fn new() -> Self {
            RecordingAsyncFs {
                inner: StoreEngine::new(MemoryStore::new(), "recording-inner"),
                writes: StdMutex::new(0),
            }
        }
    }

    #[tokio::test]
    async fn write_propagates_to_source_and_shadow() {
        let source = Arc::new(RecordingAsyncFs::new());
        let bridge = BridgeFs::new(source.clone(), false);
        bridge.create_file("/a", CreateOpts::default()).unwrap();
        bridge.write("/a", b"hi", 0).unwrap();
        assert_eq!(*source.writes.lock().unwrap(), 1);
        let mut buf = [0u8; 2];
        let n = bridge.read("/a", &mut buf, 0).unwrap();
        assert_eq!(&buf[..n], b"hi");
    }

    #[tokio::test]
    async fn disabled_cache_raises_enotsup() {
        let source = Arc::new(RecordingAsyncFs::new());
        let bridge = BridgeFs::new(source, true);
        let err = bridge.stat("/a").unwrap_err();
        assert_eq!(err.code(), crate::error::ErrCode::Enotsup);
    }
}
