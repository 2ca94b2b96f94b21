//! The read-only mixin (component F): wraps any [`Filesystem`] and turns every mutating
//! operation into `EROFS`, while passing every read-only operation straight through.
//!
//! Mirrors the teacher crate's decorator-style wrapping of a `Filesystem` trait object
//! (`passthrough.rs` wraps one `Filesystem` impl around another for the same reason: add a
//! behavior at the boundary without touching the wrapped implementation).

use std::sync::Arc;

use crate::error::{raise, Result};
use crate::fs::{CreateOpts, FsAttributes, Filesystem};
use crate::inode::StatsUpdate;
use crate::stats::Stats;

/// Read-only view over an inner [`Filesystem`]. Every mutation raises `EROFS`; reads and
/// metadata lookups delegate to `inner` unchanged.
#[derive(Debug)]
pub struct ReadOnlyFs {
    inner: Arc<dyn Filesystem>,
}

impl ReadOnlyFs {
    /// Wrap `inner` so every mutation is rejected.
    pub fn new(inner: Arc<dyn Filesystem>) -> Self {
        ReadOnlyFs { inner }
    }
}

impl Filesystem for ReadOnlyFs {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn attributes(&self) -> FsAttributes {
        self.inner.attributes() | FsAttributes::READONLY | FsAttributes::NO_WRITE
    }

    fn rename(&self, _old: &str, new: &str) -> Result<()> {
        Err(raise::erofs("rename", new))
    }

    fn stat(&self, path: &str) -> Result<Stats> {
        self.inner.stat(path)
    }

    fn touch(&self, path: &str, _update: StatsUpdate) -> Result<()> {
        Err(raise::erofs("touch", path))
    }

    fn create_file(&self, path: &str, _opts: CreateOpts) -> Result<Stats> {
        Err(raise::erofs("createFile", path))
    }

    fn unlink(&self, path: &str) -> Result<()> {
        Err(raise::erofs("unlink", path))
    }

    fn rmdir(&self, path: &str) -> Result<()> {
        Err(raise::erofs("rmdir", path))
    }

    fn mkdir(&self, path: &str, _opts: CreateOpts) -> Result<Stats> {
        Err(raise::erofs("mkdir", path))
    }

    fn readdir(&self, path: &str) -> Result<Vec<String>> {
        self.inner.readdir(path)
    }

    fn exists(&self, path: &str) -> bool {
        self.inner.exists(path)
    }

    fn link(&self, _existing: &str, new: &str) -> Result<()> {
        Err(raise::erofs("link", new))
    }

    fn symlink(&self, _target: &str, link_path: &str, _opts: CreateOpts) -> Result<Stats> {
        Err(raise::erofs("symlink", link_path))
    }

    fn readlink(&self, path: &str) -> Result<String> {
        self.inner.readlink(path)
    }

    fn sync(&self, path: &str, _data: Option<&[u8]>, _update: Option<StatsUpdate>) -> Result<()> {
        Err(raise::erofs("sync", path))
    }

    fn read(&self, path: &str, buf: &mut [u8], offset: u64) -> Result<usize> {
        self.inner.read(path, buf, offset)
    }

    fn write(&self, path: &str, _buf: &[u8], _offset: u64) -> Result<usize> {
        Err(raise::erofs("write", path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::engine::StoreEngine;
    use crate::store::MemoryStore;

    #[test]
    fn write_is_rejected_but_read_passes_through() {
        let engine = StoreEngine::new(MemoryStore::new(), "memfs");
        engine.create_file("/a", CreateOpts::default()).unwrap();
        engine.write("/a", b"hi", 0).unwrap();

        let ro = ReadOnlyFs::new(Arc::new(engine));
        assert!(ro.attributes().contains(FsAttributes::READONLY));

        let err = ro.write("/a", b"bye", 0).unwrap_err();
        assert_eq!(err.code(), crate::error::ErrCode::Erofs);

        let mut buf = [0u8; 2];
        let n = ro.read("/a", &mut buf, 0).unwrap();
        assert_eq!(&buf[..n], b"hi");

        let err = ro.mkdir("/b", CreateOpts::default()).unwrap_err();
        assert_eq!(err.code(), crate::error::ErrCode::Erofs);
    }
}
