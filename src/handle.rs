//! The open file handle (component H, part one): the stateful object an `open` call returns,
//! carrying a filesystem back-reference, the path within it, the open-flag word, a cursor
//! position, and dirty/closed bits.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{raise, Result};
use crate::flags::{OpenFlags, S_IFMT};
use crate::fs::Filesystem;
use crate::inode::StatsUpdate;
use crate::stats::Stats;

struct HandleState {
    position: u64,
    dirty: bool,
    closed: bool,
}

/// One open file. Cheap to clone (it's an `Arc` internally via the descriptor table), but the
/// type itself is the unit of ownership the table hands out and reclaims.
pub struct FileHandle {
    fs: Arc<dyn Filesystem>,
    path: String,
    flags: OpenFlags,
    state: Mutex<HandleState>,
}

impl std::fmt::Debug for FileHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("FileHandle")
            .field("path", &self.path)
            .field("flags", &self.flags)
            .field("position", &state.position)
            .field("dirty", &state.dirty)
            .field("closed", &state.closed)
            .finish()
    }
}

impl FileHandle {
    /// Wrap an already-resolved `path` on `fs`, opened with `flags`. The caller (the VFS
    /// facade) is responsible for `O_CREAT`/`O_EXCL`/`O_TRUNC` handling before constructing
    /// this handle — by the time a handle exists, the entry is known to exist and be a
    /// regular file (or device node).
    pub fn new(fs: Arc<dyn Filesystem>, path: impl Into<String>, flags: OpenFlags) -> Self {
        FileHandle {
            fs,
            path: path.into(),
            flags,
            state: Mutex::new(HandleState {
                position: 0,
                dirty: false,
                closed: false,
            }),
        }
    }

    /// The path this handle was opened against.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The flag word this handle was opened with.
    pub fn flags(&self) -> OpenFlags {
        self.flags
    }

    fn check_open(&self, syscall: &'static str) -> Result<()> {
        if self.state.lock().closed {
            return Err(raise::ebadf(syscall));
        }
        Ok(())
    }

    /// Read up to `buf.len()` bytes from the current position, advancing it by the amount
    /// read. `EBADF` if closed or not opened for reading.
    pub fn read(&self, buf: &mut [u8]) -> Result<usize> {
        self.check_open("read")?;
        if !self.flags.readable() {
            return Err(raise::ebadf("read"));
        }
        let position = self.state.lock().position;
        let n = self.fs.read(&self.path, buf, position)?;
        self.state.lock().position = position + n as u64;
        Ok(n)
    }

    /// Write `buf` at the current position, advancing it by `buf.len()`. Under `O_APPEND`,
    /// the explicit position is ignored and every write lands at the file's current end —
    /// the quirk Testable Property 10 exercises. `EBADF` if closed or not opened for writing.
    pub fn write(&self, buf: &[u8]) -> Result<usize> {
        self.check_open("write")?;
        if !self.flags.writable() {
            return Err(raise::ebadf("write"));
        }
        let offset = if self.flags.contains(OpenFlags::O_APPEND) {
            self.fs.stat(&self.path)?.size
        } else {
            self.state.lock().position
        };
        let n = self.fs.write(&self.path, buf, offset)?;
        {
            let mut state = self.state.lock();
            state.position = offset + n as u64;
            state.dirty = true;
        }
        if self.flags.contains(OpenFlags::O_SYNC) {
            self.sync()?;
        }
        Ok(n)
    }

    /// Resize the file to exactly `len` bytes, zero-filling any new tail.
    pub fn truncate(&self, len: u64) -> Result<()> {
        self.check_open("truncate")?;
        let stats = self.fs.stat(&self.path)?;
        let mut buf = vec![0u8; len as usize];
        if stats.size > 0 && len > 0 {
            let to_read = stats.size.min(len) as usize;
            self.fs.read(&self.path, &mut buf[..to_read], 0)?;
        }
        self.fs.sync(&self.path, Some(&buf), None)?;
        self.state.lock().dirty = true;
        Ok(())
    }

    /// Change permission bits, preserving the file-type nibble.
    pub fn chmod(&self, perm: u32) -> Result<()> {
        self.check_open("chmod")?;
        let current = self.fs.stat(&self.path)?;
        let mode = current.kind.to_mode_bits() | (perm & !S_IFMT);
        self.fs.touch(
            &self.path,
            StatsUpdate {
                mode: Some(mode),
                ..Default::default()
            },
        )
    }

    /// Change ownership. Either field may be left unset.
    pub fn chown(&self, uid: Option<u32>, gid: Option<u32>) -> Result<()> {
        self.check_open("chown")?;
        self.fs.touch(
            &self.path,
            StatsUpdate {
                uid,
                gid,
                ..Default::default()
            },
        )
    }

    /// Change access/modification times. Either field may be left unset.
    pub fn utimes(&self, atime_ms: Option<u64>, mtime_ms: Option<u64>) -> Result<()> {
        self.check_open("utimes")?;
        self.fs.touch(
            &self.path,
            StatsUpdate {
                atime_ms,
                mtime_ms,
                ..Default::default()
            },
        )
    }

    /// Flush any buffered writes. Since every backend commits durably on `write` already,
    /// this clears the dirty bit without further I/O.
    pub fn sync(&self) -> Result<()> {
        self.check_open("sync")?;
        self.fs.sync(&self.path, None, None)?;
        self.state.lock().dirty = false;
        Ok(())
    }

    /// `stat` via this handle (`fstat`).
    pub fn stat(&self) -> Result<Stats> {
        self.check_open("fstat")?;
        self.fs.stat(&self.path)
    }

    /// Close the handle. Raises `EBUSY` if unwritten data remains and `force` is `false`;
    /// raises `EBADF` if already closed.
    pub fn close(&self, force: bool) -> Result<()> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(raise::ebadf("close"));
        }
        if state.dirty && !force {
            return Err(raise::ebusy("close"));
        }
        state.closed = true;
        Ok(())
    }

    /// `true` once [`FileHandle::close`] has succeeded.
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::engine::StoreEngine;
    use crate::fs::CreateOpts;
    use crate::store::MemoryStore;

    fn handle(flags: OpenFlags) -> (Arc<dyn Filesystem>, FileHandle) {
        let fs: Arc<dyn Filesystem> = Arc::new(StoreEngine::new(MemoryStore::new(), "memfs"));
        fs.create_file("/f", CreateOpts::default()).unwrap();
        let h = FileHandle::new(fs.clone(), "/f", flags);
        (fs, h)
    }

    #[test]
    fn append_ignores_explicit_position() {
        let (fs, h) = handle(OpenFlags::O_WRONLY | OpenFlags::O_APPEND);
        fs.write("/f", b"hello", 0).unwrap();
        h.write(b"!").unwrap();
        assert_eq!(fs.stat("/f").unwrap().size, 6);
    }

    #[test]
    fn close_with_dirty_data_is_ebusy_unless_forced() {
        let (_fs, h) = handle(OpenFlags::O_WRONLY);
        h.write(b"x").unwrap();
        let err = h.close(false).unwrap_err();
        assert_eq!(err.code(), crate::error::ErrCode::Ebusy);
        assert!(h.close(true).is_ok());
    }

    #[test]
    fn double_close_is_ebadf() {
        let (_fs, h) = handle(OpenFlags::O_RDONLY);
        h.close(false).unwrap();
        let err = h.close(false).unwrap_err();
        assert_eq!(err.code(), crate::error::ErrCode::Ebadf);
    }

    #[test]
    fn read_only_handle_rejects_write() {
        let (_fs, h) = handle(OpenFlags::O_RDONLY);
        let err = h.write(b"x").unwrap_err();
        assert_eq!(err.code(), crate::error::ErrCode::Ebadf);
    }

    #[test]
    fn truncate_shrinks_and_zero_pads() {
        let (fs, h) = handle(OpenFlags::O_RDWR);
        fs.write("/f", b"hello world", 0).unwrap();
        h.truncate(5).unwrap();
        assert_eq!(fs.stat("/f").unwrap().size, 5);
        h.truncate(8).unwrap();
        let mut buf = [0u8; 8];
        fs.read("/f", &mut buf, 0).unwrap();
        assert_eq!(&buf, b"hello\0\0\0");
    }
}
