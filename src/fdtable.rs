//! The descriptor table (component H, part two): the exclusive owner of every open
//! [`FileHandle`], mapping small recycled integers to handles the way a process's fd table
//! does.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{raise, Result};
use crate::handle::FileHandle;

struct State {
    handles: HashMap<u32, Arc<FileHandle>>,
    next_fd: u32,
    free_list: Vec<u32>,
}

/// A per-context table of open handles. One `Vfs` (component I) owns one of these.
#[derive(Default)]
pub struct FdTable {
    state: Mutex<State>,
}

impl Default for State {
    fn default() -> Self {
        State {
            handles: HashMap::new(),
            next_fd: 0,
            free_list: Vec::new(),
        }
    }
}

impl std::fmt::Debug for FdTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("FdTable")
            .field("open_count", &state.handles.len())
            .finish()
    }
}

impl FdTable {
    /// An empty table.
    pub fn new() -> Self {
        FdTable::default()
    }

    /// Register `handle`, returning its new file descriptor. Reuses the lowest previously
    /// freed descriptor before minting a new one.
    pub fn to_fd(&self, handle: Arc<FileHandle>) -> u32 {
        let mut state = self.state.lock();
        let fd = state.free_list.pop().unwrap_or_else(|| {
            let fd = state.next_fd;
            state.next_fd += 1;
            fd
        });
        state.handles.insert(fd, handle);
        fd
    }

    /// Look up the handle behind `fd`. `EBADF` if it does not name an open handle.
    pub fn from_fd(&self, fd: u32) -> Result<Arc<FileHandle>> {
        self.state
            .lock()
            .handles
            .get(&fd)
            .cloned()
            .ok_or_else(|| raise::ebadf("from_fd"))
    }

    /// Remove and return the handle behind `fd`, freeing the descriptor for reuse. `EBADF` if
    /// it does not name an open handle — double-`delete_fd` is rejected the same way a
    /// double-`close` is.
    pub fn delete_fd(&self, fd: u32) -> Result<Arc<FileHandle>> {
        let mut state = self.state.lock();
        let handle = state.handles.remove(&fd).ok_or_else(|| raise::ebadf("delete_fd"))?;
        state.free_list.push(fd);
        Ok(handle)
    }

    /// Number of currently open handles.
    pub fn len(&self) -> usize {
        self.state.lock().handles.len()
    }

    /// `true` iff no handle is open.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flags::OpenFlags;
    use crate::fs::engine::StoreEngine;
    use crate::fs::{CreateOpts, Filesystem};
    use crate::store::MemoryStore;

    fn a_handle() -> Arc<FileHandle> {
        let fs: Arc<dyn Filesystem> = Arc::new(StoreEngine::new(MemoryStore::new(), "memfs"));
        fs.create_file("/f", CreateOpts::default()).unwrap();
        Arc::new(FileHandle::new(fs, "/f", OpenFlags::O_RDONLY))
    }

    #[test]
    fn fds_are_recycled_lowest_first() {
        let table = FdTable::new();
        let fd0 = table.to_fd(a_handle());
        let fd1 = table.to_fd(a_handle());
        table.delete_fd(fd0).unwrap();
        let fd2 = table.to_fd(a_handle());
        assert_eq!(fd2, fd0);
        assert_ne!(fd1, fd2);
    }

    #[test]
    fn from_fd_on_unknown_descriptor_is_ebadf() {
        let table = FdTable::new();
        let err = table.from_fd(7).unwrap_err();
        assert_eq!(err.code(), crate::error::ErrCode::Ebadf);
    }

    #[test]
    fn double_delete_is_ebadf() {
        let table = FdTable::new();
        let fd = table.to_fd(a_handle());
        table.delete_fd(fd).unwrap();
        let err = table.delete_fd(fd).unwrap_err();
        assert_eq!(err.code(), crate::error::ErrCode::Ebadf);
    }
}
