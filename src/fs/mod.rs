//! The filesystem capability contract (§6) and its implementations: the store-backed
//! engine (component C), the FIFO mutex mixin (E), the read-only mixin (F), the async/sync
//! bridge mixin (G), and the built-in device-node backend.

#[cfg(feature = "async")]
pub mod bridge;
pub mod devices;
pub mod engine;
pub mod listing;
pub mod mutex;
pub mod readonly;

use bitflags::bitflags;

use crate::error::Result;
use crate::stats::Stats;

/// Options accepted by `create_file`/`mkdir`/`symlink`.
#[derive(Clone, Copy, Debug)]
pub struct CreateOpts {
    /// Permission bits (file-type nibble excluded; the operation supplies it).
    pub mode: u32,
    /// Owning uid for the new inode.
    pub uid: u32,
    /// Owning gid for the new inode.
    pub gid: u32,
}

impl Default for CreateOpts {
    fn default() -> Self {
        CreateOpts {
            mode: 0o755,
            uid: 0,
            gid: 0,
        }
    }
}

bitflags! {
    /// Attributes a backend declares about itself, consulted by the VFS facade and mixins.
    #[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Default)]
    pub struct FsAttributes: u32 {
        /// The backend was constructed read-only.
        const READONLY = 0b0001;
        /// A mixin (e.g. [`readonly`]) is forcing every mutation to `EROFS`.
        const NO_WRITE = 0b0010;
        /// The backend never updates `atime` regardless of per-inode flags.
        const NO_ATIME = 0b0100;
        /// The backend honors `S_ISUID`/`S_ISGID` on creation.
        const SETID = 0b1000;
    }
}

/// Case-folding behavior for path lookups on one mount.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Default)]
pub enum CaseFold {
    /// Case-sensitive, the POSIX default.
    #[default]
    None,
    /// Fold to lowercase before lookup.
    Lower,
    /// Fold to uppercase before lookup.
    Upper,
}

impl CaseFold {
    /// Apply the fold to one path component.
    pub fn apply(self, name: &str) -> String {
        match self {
            CaseFold::None => name.to_string(),
            CaseFold::Lower => name.to_lowercase(),
            CaseFold::Upper => name.to_uppercase(),
        }
    }
}

/// The filesystem capability set every backend implements some subset of (§6). Paths
/// passed here are already normalized and relative to this filesystem's own root — the
/// mount table (component D) has already stripped the mount prefix.
pub trait Filesystem: std::fmt::Debug + Send + Sync {
    /// A short, stable name for this backend, used in `ioctl` sysfs-path synthesis and logs.
    fn name(&self) -> &str;

    /// The attributes this backend declares about itself.
    fn attributes(&self) -> FsAttributes;

    /// Move `old` to `new` within this filesystem. See the engine's algorithm for the
    /// self/descendant guard and overwrite rules.
    fn rename(&self, old: &str, new: &str) -> Result<()>;

    /// Fetch metadata for `path`.
    fn stat(&self, path: &str) -> Result<Stats>;

    /// Apply a metadata update to `path` (chmod/chown/utimes all route through this).
    fn touch(&self, path: &str, update: crate::inode::StatsUpdate) -> Result<()>;

    /// Create a new regular file at `path`. Fails with `EEXIST` if it already exists.
    fn create_file(&self, path: &str, opts: CreateOpts) -> Result<Stats>;

    /// Remove the directory entry at `path`. `EISDIR` if it names a directory.
    fn unlink(&self, path: &str) -> Result<()>;

    /// Remove the empty directory at `path`. `ENOTDIR`/`ENOTEMPTY` as appropriate.
    fn rmdir(&self, path: &str) -> Result<()>;

    /// Create a new, empty directory at `path`.
    fn mkdir(&self, path: &str, opts: CreateOpts) -> Result<Stats>;

    /// List the entry names of the directory at `path`, in unspecified order.
    fn readdir(&self, path: &str) -> Result<Vec<String>>;

    /// `true` iff `path` names an existing entry. Never raises `ENOENT`.
    fn exists(&self, path: &str) -> bool;

    /// Create a hard link at `new` pointing at the same inode as `existing`.
    fn link(&self, existing: &str, new: &str) -> Result<()>;

    /// Create a symbolic link at `link_path` whose target text is `target`.
    fn symlink(&self, target: &str, link_path: &str, opts: CreateOpts) -> Result<Stats>;

    /// Read the target text of the symlink at `path`.
    fn readlink(&self, path: &str) -> Result<String>;

    /// Persist `data` and/or `update` for `path` in a single transaction.
    fn sync(
        &self,
        path: &str,
        data: Option<&[u8]>,
        update: Option<crate::inode::StatsUpdate>,
    ) -> Result<()>;

    /// Read up to `buf.len()` bytes starting at `offset`, returning the count read.
    fn read(&self, path: &str, buf: &mut [u8], offset: u64) -> Result<usize>;

    /// Write `buf` starting at `offset`, returning the count written.
    fn write(&self, path: &str, buf: &[u8], offset: u64) -> Result<usize>;

    /// Open a byte stream for reading. Out of scope per §1 (stream primitives are an
    /// external collaborator) — the default raises `ENOTSUP`.
    fn stream_read(&self, path: &str) -> Result<()> {
        Err(crate::error::raise::enotsup("streamRead")).map_err(|e| e.with_path(path))
    }

    /// Open a byte stream for writing. See [`Filesystem::stream_read`].
    fn stream_write(&self, path: &str) -> Result<()> {
        Err(crate::error::raise::enotsup("streamWrite")).map_err(|e| e.with_path(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn case_fold_applies_expected_transform() {
        assert_eq!(CaseFold::Lower.apply("AbC"), "abc");
        assert_eq!(CaseFold::Upper.apply("AbC"), "ABC");
        assert_eq!(CaseFold::None.apply("AbC"), "AbC");
    }
}
