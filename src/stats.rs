//! The stat value object returned by `stat`/`lstat`/`fstat`.
//!
//! Shaped after the teacher crate's own `FileAttr` (`lib.rs`): one flat, `Copy` struct
//! covering the fields POSIX `stat(2)` reports, built from an [`Inode`](crate::inode::Inode)
//! snapshot.

#[cfg(feature = "serializable")]
use serde::{Deserialize, Serialize};

use crate::flags::{FileType, InodeFlags};
use crate::inode::Inode;

/// A point-in-time snapshot of one inode's metadata.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serializable", derive(Serialize, Deserialize))]
pub struct Stats {
    /// Inode number.
    pub ino: u64,
    /// Size in bytes.
    pub size: u64,
    /// Kind of file (directory, regular file, symlink, device, ...).
    pub kind: FileType,
    /// Permission bits, without the file-type nibble.
    pub perm: u32,
    /// Number of hard links.
    pub nlink: u32,
    /// Owning user id.
    pub uid: u32,
    /// Owning group id.
    pub gid: u32,
    /// Time of last access, UNIX-epoch milliseconds.
    pub atime_ms: u64,
    /// Time of last modification, UNIX-epoch milliseconds.
    pub mtime_ms: u64,
    /// Time of last status change, UNIX-epoch milliseconds.
    pub ctime_ms: u64,
    /// Time of creation, UNIX-epoch milliseconds.
    pub birthtime_ms: u64,
    /// Inode-level flags (immutable, append-only, no-atime, sync).
    pub flags: InodeFlags,
    /// Monotonic generation counter, surfaced through `ioctl` get/set-version.
    pub version: u32,
}

impl Stats {
    /// Build a stats snapshot from a live inode.
    pub fn from_inode(inode: &Inode) -> Self {
        Stats {
            ino: inode.ino(),
            size: inode.size() as u64,
            kind: inode.file_type().unwrap_or(FileType::RegularFile),
            perm: inode.mode() & !crate::flags::S_IFMT,
            nlink: inode.nlink() as u32,
            uid: inode.uid(),
            gid: inode.gid(),
            atime_ms: inode.atime_ms(),
            mtime_ms: inode.mtime_ms(),
            ctime_ms: inode.ctime_ms(),
            birthtime_ms: inode.birthtime_ms(),
            flags: inode.flags(),
            version: inode.version(),
        }
    }

    /// `true` iff [`Stats::kind`] is [`FileType::Directory`].
    pub fn is_dir(&self) -> bool {
        self.kind.is_dir()
    }

    /// `true` iff [`Stats::kind`] is [`FileType::RegularFile`].
    pub fn is_file(&self) -> bool {
        self.kind.is_file()
    }

    /// `true` iff [`Stats::kind`] is [`FileType::Symlink`].
    pub fn is_symlink(&self) -> bool {
        self.kind.is_symlink()
    }
}
