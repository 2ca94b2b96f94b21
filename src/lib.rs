//! A portable, in-process virtual filesystem over pluggable storage backends.
//!
//! This is an embeddable POSIX-flavored filesystem core: a hierarchical namespace, inode
//! records, directory listings, and hard links realized on top of a flat transactional key
//! store, fronted by a facade that normalizes paths, resolves symlinks, checks permissions,
//! and dispatches across a mount table of independently pluggable backends.

#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub
)]

pub mod config;
pub mod error;
pub mod fdtable;
pub mod flags;
pub mod fs;
pub mod handle;
pub mod inode;
pub mod ioctl;
pub mod mount;
pub mod path;
#[cfg(feature = "async")]
pub mod remote;
pub mod stats;
pub mod store;
pub mod vfs;
pub mod watch;

pub use config::{MountConfig, VfsConfig};
pub use error::{ErrCode, Result, VfsError};
pub use flags::{AccessFlags, InodeFlags, OpenFlags};
pub use fs::{CaseFold, CreateOpts, Filesystem, FsAttributes};
pub use handle::FileHandle;
pub use inode::{Inode, StatsUpdate};
pub use mount::MountTable;
pub use stats::Stats;
pub use vfs::{CopyOpts, DirEntry, GlobOpts, Identity, MkdirOpts, ReaddirOpts, RmOpts, Vfs};
pub use watch::{WatchEvent, WatchEventKind, WatchHandle};
