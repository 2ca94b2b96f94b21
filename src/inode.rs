//! The fixed-size, little-endian inode record (component A).
//!
//! [`RawInode`] is the on-the-wire byte layout: a `#[repr(C)]` struct with no padding, coded
//! with `zerocopy` the same way the teacher crate codes its kernel ABI structs in
//! `ll::fuse_abi` — `FromBytes + IntoBytes + KnownLayout + Immutable`, so a buffer of the
//! right length can be reinterpreted without a parsing pass. [`Inode`] wraps it with typed
//! accessors and the higher-level update/timestamp behavior the engine needs.

use std::time::{SystemTime, UNIX_EPOCH};

use rand::Rng;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::flags::{FileType, InodeFlags, S_IFMT};

/// The reserved inode number of the root directory. Never allocated to any other object.
pub const ROOT_INO: u64 = 1;

/// Exact on-disk/on-wire size of [`RawInode`] in bytes.
pub const RAW_INODE_SIZE: usize = std::mem::size_of::<RawInode>();

/// The fixed-layout inode record, little-endian, no padding.
#[repr(C)]
#[derive(Clone, Copy, Debug, Eq, PartialEq, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct RawInode {
    ino: u64,
    atime_ms: u64,
    mtime_ms: u64,
    ctime_ms: u64,
    birthtime_ms: u64,
    size: u32,
    mode: u32,
    uid: u32,
    gid: u32,
    flags: u32,
    version: u32,
    nlink: u16,
    _reserved: [u8; 6],
}

/// Attribute fields a caller may update in one shot via [`Inode::update`].
///
/// Every field is optional; [`Inode::update`] only touches the fields that are `Some`, and
/// reports whether anything observable actually changed so the engine can skip a redundant
/// store write.
#[derive(Clone, Copy, Debug, Default)]
pub struct StatsUpdate {
    /// New payload size.
    pub size: Option<u32>,
    /// New mode bits (file type nibble included).
    pub mode: Option<u32>,
    /// New owning uid.
    pub uid: Option<u32>,
    /// New owning gid.
    pub gid: Option<u32>,
    /// New inode flags.
    pub flags: Option<InodeFlags>,
    /// New access time, in UNIX-epoch milliseconds.
    pub atime_ms: Option<u64>,
    /// New modification time, in UNIX-epoch milliseconds.
    pub mtime_ms: Option<u64>,
    /// New change time, in UNIX-epoch milliseconds.
    pub ctime_ms: Option<u64>,
    /// Explicit generation counter override, used by `ioctl` set-version. Unlike every other
    /// field here, setting this does not itself count as an observable change for the
    /// purposes of the automatic version bump below — the caller is choosing the version.
    pub version: Option<u32>,
}

/// An in-memory inode: the raw record plus the behavior the engine needs around it.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Inode(RawInode);

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

impl Inode {
    /// Allocate a fresh inode with `mode`, zero size, `nlink = 1`, `uid = gid = 0`, and all
    /// four timestamps set to now. The ino is a random 64-bit value, retried until it avoids
    /// [`ROOT_INO`] — actual collision-with-existing-inode avoidance is the engine's job
    /// (see the `maxInodeAllocTries` rejection-sampling loop in the store-backed engine).
    pub fn new(mode: u32) -> Self {
        let mut rng = rand::thread_rng();
        let mut ino = rng.r#gen::<u64>();
        while ino == ROOT_INO || ino == 0 {
            ino = rng.r#gen::<u64>();
        }
        let now = now_ms();
        Inode(RawInode {
            ino,
            atime_ms: now,
            mtime_ms: now,
            ctime_ms: now,
            birthtime_ms: now,
            size: 0,
            mode,
            uid: 0,
            gid: 0,
            flags: 0,
            version: 0,
            nlink: 1,
            _reserved: [0; 6],
        })
    }

    /// Build the reserved root directory inode: `mode = 0o777 | S_IFDIR`.
    pub fn new_root() -> Self {
        let now = now_ms();
        Inode(RawInode {
            ino: ROOT_INO,
            atime_ms: now,
            mtime_ms: now,
            ctime_ms: now,
            birthtime_ms: now,
            size: 0,
            mode: 0o777 | FileType::Directory.to_mode_bits(),
            uid: 0,
            gid: 0,
            flags: 0,
            version: 0,
            nlink: 1,
            _reserved: [0; 6],
        })
    }

    /// Reinterpret an exact [`RAW_INODE_SIZE`]-byte buffer as an inode. Returns `None` if
    /// the buffer is the wrong length.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        RawInode::read_from_bytes(bytes).ok().map(Inode)
    }

    /// Serialize to exactly [`RAW_INODE_SIZE`] bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.0.as_bytes().to_vec()
    }

    /// The inode number.
    pub fn ino(&self) -> u64 {
        self.0.ino
    }

    /// Payload size in bytes.
    pub fn size(&self) -> u32 {
        self.0.size
    }

    /// Raw POSIX-style mode bits, file-type nibble included.
    pub fn mode(&self) -> u32 {
        self.0.mode
    }

    /// The decoded file type, or `None` if the type nibble is not one of the known kinds.
    pub fn file_type(&self) -> Option<FileType> {
        FileType::from_mode(self.0.mode)
    }

    /// `true` iff this inode's type nibble is [`FileType::Directory`].
    pub fn is_dir(&self) -> bool {
        self.0.mode & S_IFMT == crate::flags::S_IFDIR
    }

    /// Hard link count.
    pub fn nlink(&self) -> u16 {
        self.0.nlink
    }

    /// Owning uid.
    pub fn uid(&self) -> u32 {
        self.0.uid
    }

    /// Owning gid.
    pub fn gid(&self) -> u32 {
        self.0.gid
    }

    /// Inode-level flags.
    pub fn flags(&self) -> InodeFlags {
        InodeFlags::from_bits_truncate(self.0.flags)
    }

    /// Monotonic generation counter, exposed through `ioctl` get/set-version.
    pub fn version(&self) -> u32 {
        self.0.version
    }

    /// Access time, UNIX-epoch milliseconds.
    pub fn atime_ms(&self) -> u64 {
        self.0.atime_ms
    }

    /// Modification time, UNIX-epoch milliseconds.
    pub fn mtime_ms(&self) -> u64 {
        self.0.mtime_ms
    }

    /// Change time, UNIX-epoch milliseconds.
    pub fn ctime_ms(&self) -> u64 {
        self.0.ctime_ms
    }

    /// Creation time, UNIX-epoch milliseconds.
    pub fn birthtime_ms(&self) -> u64 {
        self.0.birthtime_ms
    }

    /// Increment [`Inode::nlink`] by one, saturating rather than overflowing.
    pub fn inc_nlink(&mut self) {
        self.0.nlink = self.0.nlink.saturating_add(1);
        self.bump_ctime();
    }

    /// Decrement [`Inode::nlink`] by one, saturating at zero. Returns the new value; the
    /// caller garbage-collects the inode once it reaches zero.
    pub fn dec_nlink(&mut self) -> u16 {
        self.0.nlink = self.0.nlink.saturating_sub(1);
        self.bump_ctime();
        self.0.nlink
    }

    /// Resize the payload, updating `size` and `mtime`/`ctime`.
    pub fn set_size(&mut self, size: u32) {
        self.0.size = size;
        self.bump_mtime();
    }

    /// Record a read: bump `atime` unless [`InodeFlags::NO_ATIME`] is set.
    pub fn touch_atime(&mut self) {
        if !self.flags().contains(InodeFlags::NO_ATIME) {
            self.0.atime_ms = now_ms();
        }
    }

    fn bump_mtime(&mut self) {
        let t = now_ms();
        self.0.mtime_ms = t;
        self.0.ctime_ms = t;
    }

    fn bump_ctime(&mut self) {
        self.0.ctime_ms = now_ms();
    }

    /// Apply a partial update, returning `true` iff at least one observable field actually
    /// changed (so the engine can skip a redundant store write).
    pub fn update(&mut self, update: StatsUpdate) -> bool {
        let mut changed = false;
        if let Some(size) = update.size {
            if size != self.0.size {
                self.0.size = size;
                changed = true;
            }
        }
        if let Some(mode) = update.mode {
            if mode != self.0.mode {
                self.0.mode = mode;
                changed = true;
            }
        }
        if let Some(uid) = update.uid {
            if uid != self.0.uid {
                self.0.uid = uid;
                changed = true;
            }
        }
        if let Some(gid) = update.gid {
            if gid != self.0.gid {
                self.0.gid = gid;
                changed = true;
            }
        }
        if let Some(flags) = update.flags {
            if flags.bits() != self.0.flags {
                self.0.flags = flags.bits();
                changed = true;
            }
        }
        if let Some(atime_ms) = update.atime_ms {
            if atime_ms != self.0.atime_ms {
                self.0.atime_ms = atime_ms;
                changed = true;
            }
        }
        if let Some(mtime_ms) = update.mtime_ms {
            if mtime_ms != self.0.mtime_ms {
                self.0.mtime_ms = mtime_ms;
                changed = true;
            }
        }
        if let Some(ctime_ms) = update.ctime_ms {
            if ctime_ms != self.0.ctime_ms {
                self.0.ctime_ms = ctime_ms;
                changed = true;
            }
        }
        if changed {
            self.0.ctime_ms = now_ms();
            self.0.version = self.0.version.wrapping_add(1);
        }
        if let Some(version) = update.version {
            self.0.version = version;
        }
        changed
    }

    /// Set raw mode bits directly (used by `chmod`; preserves the file-type nibble from the
    /// caller, who is expected to pass it through).
    pub fn set_mode(&mut self, mode: u32) {
        if mode != self.0.mode {
            self.0.mode = mode;
            self.bump_ctime();
        }
    }

    /// Set ownership directly (used by `chown`).
    pub fn set_owner(&mut self, uid: Option<u32>, gid: Option<u32>) {
        let mut changed = false;
        if let Some(uid) = uid {
            changed |= uid != self.0.uid;
            self.0.uid = uid;
        }
        if let Some(gid) = gid {
            changed |= gid != self.0.gid;
            self.0.gid = gid;
        }
        if changed {
            self.bump_ctime();
        }
    }

    /// Set inode-level flags directly (used by `ioctl` set-flags).
    pub fn set_flags(&mut self, flags: InodeFlags) {
        if flags.bits() != self.0.flags {
            self.0.flags = flags.bits();
            self.bump_ctime();
        }
    }

    /// Set the generation counter directly (used by `ioctl` set-version).
    pub fn set_version(&mut self, version: u32) {
        self.0.version = version;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_layout_has_no_padding() {
        // ino + 4 timestamps (u64) + 6 u32 fields + nlink (u16) + 6 bytes reserved.
        assert_eq!(RAW_INODE_SIZE, 8 * 5 + 4 * 6 + 2 + 6);
    }

    #[test]
    fn round_trip_through_bytes_is_field_for_field_equal() {
        let mut inode = Inode::new(0o644 | crate::flags::S_IFREG);
        inode.update(StatsUpdate {
            size: Some(42),
            uid: Some(7),
            ..Default::default()
        });
        let bytes = inode.to_bytes();
        assert_eq!(bytes.len(), RAW_INODE_SIZE);
        let restored = Inode::from_bytes(&bytes).expect("valid buffer");
        assert_eq!(restored, inode);
    }

    #[test]
    fn from_bytes_rejects_wrong_length() {
        assert!(Inode::from_bytes(&[0u8; 3]).is_none());
    }

    #[test]
    fn new_never_allocates_the_root_ino() {
        for _ in 0..1000 {
            assert_ne!(Inode::new(0).ino(), ROOT_INO);
        }
    }

    #[test]
    fn update_reports_no_change_when_nothing_differs() {
        let mut inode = Inode::new(0o644);
        let changed = inode.update(StatsUpdate {
            mode: Some(inode.mode()),
            ..Default::default()
        });
        assert!(!changed);
    }

    #[test]
    fn nlink_reaches_zero_after_matching_dec_calls() {
        let mut inode = Inode::new(0o644);
        inode.inc_nlink();
        assert_eq!(inode.nlink(), 2);
        assert_eq!(inode.dec_nlink(), 1);
        assert_eq!(inode.dec_nlink(), 0);
    }

    #[test]
    fn no_atime_flag_suppresses_atime_updates() {
        let mut inode = Inode::new(0o644);
        inode.set_flags(InodeFlags::NO_ATIME);
        let before = inode.atime_ms();
        std::thread::sleep(std::time::Duration::from_millis(2));
        inode.touch_atime();
        assert_eq!(inode.atime_ms(), before);
    }
}
