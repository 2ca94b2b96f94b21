//! Open flags, access-check flags, and the traditional flag-string aliases.

use std::fmt;
use std::fmt::Formatter;

use bitflags::bitflags;

use crate::error::{ErrCode, VfsError};

bitflags! {
    /// Flags accepted by [`crate::vfs::Vfs::open`], mirroring the POSIX `open(2)` flag word.
    #[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
    pub struct OpenFlags: u32 {
        /// Open for reading only.
        const O_RDONLY = 0b000;
        /// Open for writing only.
        const O_WRONLY = 0b001;
        /// Open for reading and writing.
        const O_RDWR   = 0b010;
        /// Always append writes to the end of the file, ignoring any explicit position.
        const O_APPEND = 0b0001_0000;
        /// Create the file if it does not exist.
        const O_CREAT  = 0b0010_0000;
        /// Fail with `EEXIST` if used with `O_CREAT` and the file already exists.
        const O_EXCL   = 0b0100_0000;
        /// Truncate an existing regular file to zero length on open.
        const O_TRUNC  = 0b1000_0000;
        /// Synchronize file contents/metadata to the backend after every write.
        const O_SYNC   = 0b1_0000_0000;
    }
}

impl OpenFlags {
    /// The access-mode sub-field: `O_RDONLY`, `O_WRONLY`, or `O_RDWR`.
    pub fn acc_mode(self) -> OpenFlags {
        self & (OpenFlags::O_RDONLY | OpenFlags::O_WRONLY | OpenFlags::O_RDWR)
    }

    /// Whether this flag word permits reading.
    pub fn readable(self) -> bool {
        matches!(self.acc_mode(), OpenFlags::O_RDONLY | OpenFlags::O_RDWR)
    }

    /// Whether this flag word permits writing.
    pub fn writable(self) -> bool {
        matches!(self.acc_mode(), OpenFlags::O_WRONLY | OpenFlags::O_RDWR)
    }

    /// Parse one of the traditional flag-string aliases (`r`, `r+`, `rs`, `rs+`, `w`, `wx`,
    /// `w+`, `wx+`, `a`, `ax`, `a+`, `ax+`). Unknown strings raise `EINVAL`.
    pub fn from_alias(alias: &str) -> Result<OpenFlags, VfsError> {
        let flags = match alias {
            "r" => OpenFlags::O_RDONLY,
            "rs" => OpenFlags::O_RDONLY | OpenFlags::O_SYNC,
            "r+" => OpenFlags::O_RDWR,
            "rs+" => OpenFlags::O_RDWR | OpenFlags::O_SYNC,
            "w" => OpenFlags::O_WRONLY | OpenFlags::O_CREAT | OpenFlags::O_TRUNC,
            "wx" => OpenFlags::O_WRONLY | OpenFlags::O_CREAT | OpenFlags::O_TRUNC | OpenFlags::O_EXCL,
            "w+" => OpenFlags::O_RDWR | OpenFlags::O_CREAT | OpenFlags::O_TRUNC,
            "wx+" => {
                OpenFlags::O_RDWR | OpenFlags::O_CREAT | OpenFlags::O_TRUNC | OpenFlags::O_EXCL
            }
            "a" => OpenFlags::O_WRONLY | OpenFlags::O_CREAT | OpenFlags::O_APPEND,
            "ax" => OpenFlags::O_WRONLY | OpenFlags::O_CREAT | OpenFlags::O_APPEND | OpenFlags::O_EXCL,
            "a+" => OpenFlags::O_RDWR | OpenFlags::O_CREAT | OpenFlags::O_APPEND,
            "ax+" => OpenFlags::O_RDWR | OpenFlags::O_CREAT | OpenFlags::O_APPEND | OpenFlags::O_EXCL,
            _ => {
                return Err(VfsError::new(
                    ErrCode::Einval,
                    "open",
                    format!("unrecognized flag string {alias:?}"),
                ));
            }
        };
        Ok(flags)
    }
}

impl fmt::Display for OpenFlags {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

bitflags! {
    /// Flags for the [`access`](crate::vfs::Vfs::access) permission check.
    #[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
    pub struct AccessFlags: u32 {
        /// Test for existence only. Not really a flag, a constant zero.
        const F_OK = 0;
        /// Test for read permission.
        const R_OK = 4;
        /// Test for write permission.
        const W_OK = 2;
        /// Test for execute permission.
        const X_OK = 1;
    }
}

/// File-type mask applied to [`crate::inode::Inode::mode`].
pub const S_IFMT: u32 = 0o170000;
/// Regular file.
pub const S_IFREG: u32 = 0o100000;
/// Directory.
pub const S_IFDIR: u32 = 0o040000;
/// Symbolic link.
pub const S_IFLNK: u32 = 0o120000;
/// Character device.
pub const S_IFCHR: u32 = 0o020000;
/// Block device.
pub const S_IFBLK: u32 = 0o060000;
/// FIFO / named pipe.
pub const S_IFIFO: u32 = 0o010000;
/// Unix domain socket.
pub const S_IFSOCK: u32 = 0o140000;

/// Set-user-ID bit.
pub const S_ISUID: u32 = 0o4000;
/// Set-group-ID bit.
pub const S_ISGID: u32 = 0o2000;
/// Sticky bit.
pub const S_ISVTX: u32 = 0o1000;

bitflags! {
    /// Inode-level flags, settable through [`crate::ioctl`].
    #[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Default)]
    #[cfg_attr(feature = "serializable", derive(serde::Serialize, serde::Deserialize))]
    pub struct InodeFlags: u32 {
        /// The inode cannot be modified, renamed, or removed.
        const IMMUTABLE = 0x0000_0010;
        /// Writes may only append.
        const APPEND_ONLY = 0x0000_0020;
        /// Do not update `atime` on reads.
        const NO_ATIME = 0x0000_0080;
        /// Writes are synchronized immediately.
        const SYNC = 0x0000_0008;
    }
}

/// The POSIX file-type discriminant decoded out of `mode & S_IFMT`.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum FileType {
    /// Regular file.
    RegularFile,
    /// Directory.
    Directory,
    /// Symbolic link.
    Symlink,
    /// Character device.
    CharDevice,
    /// Block device.
    BlockDevice,
    /// Named pipe.
    NamedPipe,
    /// Unix domain socket.
    Socket,
}

impl FileType {
    /// Decode the file type out of a raw `mode` word. Returns `None` for an invalid/unset
    /// type nibble.
    pub fn from_mode(mode: u32) -> Option<FileType> {
        match mode & S_IFMT {
            S_IFREG => Some(FileType::RegularFile),
            S_IFDIR => Some(FileType::Directory),
            S_IFLNK => Some(FileType::Symlink),
            S_IFCHR => Some(FileType::CharDevice),
            S_IFBLK => Some(FileType::BlockDevice),
            S_IFIFO => Some(FileType::NamedPipe),
            S_IFSOCK => Some(FileType::Socket),
            _ => None,
        }
    }

    /// The file-type nibble this variant contributes to a `mode` word.
    pub fn to_mode_bits(self) -> u32 {
        match self {
            FileType::RegularFile => S_IFREG,
            FileType::Directory => S_IFDIR,
            FileType::Symlink => S_IFLNK,
            FileType::CharDevice => S_IFCHR,
            FileType::BlockDevice => S_IFBLK,
            FileType::NamedPipe => S_IFIFO,
            FileType::Socket => S_IFSOCK,
        }
    }

    /// `true` for [`FileType::Directory`].
    pub fn is_dir(self) -> bool {
        matches!(self, FileType::Directory)
    }

    /// `true` for [`FileType::RegularFile`].
    pub fn is_file(self) -> bool {
        matches!(self, FileType::RegularFile)
    }

    /// `true` for [`FileType::Symlink`].
    pub fn is_symlink(self) -> bool {
        matches!(self, FileType::Symlink)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alias_round_trip_covers_every_table_entry() {
        for alias in ["r", "r+", "rs", "rs+", "w", "wx", "w+", "wx+", "a", "ax", "a+", "ax+"] {
            assert!(OpenFlags::from_alias(alias).is_ok(), "{alias} should parse");
        }
    }

    #[test]
    fn unknown_alias_is_einval() {
        let err = OpenFlags::from_alias("bogus").unwrap_err();
        assert_eq!(err.code(), ErrCode::Einval);
    }

    #[test]
    fn append_flag_implies_writable() {
        let f = OpenFlags::from_alias("a").unwrap();
        assert!(f.writable());
        assert!(f.contains(OpenFlags::O_APPEND));
    }

    #[test]
    fn file_type_mode_round_trips() {
        for ft in [
            FileType::RegularFile,
            FileType::Directory,
            FileType::Symlink,
            FileType::CharDevice,
            FileType::BlockDevice,
            FileType::NamedPipe,
            FileType::Socket,
        ] {
            assert_eq!(FileType::from_mode(ft.to_mode_bits()), Some(ft));
        }
    }
}
