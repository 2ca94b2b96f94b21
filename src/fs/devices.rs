//! The built-in device-node backend, mounted at `/dev` when `VfsConfig::add_devices` is set.
//!
//! A tiny, fixed-membership filesystem: four character devices (`null`, `zero`, `full`,
//! `random`) with well-known POSIX semantics and no backing store, in the spirit of the
//! teacher crate's own small single-purpose `Filesystem` impls used in its test fixtures.
//! The directory structure itself is immutable — only `read`/`write` on the four existing
//! device files do anything.

use rand::RngCore;

use crate::error::{raise, Result};
use crate::flags::S_IFCHR;
use crate::fs::{CreateOpts, FsAttributes, Filesystem};
use crate::inode::{Inode, StatsUpdate};
use crate::stats::Stats;

const DEVICE_NAMES: [&str; 4] = ["null", "zero", "full", "random"];

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum Device {
    Null,
    Zero,
    Full,
    Random,
}

impl Device {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "null" => Some(Device::Null),
            "zero" => Some(Device::Zero),
            "full" => Some(Device::Full),
            "random" => Some(Device::Random),
            _ => None,
        }
    }

    /// A fixed, stable ino per device so `stat` is consistent across calls. Chosen well
    /// clear of [`crate::inode::ROOT_INO`] and the random 64-bit range the engine allocates
    /// into, since this backend never shares a store with an engine instance.
    fn ino(self) -> u64 {
        match self {
            Device::Null => 10,
            Device::Zero => 11,
            Device::Full => 12,
            Device::Random => 13,
        }
    }
}

/// The `/dev` backend. Stateless aside from the fixed device table.
#[derive(Debug, Default)]
pub struct DeviceFs;

impl DeviceFs {
    pub fn new() -> Self {
        DeviceFs
    }

    fn device_stat(device: Device) -> Stats {
        let inode = Inode::new(0o666 | S_IFCHR);
        // Overwrite the random ino `Inode::new` picked with this device's stable one; the
        // ino field is the first 8 bytes of the little-endian header (see `RawInode`).
        let mut raw = inode.to_bytes();
        raw[0..8].copy_from_slice(&device.ino().to_le_bytes());
        let inode = Inode::from_bytes(&raw).expect("round trip of a freshly built inode");
        Stats::from_inode(&inode)
    }

    fn root_stat() -> Stats {
        let inode = Inode::new_root();
        Stats::from_inode(&inode)
    }
}

impl Filesystem for DeviceFs {
    fn name(&self) -> &str {
        "devfs"
    }

    fn attributes(&self) -> FsAttributes {
        FsAttributes::empty()
    }

    fn rename(&self, old: &str, _new: &str) -> Result<()> {
        Err(raise::erofs("rename", old))
    }

    fn stat(&self, path: &str) -> Result<Stats> {
        let normalized = crate::path::normalize(path);
        if normalized == "/" {
            return Ok(Self::root_stat());
        }
        let name = crate::path::basename(&normalized);
        match Device::from_name(name) {
            Some(device) => Ok(Self::device_stat(device)),
            None => Err(raise::enoent("stat", path)),
        }
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
        let normalized = crate::path::normalize(path);
        if normalized != "/" {
            return Err(raise::enotdir("readdir", path));
        }
        Ok(DEVICE_NAMES.iter().map(|s| s.to_string()).collect())
    }

    fn exists(&self, path: &str) -> bool {
        self.stat(path).is_ok()
    }

    fn link(&self, existing: &str, _new: &str) -> Result<()> {
        Err(raise::erofs("link", existing))
    }

    fn symlink(&self, _target: &str, link_path: &str, _opts: CreateOpts) -> Result<Stats> {
        Err(raise::erofs("symlink", link_path))
    }

    fn readlink(&self, path: &str) -> Result<String> {
        Err(raise::einval("readlink", "device nodes are not symbolic links")).map_err(|e| e.with_path(path))
    }

    fn sync(&self, path: &str, _data: Option<&[u8]>, _update: Option<StatsUpdate>) -> Result<()> {
        Err(raise::erofs("sync", path))
    }

    fn read(&self, path: &str, buf: &mut [u8], _offset: u64) -> Result<usize> {
        let device = self.device_at(path, "read")?;
        match device {
            Device::Null => Ok(0),
            Device::Zero | Device::Full => {
                buf.fill(0);
                Ok(buf.len())
            }
            Device::Random => {
                rand::thread_rng().fill_bytes(buf);
                Ok(buf.len())
            }
        }
    }

    fn write(&self, path: &str, buf: &[u8], _offset: u64) -> Result<usize> {
        let device = self.device_at(path, "write")?;
        match device {
            Device::Null | Device::Zero | Device::Random => Ok(buf.len()),
            Device::Full => Err(raise::enospc("write")).map_err(|e| e.with_path(path)),
        }
    }
}

impl DeviceFs {
    fn device_at(&self, path: &str, syscall: &'static str) -> Result<Device> {
        let normalized = crate::path::normalize(path);
        let name = crate::path::basename(&normalized);
        Device::from_name(name).ok_or_else(|| raise::enoent(syscall, path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_stat_reports_char_device() {
        let fs = DeviceFs::new();
        let stats = fs.stat("/null").unwrap();
        assert_eq!(stats.kind, crate::flags::FileType::CharDevice);
    }

    #[test]
    fn zero_fills_a_nonzero_buffer_with_zero_bytes() {
        let fs = DeviceFs::new();
        let mut buf = [0xffu8; 16];
        let n = fs.read("/zero", &mut buf, 0).unwrap();
        assert_eq!(n, 16);
        assert!(buf.iter().all(|&b| b == 0));
    }

    #[test]
    fn full_raises_enospc_on_write() {
        let fs = DeviceFs::new();
        let err = fs.write("/full", b"x", 0).unwrap_err();
        assert_eq!(err.code(), crate::error::ErrCode::Enospc);
    }

    #[test]
    fn null_read_is_always_empty() {
        let fs = DeviceFs::new();
        let mut buf = [0xffu8; 8];
        let n = fs.read("/null", &mut buf, 0).unwrap();
        assert_eq!(n, 0);
    }

    #[test]
    fn readdir_lists_the_fixed_device_set() {
        let fs = DeviceFs::new();
        let mut names = fs.readdir("/").unwrap();
        names.sort();
        assert_eq!(names, vec!["full", "null", "random", "zero"]);
    }
}
