//! The ioctl-style control path (component J): a single `ioctl(path, command, ...)` entry
//! point over a fixed, `FS_IOC_*`-derived command table.
//!
//! Grounded in the teacher crate's `ll::ioctl` module, which defines FUSE-side ioctl command
//! constants the same way — a small fixed magic/command table dispatched by command number —
//! generalized here to the Linux `FS_IOC_*` table this system names instead of the
//! FUSE-device table the teacher encodes.

use std::collections::HashMap;

use parking_lot::Mutex;
use rand::RngCore;

use crate::error::Result;
use crate::flags::InodeFlags;
use crate::fs::Filesystem;
use crate::inode::StatsUpdate;

/// One of the commands in the fixed `FS_IOC_*`-derived table this system supports.
#[derive(Clone, Debug)]
pub enum IoctlCommand {
    /// `FS_IOC_GETFLAGS`.
    GetFlags,
    /// `FS_IOC_SETFLAGS`.
    SetFlags(InodeFlags),
    /// `FS_IOC32_GETVERSION`.
    GetVersion,
    /// `FS_IOC32_SETVERSION`.
    SetVersion(u32),
    /// Get a fixed-layout extended-attribute view derived from inode state.
    GetXattr,
    /// Set an extended attribute. The lifetime of xattr writes is unspecified upstream; this
    /// implementation treats it as a no-op (see `DESIGN.md`).
    SetXattr(Vec<u8>),
    /// Get the filesystem label.
    GetLabel,
    /// Set the filesystem label.
    SetLabel(String),
    /// Get the filesystem UUID, generated on first access and stable thereafter.
    GetUuid,
    /// Get the synthesized sysfs path, `/sys/fs/{name}/{uuid}`.
    GetSysfsPath,
}

/// A fixed-layout extended-attribute snapshot, derived from inode state rather than backed
/// by separate storage (no backend here has a real xattr store).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct XattrView {
    pub size: u64,
    pub mode: u32,
    pub flags: InodeFlags,
    pub version: u32,
}

/// The result of one [`IoctlCommand`].
#[derive(Clone, Debug)]
pub enum IoctlResponse {
    Flags(InodeFlags),
    Version(u32),
    Xattr(XattrView),
    Label(String),
    Uuid(String),
    SysfsPath(String),
    Ack,
}

#[derive(Clone)]
struct FsMeta {
    uuid: String,
    label: String,
}

fn generate_uuid() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    // RFC 4122-shaped, though this crate makes no claim to cryptographic version/variant
    // correctness — it only needs to be stable and look like a UUID in the synthesized path.
    format!(
        "{:02x}{:02x}{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}{:02x}{:02x}{:02x}{:02x}",
        bytes[0], bytes[1], bytes[2], bytes[3],
        bytes[4], bytes[5],
        bytes[6], bytes[7],
        bytes[8], bytes[9],
        bytes[10], bytes[11], bytes[12], bytes[13], bytes[14], bytes[15],
    )
}

/// Owns the per-filesystem metadata (`uuid`, `label`) that `ioctl` exposes, since neither
/// lives in the per-inode record. Keyed by [`Filesystem::name`].
#[derive(Default)]
pub struct IoctlController {
    registry: Mutex<HashMap<String, FsMeta>>,
}

impl std::fmt::Debug for IoctlController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IoctlController")
            .field("known_filesystems", &self.registry.lock().len())
            .finish()
    }
}

impl IoctlController {
    pub fn new() -> Self {
        IoctlController::default()
    }

    fn meta_for(&self, fs_name: &str) -> FsMeta {
        let mut registry = self.registry.lock();
        registry
            .entry(fs_name.to_string())
            .or_insert_with(|| FsMeta {
                uuid: generate_uuid(),
                label: String::new(),
            })
            .clone()
    }

    /// Dispatch `command` against `path` on `fs`. Unsupported commands never occur here since
    /// every [`IoctlCommand`] variant is handled — the `ENOTSUP` path exists for parity with
    /// the upstream table, which names commands this implementation does not model (e.g.
    /// resize/defrag ioctls) and would reject the same way.
    pub fn ioctl(&self, fs: &dyn Filesystem, path: &str, command: IoctlCommand) -> Result<IoctlResponse> {
        match command {
            IoctlCommand::GetFlags => {
                let stats = fs.stat(path)?;
                Ok(IoctlResponse::Flags(stats.flags))
            }
            IoctlCommand::SetFlags(flags) => {
                fs.touch(
                    path,
                    StatsUpdate {
                        flags: Some(flags),
                        ..Default::default()
                    },
                )?;
                Ok(IoctlResponse::Ack)
            }
            IoctlCommand::GetVersion => {
                let stats = fs.stat(path)?;
                Ok(IoctlResponse::Version(stats.version))
            }
            IoctlCommand::SetVersion(version) => {
                fs.touch(
                    path,
                    StatsUpdate {
                        version: Some(version),
                        ..Default::default()
                    },
                )?;
                Ok(IoctlResponse::Ack)
            }
            IoctlCommand::GetXattr => {
                let stats = fs.stat(path)?;
                Ok(IoctlResponse::Xattr(XattrView {
                    size: stats.size,
                    mode: stats.perm,
                    flags: stats.flags,
                    version: stats.version,
                }))
            }
            IoctlCommand::SetXattr(_) => Ok(IoctlResponse::Ack),
            IoctlCommand::GetLabel => {
                fs.stat(path)?;
                Ok(IoctlResponse::Label(self.meta_for(fs.name()).label))
            }
            IoctlCommand::SetLabel(label) => {
                fs.stat(path)?;
                let mut registry = self.registry.lock();
                let entry = registry.entry(fs.name().to_string()).or_insert_with(|| FsMeta {
                    uuid: generate_uuid(),
                    label: String::new(),
                });
                entry.label = label;
                Ok(IoctlResponse::Ack)
            }
            IoctlCommand::GetUuid => {
                fs.stat(path)?;
                Ok(IoctlResponse::Uuid(self.meta_for(fs.name()).uuid))
            }
            IoctlCommand::GetSysfsPath => {
                fs.stat(path)?;
                let meta = self.meta_for(fs.name());
                Ok(IoctlResponse::SysfsPath(format!("/sys/fs/{}/{}", fs.name(), meta.uuid)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::engine::StoreEngine;
    use crate::fs::CreateOpts;
    use crate::store::MemoryStore;

    #[test]
    fn get_set_flags_round_trip() {
        let fs = StoreEngine::new(MemoryStore::new(), "memfs");
        fs.create_file("/f", CreateOpts::default()).unwrap();
        let controller = IoctlController::new();
        controller
            .ioctl(&fs, "/f", IoctlCommand::SetFlags(InodeFlags::IMMUTABLE))
            .unwrap();
        let response = controller.ioctl(&fs, "/f", IoctlCommand::GetFlags).unwrap();
        match response {
            IoctlResponse::Flags(flags) => assert!(flags.contains(InodeFlags::IMMUTABLE)),
            other => panic!("unexpected response {other:?}"),
        }
    }

    #[test]
    fn uuid_is_stable_across_calls() {
        let fs = StoreEngine::new(MemoryStore::new(), "memfs");
        fs.create_file("/f", CreateOpts::default()).unwrap();
        let controller = IoctlController::new();
        let IoctlResponse::Uuid(first) = controller.ioctl(&fs, "/f", IoctlCommand::GetUuid).unwrap() else {
            panic!("expected Uuid response");
        };
        let IoctlResponse::Uuid(second) = controller.ioctl(&fs, "/f", IoctlCommand::GetUuid).unwrap() else {
            panic!("expected Uuid response");
        };
        assert_eq!(first, second);
    }

    #[test]
    fn set_label_then_get_label_round_trips() {
        let fs = StoreEngine::new(MemoryStore::new(), "memfs");
        fs.create_file("/f", CreateOpts::default()).unwrap();
        let controller = IoctlController::new();
        controller
            .ioctl(&fs, "/f", IoctlCommand::SetLabel("backup".to_string()))
            .unwrap();
        let IoctlResponse::Label(label) = controller.ioctl(&fs, "/f", IoctlCommand::GetLabel).unwrap() else {
            panic!("expected Label response");
        };
        assert_eq!(label, "backup");
    }

    #[test]
    fn set_xattr_is_a_no_op_ack() {
        let fs = StoreEngine::new(MemoryStore::new(), "memfs");
        fs.create_file("/f", CreateOpts::default()).unwrap();
        let controller = IoctlController::new();
        let response = controller
            .ioctl(&fs, "/f", IoctlCommand::SetXattr(b"anything".to_vec()))
            .unwrap();
        assert!(matches!(response, IoctlResponse::Ack));
    }

    #[test]
    fn sysfs_path_embeds_name_and_uuid() {
        let fs = StoreEngine::new(MemoryStore::new(), "memfs");
        fs.create_file("/f", CreateOpts::default()).unwrap();
        let controller = IoctlController::new();
        let IoctlResponse::SysfsPath(path) = controller.ioctl(&fs, "/f", IoctlCommand::GetSysfsPath).unwrap() else {
            panic!("expected SysfsPath response");
        };
        assert!(path.starts_with("/sys/fs/memfs/"));
    }
}
