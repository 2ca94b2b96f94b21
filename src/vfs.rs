//! The VFS facade (component I): the user-facing surface every call enters through.
//!
//! Grounded in the teacher crate's own `Session`/`Request` dispatch core, which normalizes
//! one kernel request into a typed call against a `Filesystem` implementation and wraps the
//! reply; here the facade normalizes one user-facing call (path, flags, options) into a
//! typed call against the mount table and an open file handle, and wraps the error so the
//! caller sees the path they passed rather than the backend-relative one.

use std::sync::Arc;

use crate::config::VfsConfig;
use crate::error::{raise, ErrCode, Result};
use crate::fdtable::FdTable;
use crate::flags::{AccessFlags, OpenFlags, FileType, S_IFMT};
use crate::fs::devices::DeviceFs;
use crate::fs::{CreateOpts, Filesystem};
use crate::handle::FileHandle;
use crate::inode::StatsUpdate;
use crate::ioctl::{IoctlCommand, IoctlController, IoctlResponse};
use crate::mount::MountTable;
use crate::path;
use crate::stats::Stats;
use crate::watch::{SharedWatchRegistry, WatchEventKind, WatchHandle, WatchRegistry};

/// Options accepted by [`Vfs::mkdir`].
#[derive(Clone, Copy, Debug)]
pub struct MkdirOpts {
    /// Permission bits for any newly created directory.
    pub mode: u32,
    /// Owning uid for any newly created directory.
    pub uid: u32,
    /// Owning gid for any newly created directory.
    pub gid: u32,
    /// Create every missing intermediate segment instead of failing on the first one.
    pub recursive: bool,
}

impl Default for MkdirOpts {
    fn default() -> Self {
        MkdirOpts {
            mode: 0o755,
            uid: 0,
            gid: 0,
            recursive: false,
        }
    }
}

/// Options accepted by [`Vfs::readdir`].
#[derive(Clone, Copy, Debug, Default)]
pub struct ReaddirOpts {
    /// Recurse into subdirectories, flattening the whole subtree into one result.
    pub recursive: bool,
    /// Populate [`DirEntry::kind`] for each entry.
    pub with_file_types: bool,
}

/// One entry yielded by [`Vfs::readdir`].
#[derive(Clone, Debug)]
pub struct DirEntry {
    /// The directory this entry was found in, as passed by the caller.
    pub parent: String,
    /// The entry's own name, not including `parent`.
    pub name: String,
    /// Populated when `with_file_types` was set.
    pub kind: Option<FileType>,
}

/// Options accepted by [`Vfs::rm`].
#[derive(Clone, Copy, Debug, Default)]
pub struct RmOpts {
    /// Recurse into and remove directories instead of failing with `ENOTEMPTY`-style errors.
    pub recursive: bool,
    /// Swallow `ENOENT` instead of propagating it.
    pub force: bool,
}

/// Options accepted by [`Vfs::cp`].
#[derive(Clone, Default)]
pub struct CopyOpts {
    /// Recurse into directories instead of failing with `EISDIR`.
    pub recursive: bool,
    /// Fail with `EEXIST` instead of overwriting an existing destination.
    pub error_on_exist: bool,
    /// Copy `atime`/`mtime` from the source onto the destination after the payload copy.
    pub preserve_timestamps: bool,
    /// Follow symlinks at the source instead of recreating them at the destination.
    pub dereference: bool,
    /// Called with the source path before each entry is copied; returning `false` skips it
    /// (and, for a directory, everything under it).
    pub filter: Option<Arc<dyn Fn(&str) -> bool + Send + Sync>>,
}

impl std::fmt::Debug for CopyOpts {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CopyOpts")
            .field("recursive", &self.recursive)
            .field("error_on_exist", &self.error_on_exist)
            .field("preserve_timestamps", &self.preserve_timestamps)
            .field("dereference", &self.dereference)
            .field("has_filter", &self.filter.is_some())
            .finish()
    }
}

/// Options accepted by [`Vfs::glob`].
#[derive(Clone, Default)]
pub struct GlobOpts {
    /// Directory the pattern is resolved relative to. Defaults to `/`.
    pub cwd: Option<String>,
    /// Populate file-type information alongside each match (currently advisory only; see
    /// the glob-walk implementation for how it's derived).
    pub with_file_types: bool,
    /// Paths for which this returns `true` are skipped, along with their descendants.
    pub exclude: Option<Arc<dyn Fn(&str) -> bool + Send + Sync>>,
}

impl std::fmt::Debug for GlobOpts {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GlobOpts")
            .field("cwd", &self.cwd)
            .field("with_file_types", &self.with_file_types)
            .field("has_exclude", &self.exclude.is_some())
            .finish()
    }
}

/// The process-wide identity consulted by permission checks when `config.check_access` is
/// enabled. A single fixed identity, since this crate has no session/user concept of its
/// own — embedding applications that need per-caller identity run one `Vfs` per caller.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Identity {
    /// Effective uid consulted by owner-bit permission checks.
    pub uid: u32,
    /// Effective gid consulted by group-bit permission checks.
    pub gid: u32,
}

impl Default for Identity {
    fn default() -> Self {
        Identity { uid: 0, gid: 0 }
    }
}

/// The user-facing entry point: mount table, descriptor table, ioctl controller, and
/// watcher registry bundled behind normalization, symlink resolution, permission checks,
/// and error path substitution.
pub struct Vfs {
    mounts: MountTable,
    fds: FdTable,
    ioctl: IoctlController,
    watchers: SharedWatchRegistry,
    config: VfsConfig,
    identity: Identity,
}

impl std::fmt::Debug for Vfs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Vfs")
            .field("mounts", &self.mounts)
            .field("open_handles", &self.fds.len())
            .field("config", &self.config)
            .finish()
    }
}

impl Vfs {
    /// Build a facade over `root`, mounted at `/`. Mounts `/dev` automatically when
    /// `config.add_devices` is set.
    pub fn new(root: Arc<dyn Filesystem>, config: VfsConfig) -> Self {
        let mounts = MountTable::new(root);
        if config.add_devices {
            mounts.mount("/dev", Arc::new(DeviceFs::new()));
        }
        Vfs {
            mounts,
            fds: FdTable::new(),
            ioctl: IoctlController::new(),
            watchers: Arc::new(WatchRegistry::new()),
            config,
            identity: Identity::default(),
        }
    }

    /// Run as `identity` for permission-check purposes.
    pub fn with_identity(mut self, identity: Identity) -> Self {
        self.identity = identity;
        self
    }

    /// Mount `fs` at `prefix`.
    pub fn mount(&self, prefix: &str, fs: Arc<dyn Filesystem>) {
        self.mounts.mount(prefix, fs);
    }

    /// Unmount whatever is mounted at `prefix`.
    pub fn umount(&self, prefix: &str) -> Result<()> {
        self.mounts.umount(prefix)
    }

    /// Register a watcher for `change`/`rename` events at or under `scope`.
    pub fn watch(&self, scope: &str, callback: impl Fn(&crate::watch::WatchEvent) + Send + Sync + 'static) -> WatchHandle {
        self.watchers.register(scope, callback)
    }

    /// Unregister a previously registered watcher.
    pub fn unwatch(&self, handle: WatchHandle) {
        self.watchers.unregister(handle);
    }

    fn emit(&self, kind: WatchEventKind, path: &str) {
        if !self.watchers.is_empty() {
            self.watchers.emit(kind, path);
        }
    }

    // -- path resolution ---------------------------------------------------

    /// Resolve an existing path to its filesystem and internal path, chasing symlinks
    /// unless `preserve_symlinks` is set (the `lstat`-family case).
    fn resolve_existing(&self, path: &str, preserve_symlinks: bool) -> Result<(Arc<dyn Filesystem>, String, String)> {
        let canonical = self
            .mounts
            .realpath(path, preserve_symlinks)
            .map_err(|e| e.with_path(path))?;
        let (fs, within, prefix) = self.mounts.resolve_mount(&canonical);
        Ok((fs, within, prefix))
    }

    /// Resolve the parent directory of `path` (which must exist) and return the filesystem,
    /// the internal path of the not-yet-existing final component, the mount prefix, and the
    /// basename. Used by every creation entry point (`createFile` via `open`, `mkdir`,
    /// `symlink`, the `new` side of `rename`/`link`).
    fn resolve_parent(&self, path: &str) -> Result<(Arc<dyn Filesystem>, String, String)> {
        let normalized = path::normalize(path);
        let (parent, name) = path::split(&normalized);
        if name.is_empty() {
            return Err(raise::eexist("create", &normalized));
        }
        let canonical_parent = self.mounts.realpath(parent, false).map_err(|e| e.with_path(path))?;
        let (fs, within_parent, prefix) = self.mounts.resolve_mount(&canonical_parent);
        let within = path::join(&within_parent, name);
        Ok((fs, within, prefix))
    }

    fn check_access(&self, stats: &Stats, want: AccessFlags, syscall: &'static str, path: &str) -> Result<()> {
        if !self.config.check_access || self.identity.uid == 0 {
            return Ok(());
        }
        let applicable_bits = if stats.uid == self.identity.uid {
            (stats.perm >> 6) & 0o7
        } else if stats.gid == self.identity.gid {
            (stats.perm >> 3) & 0o7
        } else {
            stats.perm & 0o7
        };
        let want_bits = want.bits();
        if applicable_bits & want_bits == want_bits {
            Ok(())
        } else {
            Err(raise::eacces(syscall, path))
        }
    }

    // -- metadata ------------------------------------------------------------

    /// `stat`, following a trailing symlink.
    pub fn stat(&self, path: &str) -> Result<Stats> {
        let (fs, within, _prefix) = self.resolve_existing(path, false)?;
        fs.stat(&within).map_err(|e| e.with_path(path))
    }

    /// `lstat`: like [`Vfs::stat`] but does not follow a symlink named by `path` itself.
    pub fn lstat(&self, path: &str) -> Result<Stats> {
        let (fs, within, _prefix) = self.resolve_existing(path, true)?;
        fs.stat(&within).map_err(|e| e.with_path(path))
    }

    /// `true` iff `path` names an existing entry. Never raises.
    pub fn exists(&self, path: &str) -> bool {
        match self.resolve_existing(path, false) {
            Ok((fs, within, _)) => fs.exists(&within),
            Err(_) => false,
        }
    }

    /// Explicit POSIX-style access check against `mode`, regardless of
    /// `config.check_access` (that flag governs the *implicit* checks other entry points
    /// perform, not this one).
    pub fn access(&self, path: &str, mode: AccessFlags) -> Result<()> {
        let (fs, within, _) = self.resolve_existing(path, false)?;
        let stats = fs.stat(&within).map_err(|e| e.with_path(path))?;
        if self.identity.uid == 0 {
            return Ok(());
        }
        let applicable_bits = if stats.uid == self.identity.uid {
            (stats.perm >> 6) & 0o7
        } else if stats.gid == self.identity.gid {
            (stats.perm >> 3) & 0o7
        } else {
            stats.perm & 0o7
        };
        if applicable_bits & mode.bits() == mode.bits() {
            Ok(())
        } else {
            Err(raise::eacces("access", path))
        }
    }

    /// Canonicalize `path`, chasing every symlink (see [`MountTable::realpath`]).
    pub fn realpath(&self, path: &str) -> Result<String> {
        self.mounts.realpath(path, false).map_err(|e| e.with_path(path))
    }

    fn apply_update(&self, path: &str, update: StatsUpdate) -> Result<()> {
        let (fs, within, _) = self.resolve_existing(path, false)?;
        fs.touch(&within, update).map_err(|e| e.with_path(path))?;
        self.emit(WatchEventKind::Change, path);
        Ok(())
    }

    /// Change permission bits, preserving the file-type nibble, via the same handle-level
    /// logic `FileHandle::chmod` uses.
    pub fn chmod(&self, path: &str, perm: u32) -> Result<()> {
        let (fs, within, _) = self.resolve_existing(path, false)?;
        let handle = FileHandle::new(fs, within, OpenFlags::O_RDWR);
        handle.chmod(perm).map_err(|e| e.with_path(path))?;
        let _ = handle.close(true);
        self.emit(WatchEventKind::Change, path);
        Ok(())
    }

    /// Change ownership.
    pub fn chown(&self, path: &str, uid: Option<u32>, gid: Option<u32>) -> Result<()> {
        self.apply_update(
            path,
            StatsUpdate {
                uid,
                gid,
                ..Default::default()
            },
        )
    }

    /// Change access/modification times.
    pub fn utimes(&self, path: &str, atime_ms: Option<u64>, mtime_ms: Option<u64>) -> Result<()> {
        self.apply_update(
            path,
            StatsUpdate {
                atime_ms,
                mtime_ms,
                ..Default::default()
            },
        )
    }

    /// Resize the file at `path` to exactly `len` bytes.
    pub fn truncate(&self, path: &str, len: u64) -> Result<()> {
        let (fs, within, _) = self.resolve_existing(path, false)?;
        let handle = FileHandle::new(fs, within, OpenFlags::O_RDWR);
        handle.truncate(len).map_err(|e| e.with_path(path))?;
        let _ = handle.close(true);
        self.emit(WatchEventKind::Change, path);
        Ok(())
    }

    // -- open files -----------------------------------------------------------

    /// Open `path` with `flags`, creating or truncating per the flag word. Returns the new
    /// file descriptor.
    pub fn open(&self, path: &str, flags: OpenFlags, opts: CreateOpts) -> Result<u32> {
        let existing = self.resolve_existing(path, false);
        let (fs, within) = match existing {
            Ok((fs, within, _prefix)) => {
                if flags.contains(OpenFlags::O_CREAT) && flags.contains(OpenFlags::O_EXCL) {
                    return Err(raise::eexist("open", path));
                }
                let stats = fs.stat(&within).map_err(|e| e.with_path(path))?;
                let want = if flags.writable() {
                    AccessFlags::W_OK
                } else {
                    AccessFlags::R_OK
                };
                self.check_access(&stats, want, "open", path)?;
                if flags.contains(OpenFlags::O_TRUNC) && stats.kind == FileType::RegularFile {
                    fs.sync(&within, Some(&[]), None).map_err(|e| e.with_path(path))?;
                    self.emit(WatchEventKind::Change, path);
                }
                (fs, within)
            }
            Err(e) if e.code() == ErrCode::Enoent && flags.contains(OpenFlags::O_CREAT) => {
                let (fs, within, _prefix) = self.resolve_parent(path)?;
                fs.create_file(&within, opts).map_err(|e| e.with_path(path))?;
                self.emit(WatchEventKind::Rename, path);
                (fs, within)
            }
            Err(e) => return Err(e),
        };
        let handle = Arc::new(FileHandle::new(fs, within, flags));
        Ok(self.fds.to_fd(handle))
    }

    /// Close `fd`. `EBUSY` if dirty and not `force`; the descriptor stays open so the
    /// caller can retry with `force: true`.
    pub fn close(&self, fd: u32, force: bool) -> Result<()> {
        let handle = self.fds.from_fd(fd)?;
        handle.close(force)?;
        self.fds.delete_fd(fd)?;
        Ok(())
    }

    /// Read through `fd` into `buf`.
    pub fn read(&self, fd: u32, buf: &mut [u8]) -> Result<usize> {
        self.fds.from_fd(fd)?.read(buf)
    }

    /// Write `buf` through `fd`.
    pub fn write(&self, fd: u32, buf: &[u8]) -> Result<usize> {
        let handle = self.fds.from_fd(fd)?;
        let n = handle.write(buf)?;
        self.emit(WatchEventKind::Change, handle.path());
        Ok(n)
    }

    /// `fstat` through `fd`.
    pub fn fstat(&self, fd: u32) -> Result<Stats> {
        self.fds.from_fd(fd)?.stat()
    }

    // -- directory tree ---------------------------------------------------------

    /// Create a new, empty directory at `path`.
    pub fn mkdir(&self, path: &str, opts: MkdirOpts) -> Result<Stats> {
        if !opts.recursive {
            let (fs, within, _) = self.resolve_parent(path)?;
            let stats = fs
                .mkdir(
                    &within,
                    CreateOpts {
                        mode: opts.mode,
                        uid: opts.uid,
                        gid: opts.gid,
                    },
                )
                .map_err(|e| e.with_path(path))?;
            self.emit(WatchEventKind::Rename, path);
            return Ok(stats);
        }

        let normalized = path::normalize(path);
        let segments: Vec<&str> = normalized.trim_start_matches('/').split('/').filter(|s| !s.is_empty()).collect();
        let mut built = String::from("/");
        let mut last_stats = self.stat("/").ok();
        for segment in segments {
            built = path::join(&built, segment);
            if self.exists(&built) {
                last_stats = self.stat(&built).ok();
                continue;
            }
            let (parent_uid, parent_gid, mode) = match &last_stats {
                Some(parent) => {
                    let inherited_mode = opts.mode
                        | (parent.perm & (crate::flags::S_ISUID | crate::flags::S_ISGID) & !S_IFMT);
                    (parent.uid, parent.gid, inherited_mode)
                }
                None => (opts.uid, opts.gid, opts.mode),
            };
            let (fs, within, _) = self.resolve_parent(&built)?;
            let stats = fs
                .mkdir(
                    &within,
                    CreateOpts {
                        mode,
                        uid: parent_uid,
                        gid: parent_gid,
                    },
                )
                .map_err(|e| e.with_path(&built))?;
            self.emit(WatchEventKind::Rename, &built);
            last_stats = Some(stats);
        }
        self.stat(&normalized)
    }

    /// List the contents of the directory at `path`.
    pub fn readdir(&self, path: &str, opts: ReaddirOpts) -> Result<Vec<DirEntry>> {
        let (fs, within, _) = self.resolve_existing(path, false)?;
        let names = fs.readdir(&within).map_err(|e| e.with_path(path))?;
        let mut entries = Vec::new();
        for name in names {
            let child_path = path::join(path, &name);
            let kind = if opts.with_file_types || opts.recursive {
                let child_within = path::join(&within, &name);
                fs.stat(&child_within).ok().map(|s| s.kind)
            } else {
                None
            };
            if opts.recursive && kind == Some(FileType::Directory) {
                entries.extend(self.readdir(&child_path, opts)?);
            }
            entries.push(DirEntry {
                parent: path.to_string(),
                name,
                kind: if opts.with_file_types { kind } else { None },
            });
        }
        Ok(entries)
    }

    /// Create a hard link at `new` pointing at the same inode as `existing`.
    pub fn link(&self, existing: &str, new: &str) -> Result<()> {
        if !self.mounts.same_mount(existing, new) {
            return Err(raise::exdev("link", existing));
        }
        let (fs, within_existing, _) = self.resolve_existing(existing, true)?;
        let (_fs, within_new, _) = self.resolve_parent(new)?;
        fs.link(&within_existing, &within_new).map_err(|e| e.with_path(new))?;
        self.emit(WatchEventKind::Rename, new);
        Ok(())
    }

    /// Create a symbolic link at `link_path` whose target text is `target`.
    pub fn symlink(&self, target: &str, link_path: &str, opts: CreateOpts) -> Result<Stats> {
        let (fs, within, _) = self.resolve_parent(link_path)?;
        let stats = fs.symlink(target, &within, opts).map_err(|e| e.with_path(link_path))?;
        self.emit(WatchEventKind::Rename, link_path);
        Ok(stats)
    }

    /// Read the target text of the symlink at `path`.
    pub fn readlink(&self, path: &str) -> Result<String> {
        let (fs, within, _) = self.resolve_existing(path, true)?;
        fs.readlink(&within).map_err(|e| e.with_path(path))
    }

    /// Move `old` to `new`. `EXDEV` if they are on different mounts.
    pub fn rename(&self, old: &str, new: &str) -> Result<()> {
        if !self.mounts.same_mount(old, new) {
            return Err(raise::exdev("rename", old));
        }
        let (fs, within_old, _) = self.resolve_existing(old, true)?;
        let (_fs, within_new, _) = self.resolve_parent(new)?;
        fs.rename(&within_old, &within_new).map_err(|e| e.with_path(old))?;
        self.emit(WatchEventKind::Rename, old);
        self.emit(WatchEventKind::Rename, new);
        Ok(())
    }

    /// Remove a single directory entry (`EISDIR` if `path` names a directory).
    pub fn unlink(&self, path: &str) -> Result<()> {
        let (fs, within, _) = self.resolve_existing(path, true)?;
        fs.unlink(&within).map_err(|e| e.with_path(path))?;
        self.emit(WatchEventKind::Rename, path);
        Ok(())
    }

    /// Remove the empty directory at `path`.
    pub fn rmdir(&self, path: &str) -> Result<()> {
        let (fs, within, _) = self.resolve_existing(path, true)?;
        fs.rmdir(&within).map_err(|e| e.with_path(path))?;
        self.emit(WatchEventKind::Rename, path);
        Ok(())
    }

    /// Recursively remove `path`: unlinks files/symlinks/devices, recurses into and then
    /// removes directories. `opts.force` swallows `ENOENT`.
    pub fn rm(&self, path: &str, opts: RmOpts) -> Result<()> {
        let stats = match self.lstat(path) {
            Ok(stats) => stats,
            Err(e) if e.code() == ErrCode::Enoent && opts.force => return Ok(()),
            Err(e) => return Err(e),
        };
        let result = match stats.kind {
            FileType::Directory => {
                if opts.recursive {
                    let entries = self.readdir(path, ReaddirOpts::default())?;
                    for entry in entries {
                        let child = path::join(path, &entry.name);
                        self.rm(&child, opts)?;
                    }
                }
                self.rmdir(path)
            }
            _ => self.unlink(path),
        };
        match result {
            Err(e) if e.code() == ErrCode::Enoent && opts.force => Ok(()),
            other => other,
        }
    }

    /// Copy `src` to `dst`. Directories are copied recursively when `opts.recursive` is
    /// set; `opts.filter` (if present) is consulted before every descent.
    pub fn cp(&self, src: &str, dst: &str, opts: &CopyOpts) -> Result<()> {
        if let Some(filter) = &opts.filter {
            if !filter(src) {
                return Ok(());
            }
        }
        let stats = if opts.dereference {
            self.stat(src)?
        } else {
            self.lstat(src)?
        };
        if opts.error_on_exist && self.exists(dst) {
            return Err(raise::eexist("cp", dst));
        }

        match stats.kind {
            FileType::Directory => {
                if !opts.recursive {
                    return Err(raise::eisdir("cp", src));
                }
                if !self.exists(dst) {
                    self.mkdir(
                        dst,
                        MkdirOpts {
                            mode: stats.perm,
                            uid: stats.uid,
                            gid: stats.gid,
                            recursive: true,
                        },
                    )?;
                }
                for entry in self.readdir(src, ReaddirOpts::default())? {
                    let child_src = path::join(src, &entry.name);
                    let child_dst = path::join(dst, &entry.name);
                    self.cp(&child_src, &child_dst, opts)?;
                }
            }
            FileType::Symlink if !opts.dereference => {
                let target = self.readlink(src)?;
                self.symlink(
                    &target,
                    dst,
                    CreateOpts {
                        mode: stats.perm,
                        uid: stats.uid,
                        gid: stats.gid,
                    },
                )?;
            }
            _ => {
                let mut buf = vec![0u8; stats.size as usize];
                let src_fd = self.open(src, OpenFlags::O_RDONLY, CreateOpts::default())?;
                let n = self.read(src_fd, &mut buf)?;
                buf.truncate(n);
                self.close(src_fd, true)?;

                let dst_fd = self.open(
                    dst,
                    OpenFlags::O_WRONLY | OpenFlags::O_CREAT | OpenFlags::O_TRUNC,
                    CreateOpts {
                        mode: stats.perm,
                        uid: stats.uid,
                        gid: stats.gid,
                    },
                )?;
                self.write(dst_fd, &buf)?;
                self.close(dst_fd, true)?;
            }
        }

        if opts.preserve_timestamps {
            self.utimes(dst, Some(stats.atime_ms), Some(stats.mtime_ms))?;
        }
        Ok(())
    }

    /// Match `pattern` (glob syntax: `**`, `*`, `?`) against every entry reachable from
    /// `opts.cwd` (default `/`), returning matching paths.
    pub fn glob(&self, pattern: &str, opts: &GlobOpts) -> Result<Vec<DirEntry>> {
        let cwd = opts.cwd.clone().unwrap_or_else(|| "/".to_string());
        let full_pattern = if pattern.starts_with('/') {
            pattern.to_string()
        } else {
            path::join(&cwd, pattern)
        };
        let mut matches = Vec::new();
        self.glob_walk(&cwd, &full_pattern, opts, &mut matches)?;
        matches.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(matches)
    }

    fn glob_walk(&self, dir: &str, pattern: &str, opts: &GlobOpts, out: &mut Vec<DirEntry>) -> Result<()> {
        if let Some(exclude) = &opts.exclude {
            if exclude(dir) {
                return Ok(());
            }
        }
        let entries = match self.readdir(dir, ReaddirOpts::default()) {
            Ok(entries) => entries,
            Err(_) => return Ok(()),
        };
        for entry in entries {
            let child = path::join(dir, &entry.name);
            if let Some(exclude) = &opts.exclude {
                if exclude(&child) {
                    continue;
                }
            }
            let is_dir = self.stat(&child).map(|s| s.is_dir()).unwrap_or(false);
            if glob_match(pattern, &child) {
                let kind = if opts.with_file_types {
                    self.stat(&child).ok().map(|s| s.kind)
                } else {
                    None
                };
                out.push(DirEntry {
                    parent: path::dirname(&child).to_string(),
                    name: path::basename(&child).to_string(),
                    kind,
                });
            }
            if is_dir {
                self.glob_walk(&child, pattern, opts, out)?;
            }
        }
        Ok(())
    }

    // -- ioctl ---------------------------------------------------------------

    /// Dispatch `command` against `path`.
    pub fn ioctl(&self, path: &str, command: IoctlCommand) -> Result<IoctlResponse> {
        let (fs, within, _) = self.resolve_existing(path, false)?;
        self.ioctl.ioctl(fs.as_ref(), &within, command).map_err(|e| e.with_path(path))
    }
}

/// Translate and match a glob `pattern` against `text`: `**` matches any sequence
/// (including `/`), `*` matches any sequence excluding `/`, `?` matches exactly one
/// character, everything else must match literally.
fn glob_match(pattern: &str, text: &str) -> bool {
    let tokens = glob_tokens(pattern);
    glob_match_tokens(&tokens, text.as_bytes())
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum GlobToken {
    Literal(u8),
    AnyChar,
    AnySegment,
    AnyMulti,
}

fn glob_tokens(pattern: &str) -> Vec<GlobToken> {
    let bytes = pattern.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'*' if bytes.get(i + 1) == Some(&b'*') => {
                tokens.push(GlobToken::AnyMulti);
                i += 2;
            }
            b'*' => {
                tokens.push(GlobToken::AnySegment);
                i += 1;
            }
            b'?' => {
                tokens.push(GlobToken::AnyChar);
                i += 1;
            }
            other => {
                tokens.push(GlobToken::Literal(other));
                i += 1;
            }
        }
    }
    tokens
}

fn glob_match_tokens(tokens: &[GlobToken], text: &[u8]) -> bool {
    match tokens.split_first() {
        None => text.is_empty(),
        Some((GlobToken::Literal(b), rest)) => {
            !text.is_empty() && text[0] == *b && glob_match_tokens(rest, &text[1..])
        }
        Some((GlobToken::AnyChar, rest)) => !text.is_empty() && glob_match_tokens(rest, &text[1..]),
        Some((GlobToken::AnySegment, rest)) => {
            for split in 0..=text.len() {
                if text[..split].contains(&b'/') {
                    break;
                }
                if glob_match_tokens(rest, &text[split..]) {
                    return true;
                }
            }
            false
        }
        Some((GlobToken::AnyMulti, rest)) => {
            for split in 0..=text.len() {
                if glob_match_tokens(rest, &text[split..]) {
                    return true;
                }
            }
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::engine::StoreEngine;
    use crate::store::MemoryStore;

    fn vfs() -> Vfs {
        let root: Arc<dyn Filesystem> = Arc::new(StoreEngine::new(MemoryStore::new(), "root"));
        Vfs::new(root, VfsConfig::default())
    }

    #[test]
    fn write_then_read_round_trips_through_open() {
        let v = vfs();
        let fd = v
            .open("/f", OpenFlags::O_WRONLY | OpenFlags::O_CREAT, CreateOpts::default())
            .unwrap();
        v.write(fd, b"hello").unwrap();
        v.close(fd, false).unwrap();

        let fd = v.open("/f", OpenFlags::O_RDONLY, CreateOpts::default()).unwrap();
        let mut buf = [0u8; 5];
        let n = v.read(fd, &mut buf).unwrap();
        assert_eq!(&buf[..n], b"hello");
    }

    #[test]
    fn recursive_mkdir_creates_every_missing_segment() {
        let v = vfs();
        v.mkdir("/a/b/c", MkdirOpts { recursive: true, ..Default::default() }).unwrap();
        assert!(v.exists("/a"));
        assert!(v.exists("/a/b"));
        assert!(v.stat("/a/b/c").unwrap().is_dir());
    }

    #[test]
    fn rename_across_mounts_is_exdev() {
        let v = vfs();
        let other: Arc<dyn Filesystem> = Arc::new(StoreEngine::new(MemoryStore::new(), "other"));
        v.mount("/mnt", other);
        v.open("/a", OpenFlags::O_WRONLY | OpenFlags::O_CREAT, CreateOpts::default())
            .and_then(|fd| v.close(fd, false))
            .unwrap();
        let err = v.rename("/a", "/mnt/a").unwrap_err();
        assert_eq!(err.code(), ErrCode::Exdev);
    }

    #[test]
    fn rm_force_swallows_missing_path() {
        let v = vfs();
        assert!(v.rm("/nope", RmOpts { force: true, ..Default::default() }).is_ok());
        assert!(v.rm("/nope", RmOpts::default()).is_err());
    }

    #[test]
    fn recursive_rm_removes_a_populated_directory() {
        let v = vfs();
        v.mkdir("/d", MkdirOpts::default()).unwrap();
        v.open("/d/f", OpenFlags::O_WRONLY | OpenFlags::O_CREAT, CreateOpts::default())
            .and_then(|fd| v.close(fd, false))
            .unwrap();
        v.rm("/d", RmOpts { recursive: true, ..Default::default() }).unwrap();
        assert!(!v.exists("/d"));
    }

    #[test]
    fn cp_copies_file_contents() {
        let v = vfs();
        let fd = v
            .open("/src", OpenFlags::O_WRONLY | OpenFlags::O_CREAT, CreateOpts::default())
            .unwrap();
        v.write(fd, b"payload").unwrap();
        v.close(fd, false).unwrap();

        v.cp("/src", "/dst", &CopyOpts::default()).unwrap();
        let fd = v.open("/dst", OpenFlags::O_RDONLY, CreateOpts::default()).unwrap();
        let mut buf = [0u8; 7];
        v.read(fd, &mut buf).unwrap();
        assert_eq!(&buf, b"payload");
    }

    #[test]
    fn glob_matches_star_within_one_segment() {
        let v = vfs();
        v.mkdir("/data", MkdirOpts::default()).unwrap();
        v.open("/data/a.txt", OpenFlags::O_WRONLY | OpenFlags::O_CREAT, CreateOpts::default())
            .and_then(|fd| v.close(fd, false))
            .unwrap();
        v.open("/data/b.log", OpenFlags::O_WRONLY | OpenFlags::O_CREAT, CreateOpts::default())
            .and_then(|fd| v.close(fd, false))
            .unwrap();

        let matches = v.glob("/data/*.txt", &GlobOpts::default()).unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].parent, "/data");
        assert_eq!(matches[0].name, "a.txt");
    }

    #[test]
    fn glob_double_star_crosses_directories() {
        let v = vfs();
        v.mkdir("/data/nested", MkdirOpts { recursive: true, ..Default::default() }).unwrap();
        v.open("/data/nested/f.txt", OpenFlags::O_WRONLY | OpenFlags::O_CREAT, CreateOpts::default())
            .and_then(|fd| v.close(fd, false))
            .unwrap();

        let matches = v.glob("/data/**/*.txt", &GlobOpts::default()).unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].parent, "/data/nested");
        assert_eq!(matches[0].name, "f.txt");
    }

    #[test]
    fn device_nodes_are_mounted_when_requested() {
        let root: Arc<dyn Filesystem> = Arc::new(StoreEngine::new(MemoryStore::new(), "root"));
        let config = VfsConfig {
            add_devices: true,
            ..VfsConfig::default()
        };
        let v = Vfs::new(root, config);
        assert!(v.exists("/dev/null"));
    }

    #[test]
    fn check_access_denies_non_owner_without_permission() {
        let root: Arc<dyn Filesystem> = Arc::new(StoreEngine::new(MemoryStore::new(), "root"));
        let config = VfsConfig {
            check_access: true,
            ..VfsConfig::default()
        };
        let v = Vfs::new(root, config).with_identity(Identity { uid: 1, gid: 1 });
        let fd = v
            .open(
                "/f",
                OpenFlags::O_WRONLY | OpenFlags::O_CREAT,
                CreateOpts {
                    mode: 0o600,
                    uid: 0,
                    gid: 0,
                },
            )
            .unwrap();
        v.close(fd, false).unwrap();
        let err = v.open("/f", OpenFlags::O_WRONLY, CreateOpts::default()).unwrap_err();
        assert_eq!(err.code(), ErrCode::Eacces);
    }
}
