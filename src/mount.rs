//! The mount table and path resolution pipeline (component D).
//!
//! An ordered-by-specificity map from absolute path prefix to filesystem instance. Longest-
//! prefix match resolves a path to the filesystem that owns it, the path within that
//! filesystem, and the mount prefix itself — the facade (component I) uses the prefix to
//! detect cross-mount `rename`/`link` attempts.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::{raise, Result};
use crate::fs::Filesystem;
use crate::path;

/// Symlink hops `realpath` will chase before concluding the chain cycles.
const MAX_SYMLINK_HOPS: u32 = 40;

/// `mount(prefix, fs)` / `umount(prefix)` / `resolveMount` / `realpath`, per §4.D.
pub struct MountTable {
    mounts: RwLock<HashMap<String, Arc<dyn Filesystem>>>,
}

impl std::fmt::Debug for MountTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mounts = self.mounts.read();
        f.debug_struct("MountTable")
            .field("prefixes", &mounts.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl MountTable {
    /// Build a mount table with `root` mounted at `/`. The root mount can never be removed.
    pub fn new(root: Arc<dyn Filesystem>) -> Self {
        let mut mounts = HashMap::new();
        mounts.insert("/".to_string(), root);
        MountTable {
            mounts: RwLock::new(mounts),
        }
    }

    /// Mount `fs` at `prefix`, replacing any filesystem already mounted there.
    pub fn mount(&self, prefix: &str, fs: Arc<dyn Filesystem>) {
        let normalized = path::normalize(prefix);
        log::info!("mounting {:?} at {normalized}", fs.name());
        self.mounts.write().insert(normalized, fs);
    }

    /// Remove the filesystem mounted at `prefix`. Raises `EPERM` for `/` and `ENOENT` if
    /// nothing is mounted there.
    ///
    /// Per §5, mounting/unmounting while operations are in flight against the affected
    /// filesystem is the caller's responsibility to avoid (e.g. by only changing mounts
    /// during a configuration phase) — this implementation does not add a table-wide lock
    /// held across every filesystem call to prevent it.
    pub fn umount(&self, prefix: &str) -> Result<()> {
        let normalized = path::normalize(prefix);
        if normalized == "/" {
            return Err(raise::eperm("umount", "/"));
        }
        let mut mounts = self.mounts.write();
        if mounts.remove(&normalized).is_none() {
            return Err(raise::enoent("umount", normalized));
        }
        log::info!("unmounted {normalized}");
        Ok(())
    }

    /// Resolve `path` to `(filesystem, path_within_filesystem, mount_prefix)` via longest-
    /// prefix match. Always succeeds: the root mount matches everything.
    pub fn resolve_mount(&self, path: &str) -> (Arc<dyn Filesystem>, String, String) {
        let normalized = path::normalize(path);
        let mounts = self.mounts.read();
        let mut best: Option<(&str, &Arc<dyn Filesystem>)> = None;
        for (prefix, fs) in mounts.iter() {
            if Self::is_under(prefix, &normalized)
                && best.is_none_or(|(best_prefix, _)| prefix.len() > best_prefix.len())
            {
                best = Some((prefix.as_str(), fs));
            }
        }
        let (prefix, fs) = best.expect("the root mount at \"/\" matches every path");
        let within = if prefix == "/" {
            normalized.clone()
        } else {
            let stripped = &normalized[prefix.len()..];
            if stripped.is_empty() {
                "/".to_string()
            } else {
                stripped.to_string()
            }
        };
        (fs.clone(), within, prefix.to_string())
    }

    /// `true` iff `a` and `b` resolve to the same mount prefix.
    pub fn same_mount(&self, a: &str, b: &str) -> bool {
        self.resolve_mount(a).2 == self.resolve_mount(b).2
    }

    fn is_under(prefix: &str, path: &str) -> bool {
        if prefix == "/" {
            return true;
        }
        path == prefix || path.starts_with(&format!("{prefix}/"))
    }

    /// Canonicalize `path`: resolve `.`/`..`, chase every symlink along the way (including
    /// the final component unless `preserve_symlinks` is set), following across mount
    /// boundaries. Raises `EINVAL` if the chain exceeds [`MAX_SYMLINK_HOPS`] (a cycle).
    pub fn realpath(&self, path: &str, preserve_symlinks: bool) -> Result<String> {
        let mut hops = 0u32;
        let mut remaining = split_segments(&path::normalize(path));
        let mut resolved = String::from("/");

        while let Some(segment) = remaining.pop_front() {
            let candidate = path::join(&resolved, &segment);
            let is_last = remaining.is_empty();
            let (fs, within, _prefix) = self.resolve_mount(&candidate);
            let stats = fs.stat(&within).map_err(|e| e.with_path(&candidate))?;

            if stats.is_symlink() && !(is_last && preserve_symlinks) {
                hops += 1;
                if hops > MAX_SYMLINK_HOPS {
                    return Err(raise::einval(
                        "realpath",
                        "too many levels of symbolic links",
                    ));
                }
                let target = fs.readlink(&within).map_err(|e| e.with_path(&candidate))?;
                if let Some(absolute_target) = target.strip_prefix('/') {
                    let mut new_remaining = split_segments(&path::normalize(&format!("/{absolute_target}")));
                    new_remaining.extend(remaining);
                    remaining = new_remaining;
                    resolved = "/".to_string();
                } else {
                    let joined = path::join(&resolved, &target);
                    let mut new_remaining = split_segments(&path::normalize(&joined));
                    new_remaining.extend(remaining);
                    remaining = new_remaining;
                }
            } else {
                resolved = candidate;
            }
        }

        Ok(resolved)
    }
}

fn split_segments(normalized: &str) -> std::collections::VecDeque<String> {
    normalized
        .trim_start_matches('/')
        .split('/')
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::engine::StoreEngine;
    use crate::fs::CreateOpts;
    use crate::store::MemoryStore;

    fn memfs(name: &str) -> Arc<dyn Filesystem> {
        Arc::new(StoreEngine::new(MemoryStore::new(), name))
    }

    #[test]
    fn longest_prefix_match_wins() {
        let table = MountTable::new(memfs("root"));
        table.mount("/mnt", memfs("mnt"));
        table.mount("/mnt/deep", memfs("deep"));

        let (fs, within, prefix) = table.resolve_mount("/mnt/deep/file.txt");
        assert_eq!(fs.name(), "deep");
        assert_eq!(within, "/file.txt");
        assert_eq!(prefix, "/mnt/deep");

        let (fs, within, prefix) = table.resolve_mount("/mnt/other.txt");
        assert_eq!(fs.name(), "mnt");
        assert_eq!(within, "/other.txt");
        assert_eq!(prefix, "/mnt");

        let (fs, _within, prefix) = table.resolve_mount("/elsewhere");
        assert_eq!(fs.name(), "root");
        assert_eq!(prefix, "/");
    }

    #[test]
    fn umount_root_is_rejected() {
        let table = MountTable::new(memfs("root"));
        let err = table.umount("/").unwrap_err();
        assert_eq!(err.code(), crate::error::ErrCode::Eperm);
    }

    #[test]
    fn realpath_chases_relative_symlink() {
        let root = memfs("root");
        let engine = root.clone();
        engine
            .create_file("/target.txt", CreateOpts::default())
            .unwrap();
        engine
            .symlink("target.txt", "/link.txt", CreateOpts::default())
            .unwrap();
        let table = MountTable::new(root);
        assert_eq!(table.realpath("/link.txt", false).unwrap(), "/target.txt");
    }

    #[test]
    fn realpath_preserve_symlinks_stops_at_final_component() {
        let root = memfs("root");
        root.create_file("/target.txt", CreateOpts::default()).unwrap();
        root.symlink("/target.txt", "/link.txt", CreateOpts::default())
            .unwrap();
        let table = MountTable::new(root);
        assert_eq!(table.realpath("/link.txt", true).unwrap(), "/link.txt");
    }

    #[test]
    fn realpath_detects_symlink_cycle() {
        let root = memfs("root");
        root.symlink("/b", "/a", CreateOpts::default()).unwrap();
        root.symlink("/a", "/b", CreateOpts::default()).unwrap();
        let table = MountTable::new(root);
        let err = table.realpath("/a", false).unwrap_err();
        assert_eq!(err.code(), crate::error::ErrCode::Einval);
    }

    #[test]
    fn same_mount_detects_cross_mount_pairs() {
        let table = MountTable::new(memfs("root"));
        table.mount("/mnt", memfs("mnt"));
        assert!(table.same_mount("/a", "/b"));
        assert!(!table.same_mount("/a", "/mnt/b"));
    }
}
