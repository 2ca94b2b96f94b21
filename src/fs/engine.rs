//! The store-backed filesystem engine (component C): a hierarchical namespace with inodes,
//! directory listings, and hard links realized on top of a flat transactional store.
//!
//! Every mutating operation here follows the same shape: `store.begin()`, perform a
//! sequence of `get`/`put`/`remove` calls, then `store.commit()` on success or
//! `store.abort()` on any failure — so each operation either takes effect entirely or not
//! at all, matching §4.C's failure model.

use std::collections::HashSet;

use parking_lot::Mutex;

use crate::error::{raise, Result, VfsError};
use crate::flags::InodeFlags;
use crate::fs::listing::{self, Listing};
use crate::fs::{CaseFold, CreateOpts, FsAttributes, Filesystem};
use crate::inode::{Inode, StatsUpdate, RAW_INODE_SIZE, ROOT_INO};
use crate::path;
use crate::stats::Stats;
use crate::store::Store;

/// Number of rejection-sampling attempts for a fresh ino before giving up with `ENOSPC`.
const DEFAULT_MAX_INODE_ALLOC_TRIES: u32 = 5;

/// A store-backed [`Filesystem`]. Generic over the store implementation so the same engine
/// logic runs on top of the reference [`crate::store::MemoryStore`] or any other
/// [`Store`] a caller supplies.
pub struct StoreEngine<S> {
    name: String,
    attributes: FsAttributes,
    case_fold: CaseFold,
    max_inode_alloc_tries: u32,
    inner: Mutex<S>,
}

impl<S: std::fmt::Debug> std::fmt::Debug for StoreEngine<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreEngine")
            .field("name", &self.name)
            .field("attributes", &self.attributes)
            .field("case_fold", &self.case_fold)
            .finish()
    }
}

fn pack(inode: &Inode, payload: &[u8]) -> Vec<u8> {
    let mut bytes = inode.to_bytes();
    bytes.extend_from_slice(payload);
    bytes
}

fn unpack(ino: u64, bytes: &[u8], syscall: &'static str) -> Result<(Inode, Vec<u8>)> {
    if bytes.len() < RAW_INODE_SIZE {
        log::warn!("store record for ino {ino} is shorter than the inode header, treating as corrupt");
        return Err(raise::eio(syscall, CorruptRecord(ino)));
    }
    let (header, payload) = bytes.split_at(RAW_INODE_SIZE);
    let inode = Inode::from_bytes(header).ok_or_else(|| {
        log::warn!("store record for ino {ino} failed to decode as an inode header");
        raise::eio(syscall, CorruptRecord(ino))
    })?;
    Ok((inode, payload.to_vec()))
}

#[derive(Debug)]
struct CorruptRecord(u64);

impl std::fmt::Display for CorruptRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "store record for ino {} is corrupt", self.0)
    }
}

impl std::error::Error for CorruptRecord {}

impl<S: Store> StoreEngine<S> {
    /// Wrap `store` as a filesystem named `name`, bootstrapping the root directory inode if
    /// it is not already present.
    pub fn new(store: S, name: impl Into<String>) -> Self {
        Self::with_case_fold(store, name, CaseFold::None)
    }

    /// Like [`StoreEngine::new`], additionally folding every path component per `case_fold`.
    pub fn with_case_fold(mut store: S, name: impl Into<String>, case_fold: CaseFold) -> Self {
        if store.get(ROOT_INO).is_none() {
            let root = Inode::new_root();
            let payload = listing::encode(&Listing::new());
            store.begin();
            store.put(ROOT_INO, pack(&root, &payload), false);
            store.commit();
        }
        StoreEngine {
            name: name.into(),
            attributes: FsAttributes::empty(),
            case_fold,
            max_inode_alloc_tries: DEFAULT_MAX_INODE_ALLOC_TRIES,
            inner: Mutex::new(store),
        }
    }

    fn get_record(&self, store: &S, ino: u64, syscall: &'static str) -> Result<(Inode, Vec<u8>)> {
        let bytes = store
            .get(ino)
            .ok_or_else(|| raise::eio(syscall, CorruptRecord(ino)))?;
        unpack(ino, &bytes, syscall)
    }

    /// Walk from the root to `path`, returning the final component's ino, inode, and raw
    /// payload bytes. A visited-ino set guards against cycles in a corrupted listing.
    fn resolve(&self, store: &S, path: &str, syscall: &'static str) -> Result<(u64, Inode, Vec<u8>)> {
        let normalized = crate::path::normalize(path);
        let trailing_slash = crate::path::has_trailing_slash(path);

        let mut ino = ROOT_INO;
        let (mut inode, mut payload) = self.get_record(store, ino, syscall)?;
        let mut visited = HashSet::new();
        visited.insert(ino);

        if normalized != "/" {
            for raw_segment in normalized.trim_start_matches('/').split('/') {
                if !inode.is_dir() {
                    return Err(raise::enotdir(syscall, path));
                }
                let segment = self.case_fold.apply(raw_segment);
                let listing = listing::decode(&payload, syscall)?;
                let child_ino = *listing
                    .get(&segment)
                    .ok_or_else(|| raise::enoent(syscall, path))?;
                if !visited.insert(child_ino) {
                    return Err(raise::einval(syscall, "path resolution cycle detected"));
                }
                let (child_inode, child_payload) = self.get_record(store, child_ino, syscall)?;
                ino = child_ino;
                inode = child_inode;
                payload = child_payload;
            }
        }

        if trailing_slash && !inode.is_dir() {
            return Err(raise::enotdir(syscall, path));
        }
        Ok((ino, inode, payload))
    }

    fn resolve_dir(&self, store: &S, path: &str, syscall: &'static str) -> Result<(u64, Inode, Listing)> {
        let (ino, inode, payload) = self.resolve(store, path, syscall)?;
        if !inode.is_dir() {
            return Err(raise::enotdir(syscall, path));
        }
        let listing = listing::decode(&payload, syscall)?;
        Ok((ino, inode, listing))
    }

    fn check_not_immutable(&self, inode: &Inode, syscall: &'static str, path: &str) -> Result<()> {
        if inode.flags().contains(InodeFlags::IMMUTABLE) {
            return Err(raise::eperm(syscall, path));
        }
        Ok(())
    }

    fn allocate(
        &self,
        store: &mut S,
        mode: u32,
        opts: CreateOpts,
        payload: Vec<u8>,
        syscall: &'static str,
    ) -> Result<(u64, Inode)> {
        for _ in 0..self.max_inode_alloc_tries {
            let mut candidate = Inode::new(mode);
            // Inode::new already picks a fresh random ino; reuse it as the allocation
            // candidate and let the store's overwrite=false put arbitrate collisions.
            candidate.set_owner(Some(opts.uid), Some(opts.gid));
            let ino = candidate.ino();
            let bytes = pack(&candidate, &payload);
            if store.put(ino, bytes, false) {
                return Ok((ino, candidate));
            }
        }
        Err(raise::enospc(syscall))
    }

    fn create(
        &self,
        path: &str,
        opts: CreateOpts,
        mode_bits: u32,
        payload: Vec<u8>,
        syscall: &'static str,
    ) -> Result<Stats> {
        let parent_path = crate::path::dirname(path);
        let raw_name = crate::path::basename(path);
        if raw_name.is_empty() {
            return Err(raise::eexist(syscall, path));
        }
        let name = self.case_fold.apply(raw_name);

        let mut store = self.inner.lock();
        store.begin();

        let (parent_ino, mut parent_inode, mut parent_listing) =
            match self.resolve_dir(&store, parent_path, syscall) {
                Ok(v) => v,
                Err(e) => {
                    store.abort();
                    return Err(e);
                }
            };
        if parent_listing.contains_key(&name) {
            store.abort();
            return Err(raise::eexist(syscall, path));
        }

        let (_ino, inode) = match self.allocate(&mut store, mode_bits, opts, payload, syscall) {
            Ok(v) => v,
            Err(e) => {
                store.abort();
                return Err(e);
            }
        };

        parent_listing.insert(name, inode.ino());
        let encoded = listing::encode(&parent_listing);
        parent_inode.update(StatsUpdate {
            size: Some(encoded.len() as u32),
            mtime_ms: Some(now_ms()),
            ..Default::default()
        });
        store.put(parent_ino, pack(&parent_inode, &encoded), true);
        store.commit();
        Ok(Stats::from_inode(&inode))
    }
}

fn now_ms() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

impl<S: Store> Filesystem for StoreEngine<S> {
    fn name(&self) -> &str {
        &self.name
    }

    fn attributes(&self) -> FsAttributes {
        self.attributes
    }

    fn stat(&self, path: &str) -> Result<Stats> {
        let store = self.inner.lock();
        let (_ino, inode, _payload) = self.resolve(&store, path, "stat")?;
        Ok(Stats::from_inode(&inode))
    }

    fn exists(&self, path: &str) -> bool {
        let store = self.inner.lock();
        self.resolve(&store, path, "exists").is_ok()
    }

    fn readdir(&self, path: &str) -> Result<Vec<String>> {
        let store = self.inner.lock();
        let (_ino, _inode, listing) = self.resolve_dir(&store, path, "readdir")?;
        Ok(listing.into_keys().collect())
    }

    fn create_file(&self, path: &str, opts: CreateOpts) -> Result<Stats> {
        let mode = opts.mode | crate::flags::S_IFREG;
        self.create(path, opts, mode, Vec::new(), "createFile")
    }

    fn mkdir(&self, path: &str, opts: CreateOpts) -> Result<Stats> {
        let mode = opts.mode | crate::flags::S_IFDIR;
        let payload = listing::encode(&Listing::new());
        self.create(path, opts, mode, payload, "mkdir")
    }

    fn symlink(&self, target: &str, link_path: &str, opts: CreateOpts) -> Result<Stats> {
        let mode = opts.mode | crate::flags::S_IFLNK;
        self.create(link_path, opts, mode, target.as_bytes().to_vec(), "symlink")
    }

    fn readlink(&self, path: &str) -> Result<String> {
        let store = self.inner.lock();
        let (_ino, inode, payload) = self.resolve(&store, path, "readlink")?;
        if !matches!(inode.file_type(), Some(crate::flags::FileType::Symlink)) {
            return Err(raise::einval("readlink", "not a symbolic link"));
        }
        String::from_utf8(payload).map_err(|e| raise::eio("readlink", e.utf8_error()))
    }

    fn unlink(&self, path: &str) -> Result<()> {
        self.remove_entry(path, false)
    }

    fn rmdir(&self, path: &str) -> Result<()> {
        self.remove_entry(path, true)
    }

    fn link(&self, existing: &str, new: &str) -> Result<()> {
        let new_parent_path = crate::path::dirname(new);
        let raw_name = crate::path::basename(new);
        if raw_name.is_empty() {
            return Err(raise::eexist("link", new));
        }
        let name = self.case_fold.apply(raw_name);

        let mut store = self.inner.lock();
        store.begin();

        let (target_ino, mut target_inode, target_payload) =
            match self.resolve(&store, existing, "link") {
                Ok(v) => v,
                Err(e) => {
                    store.abort();
                    return Err(e);
                }
            };
        if target_inode.is_dir() {
            store.abort();
            return Err(raise::eperm("link", existing));
        }

        let (parent_ino, mut parent_inode, mut parent_listing) =
            match self.resolve_dir(&store, new_parent_path, "link") {
                Ok(v) => v,
                Err(e) => {
                    store.abort();
                    return Err(e);
                }
            };
        if parent_listing.contains_key(&name) {
            store.abort();
            return Err(raise::eexist("link", new));
        }

        target_inode.inc_nlink();
        store.put(target_ino, pack(&target_inode, &target_payload), true);

        parent_listing.insert(name, target_ino);
        let encoded = listing::encode(&parent_listing);
        parent_inode.update(StatsUpdate {
            size: Some(encoded.len() as u32),
            mtime_ms: Some(now_ms()),
            ..Default::default()
        });
        store.put(parent_ino, pack(&parent_inode, &encoded), true);

        store.commit();
        Ok(())
    }

    fn rename(&self, old: &str, new: &str) -> Result<()> {
        let old_norm = crate::path::normalize(old);
        let new_norm = crate::path::normalize(new);
        if old_norm == new_norm {
            return Ok(());
        }
        if crate::path::is_self_or_descendant(&old_norm, &new_norm) {
            return Err(raise::ebusy("rename"));
        }

        let old_parent_path = crate::path::dirname(&old_norm);
        let old_name = self.case_fold.apply(crate::path::basename(&old_norm));
        let new_parent_path = crate::path::dirname(&new_norm);
        let new_name = self.case_fold.apply(crate::path::basename(&new_norm));

        let mut store = self.inner.lock();
        store.begin();

        let same_parent = old_parent_path == new_parent_path;

        let (old_parent_ino, mut old_parent_inode, mut old_listing) =
            match self.resolve_dir(&store, old_parent_path, "rename") {
                Ok(v) => v,
                Err(e) => {
                    store.abort();
                    return Err(e);
                }
            };
        let moved_ino = match old_listing.get(&old_name).copied() {
            Some(ino) => ino,
            None => {
                store.abort();
                return Err(raise::enoent("rename", old));
            }
        };

        let (new_parent_ino, mut new_parent_inode, mut new_listing) = if same_parent {
            (old_parent_ino, old_parent_inode, old_listing.clone())
        } else {
            match self.resolve_dir(&store, new_parent_path, "rename") {
                Ok(v) => v,
                Err(e) => {
                    store.abort();
                    return Err(e);
                }
            }
        };

        if let Some(&target_ino) = new_listing.get(&new_name) {
            let (target_inode, target_payload) =
                match self.get_record(&store, target_ino, "rename") {
                    Ok(v) => v,
                    Err(e) => {
                        store.abort();
                        return Err(e);
                    }
                };
            if target_inode.is_dir() {
                store.abort();
                return Err(raise::eperm("rename", new));
            }
            let mut target_inode = target_inode;
            if target_inode.dec_nlink() == 0 {
                store.remove(target_ino);
            } else {
                store.put(target_ino, pack(&target_inode, &target_payload), true);
            }
        }

        old_listing.remove(&old_name);
        new_listing.insert(new_name, moved_ino);

        let now = now_ms();
        if same_parent {
            new_listing.clone_into(&mut old_listing);
            let encoded = listing::encode(&old_listing);
            old_parent_inode.update(StatsUpdate {
                size: Some(encoded.len() as u32),
                mtime_ms: Some(now),
                ..Default::default()
            });
            store.put(old_parent_ino, pack(&old_parent_inode, &encoded), true);
        } else {
            let old_encoded = listing::encode(&old_listing);
            old_parent_inode.update(StatsUpdate {
                size: Some(old_encoded.len() as u32),
                mtime_ms: Some(now),
                ..Default::default()
            });
            store.put(old_parent_ino, pack(&old_parent_inode, &old_encoded), true);

            let new_encoded = listing::encode(&new_listing);
            new_parent_inode.update(StatsUpdate {
                size: Some(new_encoded.len() as u32),
                mtime_ms: Some(now),
                ..Default::default()
            });
            store.put(new_parent_ino, pack(&new_parent_inode, &new_encoded), true);
        }

        store.commit();
        Ok(())
    }

    fn touch(&self, path: &str, update: StatsUpdate) -> Result<()> {
        self.sync(path, None, Some(update))
    }

    fn sync(&self, path: &str, data: Option<&[u8]>, update: Option<StatsUpdate>) -> Result<()> {
        let mut store = self.inner.lock();
        store.begin();
        let (ino, mut inode, old_payload) = match self.resolve(&store, path, "sync") {
            Ok(v) => v,
            Err(e) => {
                store.abort();
                return Err(e);
            }
        };
        let payload = if let Some(data) = data {
            if let Err(e) = self.check_not_immutable(&inode, "sync", path) {
                store.abort();
                return Err(e);
            }
            inode.set_size(data.len() as u32);
            data.to_vec()
        } else {
            old_payload
        };
        if let Some(update) = update {
            inode.update(update);
        }
        store.put(ino, pack(&inode, &payload), true);
        store.commit();
        Ok(())
    }

    fn read(&self, path: &str, buf: &mut [u8], offset: u64) -> Result<usize> {
        let mut store = self.inner.lock();
        store.begin();
        let (ino, mut inode, payload) = match self.resolve(&store, path, "read") {
            Ok(v) => v,
            Err(e) => {
                store.abort();
                return Err(e);
            }
        };
        let start = offset.min(payload.len() as u64) as usize;
        let end = (start + buf.len()).min(payload.len());
        let n = end - start;
        buf[..n].copy_from_slice(&payload[start..end]);
        inode.touch_atime();
        store.put(ino, pack(&inode, &payload), true);
        store.commit();
        Ok(n)
    }

    fn write(&self, path: &str, buf: &[u8], offset: u64) -> Result<usize> {
        if self.attributes.contains(FsAttributes::NO_WRITE) {
            return Err(raise::erofs("write", path));
        }
        let new_len = offset
            .checked_add(buf.len() as u64)
            .ok_or_else(|| raise::einval("write", "offset + length overflows"))?;
        if new_len > u32::MAX as u64 {
            return Err(VfsError::new(
                crate::error::ErrCode::Efbig,
                "write",
                "write would exceed the maximum representable file size",
            )
            .with_path(path));
        }

        let mut store = self.inner.lock();
        store.begin();
        let (ino, mut inode, mut payload) = match self.resolve(&store, path, "write") {
            Ok(v) => v,
            Err(e) => {
                store.abort();
                return Err(e);
            }
        };
        if let Err(e) = self.check_not_immutable(&inode, "write", path) {
            store.abort();
            return Err(e);
        }
        let start = offset as usize;
        let end = start + buf.len();
        if payload.len() < end {
            payload.resize(end, 0);
        }
        payload[start..end].copy_from_slice(buf);
        inode.set_size(payload.len() as u32);
        store.put(ino, pack(&inode, &payload), true);
        store.commit();
        Ok(buf.len())
    }
}

impl<S: Store> StoreEngine<S> {
    fn remove_entry(&self, path: &str, want_dir: bool) -> Result<()> {
        let syscall = if want_dir { "rmdir" } else { "unlink" };
        let parent_path = crate::path::dirname(path);
        let name = self.case_fold.apply(crate::path::basename(path));

        let mut store = self.inner.lock();
        store.begin();

        let (parent_ino, mut parent_inode, mut listing) =
            match self.resolve_dir(&store, parent_path, syscall) {
                Ok(v) => v,
                Err(e) => {
                    store.abort();
                    return Err(e);
                }
            };
        let child_ino = match listing.get(&name).copied() {
            Some(ino) => ino,
            None => {
                store.abort();
                return Err(raise::enoent(syscall, path));
            }
        };
        let (mut child_inode, child_payload) = match self.get_record(&store, child_ino, syscall) {
            Ok(v) => v,
            Err(e) => {
                store.abort();
                return Err(e);
            }
        };

        if want_dir {
            if !child_inode.is_dir() {
                store.abort();
                return Err(raise::enotdir(syscall, path));
            }
            match listing::decode(&child_payload, syscall) {
                Ok(child_listing) if !child_listing.is_empty() => {
                    store.abort();
                    return Err(raise::enotempty(syscall, path));
                }
                Ok(_) => {}
                Err(e) => {
                    store.abort();
                    return Err(e);
                }
            }
        } else if child_inode.is_dir() {
            store.abort();
            return Err(raise::eisdir(syscall, path));
        }

        listing.remove(&name);
        let encoded = listing::encode(&listing);
        parent_inode.update(StatsUpdate {
            size: Some(encoded.len() as u32),
            mtime_ms: Some(now_ms()),
            ..Default::default()
        });
        store.put(parent_ino, pack(&parent_inode, &encoded), true);

        if child_inode.dec_nlink() == 0 {
            store.remove(child_ino);
        } else {
            store.put(child_ino, pack(&child_inode, &child_payload), true);
        }

        store.commit();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn engine() -> StoreEngine<MemoryStore> {
        StoreEngine::new(MemoryStore::new(), "memfs")
    }

    #[test]
    fn round_trip_write_then_read() {
        let fs = engine();
        fs.create_file("/hello.txt", CreateOpts::default()).unwrap();
        fs.write("/hello.txt", b"world", 0).unwrap();
        let mut buf = [0u8; 5];
        let n = fs.read("/hello.txt", &mut buf, 0).unwrap();
        assert_eq!(&buf[..n], b"world");
        assert_eq!(fs.stat("/hello.txt").unwrap().size, 5);
    }

    #[test]
    fn mkdir_then_readdir_lists_child() {
        let fs = engine();
        fs.mkdir("/a", CreateOpts::default()).unwrap();
        fs.mkdir("/a/b", CreateOpts::default()).unwrap();
        assert!(fs.stat("/a/b").unwrap().is_dir());
        assert_eq!(fs.readdir("/a").unwrap(), vec!["b".to_string()]);
    }

    #[test]
    fn link_shares_ino_and_unlink_frees_on_last_reference() {
        let fs = engine();
        fs.create_file("/a", CreateOpts::default()).unwrap();
        fs.write("/a", b"x", 0).unwrap();
        fs.link("/a", "/b").unwrap();
        assert_eq!(fs.stat("/a").unwrap().ino, fs.stat("/b").unwrap().ino);
        assert_eq!(fs.stat("/a").unwrap().nlink, 2);
        fs.unlink("/a").unwrap();
        let mut buf = [0u8; 1];
        let n = fs.read("/b", &mut buf, 0).unwrap();
        assert_eq!(&buf[..n], b"x");
    }

    #[test]
    fn rename_across_disjoint_parents_is_atomic() {
        let fs = engine();
        fs.mkdir("/a", CreateOpts::default()).unwrap();
        fs.mkdir("/b", CreateOpts::default()).unwrap();
        fs.create_file("/a/f", CreateOpts::default()).unwrap();
        let old_ino = fs.stat("/a/f").unwrap().ino;
        fs.rename("/a/f", "/b/g").unwrap();
        assert_eq!(fs.stat("/a/f").unwrap_err().code(), crate::error::ErrCode::Enoent);
        assert_eq!(fs.stat("/b/g").unwrap().ino, old_ino);
    }

    #[test]
    fn rename_into_own_descendant_is_ebusy() {
        let fs = engine();
        fs.mkdir("/a", CreateOpts::default()).unwrap();
        let err = fs.rename("/a", "/a/b").unwrap_err();
        assert_eq!(err.code(), crate::error::ErrCode::Ebusy);
    }

    #[test]
    fn create_file_at_root_is_eexist() {
        let fs = engine();
        let err = fs.create_file("/", CreateOpts::default()).unwrap_err();
        assert_eq!(err.code(), crate::error::ErrCode::Eexist);
    }

    #[test]
    fn rmdir_on_nonempty_directory_is_enotempty() {
        let fs = engine();
        fs.mkdir("/a", CreateOpts::default()).unwrap();
        fs.create_file("/a/f", CreateOpts::default()).unwrap();
        let err = fs.rmdir("/a").unwrap_err();
        assert_eq!(err.code(), crate::error::ErrCode::Enotempty);
    }

    #[test]
    fn unlink_on_directory_is_eisdir() {
        let fs = engine();
        fs.mkdir("/a", CreateOpts::default()).unwrap();
        let err = fs.unlink("/a").unwrap_err();
        assert_eq!(err.code(), crate::error::ErrCode::Eisdir);
    }

    #[test]
    fn symlink_round_trips_through_readlink() {
        let fs = engine();
        fs.symlink("/target", "/link", CreateOpts::default()).unwrap();
        assert_eq!(fs.readlink("/link").unwrap(), "/target");
    }

    #[test]
    fn case_fold_lower_makes_lookups_case_insensitive() {
        let fs = StoreEngine::with_case_fold(MemoryStore::new(), "memfs", CaseFold::Lower);
        fs.create_file("/Test.txt", CreateOpts::default()).unwrap();
        assert!(fs.exists("/test.txt"));
        assert!(fs.exists("/TEST.txt"));
    }

    #[test]
    fn exists_never_raises_on_missing_path() {
        let fs = engine();
        assert!(!fs.exists("/nope"));
    }
}
