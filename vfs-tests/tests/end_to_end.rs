//! Black-box scenarios against the public `Vfs` facade, covering the end-to-end properties
//! and scenarios named for this system: round-trips, recursive mkdir, rename atomicity, link
//! counting, cross-mount `EXDEV`, read-only enforcement, case folding, and device nodes.

use std::sync::Arc;

use vfscore::fs::devices::DeviceFs;
use vfscore::fs::engine::StoreEngine;
use vfscore::fs::readonly::ReadOnlyFs;
use vfscore::fs::{CaseFold, CreateOpts, Filesystem};
use vfscore::store::MemoryStore;
use vfscore::{ErrCode, MkdirOpts, OpenFlags, ReaddirOpts, RmOpts, Vfs, VfsConfig};

fn memory_vfs() -> Vfs {
    let root: Arc<dyn Filesystem> = Arc::new(StoreEngine::new(MemoryStore::new(), "root"));
    Vfs::new(root, VfsConfig::default())
}

fn write_all(v: &Vfs, path: &str, data: &[u8]) {
    let fd = v
        .open(path, OpenFlags::O_WRONLY | OpenFlags::O_CREAT, CreateOpts::default())
        .unwrap();
    v.write(fd, data).unwrap();
    v.close(fd, false).unwrap();
}

fn read_all(v: &Vfs, path: &str) -> Vec<u8> {
    let fd = v.open(path, OpenFlags::O_RDONLY, CreateOpts::default()).unwrap();
    let mut buf = vec![0u8; 4096];
    let n = v.read(fd, &mut buf).unwrap();
    buf.truncate(n);
    v.close(fd, false).unwrap();
    buf
}

// S1 / Property 1: round-trip.
#[test]
fn scenario_s1_write_then_read_round_trips() {
    let v = memory_vfs();
    write_all(&v, "/hello.txt", b"world");
    assert_eq!(read_all(&v, "/hello.txt"), b"world");
    assert_eq!(v.stat("/hello.txt").unwrap().size, 5);
}

// S2 / Property 2: recursive mkdir is idempotent and lists children correctly.
#[test]
fn scenario_s2_recursive_mkdir_then_readdir() {
    let v = memory_vfs();
    v.mkdir("/a/b/c", MkdirOpts { recursive: true, ..Default::default() }).unwrap();
    assert!(v.stat("/a/b").unwrap().is_dir());

    // Applying it again must not raise and must not duplicate entries.
    v.mkdir("/a/b/c", MkdirOpts { recursive: true, ..Default::default() }).unwrap();

    let entries = v.readdir("/a", ReaddirOpts::default()).unwrap();
    let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, vec!["b"]);
}

// S3 / Property 4: link invariant.
#[test]
fn scenario_s3_hardlink_shares_ino_until_last_unlink() {
    let v = memory_vfs();
    write_all(&v, "/a", b"x");
    v.link("/a", "/b").unwrap();

    let stat_a = v.stat("/a").unwrap();
    let stat_b = v.stat("/b").unwrap();
    assert_eq!(stat_a.ino, stat_b.ino);
    assert_eq!(stat_a.nlink, 2);

    v.unlink("/a").unwrap();
    assert_eq!(v.stat("/a").unwrap_err().code(), ErrCode::Enoent);
    assert_eq!(read_all(&v, "/b"), b"x");
}

// S4 / Property 3: rename atomicity across disjoint parents.
#[test]
fn scenario_s4_rename_moves_and_is_visible_under_new_name_only() {
    let v = memory_vfs();
    write_all(&v, "/f", b"hi");
    v.rename("/f", "/g").unwrap();
    assert!(!v.exists("/f"));
    assert_eq!(read_all(&v, "/g"), b"hi");
}

// Property 5: a directory can never be renamed into its own subtree.
#[test]
fn directory_rename_into_own_descendant_is_ebusy() {
    let v = memory_vfs();
    v.mkdir("/a", MkdirOpts::default()).unwrap();
    let err = v.rename("/a", "/a/b").unwrap_err();
    assert_eq!(err.code(), ErrCode::Ebusy);
}

// Property 7: every mutating call on a read-only mount raises EROFS; reads still work.
#[test]
fn readonly_mount_rejects_writes_but_serves_reads() {
    let backend = StoreEngine::new(MemoryStore::new(), "ro");
    backend.create_file("/existing", CreateOpts::default()).unwrap();
    backend.write("/existing", b"seed", 0).unwrap();

    let root: Arc<dyn Filesystem> = Arc::new(ReadOnlyFs::new(Arc::new(backend)));
    let v = Vfs::new(root, VfsConfig::default());

    assert_eq!(read_all(&v, "/existing"), b"seed");

    let err = v
        .open("/new", OpenFlags::O_WRONLY | OpenFlags::O_CREAT, CreateOpts::default())
        .unwrap_err();
    assert_eq!(err.code(), ErrCode::Erofs);

    let err = v.mkdir("/newdir", MkdirOpts::default()).unwrap_err();
    assert_eq!(err.code(), ErrCode::Erofs);
}

// S6 / Property 8: case folding makes lookups case-insensitive while preserving the
// originally-written casing on read-back.
#[test]
fn scenario_s6_case_fold_lower_makes_lookups_case_insensitive() {
    let root: Arc<dyn Filesystem> =
        Arc::new(StoreEngine::with_case_fold(MemoryStore::new(), "root", CaseFold::Lower));
    let v = Vfs::new(root, VfsConfig::default());

    write_all(&v, "/Test.txt", b"t");
    assert!(v.exists("/test.txt"));
    assert_eq!(read_all(&v, "/TEST.txt"), b"t");
}

// Property 9: device nodes, once mounted, behave like their POSIX counterparts.
#[test]
fn devices_behave_like_their_posix_counterparts() {
    let v = memory_vfs();
    v.mount("/dev", Arc::new(DeviceFs::new()));

    let stats = v.stat("/dev/null").unwrap();
    use vfscore::flags::FileType;
    assert_eq!(stats.kind, FileType::CharDevice);

    let fd = v.open("/dev/zero", OpenFlags::O_RDONLY, CreateOpts::default()).unwrap();
    let mut buf = [0xffu8; 32];
    let n = v.read(fd, &mut buf).unwrap();
    v.close(fd, false).unwrap();
    assert_eq!(n, 32);
    assert!(buf.iter().all(|&b| b == 0));

    let fd = v.open("/dev/full", OpenFlags::O_WRONLY, CreateOpts::default()).unwrap();
    let err = v.write(fd, b"x").unwrap_err();
    v.close(fd, true).unwrap();
    assert_eq!(err.code(), ErrCode::Enospc);
}

// Property 10: O_APPEND ignores the caller-supplied write position.
#[test]
fn append_mode_ignores_the_requested_write_position() {
    let v = memory_vfs();
    write_all(&v, "/log", b"first");

    let fd = v
        .open("/log", OpenFlags::O_WRONLY | OpenFlags::O_APPEND, CreateOpts::default())
        .unwrap();
    v.write(fd, b"-second").unwrap();
    v.close(fd, false).unwrap();

    assert_eq!(read_all(&v, "/log"), b"first-second");
}

// Property 12: rename across independently mounted subtrees raises EXDEV.
#[test]
fn rename_across_mounts_raises_exdev() {
    let v = memory_vfs();
    v.mount("/other", Arc::new(StoreEngine::new(MemoryStore::new(), "other")));
    write_all(&v, "/f", b"hi");

    let err = v.rename("/f", "/other/f").unwrap_err();
    assert_eq!(err.code(), ErrCode::Exdev);
}

// Recursive rm removes a populated directory tree in one call.
#[test]
fn recursive_rm_clears_a_populated_directory() {
    let v = memory_vfs();
    v.mkdir("/data/nested", MkdirOpts { recursive: true, ..Default::default() }).unwrap();
    write_all(&v, "/data/nested/file", b"x");

    v.rm("/data", RmOpts { recursive: true, force: false }).unwrap();
    assert!(!v.exists("/data"));
}
