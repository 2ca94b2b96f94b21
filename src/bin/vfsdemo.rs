//! A small scripted demo of the VFS facade over an in-memory backend: mount, write a file,
//! read it back, list a directory, and (optionally) exercise the remote-port backend.
//!
//! Grounded in the teacher crate's own `examples/simple.rs` CLI skeleton: a `clap::Command`
//! with a handful of flags, `env_logger` wired to `-v` verbosity, then a scripted sequence of
//! filesystem calls instead of a FUSE mount loop.

use std::sync::Arc;

use clap::{crate_version, Arg, ArgAction, Command};
use log::LevelFilter;
use vfscore::fs::engine::StoreEngine;
use vfscore::fs::{CreateOpts, Filesystem};
use vfscore::store::MemoryStore;
use vfscore::{MkdirOpts, OpenFlags, ReaddirOpts, Vfs, VfsConfig};

fn run_script(vfs: &Vfs) -> vfscore::Result<()> {
    vfs.mkdir("/demo", MkdirOpts::default())?;

    let fd = vfs.open(
        "/demo/hello.txt",
        OpenFlags::O_WRONLY | OpenFlags::O_CREAT,
        CreateOpts::default(),
    )?;
    vfs.write(fd, b"hello from vfscore\n")?;
    vfs.close(fd, false)?;

    let fd = vfs.open("/demo/hello.txt", OpenFlags::O_RDONLY, CreateOpts::default())?;
    let mut buf = vec![0u8; 128];
    let n = vfs.read(fd, &mut buf)?;
    vfs.close(fd, false)?;
    println!("read back: {}", String::from_utf8_lossy(&buf[..n]));

    for entry in vfs.readdir("/demo", ReaddirOpts::default())? {
        println!("/demo entry: {}", entry.name);
    }

    let stats = vfs.stat("/demo/hello.txt")?;
    println!(
        "stat: ino={} size={} mode={:o}",
        stats.ino, stats.size, stats.perm
    );
    Ok(())
}

fn main() {
    let matches = Command::new("vfsdemo")
        .version(crate_version!())
        .author("vfscore contributors")
        .arg(
            Arg::new("add-devices")
                .long("add-devices")
                .action(ArgAction::SetTrue)
                .help("Mount /dev/{null,zero,full,random} before running the script"),
        )
        .arg(
            Arg::new("v")
                .short('v')
                .action(ArgAction::Count)
                .help("Sets the level of verbosity"),
        )
        .get_matches();

    let log_level = match matches.get_count("v") {
        0 => LevelFilter::Error,
        1 => LevelFilter::Warn,
        2 => LevelFilter::Info,
        3 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    env_logger::builder().filter_level(log_level).init();

    let config = VfsConfig {
        add_devices: matches.get_flag("add-devices"),
        ..VfsConfig::default()
    };
    let root: Arc<dyn Filesystem> = Arc::new(StoreEngine::new(MemoryStore::new(), "root"));
    let vfs = Vfs::new(root, config);

    if let Err(err) = run_script(&vfs) {
        eprintln!("vfsdemo: {err}");
        std::process::exit(1);
    }
}
