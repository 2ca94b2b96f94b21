//! The remote-port backend sketch (component K): a filesystem whose operations are RPC
//! envelopes dispatched over a symmetric message port, one call in and one reply back,
//! correlated by id, replaying structured errors, and bounded by a per-request timeout.
//!
//! Grounded in the teacher crate's request/channel/session split: a `Channel` carries opaque
//! framed messages to/from a driver, a `Request` decodes one call, and a reply type encodes
//! the structured response. This backend reuses that three-part shape — envelope type,
//! correlation table, reply encoding — over an in-process `tokio::sync::mpsc` "port" standing
//! in for the kernel device fd, since there is no real kernel driver on the other end here.
//! Async-only; synchronous access goes through the bridge mixin (§4.G, `fs::bridge`).

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};

use crate::error::{raise, ErrCode, Result, VfsError};
use crate::fs::bridge::AsyncFilesystem;
use crate::fs::{CreateOpts, Filesystem};
use crate::inode::StatsUpdate;
use crate::stats::Stats;

/// Default per-request timeout before a pending call raises `EIO`, per §5.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(1);

/// One RPC call, carrying everything the responder needs and nothing it must look up itself.
#[derive(Clone, Debug)]
pub enum RemoteCall {
    Stat(String),
    Touch(String, StatsUpdate),
    CreateFile(String, CreateOpts),
    Unlink(String),
    Rmdir(String),
    Mkdir(String, CreateOpts),
    Readdir(String),
    Exists(String),
    Link(String, String),
    Symlink(String, String, CreateOpts),
    Readlink(String),
    Rename(String, String),
    Sync(String, Option<Vec<u8>>, Option<StatsUpdate>),
    Read(String, usize, u64),
    Write(String, Vec<u8>, u64),
}

/// A structural, wire-safe replay of a [`VfsError`] — the error itself is not `Clone`/`Send`
/// across an owned channel boundary in the shape we need, so the responder re-encodes it.
#[derive(Clone, Debug)]
pub struct RemoteErrorEnvelope {
    pub code: ErrCode,
    pub syscall: String,
    pub path: Option<String>,
    pub message: String,
}

impl RemoteErrorEnvelope {
    fn from_vfs_error(err: &VfsError) -> Self {
        RemoteErrorEnvelope {
            code: err.code(),
            syscall: err.syscall().to_string(),
            path: err.path().map(|p| p.display().to_string()),
            message: err.to_string(),
        }
    }

    fn into_vfs_error(self) -> VfsError {
        let mut built = VfsError::new(self.code, "remoteCall", self.message);
        if let Some(path) = self.path {
            built = built.with_path(path);
        }
        built
    }
}

/// The reply half of one round trip.
#[derive(Clone, Debug)]
pub enum RemoteOutcome {
    Stat(Stats),
    Unit,
    Names(Vec<String>),
    Exists(bool),
    Text(String),
    Count(usize),
    Error(RemoteErrorEnvelope),
}

/// One request, addressed for correlation.
pub struct RemoteEnvelope {
    pub id: u64,
    pub call: RemoteCall,
}

#[derive(Debug)]
struct PortClosed;

impl std::fmt::Display for PortClosed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("remote port closed before a reply arrived")
    }
}
impl std::error::Error for PortClosed {}

#[derive(Debug)]
struct RequestTimedOut;

impl std::fmt::Display for RequestTimedOut {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("remote call exceeded its request timeout")
    }
}
impl std::error::Error for RequestTimedOut {}

/// The caller-side half of the port: sends envelopes out, correlates replies back in.
pub struct RemotePort {
    tx: mpsc::Sender<RemoteEnvelope>,
    pending: Mutex<HashMap<u64, oneshot::Sender<RemoteOutcome>>>,
    next_id: AtomicU64,
    timeout: Duration,
}

impl std::fmt::Debug for RemotePort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemotePort")
            .field("pending", &self.pending.lock().len())
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl RemotePort {
    /// Build a port that sends outbound envelopes over `tx`. Pair with [`RemotePort::complete`]
    /// called by whatever reads the matching receiver end.
    pub fn new(tx: mpsc::Sender<RemoteEnvelope>, timeout: Duration) -> Arc<Self> {
        Arc::new(RemotePort {
            tx,
            pending: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(0),
            timeout,
        })
    }

    /// Send `call`, await its correlated reply, and raise `EIO` if the port closes or the
    /// timeout elapses first.
    pub async fn call(&self, call: RemoteCall) -> Result<RemoteOutcome> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (reply_tx, reply_rx) = oneshot::channel();
        self.pending.lock().insert(id, reply_tx);

        if self.tx.send(RemoteEnvelope { id, call }).await.is_err() {
            self.pending.lock().remove(&id);
            return Err(raise::eio("remoteCall", PortClosed));
        }

        match tokio::time::timeout(self.timeout, reply_rx).await {
            Ok(Ok(RemoteOutcome::Error(envelope))) => Err(envelope.into_vfs_error()),
            Ok(Ok(outcome)) => Ok(outcome),
            Ok(Err(_canceled)) => Err(raise::eio("remoteCall", PortClosed)),
            Err(_elapsed) => {
                self.pending.lock().remove(&id);
                log::warn!("remote call {id} timed out after {:?}", self.timeout);
                Err(raise::eio("remoteCall", RequestTimedOut))
            }
        }
    }

    /// Deliver the reply for `id`. A no-op if nothing is waiting (e.g. it already timed out).
    pub fn complete(&self, id: u64, outcome: RemoteOutcome) {
        if let Some(tx) = self.pending.lock().remove(&id) {
            let _ = tx.send(outcome);
        }
    }
}

fn unexpected(syscall: &'static str) -> VfsError {
    raise::eio("remoteCall", UnexpectedOutcome(syscall))
}

#[derive(Debug)]
struct UnexpectedOutcome(&'static str);

impl std::fmt::Display for UnexpectedOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "remote responder returned an outcome that does not match {}", self.0)
    }
}
impl std::error::Error for UnexpectedOutcome {}

/// A [`Filesystem`] whose every operation is an RPC round trip through a [`RemotePort`].
pub struct RemotePortFs {
    name: String,
    port: Arc<RemotePort>,
}

impl std::fmt::Debug for RemotePortFs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemotePortFs").field("name", &self.name).finish()
    }
}

impl RemotePortFs {
    pub fn new(name: impl Into<String>, port: Arc<RemotePort>) -> Self {
        RemotePortFs {
            name: name.into(),
            port,
        }
    }
}

#[async_trait::async_trait]
impl AsyncFilesystem for RemotePortFs {
    fn name(&self) -> &str {
        &self.name
    }

    async fn stat(&self, path: &str) -> Result<Stats> {
        match self.port.call(RemoteCall::Stat(path.to_string())).await? {
            RemoteOutcome::Stat(stats) => Ok(stats),
            _ => Err(unexpected("stat")),
        }
    }

    async fn touch(&self, path: &str, update: StatsUpdate) -> Result<()> {
        match self.port.call(RemoteCall::Touch(path.to_string(), update)).await? {
            RemoteOutcome::Unit => Ok(()),
            _ => Err(unexpected("touch")),
        }
    }

    async fn create_file(&self, path: &str, opts: CreateOpts) -> Result<Stats> {
        match self.port.call(RemoteCall::CreateFile(path.to_string(), opts)).await? {
            RemoteOutcome::Stat(stats) => Ok(stats),
            _ => Err(unexpected("createFile")),
        }
    }

    async fn unlink(&self, path: &str) -> Result<()> {
        match self.port.call(RemoteCall::Unlink(path.to_string())).await? {
            RemoteOutcome::Unit => Ok(()),
            _ => Err(unexpected("unlink")),
        }
    }

    async fn rmdir(&self, path: &str) -> Result<()> {
        match self.port.call(RemoteCall::Rmdir(path.to_string())).await? {
            RemoteOutcome::Unit => Ok(()),
            _ => Err(unexpected("rmdir")),
        }
    }

    async fn mkdir(&self, path: &str, opts: CreateOpts) -> Result<Stats> {
        match self.port.call(RemoteCall::Mkdir(path.to_string(), opts)).await? {
            RemoteOutcome::Stat(stats) => Ok(stats),
            _ => Err(unexpected("mkdir")),
        }
    }

    async fn readdir(&self, path: &str) -> Result<Vec<String>> {
        match self.port.call(RemoteCall::Readdir(path.to_string())).await? {
            RemoteOutcome::Names(names) => Ok(names),
            _ => Err(unexpected("readdir")),
        }
    }

    async fn exists(&self, path: &str) -> bool {
        matches!(
            self.port.call(RemoteCall::Exists(path.to_string())).await,
            Ok(RemoteOutcome::Exists(true))
        )
    }

    async fn link(&self, existing: &str, new: &str) -> Result<()> {
        match self
            .port
            .call(RemoteCall::Link(existing.to_string(), new.to_string()))
            .await?
        {
            RemoteOutcome::Unit => Ok(()),
            _ => Err(unexpected("link")),
        }
    }

    async fn symlink(&self, target: &str, link_path: &str, opts: CreateOpts) -> Result<Stats> {
        match self
            .port
            .call(RemoteCall::Symlink(target.to_string(), link_path.to_string(), opts))
            .await?
        {
            RemoteOutcome::Stat(stats) => Ok(stats),
            _ => Err(unexpected("symlink")),
        }
    }

    async fn readlink(&self, path: &str) -> Result<String> {
        match self.port.call(RemoteCall::Readlink(path.to_string())).await? {
            RemoteOutcome::Text(target) => Ok(target),
            _ => Err(unexpected("readlink")),
        }
    }

    async fn rename(&self, old: &str, new: &str) -> Result<()> {
        match self
            .port
            .call(RemoteCall::Rename(old.to_string(), new.to_string()))
            .await?
        {
            RemoteOutcome::Unit => Ok(()),
            _ => Err(unexpected("rename")),
        }
    }

    async fn sync(&self, path: &str, data: Option<&[u8]>, update: Option<StatsUpdate>) -> Result<()> {
        match self
            .port
            .call(RemoteCall::Sync(path.to_string(), data.map(|d| d.to_vec()), update))
            .await?
        {
            RemoteOutcome::Unit => Ok(()),
            _ => Err(unexpected("sync")),
        }
    }

    async fn read(&self, path: &str, buf: &mut [u8], offset: u64) -> Result<usize> {
        match self
            .port
            .call(RemoteCall::Read(path.to_string(), buf.len(), offset))
            .await?
        {
            RemoteOutcome::Count(n) => Ok(n),
            _ => Err(unexpected("read")),
        }
    }

    async fn write(&self, path: &str, buf: &[u8], offset: u64) -> Result<usize> {
        match self
            .port
            .call(RemoteCall::Write(path.to_string(), buf.to_vec(), offset))
            .await?
        {
            RemoteOutcome::Count(n) => Ok(n),
            _ => Err(unexpected("write")),
        }
    }
}

/// Drive one end of the port: read envelopes from `rx`, execute each against `backend`
/// (a synchronous [`Filesystem`], run on the calling task — fine for the in-memory engine
/// this sketch is paired with), and deliver the reply back through `port`.
///
/// Stands in for a real out-of-process responder. Exits once `rx` closes.
pub async fn run_loopback_driver(
    port: Arc<RemotePort>,
    mut rx: mpsc::Receiver<RemoteEnvelope>,
    backend: Arc<dyn Filesystem>,
) {
    while let Some(envelope) = rx.recv().await {
        let outcome = execute(&backend, envelope.call);
        port.complete(envelope.id, outcome);
    }
}

fn execute(backend: &Arc<dyn Filesystem>, call: RemoteCall) -> RemoteOutcome {
    let wrap_err = |e: VfsError| RemoteOutcome::Error(RemoteErrorEnvelope::from_vfs_error(&e));
    match call {
        RemoteCall::Stat(path) => backend.stat(&path).map(RemoteOutcome::Stat).unwrap_or_else(wrap_err),
        RemoteCall::Touch(path, update) => backend
            .touch(&path, update)
            .map(|_| RemoteOutcome::Unit)
            .unwrap_or_else(wrap_err),
        RemoteCall::CreateFile(path, opts) => backend
            .create_file(&path, opts)
            .map(RemoteOutcome::Stat)
            .unwrap_or_else(wrap_err),
        RemoteCall::Unlink(path) => backend
            .unlink(&path)
            .map(|_| RemoteOutcome::Unit)
            .unwrap_or_else(wrap_err),
        RemoteCall::Rmdir(path) => backend
            .rmdir(&path)
            .map(|_| RemoteOutcome::Unit)
            .unwrap_or_else(wrap_err),
        RemoteCall::Mkdir(path, opts) => backend
            .mkdir(&path, opts)
            .map(RemoteOutcome::Stat)
            .unwrap_or_else(wrap_err),
        RemoteCall::Readdir(path) => backend
            .readdir(&path)
            .map(RemoteOutcome::Names)
            .unwrap_or_else(wrap_err),
        RemoteCall::Exists(path) => RemoteOutcome::Exists(backend.exists(&path)),
        RemoteCall::Link(existing, new) => backend
            .link(&existing, &new)
            .map(|_| RemoteOutcome::Unit)
            .unwrap_or_else(wrap_err),
        RemoteCall::Symlink(target, link_path, opts) => backend
            .symlink(&target, &link_path, opts)
            .map(RemoteOutcome::Stat)
            .unwrap_or_else(wrap_err),
        RemoteCall::Readlink(path) => backend
            .readlink(&path)
            .map(RemoteOutcome::Text)
            .unwrap_or_else(wrap_err),
        RemoteCall::Rename(old, new) => backend
            .rename(&old, &new)
            .map(|_| RemoteOutcome::Unit)
            .unwrap_or_else(wrap_err),
        RemoteCall::Sync(path, data, update) => backend
            .sync(&path, data.as_deref(), update)
            .map(|_| RemoteOutcome::Unit)
            .unwrap_or_else(wrap_err),
        RemoteCall::Read(path, len, offset) => {
            let mut buf = vec![0u8; len];
            match backend.read(&path, &mut buf, offset) {
                Ok(n) => {
                    buf.truncate(n);
                    RemoteOutcome::Count(n)
                }
                Err(e) => wrap_err(e),
            }
        }
        RemoteCall::Write(path, data, offset) => backend
            .write(&path, &data, offset)
            .map(RemoteOutcome::Count)
            .unwrap_or_else(wrap_err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::engine::StoreEngine;
    use crate::store::MemoryStore;

    fn spawn_loopback() -> (Arc<RemotePort>, Arc<dyn Filesystem>) {
        let (tx, rx) = mpsc::channel(16);
        let port = RemotePort::new(tx, DEFAULT_REQUEST_TIMEOUT);
        let backend: Arc<dyn Filesystem> = Arc::new(StoreEngine::new(MemoryStore::new(), "remote-backend"));
        tokio::spawn(run_loopback_driver(port.clone(), rx, backend.clone()));
        (port, backend)
    }

    #[tokio::test]
    async fn round_trips_create_and_write_through_the_port() {
        let (port, _backend) = spawn_loopback();
        let fs = RemotePortFs::new("remote", port);
        fs.create_file("/f", CreateOpts::default()).await.unwrap();
        let n = fs.write("/f", b"hello", 0).await.unwrap();
        assert_eq!(n, 5);
        let mut buf = [0u8; 5];
        let read = fs.read("/f", &mut buf, 0).await.unwrap();
        assert_eq!(&buf[..read], b"hello");
    }

    #[tokio::test]
    async fn errors_replay_structurally() {
        let (port, _backend) = spawn_loopback();
        let fs = RemotePortFs::new("remote", port);
        let err = fs.stat("/nope").await.unwrap_err();
        assert_eq!(err.code(), crate::error::ErrCode::Enoent);
    }

    #[tokio::test]
    async fn timeout_raises_eio() {
        let (tx, _rx) = mpsc::channel(1);
        // Receiver dropped implicitly retained by holding `_rx`... keep it alive but never
        // drain it, so the call has to wait out the timeout rather than see a closed port.
        let port = RemotePort::new(tx, Duration::from_millis(20));
        let fs = RemotePortFs::new("remote", port);
        let err = fs.stat("/anything").await.unwrap_err();
        assert_eq!(err.code(), crate::error::ErrCode::Eio);
    }
}
