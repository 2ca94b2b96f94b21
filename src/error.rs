//! Structured errors raised by the VFS core.
//!
//! Every fallible operation in this crate returns a [`VfsError`] rather than throwing and
//! catching for control flow — the one exception the specification calls out (`exists`,
//! `realpath`, `rm({force: true})`) is handled by pattern-matching on [`ErrCode::Enoent`]
//! at the call site, not by a separate exception type.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

/// The stable, programmatically-matchable error code surface.
///
/// These mirror POSIX `errno` values; [`ErrCode::to_raw_os_error`] recovers the numeric
/// value for interop with code that expects a [`std::io::Error`].
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum ErrCode {
    /// No such file or directory.
    Enoent,
    /// File exists.
    Eexist,
    /// Permission denied.
    Eacces,
    /// Bad file descriptor.
    Ebadf,
    /// Device or resource busy.
    Ebusy,
    /// Operation not permitted.
    Eperm,
    /// Read-only filesystem.
    Erofs,
    /// Invalid argument.
    Einval,
    /// I/O error.
    Eio,
    /// Not a directory.
    Enotdir,
    /// Is a directory.
    Eisdir,
    /// Directory not empty.
    Enotempty,
    /// Cross-device link.
    Exdev,
    /// No space left on device.
    Enospc,
    /// Function not implemented.
    Enosys,
    /// Operation not supported.
    Enotsup,
    /// File too large.
    Efbig,
    /// Resource deadlock would occur.
    Edeadlk,
    /// No data available (xattr absent).
    Enodata,
}

impl ErrCode {
    /// The raw `libc` errno value this code corresponds to.
    pub fn to_raw_os_error(self) -> i32 {
        match self {
            ErrCode::Enoent => libc::ENOENT,
            ErrCode::Eexist => libc::EEXIST,
            ErrCode::Eacces => libc::EACCES,
            ErrCode::Ebadf => libc::EBADF,
            ErrCode::Ebusy => libc::EBUSY,
            ErrCode::Eperm => libc::EPERM,
            ErrCode::Erofs => libc::EROFS,
            ErrCode::Einval => libc::EINVAL,
            ErrCode::Eio => libc::EIO,
            ErrCode::Enotdir => libc::ENOTDIR,
            ErrCode::Eisdir => libc::EISDIR,
            ErrCode::Enotempty => libc::ENOTEMPTY,
            ErrCode::Exdev => libc::EXDEV,
            ErrCode::Enospc => libc::ENOSPC,
            ErrCode::Enosys => libc::ENOSYS,
            ErrCode::Enotsup => libc::ENOTSUP,
            ErrCode::Efbig => libc::EFBIG,
            ErrCode::Edeadlk => libc::EDEADLK,
            ErrCode::Enodata => libc::ENODATA,
        }
    }

    /// The bare symbol, e.g. `"ENOENT"`, as used in log lines and test assertions.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrCode::Enoent => "ENOENT",
            ErrCode::Eexist => "EEXIST",
            ErrCode::Eacces => "EACCES",
            ErrCode::Ebadf => "EBADF",
            ErrCode::Ebusy => "EBUSY",
            ErrCode::Eperm => "EPERM",
            ErrCode::Erofs => "EROFS",
            ErrCode::Einval => "EINVAL",
            ErrCode::Eio => "EIO",
            ErrCode::Enotdir => "ENOTDIR",
            ErrCode::Eisdir => "EISDIR",
            ErrCode::Enotempty => "ENOTEMPTY",
            ErrCode::Exdev => "EXDEV",
            ErrCode::Enospc => "ENOSPC",
            ErrCode::Enosys => "ENOSYS",
            ErrCode::Enotsup => "ENOTSUP",
            ErrCode::Efbig => "EFBIG",
            ErrCode::Edeadlk => "EDEADLK",
            ErrCode::Enodata => "ENODATA",
        }
    }
}

impl fmt::Display for ErrCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A structured VFS error: code, user-visible path, syscall name, message and optional cause.
pub struct VfsError {
    code: ErrCode,
    syscall: &'static str,
    path: Option<PathBuf>,
    message: String,
    cause: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl VfsError {
    /// Construct a new error for `syscall`, carrying no path yet.
    pub fn new(code: ErrCode, syscall: &'static str, message: impl Into<String>) -> Self {
        VfsError {
            code,
            syscall,
            path: None,
            message: message.into(),
            cause: None,
        }
    }

    /// Attach (or replace) the user-visible path. Used by the VFS facade to substitute the
    /// path the caller passed in for whatever internal path the backend saw.
    pub fn with_path(mut self, path: impl AsRef<Path>) -> Self {
        self.path = Some(path.as_ref().to_path_buf());
        self
    }

    /// Chain an underlying cause, e.g. a store-level I/O failure.
    pub fn with_cause(
        mut self,
        cause: impl Into<Box<dyn std::error::Error + Send + Sync + 'static>>,
    ) -> Self {
        self.cause = Some(cause.into());
        self
    }

    /// The stable error code.
    pub fn code(&self) -> ErrCode {
        self.code
    }

    /// The syscall-shaped operation name that detected the failure, e.g. `"rename"`.
    pub fn syscall(&self) -> &'static str {
        self.syscall
    }

    /// The user-visible path, if one was attached.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

impl fmt::Debug for VfsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VfsError")
            .field("code", &self.code)
            .field("syscall", &self.syscall)
            .field("path", &self.path)
            .field("message", &self.message)
            .finish()
    }
}

impl fmt::Display for VfsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.path {
            Some(path) => write!(
                f,
                "{}: {} ({}): {}",
                self.syscall,
                self.code,
                path.display(),
                self.message
            ),
            None => write!(f, "{}: {}: {}", self.syscall, self.code, self.message),
        }
    }
}

impl std::error::Error for VfsError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause
            .as_ref()
            .map(|c| c.as_ref() as &(dyn std::error::Error + 'static))
    }
}

impl From<VfsError> for io::Error {
    fn from(err: VfsError) -> Self {
        io::Error::from_raw_os_error(err.code.to_raw_os_error())
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, VfsError>;

/// Shorthand constructors for the common codes, named after the syscall that raised them.
pub mod raise {
    use super::{ErrCode, VfsError};
    use std::path::Path;

    /// `ENOENT` at `syscall` for `path`.
    pub fn enoent(syscall: &'static str, path: impl AsRef<Path>) -> VfsError {
        VfsError::new(ErrCode::Enoent, syscall, "no such file or directory").with_path(path)
    }

    /// `EEXIST` at `syscall` for `path`.
    pub fn eexist(syscall: &'static str, path: impl AsRef<Path>) -> VfsError {
        VfsError::new(ErrCode::Eexist, syscall, "file exists").with_path(path)
    }

    /// `ENOTDIR` at `syscall` for `path`.
    pub fn enotdir(syscall: &'static str, path: impl AsRef<Path>) -> VfsError {
        VfsError::new(ErrCode::Enotdir, syscall, "not a directory").with_path(path)
    }

    /// `EISDIR` at `syscall` for `path`.
    pub fn eisdir(syscall: &'static str, path: impl AsRef<Path>) -> VfsError {
        VfsError::new(ErrCode::Eisdir, syscall, "is a directory").with_path(path)
    }

    /// `ENOTEMPTY` at `syscall` for `path`.
    pub fn enotempty(syscall: &'static str, path: impl AsRef<Path>) -> VfsError {
        VfsError::new(ErrCode::Enotempty, syscall, "directory not empty").with_path(path)
    }

    /// `EXDEV` at `syscall` between two mounts.
    pub fn exdev(syscall: &'static str, path: impl AsRef<Path>) -> VfsError {
        VfsError::new(ErrCode::Exdev, syscall, "cross-device link").with_path(path)
    }

    /// `ENOSPC` at `syscall`.
    pub fn enospc(syscall: &'static str) -> VfsError {
        VfsError::new(ErrCode::Enospc, syscall, "no space left on device")
    }

    /// `EROFS` at `syscall` for `path`.
    pub fn erofs(syscall: &'static str, path: impl AsRef<Path>) -> VfsError {
        VfsError::new(ErrCode::Erofs, syscall, "read-only filesystem").with_path(path)
    }

    /// `EBUSY` at `syscall`.
    pub fn ebusy(syscall: &'static str) -> VfsError {
        VfsError::new(ErrCode::Ebusy, syscall, "resource busy")
    }

    /// `EBADF` at `syscall`.
    pub fn ebadf(syscall: &'static str) -> VfsError {
        VfsError::new(ErrCode::Ebadf, syscall, "bad file descriptor")
    }

    /// `EINVAL` at `syscall`, with a free-form `why`.
    pub fn einval(syscall: &'static str, why: impl Into<String>) -> VfsError {
        VfsError::new(ErrCode::Einval, syscall, why)
    }

    /// `EPERM` at `syscall` for `path`.
    pub fn eperm(syscall: &'static str, path: impl AsRef<Path>) -> VfsError {
        VfsError::new(ErrCode::Eperm, syscall, "operation not permitted").with_path(path)
    }

    /// `EACCES` at `syscall` for `path`.
    pub fn eacces(syscall: &'static str, path: impl AsRef<Path>) -> VfsError {
        VfsError::new(ErrCode::Eacces, syscall, "permission denied").with_path(path)
    }

    /// `ENOTSUP` at `syscall`.
    pub fn enotsup(syscall: &'static str) -> VfsError {
        VfsError::new(ErrCode::Enotsup, syscall, "operation not supported")
    }

    /// `EDEADLK` at `syscall`, with the stack captured when the ticket was acquired.
    pub fn edeadlk(syscall: &'static str, acquired_at: impl Into<String>) -> VfsError {
        VfsError::new(ErrCode::Edeadlk, syscall, "resource deadlock would occur")
            .with_cause(DeadlockCause(acquired_at.into()))
    }

    /// `EIO` at `syscall`, chaining `cause`.
    pub fn eio(
        syscall: &'static str,
        cause: impl Into<Box<dyn std::error::Error + Send + Sync + 'static>>,
    ) -> VfsError {
        VfsError::new(ErrCode::Eio, syscall, "I/O error").with_cause(cause)
    }

    #[derive(Debug)]
    struct DeadlockCause(String);

    impl std::fmt::Display for DeadlockCause {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "ticket acquired at: {}", self.0)
        }
    }

    impl std::error::Error for DeadlockCause {}
}
