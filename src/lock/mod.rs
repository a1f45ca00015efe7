// src/lock/mod.rs

//! Exclusive lock over the package database
//!
//! Commands that change the system hold this lock for their whole run so that
//! two administrators cannot drive the engine at the same time. The lock is a
//! PID-stamped file locked with `flock(LOCK_EX | LOCK_NB)`: there is no waiting
//! and no retry. When someone else holds it, the holder process is inspected
//! to tell the user who is in the way.
//!
//! # Example
//!
//! ```ignore
//! use pkgrecap::lock::{with_lock, ProcFs};
//!
//! with_lock(&config.lock.path, &ProcFs::default(), &mut engine, |engine| {
//!     engine.mark_update(&patterns, &sink)?;
//!     // ...
//!     Ok(())
//! })?;
//! ```

mod procfs;

pub use procfs::{reconstruct_command, ProcFs, ProcessInspector};

use crate::engine::TransactionEngine;
use crate::error::{Error, Result};
use fs2::FileExt;
use serde::Serialize;
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Who holds the lock, built only when acquisition fails
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LockOwner {
    pub pid: u32,
    /// Path of the holder's executable, as found on its command line
    pub executable: String,
    /// Holder's command, executable name followed by its arguments
    pub command_line: String,
    pub user: String,
}

impl LockOwner {
    /// Owner whose process could not be inspected
    pub fn unknown(pid: u32) -> Self {
        Self {
            pid,
            executable: "unknown".to_string(),
            command_line: "unknown".to_string(),
            user: "unknown".to_string(),
        }
    }
}

impl fmt::Display for LockOwner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "the package system is being used by another administrator (user: {}, cmd: '{}', pid: {})",
            self.user, self.command_line, self.pid
        )
    }
}

/// Held lock; released on `release` or drop
#[derive(Debug)]
pub struct PackageLock {
    file: File,
    path: PathBuf,
    released: bool,
}

impl PackageLock {
    /// Default lock path
    pub const DEFAULT_PATH: &'static str = "/var/run/pkgrecap.pid";

    /// Try to take the lock without blocking
    ///
    /// Fails with:
    /// - `Error::LockCreate` when we are not allowed to create or lock the file
    /// - `Error::LockHeld` when another process holds it, with the holder's identity
    pub fn acquire<P: AsRef<Path>>(path: P, inspector: &dyn ProcessInspector) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|e| lock_create_error(&path, e))?;
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| lock_create_error(&path, e))?;

        match file.try_lock_exclusive() {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                let pid = read_pid(&file).unwrap_or(0);
                debug!("Lock at {:?} held by pid {}", path, pid);
                return Err(Error::LockHeld(diagnose(pid, inspector)));
            }
            Err(e) => return Err(lock_create_error(&path, e)),
        }

        let mut lock = Self {
            file,
            path,
            released: false,
        };
        lock.stamp()?;

        info!("Acquired package lock at {:?}", lock.path);
        Ok(lock)
    }

    /// Path of the lock file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Clear our PID and release the lock
    pub fn release(mut self) -> Result<()> {
        self.released = true;
        self.file.set_len(0)?;
        self.file.unlock()?;
        info!("Released package lock at {:?}", self.path);
        Ok(())
    }

    fn stamp(&mut self) -> Result<()> {
        self.file.set_len(0)?;
        self.file.seek(SeekFrom::Start(0))?;
        writeln!(self.file, "{}", std::process::id())?;
        self.file.sync_data()?;
        Ok(())
    }
}

impl Drop for PackageLock {
    fn drop(&mut self) {
        if !self.released {
            let _ = self.file.set_len(0);
            let _ = self.file.unlock();
            debug!("Released package lock at {:?} on drop", self.path);
        }
    }
}

/// Run `work` while holding the lock
///
/// Whatever `work` returns, the engine's database handle is closed and the
/// lock released before returning. The error from `work` takes precedence
/// over errors from the cleanup.
pub fn with_lock<E, T, F>(
    path: &Path,
    inspector: &dyn ProcessInspector,
    engine: &mut E,
    work: F,
) -> Result<T>
where
    E: TransactionEngine + ?Sized,
    F: FnOnce(&mut E) -> Result<T>,
{
    let lock = PackageLock::acquire(path, inspector)?;

    let outcome = work(engine);
    let closed = engine.close();
    let released = lock.release();

    let value = outcome?;
    closed?;
    released?;
    Ok(value)
}

fn lock_create_error(path: &Path, source: io::Error) -> Error {
    if is_permission_error(&source) {
        Error::LockCreate {
            path: path.to_path_buf(),
            source,
        }
    } else {
        Error::Io(source)
    }
}

/// EACCES / EPERM: we may not create or lock the file at all
pub(crate) fn is_permission_error(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::PermissionDenied
        || matches!(err.raw_os_error(), Some(libc::EACCES) | Some(libc::EPERM))
}

fn read_pid(mut file: &File) -> Option<u32> {
    let mut content = String::new();
    file.seek(SeekFrom::Start(0)).ok()?;
    file.read_to_string(&mut content).ok()?;
    content.trim().parse().ok()
}

fn diagnose(pid: u32, inspector: &dyn ProcessInspector) -> LockOwner {
    if pid == 0 {
        return LockOwner::unknown(pid);
    }

    match inspector.inspect(pid) {
        Ok(owner) => owner,
        Err(e) => {
            debug!("Could not inspect lock holder {}: {}", pid, e);
            LockOwner::unknown(pid)
        }
    }
}
