use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{GateError, Result};

const LOCK_EXTENSION: &str = "lock";

// ---------------------------------------------------------------------------
// ExclusiveGate
// ---------------------------------------------------------------------------

/// A named, host-wide mutual exclusion primitive backed by `flock(2)`.
///
/// Every process that constructs a gate with the same lock directory and
/// name contends for the same lock file. The lock is advisory and is held
/// per open file description, so two gates in one process also exclude
/// each other. Re-entrant locking is not supported: a holder that locks the
/// same gate again through a second instance blocks forever.
#[derive(Clone, Debug)]
pub struct ExclusiveGate {
    name: String,
    path: PathBuf,
}

impl ExclusiveGate {
    /// Create a gate named `name` whose lock file lives under `lock_dir`.
    ///
    /// The directory is created on first lock, not here.
    pub fn new(lock_dir: impl AsRef<Path>, name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        let usable = !name.is_empty()
            && name != "."
            && name != ".."
            && !name.contains(['/', '\\', '\0']);
        if !usable {
            return Err(GateError::InvalidName(name));
        }
        let path = lock_dir
            .as_ref()
            .join(format!("{name}.{LOCK_EXTENSION}"));
        Ok(Self { name, path })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Path of the backing lock file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Block until this process holds the gate.
    pub fn lock(&self) -> Result<GateGuard> {
        let file = self.open()?;
        debug!(gate = %self.name, path = %self.path.display(), "waiting for gate");
        flock_exclusive(&file, true).map_err(|source| GateError::LockFailed {
            name: self.name.clone(),
            source,
        })?;
        info!(gate = %self.name, "gate acquired");
        Ok(GateGuard {
            _file: file,
            name: self.name.clone(),
        })
    }

    /// Take the gate if nobody holds it, without blocking.
    pub fn try_lock(&self) -> Result<Option<GateGuard>> {
        let file = self.open()?;
        match flock_exclusive(&file, false) {
            Ok(true) => {
                info!(gate = %self.name, "gate acquired");
                Ok(Some(GateGuard {
                    _file: file,
                    name: self.name.clone(),
                }))
            }
            Ok(false) => Ok(None),
            Err(source) => Err(GateError::LockFailed {
                name: self.name.clone(),
                source,
            }),
        }
    }

    /// Run `f` while holding the gate. The gate is released on every exit
    /// path, including when `f` returns an error or panics.
    pub fn with_lock<T, E, F>(&self, f: F) -> std::result::Result<T, E>
    where
        F: FnOnce() -> std::result::Result<T, E>,
        E: From<GateError>,
    {
        let guard = self.lock()?;
        let result = f();
        guard.unlock();
        result
    }

    fn open(&self) -> Result<File> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir).map_err(|source| GateError::Io {
                path: dir.to_path_buf(),
                source,
            })?;
        }
        OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&self.path)
            .map_err(|source| GateError::Io {
                path: self.path.clone(),
                source,
            })
    }
}

// ---------------------------------------------------------------------------
// GateGuard
// ---------------------------------------------------------------------------

/// Proof of holding an [`ExclusiveGate`].
///
/// The lock belongs to the open file; closing it on drop releases the lock.
pub struct GateGuard {
    _file: File,
    name: String,
}

impl GateGuard {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Release the gate now.
    pub fn unlock(self) {
        drop(self);
    }
}

impl Drop for GateGuard {
    fn drop(&mut self) {
        debug!(gate = %self.name, "gate released");
    }
}

impl fmt::Debug for GateGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GateGuard")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Take an exclusive `flock` on `file`.
///
/// Returns `Ok(false)` only in non-blocking mode when another holder has it.
fn flock_exclusive(file: &File, block: bool) -> io::Result<bool> {
    #[cfg(unix)]
    {
        use std::os::unix::io::AsRawFd;

        let fd = file.as_raw_fd();
        let operation = if block {
            libc::LOCK_EX
        } else {
            libc::LOCK_EX | libc::LOCK_NB
        };
        loop {
            // SAFETY: fd is a valid descriptor owned by `file` for the
            // duration of the call.
            #[allow(unsafe_code)]
            let result = unsafe { libc::flock(fd, operation) };
            if result == 0 {
                return Ok(true);
            }
            let err = io::Error::last_os_error();
            match err.raw_os_error() {
                Some(libc::EINTR) => continue,
                Some(code) if !block && code == libc::EWOULDBLOCK => return Ok(false),
                _ => return Err(err),
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = (file, block);
        Ok(true)
    }
}
