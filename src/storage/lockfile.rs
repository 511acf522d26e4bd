//! Single-instance lock.
//!
//! Two supervisors on the same data directory would restart the same apps
//! twice and race on the stats file, so startup takes a PID lock file there.

use anyhow::{bail, Context, Result};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Outcome of inspecting an existing lock file.
#[derive(Debug, PartialEq, Eq)]
enum ExistingLock {
    /// Held by a live process.
    Held(u32),
    /// Left behind by a process that is gone.
    Stale,
    /// Unreadable or not a PID.
    Garbage,
}

/// PID lock file, removed on drop.
#[derive(Debug)]
pub struct ProcessLock {
    lock_path: PathBuf,
    owned: bool,
}

impl ProcessLock {
    pub const LOCK_FILE_NAME: &'static str = ".vsphone-guardian.lock";

    /// Take the lock in `data_dir`, creating the directory if needed.
    ///
    /// Fails when another live process holds it. Stale and unreadable lock
    /// files are replaced.
    pub fn acquire<P: AsRef<Path>>(data_dir: P) -> Result<Self> {
        let data_dir = data_dir.as_ref();
        fs::create_dir_all(data_dir)
            .with_context(|| format!("Failed to create data directory {}", data_dir.display()))?;

        let lock_path = data_dir.join(Self::LOCK_FILE_NAME);

        match inspect(&lock_path) {
            Some(ExistingLock::Held(pid)) => bail!(
                "Another vsphone-guardian instance is already running (PID {pid}).\n\
                 Stop it first, or remove {} if that process is not a supervisor.",
                lock_path.display()
            ),
            Some(ExistingLock::Stale) => {
                tracing::info!(path = %lock_path.display(), "Removing stale lock file");
                fs::remove_file(&lock_path).context("Failed to remove stale lock file")?;
            }
            Some(ExistingLock::Garbage) => {
                tracing::warn!(path = %lock_path.display(), "Lock file unreadable, replacing it");
                fs::remove_file(&lock_path).context("Failed to remove unreadable lock file")?;
            }
            None => {}
        }

        // create_new: a concurrent starter that got here first wins
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&lock_path)
            .with_context(|| format!("Failed to create lock file {}", lock_path.display()))?;

        let pid = std::process::id();
        writeln!(file, "{pid}").context("Failed to write PID to lock file")?;
        tracing::debug!(pid, path = %lock_path.display(), "Acquired process lock");

        Ok(Self {
            lock_path,
            owned: true,
        })
    }

    /// Remove the lock file. Called automatically on drop.
    pub fn release(&mut self) {
        if !self.owned {
            return;
        }
        match fs::remove_file(&self.lock_path) {
            Ok(()) => tracing::debug!(path = %self.lock_path.display(), "Released process lock"),
            Err(e) => tracing::warn!(path = %self.lock_path.display(), error = %e, "Failed to remove lock file"),
        }
        self.owned = false;
    }

    pub fn path(&self) -> &Path {
        &self.lock_path
    }
}

impl Drop for ProcessLock {
    fn drop(&mut self) {
        self.release();
    }
}

fn inspect(lock_path: &Path) -> Option<ExistingLock> {
    let contents = match fs::read_to_string(lock_path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
        Err(_) => return Some(ExistingLock::Garbage),
    };
    let Ok(pid) = contents.trim().parse::<u32>() else {
        return Some(ExistingLock::Garbage);
    };
    // Our own PID means this process already holds it
    if pid == std::process::id() || is_alive(pid) {
        Some(ExistingLock::Held(pid))
    } else {
        Some(ExistingLock::Stale)
    }
}

#[cfg(unix)]
#[allow(unsafe_code)]
fn is_alive(pid: u32) -> bool {
    let Ok(pid) = libc::pid_t::try_from(pid) else {
        return false;
    };
    if pid <= 0 {
        return false;
    }
    // SAFETY: signal 0 performs the permission and existence checks only.
    let rc = unsafe { libc::kill(pid, 0) };
    rc == 0 || std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

#[cfg(not(unix))]
fn is_alive(_pid: u32) -> bool {
    // No cheap liveness probe; treat the lock as held.
    true
}
