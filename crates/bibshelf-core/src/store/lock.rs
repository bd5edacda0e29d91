//! Cross-process advisory lock on the metadata snapshot.
//!
//! A sentinel file holds the pid of the current writer. Waiters poll; a lock
//! whose holder pid is no longer alive is reclaimed. Release happens on
//! `Drop`, so an interrupted command cannot leave the lock held.

use crate::error::Result;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

/// Poll interval while the lock is contended.
const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// RAII guard over the pid sentinel file.
pub struct FileLock {
    path: PathBuf,
}

impl FileLock {
    /// Block until the lock can be taken. Writers are serialized but not
    /// FIFO-fair: arrival order among blocked waiters is not guaranteed.
    pub fn acquire(path: &Path) -> Result<Self> {
        let mut warned = false;
        loop {
            match OpenOptions::new().write(true).create_new(true).open(path) {
                Ok(mut file) => {
                    writeln!(file, "{}", std::process::id())?;
                    return Ok(Self {
                        path: path.to_path_buf(),
                    });
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    let holder = fs::read_to_string(path)
                        .ok()
                        .and_then(|s| s.trim().parse::<u32>().ok());

                    match holder {
                        Some(pid) if !pid_alive(pid) => {
                            warn!(pid, "reclaiming stale lock left by dead process");
                            let _ = fs::remove_file(path);
                            continue;
                        }
                        Some(pid) if !warned => {
                            warn!(pid, "waiting for lock on document repository");
                            warned = true;
                        }
                        _ => {}
                    }
                    std::thread::sleep(POLL_INTERVAL);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

/// Whether a process with this pid is still alive. Uses /proc where
/// available; elsewhere the holder is assumed live and we keep waiting.
#[cfg(target_os = "linux")]
fn pid_alive(pid: u32) -> bool {
    Path::new(&format!("/proc/{}", pid)).exists()
}

#[cfg(not(target_os = "linux"))]
fn pid_alive(_pid: u32) -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acquire_writes_pid_and_releases_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metadata.lock");

        {
            let _lock = FileLock::acquire(&path).unwrap();
            let contents = fs::read_to_string(&path).unwrap();
            assert_eq!(
                contents.trim().parse::<u32>().unwrap(),
                std::process::id()
            );
        }
        assert!(!path.exists());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_stale_lock_is_reclaimed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metadata.lock");

        // A pid far beyond any real process.
        fs::write(&path, "999999999\n").unwrap();

        let _lock = FileLock::acquire(&path).unwrap();
        let contents = fs::read_to_string(&path).unwrap();
        assert_eq!(contents.trim().parse::<u32>().unwrap(), std::process::id());
    }

    #[test]
    fn test_contended_acquire_blocks_until_release() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metadata.lock");

        let lock = FileLock::acquire(&path).unwrap();
        let path2 = path.clone();
        let waiter = std::thread::spawn(move || {
            let _lock = FileLock::acquire(&path2).unwrap();
        });

        std::thread::sleep(Duration::from_millis(300));
        drop(lock);
        waiter.join().unwrap();
        assert!(!path.exists());
    }
}
