use std::{
    fs::File,
    path::Path,
    time::{Duration, Instant},
};

use fs4::fs_std::FileExt;
use log::debug;
use thiserror::Error;

const LOCK_TIMEOUT: Duration = Duration::from_secs(300);
const RETRY_INTERVAL: Duration = Duration::from_secs(1);

/// Exclusive advisory lock held for as long as the value lives.
#[derive(Debug)]
pub struct FileLock {
    _file: File,
}

#[derive(Error, Debug)]
#[error(transparent)]
pub struct Error(#[from] std::io::Error);

impl FileLock {
    pub fn new(path: &Path) -> Result<Self, Error> {
        Self::with_timeout(path, LOCK_TIMEOUT)
    }

    pub fn with_timeout(path: &Path, timeout: Duration) -> Result<Self, Error> {
        let file = File::create(path)?;
        let start = Instant::now();
        while !file.try_lock_exclusive()? {
            if start.elapsed() >= timeout {
                return Err(fs4::lock_contended_error().into());
            }
            debug!("Another run holds the lock on {}, retrying", path.display());
            std::thread::sleep(RETRY_INTERVAL);
        }
        Ok(Self { _file: file })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_is_released_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".grammarfetch.lock");

        let first = FileLock::new(&path).unwrap();
        assert!(path.exists());
        drop(first);

        FileLock::with_timeout(&path, Duration::ZERO).expect("lock should be free again");
    }

    #[test]
    fn held_lock_is_exclusive() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".grammarfetch.lock");

        let _held = FileLock::new(&path).unwrap();
        assert!(FileLock::with_timeout(&path, Duration::ZERO).is_err());
    }
}
