//! In-process stand-ins for git and the C toolchain.

use std::{
    collections::HashSet,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    },
    time::Duration,
};

use crate::{
    build::{BuildError, BuildStatus, LibraryBuilder},
    fetch::RepositoryFetcher,
    model::ManifestEntry,
};

/// File a [`FakeFetcher`] checkout records its revision in.
pub const MARKER: &str = ".revision";

/// Writes the revision into a marker file instead of talking to a remote.
#[derive(Default)]
pub struct FakeFetcher {
    calls: Mutex<Vec<String>>,
    failing: HashSet<String>,
    delays: Vec<(String, Duration)>,
    default_delay: Duration,
    running: AtomicUsize,
    peak: AtomicUsize,
}

impl FakeFetcher {
    pub fn failing(directories: &[&str]) -> Self {
        Self {
            failing: directories.iter().map(|d| d.to_string()).collect(),
            ..Default::default()
        }
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            default_delay: delay,
            ..Default::default()
        }
    }

    /// Makes fetching `directory` take `delay`.
    pub fn delay(mut self, directory: &str, delay: Duration) -> Self {
        self.delays.push((directory.to_owned(), delay));
        self
    }

    /// Fetched directories, sorted.
    pub fn calls(&self) -> Vec<String> {
        let mut calls = self.calls.lock().unwrap().clone();
        calls.sort();
        calls
    }

    /// Directories in the order their fetch finished.
    pub fn completion_order(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Highest number of fetches observed running at once.
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

impl RepositoryFetcher for FakeFetcher {
    type Error = std::io::Error;

    fn fetch(&self, entry: &ManifestEntry, destination: &Path) -> Result<(), Self::Error> {
        let running = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(running, Ordering::SeqCst);
        let delay = self
            .delays
            .iter()
            .find(|(directory, _)| *directory == entry.directory)
            .map(|(_, delay)| *delay)
            .unwrap_or(self.default_delay);
        std::thread::sleep(delay);
        self.running.fetch_sub(1, Ordering::SeqCst);
        self.calls.lock().unwrap().push(entry.directory.clone());

        std::fs::write(destination.join(".git"), "")?;
        if self.failing.contains(&entry.directory) {
            return Err(std::io::Error::other(format!("reference {} not found", entry.revision)));
        }
        std::fs::write(destination.join(MARKER), &entry.revision)
    }

    fn is_checked_out(
        &self,
        entry: &ManifestEntry,
        destination: &Path,
    ) -> Result<bool, Self::Error> {
        let revision = std::fs::read_to_string(destination.join(MARKER));
        Ok(revision.is_ok_and(|revision| revision == entry.revision))
    }
}

/// Records every build call instead of compiling.
#[derive(Default)]
pub struct RecordingBuilder {
    calls: Mutex<Vec<(Vec<PathBuf>, PathBuf)>>,
}

impl RecordingBuilder {
    pub fn calls(&self) -> Vec<(Vec<PathBuf>, PathBuf)> {
        self.calls.lock().unwrap().clone()
    }
}

impl LibraryBuilder for RecordingBuilder {
    fn build(&self, sources: &[PathBuf], output: &Path) -> Result<BuildStatus, BuildError> {
        self.calls
            .lock()
            .unwrap()
            .push((sources.to_vec(), output.to_path_buf()));
        Ok(BuildStatus::Built)
    }
}
