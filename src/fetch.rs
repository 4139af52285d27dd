use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use log::{debug, error, info, warn};
use thiserror::Error;

use crate::{
    flock::FileLock,
    model::{Manifest, ManifestEntry},
};

const LOCK_FILE_NAME: &str = ".grammarfetch.lock";
pub const DEFAULT_JOBS: usize = 8;

/// Version control operations needed to vendor a single repository.
pub trait RepositoryFetcher: Send + Sync + 'static {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Populates the empty directory `destination` with a checkout of `entry.revision`.
    fn fetch(&self, entry: &ManifestEntry, destination: &Path) -> Result<(), Self::Error>;

    /// Whether `destination` holds a complete checkout of `entry.revision`.
    fn is_checked_out(
        &self,
        entry: &ManifestEntry,
        destination: &Path,
    ) -> Result<bool, Self::Error>;
}

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("IO error: {0}")]
    IO(#[from] std::io::Error),
    #[error("Vendor location {0} is not a directory")]
    BadVendorDir(String),
    #[error("Vendor lock cannot be acquired")]
    Lock(#[from] crate::flock::Error),
    #[error("Failed to fetch {url}: {source}")]
    Repository {
        url: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    #[error("Fetch worker for {directory} panicked")]
    Worker { directory: String },
    #[error("{} of {total} grammar repositories failed to fetch", .failures.len())]
    Failed {
        failures: Vec<FetchOutcome>,
        total: usize,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchStatus {
    /// Freshly cloned.
    Fetched,
    /// Already on disk, left untouched.
    Present,
    /// Found stale during verification and cloned again.
    Refreshed,
}

#[derive(Debug)]
pub struct FetchOutcome {
    pub directory: String,
    pub result: Result<FetchStatus, FetchError>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FetchSummary {
    pub fetched: usize,
    pub present: usize,
    pub refreshed: usize,
    /// Every checkout was already on disk, so nothing was submitted.
    pub phase_skipped: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchSettings {
    /// Size of the worker pool.
    pub jobs: usize,
    /// Check existing checkouts against the manifest revision.
    pub verify: bool,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            jobs: DEFAULT_JOBS,
            verify: false,
        }
    }
}

/// Root directory holding one checkout per manifest entry.
///
/// An exclusive lock on the directory is held while the value lives, so
/// concurrent runs against the same tree wait for each other.
#[derive(Debug)]
pub struct VendorDir {
    location: PathBuf,
    _lock: FileLock,
}

impl VendorDir {
    pub fn open(location: PathBuf) -> Result<VendorDir, FetchError> {
        if location.exists() {
            if !location.is_dir() {
                return Err(FetchError::BadVendorDir(location.display().to_string()));
            }
        } else {
            fs::create_dir_all(&location)?;
        }

        let lock_path = location.join(LOCK_FILE_NAME);
        debug!(
            "Acquiring a lock on the vendor directory: {}",
            lock_path.display()
        );
        let lock = FileLock::new(&lock_path)?;
        debug!("Acquired a lock on the vendor directory");

        Ok(VendorDir {
            location,
            _lock: lock,
        })
    }

    pub fn location(&self) -> &Path {
        &self.location
    }

    /// Removes every checkout, leaving only the lock file.
    pub fn clear(&self) -> Result<(), FetchError> {
        for dir_entry in fs::read_dir(&self.location)? {
            let dir_entry = dir_entry?;
            if dir_entry.file_name() != LOCK_FILE_NAME {
                remove_path(&dir_entry.path())?;
            }
        }
        Ok(())
    }

    /// Number of sub-directories, ignoring plain files such as the lock.
    fn checkout_count(&self) -> Result<usize, FetchError> {
        let mut count = 0;
        for dir_entry in fs::read_dir(&self.location)? {
            if dir_entry?.file_type()?.is_dir() {
                count += 1;
            }
        }
        Ok(count)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Job {
    Fetch,
    Verify,
}

/// Ensures every manifest entry has a checkout under `vendor`.
///
/// Entries are fetched concurrently on a pool of `settings.jobs` workers.
/// Every submitted entry runs to completion; if any of them failed, the
/// collected failures are returned as [`FetchError::Failed`].
pub fn fetch_all<F: RepositoryFetcher>(
    fetcher: Arc<F>,
    manifest: &Manifest,
    vendor: &VendorDir,
    settings: &FetchSettings,
) -> Result<FetchSummary, FetchError> {
    if !settings.verify && vendor.checkout_count()? == manifest.len() {
        info!("Grammar repositories have been fetched already.");
        return Ok(FetchSummary {
            present: manifest.len(),
            phase_skipped: true,
            ..Default::default()
        });
    }

    let outcomes = fetch_entries(fetcher, manifest, vendor.location(), settings)?;
    summarize(outcomes, manifest.len())
}

/// Runs the fetch of every entry and collects one outcome per entry, in manifest order.
pub fn fetch_entries<F: RepositoryFetcher>(
    fetcher: Arc<F>,
    manifest: &Manifest,
    vendor_dir: &Path,
    settings: &FetchSettings,
) -> Result<Vec<FetchOutcome>, FetchError> {
    let mut outcomes: Vec<Option<FetchOutcome>> = Vec::with_capacity(manifest.len());
    let mut jobs = Vec::new();

    for (index, entry) in manifest.entries.iter().enumerate() {
        let destination = entry.path_in(vendor_dir);
        let exists = fs::symlink_metadata(&destination).is_ok();
        match (exists, settings.verify) {
            (true, false) => {
                debug!(
                    "Skipping {}. Already in {}",
                    entry.url,
                    destination.display()
                );
                outcomes.push(Some(FetchOutcome {
                    directory: entry.directory.clone(),
                    result: Ok(FetchStatus::Present),
                }));
            }
            (true, true) => {
                outcomes.push(None);
                jobs.push((index, Job::Verify));
            }
            (false, _) => {
                outcomes.push(None);
                jobs.push((index, Job::Fetch));
            }
        }
    }

    if jobs.is_empty() {
        return Ok(outcomes.into_iter().flatten().collect());
    }

    let workers = settings.jobs.max(1);
    info!(
        "Fetching {} grammar repositories with {} workers...",
        jobs.len(),
        workers
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .max_blocking_threads(workers)
        .thread_name("grammarfetch-worker")
        .build()?;

    let handles: Vec<_> = jobs
        .into_iter()
        .map(|(index, job)| {
            let fetcher = Arc::clone(&fetcher);
            let entry = manifest.entries[index].clone();
            let destination = entry.path_in(vendor_dir);
            let handle = runtime.spawn_blocking(move || {
                run_job(fetcher.as_ref(), &entry, &destination, job)
            });
            (index, handle)
        })
        .collect();

    runtime.block_on(async {
        for (index, handle) in handles {
            let directory = manifest.entries[index].directory.clone();
            let result = match handle.await {
                Ok(result) => result,
                Err(join_error) => {
                    error!("Worker fetching {} failed: {}", directory, join_error);
                    Err(FetchError::Worker {
                        directory: directory.clone(),
                    })
                }
            };
            outcomes[index] = Some(FetchOutcome { directory, result });
        }
    });

    Ok(outcomes.into_iter().flatten().collect())
}

fn summarize(outcomes: Vec<FetchOutcome>, total: usize) -> Result<FetchSummary, FetchError> {
    let mut summary = FetchSummary::default();
    let mut failures = Vec::new();

    for outcome in outcomes {
        match &outcome.result {
            Ok(FetchStatus::Fetched) => summary.fetched += 1,
            Ok(FetchStatus::Present) => summary.present += 1,
            Ok(FetchStatus::Refreshed) => summary.refreshed += 1,
            Err(error) => {
                error!("Could not fetch {}: {}", outcome.directory, error);
                failures.push(outcome);
            }
        }
    }

    if failures.is_empty() {
        info!(
            "Fetched {} grammar repositories ({} already present, {} refreshed)",
            summary.fetched, summary.present, summary.refreshed
        );
        Ok(summary)
    } else {
        Err(FetchError::Failed { failures, total })
    }
}

fn run_job<F: RepositoryFetcher>(
    fetcher: &F,
    entry: &ManifestEntry,
    destination: &Path,
    job: Job,
) -> Result<FetchStatus, FetchError> {
    match job {
        Job::Fetch => {
            clone_into(fetcher, entry, destination)?;
            Ok(FetchStatus::Fetched)
        }
        Job::Verify => {
            let checked_out = fetcher
                .is_checked_out(entry, destination)
                .map_err(|error| repository_error(entry, error))?;
            if checked_out {
                debug!("{} is at {}", destination.display(), entry.revision);
                return Ok(FetchStatus::Present);
            }
            warn!(
                "{} is not a checkout of {}, fetching it again",
                destination.display(),
                entry
            );
            remove_path(destination)?;
            clone_into(fetcher, entry, destination)?;
            Ok(FetchStatus::Refreshed)
        }
    }
}

fn clone_into<F: RepositoryFetcher>(
    fetcher: &F,
    entry: &ManifestEntry,
    destination: &Path,
) -> Result<(), FetchError> {
    info!("Fetching {} --> {}", entry, destination.display());

    fs::create_dir(destination)?;
    if let Err(error) = fetcher.fetch(entry, destination) {
        // A half-initialised directory would pass for a finished checkout next run.
        if let Err(cleanup_error) = fs::remove_dir_all(destination) {
            warn!(
                "Could not remove partial checkout {}: {}",
                destination.display(),
                cleanup_error
            );
        }
        return Err(repository_error(entry, error));
    }
    Ok(())
}

fn remove_path(path: &Path) -> std::io::Result<()> {
    if fs::symlink_metadata(path)?.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    }
}

fn repository_error<E>(entry: &ManifestEntry, error: E) -> FetchError
where
    E: std::error::Error + Send + Sync + 'static,
{
    FetchError::Repository {
        url: entry.url.clone(),
        source: Box::new(error),
    }
}
