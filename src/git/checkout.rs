use std::path::Path;

use git2::{build::CheckoutBuilder, Config, Oid, Repository};
use log::{debug, trace};
use thiserror::Error;

use crate::{fetch::RepositoryFetcher, model::ManifestEntry};

use super::remote::shallow_fetch_options;

const REMOTE_NAME: &str = "origin";
/// Git config key recording the manifest revision a checkout was made from.
const PINNED_REVISION_KEY: &str = "grammarfetch.revision";

#[derive(Error, Debug)]
pub enum GitError {
    #[error("Git error: {0}")]
    Git(#[from] git2::Error),
    #[error("Fetching {revision} from {url} did not produce a commit")]
    NothingFetched { url: String, revision: String },
}

/// Checks out pinned revisions with libgit2.
#[derive(Debug, Clone)]
pub struct GitFetcher {
    depth: i32,
}

impl Default for GitFetcher {
    fn default() -> Self {
        Self { depth: 1 }
    }
}

impl GitFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// History depth of each fetch; `0` fetches full history.
    pub fn with_depth(depth: i32) -> Self {
        Self { depth }
    }

    fn fetch_revision(&self, repo: &Repository, entry: &ManifestEntry) -> Result<Oid, GitError> {
        let git_config = Config::open_default()?;
        let mut options = shallow_fetch_options(&git_config, self.depth);
        let mut remote = repo.find_remote(REMOTE_NAME)?;

        debug!(
            "Fetching {} from {} (depth {})",
            entry.revision, entry.url, self.depth
        );
        remote.fetch(&[entry.revision.as_str()], Some(&mut options), None)?;

        let fetched = match fetch_head(repo)? {
            Some(oid) => Some(oid),
            None => repo
                .revparse_single(&entry.revision)
                .and_then(|object| object.peel_to_commit())
                .map(|commit| commit.id())
                .ok(),
        };

        fetched.ok_or_else(|| GitError::NothingFetched {
            url: entry.url.clone(),
            revision: entry.revision.clone(),
        })
    }

    fn checkout_detached(&self, repo: &Repository, oid: Oid) -> Result<(), GitError> {
        // Annotated tags fetch as tag objects.
        let commit = repo.find_object(oid, None)?.peel_to_commit()?;
        trace!("Checking out {}", commit.id());
        repo.checkout_tree(commit.as_object(), Some(CheckoutBuilder::new().force()))?;
        repo.set_head_detached(commit.id())?;
        Ok(())
    }
}

impl RepositoryFetcher for GitFetcher {
    type Error = GitError;

    fn fetch(&self, entry: &ManifestEntry, destination: &Path) -> Result<(), GitError> {
        let repo = Repository::init(destination)?;
        repo.remote(REMOTE_NAME, &entry.url)?;

        let oid = self.fetch_revision(&repo, entry)?;
        self.checkout_detached(&repo, oid)?;
        repo.config()?
            .set_str(PINNED_REVISION_KEY, &entry.revision)?;

        Ok(())
    }

    fn is_checked_out(&self, entry: &ManifestEntry, destination: &Path) -> Result<bool, GitError> {
        let repo = match Repository::open(destination) {
            Ok(repo) => repo,
            Err(error) => {
                debug!("{} is not a git checkout: {}", destination.display(), error);
                return Ok(false);
            }
        };

        let pinned = match repo.config()?.get_string(PINNED_REVISION_KEY) {
            Ok(pinned) => pinned,
            Err(error) if error.code() == git2::ErrorCode::NotFound => return Ok(false),
            Err(error) => return Err(error.into()),
        };
        if pinned != entry.revision {
            debug!(
                "{} is pinned at {}, manifest wants {}",
                destination.display(),
                pinned,
                entry.revision
            );
            return Ok(false);
        }

        let head = match repo.head().and_then(|head| head.peel_to_commit()) {
            Ok(commit) => commit.id(),
            Err(_) => return Ok(false),
        };
        if !looks_like_commit_id(&entry.revision) {
            return Ok(true);
        }
        let wanted = entry.revision.to_ascii_lowercase();
        Ok(head.to_string().starts_with(&wanted))
    }
}

/// First commit recorded in `FETCH_HEAD`, if any.
fn fetch_head(repo: &Repository) -> Result<Option<Oid>, git2::Error> {
    let mut fetched = None;
    let result = repo.fetchhead_foreach(|_ref_name, _url, oid, _is_merge| {
        fetched = Some(*oid);
        false
    });
    match result {
        Ok(()) => {}
        // Stopping early reports as a user abort.
        Err(error) if error.code() == git2::ErrorCode::User => {}
        Err(error) if error.code() == git2::ErrorCode::NotFound => {}
        Err(error) => return Err(error),
    }
    Ok(fetched)
}

fn looks_like_commit_id(revision: &str) -> bool {
    (4..=40).contains(&revision.len()) && revision.chars().all(|c| c.is_ascii_hexdigit())
}
