mod checkout;
mod remote;

pub use checkout::{GitError, GitFetcher};
