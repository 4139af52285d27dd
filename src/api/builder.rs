use std::{env, error::Error, path::PathBuf};

use crate::{
    build::{OutputTarget, DEFAULT_OUTPUT_DIRECTORY},
    fetch::{FetchSettings, DEFAULT_JOBS},
    GrammarFetch,
};

#[derive(Default)]
pub struct GrammarFetchBuilder {
    // All other paths are relative to `root`
    root: Option<PathBuf>,
    manifest_file_name: Option<PathBuf>,
    layout_file_name: Option<PathBuf>,
    vendor_directory: Option<PathBuf>,
    output_directory: Option<PathBuf>,
    jobs: Option<usize>,
    verify: bool,
}

impl GrammarFetchBuilder {
    /// Project root directory.
    ///
    /// Defaults to the current directory.
    pub fn root(mut self, path: impl Into<PathBuf>) -> Self {
        self.root = Some(path.into());
        self
    }

    /// Name of the manifest listing `<url> <revision>` pairs.
    ///
    /// Defaults to `repos.txt`.
    pub fn manifest_file_name(mut self, path: impl Into<PathBuf>) -> Self {
        self.manifest_file_name = Some(path.into());
        self
    }

    /// Name of the optional grammar layout file.
    ///
    /// Defaults to `grammars.toml`. A missing file means every checkout is one grammar.
    pub fn layout_file_name(mut self, path: impl Into<PathBuf>) -> Self {
        self.layout_file_name = Some(path.into());
        self
    }

    /// Directory the grammar repositories are checked out into.
    ///
    /// Defaults to `vendor`.
    pub fn vendor_directory(mut self, path: impl Into<PathBuf>) -> Self {
        self.vendor_directory = Some(path.into());
        self
    }

    /// Directory the shared library is written to.
    ///
    /// Defaults to `tree_sitter_languages`.
    pub fn output_directory(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_directory = Some(path.into());
        self
    }

    /// Number of repositories fetched concurrently.
    ///
    /// Defaults to 8.
    pub fn jobs(mut self, jobs: usize) -> Self {
        self.jobs = Some(jobs);
        self
    }

    /// Check existing checkouts against the manifest revision instead of
    /// trusting that the directory exists.
    pub fn verify(mut self, verify: bool) -> Self {
        self.verify = verify;
        self
    }

    pub fn try_build(self) -> Result<GrammarFetch, Box<dyn Error>> {
        let Self {
            root,
            manifest_file_name,
            layout_file_name,
            vendor_directory,
            output_directory,
            jobs,
            verify,
        } = self;
        let root = match root {
            Some(root) => root,
            None => env::current_dir()?,
        };

        let manifest_file_name = manifest_file_name.unwrap_or_else(|| PathBuf::from("repos.txt"));

        let layout_file_name = layout_file_name.unwrap_or_else(|| PathBuf::from("grammars.toml"));

        let vendor_directory = vendor_directory.unwrap_or_else(|| PathBuf::from("vendor"));

        let output = OutputTarget::for_current_platform(
            output_directory.unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIRECTORY)),
        );

        let jobs = jobs.unwrap_or(DEFAULT_JOBS);
        if jobs == 0 {
            return Err("The number of jobs must be at least 1".into());
        }

        Ok(GrammarFetch {
            root,
            manifest_file_name,
            layout_file_name,
            vendor_directory,
            output,
            settings: FetchSettings { jobs, verify },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_jobs_is_rejected() {
        let result = GrammarFetchBuilder::default()
            .root("/tmp")
            .jobs(0)
            .try_build();
        assert!(result.is_err());
    }
}
