use std::{error::Error, path::PathBuf, sync::Arc};

use crate::{
    build::{BuildStatus, CcLibraryBuilder, OutputTarget},
    cli::command_handlers::{do_build, do_clean, do_fetch},
    fetch::{FetchSettings, FetchSummary},
    git::GitFetcher,
    model::{GrammarLayout, Manifest},
};

mod builder;

pub use builder::GrammarFetchBuilder;

pub struct GrammarFetch {
    root: PathBuf,
    manifest_file_name: PathBuf,
    layout_file_name: PathBuf,
    vendor_directory: PathBuf,
    output: OutputTarget,
    settings: FetchSettings,
}

impl GrammarFetch {
    pub fn builder() -> GrammarFetchBuilder {
        GrammarFetchBuilder::default()
    }

    /// Checks out every manifest entry that is not in the vendor directory yet
    pub fn fetch(&self) -> Result<FetchSummary, Box<dyn Error>> {
        let manifest = self.load_manifest()?;
        do_fetch(
            Arc::new(GitFetcher::new()),
            &manifest,
            &self.vendor_directory(),
            &self.settings,
        )
    }

    /// Fetches, then compiles every grammar into the shared library
    pub fn build(&self, force: bool) -> Result<BuildStatus, Box<dyn Error>> {
        let manifest = self.load_manifest()?;
        let layout = GrammarLayout::from_file_if_exists(&self.root.join(&self.layout_file_name))?;
        do_build(
            Arc::new(GitFetcher::new()),
            &CcLibraryBuilder::new().force(force),
            &manifest,
            &layout,
            &self.vendor_directory(),
            &self.output_path(),
            &self.settings,
        )
    }

    /// Delete the vendored grammars and the built library
    pub fn clean(&self) -> Result<(), Box<dyn Error>> {
        do_clean(&self.vendor_directory(), &self.output_path())
    }

    pub fn output_path(&self) -> PathBuf {
        self.root.join(self.output.path())
    }

    fn vendor_directory(&self) -> PathBuf {
        self.root.join(&self.vendor_directory)
    }

    fn load_manifest(&self) -> Result<Manifest, Box<dyn Error>> {
        let path = self.root.join(&self.manifest_file_name);
        let manifest = Manifest::from_file(&path)
            .map_err(|e| format!("Could not load manifest {}: {}", path.display(), e))?;
        log::debug!(
            "Loaded {} manifest entries from {}",
            manifest.len(),
            path.display()
        );
        Ok(manifest)
    }
}
