use clap::{Parser, Subcommand};

/// Vendors pinned tree-sitter grammars and builds them into one shared library.
#[derive(Debug, Parser)]
#[clap(version)]
pub struct CliArgs {
    #[clap(subcommand)]
    pub cmd: Option<Command>,
    /// Manifest listing `<url> <revision>` pairs, one per line
    #[clap(short, long, default_value = "repos.txt")]
    pub manifest: String,
    /// Directory the grammar repositories are checked out into
    #[clap(long)]
    pub vendor_dir: Option<String>,
    /// Directory the shared library is written to
    #[clap(short, long)]
    pub output_dir: Option<String>,
    /// Optional file mapping checkouts to the grammar directories they contain
    #[clap(long, default_value = "grammars.toml")]
    pub layout: String,
    /// Number of repositories fetched concurrently
    #[clap(short, long)]
    pub jobs: Option<usize>,
    /// Check existing checkouts against the manifest revision and refetch stale ones
    #[clap(long)]
    pub verify: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Fetches the grammar repositories and builds the shared library
    Build {
        /// Rebuild even if the library is newer than every grammar source
        #[clap(short, long)]
        force: bool,
    },
    /// Fetches the grammar repositories without building
    Fetch,
    /// Removes the vendor directory and the built library
    Clean,
}
