//! Compiling vendored grammars into one shared library.

use std::{
    fs,
    path::{Path, PathBuf},
    process::Command,
    time::SystemTime,
};

use log::{debug, info, warn};
use thiserror::Error;

pub const DEFAULT_OUTPUT_DIRECTORY: &str = "tree_sitter_languages";
const OBJECT_DIRECTORY: &str = "obj";
/// Suffix of the file listing the grammars a library was built from.
const SOURCES_STAMP_SUFFIX: &str = ".sources";
const OPT_LEVEL: u32 = 2;

#[derive(Error, Debug)]
pub enum BuildError {
    #[error("No src/parser.c found in {0}")]
    MissingParser(PathBuf),
    #[error("Compilation of {grammar} failed: {source}")]
    Compilation {
        grammar: String,
        #[source]
        source: cc::Error,
    },
    #[error("Linking {output} failed: {message}")]
    Link { output: String, message: String },
    #[error("IO error: {0}")]
    IO(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildStatus {
    Built,
    /// The library is newer than every grammar source.
    UpToDate,
}

/// Turns grammar source directories into a single shared library.
pub trait LibraryBuilder {
    fn build(&self, sources: &[PathBuf], output: &Path) -> Result<BuildStatus, BuildError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Platform {
    Windows,
    MacOs,
    Linux,
    Other,
}

impl Platform {
    pub fn current() -> Platform {
        if cfg!(target_os = "windows") {
            Platform::Windows
        } else if cfg!(target_os = "macos") {
            Platform::MacOs
        } else if cfg!(target_os = "linux") {
            Platform::Linux
        } else {
            Platform::Other
        }
    }
}

/// Library file names for platforms that do not use the default.
const LIBRARY_FILE_NAMES: &[(Platform, &str)] = &[(Platform::Windows, "languages.dll")];
const DEFAULT_LIBRARY_FILE_NAME: &str = "languages.so";

/// Where the shared library is written for a given platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputTarget {
    pub directory: PathBuf,
    pub platform: Platform,
}

impl OutputTarget {
    pub fn new(directory: impl Into<PathBuf>, platform: Platform) -> Self {
        Self {
            directory: directory.into(),
            platform,
        }
    }

    pub fn for_current_platform(directory: impl Into<PathBuf>) -> Self {
        Self::new(directory, Platform::current())
    }

    pub fn file_name(&self) -> &'static str {
        LIBRARY_FILE_NAMES
            .iter()
            .find(|(platform, _)| *platform == self.platform)
            .map(|(_, name)| *name)
            .unwrap_or(DEFAULT_LIBRARY_FILE_NAME)
    }

    pub fn path(&self) -> PathBuf {
        self.directory.join(self.file_name())
    }
}

/// Compilable files of one grammar.
#[derive(Debug, Clone, PartialEq, Eq)]
struct GrammarSources {
    name: String,
    src_dir: PathBuf,
    parser: PathBuf,
    c_scanner: Option<PathBuf>,
    cpp_scanner: Option<PathBuf>,
}

impl GrammarSources {
    fn locate(grammar_dir: &Path) -> Result<GrammarSources, BuildError> {
        let src_dir = grammar_dir.join("src");
        let parser = src_dir.join("parser.c");
        if !parser.is_file() {
            return Err(BuildError::MissingParser(grammar_dir.to_path_buf()));
        }
        let existing = |name: &str| Some(src_dir.join(name)).filter(|path| path.is_file());
        let c_scanner = existing("scanner.c");
        let cpp_scanner = existing("scanner.cc");

        Ok(GrammarSources {
            name: grammar_dir
                .components()
                .rev()
                .take(2)
                .collect::<Vec<_>>()
                .into_iter()
                .rev()
                .map(|component| component.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("-"),
            c_scanner,
            cpp_scanner,
            parser,
            src_dir,
        })
    }

    fn files(&self) -> impl Iterator<Item = &PathBuf> {
        std::iter::once(&self.parser)
            .chain(self.c_scanner.as_ref())
            .chain(self.cpp_scanner.as_ref())
    }
}

/// Builds the library with the system C/C++ toolchain through the `cc` crate.
#[derive(Debug, Clone)]
pub struct CcLibraryBuilder {
    force: bool,
    target: String,
}

impl Default for CcLibraryBuilder {
    fn default() -> Self {
        Self {
            force: false,
            target: host_triple(),
        }
    }
}

impl CcLibraryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild even if the library is newer than its sources.
    pub fn force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    fn base_build(&self, grammar: &GrammarSources, out_dir: &Path) -> cc::Build {
        let mut build = cc::Build::new();
        build
            .cargo_metadata(false)
            .emit_rerun_if_env_changed(false)
            .warnings(false)
            .opt_level(OPT_LEVEL)
            .debug(false)
            .pic(true)
            .host(&self.target)
            .target(&self.target)
            .include(&grammar.src_dir)
            .out_dir(out_dir);
        build
    }

    fn compile_grammar(
        &self,
        grammar: &GrammarSources,
        out_dir: &Path,
    ) -> Result<Vec<PathBuf>, BuildError> {
        debug!("Compiling {} into {}", grammar.name, out_dir.display());
        fs::create_dir_all(out_dir)?;
        let compilation_error = |source| BuildError::Compilation {
            grammar: grammar.name.clone(),
            source,
        };

        let mut c_build = self.base_build(grammar, out_dir);
        c_build.std("c11").file(&grammar.parser);
        if let Some(scanner) = &grammar.c_scanner {
            c_build.file(scanner);
        }
        let mut objects = c_build
            .try_compile_intermediates()
            .map_err(compilation_error)?;

        if let Some(scanner) = &grammar.cpp_scanner {
            let mut cpp_build = self.base_build(grammar, out_dir);
            cpp_build.cpp(true).std("c++14").file(scanner);
            objects.extend(
                cpp_build
                    .try_compile_intermediates()
                    .map_err(compilation_error)?,
            );
        }

        Ok(objects)
    }

    fn link(&self, objects: &[PathBuf], output: &Path, cpp: bool) -> Result<(), BuildError> {
        let link_error = |message: String| BuildError::Link {
            output: output.display().to_string(),
            message,
        };

        let mut build = cc::Build::new();
        build
            .cargo_metadata(false)
            .emit_rerun_if_env_changed(false)
            .opt_level(OPT_LEVEL)
            .debug(false)
            .pic(true)
            .cpp(cpp)
            .host(&self.target)
            .target(&self.target);
        let compiler = build
            .try_get_compiler()
            .map_err(|error| link_error(error.to_string()))?;

        let mut command = compiler.to_command();
        if compiler.is_like_msvc() {
            command
                .arg("/nologo")
                .arg("/LD")
                .args(objects)
                .arg("/link")
                .arg(format!("/OUT:{}", output.display()));
        } else {
            command.arg("-shared").arg("-o").arg(output).args(objects);
        }

        run_linker(command).map_err(link_error)
    }
}

impl LibraryBuilder for CcLibraryBuilder {
    fn build(&self, sources: &[PathBuf], output: &Path) -> Result<BuildStatus, BuildError> {
        let grammars = sources
            .iter()
            .map(|dir| GrammarSources::locate(dir))
            .collect::<Result<Vec<_>, _>>()?;

        let inputs = grammars.iter().flat_map(|grammar| grammar.files());
        if !self.force && is_up_to_date(output, sources, inputs) {
            info!("{} is up to date", output.display());
            return Ok(BuildStatus::UpToDate);
        }

        let output_dir = output.parent().unwrap_or(Path::new("."));
        fs::create_dir_all(output_dir)?;
        let object_root = output_dir.join(OBJECT_DIRECTORY);

        info!(
            "Building {} from {} grammars",
            output.display(),
            grammars.len()
        );

        let result = self.compile_and_link(&grammars, &object_root, output);
        if object_root.exists() {
            if let Err(error) = fs::remove_dir_all(&object_root) {
                warn!(
                    "Could not remove object directory {}: {}",
                    object_root.display(),
                    error
                );
            }
        }
        result?;

        fs::write(sources_stamp(output), source_listing(sources))?;
        info!("Built {}", output.display());
        Ok(BuildStatus::Built)
    }
}

impl CcLibraryBuilder {
    fn compile_and_link(
        &self,
        grammars: &[GrammarSources],
        object_root: &Path,
        output: &Path,
    ) -> Result<(), BuildError> {
        let mut objects = Vec::new();
        for (index, grammar) in grammars.iter().enumerate() {
            let out_dir = object_root.join(format!("{index:03}-{}", grammar.name));
            objects.extend(self.compile_grammar(grammar, &out_dir)?);
        }

        let cpp = grammars.iter().any(|grammar| grammar.cpp_scanner.is_some());
        self.link(&objects, output, cpp)
    }
}

/// File next to `output` recording the grammar directories it was built from.
pub fn sources_stamp(output: &Path) -> PathBuf {
    let mut path = output.as_os_str().to_owned();
    path.push(SOURCES_STAMP_SUFFIX);
    PathBuf::from(path)
}

fn source_listing(sources: &[PathBuf]) -> String {
    sources
        .iter()
        .map(|source| format!("{}\n", source.display()))
        .collect()
}

fn run_linker(mut command: Command) -> Result<(), String> {
    debug!("Running {:?}", command);
    let output = command.output().map_err(|error| error.to_string())?;
    if output.status.success() {
        Ok(())
    } else {
        Err(String::from_utf8_lossy(&output.stderr).into_owned())
    }
}

fn modified(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).and_then(|m| m.modified()).ok()
}

/// True when `output` was built from exactly `sources` and no input file is newer than it.
fn is_up_to_date<'a>(
    output: &Path,
    sources: &[PathBuf],
    inputs: impl IntoIterator<Item = &'a PathBuf>,
) -> bool {
    let Some(output_mtime) = modified(output) else {
        return false;
    };
    match fs::read_to_string(sources_stamp(output)) {
        Ok(listing) if listing == source_listing(sources) => {}
        _ => {
            debug!("Grammar list of {} changed", output.display());
            return false;
        }
    }
    inputs
        .into_iter()
        .all(|source| modified(source).is_some_and(|mtime| mtime <= output_mtime))
}

/// Target triple of the running host, preferring `TARGET` when set.
fn host_triple() -> String {
    std::env::var("TARGET").unwrap_or_else(|_| {
        let arch = std::env::consts::ARCH;
        match Platform::current() {
            Platform::Windows => format!("{arch}-pc-windows-msvc"),
            Platform::MacOs => format!("{arch}-apple-darwin"),
            Platform::Linux => format!("{arch}-unknown-linux-gnu"),
            Platform::Other => format!("{arch}-unknown-{}", std::env::consts::OS),
        }
    })
}
