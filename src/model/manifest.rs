use std::{
    collections::HashMap,
    fmt::Display,
    path::{Path, PathBuf},
};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("IO error reading manifest: {0}")]
    IO(#[from] std::io::Error),
    #[error("Malformed manifest line {line_number}: expected `<url> <revision>`, found {fields} field(s)")]
    Malformed { line_number: usize, fields: usize },
    #[error("Cannot derive a directory name from url `{0}`")]
    InvalidUrl(String),
    #[error("Manifest lines {first} and {second} both check out into `{directory}`")]
    DuplicateDirectory {
        directory: String,
        first: usize,
        second: usize,
    },
}

/// A single pinned grammar repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    pub url: String,
    pub revision: String,
    /// Name of the checkout directory under the vendor root.
    pub directory: String,
}

impl ManifestEntry {
    pub fn new(url: impl Into<String>, revision: impl Into<String>) -> Result<Self, ManifestError> {
        let url = url.into();
        let directory = directory_name(&url)?.to_owned();
        Ok(ManifestEntry {
            url,
            revision: revision.into(),
            directory,
        })
    }

    pub fn path_in(&self, vendor_dir: &Path) -> PathBuf {
        vendor_dir.join(&self.directory)
    }
}

impl Display for ManifestEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (revision {})", self.url, self.revision)
    }
}

/// Last path segment of `url`, ignoring trailing slashes.
pub fn directory_name(url: &str) -> Result<&str, ManifestError> {
    match url.trim_end_matches('/').rsplit('/').next() {
        Some(name) if !name.is_empty() => Ok(name),
        _ => Err(ManifestError::InvalidUrl(url.to_owned())),
    }
}

/// Ordered list of grammar repositories to vendor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    pub entries: Vec<ManifestEntry>,
}

impl Manifest {
    pub fn from_file(path: &Path) -> Result<Manifest, ManifestError> {
        let contents = std::fs::read_to_string(path)?;
        Manifest::from_str(&contents)
    }

    pub fn from_str(s: &str) -> Result<Manifest, ManifestError> {
        let mut entries = Vec::new();
        let mut seen: HashMap<String, usize> = HashMap::new();

        for (index, line) in s.lines().enumerate() {
            let line_number = index + 1;
            let fields: Vec<&str> = line.split_whitespace().collect();
            let [url, revision] = fields.as_slice() else {
                return Err(ManifestError::Malformed {
                    line_number,
                    fields: fields.len(),
                });
            };

            let entry = ManifestEntry::new(*url, *revision)?;
            if let Some(first) = seen.insert(entry.directory.clone(), line_number) {
                return Err(ManifestError::DuplicateDirectory {
                    directory: entry.directory,
                    first,
                    second: line_number,
                });
            }
            entries.push(entry);
        }

        Ok(Manifest { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Checkout paths of every entry, in manifest order.
    pub fn directories(&self, vendor_dir: &Path) -> Vec<PathBuf> {
        self.entries
            .iter()
            .map(|entry| entry.path_in(vendor_dir))
            .collect()
    }
}
