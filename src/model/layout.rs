use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use serde::Deserialize;
use thiserror::Error;

use super::Manifest;

#[derive(Error, Debug)]
pub enum LayoutError {
    #[error("IO error reading grammar layout: {0}")]
    IO(#[from] std::io::Error),
    #[error("TOML parsing error in grammar layout: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Grammar layout mentions `{0}`, which is not in the manifest")]
    UnknownDirectory(String),
    #[error("Grammar layout for `{directory}` has an absolute or escaping path `{path}`")]
    BadPath { directory: String, path: String },
}

/// How a single vendored repository contributes to the build.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct GrammarRule {
    /// Grammar roots inside the repository, relative to the checkout.
    #[serde(default)]
    pub paths: Vec<PathBuf>,
    #[serde(default)]
    pub skip: bool,
}

/// Optional overrides mapping checkout directories to the grammar roots they hold.
///
/// Repositories without a rule contribute their checkout directory as-is.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct GrammarLayout {
    #[serde(default)]
    pub grammar: BTreeMap<String, GrammarRule>,
}

impl GrammarLayout {
    pub fn from_file(path: &Path) -> Result<GrammarLayout, LayoutError> {
        GrammarLayout::from_str(&std::fs::read_to_string(path)?)
    }

    /// Loads `path` when it exists, falling back to the empty layout.
    pub fn from_file_if_exists(path: &Path) -> Result<GrammarLayout, LayoutError> {
        if path.exists() {
            log::debug!("Loading grammar layout from {}", path.display());
            GrammarLayout::from_file(path)
        } else {
            Ok(GrammarLayout::default())
        }
    }

    pub fn from_str(s: &str) -> Result<GrammarLayout, LayoutError> {
        let layout: GrammarLayout = toml::from_str(s)?;
        for (directory, rule) in &layout.grammar {
            if let Some(path) = rule.paths.iter().find(|path| !is_relative_inside(path)) {
                return Err(LayoutError::BadPath {
                    directory: directory.clone(),
                    path: path.display().to_string(),
                });
            }
        }
        Ok(layout)
    }

    /// Grammar source directories to build, in manifest order.
    pub fn source_directories(
        &self,
        manifest: &Manifest,
        vendor_dir: &Path,
    ) -> Result<Vec<PathBuf>, LayoutError> {
        if let Some(unknown) = self.grammar.keys().find(|directory| {
            !manifest
                .entries
                .iter()
                .any(|entry| &entry.directory == *directory)
        }) {
            return Err(LayoutError::UnknownDirectory(unknown.clone()));
        }

        let mut sources = Vec::with_capacity(manifest.len());
        for entry in &manifest.entries {
            let checkout = entry.path_in(vendor_dir);
            match self.grammar.get(&entry.directory) {
                Some(rule) if rule.skip => {
                    log::debug!("Skipping grammar {} per layout", entry.directory);
                }
                Some(rule) if !rule.paths.is_empty() => {
                    sources.extend(rule.paths.iter().map(|path| checkout.join(path)));
                }
                _ => sources.push(checkout),
            }
        }
        Ok(sources)
    }
}

fn is_relative_inside(path: &Path) -> bool {
    path.components()
        .all(|component| matches!(component, std::path::Component::Normal(_)))
}
