use std::{collections::HashMap, path::PathBuf};

use config::{Config, ConfigError, Environment};
use serde::Deserialize;

/// Settings read from `GRAMMARFETCH_*` environment variables.
///
/// Command line flags take precedence over these.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct GrammarfetchConfig {
    pub vendor_dir: Option<PathBuf>,
    pub jobs: Option<usize>,
    pub verify: Option<bool>,
    pub output_dir: Option<PathBuf>,
}

impl GrammarfetchConfig {
    pub fn load() -> anyhow::Result<Self> {
        Ok(RawConfig::load(None)?.into())
    }
}

impl From<RawConfig> for GrammarfetchConfig {
    fn from(raw_config: RawConfig) -> Self {
        Self {
            vendor_dir: raw_config.vendor.dir,
            jobs: raw_config.fetch.jobs,
            verify: raw_config.fetch.verify,
            output_dir: raw_config.build.output,
        }
    }
}

#[derive(Default, Debug, Deserialize, PartialEq, Eq)]
struct RawConfig {
    #[serde(default)]
    vendor: VendorConfig,
    #[serde(default)]
    fetch: FetchConfig,
    #[serde(default)]
    build: BuildConfig,
}

#[derive(Default, Debug, Deserialize, PartialEq, Eq)]
struct VendorConfig {
    dir: Option<PathBuf>,
}

#[derive(Default, Debug, Deserialize, PartialEq, Eq)]
struct FetchConfig {
    jobs: Option<usize>,
    verify: Option<bool>,
}

#[derive(Default, Debug, Deserialize, PartialEq, Eq)]
struct BuildConfig {
    output: Option<PathBuf>,
}

impl RawConfig {
    fn load(env: Option<HashMap<String, String>>) -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(
                Environment::with_prefix("GRAMMARFETCH")
                    .separator("_")
                    .try_parsing(true)
                    .source(env),
            )
            .build()?
            .try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;

    #[test]
    fn load_empty() {
        let env = HashMap::from([]);
        let config = RawConfig::load(Some(env)).unwrap();
        assert_eq!(config, RawConfig::default());
    }

    #[test]
    fn load_environment() {
        let env = HashMap::from([
            ("GRAMMARFETCH_VENDOR_DIR".to_owned(), "/vendor".to_owned()),
            ("GRAMMARFETCH_FETCH_JOBS".to_owned(), "16".to_owned()),
            ("GRAMMARFETCH_FETCH_VERIFY".to_owned(), "true".to_owned()),
            ("GRAMMARFETCH_BUILD_OUTPUT".to_owned(), "lib".to_owned()),
        ]);
        let config: GrammarfetchConfig = RawConfig::load(Some(env)).unwrap().into();
        assert_eq!(
            config,
            GrammarfetchConfig {
                vendor_dir: Some("/vendor".into()),
                jobs: Some(16),
                verify: Some(true),
                output_dir: Some("lib".into()),
            }
        )
    }
}
