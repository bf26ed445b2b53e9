use std::path::Path;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::checksum::Algorithm;
use crate::error::{IoResultExt, Result};

/// vendor tag written in checksum record names
pub const DEFAULT_VENDOR: &str = "LDT";

/// cap on the key+value bytes of one checksum record
///
/// tar readers commonly refuse special records above 1 MiB; keep 128 KiB of headroom.
pub const DEFAULT_RECORD_CAP: usize = (1 << 20) - (128 << 10);

/// archive codec configuration, optionally loaded from a toml file
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// vendor tag of checksum records
    pub vendor: String,
    /// algorithm used for embedded checksums
    pub algorithm: Algorithm,
    /// split checksum records once their key+value bytes reach this size
    pub record_cap: usize,
    /// extra exclusion pattern applied while collecting files
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exclude: Option<String>,
}

impl Config {
    /// load config from file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).with_path(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// save config to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).with_path(path)?;
        Ok(())
    }

    /// compiled exclusion pattern, if any
    pub fn exclude_pattern(&self) -> Result<Option<Regex>> {
        Ok(self.exclude.as_deref().map(Regex::new).transpose()?)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            vendor: DEFAULT_VENDOR.to_string(),
            algorithm: Algorithm::Xxh3,
            record_cap: DEFAULT_RECORD_CAP,
            exclude: None,
        }
    }
}
