//! Configuration handling for ti-scaffold
//!
//! Configuration is resolved from four layers, highest precedence first:
//! CLI flags, environment variables, a config file, and the built-in
//! default (empty, which fails validation).
//!
//! The config file is either the path given with `--config` or the first
//! of `scaffold.yaml`, `scaffold.yml`, `scaffold.toml`, `scaffold.json`
//! found in the working directory.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

use crate::domain::{PartialConfig, ScaffoldConfig, ValidationError};

/// Config file names probed in the working directory, in order
pub const DEFAULT_CONFIG_FILES: [&str; 4] = [
    "scaffold.yaml",
    "scaffold.yml",
    "scaffold.toml",
    "scaffold.json",
];

/// Keys recognized in config files and the environment
const KEY_NAME: &str = "name";
const KEY_PACKAGE: &str = "package";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("failed to read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse config file {}: {message}", path.display())]
    Parse { path: PathBuf, message: String },

    #[error(transparent)]
    Invalid(#[from] ValidationError),
}

/// Serialization format of a config file, chosen by extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Yaml,
    Toml,
    Json,
}

impl ConfigFormat {
    /// Unknown extensions are read as YAML, which also accepts JSON
    pub fn from_path(path: &Path) -> Self {
        match path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .as_deref()
        {
            Some("toml") => ConfigFormat::Toml,
            Some("json") => ConfigFormat::Json,
            _ => ConfigFormat::Yaml,
        }
    }

    fn parse(self, content: &str) -> Result<PartialConfig, String> {
        match self {
            ConfigFormat::Yaml => {
                // An empty YAML document is a valid, empty config
                if content.trim().is_empty() {
                    return Ok(PartialConfig::default());
                }
                serde_yaml::from_str(content).map_err(|e| e.to_string())
            }
            ConfigFormat::Toml => toml::from_str(content).map_err(|e| e.to_string()),
            ConfigFormat::Json => serde_json::from_str(content).map_err(|e| e.to_string()),
        }
    }
}

/// Where the file layer comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    /// Path given explicitly; it must exist
    Explicit(PathBuf),

    /// Probe the conventional names in this directory; absence is fine
    Conventional(PathBuf),
}

impl ConfigSource {
    /// Picks the explicit path if given (relative to `working_dir`), else the
    /// conventional lookup in `working_dir`
    pub fn select(explicit: Option<&Path>, working_dir: &Path) -> Self {
        match explicit {
            Some(path) => ConfigSource::Explicit(working_dir.join(path)),
            None => ConfigSource::Conventional(working_dir.to_path_buf()),
        }
    }

    /// Returns the file to read, if any
    ///
    /// An explicit path that exists is returned even when it is not a
    /// readable file, so reading it reports the real failure.
    pub fn locate(&self) -> Result<Option<PathBuf>, ConfigError> {
        match self {
            ConfigSource::Explicit(path) => {
                if path.exists() {
                    Ok(Some(path.clone()))
                } else {
                    Err(ConfigError::NotFound(path.clone()))
                }
            }
            ConfigSource::Conventional(dir) => Ok(DEFAULT_CONFIG_FILES
                .iter()
                .map(|name| dir.join(name))
                .find(|path| path.is_file())),
        }
    }

    /// Reads and parses the selected file into a layer
    pub fn load(&self) -> Result<PartialConfig, ConfigError> {
        let Some(path) = self.locate()? else {
            debug!("no config file found, skipping file layer");
            return Ok(PartialConfig::default());
        };

        load_file(&path)
    }
}

/// Reads a single config file
pub fn load_file(path: &Path) -> Result<PartialConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| match source.kind() {
        io::ErrorKind::NotFound => ConfigError::NotFound(path.to_path_buf()),
        _ => ConfigError::Read {
            path: path.to_path_buf(),
            source,
        },
    })?;

    let layer = ConfigFormat::from_path(path)
        .parse(&content)
        .map_err(|message| ConfigError::Parse {
            path: path.to_path_buf(),
            message,
        })?;

    debug!(path = %path.display(), "loaded config file");
    Ok(PartialConfig::new(layer.name, layer.package))
}

/// Snapshot of the environment used as a configuration layer
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvLayer {
    vars: BTreeMap<String, String>,
}

impl EnvLayer {
    pub fn new<I, K, V>(vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: vars
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Captures the current process environment
    pub fn from_process() -> Self {
        Self::new(std::env::vars())
    }

    /// Looks up `key` case-insensitively; the upper-case spelling wins,
    /// other spellings are taken in sorted order
    pub fn get(&self, key: &str) -> Option<&str> {
        let upper = key.to_ascii_uppercase();
        if let Some(value) = self.vars.get(&upper).filter(|v| !v.is_empty()) {
            return Some(value.as_str());
        }

        self.vars
            .iter()
            .filter(|(k, v)| k.eq_ignore_ascii_case(key) && !v.is_empty())
            .map(|(_, v)| v.as_str())
            .next()
    }

    pub fn layer(&self) -> PartialConfig {
        PartialConfig::new(
            self.get(KEY_NAME).map(String::from),
            self.get(KEY_PACKAGE).map(String::from),
        )
    }
}

/// Merges file, environment and flag layers, then validates
pub fn resolve(
    source: &ConfigSource,
    env: &EnvLayer,
    flags: PartialConfig,
) -> Result<ScaffoldConfig, ConfigError> {
    let file = source.load()?;
    let env = env.layer();

    let merged = PartialConfig::layered([file, env, flags]);
    debug!(
        name = merged.name.as_deref().unwrap_or(""),
        package = merged.package.as_deref().unwrap_or(""),
        "merged configuration layers"
    );

    Ok(merged.resolve()?)
}
