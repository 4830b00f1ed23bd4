//! Reading replace configs and turning them into a [`Replacer`].

use crate::config::schema::{ReplaceConfig, ValidationError};
use crate::replacer::Replacer;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Settings given on the command line; they win over the config file.
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub target: Option<String>,
    pub source_map: Option<bool>,
}

impl Overrides {
    fn apply_to(&self, config: &mut ReplaceConfig) {
        if let Some(target) = &self.target {
            log::debug!("target overridden: {} -> {}", config.options.target, target);
            config.options.target = target.clone();
        }
        if let Some(source_map) = self.source_map {
            config.options.source_map = source_map;
        }
    }
}

/// Where a config came from, for error messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Origin {
    Inline,
    File(PathBuf),
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Origin::Inline => f.write_str("<inline>"),
            Origin::File(path) => write!(f, "{}", path.display()),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read replace config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("replace config {origin} is not valid TOML: {source}")]
    Syntax {
        origin: Origin,
        #[source]
        source: toml_edit::de::Error,
    },

    #[error("replace config {origin} cannot be used:\n{source}")]
    Invalid {
        origin: Origin,
        #[source]
        source: ValidationError,
    },
}

fn parse(input: &str, origin: &Origin) -> Result<ReplaceConfig, ConfigError> {
    toml_edit::de::from_str(input).map_err(|source| ConfigError::Syntax {
        origin: origin.clone(),
        source,
    })
}

fn read(path: &Path) -> Result<String, ConfigError> {
    fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })
}

fn build(
    mut config: ReplaceConfig,
    overrides: &Overrides,
    origin: Origin,
) -> Result<Replacer, ConfigError> {
    overrides.apply_to(&mut config);
    config
        .build()
        .map_err(|source| ConfigError::Invalid { origin, source })
}

/// Parse TOML into a config without compiling it.
pub fn load_from_str(input: &str) -> Result<ReplaceConfig, ConfigError> {
    parse(input, &Origin::Inline)
}

pub fn load_from_path(path: impl AsRef<Path>) -> Result<ReplaceConfig, ConfigError> {
    let path = path.as_ref();
    parse(&read(path)?, &Origin::File(path.to_path_buf()))
}

/// Parse, apply `overrides` and compile in one step.
pub fn replacer_from_str(input: &str, overrides: &Overrides) -> Result<Replacer, ConfigError> {
    build(load_from_str(input)?, overrides, Origin::Inline)
}

/// Read the config at `path` and compile it with `overrides` applied.
pub fn load_replacer(
    path: impl AsRef<Path>,
    overrides: &Overrides,
) -> Result<Replacer, ConfigError> {
    let path = path.as_ref();
    build(load_from_path(path)?, overrides, Origin::File(path.to_path_buf()))
}
