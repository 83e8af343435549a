use std::fs;
use std::path::{Path, PathBuf};

use sombra_sessions::storage::Config;
use sombra_sessions::SessionError;
use thiserror::Error;

/// Configuration resolved for one CLI invocation.
#[derive(Debug, Default)]
pub struct CliConfig {
    path: Option<PathBuf>,
    loaded: bool,
    config: Config,
}

impl CliConfig {
    /// Reads `explicit`, or the default location when none is given. A file that
    /// does not exist yields the built-in defaults.
    pub fn load(explicit: Option<PathBuf>) -> Result<Self, ConfigError> {
        let path = explicit.or_else(default_config_path);
        let (config, loaded) = match path.as_ref() {
            Some(config_path) if config_path.exists() => (read_file(config_path)?, true),
            _ => (Config::default(), false),
        };
        Ok(Self {
            path,
            loaded,
            config,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Whether the configuration came from a file rather than defaults.
    pub fn loaded(&self) -> bool {
        self.loaded
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn render(&self) -> Result<String, ConfigError> {
        self.config
            .to_toml_string()
            .map_err(|source| ConfigError::Serialize { source })
    }
}

fn read_file(path: &Path) -> Result<Config, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    Config::from_toml_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read sessions config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid sessions config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: SessionError,
    },
    #[error("failed to serialize sessions config: {source}")]
    Serialize { source: SessionError },
}

pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|base| base.join("sombra").join("sessions.toml"))
}
