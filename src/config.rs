use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Where CloudBerry keeps plan documents and the history log on a stock
/// install. Overridable via config file or `--data-dir`.
pub const DEFAULT_DATA_DIR: &str = r"C:\ProgramData\CloudBerry Backup Enterprise Edition";

/// Top-level configuration loaded from collector.toml.
#[derive(Debug, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct Config {
    pub collector: CollectorConfig,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct CollectorConfig {
    /// Directory walked for `.cbb` plan documents and `cbbackup.db`.
    pub data_dir: PathBuf,
    /// Also emit per-file operation points for each job's last run.
    /// Off by default: the output can get large enough to overrun the
    /// consumer's line buffer.
    pub report_file_operations: bool,
    /// Drop the host tag from every emitted point.
    pub omit_host: bool,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            report_file_operations: false,
            omit_host: false,
        }
    }
}

/// Errors from loading the config file.
#[derive(Debug)]
pub enum ConfigError {
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Read { path, source } => {
                write!(f, "failed to read config file {}: {source}", path.display())
            }
            ConfigError::Parse { path, source } => {
                write!(
                    f,
                    "failed to parse config file {}: {source}",
                    path.display()
                )
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Read { source, .. } => Some(source),
            ConfigError::Parse { source, .. } => Some(source),
        }
    }
}

/// Load configuration from a TOML file. A missing file is not an error:
/// defaults apply, and CLI flags can still override them.
pub fn load(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        return Ok(Config::default());
    }
    let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
        path: path.to_path_buf(),
        source: e,
    })?;
    toml::from_str(&text).map_err(|e| ConfigError::Parse {
        path: path.to_path_buf(),
        source: e,
    })
}
