// src/settings.rs
//
// Bridge configuration: built-in defaults, optional TOML config file, then
// command-line overrides.

use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::cli::Cli;
use crate::io::serial::SerialConfig;

/// Highest -v level with its own log detail
pub const MAX_VERBOSITY: u8 = 3;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("serial port name required as argument")]
    MissingPort,

    #[error("local port must not be 0")]
    InvalidLocalPort,

    #[error("invalid bind address '{0}'")]
    InvalidBindAddress(String),
}

/// Control channel carried on the TCP stream
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelMode {
    #[default]
    Rfc2217,
    /// Plain byte bridge, no in-band control
    Raw,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct BridgeConfig {
    #[serde(default = "default_local_port")]
    pub local_port: u16,
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default)]
    pub mode: ChannelMode,
    #[serde(default)]
    pub verbosity: u8,
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
    #[serde(default)]
    pub serial: SerialConfig,
}

fn default_local_port() -> u16 {
    2217
}
fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            local_port: default_local_port(),
            bind_address: default_bind_address(),
            mode: ChannelMode::default(),
            verbosity: 0,
            log_dir: None,
            serial: SerialConfig::default(),
        }
    }
}

impl BridgeConfig {
    /// Resolve the configuration for a command line.
    pub fn resolve(cli: &Cli) -> Result<Self, ConfigError> {
        let mut config = load(cli.config.as_deref())?;
        config.apply_cli(cli);
        Ok(config)
    }

    /// Override file values with whatever was given on the command line.
    pub fn apply_cli(&mut self, cli: &Cli) {
        if let Some(port) = &cli.port {
            self.serial.port = port.clone();
        }
        if let Some(local_port) = cli.local_port {
            self.local_port = local_port;
        }
        if let Some(bind) = &cli.bind_address {
            self.bind_address = bind.clone();
        }
        if cli.verbose > 0 {
            self.verbosity = cli.verbose;
        }
        self.verbosity = self.verbosity.min(MAX_VERBOSITY);
        if let Some(baud) = cli.baud {
            self.serial.line.baud_rate = baud;
        }
        if let Some(timeout_ms) = cli.timeout_ms {
            self.serial.timeout_ms = timeout_ms;
        }
        if cli.raw {
            self.mode = ChannelMode::Raw;
        }
        if let Some(dir) = &cli.log_dir {
            self.log_dir = Some(dir.clone());
        }
    }

    /// Check everything the server needs before it binds.
    pub fn validate(&self) -> Result<SocketAddr, ConfigError> {
        if self.serial.port.is_empty() {
            return Err(ConfigError::MissingPort);
        }
        if self.local_port == 0 {
            return Err(ConfigError::InvalidLocalPort);
        }
        self.listen_addr()
    }

    pub fn listen_addr(&self) -> Result<SocketAddr, ConfigError> {
        let ip: IpAddr = self
            .bind_address
            .parse()
            .map_err(|_| ConfigError::InvalidBindAddress(self.bind_address.clone()))?;
        Ok(SocketAddr::new(ip, self.local_port))
    }
}

/// Per-user config file location, e.g. ~/.config/serbridge/serbridge.toml
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("serbridge").join("serbridge.toml"))
}

pub fn load_file(path: &Path) -> Result<BridgeConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Load the explicit config file, or the per-user one when it exists.
/// Without either, the built-in defaults are returned.
pub fn load(explicit: Option<&Path>) -> Result<BridgeConfig, ConfigError> {
    if let Some(path) = explicit {
        return load_file(path);
    }
    match default_config_path() {
        Some(path) if path.exists() => load_file(&path),
        _ => Ok(BridgeConfig::default()),
    }
}
