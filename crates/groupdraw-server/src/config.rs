//! Server configuration from the environment.

use std::net::{AddrParseError, SocketAddr};
use std::num::ParseIntError;

use thiserror::Error;

/// Default listen address.
pub const DEFAULT_ADDR: &str = "0.0.0.0:3030";
/// Default per-room broadcast channel capacity.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid GROUPDRAW_ADDR {value:?}: {source}")]
    InvalidAddr {
        value: String,
        source: AddrParseError,
    },
    #[error("Invalid GROUPDRAW_CHANNEL_CAPACITY {value:?}: {source}")]
    InvalidCapacity {
        value: String,
        source: ParseIntError,
    },
    #[error("GROUPDRAW_CHANNEL_CAPACITY must be greater than zero")]
    ZeroCapacity,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub addr: SocketAddr,
    pub channel_capacity: usize,
}

impl ServerConfig {
    /// Read `GROUPDRAW_ADDR` and `GROUPDRAW_CHANNEL_CAPACITY`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from any key lookup, falling back to defaults for
    /// missing keys.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let addr = lookup("GROUPDRAW_ADDR").unwrap_or_else(|| DEFAULT_ADDR.to_string());
        let addr = addr
            .parse()
            .map_err(|source| ConfigError::InvalidAddr { value: addr.clone(), source })?;

        let channel_capacity = match lookup("GROUPDRAW_CHANNEL_CAPACITY") {
            Some(value) => value
                .parse()
                .map_err(|source| ConfigError::InvalidCapacity { value, source })?,
            None => DEFAULT_CHANNEL_CAPACITY,
        };
        if channel_capacity == 0 {
            return Err(ConfigError::ZeroCapacity);
        }

        Ok(Self {
            addr,
            channel_capacity,
        })
    }
}
