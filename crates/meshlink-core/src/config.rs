//! Session configuration.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Configuration for a mesh session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Maximum simultaneous connections (default: 25)
    pub max_peers: usize,
    /// Channels per connection (default: 50)
    pub max_channels: u8,
    /// Channel reserved for protocol messages (default: 0)
    pub system_channel: u8,
    /// Port used when `setup` or `join` is given port 0 (default: 2300)
    pub default_port: u16,
    /// Declared incoming bandwidth in bytes/sec, 0 = unlimited (default: 0)
    pub incoming_bandwidth: u32,
    /// Declared outgoing bandwidth in bytes/sec, 0 = unlimited (default: 0)
    pub outgoing_bandwidth: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_peers: 25,
            max_channels: 50,
            system_channel: 0,
            default_port: 2300,
            incoming_bandwidth: 0,
            outgoing_bandwidth: 0,
        }
    }
}

impl SessionConfig {
    /// Parse a (possibly partial) JSON config and validate it.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_channels == 0 {
            return Err(ConfigError::NoChannels);
        }
        if self.system_channel >= self.max_channels {
            return Err(ConfigError::SystemChannelOutOfRange {
                channel: self.system_channel,
                max_channels: self.max_channels,
            });
        }
        if self.max_peers == 0 {
            return Err(ConfigError::NoPeers);
        }
        Ok(())
    }
}
