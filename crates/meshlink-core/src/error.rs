use thiserror::Error;

use crate::player::PlayerId;
use crate::transport::TransportError;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Session is not set up")]
    NotSetUp,

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Refusing to send an empty payload")]
    EmptyPayload,

    #[error("Player not found: {0}")]
    UnknownPlayer(PlayerId),

    #[error("Channel {channel} out of range (max {max_channels})")]
    InvalidChannel { channel: u8, max_channels: u8 },

    #[error("Invalid config: {0}")]
    Config(#[from] ConfigError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("System channel {channel} must be below max_channels ({max_channels})")]
    SystemChannelOutOfRange { channel: u8, max_channels: u8 },

    #[error("max_channels must be at least 1")]
    NoChannels,

    #[error("max_peers must be at least 1")]
    NoPeers,
}
