//! Packet transport contract consumed by the session.
//!
//! The session never talks to sockets directly. A [`Binder`] creates a bound
//! [`Transport`], which hands out connection handles ([`PeerId`]), delivers
//! packets per channel and reports connect/disconnect/receive events through
//! a zero-timeout [`Transport::poll`].

use std::fmt;

use meshlink_proto::{Address, Delivery};
use thiserror::Error;

use crate::config::SessionConfig;

/// Connection handle issued by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PeerId(pub u64);

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "peer#{}", self.0)
    }
}

/// Raw transport event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// A connection (incoming or requested by us) is established.
    Connect(PeerId),
    /// A connection is gone, or a requested one could not be established.
    Disconnect(PeerId),
    /// A packet arrived.
    Receive {
        peer: PeerId,
        channel: u8,
        data: Vec<u8>,
    },
}

/// Live link metrics for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PeerStats {
    pub round_trip_time_ms: u32,
    /// Fraction of unreliable packets lost, `0.0..=1.0`.
    pub packet_loss: f32,
    /// Bandwidth the remote side declared, bytes/sec (0 = unlimited).
    pub incoming_bandwidth: u32,
    pub outgoing_bandwidth: u32,
}

/// Limits a transport is bound with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportLimits {
    pub max_peers: usize,
    pub max_channels: u8,
    pub incoming_bandwidth: u32,
    pub outgoing_bandwidth: u32,
}

impl From<&SessionConfig> for TransportLimits {
    fn from(config: &SessionConfig) -> Self {
        Self {
            max_peers: config.max_peers,
            max_channels: config.max_channels,
            incoming_bandwidth: config.incoming_bandwidth,
            outgoing_bandwidth: config.outgoing_bandwidth,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Address already in use: {0}")]
    AddressInUse(Address),

    #[error("Peer limit reached ({0})")]
    PeerLimit(usize),

    #[error("Unknown peer: {0}")]
    UnknownPeer(PeerId),

    #[error("Channel {0} is not available on this transport")]
    InvalidChannel(u8),

    #[error("Transport is closed")]
    Closed,
}

/// A bound, non-blocking packet transport.
pub trait Transport {
    /// Address this transport is bound to.
    fn local_address(&self) -> Address;

    /// Start an outbound connection. Completion is reported later by a
    /// `Connect` event, failure by a `Disconnect` event for the same handle.
    fn connect(&mut self, address: Address) -> Result<PeerId, TransportError>;

    /// Drop a connection immediately. No event is reported locally.
    fn disconnect(&mut self, peer: PeerId);

    /// Queue a packet. It goes out on the next `flush` or `poll`.
    fn send(
        &mut self,
        peer: PeerId,
        channel: u8,
        data: &[u8],
        delivery: Delivery,
    ) -> Result<(), TransportError>;

    /// Transmit everything queued.
    fn flush(&mut self);

    /// Next buffered event, without waiting.
    fn poll(&mut self) -> Option<TransportEvent>;

    /// Address the remote side of `peer` is seen at.
    fn peer_address(&self, peer: PeerId) -> Option<Address>;

    fn peer_stats(&self, peer: PeerId) -> Option<PeerStats>;
}

/// Creates bound transports.
pub trait Binder {
    type Transport: Transport;

    fn bind(&self, port: u16, limits: &TransportLimits) -> Result<Self::Transport, TransportError>;
}
