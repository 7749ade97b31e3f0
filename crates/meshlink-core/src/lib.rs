//! Meshlink Core Library
//!
//! Peer-to-peer mesh session manager for real-time multiplayer games.
//!
//! A [`Session`] keeps a fully connected mesh of peers on top of a packet
//! [`Transport`]: it tracks the lifecycle of every connection, keeps an
//! ordered directory of players, re-elects the host when the current one
//! drops, and separates system-channel control traffic from game data.
//! Everything is driven from [`Session::poll`] on a single thread.
//!
//! The [`sim`] module provides an in-memory transport for tests and demos.

#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod error;
pub mod event;
pub mod migration;
pub mod peer;
pub mod player;
pub mod session;
pub mod sim;
pub mod transport;

#[cfg(test)]
pub(crate) mod test_utils;

pub use config::SessionConfig;
pub use error::{ConfigError, SessionError};
pub use event::{EventSink, SessionEvent};
pub use migration::{Election, elect};
pub use peer::{PeerEntry, PeerState, PeerTable};
pub use player::{Player, PlayerDirectory, PlayerId};
pub use session::{Session, SessionState};
pub use transport::{
    Binder, PeerId, PeerStats, Transport, TransportError, TransportEvent, TransportLimits,
};

pub use meshlink_proto::{Address, Delivery, SendFlags, SystemMessage};
