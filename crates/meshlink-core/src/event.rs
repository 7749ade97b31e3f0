//! Notifications produced by [`Session::poll`](crate::Session::poll).

use crate::player::PlayerId;

/// Session notification, delivered in the order it was generated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Our own join completed; the join target answered with its name.
    JoinedSelf,
    /// A peer completed its name announce and is now a player.
    PeerJoined { player: PlayerId, name: String },
    /// A player's connection is gone. The player no longer exists.
    PeerLeft { player: PlayerId, name: String },
    NameChanged { player: PlayerId, name: String },
    /// The host changed. `None` means the local node is the host.
    HostChanged { host: Option<PlayerId> },
    /// Application data from a player.
    DataReceived {
        from: PlayerId,
        channel: u8,
        data: Vec<u8>,
    },
}

impl SessionEvent {
    /// Short name for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            SessionEvent::JoinedSelf => "joined_self",
            SessionEvent::PeerJoined { .. } => "peer_joined",
            SessionEvent::PeerLeft { .. } => "peer_left",
            SessionEvent::NameChanged { .. } => "name_changed",
            SessionEvent::HostChanged { .. } => "host_changed",
            SessionEvent::DataReceived { .. } => "data_received",
        }
    }
}

/// Receiver of session notifications.
///
/// Called synchronously from `poll`, after the poll's state changes are done.
pub trait EventSink {
    fn on_event(&mut self, event: &SessionEvent);
}

impl<F> EventSink for F
where
    F: FnMut(&SessionEvent),
{
    fn on_event(&mut self, event: &SessionEvent) {
        self(event);
    }
}
