//! Peer table: per-connection lifecycle state.
//!
//! Entries are keyed by the transport's [`PeerId`]. A peer that completed
//! its name announce refers to its player by [`PlayerId`]; the player
//! directory is a separate table and neither owns the other.

use std::collections::HashMap;

use crate::player::PlayerId;
use crate::transport::PeerId;

/// Lifecycle of a single connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PeerState {
    /// No connection, or fully reset.
    #[default]
    Unused,
    /// We asked the transport to connect and are waiting for it.
    Connecting,
    /// Transport link is up, identity not exchanged yet.
    Connected,
    /// Host only: the mesh has been told to connect to this peer.
    Synching,
    /// Name received, a player exists.
    Playing,
}

/// State kept for one connection.
#[derive(Debug, Clone, Default)]
pub struct PeerEntry {
    pub state: PeerState,
    pub player: Option<PlayerId>,
    /// Peers this one was told to connect to. Bounded by `max_peers`.
    pub known_peers: Vec<PeerId>,
}

/// All connections of a session.
#[derive(Debug, Clone)]
pub struct PeerTable {
    entries: HashMap<PeerId, PeerEntry>,
    max_peers: usize,
}

impl PeerTable {
    pub fn new(max_peers: usize) -> Self {
        Self {
            entries: HashMap::new(),
            max_peers,
        }
    }

    pub fn get(&self, peer: PeerId) -> Option<&PeerEntry> {
        self.entries.get(&peer)
    }

    /// State of `peer`; peers without an entry are `Unused`.
    pub fn state(&self, peer: PeerId) -> PeerState {
        self.entries.get(&peer).map_or(PeerState::Unused, |e| e.state)
    }

    pub fn player(&self, peer: PeerId) -> Option<PlayerId> {
        self.entries.get(&peer).and_then(|e| e.player)
    }

    /// Local connect request: `Unused -> Connecting`.
    pub fn mark_connecting(&mut self, peer: PeerId) {
        let entry = self.entries.entry(peer).or_default();
        if entry.state != PeerState::Unused {
            tracing::warn!(%peer, state = ?entry.state, "[mesh] Connect requested for a peer in use");
        }
        entry.state = PeerState::Connecting;
    }

    /// Transport connect event: `(any) -> Connected`. Returns the previous state.
    pub fn mark_connected(&mut self, peer: PeerId) -> PeerState {
        let entry = self.entries.entry(peer).or_default();
        std::mem::replace(&mut entry.state, PeerState::Connected)
    }

    /// Host re-broadcast the peer: `Connected -> Synching`.
    pub fn mark_synching(&mut self, peer: PeerId) -> bool {
        match self.entries.get_mut(&peer) {
            Some(entry) if entry.state == PeerState::Connected => {
                entry.state = PeerState::Synching;
                true
            }
            _ => false,
        }
    }

    /// First name announce: `Connected | Synching -> Playing`.
    pub fn mark_playing(&mut self, peer: PeerId, player: PlayerId) -> bool {
        match self.entries.get_mut(&peer) {
            Some(entry) if matches!(entry.state, PeerState::Connected | PeerState::Synching) => {
                entry.state = PeerState::Playing;
                entry.player = Some(player);
                true
            }
            _ => false,
        }
    }

    /// Transport disconnect: `(any) -> Unused`. Returns the removed entry.
    pub fn reset(&mut self, peer: PeerId) -> Option<PeerEntry> {
        self.entries.remove(&peer)
    }

    /// Remember that `peer` was told about `other`. Ignored once full.
    pub fn record_known_peer(&mut self, peer: PeerId, other: PeerId) {
        if let Some(entry) = self.entries.get_mut(&peer) {
            if entry.known_peers.len() < self.max_peers && !entry.known_peers.contains(&other) {
                entry.known_peers.push(other);
            }
        }
    }

    pub fn peer_ids(&self) -> Vec<PeerId> {
        self.entries.keys().copied().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (PeerId, &PeerEntry)> {
        self.entries.iter().map(|(id, entry)| (*id, entry))
    }

    pub fn playing_count(&self) -> usize {
        self.entries
            .values()
            .filter(|e| e.state == PeerState::Playing)
            .count()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
