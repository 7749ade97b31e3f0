//! Session controller.
//!
//! [`Session`] owns the transport, the peer table and the player directory.
//! Lifecycle operations (`setup`, `join`, `host`, `cleanup`) change state
//! directly; everything coming from the network is handled inside
//! [`Session::poll`], which returns the resulting [`SessionEvent`]s in the
//! order they were generated.

use std::collections::HashSet;
use std::net::Ipv4Addr;

use meshlink_proto::{Address, Delivery, SendFlags, SystemMessage, truncate_name};

use crate::config::SessionConfig;
use crate::error::SessionError;
use crate::event::{EventSink, SessionEvent};
use crate::migration::{Election, elect};
use crate::peer::{PeerState, PeerTable};
use crate::player::{Player, PlayerDirectory, PlayerId};
use crate::transport::{Binder, PeerId, Transport, TransportEvent, TransportLimits};

/// Connection state of the local node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Disconnected,
    /// A join was issued and the join target has not announced its name yet.
    Connecting,
    Connected,
}

/// A mesh session over transports created by `B`.
pub struct Session<B: Binder> {
    binder: B,
    config: SessionConfig,
    transport: Option<B::Transport>,
    state: SessionState,
    peers: PeerTable,
    players: PlayerDirectory,
    /// Peer currently acting as host. `None` while connected means we are.
    host: Option<PeerId>,
    is_host: bool,
    local_name: String,
    external_address: Option<Address>,
    /// Outbound connects issued on a host `CONNECT` instruction.
    instructed: HashSet<PeerId>,
    pending: Vec<SessionEvent>,
    sink: Option<Box<dyn EventSink>>,
}

impl<B: Binder> Session<B> {
    pub fn new(binder: B) -> Self {
        Self::with_config(binder, SessionConfig::default())
    }

    pub fn with_config(binder: B, config: SessionConfig) -> Self {
        let peers = PeerTable::new(config.max_peers);
        Self {
            binder,
            config,
            transport: None,
            state: SessionState::Disconnected,
            peers,
            players: PlayerDirectory::new(),
            host: None,
            is_host: false,
            local_name: String::new(),
            external_address: None,
            instructed: HashSet::new(),
            pending: Vec::new(),
            sink: None,
        }
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Bind a transport on `local_port` (0 = configured default port).
    ///
    /// Any previous session is cleaned up first.
    pub fn setup(&mut self, local_name: &str, local_port: u16) -> Result<(), SessionError> {
        self.cleanup();
        self.config.validate()?;

        let port = self.resolve_port(local_port);
        let transport = self.binder.bind(port, &TransportLimits::from(&self.config))?;

        self.local_name = truncate_name(local_name).to_string();
        self.peers = PeerTable::new(self.config.max_peers);
        self.state = SessionState::Disconnected;

        tracing::info!(
            name = %self.local_name,
            address = %transport.local_address(),
            "[mesh] Session set up"
        );
        self.transport = Some(transport);
        Ok(())
    }

    /// Connect to an existing mesh through the node at `address:port`.
    ///
    /// The join completes once that node announces its name; see
    /// [`SessionEvent::JoinedSelf`].
    pub fn join(&mut self, address: &str, port: u16) -> Result<(), SessionError> {
        if self.transport.is_none() {
            return Err(SessionError::NotSetUp);
        }
        let host: Ipv4Addr = address
            .parse()
            .map_err(|_| SessionError::InvalidAddress(address.to_string()))?;

        if self.state == SessionState::Connecting {
            tracing::debug!("[mesh] Join already in progress");
            return Ok(());
        }

        let target = Address::new(host, self.resolve_port(port));
        let transport = self.transport.as_mut().ok_or(SessionError::NotSetUp)?;
        let peer = transport.connect(target).inspect_err(|e| {
            tracing::warn!(%target, error = %e, "[mesh] Join connect failed");
        })?;
        transport.flush();

        self.is_host = false;
        self.peers.mark_connecting(peer);
        self.host = Some(peer);
        self.state = SessionState::Connecting;

        tracing::info!(%target, %peer, "[mesh] Joining");
        Ok(())
    }

    /// Become the host of a new (or the current) mesh.
    pub fn host(&mut self) -> Result<(), SessionError> {
        if self.transport.is_none() {
            return Err(SessionError::NotSetUp);
        }

        let changed = !self.is_host;
        self.is_host = true;
        self.host = None;
        self.state = SessionState::Connected;

        if changed {
            self.pending.push(SessionEvent::HostChanged { host: None });
        }
        tracing::info!(name = %self.local_name, "[mesh] Hosting");
        Ok(())
    }

    /// Tear the session down. Safe to call at any time, any number of times.
    pub fn cleanup(&mut self) {
        let Some(mut transport) = self.transport.take() else {
            return;
        };

        transport.flush();
        for peer in self.peers.peer_ids() {
            transport.disconnect(peer);
        }
        drop(transport);

        self.peers.clear();
        self.players.clear();
        self.instructed.clear();
        self.pending.clear();
        self.host = None;
        self.is_host = false;
        self.external_address = None;
        self.state = SessionState::Disconnected;

        tracing::info!("[mesh] Session cleaned up");
    }

    // ========================================================================
    // Sending
    // ========================================================================

    /// Send application data to one player.
    pub fn send(
        &mut self,
        player: PlayerId,
        data: &[u8],
        flags: SendFlags,
        channel: u8,
    ) -> Result<(), SessionError> {
        self.check_outgoing(data, channel)?;
        let Some(peer) = self.players.get(player).map(|p| p.peer) else {
            tracing::warn!(%player, "[mesh] Send to unknown player");
            return Err(SessionError::UnknownPlayer(player));
        };

        let transport = self.transport.as_mut().ok_or(SessionError::NotSetUp)?;
        transport.send(peer, channel, data, flags.delivery())?;
        if flags.wants_flush() {
            transport.flush();
        }
        Ok(())
    }

    /// Send application data to every player, in join order.
    ///
    /// Per-player failures are logged and skipped. The transport is always
    /// flushed afterwards.
    pub fn broadcast(&mut self, data: &[u8], flags: SendFlags, channel: u8) -> Result<(), SessionError> {
        self.check_outgoing(data, channel)?;
        let transport = self.transport.as_mut().ok_or(SessionError::NotSetUp)?;

        let delivery = flags.delivery();
        for player in &self.players {
            if let Err(e) = transport.send(player.peer, channel, data, delivery) {
                tracing::warn!(player = %player.id, error = %e, "[mesh] Broadcast send failed");
            }
        }
        transport.flush();
        Ok(())
    }

    /// Change the local name and announce it to every player.
    pub fn set_local_name(&mut self, name: &str) {
        self.local_name = truncate_name(name).to_string();
        if self.transport.is_none() {
            return;
        }

        let message = SystemMessage::Name {
            name: self.local_name.clone(),
        };
        let peers: Vec<PeerId> = self.players.iter().map(|p| p.peer).collect();
        for peer in peers {
            self.send_system(peer, &message);
        }
        if let Some(transport) = self.transport.as_mut() {
            transport.flush();
        }
    }

    fn check_outgoing(&self, data: &[u8], channel: u8) -> Result<(), SessionError> {
        if self.transport.is_none() {
            return Err(SessionError::NotSetUp);
        }
        if data.is_empty() {
            tracing::warn!("[mesh] Refusing to send an empty payload");
            return Err(SessionError::EmptyPayload);
        }
        if channel >= self.config.max_channels {
            tracing::warn!(channel, "[mesh] Channel out of range");
            return Err(SessionError::InvalidChannel {
                channel,
                max_channels: self.config.max_channels,
            });
        }
        Ok(())
    }

    fn send_system(&mut self, peer: PeerId, message: &SystemMessage) {
        let Some(transport) = self.transport.as_mut() else {
            return;
        };
        let channel = self.config.system_channel;
        if let Err(e) = transport.send(peer, channel, &message.encode(), Delivery::Reliable) {
            tracing::warn!(%peer, tag = message.tag(), error = %e, "[mesh] System send failed");
        }
    }

    // ========================================================================
    // Poll
    // ========================================================================

    /// Drain the transport, handle every event and return the notifications.
    ///
    /// Never blocks. Each returned event is also delivered to the registered
    /// [`EventSink`], in the same order.
    pub fn poll(&mut self) -> Vec<SessionEvent> {
        loop {
            let Some(transport) = self.transport.as_mut() else {
                break;
            };
            let Some(event) = transport.poll() else {
                break;
            };
            self.dispatch(event);
        }

        self.refresh_stats();

        let events = std::mem::take(&mut self.pending);
        if let Some(sink) = self.sink.as_mut() {
            for event in &events {
                sink.on_event(event);
            }
        }
        events
    }

    fn dispatch(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Connect(peer) => self.on_connect(peer),
            TransportEvent::Disconnect(peer) => self.on_disconnect(peer),
            TransportEvent::Receive { peer, channel, data } => self.on_receive(peer, channel, data),
        }
    }

    fn refresh_stats(&mut self) {
        let Some(transport) = self.transport.as_ref() else {
            return;
        };
        for id in self.players.ids() {
            let Some(player) = self.players.get_mut(id) else {
                continue;
            };
            if let Some(stats) = transport.peer_stats(player.peer) {
                player.update_stats(&stats);
            }
        }
    }

    fn on_connect(&mut self, peer: PeerId) {
        let previous = self.peers.mark_connected(peer);
        let Some(address) = self.transport.as_ref().and_then(|t| t.peer_address(peer)) else {
            tracing::warn!(%peer, "[mesh] Connected peer has no address");
            return;
        };
        tracing::info!(%peer, %address, ?previous, "[mesh] Peer connected");

        if self.is_host {
            // Tell the mesh about the newcomer
            let message = SystemMessage::Connect { address };
            let players: Vec<PeerId> = self.players.iter().map(|p| p.peer).collect();
            for other in players {
                self.send_system(other, &message);
                self.peers.record_known_peer(other, peer);
            }
            self.peers.mark_synching(peer);
        } else if self.instructed.remove(&peer) {
            if let Some(host) = self.host {
                self.send_system(host, &SystemMessage::Connect { address });
            }
        }

        let name = SystemMessage::Name {
            name: self.local_name.clone(),
        };
        self.send_system(peer, &name);
        if self.external_address.is_none() {
            self.send_system(peer, &SystemMessage::IpRequest);
        }
        if let Some(transport) = self.transport.as_mut() {
            transport.flush();
        }
    }

    fn on_disconnect(&mut self, peer: PeerId) {
        let entry = self.peers.reset(peer);
        self.instructed.remove(&peer);
        let was_host = self.host == Some(peer);

        if was_host && self.state == SessionState::Connecting {
            tracing::warn!(%peer, "[mesh] Join failed, host unreachable");
            self.host = None;
            self.state = SessionState::Disconnected;
            return;
        }

        if let Some(id) = entry.and_then(|e| e.player) {
            if let Some(player) = self.players.remove(id) {
                tracing::info!(player = %id, name = %player.name, "[mesh] Player left");
                self.pending.push(SessionEvent::PeerLeft {
                    player: id,
                    name: player.name,
                });
            }
        } else {
            tracing::debug!(%peer, "[mesh] Peer disconnected before joining");
        }

        if was_host {
            self.host = None;
            if self.state == SessionState::Connected {
                self.migrate_host();
            }
        }
    }

    fn migrate_host(&mut self) {
        match elect(&self.players, self.external_address) {
            Election::Local => {
                tracing::info!("[mesh] Host lost, taking over as host");
                self.is_host = true;
                self.host = None;
                self.pending.push(SessionEvent::HostChanged { host: None });
            }
            Election::Remote { player, peer } => {
                tracing::info!(%player, "[mesh] Host lost, new host elected");
                self.is_host = false;
                self.host = Some(peer);
                self.pending.push(SessionEvent::HostChanged { host: Some(player) });
            }
        }
    }

    fn on_receive(&mut self, peer: PeerId, channel: u8, data: Vec<u8>) {
        if channel == self.config.system_channel {
            match SystemMessage::decode(&data) {
                Ok(message) => self.on_system_message(peer, message),
                Err(e) => {
                    tracing::warn!(%peer, error = %e, "[mesh] Dropping malformed system message");
                }
            }
            return;
        }

        match self.peers.player(peer) {
            Some(from) if self.peers.state(peer) == PeerState::Playing => {
                tracing::trace!(%from, channel, len = data.len(), "[mesh] Data received");
                self.pending.push(SessionEvent::DataReceived { from, channel, data });
            }
            _ => {
                tracing::warn!(%peer, channel, "[mesh] Dropping data from a peer that is not playing");
            }
        }
    }

    fn on_system_message(&mut self, peer: PeerId, message: SystemMessage) {
        tracing::debug!(%peer, tag = message.tag(), "[mesh] System message");
        match message {
            SystemMessage::Name { name } => self.on_name(peer, &name),
            SystemMessage::Connect { address } => self.on_connect_instruction(peer, address),
            SystemMessage::IpRequest => {
                let observed = self.transport.as_ref().and_then(|t| t.peer_address(peer));
                match observed {
                    Some(address) => self.send_system(peer, &SystemMessage::IpResponse { address }),
                    None => tracing::warn!(%peer, "[mesh] Address request from unknown peer"),
                }
            }
            SystemMessage::IpResponse { address } => {
                if self.external_address.is_none() {
                    tracing::info!(%address, "[mesh] External address discovered");
                    self.external_address = Some(address);
                } else {
                    tracing::debug!(%address, "[mesh] Ignoring extra address response");
                }
            }
        }
    }

    fn on_name(&mut self, peer: PeerId, name: &str) {
        match self.peers.state(peer) {
            PeerState::Playing => {
                let Some(id) = self.peers.player(peer) else {
                    return;
                };
                if let Some(stored) = self.players.rename(id, name) {
                    let name = stored.to_string();
                    tracing::info!(player = %id, %name, "[mesh] Player renamed");
                    self.pending.push(SessionEvent::NameChanged { player: id, name });
                }
            }
            PeerState::Connected | PeerState::Synching => self.on_first_name(peer, name),
            state @ (PeerState::Unused | PeerState::Connecting) => {
                tracing::warn!(%peer, ?state, "[mesh] Name from a peer that is not connected");
            }
        }
    }

    fn on_first_name(&mut self, peer: PeerId, name: &str) {
        let Some(transport) = self.transport.as_ref() else {
            return;
        };
        let Some(address) = transport.peer_address(peer) else {
            tracing::warn!(%peer, "[mesh] Name from a peer without address");
            return;
        };
        let stats = transport.peer_stats(peer).unwrap_or_default();

        let id = self.players.insert(peer, name, address, &stats);
        self.peers.mark_playing(peer, id);
        let name = self.players.get(id).map(|p| p.name.clone()).unwrap_or_default();

        let completes_join = self.state == SessionState::Connecting && self.host == Some(peer);
        if completes_join {
            self.state = SessionState::Connected;
            tracing::info!(host = %id, %name, "[mesh] Joined session");
            self.pending.push(SessionEvent::JoinedSelf);
            self.pending.push(SessionEvent::PeerJoined {
                player: id,
                name: name.clone(),
            });
            self.pending.push(SessionEvent::HostChanged { host: Some(id) });
        } else {
            tracing::info!(player = %id, %name, "[mesh] Player joined");
            self.pending.push(SessionEvent::PeerJoined {
                player: id,
                name: name.clone(),
            });
        }
        self.pending.push(SessionEvent::NameChanged { player: id, name });
    }

    fn on_connect_instruction(&mut self, from: PeerId, address: Address) {
        if self.is_host {
            tracing::info!(%from, %address, "[mesh] Peer confirmed connect");
            return;
        }
        if self.is_local(address) {
            tracing::debug!(%address, "[mesh] Skipping connect to ourselves");
            return;
        }
        if self.is_connected_to(address) {
            tracing::debug!(%address, "[mesh] Skipping connect to a known peer");
            return;
        }

        let Some(transport) = self.transport.as_mut() else {
            return;
        };
        match transport.connect(address) {
            Ok(peer) => {
                tracing::info!(%peer, %address, "[mesh] Connecting to mesh peer");
                self.peers.mark_connecting(peer);
                self.instructed.insert(peer);
            }
            Err(e) => {
                tracing::warn!(%address, error = %e, "[mesh] Mesh connect failed");
            }
        }
    }

    fn is_local(&self, address: Address) -> bool {
        self.external_address == Some(address) || self.local_address() == Some(address)
    }

    fn is_connected_to(&self, address: Address) -> bool {
        let Some(transport) = self.transport.as_ref() else {
            return false;
        };
        self.peers
            .iter()
            .any(|(peer, _)| transport.peer_address(peer) == Some(address))
    }

    fn resolve_port(&self, port: u16) -> u16 {
        if port == 0 { self.config.default_port } else { port }
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_host(&self) -> bool {
        self.is_host
    }

    /// Player acting as host, `None` if that is us (or not known yet).
    pub fn current_host(&self) -> Option<PlayerId> {
        self.host.and_then(|peer| self.peers.player(peer))
    }

    /// Connection of the current host, `None` if that is us.
    pub fn host_peer(&self) -> Option<PeerId> {
        self.host
    }

    pub fn local_name(&self) -> &str {
        &self.local_name
    }

    /// Our address as seen by other peers, once discovered.
    pub fn external_address(&self) -> Option<Address> {
        self.external_address
    }

    /// Address the transport is bound to.
    pub fn local_address(&self) -> Option<Address> {
        self.transport.as_ref().map(Transport::local_address)
    }

    pub fn players(&self) -> &PlayerDirectory {
        &self.players
    }

    pub fn player(&self, id: PlayerId) -> Option<&Player> {
        self.players.get(id)
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    pub fn peers(&self) -> &PeerTable {
        &self.peers
    }

    pub fn peer_state(&self, peer: PeerId) -> PeerState {
        self.peers.state(peer)
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn is_set_up(&self) -> bool {
        self.transport.is_some()
    }

    /// Register a sink receiving every event returned by `poll`.
    pub fn set_event_sink(&mut self, sink: impl EventSink + 'static) {
        self.sink = Some(Box::new(sink));
    }

    pub fn clear_event_sink(&mut self) {
        self.sink = None;
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::test_utils::TestMesh;
    use crate::transport::TransportError;

    #[test]
    fn test_join_event_order() {
        let mut mesh = TestMesh::new();
        let a = mesh.hosting(1, 100, "A");
        let b = mesh.joining(2, 100, "B", a);

        let events = mesh.pump();
        let a_id = mesh.node(b).players().first().unwrap().id;
        assert_eq!(
            events[b],
            vec![
                SessionEvent::JoinedSelf,
                SessionEvent::PeerJoined {
                    player: a_id,
                    name: "A".to_string()
                },
                SessionEvent::HostChanged { host: Some(a_id) },
                SessionEvent::NameChanged {
                    player: a_id,
                    name: "A".to_string()
                },
            ]
        );

        let b_id = mesh.node(a).players().first().unwrap().id;
        assert_eq!(
            events[a],
            vec![
                SessionEvent::PeerJoined {
                    player: b_id,
                    name: "B".to_string()
                },
                SessionEvent::NameChanged {
                    player: b_id,
                    name: "B".to_string()
                },
            ]
        );

        assert_eq!(mesh.node(b).state(), SessionState::Connected);
        assert_eq!(mesh.node(b).current_host(), Some(a_id));
        assert!(mesh.node(a).is_host());
        mesh.assert_invariants();
    }

    #[test]
    fn test_host_event_queued_until_poll() {
        let mut mesh = TestMesh::new();
        let a = mesh.add(1, 100, "A");
        mesh.node_mut(a).host().unwrap();

        assert_eq!(mesh.node(a).state(), SessionState::Connected);
        assert_eq!(mesh.node_mut(a).poll(), vec![SessionEvent::HostChanged { host: None }]);

        // Already host: no second notification
        mesh.node_mut(a).host().unwrap();
        assert!(mesh.node_mut(a).poll().is_empty());
    }

    #[test]
    fn test_operations_require_setup() {
        let mesh = TestMesh::new();
        let mut session = Session::new(mesh.network.binder(Ipv4Addr::LOCALHOST));

        assert!(matches!(session.join("10.0.0.1", 0), Err(SessionError::NotSetUp)));
        assert!(matches!(session.host(), Err(SessionError::NotSetUp)));
        assert!(matches!(
            session.broadcast(b"x", SendFlags::RELIABLE, 1),
            Err(SessionError::NotSetUp)
        ));
        assert!(session.poll().is_empty());
        session.cleanup();
    }

    #[test]
    fn test_setup_uses_default_port() {
        let mut mesh = TestMesh::new();
        let a = mesh.add(1, 0, "A");
        assert_eq!(mesh.node(a).local_address().unwrap().port, 2300);
    }

    #[test]
    fn test_setup_twice_on_same_port_rebinds() {
        let mut mesh = TestMesh::new();
        let a = mesh.add(1, 100, "A");
        mesh.node_mut(a).setup("A2", 100).unwrap();
        assert_eq!(mesh.node(a).local_name(), "A2");
    }

    #[test]
    fn test_setup_fails_when_address_in_use() {
        let mut mesh = TestMesh::new();
        mesh.add(1, 100, "A");

        let mut session = Session::new(mesh.network.binder(Ipv4Addr::from(1u32)));
        let result = session.setup("B", 100);

        assert!(matches!(
            result,
            Err(SessionError::Transport(TransportError::AddressInUse(_)))
        ));
        assert!(!session.is_set_up());
        assert_eq!(session.state(), SessionState::Disconnected);
    }

    #[test]
    fn test_join_connect_failure_leaves_state_unchanged() {
        let mut mesh = TestMesh::new();
        let config = SessionConfig {
            max_peers: 1,
            ..SessionConfig::default()
        };
        let a = mesh.add_with_config(1, 100, "A", config);
        mesh.node_mut(a).host().unwrap();
        mesh.joining(2, 100, "B", a);
        mesh.add(3, 100, "C");
        mesh.pump();

        let before = mesh.node(a).peers().len();
        assert_eq!(before, 1);

        let result = mesh.node_mut(a).join("0.0.0.3", 100);
        assert!(matches!(
            result,
            Err(SessionError::Transport(TransportError::PeerLimit(1)))
        ));
        assert_eq!(mesh.node(a).state(), SessionState::Connected);
        assert!(mesh.node(a).is_host());
        assert_eq!(mesh.node(a).peers().len(), before);
    }

    #[test]
    fn test_join_rejects_invalid_address() {
        let mut mesh = TestMesh::new();
        let a = mesh.add(1, 100, "A");
        assert!(matches!(
            mesh.node_mut(a).join("not-an-ip", 100),
            Err(SessionError::InvalidAddress(_))
        ));
        assert_eq!(mesh.node(a).state(), SessionState::Disconnected);
    }

    #[test]
    fn test_join_twice_is_noop() {
        let mut mesh = TestMesh::new();
        let a = mesh.hosting(1, 100, "A");
        let b = mesh.joining(2, 100, "B", a);
        mesh.node_mut(b).join("0.0.0.1", 100).unwrap();
        assert_eq!(mesh.node(b).peers().len(), 1);
    }

    #[test]
    fn test_join_failure_returns_to_disconnected() {
        let mut mesh = TestMesh::new();
        let b = mesh.add(2, 100, "B");
        mesh.node_mut(b).join("0.0.0.9", 100).unwrap();
        assert_eq!(mesh.node(b).state(), SessionState::Connecting);

        let events = mesh.pump();
        assert!(events[b].is_empty());
        assert_eq!(mesh.node(b).state(), SessionState::Disconnected);
        assert!(mesh.node(b).current_host().is_none());
    }

    #[test]
    fn test_send_validation() {
        let mut mesh = TestMesh::new();
        let a = mesh.hosting(1, 100, "A");
        let b = mesh.joining(2, 100, "B", a);
        mesh.pump();
        let b_id = mesh.node(a).players().first().unwrap().id;
        let session = mesh.node_mut(a);

        assert!(matches!(
            session.send(b_id, b"", SendFlags::RELIABLE, 1),
            Err(SessionError::EmptyPayload)
        ));
        assert!(matches!(
            session.send(b_id, b"x", SendFlags::RELIABLE, 50),
            Err(SessionError::InvalidChannel { channel: 50, .. })
        ));
        assert!(matches!(
            session.send(PlayerId(999), b"x", SendFlags::RELIABLE, 1),
            Err(SessionError::UnknownPlayer(PlayerId(999)))
        ));
        assert!(matches!(
            session.broadcast(b"", SendFlags::empty(), 1),
            Err(SessionError::EmptyPayload)
        ));

        session.send(b_id, b"hi", SendFlags::RELIABLE | SendFlags::FLUSH, 3).unwrap();
        let events = mesh.node_mut(b).poll();
        let a_id = mesh.node(b).players().first().unwrap().id;
        assert_eq!(
            events,
            vec![SessionEvent::DataReceived {
                from: a_id,
                channel: 3,
                data: b"hi".to_vec()
            }]
        );
    }

    #[test]
    fn test_rename_is_announced() {
        let mut mesh = TestMesh::new();
        let a = mesh.hosting(1, 100, "A");
        let b = mesh.joining(2, 100, "B", a);
        mesh.pump();

        mesh.node_mut(b).set_local_name("Alice");
        let events = mesh.pump();
        let b_id = mesh.node(a).players().first().unwrap().id;

        assert_eq!(
            events[a],
            vec![SessionEvent::NameChanged {
                player: b_id,
                name: "Alice".to_string()
            }]
        );
        assert_eq!(mesh.node(a).player(b_id).unwrap().name, "Alice");
    }

    #[test]
    fn test_cleanup_is_idempotent() {
        let mut mesh = TestMesh::new();
        let a = mesh.hosting(1, 100, "A");
        let b = mesh.joining(2, 100, "B", a);
        mesh.pump();

        mesh.node_mut(b).cleanup();
        mesh.node_mut(b).cleanup();

        let session = mesh.node(b);
        assert_eq!(session.state(), SessionState::Disconnected);
        assert!(!session.is_set_up());
        assert!(session.players().is_empty());
        assert!(session.peers().is_empty());
        assert!(session.external_address().is_none());
        assert!(!session.is_host());

        // A sees B leave
        let events = mesh.pump();
        assert!(matches!(events[a][..], [SessionEvent::PeerLeft { .. }]));
        assert_eq!(mesh.node(a).player_count(), 0);
    }

    #[test]
    fn test_event_sink_sees_returned_events() {
        let mut mesh = TestMesh::new();
        let a = mesh.hosting(1, 100, "A");
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        mesh.node_mut(a)
            .set_event_sink(move |event: &SessionEvent| sink.borrow_mut().push(event.clone()));

        mesh.joining(2, 100, "B", a);
        let events = mesh.pump();
        assert!(!events[a].is_empty());
        assert_eq!(*seen.borrow(), events[a]);

        mesh.node_mut(a).clear_event_sink();
        mesh.node_mut(a).set_local_name("A2");
        mesh.pump();
        assert_eq!(seen.borrow().len(), events[a].len());
    }

    #[test]
    fn test_player_stats_refreshed() {
        let mut mesh = TestMesh::new();
        mesh.network.set_latency_ms(30);
        let a = mesh.hosting(1, 100, "A");
        mesh.joining(2, 100, "B", a);
        mesh.pump();

        mesh.network.set_latency_ms(45);
        mesh.node_mut(a).poll();
        assert_eq!(mesh.node(a).players().first().unwrap().ping_ms, 90);
    }
}
