//! Mesh harness for session tests.
//!
//! Nodes live on one [`SimNetwork`]; node `i` is bound at host `Ipv4Addr::from(h)`
//! for the `h` it was added with. [`TestMesh::pump`] polls every node in
//! rounds, which is enough for any join or migration to settle.

use std::net::Ipv4Addr;

use crate::config::SessionConfig;
use crate::event::SessionEvent;
use crate::peer::PeerState;
use crate::session::{Session, SessionState};
use crate::sim::{SimBinder, SimNetwork};

const PUMP_ROUNDS: usize = 12;

pub(crate) struct TestMesh {
    pub network: SimNetwork,
    nodes: Vec<Session<SimBinder>>,
}

impl TestMesh {
    pub fn new() -> Self {
        Self {
            network: SimNetwork::new(),
            nodes: Vec::new(),
        }
    }

    /// Set up a node that is neither hosting nor joined.
    pub fn add(&mut self, host: u32, port: u16, name: &str) -> usize {
        self.add_with_config(host, port, name, SessionConfig::default())
    }

    pub fn add_with_config(&mut self, host: u32, port: u16, name: &str, config: SessionConfig) -> usize {
        let mut session = Session::with_config(self.network.binder(Ipv4Addr::from(host)), config);
        session.setup(name, port).unwrap();
        self.nodes.push(session);
        self.nodes.len() - 1
    }

    /// Set up a hosting node; the initial `HostChanged` is consumed.
    pub fn hosting(&mut self, host: u32, port: u16, name: &str) -> usize {
        let index = self.add(host, port, name);
        self.nodes[index].host().unwrap();
        self.nodes[index].poll();
        index
    }

    /// Set up a node and start joining `target`. Nothing is polled.
    pub fn joining(&mut self, host: u32, port: u16, name: &str, target: usize) -> usize {
        let address = self.nodes[target].local_address().unwrap();
        let index = self.add(host, port, name);
        self.nodes[index]
            .join(&address.ip_string(), address.port)
            .unwrap();
        index
    }

    pub fn node(&self, index: usize) -> &Session<SimBinder> {
        &self.nodes[index]
    }

    pub fn node_mut(&mut self, index: usize) -> &mut Session<SimBinder> {
        &mut self.nodes[index]
    }

    /// Poll all nodes for a fixed number of rounds. Returns the events of
    /// each node, indexed like the nodes.
    pub fn pump(&mut self) -> Vec<Vec<SessionEvent>> {
        let mut events = vec![Vec::new(); self.nodes.len()];
        for _ in 0..PUMP_ROUNDS {
            for (index, node) in self.nodes.iter_mut().enumerate() {
                events[index].extend(node.poll());
            }
            self.assert_invariants();
        }
        events
    }

    /// Directory and peer table agree, and the host reference matches the role.
    pub fn assert_invariants(&self) {
        for (index, node) in self.nodes.iter().enumerate() {
            let playing = node
                .peers()
                .iter()
                .filter(|(_, entry)| entry.state == PeerState::Playing)
                .count();
            assert_eq!(node.player_count(), playing, "node {index}: directory/peer mismatch");

            for (peer, entry) in node.peers().iter() {
                if entry.state == PeerState::Playing {
                    let player = entry.player.and_then(|id| node.player(id));
                    assert_eq!(player.map(|p| p.peer), Some(peer), "node {index}: dangling player");
                }
            }

            if node.state() == SessionState::Connected {
                assert_eq!(
                    node.is_host(),
                    node.host_peer().is_none(),
                    "node {index}: host reference disagrees with role"
                );
            }
        }
    }
}
