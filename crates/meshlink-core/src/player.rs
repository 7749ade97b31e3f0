//! Player directory.
//!
//! Players are kept in join order as a doubly-linked list whose links are
//! stored as neighbour ids in a keyed table. Appending goes to the tail and
//! removal is O(1).

use std::collections::HashMap;
use std::fmt;

use meshlink_proto::{Address, truncate_name};

use crate::transport::{PeerId, PeerStats};

/// Stable identifier of a player within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PlayerId(pub u32);

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "player#{}", self.0)
    }
}

/// A remote peer that completed its name announce.
#[derive(Debug, Clone, PartialEq)]
pub struct Player {
    pub id: PlayerId,
    /// Connection this player lives on.
    pub peer: PeerId,
    pub name: String,
    pub address: Address,
    pub bandwidth_in: u32,
    pub bandwidth_out: u32,
    pub ping_ms: u32,
    pub packet_loss: f32,
}

impl Player {
    /// Dotted-decimal address of the player.
    pub fn ip(&self) -> String {
        self.address.ip_string()
    }

    pub fn port(&self) -> u16 {
        self.address.port
    }

    pub(crate) fn update_stats(&mut self, stats: &PeerStats) {
        self.ping_ms = stats.round_trip_time_ms;
        self.packet_loss = stats.packet_loss;
    }
}

#[derive(Debug, Clone)]
struct Node {
    player: Player,
    prev: Option<PlayerId>,
    next: Option<PlayerId>,
}

/// Ordered registry of players.
#[derive(Debug, Clone, Default)]
pub struct PlayerDirectory {
    nodes: HashMap<PlayerId, Node>,
    first: Option<PlayerId>,
    last: Option<PlayerId>,
    length: usize,
    next_id: u32,
}

impl PlayerDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a player for `peer` and append it at the tail.
    pub fn insert(&mut self, peer: PeerId, name: &str, address: Address, stats: &PeerStats) -> PlayerId {
        let id = PlayerId(self.next_id);
        self.next_id += 1;

        let player = Player {
            id,
            peer,
            name: truncate_name(name).to_string(),
            address,
            bandwidth_in: stats.incoming_bandwidth,
            bandwidth_out: stats.outgoing_bandwidth,
            ping_ms: stats.round_trip_time_ms,
            packet_loss: stats.packet_loss,
        };

        let prev = self.last;
        if let Some(prev_id) = prev {
            if let Some(prev_node) = self.nodes.get_mut(&prev_id) {
                prev_node.next = Some(id);
            }
        }
        self.nodes.insert(
            id,
            Node {
                player,
                prev,
                next: None,
            },
        );
        self.last = Some(id);
        if self.first.is_none() {
            self.first = Some(id);
        }
        self.length += 1;

        id
    }

    /// Unlink and return a player.
    pub fn remove(&mut self, id: PlayerId) -> Option<Player> {
        let node = self.nodes.remove(&id)?;

        match node.prev {
            Some(prev) => {
                if let Some(prev_node) = self.nodes.get_mut(&prev) {
                    prev_node.next = node.next;
                }
            }
            None => self.first = node.next,
        }
        match node.next {
            Some(next) => {
                if let Some(next_node) = self.nodes.get_mut(&next) {
                    next_node.prev = node.prev;
                }
            }
            None => self.last = node.prev,
        }

        self.length -= 1;
        Some(node.player)
    }

    pub fn get(&self, id: PlayerId) -> Option<&Player> {
        self.nodes.get(&id).map(|n| &n.player)
    }

    pub fn get_mut(&mut self, id: PlayerId) -> Option<&mut Player> {
        self.nodes.get_mut(&id).map(|n| &mut n.player)
    }

    /// Update a player's name. Returns the stored (truncated) name.
    pub fn rename(&mut self, id: PlayerId, name: &str) -> Option<&str> {
        let player = self.get_mut(id)?;
        player.name = truncate_name(name).to_string();
        Some(&player.name)
    }

    pub fn first(&self) -> Option<&Player> {
        self.first.and_then(|id| self.get(id))
    }

    pub fn last(&self) -> Option<&Player> {
        self.last.and_then(|id| self.get(id))
    }

    /// Players in join order.
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            directory: self,
            cursor: self.first,
        }
    }

    pub fn ids(&self) -> Vec<PlayerId> {
        self.iter().map(|p| p.id).collect()
    }

    pub fn len(&self) -> usize {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Remove every player. Ids are not reused afterwards.
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.first = None;
        self.last = None;
        self.length = 0;
    }
}

/// Join-order iterator over a [`PlayerDirectory`].
pub struct Iter<'a> {
    directory: &'a PlayerDirectory,
    cursor: Option<PlayerId>,
}

impl<'a> Iterator for Iter<'a> {
    type Item = &'a Player;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.directory.nodes.get(&self.cursor?)?;
        self.cursor = node.next;
        Some(&node.player)
    }
}

impl<'a> IntoIterator for &'a PlayerDirectory {
    type Item = &'a Player;
    type IntoIter = Iter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn add(directory: &mut PlayerDirectory, peer: u64, name: &str) -> PlayerId {
        let address = Address::from_raw(10, u16::try_from(peer).unwrap());
        directory.insert(PeerId(peer), name, address, &PeerStats::default())
    }

    fn names(directory: &PlayerDirectory) -> Vec<String> {
        directory.iter().map(|p| p.name.clone()).collect()
    }

    #[test]
    fn test_append_keeps_join_order() {
        let mut directory = PlayerDirectory::new();
        add(&mut directory, 1, "A");
        add(&mut directory, 2, "B");
        add(&mut directory, 3, "C");

        assert_eq!(names(&directory), vec!["A", "B", "C"]);
        assert_eq!(directory.len(), 3);
        assert_eq!(directory.first().unwrap().name, "A");
        assert_eq!(directory.last().unwrap().name, "C");
    }

    #[test]
    fn test_remove_middle_head_tail() {
        let mut directory = PlayerDirectory::new();
        let a = add(&mut directory, 1, "A");
        let b = add(&mut directory, 2, "B");
        let c = add(&mut directory, 3, "C");
        let d = add(&mut directory, 4, "D");

        assert_eq!(directory.remove(b).unwrap().name, "B");
        assert_eq!(names(&directory), vec!["A", "C", "D"]);

        directory.remove(a);
        assert_eq!(names(&directory), vec!["C", "D"]);
        assert_eq!(directory.first().unwrap().id, c);

        directory.remove(d);
        assert_eq!(names(&directory), vec!["C"]);
        assert_eq!(directory.last().unwrap().id, c);

        directory.remove(c);
        assert!(directory.is_empty());
        assert!(directory.first().is_none());
        assert!(directory.last().is_none());

        // Removing twice is harmless
        assert!(directory.remove(c).is_none());
        assert_eq!(directory.len(), 0);
    }

    #[test]
    fn test_append_after_removal() {
        let mut directory = PlayerDirectory::new();
        add(&mut directory, 1, "A");
        let b = add(&mut directory, 2, "B");
        directory.remove(b);
        add(&mut directory, 3, "C");

        assert_eq!(names(&directory), vec!["A", "C"]);
    }

    #[test]
    fn test_rename() {
        let mut directory = PlayerDirectory::new();
        let id = add(&mut directory, 9, "Old");

        assert_eq!(directory.get(id).unwrap().peer, PeerId(9));
        assert_eq!(directory.rename(id, "Alice"), Some("Alice"));
        assert_eq!(directory.get(id).unwrap().name, "Alice");

        directory.remove(id);
        assert!(directory.rename(id, "Bob").is_none());
    }

    #[test]
    fn test_ids_are_not_reused() {
        let mut directory = PlayerDirectory::new();
        let a = add(&mut directory, 1, "A");
        directory.clear();
        let b = add(&mut directory, 1, "A");
        assert_ne!(a, b);
        assert_eq!(directory.len(), 1);
    }

    #[test]
    fn test_player_address_fields() {
        let mut directory = PlayerDirectory::new();
        let stats = PeerStats {
            round_trip_time_ms: 40,
            packet_loss: 0.25,
            incoming_bandwidth: 1000,
            outgoing_bandwidth: 2000,
        };
        let address = Address::new(std::net::Ipv4Addr::new(192, 168, 0, 3), 2301);
        let id = directory.insert(PeerId(1), "P", address, &stats);
        let player = directory.get(id).unwrap();

        assert_eq!(player.ip(), "192.168.0.3");
        assert_eq!(player.port(), 2301);
        assert_eq!(player.ping_ms, 40);
        assert_eq!(player.bandwidth_in, 1000);
        assert_eq!(player.bandwidth_out, 2000);
    }
}
