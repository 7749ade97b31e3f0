//! In-memory transport.
//!
//! A [`SimNetwork`] routes packets between [`SimTransport`]s living in the
//! same thread. Like a real UDP transport, connects and packets are queued
//! and only go out on `flush` (or `poll`, which flushes first), so several
//! sessions polled in turn behave like hosts on a network.
//!
//! Non-reliable packets can be dropped with a seeded RNG to exercise the
//! unreliable paths deterministically.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::net::Ipv4Addr;
use std::rc::Rc;

use meshlink_proto::{Address, Delivery};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::transport::{
    Binder, PeerId, PeerStats, Transport, TransportError, TransportEvent, TransportLimits,
};

/// Default one-way latency reported by the simulator.
const DEFAULT_LATENCY_MS: u32 = 25;

/// Packet counters for the whole network.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NetworkStats {
    pub packets_sent: u64,
    pub packets_delivered: u64,
    pub packets_dropped: u64,
}

struct Endpoint {
    inbox: VecDeque<TransportEvent>,
    limits: TransportLimits,
    /// Distinguishes a re-bound address from a crashed one.
    generation: u64,
}

#[derive(Debug, Clone, Copy)]
struct Link {
    owner: Address,
    remote: Address,
    /// Handle of this link on the remote side, `None` until established.
    remote_peer: Option<PeerId>,
}

enum Outgoing {
    Connect {
        peer: PeerId,
        to: Address,
    },
    Packet {
        peer: PeerId,
        channel: u8,
        data: Vec<u8>,
        delivery: Delivery,
    },
}

struct NetworkInner {
    endpoints: HashMap<Address, Endpoint>,
    links: HashMap<PeerId, Link>,
    next_peer: u64,
    next_generation: u64,
    latency_ms: u32,
    loss_rate: f64,
    rng: ChaCha8Rng,
    stats: NetworkStats,
}

impl NetworkInner {
    fn allocate_peer(&mut self) -> PeerId {
        self.next_peer += 1;
        PeerId(self.next_peer)
    }

    fn link_count(&self, owner: Address) -> usize {
        self.links.values().filter(|l| l.owner == owner).count()
    }

    fn push_event(&mut self, address: Address, event: TransportEvent) {
        if let Some(endpoint) = self.endpoints.get_mut(&address) {
            endpoint.inbox.push_back(event);
        }
    }

    /// Remove `peer` and tell the other side its link is gone.
    fn sever(&mut self, peer: PeerId) {
        let Some(link) = self.links.remove(&peer) else {
            return;
        };
        if let Some(remote_peer) = link.remote_peer {
            if self.links.remove(&remote_peer).is_some() {
                self.push_event(link.remote, TransportEvent::Disconnect(remote_peer));
            }
        }
    }

    fn close_endpoint(&mut self, address: Address) {
        let owned: Vec<PeerId> = self
            .links
            .iter()
            .filter(|(_, l)| l.owner == address)
            .map(|(id, _)| *id)
            .collect();
        for peer in owned {
            self.sever(peer);
        }
        self.endpoints.remove(&address);
    }

    fn establish(&mut self, peer: PeerId, from: Address, to: Address) {
        if !self.links.contains_key(&peer) {
            // Disconnected before the connect went out
            return;
        }

        let accepted = self
            .endpoints
            .get(&to)
            .is_some_and(|endpoint| self.link_count(to) < endpoint.limits.max_peers);

        if !accepted {
            tracing::debug!(%peer, %to, "[sim] Connection refused");
            self.links.remove(&peer);
            self.push_event(from, TransportEvent::Disconnect(peer));
            return;
        }

        let remote_peer = self.allocate_peer();
        self.links.insert(
            remote_peer,
            Link {
                owner: to,
                remote: from,
                remote_peer: Some(peer),
            },
        );
        if let Some(link) = self.links.get_mut(&peer) {
            link.remote_peer = Some(remote_peer);
        }
        self.push_event(from, TransportEvent::Connect(peer));
        self.push_event(to, TransportEvent::Connect(remote_peer));
    }

    fn deliver(&mut self, peer: PeerId, channel: u8, data: Vec<u8>, delivery: Delivery) {
        let Some(link) = self.links.get(&peer).copied() else {
            return;
        };
        let Some(remote_peer) = link.remote_peer else {
            return;
        };

        self.stats.packets_sent += 1;
        if !delivery.is_reliable() && self.loss_rate > 0.0 && self.rng.random_bool(self.loss_rate) {
            self.stats.packets_dropped += 1;
            tracing::trace!(%peer, channel, "[sim] Dropped unreliable packet");
            return;
        }

        self.stats.packets_delivered += 1;
        self.push_event(
            link.remote,
            TransportEvent::Receive {
                peer: remote_peer,
                channel,
                data,
            },
        );
    }
}

/// Shared in-memory network. Cloning yields another handle to the same network.
#[derive(Clone)]
pub struct SimNetwork {
    inner: Rc<RefCell<NetworkInner>>,
}

impl Default for SimNetwork {
    fn default() -> Self {
        Self::new()
    }
}

impl SimNetwork {
    /// Lossless network.
    pub fn new() -> Self {
        Self::with_packet_loss(0, 0.0)
    }

    /// Network dropping non-reliable packets with probability `loss_rate`.
    ///
    /// The rate is clamped to `0.0..=1.0`; NaN means no loss.
    pub fn with_packet_loss(seed: u64, loss_rate: f64) -> Self {
        Self {
            inner: Rc::new(RefCell::new(NetworkInner {
                endpoints: HashMap::new(),
                links: HashMap::new(),
                next_peer: 0,
                next_generation: 0,
                latency_ms: DEFAULT_LATENCY_MS,
                loss_rate: if loss_rate.is_nan() { 0.0 } else { loss_rate.clamp(0.0, 1.0) },
                rng: ChaCha8Rng::seed_from_u64(seed),
                stats: NetworkStats::default(),
            })),
        }
    }

    pub fn set_latency_ms(&self, latency_ms: u32) {
        self.inner.borrow_mut().latency_ms = latency_ms;
    }

    /// Binder for transports on `host`.
    pub fn binder(&self, host: Ipv4Addr) -> SimBinder {
        SimBinder {
            network: self.clone(),
            host,
        }
    }

    /// Simulate the process at `address` dying: every link it had is
    /// reported as disconnected on the other side and the address is freed.
    pub fn crash(&self, address: Address) {
        tracing::info!(%address, "[sim] Crashing endpoint");
        self.inner.borrow_mut().close_endpoint(address);
    }

    pub fn is_bound(&self, address: Address) -> bool {
        self.inner.borrow().endpoints.contains_key(&address)
    }

    pub fn stats(&self) -> NetworkStats {
        self.inner.borrow().stats
    }
}

/// Creates [`SimTransport`]s on one host of a [`SimNetwork`].
#[derive(Clone)]
pub struct SimBinder {
    network: SimNetwork,
    host: Ipv4Addr,
}

impl Binder for SimBinder {
    type Transport = SimTransport;

    fn bind(&self, port: u16, limits: &TransportLimits) -> Result<SimTransport, TransportError> {
        let address = Address::new(self.host, port);
        let mut inner = self.network.inner.borrow_mut();
        if inner.endpoints.contains_key(&address) {
            return Err(TransportError::AddressInUse(address));
        }
        inner.next_generation += 1;
        let generation = inner.next_generation;
        inner.endpoints.insert(
            address,
            Endpoint {
                inbox: VecDeque::new(),
                limits: *limits,
                generation,
            },
        );
        tracing::debug!(%address, "[sim] Bound endpoint");

        Ok(SimTransport {
            network: self.network.clone(),
            local: address,
            generation,
            limits: *limits,
            outbox: Vec::new(),
        })
    }
}

/// One bound endpoint of a [`SimNetwork`].
pub struct SimTransport {
    network: SimNetwork,
    local: Address,
    generation: u64,
    limits: TransportLimits,
    outbox: Vec<Outgoing>,
}

impl SimTransport {
    fn owns(&self, inner: &NetworkInner, peer: PeerId) -> bool {
        inner.links.get(&peer).is_some_and(|l| l.owner == self.local)
    }
}

impl Transport for SimTransport {
    fn local_address(&self) -> Address {
        self.local
    }

    fn connect(&mut self, address: Address) -> Result<PeerId, TransportError> {
        let mut inner = self.network.inner.borrow_mut();
        let open = inner
            .endpoints
            .get(&self.local)
            .is_some_and(|e| e.generation == self.generation);
        if !open {
            return Err(TransportError::Closed);
        }
        if inner.link_count(self.local) >= self.limits.max_peers {
            return Err(TransportError::PeerLimit(self.limits.max_peers));
        }

        let peer = inner.allocate_peer();
        inner.links.insert(
            peer,
            Link {
                owner: self.local,
                remote: address,
                remote_peer: None,
            },
        );
        drop(inner);

        self.outbox.push(Outgoing::Connect { peer, to: address });
        Ok(peer)
    }

    fn disconnect(&mut self, peer: PeerId) {
        let mut inner = self.network.inner.borrow_mut();
        if !self.owns(&inner, peer) {
            return;
        }
        inner.sever(peer);
        drop(inner);

        self.outbox.retain(|out| match out {
            Outgoing::Connect { peer: p, .. } | Outgoing::Packet { peer: p, .. } => *p != peer,
        });
    }

    fn send(
        &mut self,
        peer: PeerId,
        channel: u8,
        data: &[u8],
        delivery: Delivery,
    ) -> Result<(), TransportError> {
        if channel >= self.limits.max_channels {
            return Err(TransportError::InvalidChannel(channel));
        }
        if !self.owns(&self.network.inner.borrow(), peer) {
            return Err(TransportError::UnknownPeer(peer));
        }
        self.outbox.push(Outgoing::Packet {
            peer,
            channel,
            data: data.to_vec(),
            delivery,
        });
        Ok(())
    }

    fn flush(&mut self) {
        if self.outbox.is_empty() {
            return;
        }
        let mut inner = self.network.inner.borrow_mut();
        for out in self.outbox.drain(..) {
            match out {
                Outgoing::Connect { peer, to } => inner.establish(peer, self.local, to),
                Outgoing::Packet {
                    peer,
                    channel,
                    data,
                    delivery,
                } => inner.deliver(peer, channel, data, delivery),
            }
        }
    }

    fn poll(&mut self) -> Option<TransportEvent> {
        self.flush();
        let mut inner = self.network.inner.borrow_mut();
        let generation = self.generation;
        inner
            .endpoints
            .get_mut(&self.local)
            .filter(|e| e.generation == generation)?
            .inbox
            .pop_front()
    }

    fn peer_address(&self, peer: PeerId) -> Option<Address> {
        let inner = self.network.inner.borrow();
        inner
            .links
            .get(&peer)
            .filter(|l| l.owner == self.local)
            .map(|l| l.remote)
    }

    fn peer_stats(&self, peer: PeerId) -> Option<PeerStats> {
        let inner = self.network.inner.borrow();
        let link = inner.links.get(&peer).filter(|l| l.owner == self.local)?;
        let remote_limits = inner.endpoints.get(&link.remote).map(|e| e.limits);

        #[allow(clippy::cast_possible_truncation)]
        let packet_loss = inner.loss_rate as f32;

        Some(PeerStats {
            round_trip_time_ms: inner.latency_ms.saturating_mul(2),
            packet_loss,
            incoming_bandwidth: remote_limits.map_or(0, |l| l.incoming_bandwidth),
            outgoing_bandwidth: remote_limits.map_or(0, |l| l.outgoing_bandwidth),
        })
    }
}

impl Drop for SimTransport {
    fn drop(&mut self) {
        // Closing the socket: the remote sides see a disconnect
        if let Ok(mut inner) = self.network.inner.try_borrow_mut() {
            let bound = inner
                .endpoints
                .get(&self.local)
                .is_some_and(|e| e.generation == self.generation);
            if bound {
                inner.close_endpoint(self.local);
            }
        }
    }
}
