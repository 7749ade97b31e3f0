//! Simulated mesh walkthrough.
//!
//! Four nodes share an in-memory network with latency and packet loss:
//! `alpha` hosts, the others join one after another, game data is
//! broadcast, then the host crashes and the survivors elect a new one.
//!
//! Set `MESHLINK_CONFIG` to a JSON file to override the session config and
//! `RUST_LOG` to change the log level.

use std::net::Ipv4Addr;
use std::time::Duration;

use anyhow::Context;
use meshlink_core::sim::{SimBinder, SimNetwork};
use meshlink_core::{SendFlags, Session, SessionConfig, SessionEvent};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const TICK: Duration = Duration::from_millis(16);
const SETTLE_TICKS: usize = 10;
const GAME_PORT: u16 = 2300;
const UNRELIABLE_CHANNEL: u8 = 1;
const RELIABLE_CHANNEL: u8 = 2;

struct Node {
    name: &'static str,
    session: Session<SimBinder>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = load_config()?;
    tracing::info!(config = %serde_json::to_string(&config)?, "Session config");

    let network = SimNetwork::with_packet_loss(7, 0.1);
    network.set_latency_ms(20);

    let mut nodes = Vec::new();
    for (index, name) in ["alpha", "bravo", "charlie", "delta"].into_iter().enumerate() {
        let host = Ipv4Addr::new(10, 0, 0, u8::try_from(index + 1)?);
        let mut session = Session::with_config(network.binder(host), config.clone());
        session
            .setup(name, GAME_PORT)
            .with_context(|| format!("Failed to set up {name}"))?;
        session.set_event_sink(move |event: &SessionEvent| log_event(name, event));

        if index == 0 {
            session.host()?;
        } else {
            session.join("10.0.0.1", GAME_PORT)?;
        }
        nodes.push(Node { name, session });
        settle(&mut nodes).await;
    }

    report(&nodes);

    for frame in 0..30u32 {
        let alpha = &mut nodes[0].session;
        alpha.broadcast(&frame.to_be_bytes(), SendFlags::SEQUENCED, UNRELIABLE_CHANNEL)?;
        if frame % 10 == 0 {
            alpha.broadcast(&frame.to_be_bytes(), SendFlags::RELIABLE, RELIABLE_CHANNEL)?;
        }
        tick(&mut nodes).await;
    }
    settle(&mut nodes).await;

    let stats = network.stats();
    tracing::info!(
        sent = stats.packets_sent,
        delivered = stats.packets_delivered,
        dropped = stats.packets_dropped,
        "Network stats"
    );

    let alpha = nodes.remove(0);
    if let Some(address) = alpha.session.local_address() {
        tracing::warn!(%address, "Crashing the host");
        network.crash(address);
    }
    drop(alpha);
    settle(&mut nodes).await;

    report(&nodes);

    for node in &mut nodes {
        node.session.cleanup();
    }
    Ok(())
}

fn load_config() -> anyhow::Result<SessionConfig> {
    let Ok(path) = std::env::var("MESHLINK_CONFIG") else {
        return Ok(SessionConfig::default());
    };
    let json = std::fs::read_to_string(&path).with_context(|| format!("Failed to read {path}"))?;
    SessionConfig::from_json(&json).with_context(|| format!("Invalid config in {path}"))
}

async fn tick(nodes: &mut [Node]) {
    for node in nodes.iter_mut() {
        node.session.poll();
    }
    tokio::time::sleep(TICK).await;
}

async fn settle(nodes: &mut [Node]) {
    for _ in 0..SETTLE_TICKS {
        tick(nodes).await;
    }
}

fn log_event(node: &str, event: &SessionEvent) {
    match event {
        SessionEvent::DataReceived { from, channel, data } => {
            tracing::debug!(node, %from, channel, len = data.len(), "Data");
        }
        other => tracing::info!(node, event = other.kind(), detail = ?other, "Event"),
    }
}

fn report(nodes: &[Node]) {
    for node in nodes {
        let session = &node.session;
        let host = match session.current_host().and_then(|id| session.player(id)) {
            Some(player) => player.name.clone(),
            None if session.is_host() => "(self)".to_string(),
            None => "(unknown)".to_string(),
        };
        tracing::info!(
            node = node.name,
            state = ?session.state(),
            players = session.player_count(),
            %host,
            "Node"
        );
        for player in session.players() {
            tracing::info!(
                node = node.name,
                player = %player.name,
                address = %player.address,
                ping_ms = player.ping_ms,
                loss = player.packet_loss,
                "  Player"
            );
        }
    }
}
