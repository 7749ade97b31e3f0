//! Host election.
//!
//! When the host drops, every remaining peer runs the same election over its
//! own player directory: the lowest `(address, port)` wins. The local node is
//! compared against the best remote candidate using its external address, so
//! all peers converge on the same winner without exchanging messages.
//!
//! Mixed LAN and public addresses are not handled: a LAN address can sort
//! below a public one and win although other peers cannot reach it.

use meshlink_proto::Address;

use crate::player::{Player, PlayerId};
use crate::transport::PeerId;

/// Outcome of a host election.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Election {
    /// The local node is the new host.
    Local,
    /// A remote player is the new host.
    Remote { player: PlayerId, peer: PeerId },
}

/// Player with the lowest address; on exact ties the latest joined wins.
pub fn lowest_player<'a>(players: impl IntoIterator<Item = &'a Player>) -> Option<&'a Player> {
    players.into_iter().fold(None, |lowest, current| match lowest {
        Some(lowest) if lowest.address < current.address => Some(lowest),
        _ => Some(current),
    })
}

/// Elect the host among `players` and the local node.
///
/// The remote candidate only wins if it sorts strictly below `local`. An
/// unknown local address never beats a candidate.
pub fn elect<'a>(players: impl IntoIterator<Item = &'a Player>, local: Option<Address>) -> Election {
    let Some(candidate) = lowest_player(players) else {
        return Election::Local;
    };

    let remote_wins = match local {
        Some(local) => candidate.address < local,
        None => true,
    };

    tracing::debug!(
        candidate = %candidate.address,
        local = ?local,
        remote_wins,
        "[mesh] Host election"
    );

    if remote_wins {
        Election::Remote {
            player: candidate.id,
            peer: candidate.peer,
        }
    } else {
        Election::Local
    }
}
