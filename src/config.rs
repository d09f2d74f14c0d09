//! Configuration: bind address plus the game's tunable constants.

use std::env;
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

/// Socket address to bind the server to.
///
/// Reads the `PORT` env var or defaults to 8080, binds to 0.0.0.0.
pub fn server_addr() -> SocketAddr {
    let port = env::var("PORT")
        .ok()
        .and_then(|v| v.parse::<u16>().ok())
        .unwrap_or(8080);
    SocketAddr::from((Ipv4Addr::UNSPECIFIED, port))
}

pub const MAX_PLAYERS: usize = 4;
pub const MIN_PLAYERS: usize = 2;
pub const HAND_SIZE: usize = 4;
pub const PEEKS_PER_ROUND: u8 = 2;
/// A player whose running total reaches this loses the game.
pub const WIN_THRESHOLD: i32 = 50;
pub const MAX_CHAT_LEN: usize = 150;

/// Peek window advertised to clients.
pub const PEEK_DURATION: Duration = Duration::from_millis(5000);
/// When the PEEKING -> PLAYING transition actually fires; the extra
/// half second absorbs client-side animation lag.
pub const PEEK_TRANSITION: Duration = Duration::from_millis(5500);
/// Pause on REVEALING_CARDS before the leaderboard phase.
pub const REVEAL_PAUSE: Duration = Duration::from_millis(3000);

/// How long a room survives with a player disconnected mid-game.
///
/// Overridable via `KYRO_GRACE_SECS` (useful for local testing).
pub fn disconnect_grace() -> Duration {
    let secs = env::var("KYRO_GRACE_SECS")
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(60);
    Duration::from_secs(secs)
}
