//! Kyro: a room-based, Cabo-style multiplayer card game server.
//!
//! The authoritative game state lives in [`game`]; [`room`] binds
//! connections to rooms and schedules timers; [`ws`] speaks the wire
//! protocol defined in [`protocol`].

pub mod config;
pub mod game;
pub mod http;
pub mod protocol;
pub mod room;
pub mod telemetry;
pub mod util;
pub mod ws;
