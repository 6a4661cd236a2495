//! # Worms Arena Server
//!
//! Authoritative UDP server for the multiplayer worms arena. Every connected
//! client steers a point-sized bug that paints a solid trail across the
//! board; touching a painted cell or leaving the board eliminates the bug,
//! and the last one moving wins the round.
//!
//! ## Architecture
//!
//! The server is a single cooperative loop over one dual-stack UDP socket.
//! All state (the session registry, the board, the event log) is owned by
//! that loop, so there is no locking and the event log has exactly one
//! writer. Concurrency with client input is achieved by timing, not by
//! threads: during a round the loop waits on the socket only until the next
//! turn deadline, which bounds input latency by one turn.
//!
//! Everything the server decides is expressed as an event appended to the
//! round's log. Broadcasts send the freshly appended suffix, and clients
//! recover from packet loss by asking for any suffix again; the log never
//! mutates, so replay is idempotent.
//!
//! ## Module organization
//!
//! - [`config`]: command-line options and their defaults
//! - [`rng`]: the deterministic generator seeding each round
//! - [`entity`]: the bug's position, heading and movement
//! - [`registry`]: sessions, liveness, readiness ([`registry::Registry`])
//! - [`game`]: round control and the event log ([`game::Game`])
//! - [`network`]: the socket and the lobby/round loop ([`network::Server`])
//!
//! The wire format itself lives in the `shared` crate so clients and tests
//! encode and decode with the very same code.

pub mod config;
pub mod entity;
pub mod game;
pub mod network;
pub mod registry;
pub mod rng;
