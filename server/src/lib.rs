//! # Chor Police Game Server Library
//!
//! This library provides the authoritative server for Raja Rani Chor Police,
//! a hidden-role party game for four or five players. The server owns every
//! room's state, deals the cards, enforces who may act when, keeps the
//! scores, and sends each player only what their seat is allowed to see.
//!
//! ## Core Responsibilities
//!
//! ### Authoritative Rounds
//! Clients never decide anything. They send commands ("start the round",
//! "I am the police, I accuse p3") and the server applies the ones that are
//! legal for the sender in the current phase. Everything else is dropped
//! without a reply; the next state push is the only feedback a client needs.
//!
//! ### Hidden Information
//! Every state push is built per recipient. A player sees their own card,
//! the pradhan and police once they have stepped forward, and every card
//! once the round has been resolved. Nothing else leaves the server.
//!
//! ### Timers
//! Dealing, the police's guess and the result screen all run on deadlines.
//! If the police stalls, a suspect is picked for them; if the host stalls on
//! the result screen, the room moves on by itself.
//!
//! ## Architecture Design
//!
//! ### One Actor Per Room
//! Each room is a tokio task that owns a pure, synchronous [`session::Session`]
//! and processes one event at a time: joins, commands, disconnects and timer
//! firings all arrive on the same queue. Races between a player's action and
//! a timer are therefore decided by queue order, and stale timer firings are
//! recognised by a generation token and ignored.
//!
//! ### TCP With Length-Prefixed Frames
//! Clients talk to the server over TCP. Each frame is a big-endian `u32`
//! length followed by a bincode-encoded message from the `shared` crate.
//!
//! ## Module Organization
//!
//! ### Session Module (`session`)
//! The game state machine: lobby, dealing, reveals, the police's guess,
//! result and scoreboard. Takes the clock and RNG as arguments so tests can
//! drive it deterministically.
//!
//! ### Roles and Scoring (`roles`, `scoring`)
//! Random dealing of a fresh role per player each round, and the payout
//! table applied once the police has guessed.
//!
//! ### Redaction Module (`redact`)
//! Turns a session into the view one particular player is allowed to see.
//!
//! ### Room Modules (`room`, `rooms`, `timers`)
//! The per-room actor, the registry that creates rooms on first join and
//! forgets them once they close, and the timer tasks each room arms.
//!
//! ### Directory Module (`directory`)
//! A live list of open rooms with their player counts and phase, swept of
//! rooms that stop reporting.
//!
//! ### Network Module (`network`)
//! TCP listener, handshake, and the per-connection reader and writer.
//!
//! ### Bot Module (`bot`)
//! A scripted player that plays from its redacted view, used by the `bot`
//! binary to fill seats.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::ServerConfig;
//! use server::network::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let server = Server::bind(ServerConfig::default()).await?;
//!
//!     // Accepts connections forever; rooms are created as players join them
//!     server.run().await;
//!
//!     Ok(())
//! }
//! ```

pub mod bot;
pub mod config;
pub mod directory;
pub mod error;
pub mod network;
pub mod redact;
pub mod roles;
pub mod room;
pub mod rooms;
pub mod scoring;
pub mod session;
pub mod timers;
pub mod utils;
