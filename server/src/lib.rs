//! # Relay Server Library
//!
//! This library provides the authoritative state-synchronization server for the
//! networked first-person game. It keeps one session per connected participant,
//! relays every pose update to all other participants, and reclaims sessions
//! whose connections drop or go silent.
//!
//! ## Core Responsibilities
//!
//! ### Session Ownership
//! The server is the only place that knows who is connected. Ids are assigned
//! here at connect time, and a session lives in the registry from its connect
//! event until its disconnect event or a liveness timeout, never both.
//!
//! ### Relay, Not Simulation
//! Clients are authoritative over their own position. The server stores the
//! latest pose per session and forwards it; it never runs movement physics.
//! Non-finite numbers are rejected, and an optional speed bound drops updates
//! that teleport further than a player could move.
//!
//! ### Liveness
//! A periodic sweep evicts sessions that have not sent anything for longer
//! than the timeout, so a crashed client does not linger as a ghost peer.
//!
//! ## Architecture Design
//!
//! ### Single Event Loop
//! Every connection runs in its own task, but those tasks only parse frames
//! and forward events over a channel. One loop owns the [`relay::Relay`] and
//! handles each event to completion before the next, so the registry needs no
//! locking and updates from one sender are relayed in the order sent.
//!
//! ### WebSocket Transport
//! Connections are WebSockets carrying JSON text frames. Each connection has
//! a writer task fed by a bounded queue so the relay never awaits a slow
//! peer. A peer that lets its queue fill up is closed as a slow consumer.
//!
//! ## Module Organization
//!
//! ### Registry Module (`registry`)
//! - Session records and id allocation
//! - Capacity limit
//! - Staleness queries for the liveness sweep
//!
//! ### Relay Module (`relay`)
//! - Connect / update / action / disconnect handling and fan-out
//! - Payload validation and plausibility checks
//! - Liveness sweep and shutdown
//!
//! ### Network Module (`network`)
//! - WebSocket accept loop and per-connection tasks
//! - The server event loop tying transport events to the relay
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::network::{Server, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let server = Server::bind(ServerConfig {
//!         addr: "0.0.0.0:8080".to_string(),
//!         ..ServerConfig::default()
//!     })
//!     .await?;
//!
//!     // Runs until Ctrl+C, then closes every connection.
//!     server.run().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Security Considerations
//!
//! There is no authentication: any client that can reach the socket can join.
//! Since clients own their positions, the speed bound (`--max-speed`) is the
//! only protection against teleporting clients.

pub mod network;
pub mod registry;
pub mod relay;
