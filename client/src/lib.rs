//! # Game Client Sync Library
//!
//! This library provides the client half of the multiplayer state
//! synchronization layer. It publishes the local player's pose at a fixed
//! cadence, tracks every other participant announced by the relay server,
//! and turns their discrete, jittery network samples into smooth motion.
//!
//! ## Architecture Overview
//!
//! ### Interpolation, Not Prediction
//! Peers are shown slightly in the past: each new sample starts a segment
//! from the previous target to the new one, and the rendered pose walks that
//! segment over one publish interval. Motion is never extrapolated, so a peer
//! whose updates stop simply freezes on its last known pose.
//!
//! ### Fixed Publish Cadence
//! The local pose is sampled and sent at ~20 Hz regardless of how fast the
//! client renders, bounding bandwidth and server fan-out.
//!
//! ### Fresh State per Connection
//! Nothing about peers survives a dropped connection. Reconnecting starts
//! from the roster snapshot the server sends on connect.
//!
//! ## Module Organization
//!
//! ### Remote Module (`remote`)
//! - Per-peer confirmed / target / rendered samples
//! - Interpolation math
//!
//! ### Scheduler Module (`scheduler`)
//! - Outbound update gating independent of frame rate
//!
//! ### Connection Module (`connection`)
//! - Connection state machine
//! - Roster, join, update, and leave handling
//! - Per-frame interpolation hand-off to the renderer
//!
//! ### Input Module (`input`)
//! - The local pose source boundary
//! - A headless bot that walks in circles
//!
//! ### Rendering Module (`rendering`)
//! - The avatar renderer boundary
//! - A logging renderer for headless runs
//!
//! ### Network Module (`network`)
//! - WebSocket connection, frame loop, and reconnects
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::input::CirclingBot;
//! use client::network::{Client, ClientConfig};
//! use client::rendering::LogRenderer;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let bot = CirclingBot::random(&mut rand::thread_rng());
//!     let mut client = Client::new(ClientConfig::default(), LogRenderer::new(60), bot);
//!
//!     client.run().await?;
//!     Ok(())
//! }
//! ```

pub mod connection;
pub mod input;
pub mod network;
pub mod remote;
pub mod rendering;
pub mod scheduler;
