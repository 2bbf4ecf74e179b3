//! # Trivia Server Library
//!
//! This library provides the server side of a LAN true/false trivia game. The
//! server advertises itself over UDP broadcast, accepts players over TCP,
//! and runs timed question rounds against them until it is shut down.
//!
//! ## Core Responsibilities
//!
//! ### Discovery
//! While waiting for players the server broadcasts a fixed-size offer packet
//! once per interval. The offer carries the server name and the TCP port of
//! the listener opened for the current join window.
//!
//! ### Player Management
//! Handles the complete lifecycle of player connections:
//! - Registration under a unique `Player<N>` name
//! - Rename requests before a game starts
//! - Disconnect detection and notification of the remaining players
//!
//! ### Rounds
//! Each round broadcasts the standings, asks a random unused question, waits
//! out the answer window and scores whatever arrived in time. The game ends
//! when questions, players or the round budget run out.
//!
//! ## Architecture Design
//!
//! ### Tasks
//! - **Round scheduler**: the `Server::run` loop. The only writer of the
//!   server state.
//! - **Acceptor**: one per join window, registers incoming connections.
//! - **Connection tasks**: one per player, owning its socket. Outbound
//!   messages reach them through an unbounded queue, so the shared registry
//!   lock is never held across socket I/O.
//!
//! ### Server State
//! `Inactive -> SendingOffers -> GameStarted -> Inactive -> ...`, with
//! `Terminated` reachable on shutdown. Other tasks observe it through a
//! `tokio::sync::watch` channel.
//!
//! ## Module Organization
//!
//! - `config`: runtime settings and their validation
//! - `discovery`: the offer broadcaster
//! - `error`: fatal server errors
//! - `game`: server state, question drawing and round scoring
//! - `network`: the server itself, its acceptor and connection tasks
//! - `player` / `player_manager`: the registry and the answer window
//! - `questions`: question sources keyed by topic
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::ServerConfig;
//! use server::network::Server;
//! use server::questions::CsvQuestionSource;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServerConfig::default();
//!     let source = Arc::new(CsvQuestionSource::new(&config.questions_dir));
//!
//!     let mut server = Server::new(config, source).await?;
//!
//!     let shutdown = server.shutdown_handle();
//!     tokio::spawn(async move {
//!         let _ = tokio::signal::ctrl_c().await;
//!         shutdown.shutdown();
//!     });
//!
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod discovery;
pub mod error;
pub mod game;
pub mod network;
pub mod player;
pub mod player_manager;
pub mod questions;
