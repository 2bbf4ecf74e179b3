//! # Trivia Client Library
//!
//! This library provides the player side of the LAN trivia game: it finds a
//! server by listening for broadcast offers, joins it over TCP, shows the
//! questions and relays the player's answers.
//!
//! ## Session Flow
//!
//! 1. **Waiting for an offer**: the client binds the well-known discovery
//!    port (shared with other clients on the same host) and waits for a
//!    valid offer packet.
//! 2. **Connecting**: it connects to the sender's address at the advertised
//!    port and, if a name was chosen, asks the server to rename it.
//! 3. **Playing**: server messages are displayed as they arrive. A question
//!    opens an answer window; the first valid yes/no line typed inside it is
//!    sent as the answer.
//! 4. After the game ends, or the server goes away, the client goes back to
//!    waiting for offers. A server shutdown or `exit` ends the client.
//!
//! ## Module Organization
//!
//! ### Display Module (`display`)
//! ANSI styling and the `UserInterface` the client writes to.
//!
//! ### Input Module (`input`)
//! Reads typed lines off the terminal and recognizes commands:
//! - `exit` quits
//! - `/name <new name>` requests a rename
//! - Anything else is an answer attempt
//!
//! ### Network Module (`network`)
//! Discovery, the session loop and the client state machine.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::display::Terminal;
//! use client::input::InputManager;
//! use client::network::{Client, ClientConfig};
//!
//! #[tokio::main]
//! async fn main() -> std::io::Result<()> {
//!     let mut client = Client::new(ClientConfig::default(), InputManager::stdin(), Terminal);
//!     client.run().await
//! }
//! ```

pub mod display;
pub mod input;
pub mod network;
