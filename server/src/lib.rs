//! # Pong Relay Server Library
//!
//! A UDP relay that pairs two players into a session and forwards paddle,
//! ball and score updates between them. The server runs no game simulation:
//! the session's main client owns the ball, and the relay only enforces who
//! may say what and when.
//!
//! ## Architecture
//!
//! ### Receive Loop
//! Datagrams are fed through a single [`shared::FrameDecoder`]. Frames that
//! pass their CRC are pushed into a bounded [`pipeline`] queue; when the queue
//! is full the loop waits and the kernel drops further datagrams.
//!
//! ### Worker
//! The sole consumer of the queue. Frames with an unknown type or a payload
//! of the wrong length are dropped, the rest are decoded and applied to the
//! [`relay::RelayState`] under one lock per request.
//!
//! ### Sender
//! Replies are handed to a single task that owns every socket write.
//!
//! ### Sweep
//! Once per interval, clients that have been silent too long are marked for
//! eviction. Marked slots are only reclaimed when a new client needs one.
//!
//! ## Reliability
//!
//! The protocol has no acknowledgements or retransmission at this layer.
//! Clients resend a request until they observe the reply they expect, and
//! every handler answers a repeated request with the same confirmation.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::ServerConfig;
//! use server::network::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let server = Server::new(ServerConfig::default()).await?;
//!
//!     server
//!         .run_until(async {
//!             let _ = tokio::signal::ctrl_c().await;
//!         })
//!         .await?;
//!
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod network;
pub mod pipeline;
pub mod pool;
pub mod relay;
