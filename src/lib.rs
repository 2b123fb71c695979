//! Chess Realtime - Reconnecting event-delivery client for the Chess
//! Mastery Platform.
//!
//! This library maintains the realtime session of a chess client: a
//! single logical WebSocket connection multiplexing per-game event
//! streams (moves, chat, match assignment), with authentication
//! handshake, automatic reconnection with capped backoff, subscription
//! replay and ordered delivery of buffered commands.
//!
//! # Architecture
//!
//! The client follows a single-writer actor model:
//!
//! - One [`SessionContext`] per authenticated session owns the delivery
//!   task and the observer fan-out
//! - One actor task owns the connection, subscription registry and
//!   outbound queue; handles never block on the network
//! - Observers read independent broadcast receivers; each filters the
//!   stream for its own game
//!
//! Two delivery modes publish the same event contract: the realtime
//! [`EventChannel`] and the REST [`PollingFeed`] for deployments with
//! WebSockets disabled.
//!
//! # Guarantees
//!
//! - At most one physical connection per session
//! - On every connection open: auth handshake, then subscription
//!   replay, then queue flush - strictly in that order
//! - Outbound commands are never reordered and never lost to a
//!   disconnect (at-least-once; the backend handles commands
//!   idempotently)
//! - Malformed inbound frames are dropped and reported without touching
//!   the connection
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use chess_realtime::{ChannelEvent, SessionConfig, SessionContext};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = SessionConfig::new("https://chess.example.com");
//!     let context = SessionContext::realtime(
//!         config,
//!         Arc::new(|| Some("session-jwt".to_string())),
//!     );
//!
//!     context.join("game_42");
//!
//!     let mut observer = context.observe();
//!     while let Some(event) = observer.recv().await {
//!         match event {
//!             ChannelEvent::Message(message) => println!("event: {message:?}"),
//!             ChannelEvent::Error(error) => eprintln!("non-fatal: {error}"),
//!             _ => {}
//!         }
//!     }
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`channel`] | Event channel: lifecycle, backoff, registry, queue, fan-out |
//! | [`config`] | Session configuration and endpoint derivation |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`identifiers`] | Type-safe ID wrappers |
//! | [`protocol`] | Wire message types |
//! | [`session`] | Session context and polling mode |

// ============================================================================
// Modules
// ============================================================================

/// Event channel: connection lifecycle, backoff, subscriptions, queue
/// and fan-out.
pub mod channel;

/// Session configuration and endpoint derivation.
pub mod config;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Type-safe identifiers for platform entities.
///
/// Newtype wrappers prevent mixing incompatible IDs at compile time.
pub mod identifiers;

/// Wire message types.
///
/// JSON frames with a `type` discriminator, in both directions.
pub mod protocol;

/// Session context and delivery modes.
pub mod session;

// ============================================================================
// Re-exports
// ============================================================================

// Channel types
pub use channel::{
    ChannelEvent, ConnectionStatus, EventChannel, EventObserver, Fanout, ReconnectBackoff,
};

// Configuration types
pub use config::{SessionConfig, TokenSource};

// Error types
pub use error::{Error, Result};

// Identifier types
pub use identifiers::{GameId, UserId};

// Protocol types
pub use protocol::{ChatMessage, ClientCommand, PlayerColor, ServerEvent};

// Session types
pub use session::{
    GameSnapshot, MatchmakingSnapshot, PollingFeed, SessionContext, SnapshotSource,
};
