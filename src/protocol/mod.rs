//! Wire message types.
//!
//! This module defines the JSON frame formats exchanged with the backend
//! over the event channel. Every frame is a JSON object with a `type`
//! discriminator.
//!
//! # Protocol Overview
//!
//! | Message Type | Direction | Purpose |
//! |--------------|-----------|---------|
//! | `auth` | Client → Server | Authentication handshake |
//! | `join_game` | Client → Server | Subscribe to a game room |
//! | `leave_game` | Client → Server | Unsubscribe from a game room |
//! | `ping` | Client → Server | Keepalive |
//! | `match_found` | Server → Client | Matchmaking assignment |
//! | `move` | Server → Client | Move played in a joined game |
//! | `chat` | Server → Client | Chat message in a joined game |
//! | `game_finished` | Server → Client | Game reached a terminal state |
//!
//! The client is payload-agnostic beyond the `type` field: frames with an
//! unrecognized `type` are preserved as [`ServerEvent::Unknown`] rather
//! than rejected, so new server-side event kinds never break delivery.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `command` | Outbound command frames |
//! | `event` | Inbound event frames |

// ============================================================================
// Submodules
// ============================================================================

/// Outbound command frames.
pub mod command;

/// Inbound event frames.
pub mod event;

// ============================================================================
// Re-exports
// ============================================================================

pub use command::ClientCommand;
pub use event::{ChatMessage, PlayerColor, ServerEvent};
