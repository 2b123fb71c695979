//! Outbound command frames.
//!
//! Commands are the only frames the client sends. They are serialized as
//! JSON objects with a snake_case `type` discriminator and camelCase
//! field names, matching what the server expects:
//!
//! ```json
//! { "type": "auth", "token": "<JWT>" }
//! { "type": "join_game", "gameId": "game_42" }
//! { "type": "leave_game", "gameId": "game_42" }
//! { "type": "ping" }
//! ```

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};

use crate::identifiers::GameId;

// ============================================================================
// ClientCommand
// ============================================================================

/// A command frame from client to server.
///
/// Commands issued while the channel is not open are buffered in the
/// outbound queue and transmitted in enqueue order once a connection is
/// established. `Auth` is special: the channel synthesizes it on every
/// connection open with a freshly-read token, so it is never replayed
/// from the queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientCommand {
    /// Authentication handshake carrying the current session token.
    Auth {
        /// Bearer token issued by the authentication subsystem.
        token: String,
    },

    /// Subscribe to a game room.
    JoinGame {
        /// Game room to join.
        #[serde(rename = "gameId")]
        game_id: GameId,
    },

    /// Unsubscribe from a game room.
    LeaveGame {
        /// Game room to leave.
        #[serde(rename = "gameId")]
        game_id: GameId,
    },

    /// Keepalive heartbeat.
    ///
    /// Keeps intermediary infrastructure from closing an idle
    /// connection; has no effect on subscription or queue state.
    Ping,
}

// ============================================================================
// Constructors
// ============================================================================

impl ClientCommand {
    /// Creates an auth command.
    #[inline]
    #[must_use]
    pub fn auth(token: impl Into<String>) -> Self {
        Self::Auth {
            token: token.into(),
        }
    }

    /// Creates a join command for a game room.
    #[inline]
    #[must_use]
    pub fn join(game_id: impl Into<GameId>) -> Self {
        Self::JoinGame {
            game_id: game_id.into(),
        }
    }

    /// Creates a leave command for a game room.
    #[inline]
    #[must_use]
    pub fn leave(game_id: impl Into<GameId>) -> Self {
        Self::LeaveGame {
            game_id: game_id.into(),
        }
    }

    /// Creates a keepalive ping.
    #[inline]
    #[must_use]
    pub const fn ping() -> Self {
        Self::Ping
    }
}

// ============================================================================
// Accessors
// ============================================================================

impl ClientCommand {
    /// Returns the wire `type` discriminator for this command.
    #[inline]
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Auth { .. } => "auth",
            Self::JoinGame { .. } => "join_game",
            Self::LeaveGame { .. } => "leave_game",
            Self::Ping => "ping",
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
