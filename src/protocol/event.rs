//! Inbound event frames.
//!
//! Events are notifications the server pushes to the client: matchmaking
//! assignments, moves and chat for joined game rooms, and game
//! completion. Each frame is a JSON object with a `type` discriminator.
//!
//! Parsing is strict for known kinds (a `move` frame missing `gameId` is
//! a protocol error, reported and dropped) and lenient for unknown kinds
//! (preserved as [`ServerEvent::Unknown`] so observers can opt in to new
//! event types without a client upgrade).

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::identifiers::{GameId, UserId};

// ============================================================================
// PlayerColor
// ============================================================================

/// Side assignment in a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlayerColor {
    /// White pieces.
    White,
    /// Black pieces.
    Black,
}

// ============================================================================
// ChatMessage
// ============================================================================

/// A chat message inside a game room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Server-issued message ID.
    pub id: String,

    /// Author of the message.
    #[serde(rename = "senderUserId")]
    pub sender_user_id: UserId,

    /// Message body.
    #[serde(rename = "messageText")]
    pub message_text: String,

    /// Server-side creation timestamp (opaque ISO-8601 string).
    #[serde(rename = "createdAt")]
    pub created_at: String,
}

// ============================================================================
// ServerEvent
// ============================================================================

/// A parsed event frame from the server.
///
/// Observers pattern-match on this enum and filter for the games they
/// care about; the channel itself never filters.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    /// Matchmaking assigned the session to a game.
    MatchFound {
        /// The assigned game.
        game_id: GameId,
        /// Side assignment, when the server includes one.
        color: Option<PlayerColor>,
    },

    /// A move was played in a joined game.
    Move {
        /// Game the move belongs to.
        game_id: GameId,
        /// The move in standard algebraic notation.
        san_move: String,
        /// Position after the move.
        fen_after: String,
        /// Game status after the move (opaque, e.g. `active`).
        status: String,
    },

    /// A chat message arrived in a joined game.
    Chat {
        /// Game the message belongs to.
        game_id: GameId,
        /// The message itself.
        message: ChatMessage,
    },

    /// A joined game reached a terminal state.
    GameFinished {
        /// The finished game.
        game_id: GameId,
        /// Winner, absent on a draw.
        winner_user_id: Option<UserId>,
    },

    /// A well-formed frame with an unrecognized `type`.
    Unknown {
        /// The unrecognized `type` value.
        kind: String,
        /// The full frame payload, untouched.
        payload: Value,
    },
}

// ============================================================================
// Frame Field Structs
// ============================================================================

#[derive(Deserialize)]
struct MatchFoundFrame {
    #[serde(rename = "gameId")]
    game_id: GameId,
    #[serde(default)]
    color: Option<PlayerColor>,
}

#[derive(Deserialize)]
struct MoveFrame {
    #[serde(rename = "gameId")]
    game_id: GameId,
    #[serde(rename = "sanMove")]
    san_move: String,
    #[serde(rename = "fenAfter")]
    fen_after: String,
    status: String,
}

#[derive(Deserialize)]
struct ChatFrame {
    #[serde(rename = "gameId")]
    game_id: GameId,
    message: ChatMessage,
}

#[derive(Deserialize)]
struct GameFinishedFrame {
    #[serde(rename = "gameId")]
    game_id: GameId,
    #[serde(rename = "winnerUserId", default)]
    winner_user_id: Option<UserId>,
}

// ============================================================================
// Parsing
// ============================================================================

impl ServerEvent {
    /// Parses a raw text frame.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] if the frame is not valid JSON, lacks
    /// a `type` discriminator, or carries a known `type` with invalid
    /// fields. Unknown `type` values parse successfully into
    /// [`ServerEvent::Unknown`].
    pub fn parse(text: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(text)
            .map_err(|e| Error::protocol(format!("invalid frame JSON: {e}")))?;
        Self::from_value(value)
    }

    /// Parses an already-deserialized JSON frame.
    ///
    /// # Errors
    ///
    /// Same contract as [`ServerEvent::parse`].
    pub fn from_value(value: Value) -> Result<Self> {
        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::protocol("frame missing 'type' discriminator"))?
            .to_string();

        let parsed = match kind.as_str() {
            "match_found" => {
                let frame: MatchFoundFrame = Self::fields(&kind, value)?;
                Self::MatchFound {
                    game_id: frame.game_id,
                    color: frame.color,
                }
            }

            "move" => {
                let frame: MoveFrame = Self::fields(&kind, value)?;
                Self::Move {
                    game_id: frame.game_id,
                    san_move: frame.san_move,
                    fen_after: frame.fen_after,
                    status: frame.status,
                }
            }

            "chat" => {
                let frame: ChatFrame = Self::fields(&kind, value)?;
                Self::Chat {
                    game_id: frame.game_id,
                    message: frame.message,
                }
            }

            "game_finished" => {
                let frame: GameFinishedFrame = Self::fields(&kind, value)?;
                Self::GameFinished {
                    game_id: frame.game_id,
                    winner_user_id: frame.winner_user_id,
                }
            }

            _ => Self::Unknown {
                kind,
                payload: value,
            },
        };

        Ok(parsed)
    }

    /// Deserializes the fields of a known frame kind.
    fn fields<T: serde::de::DeserializeOwned>(kind: &str, value: Value) -> Result<T> {
        serde_json::from_value(value)
            .map_err(|e| Error::protocol(format!("invalid '{kind}' frame: {e}")))
    }
}

// ============================================================================
// Accessors
// ============================================================================

impl ServerEvent {
    /// Returns the `type` discriminator of this event.
    #[inline]
    #[must_use]
    pub fn kind(&self) -> &str {
        match self {
            Self::MatchFound { .. } => "match_found",
            Self::Move { .. } => "move",
            Self::Chat { .. } => "chat",
            Self::GameFinished { .. } => "game_finished",
            Self::Unknown { kind, .. } => kind,
        }
    }

    /// Returns the game this event belongs to, if any.
    ///
    /// `Unknown` events report `None` even when their payload happens to
    /// carry a `gameId`; observers that understand the payload can dig it
    /// out themselves.
    #[inline]
    #[must_use]
    pub fn game_id(&self) -> Option<&GameId> {
        match self {
            Self::MatchFound { game_id, .. }
            | Self::Move { game_id, .. }
            | Self::Chat { game_id, .. }
            | Self::GameFinished { game_id, .. } => Some(game_id),
            Self::Unknown { .. } => None,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
