//! Subscription registry.
//!
//! Source of truth for which game rooms this session should be receiving
//! events for, independent of connection state. The set survives every
//! reconnect and is replayed over the wire before any queued command is
//! flushed. Entries are only ever removed by an explicit leave; nothing
//! expires on its own.

// ============================================================================
// Imports
// ============================================================================

use rustc_hash::FxHashSet;

use crate::identifiers::GameId;

// ============================================================================
// SubscriptionRegistry
// ============================================================================

/// The set of game rooms the session is subscribed to.
#[derive(Debug, Default, Clone)]
pub struct SubscriptionRegistry {
    topics: FxHashSet<GameId>,
}

impl SubscriptionRegistry {
    /// Creates an empty registry.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a game room. Idempotent.
    ///
    /// Returns `true` if the room was newly inserted.
    #[inline]
    pub fn add(&mut self, game_id: GameId) -> bool {
        self.topics.insert(game_id)
    }

    /// Removes a game room. Idempotent.
    ///
    /// Returns `true` if the room was present.
    #[inline]
    pub fn remove(&mut self, game_id: &GameId) -> bool {
        self.topics.remove(game_id)
    }

    /// Returns `true` if the room is in the registry.
    #[inline]
    #[must_use]
    pub fn contains(&self, game_id: &GameId) -> bool {
        self.topics.contains(game_id)
    }

    /// Returns the number of subscribed rooms.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.topics.len()
    }

    /// Returns `true` if no rooms are subscribed.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }

    /// Iterates the subscribed rooms, used at reconnect time for replay.
    ///
    /// Iteration order is unspecified; the wire contract only orders
    /// subscription replay relative to the queued-command flush, not
    /// subscriptions relative to one another.
    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &GameId> {
        self.topics.iter()
    }
}

// ============================================================================
// Tests
// ============================================================================
