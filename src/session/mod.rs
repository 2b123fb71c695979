//! Session layer: context ownership and delivery modes.
//!
//! A [`SessionContext`] is the one explicitly owned object per
//! authenticated session. It selects a delivery mode (the realtime
//! event channel, or the REST polling feed) and exposes one uniform
//! contract to observers: a status watch, a broadcast event stream and a
//! last-event cache.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `context` | Session context and keepalive |
//! | `polling` | Snapshot source and polling feed |

// ============================================================================
// Submodules
// ============================================================================

/// Session context and keepalive.
pub mod context;

/// Snapshot source and polling feed.
pub mod polling;

// ============================================================================
// Re-exports
// ============================================================================

pub use context::SessionContext;
pub use polling::{GameSnapshot, MatchmakingSnapshot, PollingFeed, SnapshotSource};
