//! Realtime event channel.
//!
//! This module maintains the single logical bidirectional event stream
//! to the backend: connection lifecycle, authentication handshake,
//! keepalive, reconnection with backoff, subscription replay and ordered
//! command delivery.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐  commands   ┌──────────────────────────────┐
//! │ EventChannel │────────────►│ actor task                   │
//! │ (handle)     │             │  SubscriptionRegistry        │
//! └──────────────┘             │  OutboundQueue               │
//!                              │  ReconnectBackoff            │
//! ┌──────────────┐   events    │  WebSocket stream            │
//! │ observers    │◄────────────│          │                   │
//! └──────────────┘   Fanout    └──────────┼───────────────────┘
//!                                         ▼
//!                                      backend
//! ```
//!
//! All mutable channel state lives in one actor task; handles and
//! observers never share locks with it.
//!
//! # Guarantees
//!
//! - at most one physical connection per channel;
//! - on every open: auth, then subscription replay, then queue flush;
//! - outbound commands transmitted in enqueue order, none lost to a
//!   disconnect;
//! - inbound events broadcast to every observer in receipt order;
//! - transport failures retried forever with capped geometric backoff.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `backoff` | Reconnect delay schedule |
//! | `core` | Channel handle and actor event loop |
//! | `fanout` | Status, event broadcast and observers |
//! | `queue` | Ordered outbound command buffer |
//! | `registry` | Game-room subscription set |

// ============================================================================
// Submodules
// ============================================================================

/// Reconnect delay schedule.
pub mod backoff;

/// Channel handle and actor event loop.
pub mod core;

/// Status, event broadcast and observers.
pub mod fanout;

/// Ordered outbound command buffer.
pub mod queue;

/// Game-room subscription set.
pub mod registry;

// ============================================================================
// Re-exports
// ============================================================================

pub use backoff::ReconnectBackoff;
pub use core::EventChannel;
pub use fanout::{ChannelEvent, ConnectionStatus, EventObserver, Fanout};
pub use queue::OutboundQueue;
pub use registry::SubscriptionRegistry;
