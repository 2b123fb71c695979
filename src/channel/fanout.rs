//! Event fan-out and connection status.
//!
//! One received event is delivered to every currently registered
//! observer, in receipt order. Observers are independent: each holds its
//! own receiver, so a slow or failing observer can never block delivery
//! to the others, and dropping an observer detaches it deterministically.
//!
//! The fan-out keeps only the single most recent server event as a
//! last-value cache for late-registering observers; it is not a history.
//! Observers that need cumulative state accumulate it from their own
//! stream of broadcasts.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::{broadcast, watch};
use tracing::warn;

use crate::identifiers::GameId;
use crate::protocol::ServerEvent;

// ============================================================================
// Constants
// ============================================================================

/// Broadcast buffer per observer.
///
/// An observer that falls more than this many events behind starts
/// losing the oldest ones (reported via a lag warning, see
/// [`EventObserver::recv`]).
const EVENT_BUFFER: usize = 256;

// ============================================================================
// ConnectionStatus
// ============================================================================

/// Observable connection state of the event channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// No connection; a reconnect may be pending.
    Disconnected,
    /// A connection attempt is in flight.
    Connecting,
    /// Connected and authenticated traffic is flowing.
    Open,
}

impl ConnectionStatus {
    /// Returns `true` when the channel is open.
    #[inline]
    #[must_use]
    pub const fn is_open(self) -> bool {
        matches!(self, Self::Open)
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Open => "open",
        };
        f.write_str(label)
    }
}

// ============================================================================
// ChannelEvent
// ============================================================================

/// An item on the broadcast stream.
///
/// This is the uniform contract both delivery modes publish: the
/// realtime channel and the polling feed emit the same variants, so
/// observers are agnostic to the active transport mode.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    /// The channel came up (connection established, or first successful
    /// poll in polling mode).
    Connected,

    /// The channel went down; a reconnect may follow.
    Disconnected,

    /// A server event arrived.
    Message(ServerEvent),

    /// A non-fatal failure: malformed frame, failed poll. The channel
    /// keeps running.
    Error(String),
}

impl ChannelEvent {
    /// Returns the game a `Message` event belongs to, if any.
    ///
    /// Lifecycle and error events report `None`; observers typically use
    /// this to filter the stream down to their own game.
    #[inline]
    #[must_use]
    pub fn game_id(&self) -> Option<&GameId> {
        match self {
            Self::Message(event) => event.game_id(),
            _ => None,
        }
    }
}

// ============================================================================
// Fanout
// ============================================================================

/// Broadcast hub shared by the channel (or polling feed) and its
/// observers.
///
/// Single-writer, many-reader: only the owning delivery task publishes;
/// observers only read.
pub struct Fanout {
    /// Event broadcast to all observers.
    events: broadcast::Sender<ChannelEvent>,

    /// Connection status publisher.
    status_tx: watch::Sender<ConnectionStatus>,

    /// Retained receiver so status publishing never fails.
    status_rx: watch::Receiver<ConnectionStatus>,

    /// Most recent server event, for late-registering observers.
    last_event: RwLock<Option<ServerEvent>>,
}

impl Fanout {
    /// Creates a new fan-out hub.
    #[must_use]
    pub fn new() -> Arc<Self> {
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        let (status_tx, status_rx) = watch::channel(ConnectionStatus::Disconnected);

        Arc::new(Self {
            events,
            status_tx,
            status_rx,
            last_event: RwLock::new(None),
        })
    }

    /// Registers a new observer.
    ///
    /// The observer sees every event published after registration, in
    /// receipt order. Dropping it detaches it.
    #[must_use]
    pub fn subscribe(&self) -> EventObserver {
        EventObserver {
            receiver: self.events.subscribe(),
        }
    }

    /// Publishes an event to all observers.
    ///
    /// `Message` events also refresh the last-value cache. An event with
    /// no registered observers is simply dropped; the fan-out makes no
    /// durability promise.
    pub fn publish(&self, event: ChannelEvent) {
        if let ChannelEvent::Message(server_event) = &event {
            *self.last_event.write() = Some(server_event.clone());
        }
        let _ = self.events.send(event);
    }

    /// Publishes a new connection status.
    ///
    /// No-op when the status is unchanged, so watchers only wake on real
    /// transitions.
    pub fn set_status(&self, status: ConnectionStatus) {
        self.status_tx.send_if_modified(|current| {
            if *current == status {
                false
            } else {
                *current = status;
                true
            }
        });
    }

    /// Returns the current connection status.
    #[inline]
    #[must_use]
    pub fn status(&self) -> ConnectionStatus {
        *self.status_rx.borrow()
    }

    /// Returns a watch receiver for status transitions.
    #[inline]
    #[must_use]
    pub fn watch_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status_rx.clone()
    }

    /// Returns the most recent server event, if any arrived yet.
    #[inline]
    #[must_use]
    pub fn last_event(&self) -> Option<ServerEvent> {
        self.last_event.read().clone()
    }

    /// Returns the number of currently registered observers.
    #[inline]
    #[must_use]
    pub fn observer_count(&self) -> usize {
        self.events.receiver_count()
    }
}

// ============================================================================
// EventObserver
// ============================================================================

/// A registered observer of the event stream.
///
/// Each observer reads the same broadcast independently and applies its
/// own filter predicate; the fan-out never filters. Dropping the
/// observer unregisters it.
pub struct EventObserver {
    receiver: broadcast::Receiver<ChannelEvent>,
}

impl EventObserver {
    /// Receives the next event.
    ///
    /// Returns `None` once the publishing side is gone (session torn
    /// down). An observer that lagged past the broadcast buffer skips
    /// the lost events with a warning and resumes at the oldest retained
    /// one.
    pub async fn recv(&mut self) -> Option<ChannelEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "observer lagged; events skipped");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Receives the next event without waiting.
    ///
    /// Returns `None` when no event is ready or the publisher is gone.
    pub fn try_recv(&mut self) -> Option<ChannelEvent> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    warn!(skipped, "observer lagged; events skipped");
                }
                Err(_) => return None,
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
