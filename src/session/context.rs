//! Session context: one owned realtime session per authenticated user.
//!
//! The context is created when a session becomes authenticated and torn
//! down at logout. It owns exactly one delivery task (the realtime
//! event channel, or the polling feed for REST-only deployments) plus
//! the fan-out every observer reads from. No globals: consumers receive
//! the context (or a handle from it) explicitly.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;

use crate::channel::{ChannelEvent, ConnectionStatus, EventChannel, EventObserver, Fanout};
use crate::config::{SessionConfig, TokenSource};
use crate::identifiers::GameId;
use crate::protocol::{ClientCommand, ServerEvent};
use crate::session::polling::{PollingFeed, SnapshotSource};

// ============================================================================
// SessionContext
// ============================================================================

/// An authenticated realtime session.
///
/// Exposes the current connection status and the event stream to
/// arbitrarily many independent observers. Observers never affect one
/// another: each holds its own receiver and applies its own filter.
///
/// Dropping the context (or calling
/// [`shutdown`](SessionContext::shutdown)) disconnects the channel and
/// stops every background task it spawned.
pub struct SessionContext {
    /// Fan-out hub shared with the delivery task.
    fanout: Arc<Fanout>,

    /// The event channel, absent in polling mode.
    channel: Option<EventChannel>,

    /// Background tasks owned by this context (keepalive or polling).
    tasks: Vec<JoinHandle<()>>,
}

impl SessionContext {
    /// Starts a realtime session over the event channel.
    ///
    /// Connects immediately and keeps reconnecting until shutdown. A
    /// keepalive ping is sent every
    /// [`keepalive_interval`](SessionConfig::keepalive_interval).
    #[must_use]
    pub fn realtime(config: SessionConfig, tokens: Arc<dyn TokenSource>) -> Self {
        let fanout = Fanout::new();
        let channel = EventChannel::spawn(config.clone(), tokens, Arc::clone(&fanout));
        channel.connect();

        let keepalive = tokio::spawn(keepalive_loop(
            channel.clone(),
            config.keepalive_interval,
        ));

        debug!("realtime session started");
        Self {
            fanout,
            channel: Some(channel),
            tasks: vec![keepalive],
        }
    }

    /// Starts a polling session over a snapshot source.
    ///
    /// The feed polls every
    /// [`poll_interval`](SessionConfig::poll_interval) and publishes the
    /// same event contract the realtime channel does, so observers are
    /// agnostic to the mode.
    #[must_use]
    pub fn polling(config: SessionConfig, source: Arc<dyn SnapshotSource>) -> Self {
        let fanout = Fanout::new();
        let feed = PollingFeed::new(source, Arc::clone(&fanout), config.poll_interval);
        let task = tokio::spawn(feed.run());

        debug!("polling session started");
        Self {
            fanout,
            channel: None,
            tasks: vec![task],
        }
    }

    // ========================================================================
    // Observation
    // ========================================================================

    /// Registers a new observer of the event stream.
    ///
    /// The observer sees every event published after registration, in
    /// receipt order; dropping it detaches it. For anything that arrived
    /// earlier, only [`last_event`](SessionContext::last_event) is
    /// available; the context keeps no history.
    #[must_use]
    pub fn observe(&self) -> EventObserver {
        self.fanout.subscribe()
    }

    /// Returns the current connection status.
    #[inline]
    #[must_use]
    pub fn status(&self) -> ConnectionStatus {
        self.fanout.status()
    }

    /// Returns a watch receiver for status transitions.
    #[inline]
    #[must_use]
    pub fn watch_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.fanout.watch_status()
    }

    /// Returns the most recent server event, if any.
    ///
    /// Last-value cache for late-registering observers, not a history:
    /// an observer mounting between two events has permanently missed
    /// the earlier one.
    #[inline]
    #[must_use]
    pub fn last_event(&self) -> Option<ServerEvent> {
        self.fanout.last_event()
    }

    // ========================================================================
    // Channel Operations
    // ========================================================================

    /// Returns the event channel, when running in realtime mode.
    #[inline]
    #[must_use]
    pub fn channel(&self) -> Option<&EventChannel> {
        self.channel.as_ref()
    }

    /// Joins a game room. No-op in polling mode.
    pub fn join(&self, game_id: impl Into<GameId>) {
        if let Some(channel) = &self.channel {
            channel.join(game_id);
        }
    }

    /// Leaves a game room. No-op in polling mode.
    pub fn leave(&self, game_id: impl Into<GameId>) {
        if let Some(channel) = &self.channel {
            channel.leave(game_id);
        }
    }

    /// Sends a command over the channel. No-op in polling mode.
    pub fn send(&self, command: ClientCommand) {
        if let Some(channel) = &self.channel {
            channel.send(command);
        }
    }

    /// Re-sends the auth handshake after a token change.
    ///
    /// Call when a login happens while the session is already up; a
    /// disconnected or polling session ignores this.
    pub fn refresh_auth(&self) {
        if let Some(channel) = &self.channel {
            channel.refresh_auth();
        }
    }

    // ========================================================================
    // Teardown
    // ========================================================================

    /// Tears the session down: disconnects the channel and stops every
    /// background task. Idempotent; also runs on drop.
    pub fn shutdown(&mut self) {
        let active = !self.tasks.is_empty() || self.channel.is_some();

        for task in self.tasks.drain(..) {
            task.abort();
        }
        if let Some(channel) = self.channel.take() {
            channel.disconnect();
            channel.shutdown();
        }

        if active {
            self.fanout.set_status(ConnectionStatus::Disconnected);
            self.fanout.publish(ChannelEvent::Disconnected);
            debug!("session torn down");
        }
    }
}

impl Drop for SessionContext {
    fn drop(&mut self) {
        self.shutdown();
    }
}

// ============================================================================
// Keepalive
// ============================================================================

/// Periodically pings the channel to keep the connection warm.
async fn keepalive_loop(channel: EventChannel, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately; a connection this young
    // needs no heartbeat yet.
    ticker.tick().await;

    loop {
        ticker.tick().await;
        channel.keepalive();
    }
}

// ============================================================================
// Tests
// ============================================================================
