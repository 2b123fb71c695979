//! Event channel handle and connection lifecycle.
//!
//! The [`EventChannel`] is a cheap clonable handle over a background
//! actor task that owns the WebSocket connection and every piece of
//! mutable channel state: status, subscription registry, outbound queue
//! and backoff schedule. Handle methods never block and never fail; they
//! enqueue a command for the actor, and the eventual effect is observed
//! through the fan-out rather than returned.
//!
//! # Connection Lifecycle
//!
//! ```text
//! Disconnected ──connect()──► Connecting ──open──► Open
//!      ▲                          │                  │
//!      │                       refused          close/error
//!      │                          ▼                  ▼
//!      └──────backoff delay────Disconnected◄─────────┘
//! ```
//!
//! On every transport open, in order: the auth handshake is sent with a
//! freshly-read token, the subscription registry is replayed, and the
//! outbound queue is flushed in enqueue order. `disconnect()` leaves the
//! cycle; `connect()` re-enters it.

// ============================================================================
// Imports
// ============================================================================

use std::pin::pin;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, trace, warn};

use crate::channel::backoff::ReconnectBackoff;
use crate::channel::fanout::{ChannelEvent, ConnectionStatus, Fanout};
use crate::channel::queue::OutboundQueue;
use crate::channel::registry::SubscriptionRegistry;
use crate::config::{SessionConfig, TokenSource};
use crate::error::Result;
use crate::identifiers::GameId;
use crate::protocol::{ClientCommand, ServerEvent};

// ============================================================================
// Types
// ============================================================================

/// Client-side WebSocket stream.
type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

// ============================================================================
// ChannelCommand
// ============================================================================

/// Internal commands for the actor task.
enum ChannelCommand {
    /// Start (or keep) the connect/retry cycle.
    Connect,
    /// Leave the connect/retry cycle and close any transport.
    Disconnect,
    /// Transmit a command, buffering while not open.
    Send(ClientCommand),
    /// Subscribe to a game room.
    Join(GameId),
    /// Unsubscribe from a game room.
    Leave(GameId),
    /// Send a keepalive ping.
    Keepalive,
    /// Re-send the auth handshake with the current token.
    RefreshAuth,
    /// Terminate the actor.
    Shutdown,
}

// ============================================================================
// EventChannel
// ============================================================================

/// Handle to the realtime event channel.
///
/// Clonable; all clones drive the same single underlying connection (the
/// physical connection count never exceeds one per channel). Every
/// method returns immediately; failures are absorbed into the retry
/// cycle and surfaced as status and error events on the fan-out.
#[derive(Clone)]
pub struct EventChannel {
    /// Channel to the actor task.
    command_tx: mpsc::UnboundedSender<ChannelCommand>,
}

impl EventChannel {
    /// Spawns the channel actor.
    ///
    /// The channel starts idle; call [`connect`](EventChannel::connect)
    /// to begin the connect/retry cycle. Status and events are published
    /// on `fanout`.
    #[must_use]
    pub fn spawn(
        config: SessionConfig,
        tokens: Arc<dyn TokenSource>,
        fanout: Arc<Fanout>,
    ) -> Self {
        let (command_tx, command_rx) = mpsc::unbounded_channel();

        let actor = ChannelActor {
            backoff: ReconnectBackoff::from_config(&config),
            config,
            tokens,
            fanout,
            command_rx,
            registry: SubscriptionRegistry::new(),
            queue: OutboundQueue::new(),
            running: false,
        };
        tokio::spawn(actor.run());

        Self { command_tx }
    }

    /// Starts connecting and keeps reconnecting until
    /// [`disconnect`](EventChannel::disconnect).
    ///
    /// Idempotent: a channel that is already running ignores the call,
    /// so repeated `connect()` never produces a second connection
    /// attempt. Never blocks; the outcome is observed via the fan-out.
    pub fn connect(&self) {
        self.command(ChannelCommand::Connect);
    }

    /// Stops the retry cycle and closes any open transport.
    ///
    /// Idempotent and safe to call before ever connecting. Subscriptions
    /// and queued commands are retained for a later `connect()`.
    pub fn disconnect(&self) {
        self.command(ChannelCommand::Disconnect);
    }

    /// Sends a command, buffering it if the channel is not open.
    ///
    /// Buffered commands are transmitted in enqueue order on the next
    /// successful connection; none are dropped while disconnected.
    pub fn send(&self, command: ClientCommand) {
        self.command(ChannelCommand::Send(command));
    }

    /// Joins a game room.
    ///
    /// The room enters the subscription registry and a `join_game`
    /// command goes out immediately when the channel is open. While not
    /// open, the registry alone carries the intent: the room is part of
    /// the subscription replay on the next successful connection.
    pub fn join(&self, game_id: impl Into<GameId>) {
        self.command(ChannelCommand::Join(game_id.into()));
    }

    /// Leaves a game room.
    ///
    /// Removes the room from the registry and sends `leave_game` when
    /// the channel is open. While not open, removal from the registry is
    /// enough; the server keeps no subscription state for a dead
    /// connection.
    pub fn leave(&self, game_id: impl Into<GameId>) {
        self.command(ChannelCommand::Leave(game_id.into()));
    }

    /// Sends a keepalive ping.
    ///
    /// Call periodically to keep intermediary infrastructure from
    /// closing an idle connection. No effect on subscription or queue
    /// state; ignored while the channel is not open.
    pub fn keepalive(&self) {
        self.command(ChannelCommand::Keepalive);
    }

    /// Re-sends the auth handshake with a freshly-read token.
    ///
    /// Useful after a login while the connection is already open; a
    /// closed channel ignores this, since the next connect authenticates
    /// anyway.
    pub fn refresh_auth(&self) {
        self.command(ChannelCommand::RefreshAuth);
    }

    /// Terminates the actor task.
    ///
    /// The owning session context calls this on teardown; the registry
    /// and queue are discarded with the actor.
    pub fn shutdown(&self) {
        self.command(ChannelCommand::Shutdown);
    }

    /// Sends a command to the actor; a stopped actor ignores it.
    #[inline]
    fn command(&self, command: ChannelCommand) {
        let _ = self.command_tx.send(command);
    }
}

// ============================================================================
// Actor Phases
// ============================================================================

/// Control-flow outcome of each actor phase.
enum Phase {
    /// Wait for commands, not connecting.
    Idle,
    /// Attempt a connection now.
    Connect,
    /// Sleep out the backoff delay, then reconnect.
    Retry,
    /// Terminate the actor.
    Stopped,
}

/// Control-flow outcome of a command handled while open.
enum OnlineFlow {
    /// Keep the connection.
    Continue,
    /// The transport died mid-send.
    Dropped,
    /// `disconnect()` was called.
    Disconnect,
    /// `shutdown()` was called.
    Stop,
}

// ============================================================================
// ChannelActor
// ============================================================================

/// Background task owning the connection and all mutable channel state.
///
/// Single-writer: registry, queue, backoff and the socket are touched
/// only here, driven by handle commands and transport events.
struct ChannelActor {
    config: SessionConfig,
    tokens: Arc<dyn TokenSource>,
    fanout: Arc<Fanout>,
    command_rx: mpsc::UnboundedReceiver<ChannelCommand>,
    registry: SubscriptionRegistry,
    queue: OutboundQueue,
    backoff: ReconnectBackoff,
    /// Whether the channel is meant to be connected.
    running: bool,
}

impl ChannelActor {
    /// Runs the actor until shutdown.
    async fn run(mut self) {
        let mut phase = Phase::Idle;
        loop {
            phase = match phase {
                Phase::Idle => self.idle().await,
                Phase::Connect => self.establish().await,
                Phase::Retry => self.wait_retry().await,
                Phase::Stopped => break,
            };
        }
        debug!("channel actor terminated");
    }

    // ========================================================================
    // Idle Phase
    // ========================================================================

    /// Waits for commands while not meant to be connected.
    async fn idle(&mut self) -> Phase {
        loop {
            match self.command_rx.recv().await {
                Some(command) => {
                    if let Some(phase) = self.handle_offline_command(command) {
                        return phase;
                    }
                    if self.running {
                        return Phase::Connect;
                    }
                }
                None => return Phase::Stopped,
            }
        }
    }

    /// Handles a command while no transport exists.
    ///
    /// Join/leave/send mutate the registry and queue only; transmission
    /// happens on the next open. Returns the next phase when the command
    /// ends the current one.
    fn handle_offline_command(&mut self, command: ChannelCommand) -> Option<Phase> {
        match command {
            ChannelCommand::Connect => {
                self.running = true;
            }
            ChannelCommand::Disconnect => {
                self.running = false;
            }
            ChannelCommand::Shutdown => return Some(Phase::Stopped),
            // While no connection exists the registry alone carries the
            // subscription intent: the next handshake replays it, and the
            // server holds no subscription state for a dead connection
            // that a leave_game could correct.
            ChannelCommand::Join(game_id) => {
                self.registry.add(game_id);
            }
            ChannelCommand::Leave(game_id) => {
                self.registry.remove(&game_id);
            }
            ChannelCommand::Send(command) => self.queue.enqueue(command),
            ChannelCommand::Keepalive => {
                // A heartbeat for a dead connection serves nothing.
                trace!("keepalive ignored while offline");
            }
            ChannelCommand::RefreshAuth => {
                // The next open authenticates with a fresh token anyway.
                trace!("refresh_auth ignored while offline");
            }
        }
        None
    }

    // ========================================================================
    // Connect Phase
    // ========================================================================

    /// Attempts one connection, staying responsive to commands.
    async fn establish(&mut self) -> Phase {
        self.fanout.set_status(ConnectionStatus::Connecting);

        let endpoint = match self.config.endpoint() {
            Ok(endpoint) => endpoint,
            Err(e) => {
                warn!(error = %e, "endpoint resolution failed");
                self.fanout.publish(ChannelEvent::Error(e.to_string()));
                return self.offline();
            }
        };

        let mut connect = pin!(connect_async(endpoint.to_string()));
        loop {
            tokio::select! {
                result = &mut connect => {
                    return match result {
                        Ok((stream, _response)) => {
                            debug!(endpoint = %endpoint, "connection established");
                            self.connected(stream).await
                        }
                        Err(e) => {
                            debug!(endpoint = %endpoint, error = %e, "connection attempt failed");
                            self.offline()
                        }
                    };
                }
                command = self.command_rx.recv() => {
                    match command {
                        Some(command) => {
                            if let Some(phase) = self.handle_offline_command(command) {
                                return phase;
                            }
                            if !self.running {
                                // disconnect() abandons the in-flight attempt.
                                self.fanout.set_status(ConnectionStatus::Disconnected);
                                return Phase::Idle;
                            }
                        }
                        None => return Phase::Stopped,
                    }
                }
            }
        }
    }

    // ========================================================================
    // Open Phase
    // ========================================================================

    /// Drives an open connection until it drops or is told to stop.
    async fn connected(&mut self, mut stream: WsStream) -> Phase {
        self.fanout.set_status(ConnectionStatus::Open);
        self.fanout.publish(ChannelEvent::Connected);
        self.backoff.reset();

        if let Err(e) = self.handshake(&mut stream).await {
            warn!(error = %e, "handshake failed");
            return self.dropped(stream);
        }

        loop {
            tokio::select! {
                message = stream.next() => {
                    match message {
                        Some(Ok(Message::Text(text))) => self.handle_frame(text.as_str()),
                        Some(Ok(Message::Close(_))) => {
                            debug!("connection closed by server");
                            return self.dropped(stream);
                        }
                        Some(Err(e)) => {
                            debug!(error = %e, "connection error");
                            return self.dropped(stream);
                        }
                        None => {
                            debug!("connection stream ended");
                            return self.dropped(stream);
                        }
                        // Binary, Ping, Pong are handled by the transport.
                        _ => {}
                    }
                }
                command = self.command_rx.recv() => {
                    let Some(command) = command else {
                        let _ = stream.close(None).await;
                        return Phase::Stopped;
                    };
                    match self.handle_online_command(command, &mut stream).await {
                        OnlineFlow::Continue => {}
                        OnlineFlow::Dropped => return self.dropped(stream),
                        OnlineFlow::Disconnect => {
                            let _ = stream.close(None).await;
                            return self.offline();
                        }
                        OnlineFlow::Stop => {
                            let _ = stream.close(None).await;
                            return Phase::Stopped;
                        }
                    }
                }
            }
        }
    }

    /// Performs the on-open sequence: auth, subscription replay, queue
    /// flush, strictly in that order.
    async fn handshake(&mut self, stream: &mut WsStream) -> Result<()> {
        // Token read fresh on every open, so a login that happened while
        // disconnected is honored here.
        if let Some(token) = self.tokens.token() {
            self.transmit(stream, &ClientCommand::auth(token)).await?;
        } else {
            debug!("no session token; auth handshake skipped");
        }

        let topics: Vec<GameId> = self.registry.iter().cloned().collect();
        for game_id in &topics {
            self.transmit(stream, &ClientCommand::join(game_id.clone()))
                .await?;
        }
        if !topics.is_empty() {
            debug!(count = topics.len(), "subscriptions replayed");
        }

        self.flush(stream).await
    }

    /// Handles a command while the connection is open.
    async fn handle_online_command(
        &mut self,
        command: ChannelCommand,
        stream: &mut WsStream,
    ) -> OnlineFlow {
        match command {
            // Already connected; connect() stays idempotent.
            ChannelCommand::Connect => OnlineFlow::Continue,
            ChannelCommand::Disconnect => {
                self.running = false;
                OnlineFlow::Disconnect
            }
            ChannelCommand::Shutdown => OnlineFlow::Stop,
            ChannelCommand::Join(game_id) => {
                self.registry.add(game_id.clone());
                self.dispatch(stream, ClientCommand::join(game_id)).await
            }
            ChannelCommand::Leave(game_id) => {
                self.registry.remove(&game_id);
                self.dispatch(stream, ClientCommand::leave(game_id)).await
            }
            ChannelCommand::Send(command) => self.dispatch(stream, command).await,
            // Sent directly rather than queued: a heartbeat must never
            // alter queue state, and a failed one is not worth retrying.
            ChannelCommand::Keepalive => {
                match self.transmit(stream, &ClientCommand::ping()).await {
                    Ok(()) => OnlineFlow::Continue,
                    Err(e) => {
                        warn!(error = %e, "keepalive send failed");
                        OnlineFlow::Dropped
                    }
                }
            }
            ChannelCommand::RefreshAuth => match self.tokens.token() {
                Some(token) => match self.transmit(stream, &ClientCommand::auth(token)).await {
                    Ok(()) => OnlineFlow::Continue,
                    Err(e) => {
                        warn!(error = %e, "re-auth send failed");
                        OnlineFlow::Dropped
                    }
                },
                None => OnlineFlow::Continue,
            },
        }
    }

    /// Queues a command and flushes.
    ///
    /// Routing every send through the queue keeps enqueue order intact
    /// even when an earlier command is still buffered from a send
    /// failure.
    async fn dispatch(&mut self, stream: &mut WsStream, command: ClientCommand) -> OnlineFlow {
        self.queue.enqueue(command);
        match self.flush(stream).await {
            Ok(()) => OnlineFlow::Continue,
            Err(e) => {
                warn!(error = %e, "send failed; connection presumed dead");
                OnlineFlow::Dropped
            }
        }
    }

    /// Drains the outbound queue head-first while sends succeed.
    ///
    /// A command is only popped after its send succeeds; on failure it
    /// stays at the head for the next connection (at-least-once).
    async fn flush(&mut self, stream: &mut WsStream) -> Result<()> {
        while let Some(command) = self.queue.front() {
            let command = command.clone();
            self.transmit(stream, &command).await?;
            let _ = self.queue.pop();
        }
        Ok(())
    }

    /// Serializes and sends one command frame.
    async fn transmit(&mut self, stream: &mut WsStream, command: &ClientCommand) -> Result<()> {
        let json = serde_json::to_string(command)?;
        stream.send(Message::Text(json.into())).await?;
        trace!(kind = command.kind(), "command transmitted");
        Ok(())
    }

    /// Parses and broadcasts one inbound frame.
    ///
    /// A malformed frame is dropped and reported as a non-fatal error
    /// event; it never affects connection state.
    fn handle_frame(&self, text: &str) {
        match ServerEvent::parse(text) {
            Ok(event) => {
                trace!(kind = event.kind(), "event received");
                self.fanout.publish(ChannelEvent::Message(event));
            }
            Err(e) => {
                warn!(error = %e, "malformed frame dropped");
                self.fanout.publish(ChannelEvent::Error(e.to_string()));
            }
        }
    }

    // ========================================================================
    // Retry Phase
    // ========================================================================

    /// Sleeps out the backoff delay, staying responsive to commands.
    async fn wait_retry(&mut self) -> Phase {
        let delay = self.backoff.next_delay();
        debug!(
            attempt = self.backoff.attempt(),
            delay_ms = delay.as_millis() as u64,
            "reconnect scheduled"
        );

        let mut sleep = pin!(tokio::time::sleep(delay));
        loop {
            tokio::select! {
                () = &mut sleep => return Phase::Connect,
                command = self.command_rx.recv() => {
                    match command {
                        Some(command) => {
                            if let Some(phase) = self.handle_offline_command(command) {
                                return phase;
                            }
                            if !self.running {
                                // disconnect() cancels the retry timer.
                                return Phase::Idle;
                            }
                        }
                        None => return Phase::Stopped,
                    }
                }
            }
        }
    }

    // ========================================================================
    // Transitions
    // ========================================================================

    /// Records the loss of a connection and picks the next phase.
    fn offline(&mut self) -> Phase {
        self.fanout.set_status(ConnectionStatus::Disconnected);
        self.fanout.publish(ChannelEvent::Disconnected);
        if self.running { Phase::Retry } else { Phase::Idle }
    }

    /// Drops a dead stream and goes offline.
    fn dropped(&mut self, stream: WsStream) -> Phase {
        drop(stream);
        self.offline()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use parking_lot::Mutex;
    use serde_json::Value;
    use tokio::net::TcpListener;
    use tokio::time::timeout;
    use tokio_tungstenite::accept_async;

    const TEST_TIMEOUT: Duration = Duration::from_secs(5);

    /// Enables log output for a test run (`RUST_LOG=trace cargo test`).
    fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    }

    /// Binds a mock server and returns a config pointing at it with
    /// fast backoff.
    async fn bind_server() -> (TcpListener, SessionConfig) {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let port = listener.local_addr().expect("local addr").port();
        let config = SessionConfig::new(format!("http://127.0.0.1:{port}")).with_backoff(
            Duration::from_millis(10),
            1.6,
            Duration::from_millis(50),
        );
        (listener, config)
    }

    /// Accepts one client connection and upgrades it.
    async fn accept_client(listener: &TcpListener) -> WebSocketStream<TcpStream> {
        let (stream, _) = timeout(TEST_TIMEOUT, listener.accept())
            .await
            .expect("accept timed out")
            .expect("accept failed");
        accept_async(stream).await.expect("ws upgrade")
    }

    /// Reads the next text frame as JSON.
    async fn recv_frame(server: &mut WebSocketStream<TcpStream>) -> Value {
        loop {
            let message = timeout(TEST_TIMEOUT, server.next())
                .await
                .expect("frame timed out")
                .expect("stream ended")
                .expect("ws error");
            if let Message::Text(text) = message {
                return serde_json::from_str(text.as_str()).expect("frame json");
            }
        }
    }

    /// Asserts no further frame arrives within a short window.
    async fn assert_quiet(server: &mut WebSocketStream<TcpStream>) {
        let result = timeout(Duration::from_millis(150), server.next()).await;
        assert!(result.is_err(), "unexpected frame: {result:?}");
    }

    fn static_tokens(token: &str) -> Arc<dyn TokenSource> {
        let token = token.to_string();
        Arc::new(move || Some(token.clone()))
    }

    async fn wait_for_status(fanout: &Fanout, wanted: ConnectionStatus) {
        let mut watcher = fanout.watch_status();
        timeout(TEST_TIMEOUT, watcher.wait_for(|status| *status == wanted))
            .await
            .expect("status timed out")
            .expect("status watch closed");
    }

    #[tokio::test]
    async fn test_cold_start_transmit_order() {
        init_tracing();
        let (listener, config) = bind_server().await;
        let fanout = Fanout::new();
        let channel = EventChannel::spawn(config, static_tokens("tok-1"), Arc::clone(&fanout));

        // Everything issued while disconnected.
        channel.join("game_42");
        channel.send(ClientCommand::ping());
        channel.connect();

        let mut server = accept_client(&listener).await;
        let auth = recv_frame(&mut server).await;
        assert_eq!(auth["type"], "auth");
        assert_eq!(auth["token"], "tok-1");

        // Replayed subscription comes before the queued commands.
        let join = recv_frame(&mut server).await;
        assert_eq!(join["type"], "join_game");
        assert_eq!(join["gameId"], "game_42");

        // Queue flush after replay.
        let ping = recv_frame(&mut server).await;
        assert_eq!(ping["type"], "ping");

        // Exactly three frames: auth, join_game, ping.
        assert_quiet(&mut server).await;

        channel.shutdown();
    }

    #[tokio::test]
    async fn test_connect_is_idempotent() {
        let (listener, config) = bind_server().await;
        let fanout = Fanout::new();
        let channel = EventChannel::spawn(config, static_tokens("tok-1"), Arc::clone(&fanout));

        channel.connect();
        channel.connect();

        let _server = accept_client(&listener).await;
        wait_for_status(&fanout, ConnectionStatus::Open).await;

        // No second connection attempt shows up.
        let second = timeout(Duration::from_millis(200), listener.accept()).await;
        assert!(second.is_err(), "second connection attempted");

        channel.shutdown();
    }

    #[tokio::test]
    async fn test_reconnect_replays_subscriptions() {
        init_tracing();
        let (listener, config) = bind_server().await;
        let fanout = Fanout::new();
        let channel = EventChannel::spawn(config, static_tokens("tok-1"), Arc::clone(&fanout));

        channel.connect();
        let mut server = accept_client(&listener).await;
        assert_eq!(recv_frame(&mut server).await["type"], "auth");

        channel.join("game_7");
        let join = recv_frame(&mut server).await;
        assert_eq!(join["type"], "join_game");
        assert_eq!(join["gameId"], "game_7");

        // Server drops the connection; the channel reconnects after
        // backoff and immediately re-auths and re-subscribes.
        drop(server);

        let mut server = accept_client(&listener).await;
        let auth = recv_frame(&mut server).await;
        assert_eq!(auth["type"], "auth");
        let rejoin = recv_frame(&mut server).await;
        assert_eq!(rejoin["type"], "join_game");
        assert_eq!(rejoin["gameId"], "game_7");

        // Nothing else: no leave_game for a topic never left.
        assert_quiet(&mut server).await;

        channel.shutdown();
    }

    #[tokio::test]
    async fn test_left_topic_not_replayed() {
        let (listener, config) = bind_server().await;
        let fanout = Fanout::new();
        let channel = EventChannel::spawn(config, static_tokens("tok-1"), Arc::clone(&fanout));

        channel.connect();
        let mut server = accept_client(&listener).await;

        channel.join("game_1");
        channel.join("game_2");
        channel.leave("game_2");

        // auth + join + join + leave on the first connection.
        for _ in 0..4 {
            let _ = recv_frame(&mut server).await;
        }

        drop(server);
        let mut server = accept_client(&listener).await;

        let auth = recv_frame(&mut server).await;
        assert_eq!(auth["type"], "auth");
        let rejoin = recv_frame(&mut server).await;
        assert_eq!(rejoin["type"], "join_game");
        assert_eq!(rejoin["gameId"], "game_1");

        // game_2 was left: neither replayed nor un-subscribed again.
        assert_quiet(&mut server).await;

        channel.shutdown();
    }

    #[tokio::test]
    async fn test_queued_commands_flush_in_order() {
        let (listener, config) = bind_server().await;
        let port = listener.local_addr().expect("local addr").port();
        // Free the port so every connection attempt is refused.
        drop(listener);

        let fanout = Fanout::new();
        let channel = EventChannel::spawn(config, static_tokens("tok-1"), Arc::clone(&fanout));
        channel.connect();

        // Let a few attempts fail, then queue commands while down.
        tokio::time::sleep(Duration::from_millis(50)).await;
        channel.send(ClientCommand::join("g1"));
        channel.send(ClientCommand::join("g2"));
        channel.send(ClientCommand::join("g3"));

        // Server comes back on the same port.
        let listener = TcpListener::bind(("127.0.0.1", port)).await.expect("rebind");
        let mut server = accept_client(&listener).await;

        assert_eq!(recv_frame(&mut server).await["type"], "auth");
        for expected in ["g1", "g2", "g3"] {
            let frame = recv_frame(&mut server).await;
            assert_eq!(frame["type"], "join_game");
            assert_eq!(frame["gameId"], expected);
        }

        channel.shutdown();
    }

    #[tokio::test]
    async fn test_disconnect_cancels_retry() {
        let (listener, config) = bind_server().await;
        let port = listener.local_addr().expect("local addr").port();
        drop(listener);

        let fanout = Fanout::new();
        let channel = EventChannel::spawn(config, static_tokens("tok-1"), Arc::clone(&fanout));
        channel.connect();
        tokio::time::sleep(Duration::from_millis(30)).await;

        channel.disconnect();
        // Safe to repeat.
        channel.disconnect();

        // Even with the server back, a disconnected channel stays away.
        let listener = TcpListener::bind(("127.0.0.1", port)).await.expect("rebind");
        let attempt = timeout(Duration::from_millis(200), listener.accept()).await;
        assert!(attempt.is_err(), "retry survived disconnect()");
        assert_eq!(fanout.status(), ConnectionStatus::Disconnected);

        // connect() re-enters the cycle.
        channel.connect();
        let _server = accept_client(&listener).await;
        wait_for_status(&fanout, ConnectionStatus::Open).await;

        channel.shutdown();
    }

    #[tokio::test]
    async fn test_malformed_frame_reports_error_keeps_open() {
        let (listener, config) = bind_server().await;
        let fanout = Fanout::new();
        let mut observer = fanout.subscribe();
        let channel = EventChannel::spawn(config, static_tokens("tok-1"), Arc::clone(&fanout));

        channel.connect();
        let mut server = accept_client(&listener).await;
        assert_eq!(recv_frame(&mut server).await["type"], "auth");

        assert_eq!(
            timeout(TEST_TIMEOUT, observer.recv()).await.expect("event"),
            Some(ChannelEvent::Connected)
        );

        server
            .send(Message::Text("{ not valid json".into()))
            .await
            .expect("send garbage");

        let event = timeout(TEST_TIMEOUT, observer.recv())
            .await
            .expect("event")
            .expect("stream open");
        assert!(matches!(event, ChannelEvent::Error(_)), "got {event:?}");

        // The connection survived: a valid frame still comes through.
        server
            .send(Message::Text(
                serde_json::json!({
                    "type": "chat",
                    "gameId": "game_7",
                    "message": {
                        "id": "m1",
                        "senderUserId": "user_b",
                        "messageText": "still here",
                        "createdAt": "2024-01-01T00:00:00Z"
                    }
                })
                .to_string()
                .into(),
            ))
            .await
            .expect("send chat");

        let event = timeout(TEST_TIMEOUT, observer.recv())
            .await
            .expect("event")
            .expect("stream open");
        match event {
            ChannelEvent::Message(server_event) => assert_eq!(server_event.kind(), "chat"),
            other => panic!("unexpected event: {other:?}"),
        }
        assert_eq!(fanout.status(), ConnectionStatus::Open);

        channel.shutdown();
    }

    #[tokio::test]
    async fn test_refresh_auth_reads_fresh_token() {
        let (listener, config) = bind_server().await;
        let store = Arc::new(Mutex::new(Some("tok-1".to_string())));
        let source = {
            let store = Arc::clone(&store);
            Arc::new(move || store.lock().clone()) as Arc<dyn TokenSource>
        };

        let fanout = Fanout::new();
        let channel = EventChannel::spawn(config, source, Arc::clone(&fanout));
        channel.connect();

        let mut server = accept_client(&listener).await;
        let auth = recv_frame(&mut server).await;
        assert_eq!(auth["token"], "tok-1");

        // Login happened; re-auth picks up the new token immediately.
        *store.lock() = Some("tok-2".to_string());
        channel.refresh_auth();

        let reauth = recv_frame(&mut server).await;
        assert_eq!(reauth["type"], "auth");
        assert_eq!(reauth["token"], "tok-2");

        channel.shutdown();
    }

    #[tokio::test]
    async fn test_no_auth_frame_without_token() {
        let (listener, config) = bind_server().await;
        let fanout = Fanout::new();
        let channel =
            EventChannel::spawn(config, Arc::new(|| None::<String>), Arc::clone(&fanout));

        channel.send(ClientCommand::ping());
        channel.connect();

        let mut server = accept_client(&listener).await;
        // First frame is the buffered ping: no auth was sent.
        let frame = recv_frame(&mut server).await;
        assert_eq!(frame["type"], "ping");

        channel.shutdown();
    }

    #[tokio::test]
    async fn test_send_while_open_transmits_immediately() {
        let (listener, config) = bind_server().await;
        let fanout = Fanout::new();
        let channel = EventChannel::spawn(config, static_tokens("tok-1"), Arc::clone(&fanout));

        channel.connect();
        let mut server = accept_client(&listener).await;
        assert_eq!(recv_frame(&mut server).await["type"], "auth");

        channel.keepalive();
        assert_eq!(recv_frame(&mut server).await["type"], "ping");

        channel.shutdown();
    }
}
