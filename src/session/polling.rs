//! Polling delivery mode.
//!
//! REST-only deployments disable the event channel and detect match
//! assignment, moves, chat and game completion by polling the backend.
//! The feed turns point-in-time snapshots into the same
//! [`ChannelEvent`] stream the realtime channel publishes, so observers
//! consume one contract regardless of the active transport mode.
//!
//! Snapshot fetching itself (the REST calls) is a collaborator concern
//! behind [`SnapshotSource`]; the feed only owns the cadence and the
//! diffing.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rustc_hash::FxHashSet;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use crate::channel::{ChannelEvent, ConnectionStatus, Fanout};
use crate::error::Result;
use crate::identifiers::{GameId, UserId};
use crate::protocol::{ChatMessage, PlayerColor, ServerEvent};

// ============================================================================
// Constants
// ============================================================================

/// Game status value meaning the game is still being played.
const ACTIVE_STATUS: &str = "active";

// ============================================================================
// Snapshots
// ============================================================================

/// Point-in-time matchmaking state.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MatchmakingSnapshot {
    /// The assigned game, if matchmaking has produced one.
    pub game_id: Option<GameId>,
    /// Side assignment accompanying the game, when known.
    pub color: Option<PlayerColor>,
}

impl MatchmakingSnapshot {
    /// Snapshot with no assignment yet.
    #[inline]
    #[must_use]
    pub fn idle() -> Self {
        Self::default()
    }

    /// Snapshot with a game assigned.
    #[inline]
    #[must_use]
    pub fn assigned(game_id: impl Into<GameId>, color: Option<PlayerColor>) -> Self {
        Self {
            game_id: Some(game_id.into()),
            color,
        }
    }
}

/// Point-in-time state of one game.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameSnapshot {
    /// The game this snapshot describes.
    pub game_id: GameId,
    /// Current position.
    pub fen: String,
    /// Game status (opaque; `active` means still running).
    pub status: String,
    /// Most recent move in standard algebraic notation, if any.
    pub last_move_san: Option<String>,
    /// Winner once the game is decided; absent while running or drawn.
    pub winner_user_id: Option<UserId>,
}

// ============================================================================
// SnapshotSource
// ============================================================================

/// Collaborator interface supplying backend snapshots.
///
/// Implemented over the platform's REST client; the feed never issues
/// HTTP itself. Errors are non-fatal: the failing tick is skipped and
/// reported as a [`ChannelEvent::Error`].
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    /// Current matchmaking state for this session.
    async fn matchmaking(&self) -> Result<MatchmakingSnapshot>;

    /// Current state of a game.
    async fn game(&self, game_id: &GameId) -> Result<GameSnapshot>;

    /// All chat messages of a game, oldest first.
    async fn chat(&self, game_id: &GameId) -> Result<Vec<ChatMessage>>;
}

// ============================================================================
// PollingFeed
// ============================================================================

/// Background task diffing snapshots into channel events.
///
/// While no game is assigned it watches matchmaking; once assigned it
/// watches the game and its chat. Consecutive snapshots are diffed:
///
/// - a new assignment becomes [`ServerEvent::MatchFound`];
/// - a changed position becomes [`ServerEvent::Move`];
/// - unseen chat messages become [`ServerEvent::Chat`] (including the
///   backlog right after assignment, which doubles as history catch-up);
/// - a terminal status becomes [`ServerEvent::GameFinished`], after
///   which the feed returns to watching matchmaking.
pub struct PollingFeed {
    source: Arc<dyn SnapshotSource>,
    fanout: Arc<Fanout>,
    interval: Duration,

    /// Game currently being watched.
    game: Option<GameId>,
    /// Position seen on the previous tick, `None` right after assignment.
    last_fen: Option<String>,
    /// Chat message IDs already delivered for the current game.
    seen_messages: FxHashSet<String>,
}

impl PollingFeed {
    /// Creates a feed publishing on `fanout` every `interval`.
    #[must_use]
    pub fn new(source: Arc<dyn SnapshotSource>, fanout: Arc<Fanout>, interval: Duration) -> Self {
        Self {
            source,
            fanout,
            interval,
            game: None,
            last_fen: None,
            seen_messages: FxHashSet::default(),
        }
    }

    /// Runs the feed until the owning task is aborted.
    pub async fn run(mut self) {
        self.fanout.set_status(ConnectionStatus::Connecting);

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            match self.poll().await {
                Ok(()) => {
                    if !self.fanout.status().is_open() {
                        self.fanout.set_status(ConnectionStatus::Open);
                        self.fanout.publish(ChannelEvent::Connected);
                    }
                }
                Err(e) => {
                    warn!(error = %e, "poll failed");
                    self.fanout.publish(ChannelEvent::Error(e.to_string()));
                }
            }
        }
    }

    /// Performs one poll tick.
    async fn poll(&mut self) -> Result<()> {
        match self.game.clone() {
            None => self.poll_matchmaking().await,
            Some(game_id) => self.poll_game(game_id).await,
        }
    }

    /// Watches matchmaking until an assignment appears.
    async fn poll_matchmaking(&mut self) -> Result<()> {
        let snapshot = self.source.matchmaking().await?;
        let Some(game_id) = snapshot.game_id else {
            return Ok(());
        };

        debug!(game = %game_id, "match assignment detected");
        self.game = Some(game_id.clone());
        self.last_fen = None;
        self.seen_messages.clear();

        self.fanout.publish(ChannelEvent::Message(ServerEvent::MatchFound {
            game_id,
            color: snapshot.color,
        }));
        Ok(())
    }

    /// Diffs the assigned game's state and chat against the last tick.
    async fn poll_game(&mut self, game_id: GameId) -> Result<()> {
        let game = self.source.game(&game_id).await?;

        if self.last_fen.as_deref() != Some(game.fen.as_str()) {
            // The first snapshot after assignment is the baseline, not
            // a move.
            let baseline = self.last_fen.is_none();
            self.last_fen = Some(game.fen.clone());

            if !baseline {
                self.fanout.publish(ChannelEvent::Message(ServerEvent::Move {
                    game_id: game_id.clone(),
                    san_move: game.last_move_san.clone().unwrap_or_default(),
                    fen_after: game.fen.clone(),
                    status: game.status.clone(),
                }));
            }
        }

        let messages = self.source.chat(&game_id).await?;
        for message in messages {
            if self.seen_messages.insert(message.id.clone()) {
                self.fanout.publish(ChannelEvent::Message(ServerEvent::Chat {
                    game_id: game_id.clone(),
                    message,
                }));
            }
        }

        if game.status != ACTIVE_STATUS {
            debug!(game = %game_id, status = %game.status, "game reached terminal state");
            self.fanout
                .publish(ChannelEvent::Message(ServerEvent::GameFinished {
                    game_id,
                    winner_user_id: game.winner_user_id,
                }));
            // Back to watching matchmaking for the next game.
            self.game = None;
            self.last_fen = None;
            self.seen_messages.clear();
        }

        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::VecDeque;

    use parking_lot::Mutex;
    use tokio::time::timeout;

    use crate::error::Error;

    const TEST_TIMEOUT: Duration = Duration::from_secs(5);

    const START_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";
    const AFTER_E4_FEN: &str = "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq e3 0 1";

    /// Scripted source: each call pops the next snapshot and repeats the
    /// last one once the script runs out.
    #[derive(Default)]
    struct ScriptedSource {
        matchmaking: Mutex<VecDeque<MatchmakingSnapshot>>,
        games: Mutex<VecDeque<GameSnapshot>>,
        chats: Mutex<VecDeque<Vec<ChatMessage>>>,
    }

    fn next_scripted<T: Clone>(queue: &Mutex<VecDeque<T>>, what: &str) -> Result<T> {
        let mut queue = queue.lock();
        if queue.len() > 1 {
            Ok(queue.pop_front().expect("non-empty"))
        } else {
            queue
                .front()
                .cloned()
                .ok_or_else(|| Error::snapshot(format!("no {what} scripted")))
        }
    }

    #[async_trait]
    impl SnapshotSource for ScriptedSource {
        async fn matchmaking(&self) -> Result<MatchmakingSnapshot> {
            next_scripted(&self.matchmaking, "matchmaking snapshot")
        }

        async fn game(&self, _game_id: &GameId) -> Result<GameSnapshot> {
            next_scripted(&self.games, "game snapshot")
        }

        async fn chat(&self, _game_id: &GameId) -> Result<Vec<ChatMessage>> {
            next_scripted(&self.chats, "chat snapshot")
        }
    }

    fn game_snapshot(fen: &str, status: &str, san: Option<&str>) -> GameSnapshot {
        GameSnapshot {
            game_id: GameId::from("game_1"),
            fen: fen.to_string(),
            status: status.to_string(),
            last_move_san: san.map(str::to_string),
            winner_user_id: None,
        }
    }

    fn message(id: &str, text: &str) -> ChatMessage {
        ChatMessage {
            id: id.to_string(),
            sender_user_id: "user_b".into(),
            message_text: text.to_string(),
            created_at: "2024-01-01T00:00:00Z".to_string(),
        }
    }

    async fn collect_until_finished(mut observer: crate::channel::EventObserver) -> Vec<ServerEvent> {
        let mut events = Vec::new();
        loop {
            let event = timeout(TEST_TIMEOUT, observer.recv())
                .await
                .expect("event timed out")
                .expect("stream closed");
            if let ChannelEvent::Message(server_event) = event {
                let done = matches!(server_event, ServerEvent::GameFinished { .. });
                events.push(server_event);
                if done {
                    return events;
                }
            }
        }
    }

    #[tokio::test]
    async fn test_feed_diffs_snapshots_into_events() {
        let source = Arc::new(ScriptedSource::default());
        source
            .matchmaking
            .lock()
            .extend([
                MatchmakingSnapshot::idle(),
                MatchmakingSnapshot::assigned("game_1", Some(PlayerColor::White)),
            ]);
        source.games.lock().extend([
            game_snapshot(START_FEN, "active", None),
            game_snapshot(AFTER_E4_FEN, "active", Some("e4")),
            GameSnapshot {
                winner_user_id: Some("user_a".into()),
                ..game_snapshot(AFTER_E4_FEN, "finished", Some("e4"))
            },
        ]);
        source
            .chats
            .lock()
            .extend([vec![], vec![message("m1", "good luck")]]);

        let fanout = Fanout::new();
        let feed = PollingFeed::new(
            source,
            Arc::clone(&fanout),
            Duration::from_millis(10),
        );

        // Register the observer before events start flowing.
        let observer = fanout.subscribe();
        let collector = tokio::spawn(collect_until_finished(observer));
        let feed_task = tokio::spawn(feed.run());

        let events = timeout(TEST_TIMEOUT, collector)
            .await
            .expect("collector timed out")
            .expect("collector panicked");
        feed_task.abort();

        assert_eq!(
            events,
            vec![
                ServerEvent::MatchFound {
                    game_id: GameId::from("game_1"),
                    color: Some(PlayerColor::White),
                },
                ServerEvent::Move {
                    game_id: GameId::from("game_1"),
                    san_move: "e4".to_string(),
                    fen_after: AFTER_E4_FEN.to_string(),
                    status: "active".to_string(),
                },
                ServerEvent::Chat {
                    game_id: GameId::from("game_1"),
                    message: message("m1", "good luck"),
                },
                ServerEvent::GameFinished {
                    game_id: GameId::from("game_1"),
                    winner_user_id: Some("user_a".into()),
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_feed_reports_poll_errors_and_keeps_going() {
        // Empty script: every tick fails.
        let source = Arc::new(ScriptedSource::default());
        let fanout = Fanout::new();
        let mut observer = fanout.subscribe();

        let feed = PollingFeed::new(
            source,
            Arc::clone(&fanout),
            Duration::from_millis(10),
        );
        let feed_task = tokio::spawn(feed.run());

        // Two consecutive error events: the feed survived the first.
        for _ in 0..2 {
            let event = timeout(TEST_TIMEOUT, observer.recv())
                .await
                .expect("event timed out")
                .expect("stream closed");
            assert!(matches!(event, ChannelEvent::Error(_)), "got {event:?}");
        }
        assert_eq!(fanout.status(), ConnectionStatus::Connecting);

        feed_task.abort();
    }

    #[tokio::test]
    async fn test_feed_marks_open_after_first_successful_poll() {
        let source = Arc::new(ScriptedSource::default());
        source.matchmaking.lock().push_back(MatchmakingSnapshot::idle());

        let fanout = Fanout::new();
        let feed = PollingFeed::new(
            source,
            Arc::clone(&fanout),
            Duration::from_millis(10),
        );
        let feed_task = tokio::spawn(feed.run());

        let mut watcher = fanout.watch_status();
        timeout(TEST_TIMEOUT, watcher.wait_for(|s| s.is_open()))
            .await
            .expect("status timed out")
            .expect("watch closed");

        feed_task.abort();
    }

    #[test]
    fn test_snapshot_constructors() {
        assert_eq!(MatchmakingSnapshot::idle().game_id, None);

        let assigned = MatchmakingSnapshot::assigned("game_1", None);
        assert_eq!(assigned.game_id, Some(GameId::from("game_1")));
        assert_eq!(assigned.color, None);
    }
}
