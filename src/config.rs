//! Session configuration.
//!
//! Provides a type-safe interface for configuring the realtime session:
//! where to connect, how aggressively to reconnect, and how often to send
//! keepalives or poll the REST backend.
//!
//! # Example
//!
//! ```ignore
//! use chess_realtime::SessionConfig;
//!
//! let config = SessionConfig::new("https://chess.example.com")
//!     .with_keepalive_interval(Duration::from_secs(25));
//!
//! let endpoint = config.endpoint()?;
//! // "wss://chess.example.com/ws"
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use url::Url;

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Default first reconnect delay.
const DEFAULT_BACKOFF_BASE: Duration = Duration::from_millis(400);

/// Default multiplier applied per failed attempt.
const DEFAULT_BACKOFF_GROWTH: f64 = 1.6;

/// Default upper bound on the reconnect delay.
const DEFAULT_BACKOFF_CAP: Duration = Duration::from_millis(6000);

/// Default interval between keepalive pings.
///
/// Short enough that idle-connection middleboxes never see a silent
/// connection, long enough to stay negligible on the wire.
const DEFAULT_KEEPALIVE_INTERVAL: Duration = Duration::from_secs(25);

/// Default interval between REST polls in polling mode.
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1200);

/// Path segment appended to the derived WebSocket endpoint.
const WS_PATH: &str = "/ws";

// ============================================================================
// TokenSource
// ============================================================================

/// Synchronous accessor for the current session token.
///
/// The channel reads the token fresh at every connect and on every
/// explicit re-auth, so a login that happens while disconnected is
/// honored on the next attempt. The channel never stores or mutates the
/// token.
///
/// Any `Fn() -> Option<String>` closure is a `TokenSource`:
///
/// ```ignore
/// let source = move || store.lock().token.clone();
/// ```
pub trait TokenSource: Send + Sync {
    /// Returns the current session token, or `None` when unauthenticated.
    fn token(&self) -> Option<String>;
}

impl<F> TokenSource for F
where
    F: Fn() -> Option<String> + Send + Sync,
{
    #[inline]
    fn token(&self) -> Option<String> {
        self()
    }
}

// ============================================================================
// SessionConfig
// ============================================================================

/// Realtime session configuration.
///
/// Controls endpoint selection, reconnect backoff, keepalive cadence and
/// the polling interval for the REST fallback mode. The backoff constants
/// are tunable; they bound reconnection storms without being load-bearing
/// for correctness.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    /// HTTP API base URL, e.g. `http://localhost:3001`.
    pub api_base_url: String,

    /// Explicit WebSocket endpoint override.
    ///
    /// When set, used verbatim instead of deriving from `api_base_url`.
    pub endpoint_override: Option<String>,

    /// First reconnect delay.
    pub backoff_base: Duration,

    /// Multiplier applied to the delay per failed attempt.
    pub backoff_growth: f64,

    /// Upper bound on the reconnect delay.
    pub backoff_cap: Duration,

    /// Interval between keepalive pings.
    pub keepalive_interval: Duration,

    /// Interval between snapshot polls in polling mode.
    pub poll_interval: Duration,
}

// ============================================================================
// Constructors
// ============================================================================

impl SessionConfig {
    /// Creates a configuration for the given HTTP API base URL with
    /// default timings.
    #[inline]
    #[must_use]
    pub fn new(api_base_url: impl Into<String>) -> Self {
        Self {
            api_base_url: api_base_url.into(),
            endpoint_override: None,
            backoff_base: DEFAULT_BACKOFF_BASE,
            backoff_growth: DEFAULT_BACKOFF_GROWTH,
            backoff_cap: DEFAULT_BACKOFF_CAP,
            keepalive_interval: DEFAULT_KEEPALIVE_INTERVAL,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

// ============================================================================
// Builder Methods
// ============================================================================

impl SessionConfig {
    /// Sets an explicit WebSocket endpoint, bypassing derivation.
    #[inline]
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint_override = Some(endpoint.into());
        self
    }

    /// Sets the reconnect backoff parameters.
    #[inline]
    #[must_use]
    pub fn with_backoff(mut self, base: Duration, growth: f64, cap: Duration) -> Self {
        self.backoff_base = base;
        self.backoff_growth = growth;
        self.backoff_cap = cap;
        self
    }

    /// Sets the keepalive ping interval.
    #[inline]
    #[must_use]
    pub fn with_keepalive_interval(mut self, interval: Duration) -> Self {
        self.keepalive_interval = interval;
        self
    }

    /// Sets the snapshot poll interval for polling mode.
    #[inline]
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

// ============================================================================
// Endpoint Derivation
// ============================================================================

impl SessionConfig {
    /// Resolves the WebSocket endpoint for this session.
    ///
    /// Uses the explicit override when configured; otherwise derives from
    /// the API base URL by swapping the scheme (`http→ws`, `https→wss`)
    /// and appending the `/ws` path.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the override or base URL cannot be
    /// parsed, or if the base URL scheme is not `http`/`https`.
    pub fn endpoint(&self) -> Result<Url> {
        if let Some(explicit) = &self.endpoint_override {
            return Url::parse(explicit)
                .map_err(|e| Error::config(format!("invalid endpoint override: {e}")));
        }

        let base = Url::parse(&self.api_base_url)
            .map_err(|e| Error::config(format!("invalid API base URL: {e}")))?;

        let scheme = match base.scheme() {
            "https" => "wss",
            "http" => "ws",
            other => {
                return Err(Error::config(format!(
                    "cannot derive WebSocket endpoint from scheme '{other}'"
                )));
            }
        };

        let host = base
            .host_str()
            .ok_or_else(|| Error::config("API base URL has no host"))?;

        let endpoint = match base.port() {
            Some(port) => format!("{scheme}://{host}:{port}{WS_PATH}"),
            None => format!("{scheme}://{host}{WS_PATH}"),
        };

        Url::parse(&endpoint).map_err(|e| Error::config(format!("derived endpoint invalid: {e}")))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_derivation_http() {
        let config = SessionConfig::new("http://localhost:3001");
        let endpoint = config.endpoint().expect("derive endpoint");
        assert_eq!(endpoint.as_str(), "ws://localhost:3001/ws");
    }

    #[test]
    fn test_endpoint_derivation_https() {
        let config = SessionConfig::new("https://chess.example.com");
        let endpoint = config.endpoint().expect("derive endpoint");
        assert_eq!(endpoint.as_str(), "wss://chess.example.com/ws");
    }

    #[test]
    fn test_endpoint_override_wins() {
        let config =
            SessionConfig::new("http://localhost:3001").with_endpoint("wss://ws.example.com/rt");
        let endpoint = config.endpoint().expect("parse override");
        assert_eq!(endpoint.as_str(), "wss://ws.example.com/rt");
    }

    #[test]
    fn test_endpoint_rejects_unknown_scheme() {
        let config = SessionConfig::new("ftp://example.com");
        let err = config.endpoint().unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }

    #[test]
    fn test_endpoint_rejects_garbage() {
        let config = SessionConfig::new("not a url");
        assert!(config.endpoint().is_err());
    }

    #[test]
    fn test_default_timings() {
        let config = SessionConfig::new("http://localhost:3001");
        assert_eq!(config.backoff_base, Duration::from_millis(400));
        assert_eq!(config.backoff_cap, Duration::from_millis(6000));
        assert_eq!(config.keepalive_interval, Duration::from_secs(25));
        assert_eq!(config.poll_interval, Duration::from_millis(1200));
    }

    #[test]
    fn test_builder_methods() {
        let config = SessionConfig::new("http://localhost:3001")
            .with_backoff(Duration::from_millis(10), 2.0, Duration::from_millis(100))
            .with_keepalive_interval(Duration::from_secs(5))
            .with_poll_interval(Duration::from_millis(50));

        assert_eq!(config.backoff_base, Duration::from_millis(10));
        assert_eq!(config.backoff_growth, 2.0);
        assert_eq!(config.backoff_cap, Duration::from_millis(100));
        assert_eq!(config.keepalive_interval, Duration::from_secs(5));
        assert_eq!(config.poll_interval, Duration::from_millis(50));
    }

    #[test]
    fn test_token_source_closure() {
        let source = || Some("jwt-token".to_string());
        assert_eq!(TokenSource::token(&source), Some("jwt-token".to_string()));

        let empty = || None::<String>;
        assert_eq!(TokenSource::token(&empty), None);
    }
}
