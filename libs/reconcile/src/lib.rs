//! Reconciliation primitives for the live channel.
//!
//! The client never merges remote changes. It learns that the server changed
//! and reloads everything. This library holds the pure decision logic for
//! that loop:
//!
//! - **Watermark**: the newest server timestamp seen so far.
//! - **Connection machine**: when to connect, close and schedule a reconnect.
//! - **Reload guard**: collapses overlapping reload requests.
//!
//! # Invariants
//!
//! - At most one reconnect timer is pending at any time
//! - No reconnect is scheduled while hidden or torn down
//! - The watermark never moves backwards

use std::time::Duration;

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use thiserror::Error;

/// Reconciliation errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ReconcileError {
    /// A server timestamp could not be parsed.
    #[error("invalid server timestamp: {0}")]
    InvalidTimestamp(String),
}

// =============================================================================
// Watermark
// =============================================================================

/// A server-side last-updated instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ServerTimestamp(DateTime<Utc>);

impl ServerTimestamp {
    /// Parses RFC 3339, or a zone-less local date-time taken as UTC.
    pub fn parse(raw: &str) -> Result<Self, ReconcileError> {
        let raw = raw.trim().trim_matches('"');
        if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
            return Ok(Self(ts.with_timezone(&Utc)));
        }
        NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
            .map(|naive| Self(Utc.from_utc_datetime(&naive)))
            .map_err(|_| ReconcileError::InvalidTimestamp(raw.to_string()))
    }

    pub fn from_epoch_millis(millis: i64) -> Result<Self, ReconcileError> {
        DateTime::from_timestamp_millis(millis)
            .map(Self)
            .ok_or_else(|| ReconcileError::InvalidTimestamp(millis.to_string()))
    }

    pub fn as_datetime(&self) -> DateTime<Utc> {
        self.0
    }
}

impl std::fmt::Display for ServerTimestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}

/// Outcome of observing a timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatermarkUpdate {
    /// First observation. Nothing to compare against, so no reload.
    Initialized,
    /// Strictly newer than the last observation. Reload.
    Newer,
    /// Same or older. Nothing to do.
    NotNewer,
}

impl WatermarkUpdate {
    pub fn should_reload(self) -> bool {
        matches!(self, Self::Newer)
    }
}

/// Newest server timestamp seen so far.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateWatermark {
    last: Option<ServerTimestamp>,
}

impl UpdateWatermark {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last(&self) -> Option<ServerTimestamp> {
        self.last
    }

    /// Records `ts` and reports how it compares with the previous value.
    pub fn observe(&mut self, ts: ServerTimestamp) -> WatermarkUpdate {
        match self.last {
            None => {
                self.last = Some(ts);
                WatermarkUpdate::Initialized
            }
            Some(last) if ts > last => {
                self.last = Some(ts);
                WatermarkUpdate::Newer
            }
            Some(_) => WatermarkUpdate::NotNewer,
        }
    }
}

// =============================================================================
// Connection machine
// =============================================================================

/// Push connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    /// Disconnected with a reconnect timer pending.
    BackoffWait,
}

/// What `opened` means for the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenOutcome {
    /// First successful connection of this machine.
    First,
    /// Re-opened after an earlier connection; changes may have been missed.
    Reconnect,
}

/// What to do after a connection failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectPlan {
    /// Arm the single reconnect timer with this delay.
    Schedule(Duration),
    /// Do not reconnect: hidden, torn down, or a timer is already armed.
    Suppressed,
}

/// Decides when the push connection is opened, closed and retried.
///
/// The caller owns the actual timer and connection; this machine owns the
/// decisions and the single pending-timer slot.
#[derive(Debug, Clone)]
pub struct ConnectionMachine {
    state: ConnectionState,
    reconnect_delay: Duration,
    visible: bool,
    torn_down: bool,
    ever_connected: bool,
    timer_armed: bool,
}

impl ConnectionMachine {
    pub fn new(reconnect_delay: Duration) -> Self {
        Self {
            state: ConnectionState::Disconnected,
            reconnect_delay,
            visible: true,
            torn_down: false,
            ever_connected: false,
            timer_armed: false,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn ever_connected(&self) -> bool {
        self.ever_connected
    }

    pub fn timer_armed(&self) -> bool {
        self.timer_armed
    }

    /// Starts a connection attempt if one is allowed.
    ///
    /// Refused while hidden, torn down, or already connecting/connected.
    /// An armed timer is disarmed.
    pub fn begin_connect(&mut self) -> bool {
        if self.torn_down || !self.visible {
            return false;
        }
        match self.state {
            ConnectionState::Connecting | ConnectionState::Connected => false,
            ConnectionState::Disconnected | ConnectionState::BackoffWait => {
                self.timer_armed = false;
                self.state = ConnectionState::Connecting;
                true
            }
        }
    }

    pub fn opened(&mut self) -> OpenOutcome {
        self.state = ConnectionState::Connected;
        if std::mem::replace(&mut self.ever_connected, true) {
            OpenOutcome::Reconnect
        } else {
            OpenOutcome::First
        }
    }

    /// The connection errored or closed.
    pub fn failed(&mut self) -> ReconnectPlan {
        if self.torn_down || !self.visible || self.timer_armed {
            if !self.timer_armed {
                self.state = ConnectionState::Disconnected;
            }
            return ReconnectPlan::Suppressed;
        }
        self.state = ConnectionState::BackoffWait;
        self.timer_armed = true;
        ReconnectPlan::Schedule(self.reconnect_delay)
    }

    /// The reconnect timer fired. Returns whether to connect now.
    pub fn timer_fired(&mut self) -> bool {
        if !std::mem::replace(&mut self.timer_armed, false) {
            return false;
        }
        if self.torn_down || !self.visible {
            self.state = ConnectionState::Disconnected;
            return false;
        }
        self.begin_connect()
    }

    /// A keep-alive arrived; the connection is live.
    pub fn heartbeat(&mut self) {
        if self.state == ConnectionState::Connecting {
            self.state = ConnectionState::Connected;
        }
    }

    /// The page was hidden. Returns whether an open connection must be closed.
    pub fn hidden(&mut self) -> bool {
        self.visible = false;
        self.timer_armed = false;
        let was_open = matches!(
            self.state,
            ConnectionState::Connecting | ConnectionState::Connected
        );
        self.state = ConnectionState::Disconnected;
        was_open
    }

    /// The page became visible. Returns whether to reconnect immediately.
    pub fn shown(&mut self) -> bool {
        self.visible = true;
        !self.torn_down
            && matches!(
                self.state,
                ConnectionState::Disconnected | ConnectionState::BackoffWait
            )
    }

    /// Final shutdown; nothing reconnects afterwards.
    pub fn teardown(&mut self) {
        self.torn_down = true;
        self.timer_armed = false;
        self.state = ConnectionState::Disconnected;
    }
}

// =============================================================================
// Reload guard
// =============================================================================

/// Collapses overlapping reload requests into at most one follow-up run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReloadGuard {
    running: bool,
    queued: bool,
}

impl ReloadGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Returns true when the caller should start a reload now. Otherwise the
    /// request is folded into the running one.
    pub fn request(&mut self) -> bool {
        if self.running {
            self.queued = true;
            false
        } else {
            self.running = true;
            true
        }
    }

    /// Marks the running reload finished. Returns true when one more run is due;
    /// the guard stays held for it.
    pub fn finish(&mut self) -> bool {
        if std::mem::take(&mut self.queued) {
            true
        } else {
            self.running = false;
            false
        }
    }
}

/// Delay before reconnecting a failed push connection.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Interval of the last-updated poll when push is unavailable.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Lower bound for a configured poll interval.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Extra last-updated check after a completed save, in polling mode.
pub const POST_SAVE_CHECK_DELAY: Duration = Duration::from_secs(1);

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(raw: &str) -> ServerTimestamp {
        ServerTimestamp::parse(raw).unwrap()
    }

    #[test]
    fn test_timestamp_formats() {
        let naive = ts("2026-10-17T09:30:00.123456");
        let zoned = ts("2026-10-17T09:30:00.123456Z");
        assert_eq!(naive, zoned);
        assert_eq!(ts("\"2026-10-17T09:30:00\""), ts("2026-10-17T09:30:00+00:00"));
        assert!(ServerTimestamp::parse("yesterday").is_err());

        let millis = ServerTimestamp::from_epoch_millis(1_760_693_400_000).unwrap();
        assert_eq!(millis.as_datetime().timestamp_millis(), 1_760_693_400_000);
    }

    #[test]
    fn test_watermark_first_observation_only_initializes() {
        let mut watermark = UpdateWatermark::new();
        assert_eq!(
            watermark.observe(ts("2026-10-17T09:00:00")),
            WatermarkUpdate::Initialized
        );
        assert_eq!(
            watermark.observe(ts("2026-10-17T09:00:00")),
            WatermarkUpdate::NotNewer
        );
        assert_eq!(
            watermark.observe(ts("2026-10-17T08:00:00")),
            WatermarkUpdate::NotNewer
        );
        let update = watermark.observe(ts("2026-10-17T09:00:01"));
        assert!(update.should_reload());
        assert_eq!(watermark.last(), Some(ts("2026-10-17T09:00:01")));
    }

    #[test]
    fn test_connection_lifecycle() {
        let mut conn = ConnectionMachine::new(DEFAULT_RECONNECT_DELAY);
        assert!(conn.begin_connect());
        assert!(!conn.begin_connect());
        assert_eq!(conn.opened(), OpenOutcome::First);
        assert!(conn.is_connected());

        assert_eq!(conn.failed(), ReconnectPlan::Schedule(Duration::from_secs(5)));
        assert_eq!(conn.state(), ConnectionState::BackoffWait);
        assert_eq!(conn.failed(), ReconnectPlan::Suppressed);

        assert!(conn.timer_fired());
        assert_eq!(conn.state(), ConnectionState::Connecting);
        assert_eq!(conn.opened(), OpenOutcome::Reconnect);
    }

    #[test]
    fn test_no_reconnect_while_hidden() {
        let mut conn = ConnectionMachine::new(DEFAULT_RECONNECT_DELAY);
        conn.begin_connect();
        conn.opened();

        assert!(conn.hidden());
        assert_eq!(conn.failed(), ReconnectPlan::Suppressed);
        assert!(!conn.begin_connect());
        assert!(!conn.timer_fired());

        assert!(conn.shown());
        assert!(conn.begin_connect());
    }

    #[test]
    fn test_hide_disarms_timer() {
        let mut conn = ConnectionMachine::new(DEFAULT_RECONNECT_DELAY);
        conn.begin_connect();
        assert!(matches!(conn.failed(), ReconnectPlan::Schedule(_)));
        assert!(!conn.hidden());
        assert!(!conn.timer_armed());
        assert!(!conn.timer_fired());
    }

    #[test]
    fn test_teardown_is_final() {
        let mut conn = ConnectionMachine::new(DEFAULT_RECONNECT_DELAY);
        conn.begin_connect();
        conn.opened();
        conn.teardown();
        assert_eq!(conn.failed(), ReconnectPlan::Suppressed);
        assert!(!conn.shown());
        assert!(!conn.begin_connect());
    }

    #[test]
    fn test_shown_while_connected_does_nothing() {
        let mut conn = ConnectionMachine::new(DEFAULT_RECONNECT_DELAY);
        conn.begin_connect();
        conn.heartbeat();
        assert!(conn.is_connected());
        assert!(!conn.shown());
    }

    #[test]
    fn test_reload_guard_collapses_requests() {
        let mut guard = ReloadGuard::new();
        assert!(guard.request());
        assert!(!guard.request());
        assert!(!guard.request());

        assert!(guard.finish());
        assert!(guard.is_running());
        assert!(!guard.finish());
        assert!(!guard.is_running());
        assert!(guard.request());
    }
}
