//! Engine.IO session state and the heartbeat clock

use crate::handshake::HandshakeData;
use std::time::{Duration, Instant};

/// An established Engine.IO session
#[derive(Debug, Clone)]
pub struct Session {
    id: String,
    ping_interval: Duration,
    ping_timeout: Duration,
    upgrades: Vec<String>,
    namespace_sid: Option<String>,
    last_heartbeat: Instant,
}

impl Session {
    /// Create a session; the heartbeat clock starts now
    pub fn new(
        id: impl Into<String>,
        ping_interval: Duration,
        ping_timeout: Duration,
        upgrades: Vec<String>,
    ) -> Self {
        Self {
            id: id.into(),
            ping_interval,
            ping_timeout,
            upgrades,
            namespace_sid: None,
            last_heartbeat: Instant::now(),
        }
    }

    /// Create a session from a decoded handshake
    pub fn from_handshake(data: HandshakeData) -> Self {
        Self::new(data.sid, data.ping_interval, data.ping_timeout, data.upgrades)
    }

    /// Attach the sid assigned by a namespace CONNECT reply
    pub fn with_namespace_sid(mut self, sid: impl Into<String>) -> Self {
        self.namespace_sid = Some(sid.into());
        self
    }

    /// Engine.IO session id
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Heartbeat interval
    pub fn ping_interval(&self) -> Duration {
        self.ping_interval
    }

    /// Heartbeat timeout
    pub fn ping_timeout(&self) -> Duration {
        self.ping_timeout
    }

    /// Transports the server offered
    pub fn upgrades(&self) -> &[String] {
        &self.upgrades
    }

    /// Socket.IO sid for the connected namespace (v3/v4)
    pub fn namespace_sid(&self) -> Option<&str> {
        self.namespace_sid.as_deref()
    }

    /// Whether a heartbeat is due
    pub fn needs_heartbeat(&self) -> bool {
        self.needs_heartbeat_at(Instant::now())
    }

    /// Whether a heartbeat is due at `now`
    ///
    /// A zero interval disables heartbeats.
    pub fn needs_heartbeat_at(&self, now: Instant) -> bool {
        !self.ping_interval.is_zero()
            && now.saturating_duration_since(self.last_heartbeat) >= self.ping_interval
    }

    /// Record that a heartbeat was just sent
    pub fn mark_heartbeat(&mut self) {
        self.mark_heartbeat_at(Instant::now());
    }

    /// Record a heartbeat sent at `at`
    pub fn mark_heartbeat_at(&mut self, at: Instant) {
        self.last_heartbeat = at;
    }

    /// Instant of the last heartbeat
    pub fn last_heartbeat(&self) -> Instant {
        self.last_heartbeat
    }
}
