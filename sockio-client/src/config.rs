//! Client configuration for SockIO
//!
//! `ClientConfig` is resolved once when an engine is built and never
//! changes afterwards. The read deadline, which moves from the configured
//! timeout to the server's ping timeout during the handshake, lives in
//! `TimeoutPolicy` instead.

use serde_json::Value;
use sockio_core::error::ConfigError;
use sockio_core::protocol::constants::{
    DEFAULT_MAX_MESSAGE_SIZE, DEFAULT_MAX_PAYLOAD, DEFAULT_POLL_DELAY, DEFAULT_REUSE_DELAY,
    DEFAULT_TIMEOUT, DEFAULT_TRANSPORT,
};
use sockio_core::transport::TransportConfig;
use sockio_core::Error;
use std::time::Duration;

/// Client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Connect timeout and read deadline until the handshake completes
    pub timeout: Duration,
    /// Delay between partial HTTP reads
    pub wait: Duration,
    /// Largest payload written in a single WebSocket frame
    pub max_payload: usize,
    /// Largest reassembled inbound message
    pub max_message_size: usize,
    /// Upgrade transport
    pub transport: String,
    /// Engine.IO protocol number, overriding the generation default
    pub version: Option<u8>,
    /// Ask for base64 payloads while polling
    pub use_b64: bool,
    /// Extra request headers
    pub headers: Vec<(String, String)>,
    /// Minimum spacing between transport socket creations
    pub reuse_delay: Duration,
    /// Payload of the namespace CONNECT packet
    pub auth: Option<Value>,
    /// TLS configuration
    pub tls: TlsConfig,
    /// Disable Nagle's algorithm
    pub nodelay: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            wait: DEFAULT_POLL_DELAY,
            max_payload: DEFAULT_MAX_PAYLOAD,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            transport: DEFAULT_TRANSPORT.to_string(),
            version: None,
            use_b64: false,
            headers: Vec::new(),
            reuse_delay: DEFAULT_REUSE_DELAY,
            auth: None,
            tls: TlsConfig::default(),
            nodelay: true,
        }
    }
}

impl ClientConfig {
    /// Validate the configuration
    pub fn validate(&self) -> sockio_core::Result<()> {
        if self.transport != DEFAULT_TRANSPORT {
            return Err(Error::Config(ConfigError::InvalidValue {
                field: "transport".to_string(),
                value: self.transport.clone(),
            }));
        }

        if self.max_payload == 0 {
            return Err(Error::Config(ConfigError::Validation(
                "max_payload must be greater than 0".to_string(),
            )));
        }

        if self.max_message_size < self.max_payload {
            return Err(Error::Config(ConfigError::Validation(
                "max_message_size must be greater than or equal to max_payload".to_string(),
            )));
        }

        if self.timeout.is_zero() {
            return Err(Error::Config(ConfigError::Validation(
                "timeout must be greater than 0".to_string(),
            )));
        }

        if let Some(version) = self.version {
            if !(1..=4).contains(&version) {
                return Err(Error::Config(ConfigError::InvalidValue {
                    field: "version".to_string(),
                    value: version.to_string(),
                }));
            }
        }

        if let Some(auth) = &self.auth {
            if !auth.is_object() {
                return Err(Error::Config(ConfigError::Validation(
                    "auth must be a JSON object".to_string(),
                )));
            }
        }

        Ok(())
    }

    /// Set the connect timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the delay between partial HTTP reads
    pub fn wait(mut self, wait: Duration) -> Self {
        self.wait = wait;
        self
    }

    /// Set the maximum frame payload
    pub fn max_payload(mut self, size: usize) -> Self {
        self.max_payload = size;
        self
    }

    /// Set the maximum inbound message size
    pub fn max_message_size(mut self, size: usize) -> Self {
        self.max_message_size = size;
        self
    }

    /// Set the upgrade transport
    pub fn transport(mut self, transport: impl Into<String>) -> Self {
        self.transport = transport.into();
        self
    }

    /// Override the Engine.IO protocol number
    pub fn version(mut self, version: u8) -> Self {
        self.version = Some(version);
        self
    }

    /// Ask for base64 polling payloads
    pub fn use_b64(mut self, enabled: bool) -> Self {
        self.use_b64 = enabled;
        self
    }

    /// Add a custom header
    pub fn add_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Set the minimum spacing between socket creations
    pub fn reuse_delay(mut self, delay: Duration) -> Self {
        self.reuse_delay = delay;
        self
    }

    /// Set the namespace CONNECT payload
    pub fn auth(mut self, auth: Value) -> Self {
        self.auth = Some(auth);
        self
    }

    /// Set TLS configuration
    pub fn tls(mut self, config: TlsConfig) -> Self {
        self.tls = config;
        self
    }

    /// Options handed to the stream transports
    pub fn transport_config(&self) -> TransportConfig {
        TransportConfig {
            connect_timeout: self.timeout,
            nodelay: self.nodelay,
        }
    }
}

/// TLS configuration
#[derive(Debug, Clone)]
pub struct TlsConfig {
    /// Verify the server certificate chain
    pub verify: bool,
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self { verify: true }
    }
}

/// Read deadline in effect for the current connection
///
/// `connect()` starts from `Default`; a completed handshake switches to
/// `FromSession` and it stays there until the next `connect()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutPolicy {
    /// Configured timeout, used until the handshake completes
    Default(Duration),
    /// Ping timeout announced by the server
    FromSession(Duration),
}

impl TimeoutPolicy {
    /// Current timeout value
    pub fn duration(&self) -> Duration {
        match self {
            TimeoutPolicy::Default(d) | TimeoutPolicy::FromSession(d) => *d,
        }
    }

    /// Deadline for a single read; a zero timeout means none
    pub fn read_deadline(&self) -> Option<Duration> {
        Some(self.duration()).filter(|d| !d.is_zero())
    }

    /// Whether the session timeout is in effect
    pub fn is_from_session(&self) -> bool {
        matches!(self, TimeoutPolicy::FromSession(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_client_config_default() {
        let config = ClientConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert_eq!(config.max_payload, 10_000_000);
        assert_eq!(config.transport, "websocket");
        assert!(config.tls.verify);
    }

    #[test]
    fn test_client_config_validation() {
        let config = ClientConfig::default().transport("polling");
        assert!(matches!(
            config.validate(),
            Err(Error::Config(ConfigError::InvalidValue { .. }))
        ));

        assert!(ClientConfig::default().max_payload(0).validate().is_err());
        assert!(ClientConfig::default()
            .timeout(Duration::ZERO)
            .validate()
            .is_err());
        assert!(ClientConfig::default().version(7).validate().is_err());
        assert!(ClientConfig::default()
            .auth(json!("token"))
            .validate()
            .is_err());
        assert!(ClientConfig::default()
            .max_payload(100)
            .max_message_size(10)
            .validate()
            .is_err());
    }

    #[test]
    fn test_client_config_builder() {
        let config = ClientConfig::default()
            .max_payload(2048)
            .wait(Duration::from_millis(5))
            .use_b64(true)
            .add_header("Origin", "https://example.com")
            .auth(json!({ "token": "abc" }));

        assert_eq!(config.max_payload, 2048);
        assert_eq!(config.wait, Duration::from_millis(5));
        assert!(config.use_b64);
        assert_eq!(
            config.headers[0],
            ("Origin".to_string(), "https://example.com".to_string())
        );
        assert!(config.validate().is_ok());
        assert_eq!(config.transport_config().connect_timeout, config.timeout);
    }

    #[test]
    fn test_timeout_policy() {
        let policy = TimeoutPolicy::Default(Duration::from_secs(5));
        assert_eq!(policy.read_deadline(), Some(Duration::from_secs(5)));
        assert!(!policy.is_from_session());

        let session = TimeoutPolicy::FromSession(Duration::ZERO);
        assert!(session.is_from_session());
        assert_eq!(session.read_deadline(), None);
    }
}
