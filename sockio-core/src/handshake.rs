//! Engine.IO handshake decoding and WebSocket upgrade requests
//!
//! The polling handshake answers with a session description whose shape
//! depends on the protocol generation. The upgrade request is an RFC 6455
//! opening handshake that also carries the cookies captured while polling.

use crate::cursor::SequenceReader;
use crate::error::PacketError;
use crate::packet::{split_payload, Dialect, Packet};
use crate::protocol::constants::{DEFAULT_ORIGIN, WEBSOCKET_VERSION};
use crate::protocol::http_header::*;
use crate::protocol::{http_value, utils};
use serde::Deserialize;
use std::time::Duration;

/// Session description announced by the server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeData {
    /// Server-assigned session id
    pub sid: String,
    /// Heartbeat interval
    pub ping_interval: Duration,
    /// Heartbeat timeout
    pub ping_timeout: Duration,
    /// Transports the server allows an upgrade to
    pub upgrades: Vec<String>,
    /// Largest payload the server accepts, when announced
    pub max_payload: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OpenPayload {
    sid: String,
    #[serde(default)]
    upgrades: Vec<String>,
    #[serde(default)]
    ping_interval: u64,
    #[serde(default)]
    ping_timeout: u64,
    #[serde(default)]
    max_payload: Option<u64>,
}

impl HandshakeData {
    /// Decode a 0.x `sid:heartbeat:timeout:transports` body
    ///
    /// Heartbeat and timeout are already in seconds.
    pub fn decode_legacy(body: &str) -> Result<Self, PacketError> {
        let mut seq = SequenceReader::new(body.trim());
        let sid = seq
            .read_until(":", "")
            .ok_or_else(|| PacketError::InvalidPayload(format!("handshake {body}")))?;
        let heartbeat = seq
            .read_until(":", "")
            .ok_or_else(|| PacketError::InvalidPayload(format!("handshake {body}")))?;
        let timeout = seq
            .read_until(":", "")
            .ok_or_else(|| PacketError::InvalidPayload(format!("handshake {body}")))?;
        let transports = seq.read_to_end();

        Ok(Self {
            sid: sid.to_string(),
            ping_interval: Duration::from_secs(parse_seconds(heartbeat)?),
            ping_timeout: Duration::from_secs(parse_seconds(timeout)?),
            upgrades: transports
                .split(',')
                .filter(|t| !t.is_empty())
                .map(str::to_string)
                .collect(),
            max_payload: None,
        })
    }

    /// Decode a 1.x+ polling body, taking the first open packet it carries
    ///
    /// Millisecond intervals are converted to durations.
    pub fn decode_payload(body: &[u8], protocol: u8) -> Result<Self, PacketError> {
        for record in split_payload(body, protocol)? {
            if let Packet::Open(Some(data)) = Packet::decode(Dialect::Modern, &record)? {
                return Self::from_open(data);
            }
        }
        Err(PacketError::MissingOpen)
    }

    /// Build from the JSON carried by an open packet
    pub fn from_open(data: serde_json::Value) -> Result<Self, PacketError> {
        let open: OpenPayload = serde_json::from_value(data)
            .map_err(|e| PacketError::InvalidPayload(e.to_string()))?;
        Ok(Self {
            sid: open.sid,
            ping_interval: Duration::from_millis(open.ping_interval),
            ping_timeout: Duration::from_millis(open.ping_timeout),
            upgrades: open.upgrades,
            max_payload: open.max_payload,
        })
    }

    /// Whether the server offers an upgrade to `transport`
    pub fn supports(&self, transport: &str) -> bool {
        self.upgrades.iter().any(|t| t == transport)
    }
}

fn parse_seconds(field: &str) -> Result<u64, PacketError> {
    if field.is_empty() {
        return Ok(0);
    }
    field
        .parse::<u64>()
        .map_err(|_| PacketError::InvalidPayload(format!("duration {field}")))
}

/// WebSocket opening handshake request
#[derive(Debug, Clone)]
pub struct UpgradeRequest {
    /// Request target
    pub uri: String,
    /// Sec-WebSocket-Key value
    pub key: String,
    /// Origin header value
    pub origin: String,
    /// `name=value` cookies captured during the handshake
    pub cookies: Vec<String>,
    /// Additional headers
    pub extra_headers: Vec<(String, String)>,
}

impl UpgradeRequest {
    /// Create a request for `uri` with a fresh key
    ///
    /// `hashed_key` selects the SHA-1 key form expected by 0.x servers.
    pub fn new(uri: impl Into<String>, hashed_key: bool) -> Self {
        Self {
            uri: uri.into(),
            key: utils::generate_key(hashed_key),
            origin: DEFAULT_ORIGIN.to_string(),
            cookies: Vec::new(),
            extra_headers: Vec::new(),
        }
    }

    /// Take the Origin from caller headers and keep the rest as extras
    pub fn with_headers(mut self, headers: &[(String, String)]) -> Self {
        for (name, value) in headers {
            if name.eq_ignore_ascii_case(ORIGIN) {
                self.origin = value.clone();
            } else if !is_reserved(name) {
                self.extra_headers.push((name.clone(), value.clone()));
            }
        }
        self
    }

    /// Attach handshake cookies
    pub fn with_cookies(mut self, cookies: &[String]) -> Self {
        self.cookies = cookies.to_vec();
        self
    }

    /// Header list in wire order, without `Host`
    pub fn headers(&self) -> Vec<(String, String)> {
        let mut headers = vec![
            (UPGRADE.to_string(), http_value::WEBSOCKET.to_string()),
            (CONNECTION.to_string(), http_value::UPGRADE.to_string()),
            (SEC_WEBSOCKET_KEY.to_string(), self.key.clone()),
            (SEC_WEBSOCKET_VERSION.to_string(), WEBSOCKET_VERSION.to_string()),
            (ORIGIN.to_string(), self.origin.clone()),
        ];

        if !self.cookies.is_empty() {
            headers.push((COOKIE.to_string(), self.cookies.join("; ")));
        }

        headers.extend(self.extra_headers.iter().cloned());
        headers
    }
}

fn is_reserved(name: &str) -> bool {
    [
        HOST,
        UPGRADE,
        CONNECTION,
        SEC_WEBSOCKET_KEY,
        SEC_WEBSOCKET_VERSION,
    ]
    .iter()
    .any(|reserved| name.eq_ignore_ascii_case(reserved))
}

/// Extract `name=value` pairs from `Set-Cookie` header values
pub fn parse_cookies<'a>(set_cookie: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    set_cookie
        .into_iter()
        .filter_map(|value| value.split(';').next())
        .map(str::trim)
        .filter(|pair| pair.contains('='))
        .map(str::to_string)
        .collect()
}
