//! Protocol constants and utilities
//!
//! RFC 6455 opcodes and frame header bits, the HTTP vocabulary used by the
//! polling handshake and the WebSocket upgrade, and the Engine.IO defaults.

/// WebSocket opcodes as defined in RFC 6455 Section 5.2
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    /// Continuation frame
    Continuation = 0x0,
    /// Text frame
    Text = 0x1,
    /// Binary frame
    Binary = 0x2,
    /// Close frame
    Close = 0x8,
    /// Ping frame
    Ping = 0x9,
    /// Pong frame
    Pong = 0xA,
}

impl Opcode {
    /// Create an Opcode from a u8
    pub fn from(value: u8) -> Option<Self> {
        match value {
            0x0 => Some(Opcode::Continuation),
            0x1 => Some(Opcode::Text),
            0x2 => Some(Opcode::Binary),
            0x8 => Some(Opcode::Close),
            0x9 => Some(Opcode::Ping),
            0xA => Some(Opcode::Pong),
            _ => None,
        }
    }

    /// Get the numeric value of the opcode
    pub fn value(&self) -> u8 {
        *self as u8
    }

    /// Check if this is a control opcode
    pub fn is_control(&self) -> bool {
        matches!(self, Opcode::Close | Opcode::Ping | Opcode::Pong)
    }

    /// Check if this is a data opcode
    pub fn is_data(&self) -> bool {
        matches!(self, Opcode::Text | Opcode::Binary | Opcode::Continuation)
    }
}

/// Protocol constants
pub mod constants {
    use std::time::Duration;

    /// WebSocket protocol version
    pub const WEBSOCKET_VERSION: &str = "13";

    /// Default path segment of a Socket.IO endpoint
    pub const DEFAULT_PATH: &str = "socket.io";

    /// Default upgrade transport
    pub const DEFAULT_TRANSPORT: &str = "websocket";

    /// Maximum payload per written frame (default)
    pub const DEFAULT_MAX_PAYLOAD: usize = 10_000_000;

    /// Maximum reassembled inbound message size (default)
    pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 64 * 1024 * 1024; // 64MB

    /// Default connect and establishment timeout
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

    /// Default delay between partial HTTP reads
    pub const DEFAULT_POLL_DELAY: Duration = Duration::from_millis(100);

    /// Default minimum spacing between transport socket creations
    pub const DEFAULT_REUSE_DELAY: Duration = Duration::from_millis(50);

    /// WebSocket key length in bytes
    pub const WEBSOCKET_KEY_LEN: usize = 16;

    /// Engine.IO v4 polling record separator
    pub const RECORD_SEPARATOR: char = '\u{1e}';

    /// Default Origin sent with the upgrade request
    pub const DEFAULT_ORIGIN: &str = "*";
}

/// Frame header bit positions and masks
pub mod frame {
    /// FIN bit position
    pub const FIN_BIT: u8 = 0x80;

    /// RSV1 bit position
    pub const RSV1_BIT: u8 = 0x40;

    /// RSV2 bit position
    pub const RSV2_BIT: u8 = 0x20;

    /// RSV3 bit position
    pub const RSV3_BIT: u8 = 0x10;

    /// Opcode mask
    pub const OPCODE_MASK: u8 = 0x0F;

    /// MASK bit position
    pub const MASK_BIT: u8 = 0x80;

    /// Payload length mask for 7-bit length
    pub const PAYLOAD_LEN_MASK: u8 = 0x7F;

    /// Extended payload length (16-bit) marker
    pub const PAYLOAD_LEN_16: u8 = 126;

    /// Extended payload length (64-bit) marker
    pub const PAYLOAD_LEN_64: u8 = 127;

    /// Masking key length
    pub const MASKING_KEY_LEN: usize = 4;
}

/// HTTP status codes seen during the handshake and upgrade
pub mod http_status {
    /// HTTP Switching Protocols status
    pub const SWITCHING_PROTOCOLS: u16 = 101;

    /// HTTP OK status
    pub const OK: u16 = 200;
}

/// HTTP methods
pub mod http_method {
    /// HTTP GET method
    pub const GET: &str = "GET";

    /// HTTP POST method
    pub const POST: &str = "POST";
}

/// HTTP header names
pub mod http_header {
    /// Host header
    pub const HOST: &str = "Host";

    /// Connection header
    pub const CONNECTION: &str = "Connection";

    /// Upgrade header
    pub const UPGRADE: &str = "Upgrade";

    /// Origin header
    pub const ORIGIN: &str = "Origin";

    /// Sec-WebSocket-Key header
    pub const SEC_WEBSOCKET_KEY: &str = "Sec-WebSocket-Key";

    /// Sec-WebSocket-Version header
    pub const SEC_WEBSOCKET_VERSION: &str = "Sec-WebSocket-Version";

    /// Cookie header
    pub const COOKIE: &str = "Cookie";

    /// Set-Cookie header
    pub const SET_COOKIE: &str = "Set-Cookie";

    /// Content-Type header
    pub const CONTENT_TYPE: &str = "Content-Type";

    /// Content-Length header
    pub const CONTENT_LENGTH: &str = "Content-Length";
}

/// HTTP header values
pub mod http_value {
    /// WebSocket upgrade value
    pub const WEBSOCKET: &str = "websocket";

    /// Upgrade connection value
    pub const UPGRADE: &str = "Upgrade";

    /// Polling payload content type
    pub const TEXT_PLAIN: &str = "text/plain;charset=UTF-8";
}

/// Utility functions for WebSocket protocol operations
pub mod utils {
    use base64::{engine::general_purpose, Engine as _};
    use sha1::{Digest, Sha1};

    /// Generate a random WebSocket key
    ///
    /// The 0.x servers expect the 16 byte nonce to be run through SHA-1
    /// before encoding, so `hashed` selects that form.
    pub fn generate_key(hashed: bool) -> String {
        use rand::RngCore;
        let mut key_bytes = [0u8; super::constants::WEBSOCKET_KEY_LEN];
        rand::thread_rng().fill_bytes(&mut key_bytes);
        if hashed {
            general_purpose::STANDARD.encode(Sha1::digest(key_bytes))
        } else {
            general_purpose::STANDARD.encode(key_bytes)
        }
    }

    /// Validate WebSocket key format
    pub fn validate_key(key: &str) -> bool {
        general_purpose::STANDARD.decode(key).is_ok()
    }
}
