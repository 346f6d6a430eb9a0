//! Protocol generations and what distinguishes them
//!
//! A single engine drives every generation; the differences are looked up
//! here rather than spread across specialised engine types.

use sockio_core::error::ConfigError;
use sockio_core::{Dialect, Error};
use std::fmt;
use std::str::FromStr;

/// Socket.IO server generation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Generation {
    /// Socket.IO 0.x
    V0X,
    /// Socket.IO 1.x
    V1X,
    /// Socket.IO 2.x
    V2X,
    /// Socket.IO 3.x
    V3X,
    /// Socket.IO 4.x
    V4X,
}

impl Generation {
    /// Default Engine.IO protocol number
    pub fn protocol(self) -> u8 {
        match self {
            Generation::V0X => 1,
            Generation::V1X => 2,
            Generation::V2X => 3,
            Generation::V3X | Generation::V4X => 4,
        }
    }

    /// Packet grammar
    pub fn dialect(self) -> Dialect {
        match self {
            Generation::V0X => Dialect::Legacy,
            _ => Dialect::Modern,
        }
    }

    /// Whether the handshake body is the 0.x colon-delimited form
    pub fn legacy_handshake(self) -> bool {
        self == Generation::V0X
    }

    /// Whether a namespace CONNECT round trip precedes the upgrade
    pub fn requires_namespace_connect(self) -> bool {
        matches!(self, Generation::V3X | Generation::V4X)
    }

    /// Whether socket creation is spaced by the reuse delay
    pub fn throttles_reconnect(self) -> bool {
        self != Generation::V0X
    }

    /// Whether `of()` sends a namespace CONNECT packet
    pub fn connects_namespaces(self) -> bool {
        self != Generation::V0X
    }

    /// Human-readable engine name
    pub fn engine_name(self) -> &'static str {
        match self {
            Generation::V0X => "SocketIO Version 0.X",
            Generation::V1X => "SocketIO Version 1.X",
            Generation::V2X => "SocketIO Version 2.X",
            Generation::V3X => "SocketIO Version 3.X",
            Generation::V4X => "SocketIO Version 4.X",
        }
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.engine_name())
    }
}

impl FromStr for Generation {
    type Err = Error;

    /// Accepts `0`..`4`, `0.x`..`4.x` and `v0`..`v4`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        let major = normalized
            .trim_start_matches('v')
            .trim_end_matches(".x")
            .trim_end_matches('x');
        match major {
            "0" => Ok(Generation::V0X),
            "1" => Ok(Generation::V1X),
            "2" => Ok(Generation::V2X),
            "3" => Ok(Generation::V3X),
            "4" => Ok(Generation::V4X),
            _ => Err(Error::Config(ConfigError::InvalidValue {
                field: "generation".to_string(),
                value: s.to_string(),
            })),
        }
    }
}
