//! Prelude module for SockIO Core
//!
//! This module re-exports commonly used types and traits to make them
//! easily accessible for users of the library.

pub use crate::cursor::SequenceReader;
pub use crate::error::{Error, Result};
pub use crate::frame::{Frame, FrameCodec, FrameKind};
pub use crate::handshake::{HandshakeData, UpgradeRequest};
pub use crate::packet::{Dialect, Packet, SocketPacket};
pub use crate::protocol::Opcode;
pub use crate::session::Session;
pub use crate::transport::{TransportConfig, TransportStream};

// Re-export commonly used external dependencies
pub use bytes::{Bytes, BytesMut};
pub use serde_json::Value;
pub use thiserror::Error as ThisError;

// Feature-gated re-exports
#[cfg(feature = "tokio-runtime")]
pub use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
