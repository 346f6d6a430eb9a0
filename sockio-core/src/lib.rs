//! # SockIO Core
//!
//! Wire-level building blocks for the SockIO Engine.IO / Socket.IO client.
//!
//! This crate carries everything that does not need a live connection:
//!
//! - Error handling and types
//! - WebSocket frame encoding, decoding and the fragmenting `FrameCodec`
//! - A forward-only `SequenceReader` used by every payload parser
//! - Engine.IO / Socket.IO packet encoding and decoding for all protocol generations
//! - Handshake body decoding and WebSocket upgrade request building
//! - Session bookkeeping and the heartbeat clock
//! - Transport stream abstraction

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(missing_docs, missing_debug_implementations, rust_2018_idioms)]
#![doc(html_root_url = "https://docs.rs/sockio-core/")]

// Core modules
pub mod cursor;
pub mod error;
pub mod frame;
pub mod handshake;
pub mod packet;
pub mod protocol;
pub mod session;
pub mod transport;

// Prelude module with common imports
pub mod prelude;

// Re-export key types for convenience
pub use cursor::SequenceReader;
pub use error::{Error, Result};
pub use frame::{Frame, FrameCodec, FrameKind};
pub use handshake::{HandshakeData, UpgradeRequest};
pub use packet::{Dialect, Packet, SocketPacket};
pub use protocol::Opcode;
pub use session::Session;
pub use transport::TransportStream;
