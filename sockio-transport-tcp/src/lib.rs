//! TCP Transport for SockIO
//!
//! Outbound TCP connections for the polling handshake and the WebSocket
//! upgrade.

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(missing_docs, missing_debug_implementations, rust_2018_idioms)]
#![doc(html_root_url = "https://docs.rs/sockio-transport-tcp/")]

pub mod tcp;

// Re-export TCP transport types
pub use tcp::{connect_socket, TcpStream};

/// Prelude module
pub mod prelude {
    pub use crate::tcp::{connect_socket, TcpStream};
    pub use sockio_core::transport::{TransportConfig, TransportStream};
}
