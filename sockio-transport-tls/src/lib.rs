//! TLS Transport for SockIO
//!
//! rustls client streams for `https` / `wss` endpoints.

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(missing_docs, missing_debug_implementations, rust_2018_idioms)]
#![doc(html_root_url = "https://docs.rs/sockio-transport-tls/")]

pub mod tls;

// Re-export TLS transport types
pub use tls::{client_config, TlsStream};

/// Prelude module
pub mod prelude {
    pub use crate::tls::{client_config, TlsStream};
    pub use sockio_core::transport::{TransportConfig, TransportStream};
}
