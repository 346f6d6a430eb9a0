//! SockIO Client
//!
//! Engine.IO / Socket.IO client speaking every protocol generation from
//! 0.x to 4.x: polling handshake, namespace connect, WebSocket upgrade and
//! steady-state messaging.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use sockio_client::prelude::*;
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let mut client = Client::builder("http://localhost:3000")
//!         .generation(Generation::V4X)
//!         .header("Authorization", "Bearer token")
//!         .build()?;
//!
//!     client.connect().await?;
//!     client.emit("hello", json!({ "from": "sockio" })).await?;
//!
//!     let reply = client.wait("hello").await?;
//!     println!("Received: {:?}", reply);
//!
//!     client.close().await?;
//!     Ok(())
//! }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(missing_docs, missing_debug_implementations, rust_2018_idioms)]
#![doc(html_root_url = "https://docs.rs/sockio-client/")]

#[macro_use]
mod logging;

// Public modules
pub mod client;
pub mod config;
pub mod engine;
pub mod generation;
pub mod nonce;
pub mod socket;
pub mod url;

// Prelude module
pub mod prelude;

// Re-export key types for convenience
pub use client::{Client, ClientBuilder, ClientHandle};
pub use config::{ClientConfig, TimeoutPolicy, TlsConfig};
pub use engine::{Engine, EngineState};
pub use generation::Generation;
pub use socket::{HttpResponse, RequestOptions, TransportSocket};
pub use url::SocketUrl;
