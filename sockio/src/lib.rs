//! # SockIO
//!
//! **Engine.IO / Socket.IO client for every protocol generation from 0.x to 4.x**
//!
//! SockIO negotiates a session over HTTP long-polling, connects the
//! namespace where the server expects it, upgrades to WebSocket and then
//! exchanges Socket.IO packets. Every operation is a plain `async fn`;
//! there are no background tasks.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use sockio::prelude::*;
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let mut client = Client::builder("http://localhost:3000")
//!         .generation(Generation::V2X)
//!         .build()?;
//!
//!     client.connect().await?;
//!     client.emit("join", json!(["lobby"])).await?;
//!     let welcome = client.wait_timeout("welcome", Duration::from_secs(5)).await?;
//!     println!("{:?}", welcome.as_event());
//!     client.close().await?;
//!     Ok(())
//! }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(missing_docs, missing_debug_implementations, rust_2018_idioms)]
#![doc(html_root_url = "https://docs.rs/sockio/")]

// Re-export core components
pub use sockio_core::*;

#[cfg(feature = "transport-tcp")]
pub use sockio_transport_tcp as transport_tcp;

#[cfg(feature = "transport-tls")]
pub use sockio_transport_tls as transport_tls;

#[cfg(feature = "client")]
pub use sockio_client as client;

#[cfg(feature = "client")]
pub use sockio_client::{Client, ClientBuilder, ClientConfig, ClientHandle, Engine, Generation};

/// Prelude module with common imports
pub mod prelude {
    pub use sockio_core::prelude::*;

    #[cfg(feature = "client")]
    pub use sockio_client::prelude::*;

    #[cfg(feature = "transport-tcp")]
    pub use sockio_transport_tcp::prelude::*;

    #[cfg(feature = "transport-tls")]
    pub use sockio_transport_tls::prelude::*;
}
