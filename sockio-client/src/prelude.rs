//! Prelude module for SockIO Client
//!
//! This module re-exports commonly used types and traits to make them
//! easily accessible for users of the client library.

pub use crate::client::{Client, ClientBuilder, ClientHandle};
pub use crate::config::{ClientConfig, TimeoutPolicy, TlsConfig};
pub use crate::engine::{Engine, EngineState};
pub use crate::generation::Generation;
pub use crate::url::SocketUrl;

// Re-export core types for convenience
pub use sockio_core::prelude::*;

// Re-export commonly used external dependencies
pub use std::time::Duration;
