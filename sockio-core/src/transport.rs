//! Transport layer abstraction
//!
//! The engine talks to its server through a boxed `TransportStream`, so
//! plain TCP, TLS and in-memory test streams are interchangeable.

use crate::error::Result;
use std::time::Duration;

/// Trait for transport streams
#[async_trait::async_trait]
pub trait TransportStream: Send + Sync {
    /// Read data from the stream; `Ok(0)` means end of stream
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Write data to the stream
    async fn write(&mut self, buf: &[u8]) -> Result<usize>;

    /// Write all data to the stream
    async fn write_all(&mut self, buf: &[u8]) -> Result<()>;

    /// Flush the stream
    async fn flush(&mut self) -> Result<()>;

    /// Close the stream
    async fn close(&mut self) -> Result<()>;

    /// Get the remote address
    fn remote_addr(&self) -> Result<std::net::SocketAddr>;

    /// Get the local address
    fn local_addr(&self) -> Result<std::net::SocketAddr>;
}

/// Options applied when a transport stream is opened
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Connect timeout
    pub connect_timeout: Duration,
    /// Disable Nagle's algorithm
    pub nodelay: bool,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout: crate::protocol::constants::DEFAULT_TIMEOUT,
            nodelay: true,
        }
    }
}

/// Scripted in-memory stream for tests
#[cfg(any(test, feature = "test-util"))]
pub mod mock {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Default)]
    struct Shared {
        inbound: VecDeque<Vec<u8>>,
        outbound: Vec<u8>,
        closed: bool,
    }

    /// In-memory stream fed with scripted chunks
    ///
    /// Each `read` returns at most one queued chunk; an empty queue reads
    /// as end of stream. Everything written is captured and can be
    /// inspected through a cloned handle.
    #[derive(Debug, Clone, Default)]
    pub struct MockStream {
        shared: Arc<Mutex<Shared>>,
    }

    impl MockStream {
        /// Create an empty stream
        pub fn new() -> Self {
            Self::default()
        }

        /// Queue a chunk for the reader
        pub fn push_inbound(&self, chunk: impl Into<Vec<u8>>) {
            if let Ok(mut shared) = self.shared.lock() {
                shared.inbound.push_back(chunk.into());
            }
        }

        /// Bytes written so far
        pub fn outbound(&self) -> Vec<u8> {
            self.shared
                .lock()
                .map(|shared| shared.outbound.clone())
                .unwrap_or_default()
        }

        /// Whether `close` was called
        pub fn is_closed(&self) -> bool {
            self.shared.lock().map(|s| s.closed).unwrap_or(true)
        }
    }

    fn poisoned() -> crate::Error {
        crate::Error::Other("mock stream lock poisoned".to_string())
    }

    #[async_trait::async_trait]
    impl TransportStream for MockStream {
        async fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
            let mut shared = self.shared.lock().map_err(|_| poisoned())?;
            let Some(mut chunk) = shared.inbound.pop_front() else {
                return Ok(0);
            };
            let n = chunk.len().min(buf.len());
            buf[..n].copy_from_slice(&chunk[..n]);
            if n < chunk.len() {
                shared.inbound.push_front(chunk.split_off(n));
            }
            Ok(n)
        }

        async fn write(&mut self, buf: &[u8]) -> Result<usize> {
            let mut shared = self.shared.lock().map_err(|_| poisoned())?;
            shared.outbound.extend_from_slice(buf);
            Ok(buf.len())
        }

        async fn write_all(&mut self, buf: &[u8]) -> Result<()> {
            self.write(buf).await.map(|_| ())
        }

        async fn flush(&mut self) -> Result<()> {
            Ok(())
        }

        async fn close(&mut self) -> Result<()> {
            let mut shared = self.shared.lock().map_err(|_| poisoned())?;
            shared.closed = true;
            Ok(())
        }

        fn remote_addr(&self) -> Result<std::net::SocketAddr> {
            Ok(std::net::SocketAddr::from(([127, 0, 0, 1], 80)))
        }

        fn local_addr(&self) -> Result<std::net::SocketAddr> {
            Ok(std::net::SocketAddr::from(([127, 0, 0, 1], 49152)))
        }
    }
}
