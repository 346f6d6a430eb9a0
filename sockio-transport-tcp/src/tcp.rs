//! TCP transport implementation for SockIO

use async_trait::async_trait;
use sockio_core::error::TimeoutError;
use sockio_core::transport::{TransportConfig, TransportStream};
use sockio_core::{Error, Result};
use std::net::SocketAddr;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream as TokioTcpStream;

/// Open a TCP connection to `host:port` within the configured timeout
///
/// Resolution and connect failures surface as `Error::Socket` carrying the
/// OS error number.
pub async fn connect_socket(
    host: &str,
    port: u16,
    config: &TransportConfig,
) -> Result<TokioTcpStream> {
    let connect = TokioTcpStream::connect((host, port));
    let stream = match tokio::time::timeout(config.connect_timeout, connect).await {
        Ok(Ok(stream)) => stream,
        Ok(Err(e)) => return Err(Error::socket(&e)),
        Err(_) => {
            return Err(TimeoutError::Connect {
                timeout: config.connect_timeout,
            }
            .into())
        }
    };

    if config.nodelay {
        stream.set_nodelay(true).map_err(|e| Error::socket(&e))?;
    }
    Ok(stream)
}

/// TCP stream implementation
#[derive(Debug)]
pub struct TcpStream {
    stream: Option<TokioTcpStream>,
    remote_addr: SocketAddr,
}

impl TcpStream {
    /// Wrap a connected tokio TCP stream
    pub fn from_tokio(stream: TokioTcpStream) -> Result<Self> {
        let remote_addr = stream.peer_addr().map_err(|e| Error::socket(&e))?;
        Ok(Self {
            stream: Some(stream),
            remote_addr,
        })
    }

    /// Connect to `host:port`
    pub async fn connect(host: &str, port: u16, config: &TransportConfig) -> Result<Self> {
        Self::from_tokio(connect_socket(host, port, config).await?)
    }

    /// Whether the stream is still open
    pub fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    fn inner(&mut self) -> Result<&mut TokioTcpStream> {
        self.stream.as_mut().ok_or(Error::NotConnected)
    }
}

#[async_trait]
impl TransportStream for TcpStream {
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let stream = self.inner()?;
        stream.read(buf).await.map_err(|e| Error::socket(&e))
    }

    async fn write(&mut self, buf: &[u8]) -> Result<usize> {
        let stream = self.inner()?;
        stream.write(buf).await.map_err(|e| Error::socket(&e))
    }

    async fn write_all(&mut self, buf: &[u8]) -> Result<()> {
        let stream = self.inner()?;
        stream.write_all(buf).await.map_err(|e| Error::socket(&e))
    }

    async fn flush(&mut self) -> Result<()> {
        let stream = self.inner()?;
        stream.flush().await.map_err(|e| Error::socket(&e))
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(mut stream) = self.stream.take() {
            // peer may already be gone
            let _ = stream.shutdown().await;
        }
        Ok(())
    }

    fn remote_addr(&self) -> Result<SocketAddr> {
        Ok(self.remote_addr)
    }

    fn local_addr(&self) -> Result<SocketAddr> {
        match &self.stream {
            Some(stream) => stream.local_addr().map_err(Error::Io),
            None => Err(Error::NotConnected),
        }
    }
}
