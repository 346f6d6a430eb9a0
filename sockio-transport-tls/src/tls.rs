//! TLS transport implementation for SockIO

use rustls::client::{ServerCertVerified, ServerCertVerifier};
use rustls::{Certificate, ClientConfig, OwnedTrustAnchor, RootCertStore, ServerName};
use sockio_core::transport::{TransportConfig, TransportStream};
use sockio_core::{Error, Result};
use sockio_transport_tcp::connect_socket;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::SystemTime;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream as TokioTcpStream;
use tokio_rustls::client::TlsStream as ClientTlsStream;
use tokio_rustls::TlsConnector;

/// Build a client configuration trusting the webpki root set
///
/// With `verify` off, any server certificate is accepted.
pub fn client_config(verify: bool) -> Arc<ClientConfig> {
    let mut root_store = RootCertStore::empty();
    root_store.add_trust_anchors(webpki_roots::TLS_SERVER_ROOTS.iter().map(|ta| {
        OwnedTrustAnchor::from_subject_spki_name_constraints(
            ta.subject,
            ta.spki,
            ta.name_constraints,
        )
    }));

    let mut config = ClientConfig::builder()
        .with_safe_defaults()
        .with_root_certificates(root_store)
        .with_no_client_auth();

    if !verify {
        config
            .dangerous()
            .set_certificate_verifier(Arc::new(AcceptAnyCertificate));
    }

    Arc::new(config)
}

struct AcceptAnyCertificate;

impl ServerCertVerifier for AcceptAnyCertificate {
    fn verify_server_cert(
        &self,
        _end_entity: &Certificate,
        _intermediates: &[Certificate],
        _server_name: &ServerName,
        _scts: &mut dyn Iterator<Item = &[u8]>,
        _ocsp_response: &[u8],
        _now: SystemTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }
}

/// TLS stream implementation
pub struct TlsStream {
    stream: Option<ClientTlsStream<TokioTcpStream>>,
    remote_addr: SocketAddr,
}

impl std::fmt::Debug for TlsStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsStream")
            .field("remote_addr", &self.remote_addr)
            .field("open", &self.stream.is_some())
            .finish()
    }
}

impl TlsStream {
    /// Connect to `host:port` and run the TLS handshake
    ///
    /// `host` is also the SNI name.
    pub async fn connect(
        host: &str,
        port: u16,
        config: &TransportConfig,
        tls: Arc<ClientConfig>,
    ) -> Result<Self> {
        let domain = ServerName::try_from(host)
            .map_err(|e| Error::MalformedUrl(format!("invalid server name {host}: {e}")))?;

        let tcp_stream = connect_socket(host, port, config).await?;
        let remote_addr = tcp_stream.peer_addr().map_err(|e| Error::socket(&e))?;

        let tls_stream = TlsConnector::from(tls)
            .connect(domain, tcp_stream)
            .await
            .map_err(|e| Error::socket(&e))?;

        Ok(Self {
            stream: Some(tls_stream),
            remote_addr,
        })
    }

    /// Whether the stream is still open
    pub fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    fn inner(&mut self) -> Result<&mut ClientTlsStream<TokioTcpStream>> {
        self.stream.as_mut().ok_or(Error::NotConnected)
    }
}

#[async_trait::async_trait]
impl TransportStream for TlsStream {
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
            // close_notify is best effort
            let _ = stream.shutdown().await;
        }
        Ok(())
    }

    fn remote_addr(&self) -> Result<SocketAddr> {
        Ok(self.remote_addr)
    }

    fn local_addr(&self) -> Result<SocketAddr> {
        match &self.stream {
            Some(stream) => stream.get_ref().0.local_addr().map_err(Error::Io),
            None => Err(Error::NotConnected),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[test]
    fn test_client_config_builds() {
        let verified = client_config(true);
        let unverified = client_config(false);
        assert!(!Arc::ptr_eq(&verified, &unverified));
    }

    #[tokio::test]
    async fn test_invalid_server_name() {
        let err = TlsStream::connect(
            "bad host name",
            443,
            &TransportConfig::default(),
            client_config(true),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::MalformedUrl(_)));
    }

    #[tokio::test]
    async fn test_handshake_failure_is_socket_error() {
        // a plain TCP peer that hangs up instead of answering ClientHello
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            drop(socket);
        });

        let err = TlsStream::connect(
            "localhost",
            port,
            &TransportConfig::default(),
            client_config(false),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::Socket { .. }));
        server.abort();
    }
}
