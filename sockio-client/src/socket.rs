//! Transport socket: one HTTP-capable, upgradeable stream
//!
//! The socket writes raw HTTP/1.1 requests, reads the response back over
//! the same stream and, once upgraded, carries WebSocket frames. Bytes that
//! arrive after a response head stay buffered for the frame decoder.

use crate::config::ClientConfig;
use crate::url::SocketUrl;
use bytes::{Buf, Bytes, BytesMut};
use sockio_core::error::TimeoutError;
use sockio_core::protocol::http_header::{CONTENT_LENGTH, CONTENT_TYPE, HOST};
use sockio_core::protocol::{http_method, http_value, Opcode};
use sockio_core::transport::{TransportConfig, TransportStream};
use sockio_core::{Error, FrameCodec, Result};
use std::fmt;
use std::time::{Duration, Instant};

const READ_CHUNK: usize = 8192;
const MAX_HEADERS: usize = 64;

/// Options for one HTTP exchange
#[derive(Debug, Clone, Copy)]
pub struct RequestOptions<'a> {
    /// Request method
    pub method: &'a str,
    /// Stop after the response head
    pub skip_body: bool,
    /// Request body
    pub payload: Option<&'a [u8]>,
}

impl<'a> RequestOptions<'a> {
    /// Plain GET
    pub fn get() -> Self {
        Self {
            method: http_method::GET,
            skip_body: false,
            payload: None,
        }
    }

    /// POST carrying `payload`
    pub fn post(payload: &'a [u8]) -> Self {
        Self {
            method: http_method::POST,
            skip_body: false,
            payload: Some(payload),
        }
    }

    /// Return after the response head
    pub fn skip_body(mut self) -> Self {
        self.skip_body = true;
        self
    }
}

/// The last HTTP response read from the socket
#[derive(Debug, Clone, Default)]
pub struct HttpResponse {
    /// Raw status line
    pub status_line: String,
    /// Status code, 0 when none was read
    pub status: u16,
    /// Header list in arrival order
    pub headers: Vec<(String, String)>,
    /// Response body
    pub body: Bytes,
}

impl HttpResponse {
    /// First value of a header, case-insensitively
    pub fn header(&self, name: &str) -> Option<&str> {
        self.header_values(name).next()
    }

    /// All values of a header, case-insensitively
    pub fn header_values<'a: 'n, 'n>(&'a self, name: &'n str) -> impl Iterator<Item = &'a str> + 'n {
        self.headers
            .iter()
            .filter(move |(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// One connection to the server
pub struct TransportSocket {
    stream: Option<Box<dyn TransportStream>>,
    error: Option<(i32, String)>,
    host_header: String,
    buffer: BytesMut,
    eof: bool,
    poll_delay: Duration,
    read_timeout: Option<Duration>,
    response: HttpResponse,
    created_at: Instant,
}

impl fmt::Debug for TransportSocket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportSocket")
            .field("host", &self.host_header)
            .field("open", &self.stream.is_some())
            .field("eof", &self.eof)
            .field("error", &self.error)
            .field("buffered", &self.buffer.len())
            .finish()
    }
}

impl TransportSocket {
    /// Open a connection to `url`
    ///
    /// Connect failures do not fail this call; they are recorded and
    /// surface through `error()` and `ensure_open()`.
    pub async fn open(url: &SocketUrl, config: &ClientConfig, read_timeout: Option<Duration>) -> Self {
        let transport = config.transport_config();
        let stream = if url.secure {
            open_tls(url, config, &transport).await
        } else {
            sockio_transport_tcp::TcpStream::connect(&url.host, url.port, &transport)
                .await
                .map(|s| Box::new(s) as Box<dyn TransportStream>)
        };

        let mut socket = Self::detached(url.host_header(), config.wait, read_timeout);
        match stream {
            Ok(stream) => socket.stream = Some(stream),
            Err(e) => {
                log_error!("connect to {} failed: {}", url.host_header(), e);
                socket.error = Some(match e {
                    Error::Socket { errno, message } => (errno, message),
                    other => (0, other.to_string()),
                });
                socket.eof = true;
            }
        }
        socket
    }

    /// Wrap an already connected stream
    pub fn with_stream(
        stream: Box<dyn TransportStream>,
        host_header: impl Into<String>,
        poll_delay: Duration,
        read_timeout: Option<Duration>,
    ) -> Self {
        let mut socket = Self::detached(host_header.into(), poll_delay, read_timeout);
        socket.stream = Some(stream);
        socket
    }

    fn detached(host_header: String, poll_delay: Duration, read_timeout: Option<Duration>) -> Self {
        Self {
            stream: None,
            error: None,
            host_header,
            buffer: BytesMut::with_capacity(READ_CHUNK),
            eof: false,
            poll_delay,
            read_timeout,
            response: HttpResponse::default(),
            created_at: Instant::now(),
        }
    }

    /// Recorded connect failure as `(errno, message)`
    pub fn error(&self) -> Option<(i32, &str)> {
        self.error.as_ref().map(|(errno, msg)| (*errno, msg.as_str()))
    }

    /// Fail with the recorded socket error when there is no handle
    pub fn ensure_open(&self) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }
        let (errno, message) = self
            .error
            .clone()
            .unwrap_or_else(|| (0, "socket is closed".to_string()));
        Err(Error::Socket { errno, message })
    }

    /// Whether the handle exists and the peer has not closed
    pub fn is_connected(&self) -> bool {
        self.stream.is_some() && !self.eof
    }

    /// When the socket was created
    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    /// Last response read
    pub fn response(&self) -> &HttpResponse {
        &self.response
    }

    /// Send an HTTP request and read the response
    ///
    /// Returns whether a response head was received. The body is read to
    /// `Content-Length` when present, otherwise until the peer closes.
    pub async fn send_request(
        &mut self,
        path: &str,
        headers: &[(String, String)],
        options: RequestOptions<'_>,
    ) -> Result<bool> {
        self.ensure_open()?;

        let mut request = format!(
            "{} {} HTTP/1.1\r\n{}: {}\r\n",
            options.method, path, HOST, self.host_header
        );
        for (name, value) in headers.iter().filter(|(n, _)| !n.eq_ignore_ascii_case(HOST)) {
            request.push_str(&format!("{name}: {value}\r\n"));
        }

        let payload = options.payload.unwrap_or_default();
        if !payload.is_empty() {
            request.push_str(&format!("{}: {}\r\n", CONTENT_LENGTH, payload.len()));
            if !headers.iter().any(|(n, _)| n.eq_ignore_ascii_case(CONTENT_TYPE)) {
                request.push_str(&format!("{}: {}\r\n", CONTENT_TYPE, http_value::TEXT_PLAIN));
            }
        }
        request.push_str("\r\n");

        let mut wire = BytesMut::from(request.as_bytes());
        wire.extend_from_slice(payload);
        log_trace!("{} {} ({} body bytes)", options.method, path, payload.len());

        if self.send(&wire).await?.is_none() {
            return Err(Error::NotConnected);
        }

        self.response = HttpResponse::default();
        if !self.read_head().await? {
            return Ok(false);
        }
        if !options.skip_body {
            self.read_body().await?;
        }
        log_trace!("{} -> {}", path, self.response.status_line);
        Ok(true)
    }

    async fn read_head(&mut self) -> Result<bool> {
        let mut first = true;
        loop {
            let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
            let mut parsed = httparse::Response::new(&mut headers);
            match parsed.parse(&self.buffer) {
                Ok(httparse::Status::Complete(len)) => {
                    let status = parsed.code.unwrap_or_default();
                    self.response.status = status;
                    self.response.status_line = format!(
                        "HTTP/1.{} {} {}",
                        parsed.version.unwrap_or(1),
                        status,
                        parsed.reason.unwrap_or_default()
                    );
                    self.response.headers = parsed
                        .headers
                        .iter()
                        .map(|h| {
                            (
                                h.name.to_string(),
                                String::from_utf8_lossy(h.value).trim().to_string(),
                            )
                        })
                        .collect();
                    self.buffer.advance(len);
                    return Ok(true);
                }
                Ok(httparse::Status::Partial) => {}
                Err(e) => {
                    return Err(Error::Other(format!("malformed HTTP response: {e}")));
                }
            }

            if self.eof {
                return Ok(false);
            }
            if !first {
                tokio::time::sleep(self.poll_delay).await;
            }
            first = false;
            self.fill().await?;
        }
    }

    async fn read_body(&mut self) -> Result<()> {
        let length = self
            .response
            .header(CONTENT_LENGTH)
            .and_then(|v| v.parse::<usize>().ok());

        loop {
            match length {
                Some(n) if self.buffer.len() >= n => {
                    self.response.body = self.buffer.split_to(n).freeze();
                    return Ok(());
                }
                _ if self.eof => {
                    self.response.body = self.buffer.split().freeze();
                    return Ok(());
                }
                _ => {}
            }
            tokio::time::sleep(self.poll_delay).await;
            self.fill().await?;
        }
    }

    /// Read once from the stream into the buffer
    async fn fill(&mut self) -> Result<usize> {
        let timeout = self.read_timeout;
        let stream = self.stream.as_mut().ok_or(Error::NotConnected)?;
        let mut chunk = [0u8; READ_CHUNK];

        let read = match timeout {
            Some(limit) => tokio::time::timeout(limit, stream.read(&mut chunk))
                .await
                .map_err(|_| Error::from(TimeoutError::Read { timeout: limit }))?,
            None => stream.read(&mut chunk).await,
        };

        match read {
            Ok(0) => {
                self.eof = true;
                Ok(0)
            }
            Ok(n) => {
                self.buffer.extend_from_slice(&chunk[..n]);
                Ok(n)
            }
            Err(e) => {
                self.eof = true;
                Err(e)
            }
        }
    }

    /// Read the next complete WebSocket message
    ///
    /// Returns `None` once the peer has closed the stream.
    pub async fn read_message(&mut self, codec: &mut FrameCodec) -> Result<Option<(Opcode, Bytes)>> {
        loop {
            if let Some(message) = codec.decode(&mut self.buffer)? {
                return Ok(Some(message));
            }
            if self.eof {
                return Ok(None);
            }
            self.fill().await?;
        }
    }

    /// Write raw bytes; `None` when there is no live connection
    pub async fn send(&mut self, data: &[u8]) -> Result<Option<usize>> {
        if self.eof {
            return Ok(None);
        }
        let Some(stream) = self.stream.as_mut() else {
            return Ok(None);
        };
        stream.write_all(data).await?;
        stream.flush().await?;
        Ok(Some(data.len()))
    }

    /// Shut the stream down; safe to call repeatedly
    pub async fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            if let Err(e) = stream.close().await {
                log_trace!("close: {}", e);
            }
        }
        self.eof = true;
    }
}

#[cfg(feature = "transport-tls")]
async fn open_tls(
    url: &SocketUrl,
    config: &ClientConfig,
    transport: &TransportConfig,
) -> Result<Box<dyn TransportStream>> {
    let tls = sockio_transport_tls::client_config(config.tls.verify);
    let stream = sockio_transport_tls::TlsStream::connect(&url.host, url.port, transport, tls).await?;
    Ok(Box::new(stream))
}

#[cfg(not(feature = "transport-tls"))]
async fn open_tls(
    url: &SocketUrl,
    _config: &ClientConfig,
    _transport: &TransportConfig,
) -> Result<Box<dyn TransportStream>> {
    Err(Error::UnsupportedTransport {
        transport: url.scheme.clone(),
    })
}
