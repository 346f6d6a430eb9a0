//! Protocol engine
//!
//! The engine walks `Disconnected -> Handshaking -> (NamespaceConnecting)
//! -> Upgrading -> Connected`. Until the upgrade completes every HTTP
//! exchange uses a fresh `TransportSocket`; afterwards the upgraded socket
//! carries WebSocket frames until `close()`.
//!
//! There are no background tasks. Heartbeats go out when the caller emits,
//! switches namespace or calls `keep_alive()`.

use crate::config::{ClientConfig, TimeoutPolicy};
use crate::generation::Generation;
use crate::nonce;
use crate::socket::{RequestOptions, TransportSocket};
use crate::url::SocketUrl;
use serde_json::Value;
use sockio_core::error::{PacketError, TimeoutError};
use sockio_core::handshake::parse_cookies;
use sockio_core::packet::decode_payload;
use sockio_core::protocol::http_header::{COOKIE, SET_COOKIE};
use sockio_core::protocol::http_status::{OK, SWITCHING_PROTOCOLS};
use sockio_core::protocol::Opcode;
use sockio_core::{
    Dialect, Error, Frame, FrameCodec, HandshakeData, Packet, Result, Session, SocketPacket,
    UpgradeRequest,
};
use std::time::{Duration, Instant};

/// Engine lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// No session
    Disconnected,
    /// Polling handshake in progress
    Handshaking,
    /// Namespace CONNECT round trip in progress
    NamespaceConnecting,
    /// WebSocket upgrade in progress
    Upgrading,
    /// Upgraded and ready
    Connected,
}

/// Engine.IO / Socket.IO client engine for one server generation
#[derive(Debug)]
pub struct Engine {
    generation: Generation,
    protocol: u8,
    config: ClientConfig,
    url: SocketUrl,
    state: EngineState,
    session: Option<Session>,
    socket: Option<TransportSocket>,
    cookies: Vec<String>,
    namespace: String,
    timeout: TimeoutPolicy,
    codec: FrameCodec,
    last_socket_at: Option<Instant>,
}

impl Engine {
    /// Create an engine for `url`
    ///
    /// Fails with `MalformedUrl` or a configuration error; nothing is
    /// connected yet.
    pub fn new(generation: Generation, url: &str, config: ClientConfig) -> Result<Self> {
        config.validate()?;
        let url = SocketUrl::parse(url)?;
        let protocol = config.version.unwrap_or_else(|| generation.protocol());
        let codec = FrameCodec::new(config.max_payload).with_max_message_size(config.max_message_size);
        let timeout = TimeoutPolicy::Default(config.timeout);

        Ok(Self {
            generation,
            protocol,
            config,
            url,
            state: EngineState::Disconnected,
            session: None,
            socket: None,
            cookies: Vec::new(),
            namespace: String::new(),
            timeout,
            codec,
            last_socket_at: None,
        })
    }

    /// Server generation
    pub fn generation(&self) -> Generation {
        self.generation
    }

    /// Engine.IO protocol number in use
    pub fn protocol(&self) -> u8 {
        self.protocol
    }

    /// Human-readable engine name
    pub fn engine_name(&self) -> &'static str {
        self.generation.engine_name()
    }

    /// Lifecycle state
    pub fn state(&self) -> EngineState {
        self.state
    }

    /// Whether the engine is upgraded and its socket is alive
    pub fn is_connected(&self) -> bool {
        self.state == EngineState::Connected
            && self.socket.as_ref().is_some_and(TransportSocket::is_connected)
    }

    /// Current session
    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    /// Sid assigned by the namespace CONNECT reply
    pub fn namespace_sid(&self) -> Option<&str> {
        self.session.as_ref().and_then(Session::namespace_sid)
    }

    /// Active namespace
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Cookies captured during the handshake
    pub fn cookies(&self) -> &[String] {
        &self.cookies
    }

    /// Read deadline currently in effect
    pub fn timeout(&self) -> TimeoutPolicy {
        self.timeout
    }

    /// Parsed endpoint
    pub fn url(&self) -> &SocketUrl {
        &self.url
    }

    /// Configuration
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Handshake, connect the namespace where required, then upgrade
    ///
    /// Does nothing when already connected. On failure the engine is torn
    /// down to `Disconnected` and can be connected again.
    #[cfg_attr(feature = "logging", tracing::instrument(skip(self), fields(url = %self.url)))]
    pub async fn connect(&mut self) -> Result<()> {
        if self.state == EngineState::Connected {
            return Ok(());
        }

        self.timeout = TimeoutPolicy::Default(self.config.timeout);
        match self.establish().await {
            Ok(()) => {
                self.state = EngineState::Connected;
                log_debug!("{} connected", self.engine_name());
                Ok(())
            }
            Err(e) => {
                log_error!("connect failed during {:?}: {}", self.state, e);
                self.teardown().await;
                Err(e)
            }
        }
    }

    async fn establish(&mut self) -> Result<()> {
        self.state = EngineState::Handshaking;
        self.handshake().await?;

        if self.generation.requires_namespace_connect() {
            self.state = EngineState::NamespaceConnecting;
            self.connect_namespace().await?;
        }

        self.state = EngineState::Upgrading;
        self.upgrade().await
    }

    async fn handshake(&mut self) -> Result<()> {
        let uri = self.polling_uri(None);
        let headers = self.request_headers();
        let socket = self.open_socket().await?;

        let received = socket
            .send_request(&uri, &headers, RequestOptions::get())
            .await?;
        let response = socket.response().clone();
        if !received || response.status != OK {
            return Err(Error::server_failure("handshake", response.status));
        }

        let cookies = parse_cookies(response.header_values(SET_COOKIE));
        let data = if self.generation.legacy_handshake() {
            HandshakeData::decode_legacy(&String::from_utf8_lossy(&response.body))?
        } else {
            HandshakeData::decode_payload(&response.body, self.protocol)?
        };

        if !data.supports(&self.config.transport) {
            return Err(Error::UnsupportedTransport {
                transport: self.config.transport.clone(),
            });
        }

        log_debug!(
            "handshake sid={} ping_interval={:?} ping_timeout={:?}",
            data.sid,
            data.ping_interval,
            data.ping_timeout
        );

        self.cookies = cookies;
        self.timeout = TimeoutPolicy::FromSession(data.ping_timeout);
        self.session = Some(Session::from_handshake(data));
        Ok(())
    }

    async fn connect_namespace(&mut self) -> Result<()> {
        let sid = self.session_id()?;
        let uri = self.polling_uri(Some(&sid));
        let headers = self.request_headers();

        let connect = Packet::Message(SocketPacket::connect(
            self.namespace.clone(),
            self.config.auth.clone(),
        ))
        .encode(Dialect::Modern)?;

        let socket = self.open_socket().await?;
        let received = socket
            .send_request(&uri, &headers, RequestOptions::post(connect.as_bytes()))
            .await?;
        if !received || socket.response().status != OK {
            return Err(Error::server_failure(
                "namespace connect",
                socket.response().status,
            ));
        }

        let uri = self.polling_uri(Some(&sid));
        let socket = self.open_socket().await?;
        let received = socket
            .send_request(&uri, &headers, RequestOptions::get())
            .await?;
        let response = socket.response().clone();
        if !received || response.status != OK {
            return Err(Error::server_failure("namespace confirm", response.status));
        }

        let status = response.status;
        let packets = decode_payload(&response.body, self.protocol)?;
        let namespace = self.namespace.clone();
        for packet in packets {
            match packet {
                Packet::Message(SocketPacket::Connect { namespace: ns, data })
                    if sockio_core::packet::namespace_matches(&ns, &namespace) =>
                {
                    let namespace_sid = data
                        .as_ref()
                        .and_then(|d| d.get("sid"))
                        .and_then(Value::as_str)
                        .map(str::to_string);
                    match namespace_sid {
                        Some(ns_sid) => {
                            log_debug!("namespace '{}' connected sid={}", namespace, ns_sid);
                            self.session = self
                                .session
                                .take()
                                .map(|session| session.with_namespace_sid(ns_sid));
                        }
                        None => log_debug!("namespace '{}' connected", namespace),
                    }
                    return Ok(());
                }
                Packet::Message(SocketPacket::Error { data, .. }) => {
                    let reason = data
                        .as_ref()
                        .and_then(|d| d.get("message").and_then(Value::as_str).map(str::to_string))
                        .or_else(|| data.as_ref().map(Value::to_string))
                        .unwrap_or_default();
                    log_error!("namespace '{}' rejected: {}", namespace, reason);
                    return Err(Error::server_failure(
                        format!("namespace connect rejected: {reason}"),
                        status,
                    ));
                }
                _ => {}
            }
        }

        Err(Error::server_failure("namespace confirm", status))
    }

    async fn upgrade(&mut self) -> Result<()> {
        let sid = self.session_id()?;
        let legacy = self.generation.legacy_handshake();
        let uri = if legacy {
            format!("/{}/{}/websocket/{}", self.url.path, self.protocol, sid)
        } else {
            let mut uri = format!(
                "/{}/?EIO={}&transport={}&sid={}",
                self.url.path, self.protocol, self.config.transport, sid
            );
            self.append_user_query(&mut uri);
            uri
        };

        let request = UpgradeRequest::new(uri.clone(), legacy)
            .with_headers(&self.config.headers)
            .with_cookies(&self.cookies);

        let socket = self.open_socket().await?;
        let received = socket
            .send_request(&uri, &request.headers(), RequestOptions::get().skip_body())
            .await?;
        if !received || socket.response().status != SWITCHING_PROTOCOLS {
            return Err(Error::server_failure("upgrade", socket.response().status));
        }
        self.codec.reset();

        if !legacy {
            self.write_packet(&Packet::Upgrade).await?;
            if self.protocol == 2 {
                // EIO 2 servers repeat the connect ack after the switch
                let stray = self.read_raw().await?;
                log_trace!("discarded after upgrade: {:?}", stray);
            }
        }
        Ok(())
    }

    /// Close the session; does nothing when already disconnected
    #[cfg_attr(feature = "logging", tracing::instrument(skip(self)))]
    pub async fn close(&mut self) -> Result<()> {
        if self.state == EngineState::Disconnected && self.socket.is_none() {
            return Ok(());
        }

        if self.is_connected() {
            if let Err(e) = self.write_packet(&Packet::Close).await {
                log_trace!("close packet not sent: {}", e);
            }
        }
        self.teardown().await;
        log_debug!("{} closed", self.engine_name());
        Ok(())
    }

    async fn teardown(&mut self) {
        if let Some(mut socket) = self.socket.take() {
            socket.close().await;
        }
        self.session = None;
        self.cookies.clear();
        self.codec.reset();
        self.state = EngineState::Disconnected;
    }

    /// Emit `event` with `args` on the active namespace
    ///
    /// Returns the number of bytes written. A payload that does not fit in
    /// one frame fails with `PayloadTooLarge` and nothing is sent.
    #[cfg_attr(feature = "logging", tracing::instrument(skip(self, args)))]
    pub async fn emit(&mut self, event: &str, args: Value) -> Result<usize> {
        if !self.is_connected() {
            return Err(Error::NotConnected);
        }
        self.keep_alive().await?;

        let packet = Packet::Message(SocketPacket::event(self.namespace.clone(), event, args));
        self.write_packet(&packet).await
    }

    /// Receive the next message payload
    ///
    /// WebSocket pings are answered on the way. Returns `None` when not
    /// connected or once the server closes the connection.
    pub async fn read(&mut self) -> Result<Option<String>> {
        if !self.is_connected() {
            return Ok(None);
        }
        self.read_raw().await
    }

    async fn read_raw(&mut self) -> Result<Option<String>> {
        loop {
            let socket = self.socket.as_mut().ok_or(Error::NotConnected)?;
            let Some((opcode, payload)) = socket.read_message(&mut self.codec).await? else {
                return Ok(None);
            };

            match opcode {
                Opcode::Ping => {
                    let pong = Frame::pong(payload).mask(true).to_bytes();
                    socket.send(&pong).await?;
                }
                Opcode::Pong => {}
                Opcode::Close => {
                    log_debug!("server closed the connection");
                    socket.close().await;
                    return Ok(None);
                }
                _ => {
                    #[cfg(feature = "metrics")]
                    metrics::counter!("sockio_client_packets_received_total").increment(1);

                    let text = String::from_utf8_lossy(&payload).into_owned();
                    log_trace!("received {}", text);
                    return Ok(Some(text));
                }
            }
        }
    }

    /// Read until `event` arrives on the active namespace
    ///
    /// Other packets, including undecodable ones, are dropped. Read
    /// timeouts only trigger a heartbeat check; use `wait_timeout` for a
    /// bounded wait.
    #[cfg_attr(feature = "logging", tracing::instrument(skip(self)))]
    pub async fn wait(&mut self, event: &str) -> Result<Packet> {
        let dialect = self.generation.dialect();
        loop {
            let raw = match self.read().await {
                Ok(Some(raw)) => raw,
                Ok(None) => return Err(Error::NotConnected),
                Err(Error::Timeout(_)) => {
                    self.keep_alive().await?;
                    continue;
                }
                Err(e) => return Err(e),
            };

            match Packet::decode(dialect, &raw) {
                Ok(packet) if packet.is_event(event, &self.namespace) => return Ok(packet),
                Ok(packet) => log_trace!("skipping {:?}", packet),
                Err(e) => log_trace!("skipping undecodable {:?}: {}", raw, e),
            }
        }
    }

    /// `wait` bounded by `deadline`
    pub async fn wait_timeout(&mut self, event: &str, deadline: Duration) -> Result<Packet> {
        match tokio::time::timeout(deadline, self.wait(event)).await {
            Ok(result) => result,
            Err(_) => Err(TimeoutError::Wait {
                event: event.to_string(),
                timeout: deadline,
            }
            .into()),
        }
    }

    /// Switch the active namespace
    ///
    /// When connected on 1.x and later a CONNECT packet is sent and the
    /// reply packet returned. Otherwise the namespace only applies to later
    /// sends and to the next `connect()`.
    #[cfg_attr(feature = "logging", tracing::instrument(skip(self)))]
    pub async fn of(&mut self, namespace: &str) -> Result<Option<Packet>> {
        self.namespace = namespace.to_string();
        if !self.generation.connects_namespaces() || !self.is_connected() {
            return Ok(None);
        }

        self.keep_alive().await?;
        let auth = if self.generation.requires_namespace_connect() {
            self.config.auth.clone()
        } else {
            None
        };
        let connect = Packet::Message(SocketPacket::connect(namespace, auth));
        self.write_packet(&connect).await?;

        match self.read().await? {
            Some(raw) => Ok(Some(Packet::decode(self.generation.dialect(), &raw)?)),
            None => Ok(None),
        }
    }

    /// Send a heartbeat if the ping interval has elapsed
    pub async fn keep_alive(&mut self) -> Result<()> {
        if !self.is_connected() {
            return Ok(());
        }
        let due = self.session.as_ref().is_some_and(Session::needs_heartbeat);
        if !due {
            return Ok(());
        }

        self.write_packet(&Packet::Ping(None)).await?;
        if let Some(session) = self.session.as_mut() {
            session.mark_heartbeat();
        }
        log_trace!("heartbeat sent");

        #[cfg(feature = "metrics")]
        metrics::counter!("sockio_client_heartbeats_total").increment(1);

        Ok(())
    }

    async fn write_packet(&mut self, packet: &Packet) -> Result<usize> {
        let payload = packet.encode(self.generation.dialect())?;
        let frames = self.codec.encode(Opcode::Text, payload.as_bytes());
        if frames.len() > 1 {
            return Err(Error::PayloadTooLarge {
                size: payload.len(),
                max: self.codec.max_payload(),
                fragments: frames.len(),
            });
        }

        let socket = self.socket.as_mut().ok_or(Error::NotConnected)?;
        let mut written = 0;
        for frame in &frames {
            written += socket.send(frame).await?.ok_or(Error::NotConnected)?;
        }
        log_trace!("sent {}", payload);

        #[cfg(feature = "metrics")]
        {
            metrics::counter!("sockio_client_packets_sent_total").increment(1);
            metrics::counter!("sockio_client_bytes_sent_total").increment(written as u64);
        }

        Ok(written)
    }

    /// Replace the current socket with a fresh connection
    async fn open_socket(&mut self) -> Result<&mut TransportSocket> {
        if let Some(mut previous) = self.socket.take() {
            previous.close().await;
        }

        if self.generation.throttles_reconnect() {
            if let Some(last) = self.last_socket_at {
                let elapsed = last.elapsed();
                if elapsed < self.config.reuse_delay {
                    tokio::time::sleep(self.config.reuse_delay - elapsed).await;
                }
            }
        }

        let socket =
            TransportSocket::open(&self.url, &self.config, self.timeout.read_deadline()).await;
        self.last_socket_at = Some(socket.created_at());
        socket.ensure_open()?;
        Ok(self.socket.insert(socket))
    }

    fn session_id(&self) -> Result<String> {
        self.session
            .as_ref()
            .map(|s| s.id().to_string())
            .ok_or(Error::Packet(PacketError::MissingOpen))
    }

    fn polling_uri(&self, sid: Option<&str>) -> String {
        let mut uri = if self.generation.legacy_handshake() {
            format!("/{}/{}/?t={}", self.url.path, self.protocol, nonce::next())
        } else {
            format!(
                "/{}/?EIO={}&transport=polling&t={}",
                self.url.path,
                self.protocol,
                nonce::next()
            )
        };
        if self.config.use_b64 {
            uri.push_str("&b64=1");
        }
        if let Some(sid) = sid {
            uri.push_str("&sid=");
            uri.push_str(sid);
        }
        self.append_user_query(&mut uri);
        uri
    }

    fn append_user_query(&self, uri: &mut String) {
        let query = self.url.query_string();
        if !query.is_empty() {
            uri.push('&');
            uri.push_str(&query);
        }
    }

    fn request_headers(&self) -> Vec<(String, String)> {
        let mut headers = self.config.headers.clone();
        if !self.cookies.is_empty() {
            headers.push((COOKIE.to_string(), self.cookies.join("; ")));
        }
        headers
    }
}
