//! Socket.IO client for SockIO
//!
//! `Client` forwards to an `Engine` and logs around every call.
//! `ClientHandle` shares one client between tasks behind an async mutex.

use crate::config::{ClientConfig, TlsConfig};
use crate::engine::{Engine, EngineState};
use crate::generation::Generation;
use serde_json::Value;
use sockio_core::{Packet, Result};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard};

/// Socket.IO client
#[derive(Debug)]
pub struct Client {
    engine: Engine,
}

impl Client {
    /// Create a client for `url`
    pub fn new(generation: Generation, url: &str, config: ClientConfig) -> Result<Self> {
        Ok(Self {
            engine: Engine::new(generation, url, config)?,
        })
    }

    /// Start building a client for `url`
    pub fn builder(url: impl Into<String>) -> ClientBuilder {
        ClientBuilder::new(url)
    }

    /// Connect to the server
    pub async fn connect(&mut self) -> Result<()> {
        log_debug!("connecting to {} as {}", self.engine.url(), self.engine.engine_name());
        self.engine.connect().await.map_err(|e| {
            log_error!("connect to {} failed: {}", self.engine.url(), e);
            e
        })
    }

    /// Close the connection
    pub async fn close(&mut self) -> Result<()> {
        log_debug!("closing connection to {}", self.engine.url());
        self.engine.close().await
    }

    /// Emit an event on the active namespace
    pub async fn emit(&mut self, event: &str, args: Value) -> Result<usize> {
        log_debug!("emitting '{}'", event);
        self.engine.emit(event, args).await.map_err(|e| {
            log_error!("emit '{}' failed: {}", event, e);
            e
        })
    }

    /// Receive the next raw message
    pub async fn read(&mut self) -> Result<Option<String>> {
        let message = self.engine.read().await?;
        if let Some(raw) = &message {
            log_debug!("read {}", raw);
        }
        Ok(message)
    }

    /// Wait for an event on the active namespace
    pub async fn wait(&mut self, event: &str) -> Result<Packet> {
        log_debug!("waiting for '{}'", event);
        self.engine.wait(event).await
    }

    /// Wait for an event, giving up after `deadline`
    pub async fn wait_timeout(&mut self, event: &str, deadline: Duration) -> Result<Packet> {
        log_debug!("waiting for '{}' up to {:?}", event, deadline);
        self.engine.wait_timeout(event, deadline).await
    }

    /// Switch namespace
    pub async fn of(&mut self, namespace: &str) -> Result<Option<Packet>> {
        log_debug!("switching to namespace '{}'", namespace);
        self.engine.of(namespace).await
    }

    /// Send a heartbeat if one is due
    pub async fn keep_alive(&mut self) -> Result<()> {
        self.engine.keep_alive().await
    }

    /// Human-readable engine name
    pub fn engine_name(&self) -> &'static str {
        self.engine.engine_name()
    }

    /// Lifecycle state
    pub fn state(&self) -> EngineState {
        self.engine.state()
    }

    /// Whether the client is connected
    pub fn is_connected(&self) -> bool {
        self.engine.is_connected()
    }

    /// Underlying engine
    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Underlying engine, mutably
    pub fn engine_mut(&mut self) -> &mut Engine {
        &mut self.engine
    }

    /// Wrap the client for sharing
    pub fn into_handle(self) -> ClientHandle {
        ClientHandle::new(self)
    }
}

/// Client builder
#[derive(Debug)]
pub struct ClientBuilder {
    url: String,
    generation: Generation,
    config: ClientConfig,
}

impl ClientBuilder {
    /// Create a new client builder; the generation defaults to 4.x
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            generation: Generation::V4X,
            config: ClientConfig::default(),
        }
    }

    /// Set the server generation
    pub fn generation(mut self, generation: Generation) -> Self {
        self.generation = generation;
        self
    }

    /// Replace the whole configuration
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the connect timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Set the delay between partial HTTP reads
    pub fn wait(mut self, wait: Duration) -> Self {
        self.config.wait = wait;
        self
    }

    /// Set the maximum frame payload
    pub fn max_payload(mut self, size: usize) -> Self {
        self.config.max_payload = size;
        self
    }

    /// Add a request header
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.headers.push((name.into(), value.into()));
        self
    }

    /// Set the namespace CONNECT payload
    pub fn auth(mut self, auth: Value) -> Self {
        self.config.auth = Some(auth);
        self
    }

    /// Toggle certificate verification
    pub fn tls_verify(mut self, verify: bool) -> Self {
        self.config.tls = TlsConfig { verify };
        self
    }

    /// Build the client
    pub fn build(self) -> Result<Client> {
        Client::new(self.generation, &self.url, self.config)
    }
}

static NEXT_HANDLE_ID: AtomicU64 = AtomicU64::new(1);

/// Shared handle to a client
pub struct ClientHandle {
    id: u64,
    client: Arc<Mutex<Client>>,
}

impl ClientHandle {
    /// Wrap a client
    pub fn new(client: Client) -> Self {
        Self {
            id: NEXT_HANDLE_ID.fetch_add(1, Ordering::Relaxed),
            client: Arc::new(Mutex::new(client)),
        }
    }

    /// Handle id, shared by clones
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Lock the client for a sequence of calls
    pub async fn lock(&self) -> MutexGuard<'_, Client> {
        self.client.lock().await
    }

    /// Lock without waiting
    pub fn try_lock(&self) -> Result<MutexGuard<'_, Client>> {
        self.client
            .try_lock()
            .map_err(|e| sockio_core::Error::Other(format!("client busy: {e}")))
    }
}

impl Clone for ClientHandle {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            client: self.client.clone(),
        }
    }
}

impl fmt::Debug for ClientHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientHandle").field("id", &self.id).finish()
    }
}
