//! Endpoint URL parsing

use http::Uri;
use sockio_core::protocol::constants::DEFAULT_PATH;
use sockio_core::{Error, Result};
use std::fmt;

/// A parsed Socket.IO endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SocketUrl {
    /// Lower-cased scheme
    pub scheme: String,
    /// Host name or address, without IPv6 brackets
    pub host: String,
    /// Port, defaulted from the scheme
    pub port: u16,
    /// Path without surrounding slashes
    pub path: String,
    /// Query pairs in their original order
    pub query: Vec<(String, String)>,
    /// Whether the connection uses TLS
    pub secure: bool,
}

impl SocketUrl {
    /// Parse an endpoint URL
    ///
    /// A missing scheme means `http`, a missing port follows the scheme
    /// (443 for `https`/`wss`, 80 otherwise) and an empty or root path
    /// becomes `socket.io`.
    pub fn parse(input: &str) -> Result<Self> {
        let input = input.trim();
        let owned;
        let input = if input.contains("://") {
            input
        } else {
            owned = format!("http://{input}");
            &owned
        };

        let uri: Uri = input
            .parse()
            .map_err(|e| Error::MalformedUrl(format!("{input}: {e}")))?;

        let scheme = uri
            .scheme_str()
            .ok_or_else(|| Error::MalformedUrl(format!("{input}: missing scheme")))?
            .to_ascii_lowercase();
        let secure = match scheme.as_str() {
            "https" | "wss" => true,
            "http" | "ws" => false,
            other => {
                return Err(Error::MalformedUrl(format!(
                    "{input}: unsupported scheme {other}"
                )))
            }
        };

        let host = uri
            .host()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| Error::MalformedUrl(format!("{input}: missing host")))?
            .trim_start_matches('[')
            .trim_end_matches(']')
            .to_string();

        let port = uri.port_u16().unwrap_or(if secure { 443 } else { 80 });

        let path = match uri.path().trim_matches('/') {
            "" => DEFAULT_PATH.to_string(),
            path => path.to_string(),
        };

        let query = uri
            .query()
            .map(|q| {
                q.split('&')
                    .filter(|pair| !pair.is_empty())
                    .map(|pair| match pair.split_once('=') {
                        Some((k, v)) => (k.to_string(), v.to_string()),
                        None => (pair.to_string(), String::new()),
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            scheme,
            host,
            port,
            path,
            query,
            secure,
        })
    }

    /// Value of the `Host` request header
    pub fn host_header(&self) -> String {
        let host = if self.host.contains(':') {
            format!("[{}]", self.host)
        } else {
            self.host.clone()
        };
        let default_port = if self.secure { 443 } else { 80 };
        if self.port == default_port {
            host
        } else {
            format!("{host}:{}", self.port)
        }
    }

    /// Query pairs joined back into `k=v&k=v` form
    pub fn query_string(&self) -> String {
        self.query
            .iter()
            .map(|(k, v)| {
                if v.is_empty() {
                    k.clone()
                } else {
                    format!("{k}={v}")
                }
            })
            .collect::<Vec<_>>()
            .join("&")
    }
}

impl fmt::Display for SocketUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}/{}", self.scheme, self.host_header(), self.path)?;
        if !self.query.is_empty() {
            write!(f, "?{}", self.query_string())?;
        }
        Ok(())
    }
}
