//! End-to-end sessions against a scripted loopback server

use bytes::BytesMut;
use serde_json::json;
use sockio::error::FrameError;
use sockio::prelude::*;
use std::future::Future;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

const TEST_DEADLINE: Duration = Duration::from_secs(10);

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// One HTTP request as the server saw it
#[derive(Debug)]
struct Request {
    method: String,
    path: String,
    headers: Vec<(String, String)>,
    body: String,
}

impl Request {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Server side of one accepted connection
struct Peer {
    stream: TcpStream,
    buffer: BytesMut,
}

impl Peer {
    async fn accept(listener: &TcpListener) -> Self {
        let (stream, _) = listener.accept().await.unwrap();
        Self {
            stream,
            buffer: BytesMut::new(),
        }
    }

    async fn fill(&mut self) {
        let mut chunk = [0u8; 4096];
        let n = self.stream.read(&mut chunk).await.unwrap();
        assert!(n > 0, "client hung up");
        self.buffer.extend_from_slice(&chunk[..n]);
    }

    async fn request(&mut self) -> Request {
        let head_end = loop {
            if let Some(pos) = self.buffer.windows(4).position(|w| w == b"\r\n\r\n") {
                break pos;
            }
            self.fill().await;
        };
        let head = String::from_utf8(self.buffer.split_to(head_end + 4).to_vec()).unwrap();
        let mut lines = head.trim_end().split("\r\n");
        let mut request_line = lines.next().unwrap().split(' ');
        let method = request_line.next().unwrap().to_string();
        let path = request_line.next().unwrap().to_string();
        let headers: Vec<(String, String)> = lines
            .filter_map(|line| line.split_once(": "))
            .map(|(n, v)| (n.to_string(), v.to_string()))
            .collect();

        let length = headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case("Content-Length"))
            .map(|(_, v)| v.parse::<usize>().unwrap())
            .unwrap_or(0);
        while self.buffer.len() < length {
            self.fill().await;
        }
        let body = String::from_utf8(self.buffer.split_to(length).to_vec()).unwrap();

        Request {
            method,
            path,
            headers,
            body,
        }
    }

    async fn respond(&mut self, status: &str, headers: &[(&str, &str)], body: &str) {
        let mut response = format!("HTTP/1.1 {status}\r\n");
        for (name, value) in headers {
            response.push_str(&format!("{name}: {value}\r\n"));
        }
        response.push_str(&format!("Content-Length: {}\r\n\r\n{}", body.len(), body));
        self.stream.write_all(response.as_bytes()).await.unwrap();
    }

    async fn switch_protocols(&mut self) {
        self.stream
            .write_all(
                b"HTTP/1.1 101 Switching Protocols\r\nUpgrade: websocket\r\nConnection: Upgrade\r\n\r\n",
            )
            .await
            .unwrap();
    }

    async fn send_frame(&mut self, frame: Frame) {
        self.stream.write_all(&frame.to_bytes()).await.unwrap();
    }

    async fn send_text(&mut self, text: &str) {
        self.send_frame(Frame::text(text.to_string())).await;
    }

    async fn frame(&mut self) -> Frame {
        loop {
            match Frame::parse(&mut self.buffer, 1 << 20) {
                Ok(frame) => return frame,
                Err(Error::Frame(FrameError::InsufficientData { .. })) => self.fill().await,
                Err(e) => panic!("bad client frame: {e}"),
            }
        }
    }

    async fn text(&mut self) -> String {
        let frame = self.frame().await;
        assert!(frame.masked, "client frames must be masked");
        assert_eq!(frame.opcode, Opcode::Text);
        String::from_utf8(frame.payload.to_vec()).unwrap()
    }
}

async fn listen() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}/", listener.local_addr().unwrap());
    (listener, url)
}

fn config() -> ClientConfig {
    ClientConfig::default().wait(Duration::from_millis(1))
}

fn length_prefixed(records: &[&str]) -> String {
    records
        .iter()
        .map(|r| format!("{}:{}", r.chars().count(), r))
        .collect()
}

async fn within<T>(future: impl Future<Output = T>) -> T {
    tokio::time::timeout(TEST_DEADLINE, future)
        .await
        .expect("test timed out")
}

async fn finish(server: JoinHandle<()>) {
    within(server).await.unwrap();
}

#[tokio::test]
async fn test_v2_session_roundtrip() {
    init_tracing();
    let (listener, url) = listen().await;

    let server = tokio::spawn(async move {
        let mut peer = Peer::accept(&listener).await;
        let handshake = peer.request().await;
        assert_eq!(handshake.method, "GET");
        assert!(handshake
            .path
            .starts_with("/socket.io/?EIO=3&transport=polling&t="));
        let open = r#"0{"sid":"abc","upgrades":["websocket"],"pingInterval":25000,"pingTimeout":5000}"#;
        peer.respond(
            "200 OK",
            &[("Set-Cookie", "io=abc; Path=/; HttpOnly")],
            &length_prefixed(&[open, "40"]),
        )
        .await;

        let mut peer = Peer::accept(&listener).await;
        let upgrade = peer.request().await;
        assert!(upgrade
            .path
            .starts_with("/socket.io/?EIO=3&transport=websocket&sid=abc"));
        assert_eq!(upgrade.header("Upgrade"), Some("websocket"));
        assert_eq!(upgrade.header("Sec-WebSocket-Version"), Some("13"));
        assert_eq!(upgrade.header("Cookie"), Some("io=abc"));
        assert_eq!(upgrade.header("Origin"), Some("*"));
        peer.switch_protocols().await;

        assert_eq!(peer.text().await, "5");
        peer.send_text(r#"42/other,["hello",1]"#).await;
        peer.send_text(r#"42["hello",{"a":1}]"#).await;

        assert_eq!(peer.text().await, r#"42["reply",[1]]"#);
        assert_eq!(peer.text().await, "1");
    });

    within(async {
        let mut client = Client::builder(url)
            .generation(Generation::V2X)
            .config(config().max_payload(15))
            .build()
            .unwrap();

        client.connect().await.unwrap();
        assert!(client.is_connected());
        let session = client.engine().session().unwrap();
        assert_eq!(session.id(), "abc");
        assert_eq!(session.ping_timeout(), Duration::from_secs(5));
        assert_eq!(
            client.engine().timeout(),
            TimeoutPolicy::FromSession(Duration::from_secs(5))
        );

        let packet = client.wait("hello").await.unwrap();
        assert_eq!(packet.as_event(), Some(("hello", &json!({ "a": 1 }))));

        // exactly max_payload bytes on the wire
        assert_eq!(client.emit("reply", json!([1])).await.unwrap(), 21);

        let err = client
            .emit("reply", json!(["does not fit in one frame"]))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::PayloadTooLarge { fragments, .. } if fragments > 1));
        assert!(err.is_recoverable());
        assert!(client.is_connected());

        client.close().await.unwrap();
        assert_eq!(client.state(), EngineState::Disconnected);
        assert!(client.engine().session().is_none());
    })
    .await;

    finish(server).await;
}

#[tokio::test]
async fn test_v1_drains_stray_frame_after_upgrade() {
    let (listener, url) = listen().await;

    let server = tokio::spawn(async move {
        let mut peer = Peer::accept(&listener).await;
        let handshake = peer.request().await;
        assert!(handshake.path.starts_with("/socket.io/?EIO=2&transport=polling"));
        let open = r#"0{"sid":"v1","upgrades":["websocket"],"pingInterval":25000,"pingTimeout":5000}"#;
        peer.respond("200 OK", &[], &length_prefixed(&[open])).await;

        let mut peer = Peer::accept(&listener).await;
        peer.request().await;
        peer.switch_protocols().await;
        assert_eq!(peer.text().await, "5");
        peer.send_text("40").await;
        peer.send_text(r#"42["welcome"]"#).await;
        assert_eq!(peer.text().await, "1");
    });

    within(async {
        let mut client = Client::new(Generation::V1X, &url, config()).unwrap();
        client.connect().await.unwrap();
        assert_eq!(
            client.read().await.unwrap().as_deref(),
            Some(r#"42["welcome"]"#)
        );
        client.close().await.unwrap();
    })
    .await;

    finish(server).await;
}

#[tokio::test]
async fn test_v4_namespace_connect_and_heartbeat() {
    init_tracing();
    let (listener, url) = listen().await;

    let server = tokio::spawn(async move {
        let mut peer = Peer::accept(&listener).await;
        let handshake = peer.request().await;
        assert!(handshake.path.starts_with("/socket.io/?EIO=4&transport=polling"));
        peer.respond(
            "200 OK",
            &[("Set-Cookie", "io=s4")],
            r#"0{"sid":"s4","upgrades":["websocket"],"pingInterval":1,"pingTimeout":5000,"maxPayload":1000000}"#,
        )
        .await;

        let mut peer = Peer::accept(&listener).await;
        let connect = peer.request().await;
        assert_eq!(connect.method, "POST");
        assert!(connect.path.contains("&sid=s4"));
        assert_eq!(connect.body, r#"40{"token":"abc"}"#);
        assert_eq!(connect.header("Cookie"), Some("io=s4"));
        assert_eq!(
            connect.header("Content-Type"),
            Some("text/plain;charset=UTF-8")
        );
        peer.respond("200 OK", &[], "ok").await;

        let mut peer = Peer::accept(&listener).await;
        let confirm = peer.request().await;
        assert_eq!(confirm.method, "GET");
        assert!(confirm.path.contains("&sid=s4"));
        peer.respond("200 OK", &[], r#"40{"sid":"ns-1"}"#).await;

        let mut peer = Peer::accept(&listener).await;
        let upgrade = peer.request().await;
        assert!(upgrade
            .path
            .starts_with("/socket.io/?EIO=4&transport=websocket&sid=s4"));
        peer.switch_protocols().await;
        assert_eq!(peer.text().await, "5");

        // the ping interval has long elapsed, so a heartbeat precedes the event
        assert_eq!(peer.text().await, "2");
        assert_eq!(peer.text().await, r#"42["hi",["x"]]"#);

        peer.send_frame(Frame::new(Opcode::Ping, "probe")).await;
        peer.send_text(r#"42["ack",true]"#).await;

        let pong = peer.frame().await;
        assert_eq!(pong.opcode, Opcode::Pong);
        assert!(pong.masked);
        assert_eq!(&pong.payload[..], b"probe");

        peer.send_frame(Frame::close(Some(1000), None)).await;
    });

    within(async {
        let mut client = Client::builder(url)
            .generation(Generation::V4X)
            .wait(Duration::from_millis(1))
            .auth(json!({ "token": "abc" }))
            .build()
            .unwrap();

        client.connect().await.unwrap();
        assert_eq!(client.engine().namespace_sid(), Some("ns-1"));
        assert_eq!(client.engine().cookies(), ["io=s4".to_string()]);

        client.emit("hi", json!(["x"])).await.unwrap();
        let ack = client.wait("ack").await.unwrap();
        assert_eq!(ack.as_event(), Some(("ack", &json!(true))));

        assert_eq!(client.read().await.unwrap(), None);
        assert!(!client.is_connected());

        client.close().await.unwrap();
        assert_eq!(client.state(), EngineState::Disconnected);
    })
    .await;

    finish(server).await;
}

#[tokio::test]
async fn test_v4_namespace_ack_without_sid() {
    let (listener, url) = listen().await;

    let server = tokio::spawn(async move {
        let mut peer = Peer::accept(&listener).await;
        peer.request().await;
        peer.respond(
            "200 OK",
            &[],
            r#"0{"sid":"s4","upgrades":["websocket"],"pingInterval":25000,"pingTimeout":5000}"#,
        )
        .await;

        let mut peer = Peer::accept(&listener).await;
        assert_eq!(peer.request().await.body, "40");
        peer.respond("200 OK", &[], "ok").await;

        let mut peer = Peer::accept(&listener).await;
        peer.request().await;
        peer.respond("200 OK", &[], "40").await;

        let mut peer = Peer::accept(&listener).await;
        let upgrade = peer.request().await;
        assert!(upgrade
            .path
            .starts_with("/socket.io/?EIO=4&transport=websocket&sid=s4"));
        peer.switch_protocols().await;
        assert_eq!(peer.text().await, "5");
        assert_eq!(peer.text().await, "1");
    });

    within(async {
        let mut client = Client::new(Generation::V4X, &url, config()).unwrap();
        client.connect().await.unwrap();
        assert!(client.is_connected());
        assert_eq!(client.engine().session().unwrap().id(), "s4");
        assert_eq!(client.engine().namespace_sid(), None);
        client.close().await.unwrap();
    })
    .await;

    finish(server).await;
}

#[tokio::test]
async fn test_v4_rejected_namespace() {
    let (listener, url) = listen().await;

    let server = tokio::spawn(async move {
        let mut peer = Peer::accept(&listener).await;
        peer.request().await;
        peer.respond(
            "200 OK",
            &[],
            r#"0{"sid":"s4","upgrades":["websocket"],"pingInterval":25000,"pingTimeout":5000}"#,
        )
        .await;

        let mut peer = Peer::accept(&listener).await;
        let connect = peer.request().await;
        assert_eq!(connect.body, "40/admin,");
        peer.respond("200 OK", &[], "ok").await;

        let mut peer = Peer::accept(&listener).await;
        peer.request().await;
        peer.respond("200 OK", &[], r#"44/admin,{"message":"Not authorized"}"#)
            .await;
    });

    within(async {
        let mut client = Client::new(Generation::V4X, &url, config()).unwrap();
        client.of("/admin").await.unwrap();

        let err = client.connect().await.unwrap_err();
        match err {
            Error::ServerConnectionFailure { step, status } => {
                assert!(step.contains("Not authorized"));
                assert_eq!(status, 200);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(client.state(), EngineState::Disconnected);
    })
    .await;

    finish(server).await;
}

#[tokio::test]
async fn test_upgrade_rejected() {
    let (listener, url) = listen().await;

    let server = tokio::spawn(async move {
        let mut peer = Peer::accept(&listener).await;
        peer.request().await;
        let open = r#"0{"sid":"abc","upgrades":["websocket"],"pingInterval":25000,"pingTimeout":5000}"#;
        peer.respond("200 OK", &[], &length_prefixed(&[open])).await;

        let mut peer = Peer::accept(&listener).await;
        peer.request().await;
        peer.respond("400 Bad Request", &[], "").await;
    });

    within(async {
        let mut client = Client::new(Generation::V2X, &url, config()).unwrap();
        let err = client.connect().await.unwrap_err();
        assert!(matches!(
            err,
            Error::ServerConnectionFailure { ref step, status: 400 } if step == "upgrade"
        ));
        assert_eq!(client.state(), EngineState::Disconnected);
        assert!(client.engine().session().is_none());
        assert!(client.engine().cookies().is_empty());
    })
    .await;

    finish(server).await;
}

#[tokio::test]
async fn test_unsupported_transport() {
    let (listener, url) = listen().await;

    let server = tokio::spawn(async move {
        let mut peer = Peer::accept(&listener).await;
        peer.request().await;
        let open = r#"0{"sid":"abc","upgrades":["polling"],"pingInterval":25000,"pingTimeout":5000}"#;
        peer.respond("200 OK", &[], &length_prefixed(&[open])).await;
    });

    within(async {
        let mut client = Client::new(Generation::V2X, &url, config()).unwrap();
        let err = client.connect().await.unwrap_err();
        assert!(matches!(
            err,
            Error::UnsupportedTransport { ref transport } if transport == "websocket"
        ));
        assert_eq!(client.state(), EngineState::Disconnected);
    })
    .await;

    finish(server).await;
}

#[tokio::test]
async fn test_handshake_status_failure() {
    let (listener, url) = listen().await;

    let server = tokio::spawn(async move {
        let mut peer = Peer::accept(&listener).await;
        peer.request().await;
        peer.respond("503 Service Unavailable", &[], "").await;
    });

    within(async {
        let mut client = Client::new(Generation::V3X, &url, config()).unwrap();
        let err = client.connect().await.unwrap_err();
        assert!(matches!(
            err,
            Error::ServerConnectionFailure { status: 503, .. }
        ));
    })
    .await;

    finish(server).await;
}

#[tokio::test]
async fn test_legacy_session() {
    let (listener, url) = listen().await;

    let server = tokio::spawn(async move {
        let mut peer = Peer::accept(&listener).await;
        let handshake = peer.request().await;
        assert!(handshake.path.starts_with("/socket.io/1/?t="));
        peer.respond("200 OK", &[], "abc123:15:10:websocket,xhr-polling")
            .await;

        let mut peer = Peer::accept(&listener).await;
        let upgrade = peer.request().await;
        assert_eq!(upgrade.path, "/socket.io/1/websocket/abc123");
        peer.switch_protocols().await;

        peer.send_text("3:::plain text").await;
        peer.send_text(r#"5:::{"name":"news","args":[{"hello":"world"}]}"#)
            .await;

        let emitted = Packet::decode(Dialect::Legacy, &peer.text().await).unwrap();
        assert_eq!(
            emitted.as_event(),
            Some(("my other event", &json!([{ "my": "data" }])))
        );
        assert_eq!(peer.text().await, "0::");
    });

    within(async {
        let mut client = Client::new(Generation::V0X, &url, config()).unwrap();
        assert_eq!(client.engine_name(), "SocketIO Version 0.X");

        client.connect().await.unwrap();
        let session = client.engine().session().unwrap();
        assert_eq!(session.ping_interval(), Duration::from_secs(15));
        assert_eq!(session.ping_timeout(), Duration::from_secs(10));

        let news = client.wait("news").await.unwrap();
        assert_eq!(
            news.as_event(),
            Some(("news", &json!([{ "hello": "world" }])))
        );

        client
            .emit("my other event", json!([{ "my": "data" }]))
            .await
            .unwrap();

        client.close().await.unwrap();
        client.close().await.unwrap();
        assert_eq!(client.state(), EngineState::Disconnected);
    })
    .await;

    finish(server).await;
}

#[tokio::test]
async fn test_wait_timeout() {
    let (listener, url) = listen().await;

    let server = tokio::spawn(async move {
        let mut peer = Peer::accept(&listener).await;
        peer.request().await;
        let open = r#"0{"sid":"abc","upgrades":["websocket"],"pingInterval":25000,"pingTimeout":5000}"#;
        peer.respond("200 OK", &[], &length_prefixed(&[open])).await;

        let mut peer = Peer::accept(&listener).await;
        peer.request().await;
        peer.switch_protocols().await;
        assert_eq!(peer.text().await, "5");
        peer.send_text(r#"42["other"]"#).await;
        assert_eq!(peer.text().await, "1");
    });

    within(async {
        let mut client = Client::new(Generation::V2X, &url, config()).unwrap();
        client.connect().await.unwrap();

        let err = client
            .wait_timeout("never", Duration::from_millis(200))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Timeout(_)));
        assert!(client.is_connected());
        client.close().await.unwrap();
    })
    .await;

    finish(server).await;
}

#[tokio::test]
async fn test_shared_handle() {
    let handle = Client::builder("http://127.0.0.1:9/")
        .build()
        .unwrap()
        .into_handle();

    let tasks: Vec<_> = (0..4)
        .map(|_| {
            let handle = handle.clone();
            tokio::spawn(async move {
                let mut client = handle.lock().await;
                client.close().await.unwrap();
                client.state()
            })
        })
        .collect();

    for task in tasks {
        assert_eq!(task.await.unwrap(), EngineState::Disconnected);
    }
}
