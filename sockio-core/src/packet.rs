//! Engine.IO / Socket.IO packet codec
//!
//! Two dialects share one decoded shape. The modern dialect (1.x and later)
//! prefixes every Engine.IO packet with a single digit frame type and, for
//! messages, a Socket.IO packet type digit:
//!
//! ```text
//! 4 2 /chat , 12 ["event",{"a":1}]
//! | |   |        |   `-- JSON data
//! | |   |        `------ optional ack id
//! | |   `--------------- optional namespace, terminated by ','
//! | `------------------- Socket.IO packet type (event)
//! `--------------------- Engine.IO frame type (message)
//! ```
//!
//! The legacy dialect (0.x) uses `type:id:endpoint:data` records.

use crate::cursor::SequenceReader;
use crate::error::PacketError;
use crate::protocol::constants::RECORD_SEPARATOR;
use serde_json::{json, Value};

/// Packet grammar family
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    /// Socket.IO 0.x colon-delimited records
    Legacy,
    /// Engine.IO 2 and later digit-prefixed packets
    Modern,
}

/// Engine.IO transport frame types (1.x and later)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FrameType {
    /// Handshake open
    Open = 0,
    /// Close transport
    Close = 1,
    /// Heartbeat ping
    Ping = 2,
    /// Heartbeat pong
    Pong = 3,
    /// Socket.IO payload
    Message = 4,
    /// Transport upgrade
    Upgrade = 5,
    /// No operation
    Noop = 6,
}

impl FrameType {
    /// Parse a frame type digit
    pub fn from_char(c: char) -> Option<Self> {
        match c {
            '0' => Some(FrameType::Open),
            '1' => Some(FrameType::Close),
            '2' => Some(FrameType::Ping),
            '3' => Some(FrameType::Pong),
            '4' => Some(FrameType::Message),
            '5' => Some(FrameType::Upgrade),
            '6' => Some(FrameType::Noop),
            _ => None,
        }
    }

    /// Wire digit
    pub fn code(self) -> u8 {
        self as u8
    }
}

/// Socket.IO 0.x frame types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LegacyFrameType {
    /// Disconnect
    Close = 0,
    /// Connect to an endpoint
    Open = 1,
    /// Heartbeat
    Heartbeat = 2,
    /// Plain message
    Message = 3,
    /// JSON message
    JsonMessage = 4,
    /// Named event
    Event = 5,
    /// Acknowledgement
    Ack = 6,
    /// Error
    Error = 7,
    /// No operation
    Noop = 8,
}

impl LegacyFrameType {
    /// Parse a frame type field
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "0" => Some(LegacyFrameType::Close),
            "1" => Some(LegacyFrameType::Open),
            "2" => Some(LegacyFrameType::Heartbeat),
            "3" => Some(LegacyFrameType::Message),
            "4" => Some(LegacyFrameType::JsonMessage),
            "5" => Some(LegacyFrameType::Event),
            "6" => Some(LegacyFrameType::Ack),
            "7" => Some(LegacyFrameType::Error),
            "8" => Some(LegacyFrameType::Noop),
            _ => None,
        }
    }

    /// Wire value
    pub fn code(self) -> u8 {
        self as u8
    }
}

/// Socket.IO packet types carried inside message frames
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PacketType {
    /// Namespace connect
    Connect = 0,
    /// Namespace disconnect
    Disconnect = 1,
    /// Named event
    Event = 2,
    /// Acknowledgement
    Ack = 3,
    /// Error / connect error
    Error = 4,
    /// Event with binary attachments
    BinaryEvent = 5,
    /// Ack with binary attachments
    BinaryAck = 6,
}

impl PacketType {
    /// Parse a packet type digit
    pub fn from_char(c: char) -> Option<Self> {
        match c {
            '0' => Some(PacketType::Connect),
            '1' => Some(PacketType::Disconnect),
            '2' => Some(PacketType::Event),
            '3' => Some(PacketType::Ack),
            '4' => Some(PacketType::Error),
            '5' => Some(PacketType::BinaryEvent),
            '6' => Some(PacketType::BinaryAck),
            _ => None,
        }
    }

    /// Wire digit
    pub fn code(self) -> u8 {
        self as u8
    }
}

/// A decoded transport-level packet
#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    /// Handshake data
    Open(Option<Value>),
    /// Transport close
    Close,
    /// Heartbeat ping with optional probe data
    Ping(Option<String>),
    /// Heartbeat pong with optional probe data
    Pong(Option<String>),
    /// Socket.IO packet
    Message(SocketPacket),
    /// Transport upgrade
    Upgrade,
    /// No operation
    Noop,
}

/// A Socket.IO packet carried by a message frame
#[derive(Debug, Clone, PartialEq)]
pub enum SocketPacket {
    /// Namespace connect (request or acknowledgement)
    Connect {
        namespace: String,
        data: Option<Value>,
    },
    /// Namespace disconnect
    Disconnect { namespace: String },
    /// Named event and its arguments
    Event {
        namespace: String,
        id: Option<u64>,
        event: String,
        args: Value,
    },
    /// Acknowledgement
    Ack {
        namespace: String,
        id: Option<u64>,
        data: Value,
    },
    /// Error or rejected connect
    Error {
        namespace: String,
        data: Option<Value>,
    },
    /// Event whose attachments follow as separate binary frames
    BinaryEvent {
        namespace: String,
        id: Option<u64>,
        attachments: usize,
        data: Value,
    },
    /// Ack whose attachments follow as separate binary frames
    BinaryAck {
        namespace: String,
        id: Option<u64>,
        attachments: usize,
        data: Value,
    },
}

/// Whether a packet namespace addresses the engine's current namespace
///
/// Equal strings match; so does an engine namespace that is a leading `/`
/// followed by the packet namespace. The default namespace written by the
/// server as `/` also matches an empty engine namespace.
pub fn namespace_matches(packet_namespace: &str, engine_namespace: &str) -> bool {
    packet_namespace == engine_namespace
        || engine_namespace.strip_prefix('/') == Some(packet_namespace)
        || (packet_namespace == "/" && engine_namespace.is_empty())
}

impl SocketPacket {
    /// Event packet
    pub fn event(namespace: impl Into<String>, event: impl Into<String>, args: Value) -> Self {
        SocketPacket::Event {
            namespace: namespace.into(),
            id: None,
            event: event.into(),
            args,
        }
    }

    /// Namespace connect packet
    pub fn connect(namespace: impl Into<String>, data: Option<Value>) -> Self {
        SocketPacket::Connect {
            namespace: namespace.into(),
            data,
        }
    }

    /// Packet type
    pub fn packet_type(&self) -> PacketType {
        match self {
            SocketPacket::Connect { .. } => PacketType::Connect,
            SocketPacket::Disconnect { .. } => PacketType::Disconnect,
            SocketPacket::Event { .. } => PacketType::Event,
            SocketPacket::Ack { .. } => PacketType::Ack,
            SocketPacket::Error { .. } => PacketType::Error,
            SocketPacket::BinaryEvent { .. } => PacketType::BinaryEvent,
            SocketPacket::BinaryAck { .. } => PacketType::BinaryAck,
        }
    }

    /// Namespace the packet addresses
    pub fn namespace(&self) -> &str {
        match self {
            SocketPacket::Connect { namespace, .. }
            | SocketPacket::Disconnect { namespace }
            | SocketPacket::Event { namespace, .. }
            | SocketPacket::Ack { namespace, .. }
            | SocketPacket::Error { namespace, .. }
            | SocketPacket::BinaryEvent { namespace, .. }
            | SocketPacket::BinaryAck { namespace, .. } => namespace,
        }
    }

    fn encode_modern(&self, out: &mut String) {
        out.push(char::from(b'0' + self.packet_type().code()));

        let (id, data) = match self {
            SocketPacket::Connect { data, .. } | SocketPacket::Error { data, .. } => {
                (None, data.clone())
            }
            SocketPacket::Disconnect { .. } => (None, None),
            SocketPacket::Event {
                id, event, args, ..
            } => (*id, Some(json!([event, args]))),
            SocketPacket::Ack { id, data, .. } => (*id, Some(data.clone())),
            SocketPacket::BinaryEvent {
                id,
                attachments,
                data,
                ..
            }
            | SocketPacket::BinaryAck {
                id,
                attachments,
                data,
                ..
            } => {
                out.push_str(&format!("{attachments}-"));
                (*id, Some(data.clone()))
            }
        };

        let namespace = self.namespace();
        if !namespace.is_empty() && namespace != "/" {
            out.push_str(namespace);
            out.push(',');
        }
        if let Some(id) = id {
            out.push_str(&id.to_string());
        }
        if let Some(data) = data {
            out.push_str(&data.to_string());
        }
    }

    fn decode_modern(seq: &mut SequenceReader<'_>) -> Result<Self, PacketError> {
        let type_field = seq.read(1).map_err(|_| PacketError::Empty)?;
        let packet_type = type_field
            .chars()
            .next()
            .and_then(PacketType::from_char)
            .ok_or_else(|| PacketError::UnknownPacketType(type_field.to_string()))?;

        let attachments = match packet_type {
            PacketType::BinaryEvent | PacketType::BinaryAck => {
                let count = seq.read_until("-", "").ok_or_else(|| {
                    PacketError::InvalidPayload("missing attachment count".to_string())
                })?;
                count
                    .parse::<usize>()
                    .map_err(|_| PacketError::InvalidPayload(format!("attachments {count}")))?
            }
            _ => 0,
        };

        let namespace = if seq.peek() == Some('/') {
            match seq.read_until(",[{", "[{") {
                Some(namespace) => namespace,
                None => seq.read_to_end(),
            }
        } else {
            ""
        }
        .to_string();

        let digits = seq
            .remaining()
            .chars()
            .take_while(char::is_ascii_digit)
            .count();
        let id = if digits > 0 {
            let field = seq.read(digits)?;
            Some(
                field
                    .parse::<u64>()
                    .map_err(|_| PacketError::InvalidPayload(format!("ack id {field}")))?,
            )
        } else {
            None
        };

        let data = parse_json(seq.read_to_end())?;

        Ok(match packet_type {
            PacketType::Connect => SocketPacket::Connect { namespace, data },
            PacketType::Disconnect => SocketPacket::Disconnect { namespace },
            PacketType::Event => {
                let (event, args) = split_event(data)?;
                SocketPacket::Event {
                    namespace,
                    id,
                    event,
                    args,
                }
            }
            PacketType::Ack => SocketPacket::Ack {
                namespace,
                id,
                data: data.unwrap_or_else(|| json!([])),
            },
            PacketType::Error => SocketPacket::Error { namespace, data },
            PacketType::BinaryEvent => SocketPacket::BinaryEvent {
                namespace,
                id,
                attachments,
                data: data.unwrap_or(Value::Null),
            },
            PacketType::BinaryAck => SocketPacket::BinaryAck {
                namespace,
                id,
                attachments,
                data: data.unwrap_or(Value::Null),
            },
        })
    }
}

impl Packet {
    /// Decode a single packet in the given dialect
    pub fn decode(dialect: Dialect, input: &str) -> Result<Self, PacketError> {
        match dialect {
            Dialect::Modern => Self::decode_modern(input),
            Dialect::Legacy => Self::decode_legacy(input),
        }
    }

    /// Encode the packet in the given dialect
    pub fn encode(&self, dialect: Dialect) -> Result<String, PacketError> {
        match dialect {
            Dialect::Modern => Ok(self.encode_modern()),
            Dialect::Legacy => self.encode_legacy(),
        }
    }

    /// Event name and arguments if this is a Socket.IO event
    pub fn as_event(&self) -> Option<(&str, &Value)> {
        match self {
            Packet::Message(SocketPacket::Event { event, args, .. }) => Some((event, args)),
            _ => None,
        }
    }

    /// Whether this is the named event addressed to `namespace`
    pub fn is_event(&self, name: &str, namespace: &str) -> bool {
        match self {
            Packet::Message(packet) => {
                matches!(packet, SocketPacket::Event { event, .. } if event == name)
                    && namespace_matches(packet.namespace(), namespace)
            }
            _ => false,
        }
    }

    fn encode_modern(&self) -> String {
        let mut out = String::new();
        match self {
            Packet::Open(data) => {
                out.push(char::from(b'0' + FrameType::Open.code()));
                if let Some(data) = data {
                    out.push_str(&data.to_string());
                }
            }
            Packet::Close => out.push(char::from(b'0' + FrameType::Close.code())),
            Packet::Ping(probe) => {
                out.push(char::from(b'0' + FrameType::Ping.code()));
                out.push_str(probe.as_deref().unwrap_or_default());
            }
            Packet::Pong(probe) => {
                out.push(char::from(b'0' + FrameType::Pong.code()));
                out.push_str(probe.as_deref().unwrap_or_default());
            }
            Packet::Message(packet) => {
                out.push(char::from(b'0' + FrameType::Message.code()));
                packet.encode_modern(&mut out);
            }
            Packet::Upgrade => out.push(char::from(b'0' + FrameType::Upgrade.code())),
            Packet::Noop => out.push(char::from(b'0' + FrameType::Noop.code())),
        }
        out
    }

    fn decode_modern(input: &str) -> Result<Self, PacketError> {
        let mut seq = SequenceReader::new(input);
        let type_field = seq.read(1).map_err(|_| PacketError::Empty)?;
        let frame_type = type_field
            .chars()
            .next()
            .and_then(FrameType::from_char)
            .ok_or_else(|| PacketError::UnknownFrameType(type_field.to_string()))?;

        Ok(match frame_type {
            FrameType::Open => Packet::Open(parse_json(seq.read_to_end())?),
            FrameType::Close => Packet::Close,
            FrameType::Ping => Packet::Ping(non_empty(seq.read_to_end())),
            FrameType::Pong => Packet::Pong(non_empty(seq.read_to_end())),
            FrameType::Message => Packet::Message(SocketPacket::decode_modern(&mut seq)?),
            FrameType::Upgrade => Packet::Upgrade,
            FrameType::Noop => Packet::Noop,
        })
    }

    fn encode_legacy(&self) -> Result<String, PacketError> {
        use LegacyFrameType as L;

        let record = |kind: L, id: &str, endpoint: &str, data: Option<String>| match data {
            Some(data) => format!("{}:{}:{}:{}", kind.code(), id, endpoint, data),
            None => format!("{}:{}:{}", kind.code(), id, endpoint),
        };

        Ok(match self {
            Packet::Close => record(L::Close, "", "", None),
            Packet::Open(_) => record(L::Open, "", "", None),
            Packet::Ping(_) | Packet::Pong(_) => record(L::Heartbeat, "", "", None),
            Packet::Noop => record(L::Noop, "", "", None),
            Packet::Message(SocketPacket::Connect { namespace, .. }) => {
                record(L::Open, "", namespace, None)
            }
            Packet::Message(SocketPacket::Disconnect { namespace }) => {
                record(L::Close, "", namespace, None)
            }
            Packet::Message(SocketPacket::Event {
                namespace,
                id,
                event,
                args,
            }) => {
                let id = id.map(|id| id.to_string()).unwrap_or_default();
                let data = json!({ "name": event, "args": args }).to_string();
                record(L::Event, &id, namespace, Some(data))
            }
            Packet::Message(SocketPacket::Ack { namespace, id, data }) => {
                let id = id.map(|id| id.to_string()).unwrap_or_default();
                record(L::Ack, "", namespace, Some(format!("{id}+{data}")))
            }
            Packet::Message(SocketPacket::Error { namespace, data }) => {
                let reason = match data {
                    Some(Value::String(reason)) => reason.clone(),
                    Some(other) => other.to_string(),
                    None => String::new(),
                };
                record(L::Error, "", namespace, Some(reason))
            }
            other => {
                return Err(PacketError::InvalidPayload(format!(
                    "{other:?} has no 0.x encoding"
                )))
            }
        })
    }

    fn decode_legacy(input: &str) -> Result<Self, PacketError> {
        use LegacyFrameType as L;

        if input.is_empty() {
            return Err(PacketError::Empty);
        }

        let mut seq = SequenceReader::new(input);
        let type_field = seq.read_until(":", "").unwrap_or_else(|| seq.read_to_end());
        let kind = L::parse(type_field)
            .ok_or_else(|| PacketError::UnknownFrameType(type_field.to_string()))?;
        let id_field = seq.read_until(":", "").unwrap_or_else(|| seq.read_to_end());
        let id = id_field.trim_end_matches('+').parse::<u64>().ok();
        let namespace = seq
            .read_until(":", "")
            .unwrap_or_else(|| seq.read_to_end())
            .to_string();
        let data = seq.read_to_end();

        Ok(match kind {
            L::Close if namespace.is_empty() => Packet::Close,
            L::Close => Packet::Message(SocketPacket::Disconnect { namespace }),
            L::Open => Packet::Message(SocketPacket::Connect {
                namespace,
                data: None,
            }),
            L::Heartbeat => Packet::Ping(None),
            L::Message => Packet::Message(SocketPacket::Event {
                namespace,
                id,
                event: "message".to_string(),
                args: Value::String(data.to_string()),
            }),
            L::JsonMessage => Packet::Message(SocketPacket::Event {
                namespace,
                id,
                event: "message".to_string(),
                args: parse_json(data)?.unwrap_or(Value::Null),
            }),
            L::Event => {
                let body = parse_json(data)?.ok_or_else(|| {
                    PacketError::InvalidPayload("event without body".to_string())
                })?;
                let event = body
                    .get("name")
                    .and_then(Value::as_str)
                    .ok_or_else(|| PacketError::InvalidPayload("event without name".to_string()))?
                    .to_string();
                let args = body.get("args").cloned().unwrap_or_else(|| json!([]));
                Packet::Message(SocketPacket::Event {
                    namespace,
                    id,
                    event,
                    args,
                })
            }
            L::Ack => {
                let (ack_id, ack_data) = match data.split_once('+') {
                    Some((ack_id, ack_data)) => (ack_id, ack_data),
                    None => (data, ""),
                };
                Packet::Message(SocketPacket::Ack {
                    namespace,
                    id: ack_id.parse::<u64>().ok(),
                    data: parse_json(ack_data)?.unwrap_or_else(|| json!([])),
                })
            }
            L::Error => Packet::Message(SocketPacket::Error {
                namespace,
                data: non_empty(data).map(Value::String),
            }),
            L::Noop => Packet::Noop,
        })
    }
}

/// Split a polling response body into its packet records
///
/// - protocol 4 and later: records joined by the `\x1e` separator
/// - earlier protocols, binary body (first byte `0x00`/`0x01`):
///   `<type><length digits as bytes><0xFF><data>` records, binary records skipped
/// - earlier protocols, text body: `<length>:<data>` records, where a length
///   running past the end of the body takes whatever remains
pub fn split_payload(body: &[u8], protocol: u8) -> Result<Vec<String>, PacketError> {
    if protocol >= 4 {
        let text = String::from_utf8_lossy(body);
        return Ok(text
            .split(RECORD_SEPARATOR)
            .filter(|record| !record.is_empty())
            .map(str::to_string)
            .collect());
    }

    if matches!(body.first(), Some(0x00) | Some(0x01)) {
        return split_binary_payload(body);
    }

    let text = String::from_utf8_lossy(body);
    let mut seq = SequenceReader::new(&text);
    let mut records = Vec::new();
    while !seq.is_exhausted() {
        let length_field = seq
            .read_until(":", "")
            .ok_or_else(|| PacketError::InvalidLength(seq.remaining().to_string()))?;
        let length = length_field
            .trim()
            .parse::<usize>()
            .map_err(|_| PacketError::InvalidLength(length_field.to_string()))?;
        let record = match seq.read(length) {
            Ok(record) => record,
            Err(PacketError::EndOfData { .. }) => seq.read_to_end(),
            Err(e) => return Err(e),
        };
        records.push(record.to_string());
    }
    Ok(records)
}

/// Decode every packet of a polling response body
pub fn decode_payload(body: &[u8], protocol: u8) -> Result<Vec<Packet>, PacketError> {
    split_payload(body, protocol)?
        .iter()
        .map(|record| Packet::decode(Dialect::Modern, record))
        .collect()
}

fn split_binary_payload(body: &[u8]) -> Result<Vec<String>, PacketError> {
    let mut records = Vec::new();
    let mut pos = 0;
    while pos < body.len() {
        let is_binary = match body[pos] {
            0x00 => false,
            0x01 => true,
            other => return Err(PacketError::InvalidLength(format!("record type {other}"))),
        };
        pos += 1;

        let mut length = 0usize;
        loop {
            match body.get(pos) {
                Some(0xFF) => {
                    pos += 1;
                    break;
                }
                Some(digit) if *digit <= 9 => {
                    length = length
                        .checked_mul(10)
                        .and_then(|l| l.checked_add(*digit as usize))
                        .ok_or_else(|| PacketError::InvalidLength("overflow".to_string()))?;
                    pos += 1;
                }
                Some(other) => {
                    return Err(PacketError::InvalidLength(format!("length byte {other}")))
                }
                None => return Err(PacketError::InvalidLength("truncated".to_string())),
            }
        }

        let rest = &body[pos..];
        if is_binary {
            pos += length.min(rest.len());
            continue;
        }

        // String lengths count characters
        let mut end = 0;
        let mut chars = 0;
        while end < rest.len() && chars < length {
            end += utf8_width(rest[end]);
            chars += 1;
        }
        let end = end.min(rest.len());
        records.push(String::from_utf8_lossy(&rest[..end]).into_owned());
        pos += end;
    }
    Ok(records)
}

fn utf8_width(lead: u8) -> usize {
    match lead {
        b if b < 0x80 => 1,
        b if b >> 5 == 0b110 => 2,
        b if b >> 4 == 0b1110 => 3,
        b if b >> 3 == 0b11110 => 4,
        _ => 1,
    }
}

fn parse_json(data: &str) -> Result<Option<Value>, PacketError> {
    if data.is_empty() {
        return Ok(None);
    }
    serde_json::from_str(data)
        .map(Some)
        .map_err(|e| PacketError::InvalidPayload(e.to_string()))
}

fn split_event(data: Option<Value>) -> Result<(String, Value), PacketError> {
    let Some(Value::Array(mut items)) = data else {
        return Err(PacketError::InvalidPayload(
            "event data is not an array".to_string(),
        ));
    };
    if items.is_empty() {
        return Err(PacketError::InvalidPayload("event without name".to_string()));
    }
    let event = match items.remove(0) {
        Value::String(event) => event,
        other => {
            return Err(PacketError::InvalidPayload(format!(
                "event name {other} is not a string"
            )))
        }
    };
    let args = match items.len() {
        1 => items.remove(0),
        _ => Value::Array(items),
    };
    Ok((event, args))
}

fn non_empty(s: &str) -> Option<String> {
    (!s.is_empty()).then(|| s.to_string())
}
