//! WebSocket frame parsing and serialization
//!
//! `Frame` is a single RFC 6455 wire unit. `FrameCodec` sits on top of it:
//! it splits outbound payloads into masked frames no larger than the
//! configured maximum and reassembles inbound continuation frames into one
//! logical message.

use crate::{
    error::{Error, FrameError, Result},
    protocol::{constants::DEFAULT_MAX_MESSAGE_SIZE, frame::*, Opcode},
};
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Represents a WebSocket frame according to RFC 6455
#[derive(Debug, Clone)]
pub struct Frame {
    /// Indicates if this is the final frame in a message
    pub fin: bool,
    /// Frame opcode
    pub opcode: Opcode,
    /// Indicates if the payload is masked on the wire
    pub masked: bool,
    /// Masking key (if present)
    pub mask: Option<[u8; 4]>,
    /// Payload data, always held unmasked
    pub payload: Bytes,
}

impl Frame {
    /// Create a new frame with the given opcode and payload
    pub fn new(opcode: Opcode, payload: impl Into<Bytes>) -> Self {
        Self {
            fin: true,
            opcode,
            masked: false,
            mask: None,
            payload: payload.into(),
        }
    }

    /// Create a continuation frame
    pub fn continuation(payload: impl Into<Bytes>) -> Self {
        Self::new(Opcode::Continuation, payload)
    }

    /// Create a text frame
    pub fn text(payload: impl Into<Bytes>) -> Self {
        Self::new(Opcode::Text, payload)
    }

    /// Create a close frame with optional code and reason
    pub fn close(code: Option<u16>, reason: Option<&str>) -> Self {
        let mut payload = BytesMut::new();

        if let Some(code) = code {
            payload.put_u16(code);
        }

        if let Some(reason) = reason {
            payload.put_slice(reason.as_bytes());
        }

        Self::new(Opcode::Close, payload.freeze())
    }

    /// Create a pong frame
    pub fn pong(payload: impl Into<Bytes>) -> Self {
        Self::new(Opcode::Pong, payload)
    }

    /// Set the FIN bit
    pub fn fin(mut self, fin: bool) -> Self {
        self.fin = fin;
        self
    }

    /// Mask the frame with a fresh random key (client to server frames)
    pub fn mask(mut self, enabled: bool) -> Self {
        if enabled {
            self.masked = true;
            self.mask = Some(rand::random::<[u8; 4]>());
        } else {
            self.masked = false;
            self.mask = None;
        }
        self
    }

    /// Serialize the frame to bytes
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.payload.len() + 14);
        self.write_to(&mut buf);
        buf.freeze()
    }

    /// Write the frame to a buffer
    pub fn write_to(&self, buf: &mut BytesMut) {
        let first_byte = ((self.fin as u8) << 7) | self.opcode.value();
        buf.put_u8(first_byte);

        // Payload length and mask bit
        let payload_len = self.payload.len();
        let mask_bit = if self.mask.is_some() { MASK_BIT } else { 0 };

        if payload_len < 126 {
            buf.put_u8(mask_bit | payload_len as u8);
        } else if payload_len <= u16::MAX as usize {
            buf.put_u8(mask_bit | PAYLOAD_LEN_16);
            buf.put_u16(payload_len as u16);
        } else {
            buf.put_u8(mask_bit | PAYLOAD_LEN_64);
            buf.put_u64(payload_len as u64);
        }

        match self.mask {
            Some(mask) => {
                buf.put_slice(&mask);
                buf.extend(
                    self.payload
                        .iter()
                        .enumerate()
                        .map(|(i, byte)| byte ^ mask[i % MASKING_KEY_LEN]),
                );
            }
            None => buf.put_slice(&self.payload),
        }
    }

    /// Parse a frame from bytes
    ///
    /// Nothing is consumed unless a whole frame is available. Frames
    /// announcing a payload above `max_payload` are rejected before their
    /// body arrives.
    pub fn parse(buf: &mut BytesMut, max_payload: usize) -> Result<Self> {
        if buf.len() < 2 {
            return Err(FrameError::InsufficientData {
                needed: 2,
                have: buf.len(),
            }
            .into());
        }

        let mut cursor = std::io::Cursor::new(&buf[..]);

        let first_byte = cursor.get_u8();
        let fin = (first_byte & FIN_BIT) != 0;
        if first_byte & (RSV1_BIT | RSV2_BIT | RSV3_BIT) != 0 {
            return Err(FrameError::ReservedBitsSet.into());
        }
        let opcode = Opcode::from(first_byte & OPCODE_MASK)
            .ok_or(FrameError::InvalidOpcode(first_byte & OPCODE_MASK))?;

        let second_byte = cursor.get_u8();
        let masked = (second_byte & MASK_BIT) != 0;
        let mut payload_len = (second_byte & PAYLOAD_LEN_MASK) as usize;

        if payload_len == PAYLOAD_LEN_16 as usize {
            if buf.len() < 4 {
                return Err(FrameError::InsufficientData {
                    needed: 4,
                    have: buf.len(),
                }
                .into());
            }
            payload_len = cursor.get_u16() as usize;
        } else if payload_len == PAYLOAD_LEN_64 as usize {
            if buf.len() < 10 {
                return Err(FrameError::InsufficientData {
                    needed: 10,
                    have: buf.len(),
                }
                .into());
            }
            let wide = cursor.get_u64();
            payload_len = usize::try_from(wide).unwrap_or(usize::MAX);
        }

        if payload_len > max_payload {
            return Err(FrameError::TooLarge {
                size: payload_len,
                max: max_payload,
            }
            .into());
        }

        if opcode.is_control() && !fin {
            return Err(FrameError::FragmentedControlFrame.into());
        }

        let header_len = cursor.position() as usize + if masked { MASKING_KEY_LEN } else { 0 };
        let frame_len = header_len + payload_len;
        if buf.len() < frame_len {
            return Err(FrameError::InsufficientData {
                needed: frame_len,
                have: buf.len(),
            }
            .into());
        }

        let mask = if masked {
            let mut mask = [0u8; 4];
            cursor.copy_to_slice(&mut mask);
            Some(mask)
        } else {
            None
        };

        buf.advance(header_len);
        let mut payload = buf.split_to(payload_len);
        if let Some(mask) = mask {
            for (i, byte) in payload.iter_mut().enumerate() {
                *byte ^= mask[i % MASKING_KEY_LEN];
            }
        }

        Ok(Frame {
            fin,
            opcode,
            masked,
            mask,
            payload: payload.freeze(),
        })
    }

    /// Get the frame kind
    pub fn kind(&self) -> FrameKind {
        match self.opcode {
            Opcode::Text => FrameKind::Text,
            Opcode::Binary => FrameKind::Binary,
            Opcode::Close => FrameKind::Close,
            Opcode::Ping => FrameKind::Ping,
            Opcode::Pong => FrameKind::Pong,
            Opcode::Continuation => FrameKind::Continuation,
        }
    }

    /// Check if this is a control frame
    pub fn is_control(&self) -> bool {
        self.opcode.is_control()
    }

    /// Check if this is a data frame
    pub fn is_data(&self) -> bool {
        self.opcode.is_data()
    }
}

/// Frame kind for easier matching
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    /// Text frame
    Text,
    /// Binary frame
    Binary,
    /// Close frame
    Close,
    /// Ping frame
    Ping,
    /// Pong frame
    Pong,
    /// Continuation frame
    Continuation,
}

/// Splits outbound payloads into frames and reassembles inbound ones
#[derive(Debug)]
pub struct FrameCodec {
    /// Largest payload carried by a single outbound frame
    max_payload: usize,
    /// Largest reassembled inbound message
    max_message_size: usize,
    /// Message being reassembled from continuation frames
    partial: Option<(Opcode, BytesMut)>,
}

impl FrameCodec {
    /// Create a codec splitting outbound payloads at `max_payload` bytes
    pub fn new(max_payload: usize) -> Self {
        Self {
            max_payload: max_payload.max(1),
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            partial: None,
        }
    }

    /// Limit the size of reassembled inbound messages
    pub fn with_max_message_size(mut self, size: usize) -> Self {
        self.max_message_size = size;
        self
    }

    /// Configured per-frame payload limit
    pub fn max_payload(&self) -> usize {
        self.max_payload
    }

    /// Encode a payload into wire-ready frames
    ///
    /// Every frame is masked with its own key. The first frame carries the
    /// opcode, the rest are continuations, and only the last has FIN set.
    pub fn encode(&self, opcode: Opcode, payload: &[u8]) -> Vec<Bytes> {
        if payload.is_empty() {
            return vec![Frame::new(opcode, Bytes::new()).mask(true).to_bytes()];
        }

        let count = payload.len().div_ceil(self.max_payload);
        payload
            .chunks(self.max_payload)
            .enumerate()
            .map(|(index, chunk)| {
                let frame_opcode = if index == 0 {
                    opcode
                } else {
                    Opcode::Continuation
                };
                Frame::new(frame_opcode, Bytes::copy_from_slice(chunk))
                    .fin(index + 1 == count)
                    .mask(true)
                    .to_bytes()
            })
            .collect()
    }

    /// Feed one parsed frame, returning a message once it is complete
    ///
    /// Control frames may arrive between the fragments of a data message
    /// and are surfaced immediately.
    pub fn push(&mut self, frame: Frame) -> Result<Option<(Opcode, Bytes)>> {
        if frame.is_control() {
            return Ok(Some((frame.opcode, frame.payload)));
        }

        match (frame.opcode, self.partial.take()) {
            (Opcode::Continuation, None) => Err(FrameError::UnexpectedContinuation(
                "continuation without a started message".to_string(),
            )
            .into()),
            (Opcode::Continuation, Some((opcode, mut buffer))) => {
                if buffer.len() + frame.payload.len() > self.max_message_size {
                    return Err(FrameError::TooLarge {
                        size: buffer.len() + frame.payload.len(),
                        max: self.max_message_size,
                    }
                    .into());
                }
                buffer.extend_from_slice(&frame.payload);
                if frame.fin {
                    Ok(Some((opcode, buffer.freeze())))
                } else {
                    self.partial = Some((opcode, buffer));
                    Ok(None)
                }
            }
            (_, Some(_)) => Err(FrameError::UnexpectedContinuation(
                "new message before the previous one finished".to_string(),
            )
            .into()),
            (opcode, None) => {
                if frame.fin {
                    Ok(Some((opcode, frame.payload)))
                } else {
                    self.partial = Some((opcode, BytesMut::from(&frame.payload[..])));
                    Ok(None)
                }
            }
        }
    }

    /// Decode as many frames as `buf` holds until one message completes
    ///
    /// Returns `Ok(None)` when more bytes are needed; partially received
    /// frames are left in `buf`.
    pub fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<(Opcode, Bytes)>> {
        loop {
            match Frame::parse(buf, self.max_message_size) {
                Ok(frame) => {
                    if let Some(message) = self.push(frame)? {
                        return Ok(Some(message));
                    }
                }
                Err(Error::Frame(FrameError::InsufficientData { .. })) => return Ok(None),
                Err(e) => return Err(e),
            }
        }
    }

    /// Drop any partially reassembled message
    pub fn reset(&mut self) {
        self.partial = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_frame_serialization() {
        let frame = Frame::text("hello");
        let bytes = frame.to_bytes();

        assert_eq!(bytes[0], 0x81); // FIN=1, RSV=000, Opcode=0001
        assert_eq!(bytes[1], 0x05); // MASK=0, Length=5
        assert_eq!(&bytes[2..], b"hello");
    }

    #[test]
    fn test_masked_frame_roundtrip() {
        let bytes = Frame::text("hello").mask(true).to_bytes();
        assert_eq!(bytes[1] & 0x80, 0x80); // MASK bit set
        assert_eq!(bytes.len(), 2 + 4 + 5); // header + mask + payload

        let mut buf = BytesMut::from(&bytes[..]);
        let parsed = Frame::parse(&mut buf, usize::MAX).unwrap();
        assert!(parsed.masked);
        assert_eq!(parsed.payload, "hello");
        assert!(buf.is_empty());
    }

    #[test]
    fn test_large_frame_header() {
        let payload = vec![0u8; 65536];
        let bytes = Frame::new(Opcode::Binary, payload).to_bytes();

        assert_eq!(bytes[1], 127); // Extended 64-bit length
        assert_eq!(bytes[2..10], (65536u64).to_be_bytes());
    }

    #[test]
    fn test_close_frame() {
        let bytes = Frame::close(Some(1000), Some("Goodbye")).to_bytes();

        assert_eq!(bytes[0], 0x88);
        assert_eq!(bytes[1], 0x09);
        assert_eq!(&bytes[2..4], 1000u16.to_be_bytes());
        assert_eq!(&bytes[4..], b"Goodbye");
    }

    #[test]
    fn test_partial_frame_is_not_consumed() {
        let bytes = Frame::text("partial frame").to_bytes();
        let mut buf = BytesMut::from(&bytes[..5]);
        let err = Frame::parse(&mut buf, usize::MAX).unwrap_err();
        assert!(matches!(
            err,
            Error::Frame(FrameError::InsufficientData { .. })
        ));
        assert_eq!(buf.len(), 5);
    }

    #[test]
    fn test_oversized_frame_rejected_early() {
        let bytes = Frame::text(vec![b'a'; 300]).to_bytes();
        let mut buf = BytesMut::from(&bytes[..4]);
        let err = Frame::parse(&mut buf, 100).unwrap_err();
        assert!(matches!(
            err,
            Error::Frame(FrameError::TooLarge { size: 300, max: 100 })
        ));
    }

    #[test]
    fn test_codec_splits_above_max_payload() {
        let codec = FrameCodec::new(4);
        let frames = codec.encode(Opcode::Text, b"0123456789");
        assert_eq!(frames.len(), 3);

        // first: text, not final; middle: continuation; last: continuation + FIN
        assert_eq!(frames[0][0], 0x01);
        assert_eq!(frames[1][0], 0x00);
        assert_eq!(frames[2][0], 0x80);
        assert!(frames.iter().all(|f| f[1] & MASK_BIT != 0));
    }

    #[test]
    fn test_codec_single_frame_at_boundary() {
        let codec = FrameCodec::new(10);
        assert_eq!(codec.encode(Opcode::Text, b"0123456789").len(), 1);
        assert_eq!(codec.encode(Opcode::Text, b"0123456789a").len(), 2);
        assert_eq!(codec.encode(Opcode::Text, b"").len(), 1);
    }

    #[test]
    fn test_codec_reassembles_fragments() {
        let encoder = FrameCodec::new(3);
        let mut buf = BytesMut::new();
        for frame in encoder.encode(Opcode::Text, b"fragmented payload") {
            buf.extend_from_slice(&frame);
        }

        let mut decoder = FrameCodec::new(3);
        let (opcode, payload) = decoder.decode(&mut buf).unwrap().unwrap();
        assert_eq!(opcode, Opcode::Text);
        assert_eq!(payload, "fragmented payload");
        assert!(buf.is_empty());
    }

    #[test]
    fn test_codec_control_frame_between_fragments() {
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&Frame::text("ab").fin(false).to_bytes());
        buf.extend_from_slice(&Frame::new(Opcode::Ping, "p").to_bytes());
        buf.extend_from_slice(&Frame::continuation("cd").to_bytes());

        let mut codec = FrameCodec::new(1024);
        let (opcode, payload) = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(opcode, Opcode::Ping);
        assert_eq!(payload, "p");

        let (opcode, payload) = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(opcode, Opcode::Text);
        assert_eq!(payload, "abcd");
    }

    #[test]
    fn test_codec_rejects_orphan_continuation() {
        let mut codec = FrameCodec::new(1024);
        assert!(codec.push(Frame::continuation("x")).is_err());
    }

    #[test]
    fn test_codec_waits_for_more_data() {
        let bytes = Frame::text("hello").to_bytes();
        let mut buf = BytesMut::from(&bytes[..3]);
        let mut codec = FrameCodec::new(1024);
        assert!(codec.decode(&mut buf).unwrap().is_none());

        buf.extend_from_slice(&bytes[3..]);
        let (_, payload) = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(payload, "hello");
    }
}
