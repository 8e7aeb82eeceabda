//! Binary codec for encoding and decoding Screenlink messages.
//!
//! Wire format:
//! ```text
//! [version:1][msg_type:1][reserved:2][payload_len:4][seq:8][timestamp_us:8][payload:N]
//! ```
//! Total header size: 24 bytes. All multi-byte integers are big-endian.
//!
//! | Offset | Size | Field          | Notes                                   |
//! |--------|------|----------------|-----------------------------------------|
//! | 0      | 1    | `version`      | Always `0x01`; anything else is fatal   |
//! | 1      | 1    | `msg_type`     | `0x01` Command, `0x02` Frame            |
//! | 2      | 2    | reserved       | Written as zero, ignored on decode      |
//! | 4      | 4    | `payload_len`  | Checked against the limit before use    |
//! | 8      | 8    | `seq`          | Per-session send counter, or frame no.  |
//! | 16     | 8    | `timestamp_us` | Microseconds since the Unix epoch       |
//!
//! A Command payload is the UTF-8 text of the command as produced by its
//! `Display` impl (`pause`, `resize:640:360`, free text, …).  A Frame payload
//! is opaque image bytes; the codec never looks inside.
//!
//! # Streaming
//!
//! Every unit is self-delimiting, so the decoder can be driven off a TCP
//! stream with no assumption about segment boundaries.  [`decode_message`]
//! never blocks: it returns [`ProtocolError::InsufficientData`] until a whole
//! unit is buffered.  Callers on a stream treat that variant as "read more"
//! and every other variant as a broken connection, since there is no way to
//! find the next header after a corrupt one.
//!
//! [`MessageDecoder`] wraps that contract in a growable buffer:
//!
//! ```rust
//! use screenlink_core::protocol::{encode_message, MessageDecoder};
//! use screenlink_core::protocol::messages::{Command, Message, DEFAULT_MAX_PAYLOAD};
//!
//! let bytes = encode_message(&Message::Command(Command::Pause), 0, 0, DEFAULT_MAX_PAYLOAD).unwrap();
//! let mut decoder = MessageDecoder::new(DEFAULT_MAX_PAYLOAD);
//!
//! decoder.feed(&bytes[..10]);
//! assert_eq!(decoder.next_message().unwrap(), None);
//!
//! decoder.feed(&bytes[10..]);
//! assert_eq!(decoder.next_message().unwrap(), Some(Message::Command(Command::Pause)));
//! assert_eq!(decoder.buffered(), 0);
//! ```
//!
//! # Limits
//!
//! The payload length is validated as soon as the header is complete.
//! An oversized unit is rejected before any of its payload is buffered, so a
//! hostile peer cannot make the receiver allocate up to 4 GiB.

use crate::protocol::messages::{
    Command, Frame, Message, MessageType, HEADER_SIZE, PROTOCOL_VERSION,
};
use thiserror::Error;

/// Errors that can occur during message encoding or decoding.
#[derive(Debug, Error, PartialEq)]
pub enum ProtocolError {
    /// The byte slice is shorter than one complete unit.  Not fatal on a stream.
    #[error("insufficient data: need at least {needed} bytes, got {available}")]
    InsufficientData { needed: usize, available: usize },

    /// The message type byte in the header is not a recognized value.
    #[error("unknown message type: 0x{0:02X}")]
    UnknownMessageType(u8),

    /// The protocol version in the header is not supported.
    #[error("unsupported protocol version: {0}")]
    UnsupportedVersion(u8),

    /// The payload is larger than the configured maximum.
    #[error("payload of {len} bytes exceeds maximum of {max} bytes")]
    PayloadTooLarge { len: usize, max: usize },

    /// The payload could not be parsed.
    #[error("malformed payload: {0}")]
    MalformedPayload(String),
}

impl ProtocolError {
    /// Returns `true` when more bytes may turn this into a successful decode.
    pub fn is_incomplete(&self) -> bool {
        matches!(self, ProtocolError::InsufficientData { .. })
    }
}

/// A decoded header with its payload, before interpretation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawUnit<'a> {
    pub message_type: MessageType,
    pub sequence_number: u64,
    pub timestamp_us: u64,
    pub payload: &'a [u8],
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Frames `payload` with a header for `message_type`.
///
/// # Errors
///
/// Returns [`ProtocolError::PayloadTooLarge`] if `payload` exceeds `max_payload`
/// (or `u32::MAX`); nothing is produced in that case.
pub fn encode_unit(
    message_type: MessageType,
    payload: &[u8],
    sequence_number: u64,
    timestamp_us: u64,
    max_payload: usize,
) -> Result<Vec<u8>, ProtocolError> {
    let limit = max_payload.min(u32::MAX as usize);
    if payload.len() > limit {
        return Err(ProtocolError::PayloadTooLarge {
            len: payload.len(),
            max: limit,
        });
    }

    let mut buf = Vec::with_capacity(HEADER_SIZE + payload.len());
    buf.push(PROTOCOL_VERSION);
    buf.push(message_type as u8);
    buf.push(0x00); // reserved
    buf.push(0x00); // reserved
    buf.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    buf.extend_from_slice(&sequence_number.to_be_bytes());
    buf.extend_from_slice(&timestamp_us.to_be_bytes());
    buf.extend_from_slice(payload);
    Ok(buf)
}

/// Decodes one header + payload from the beginning of `bytes`.
///
/// Returns the unit and the number of bytes it occupies.
///
/// # Errors
///
/// [`ProtocolError::InsufficientData`] when the unit is not complete yet; any
/// other variant means the stream is corrupt.  An oversized length is reported
/// as soon as the header is available.
pub fn decode_unit(bytes: &[u8], max_payload: usize) -> Result<(RawUnit<'_>, usize), ProtocolError> {
    if bytes.len() < HEADER_SIZE {
        return Err(ProtocolError::InsufficientData {
            needed: HEADER_SIZE,
            available: bytes.len(),
        });
    }

    let version = bytes[0];
    if version != PROTOCOL_VERSION {
        return Err(ProtocolError::UnsupportedVersion(version));
    }

    let type_byte = bytes[1];
    let message_type = MessageType::try_from(type_byte)
        .map_err(|_| ProtocolError::UnknownMessageType(type_byte))?;

    // bytes[2..4] are reserved – ignored on decode

    let payload_len = u32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]) as usize;
    if payload_len > max_payload {
        return Err(ProtocolError::PayloadTooLarge {
            len: payload_len,
            max: max_payload,
        });
    }

    let total_needed = HEADER_SIZE + payload_len;
    if bytes.len() < total_needed {
        return Err(ProtocolError::InsufficientData {
            needed: total_needed,
            available: bytes.len(),
        });
    }

    let unit = RawUnit {
        message_type,
        sequence_number: read_u64(bytes, 8),
        timestamp_us: read_u64(bytes, 16),
        payload: &bytes[HEADER_SIZE..total_needed],
    };
    Ok((unit, total_needed))
}

/// Encodes a [`Message`] into a byte vector including the 24-byte header.
///
/// For frames the header carries the frame's own sequence number and
/// timestamp and the `sequence_number`/`timestamp_us` arguments are ignored.
///
/// # Errors
///
/// Returns [`ProtocolError::PayloadTooLarge`] for oversized payloads.
///
/// # Examples
///
/// ```rust
/// use screenlink_core::protocol::{decode_message, encode_message};
/// use screenlink_core::protocol::messages::{Command, Message, DEFAULT_MAX_PAYLOAD};
///
/// let msg = Message::Command(Command::Pause);
/// let bytes = encode_message(&msg, 0, 0, DEFAULT_MAX_PAYLOAD).unwrap();
/// let (decoded, consumed) = decode_message(&bytes, DEFAULT_MAX_PAYLOAD).unwrap();
/// assert_eq!(decoded, msg);
/// assert_eq!(consumed, bytes.len());
/// ```
pub fn encode_message(
    msg: &Message,
    sequence_number: u64,
    timestamp_us: u64,
    max_payload: usize,
) -> Result<Vec<u8>, ProtocolError> {
    match msg {
        Message::Command(command) => {
            let text = command.to_string();
            encode_unit(
                MessageType::Command,
                text.as_bytes(),
                sequence_number,
                timestamp_us,
                max_payload,
            )
        }
        Message::Frame(frame) => encode_unit(
            MessageType::Frame,
            &frame.payload,
            frame.sequence,
            frame.timestamp_us,
            max_payload,
        ),
    }
}

/// Decodes one [`Message`] from the beginning of `bytes`.
///
/// Returns the decoded message and the total number of bytes consumed.
///
/// # Errors
///
/// See [`decode_unit`]; additionally a Command payload that is not UTF-8 is
/// [`ProtocolError::MalformedPayload`].
pub fn decode_message(bytes: &[u8], max_payload: usize) -> Result<(Message, usize), ProtocolError> {
    let (unit, consumed) = decode_unit(bytes, max_payload)?;
    let msg = match unit.message_type {
        MessageType::Command => {
            let text = std::str::from_utf8(unit.payload).map_err(|e| {
                ProtocolError::MalformedPayload(format!("command is not UTF-8: {e}"))
            })?;
            Message::Command(Command::from(text))
        }
        MessageType::Frame => Message::Frame(Frame {
            sequence: unit.sequence_number,
            timestamp_us: unit.timestamp_us,
            payload: unit.payload.to_vec(),
        }),
    };
    Ok((msg, consumed))
}

// ── Streaming decoder ─────────────────────────────────────────────────────────

/// Accumulates bytes read off a stream and yields complete messages.
///
/// A single `read()` may return a partial unit or several units at once; the
/// decoder holds leftovers until the next [`feed`](Self::feed).
///
/// Decoded units are skipped with a read cursor rather than removed one by
/// one.  The consumed prefix is discarded once per `feed`, so draining a read
/// that carried many small commands is linear in its length.
#[derive(Debug)]
pub struct MessageDecoder {
    buf: Vec<u8>,
    /// Offset of the first byte not yet decoded.
    start: usize,
    max_payload: usize,
}

impl MessageDecoder {
    pub fn new(max_payload: usize) -> Self {
        Self {
            buf: Vec::with_capacity(4096),
            start: 0,
            max_payload,
        }
    }

    /// Appends freshly read bytes.
    pub fn feed(&mut self, bytes: &[u8]) {
        if self.start > 0 {
            self.buf.drain(..self.start);
            self.start = 0;
        }
        self.buf.extend_from_slice(bytes);
    }

    /// Returns the next complete message, `Ok(None)` if more data is needed.
    ///
    /// # Errors
    ///
    /// Any [`ProtocolError`] other than `InsufficientData`; the stream cannot
    /// be resynchronised afterwards.
    pub fn next_message(&mut self) -> Result<Option<Message>, ProtocolError> {
        match decode_message(&self.buf[self.start..], self.max_payload) {
            Ok((msg, consumed)) => {
                self.start += consumed;
                Ok(Some(msg))
            }
            Err(e) if e.is_incomplete() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Number of buffered bytes not yet decoded.
    pub fn buffered(&self) -> usize {
        self.buf.len() - self.start
    }
}

fn read_u64(buf: &[u8], offset: usize) -> u64 {
    let mut arr = [0u8; 8];
    arr.copy_from_slice(&buf[offset..offset + 8]);
    u64::from_be_bytes(arr)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
