//! Frame validation, decoding and encoding

use crate::types::{FrameHeader, FrameMetadata, FrameType, LedFrame, BYTES_PER_LED};
use std::time::Instant;
use thiserror::Error;

/// Only protocol version understood by this client
pub const PROTOCOL_VERSION: u8 = 1;

/// Size of the common header in bytes
pub const HEADER_LEN: usize = 4;

/// HEARTBEAT payload: u64 client timestamp
pub const HEARTBEAT_PAYLOAD_LEN: usize = 8;

/// METADATA payload: f32 + 3 * u32
pub const METADATA_PAYLOAD_LEN: usize = 16;

/// ERROR payload: u32 code
pub const ERROR_PAYLOAD_LEN: usize = 4;

/// Why a buffer was rejected by [`validate_frame`]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("frame too short: {len} bytes, header needs {HEADER_LEN}")]
    TooShort { len: usize },

    #[error("unsupported protocol version {0} (expected {PROTOCOL_VERSION})")]
    UnsupportedVersion(u8),

    #[error("unknown frame type 0x{0:02X}")]
    UnknownType(u8),

    #[error("{frame_type} frame must be {expected} bytes, got {actual}")]
    SizeMismatch {
        frame_type: FrameType,
        expected: usize,
        actual: usize,
    },
}

/// Decoding failure on a buffer that did not go through validation first
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("invalid header: {0}")]
    Header(#[from] ValidationError),

    #[error("expected {expected} frame, got {actual}")]
    WrongType {
        expected: FrameType,
        actual: FrameType,
    },

    #[error("truncated {frame_type} payload: need {needed} bytes, have {actual}")]
    Truncated {
        frame_type: FrameType,
        needed: usize,
        actual: usize,
    },
}

/// Total size in bytes of a frame of `frame_type` for a fixture of `led_count` LEDs
pub fn expected_frame_len(frame_type: FrameType, led_count: usize) -> usize {
    HEADER_LEN
        + match frame_type {
            FrameType::LedData => led_count * BYTES_PER_LED,
            FrameType::Heartbeat => HEARTBEAT_PAYLOAD_LEN,
            FrameType::Metadata => METADATA_PAYLOAD_LEN,
            FrameType::Error => ERROR_PAYLOAD_LEN,
        }
}

/// Check that `buf` is a well-formed frame for a fixture of `led_count` LEDs.
///
/// Checks run in order: minimum length, version, type, then exact size for
/// the declared type. Never panics, whatever the input.
pub fn validate_frame(buf: &[u8], led_count: usize) -> Result<FrameHeader, ValidationError> {
    let header = parse_header(buf)?;
    let expected = expected_frame_len(header.frame_type, led_count);
    if buf.len() != expected {
        return Err(ValidationError::SizeMismatch {
            frame_type: header.frame_type,
            expected,
            actual: buf.len(),
        });
    }
    Ok(header)
}

/// Decode the header, checking version and type but not payload size
pub fn parse_header(buf: &[u8]) -> Result<FrameHeader, ValidationError> {
    if buf.len() < HEADER_LEN {
        return Err(ValidationError::TooShort { len: buf.len() });
    }
    let version = buf[0];
    if version != PROTOCOL_VERSION {
        return Err(ValidationError::UnsupportedVersion(version));
    }
    let frame_type = FrameType::try_from(buf[1]).map_err(ValidationError::UnknownType)?;
    let reserved = u16::from_be_bytes([buf[2], buf[3]]);
    Ok(FrameHeader {
        version,
        frame_type,
        reserved,
    })
}

fn payload_of(
    buf: &[u8],
    expected: FrameType,
    needed: usize,
) -> Result<(FrameHeader, &[u8]), ProtocolError> {
    let header = parse_header(buf)?;
    if header.frame_type != expected {
        return Err(ProtocolError::WrongType {
            expected,
            actual: header.frame_type,
        });
    }
    let payload = &buf[HEADER_LEN..];
    if payload.len() < needed {
        return Err(ProtocolError::Truncated {
            frame_type: expected,
            needed,
            actual: payload.len(),
        });
    }
    Ok((header, payload))
}

fn be_u32(bytes: &[u8], offset: usize) -> u32 {
    u32::from_be_bytes([
        bytes[offset],
        bytes[offset + 1],
        bytes[offset + 2],
        bytes[offset + 3],
    ])
}

/// Decode an LED_DATA frame received at `received_at`.
///
/// The payload is copied as-is; its length is whatever validation accepted.
pub fn parse_led_frame(buf: &[u8], received_at: Instant) -> Result<LedFrame, ProtocolError> {
    let (header, payload) = payload_of(buf, FrameType::LedData, 0)?;
    if payload.len() % BYTES_PER_LED != 0 {
        return Err(ProtocolError::Truncated {
            frame_type: FrameType::LedData,
            needed: payload.len().next_multiple_of(BYTES_PER_LED),
            actual: payload.len(),
        });
    }
    Ok(LedFrame {
        header,
        timestamp: received_at,
        data: payload.to_vec(),
        frame_number: None,
    })
}

/// Decode a HEARTBEAT frame into its client timestamp (milliseconds)
pub fn parse_heartbeat(buf: &[u8]) -> Result<u64, ProtocolError> {
    let (_, payload) = payload_of(buf, FrameType::Heartbeat, HEARTBEAT_PAYLOAD_LEN)?;
    let mut ts = [0u8; 8];
    ts.copy_from_slice(&payload[..HEARTBEAT_PAYLOAD_LEN]);
    Ok(u64::from_be_bytes(ts))
}

/// Decode a METADATA frame
pub fn parse_metadata(buf: &[u8]) -> Result<FrameMetadata, ProtocolError> {
    let (_, payload) = payload_of(buf, FrameType::Metadata, METADATA_PAYLOAD_LEN)?;
    Ok(FrameMetadata {
        fps: f32::from_bits(be_u32(payload, 0)),
        frame_count: be_u32(payload, 4),
        dropped_frames: be_u32(payload, 8),
        timestamp: be_u32(payload, 12),
    })
}

/// Decode an ERROR frame into its error code
pub fn parse_error_code(buf: &[u8]) -> Result<u32, ProtocolError> {
    let (_, payload) = payload_of(buf, FrameType::Error, ERROR_PAYLOAD_LEN)?;
    Ok(be_u32(payload, 0))
}

fn header_bytes(frame_type: FrameType, capacity: usize) -> Vec<u8> {
    let mut buf = Vec::with_capacity(capacity);
    buf.push(PROTOCOL_VERSION);
    buf.push(frame_type.code());
    buf.extend_from_slice(&0u16.to_be_bytes());
    buf
}

/// Encode an LED_DATA frame from raw RGB8 bytes
pub fn encode_led_frame(rgb: &[u8]) -> Vec<u8> {
    let mut buf = header_bytes(FrameType::LedData, HEADER_LEN + rgb.len());
    buf.extend_from_slice(rgb);
    buf
}

/// Encode a HEARTBEAT frame carrying `client_timestamp_ms`
pub fn encode_heartbeat(client_timestamp_ms: u64) -> Vec<u8> {
    let mut buf = header_bytes(FrameType::Heartbeat, HEADER_LEN + HEARTBEAT_PAYLOAD_LEN);
    buf.extend_from_slice(&client_timestamp_ms.to_be_bytes());
    buf
}

/// Encode a METADATA frame
pub fn encode_metadata(meta: &FrameMetadata) -> Vec<u8> {
    let mut buf = header_bytes(FrameType::Metadata, HEADER_LEN + METADATA_PAYLOAD_LEN);
    buf.extend_from_slice(&meta.fps.to_bits().to_be_bytes());
    buf.extend_from_slice(&meta.frame_count.to_be_bytes());
    buf.extend_from_slice(&meta.dropped_frames.to_be_bytes());
    buf.extend_from_slice(&meta.timestamp.to_be_bytes());
    buf
}

/// Encode an ERROR frame
pub fn encode_error(code: u32) -> Vec<u8> {
    let mut buf = header_bytes(FrameType::Error, HEADER_LEN + ERROR_PAYLOAD_LEN);
    buf.extend_from_slice(&code.to_be_bytes());
    buf
}
