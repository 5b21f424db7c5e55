//! Core data types for LedVis-RS
//!
//! This module contains the structures shared by every stage of the
//! pipeline: the decoded wire header, LED frames, the metadata side channel
//! and the connection state reported by the stream subscription.
//!
//! # Main Types
//!
//! - [`FrameType`] - Message kinds carried on the wire
//! - [`FrameHeader`] - The 4-byte header every message starts with
//! - [`LedFrame`] - One RGB8 sample of every LED on the fixture
//! - [`FrameMetadata`] - Periodic producer statistics
//! - [`ConnectionState`] - Lifecycle of the stream subscription

use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Bytes per LED in an LED_DATA payload (RGB8)
pub const BYTES_PER_LED: usize = 3;

/// Message kinds defined by the wire protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FrameType {
    /// Full RGB snapshot of the fixture
    LedData,
    /// Keep-alive carrying a client timestamp
    Heartbeat,
    /// Producer-side statistics
    Metadata,
    /// Producer-side error code
    Error,
}

impl FrameType {
    /// Wire code of this frame type
    pub const fn code(self) -> u8 {
        match self {
            FrameType::LedData => 0x01,
            FrameType::Heartbeat => 0x02,
            FrameType::Metadata => 0x03,
            FrameType::Error => 0x04,
        }
    }

    /// Display name used in logs and UI
    pub fn display_name(&self) -> &'static str {
        match self {
            FrameType::LedData => "LED_DATA",
            FrameType::Heartbeat => "HEARTBEAT",
            FrameType::Metadata => "METADATA",
            FrameType::Error => "ERROR",
        }
    }
}

impl TryFrom<u8> for FrameType {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, u8> {
        match value {
            0x01 => Ok(FrameType::LedData),
            0x02 => Ok(FrameType::Heartbeat),
            0x03 => Ok(FrameType::Metadata),
            0x04 => Ok(FrameType::Error),
            other => Err(other),
        }
    }
}

impl std::fmt::Display for FrameType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Decoded 4-byte message header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub version: u8,
    pub frame_type: FrameType,
    pub reserved: u16,
}

/// A single snapshot of every LED color on the fixture
#[derive(Debug, Clone)]
pub struct LedFrame {
    /// Header the frame arrived with
    pub header: FrameHeader,
    /// Monotonic time of receipt
    pub timestamp: Instant,
    /// `led_count * 3` bytes of RGB8
    pub data: Vec<u8>,
    /// Sequence number assigned by the subscription
    pub frame_number: Option<u64>,
}

impl LedFrame {
    /// Create a frame from raw RGB bytes received now
    pub fn new(header: FrameHeader, data: Vec<u8>) -> Self {
        Self {
            header,
            timestamp: Instant::now(),
            data,
            frame_number: None,
        }
    }

    /// Number of LEDs described by this frame
    pub fn led_count(&self) -> usize {
        self.data.len() / BYTES_PER_LED
    }

    /// RGB triplet of LED `index`, if present
    pub fn rgb(&self, index: usize) -> Option<[u8; 3]> {
        let start = index.checked_mul(BYTES_PER_LED)?;
        let bytes = self.data.get(start..start.checked_add(BYTES_PER_LED)?)?;
        Some([bytes[0], bytes[1], bytes[2]])
    }
}

/// Periodic statistics published by the producer
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct FrameMetadata {
    pub fps: f32,
    pub frame_count: u32,
    pub dropped_frames: u32,
    pub timestamp: u32,
}

/// Lifecycle of a stream subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConnectionState {
    /// Created but not started
    #[default]
    Idle,
    /// Opening the connection
    Connecting,
    /// Connection open, frames flowing
    Connected,
    /// Waiting out a backoff delay before the next attempt
    Reconnecting,
    /// Stopped by the owner
    Stopped,
    /// Gave up reconnecting
    Failed,
}

impl ConnectionState {
    /// Whether the subscription will never produce events again
    pub fn is_terminal(&self) -> bool {
        matches!(self, ConnectionState::Stopped | ConnectionState::Failed)
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::Idle => write!(f, "Idle"),
            ConnectionState::Connecting => write!(f, "Connecting..."),
            ConnectionState::Connected => write!(f, "Connected"),
            ConnectionState::Reconnecting => write!(f, "Reconnecting..."),
            ConnectionState::Stopped => write!(f, "Stopped"),
            ConnectionState::Failed => write!(f, "Failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header() -> FrameHeader {
        FrameHeader {
            version: 1,
            frame_type: FrameType::LedData,
            reserved: 0,
        }
    }

    #[test]
    fn test_frame_type_codes_roundtrip() {
        for ty in [
            FrameType::LedData,
            FrameType::Heartbeat,
            FrameType::Metadata,
            FrameType::Error,
        ] {
            assert_eq!(FrameType::try_from(ty.code()), Ok(ty));
        }
        assert_eq!(FrameType::try_from(0x00), Err(0x00));
        assert_eq!(FrameType::try_from(0x7F), Err(0x7F));
    }

    #[test]
    fn test_led_frame_accessors() {
        let frame = LedFrame::new(header(), vec![1, 2, 3, 4, 5, 6]);
        assert_eq!(frame.led_count(), 2);
        assert_eq!(frame.rgb(1), Some([4, 5, 6]));
        assert_eq!(frame.rgb(2), None);
    }

    #[test]
    fn test_rgb_out_of_range_index_is_none() {
        let frame = LedFrame::new(header(), vec![1, 2, 3, 4, 5, 6]);
        assert_eq!(frame.rgb(usize::MAX / 3), None);
        assert_eq!(frame.rgb(usize::MAX), None);
    }

    #[test]
    fn test_terminal_states() {
        assert!(ConnectionState::Stopped.is_terminal());
        assert!(ConnectionState::Failed.is_terminal());
        assert!(!ConnectionState::Reconnecting.is_terminal());
    }
}
