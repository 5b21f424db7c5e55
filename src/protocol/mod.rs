//! Wire protocol for the LED frame stream
//!
//! Every message is a 4-byte header followed by a type-specific payload.
//! All multi-byte fields are big-endian.
//!
//! ```text
//! +---------+------+----------+---------------------------+
//! | version | type | reserved | payload                   |
//! |   u8    |  u8  |   u16    | (size depends on type)    |
//! +---------+------+----------+---------------------------+
//! ```
//!
//! | type      | payload                                             |
//! |-----------|-----------------------------------------------------|
//! | LED_DATA  | `led_count * 3` bytes of RGB8                       |
//! | HEARTBEAT | u64 client timestamp (milliseconds)                 |
//! | METADATA  | f32 fps, u32 frame count, u32 dropped, u32 timestamp |
//! | ERROR     | u32 error code                                      |
//!
//! Validation ([`validate_frame`]) never fails loudly: it returns a
//! [`ValidationError`] describing what was wrong. The `parse_*` functions
//! expect a buffer that already passed validation and return
//! [`ProtocolError`] if handed something else.

pub mod codec;
pub mod endpoint;

pub use codec::{
    encode_error, encode_heartbeat, encode_led_frame, encode_metadata, expected_frame_len,
    parse_error_code, parse_header, parse_heartbeat, parse_led_frame, parse_metadata,
    validate_frame, ProtocolError, ValidationError, ERROR_PAYLOAD_LEN, HEADER_LEN,
    HEARTBEAT_PAYLOAD_LEN, METADATA_PAYLOAD_LEN, PROTOCOL_VERSION,
};
pub use endpoint::{streaming_url, LED_FRAMES_PATH};
