//! Streaming endpoint derivation

use crate::stream::StreamError;

/// Path of the LED frame stream on the device's HTTP server
pub const LED_FRAMES_PATH: &str = "/ws/led-frames";

/// Derive the LED frame stream URL from a device's HTTP(S) base URL.
///
/// `http` becomes `ws` and `https` becomes `wss`; URLs that already use a
/// streaming scheme keep it. Any trailing slash on the base is dropped
/// before the stream path is appended.
pub fn streaming_url(base: &str) -> Result<String, StreamError> {
    let base = base.trim();
    let (scheme, rest) = base
        .split_once("://")
        .ok_or_else(|| StreamError::InvalidUrl(format!("missing scheme in '{}'", base)))?;

    let stream_scheme = match scheme.to_ascii_lowercase().as_str() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => {
            return Err(StreamError::InvalidUrl(format!(
                "unsupported scheme '{}' in '{}'",
                other, base
            )))
        }
    };

    let host = rest.trim_end_matches('/');
    if host.is_empty() {
        return Err(StreamError::InvalidUrl(format!("missing host in '{}'", base)));
    }

    if host.ends_with(LED_FRAMES_PATH) {
        return Ok(format!("{}://{}", stream_scheme, host));
    }
    Ok(format!("{}://{}{}", stream_scheme, host, LED_FRAMES_PATH))
}
