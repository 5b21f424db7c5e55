//! Test data builders for frames and configs

use ledvis_rs::protocol::{encode_led_frame, PROTOCOL_VERSION};
use ledvis_rs::types::{FrameHeader, FrameType, LedFrame, BYTES_PER_LED};
use ledvis_rs::SubscriptionConfig;
use std::time::Duration;

/// Builder for LED frames
pub struct FrameBuilder {
    rgb: Vec<u8>,
    frame_number: Option<u64>,
}

impl FrameBuilder {
    pub fn new(led_count: usize) -> Self {
        Self {
            rgb: vec![0; led_count * BYTES_PER_LED],
            frame_number: None,
        }
    }

    pub fn fill(mut self, rgb: [u8; 3]) -> Self {
        for led in self.rgb.chunks_exact_mut(BYTES_PER_LED) {
            led.copy_from_slice(&rgb);
        }
        self
    }

    pub fn led(mut self, index: usize, rgb: [u8; 3]) -> Self {
        let start = index * BYTES_PER_LED;
        self.rgb[start..start + BYTES_PER_LED].copy_from_slice(&rgb);
        self
    }

    pub fn frame_number(mut self, n: u64) -> Self {
        self.frame_number = Some(n);
        self
    }

    /// Wire bytes, header included
    pub fn encode(&self) -> Vec<u8> {
        encode_led_frame(&self.rgb)
    }

    pub fn build(self) -> LedFrame {
        let header = FrameHeader {
            version: PROTOCOL_VERSION,
            frame_type: FrameType::LedData,
            reserved: 0,
        };
        let mut frame = LedFrame::new(header, self.rgb);
        frame.frame_number = self.frame_number;
        frame
    }
}

/// Builder for subscription configs with test-friendly timings
pub struct SubscriptionConfigBuilder {
    config: SubscriptionConfig,
}

impl SubscriptionConfigBuilder {
    pub fn new(url: impl Into<String>, led_count: usize) -> Self {
        Self {
            config: SubscriptionConfig {
                url: url.into(),
                led_count,
                reconnect_delay: Duration::from_millis(10),
                max_reconnect_delay: Duration::from_millis(40),
                jitter: 0.0,
                connect_timeout: Duration::from_secs(2),
                ..SubscriptionConfig::default()
            },
        }
    }

    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.config.max_reconnect_attempts = attempts;
        self
    }

    pub fn auto_reconnect(mut self, enabled: bool) -> Self {
        self.config.auto_reconnect = enabled;
        self
    }

    /// Fixed retry delay with no growth
    pub fn reconnect_delay(mut self, delay: Duration) -> Self {
        self.config.reconnect_delay = delay;
        self.config.max_reconnect_delay = delay;
        self
    }

    pub fn heartbeat_interval(mut self, interval: Duration) -> Self {
        self.config.heartbeat_interval = interval;
        self
    }

    pub fn build(self) -> SubscriptionConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_builder() {
        let frame = FrameBuilder::new(4)
            .fill([1, 2, 3])
            .led(2, [9, 9, 9])
            .frame_number(7)
            .build();

        assert_eq!(frame.led_count(), 4);
        assert_eq!(frame.rgb(0), Some([1, 2, 3]));
        assert_eq!(frame.rgb(2), Some([9, 9, 9]));
        assert_eq!(frame.frame_number, Some(7));
    }
}
