//! Queue that tunes its own capacity from the observed drop rate
//!
//! Every [`AdaptiveConfig::sample_interval`] the queue looks at its drop rate.
//! Sustained drops well above the target buy one more slot of buffering
//! (smoother playback, more latency); a drop rate well below the target
//! gives one back. Shrinking truncates the oldest frames right away so the
//! size bound holds at every instant.

use super::{FrameBuffer, FrameQueue, FrameQueueStats, PushOutcome, QueueConfig};
use crate::types::LedFrame;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Tuning knobs for [`AdaptiveFrameQueue`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdaptiveConfig {
    /// Use the adaptive queue instead of a fixed one
    pub enabled: bool,
    pub min_capacity: usize,
    pub max_capacity: usize,
    /// Acceptable drops per second
    pub target_drop_rate: f64,
    #[serde(with = "crate::config::duration_ms")]
    pub sample_interval: Duration,
}

impl Default for AdaptiveConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            min_capacity: 2,
            max_capacity: 8,
            target_drop_rate: 1.0,
            sample_interval: Duration::from_secs(5),
        }
    }
}

/// A capacity adjustment made during a sample
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapacityChange {
    pub from: usize,
    pub to: usize,
    /// Frames discarded to honor a smaller capacity
    pub truncated: usize,
}

/// [`FrameQueue`] wrapper that adjusts capacity between a floor and a ceiling
#[derive(Debug)]
pub struct AdaptiveFrameQueue {
    queue: FrameQueue,
    config: AdaptiveConfig,
    last_sample: Option<Instant>,
}

impl AdaptiveFrameQueue {
    pub fn new(queue_config: QueueConfig) -> Self {
        let mut config = queue_config.adaptive.clone();
        config.min_capacity = config.min_capacity.max(1);
        config.max_capacity = config.max_capacity.max(config.min_capacity);
        let start = queue_config
            .capacity
            .clamp(config.min_capacity, config.max_capacity);
        let queue = FrameQueue::new(QueueConfig {
            capacity: start,
            ..queue_config
        });
        Self {
            queue,
            config,
            last_sample: None,
        }
    }

    pub fn capacity(&self) -> usize {
        self.queue.capacity()
    }

    /// The wrapped fixed-capacity queue
    pub fn push_at(&mut self, frame: &LedFrame, now: Instant) -> PushOutcome {
        let outcome = self.queue.push_at(frame, now);
        self.maybe_adapt(now);
        outcome
    }

    /// Pop the newest frame. Sampling runs here too, so a queue the
    /// producer has gone quiet on still shrinks.
    pub fn pop_latest_at(&mut self, now: Instant) -> Option<LedFrame> {
        let frame = self.queue.pop_latest();
        self.maybe_adapt(now);
        frame
    }

    /// Run a sample if the interval has elapsed since the last one.
    ///
    /// The first call only starts the clock.
    pub fn maybe_adapt(&mut self, now: Instant) -> Option<CapacityChange> {
        let Some(last) = self.last_sample else {
            self.last_sample = Some(now);
            return None;
        };
        if now.saturating_duration_since(last) < self.config.sample_interval {
            return None;
        }
        self.last_sample = Some(now);
        self.adapt(now)
    }

    fn adapt(&mut self, now: Instant) -> Option<CapacityChange> {
        let drop_rate = self.queue.drop_rate_at(now);
        let from = self.queue.capacity();
        let target = self.config.target_drop_rate;

        let to = if drop_rate > target * 2.0 && from < self.config.max_capacity {
            from + 1
        } else if drop_rate < target * 0.5 && from > self.config.min_capacity {
            from - 1
        } else {
            return None;
        };

        let truncated = self.queue.set_capacity_at(to, now);
        tracing::debug!(from, to, drop_rate, truncated, "Adjusted frame queue capacity");
        Some(CapacityChange {
            from,
            to,
            truncated,
        })
    }
}

impl FrameBuffer for AdaptiveFrameQueue {
    fn push(&mut self, frame: &LedFrame) -> PushOutcome {
        self.push_at(frame, Instant::now())
    }

    fn pop_latest(&mut self) -> Option<LedFrame> {
        self.pop_latest_at(Instant::now())
    }

    fn peek_latest(&self) -> Option<&LedFrame> {
        self.queue.peek_latest()
    }

    fn clear(&mut self) {
        self.queue.clear()
    }

    fn recycle(&mut self, frame: LedFrame) {
        self.queue.recycle(frame)
    }

    fn stats(&self) -> FrameQueueStats {
        self.queue.stats()
    }

    fn reset_stats(&mut self) {
        self.queue.reset_stats()
    }

    fn len(&self) -> usize {
        self.queue.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::DropPolicy;
    use crate::types::{FrameHeader, FrameType};

    fn frame() -> LedFrame {
        LedFrame::new(
            FrameHeader {
                version: 1,
                frame_type: FrameType::LedData,
                reserved: 0,
            },
            vec![0; 3],
        )
    }

    fn adaptive(capacity: usize) -> AdaptiveFrameQueue {
        AdaptiveFrameQueue::new(QueueConfig {
            capacity,
            drop_policy: DropPolicy::Oldest,
            adaptive: AdaptiveConfig {
                enabled: true,
                min_capacity: 2,
                max_capacity: 4,
                target_drop_rate: 1.0,
                sample_interval: Duration::from_secs(5),
            },
            ..QueueConfig::default()
        })
    }

    #[test]
    fn test_grows_under_heavy_drops() {
        let mut queue = adaptive(2);
        let t0 = Instant::now();
        queue.maybe_adapt(t0);

        // 20 pushes in the final second before the sample: far above 2x target
        let base = t0 + Duration::from_millis(4100);
        for i in 0..20 {
            queue.push_at(&frame(), base + Duration::from_millis(i * 40));
        }
        let change = queue.maybe_adapt(t0 + Duration::from_secs(5));
        assert_eq!(
            change,
            Some(CapacityChange {
                from: 2,
                to: 3,
                truncated: 0
            })
        );
        assert_eq!(queue.capacity(), 3);
    }

    #[test]
    fn test_never_exceeds_ceiling() {
        let mut queue = adaptive(4);
        let t0 = Instant::now();
        queue.maybe_adapt(t0);
        for i in 0..20 {
            queue.push_at(&frame(), t0 + Duration::from_millis(4500 + i * 10));
        }
        assert_eq!(queue.maybe_adapt(t0 + Duration::from_secs(5)), None);
        assert_eq!(queue.capacity(), 4);
    }

    #[test]
    fn test_shrinks_when_quiet_and_truncates() {
        let mut queue = adaptive(4);
        let t0 = Instant::now();
        queue.maybe_adapt(t0);
        for _ in 0..4 {
            queue.push_at(&frame(), t0);
        }
        assert_eq!(queue.len(), 4);

        let change = queue.maybe_adapt(t0 + Duration::from_secs(5)).unwrap();
        assert_eq!(change.to, 3);
        assert_eq!(change.truncated, 1);
        assert_eq!(queue.len(), 3);
    }

    #[test]
    fn test_consumer_pops_drive_sampling() {
        let mut queue = adaptive(2);
        let t0 = Instant::now();
        queue.maybe_adapt(t0);

        let base = t0 + Duration::from_millis(4100);
        for i in 0..20 {
            queue.push_at(&frame(), base + Duration::from_millis(i * 40));
        }
        assert!(queue.pop_latest_at(t0 + Duration::from_secs(5)).is_some());
        assert_eq!(queue.capacity(), 3);

        // The producer stops; only the renderer keeps polling
        assert!(queue.pop_latest_at(t0 + Duration::from_secs(7)).is_some());
        assert_eq!(queue.capacity(), 3);
        assert!(queue.pop_latest_at(t0 + Duration::from_secs(10)).is_none());
        assert_eq!(queue.capacity(), 2);
        assert!(queue.pop_latest_at(t0 + Duration::from_secs(15)).is_none());
        assert_eq!(queue.capacity(), 2);
    }

    #[test]
    fn test_never_below_floor() {
        let mut queue = adaptive(2);
        let t0 = Instant::now();
        queue.maybe_adapt(t0);
        assert_eq!(queue.maybe_adapt(t0 + Duration::from_secs(5)), None);
        assert_eq!(queue.capacity(), 2);
    }

    #[test]
    fn test_no_sample_before_interval() {
        let mut queue = adaptive(4);
        let t0 = Instant::now();
        queue.maybe_adapt(t0);
        assert_eq!(queue.maybe_adapt(t0 + Duration::from_secs(4)), None);
        assert_eq!(queue.capacity(), 4);
    }

    #[test]
    fn test_initial_capacity_clamped_to_range() {
        assert_eq!(adaptive(10).capacity(), 4);
        assert_eq!(adaptive(1).capacity(), 2);
    }
}
