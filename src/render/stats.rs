//! Renderer statistics and performance history

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Number of one-second samples kept in the performance history
pub const HISTORY_LEN: usize = 60;

/// How often `fps` is recomputed and a history sample taken
pub const FPS_WINDOW: Duration = Duration::from_secs(1);

/// One entry of [`RenderStats::history`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PerformanceSample {
    pub fps: f32,
    /// Mean frame time over the sample window
    pub frame_time_ms: f32,
}

/// Renderer counters
#[derive(Debug, Clone, Default)]
pub struct RenderStats {
    /// Executed frames per second, recomputed once per window
    pub fps: f32,
    pub last_frame_time_ms: f32,
    pub avg_frame_time_ms: f32,
    /// Executed ticks
    pub total_frames: u64,
    /// Executed ticks that found no frame to draw
    pub dropped_frames: u64,
    /// Draw calls issued by the backend on the last executed tick
    pub draw_calls: u32,
    /// Ticks throttled by the frame rate limit
    pub skipped_ticks: u64,
}

/// Accumulates [`RenderStats`] and the rolling history
#[derive(Debug, Clone)]
pub(crate) struct StatsTracker {
    stats: RenderStats,
    history: VecDeque<PerformanceSample>,
    total_frame_time_ms: f64,
    window_start: Option<Instant>,
    window_frames: u32,
    window_time_ms: f64,
}

impl Default for StatsTracker {
    fn default() -> Self {
        Self {
            stats: RenderStats::default(),
            history: VecDeque::with_capacity(HISTORY_LEN),
            total_frame_time_ms: 0.0,
            window_start: None,
            window_frames: 0,
            window_time_ms: 0.0,
        }
    }
}

impl StatsTracker {
    pub fn stats(&self) -> &RenderStats {
        &self.stats
    }

    pub fn history(&self) -> &VecDeque<PerformanceSample> {
        &self.history
    }

    pub fn record_skip(&mut self) {
        self.stats.skipped_ticks += 1;
    }

    /// Record an executed tick that started at `now`
    pub fn record_frame(&mut self, now: Instant, frame_time: Duration, draw_calls: u32, dropped: bool) {
        let ms = frame_time.as_secs_f64() * 1000.0;
        self.stats.total_frames += 1;
        if dropped {
            self.stats.dropped_frames += 1;
        }
        self.stats.draw_calls = draw_calls;
        self.stats.last_frame_time_ms = ms as f32;
        self.total_frame_time_ms += ms;
        self.stats.avg_frame_time_ms = (self.total_frame_time_ms / self.stats.total_frames as f64) as f32;

        let start = *self.window_start.get_or_insert(now);
        self.window_frames += 1;
        self.window_time_ms += ms;

        let elapsed = now.saturating_duration_since(start);
        if elapsed >= FPS_WINDOW {
            let fps = self.window_frames as f64 / elapsed.as_secs_f64();
            self.stats.fps = fps as f32;
            self.history.push_back(PerformanceSample {
                fps: fps as f32,
                frame_time_ms: (self.window_time_ms / self.window_frames as f64) as f32,
            });
            if self.history.len() > HISTORY_LEN {
                self.history.pop_front();
            }
            self.window_start = Some(now);
            self.window_frames = 0;
            self.window_time_ms = 0.0;
        }
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fps_recomputed_each_window() {
        let mut tracker = StatsTracker::default();
        let t0 = Instant::now();
        // 31 frames at ~33ms spacing span one second
        for i in 0..=30u64 {
            tracker.record_frame(t0 + Duration::from_micros(i * 33_334), Duration::from_millis(2), 1, false);
        }
        let fps = tracker.stats().fps;
        assert!((fps - 31.0).abs() < 0.5, "fps = {}", fps);
        assert_eq!(tracker.history().len(), 1);
        assert!((tracker.stats().avg_frame_time_ms - 2.0).abs() < 1e-3);
    }

    #[test]
    fn test_dropped_and_skipped_counters() {
        let mut tracker = StatsTracker::default();
        let now = Instant::now();
        tracker.record_frame(now, Duration::ZERO, 1, true);
        tracker.record_frame(now, Duration::ZERO, 3, false);
        tracker.record_skip();
        let stats = tracker.stats();
        assert_eq!(stats.total_frames, 2);
        assert_eq!(stats.dropped_frames, 1);
        assert_eq!(stats.skipped_ticks, 1);
        assert_eq!(stats.draw_calls, 3);
    }

    #[test]
    fn test_history_is_bounded() {
        let mut tracker = StatsTracker::default();
        let t0 = Instant::now();
        for s in 0..=(HISTORY_LEN as u64 + 10) {
            tracker.record_frame(t0 + Duration::from_secs(s), Duration::from_millis(1), 1, false);
        }
        assert_eq!(tracker.history().len(), HISTORY_LEN);

        tracker.clear();
        assert!(tracker.history().is_empty());
        assert_eq!(tracker.stats().total_frames, 0);
    }
}
