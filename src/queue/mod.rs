//! Bounded latest-wins frame buffering
//!
//! The queue sits between the stream subscription and the renderer. It is
//! deliberately lossy: the renderer only ever wants the freshest frame, so
//! [`FrameQueue::pop_latest`] returns the most recently pushed frame (LIFO)
//! and overflow is resolved by dropping frames rather than blocking.
//!
//! # Drop policies
//!
//! - [`DropPolicy::Oldest`] (default): evict the head to admit the new frame,
//!   bounding end-to-end latency.
//! - [`DropPolicy::Newest`]: discard the incoming frame, keeping what is
//!   already buffered.
//!
//! Overflow is not an error; it shows up only in the `dropped` counter and
//! the rolling `drop_rate`.
//!
//! # Thread safety
//!
//! A queue is not thread-safe. Every mutating call takes `&mut self`, so a
//! queue has exactly one owner at a time; callers on a multi-threaded host
//! must wrap it in their own lock or keep it on one thread. The viewer keeps
//! it on the UI thread and feeds it from the subscription's event channel.

pub mod adaptive;
pub mod pool;

pub use adaptive::{AdaptiveConfig, AdaptiveFrameQueue, CapacityChange};
pub use pool::BufferPool;

use crate::types::LedFrame;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Default number of buffered frames
pub const DEFAULT_CAPACITY: usize = 3;

/// Default number of spare buffers kept for reuse
pub const DEFAULT_MAX_BUFFER_POOL_SIZE: usize = 10;

/// Window over which `drop_rate` is measured
pub const DROP_RATE_WINDOW: Duration = Duration::from_secs(1);

/// What to discard when a push finds the queue full
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropPolicy {
    /// Evict the oldest buffered frame
    #[default]
    Oldest,
    /// Discard the incoming frame
    Newest,
}

/// Queue configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub capacity: usize,
    pub drop_policy: DropPolicy,
    /// Copy pushed frames into pooled buffers instead of fresh allocations
    pub buffer_reuse: bool,
    pub max_buffer_pool_size: usize,
    /// Frame payload size used to preallocate the pool (0 = no preallocation)
    pub frame_len: usize,
    pub adaptive: AdaptiveConfig,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            drop_policy: DropPolicy::Oldest,
            buffer_reuse: true,
            max_buffer_pool_size: DEFAULT_MAX_BUFFER_POOL_SIZE,
            frame_len: 0,
            adaptive: AdaptiveConfig::default(),
        }
    }
}

/// What happened to a pushed frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// Stored without evicting anything
    Queued,
    /// Stored after evicting the oldest frame
    EvictedOldest,
    /// Discarded because the queue was full
    DroppedIncoming,
}

/// Counters and derived rates for a queue
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameQueueStats {
    /// Frames pushed
    pub received: u64,
    /// Frames handed out by `pop_latest`
    pub rendered: u64,
    /// Frames lost to overflow or capacity reduction
    pub dropped: u64,
    /// Drops in the last second
    pub drop_rate: f64,
    pub size: usize,
    pub capacity: usize,
    pub peak_size: usize,
    pub pool_size: usize,
    pub pool_hits: u64,
    pub pool_misses: u64,
}

impl FrameQueueStats {
    /// Fraction of received frames that were dropped, as a percentage
    pub fn drop_percentage(&self) -> f64 {
        if self.received == 0 {
            0.0
        } else {
            (self.dropped as f64 / self.received as f64) * 100.0
        }
    }
}

/// Common surface of the fixed and adaptive queues
pub trait FrameBuffer {
    fn push(&mut self, frame: &LedFrame) -> PushOutcome;
    fn pop_latest(&mut self) -> Option<LedFrame>;
    fn peek_latest(&self) -> Option<&LedFrame>;
    fn clear(&mut self);
    fn recycle(&mut self, frame: LedFrame);
    fn stats(&self) -> FrameQueueStats;
    fn reset_stats(&mut self);
    fn len(&self) -> usize;
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Bounded frame buffer with drop policy and pooled storage
#[derive(Debug)]
pub struct FrameQueue {
    frames: VecDeque<LedFrame>,
    capacity: usize,
    drop_policy: DropPolicy,
    buffer_reuse: bool,
    pool: BufferPool,
    received: u64,
    rendered: u64,
    dropped: u64,
    peak_size: usize,
    recent_drops: VecDeque<Instant>,
}

impl FrameQueue {
    /// Create a queue; a capacity of zero is raised to one
    pub fn new(config: QueueConfig) -> Self {
        let capacity = config.capacity.max(1);
        let mut pool = BufferPool::new(config.max_buffer_pool_size);
        if config.buffer_reuse && config.frame_len > 0 {
            // one spare per slot plus the frame in flight to the renderer
            pool.preallocate(capacity + 1, config.frame_len);
        }

        Self {
            frames: VecDeque::with_capacity(capacity),
            capacity,
            drop_policy: config.drop_policy,
            buffer_reuse: config.buffer_reuse,
            pool,
            received: 0,
            rendered: 0,
            dropped: 0,
            peak_size: 0,
            recent_drops: VecDeque::new(),
        }
    }

    /// Queue with the given capacity and policy, other settings defaulted
    pub fn with_capacity(capacity: usize, drop_policy: DropPolicy) -> Self {
        Self::new(QueueConfig {
            capacity,
            drop_policy,
            ..QueueConfig::default()
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn drop_policy(&self) -> DropPolicy {
        self.drop_policy
    }

    pub fn is_full(&self) -> bool {
        self.frames.len() >= self.capacity
    }

    /// Push a copy of `frame`, applying the drop policy if full
    pub fn push_at(&mut self, frame: &LedFrame, now: Instant) -> PushOutcome {
        self.received += 1;

        let outcome = if self.is_full() {
            match self.drop_policy {
                DropPolicy::Oldest => {
                    if let Some(evicted) = self.frames.pop_front() {
                        self.pool.release(evicted.data);
                    }
                    self.record_drop(now);
                    PushOutcome::EvictedOldest
                }
                DropPolicy::Newest => {
                    self.record_drop(now);
                    tracing::trace!(
                        frame_number = ?frame.frame_number,
                        "Queue full, dropping incoming frame"
                    );
                    return PushOutcome::DroppedIncoming;
                }
            }
        } else {
            PushOutcome::Queued
        };

        let stored = self.store(frame);
        self.frames.push_back(stored);
        self.peak_size = self.peak_size.max(self.frames.len());
        outcome
    }

    fn store(&mut self, frame: &LedFrame) -> LedFrame {
        let data = if self.buffer_reuse {
            self.pool.acquire_copy(&frame.data)
        } else {
            frame.data.clone()
        };
        LedFrame {
            header: frame.header,
            timestamp: frame.timestamp,
            data,
            frame_number: frame.frame_number,
        }
    }

    fn record_drop(&mut self, now: Instant) {
        self.dropped += 1;
        self.recent_drops.push_back(now);
        self.prune_drops(now);
    }

    fn prune_drops(&mut self, now: Instant) {
        while let Some(&t) = self.recent_drops.front() {
            if now.saturating_duration_since(t) > DROP_RATE_WINDOW {
                self.recent_drops.pop_front();
            } else {
                break;
            }
        }
    }

    /// Drops per second over the last [`DROP_RATE_WINDOW`] as of `now`
    pub fn drop_rate_at(&self, now: Instant) -> f64 {
        let count = self
            .recent_drops
            .iter()
            .filter(|&&t| now.saturating_duration_since(t) <= DROP_RATE_WINDOW)
            .count();
        count as f64 / DROP_RATE_WINDOW.as_secs_f64()
    }

    /// Change the capacity, truncating the oldest frames if the queue is now over it.
    ///
    /// Returns how many frames were discarded.
    pub fn set_capacity_at(&mut self, capacity: usize, now: Instant) -> usize {
        self.capacity = capacity.max(1);
        let mut truncated = 0;
        while self.frames.len() > self.capacity {
            if let Some(evicted) = self.frames.pop_front() {
                self.pool.release(evicted.data);
                self.record_drop(now);
                truncated += 1;
            }
        }
        truncated
    }

    /// Snapshot of the counters as of `now`
    pub fn stats_at(&self, now: Instant) -> FrameQueueStats {
        FrameQueueStats {
            received: self.received,
            rendered: self.rendered,
            dropped: self.dropped,
            drop_rate: self.drop_rate_at(now),
            size: self.frames.len(),
            capacity: self.capacity,
            peak_size: self.peak_size,
            pool_size: self.pool.len(),
            pool_hits: self.pool.hits(),
            pool_misses: self.pool.misses(),
        }
    }
}

impl FrameBuffer for FrameQueue {
    fn push(&mut self, frame: &LedFrame) -> PushOutcome {
        self.push_at(frame, Instant::now())
    }

    /// Remove and return the most recently pushed frame.
    ///
    /// Older frames stay buffered; ordering is traded for recency.
    fn pop_latest(&mut self) -> Option<LedFrame> {
        let frame = self.frames.pop_back()?;
        self.rendered += 1;
        Some(frame)
    }

    fn peek_latest(&self) -> Option<&LedFrame> {
        self.frames.back()
    }

    fn clear(&mut self) {
        for frame in self.frames.drain(..) {
            self.pool.release(frame.data);
        }
    }

    /// Hand a consumed frame's buffer back to the pool
    fn recycle(&mut self, frame: LedFrame) {
        if self.buffer_reuse {
            self.pool.release(frame.data);
        }
    }

    fn stats(&self) -> FrameQueueStats {
        self.stats_at(Instant::now())
    }

    fn reset_stats(&mut self) {
        self.received = 0;
        self.rendered = 0;
        self.dropped = 0;
        self.peak_size = self.frames.len();
        self.recent_drops.clear();
        self.pool.reset_counters();
    }

    fn len(&self) -> usize {
        self.frames.len()
    }
}
