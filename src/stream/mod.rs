//! Stream subscription with automatic reconnection
//!
//! A [`Subscription`] owns a background thread that keeps a streaming
//! connection to the LED frame endpoint open, decodes incoming binary frames
//! and hands the results to a single [`EventHandler`].
//!
//! # Architecture
//!
//! - [`Subscription`] - owner-side handle: `start()`, `stop()`, `state()`, `stats()`
//! - [`SubscriptionEvent`] - everything the driver reports to the owner
//! - [`EventHandler`] - sink for events, implemented for closures and for
//!   `crossbeam_channel::Sender<SubscriptionEvent>`
//! - [`Backoff`] / [`ReconnectTracker`] - pure reconnect policy
//!
//! # Example
//!
//! ```ignore
//! use ledvis_rs::stream::{Subscription, SubscriptionConfig};
//!
//! let (tx, rx) = crossbeam_channel::bounded(64);
//! let mut sub = Subscription::new(SubscriptionConfig::default(), tx);
//! sub.start()?;
//!
//! // On the UI thread
//! for event in rx.try_iter() {
//!     // push frames into the queue, update the status bar ...
//! }
//!
//! sub.stop();
//! ```

pub mod backoff;
mod driver;

pub use backoff::{Backoff, ReconnectDecision, ReconnectTracker};

use crate::protocol::{streaming_url, ProtocolError, ValidationError};
use crate::types::{ConnectionState, FrameMetadata, LedFrame};
use crossbeam_channel::{Sender, TrySendError};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Errors reported by a subscription
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StreamError {
    #[error("invalid stream URL: {0}")]
    InvalidUrl(String),

    #[error("malformed frame: {0}")]
    Validation(#[from] ValidationError),

    #[error("undecodable frame: {0}")]
    Protocol(#[from] ProtocolError),

    /// ERROR frame sent by the producer
    #[error("server reported error code {code}")]
    Remote { code: u32 },

    #[error("connection closed: {0}")]
    ConnectionClosed(String),

    #[error("gave up after {attempts} reconnect attempts: {last_error}")]
    ReconnectExhausted { attempts: u32, last_error: String },

    /// The background thread or its runtime could not be created
    #[error("stream runtime error: {0}")]
    Runtime(String),
}

/// Connection and reconnection settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubscriptionConfig {
    /// Device base URL (`http://`, `https://`, `ws://` or `wss://`)
    pub url: String,
    /// Expected LED count; LED_DATA frames of any other size are rejected
    pub led_count: usize,
    pub auto_reconnect: bool,
    /// Delay before the first reconnect attempt
    #[serde(with = "crate::config::duration_ms")]
    pub reconnect_delay: Duration,
    #[serde(with = "crate::config::duration_ms")]
    pub max_reconnect_delay: Duration,
    pub max_reconnect_attempts: u32,
    #[serde(with = "crate::config::duration_ms")]
    pub heartbeat_interval: Duration,
    /// Fraction of each backoff delay that may be randomly shaved off
    pub jitter: f64,
    #[serde(with = "crate::config::duration_ms")]
    pub connect_timeout: Duration,
}

impl Default for SubscriptionConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:8080".to_string(),
            led_count: crate::mapping::DEFAULT_LED_COUNT,
            auto_reconnect: true,
            reconnect_delay: Duration::from_millis(1000),
            max_reconnect_delay: Duration::from_millis(30_000),
            max_reconnect_attempts: 10,
            heartbeat_interval: Duration::from_millis(5000),
            jitter: 0.1,
            connect_timeout: Duration::from_secs(5),
        }
    }
}

impl SubscriptionConfig {
    /// Backoff schedule described by this config
    pub fn backoff(&self) -> Backoff {
        Backoff::new(self.reconnect_delay, self.max_reconnect_delay, self.jitter)
    }
}

/// Notification from a running subscription
#[derive(Debug, Clone)]
pub enum SubscriptionEvent {
    Connected,
    Disconnected,
    Reconnecting { attempt: u32, delay: Duration },
    Frame(LedFrame),
    Metadata(FrameMetadata),
    Error(StreamError),
}

/// Receiver of subscription events.
///
/// Called on the subscription's worker thread, so implementations must not
/// block for long.
pub trait EventHandler: Send {
    fn handle(&mut self, event: SubscriptionEvent);
}

impl<F> EventHandler for F
where
    F: FnMut(SubscriptionEvent) + Send,
{
    fn handle(&mut self, event: SubscriptionEvent) {
        self(event)
    }
}

impl EventHandler for Sender<SubscriptionEvent> {
    fn handle(&mut self, event: SubscriptionEvent) {
        match self.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(SubscriptionEvent::Frame(frame))) => {
                tracing::trace!(frame_number = ?frame.frame_number, "Event channel full, frame dropped");
            }
            Err(TrySendError::Full(event)) => {
                tracing::warn!(?event, "Event channel full, event dropped");
            }
            Err(TrySendError::Disconnected(_)) => {
                tracing::trace!("Event receiver gone");
            }
        }
    }
}

/// Counters describing a subscription's lifetime
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubscriptionStats {
    pub state: ConnectionState,
    /// LED frames decoded and dispatched
    pub frames_received: u64,
    /// Frames rejected as malformed
    pub frames_dropped: u64,
    pub bytes_received: u64,
    pub metadata_received: u64,
    pub heartbeats_sent: u64,
    /// Consecutive failed attempts in the current streak
    pub reconnect_attempts: u32,
    /// Successful connections after the first one
    pub total_reconnects: u64,
    /// Round trip of the last echoed heartbeat
    pub last_rtt_ms: Option<u64>,
    pub last_error: Option<String>,
}

/// State shared between the owner and the worker thread
pub(crate) struct Shared {
    stats: Mutex<SubscriptionStats>,
    handler: Mutex<Option<Box<dyn EventHandler>>>,
    stopped: AtomicBool,
}

impl Shared {
    fn new(handler: Box<dyn EventHandler>) -> Self {
        Self {
            stats: Mutex::new(SubscriptionStats::default()),
            handler: Mutex::new(Some(handler)),
            stopped: AtomicBool::new(false),
        }
    }

    pub(crate) fn stats(&self) -> MutexGuard<'_, SubscriptionStats> {
        self.stats.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub(crate) fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    pub(crate) fn set_state(&self, state: ConnectionState) {
        let mut stats = self.stats();
        if stats.state.is_terminal() {
            return;
        }
        if stats.state != state {
            tracing::debug!(from = %stats.state, to = %state, "Subscription state change");
        }
        stats.state = state;
    }

    /// Deliver `event` unless the subscription has been stopped
    pub(crate) fn dispatch(&self, event: SubscriptionEvent) {
        let mut handler = self.handler.lock().unwrap_or_else(|e| e.into_inner());
        if self.is_stopped() {
            return;
        }
        if let Some(handler) = handler.as_mut() {
            handler.handle(event);
        }
    }

    /// Mark stopped and drop the handler.
    ///
    /// Taking the handler lock waits out any dispatch in progress, so no
    /// event reaches the handler once this returns.
    fn shut_down(&self, from_worker: bool) {
        self.stopped.store(true, Ordering::Release);
        if !from_worker {
            self.handler.lock().unwrap_or_else(|e| e.into_inner()).take();
        }
    }
}

/// Handle to a streaming connection
pub struct Subscription {
    config: SubscriptionConfig,
    shared: Arc<Shared>,
    cancel: CancellationToken,
    worker: Option<JoinHandle<()>>,
    worker_id: Option<ThreadId>,
}

impl Subscription {
    pub fn new(config: SubscriptionConfig, handler: impl EventHandler + 'static) -> Self {
        Self {
            config,
            shared: Arc::new(Shared::new(Box::new(handler))),
            cancel: CancellationToken::new(),
            worker: None,
            worker_id: None,
        }
    }

    pub fn config(&self) -> &SubscriptionConfig {
        &self.config
    }

    /// Begin connecting in the background.
    ///
    /// Only an idle subscription can be started; later calls are ignored.
    pub fn start(&mut self) -> Result<(), StreamError> {
        if self.state() != ConnectionState::Idle || self.worker.is_some() {
            tracing::debug!(state = %self.state(), "start() ignored, subscription not idle");
            return Ok(());
        }

        let url = streaming_url(&self.config.url)?;
        tracing::info!(%url, led_count = self.config.led_count, "Starting subscription");
        self.shared.set_state(ConnectionState::Connecting);

        let shared = Arc::clone(&self.shared);
        let cancel = self.cancel.clone();
        let config = self.config.clone();
        let spawned = thread::Builder::new()
            .name("ledvis-stream".into())
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(rt) => rt,
                    Err(e) => {
                        let err = StreamError::Runtime(e.to_string());
                        tracing::error!(error = %err, "Failed to build stream runtime");
                        shared.stats().last_error = Some(err.to_string());
                        shared.set_state(ConnectionState::Failed);
                        shared.dispatch(SubscriptionEvent::Error(err));
                        return;
                    }
                };
                runtime.block_on(driver::run(url, config, shared, cancel));
            });

        match spawned {
            Ok(handle) => {
                self.worker_id = Some(handle.thread().id());
                self.worker = Some(handle);
                Ok(())
            }
            Err(e) => {
                self.shared.set_state(ConnectionState::Failed);
                Err(StreamError::Runtime(e.to_string()))
            }
        }
    }

    /// Stop the subscription and close any open connection.
    ///
    /// Safe to call repeatedly and from inside the event handler. Once it
    /// returns the handler receives no further events.
    pub fn stop(&mut self) {
        let from_worker = self.worker_id == Some(thread::current().id());
        if !self.shared.is_stopped() {
            tracing::info!("Stopping subscription");
        }
        self.shared.set_state(ConnectionState::Stopped);
        self.cancel.cancel();
        self.shared.shut_down(from_worker);

        if from_worker {
            return;
        }
        if let Some(handle) = self.worker.take() {
            if handle.join().is_err() {
                tracing::error!("Stream worker thread panicked");
            }
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.stats().state
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Snapshot of the counters
    pub fn stats(&self) -> SubscriptionStats {
        self.shared.stats().clone()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::bounded;

    #[test]
    fn test_new_subscription_is_idle() {
        let (tx, _rx) = bounded(4);
        let sub = Subscription::new(SubscriptionConfig::default(), tx);
        assert_eq!(sub.state(), ConnectionState::Idle);
        assert_eq!(sub.stats(), SubscriptionStats::default());
    }

    #[test]
    fn test_stop_before_start_is_idempotent() {
        let (tx, rx) = bounded(4);
        let mut sub = Subscription::new(SubscriptionConfig::default(), tx);
        sub.stop();
        sub.stop();
        assert_eq!(sub.state(), ConnectionState::Stopped);
        // A stopped subscription cannot be restarted
        sub.start().unwrap();
        assert_eq!(sub.state(), ConnectionState::Stopped);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_invalid_url_is_rejected_on_start() {
        let (tx, _rx) = bounded(4);
        let config = SubscriptionConfig {
            url: "ftp://device".into(),
            ..Default::default()
        };
        let mut sub = Subscription::new(config, tx);
        assert!(matches!(sub.start(), Err(StreamError::InvalidUrl(_))));
        assert_eq!(sub.state(), ConnectionState::Idle);
    }

    #[test]
    fn test_dispatch_after_shutdown_is_suppressed() {
        let (tx, rx) = bounded(4);
        let shared = Shared::new(Box::new(tx));
        shared.dispatch(SubscriptionEvent::Connected);
        shared.shut_down(false);
        shared.dispatch(SubscriptionEvent::Disconnected);
        assert!(matches!(rx.try_recv(), Ok(SubscriptionEvent::Connected)));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_terminal_state_is_sticky() {
        let (tx, _rx) = bounded(1);
        let shared = Shared::new(Box::new(tx));
        shared.set_state(ConnectionState::Failed);
        shared.set_state(ConnectionState::Connecting);
        assert_eq!(shared.stats().state, ConnectionState::Failed);
    }

    #[test]
    fn test_closure_handler() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let shared = Shared::new(Box::new(move |e: SubscriptionEvent| {
            sink.lock().unwrap().push(format!("{:?}", e));
        }));
        shared.dispatch(SubscriptionEvent::Reconnecting {
            attempt: 1,
            delay: Duration::from_millis(10),
        });
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_full_channel_does_not_block() {
        let (tx, rx) = bounded(1);
        let mut handler: Box<dyn EventHandler> = Box::new(tx);
        handler.handle(SubscriptionEvent::Connected);
        handler.handle(SubscriptionEvent::Disconnected);
        assert_eq!(rx.len(), 1);
    }
}
