//! # LedVis-RS: live LED fixture viewer
//!
//! Streams binary LED frames from a fixture over a WebSocket, buffers them
//! with a latest-wins queue and draws them at a bounded frame rate.
//!
//! ## Architecture
//!
//! - **Protocol**: 4-byte header binary frames (LED data, heartbeat, metadata, error)
//! - **Stream**: background subscription thread with exponential-backoff reconnects
//! - **Queue**: bounded frame queue with drop policies and buffer reuse
//! - **Mapping**: LED index to 2D position on a circle or arc, with mirror pairs
//! - **Render**: throttled renderer over a canvas or GPU point-sprite backend
//! - **Frontend**: eframe/egui viewer with pan, zoom and live statistics
//! - **Communication**: Crossbeam channels between the stream thread and the UI
//!
//! ## Configuration
//!
//! Settings are read from `config.toml` in the platform-appropriate data
//! directory under `dev.ledvis.ledvis-rs`, or from the file named by
//! `LEDVIS_CONFIG`:
//!
//! - **Linux**: `~/.local/share/dev.ledvis.ledvis-rs/`
//! - **macOS**: `~/Library/Application Support/dev.ledvis.ledvis-rs/`
//! - **Windows**: `%APPDATA%\dev.ledvis.ledvis-rs\`
//!
//! ## Example
//!
//! ```ignore
//! use ledvis_rs::{
//!     mapping::{compute_positions, PositionConfig},
//!     queue::{FrameBuffer, FrameQueue, QueueConfig},
//!     stream::{Subscription, SubscriptionConfig, SubscriptionEvent},
//! };
//!
//! let positions = compute_positions(&PositionConfig::with_led_count(180))?;
//! let mut queue = FrameQueue::new(QueueConfig::default());
//!
//! let (tx, rx) = crossbeam_channel::bounded(256);
//! let mut subscription = Subscription::new(SubscriptionConfig::default(), tx);
//! subscription.start()?;
//!
//! for event in rx.iter() {
//!     if let SubscriptionEvent::Frame(frame) = event {
//!         queue.push(&frame);
//!     }
//! }
//! ```

pub mod app;
pub mod config;
pub mod error;
pub mod frontend;
pub mod mapping;
pub mod protocol;
pub mod queue;
pub mod render;
pub mod stream;
pub mod types;

// Re-export commonly used types
pub use app::LedVisApp;
pub use config::AppConfig;
pub use error::{LedVisError, Result};
pub use mapping::{compute_positions, PositionBuffers, PositionConfig};
pub use queue::{FrameBuffer, FrameQueue};
pub use render::{Renderer, RendererConfig};
pub use stream::{Subscription, SubscriptionConfig, SubscriptionEvent};
pub use types::{ConnectionState, FrameType, LedFrame};
