//! Frontend module for egui UI
//!
//! The viewer owns the whole consumer side of the pipeline on the UI thread:
//! it drains [`SubscriptionEvent`]s from a crossbeam channel, pushes frames
//! into the frame queue and lets the [`Renderer`] pull the newest one on
//! every repaint.
//!
//! # Main Types
//!
//! - [`LedVisApp`] - Main application state implementing [`eframe::App`]
//!
//! # Submodules
//!
//! - `canvas` - LED canvas with pan, zoom, rotate and hover
//! - `status_bar` - Bottom bar with connection and throughput info
//! - `performance` - Side panel with render history and counters

pub mod canvas;
pub mod performance;
pub mod status_bar;

use crate::config::AppConfig;
use crate::error::{Result, ResultExt};
use crate::mapping::{compute_positions, DEFAULT_SYMMETRY_TOLERANCE};
use crate::queue::{AdaptiveFrameQueue, FrameBuffer, FrameQueue, QueueConfig};
use crate::render::{create_backend, Renderer};
use crate::stream::{StreamError, Subscription, SubscriptionEvent, SubscriptionStats};
use crate::types::{FrameMetadata, BYTES_PER_LED};
use crossbeam_channel::{bounded, Receiver};
use performance::{PerformanceAction, PerformanceContext};
use status_bar::StatusBarContext;
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

/// Capacity of the channel between the stream thread and the UI
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Most events handled per UI frame
const EVENT_BUDGET: usize = 512;

/// Main application state
pub struct LedVisApp {
    config: AppConfig,
    url_input: String,

    // === Stream ===
    subscription: Option<Subscription>,
    events: Option<Receiver<SubscriptionEvent>>,
    last_stream_stats: SubscriptionStats,
    last_metadata: Option<FrameMetadata>,
    last_error: Option<String>,

    // === Render pipeline ===
    queue: Rc<RefCell<dyn FrameBuffer>>,
    renderer: Renderer,

    show_performance: bool,
}

/// Build the queue selected by `config`
pub fn build_queue(config: &QueueConfig) -> Rc<RefCell<dyn FrameBuffer>> {
    if config.adaptive.enabled {
        Rc::new(RefCell::new(AdaptiveFrameQueue::new(config.clone())))
    } else {
        Rc::new(RefCell::new(FrameQueue::new(config.clone())))
    }
}

impl LedVisApp {
    pub fn new(cc: &eframe::CreationContext<'_>, mut config: AppConfig) -> Result<Self> {
        let positions = Arc::new(compute_positions(&config.mapping).context("computing LED layout")?);
        let symmetry = positions.validate_mirror_symmetry(DEFAULT_SYMMETRY_TOLERANCE);
        tracing::info!(
            leds = positions.len(),
            symmetric = symmetry.valid,
            "LED layout ready"
        );

        config.subscription.led_count = config.mapping.led_count;
        if config.queue.frame_len == 0 {
            config.queue.frame_len = config.mapping.led_count * BYTES_PER_LED;
        }

        let queue = build_queue(&config.queue);
        let backend = create_backend(config.renderer.prefer_accelerated_backend, cc.gl.as_ref());
        tracing::info!(backend = %backend.kind(), "Render backend selected");

        let mut renderer = Renderer::new(
            backend,
            positions,
            Rc::clone(&queue),
            config.renderer.clone(),
        );
        renderer.start();

        let mut app = Self {
            url_input: config.subscription.url.clone(),
            config,
            subscription: None,
            events: None,
            last_stream_stats: SubscriptionStats::default(),
            last_metadata: None,
            last_error: None,
            queue,
            renderer,
            show_performance: false,
        };
        app.connect();
        Ok(app)
    }

    /// (Re)open the stream using the URL in the toolbar
    fn connect(&mut self) {
        self.disconnect();
        self.config.subscription.url = self.url_input.trim().to_string();

        let (tx, rx) = bounded(EVENT_CHANNEL_CAPACITY);
        let mut subscription = Subscription::new(self.config.subscription.clone(), tx);
        match subscription.start() {
            Ok(()) => {
                self.subscription = Some(subscription);
                self.events = Some(rx);
                self.last_error = None;
            }
            Err(e) => {
                tracing::warn!("Cannot start stream: {}", e);
                self.last_error = Some(e.to_string());
            }
        }
    }

    fn disconnect(&mut self) {
        if let Some(mut subscription) = self.subscription.take() {
            subscription.stop();
            self.last_stream_stats = subscription.stats();
        }
        self.events = None;
        self.queue.borrow_mut().clear();
    }

    /// Move pending stream events into the queue and UI state
    fn process_stream_events(&mut self) -> bool {
        let Some(events) = &self.events else {
            return false;
        };

        let mut handled = 0;
        for event in events.try_iter().take(EVENT_BUDGET) {
            handled += 1;
            match event {
                SubscriptionEvent::Frame(frame) => {
                    self.queue.borrow_mut().push(&frame);
                }
                SubscriptionEvent::Metadata(meta) => {
                    self.last_metadata = Some(meta);
                }
                SubscriptionEvent::Connected => {
                    self.last_error = None;
                }
                SubscriptionEvent::Disconnected => {
                    self.queue.borrow_mut().clear();
                }
                SubscriptionEvent::Reconnecting { attempt, delay } => {
                    tracing::debug!(attempt, ?delay, "Reconnect scheduled");
                }
                SubscriptionEvent::Error(StreamError::Validation(_) | StreamError::Protocol(_)) => {
                    // Counted in the stream stats; the connection stays up
                }
                SubscriptionEvent::Error(e) => {
                    self.last_error = Some(e.to_string());
                }
            }
        }
        handled > 0
    }

    fn stream_stats(&self) -> SubscriptionStats {
        match &self.subscription {
            Some(subscription) => subscription.stats(),
            None => self.last_stream_stats.clone(),
        }
    }

    fn render_toolbar(&mut self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            ui.label("Device:");
            let response = ui.add(
                egui::TextEdit::singleline(&mut self.url_input)
                    .desired_width(260.0)
                    .hint_text("http://192.168.4.1"),
            );
            let submitted =
                response.lost_focus() && ui.input(|i| i.key_pressed(egui::Key::Enter));

            let active = self
                .subscription
                .as_ref()
                .is_some_and(|s| !s.state().is_terminal());
            if active {
                if ui.button("Disconnect").clicked() {
                    self.disconnect();
                }
            } else if ui.button("Connect").clicked() || submitted {
                self.connect();
            }

            ui.separator();

            if ui.button("Reset view").clicked() {
                self.renderer.reset_transform();
            }
            ui.toggle_value(&mut self.show_performance, "Performance");

            ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                if ui.button("Save config").clicked() {
                    match self.config.save_default_location() {
                        Ok(()) => tracing::info!("Configuration saved"),
                        Err(e) => self.last_error = Some(e.to_string()),
                    }
                }
            });
        });
    }
}

impl eframe::App for LedVisApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        let had_events = self.process_stream_events();

        let stream_stats = self.stream_stats();
        let queue_stats = self.queue.borrow().stats();
        let render_stats = self.renderer.stats();

        egui::TopBottomPanel::top("toolbar").show(ctx, |ui| {
            self.render_toolbar(ui);
        });

        egui::TopBottomPanel::bottom("status_bar").show(ctx, |ui| {
            status_bar::render_status_bar(
                ui,
                &StatusBarContext {
                    url: &self.config.subscription.url,
                    stream: &stream_stats,
                    queue: &queue_stats,
                    render: &render_stats,
                    backend: self.renderer.backend_kind(),
                    metadata: self.last_metadata.as_ref(),
                    last_error: self.last_error.as_deref(),
                },
            );
        });

        if self.show_performance {
            let history = self.renderer.performance_history();
            let action = egui::SidePanel::right("performance")
                .default_width(320.0)
                .show(ctx, |ui| {
                    performance::render_performance_panel(
                        ui,
                        &PerformanceContext {
                            history: &history,
                            render: &render_stats,
                            queue: &queue_stats,
                            stream: &stream_stats,
                        },
                    )
                })
                .inner;
            if action == Some(PerformanceAction::ClearStats) {
                self.renderer.clear_stats();
                self.queue.borrow_mut().reset_stats();
            }
        }

        let repaint_after = egui::CentralPanel::default()
            .frame(egui::Frame::NONE)
            .show(ctx, |ui| canvas::show_led_canvas(ui, &mut self.renderer))
            .inner;

        match repaint_after {
            Some(wait) => ctx.request_repaint_after(wait),
            None if had_events => ctx.request_repaint(),
            None => {}
        }
    }

    fn on_exit(&mut self, gl: Option<&eframe::glow::Context>) {
        self.disconnect();
        self.renderer.stop();
        if let Some(gl) = gl {
            self.renderer.destroy(gl);
        }

        if let Err(e) = self.config.save_default_location() {
            tracing::warn!("Failed to save config on exit: {}", e);
        }
    }
}
