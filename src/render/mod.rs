//! Frame-rate limited LED renderer
//!
//! The [`Renderer`] pulls the newest frame from a [`FrameSource`] on every
//! executed tick, combines it with the mapper's [`PositionBuffers`] and a
//! [`ViewTransform`], and hands the resulting [`Scene`] to a
//! [`RenderBackend`].
//!
//! Ticks come from the host's event loop (egui's repaint cycle in the viewer).
//! A tick that arrives sooner than `1000 / max_fps` ms after the last executed
//! one returns [`TickOutcome::Skipped`] with the remaining wait so the host
//! can schedule the next repaint instead of spinning.

pub mod backend;
pub mod canvas;
pub mod point_sprite;
pub mod stats;

pub use backend::{BackendKind, RenderBackend, Scene, Viewport};
pub use canvas::CanvasBackend;
pub use point_sprite::PointSpriteBackend;
pub use stats::{PerformanceSample, RenderStats, HISTORY_LEN};

use crate::mapping::{Affine, PositionBuffers};
use crate::queue::FrameBuffer;
use crate::types::{LedFrame, BYTES_PER_LED};
use eframe::glow;
use serde::{Deserialize, Serialize};
use stats::StatsTracker;
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Smallest zoom factor accepted by [`Renderer::set_transform`]
pub const MIN_ZOOM: f32 = 0.01;

/// Share of the shorter viewport side the fitted layout occupies
const FIT_MARGIN: f32 = 0.9;

/// Renderer settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    /// LED disc radius in layout units
    pub led_radius: f32,
    pub background_color: [u8; 3],
    /// Color of the base layer under every LED
    pub filler_color: [u8; 3],
    pub max_fps: u32,
    /// Overrides the pixel ratio reported by the surface
    pub pixel_ratio: Option<f32>,
    pub prefer_accelerated_backend: bool,
    /// Brightest channel at or above which an LED gets a halo
    pub glow_threshold: u8,
    /// Halo radius as a multiple of the LED radius
    pub glow_scale: f32,
    /// Scale the layout to fit the viewport before applying zoom
    pub fit_to_view: bool,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            led_radius: 4.0,
            background_color: [12, 12, 14],
            filler_color: [32, 32, 36],
            max_fps: 60,
            pixel_ratio: None,
            prefer_accelerated_backend: true,
            glow_threshold: 230,
            glow_scale: 2.5,
            fit_to_view: true,
        }
    }
}

impl RendererConfig {
    /// Minimum time between executed ticks
    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.max_fps.max(1) as f64)
    }
}

/// Pan, zoom and rotation applied on top of the fitted layout
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewTransform {
    pub zoom: f32,
    /// Horizontal offset in points
    pub pan_x: f32,
    /// Vertical offset in points
    pub pan_y: f32,
    /// Rotation in radians around the layout center
    pub rotation: f32,
}

impl Default for ViewTransform {
    fn default() -> Self {
        Self {
            zoom: 1.0,
            pan_x: 0.0,
            pan_y: 0.0,
            rotation: 0.0,
        }
    }
}

/// Partial update for [`ViewTransform`]; `None` fields are left unchanged
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ViewTransformUpdate {
    pub zoom: Option<f32>,
    pub pan_x: Option<f32>,
    pub pan_y: Option<f32>,
    pub rotation: Option<f32>,
}

/// Result of [`Renderer::tick`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// The renderer is not running
    Stopped,
    /// Too early; try again after `wait`
    Skipped { wait: Duration },
    /// A frame (or the placeholder) was drawn
    Rendered,
}

/// Supplier of frames for the renderer
pub trait FrameSource {
    /// Newest available frame, if any
    fn latest_frame(&mut self) -> Option<LedFrame>;

    /// Hand a consumed frame back so its buffer can be reused
    fn recycle(&mut self, _frame: LedFrame) {}
}

impl<F> FrameSource for F
where
    F: FnMut() -> Option<LedFrame>,
{
    fn latest_frame(&mut self) -> Option<LedFrame> {
        self()
    }
}

impl<B> FrameSource for Rc<RefCell<B>>
where
    B: FrameBuffer + ?Sized,
{
    fn latest_frame(&mut self) -> Option<LedFrame> {
        self.borrow_mut().pop_latest()
    }

    fn recycle(&mut self, frame: LedFrame) {
        self.borrow_mut().recycle(frame)
    }
}

/// Pick a backend: point sprites when preferred and a GL context is usable,
/// the canvas backend otherwise.
pub fn create_backend(
    prefer_accelerated: bool,
    gl: Option<&Arc<glow::Context>>,
) -> Box<dyn RenderBackend> {
    if prefer_accelerated {
        match gl.map(|gl| PointSpriteBackend::new(gl)) {
            Some(Ok(backend)) => return Box::new(backend),
            Some(Err(e)) => {
                tracing::warn!(error = %e, "Point sprite backend unavailable, using canvas");
            }
            None => {
                tracing::warn!("No GL context, using canvas backend");
            }
        }
    }
    Box::new(CanvasBackend::new())
}

/// Throttled renderer for one LED layout
pub struct Renderer {
    backend: Box<dyn RenderBackend>,
    positions: Arc<PositionBuffers>,
    source: Box<dyn FrameSource>,
    config: RendererConfig,
    transform: ViewTransform,
    viewport: Viewport,
    layout_center: (f32, f32),
    /// Half extent of the layout including the LED radius
    layout_extent: f32,
    running: bool,
    last_frame_at: Option<Instant>,
    scene: Scene,
    affine: Affine,
    stats: StatsTracker,
}

impl Renderer {
    pub fn new(
        backend: Box<dyn RenderBackend>,
        positions: Arc<PositionBuffers>,
        source: impl FrameSource + 'static,
        config: RendererConfig,
    ) -> Self {
        let (layout_center, layout_extent) = match positions.bounds() {
            Some(b) => (b.center(), b.width().max(b.height()) * 0.5 + config.led_radius),
            None => ((0.0, 0.0), config.led_radius),
        };
        let mut renderer = Self {
            backend,
            positions,
            source: Box::new(source),
            config,
            transform: ViewTransform::default(),
            viewport: Viewport::default(),
            layout_center,
            layout_extent,
            running: false,
            last_frame_at: None,
            scene: Scene::default(),
            affine: Affine::IDENTITY,
            stats: StatsTracker::default(),
        };
        renderer.apply_viewport(Viewport::default());
        renderer
    }

    pub fn start(&mut self) {
        if !self.running {
            tracing::debug!(backend = %self.backend.kind(), max_fps = self.config.max_fps, "Renderer started");
        }
        self.running = true;
    }

    /// Stop rendering; safe to call when not started
    pub fn stop(&mut self) {
        if self.running {
            tracing::debug!("Renderer stopped");
        }
        self.running = false;
        self.last_frame_at = None;
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn backend_kind(&self) -> BackendKind {
        self.backend.kind()
    }

    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    pub fn positions(&self) -> &Arc<PositionBuffers> {
        &self.positions
    }

    /// Run one scheduling tick at `now`
    pub fn tick(&mut self, now: Instant) -> TickOutcome {
        if !self.running {
            return TickOutcome::Stopped;
        }
        let wait = self.time_until_next_frame(now);
        if !wait.is_zero() {
            self.stats.record_skip();
            return TickOutcome::Skipped { wait };
        }
        self.last_frame_at = Some(now);

        let started = Instant::now();
        let frame = self.source.latest_frame();
        self.prepare_scene(frame.as_ref());
        let draw_calls = self.backend.draw(&self.scene);

        let dropped = frame.is_none();
        if let Some(frame) = frame {
            self.source.recycle(frame);
        } else {
            tracing::trace!("No frame available, drew placeholder");
        }
        self.stats.record_frame(now, started.elapsed(), draw_calls, dropped);
        TickOutcome::Rendered
    }

    /// Time left before a tick at `now` would render; zero when one is due
    pub fn time_until_next_frame(&self, now: Instant) -> Duration {
        match self.last_frame_at {
            Some(last) => self
                .config
                .frame_interval()
                .saturating_sub(now.saturating_duration_since(last)),
            None => Duration::ZERO,
        }
    }

    fn prepare_scene(&mut self, frame: Option<&LedFrame>) {
        let n = self.positions.len();
        let scale = self.affine.scale_factor();
        let scene = &mut self.scene;

        let ratio = self.viewport.pixel_ratio;

        scene.background = self.config.background_color;
        scene.filler = self.config.filler_color;
        scene.pixel_ratio = ratio;
        scene.led_radius = (self.config.led_radius * scale).max(0.5 / ratio);
        scene.glow_radius = scene.led_radius * self.config.glow_scale;
        self.affine.apply_into(self.positions.positions(), &mut scene.positions);
        // Snap centers to the physical pixel grid
        for c in scene.positions.iter_mut() {
            *c = (*c * ratio).round() / ratio;
        }

        scene.colors.clear();
        scene.lit.clear();
        scene.glow.clear();
        scene.placeholder = frame.is_none();

        let wanted = n * BYTES_PER_LED;
        match frame {
            Some(frame) => {
                let available = frame.data.len().min(wanted);
                scene.colors.extend_from_slice(&frame.data[..available]);
                scene.colors.resize(wanted, 0);
            }
            None => scene.colors.resize(wanted, 0),
        }

        let threshold = self.config.glow_threshold;
        for (i, rgb) in scene.colors.chunks_exact(BYTES_PER_LED).enumerate() {
            let brightest = rgb[0].max(rgb[1]).max(rgb[2]);
            if brightest == 0 {
                continue;
            }
            scene.lit.push(i as u32);
            if brightest >= threshold {
                scene.glow.push(i as u32);
            }
        }
    }

    /// Merge `update` into the view transform; used from the next tick on
    pub fn set_transform(&mut self, update: ViewTransformUpdate) {
        if let Some(zoom) = update.zoom {
            if zoom.is_finite() {
                self.transform.zoom = zoom.max(MIN_ZOOM);
            }
        }
        if let Some(pan_x) = update.pan_x.filter(|v| v.is_finite()) {
            self.transform.pan_x = pan_x;
        }
        if let Some(pan_y) = update.pan_y.filter(|v| v.is_finite()) {
            self.transform.pan_y = pan_y;
        }
        if let Some(rotation) = update.rotation.filter(|v| v.is_finite()) {
            self.transform.rotation = rotation;
        }
        self.update_affine();
    }

    pub fn transform(&self) -> ViewTransform {
        self.transform
    }

    pub fn reset_transform(&mut self) {
        self.transform = ViewTransform::default();
        self.update_affine();
    }

    /// Resize the surface to `width` x `height` points.
    ///
    /// `surface_pixel_ratio` is used unless the config overrides it. Stats
    /// and the last drawn frame are kept.
    pub fn resize(&mut self, width: f32, height: f32, surface_pixel_ratio: f32) {
        let pixel_ratio = self.config.pixel_ratio.unwrap_or(surface_pixel_ratio);
        let viewport = Viewport {
            width: width.max(0.0),
            height: height.max(0.0),
            pixel_ratio: if pixel_ratio > 0.0 { pixel_ratio } else { 1.0 },
        };
        if viewport != self.viewport {
            self.apply_viewport(viewport);
        }
    }

    fn apply_viewport(&mut self, viewport: Viewport) {
        self.viewport = viewport;
        self.backend.resize(viewport);
        self.update_affine();
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    fn update_affine(&mut self) {
        let fit = if self.config.fit_to_view && self.layout_extent > 0.0 {
            0.5 * self.viewport.width.min(self.viewport.height) * FIT_MARGIN / self.layout_extent
        } else {
            1.0
        };
        let (cx, cy) = self.layout_center;
        let (vx, vy) = self.viewport.center();
        let t = &self.transform;
        self.affine = Affine::translation(-cx, -cy)
            .then(&Affine::scale(fit * t.zoom))
            .then(&Affine::rotation(t.rotation))
            .then(&Affine::translation(vx + t.pan_x, vy + t.pan_y));
    }

    /// Layout-to-viewport transform currently in effect
    pub fn view_affine(&self) -> Affine {
        self.affine
    }

    /// LED under viewport point `(x, y)`, if any
    pub fn screen_to_led(&self, x: f32, y: f32) -> Option<usize> {
        let (wx, wy) = self.affine.inverse()?.apply(x, y);
        let index = self.positions.pos_to_index(wx, wy)?;
        let (lx, ly) = self.positions.index_to_pos(index);
        let (sx, sy) = self.affine.apply(lx, ly);
        let hit_radius = (self.config.led_radius * self.affine.scale_factor() * 1.5).max(4.0);
        let d2 = (sx - x).powi(2) + (sy - y).powi(2);
        (d2 <= hit_radius * hit_radius).then_some(index)
    }

    /// Color of LED `index` in the last drawn scene
    pub fn led_color(&self, index: usize) -> Option<[u8; 3]> {
        let start = index.checked_mul(BYTES_PER_LED)?;
        let bytes = self.scene.colors.get(start..start.checked_add(BYTES_PER_LED)?)?;
        Some([bytes[0], bytes[1], bytes[2]])
    }

    /// Paint the last drawn scene into `rect`
    pub fn paint(&self, painter: &egui::Painter, rect: egui::Rect) {
        self.backend.paint(painter, rect);
    }

    pub fn stats(&self) -> RenderStats {
        self.stats.stats().clone()
    }

    pub fn clear_stats(&mut self) {
        self.stats.clear();
    }

    /// Up to [`HISTORY_LEN`] one-second samples, oldest first
    pub fn performance_history(&self) -> Vec<PerformanceSample> {
        self.stats.history().iter().copied().collect()
    }

    /// Free backend GPU resources
    pub fn destroy(&mut self, gl: &glow::Context) {
        self.backend.destroy(gl);
    }
}

#[cfg(test)]
mod tests {
    use super::backend::MockRenderBackend;
    use super::*;
    use crate::mapping::{compute_positions, PositionConfig};
    use crate::queue::{DropPolicy, FrameQueue};
    use crate::types::{FrameHeader, FrameType};
    use std::sync::Mutex;

    fn positions(n: usize) -> Arc<PositionBuffers> {
        Arc::new(compute_positions(&PositionConfig::with_led_count(n)).unwrap())
    }

    fn frame(data: Vec<u8>) -> LedFrame {
        LedFrame::new(
            FrameHeader {
                version: 1,
                frame_type: FrameType::LedData,
                reserved: 0,
            },
            data,
        )
    }

    fn no_frames() -> Option<LedFrame> {
        None
    }

    fn quiet_backend() -> MockRenderBackend {
        let mut backend = MockRenderBackend::new();
        backend.expect_resize().return_const(());
        backend.expect_kind().return_const(BackendKind::Canvas);
        backend
    }

    #[test]
    fn test_stopped_renderer_does_not_draw() {
        let mut backend = quiet_backend();
        backend.expect_draw().never();
        let mut renderer = Renderer::new(
            Box::new(backend),
            positions(4),
            no_frames,
            RendererConfig::default(),
        );
        assert_eq!(renderer.tick(Instant::now()), TickOutcome::Stopped);
        renderer.stop();
        assert!(!renderer.is_running());
    }

    #[test]
    fn test_missing_frame_draws_placeholder_and_counts_drop() {
        let mut backend = quiet_backend();
        backend
            .expect_draw()
            .withf(|scene: &Scene| scene.placeholder && scene.lit.is_empty() && scene.led_count() == 4)
            .times(1)
            .return_const(2u32);
        let mut renderer = Renderer::new(
            Box::new(backend),
            positions(4),
            no_frames,
            RendererConfig::default(),
        );
        renderer.start();
        assert_eq!(renderer.tick(Instant::now()), TickOutcome::Rendered);
        assert!(renderer.is_running());

        let stats = renderer.stats();
        assert_eq!(stats.dropped_frames, 1);
        assert_eq!(stats.total_frames, 1);
        assert_eq!(stats.draw_calls, 2);
    }

    #[test]
    fn test_ticks_are_throttled_to_max_fps() {
        let mut backend = quiet_backend();
        backend.expect_draw().times(2).return_const(1u32);
        let config = RendererConfig {
            max_fps: 10,
            ..Default::default()
        };
        let mut renderer = Renderer::new(Box::new(backend), positions(2), no_frames, config);
        renderer.start();

        let t0 = Instant::now();
        assert_eq!(renderer.tick(t0), TickOutcome::Rendered);
        assert_eq!(
            renderer.tick(t0 + Duration::from_millis(40)),
            TickOutcome::Skipped {
                wait: Duration::from_millis(60)
            }
        );
        assert_eq!(renderer.tick(t0 + Duration::from_millis(100)), TickOutcome::Rendered);
        assert_eq!(renderer.stats().skipped_ticks, 1);
    }

    #[test]
    fn test_lit_and_glow_selection() {
        let mut backend = quiet_backend();
        backend
            .expect_draw()
            .withf(|scene: &Scene| {
                !scene.placeholder && scene.lit == vec![1, 2] && scene.glow == vec![2]
            })
            .times(1)
            .return_const(4u32);
        let mut pending = Some(frame(vec![0, 0, 0, 10, 0, 0, 0, 255, 0]));
        let mut renderer = Renderer::new(
            Box::new(backend),
            positions(3),
            move || pending.take(),
            RendererConfig::default(),
        );
        renderer.start();
        renderer.tick(Instant::now());
        assert_eq!(renderer.led_color(2), Some([0, 255, 0]));
        assert_eq!(renderer.stats().dropped_frames, 0);
    }

    #[test]
    fn test_queue_source_recycles_frames() {
        let queue = Rc::new(RefCell::new(FrameQueue::with_capacity(3, DropPolicy::Oldest)));
        queue.borrow_mut().push(&frame(vec![1, 2, 3, 4, 5, 6]));

        let mut renderer = Renderer::new(
            Box::new(CanvasBackend::new()),
            positions(2),
            Rc::clone(&queue),
            RendererConfig::default(),
        );
        renderer.start();
        renderer.tick(Instant::now());

        let queue = queue.borrow();
        assert!(queue.is_empty());
        assert_eq!(queue.stats().rendered, 1);
        assert!(queue.stats().pool_size >= 1);
    }

    #[test]
    fn test_transform_merge_and_zoom_clamp() {
        let mut renderer = Renderer::new(
            Box::new(quiet_backend()),
            positions(8),
            no_frames,
            RendererConfig::default(),
        );
        renderer.set_transform(ViewTransformUpdate {
            pan_x: Some(10.0),
            ..Default::default()
        });
        renderer.set_transform(ViewTransformUpdate {
            zoom: Some(-2.0),
            rotation: Some(0.5),
            ..Default::default()
        });
        let t = renderer.transform();
        assert_eq!(t.pan_x, 10.0);
        assert_eq!(t.pan_y, 0.0);
        assert_eq!(t.zoom, MIN_ZOOM);
        assert_eq!(t.rotation, 0.5);

        renderer.reset_transform();
        assert_eq!(renderer.transform(), ViewTransform::default());
    }

    #[test]
    fn test_resize_uses_override_pixel_ratio() {
        let mut backend = MockRenderBackend::new();
        backend.expect_kind().return_const(BackendKind::Canvas);
        backend
            .expect_resize()
            .withf(|v: &Viewport| v.width == 800.0)
            .return_const(());
        backend
            .expect_resize()
            .withf(|v: &Viewport| v.width == 400.0 && v.pixel_ratio == 2.0)
            .times(1)
            .return_const(());
        let config = RendererConfig {
            pixel_ratio: Some(2.0),
            ..Default::default()
        };
        let mut renderer = Renderer::new(Box::new(backend), positions(4), no_frames, config);
        renderer.resize(400.0, 300.0, 1.0);
        assert_eq!(renderer.viewport().pixel_ratio, 2.0);
        // Same size again is a no-op
        renderer.resize(400.0, 300.0, 1.0);
    }

    fn drawn_scene(pixel_ratio: f32) -> Scene {
        let sink = Arc::new(Mutex::new(None));
        let captured = Arc::clone(&sink);
        let mut backend = quiet_backend();
        backend.expect_draw().returning(move |scene: &Scene| {
            *captured.lock().unwrap() = Some(scene.clone());
            1
        });
        let config = RendererConfig {
            led_radius: 0.0,
            ..Default::default()
        };
        let mut renderer = Renderer::new(Box::new(backend), positions(12), no_frames, config);
        renderer.resize(301.0, 301.0, pixel_ratio);
        renderer.set_transform(ViewTransformUpdate {
            pan_x: Some(0.37),
            rotation: Some(0.2),
            ..Default::default()
        });
        renderer.start();
        renderer.tick(Instant::now());
        let scene = sink.lock().unwrap().take().unwrap();
        scene
    }

    #[test]
    fn test_scene_follows_surface_pixel_ratio() {
        let sharp = drawn_scene(3.0);
        let plain = drawn_scene(1.0);

        assert_eq!(sharp.pixel_ratio, 3.0);
        assert_eq!(plain.pixel_ratio, 1.0);
        // A zero radius is raised to half a physical pixel
        assert!((sharp.led_radius - 0.5 / 3.0).abs() < 1e-6);
        assert!((plain.led_radius - 0.5).abs() < 1e-6);

        for (scene, ratio) in [(&sharp, 3.0f32), (&plain, 1.0)] {
            for &c in &scene.positions {
                let px = c * ratio;
                assert!((px - px.round()).abs() < 1e-3, "{c} is off the {ratio}x grid");
            }
        }
        assert_ne!(sharp.positions, plain.positions);
    }

    #[test]
    fn test_resize_keeps_stats_and_last_frame() {
        let mut backend = quiet_backend();
        backend.expect_draw().times(1).return_const(3u32);
        let mut pending = Some(frame(vec![9, 8, 7, 0, 0, 0]));
        let mut renderer = Renderer::new(
            Box::new(backend),
            positions(2),
            move || pending.take(),
            RendererConfig::default(),
        );
        renderer.resize(400.0, 300.0, 1.0);
        renderer.start();
        assert_eq!(renderer.tick(Instant::now()), TickOutcome::Rendered);
        let before = renderer.stats();

        renderer.resize(640.0, 480.0, 2.0);
        assert_eq!(renderer.viewport().pixel_ratio, 2.0);

        let after = renderer.stats();
        assert_eq!(after.total_frames, before.total_frames);
        assert_eq!(after.dropped_frames, before.dropped_frames);
        assert_eq!(after.draw_calls, 3);
        assert_eq!(renderer.led_color(0), Some([9, 8, 7]));
        assert!(renderer.is_running());
    }

    #[test]
    fn test_led_color_out_of_range_is_none() {
        let mut renderer = Renderer::new(
            Box::new(quiet_backend()),
            positions(2),
            no_frames,
            RendererConfig::default(),
        );
        assert_eq!(renderer.led_color(usize::MAX / 3), None);
        assert_eq!(renderer.led_color(usize::MAX), None);
        renderer.resize(100.0, 100.0, 1.0);
        assert_eq!(renderer.led_color(2), None);
    }

    #[test]
    fn test_screen_to_led_hits_drawn_position() {
        let mut renderer = Renderer::new(
            Box::new(CanvasBackend::new()),
            positions(12),
            no_frames,
            RendererConfig::default(),
        );
        renderer.resize(400.0, 400.0, 1.0);
        let (x, y) = renderer.positions().index_to_pos(3);
        let (sx, sy) = renderer.view_affine().apply(x, y);
        assert_eq!(renderer.screen_to_led(sx + 1.0, sy), Some(3));
        let (cx, cy) = renderer.viewport().center();
        assert_eq!(renderer.screen_to_led(cx, cy), None);
    }

    #[test]
    fn test_fitted_layout_stays_inside_viewport() {
        let mut renderer = Renderer::new(
            Box::new(CanvasBackend::new()),
            positions(60),
            no_frames,
            RendererConfig::default(),
        );
        renderer.resize(300.0, 200.0, 1.0);
        let affine = renderer.view_affine();
        for i in 0..60 {
            let (x, y) = renderer.positions().index_to_pos(i);
            let (sx, sy) = affine.apply(x, y);
            assert!((0.0..=300.0).contains(&sx));
            assert!((0.0..=200.0).contains(&sy));
        }
    }
}
