//! Drawing backend abstraction
//!
//! The renderer prepares a [`Scene`] in viewport-local coordinates (logical
//! points, origin top-left) and hands it to a [`RenderBackend`]. Backends turn
//! the scene into something egui can paint: plain shapes for
//! [`CanvasBackend`](super::CanvasBackend), a GPU paint callback for
//! [`PointSpriteBackend`](super::PointSpriteBackend).

use eframe::glow;

/// Which backend implementation is active
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Canvas,
    PointSprite,
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendKind::Canvas => write!(f, "Canvas"),
            BackendKind::PointSprite => write!(f, "Point sprites (GL)"),
        }
    }
}

/// Size of the drawing surface
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    /// Width in logical points
    pub width: f32,
    /// Height in logical points
    pub height: f32,
    /// Physical pixels per logical point
    pub pixel_ratio: f32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 800.0,
            height: 600.0,
            pixel_ratio: 1.0,
        }
    }
}

impl Viewport {
    pub fn center(&self) -> (f32, f32) {
        (self.width * 0.5, self.height * 0.5)
    }
}

/// Everything a backend needs to draw one frame.
///
/// The renderer owns one scene and refills it every tick, so the vectors
/// keep their allocations between frames.
#[derive(Debug, Clone, Default)]
pub struct Scene {
    pub background: [u8; 3],
    /// Color of the base layer drawn under every LED
    pub filler: [u8; 3],
    /// Physical pixels per point the scene was laid out for. Positions sit
    /// on this pixel grid.
    pub pixel_ratio: f32,
    /// LED radius in points, never below half a physical pixel
    pub led_radius: f32,
    /// Halo radius in points for glowing LEDs
    pub glow_radius: f32,
    /// Interleaved screen-space `(x, y)` per LED
    pub positions: Vec<f32>,
    /// RGB8 per LED, same order as `positions`
    pub colors: Vec<u8>,
    /// Indices of LEDs that are not black
    pub lit: Vec<u32>,
    /// Indices of LEDs bright enough for a glow pass
    pub glow: Vec<u32>,
    /// No frame was available; only the dim layout is drawn
    pub placeholder: bool,
}

impl Scene {
    pub fn led_count(&self) -> usize {
        self.positions.len() / 2
    }

    #[inline]
    pub fn position(&self, index: usize) -> (f32, f32) {
        (self.positions[index * 2], self.positions[index * 2 + 1])
    }

    #[inline]
    pub fn color(&self, index: usize) -> [u8; 3] {
        let i = index * 3;
        [self.colors[i], self.colors[i + 1], self.colors[i + 2]]
    }
}

/// A drawing backend driven by the renderer
#[cfg_attr(test, mockall::automock)]
pub trait RenderBackend {
    fn kind(&self) -> BackendKind;

    /// The surface changed size
    fn resize(&mut self, viewport: Viewport);

    /// Draw `scene`, replacing whatever was drawn before. Returns the number
    /// of draw calls issued.
    fn draw(&mut self, scene: &Scene) -> u32;

    /// Paint the last drawn scene with its origin at `rect.min`
    fn paint(&self, painter: &egui::Painter, rect: egui::Rect);

    /// Release GPU resources, if any
    fn destroy(&mut self, _gl: &glow::Context) {}
}

pub(crate) fn color32([r, g, b]: [u8; 3]) -> egui::Color32 {
    egui::Color32::from_rgb(r, g, b)
}
