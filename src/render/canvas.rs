//! Immediate-mode 2D backend built from egui shapes

use super::backend::{color32, BackendKind, RenderBackend, Scene, Viewport};
use egui::{epaint::Mesh, Color32, Pos2, Rect, Vec2};
use std::cell::RefCell;
use std::sync::Arc;

/// Triangles per LED disc in the base layer mesh
const DISC_SEGMENTS: u32 = 12;

/// Alpha of the halo drawn around glowing LEDs
const GLOW_ALPHA: u8 = 64;

#[derive(Debug, Clone, Copy)]
struct Disc {
    center: Pos2,
    radius: f32,
    color: Color32,
}

/// Baseline backend: one mesh for the base layer plus one circle per lit LED.
///
/// Always available; the renderer falls back to it when the GPU backend
/// cannot be created.
#[derive(Debug, Default)]
pub struct CanvasBackend {
    background: Color32,
    base: Mesh,
    discs: Vec<Disc>,
    /// Base layer translated for the last paint, keyed by its offset.
    /// Cleared on every draw.
    painted: RefCell<Option<(Vec2, Arc<Mesh>)>>,
}

impl CanvasBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of vertices in the recorded base layer
    pub fn base_vertex_count(&self) -> usize {
        self.base.vertices.len()
    }

    /// Number of individually drawn circles (lit LEDs plus halos)
    pub fn disc_count(&self) -> usize {
        self.discs.len()
    }

    /// Base layer placed at `offset`, reused across repaints of one scene
    fn base_mesh(&self, offset: Vec2) -> Arc<Mesh> {
        let mut painted = self.painted.borrow_mut();
        if let Some((at, mesh)) = painted.as_ref() {
            if *at == offset {
                return Arc::clone(mesh);
            }
        }
        let mut mesh = self.base.clone();
        mesh.translate(offset);
        let mesh = Arc::new(mesh);
        *painted = Some((offset, Arc::clone(&mesh)));
        mesh
    }

    fn build_base_layer(&mut self, scene: &Scene) {
        self.base.clear();
        let color = color32(scene.filler);
        let radius = scene.led_radius;
        let step = std::f32::consts::TAU / DISC_SEGMENTS as f32;
        for i in 0..scene.led_count() {
            let (x, y) = scene.position(i);
            let center = self.base.vertices.len() as u32;
            self.base.colored_vertex(Pos2::new(x, y), color);
            for s in 0..DISC_SEGMENTS {
                let (sin, cos) = (s as f32 * step).sin_cos();
                self.base
                    .colored_vertex(Pos2::new(x + cos * radius, y + sin * radius), color);
            }
            for s in 0..DISC_SEGMENTS {
                let a = center + 1 + s;
                let b = center + 1 + (s + 1) % DISC_SEGMENTS;
                self.base.add_triangle(center, a, b);
            }
        }
    }
}

impl RenderBackend for CanvasBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Canvas
    }

    /// Shapes are built in points from the scene, nothing to resize
    fn resize(&mut self, _viewport: Viewport) {}

    fn draw(&mut self, scene: &Scene) -> u32 {
        self.background = color32(scene.background);
        self.build_base_layer(scene);
        self.painted.get_mut().take();

        self.discs.clear();
        for &i in &scene.glow {
            let (x, y) = scene.position(i as usize);
            let [r, g, b] = scene.color(i as usize);
            self.discs.push(Disc {
                center: Pos2::new(x, y),
                radius: scene.glow_radius,
                color: Color32::from_rgba_unmultiplied(r, g, b, GLOW_ALPHA),
            });
        }
        for &i in &scene.lit {
            let (x, y) = scene.position(i as usize);
            self.discs.push(Disc {
                center: Pos2::new(x, y),
                radius: scene.led_radius,
                color: color32(scene.color(i as usize)),
            });
        }

        // Clear, base layer, then one call per disc
        2 + self.discs.len() as u32
    }

    fn paint(&self, painter: &egui::Painter, rect: Rect) {
        let offset: Vec2 = rect.min.to_vec2();
        painter.rect_filled(rect, 0.0, self.background);

        if !self.base.is_empty() {
            painter.add(egui::Shape::mesh(self.base_mesh(offset)));
        }
        for disc in &self.discs {
            painter.circle_filled(disc.center + offset, disc.radius, disc.color);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scene() -> Scene {
        Scene {
            background: [0, 0, 0],
            filler: [20, 20, 20],
            pixel_ratio: 1.0,
            led_radius: 3.0,
            glow_radius: 7.5,
            positions: vec![10.0, 10.0, 20.0, 10.0, 30.0, 10.0],
            colors: vec![0, 0, 0, 255, 0, 0, 10, 0, 0],
            lit: vec![1, 2],
            glow: vec![1],
            placeholder: false,
        }
    }

    #[test]
    fn test_base_layer_covers_every_led() {
        let mut backend = CanvasBackend::new();
        backend.draw(&scene());
        assert_eq!(
            backend.base_vertex_count(),
            3 * (DISC_SEGMENTS as usize + 1)
        );
    }

    #[test]
    fn test_only_lit_and_glowing_leds_get_discs() {
        let mut backend = CanvasBackend::new();
        let calls = backend.draw(&scene());
        assert_eq!(backend.disc_count(), 3);
        assert_eq!(calls, 5);
    }

    #[test]
    fn test_placeholder_draws_base_only() {
        let mut backend = CanvasBackend::new();
        let placeholder = Scene {
            colors: vec![0; 9],
            lit: vec![],
            glow: vec![],
            placeholder: true,
            ..scene()
        };
        assert_eq!(backend.draw(&placeholder), 2);
        assert_eq!(backend.disc_count(), 0);
        assert!(backend.base_vertex_count() > 0);
    }

    #[test]
    fn test_repaint_reuses_translated_base_layer() {
        let mut backend = CanvasBackend::new();
        backend.draw(&scene());
        let offset = Vec2::new(40.0, 25.0);

        let first = backend.base_mesh(offset);
        let again = backend.base_mesh(offset);
        assert!(Arc::ptr_eq(&first, &again));
        assert_eq!(first.vertices[0].pos, Pos2::new(50.0, 35.0));

        // A moved panel or a new scene rebuilds it
        let moved = backend.base_mesh(Vec2::new(0.0, 0.0));
        assert!(!Arc::ptr_eq(&first, &moved));
        assert_eq!(moved.vertices[0].pos, Pos2::new(10.0, 10.0));

        backend.draw(&scene());
        let redrawn = backend.base_mesh(Vec2::new(0.0, 0.0));
        assert!(!Arc::ptr_eq(&moved, &redrawn));
        assert_eq!(redrawn.vertices.len(), backend.base_vertex_count());
    }
}
