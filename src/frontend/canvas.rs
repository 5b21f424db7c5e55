//! LED canvas: drives the renderer and handles view interaction
//!
//! - Primary drag pans, secondary drag rotates
//! - Scroll zooms
//! - Double-click resets the view
//! - Hovering an LED shows its index and color

use crate::render::{Renderer, TickOutcome, ViewTransformUpdate, MIN_ZOOM};
use egui::{Color32, RichText, Sense, Ui};
use std::time::{Duration, Instant};

/// Upper zoom bound for scroll zooming
const MAX_ZOOM: f32 = 50.0;

/// Radians of rotation per point of horizontal secondary drag
const ROTATE_SPEED: f32 = 0.01;

/// Show the canvas filling the available space.
///
/// Returns how long egui may sleep before the renderer wants another tick,
/// or `None` while the renderer is stopped.
pub fn show_led_canvas(ui: &mut Ui, renderer: &mut Renderer) -> Option<Duration> {
    let size = ui.available_size();
    let (response, painter) = ui.allocate_painter(size, Sense::click_and_drag());
    let rect = response.rect;

    renderer.resize(rect.width(), rect.height(), ui.ctx().pixels_per_point());

    let current = renderer.transform();
    if response.double_clicked() {
        renderer.reset_transform();
    } else if response.dragged_by(egui::PointerButton::Primary) {
        let delta = response.drag_delta();
        renderer.set_transform(ViewTransformUpdate {
            pan_x: Some(current.pan_x + delta.x),
            pan_y: Some(current.pan_y + delta.y),
            ..Default::default()
        });
    } else if response.dragged_by(egui::PointerButton::Secondary) {
        let delta = response.drag_delta();
        renderer.set_transform(ViewTransformUpdate {
            rotation: Some(current.rotation + delta.x * ROTATE_SPEED),
            ..Default::default()
        });
    }

    if response.hovered() {
        let scroll_delta = ui.input(|i| i.smooth_scroll_delta.y);
        if scroll_delta != 0.0 {
            let factor = 1.0 + scroll_delta * 0.002;
            renderer.set_transform(ViewTransformUpdate {
                zoom: Some((renderer.transform().zoom * factor).clamp(MIN_ZOOM, MAX_ZOOM)),
                ..Default::default()
            });
        }
    }

    let now = Instant::now();
    let repaint_after = match renderer.tick(now) {
        TickOutcome::Stopped => None,
        TickOutcome::Skipped { wait } => Some(wait),
        TickOutcome::Rendered => Some(renderer.time_until_next_frame(now)),
    };

    renderer.paint(&painter, rect);

    if let Some(pointer) = response.hover_pos() {
        let local = pointer - rect.min;
        if let Some(index) = renderer.screen_to_led(local.x, local.y) {
            show_led_tooltip(ui, renderer, index);
        }
    }

    repaint_after
}

fn show_led_tooltip(ui: &Ui, renderer: &Renderer, index: usize) {
    let position = renderer.positions().get_led_position(index);
    let color = renderer.led_color(index).unwrap_or([0, 0, 0]);

    egui::show_tooltip(ui.ctx(), ui.layer_id(), egui::Id::new("led_hover"), |ui| {
        ui.label(RichText::new(format!("LED {}", index)).strong());
        ui.horizontal(|ui| {
            let (swatch, _) = ui.allocate_exact_size(egui::vec2(12.0, 12.0), Sense::hover());
            ui.painter()
                .rect_filled(swatch, 2.0, Color32::from_rgb(color[0], color[1], color[2]));
            ui.label(format!("#{:02X}{:02X}{:02X}", color[0], color[1], color[2]));
        });
        if let Some(p) = position {
            ui.label(
                RichText::new(format!(
                    "({:.1}, {:.1})  {:.1}°  mirror {}",
                    p.x,
                    p.y,
                    p.angle.to_degrees(),
                    p.mirror_index
                ))
                .small()
                .weak(),
            );
        }
    });
}
