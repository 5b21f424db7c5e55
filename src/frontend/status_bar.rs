//! Bottom status bar with connection state, throughput and the last error.

use egui::{Color32, RichText, Ui};

use crate::queue::FrameQueueStats;
use crate::render::{BackendKind, RenderStats};
use crate::stream::SubscriptionStats;
use crate::types::{ConnectionState, FrameMetadata};

/// Context needed to render the status bar.
pub struct StatusBarContext<'a> {
    pub url: &'a str,
    pub stream: &'a SubscriptionStats,
    pub queue: &'a FrameQueueStats,
    pub render: &'a RenderStats,
    pub backend: BackendKind,
    pub metadata: Option<&'a FrameMetadata>,
    pub last_error: Option<&'a str>,
}

/// Dot color for a connection state
pub fn state_color(state: ConnectionState) -> Color32 {
    match state {
        ConnectionState::Connected => Color32::GREEN,
        ConnectionState::Connecting | ConnectionState::Reconnecting => Color32::YELLOW,
        ConnectionState::Idle | ConnectionState::Stopped => Color32::GRAY,
        ConnectionState::Failed => Color32::RED,
    }
}

/// Render the status bar.
pub fn render_status_bar(ui: &mut Ui, ctx: &StatusBarContext<'_>) {
    ui.horizontal(|ui| {
        ui.spacing_mut().item_spacing.x = 8.0;

        // === Connection ===
        let state = ctx.stream.state;
        ui.colored_label(state_color(state), "●");
        let label = if state == ConnectionState::Reconnecting {
            format!("{} (attempt {})", state, ctx.stream.reconnect_attempts)
        } else {
            format!("{}: {}", state, ctx.url)
        };
        ui.label(RichText::new(label).small());

        ui.separator();

        // === Render rate ===
        let fps_color = if ctx.render.fps > 0.0 {
            Color32::from_rgb(100, 255, 100)
        } else {
            Color32::GRAY
        };
        ui.label(RichText::new("FPS:").small());
        ui.colored_label(fps_color, RichText::new(format!("{:.1}", ctx.render.fps)).small());
        if let Some(meta) = ctx.metadata {
            ui.label(RichText::new(format!("(source {:.1})", meta.fps)).small().weak());
        }

        ui.separator();

        ui.label(RichText::new(format!("Frames: {}", ctx.stream.frames_received)).small());

        ui.separator();

        // === Queue drops ===
        let drop_color = if ctx.queue.drop_rate > 0.0 {
            Color32::YELLOW
        } else {
            Color32::GRAY
        };
        ui.colored_label(
            drop_color,
            RichText::new(format!(
                "Drops: {:.1}/s ({:.1}%)",
                ctx.queue.drop_rate,
                ctx.queue.drop_percentage()
            ))
            .small(),
        );

        ui.separator();

        // === Malformed frames ===
        let bad_color = if ctx.stream.frames_dropped > 0 {
            Color32::LIGHT_RED
        } else {
            Color32::GRAY
        };
        ui.colored_label(
            bad_color,
            RichText::new(format!("Invalid: {}", ctx.stream.frames_dropped)).small(),
        );

        ui.separator();

        let rtt = match ctx.stream.last_rtt_ms {
            Some(ms) => format!("RTT: {} ms", ms),
            None => "RTT: –".to_string(),
        };
        ui.label(RichText::new(rtt).small());

        ui.separator();

        ui.label(RichText::new(ctx.backend.to_string()).small().weak());

        // === Error message (right-aligned) ===
        if let Some(error) = ctx.last_error {
            ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                ui.colored_label(Color32::RED, RichText::new(error).small());
            });
        }
    });
}
