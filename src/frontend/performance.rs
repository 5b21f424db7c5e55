//! Side panel with renderer history and queue counters

use egui::{Color32, RichText, Ui};
use egui_plot::{Legend, Line, Plot, PlotPoints};

use crate::queue::FrameQueueStats;
use crate::render::{PerformanceSample, RenderStats};
use crate::stream::SubscriptionStats;

pub struct PerformanceContext<'a> {
    pub history: &'a [PerformanceSample],
    pub render: &'a RenderStats,
    pub queue: &'a FrameQueueStats,
    pub stream: &'a SubscriptionStats,
}

/// What the user asked for from the panel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PerformanceAction {
    ClearStats,
}

pub fn render_performance_panel(ui: &mut Ui, ctx: &PerformanceContext<'_>) -> Option<PerformanceAction> {
    let mut action = None;

    ui.horizontal(|ui| {
        ui.heading("Performance");
        ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
            if ui.small_button("Clear").clicked() {
                action = Some(PerformanceAction::ClearStats);
            }
        });
    });
    ui.separator();

    let fps: Vec<[f64; 2]> = ctx
        .history
        .iter()
        .enumerate()
        .map(|(i, s)| [i as f64, s.fps as f64])
        .collect();
    let frame_time: Vec<[f64; 2]> = ctx
        .history
        .iter()
        .enumerate()
        .map(|(i, s)| [i as f64, s.frame_time_ms as f64])
        .collect();

    Plot::new("render_history")
        .height(160.0)
        .allow_scroll(false)
        .allow_drag(false)
        .include_y(0.0)
        .legend(Legend::default().position(egui_plot::Corner::LeftTop))
        .show(ui, |plot_ui| {
            plot_ui.line(
                Line::new("FPS", PlotPoints::from(fps))
                    .color(Color32::from_rgb(100, 200, 100))
                    .width(1.5),
            );
            plot_ui.line(
                Line::new("Frame time (ms)", PlotPoints::from(frame_time))
                    .color(Color32::from_rgb(100, 150, 255))
                    .width(1.5),
            );
        });

    ui.add_space(8.0);
    egui::Grid::new("perf_stats").num_columns(2).striped(true).show(ui, |ui| {
        let rows: [(&str, String); 13] = [
            ("Frames drawn", ctx.render.total_frames.to_string()),
            ("Empty ticks", ctx.render.dropped_frames.to_string()),
            ("Skipped ticks", ctx.render.skipped_ticks.to_string()),
            ("Draw calls", ctx.render.draw_calls.to_string()),
            (
                "Frame time",
                format!(
                    "{:.2} ms (avg {:.2})",
                    ctx.render.last_frame_time_ms, ctx.render.avg_frame_time_ms
                ),
            ),
            (
                "Queue",
                format!("{}/{} (peak {})", ctx.queue.size, ctx.queue.capacity, ctx.queue.peak_size),
            ),
            ("Queue received", ctx.queue.received.to_string()),
            ("Queue dropped", ctx.queue.dropped.to_string()),
            (
                "Buffer pool",
                format!(
                    "{} spare, {} hits / {} misses",
                    ctx.queue.pool_size, ctx.queue.pool_hits, ctx.queue.pool_misses
                ),
            ),
            ("Bytes received", format_bytes(ctx.stream.bytes_received)),
            ("Metadata frames", ctx.stream.metadata_received.to_string()),
            ("Heartbeats sent", ctx.stream.heartbeats_sent.to_string()),
            ("Reconnects", ctx.stream.total_reconnects.to_string()),
        ];
        for (name, value) in rows {
            ui.label(RichText::new(name).small());
            ui.label(RichText::new(value).small().monospace());
            ui.end_row();
        }
    });

    action
}

/// Human readable byte count
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} bytes", bytes)
    }
}
