//! Demo LED frame producer
//!
//! Serves `/ws/led-frames` with a rotating rainbow so the viewer can be
//! tried without hardware. Heartbeats from the client are echoed back and a
//! METADATA frame is published once per second.
//!
//! Environment:
//! - `LEDVIS_DEMO_ADDR` - bind address (default `127.0.0.1:8080`)
//! - `LEDVIS_DEMO_LEDS` - LED count (default 180)
//! - `LEDVIS_DEMO_FPS` - frames per second (default 30)

use anyhow::Context;
use futures_util::{SinkExt, StreamExt};
use ledvis_rs::protocol::{
    encode_led_frame, encode_metadata, parse_header, LED_FRAMES_PATH,
};
use ledvis_rs::types::{FrameMetadata, FrameType};
use std::env;
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{self, MissedTickBehavior};
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Copy)]
struct DemoSettings {
    led_count: usize,
    fps: u32,
}

fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ledvis_demo_server=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let bind_addr = env::var("LEDVIS_DEMO_ADDR").unwrap_or_else(|_| "127.0.0.1:8080".to_string());
    let settings = DemoSettings {
        led_count: env_or("LEDVIS_DEMO_LEDS", 180usize).max(1),
        fps: env_or("LEDVIS_DEMO_FPS", 30u32).clamp(1, 240),
    };

    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", bind_addr))?;
    info!(
        "Serving {} LEDs at {} fps on ws://{}{}",
        settings.led_count, settings.fps, bind_addr, LED_FRAMES_PATH
    );

    loop {
        let (stream, peer) = listener.accept().await?;
        tokio::spawn(async move {
            if let Err(e) = serve_client(stream, peer, settings).await {
                warn!(%peer, "Client session ended: {:#}", e);
            }
        });
    }
}

#[allow(clippy::result_large_err)]
fn check_path(request: &Request, response: Response) -> Result<Response, ErrorResponse> {
    if request.uri().path() == LED_FRAMES_PATH {
        return Ok(response);
    }
    let mut rejection = ErrorResponse::new(Some(format!("expected {}", LED_FRAMES_PATH)));
    *rejection.status_mut() = StatusCode::NOT_FOUND;
    Err(rejection)
}

async fn serve_client(stream: TcpStream, peer: SocketAddr, settings: DemoSettings) -> anyhow::Result<()> {
    let ws = tokio_tungstenite::accept_hdr_async(stream, check_path)
        .await
        .context("handshake failed")?;
    info!(%peer, "Client connected");

    let (mut sink, mut source) = ws.split();
    let started = Instant::now();

    let mut frame_tick = time::interval(Duration::from_secs(1) / settings.fps);
    frame_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut meta_tick = time::interval(Duration::from_secs(1));
    meta_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut rgb = vec![0u8; settings.led_count * 3];
    let mut frame_count: u32 = 0;
    let mut last_meta_count: u32 = 0;

    loop {
        tokio::select! {
            _ = frame_tick.tick() => {
                fill_rainbow(&mut rgb, started.elapsed().as_secs_f32());
                sink.send(Message::Binary(encode_led_frame(&rgb).into())).await?;
                frame_count = frame_count.wrapping_add(1);
            }
            _ = meta_tick.tick() => {
                let meta = FrameMetadata {
                    fps: frame_count.wrapping_sub(last_meta_count) as f32,
                    frame_count,
                    dropped_frames: 0,
                    timestamp: started.elapsed().as_millis() as u32,
                };
                last_meta_count = frame_count;
                sink.send(Message::Binary(encode_metadata(&meta).into())).await?;
            }
            msg = source.next() => match msg {
                Some(Ok(Message::Binary(data))) => {
                    match parse_header(&data) {
                        Ok(header) if header.frame_type == FrameType::Heartbeat => {
                            sink.send(Message::Binary(data)).await?;
                        }
                        Ok(header) => debug!(%peer, frame_type = ?header.frame_type, "Ignoring client frame"),
                        Err(e) => debug!(%peer, "Malformed client frame: {}", e),
                    }
                }
                Some(Ok(Message::Close(_))) | None => {
                    info!(%peer, "Client disconnected");
                    return Ok(());
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(e.into()),
            }
        }
    }
}

/// Rainbow that travels around the ring once every four seconds
fn fill_rainbow(rgb: &mut [u8], t: f32) {
    let count = rgb.len() / 3;
    for (i, led) in rgb.chunks_exact_mut(3).enumerate() {
        let hue = (i as f32 / count as f32 + t * 0.25).fract();
        led.copy_from_slice(&hue_to_rgb(hue));
    }
}

fn hue_to_rgb(hue: f32) -> [u8; 3] {
    let h = hue * 6.0;
    let x = 1.0 - (h % 2.0 - 1.0).abs();
    let (r, g, b) = match h as u32 {
        0 => (1.0, x, 0.0),
        1 => (x, 1.0, 0.0),
        2 => (0.0, 1.0, x),
        3 => (0.0, x, 1.0),
        4 => (x, 0.0, 1.0),
        _ => (1.0, 0.0, x),
    };
    [(r * 255.0) as u8, (g * 255.0) as u8, (b * 255.0) as u8]
}
