//! Async connection loop run on the subscription's worker thread

use super::{
    ReconnectDecision, ReconnectTracker, Shared, StreamError, SubscriptionConfig,
    SubscriptionEvent,
};
use crate::protocol::{
    encode_heartbeat, parse_error_code, parse_heartbeat, parse_led_frame, parse_metadata,
    validate_frame,
};
use crate::types::{ConnectionState, FrameType};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tokio::net::TcpStream;
use tokio::time::MissedTickBehavior;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// How long to wait for the close handshake when stopping
const CLOSE_TIMEOUT: Duration = Duration::from_millis(500);

/// Why a connected session ended
enum SessionEnd {
    Cancelled,
    Closed(String),
}

/// Connect, stream and reconnect until cancelled or out of attempts
pub(super) async fn run(
    url: String,
    config: SubscriptionConfig,
    shared: Arc<Shared>,
    cancel: CancellationToken,
) {
    let mut tracker = ReconnectTracker::new(
        config.backoff(),
        config.auto_reconnect,
        config.max_reconnect_attempts,
    );
    let mut next_frame_number = 0u64;
    let mut ever_connected = false;

    loop {
        if cancel.is_cancelled() {
            break;
        }
        shared.set_state(ConnectionState::Connecting);
        debug!(%url, attempt = tracker.attempt(), "Connecting");

        let connect = tokio::time::timeout(config.connect_timeout, connect_async(url.as_str()));
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            result = connect => result,
        };

        let failure = match result {
            Ok(Ok((ws, _response))) => {
                {
                    let mut stats = shared.stats();
                    if ever_connected {
                        stats.total_reconnects += 1;
                    }
                    stats.reconnect_attempts = 0;
                }
                ever_connected = true;
                tracker.on_connected();
                shared.set_state(ConnectionState::Connected);
                info!(%url, "Stream connected");
                shared.dispatch(SubscriptionEvent::Connected);

                match run_session(ws, &config, &shared, &cancel, &mut next_frame_number).await {
                    SessionEnd::Cancelled => break,
                    SessionEnd::Closed(reason) => {
                        info!(%reason, "Stream disconnected");
                        shared.dispatch(SubscriptionEvent::Disconnected);
                        reason
                    }
                }
            }
            Ok(Err(e)) => e.to_string(),
            Err(_) => format!("connect timed out after {:?}", config.connect_timeout),
        };

        shared.stats().last_error = Some(failure.clone());
        match tracker.on_failure() {
            ReconnectDecision::Retry { attempt, delay } => {
                warn!(%failure, attempt, ?delay, "Stream connection lost, retrying");
                shared.stats().reconnect_attempts = attempt;
                shared.set_state(ConnectionState::Reconnecting);
                shared.dispatch(SubscriptionEvent::Reconnecting { attempt, delay });
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(delay) => {}
                }
            }
            ReconnectDecision::GiveUp { attempts } => {
                fail(
                    &shared,
                    StreamError::ReconnectExhausted {
                        attempts,
                        last_error: failure,
                    },
                );
                break;
            }
            ReconnectDecision::Disabled => {
                fail(&shared, StreamError::ConnectionClosed(failure));
                break;
            }
        }
    }
    debug!("Stream driver exited");
}

fn fail(shared: &Shared, error: StreamError) {
    tracing::error!(%error, "Subscription failed");
    shared.stats().last_error = Some(error.to_string());
    shared.set_state(ConnectionState::Failed);
    shared.dispatch(SubscriptionEvent::Error(error));
}

async fn run_session(
    ws: WsStream,
    config: &SubscriptionConfig,
    shared: &Shared,
    cancel: &CancellationToken,
    next_frame_number: &mut u64,
) -> SessionEnd {
    let (mut write, mut read) = ws.split();

    let period = config.heartbeat_interval.max(Duration::from_millis(1));
    let mut heartbeat = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                let close = write.send(Message::Close(None));
                if tokio::time::timeout(CLOSE_TIMEOUT, close).await.is_err() {
                    debug!("Close handshake timed out");
                }
                return SessionEnd::Cancelled;
            }
            _ = heartbeat.tick() => {
                let frame = encode_heartbeat(unix_millis());
                if let Err(e) = write.send(Message::Binary(frame.into())).await {
                    return SessionEnd::Closed(format!("heartbeat send failed: {}", e));
                }
                shared.stats().heartbeats_sent += 1;
            }
            message = read.next() => match message {
                Some(Ok(Message::Binary(data))) => {
                    handle_binary(&data, config.led_count, shared, next_frame_number);
                }
                Some(Ok(Message::Text(text))) => {
                    trace!(len = text.len(), "Ignoring text message");
                }
                Some(Ok(Message::Close(frame))) => {
                    let reason = match frame {
                        Some(f) => format!("closed by server ({}): {}", u16::from(f.code), f.reason.as_str()),
                        None => "closed by server".to_string(),
                    };
                    return SessionEnd::Closed(reason);
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => return SessionEnd::Closed(e.to_string()),
                None => return SessionEnd::Closed("stream ended".to_string()),
            }
        }
    }
}

/// Validate and decode one binary message, then report it
pub(super) fn handle_binary(
    data: &[u8],
    led_count: usize,
    shared: &Shared,
    next_frame_number: &mut u64,
) {
    shared.stats().bytes_received += data.len() as u64;

    let header = match validate_frame(data, led_count) {
        Ok(header) => header,
        Err(e) => {
            warn!(error = %e, len = data.len(), "Dropping malformed frame");
            shared.stats().frames_dropped += 1;
            shared.dispatch(SubscriptionEvent::Error(e.into()));
            return;
        }
    };

    let decoded = match header.frame_type {
        FrameType::LedData => parse_led_frame(data, Instant::now()).map(|mut frame| {
            frame.frame_number = Some(*next_frame_number);
            *next_frame_number += 1;
            shared.stats().frames_received += 1;
            trace!(frame_number = ?frame.frame_number, "LED frame");
            SubscriptionEvent::Frame(frame)
        }),
        FrameType::Metadata => parse_metadata(data).map(|meta| {
            shared.stats().metadata_received += 1;
            SubscriptionEvent::Metadata(meta)
        }),
        FrameType::Heartbeat => {
            if let Ok(sent_ms) = parse_heartbeat(data) {
                let now_ms = unix_millis();
                if sent_ms <= now_ms {
                    shared.stats().last_rtt_ms = Some(now_ms - sent_ms);
                }
            }
            return;
        }
        FrameType::Error => parse_error_code(data).map(|code| {
            warn!(code, "Server reported error");
            shared.stats().last_error = Some(format!("server error code {}", code));
            SubscriptionEvent::Error(StreamError::Remote { code })
        }),
    };

    match decoded {
        Ok(event) => shared.dispatch(event),
        Err(e) => {
            warn!(error = %e, "Dropping undecodable frame");
            shared.stats().frames_dropped += 1;
            shared.dispatch(SubscriptionEvent::Error(e.into()));
        }
    }
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{encode_error, encode_led_frame, encode_metadata, ValidationError};
    use crate::types::FrameMetadata;
    use crossbeam_channel::{bounded, Receiver};

    fn shared() -> (Shared, Receiver<SubscriptionEvent>) {
        let (tx, rx) = bounded(16);
        (Shared::new(Box::new(tx)), rx)
    }

    #[test]
    fn test_led_frames_are_numbered() {
        let (shared, rx) = shared();
        let mut next = 0;
        let buf = encode_led_frame(&[1, 2, 3, 4, 5, 6]);
        handle_binary(&buf, 2, &shared, &mut next);
        handle_binary(&buf, 2, &shared, &mut next);

        let numbers: Vec<_> = rx
            .try_iter()
            .map(|e| match e {
                SubscriptionEvent::Frame(f) => f.frame_number,
                other => panic!("unexpected {:?}", other),
            })
            .collect();
        assert_eq!(numbers, vec![Some(0), Some(1)]);
        let stats = shared.stats().clone();
        assert_eq!(stats.frames_received, 2);
        assert_eq!(stats.bytes_received, 2 * buf.len() as u64);
    }

    #[test]
    fn test_wrong_size_frame_is_dropped_and_reported() {
        let (shared, rx) = shared();
        let mut next = 0;
        handle_binary(&encode_led_frame(&[0; 9]), 2, &shared, &mut next);

        assert_eq!(shared.stats().frames_dropped, 1);
        assert_eq!(shared.stats().frames_received, 0);
        assert!(matches!(
            rx.try_recv(),
            Ok(SubscriptionEvent::Error(StreamError::Validation(
                ValidationError::SizeMismatch { .. }
            )))
        ));
        assert_eq!(next, 0);
    }

    #[test]
    fn test_metadata_and_remote_errors() {
        let (shared, rx) = shared();
        let mut next = 0;
        let meta = FrameMetadata {
            fps: 30.0,
            frame_count: 10,
            dropped_frames: 1,
            timestamp: 99,
        };
        handle_binary(&encode_metadata(&meta), 4, &shared, &mut next);
        handle_binary(&encode_error(7), 4, &shared, &mut next);

        assert!(matches!(rx.try_recv(), Ok(SubscriptionEvent::Metadata(m)) if m == meta));
        assert!(matches!(
            rx.try_recv(),
            Ok(SubscriptionEvent::Error(StreamError::Remote { code: 7 }))
        ));
        assert_eq!(shared.stats().metadata_received, 1);
    }

    #[test]
    fn test_echoed_heartbeat_sets_rtt() {
        let (shared, rx) = shared();
        let mut next = 0;
        let sent = unix_millis().saturating_sub(20);
        handle_binary(&encode_heartbeat(sent), 4, &shared, &mut next);

        let rtt = shared.stats().last_rtt_ms.unwrap();
        assert!(rtt >= 20);
        assert!(rx.try_recv().is_err());
    }
}
