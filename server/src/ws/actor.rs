use axum::body::Bytes;
use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::SplitStream;
use futures_util::{Sink, SinkExt, StreamExt};
use std::fmt::Display;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{error::Elapsed, interval_at, timeout, Instant, Interval, MissedTickBehavior};

use crate::config::ViewerConfig;
use crate::state::AppState;
use crate::ws::{ConnectionId, Viewer};

/// Run one viewer connection from registration to teardown.
///
/// Splits the WebSocket into reader and writer halves:
/// - Writer task: owns the sink and the receiving end of the viewer's queue.
///   It is the only writer of this socket, so overlapping broadcasts never
///   write it concurrently.
/// - Reader loop (this task): exists only to notice the peer going away.
///   Inbound frames are ignored.
///
/// The registry holds the only sender of the queue. Once the viewer is
/// deregistered or pruned the queue closes and the writer closes the socket.
pub async fn run_connection(socket: WebSocket, state: AppState, peer: Option<SocketAddr>) {
    let settings = state.viewer.clone();
    let (ws_sender, mut ws_receiver) = socket.split();
    let (tx, rx) = mpsc::channel::<Message>(settings.queue_capacity());

    let id = state.connections.next_id();
    let mut writer_handle = tokio::spawn(writer_task(ws_sender, rx, settings.clone(), id));
    let mut writer_done = false;

    state.connections.register(Viewer::new(id, peer, tx));

    tracing::info!(
        connection_id = id,
        peer = ?peer,
        viewers = state.connections.len(),
        "Viewer connected"
    );

    let idle_timeout = settings.idle_timeout();

    loop {
        let next = tokio::select! {
            next = next_frame(&mut ws_receiver, idle_timeout) => next,
            _ = &mut writer_handle => {
                writer_done = true;
                tracing::debug!(connection_id = id, "Writer stopped, closing viewer");
                break;
            }
        };

        match next {
            Ok(Some(Ok(Message::Close(frame)))) => {
                tracing::info!(connection_id = id, reason = ?frame, "Viewer initiated close");
                break;
            }
            Ok(Some(Ok(_))) => {
                // Viewers have nothing to say; reading only detects liveness.
            }
            Ok(Some(Err(e))) => {
                tracing::warn!(connection_id = id, error = %e, "WebSocket receive error");
                break;
            }
            Ok(None) => {
                tracing::info!(connection_id = id, "WebSocket stream ended");
                break;
            }
            Err(_) => {
                tracing::warn!(connection_id = id, "Viewer idle timeout, closing");
                break;
            }
        }
    }

    // Drops the queue sender, if a broadcast has not pruned it already.
    state.connections.deregister(id);

    if !writer_done {
        // Give the writer a chance to flush and send a close frame.
        if timeout(settings.send_timeout(), &mut writer_handle).await.is_err() {
            writer_handle.abort();
        }
    }

    tracing::info!(
        connection_id = id,
        viewers = state.connections.len(),
        "Viewer disconnected"
    );
}

/// Read the next frame, bounded by the idle timeout when keepalive is on.
async fn next_frame(
    ws_receiver: &mut SplitStream<WebSocket>,
    idle_timeout: Option<Duration>,
) -> Result<Option<Result<Message, axum::Error>>, Elapsed> {
    match idle_timeout {
        Some(limit) => timeout(limit, ws_receiver.next()).await,
        None => Ok(ws_receiver.next().await),
    }
}

/// Writer task: forwards queued frames to the socket, one at a time, each
/// bounded by the send timeout. Sends keepalive pings when enabled.
/// Returns when the queue closes or a write fails.
async fn writer_task<S>(
    mut ws_sender: S,
    mut rx: mpsc::Receiver<Message>,
    settings: ViewerConfig,
    id: ConnectionId,
) where
    S: Sink<Message> + Unpin,
    S::Error: Display,
{
    let send_timeout = settings.send_timeout();
    let mut keepalive = settings.keepalive().map(|period| {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker
    });

    loop {
        let msg = tokio::select! {
            msg = rx.recv() => match msg {
                Some(msg) => msg,
                None => break,
            },
            _ = tick(&mut keepalive) => Message::Ping(Bytes::new()),
        };

        match timeout(send_timeout, ws_sender.send(msg)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::warn!(connection_id = id, error = %e, "WebSocket send failed");
                return;
            }
            Err(_) => {
                tracing::warn!(
                    connection_id = id,
                    timeout_ms = settings.send_timeout_ms(),
                    "WebSocket send timed out"
                );
                return;
            }
        }
    }

    // Queue closed: the viewer was deregistered.
    let _ = timeout(send_timeout, ws_sender.close()).await;
}

async fn tick(keepalive: &mut Option<Interval>) {
    match keepalive {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}
