//! Per-job WebSocket endpoint.
//!
//! On connect: an `initial` event with the job's current status, then
//! the subscription stream (the job's last event is replayed by the
//! connection manager). A 30 s read timeout emits heartbeats; a plain
//! `ping` elicits `pong`.

use std::time::Duration;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Path as AxumPath, State as AxumState, WebSocketUpgrade,
    },
    response::Response,
};
use tracing::{debug, warn};

use crate::models::{JobSnapshot, WsEvent};

use super::AppState;

const READ_TIMEOUT: Duration = Duration::from_secs(30);

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    AxumPath(job_id): AxumPath<String>,
    AxumState(state): AxumState<AppState>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state, job_id))
}

async fn send_event(socket: &mut WebSocket, event: &WsEvent) -> Result<(), axum::Error> {
    let payload = serde_json::to_string(event).unwrap_or_else(|err| {
        warn!(%err, "failed to serialize ws event");
        "{}".to_string()
    });
    socket.send(Message::Text(payload)).await
}

async fn handle_socket(mut socket: WebSocket, state: AppState, job_id: String) {
    let Some(job) = state.jobs.get_job(&job_id) else {
        let _ = send_event(
            &mut socket,
            &WsEvent::Error {
                message: format!("Job {job_id} not found"),
            },
        )
        .await;
        let _ = socket.send(Message::Close(None)).await;
        return;
    };

    if send_event(
        &mut socket,
        &WsEvent::Initial {
            job: JobSnapshot {
                id: job.id.clone(),
                status: job.status.as_str().to_string(),
                created_at: job.created_at,
            },
        },
    )
    .await
    .is_err()
    {
        return;
    }

    // Register after the initial event; the manager replays the job's
    // last event so late subscribers still observe terminal state
    let (subscriber_id, mut rx) = state.broadcaster.subscribe(&job_id);

    loop {
        tokio::select! {
            event = rx.recv() => {
                match event {
                    Some(payload) => {
                        if socket.send(Message::Text(payload)).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
            incoming = tokio::time::timeout(READ_TIMEOUT, socket.recv()) => {
                match incoming {
                    // Read timeout: keep the connection warm
                    Err(_) => {
                        if send_event(&mut socket, &WsEvent::Heartbeat).await.is_err() {
                            break;
                        }
                    }
                    Ok(Some(Ok(Message::Text(text)))) => {
                        if text == "ping" {
                            let _ = socket.send(Message::Text("pong".to_string())).await;
                        }
                    }
                    Ok(Some(Ok(Message::Close(_)))) | Ok(None) => break,
                    Ok(Some(Ok(_))) => {}
                    Ok(Some(Err(err))) => {
                        debug!(%err, job_id, "ws receive error");
                        break;
                    }
                }
            }
        }
    }

    state.broadcaster.unsubscribe(&job_id, subscriber_id);
    debug!(job_id, subscriber_id, "ws disconnected");
}
