use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use geojson::FeatureCollection;
use serde::Serialize;
use tokio::sync::broadcast;

use crate::feed::types::ConnectionState;
use crate::tracker::{SnapshotReceiver, StatusReceiver, StreamNotice};

#[derive(Clone)]
pub struct WsState {
    pub snapshot: SnapshotReceiver,
    pub status: StatusReceiver,
    pub notices_tx: broadcast::Sender<StreamNotice>,
}

/// Server message sent to clients
#[derive(Debug, Serialize)]
#[serde(tag = "type")]
#[serde(rename_all = "snake_case")]
enum ServerMessage<'a> {
    /// Initial connection acknowledgment
    Connected { message: String },
    /// Connection state of the upstream stream
    Status { state: ConnectionState },
    /// Full vehicle snapshot, sent on connect and after every change
    Snapshot { collection: &'a FeatureCollection },
    /// Non-fatal stream problem
    Notice { message: String, at: String },
}

/// WebSocket endpoint for live vehicle snapshots
pub async fn ws_stream(ws: WebSocketUpgrade, State(state): State<WsState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: WsState) {
    let (mut sender, mut receiver) = socket.split();
    let mut snapshot_rx = state.snapshot.clone();
    let mut status_rx = state.status.clone();
    let mut notices_rx = state.notices_tx.subscribe();

    // Send connected message
    let connected_msg = ServerMessage::Connected {
        message: "Connected to live vehicle updates.".to_string(),
    };
    if let Ok(json) = serde_json::to_string(&connected_msg) {
        let _ = sender.send(Message::Text(json.into())).await;
    }

    // Current stream state and snapshot first, updates after
    let initial_status = ServerMessage::Status {
        state: *status_rx.borrow_and_update(),
    };
    if let Ok(json) = serde_json::to_string(&initial_status) {
        let _ = sender.send(Message::Text(json.into())).await;
    }
    let snapshot = snapshot_rx.borrow_and_update().clone();
    let initial_snapshot = ServerMessage::Snapshot {
        collection: snapshot.as_ref(),
    };
    if let Ok(json) = serde_json::to_string(&initial_snapshot) {
        let _ = sender.send(Message::Text(json.into())).await;
    }

    // Spawn task to forward updates to WebSocket
    let forward_task = tokio::spawn(async move {
        loop {
            tokio::select! {
                changed = snapshot_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let snapshot = snapshot_rx.borrow_and_update().clone();
                    let msg = ServerMessage::Snapshot {
                        collection: snapshot.as_ref(),
                    };
                    if let Ok(json) = serde_json::to_string(&msg) {
                        if sender.send(Message::Text(json.into())).await.is_err() {
                            break;
                        }
                    }
                }
                changed = status_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let msg = ServerMessage::Status {
                        state: *status_rx.borrow_and_update(),
                    };
                    if let Ok(json) = serde_json::to_string(&msg) {
                        if sender.send(Message::Text(json.into())).await.is_err() {
                            break;
                        }
                    }
                }
                result = notices_rx.recv() => {
                    match result {
                        Ok(notice) => {
                            let msg = ServerMessage::Notice {
                                message: notice.message,
                                at: notice.at,
                            };
                            if let Ok(json) = serde_json::to_string(&msg) {
                                if sender.send(Message::Text(json.into())).await.is_err() {
                                    break;
                                }
                            }
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                        Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    }
                }
            }
        }
    });

    // Handle incoming messages from client
    while let Some(msg) = receiver.next().await {
        match msg {
            Ok(Message::Ping(_)) => {
                // Axum handles pong automatically
            }
            Ok(Message::Close(_)) => break,
            Err(_) => break,
            _ => {}
        }
    }

    // Cleanup
    forward_task.abort();
}
