use crate::error::ApiResult;
use crate::state::AppState;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Response;
use axum::Json;
use fcs_core::RunEvent;
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tracing::{debug, warn};

pub(super) async fn start(State(state): State<AppState>) -> ApiResult<(StatusCode, Json<Value>)> {
    state.journey.run_tests().await?;
    Ok((StatusCode::CREATED, Json(json!({ "status": "executing" }))))
}

pub(super) async fn stop(State(state): State<AppState>) -> StatusCode {
    state.journey.stop_test_run().await;
    StatusCode::OK
}

pub(super) async fn stream(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| push_results(state, socket))
}

/// One JSON frame per finished case, then `{"type":"ended"}`.
async fn push_results(state: AppState, socket: WebSocket) {
    let mut events = state.journey.subscribe().await;
    let (mut sink, mut incoming) = socket.split();

    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break };
                let ended = event == RunEvent::Ended;
                let frame = match serde_json::to_string(&event) {
                    Ok(f) => f,
                    Err(e) => {
                        warn!(error = %e, "unserialisable run event");
                        continue;
                    }
                };
                if sink.send(Message::Text(frame.into())).await.is_err() {
                    debug!("result stream client went away");
                    return;
                }
                if ended {
                    break;
                }
            }
            msg = incoming.next() => {
                if matches!(msg, None | Some(Err(_)) | Some(Ok(Message::Close(_)))) {
                    debug!("result stream client closed");
                    return;
                }
            }
        }
    }
    let _ = sink.send(Message::Close(None)).await;
}
