//! WebSocket push of UI state

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use tracing::{debug, error, info, warn};

use crate::app::{AppState, UiState};

use super::routes::StateView;

/// WebSocket upgrade handler
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Send the current state, then every change until the client goes away
async fn handle_socket(socket: WebSocket, state: AppState) {
    info!("State stream connected");

    let (mut ws_sink, mut ws_stream) = socket.split();
    let mut updates = state.ui.subscribe();

    let initial = updates.borrow_and_update().clone();
    if let Err(e) = send_state(&mut ws_sink, &initial).await {
        error!(error = %e, "Failed to send initial state");
        return;
    }

    // Writer task: state changes -> WebSocket
    let writer_handle = tokio::spawn(async move {
        while updates.changed().await.is_ok() {
            let current = updates.borrow_and_update().clone();
            if let Err(e) = send_state(&mut ws_sink, &current).await {
                debug!(error = %e, "WebSocket send failed");
                break;
            }
        }
    });

    // Reader loop: the client only needs to keep the connection open
    while let Some(result) = ws_stream.next().await {
        match result {
            Ok(Message::Close(_)) => {
                info!("Client initiated close");
                break;
            }
            Ok(Message::Text(_)) | Ok(Message::Binary(_)) => {
                warn!("Ignoring client message on state stream");
            }
            Ok(_) => {}
            Err(e) => {
                error!(error = %e, "WebSocket error");
                break;
            }
        }
    }

    writer_handle.abort();
    info!("State stream closed");
}

async fn send_state(
    sink: &mut futures::stream::SplitSink<WebSocket, Message>,
    state: &UiState,
) -> Result<(), String> {
    let json = serde_json::to_string(&StateView::from(state)).map_err(|e| e.to_string())?;
    sink.send(Message::Text(json)).await.map_err(|e| e.to_string())
}
