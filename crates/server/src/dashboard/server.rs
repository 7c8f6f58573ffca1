//! axum web server for the live dashboard.
//!
//! `GET /` returns the status of every world as a JSON array, and `/ws`
//! pushes the same array to connected clients every 200 ms.

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::{IntoResponse, Json};
use axum::routing::get;
use tokio::net::TcpListener;

use super::{DashboardState, WorldStatus};

/// Push interval for WebSocket clients.
const PUSH_INTERVAL: Duration = Duration::from_millis(200);

pub fn router(state: Arc<DashboardState>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/ws", get(ws_upgrade))
        .with_state(state)
}

/// Start the dashboard web server. Runs until the task is dropped.
pub async fn start(state: Arc<DashboardState>, port: u16) {
    let addr = format!("0.0.0.0:{}", port);
    let listener = match TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            tracing::error!("Dashboard failed to bind to {}: {}", addr, e);
            return;
        }
    };
    tracing::info!("Dashboard listening on http://{}", addr);

    if let Err(e) = axum::serve(listener, router(state)).await {
        tracing::error!("Dashboard server error: {}", e);
    }
}

async fn index(State(state): State<Arc<DashboardState>>) -> Json<Vec<WorldStatus>> {
    Json(state.statuses())
}

async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<Arc<DashboardState>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| stream_status(socket, state))
}

/// Push world statuses until the client leaves. A final push goes out once
/// every world is closed, then the socket is dropped.
async fn stream_status(mut socket: WebSocket, state: Arc<DashboardState>) {
    let mut ticker = tokio::time::interval(PUSH_INTERVAL);
    tracing::debug!("Dashboard client connected");

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let statuses = state.statuses();
                let finished = statuses.iter().all(|s| s.closed);
                if let Err(e) = push(&mut socket, &statuses).await {
                    tracing::debug!("Dashboard client dropped: {}", e);
                    break;
                }
                if finished {
                    break;
                }
            }
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }
    tracing::debug!("Dashboard client disconnected");
}

async fn push(socket: &mut WebSocket, statuses: &[WorldStatus]) -> Result<(), axum::Error> {
    let frame = serde_json::json!({ "type": "status", "data": statuses });
    socket.send(Message::Text(frame.to_string().into())).await
}
