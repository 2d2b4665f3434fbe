use crate::core::DaemonEvent;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use soundtab_proto::media::{Direction, TabId, TabsSnapshot};
use soundtab_proto::protocol::{Command, Reply};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tracing::{error, info};

#[derive(Clone)]
struct HttpState {
    event_tx: mpsc::Sender<DaemonEvent>,
}

pub fn router(event_tx: mpsc::Sender<DaemonEvent>) -> Router {
    Router::new()
        .route("/api/tabs", get(get_tabs))
        .route("/api/tabs/:id/mute", post(toggle_mute))
        .route("/api/tabs/:id/play-pause", post(toggle_play_pause))
        .route("/api/tabs/:id/skip/:direction", post(skip_track))
        .route("/api/tabs/:id/focus", post(focus_tab))
        .with_state(HttpState { event_tx })
}

pub fn start_server(
    bind_address: String,
    port: u16,
    event_tx: mpsc::Sender<DaemonEvent>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let app = router(event_tx);

        let addr = format!("{}:{}", bind_address, port);
        let listener = match TcpListener::bind(&addr).await {
            Ok(l) => l,
            Err(e) => {
                error!("Failed to bind HTTP server to {}: {}", addr, e);
                return;
            }
        };

        info!("HTTP API server listening on http://{}", addr);

        if let Err(e) = axum::serve(listener, app).await {
            error!("HTTP server error: {}", e);
        }
    })
}

async fn dispatch(state: &HttpState, command: Command) -> Result<Reply, StatusCode> {
    let (reply_tx, reply_rx) = oneshot::channel();
    if state
        .event_tx
        .send(DaemonEvent::Request {
            command,
            reply: reply_tx,
        })
        .await
        .is_err()
    {
        error!("HTTP API: daemon core is gone");
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    }
    reply_rx.await.map_err(|_| StatusCode::SERVICE_UNAVAILABLE)
}

async fn get_tabs(State(state): State<HttpState>) -> Result<Json<TabsSnapshot>, StatusCode> {
    match dispatch(&state, Command::GetMediaTabs).await? {
        Reply::MediaTabs { snapshot } => Ok(Json(snapshot)),
        _ => Err(StatusCode::INTERNAL_SERVER_ERROR),
    }
}

async fn toggle_mute(State(state): State<HttpState>, Path(id): Path<u64>) -> Result<Json<Reply>, StatusCode> {
    info!("HTTP API: toggle mute on tab {}", id);
    let reply = dispatch(&state, Command::ToggleMute { tab_id: TabId(id) }).await?;
    Ok(Json(reply))
}

async fn toggle_play_pause(
    State(state): State<HttpState>,
    Path(id): Path<u64>,
) -> Result<Json<Reply>, StatusCode> {
    info!("HTTP API: toggle playback on tab {}", id);
    let reply = dispatch(&state, Command::TogglePlayPause { tab_id: TabId(id) }).await?;
    Ok(Json(reply))
}

async fn skip_track(
    State(state): State<HttpState>,
    Path((id, direction)): Path<(u64, String)>,
) -> Result<Json<Reply>, StatusCode> {
    let direction: Direction = direction.parse().map_err(|_| StatusCode::BAD_REQUEST)?;
    info!("HTTP API: skip {} on tab {}", direction.as_str(), id);
    let reply = dispatch(
        &state,
        Command::SkipTrack {
            tab_id: TabId(id),
            direction,
        },
    )
    .await?;
    Ok(Json(reply))
}

async fn focus_tab(State(state): State<HttpState>, Path(id): Path<u64>) -> Result<Json<Reply>, StatusCode> {
    info!("HTTP API: focus tab {}", id);
    let reply = dispatch(&state, Command::FocusTab { tab_id: TabId(id) }).await?;
    Ok(Json(reply))
}
