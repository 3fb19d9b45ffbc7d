//! HTTP surface: the chat WebSocket plus health and metrics endpoints.

use crate::config::Config;
use crate::engine::{ChatEngine, Connection};
use crate::error::AuthError;
use crate::protocol::{InboundEvent, ServerFrame, TextMessage};
use crate::session::ConnectionId;
use axum::{
    extract::{
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::{header::ORIGIN, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use futures::{stream::SplitSink, SinkExt, StreamExt};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

pub const SOCKET_PATH: &str = "/ws/socket-server/";

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<ChatEngine>,
    pub config: Arc<Config>,
}

#[derive(Debug, Deserialize)]
pub struct ConnectParams {
    token: Option<String>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route(SOCKET_PATH, get(socket_handler))
        .route(SOCKET_PATH.trim_end_matches('/'), get(socket_handler))
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let stats = state.engine.stats();
    Json(serde_json::json!({
        "status": "ok",
        "sessions": stats.sessions,
        "waiting": stats.waiting,
        "pairs": stats.pairs,
    }))
}

async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "lobby": state.engine.stats(),
        "relay": state.engine.metrics(),
    }))
}

/// Origin and credential checks run before the upgrade, so a refused client
/// never gets a session.
async fn socket_handler(
    State(state): State<AppState>,
    Query(params): Query<ConnectParams>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let origin = headers.get(ORIGIN).and_then(|v| v.to_str().ok());
    if !state.config.origin_allowed(origin) {
        warn!("Rejecting WebSocket from disallowed origin {:?}", origin);
        return StatusCode::FORBIDDEN.into_response();
    }

    let admission = match state.engine.admit(params.token.as_deref()).await {
        Ok(admission) => admission,
        Err(e) => return auth_rejection(&e).into_response(),
    };

    let engine = state.engine.clone();
    ws.on_upgrade(move |socket| async move {
        let connection = engine.join(admission);
        handle_socket(engine, connection, socket).await;
    })
}

fn auth_rejection(error: &AuthError) -> (StatusCode, String) {
    let status = match error {
        AuthError::MissingCredential | AuthError::InvalidCredential => StatusCode::UNAUTHORIZED,
        AuthError::Banned => StatusCode::FORBIDDEN,
    };
    (status, error.to_string())
}

async fn handle_socket(engine: Arc<ChatEngine>, connection: Connection, socket: WebSocket) {
    let Connection { id, outbox } = connection;
    let (sink, mut stream) = socket.split();
    let mut writer = tokio::spawn(write_frames(id, sink, outbox));

    let close_code = loop {
        tokio::select! {
            incoming = stream.next() => match incoming {
                Some(Ok(Message::Text(text))) => match serde_json::from_str::<TextMessage>(&text) {
                    Ok(payload) => {
                        engine
                            .handle(id, InboundEvent::TextMessage { message: payload.message })
                            .await
                    }
                    Err(e) => debug!("Ignoring malformed frame from {}: {}", id, e),
                },
                Some(Ok(Message::Close(frame))) => break frame.map(|f| f.code),
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!("Socket error on {}: {}", id, e);
                    break None;
                }
                None => break None,
            },
            // The engine closed the connection (ban or strikes)
            _ = &mut writer => break None,
        }
    };

    engine
        .handle(id, InboundEvent::Disconnect { code: close_code })
        .await;
    writer.abort();
    info!("{} socket closed", id);
}

/// Drain a connection's outbox onto the socket until a close frame is sent
/// or the engine drops the sender.
async fn write_frames(
    id: ConnectionId,
    mut sink: SplitSink<WebSocket, Message>,
    mut outbox: mpsc::UnboundedReceiver<ServerFrame>,
) {
    while let Some(frame) = outbox.recv().await {
        match frame {
            ServerFrame::Event(event) => {
                let text = match serde_json::to_string(&event) {
                    Ok(text) => text,
                    Err(e) => {
                        warn!("Failed to encode frame for {}: {}", id, e);
                        continue;
                    }
                };
                if sink.send(Message::Text(text)).await.is_err() {
                    break;
                }
            }
            ServerFrame::Close { code, reason } => {
                let _ = sink
                    .send(Message::Close(Some(CloseFrame {
                        code,
                        reason: reason.into(),
                    })))
                    .await;
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accounts::MemoryAccounts;
    use crate::config::test_config;
    use crate::engine::EngineSettings;
    use crate::moderation::OpenAiModerator;
    use crate::translation::Passthrough;

    async fn spawn_server() -> (String, Arc<ChatEngine>) {
        let mut config = test_config();
        config.openai_api_key = None;
        let engine = Arc::new(ChatEngine::new(
            Arc::new(OpenAiModerator::new(reqwest::Client::new(), &config)),
            Arc::new(Passthrough),
            Arc::new(MemoryAccounts::new(3)),
            EngineSettings::default(),
        ));
        let app = router(AppState {
            engine: engine.clone(),
            config: Arc::new(config),
        });

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{}", addr), engine)
    }

    #[test]
    fn test_auth_rejection_status() {
        assert_eq!(
            auth_rejection(&AuthError::InvalidCredential).0,
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            auth_rejection(&AuthError::MissingCredential).0,
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(auth_rejection(&AuthError::Banned).0, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_health_reports_counts() {
        let (base, engine) = spawn_server().await;
        let _waiting = engine.connect(None).await.unwrap();

        let body: serde_json::Value = reqwest::get(format!("{}/health", base))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();

        assert_eq!(body["status"], "ok");
        assert_eq!(body["sessions"], 1);
        assert_eq!(body["waiting"], 1);
        assert_eq!(body["pairs"], 0);
    }

    #[tokio::test]
    async fn test_metrics_snapshot() {
        let (base, engine) = spawn_server().await;
        let _a = engine.connect(None).await.unwrap();
        let _b = engine.connect(None).await.unwrap();

        let body: serde_json::Value = reqwest::get(format!("{}/metrics", base))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();

        assert_eq!(body["lobby"]["pairs"], 1);
        assert_eq!(body["relay"]["connections_accepted"], 2);
        assert_eq!(body["relay"]["pairings"], 1);
    }
}
