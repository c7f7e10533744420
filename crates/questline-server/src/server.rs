use std::sync::Arc;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use serde::Deserialize;
use tower_http::cors::CorsLayer;

use questline_core::ids::SessionId;
use questline_engine::{ConnectionRegistry, TurnController};
use questline_store::Database;

use crate::auth::TokenVerifier;
use crate::ws;

/// Server configuration.
pub struct ServerConfig {
    pub port: u16,
    pub max_send_queue: usize,
    pub auth_secret: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8900,
            max_send_queue: 256,
            auth_secret: "questline-dev-secret".into(),
        }
    }
}

/// Shared application state passed to Axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub controller: Arc<TurnController>,
    pub registry: Arc<ConnectionRegistry>,
    pub verifier: Arc<TokenVerifier>,
    pub db: Database,
    pub max_send_queue: usize,
}

/// Build the Axum router with all routes.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health_handler))
        .with_state(state)
        .layer(CorsLayer::permissive())
}

/// Create and start the server. Returns a handle that keeps it alive.
pub async fn start(
    config: ServerConfig,
    controller: Arc<TurnController>,
    registry: Arc<ConnectionRegistry>,
    db: Database,
) -> Result<ServerHandle, std::io::Error> {
    let state = AppState {
        controller,
        registry,
        verifier: Arc::new(TokenVerifier::new(config.auth_secret)),
        db,
        max_send_queue: config.max_send_queue,
    };

    let router = build_router(state);
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let local_addr = listener.local_addr()?;

    tracing::info!(port = local_addr.port(), "questline server started");

    let server_handle = tokio::spawn(async move {
        axum::serve(listener, router).await.ok();
    });

    Ok(ServerHandle {
        port: local_addr.port(),
        _server: server_handle,
    })
}

/// Handle returned by `start()` — keeps the accept loop alive.
pub struct ServerHandle {
    pub port: u16,
    _server: tokio::task::JoinHandle<()>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WsQuery {
    session_id: String,
    token: String,
}

/// WebSocket upgrade handler. Credentials are checked before the upgrade, so
/// an invalid token is refused without ever registering a channel.
async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<WsQuery>,
    State(state): State<AppState>,
) -> Response {
    let player_id = match state.verifier.verify(&params.token) {
        Ok(player_id) => player_id,
        Err(e) => {
            tracing::info!(error = %e, "websocket auth refused");
            return (StatusCode::UNAUTHORIZED, e.to_string()).into_response();
        }
    };

    let session_id = SessionId::from_raw(params.session_id);
    ws.on_upgrade(move |socket| ws::handle_socket(socket, session_id, player_id, state))
}

/// Health check HTTP endpoint.
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let db_ok = state
        .db
        .with_conn(|conn| {
            conn.query_row("SELECT 1", [], |_| Ok(()))
                .map_err(|e| questline_store::StoreError::Database(e.to_string()))
        })
        .is_ok();

    let status = if db_ok { "healthy" } else { "unhealthy" };
    let http_status = if db_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        http_status,
        axum::Json(serde_json::json!({
            "status": status,
            "connections": state.registry.count(),
        })),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use questline_agents::mock::{MockChronicler, MockGenerator, MockScorer, MockTransformer};
    use questline_core::report::RawTransform;
    use questline_engine::controller::AgentSet;
    use questline_engine::SessionStore;

    fn test_state() -> (AppState, Arc<ConnectionRegistry>) {
        let sessions = Arc::new(SessionStore::new());
        let registry = Arc::new(ConnectionRegistry::new());
        let db = Database::in_memory().unwrap();
        let agents = AgentSet {
            generator: Arc::new(MockGenerator::with_questions(10)),
            scorer: Arc::new(MockScorer::uniform(1.2)),
            transformer: Arc::new(MockTransformer::returning(RawTransform::default())),
            chronicler: Arc::new(MockChronicler::saying("test")),
        };
        let controller = Arc::new(TurnController::new(
            sessions,
            Arc::clone(&registry),
            agents,
            db.clone(),
        ));
        (
            AppState {
                controller,
                registry: Arc::clone(&registry),
                verifier: Arc::new(TokenVerifier::new("test-secret")),
                db,
                max_send_queue: 32,
            },
            registry,
        )
    }

    fn test_start_parts() -> (Arc<TurnController>, Arc<ConnectionRegistry>, Database) {
        let (state, registry) = test_state();
        (state.controller, registry, state.db)
    }

    #[test]
    fn build_router_creates_routes() {
        let (state, _) = test_state();
        let _router = build_router(state);
    }

    #[tokio::test]
    async fn server_starts_and_serves_health() {
        let (controller, registry, db) = test_start_parts();
        let config = ServerConfig {
            port: 0, // random port
            ..Default::default()
        };

        let handle = start(config, controller, registry, db).await.unwrap();
        assert!(handle.port > 0);

        let url = format!("http://127.0.0.1:{}/health", handle.port);
        let resp = reqwest::get(&url).await.unwrap();
        assert_eq!(resp.status(), 200);

        let body: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["connections"], 0);
    }

    #[tokio::test]
    async fn ws_without_valid_token_is_refused() {
        let (controller, registry, db) = test_start_parts();
        let config = ServerConfig {
            port: 0,
            ..Default::default()
        };
        let handle = start(config, controller, Arc::clone(&registry), db)
            .await
            .unwrap();

        // A plain GET with a bogus token: refused before any upgrade,
        // so no channel is ever registered.
        let url = format!(
            "http://127.0.0.1:{}/ws?sessionId=sess_1&token=forged.token.value",
            handle.port
        );
        let resp = reqwest::get(&url).await.unwrap();
        assert_eq!(resp.status(), 401);
        assert_eq!(registry.count(), 0);
    }

    #[tokio::test]
    async fn ws_missing_params_is_an_error() {
        let (controller, registry, db) = test_start_parts();
        let config = ServerConfig {
            port: 0,
            ..Default::default()
        };
        let handle = start(config, controller, registry, db).await.unwrap();

        let url = format!("http://127.0.0.1:{}/ws", handle.port);
        let resp = reqwest::get(&url).await.unwrap();
        assert_ne!(resp.status(), 200);
    }
}
