//! HTTP route definitions

use axum::{
    extract::State,
    http::{header, Method, StatusCode},
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use serde::Serialize;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};

use crate::app::AppState;
use crate::game::Frame;
use crate::sync::LatencySummary;
use crate::util::time::uptime_secs;

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    // CORS configuration - support multiple origins (comma-separated in CLIENT_ORIGIN)
    let allow_origin = match state.config.client_origin.as_deref() {
        Some(origins) => AllowOrigin::list(
            origins
                .split(',')
                .filter_map(|s| s.trim().parse::<header::HeaderValue>().ok()),
        ),
        None => AllowOrigin::from(Any),
    };

    let cors = CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/health", get(health_handler))
        .route("/frame", get(frame_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

// ============================================================================
// Health endpoint
// ============================================================================

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    uptime_secs: u64,
    session_id: String,
    connected: bool,
    room: String,
    peers: usize,
    online_peers: usize,
    latency: LatencySummary,
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let view = state.view.borrow();

    Json(HealthResponse {
        status: if view.connected { "ok" } else { "degraded" },
        uptime_secs: uptime_secs(),
        session_id: view.session_id.clone(),
        connected: view.connected,
        room: state.config.room.clone(),
        peers: view.peers,
        online_peers: view.online_peers,
        latency: view.latency,
    })
}

// ============================================================================
// Frame endpoint
// ============================================================================

async fn frame_handler(State(state): State<AppState>) -> Result<Json<Frame>, AppError> {
    let view = state.view.borrow();
    if view.tick == 0 {
        return Err(AppError::Unavailable("No frame rendered yet".to_string()));
    }
    Ok(Json(view.frame.clone()))
}

// ============================================================================
// Error handling
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Service unavailable: {0}")]
    Unavailable(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match &self {
            AppError::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg.clone()),
        };

        let body = serde_json::json!({
            "error": message
        });

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tokio::sync::watch;
    use tower::ServiceExt;

    use crate::app::SessionView;
    use crate::config::Config;
    use crate::game::{Drawable, DrawKind, Player, Color};

    fn state(view: SessionView) -> (AppState, watch::Sender<SessionView>) {
        let config = Config::from_lookup(|_| None).unwrap();
        let (tx, rx) = watch::channel(view);
        (AppState::new(config, rx), tx)
    }

    async fn get_json(router: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = router
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn health_reports_session() {
        let (state, _tx) = state(SessionView {
            session_id: "user12345".into(),
            connected: true,
            peers: 2,
            online_peers: 1,
            ..SessionView::default()
        });

        let (status, body) = get_json(build_router(state), "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["session_id"], "user12345");
        assert_eq!(body["peers"], 2);
        assert_eq!(body["online_peers"], 1);
        assert_eq!(body["room"], "room-6");
    }

    #[tokio::test]
    async fn frame_unavailable_before_first_tick() {
        let (state, _tx) = state(SessionView::default());
        let (status, body) = get_json(build_router(state), "/frame").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn frame_serves_latest_view() {
        let (state, tx) = state(SessionView::default());
        let player = Player::new("p1", 64, 64, Color::Blue, 4);
        tx.send_replace(SessionView {
            tick: 3,
            frame: Frame {
                tick: 3,
                entities: vec![Drawable::player(&player, DrawKind::LocalPlayer)],
            },
            ..SessionView::default()
        });

        let (status, body) = get_json(build_router(state), "/frame").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["tick"], 3);
        assert_eq!(body["entities"][0]["x"], 64);
        assert_eq!(body["entities"][0]["color"], "blue");
    }
}
