//! HTTP gateway for voxtask.
//!
//! Routes:
//! - `GET /health` — liveness
//! - `GET /api/agent` — the voice session WebSocket (see [`session`])
//! - `POST /api/agent/query` — one-shot, non-streaming agent invocation
//! - `GET/DELETE /api/conversation/history` — paginated log / clear
//! - `GET /api/costs` — API cost totals and recent records
//!
//! Built on Axum; all shared subsystems are constructed once at startup
//! and shared via `Arc`.

pub mod session;
pub mod stt;

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Query, RawQuery, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use axum::routing::get;
use axum::Router;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use voxtask_agent::{AgentEvent, AgentLoop};
use voxtask_config::Settings;
use voxtask_core::Error;
use voxtask_store::Database;
use voxtask_telemetry::PricingTable;

/// Shared application state.
pub struct AppState {
    pub settings: Settings,
    pub db: Database,
    pub agent: Arc<AgentLoop>,
}

/// Build the router with all gateway routes.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/api/agent", get(agent_ws_handler))
        .route("/api/agent/query", axum::routing::post(agent_query_handler))
        .route(
            "/api/conversation/history",
            get(history_handler).delete(clear_history_handler),
        )
        .route("/api/costs", get(costs_handler))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}

/// Wire up every subsystem and serve until the process exits.
pub async fn serve(settings: Settings) -> Result<(), Error> {
    let state = build_state(settings).await?;
    let addr = format!("{}:{}", state.settings.host, state.settings.port);
    let app = build_router(state);

    info!(addr = %addr, "Gateway starting");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| Error::Internal(format!("bind {addr}: {e}")))?;
    axum::serve(listener, app)
        .await
        .map_err(|e| Error::Internal(format!("serve: {e}")))?;
    Ok(())
}

/// Construct the shared state: database, provider, tools, pricing, agent.
pub async fn build_state(settings: Settings) -> Result<Arc<AppState>, Error> {
    let db = Database::open(&settings.database_path).await?;
    let provider = voxtask_providers::build_provider(&settings)?;

    let mut pricing = PricingTable::with_defaults();
    if let Some(ref overrides) = settings.pricing_override {
        pricing
            .apply_overrides(overrides)
            .map_err(|e| Error::config(format!("invalid VOXTASK_PRICING: {e}")))?;
    }

    let tools = Arc::new(voxtask_tools::default_registry(db.tasks(), db.history()));
    let agent = Arc::new(
        AgentLoop::new(
            provider,
            tools,
            db.history(),
            db.costs(),
            Arc::new(pricing),
        )
        .with_history_window(settings.history_window)
        .with_max_iterations(settings.max_iterations)
        .with_turn_timeout(Duration::from_secs(settings.agent_timeout_secs)),
    );

    Ok(Arc::new(AppState {
        settings,
        db,
        agent,
    }))
}

// --- Handlers ---

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn agent_ws_handler(
    State(state): State<Arc<AppState>>,
    RawQuery(query): RawQuery,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let config = stt::SttConfig::from_query(query.as_deref().unwrap_or(""));
    ws.on_upgrade(move |socket| session::run_session(socket, state, config))
}

#[derive(Deserialize)]
struct AgentQueryRequest {
    query: String,
}

#[derive(Serialize)]
struct AgentQueryResponse {
    success: bool,
    response: String,
}

/// One-shot agent invocation: run the loop to completion, return the
/// concatenated assistant text.
async fn agent_query_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<AgentQueryRequest>,
) -> Result<Json<AgentQueryResponse>, StatusCode> {
    if request.query.trim().is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }

    let (events_tx, mut events_rx) = mpsc::channel::<AgentEvent>(256);
    let collector = tokio::spawn(async move {
        let mut text = String::new();
        while let Some(event) = events_rx.recv().await {
            if let AgentEvent::Text { content } = event {
                text.push_str(&content);
            }
        }
        text
    });

    let result = state
        .agent
        .run(&request.query, &events_tx, &CancellationToken::new())
        .await;
    drop(events_tx);
    let text = collector.await.unwrap_or_default();

    match result {
        Ok(_) => Ok(Json(AgentQueryResponse {
            success: true,
            response: text,
        })),
        Err(e) => {
            error!(error = %e, "One-shot agent query failed");
            Ok(Json(AgentQueryResponse {
                success: false,
                response: e.to_string(),
            }))
        }
    }
}

#[derive(Deserialize)]
struct HistoryParams {
    #[serde(default = "default_page")]
    page: i64,
    #[serde(default = "default_limit")]
    limit: i64,
}

fn default_page() -> i64 {
    1
}
fn default_limit() -> i64 {
    50
}

async fn history_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HistoryParams>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    let page = params.page.max(1);
    let limit = params.limit.clamp(1, 200);
    let offset = (page - 1) * limit;

    let history = state.db.history();
    let total = history
        .count()
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    let messages = history
        .page(offset, limit)
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    let total_pages = if total > 0 { (total + limit - 1) / limit } else { 1 };
    Ok(Json(serde_json::json!({
        "success": true,
        "count": messages.len(),
        "total": total,
        "page": page,
        "limit": limit,
        "total_pages": total_pages,
        "has_next": page < total_pages,
        "has_previous": page > 1,
        "messages": messages,
    })))
}

async fn clear_history_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    let deleted = state
        .db
        .history()
        .clear()
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    Ok(Json(serde_json::json!({
        "success": true,
        "message": format!("Cleared {deleted} messages"),
    })))
}

async fn costs_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    let costs = state.db.costs();
    let (count, total_cost) = costs
        .totals()
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    let recent = costs
        .recent(50)
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    Ok(Json(serde_json::json!({
        "success": true,
        "count": count,
        "total_cost": total_cost,
        "records": recent,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    async fn test_state() -> Arc<AppState> {
        let settings = Settings::from_lookup(|key| {
            match key {
                "VOXTASK_STT_API_KEY" => Some("dg-test".into()),
                "ANTHROPIC_API_KEY" => Some("sk-ant-test".into()),
                "VOXTASK_DB_PATH" => Some("sqlite::memory:".into()),
                _ => None,
            }
        })
        .unwrap();
        build_state(settings).await.unwrap()
    }

    #[tokio::test]
    async fn health_endpoint() {
        let app = build_router(test_state().await);
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn history_endpoint_paginates() {
        let state = test_state().await;
        state
            .db
            .history()
            .append(voxtask_core::HistoryRole::User, "hello", None, None)
            .await
            .unwrap();

        let app = build_router(state);
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/conversation/history?page=1&limit=10")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["total"], 1);
        assert_eq!(body["messages"][0]["content"], "hello");
        assert_eq!(body["has_next"], false);
    }

    #[tokio::test]
    async fn clear_history_endpoint() {
        let state = test_state().await;
        state
            .db
            .history()
            .append(voxtask_core::HistoryRole::User, "wipe me", None, None)
            .await
            .unwrap();

        let app = build_router(state.clone());
        let response = app
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri("/api/conversation/history")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(state.db.history().count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn costs_endpoint_reports_totals() {
        let app = build_router(test_state().await);
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/costs")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["count"], 0);
        assert_eq!(body["total_cost"], 0.0);
    }
}
