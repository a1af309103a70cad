//! Turn interface REST API server (spec §6 "External interfaces").
//!
//! ## Usage
//!
//! ```bash
//! DATABASE_URL=postgresql://localhost/biblio_engine ORACLE_API_KEY=... \
//!   cargo run --bin biblio-server
//!
//! curl -X POST http://localhost:8080/sessions
//! curl -X POST http://localhost:8080/sessions/{id}/turns \
//!   -H "Content-Type: application/json" \
//!   -d '{"text": "books printed in Venice before 1550"}'
//! curl http://localhost:8080/health
//! ```

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use uuid::Uuid;

use biblio_engine::config::EngineConfig;
use biblio_engine::controller::{Controller, TurnResponse};
use biblio_engine::exec::{CandidateSet, SubgroupOverview};
use biblio_engine::plan::cache::PlanCache;
use biblio_engine::plan::oracle::AnthropicClient;
use biblio_engine::session::{Phase, SessionStore};
use biblio_engine::store::EngineStore;

struct AppState {
    controller: Controller,
    store: EngineStore,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = EngineConfig::from_env()?;
    let store = EngineStore::new(&config.database).await?;
    store.run_migrations().await?;

    let oracle = Box::new(AnthropicClient::new(&config.oracle));
    let plan_cache = PlanCache::open(config.plan_cache_path.clone())?;
    let sessions = SessionStore::new(store.pool().clone());
    let controller = Controller::new(sessions, oracle, plan_cache, config.timeouts, config.compiler);

    let state = Arc::new(AppState { controller, store });

    let app = Router::new()
        .route("/health", get(health))
        .route("/sessions", post(create_session))
        .route("/sessions/:id/turns", post(post_turn))
        .with_state(state)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http());

    let addr = config.server.bind_addr;
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(%addr, "turn interface listening");
    axum::serve(listener, app.into_make_service()).await?;

    Ok(())
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    pool: String,
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        pool: state.store.connection_stats().to_string(),
    })
}

#[derive(Deserialize, Default)]
struct CreateSessionRequest {
    #[serde(default)]
    user_id: Option<String>,
}

#[derive(Serialize)]
struct SessionResponse {
    session_id: Uuid,
    phase: Phase,
}

async fn create_session(
    State(state): State<Arc<AppState>>,
    body: Option<Json<CreateSessionRequest>>,
) -> Result<Json<SessionResponse>, ApiError> {
    let user_id = body.and_then(|Json(req)| req.user_id);
    let session = state
        .controller
        .sessions()
        .create(user_id.as_deref())
        .await
        .map_err(biblio_engine::EngineError::Session)?;
    Ok(Json(SessionResponse {
        session_id: session.session_id,
        phase: session.phase,
    }))
}

#[derive(Deserialize)]
struct TurnRequest {
    text: String,
}

#[derive(Serialize)]
struct TurnApiResponse {
    phase: Phase,
    message: String,
    candidates: Option<CandidateSet>,
    overview: Option<SubgroupOverview>,
}

impl From<TurnResponse> for TurnApiResponse {
    fn from(r: TurnResponse) -> Self {
        Self {
            phase: r.phase,
            message: r.message,
            candidates: r.candidates,
            overview: r.overview,
        }
    }
}

async fn post_turn(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<TurnRequest>,
) -> Result<Json<TurnApiResponse>, ApiError> {
    let cancel = CancellationToken::new();
    let response = state
        .controller
        .handle_turn(id, &req.text, state.store.pool(), &cancel)
        .await?;
    Ok(Json(response.into()))
}

/// Wraps `EngineError` so its `kind()`/message reach the HTTP boundary as
/// the spec's "errors returned as" shape (spec §6, §7).
struct ApiError(biblio_engine::EngineError);

impl From<biblio_engine::EngineError> for ApiError {
    fn from(e: biblio_engine::EngineError) -> Self {
        Self(e)
    }
}

#[derive(Serialize)]
struct ErrorBody {
    kind: String,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        use biblio_engine::error::{CompilationError, ExecutionError, SessionError};

        let status = match &self.0 {
            biblio_engine::EngineError::Session(SessionError::InvalidSession(_)) => StatusCode::NOT_FOUND,
            biblio_engine::EngineError::Session(SessionError::ConcurrentUpdate(_)) => StatusCode::CONFLICT,
            biblio_engine::EngineError::Execution(ExecutionError::Timeout(_)) => StatusCode::GATEWAY_TIMEOUT,
            biblio_engine::EngineError::Execution(ExecutionError::Cancelled) => StatusCode::BAD_GATEWAY,
            biblio_engine::EngineError::Compilation(CompilationError::OracleUnavailable(_)) => {
                StatusCode::BAD_GATEWAY
            }
            biblio_engine::EngineError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = ErrorBody {
            kind: self.0.kind().to_string(),
            message: self.0.human_message(),
        };
        (status, Json(body)).into_response()
    }
}
