use std::net::IpAddr;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::Path;
use axum::extract::Query;
use axum::extract::State;
use axum::http::StatusCode;
use axum::http::header::CONTENT_TYPE;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::routing::get;
use axum::routing::post;
use axum::routing::put;
use chrono::NaiveDate;
use serde::Deserialize;
use serde::Serialize;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::engine::CommandError;
use crate::engine::Engine;
use crate::engine::EngineError;
use crate::engine::state::TodoItemStatus;

/// Response for the /v1/ping endpoint
#[derive(Serialize)]
struct PingResponse {
    status: String,
}

/// Response for the /v1/info endpoint
#[derive(Serialize)]
struct InfoResponse {
    version: String,
    hostname: String,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Debug, Deserialize)]
struct CreateItemRequest {
    summary: String,
}

#[derive(Debug, Deserialize)]
struct UpdateItemRequest {
    summary: String,
    #[serde(default)]
    status: TodoItemStatus,
}

#[derive(Debug, Deserialize)]
struct DeleteItemsRequest {
    uids: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct MoveItemRequest {
    uid: String,
    previous_uid: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EventsQuery {
    start: NaiveDate,
    end: NaiveDate,
}

/// Shared application state
#[derive(Clone)]
struct AppState {
    version: &'static str,
    engine: Arc<Engine>,
}

/// An engine error rendered as an HTTP response
#[derive(Debug)]
struct ApiError(EngineError);

impl From<EngineError> for ApiError {
    fn from(e: EngineError) -> Self {
        Self(e)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match &self.0 {
            EngineError::UnknownEntity(_)
            | EngineError::UnknownService { .. }
            | EngineError::Command(CommandError::NotFound(_)) => StatusCode::NOT_FOUND,
            EngineError::Command(CommandError::Validation(_)) => StatusCode::BAD_REQUEST,
            EngineError::Command(CommandError::Failed(_)) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::warn!("request failed: {}", self.0);
        }
        let body = ErrorResponse {
            error: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

/// Handler for GET /v1/ping
#[tracing::instrument]
async fn ping() -> impl IntoResponse {
    tracing::debug!("Handling /v1/ping request");
    (
        StatusCode::OK,
        Json(PingResponse {
            status: "ok".to_string(),
        }),
    )
}

/// Handler for GET /v1/info
#[tracing::instrument(skip(state))]
async fn info(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    tracing::debug!("Handling /v1/info request");

    let hostname = hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown".to_string());

    (
        StatusCode::OK,
        Json(InfoResponse {
            version: state.version.to_string(),
            hostname,
        }),
    )
}

/// Handler for GET /v1/states
#[tracing::instrument(skip(state))]
async fn states(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let snapshot = state.engine.state_snapshot();
    Json(crate::engine::State::clone(&snapshot))
}

/// Handler for GET /v1/states/:entity_id
#[tracing::instrument(skip(state))]
async fn entity_state(
    State(state): State<Arc<AppState>>,
    Path(entity_id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    state
        .engine
        .state_snapshot()
        .entity_json(&entity_id)
        .map(Json)
        .ok_or(ApiError(EngineError::UnknownEntity(entity_id)))
}

/// Handler for POST /v1/services/:domain/:service
#[tracing::instrument(skip(state, data))]
async fn call_service(
    State(state): State<Arc<AppState>>,
    Path((domain, service)): Path<(String, String)>,
    Json(data): Json<serde_json::Value>,
) -> ApiResult<StatusCode> {
    state.engine.call_service(&domain, &service, data).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Handler for POST /v1/todo/:entity_id/items
#[tracing::instrument(skip(state))]
async fn create_item(
    State(state): State<Arc<AppState>>,
    Path(entity_id): Path<String>,
    Json(req): Json<CreateItemRequest>,
) -> ApiResult<StatusCode> {
    state
        .engine
        .create_todo_item(&entity_id, &req.summary)
        .await?;
    Ok(StatusCode::CREATED)
}

/// Handler for PUT /v1/todo/:entity_id/items/:uid
#[tracing::instrument(skip(state))]
async fn update_item(
    State(state): State<Arc<AppState>>,
    Path((entity_id, uid)): Path<(String, String)>,
    Json(req): Json<UpdateItemRequest>,
) -> ApiResult<StatusCode> {
    state
        .engine
        .update_todo_item(&entity_id, &uid, &req.summary, req.status)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Handler for POST /v1/todo/:entity_id/delete
#[tracing::instrument(skip(state))]
async fn delete_items(
    State(state): State<Arc<AppState>>,
    Path(entity_id): Path<String>,
    Json(req): Json<DeleteItemsRequest>,
) -> ApiResult<StatusCode> {
    state.engine.delete_todo_items(&entity_id, req.uids).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Handler for POST /v1/todo/:entity_id/move
#[tracing::instrument(skip(state))]
async fn move_item(
    State(state): State<Arc<AppState>>,
    Path(entity_id): Path<String>,
    Json(req): Json<MoveItemRequest>,
) -> ApiResult<StatusCode> {
    state
        .engine
        .move_todo_item(&entity_id, &req.uid, req.previous_uid.as_deref())
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Handler for GET /v1/calendar/:entity_id/events
#[tracing::instrument(skip(state))]
async fn calendar_events(
    State(state): State<Arc<AppState>>,
    Path(entity_id): Path<String>,
    Query(range): Query<EventsQuery>,
) -> ApiResult<impl IntoResponse> {
    let events = state
        .engine
        .calendar_events(&entity_id, range.start, range.end)
        .await?;
    Ok(Json(events))
}

/// Handler for GET /v1/image/:entity_id
#[tracing::instrument(skip(state))]
async fn image(
    State(state): State<Arc<AppState>>,
    Path(entity_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let image = state.engine.image(&entity_id).await?;
    Ok(([(CONTENT_TYPE, image.content_type)], image.content))
}

/// Create the API router with all endpoints
fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/ping", get(ping))
        .route("/v1/info", get(info))
        .route("/v1/states", get(states))
        .route("/v1/states/:entity_id", get(entity_state))
        .route("/v1/services/:domain/:service", post(call_service))
        .route("/v1/todo/:entity_id/items", post(create_item))
        .route("/v1/todo/:entity_id/items/:uid", put(update_item))
        .route("/v1/todo/:entity_id/delete", post(delete_items))
        .route("/v1/todo/:entity_id/move", post(move_item))
        .route("/v1/calendar/:entity_id/events", get(calendar_events))
        .route("/v1/image/:entity_id", get(image))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the HTTP API server
///
/// This function will bind to the specified address and serve the API endpoints.
/// It will run until the provided shutdown signal is triggered.
///
/// # Arguments
/// * `engine` - The engine commands are sent to and state is read from
/// * `listen` - The IP address to listen on (e.g., 127.0.0.1)
/// * `port` - The port to listen on (e.g., 8565)
/// * `shutdown_rx` - A oneshot receiver that will trigger graceful shutdown
///
/// # Returns
/// Returns Ok(()) if the server shuts down gracefully, or an error if startup fails
pub async fn serve(
    engine: Arc<Engine>,
    listen: IpAddr,
    port: u16,
    shutdown_rx: tokio::sync::oneshot::Receiver<()>,
) -> Result<(), Box<dyn std::error::Error>> {
    let version = env!("CARGO_PKG_VERSION");

    let state = Arc::new(AppState { version, engine });
    let app = create_router(state);

    let addr = SocketAddr::new(listen, port);
    tracing::info!("Starting HTTP API server on {}", addr);

    let listener = TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            shutdown_rx.await.ok();
            tracing::info!("HTTP API server shutting down gracefully");
        })
        .await?;

    Ok(())
}
