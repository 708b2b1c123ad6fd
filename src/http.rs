//! REST surface over the ledger, tree and graph operations.

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        FromRequest, FromRequestParts, Path, Query, State,
    },
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, patch, put},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::db::Db;
use crate::error::{KbError, Result};
use crate::graph::find_shortest_path;
use crate::ledger;
use crate::model::{
    DeletePolicy, NewResource, NewTopic, Resource, ResourceUpdate, TopicPath, TopicUpdate,
    TopicVersion, TopicView, TreeNode,
};
use crate::resources;
use crate::tree::get_topic_tree;

/// Application state shared across handlers
#[derive(Clone)]
struct AppState {
    db: Db,
}

/// JSON body extractor whose decode failures surface as [`KbError`].
#[derive(FromRequest)]
#[from_request(via(Json), rejection(KbError))]
struct ApiJson<T>(T);

/// Query string extractor whose decode failures surface as [`KbError`].
#[derive(FromRequestParts)]
#[from_request(via(Query), rejection(KbError))]
struct ApiQuery<T>(T);

impl From<JsonRejection> for KbError {
    fn from(rejection: JsonRejection) -> Self {
        KbError::InvalidInput(rejection.body_text())
    }
}

impl From<QueryRejection> for KbError {
    fn from(rejection: QueryRejection) -> Self {
        KbError::InvalidInput(rejection.body_text())
    }
}

#[derive(Debug, Deserialize)]
struct VersionQuery {
    version: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct DeleteQuery {
    #[serde(default)]
    policy: DeletePolicy,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MoveBody {
    #[serde(default)]
    parent_id: Option<String>,
}

impl IntoResponse for KbError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            KbError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            KbError::Integrity(_) => {
                log::error!("Integrity violation surfaced to caller: {}", self);
                (StatusCode::NOT_FOUND, "NOT_FOUND")
            }
            KbError::Unprocessable(_) => (StatusCode::UNPROCESSABLE_ENTITY, "NO_PATH"),
            KbError::Cycle(_) => (StatusCode::CONFLICT, "CYCLE"),
            KbError::InvalidInput(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
            KbError::Database(_) | KbError::Io(_) | KbError::Config(_) => {
                log::error!("Request failed: {}", self);
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR")
            }
        };

        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            "An internal error occurred".to_string()
        } else {
            self.to_string()
        };

        (status, Json(json!({ "error": message, "code": code }))).into_response()
    }
}

/// Build the router. An empty `allowed_origins` allows any origin.
pub fn router(db: Db, allowed_origins: &[String]) -> Router {
    let cors = if allowed_origins.is_empty() {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<HeaderValue> = allowed_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods(Any)
            .allow_headers(Any)
    };

    Router::new()
        .route("/health", get(handle_health))
        .route("/api/topics", get(handle_list_roots).post(handle_create_topic))
        .route(
            "/api/topics/:id",
            get(handle_read_topic)
                .patch(handle_update_topic)
                .delete(handle_delete_topic),
        )
        .route("/api/topics/:id/parent", put(handle_move_topic))
        .route("/api/topics/:id/versions", get(handle_list_versions))
        .route("/api/topics/:id/tree", get(handle_tree))
        .route("/api/topics/:id/path/:end_id", get(handle_path))
        .route(
            "/api/topics/:id/resources",
            get(handle_list_resources).post(handle_create_resource),
        )
        .route(
            "/api/topics/:id/resources/:resource_id",
            patch(handle_update_resource).delete(handle_delete_resource),
        )
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(AppState { db })
}

/// Bind the configured address and serve until the process stops.
pub async fn serve(db: Db, config: &Config) -> Result<()> {
    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr).await.map_err(|e| {
        KbError::Io(std::io::Error::new(
            e.kind(),
            format!("Failed to bind to {}: {}", addr, e),
        ))
    })?;

    log::info!("Serving knowledge base on http://{}", addr);

    axum::serve(listener, router(db, &config.http_server.allowed_origins))
        .await
        .map_err(|e| {
            KbError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                format!("HTTP server error: {}", e),
            ))
        })
}

async fn handle_health() -> Response {
    (
        StatusCode::OK,
        Json(json!({
            "status": "ok",
            "service": "kbgraph",
            "version": env!("CARGO_PKG_VERSION")
        })),
    )
        .into_response()
}

async fn handle_list_roots(State(state): State<AppState>) -> Result<Json<Vec<TopicView>>> {
    Ok(Json(ledger::list_root_topics(&state.db).await?))
}

async fn handle_create_topic(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<NewTopic>,
) -> Result<(StatusCode, Json<TopicView>)> {
    let view = ledger::create_topic(&state.db, body).await?;
    Ok((StatusCode::CREATED, Json(view)))
}

async fn handle_read_topic(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ApiQuery(query): ApiQuery<VersionQuery>,
) -> Result<Json<TopicView>> {
    Ok(Json(ledger::read_topic(&state.db, &id, query.version).await?))
}

async fn handle_update_topic(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<TopicUpdate>,
) -> Result<Json<TopicView>> {
    Ok(Json(ledger::update_topic(&state.db, &id, body).await?))
}

async fn handle_delete_topic(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ApiQuery(query): ApiQuery<DeleteQuery>,
) -> Result<StatusCode> {
    ledger::delete_topic_with(&state.db, &id, query.policy).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn handle_move_topic(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<MoveBody>,
) -> Result<Json<TopicView>> {
    Ok(Json(ledger::move_topic(&state.db, &id, body.parent_id).await?))
}

async fn handle_list_versions(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<TopicVersion>>> {
    Ok(Json(ledger::list_versions(&state.db, &id).await?))
}

async fn handle_tree(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ApiQuery(query): ApiQuery<VersionQuery>,
) -> Result<Json<TreeNode>> {
    Ok(Json(get_topic_tree(&state.db, &id, query.version).await?))
}

async fn handle_path(
    State(state): State<AppState>,
    Path((start_id, end_id)): Path<(String, String)>,
) -> Result<Json<TopicPath>> {
    Ok(Json(find_shortest_path(&state.db, &start_id, &end_id).await?))
}

async fn handle_list_resources(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<Resource>>> {
    Ok(Json(resources::list_resources(&state.db, &id).await?))
}

async fn handle_create_resource(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<NewResource>,
) -> Result<(StatusCode, Json<Resource>)> {
    let resource = resources::create_resource(&state.db, &id, body).await?;
    Ok((StatusCode::CREATED, Json(resource)))
}

async fn handle_update_resource(
    State(state): State<AppState>,
    Path((id, resource_id)): Path<(String, String)>,
    ApiJson(body): ApiJson<ResourceUpdate>,
) -> Result<Json<Resource>> {
    Ok(Json(
        resources::update_resource(&state.db, &id, &resource_id, body).await?,
    ))
}

async fn handle_delete_resource(
    State(state): State<AppState>,
    Path((id, resource_id)): Path<(String, String)>,
) -> Result<StatusCode> {
    resources::delete_resource(&state.db, &id, &resource_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
