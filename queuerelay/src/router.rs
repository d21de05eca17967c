//! HTTP router for the ingress API

use axum::{
    body::Body,
    extract::{rejection::QueryRejection, Query, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use queuerelay_core::{
    ApiError, ErrorCode, Message, ProcessedState, ProcessedStateStore, QueueUrls,
};
use queuerelay_sqs::QueueClient;
use serde::{de, Deserialize, Deserializer, Serialize};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

/// Shared state behind every handler
pub struct AppState {
    pub client: Arc<dyn QueueClient>,
    pub store: Arc<ProcessedStateStore>,
    pub queues: QueueUrls,
}

impl AppState {
    pub fn new(
        client: Arc<dyn QueueClient>,
        store: Arc<ProcessedStateStore>,
        queues: QueueUrls,
    ) -> Self {
        Self {
            client,
            store,
            queues,
        }
    }
}

/// Create the main application router
pub fn create_router(state: AppState) -> Router {
    let shared_state = Arc::new(state);

    Router::new()
        .route("/health", get(health_check))
        .route("/queue", get(get_processed).post(publish))
        .layer(TraceLayer::new_for_http())
        .with_state(shared_state)
}

#[derive(Debug, Deserialize)]
pub struct PublishQuery {
    #[serde(rename = "toDeadLetter", default, deserialize_with = "deserialize_flag")]
    pub to_dead_letter: bool,
}

/// `true` or `false` in any letter case, surrounding whitespace ignored
fn deserialize_flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let value = String::deserialize(deserializer)?;
    match value.trim() {
        v if v.eq_ignore_ascii_case("true") => Ok(true),
        v if v.eq_ignore_ascii_case("false") => Ok(false),
        _ => Err(de::Error::invalid_value(
            de::Unexpected::Str(&value),
            &"true or false",
        )),
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishResponse {
    pub message_id: String,
    pub message: Message,
}

async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "running" }))
}

async fn get_processed(State(state): State<Arc<AppState>>) -> Json<ProcessedState> {
    Json(state.store.get())
}

async fn publish(
    State(state): State<Arc<AppState>>,
    query: Result<Query<PublishQuery>, QueryRejection>,
) -> Result<Json<PublishResponse>, ErrorResponse> {
    let Query(query) = query.map_err(|rejection| {
        ApiError::new(ErrorCode::InvalidRequest, rejection.body_text())
    })?;

    let message = Message::now(query.to_dead_letter);
    let body = message
        .to_body()
        .map_err(|e| ApiError::new(ErrorCode::SerializationFailed, e.to_string()))?;

    let message_id = state
        .client
        .send(&state.queues.main, &body)
        .await
        .map_err(|e| {
            error!(queue_url = %state.queues.main, error = %e, "Failed to publish message");
            ApiError::new(ErrorCode::QueueSendFailed, e.to_string())
        })?;

    info!(
        message_id = %message_id,
        to_dead_letter = message.to_dead_letter,
        "Published message"
    );
    Ok(Json(PublishResponse {
        message_id,
        message,
    }))
}

/// [`ApiError`] rendered as a JSON response
pub struct ErrorResponse(pub ApiError);

impl From<ApiError> for ErrorResponse {
    fn from(error: ApiError) -> Self {
        Self(error)
    }
}

impl IntoResponse for ErrorResponse {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.http_status())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        let mut response = Response::new(Body::from(self.0.to_json()));
        *response.status_mut() = status;
        response.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        response
    }
}
