use std::sync::Arc;

use axum::{
    extract::{
        rejection::{BytesRejection, JsonRejection},
        DefaultBodyLimit, Path, State,
    },
    http::{header, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::{json, Value};
use shared::error::RelayErrorBody;
use thiserror::Error;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::{info, warn};
use url::Url;

use crate::app_state::RelayState;

mod proxy;

pub const COLLECTION_PATH: &str = "/api/systemusers";
pub const API_KEY_HEADER: &str = "x-api-key";
const MAX_BODY_BYTES: usize = 1024 * 1024;
const LOCAL_ORIGIN_MARKER: &str = "http://localhost";

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("directory returned {status}")]
    Upstream { status: StatusCode, body: Value },
    #[error("directory unreachable: {0}")]
    Unreachable(#[from] reqwest::Error),
    #[error("directory sent an unreadable body: {0}")]
    MalformedUpstream(#[from] serde_json::Error),
    #[error("invalid directory url: {0}")]
    InvalidUrl(String),
    #[error("{message}")]
    Rejected { status: StatusCode, message: String },
}

impl From<JsonRejection> for RelayError {
    fn from(rejection: JsonRejection) -> Self {
        Self::Rejected {
            status: rejection.status(),
            message: rejection.body_text(),
        }
    }
}

impl From<BytesRejection> for RelayError {
    fn from(rejection: BytesRejection) -> Self {
        Self::Rejected {
            status: rejection.status(),
            message: rejection.body_text(),
        }
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::Upstream { status, body } => (status, body),
            Self::Rejected { status, message } => (status, Value::String(message)),
            other => (StatusCode::BAD_GATEWAY, Value::String(other.to_string())),
        };
        (status, Json(RelayErrorBody::new(status.as_u16(), message))).into_response()
    }
}

pub fn build_router(state: Arc<RelayState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route(COLLECTION_PATH, get(list_users).post(create_user))
        .route(
            &format!("{COLLECTION_PATH}/:id"),
            get(get_user).put(update_user).delete(delete_user),
        )
        .fallback(proxy::forward)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(cors_layer())
        .with_state(state)
}

/// Browser origins served from localhost get their origin reflected.
fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(AllowOrigin::predicate(|origin: &HeaderValue, _| {
            origin
                .to_str()
                .is_ok_and(|origin| origin.contains(LOCAL_ORIGIN_MARKER))
        }))
        .allow_methods([
            Method::GET,
            Method::OPTIONS,
            Method::PUT,
            Method::POST,
            Method::DELETE,
        ])
        .allow_headers([header::CONTENT_TYPE])
}

async fn healthz() -> &'static str {
    "ok"
}

async fn list_users(State(state): State<Arc<RelayState>>) -> Result<Json<Value>, RelayError> {
    forward_to_directory(&state, Method::GET, None, None)
        .await
        .map(Json)
}

async fn get_user(
    State(state): State<Arc<RelayState>>,
    Path(id): Path<String>,
) -> Result<Json<Value>, RelayError> {
    forward_to_directory(&state, Method::GET, Some(&id), None)
        .await
        .map(Json)
}

async fn create_user(
    State(state): State<Arc<RelayState>>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Value>, RelayError> {
    let Json(body) = payload?;
    forward_to_directory(&state, Method::POST, None, Some(body))
        .await
        .map(Json)
}

async fn update_user(
    State(state): State<Arc<RelayState>>,
    Path(id): Path<String>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Value>, RelayError> {
    let Json(body) = payload?;
    forward_to_directory(&state, Method::PUT, Some(&id), Some(body))
        .await
        .map(Json)
}

async fn delete_user(
    State(state): State<Arc<RelayState>>,
    Path(id): Path<String>,
) -> Result<Json<Value>, RelayError> {
    forward_to_directory(&state, Method::DELETE, Some(&id), None)
        .await
        .map(Json)
}

fn directory_target(base: &Url, id: Option<&str>) -> Result<Url, RelayError> {
    let mut url = base.clone();
    url.set_path(COLLECTION_PATH);
    if let Some(id) = id {
        url.path_segments_mut()
            .map_err(|_| RelayError::InvalidUrl(base.to_string()))?
            .push(id);
    }
    Ok(url)
}

/// Calls the directory with the relay's credential. Any non-success status
/// becomes a [`RelayError::Upstream`] carrying the directory's body; an
/// empty success body becomes `{}`.
async fn forward_to_directory(
    state: &RelayState,
    method: Method,
    id: Option<&str>,
    body: Option<Value>,
) -> Result<Value, RelayError> {
    let url = directory_target(&state.directory_url, id)?;
    info!(%method, path = url.path(), "relay: forwarding to directory");

    let mut request = state
        .http
        .request(method.clone(), url)
        .header(API_KEY_HEADER, &state.api_key)
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::ACCEPT, "application/json");
    if let Some(body) = body {
        request = request.json(&body);
    }

    let response = request.send().await?;
    let status = response.status();
    let bytes = response.bytes().await?;

    if !status.is_success() {
        let body = serde_json::from_slice::<Value>(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()));
        warn!(
            %method,
            status = status.as_u16(),
            message = %body,
            "relay: directory returned an error"
        );
        return Err(RelayError::Upstream { status, body });
    }

    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(json!({}));
    }
    Ok(serde_json::from_slice(&bytes)?)
}

#[cfg(test)]
#[path = "tests/mod_tests.rs"]
mod tests;
