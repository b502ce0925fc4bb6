//! Pass-through for every `/api` path the relay has no dedicated route for.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{rejection::BytesRejection, State},
    http::{header, HeaderMap, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
};
use tracing::{info, warn};
use url::Url;

use super::{RelayError, API_KEY_HEADER};
use crate::app_state::RelayState;

const PROXIED_PREFIX: &str = "/api";

pub(super) async fn forward(
    State(state): State<Arc<RelayState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Response {
    if !is_proxied(uri.path()) {
        return (StatusCode::NOT_FOUND, "not found").into_response();
    }
    let body = match body {
        Ok(body) => body,
        Err(rejection) => return RelayError::from(rejection).into_response(),
    };

    let requested_host = headers
        .get(header::HOST)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_else(|| state.proxy_host.host_str().unwrap_or_default())
        .to_string();

    let target = match proxy_target(&state.proxy_host, &uri) {
        Ok(target) => target,
        Err(reason) => return proxy_failure(&requested_host, &uri, &reason),
    };
    info!(%method, target = %target, "relay: proxying request");

    let mut request = state
        .http
        .request(method, target)
        .header(API_KEY_HEADER, &state.api_key)
        .body(body);
    for name in [header::CONTENT_TYPE, header::ACCEPT] {
        if let Some(value) = headers.get(&name) {
            request = request.header(name, value.clone());
        }
    }

    let response = match request.send().await {
        Ok(response) => response,
        Err(err) => return proxy_failure(&requested_host, &uri, &err.to_string()),
    };
    let status = response.status();
    let content_type = response.headers().get(header::CONTENT_TYPE).cloned();
    let bytes = match response.bytes().await {
        Ok(bytes) => bytes,
        Err(err) => return proxy_failure(&requested_host, &uri, &err.to_string()),
    };

    let mut proxied = (status, bytes).into_response();
    if let Some(content_type) = content_type {
        proxied
            .headers_mut()
            .insert(header::CONTENT_TYPE, content_type);
    }
    proxied
}

fn is_proxied(path: &str) -> bool {
    path == PROXIED_PREFIX || path.starts_with(&format!("{PROXIED_PREFIX}/"))
}

fn proxy_target(proxy_host: &Url, uri: &Uri) -> Result<Url, String> {
    let path_and_query = uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or_else(|| uri.path());
    proxy_host
        .join(path_and_query)
        .map_err(|err| err.to_string())
}

fn proxy_failure(host: &str, uri: &Uri, reason: &str) -> Response {
    if reason.to_ascii_lowercase().contains("certificate") {
        warn!(
            %host,
            "relay: upstream certificate rejected; a self-signed directory host needs its CA installed in the system trust store"
        );
    }
    warn!(%host, %uri, reason, "relay: proxy request failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        format!("Error occured while trying to proxy to: {host} {uri}. Error: {reason}\n"),
    )
        .into_response()
}
