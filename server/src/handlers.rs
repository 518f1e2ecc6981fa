//! HTTP handlers: invocation, status, and operator scaling.

use std::sync::Arc;

use axum::body::Body;
use axum::extract::{OriginalUri, Path, Request, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use nimbus_application::{DispatchReply, Dispatcher, ForwardRequest, WorkerPool};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::ApiError;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub pool: WorkerPool,
    pub dispatcher: Arc<Dispatcher>,
}

/// `POST /run/<lambda-name>[/...]`: forward an invocation to a worker.
pub async fn run_lambda(
    State(state): State<AppState>,
    OriginalUri(uri): OriginalUri,
    Path(rest): Path<String>,
    request: Request,
) -> Result<Response, ApiError> {
    let lambda = rest.split('/').next().unwrap_or_default();
    if lambda.is_empty() {
        return Err(ApiError::MissingLambdaName);
    }

    let path_and_query = uri
        .path_and_query()
        .map(|pq| pq.as_str().to_owned())
        .unwrap_or_else(|| uri.path().to_owned());

    let (parts, body) = request.into_parts();
    let forward = ForwardRequest {
        method: parts.method,
        path_and_query,
        headers: parts.headers,
        body: reqwest::Body::wrap_stream(body.into_data_stream()),
    };

    match state.dispatcher.invoke(forward).await? {
        DispatchReply::Direct { body, .. } => Ok((StatusCode::OK, body).into_response()),
        DispatchReply::Forwarded {
            status,
            headers,
            body,
        } => {
            let mut response = Response::builder().status(status);
            if let Some(response_headers) = response.headers_mut() {
                response_headers.extend(headers);
            }
            response
                .body(Body::from_stream(body))
                .map_err(|e| ApiError::Internal(e.to_string()))
        }
    }
}

/// `/run` with no lambda name.
pub async fn run_missing_name() -> ApiError {
    ApiError::MissingLambdaName
}

/// `GET /status/cluster`: per-state worker counts.
pub async fn status_cluster(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.pool.cluster_status())
}

/// `GET /status/tasks`: fleet and per-worker task loads.
pub async fn status_tasks(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.pool.task_status())
}

/// `GET /status`: debug view of the whole pool.
pub async fn status_debug(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.pool.snapshot())
}

#[derive(Debug, Deserialize)]
pub struct ScaleRequest {
    pub target: usize,
}

#[derive(Debug, Serialize)]
pub struct ScaleResponse {
    pub target: usize,
}

/// `POST /admin/scale`: operator target control.
pub async fn scale(
    State(state): State<AppState>,
    Json(request): Json<ScaleRequest>,
) -> impl IntoResponse {
    info!(requested = request.target, "operator scale request");
    state.pool.set_target(request.target);
    Json(ScaleResponse {
        target: state.pool.target(),
    })
}

/// `GET /health`
pub async fn health() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}
