//! HTTP error mapping

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use nimbus_application::DispatchError;
use thiserror::Error;

/// API-level error, mapped onto the controller's status codes.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("expected invocation format: /run/<lambda-name>")]
    MissingLambdaName,

    #[error("no active worker")]
    NoActiveWorker,

    #[error("{0}")]
    BadGateway(String),

    #[error("{0}")]
    Internal(String),
}

impl From<DispatchError> for ApiError {
    fn from(err: DispatchError) -> Self {
        match err {
            DispatchError::NoActiveWorker => Self::NoActiveWorker,
            DispatchError::Forward(source) => Self::BadGateway(source.to_string()),
            DispatchError::NoAddress(worker) => {
                Self::BadGateway(format!("worker {worker} has no assigned address"))
            }
            DispatchError::QueueClosed => Self::Internal("worker queue closed".to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self {
            Self::MissingLambdaName => StatusCode::BAD_REQUEST,
            Self::NoActiveWorker | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::BadGateway(_) => StatusCode::BAD_GATEWAY,
        };
        (status, format!("{self}\n")).into_response()
    }
}
