//! HTTP route table

use axum::routing::{any, get, post};
use axum::Router;

use crate::handlers::{
    health, run_lambda, run_missing_name, scale, status_cluster, status_debug, status_tasks,
    AppState,
};

/// Build the controller's route table.
pub fn create_api_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/run", any(run_missing_name))
        .route("/run/", any(run_missing_name))
        .route("/run/{*rest}", any(run_lambda))
        .route("/status", get(status_debug))
        .route("/status/cluster", get(status_cluster))
        .route("/status/tasks", get(status_tasks))
        .route("/admin/scale", post(scale))
        .with_state(state)
}
