//! Nimbus Server - HTTP Frontend
//!
//! Thin axum layer over the worker pool: invocation forwarding, status
//! snapshots, and operator scaling.

pub mod api_router;
pub mod bootstrap;
pub mod error;
pub mod handlers;
pub mod logging;

pub use crate::api_router::create_api_router;
pub use crate::bootstrap::{initialize_server, ServerComponents};
pub use crate::handlers::AppState;
