//! Nimbus Server - Controller Bootstrap

use nimbus_server::{create_api_router, initialize_server, logging, AppState};
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let _log_guard = logging::init();

    let components = initialize_server().map_err(|e| {
        error!("failed to initialize controller: {e}");
        e
    })?;

    let host = components.config.server.host.clone();
    let port = components.config.server.port;
    let pool = components.pool.clone();

    let state = AppState {
        pool: components.pool,
        dispatcher: components.dispatcher,
    };
    let app = create_api_router(state);

    let listener = tokio::net::TcpListener::bind(format!("{host}:{port}")).await?;
    info!("controller listening on http://{host}:{port}");

    let shutdown_pool = pool.clone();
    let mut fatal = pool.fatal();
    let shutdown = async move {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown signal received");
                shutdown_pool.close();
            }
            _ = fatal.changed() => {}
        }
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    let failure = pool.fatal().borrow().clone();
    if let Some(reason) = failure {
        error!(%reason, "controller stopping after fleet failure");
        return Err(reason.into());
    }

    Ok(())
}
