use std::sync::Arc;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use warp::Filter;

use coderoom::api::routes;
use coderoom::collab::CollabServer;
use coderoom::config::Config;
use coderoom::executor::ExecutorClient;

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "coderoom=info,warp=info".into()),
        )
        .init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "Invalid configuration");
            std::process::exit(1);
        }
    };

    let executor = match ExecutorClient::new(config.executor.clone()) {
        Ok(executor) => executor,
        Err(e) => {
            tracing::error!(error = %e, "Failed to initialize executor client");
            std::process::exit(1);
        }
    };
    tracing::info!(executor_url = %executor.base_url(), "Executor backend configured");

    let server = Arc::new(CollabServer::new(executor));

    let routes = routes::collab_websocket_route(server.clone())
        .or(routes::room_verify_route(server))
        .or(routes::collab_health_check())
        .or(routes::collab_config_endpoint());

    tracing::info!(addr = %config.bind, "Coderoom server starting");

    warp::serve(routes).run(config.bind).await;
}
