use anyhow::Result;
use axum::{http::StatusCode, response::IntoResponse, routing::get, Extension, Router};
use clap::Parser;
use std::net::SocketAddr;
use tower_http::trace::TraceLayer;
use tracing::info;

mod cli;

use traffic_log::{config, init_json_tracing, init_tracing, ResponseException, Traffic};

async fn index() -> &'static str {
    "Hello, traffic!"
}

async fn boom() -> &'static str {
    panic!("boom route always fails")
}

async fn fail() -> impl IntoResponse {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Extension(ResponseException("backend unavailable".to_string())),
        "try again later",
    )
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Cli::parse();

    if args.json_logs {
        init_json_tracing();
    } else {
        init_tracing();
    }

    let cfg = config::load_config(&args.config)?;
    info!(
        "Configuration: host '{}', {} stores",
        cfg.host.name,
        cfg.stores.len()
    );

    let traffic =
        Traffic::init_app_with(Some(cfg.host.clone()), cfg.build_stores(), cfg.on_store_error)
            .await?;

    let routes = Router::new()
        .route("/", get(index))
        .route("/boom", get(boom))
        .route("/fail", get(fail));

    let app = traffic.layer(routes).layer(TraceLayer::new_for_http());

    info!("Starting traffic demo on {}", args.bind);
    let listener = tokio::net::TcpListener::bind(args.bind).await?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async {
        let _ = tokio::signal::ctrl_c().await;
        info!("Shutdown signal received, draining connections...");
    })
    .await?;

    info!("Server stopped gracefully");
    Ok(())
}
