//! CGW Web Server
//!
//! Axum-based HTTP gateway in front of the chunked-graph engine, plus the
//! WebSocket notification channel.

pub mod auth;
pub mod cache;
pub mod context;
pub mod error;
pub mod lifecycle;
pub mod routes;
pub mod state;
pub mod websocket;

#[cfg(test)]
mod tests;

use axum::{
    http::header,
    middleware,
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;

pub use state::GatewayState;

/// Create the application router.
pub fn create_router(state: GatewayState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
        .expose_headers([header::WWW_AUTHENTICATE]);

    let api_routes = Router::new()
        // Table
        .route("/{table}/info", get(routes::graph::info))
        .route(
            "/{table}/graph/root",
            get(routes::graph::root_from_body).post(routes::graph::root_from_body),
        )
        .route(
            "/{table}/graph/{node}/root",
            get(routes::graph::root).post(routes::graph::root),
        )
        .route("/{table}/graph/merge", post(routes::graph::merge))
        .route("/{table}/graph/split", post(routes::graph::split))
        // Segment
        .route(
            "/{table}/segment/{node}/children",
            get(routes::segment::children).post(routes::segment::children),
        )
        .route(
            "/{table}/segment/{node}/leaves",
            get(routes::segment::leaves).post(routes::segment::leaves),
        )
        .route(
            "/{table}/segment/{node}/subgraph",
            get(routes::segment::subgraph).post(routes::segment::subgraph),
        )
        .route(
            "/{table}/segment/{node}/change_log",
            get(routes::segment::change_log).post(routes::segment::change_log),
        )
        .route(
            "/{table}/segment/{node}/merge_log",
            get(routes::segment::merge_log).post(routes::segment::merge_log),
        )
        .route(
            "/{table}/segment/{node}/contact_sites",
            get(routes::segment::contact_sites).post(routes::segment::contact_sites),
        );

    Router::new()
        .route("/", get(routes::index::index))
        .route("/index", get(routes::index::index))
        .route("/sleep/{seconds}", get(routes::index::sleep))
        .nest("/1.0", api_routes)
        .route("/ws", get(websocket::ws_handler))
        .fallback(routes::index::not_found)
        .layer(CatchPanicLayer::custom(error::handle_panic))
        .layer(middleware::from_fn_with_state(state.clone(), lifecycle::track_request))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Run the web server until Ctrl-C.
pub async fn run_server(state: GatewayState) -> anyhow::Result<()> {
    let addr = format!("{}:{}", state.config.host, state.config.port);
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Gateway listening on http://{}", addr);

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
