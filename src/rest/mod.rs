// rest/mod.rs — Public REST API server.
//
// Axum HTTP server, local only by default. CORS is permissive because the
// calendar frontend runs on a different origin in development.
//
// Endpoints:
//   GET  /api/v1/health
//   GET  /api/v1/tasks?routineId=&startDate=&endDate=
//   POST /api/v1/tasks
//   PUT  /api/v1/tasks?id=<taskId>
//   GET  /api/v1/routines
//   POST /api/v1/routines
//   POST /api/v1/routines/generate

pub mod routes;

use anyhow::Result;
use axum::{
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::AppContext;

pub async fn start_rest_server(ctx: Arc<AppContext>) -> Result<()> {
    let bind = format!("{}:{}", ctx.config.bind_address, ctx.config.port);
    let addr: SocketAddr = bind.parse()?;

    let router = build_router(ctx);

    info!("REST API listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;
    Ok(())
}

pub fn build_router(ctx: Arc<AppContext>) -> Router {
    Router::new()
        .route("/api/v1/health", get(routes::health::health))
        .route(
            "/api/v1/tasks",
            get(routes::tasks::list_tasks)
                .post(routes::tasks::create_task)
                .put(routes::tasks::update_task),
        )
        .route(
            "/api/v1/routines",
            get(routes::routines::list_routines).post(routes::routines::create_routine),
        )
        .route(
            "/api/v1/routines/generate",
            post(routes::routines::generate_routine),
        )
        .layer(CorsLayer::permissive())
        .with_state(ctx)
}
