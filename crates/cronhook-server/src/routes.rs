//! Router assembly: the API surface plus liveness probing and the
//! middleware stack.

use axum::{extract::State, middleware as axum_middleware, routing::get, Json, Router};
use serde_json::{json, Value};
use tower_http::trace::TraceLayer;

use cronhook_api::ApiContext;

use crate::middleware::{cors_layer, request_id, request_logging};

/// Build the complete application router
pub fn create_router(ctx: ApiContext) -> Router {
    let health = Router::new()
        .route("/health", get(health_check))
        .with_state(ctx.clone());

    cronhook_api::router(ctx)
        .merge(health)
        .layer(TraceLayer::new_for_http())
        .layer(axum_middleware::from_fn(request_logging))
        .layer(axum_middleware::from_fn(request_id))
        .layer(cors_layer())
}

/// Liveness probe: process up, store reachable, engine populated
async fn health_check(State(ctx): State<ApiContext>) -> Json<Value> {
    let database = match ctx.jobs.count().await {
        Ok(_) => "up",
        Err(_) => "down",
    };

    Json(json!({
        "status": if database == "up" { "ok" } else { "degraded" },
        "version": env!("CARGO_PKG_VERSION"),
        "database": database,
        "registeredJobs": ctx.engine.registered_count(),
    }))
}
