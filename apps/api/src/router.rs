use std::sync::Arc;

use axum::{routing::get, Router};

use queue_cell::{create_queue_router, QueueState};

pub fn create_router(state: Arc<QueueState>) -> Router {
    Router::new()
        .route("/", get(|| async { "Outpatient token queue is running!" }))
        .route("/health", get(|| async { "ok" }))
        .nest("/api/appointments", create_queue_router(state))
}
