use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};

use shared_utils::extractor::auth_middleware;

use crate::{handlers, websocket, QueueState};

pub fn create_queue_router(state: Arc<QueueState>) -> Router {
    // Every queue route, the socket included, requires a valid token
    let protected_routes = Router::new()
        .route("/", post(handlers::book_appointment))
        .route("/mine", get(handlers::my_appointments))
        .route("/doctor", get(handlers::doctor_queue))
        .route("/doctor/history", get(handlers::doctor_history))
        .route("/doctor/next", post(handlers::call_next))
        .route("/doctor/serving", get(handlers::now_serving))
        .route("/hospital", get(handlers::hospital_board))
        .route("/ws", get(websocket::websocket_handler))
        .route("/{appointment_id}", get(handlers::get_appointment))
        .route("/{appointment_id}/status", put(handlers::update_status))
        .layer(middleware::from_fn_with_state(state.config.clone(), auth_middleware));

    Router::new()
        .merge(protected_routes)
        .with_state(state)
}
