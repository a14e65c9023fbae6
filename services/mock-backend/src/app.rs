use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::handlers::{
    authorize_user, create_place_task, create_search, create_task, create_user, get_search,
    get_task, healthz, me, readyz,
};
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/api/user", post(create_user))
        .route("/api/user/authorize", post(authorize_user))
        .route("/api/user/me", get(me))
        .route("/api/task", post(create_task))
        .route("/api/task/place", post(create_place_task))
        .route("/api/task/:id", get(get_task))
        .route("/api/search", post(create_search))
        .route("/api/search/:id", get(get_search))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
