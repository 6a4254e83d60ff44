use axum::middleware::from_fn_with_state;
use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::handlers::{
    create_batch_handler, create_json_handler, create_plain_handler, delete_urls_handler,
    list_urls_handler, ping_handler, redirect_handler, stats_handler,
};
use crate::middleware::{session_middleware, trusted_subnet_guard};
use crate::state::AppState;

pub struct App {}

impl App {
    pub fn router(state: AppState) -> Router {
        let internal = Router::new()
            .route("/stats", get(stats_handler))
            .route_layer(from_fn_with_state(state.clone(), trusted_subnet_guard));

        Router::new()
            .route("/", post(create_plain_handler))
            .route("/ping", get(ping_handler))
            .route("/{code}", get(redirect_handler))
            .nest(
                "/api",
                Router::new()
                    .route("/shorten", post(create_json_handler))
                    .route("/shorten/batch", post(create_batch_handler))
                    .route(
                        "/user/urls",
                        get(list_urls_handler).delete(delete_urls_handler),
                    )
                    .nest("/internal", internal),
            )
            .layer(from_fn_with_state(state.clone(), session_middleware))
            .layer(TraceLayer::new_for_http())
            .with_state(state)
    }
}
