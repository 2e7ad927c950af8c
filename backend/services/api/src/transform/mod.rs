pub mod handlers;
pub mod requests;
pub mod responses;

use axum::routing::{get, post};
use axum::Router;

use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/_transform", get(handlers::list_transforms))
        .route(
            "/_transform/{id}",
            get(handlers::get_transform)
                .put(handlers::put_transform)
                .delete(handlers::delete_transform),
        )
        .route("/_transform/{id}/_start", post(handlers::start_transform))
        .route("/_transform/{id}/_stop", post(handlers::stop_transform))
}
