//! Route table: resource-family nesting under `/tmf-api/{apiFamily}/v5`,
//! wired to the handlers in `handlers.rs`. Grounded on the teacher's
//! `build_router`/`AppState` assembly in `server.rs`, scaled to this
//! surface's small, generic route set.

use axum::routing::get;
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    let family_scoped = Router::new()
        .route(
            "/{resource}",
            get(handlers::list_resources).post(handlers::create_resource),
        )
        .route(
            "/{resource}/{id}",
            get(handlers::read_resource)
                .patch(handlers::update_resource)
                .delete(handlers::delete_resource),
        )
        .route(
            "/hub",
            axum::routing::post(handlers::create_subscription),
        )
        .route("/hub/{id}", axum::routing::delete(handlers::delete_subscription));

    Router::new()
        .nest("/tmf-api/{api_family}/v5", family_scoped)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
