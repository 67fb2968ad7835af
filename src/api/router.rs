//! REST API router.
//!
//! Returns a composable `Router` that can be mounted on any axum server.
//! Routes are nested under `/api/`.

use axum::routing::{get, post, put};
use axum::Router;

use crate::api::endpoints;
use crate::api::types::ApiContext;

/// Build the API router.
///
/// Endpoint handlers use `State<ApiContext>` (provided via `with_state`).
///
/// NOTE: Path params use `:param` syntax (matchit 0.7 / axum 0.7).
pub fn api_router(ctx: ApiContext) -> Router {
    let routes = Router::new()
        .route("/health", get(endpoints::health::check))
        .route(
            "/medications",
            get(endpoints::medications::list).post(endpoints::medications::create),
        )
        .route("/medications/upcoming", get(endpoints::medications::upcoming))
        .route(
            "/medications/:id",
            get(endpoints::medications::detail)
                .put(endpoints::medications::update)
                .delete(endpoints::medications::remove),
        )
        .route(
            "/medications/:id/schedule",
            get(endpoints::medications::schedule_view),
        )
        .route("/medications/:id/refill", post(endpoints::medications::refill))
        .route(
            "/adherence",
            get(endpoints::adherence::list).post(endpoints::adherence::record),
        )
        .route("/adherence/bulk", post(endpoints::adherence::bulk))
        .route("/adherence/stats", get(endpoints::adherence::stats))
        .route("/adherence/trends", get(endpoints::adherence::trends))
        .route("/adherence/:id", put(endpoints::adherence::settle))
        .route("/calendar", get(endpoints::adherence::calendar))
        .with_state(ctx);

    Router::new().nest("/api", routes)
}
