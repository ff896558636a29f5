//! API endpoints.

mod admin;
mod tickets;

use axum::Router;

use crate::middleware::AppState;

/// Create the API router.
pub fn router() -> Router<AppState> {
    Router::new()
        .nest("/tickets", tickets::router())
        .nest("/admin", admin::router())
}
