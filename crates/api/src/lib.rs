//! HTTP API layer for rmadesk.
//!
//! - **Endpoints**: public ticket intake, staff ticket processing, admin
//!   archive and activity views
//! - **Extractors**: staff and admin authentication
//! - **Middleware**: bearer token resolution
//!
//! Built on Axum 0.8.

pub mod endpoints;
pub mod extractors;
pub mod middleware;
pub mod response;

use axum::Router;

pub use endpoints::router;
use middleware::{AppState, auth_middleware};

/// The API mounted under `/api` with authentication applied.
pub fn app(state: AppState) -> Router {
    Router::new()
        .nest("/api", router())
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ))
        .with_state(state)
}
