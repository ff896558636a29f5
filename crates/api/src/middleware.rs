//! API middleware and shared state.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{Request, header::AUTHORIZATION},
    middleware::Next,
    response::Response,
};
use rmadesk_common::{AuthConfig, StaffRole};
use rmadesk_core::{ActivityLogService, ArchivalService, TicketService};

/// Application state.
#[derive(Clone)]
pub struct AppState {
    pub ticket_service: TicketService,
    pub archival_service: ArchivalService,
    pub activity_log_service: ActivityLogService,
    pub auth: Arc<AuthConfig>,
}

/// The authenticated back-office account of a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaffMember {
    pub name: String,
    pub role: StaffRole,
}

/// Authentication middleware.
///
/// Resolves `Authorization: Bearer <token>` against the configured staff
/// accounts and stores the match as a [`StaffMember`] extension. Requests
/// without a valid token pass through unauthenticated; the extractors decide.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let token = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim);

    if let Some(token) = token {
        match state.auth.find_by_token(token) {
            Some(account) => {
                let member = StaffMember {
                    name: account.name.clone(),
                    role: account.role,
                };
                req.extensions_mut().insert(member);
            }
            None => tracing::debug!("Rejected unknown bearer token"),
        }
    }

    next.run(req).await
}
