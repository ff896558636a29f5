//! Admin endpoints: archive, activity log and the admin status route.

use axum::{Json, Router, extract::State, routing::post};
use rmadesk_common::AppResult;
use rmadesk_db::entities::activity_log::{self, ActivityAction};
use serde::{Deserialize, Serialize};

use super::tickets::{ChangeStatusRequest, TicketResponse, default_limit};
use crate::{extractors::AdminUser, middleware::AppState, response::ApiResponse};

/// Activity log entry response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityLogResponse {
    pub id: String,
    pub action: ActivityAction,
    pub rma_number: Option<String>,
    pub actor: String,
    pub details: serde_json::Value,
    pub created_at: String,
}

impl From<activity_log::Model> for ActivityLogResponse {
    fn from(entry: activity_log::Model) -> Self {
        Self {
            id: entry.id,
            action: entry.action,
            rma_number: entry.rma_number,
            actor: entry.actor,
            details: entry.details,
            created_at: entry.created_at.to_rfc3339(),
        }
    }
}

/// Result of an on-demand sweep.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveRunResponse {
    pub archived: u64,
}

/// Paging request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageRequest {
    #[serde(default = "default_limit")]
    pub limit: u64,
    #[serde(default)]
    pub offset: u64,
}

/// Activity log listing request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListActivityRequest {
    pub rma_number: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: u64,
    #[serde(default)]
    pub offset: u64,
}

/// Change a ticket's status from the admin panel.
async fn change_status(
    AdminUser(admin): AdminUser,
    State(state): State<AppState>,
    Json(req): Json<ChangeStatusRequest>,
) -> AppResult<ApiResponse<TicketResponse>> {
    let ticket = state
        .ticket_service
        .change_status(&req.rma_number, req.input, &admin.name)
        .await?;

    Ok(ApiResponse::ok(ticket.into()))
}

/// List archived tickets.
async fn archived(
    AdminUser(_admin): AdminUser,
    State(state): State<AppState>,
    Json(req): Json<PageRequest>,
) -> AppResult<ApiResponse<Vec<TicketResponse>>> {
    let tickets = state
        .ticket_service
        .list_archived(req.limit, req.offset)
        .await?;

    Ok(ApiResponse::ok(tickets.into_iter().map(Into::into).collect()))
}

/// Run the archival sweep now.
async fn run_archive(
    AdminUser(admin): AdminUser,
    State(state): State<AppState>,
) -> AppResult<ApiResponse<ArchiveRunResponse>> {
    tracing::info!(admin = %admin.name, "Manual archival sweep requested");
    let archived = state.archival_service.run_archival_sweep().await?;
    Ok(ApiResponse::ok(ArchiveRunResponse { archived }))
}

/// List activity log entries.
async fn activity(
    AdminUser(_admin): AdminUser,
    State(state): State<AppState>,
    Json(req): Json<ListActivityRequest>,
) -> AppResult<ApiResponse<Vec<ActivityLogResponse>>> {
    let entries = state
        .activity_log_service
        .list(req.rma_number.as_deref(), req.limit, req.offset)
        .await?;

    Ok(ApiResponse::ok(entries.into_iter().map(Into::into).collect()))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/tickets/status", post(change_status))
        .route("/tickets/archived", post(archived))
        .route("/archive/run", post(run_archive))
        .route("/activity/list", post(activity))
}
