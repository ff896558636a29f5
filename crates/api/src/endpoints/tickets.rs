//! Ticket endpoints: public intake and staff processing.

use axum::{Json, Router, extract::State, routing::post};
use rmadesk_common::AppResult;
use rmadesk_core::{ChangeStatusInput, CreateTicketInput, TicketStatistics, UpdateTicketInput};
use rmadesk_db::entities::support_ticket;
use serde::{Deserialize, Serialize};

use crate::{extractors::StaffUser, middleware::AppState, response::ApiResponse};

// ==================== Request/Response Types ====================

/// Ticket as seen by staff.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketResponse {
    pub rma_number: String,
    pub status: String,
    pub status_details: Option<String>,
    pub tracking_number: Option<String>,
    pub customer_name: String,
    pub customer_email: String,
    pub customer_phone: Option<String>,
    pub company: Option<String>,
    pub shipping_address: String,
    pub display_model: String,
    pub serial_number: String,
    pub defect_description: String,
    pub troubleshooting_steps: Vec<String>,
    pub shipping_method: String,
    pub repair_notes: Option<String>,
    pub assigned_to: Option<String>,
    pub priority: String,
    pub is_archived: bool,
    pub archived_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<support_ticket::Model> for TicketResponse {
    fn from(t: support_ticket::Model) -> Self {
        Self {
            rma_number: t.rma_number,
            status: t.status,
            status_details: t.status_details,
            tracking_number: t.tracking_number,
            customer_name: t.customer_name,
            customer_email: t.customer_email,
            customer_phone: t.customer_phone,
            company: t.company,
            shipping_address: t.shipping_address,
            display_model: t.display_model,
            serial_number: t.serial_number,
            defect_description: t.defect_description,
            troubleshooting_steps: serde_json::from_value(t.troubleshooting_steps)
                .unwrap_or_default(),
            shipping_method: t.shipping_method,
            repair_notes: t.repair_notes,
            assigned_to: t.assigned_to,
            priority: t.priority,
            is_archived: t.is_archived,
            archived_at: t.archived_at.map(|dt| dt.to_rfc3339()),
            created_at: t.created_at.to_rfc3339(),
            updated_at: t.updated_at.to_rfc3339(),
        }
    }
}

/// What the customer gets back after submitting the intake form.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedTicketResponse {
    pub rma_number: String,
    pub status: String,
    pub created_at: String,
}

/// Request addressing a single ticket.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RmaNumberRequest {
    pub rma_number: String,
}

/// List active tickets request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListTicketsRequest {
    pub status: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: u64,
    #[serde(default)]
    pub offset: u64,
}

/// Status change request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeStatusRequest {
    pub rma_number: String,
    #[serde(flatten)]
    pub input: ChangeStatusInput,
}

/// General update request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTicketRequest {
    pub rma_number: String,
    #[serde(flatten)]
    pub input: UpdateTicketInput,
}

pub(crate) const fn default_limit() -> u64 {
    20
}

// ==================== Handlers ====================

/// Submit a new ticket. Public.
async fn create(
    State(state): State<AppState>,
    Json(input): Json<CreateTicketInput>,
) -> AppResult<ApiResponse<CreatedTicketResponse>> {
    let ticket = state.ticket_service.create_ticket(input).await?;

    Ok(ApiResponse::ok(CreatedTicketResponse {
        rma_number: ticket.rma_number,
        status: ticket.status,
        created_at: ticket.created_at.to_rfc3339(),
    }))
}

/// Show a ticket.
async fn show(
    StaffUser(_staff): StaffUser,
    State(state): State<AppState>,
    Json(req): Json<RmaNumberRequest>,
) -> AppResult<ApiResponse<TicketResponse>> {
    let ticket = state.ticket_service.get_ticket(&req.rma_number).await?;
    Ok(ApiResponse::ok(ticket.into()))
}

/// List non-archived tickets.
async fn list(
    StaffUser(_staff): StaffUser,
    State(state): State<AppState>,
    Json(req): Json<ListTicketsRequest>,
) -> AppResult<ApiResponse<Vec<TicketResponse>>> {
    let tickets = state
        .ticket_service
        .list_active(req.status.as_deref(), req.limit, req.offset)
        .await?;

    Ok(ApiResponse::ok(tickets.into_iter().map(Into::into).collect()))
}

/// Change a ticket's status.
async fn change_status(
    StaffUser(staff): StaffUser,
    State(state): State<AppState>,
    Json(req): Json<ChangeStatusRequest>,
) -> AppResult<ApiResponse<TicketResponse>> {
    let ticket = state
        .ticket_service
        .change_status(&req.rma_number, req.input, &staff.name)
        .await?;

    Ok(ApiResponse::ok(ticket.into()))
}

/// Update ticket fields other than the status.
async fn update(
    StaffUser(staff): StaffUser,
    State(state): State<AppState>,
    Json(req): Json<UpdateTicketRequest>,
) -> AppResult<ApiResponse<TicketResponse>> {
    let ticket = state
        .ticket_service
        .update_fields(&req.rma_number, req.input, &staff.name)
        .await?;

    Ok(ApiResponse::ok(ticket.into()))
}

/// Dashboard counters.
async fn stats(
    StaffUser(_staff): StaffUser,
    State(state): State<AppState>,
) -> AppResult<ApiResponse<TicketStatistics>> {
    let stats = state.ticket_service.statistics().await?;
    Ok(ApiResponse::ok(stats))
}

// ==================== Router ====================

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/create", post(create))
        .route("/show", post(show))
        .route("/list", post(list))
        .route("/status", post(change_status))
        .route("/update", post(update))
        .route("/stats", post(stats))
}
