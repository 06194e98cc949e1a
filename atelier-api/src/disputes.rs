use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;

use atelier_core::{Dispute, DisputeStatus};
use atelier_dispute::{DisputeDetails, EvidenceInput, ResponseAction};

use crate::error::ApiResult;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/orders/{id}/disputes", post(create_dispute))
        .route("/v1/disputes/{id}", get(get_dispute))
        .route("/v1/disputes/{id}/respond", post(respond_to_dispute))
        .route("/v1/disputes/{id}/resolve", post(resolve_dispute))
}

#[derive(Debug, Deserialize)]
pub struct CreateDisputeRequest {
    pub creator_id: Uuid,
    pub category: String,
    pub description: String,
    #[serde(default)]
    pub evidence: Vec<EvidenceInput>,
}

#[derive(Debug, Deserialize)]
pub struct RespondRequest {
    pub designer_id: Uuid,
    pub action: ResponseAction,
    #[serde(default)]
    pub comment: String,
    #[serde(default)]
    pub evidence: Vec<EvidenceInput>,
}

#[derive(Debug, Deserialize)]
pub struct ResolveRequest {
    pub admin_id: Uuid,
    #[serde(default)]
    pub resolution: String,
    #[serde(default)]
    pub notes: String,
    #[serde(default = "resolved")]
    pub status: DisputeStatus,
}

fn resolved() -> DisputeStatus {
    DisputeStatus::Resolved
}

/// POST /v1/orders/{id}/disputes
async fn create_dispute(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
    Json(req): Json<CreateDisputeRequest>,
) -> ApiResult<(StatusCode, Json<Dispute>)> {
    let dispute = state
        .disputes
        .create_dispute(order_id, req.creator_id, &req.category, &req.description, req.evidence)
        .await?;
    Ok((StatusCode::CREATED, Json(dispute)))
}

/// GET /v1/disputes/{id}
async fn get_dispute(State(state): State<AppState>, Path(dispute_id): Path<Uuid>) -> ApiResult<Json<DisputeDetails>> {
    Ok(Json(state.disputes.get_dispute(dispute_id).await?))
}

/// POST /v1/disputes/{id}/respond
async fn respond_to_dispute(
    State(state): State<AppState>,
    Path(dispute_id): Path<Uuid>,
    Json(req): Json<RespondRequest>,
) -> ApiResult<Json<Dispute>> {
    let dispute = state
        .disputes
        .respond_to_dispute(dispute_id, req.designer_id, req.action, &req.comment, req.evidence)
        .await?;
    Ok(Json(dispute))
}

/// POST /v1/disputes/{id}/resolve
async fn resolve_dispute(
    State(state): State<AppState>,
    Path(dispute_id): Path<Uuid>,
    Json(req): Json<ResolveRequest>,
) -> ApiResult<Json<Dispute>> {
    let dispute = state
        .disputes
        .resolve_dispute(dispute_id, req.admin_id, &req.resolution, &req.notes, req.status)
        .await?;
    Ok(Json(dispute))
}
