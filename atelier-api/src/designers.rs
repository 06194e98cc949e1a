use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;

use atelier_core::{CommissionPayment, CoreError, DesignerPatch, DesignerProfile, DesignerStatus, SkillLevel};
use atelier_ledger::CommissionStatement;

use crate::error::{ApiResult, AppError};
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/designers", post(register_designer))
        .route("/v1/designers/{id}", get(get_designer).patch(update_designer))
        .route("/v1/designers/{id}/commission", get(commission_statement))
        .route("/v1/designers/{id}/commission-payments", post(submit_commission_payment))
}

#[derive(Debug, Deserialize)]
pub struct RegisterDesignerRequest {
    pub user_id: Uuid,
    pub specialties: Vec<String>,
    pub skill_level: SkillLevel,
    pub max_capacity: i32,
    pub rating: Option<f64>,
    pub status: Option<DesignerStatus>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateDesignerRequest {
    pub specialties: Option<Vec<String>>,
    pub skill_level: Option<SkillLevel>,
    pub max_capacity: Option<i32>,
    pub rating: Option<f64>,
    pub status: Option<DesignerStatus>,
}

#[derive(Debug, Deserialize)]
pub struct SubmitPaymentRequest {
    pub amount: i64,
    #[serde(default)]
    pub proof_url: String,
}

fn check_capacity(max_capacity: i32) -> ApiResult<()> {
    if max_capacity < 0 {
        return Err(AppError::Validation(format!("max capacity must not be negative, got {}", max_capacity)));
    }
    Ok(())
}

/// POST /v1/designers
async fn register_designer(
    State(state): State<AppState>,
    Json(req): Json<RegisterDesignerRequest>,
) -> ApiResult<(StatusCode, Json<DesignerProfile>)> {
    check_capacity(req.max_capacity)?;
    let mut profile = DesignerProfile::new(req.user_id, req.specialties, req.skill_level, req.max_capacity);
    if let Some(rating) = req.rating {
        profile.rating = rating;
    }
    if let Some(status) = req.status {
        profile.status = status;
    }

    state.designers.insert_designer(&profile).await?;
    tracing::info!(designer_id = %profile.user_id, "Designer registered");
    Ok((StatusCode::CREATED, Json(profile)))
}

/// GET /v1/designers/{id}
async fn get_designer(State(state): State<AppState>, Path(user_id): Path<Uuid>) -> ApiResult<Json<DesignerProfile>> {
    let profile = state
        .designers
        .get_designer(user_id)
        .await?
        .ok_or_else(|| CoreError::NotFound(format!("designer {}", user_id)))?;
    Ok(Json(profile))
}

/// PATCH /v1/designers/{id}
async fn update_designer(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Json(req): Json<UpdateDesignerRequest>,
) -> ApiResult<Json<DesignerProfile>> {
    if let Some(max) = req.max_capacity {
        check_capacity(max)?;
    }
    let patch = DesignerPatch {
        specialties: req.specialties,
        skill_level: req.skill_level,
        max_capacity: req.max_capacity,
        rating: req.rating,
        status: req.status,
    };
    let profile = state
        .designers
        .update_designer(user_id, &patch)
        .await?
        .ok_or_else(|| CoreError::NotFound(format!("designer {}", user_id)))?;
    Ok(Json(profile))
}

/// GET /v1/designers/{id}/commission
async fn commission_statement(
    State(state): State<AppState>,
    Path(designer_id): Path<Uuid>,
) -> ApiResult<Json<CommissionStatement>> {
    Ok(Json(state.ledger.statement(designer_id).await?))
}

/// POST /v1/designers/{id}/commission-payments
async fn submit_commission_payment(
    State(state): State<AppState>,
    Path(designer_id): Path<Uuid>,
    Json(req): Json<SubmitPaymentRequest>,
) -> ApiResult<(StatusCode, Json<CommissionPayment>)> {
    let payment = state
        .ledger
        .submit_commission_payment(designer_id, req.amount, &req.proof_url)
        .await?;
    Ok((StatusCode::CREATED, Json(payment)))
}
