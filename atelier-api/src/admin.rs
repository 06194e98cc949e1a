use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use atelier_core::CommissionPayment;

use crate::error::ApiResult;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/admin/commission-payments/{id}/approve", post(approve_payment))
        .route("/v1/admin/commission-payments/{id}/decline", post(decline_payment))
        .route("/v1/admin/settings/delivery-fee", get(get_delivery_fee).put(set_delivery_fee))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DeliveryFee {
    pub fee: i64,
}

/// POST /v1/admin/commission-payments/{id}/approve
async fn approve_payment(
    State(state): State<AppState>,
    Path(payment_id): Path<Uuid>,
) -> ApiResult<Json<CommissionPayment>> {
    Ok(Json(state.ledger.approve_commission_payment(payment_id).await?))
}

/// POST /v1/admin/commission-payments/{id}/decline
async fn decline_payment(
    State(state): State<AppState>,
    Path(payment_id): Path<Uuid>,
) -> ApiResult<Json<CommissionPayment>> {
    Ok(Json(state.ledger.decline_commission_payment(payment_id).await?))
}

/// GET /v1/admin/settings/delivery-fee
async fn get_delivery_fee(State(state): State<AppState>) -> ApiResult<Json<DeliveryFee>> {
    Ok(Json(DeliveryFee { fee: state.ledger.delivery_fee().await? }))
}

/// PUT /v1/admin/settings/delivery-fee
async fn set_delivery_fee(
    State(state): State<AppState>,
    Json(req): Json<DeliveryFee>,
) -> ApiResult<Json<DeliveryFee>> {
    state.ledger.set_delivery_fee(req.fee).await?;
    Ok(Json(req))
}
