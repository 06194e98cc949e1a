use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, patch, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use atelier_core::{Complexity, CoreError, DesignerProfile, Order, OrderPatch, OrderStatus};
use atelier_matching::AssignmentResult;

use crate::error::{ApiResult, AppError};
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/orders", post(create_order))
        .route("/v1/orders/{id}", get(get_order))
        .route("/v1/orders/{id}/status", patch(update_order_status))
        .route("/v1/orders/{id}/eligible-designers", get(eligible_designers))
        .route("/v1/orders/{id}/shortlist", post(shortlist_order))
        .route("/v1/orders/{id}/assign", post(assign_order))
        .route("/v1/orders/{id}/decline", post(decline_order))
        .route("/v1/orders/{id}/complete", post(complete_order))
}

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct CreateOrderRequest {
    pub customer_id: Uuid,
    pub category: Option<String>,
    pub style: Option<String>,
    pub complexity: Option<Complexity>,
    pub urgency: Option<String>,
    pub template_id: Option<String>,
    pub template_name: Option<String>,
    pub price: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateOrderStatusRequest {
    pub status: OrderStatus,
}

#[derive(Debug, Deserialize)]
pub struct DesignerActionRequest {
    pub designer_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct ShortlistResponse {
    pub order_id: Uuid,
    pub shortlisted: bool,
}

#[derive(Debug, Serialize)]
pub struct AssignResponse {
    #[serde(flatten)]
    pub result: AssignmentResult,
    pub order: Order,
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /v1/orders
async fn create_order(
    State(state): State<AppState>,
    Json(req): Json<CreateOrderRequest>,
) -> ApiResult<(StatusCode, Json<Order>)> {
    let mut order = Order::new(req.customer_id);
    order.category = req.category;
    order.style = req.style;
    order.complexity = req.complexity;
    order.urgency = req.urgency;
    order.template_id = req.template_id;
    order.template_name = req.template_name;
    if let Some(price) = req.price {
        if price < 0 {
            return Err(AppError::Validation(format!("price must not be negative, got {}", price)));
        }
        order.set_price(price);
        order.total = price;
    }

    state.orders.insert_order(&order).await?;
    tracing::info!(order_id = %order.id, "Order created");
    Ok((StatusCode::CREATED, Json(order)))
}

/// GET /v1/orders/{id}
async fn get_order(State(state): State<AppState>, Path(order_id): Path<Uuid>) -> ApiResult<Json<Order>> {
    let order = state
        .orders
        .get_order(order_id)
        .await?
        .ok_or_else(|| CoreError::NotFound(format!("order {}", order_id)))?;
    Ok(Json(order))
}

/// PATCH /v1/orders/{id}/status
async fn update_order_status(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
    Json(req): Json<UpdateOrderStatusRequest>,
) -> ApiResult<Json<Order>> {
    let change = OrderPatch { status: Some(req.status), ..Default::default() };
    let order = state
        .orders
        .update_order(order_id, &change)
        .await?
        .ok_or_else(|| CoreError::NotFound(format!("order {}", order_id)))?;
    Ok(Json(order))
}

/// GET /v1/orders/{id}/eligible-designers
async fn eligible_designers(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
) -> ApiResult<Json<Vec<DesignerProfile>>> {
    Ok(Json(state.matching.eligible_designers_for(order_id).await?))
}

/// POST /v1/orders/{id}/shortlist
async fn shortlist_order(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
) -> ApiResult<Json<ShortlistResponse>> {
    let shortlisted = state.matching.shortlist_designers(order_id).await?;
    Ok(Json(ShortlistResponse { order_id, shortlisted }))
}

/// POST /v1/orders/{id}/assign
async fn assign_order(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
    Json(req): Json<DesignerActionRequest>,
) -> ApiResult<Json<AssignResponse>> {
    let outcome = state.matching.assign_order(order_id, req.designer_id).await;
    let result = AssignmentResult::from_outcome(&outcome);
    if !result.success {
        tracing::debug!(%order_id, designer_id = %req.designer_id, "Assignment rejected: {}", result.message);
    }
    let order = outcome?;
    Ok(Json(AssignResponse { result, order }))
}

/// POST /v1/orders/{id}/decline
async fn decline_order(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
    Json(req): Json<DesignerActionRequest>,
) -> ApiResult<Json<Order>> {
    Ok(Json(state.matching.decline_order(order_id, req.designer_id).await?))
}

/// POST /v1/orders/{id}/complete
async fn complete_order(State(state): State<AppState>, Path(order_id): Path<Uuid>) -> ApiResult<Json<Order>> {
    Ok(Json(state.matching.complete_assignment(order_id).await?))
}
