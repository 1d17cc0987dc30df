use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use tracing::info;

use super::{with_request_id, CheckoutState, Customer};
use crate::error::AppError;
use crate::middleware::error::success_response;
use crate::types::{CreateOrderRequest, OrderCreationResult};

/// POST /api/orders
pub async fn create_order(
    State(state): State<CheckoutState>,
    Customer(customer_id): Customer,
    headers: HeaderMap,
    Json(request): Json<CreateOrderRequest>,
) -> Result<impl IntoResponse, AppError> {
    info!(
        customer_id = %customer_id,
        payment_method = %request.payment_method,
        "order submission received"
    );

    let result = state
        .intake
        .create(customer_id, request)
        .await
        .map_err(with_request_id(&headers))?;

    let status = match &result {
        OrderCreationResult::AwaitingPayment { reused: true, .. } => StatusCode::OK,
        _ => StatusCode::CREATED,
    };
    Ok((status, success_response(result)))
}

/// GET /api/orders/{order_number}
pub async fn get_order(
    State(state): State<CheckoutState>,
    Customer(customer_id): Customer,
    Path(order_number): Path<String>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    let order = state
        .intake
        .find_for_customer(customer_id, &order_number)
        .await
        .map_err(with_request_id(&headers))?;
    Ok(success_response(order))
}
