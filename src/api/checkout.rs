//! Checkout helpers used before an order exists

use axum::{extract::State, http::HeaderMap, response::IntoResponse, Json};
use tracing::info;

use super::{with_request_id, CheckoutState, Customer};
use crate::error::AppError;
use crate::middleware::error::success_response;
use crate::types::ApplyCouponRequest;

/// GET /api/checkout/addresses
pub async fn list_addresses(
    State(state): State<CheckoutState>,
    Customer(customer_id): Customer,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    let addresses = state
        .addresses
        .list_for_customer(customer_id)
        .await
        .map_err(AppError::from)
        .map_err(with_request_id(&headers))?;
    Ok(success_response(addresses))
}

/// POST /api/checkout/coupons/apply
///
/// A rejected coupon is a normal response (`eligible: false` with a reason),
/// not an error.
pub async fn apply_coupon(
    State(state): State<CheckoutState>,
    Customer(customer_id): Customer,
    headers: HeaderMap,
    Json(request): Json<ApplyCouponRequest>,
) -> Result<impl IntoResponse, AppError> {
    info!(customer_id = %customer_id, "coupon apply requested");
    let evaluation = state
        .coupons
        .apply(customer_id, &request.code)
        .await
        .map_err(with_request_id(&headers))?;
    Ok(success_response(evaluation))
}

/// POST /api/checkout/cod-eligibility
pub async fn cod_eligibility(
    State(state): State<CheckoutState>,
    Customer(customer_id): Customer,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    let eligibility = state
        .cod
        .check_for_customer(customer_id)
        .await
        .map_err(with_request_id(&headers))?;
    Ok(success_response(eligibility))
}
