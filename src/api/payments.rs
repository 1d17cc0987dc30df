use axum::{extract::State, http::HeaderMap, response::IntoResponse, Json};
use tracing::info;

use super::{with_request_id, CheckoutState, Customer};
use crate::error::AppError;
use crate::middleware::error::success_response;
use crate::types::VerifyPaymentRequest;

/// POST /api/payments/verify
///
/// Verifies the gateway's signed payload and confirms the order. Safe to
/// repeat with the same payload.
pub async fn verify_payment(
    State(state): State<CheckoutState>,
    Customer(customer_id): Customer,
    headers: HeaderMap,
    Json(request): Json<VerifyPaymentRequest>,
) -> Result<impl IntoResponse, AppError> {
    info!(
        customer_id = %customer_id,
        order_number = %request.order_number,
        payment_id = %request.payload.payment_id,
        "payment verification requested"
    );

    let confirmation = state
        .verification
        .verify_and_confirm(customer_id, request)
        .await
        .map_err(with_request_id(&headers))?;
    Ok(success_response(confirmation))
}
