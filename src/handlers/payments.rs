use crate::{
    auth::{session_key_from_headers, CustomerPrincipal},
    entities::order::OrderStatus,
    errors::ServiceError,
    handlers::common::success_response,
    AppState,
};
use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::json;
use tracing::warn;
use utoipa::IntoParams;

/// Header the gateway uses to carry the webhook body signature.
const SIGNATURE_HEADER: &str = "x-paystack-signature";

pub fn payments_routes() -> Router<AppState> {
    Router::new()
        .route("/verify", get(verify_payment))
        .route("/webhook", post(payment_webhook))
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct VerifyQuery {
    pub reference: String,
}

/// Verify path: the customer lands here after paying at the gateway.
///
/// Looks the order up by reference, scoped to the authenticated customer,
/// re-queries the gateway and applies the shared reconciliation decision. On
/// success the session's cart is cleared as a best-effort cleanup.
#[utoipa::path(
    get,
    path = "/api/v1/payments/verify",
    params(VerifyQuery),
    responses(
        (status = 200, description = "Payment verified; order completed"),
        (status = 402, description = "Payment declined or mismatched", body = crate::errors::ErrorResponse),
        (status = 404, description = "No such order for this customer", body = crate::errors::ErrorResponse),
        (status = 502, description = "Gateway unreachable", body = crate::errors::ErrorResponse)
    ),
    tag = "Payments"
)]
pub async fn verify_payment(
    State(state): State<AppState>,
    principal: CustomerPrincipal,
    headers: HeaderMap,
    Query(query): Query<VerifyQuery>,
) -> Result<impl IntoResponse, ServiceError> {
    let reference = query.reference.trim();
    if reference.is_empty() {
        return Err(ServiceError::ValidationError(
            "Missing payment reference".to_string(),
        ));
    }

    let outcome = state
        .services
        .reconciliation
        .reconcile_verify(principal.customer_id, reference)
        .await?;

    if outcome.status != OrderStatus::Completed {
        return Err(ServiceError::PaymentRejected(
            "Payment was not successful".to_string(),
        ));
    }

    // The webhook has no session; only this path can tidy up the cart.
    if let Some(session_key) = session_key_from_headers(&headers) {
        if let Err(err) = state.services.cart.clear(&session_key).await {
            warn!("post-payment cart cleanup failed: {}", err);
        }
    }

    Ok(success_response(json!({
        "order_id": outcome.order_id,
        "status": outcome.status,
        "message": "Payment verified",
    })))
}

/// Webhook path: gateway-initiated, authenticated by an HMAC-SHA512 body
/// signature instead of a user session. Touches no session state.
#[utoipa::path(
    post,
    path = "/api/v1/payments/webhook",
    request_body = String,
    responses(
        (status = 200, description = "Webhook processed or ignored"),
        (status = 400, description = "Missing/invalid signature or malformed payload", body = crate::errors::ErrorResponse),
        (status = 402, description = "Payment mismatched; order failed", body = crate::errors::ErrorResponse),
        (status = 404, description = "Unknown payment reference", body = crate::errors::ErrorResponse)
    ),
    tag = "Payments"
)]
pub async fn payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ServiceError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok());

    state
        .services
        .reconciliation
        .reconcile_webhook(signature, &body)
        .await?;

    Ok(StatusCode::OK)
}
