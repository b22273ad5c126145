use crate::{
    auth::{CustomerPrincipal, SessionKey},
    entities::order::{DeliveryMethod, PaymentMethod},
    errors::ServiceError,
    handlers::common::{created_response, success_response},
    services::orders::CheckoutInput,
    AppState,
};
use axum::{
    extract::{Path, State},
    response::IntoResponse,
    routing::post,
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use utoipa::ToSchema;

pub fn checkout_routes() -> Router<AppState> {
    Router::new().route("/", post(submit_checkout))
}

pub fn order_payment_routes() -> Router<AppState> {
    Router::new().route("/{id}/pay", post(retry_payment))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CheckoutRequest {
    pub full_name: Option<String>,
    pub phone: Option<String>,
    pub delivery_method: DeliveryMethod,
    pub payment_method: PaymentMethod,
    pub delivery_address: Option<String>,
}

/// Submit checkout: builds the order from the session cart.
///
/// For gateway payments the response carries `authorization_url`; for
/// pay-on-delivery the order goes straight to awaiting payment. A gateway
/// outage after the order is committed surfaces as 502 — the order stays
/// pending and payment can be retried via `POST /orders/{id}/pay`.
#[utoipa::path(
    post,
    path = "/api/v1/checkout",
    request_body = CheckoutRequest,
    responses(
        (status = 201, description = "Order placed"),
        (status = 400, description = "Empty cart or invalid form", body = crate::errors::ErrorResponse),
        (status = 409, description = "Stock changed; cart clamped", body = crate::errors::ErrorResponse),
        (status = 502, description = "Gateway unreachable", body = crate::errors::ErrorResponse)
    ),
    tag = "Checkout"
)]
pub async fn submit_checkout(
    State(state): State<AppState>,
    principal: CustomerPrincipal,
    SessionKey(session_key): SessionKey,
    Json(payload): Json<CheckoutRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    state
        .services
        .cart
        .attach_customer(&session_key, principal.customer_id)
        .await?;

    let input = CheckoutInput {
        full_name: payload.full_name,
        phone: payload.phone,
        delivery_method: payload.delivery_method,
        payment_method: payload.payment_method,
        delivery_address: payload.delivery_address,
    };

    let placed = state
        .services
        .orders
        .place_order(principal.customer_id, &session_key, input)
        .await?;

    Ok(created_response(placed))
}

/// Re-initiate the hosted payment session for a pending gateway order
#[utoipa::path(
    post,
    path = "/api/v1/orders/{id}/pay",
    params(("id" = i64, Path, description = "Order id")),
    responses(
        (status = 200, description = "New authorization URL"),
        (status = 400, description = "Order is not awaiting gateway payment", body = crate::errors::ErrorResponse),
        (status = 404, description = "Unknown order", body = crate::errors::ErrorResponse),
        (status = 502, description = "Gateway unreachable", body = crate::errors::ErrorResponse)
    ),
    tag = "Checkout"
)]
pub async fn retry_payment(
    State(state): State<AppState>,
    principal: CustomerPrincipal,
    Path(order_id): Path<i64>,
) -> Result<impl IntoResponse, ServiceError> {
    let authorization_url = state
        .services
        .orders
        .retry_payment(principal.customer_id, order_id)
        .await?;

    Ok(success_response(json!({
        "order_id": order_id,
        "authorization_url": authorization_url,
    })))
}
