use crate::{
    auth::CustomerPrincipal, errors::ServiceError, handlers::common::success_response, AppState,
};
use axum::{extract::State, response::IntoResponse, routing::get, Router};

pub fn orders_routes() -> Router<AppState> {
    Router::new().route("/", get(order_history))
}

/// The authenticated customer's orders, newest first, with line items
#[utoipa::path(
    get,
    path = "/api/v1/orders",
    responses(
        (status = 200, description = "Order history"),
        (status = 401, description = "Missing or invalid token", body = crate::errors::ErrorResponse)
    ),
    tag = "Orders"
)]
pub async fn order_history(
    State(state): State<AppState>,
    principal: CustomerPrincipal,
) -> Result<impl IntoResponse, ServiceError> {
    let orders = state
        .services
        .orders
        .history(principal.customer_id)
        .await?;
    Ok(success_response(orders))
}
