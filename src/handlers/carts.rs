use crate::{
    auth::SessionKey,
    errors::ServiceError,
    handlers::common::{no_content_response, success_response, validate_input},
    AppState,
};
use axum::{
    extract::{Path, State},
    response::IntoResponse,
    routing::{delete, get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

/// Session cart routes. Scoped by the session key header; no account needed
/// until checkout.
pub fn carts_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(get_cart))
        .route("/items", post(add_item))
        .route("/items/{product_id}", put(update_item))
        .route("/items/{product_id}", delete(remove_item))
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct AddItemRequest {
    pub product_id: i64,
    #[validate(range(min = 1))]
    pub quantity: i32,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdateItemRequest {
    /// Zero or less removes the line
    pub quantity: i32,
}

#[derive(Debug, Serialize)]
struct CartWriteResponse<T: Serialize> {
    cart: T,
    /// Informational notice, set when the quantity was clamped to stock
    notice: Option<String>,
}

/// Current cart contents with live prices
#[utoipa::path(
    get,
    path = "/api/v1/cart",
    responses(
        (status = 200, description = "Cart snapshot"),
        (status = 400, description = "Missing session header", body = crate::errors::ErrorResponse)
    ),
    tag = "Cart"
)]
pub async fn get_cart(
    State(state): State<AppState>,
    SessionKey(session_key): SessionKey,
) -> Result<impl IntoResponse, ServiceError> {
    let snapshot = state.services.cart.snapshot(&session_key).await?;
    Ok(success_response(snapshot))
}

/// Add a product to the cart; the stored quantity is clamped to stock
#[utoipa::path(
    post,
    path = "/api/v1/cart/items",
    request_body = AddItemRequest,
    responses(
        (status = 200, description = "Updated cart, with a notice when clamped"),
        (status = 404, description = "Unknown product", body = crate::errors::ErrorResponse),
        (status = 409, description = "Product out of stock", body = crate::errors::ErrorResponse)
    ),
    tag = "Cart"
)]
pub async fn add_item(
    State(state): State<AppState>,
    SessionKey(session_key): SessionKey,
    Json(payload): Json<AddItemRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    validate_input(&payload)?;

    let outcome = state
        .services
        .cart
        .add_item(&session_key, payload.product_id, payload.quantity)
        .await?;

    let notice = outcome.clamped.then(|| {
        format!(
            "Only {} units available for {}.",
            outcome.available_stock, outcome.product_name
        )
    });

    let snapshot = state.services.cart.snapshot(&session_key).await?;
    Ok(success_response(CartWriteResponse {
        cart: snapshot,
        notice,
    }))
}

/// Set a line's quantity (zero or less removes it)
#[utoipa::path(
    put,
    path = "/api/v1/cart/items/{product_id}",
    params(("product_id" = i64, Path, description = "Product id")),
    request_body = UpdateItemRequest,
    responses(
        (status = 200, description = "Updated cart"),
        (status = 409, description = "Product out of stock", body = crate::errors::ErrorResponse)
    ),
    tag = "Cart"
)]
pub async fn update_item(
    State(state): State<AppState>,
    SessionKey(session_key): SessionKey,
    Path(product_id): Path<i64>,
    Json(payload): Json<UpdateItemRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let outcome = state
        .services
        .cart
        .update_item(&session_key, product_id, payload.quantity)
        .await?;

    let notice = outcome.and_then(|o| {
        o.clamped.then(|| {
            format!(
                "Only {} units available for {}.",
                o.available_stock, o.product_name
            )
        })
    });

    let snapshot = state.services.cart.snapshot(&session_key).await?;
    Ok(success_response(CartWriteResponse {
        cart: snapshot,
        notice,
    }))
}

/// Remove a line from the cart
#[utoipa::path(
    delete,
    path = "/api/v1/cart/items/{product_id}",
    params(("product_id" = i64, Path, description = "Product id")),
    responses(
        (status = 204, description = "Line removed")
    ),
    tag = "Cart"
)]
pub async fn remove_item(
    State(state): State<AppState>,
    SessionKey(session_key): SessionKey,
    Path(product_id): Path<i64>,
) -> Result<impl IntoResponse, ServiceError> {
    state
        .services
        .cart
        .remove_item(&session_key, product_id)
        .await?;
    Ok(no_content_response())
}
