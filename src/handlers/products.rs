use crate::{
    entities::product::ProductCategory,
    errors::ServiceError,
    handlers::common::success_response,
    AppState,
};
use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    routing::get,
    Router,
};
use serde::Deserialize;
use utoipa::IntoParams;

/// Storefront catalog routes
pub fn products_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_products))
        .route("/{id}", get(get_product))
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct ProductListQuery {
    pub category: Option<ProductCategory>,
}

/// List live products, optionally filtered by category
#[utoipa::path(
    get,
    path = "/api/v1/products",
    params(ProductListQuery),
    responses(
        (status = 200, description = "Product list")
    ),
    tag = "Products"
)]
pub async fn list_products(
    State(state): State<AppState>,
    Query(query): Query<ProductListQuery>,
) -> Result<impl IntoResponse, ServiceError> {
    let products = state.services.catalog.list_products(query.category).await?;
    Ok(success_response(products))
}

/// Fetch a single live product
#[utoipa::path(
    get,
    path = "/api/v1/products/{id}",
    params(("id" = i64, Path, description = "Product id")),
    responses(
        (status = 200, description = "Product"),
        (status = 404, description = "Unknown or archived product", body = crate::errors::ErrorResponse)
    ),
    tag = "Products"
)]
pub async fn get_product(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ServiceError> {
    let product = state.services.catalog.get_active_product(id).await?;
    Ok(success_response(product))
}
