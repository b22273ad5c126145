use crate::{
    auth::StaffPrincipal,
    entities::{
        order::OrderStatus,
        product::ProductCategory,
    },
    errors::ServiceError,
    handlers::common::{
        created_response, success_response, PaginatedResponse, PaginationParams,
    },
    services::catalog::{CreateProductInput, UpdateProductInput},
    AppState,
};
use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    routing::{delete, get, post, put},
    Json, Router,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;
use utoipa::{IntoParams, ToSchema};

/// Staff-only management surface: products, orders, customers.
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/dashboard", get(dashboard))
        .route("/products", get(list_products))
        .route("/products", post(create_product))
        .route("/products/{id}", put(update_product))
        .route("/products/{id}", delete(archive_product))
        .route("/orders", get(list_orders))
        .route("/orders/{id}", get(get_order))
        .route("/orders/{id}/status", put(update_order_status))
        .route("/customers", get(list_customers))
        .route("/customers/{id}", get(customer_detail))
}

/// Store overview: order counts and the most recent orders
#[utoipa::path(
    get,
    path = "/api/v1/admin/dashboard",
    responses((status = 200, description = "Dashboard stats")),
    tag = "Admin"
)]
pub async fn dashboard(
    State(state): State<AppState>,
    _staff: StaffPrincipal,
) -> Result<impl IntoResponse, ServiceError> {
    let total_products = state.services.catalog.count_products().await?;
    let total_orders = state.services.orders.count_orders().await?;
    let pending_orders = state
        .services
        .orders
        .count_orders_with_status(OrderStatus::Pending)
        .await?;
    let completed_orders = state
        .services
        .orders
        .count_orders_with_status(OrderStatus::Completed)
        .await?;
    let (recent_orders, _) = state.services.orders.list_orders(1, 5).await?;

    Ok(success_response(json!({
        "total_products": total_products,
        "total_orders": total_orders,
        "pending_orders": pending_orders,
        "completed_orders": completed_orders,
        "recent_orders": recent_orders,
    })))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateProductRequest {
    pub name: String,
    pub category: ProductCategory,
    pub price: Decimal,
    pub stock: i32,
    pub description: Option<String>,
    pub image_url: Option<String>,
}

#[derive(Debug, Deserialize, Default, ToSchema)]
pub struct UpdateProductRequest {
    pub name: Option<String>,
    pub category: Option<ProductCategory>,
    pub price: Option<Decimal>,
    pub stock: Option<i32>,
    pub description: Option<String>,
    pub image_url: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateOrderStatusRequest {
    pub status: OrderStatus,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct CustomerListQuery {
    /// Search term matched against email and name
    pub q: Option<String>,
    #[serde(default)]
    pub page: Option<u64>,
    #[serde(default)]
    pub per_page: Option<u64>,
}

/// Every product, archived included
#[utoipa::path(
    get,
    path = "/api/v1/admin/products",
    responses((status = 200, description = "All products")),
    tag = "Admin"
)]
pub async fn list_products(
    State(state): State<AppState>,
    _staff: StaffPrincipal,
) -> Result<impl IntoResponse, ServiceError> {
    let products = state.services.catalog.list_all_products().await?;
    Ok(success_response(products))
}

#[utoipa::path(
    post,
    path = "/api/v1/admin/products",
    request_body = CreateProductRequest,
    responses(
        (status = 201, description = "Product created"),
        (status = 400, description = "Invalid input", body = crate::errors::ErrorResponse)
    ),
    tag = "Admin"
)]
pub async fn create_product(
    State(state): State<AppState>,
    _staff: StaffPrincipal,
    Json(payload): Json<CreateProductRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let product = state
        .services
        .catalog
        .create_product(CreateProductInput {
            name: payload.name,
            category: payload.category,
            price: payload.price,
            stock: payload.stock,
            description: payload.description,
            image_url: payload.image_url,
        })
        .await?;
    Ok(created_response(product))
}

#[utoipa::path(
    put,
    path = "/api/v1/admin/products/{id}",
    params(("id" = i64, Path, description = "Product id")),
    request_body = UpdateProductRequest,
    responses(
        (status = 200, description = "Product updated"),
        (status = 404, description = "Unknown product", body = crate::errors::ErrorResponse)
    ),
    tag = "Admin"
)]
pub async fn update_product(
    State(state): State<AppState>,
    _staff: StaffPrincipal,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateProductRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let product = state
        .services
        .catalog
        .update_product(
            id,
            UpdateProductInput {
                name: payload.name,
                category: payload.category,
                price: payload.price,
                stock: payload.stock,
                description: payload.description,
                image_url: payload.image_url,
            },
        )
        .await?;
    Ok(success_response(product))
}

/// Archive a product. Historical orders keep their snapshots; the product
/// stops being sellable.
#[utoipa::path(
    delete,
    path = "/api/v1/admin/products/{id}",
    params(("id" = i64, Path, description = "Product id")),
    responses(
        (status = 200, description = "Product archived"),
        (status = 404, description = "Unknown product", body = crate::errors::ErrorResponse)
    ),
    tag = "Admin"
)]
pub async fn archive_product(
    State(state): State<AppState>,
    _staff: StaffPrincipal,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ServiceError> {
    let product = state.services.catalog.archive_product(id).await?;
    Ok(success_response(product))
}

/// All orders, newest first
#[utoipa::path(
    get,
    path = "/api/v1/admin/orders",
    params(PaginationParams),
    responses((status = 200, description = "Orders")),
    tag = "Admin"
)]
pub async fn list_orders(
    State(state): State<AppState>,
    _staff: StaffPrincipal,
    Query(pagination): Query<PaginationParams>,
) -> Result<impl IntoResponse, ServiceError> {
    let (orders, total) = state
        .services
        .orders
        .list_orders(pagination.page, pagination.per_page)
        .await?;
    Ok(success_response(PaginatedResponse::new(
        orders,
        pagination.page,
        pagination.per_page,
        total,
    )))
}

#[utoipa::path(
    get,
    path = "/api/v1/admin/orders/{id}",
    params(("id" = i64, Path, description = "Order id")),
    responses(
        (status = 200, description = "Order with items"),
        (status = 404, description = "Unknown order", body = crate::errors::ErrorResponse)
    ),
    tag = "Admin"
)]
pub async fn get_order(
    State(state): State<AppState>,
    _staff: StaffPrincipal,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ServiceError> {
    let order = state.services.orders.get_order(id).await?;
    Ok(success_response(order))
}

/// Manual status transition. Marking an order completed runs the idempotent
/// stock deduction, exactly like the reconciliation paths.
#[utoipa::path(
    put,
    path = "/api/v1/admin/orders/{id}/status",
    params(("id" = i64, Path, description = "Order id")),
    request_body = UpdateOrderStatusRequest,
    responses(
        (status = 200, description = "Order updated"),
        (status = 400, description = "Disallowed transition", body = crate::errors::ErrorResponse),
        (status = 404, description = "Unknown order", body = crate::errors::ErrorResponse)
    ),
    tag = "Admin"
)]
pub async fn update_order_status(
    State(state): State<AppState>,
    _staff: StaffPrincipal,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateOrderStatusRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let order = state.services.orders.set_status(id, payload.status).await?;
    Ok(success_response(order))
}

/// Customer directory with optional search
#[utoipa::path(
    get,
    path = "/api/v1/admin/customers",
    params(CustomerListQuery),
    responses((status = 200, description = "Customers")),
    tag = "Admin"
)]
pub async fn list_customers(
    State(state): State<AppState>,
    _staff: StaffPrincipal,
    Query(query): Query<CustomerListQuery>,
) -> Result<impl IntoResponse, ServiceError> {
    let page = query.page.unwrap_or(1);
    let per_page = query.per_page.unwrap_or(10);
    let (customers, total) = state
        .services
        .customers
        .list_customers(query.q.as_deref(), page, per_page)
        .await?;
    Ok(success_response(PaginatedResponse::new(
        customers, page, per_page, total,
    )))
}

#[utoipa::path(
    get,
    path = "/api/v1/admin/customers/{id}",
    params(("id" = i64, Path, description = "Customer id")),
    responses(
        (status = 200, description = "Customer with order stats"),
        (status = 404, description = "Unknown customer", body = crate::errors::ErrorResponse)
    ),
    tag = "Admin"
)]
pub async fn customer_detail(
    State(state): State<AppState>,
    _staff: StaffPrincipal,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ServiceError> {
    let detail = state.services.customers.customer_detail(id).await?;
    Ok(success_response(detail))
}
