use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Farmgate API",
        description = "Storefront and order management backend for a farm-produce business"
    ),
    paths(
        crate::handlers::products::list_products,
        crate::handlers::products::get_product,
        crate::handlers::carts::get_cart,
        crate::handlers::carts::add_item,
        crate::handlers::carts::update_item,
        crate::handlers::carts::remove_item,
        crate::handlers::checkout::submit_checkout,
        crate::handlers::checkout::retry_payment,
        crate::handlers::payments::verify_payment,
        crate::handlers::payments::payment_webhook,
        crate::handlers::orders::order_history,
        crate::handlers::admin::dashboard,
        crate::handlers::admin::list_products,
        crate::handlers::admin::create_product,
        crate::handlers::admin::update_product,
        crate::handlers::admin::archive_product,
        crate::handlers::admin::list_orders,
        crate::handlers::admin::get_order,
        crate::handlers::admin::update_order_status,
        crate::handlers::admin::list_customers,
        crate::handlers::admin::customer_detail,
    ),
    components(schemas(
        crate::errors::ErrorResponse,
        crate::handlers::carts::AddItemRequest,
        crate::handlers::carts::UpdateItemRequest,
        crate::handlers::checkout::CheckoutRequest,
        crate::handlers::admin::CreateProductRequest,
        crate::handlers::admin::UpdateProductRequest,
        crate::handlers::admin::UpdateOrderStatusRequest,
        crate::entities::product::ProductCategory,
        crate::entities::order::OrderStatus,
        crate::entities::order::DeliveryMethod,
        crate::entities::order::PaymentMethod,
    )),
    tags(
        (name = "Products", description = "Storefront catalog"),
        (name = "Cart", description = "Session shopping cart"),
        (name = "Checkout", description = "Order placement and payment initiation"),
        (name = "Payments", description = "Payment reconciliation entry points"),
        (name = "Orders", description = "Customer order history"),
        (name = "Admin", description = "Staff management surface")
    )
)]
pub struct ApiDoc;

/// Swagger UI mounted at `/docs`, serving the generated document from
/// `/api-docs/openapi.json`.
pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi())
}
