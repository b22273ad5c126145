//! Integration tests for the session cart: clamp-to-stock semantics,
//! live-price totals, and line management.

mod common;

use axum::http::Method;
use common::{decimal, response_json, TestApp};
use farmgate_api::entities::product::ProductCategory;
use rust_decimal_macros::dec;
use serde_json::json;

const SESSION: &str = "sess-cart-tests";

#[tokio::test]
async fn add_item_prices_cart_from_catalog() {
    let app = TestApp::new().await;
    let eggs = app
        .seed_product("Crate of Eggs", ProductCategory::Poultry, dec!(500.00), 10)
        .await;

    let response = app
        .request(
            Method::POST,
            "/api/v1/cart/items",
            None,
            Some(SESSION),
            Some(json!({ "product_id": eggs.id, "quantity": 2 })),
        )
        .await;
    assert_eq!(response.status(), 200);

    let body = response_json(response).await;
    assert!(body["notice"].is_null());
    assert_eq!(body["cart"]["lines"][0]["quantity"], 2);
    assert_eq!(decimal(&body["cart"]["lines"][0]["line_total"]), dec!(1000.00));
    assert_eq!(decimal(&body["cart"]["total"]), dec!(1000.00));
}

#[tokio::test]
async fn add_beyond_stock_clamps_with_notice() {
    let app = TestApp::new().await;
    let fish = app
        .seed_product("Catfish", ProductCategory::Fish, dec!(1200.00), 3)
        .await;

    let response = app
        .request(
            Method::POST,
            "/api/v1/cart/items",
            None,
            Some(SESSION),
            Some(json!({ "product_id": fish.id, "quantity": 10 })),
        )
        .await;
    assert_eq!(response.status(), 200);

    let body = response_json(response).await;
    assert_eq!(
        body["notice"],
        json!("Only 3 units available for Catfish.")
    );
    assert_eq!(body["cart"]["lines"][0]["quantity"], 3);
}

#[tokio::test]
async fn adding_accumulates_and_clamps_at_stock() {
    let app = TestApp::new().await;
    let beef = app
        .seed_product("Beef Cut", ProductCategory::Cattle, dec!(3000.00), 5)
        .await;

    for _ in 0..3 {
        app.request(
            Method::POST,
            "/api/v1/cart/items",
            None,
            Some(SESSION),
            Some(json!({ "product_id": beef.id, "quantity": 2 })),
        )
        .await;
    }

    let response = app
        .request(Method::GET, "/api/v1/cart", None, Some(SESSION), None)
        .await;
    let body = response_json(response).await;
    assert_eq!(body["lines"][0]["quantity"], 5);
    assert_eq!(decimal(&body["total"]), dec!(15000.00));
}

#[tokio::test]
async fn out_of_stock_add_is_refused() {
    let app = TestApp::new().await;
    let sold_out = app
        .seed_product("Turkey", ProductCategory::Poultry, dec!(9000.00), 0)
        .await;

    let response = app
        .request(
            Method::POST,
            "/api/v1/cart/items",
            None,
            Some(SESSION),
            Some(json!({ "product_id": sold_out.id, "quantity": 1 })),
        )
        .await;
    assert_eq!(response.status(), 409);

    let cart = response_json(
        app.request(Method::GET, "/api/v1/cart", None, Some(SESSION), None)
            .await,
    )
    .await;
    assert_eq!(cart["lines"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn update_to_zero_removes_line() {
    let app = TestApp::new().await;
    let eggs = app
        .seed_product("Crate of Eggs", ProductCategory::Poultry, dec!(500.00), 10)
        .await;

    app.request(
        Method::POST,
        "/api/v1/cart/items",
        None,
        Some(SESSION),
        Some(json!({ "product_id": eggs.id, "quantity": 2 })),
    )
    .await;

    let response = app
        .request(
            Method::PUT,
            &format!("/api/v1/cart/items/{}", eggs.id),
            None,
            Some(SESSION),
            Some(json!({ "quantity": 0 })),
        )
        .await;
    assert_eq!(response.status(), 200);

    let body = response_json(response).await;
    assert_eq!(body["cart"]["lines"].as_array().unwrap().len(), 0);
    assert_eq!(decimal(&body["cart"]["total"]), dec!(0));
}

#[tokio::test]
async fn update_clamps_to_stock() {
    let app = TestApp::new().await;
    let fish = app
        .seed_product("Tilapia", ProductCategory::Fish, dec!(800.00), 4)
        .await;

    app.request(
        Method::POST,
        "/api/v1/cart/items",
        None,
        Some(SESSION),
        Some(json!({ "product_id": fish.id, "quantity": 1 })),
    )
    .await;

    let response = app
        .request(
            Method::PUT,
            &format!("/api/v1/cart/items/{}", fish.id),
            None,
            Some(SESSION),
            Some(json!({ "quantity": 9 })),
        )
        .await;
    let body = response_json(response).await;
    assert_eq!(body["cart"]["lines"][0]["quantity"], 4);
    assert_eq!(body["notice"], json!("Only 4 units available for Tilapia."));
}

#[tokio::test]
async fn remove_deletes_line() {
    let app = TestApp::new().await;
    let eggs = app
        .seed_product("Crate of Eggs", ProductCategory::Poultry, dec!(500.00), 10)
        .await;

    app.request(
        Method::POST,
        "/api/v1/cart/items",
        None,
        Some(SESSION),
        Some(json!({ "product_id": eggs.id, "quantity": 2 })),
    )
    .await;

    let response = app
        .request(
            Method::DELETE,
            &format!("/api/v1/cart/items/{}", eggs.id),
            None,
            Some(SESSION),
            None,
        )
        .await;
    assert_eq!(response.status(), 204);

    let cart = response_json(
        app.request(Method::GET, "/api/v1/cart", None, Some(SESSION), None)
            .await,
    )
    .await;
    assert_eq!(cart["lines"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn totals_follow_live_catalog_prices() {
    let app = TestApp::new().await;
    let staff = app.seed_staff("boss@farmgate.example").await;
    let eggs = app
        .seed_product("Crate of Eggs", ProductCategory::Poultry, dec!(500.00), 10)
        .await;

    app.request(
        Method::POST,
        "/api/v1/cart/items",
        None,
        Some(SESSION),
        Some(json!({ "product_id": eggs.id, "quantity": 2 })),
    )
    .await;

    // Price change between cart write and cart read
    let token = app.staff_token(staff.id);
    let response = app
        .request(
            Method::PUT,
            &format!("/api/v1/admin/products/{}", eggs.id),
            Some(&token),
            None,
            Some(json!({ "price": "600.00" })),
        )
        .await;
    assert_eq!(response.status(), 200);

    let cart = response_json(
        app.request(Method::GET, "/api/v1/cart", None, Some(SESSION), None)
            .await,
    )
    .await;
    assert_eq!(decimal(&cart["total"]), dec!(1200.00));
}

#[tokio::test]
async fn carts_are_isolated_per_session() {
    let app = TestApp::new().await;
    let eggs = app
        .seed_product("Crate of Eggs", ProductCategory::Poultry, dec!(500.00), 10)
        .await;

    app.request(
        Method::POST,
        "/api/v1/cart/items",
        None,
        Some("sess-a"),
        Some(json!({ "product_id": eggs.id, "quantity": 2 })),
    )
    .await;

    let other = response_json(
        app.request(Method::GET, "/api/v1/cart", None, Some("sess-b"), None)
            .await,
    )
    .await;
    assert_eq!(other["lines"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn missing_session_header_is_rejected() {
    let app = TestApp::new().await;
    let response = app
        .request(Method::GET, "/api/v1/cart", None, None, None)
        .await;
    assert_eq!(response.status(), 400);
}

#[tokio::test]
async fn archived_product_cannot_be_added() {
    let app = TestApp::new().await;
    let staff = app.seed_staff("boss@farmgate.example").await;
    let eggs = app
        .seed_product("Crate of Eggs", ProductCategory::Poultry, dec!(500.00), 10)
        .await;

    let token = app.staff_token(staff.id);
    app.request(
        Method::DELETE,
        &format!("/api/v1/admin/products/{}", eggs.id),
        Some(&token),
        None,
        None,
    )
    .await;

    let response = app
        .request(
            Method::POST,
            "/api/v1/cart/items",
            None,
            Some(SESSION),
            Some(json!({ "product_id": eggs.id, "quantity": 1 })),
        )
        .await;
    assert_eq!(response.status(), 404);

    // Gone from the storefront, too.
    let listing = response_json(
        app.request(Method::GET, "/api/v1/products", None, None, None)
            .await,
    )
    .await;
    assert_eq!(listing.as_array().unwrap().len(), 0);
}
