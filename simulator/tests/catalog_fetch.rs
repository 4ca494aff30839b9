//! Catalog fetch against a local HTTP server.

#![allow(clippy::unwrap_used, clippy::expect_used)] // Test code

use axum::Json;
use axum::Router;
use axum::http::StatusCode;
use axum::routing::get;
use cartstream_core::catalog::{CatalogError, ProductId};
use cartstream_simulator::{CatalogFetchError, fetch_catalog};
use serde_json::{Value, json};
use std::net::SocketAddr;

async fn listing() -> Json<Value> {
    Json(json!([
        {
            "id": 1,
            "title": "Backpack",
            "price": 109.95,
            "description": "Fits 15 inch laptops",
            "category": "men's clothing",
            "image": "https://example.com/1.jpg",
            "rating": { "rate": 3.9, "count": 120 }
        },
        {
            "id": 2,
            "title": "T-Shirt",
            "price": 22.3,
            "description": "Slim fit",
            "category": "men's clothing",
            "image": "https://example.com/2.jpg",
            "rating": { "rate": 4.1, "count": 259 }
        }
    ]))
}

async fn empty() -> Json<Value> {
    Json(json!([]))
}

async fn broken() -> StatusCode {
    StatusCode::INTERNAL_SERVER_ERROR
}

async fn start_server() -> SocketAddr {
    let app = Router::new()
        .route("/products", get(listing))
        .route("/empty", get(empty))
        .route("/broken", get(broken));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, app).await });
    addr
}

#[tokio::test]
async fn fetches_products_ignoring_extra_fields() {
    let addr = start_server().await;

    let catalog = fetch_catalog(&reqwest::Client::new(), &format!("http://{addr}/products"))
        .await
        .expect("catalog");

    assert_eq!(catalog.len(), 2);
    let backpack = catalog.get(ProductId::new(1)).unwrap();
    assert_eq!(backpack.title, "Backpack");
    assert!((backpack.price - 109.95).abs() < f64::EPSILON);
    assert_eq!(backpack.image, "https://example.com/1.jpg");
}

#[tokio::test]
async fn empty_listing_is_rejected() {
    let addr = start_server().await;

    let err = fetch_catalog(&reqwest::Client::new(), &format!("http://{addr}/empty"))
        .await
        .unwrap_err();

    assert!(matches!(err, CatalogFetchError::Invalid(CatalogError::Empty)));
}

#[tokio::test]
async fn server_error_is_reported() {
    let addr = start_server().await;

    let err = fetch_catalog(&reqwest::Client::new(), &format!("http://{addr}/broken"))
        .await
        .unwrap_err();

    assert!(matches!(err, CatalogFetchError::Http(_)));
}
