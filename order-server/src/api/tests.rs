use super::*;
use crate::auth::create_token;
use crate::catalog::{CatalogClient, CatalogError, ProductInfo};
use crate::chain::{ChainRequest, NotifyError, SettlementNotifier};
use crate::config::Config;
use crate::db::MemoryOrderStore;
use crate::orders::OrderCoordinator;
use crate::pictures::{PictureUploader, UploadError};
use async_trait::async_trait;
use axum::body::Body;
use http::{Request, StatusCode};
use http_body_util::BodyExt;
use parking_lot::Mutex;
use serde_json::{Value, json};
use shared::order::ProductType;
use std::sync::Arc;
use tower::ServiceExt;

const SECRET: &str = "test-jwt-secret";
const CHAIN_SECRET: &str = "chain-key";

#[derive(Default)]
struct RecordingNotifier {
    requests: Mutex<Vec<ChainRequest>>,
}

#[async_trait]
impl SettlementNotifier for RecordingNotifier {
    async fn notify(&self, request: ChainRequest) -> Result<(), NotifyError> {
        self.requests.lock().push(request);
        Ok(())
    }
}

/// Every product is a digital work owned by alice
struct AliceCatalog;

#[async_trait]
impl CatalogClient for AliceCatalog {
    async fn get_product(&self, _product_id: i64) -> Result<ProductInfo, CatalogError> {
        Ok(ProductInfo {
            owner: "alice".to_string(),
            product_type: ProductType::Digit,
        })
    }

    async fn transfer_ownership(
        &self,
        _product_id: i64,
        _new_owner: &str,
        _final_price: f64,
    ) -> Result<(), CatalogError> {
        Ok(())
    }
}

struct NoPictures;

#[async_trait]
impl PictureUploader for NoPictures {
    async fn upload(&self, _image_base64: &str) -> Result<String, UploadError> {
        Ok(String::new())
    }
}

struct TestApp {
    router: Router,
    notifier: Arc<RecordingNotifier>,
}

fn create_test_app(chain_secret: Option<&str>) -> TestApp {
    let mut vars = vec![
        ("STORE_BACKEND", "memory"),
        ("JWT_SECRET", SECRET),
    ];
    if let Some(secret) = chain_secret {
        vars.push(("CHAIN_CALLBACK_SECRET", secret));
    }
    let config = Config::from_lookup(|name| {
        vars.iter()
            .find(|(k, _)| *k == name)
            .map(|(_, v)| v.to_string())
    })
    .unwrap();

    let notifier = Arc::new(RecordingNotifier::default());
    let coordinator = OrderCoordinator::new(
        Arc::new(MemoryOrderStore::new()),
        notifier.clone(),
        Arc::new(AliceCatalog),
        Arc::new(NoPictures),
        config.max_duration_secs,
    );
    let state = AppState::from_parts(Arc::new(coordinator), &config);
    TestApp {
        router: create_router(state),
        notifier,
    }
}

fn user_request(method: &str, uri: &str, user: &str, body: Option<Value>) -> Request<Body> {
    let token = create_token(user, SECRET).unwrap();
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("authorization", format!("Bearer {token}"));
    match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

fn chain_request(uri: &str, secret: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(secret) = secret {
        builder = builder.header("x-chain-secret", secret);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

async fn send(app: &TestApp, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, body)
}

async fn sell_digit(app: &TestApp, product_id: i64, chain_id: &str) -> String {
    let (status, body) = send(
        app,
        user_request(
            "POST",
            "/api/orders",
            "alice",
            Some(json!({
                "product_id": product_id,
                "price_type": "FIX",
                "price": 10.0,
                "duration_seconds": 30,
                "chain_id": chain_id,
            })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "sell failed: {body}");
    body["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_health_needs_no_auth() {
    let app = create_test_app(None);
    let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["service"], "order-server");
}

#[tokio::test]
async fn test_orders_require_bearer_token() {
    let app = create_test_app(None);

    let request = Request::builder()
        .uri("/api/orders/transactions")
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let forged = create_token("alice", "someone-elses-secret").unwrap();
    let request = Request::builder()
        .uri("/api/orders/transactions")
        .header("authorization", format!("Bearer {forged}"))
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_fixed_price_sale_over_http() {
    let app = create_test_app(None);
    let order_id = sell_digit(&app, 1, "chain-1").await;

    let (status, body) = send(
        &app,
        user_request(
            "POST",
            &format!("/api/orders/{order_id}/buy"),
            "bob",
            Some(json!({})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["status"], "IN_FIX");
    assert_eq!(body["buyer"], "bob");
    assert!(
        app.notifier
            .requests
            .lock()
            .iter()
            .any(|r| matches!(r, ChainRequest::ConfirmOrder { chain_id } if chain_id == "chain-1"))
    );

    let (status, body) = send(
        &app,
        chain_request(
            "/api/chain/chainconfirm/chain-1",
            None,
            json!({"result": "success"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["status"], "COMPLETED");
    assert_eq!(body["already_closed"], false);

    let (status, body) = send(
        &app,
        user_request("GET", &format!("/api/orders/{order_id}"), "bob", None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["closed"], true);
    assert_eq!(body["order"]["status"], "COMPLETED");

    let (status, body) = send(&app, user_request("GET", "/api/orders/bought", "bob", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["live"].as_array().unwrap().len(), 0);
    assert_eq!(body["closed"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_state_mismatch_maps_to_conflict() {
    let app = create_test_app(None);
    let order_id = sell_digit(&app, 1, "chain-1").await;

    let (status, body) = send(
        &app,
        user_request(
            "POST",
            &format!("/api/orders/{order_id}/ship"),
            "alice",
            Some(json!({"company": "SF Express", "number": "SF100"})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["details"]["observed_status"], "NONE");
    assert!(body["code"].as_u64().is_some());
}

#[tokio::test]
async fn test_command_on_closed_order_reports_already_closed() {
    let app = create_test_app(None);
    let order_id = sell_digit(&app, 1, "chain-1").await;
    send(
        &app,
        user_request("POST", &format!("/api/orders/{order_id}/buy"), "bob", Some(json!({}))),
    )
    .await;
    send(
        &app,
        chain_request("/api/chain/chainconfirm/chain-1", None, json!({"result": "success"})),
    )
    .await;

    let (status, body) = send(
        &app,
        user_request("POST", &format!("/api/orders/{order_id}/confirm"), "bob", Some(json!({}))),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], 4003);
    assert_eq!(body["details"]["observed_status"], "COMPLETED");
}

#[tokio::test]
async fn test_unknown_order_is_not_found() {
    let app = create_test_app(None);
    let (status, _) = send(
        &app,
        user_request("GET", "/api/orders/does-not-exist", "alice", None),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(
        &app,
        user_request("GET", "/api/orders/product/42", "alice", None),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_chain_routes_check_secret_when_configured() {
    let app = create_test_app(Some(CHAIN_SECRET));
    sell_digit(&app, 1, "chain-1").await;

    let body = json!({"result": "success"});
    let (status, _) = send(
        &app,
        chain_request("/api/chain/chainconfirm/chain-1", None, body.clone()),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(
        &app,
        chain_request("/api/chain/chainconfirm/chain-1", Some("wrong"), body.clone()),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // authorised, but the order has no buyer yet
    let (status, body) = send(
        &app,
        chain_request("/api/chain/chainconfirm/chain-1", Some(CHAIN_SECRET), body),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["details"]["observed_status"], "NONE");
}

#[tokio::test]
async fn test_replay_resends_pending_confirm() {
    let app = create_test_app(None);
    let order_id = sell_digit(&app, 1, "chain-1").await;
    send(
        &app,
        user_request(
            "POST",
            &format!("/api/orders/{order_id}/buy"),
            "bob",
            Some(json!({})),
        ),
    )
    .await;
    let before = app.notifier.requests.lock().len();

    let (status, body) = send(
        &app,
        chain_request(
            &format!("/api/ops/orders/{order_id}/replay"),
            None,
            json!({}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["action"], "confirm_order");
    assert_eq!(body["chain_id"], "chain-1");
    assert_eq!(app.notifier.requests.lock().len(), before + 1);
}
