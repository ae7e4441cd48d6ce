use actix_web::http::StatusCode;
use actix_web::{test, web, App};
use serde_json::{json, Value};
use std::sync::Arc;

use order_service::handlers::{self, PUBLISH_DEFERRED_MESSAGE};
use order_service::messaging::{EventPublisher, InMemoryChannel, OrderCreatedEvent};
use order_service::metrics::Metrics;
use order_service::pricing::FixedPrice;
use order_service::relay::{OutboxRelay, RelayConfig};
use order_service::service::OrderService;
use order_service::state::AppState;
use order_service::store::InMemoryOrderStore;

struct Harness {
    store: Arc<InMemoryOrderStore>,
    channel: Arc<InMemoryChannel>,
    state: AppState,
}

fn harness() -> Harness {
    let store = Arc::new(InMemoryOrderStore::new());
    let channel = Arc::new(InMemoryChannel::new());
    let metrics = Arc::new(Metrics::new().unwrap());

    let state = AppState {
        orders: OrderService::new(store.clone(), Arc::new(FixedPrice::default()), metrics.clone()),
        publisher: EventPublisher::new(channel.clone()),
        outbox: store.clone(),
        store: store.clone(),
        metrics,
    };

    Harness {
        store,
        channel,
        state,
    }
}

macro_rules! app {
    ($state:expr) => {
        test::init_service(
            App::new()
                .app_data(web::Data::new($state.clone()))
                .configure(handlers::configure),
        )
        .await
    };
}

fn create_body() -> Value {
    json!({"customer_id": "c1", "product_code": "P100", "quantity": 3})
}

#[actix_web::test]
async fn test_create_order_publishes_one_event() {
    let h = harness();
    let app = app!(h.state);

    let req = test::TestRequest::post()
        .uri("/api/orders")
        .set_json(create_body())
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CREATED);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["status"], "success");
    assert_eq!(body["data"]["status"], "pending");
    assert!(body.get("message").is_none());
    let id = body["data"]["id"].as_i64().unwrap();

    let req = test::TestRequest::get().uri(&format!("/api/orders/{id}")).to_request();
    let order: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(order["data"]["customer_id"], "c1");
    assert_eq!(order["data"]["quantity"], 3);
    assert_eq!(order["data"]["price"].as_f64(), Some(10.0));
    assert_eq!(order["data"]["total_amount"].as_f64(), Some(30.0));
    assert_eq!(order["data"]["status"], "pending");

    let published = h.channel.published().await;
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].exchange, "orders");
    assert_eq!(published[0].routing_key, "order.created");
    let event: OrderCreatedEvent = serde_json::from_slice(&published[0].message.body).unwrap();
    assert_eq!(event.order_id, id);
    assert_eq!(event.event_type, "order_created");

    // Delivered immediately, so nothing is left for the relay.
    assert!(h.store.outbox_entries().await.is_empty());
}

#[actix_web::test]
async fn test_create_rejects_invalid_input() {
    let h = harness();
    let app = app!(h.state);

    for body in [
        json!({"customer_id": "c1", "product_code": "P100", "quantity": 0}),
        json!({"customer_id": "", "product_code": "P100", "quantity": 1}),
        json!({"customer_id": "c1", "quantity": 1}),
        json!({"customer_id": "c1", "product_code": "P100", "quantity": 1_500_000_000}),
    ] {
        let req = test::TestRequest::post().uri("/api/orders").set_json(body).to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["status"], "error");
        assert!(body["message"].is_string());
    }

    assert!(h.channel.published().await.is_empty());
}

#[actix_web::test]
async fn test_create_store_failure_is_500_without_detail() {
    let h = harness();
    let app = app!(h.state);
    h.store.set_unavailable(true);

    let req = test::TestRequest::post()
        .uri("/api/orders")
        .set_json(create_body())
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body, json!({"status": "error", "message": "Failed to create order"}));
    assert!(h.channel.published().await.is_empty());
}

#[actix_web::test]
async fn test_publish_failure_defers_event_to_relay() {
    let h = harness();
    let app = app!(h.state);
    h.channel.set_failing(true);

    let req = test::TestRequest::post()
        .uri("/api/orders")
        .set_json(create_body())
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CREATED);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["message"], PUBLISH_DEFERRED_MESSAGE);
    let id = body["data"]["id"].as_i64().unwrap();

    // The order is retrievable even though no event went out.
    let req = test::TestRequest::get().uri(&format!("/api/orders/{id}")).to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);
    assert!(h.channel.published().await.is_empty());
    assert_eq!(h.state.metrics.events_deferred.get(), 1);

    h.channel.set_failing(false);
    h.store
        .age_outbox_entry(id, chrono::Utc::now() - chrono::Duration::minutes(5))
        .await;
    let relay = OutboxRelay::new(
        h.store.clone(),
        h.state.publisher.clone(),
        RelayConfig::default(),
        h.state.metrics.clone(),
    );
    assert_eq!(relay.drain_once().await.unwrap().published, 1);

    let published = h.channel.published().await;
    assert_eq!(published.len(), 1);
    let event: OrderCreatedEvent = serde_json::from_slice(&published[0].message.body).unwrap();
    assert_eq!(event.order_id, id);
}

#[actix_web::test]
async fn test_get_missing_order_is_404() {
    let h = harness();
    let app = app!(h.state);

    let req = test::TestRequest::get().uri("/api/orders/999").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body, json!({"status": "error", "message": "order not found"}));

    let req = test::TestRequest::get().uri("/api/orders/not-a-number").to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn test_list_paginates_and_filters() {
    let h = harness();
    let app = app!(h.state);

    for i in 0..3 {
        let req = test::TestRequest::post()
            .uri("/api/orders")
            .set_json(json!({"customer_id": "c1", "product_code": format!("P{i}"), "quantity": 1}))
            .to_request();
        test::call_service(&app, req).await;
    }

    let req = test::TestRequest::get().uri("/api/orders?limit=2").to_request();
    let page: Value = test::call_and_read_body_json(&app, req).await;
    let orders = page["data"].as_array().unwrap();
    assert_eq!(orders.len(), 2);
    assert_eq!(orders[0]["product_code"], "P2");

    let req = test::TestRequest::get().uri("/api/orders?limit=2&offset=2").to_request();
    let page: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(page["data"].as_array().unwrap().len(), 1);

    let req = test::TestRequest::get().uri("/api/orders?status=shipped").to_request();
    let page: Value = test::call_and_read_body_json(&app, req).await;
    assert!(page["data"].as_array().unwrap().is_empty());

    let req = test::TestRequest::get().uri("/api/orders?status=").to_request();
    let page: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(page["data"].as_array().unwrap().len(), 3);

    let req = test::TestRequest::get().uri("/api/orders?status=lost").to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn test_update_status_and_delete() {
    let h = harness();
    let app = app!(h.state);

    let req = test::TestRequest::post()
        .uri("/api/orders")
        .set_json(create_body())
        .to_request();
    let created: Value = test::call_and_read_body_json(&app, req).await;
    let id = created["data"]["id"].as_i64().unwrap();
    let uri = format!("/api/orders/{id}");

    // Partial update: only quantity changes, total follows.
    let req = test::TestRequest::put()
        .uri(&uri)
        .set_json(json!({"quantity": 5}))
        .to_request();
    let updated: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(updated["data"]["customer_id"], "c1");
    assert_eq!(updated["data"]["quantity"], 5);
    assert_eq!(updated["data"]["total_amount"].as_f64(), Some(50.0));

    let req = test::TestRequest::put()
        .uri(&uri)
        .set_json(json!({"quantity": 0}))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);

    let req = test::TestRequest::patch()
        .uri(&format!("{uri}/status"))
        .set_json(json!({"status": "shipped"}))
        .to_request();
    let shipped: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(shipped["data"]["status"], "shipped");
    assert_eq!(shipped["data"]["quantity"], 5);

    let req = test::TestRequest::patch()
        .uri(&format!("{uri}/status"))
        .set_json(json!({"status": "teleported"}))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);

    let req = test::TestRequest::delete().uri(&uri).to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);

    let req = test::TestRequest::delete().uri(&uri).to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);

    let req = test::TestRequest::get().uri(&uri).to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn test_health_and_metrics_endpoints() {
    let h = harness();
    let app = app!(h.state);

    let req = test::TestRequest::get().uri("/health").to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body, json!({"status": "healthy"}));

    let req = test::TestRequest::get().uri("/health/ready").to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["status"], "ready");

    let req = test::TestRequest::get().uri("/api/orders/1").to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);

    h.store.set_unavailable(true);
    let req = test::TestRequest::get().uri("/health/ready").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);

    // Driver detail stays in the logs.
    let raw = test::read_body(resp).await;
    let body: Value = serde_json::from_slice(&raw).unwrap();
    let store = &body["components"][0];
    assert_eq!(store["name"], "store");
    assert_eq!(store["status"]["state"], "unhealthy");
    assert_eq!(store["status"]["reason"], "store unreachable");
    assert!(!String::from_utf8_lossy(&raw).contains("in-memory"));

    let req = test::TestRequest::get().uri("/metrics").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let text = String::from_utf8(test::read_body(resp).await.to_vec()).unwrap();
    assert!(text.contains("order_operations_total"));
    assert!(text.contains("circuit_breaker_state"));
}

#[actix_web::test]
async fn test_dead_letters_endpoint() {
    let h = harness();
    let app = app!(h.state);

    let req = test::TestRequest::get().uri("/api/outbox/dead-letters").to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["status"], "success");
    assert!(body["data"].as_array().unwrap().is_empty());
}
