use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use chrono::Utc;
use serde_json::{json, Value};
use stagepass_api::{app, AppState, Services};
use stagepass_catalog::CatalogSettings;
use stagepass_core::{CoreError, MemoryCredentialStore};
use stagepass_order::mock::{InMemoryBookingService, MockIdentityService, MockPaymentGateway, PaymentBehavior, StaticCatalog};
use stagepass_shared::{Concert, ConcertId, ConcertStatus, Money, TicketType, TicketTypeId, UserId};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

const USER: UserId = UserId(7);

struct Storefront {
    state: AppState,
    bookings: Arc<InMemoryBookingService>,
    payments: Arc<MockPaymentGateway>,
}

fn concert(id: i64, city: &str, status: ConcertStatus, available: u32) -> Concert {
    Concert {
        id: ConcertId(id),
        name: format!("Concert {}", id),
        artist: "Tulus".to_string(),
        venue: "GBK".to_string(),
        city: city.to_string(),
        date: Utc::now(),
        time: "20:00".to_string(),
        total_seats: 100,
        available_seats: available,
        status,
        image_url: String::new(),
        description: String::new(),
        ticket_types: vec![TicketType {
            id: TicketTypeId(7),
            concert_id: Some(ConcertId(id)),
            name: "Regular".to_string(),
            price: Money::from_units(50),
            total_seats: 100,
            available_seats: available,
        }],
        created_at: None,
    }
}

fn storefront_with(catalog: StaticCatalog) -> Storefront {
    let bookings = Arc::new(InMemoryBookingService::new(USER));
    let payments = Arc::new(MockPaymentGateway::new(PaymentBehavior::Approve));
    let services = Services {
        identity: Arc::new(MockIdentityService::new().with_user(USER, "ayu@example.com", "Ayu", "secret123")),
        catalog: Arc::new(catalog),
        bookings: bookings.clone(),
        payments: payments.clone(),
        credentials: Arc::new(MemoryCredentialStore::new()),
    };
    Storefront {
        state: AppState::new(services, CatalogSettings::default(), Duration::from_secs(5)),
        bookings,
        payments,
    }
}

fn storefront() -> Storefront {
    storefront_with(StaticCatalog::new(vec![
        concert(1, "Jakarta", ConcertStatus::OnSale, 100),
        concert(2, "Bandung", ConcertStatus::SoldOut, 0),
    ]))
}

impl Storefront {
    async fn call(&self, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = app(self.state.clone()).oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    async fn login(&self) {
        let (status, _) = self
            .call(
                "POST",
                "/auth/login",
                Some(json!({"email": "ayu@example.com", "password": "secret123"})),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
    }
}

fn customer() -> Value {
    json!({"name": "Ayu", "email": "ayu@example.com", "phone": "0811"})
}

#[tokio::test]
async fn test_browse_book_and_pay() {
    let shop = storefront();
    shop.login().await;

    let (status, body) = shop
        .call(
            "POST",
            "/cart/items",
            Some(json!({"concert_id": 1, "ticket_type_id": 7, "quantity": 2})),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["booking"]["ticket_count"], 2);
    assert_eq!(body["booking"]["total_price"], 100.0);

    let (_, cart) = shop.call("GET", "/cart", None).await;
    assert_eq!(cart["pending_total"], 100.0);
    assert_eq!(cart["pending"].as_array().unwrap().len(), 1);
    assert!(cart["lines"].as_array().unwrap().is_empty());

    let (status, body) = shop.call("POST", "/checkout", Some(customer())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["receipt"]["amount"], 100.0);
    assert_eq!(shop.payments.requests()[0].amount, Money::from_units(100));

    let (_, cart) = shop.call("GET", "/cart", None).await;
    assert!(cart["pending"].as_array().unwrap().is_empty());

    let (_, state) = shop.call("GET", "/checkout", None).await;
    assert_eq!(state["state"], "confirmed");
}

#[tokio::test]
async fn test_cart_requires_login() {
    let shop = storefront();

    let (status, body) = shop
        .call(
            "POST",
            "/cart/items",
            Some(json!({"concert_id": 1, "ticket_type_id": 7, "quantity": 1})),
        )
        .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "unauthenticated");
    assert_eq!(shop.bookings.create_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_wrong_password() {
    let shop = storefront();
    let (status, body) = shop
        .call(
            "POST",
            "/auth/login",
            Some(json!({"email": "ayu@example.com", "password": "nope"})),
        )
        .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "invalid credentials");
}

#[tokio::test]
async fn test_selection_limits() {
    let shop = storefront();
    shop.login().await;

    let (status, _) = shop
        .call(
            "POST",
            "/cart/items",
            Some(json!({"concert_id": 1, "ticket_type_id": 7, "quantity": 11})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = shop
        .call(
            "POST",
            "/cart/items",
            Some(json!({"concert_id": 2, "ticket_type_id": 7, "quantity": 1})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = shop
        .call(
            "POST",
            "/cart/items",
            Some(json!({"concert_id": 1, "ticket_type_id": 99, "quantity": 1})),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(shop.bookings.create_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_remove_item_twice() {
    let shop = storefront();
    shop.login().await;
    shop.call(
        "POST",
        "/cart/items",
        Some(json!({"concert_id": 1, "ticket_type_id": 7, "quantity": 3})),
    )
    .await;

    let (status, _) = shop.call("DELETE", "/cart/items/1/7", None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = shop.call("DELETE", "/cart/items/1/7", None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    assert_eq!(shop.bookings.delete_calls.load(Ordering::SeqCst), 1);
    let (_, cart) = shop.call("GET", "/cart", None).await;
    assert_eq!(cart["pending_total"], 0.0);
}

#[tokio::test]
async fn test_incomplete_customer_info() {
    let shop = storefront();
    shop.login().await;

    let (status, body) = shop.call("POST", "/checkout", Some(json!({"name": "Ayu"}))).await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "incomplete_customer_info");
    assert!(shop.payments.requests().is_empty());
}

#[tokio::test]
async fn test_declined_payment_keeps_pending() {
    let shop = storefront();
    shop.payments.set_behavior(PaymentBehavior::Decline("insufficient funds".into()));
    shop.login().await;
    shop.call(
        "POST",
        "/cart/items",
        Some(json!({"concert_id": 1, "ticket_type_id": 7, "quantity": 2})),
    )
    .await;

    let (status, body) = shop.call("POST", "/checkout", Some(customer())).await;

    assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
    assert_eq!(body["message"], "insufficient funds");
    assert_eq!(shop.bookings.complete_calls.load(Ordering::SeqCst), 0);
    let (_, cart) = shop.call("GET", "/cart", None).await;
    assert_eq!(cart["pending_total"], 100.0);
}

#[tokio::test]
async fn test_completion_failure_is_reported() {
    let shop = storefront();
    shop.login().await;
    shop.call(
        "POST",
        "/cart/items",
        Some(json!({"concert_id": 1, "ticket_type_id": 7, "quantity": 1})),
    )
    .await;
    shop.bookings
        .fail_next_complete(CoreError::ServiceUnavailable("booking service down".into()));

    let (status, body) = shop.call("POST", "/checkout", Some(customer())).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "inconsistent");
}

#[tokio::test]
async fn test_logout_clears_session_and_cart() {
    let shop = storefront();
    shop.login().await;
    shop.call(
        "POST",
        "/cart/items",
        Some(json!({"concert_id": 1, "ticket_type_id": 7, "quantity": 1})),
    )
    .await;

    let (status, _) = shop.call("POST", "/auth/logout", None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = shop.call("GET", "/auth/me", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (_, cart) = shop.call("GET", "/cart", None).await;
    assert!(cart["pending"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_concert_filters() {
    let shop = storefront();

    let (_, body) = shop.call("GET", "/concerts?search=&status=all&city=Bandung", None).await;
    let concerts = body["concerts"].as_array().unwrap();
    assert_eq!(concerts.len(), 1);
    assert_eq!(concerts[0]["id"], 2);

    let (status, body) = shop.call("GET", "/concerts/1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["concert"]["ticketTypes"][0]["type"], "Regular");

    let (status, _) = shop.call("GET", "/concerts/42", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_cities_degrade_to_empty() {
    let shop = storefront_with(
        StaticCatalog::new(vec![concert(1, "Jakarta", ConcertStatus::OnSale, 100)])
            .with_city_failure(CoreError::ServiceUnavailable("malformed city list".into())),
    );

    let (status, body) = shop.call("GET", "/concerts/cities", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["cities"], json!([]));
}

#[tokio::test]
async fn test_health() {
    let (status, body) = storefront().call("GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}
