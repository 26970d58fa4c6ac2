use async_trait::async_trait;
use serde_json::Value;
use stagepass_core::{CoreResult, Credential, PaymentGateway, PaymentOutcome, PaymentRequest, PaymentStatus};
use std::time::Duration;
use tracing::info;

use crate::http::ServiceClient;

pub struct HttpPaymentGateway {
    http: ServiceClient,
}

impl HttpPaymentGateway {
    pub fn new(base_url: &str, timeout: Duration) -> CoreResult<Self> {
        Ok(Self {
            http: ServiceClient::new("payment service", base_url, timeout)?,
        })
    }
}

#[async_trait]
impl PaymentGateway for HttpPaymentGateway {
    async fn submit_payment(&self, token: &Credential, request: &PaymentRequest) -> CoreResult<PaymentOutcome> {
        let body: Value = self
            .http
            .json(self.http.post("/payments").bearer_auth(token.expose()).json(request))
            .await?;

        let status = PaymentStatus::from_wire(&body["status"]);
        let message = body["message"].as_str().unwrap_or_default().to_string();
        info!(
            "Payment for booking {} ({}) answered {:?}",
            request.booking_id, request.amount, status
        );

        Ok(PaymentOutcome { status, message })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use stagepass_core::CoreError;
    use stagepass_shared::{BookingId, Masked, Money, UserId};
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request() -> PaymentRequest {
        PaymentRequest {
            user_id: UserId(7),
            booking_id: BookingId(5),
            amount: Money::from_units(100),
        }
    }

    fn gateway(server: &MockServer) -> HttpPaymentGateway {
        HttpPaymentGateway::new(&format!("{}/api", server.uri()), Duration::from_secs(2)).unwrap()
    }

    #[tokio::test]
    async fn test_numeric_created_status_succeeds() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/payments"))
            .and(body_json(json!({"user_id": 7, "booking_id": 5, "amount": 100.0})))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({"status": 201, "message": "Payment successfully"})))
            .mount(&server)
            .await;

        let outcome = gateway(&server).submit_payment(&Masked::from("tok-1"), &request()).await.unwrap();
        assert!(outcome.succeeded());
        assert_eq!(outcome.message, "Payment successfully");
    }

    #[tokio::test]
    async fn test_unrecognised_status_is_a_decline() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/payments"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "pending_review"})))
            .mount(&server)
            .await;

        let outcome = gateway(&server).submit_payment(&Masked::from("tok-1"), &request()).await.unwrap();
        assert_eq!(outcome.status, PaymentStatus::Declined);
    }

    #[tokio::test]
    async fn test_client_error_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/payments"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({"status": 400, "message": "card declined"})))
            .mount(&server)
            .await;

        let err = gateway(&server).submit_payment(&Masked::from("tok-1"), &request()).await.unwrap_err();
        assert_eq!(err, CoreError::Rejected { status: 400, reason: "card declined".to_string() });
    }

    #[tokio::test]
    async fn test_slow_gateway_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/payments"))
            .respond_with(
                ResponseTemplate::new(201)
                    .set_body_json(json!({"status": 201}))
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&server)
            .await;

        let slow = HttpPaymentGateway::new(&format!("{}/api", server.uri()), Duration::from_millis(50)).unwrap();
        let err = slow.submit_payment(&Masked::from("tok-1"), &request()).await.unwrap_err();
        assert_eq!(err, CoreError::ServiceUnavailable("payment service timed out".to_string()));
    }
}
