use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use stagepass_shared::money::{self, Money};
use stagepass_shared::{BookingId, UserId};

use crate::identity::Credential;
use crate::CoreResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Succeeded,
    Declined,
}

impl PaymentStatus {
    /// The payment service reports `status` either as an HTTP-like code
    /// (`201`) or as a word (`"success"`). Anything unrecognised is a decline.
    pub fn from_wire(status: &Value) -> Self {
        match status {
            Value::Number(n) => match n.as_u64() {
                Some(200) | Some(201) => PaymentStatus::Succeeded,
                _ => PaymentStatus::Declined,
            },
            Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "200" | "201" | "success" | "succeeded" | "completed" | "paid" => PaymentStatus::Succeeded,
                _ => PaymentStatus::Declined,
            },
            _ => PaymentStatus::Declined,
        }
    }
}

/// Body of `POST /payments`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentRequest {
    pub user_id: UserId,
    pub booking_id: BookingId,
    #[serde(with = "money::decimal")]
    pub amount: Money,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentOutcome {
    pub status: PaymentStatus,
    pub message: String,
}

impl PaymentOutcome {
    pub fn succeeded(&self) -> bool {
        self.status == PaymentStatus::Succeeded
    }
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Authorize and capture `amount` against the pending booking.
    /// A 4xx decline surfaces as `CoreError::Rejected`, a 2xx body with a
    /// non-success status as `PaymentStatus::Declined`.
    async fn submit_payment(&self, token: &Credential, request: &PaymentRequest) -> CoreResult<PaymentOutcome>;
}
