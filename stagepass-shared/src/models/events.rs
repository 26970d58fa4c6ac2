use uuid::Uuid;

use crate::models::booking::{BookingId, BookingKey};
use crate::models::user::UserId;
use crate::money::Money;

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone, PartialEq)]
pub struct BookingSubmittedEvent {
    pub key: BookingKey,
    pub booking_id: BookingId,
    pub ticket_count: u32,
    pub timestamp: i64,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone, PartialEq)]
pub struct BookingCancelledEvent {
    pub key: BookingKey,
    pub booking_ids: Vec<BookingId>,
    pub timestamp: i64,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone, PartialEq)]
pub struct CheckoutConfirmedEvent {
    pub attempt_id: Uuid,
    pub user_id: UserId,
    pub booking_id: BookingId,
    pub amount: Money,
    pub timestamp: i64,
}

/// Payment was captured but the booking could not be marked complete.
/// Needs out-of-band reconciliation.
#[derive(Debug, serde::Serialize, serde::Deserialize, Clone, PartialEq)]
pub struct ReconciliationRequiredEvent {
    pub attempt_id: Uuid,
    pub user_id: UserId,
    pub booking_id: BookingId,
    pub amount: Money,
    pub reason: String,
    pub timestamp: i64,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone, PartialEq)]
pub struct CatalogWarningEvent {
    pub source: String,
    pub message: String,
    pub timestamp: i64,
}

/// Everything the storefront publishes on its event channel
#[derive(Debug, serde::Serialize, serde::Deserialize, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StorefrontEvent {
    BookingSubmitted(BookingSubmittedEvent),
    BookingCancelled(BookingCancelledEvent),
    CheckoutConfirmed(CheckoutConfirmedEvent),
    ReconciliationRequired(ReconciliationRequiredEvent),
    CatalogWarning(CatalogWarningEvent),
}
