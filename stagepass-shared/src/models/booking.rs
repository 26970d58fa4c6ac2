use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};
use std::fmt;

use crate::models::catalog::{ConcertId, TicketTypeId};
use crate::models::user::UserId;
use crate::money::{self, Money};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BookingId(pub i64);

impl fmt::Display for BookingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of a cart line or pending booking for one user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BookingKey {
    pub concert_id: ConcertId,
    pub ticket_type_id: TicketTypeId,
}

impl BookingKey {
    pub fn new(concert_id: ConcertId, ticket_type_id: TicketTypeId) -> Self {
        Self { concert_id, ticket_type_id }
    }
}

impl fmt::Display for BookingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.concert_id, self.ticket_type_id)
    }
}

/// A client-local, not yet submitted ticket selection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    pub concert_id: ConcertId,
    pub ticket_type_id: TicketTypeId,
    pub quantity: u32,
    /// Price snapshot taken when the line was selected
    pub unit_price: Money,
}

impl CartLine {
    pub fn new(concert_id: ConcertId, ticket_type_id: TicketTypeId, quantity: u32, unit_price: Money) -> Self {
        Self {
            concert_id,
            ticket_type_id,
            quantity,
            unit_price,
        }
    }

    pub fn key(&self) -> BookingKey {
        BookingKey::new(self.concert_id, self.ticket_type_id)
    }

    pub fn line_total(&self) -> Money {
        self.unit_price.times(self.quantity)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Pending,
    #[serde(alias = "confirmed")]
    Completed,
    Cancelled,
}

/// Server-persisted reservation that has not been paid yet.
///
/// `total_price` is the line total (unit price times `ticket_count`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingBooking {
    pub id: BookingId,
    pub concert_id: ConcertId,
    pub ticket_type_id: TicketTypeId,
    pub ticket_count: u32,
    #[serde(with = "money::decimal")]
    pub total_price: Money,
    pub user_id: UserId,
    pub status: BookingStatus,
    pub created_at: DateTime<Utc>,
}

impl PendingBooking {
    pub fn key(&self) -> BookingKey {
        BookingKey::new(self.concert_id, self.ticket_type_id)
    }

    pub fn is_pending(&self) -> bool {
        self.status == BookingStatus::Pending
    }
}

/// Body of `POST /bookings`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewBooking {
    pub concert_id: ConcertId,
    pub ticket_type_id: TicketTypeId,
    pub ticket_count: u32,
    #[serde(with = "money::decimal")]
    pub total_price: Money,
}

impl From<&CartLine> for NewBooking {
    fn from(line: &CartLine) -> Self {
        Self {
            concert_id: line.concert_id,
            ticket_type_id: line.ticket_type_id,
            ticket_count: line.quantity,
            total_price: line.line_total(),
        }
    }
}

/// Response of `POST /bookings`.
///
/// Some deployments answer with only `{status, message}`, so the id is
/// optional and the pending list stays the authority.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BookingCreated {
    #[serde(default)]
    pub id: Option<BookingId>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub message: String,
}
