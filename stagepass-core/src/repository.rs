use async_trait::async_trait;
use stagepass_shared::{BookingCreated, BookingId, Concert, ConcertFilter, ConcertId, NewBooking, PendingBooking};

use crate::identity::Credential;
use crate::CoreResult;

/// Read side of the catalog service
#[async_trait]
pub trait CatalogSource: Send + Sync {
    /// `GET /concerts?search&status&city`, filtering is done by the service
    async fn list_concerts(&self, filter: &ConcertFilter) -> CoreResult<Vec<Concert>>;

    /// `GET /concerts/cities`. Implementations return what they could parse;
    /// an unusable body is an error and the caller decides how to degrade.
    async fn list_cities(&self) -> CoreResult<Vec<String>>;

    /// `GET /concerts/:id`, `NotFound` when the id is unknown
    async fn get_concert(&self, id: ConcertId) -> CoreResult<Concert>;
}

/// Pending booking records owned by the booking service
#[async_trait]
pub trait BookingService: Send + Sync {
    /// `POST /bookings`. The service merges into an existing pending row for
    /// the same concert and ticket type.
    async fn create_booking(&self, token: &Credential, booking: &NewBooking) -> CoreResult<BookingCreated>;

    /// `DELETE /bookings/:id`
    async fn delete_booking(&self, token: &Credential, id: BookingId) -> CoreResult<()>;

    /// `GET /bookings/pending` for the token's user
    async fn pending_bookings(&self, token: &Credential) -> CoreResult<Vec<PendingBooking>>;

    /// `PUT /bookings/:id/complete`
    async fn complete_booking(&self, token: &Credential, id: BookingId) -> CoreResult<()>;
}
