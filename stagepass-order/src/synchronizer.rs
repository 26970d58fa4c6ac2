use serde::Serialize;
use stagepass_core::{bounded, BookingService, CoreError, Session, SessionTicket};
use stagepass_shared::models::events::{BookingCancelledEvent, BookingSubmittedEvent};
use stagepass_shared::{BookingId, BookingKey, BookingStatus, CartLine, Money, NewBooking, PendingBooking, StorefrontEvent};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::cart::{CartError, CartStore};

/// Where a key stands between the local cart and the booking service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SyncState {
    LocalOnly,
    Submitting,
    ConfirmedPending,
    Removing,
    Gone,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operation {
    Submitting,
    Removing,
}

/// Pending list as last reported by the booking service, tagged with the
/// session generation it was fetched under
#[derive(Default)]
struct Canonical {
    generation: u64,
    bookings: Vec<PendingBooking>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Holds a key in the in-flight set until dropped
struct InFlight<'a> {
    set: &'a Mutex<HashMap<BookingKey, Operation>>,
    key: BookingKey,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        lock(self.set).remove(&self.key);
    }
}

/// Puts an optimistic cart line back to what it was when dropped, so an
/// abandoned add never leaves a local-only line behind
struct CartRollback<'a> {
    sync: &'a BookingSynchronizer,
    ticket: &'a SessionTicket,
    key: BookingKey,
    previous: Option<CartLine>,
}

impl Drop for CartRollback<'_> {
    fn drop(&mut self) {
        if self.sync.session.is_current(self.ticket) {
            lock(&self.sync.cart).restore(&self.key, self.previous.take());
        }
    }
}

/// Keeps the local cart and the server's pending bookings in step.
///
/// The pending list fetched from the booking service is the only source of
/// truth for amounts and booking ids. Every mutating call refreshes it before
/// returning, and at most one request per key is on the wire at a time.
pub struct BookingSynchronizer {
    session: Arc<Session>,
    bookings: Arc<dyn BookingService>,
    cart: Mutex<CartStore>,
    canonical: Mutex<Canonical>,
    in_flight: Mutex<HashMap<BookingKey, Operation>>,
    events: broadcast::Sender<StorefrontEvent>,
    call_timeout: Duration,
}

impl BookingSynchronizer {
    pub fn new(
        session: Arc<Session>,
        bookings: Arc<dyn BookingService>,
        events: broadcast::Sender<StorefrontEvent>,
        call_timeout: Duration,
    ) -> Self {
        Self {
            session,
            bookings,
            cart: Mutex::new(CartStore::new()),
            canonical: Mutex::new(Canonical::default()),
            in_flight: Mutex::new(HashMap::new()),
            events,
            call_timeout,
        }
    }

    /// Mirror a cart line as a pending booking and return the canonical
    /// entry for its key.
    pub async fn submit(&self, line: &CartLine) -> Result<PendingBooking, SyncError> {
        if line.quantity == 0 {
            return Err(CartError::ZeroQuantity.into());
        }
        let ticket = self.session.ticket().await?;
        let _guard = self.begin(line.key(), Operation::Submitting)?;
        self.submit_as(&ticket, line).await
    }

    /// Delete every pending booking for the key. An absent booking counts
    /// as already removed.
    pub async fn cancel(&self, key: BookingKey) -> Result<(), SyncError> {
        let ticket = self.session.ticket().await?;
        let _guard = self.begin(key, Operation::Removing)?;

        let current = self.refresh_as(&ticket).await?;
        let ids: Vec<BookingId> = current.iter().filter(|b| b.key() == key).map(|b| b.id).collect();
        if ids.is_empty() {
            debug!("Nothing pending for {}, cancel is a no-op", key);
            return Ok(());
        }

        let mut failure = None;
        for id in &ids {
            let deleted = bounded(
                self.call_timeout,
                "delete booking",
                self.bookings.delete_booking(&ticket.token, *id),
            )
            .await;
            match deleted {
                Ok(()) => {}
                Err(CoreError::NotFound(_)) => debug!("Booking {} already gone", id),
                Err(err) => {
                    failure = Some(err);
                    break;
                }
            }
        }

        self.ensure_current(&ticket)?;
        let refreshed = self.refresh_as(&ticket).await;

        if let Some(err) = failure {
            warn!("Cancel for {} failed: {}", key, err);
            return Err(err.into());
        }
        refreshed?;

        info!("Cancelled pending booking(s) {:?} for {}", ids, key);
        let _ = self.events.send(StorefrontEvent::BookingCancelled(BookingCancelledEvent {
            key,
            booking_ids: ids,
            timestamp: chrono::Utc::now().timestamp(),
        }));
        Ok(())
    }

    /// Fetch the authoritative pending list for the signed-in user
    pub async fn refresh(&self) -> Result<Vec<PendingBooking>, SyncError> {
        let ticket = self.session.ticket().await?;
        self.refresh_as(&ticket).await
    }

    /// Optimistically add to the cart, then submit. The line leaves the cart
    /// once the service has it; on failure the cart is rolled back.
    pub async fn add_to_cart(&self, line: CartLine) -> Result<PendingBooking, SyncError> {
        let ticket = self.session.ticket().await?;
        let key = line.key();
        let _guard = self.begin(key, Operation::Submitting)?;

        let previous = {
            let mut cart = lock(&self.cart);
            let previous = cart.line(&key).cloned();
            cart.add_line(line.concert_id, line.ticket_type_id, line.quantity, line.unit_price)?;
            previous
        };
        let rollback = CartRollback {
            sync: self,
            ticket: &ticket,
            key,
            previous,
        };

        let result = self.submit_as(&ticket, &line).await;

        drop(rollback);
        if let Err(err) = &result {
            warn!("Rolled back cart line {}: {}", key, err);
        }
        result
    }

    /// Drop the local line and cancel whatever is pending for the key
    pub async fn remove_from_cart(&self, key: BookingKey) -> Result<(), SyncError> {
        lock(&self.cart).remove_line(&key);
        self.cancel(key).await
    }

    pub fn state_of(&self, key: &BookingKey) -> SyncState {
        if let Some(op) = lock(&self.in_flight).get(key) {
            return match op {
                Operation::Submitting => SyncState::Submitting,
                Operation::Removing => SyncState::Removing,
            };
        }
        if self.pending().iter().any(|b| b.key() == *key) {
            return SyncState::ConfirmedPending;
        }
        if lock(&self.cart).line(key).is_some() {
            return SyncState::LocalOnly;
        }
        SyncState::Gone
    }

    /// Last canonical list, empty if it belongs to an earlier session
    pub fn pending(&self) -> Vec<PendingBooking> {
        let canonical = lock(&self.canonical);
        if canonical.generation == self.session.generation() {
            canonical.bookings.clone()
        } else {
            Vec::new()
        }
    }

    /// One logical line per key, duplicate rows folded together
    pub fn pending_lines(&self) -> Vec<PendingBooking> {
        fold_by_key(&self.pending())
    }

    pub fn pending_total(&self) -> Money {
        self.pending().iter().map(|b| b.total_price).sum()
    }

    pub fn cart_lines(&self) -> Vec<CartLine> {
        lock(&self.cart).lines().to_vec()
    }

    pub fn cart_total(&self) -> Money {
        lock(&self.cart).total_amount()
    }

    /// Tickets already held for a key, locally and on the server
    pub fn held_quantity(&self, key: &BookingKey) -> u32 {
        let local = lock(&self.cart).line(key).map_or(0, |l| l.quantity);
        self.pending()
            .iter()
            .filter(|b| b.key() == *key)
            .map(|b| b.ticket_count)
            .fold(local, u32::saturating_add)
    }

    /// Forget the cart and the canonical list, e.g. after a completed checkout
    pub fn clear(&self) {
        lock(&self.cart).clear();
        let mut canonical = lock(&self.canonical);
        canonical.bookings.clear();
    }

    pub(crate) async fn refresh_as(&self, ticket: &SessionTicket) -> Result<Vec<PendingBooking>, SyncError> {
        let fetched = bounded(
            self.call_timeout,
            "pending bookings",
            self.bookings.pending_bookings(&ticket.token),
        )
        .await?;
        self.ensure_current(ticket)?;

        let bookings: Vec<PendingBooking> = fetched.into_iter().filter(PendingBooking::is_pending).collect();
        let mut canonical = lock(&self.canonical);
        canonical.generation = ticket.generation;
        canonical.bookings = bookings.clone();
        Ok(bookings)
    }

    async fn submit_as(&self, ticket: &SessionTicket, line: &CartLine) -> Result<PendingBooking, SyncError> {
        let key = line.key();
        let created = bounded(
            self.call_timeout,
            "create booking",
            self.bookings.create_booking(&ticket.token, &NewBooking::from(line)),
        )
        .await;

        self.ensure_current(ticket)?;
        let refreshed = self.refresh_as(ticket).await;
        let created = created?;

        let entry = match refreshed {
            Ok(list) => fold_by_key(&list).into_iter().find(|b| b.key() == key),
            Err(err) => {
                warn!("Refresh after submitting {} failed, applying response directly: {}", key, err);
                let id = created.id.ok_or(err)?;
                Some(self.apply_created(ticket, line, id, created.created_at))
            }
        };

        let entry = entry.ok_or_else(|| {
            SyncError::Core(CoreError::ServiceUnavailable(format!(
                "booking for {} missing from pending list",
                key
            )))
        })?;

        info!("Booking {} pending for {} ({} tickets)", entry.id, key, entry.ticket_count);
        let _ = self.events.send(StorefrontEvent::BookingSubmitted(BookingSubmittedEvent {
            key,
            booking_id: entry.id,
            ticket_count: entry.ticket_count,
            timestamp: chrono::Utc::now().timestamp(),
        }));
        Ok(entry)
    }

    /// Fold a create response into the canonical list when the list itself
    /// could not be re-read
    fn apply_created(
        &self,
        ticket: &SessionTicket,
        line: &CartLine,
        id: BookingId,
        created_at: Option<chrono::DateTime<chrono::Utc>>,
    ) -> PendingBooking {
        let mut canonical = lock(&self.canonical);
        if canonical.generation != ticket.generation {
            canonical.generation = ticket.generation;
            canonical.bookings.clear();
        }

        if let Some(existing) = canonical.bookings.iter_mut().find(|b| b.id == id) {
            existing.ticket_count = existing.ticket_count.saturating_add(line.quantity);
            existing.total_price += line.line_total();
            return existing.clone();
        }

        let booking = PendingBooking {
            id,
            concert_id: line.concert_id,
            ticket_type_id: line.ticket_type_id,
            ticket_count: line.quantity,
            total_price: line.line_total(),
            user_id: ticket.user_id(),
            status: BookingStatus::Pending,
            created_at: created_at.unwrap_or_else(chrono::Utc::now),
        };
        canonical.bookings.push(booking.clone());
        booking
    }

    fn begin(&self, key: BookingKey, op: Operation) -> Result<InFlight<'_>, SyncError> {
        let mut set = lock(&self.in_flight);
        if set.contains_key(&key) {
            debug!("Refusing {:?} for {}, a request is already in flight", op, key);
            return Err(SyncError::InFlight(key));
        }
        set.insert(key, op);
        Ok(InFlight {
            set: &self.in_flight,
            key,
        })
    }

    fn ensure_current(&self, ticket: &SessionTicket) -> Result<(), SyncError> {
        if self.session.is_current(ticket) {
            Ok(())
        } else {
            debug!("Discarding response from an ended session");
            Err(SyncError::SessionChanged)
        }
    }
}

/// Merge rows sharing a key; the first row's id and timestamp stand for the line
fn fold_by_key(bookings: &[PendingBooking]) -> Vec<PendingBooking> {
    let mut folded: Vec<PendingBooking> = Vec::new();
    for booking in bookings {
        match folded.iter_mut().find(|b| b.key() == booking.key()) {
            Some(line) => {
                line.ticket_count = line.ticket_count.saturating_add(booking.ticket_count);
                line.total_price += booking.total_price;
            }
            None => folded.push(booking.clone()),
        }
    }
    folded
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SyncError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("A request for {0} is already in flight")]
    InFlight(BookingKey),

    #[error("Session changed while the request was in flight")]
    SessionChanged,

    #[error(transparent)]
    Cart(#[from] CartError),
}
