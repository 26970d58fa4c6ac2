//! In-memory stand-ins for the three backend services.
//!
//! They follow the backends' observable behavior closely enough to drive the
//! storefront end to end: pending rows merge per concert and ticket type,
//! completion marks every pending row of the user, deletes of unknown ids
//! answer `NotFound`.

use async_trait::async_trait;
use chrono::Utc;
use stagepass_core::{
    BookingService, CatalogSource, CoreError, CoreResult, Credential, IdentityService, PaymentGateway, PaymentOutcome,
    PaymentRequest, PaymentStatus, Registration,
};
use stagepass_shared::{
    BookingCreated, BookingId, BookingStatus, Concert, ConcertFilter, ConcertId, Masked, NewBooking, PendingBooking, User,
    UserId,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

struct BookingRows {
    rows: Vec<PendingBooking>,
    next_id: i64,
}

/// Booking service double. Every token belongs to `user_id`.
pub struct InMemoryBookingService {
    user_id: UserId,
    state: Mutex<BookingRows>,
    merge: bool,
    delay: Option<Duration>,
    fail_create: Mutex<Option<CoreError>>,
    fail_complete: Mutex<Option<CoreError>>,
    fail_delete: Mutex<Option<CoreError>>,
    fail_pending: Mutex<Option<CoreError>>,
    pub create_calls: AtomicUsize,
    pub delete_calls: AtomicUsize,
    pub complete_calls: AtomicUsize,
    pub pending_calls: AtomicUsize,
}

impl InMemoryBookingService {
    pub fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            state: Mutex::new(BookingRows { rows: Vec::new(), next_id: 1 }),
            merge: true,
            delay: None,
            fail_create: Mutex::new(None),
            fail_complete: Mutex::new(None),
            fail_delete: Mutex::new(None),
            fail_pending: Mutex::new(None),
            create_calls: AtomicUsize::new(0),
            delete_calls: AtomicUsize::new(0),
            complete_calls: AtomicUsize::new(0),
            pending_calls: AtomicUsize::new(0),
        }
    }

    /// Keep a separate row per create instead of merging
    pub fn without_merge(mut self) -> Self {
        self.merge = false;
        self
    }

    /// Every call sleeps this long before answering
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn fail_next_create(&self, err: CoreError) {
        *self.fail_create.lock().unwrap_or_else(PoisonError::into_inner) = Some(err);
    }

    pub fn fail_next_complete(&self, err: CoreError) {
        *self.fail_complete.lock().unwrap_or_else(PoisonError::into_inner) = Some(err);
    }

    pub fn fail_next_delete(&self, err: CoreError) {
        *self.fail_delete.lock().unwrap_or_else(PoisonError::into_inner) = Some(err);
    }

    pub fn fail_next_pending(&self, err: CoreError) {
        *self.fail_pending.lock().unwrap_or_else(PoisonError::into_inner) = Some(err);
    }

    /// Rows of any status
    pub fn rows(&self) -> Vec<PendingBooking> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).rows.clone()
    }

    async fn pause(&self) {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
    }

    fn take(slot: &Mutex<Option<CoreError>>) -> Option<CoreError> {
        slot.lock().unwrap_or_else(PoisonError::into_inner).take()
    }
}

#[async_trait]
impl BookingService for InMemoryBookingService {
    async fn create_booking(&self, _token: &Credential, booking: &NewBooking) -> CoreResult<BookingCreated> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        if let Some(err) = Self::take(&self.fail_create) {
            return Err(err);
        }

        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let merge_into = if self.merge {
            state.rows.iter().position(|row| {
                row.is_pending()
                    && row.user_id == self.user_id
                    && row.concert_id == booking.concert_id
                    && row.ticket_type_id == booking.ticket_type_id
            })
        } else {
            None
        };

        let id = match merge_into {
            Some(index) => {
                let row = &mut state.rows[index];
                row.ticket_count += booking.ticket_count;
                row.total_price += booking.total_price;
                row.id
            }
            None => {
                let id = BookingId(state.next_id);
                state.next_id += 1;
                state.rows.push(PendingBooking {
                    id,
                    concert_id: booking.concert_id,
                    ticket_type_id: booking.ticket_type_id,
                    ticket_count: booking.ticket_count,
                    total_price: booking.total_price,
                    user_id: self.user_id,
                    status: BookingStatus::Pending,
                    created_at: Utc::now(),
                });
                id
            }
        };

        Ok(BookingCreated {
            id: Some(id),
            created_at: Some(Utc::now()),
            message: "Booking created successfully".to_string(),
        })
    }

    async fn delete_booking(&self, _token: &Credential, id: BookingId) -> CoreResult<()> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        if let Some(err) = Self::take(&self.fail_delete) {
            return Err(err);
        }

        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let before = state.rows.len();
        state.rows.retain(|row| row.id != id);
        if state.rows.len() == before {
            return Err(CoreError::NotFound(format!("booking {}", id)));
        }
        Ok(())
    }

    async fn pending_bookings(&self, _token: &Credential) -> CoreResult<Vec<PendingBooking>> {
        self.pending_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        if let Some(err) = Self::take(&self.fail_pending) {
            return Err(err);
        }

        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(state
            .rows
            .iter()
            .filter(|row| row.is_pending() && row.user_id == self.user_id)
            .cloned()
            .collect())
    }

    async fn complete_booking(&self, _token: &Credential, id: BookingId) -> CoreResult<()> {
        self.complete_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        if let Some(err) = Self::take(&self.fail_complete) {
            return Err(err);
        }

        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if !state.rows.iter().any(|row| row.id == id && row.is_pending()) {
            return Err(CoreError::NotFound(format!("booking {}", id)));
        }
        for row in state.rows.iter_mut().filter(|row| row.user_id == self.user_id && row.is_pending()) {
            row.status = BookingStatus::Completed;
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub enum PaymentBehavior {
    Approve,
    /// 2xx with a non-success status
    Decline(String),
    /// 4xx from the gateway
    Reject(String),
    Unavailable,
}

pub struct MockPaymentGateway {
    behavior: Mutex<PaymentBehavior>,
    requests: Mutex<Vec<PaymentRequest>>,
}

impl MockPaymentGateway {
    pub fn new(behavior: PaymentBehavior) -> Self {
        Self {
            behavior: Mutex::new(behavior),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn set_behavior(&self, behavior: PaymentBehavior) {
        *self.behavior.lock().unwrap_or_else(PoisonError::into_inner) = behavior;
    }

    pub fn requests(&self) -> Vec<PaymentRequest> {
        self.requests.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

#[async_trait]
impl PaymentGateway for MockPaymentGateway {
    async fn submit_payment(&self, _token: &Credential, request: &PaymentRequest) -> CoreResult<PaymentOutcome> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request.clone());

        let behavior = self.behavior.lock().unwrap_or_else(PoisonError::into_inner).clone();
        match behavior {
            PaymentBehavior::Approve => Ok(PaymentOutcome {
                status: PaymentStatus::Succeeded,
                message: "Payment successfully".to_string(),
            }),
            PaymentBehavior::Decline(message) => Ok(PaymentOutcome {
                status: PaymentStatus::Declined,
                message,
            }),
            PaymentBehavior::Reject(reason) => Err(CoreError::Rejected { status: 400, reason }),
            PaymentBehavior::Unavailable => Err(CoreError::ServiceUnavailable("payment service unreachable".to_string())),
        }
    }
}

/// Catalog double applying the same filter rules as the catalog service
pub struct StaticCatalog {
    concerts: Vec<Concert>,
    cities: CoreResult<Vec<String>>,
}

impl StaticCatalog {
    pub fn new(concerts: Vec<Concert>) -> Self {
        let mut cities: Vec<String> = concerts.iter().map(|c| c.city.clone()).collect();
        cities.sort();
        cities.dedup();
        Self {
            concerts,
            cities: Ok(cities),
        }
    }

    pub fn with_city_failure(mut self, err: CoreError) -> Self {
        self.cities = Err(err);
        self
    }
}

#[async_trait]
impl CatalogSource for StaticCatalog {
    async fn list_concerts(&self, filter: &ConcertFilter) -> CoreResult<Vec<Concert>> {
        Ok(self.concerts.iter().filter(|c| filter.matches(c)).cloned().collect())
    }

    async fn list_cities(&self) -> CoreResult<Vec<String>> {
        self.cities.clone()
    }

    async fn get_concert(&self, id: ConcertId) -> CoreResult<Concert> {
        self.concerts
            .iter()
            .find(|c| c.id == id)
            .cloned()
            .ok_or_else(|| CoreError::NotFound("Concert not found".to_string()))
    }
}

struct Account {
    user: User,
    password: String,
}

/// Identity double issuing `tok-<user id>` tokens
#[derive(Default)]
pub struct MockIdentityService {
    accounts: Mutex<HashMap<String, Account>>,
}

impl MockIdentityService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(self, id: UserId, email: &str, name: &str, password: &str) -> Self {
        self.accounts.lock().unwrap_or_else(PoisonError::into_inner).insert(
            email.to_string(),
            Account {
                user: User {
                    id,
                    email: email.to_string(),
                    name: name.to_string(),
                    created_at: None,
                },
                password: password.to_string(),
            },
        );
        self
    }
}

#[async_trait]
impl IdentityService for MockIdentityService {
    async fn login(&self, email: &str, password: &Masked<String>) -> CoreResult<Credential> {
        let accounts = self.accounts.lock().unwrap_or_else(PoisonError::into_inner);
        match accounts.get(email) {
            Some(account) if account.password == *password.expose() => Ok(Masked::from(format!("tok-{}", account.user.id))),
            _ => Err(CoreError::Unauthenticated("invalid email or password".to_string())),
        }
    }

    async fn register(&self, registration: &Registration) -> CoreResult<User> {
        let mut accounts = self.accounts.lock().unwrap_or_else(PoisonError::into_inner);
        if accounts.contains_key(&registration.email) {
            return Err(CoreError::Rejected {
                status: 400,
                reason: "email already registered".to_string(),
            });
        }
        let user = User {
            id: UserId(accounts.len() as i64 + 100),
            email: registration.email.clone(),
            name: registration.name.clone(),
            created_at: Some(Utc::now()),
        };
        accounts.insert(
            registration.email.clone(),
            Account {
                user: user.clone(),
                password: registration.password.expose().clone(),
            },
        );
        Ok(user)
    }

    async fn current_user(&self, token: &Credential) -> CoreResult<User> {
        let accounts = self.accounts.lock().unwrap_or_else(PoisonError::into_inner);
        accounts
            .values()
            .find(|account| *token.expose() == format!("tok-{}", account.user.id))
            .map(|account| account.user.clone())
            .ok_or_else(|| CoreError::Unauthenticated("Invalid token".to_string()))
    }
}
