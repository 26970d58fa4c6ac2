use chrono::{DateTime, Utc};
use serde::Serialize;
use stagepass_catalog::CatalogAccessor;
use stagepass_core::{bounded, BookingService, CoreError, PaymentGateway, PaymentRequest, Session, SessionTicket};
use stagepass_shared::models::events::{CheckoutConfirmedEvent, ReconciliationRequiredEvent};
use stagepass_shared::money::{self, Money};
use stagepass_shared::{BookingId, CustomerInfo, StorefrontEvent, UserId};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::synchronizer::{BookingSynchronizer, SyncError};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckoutReceipt {
    pub attempt_id: Uuid,
    pub user_id: UserId,
    pub booking_id: BookingId,
    #[serde(with = "money::decimal")]
    pub amount: Money,
    pub message: String,
    pub confirmed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum CheckoutState {
    Idle,
    ValidatingInfo,
    SubmittingPayment,
    CompletingBooking,
    Confirmed(CheckoutReceipt),
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CheckoutError {
    #[error("Missing customer information: {}", .0.join(", "))]
    IncompleteCustomerInfo(Vec<&'static str>),

    #[error("There are no pending bookings to pay for")]
    NothingToCheckout,

    #[error("A checkout is already running")]
    AlreadyInProgress,

    #[error("Not authenticated: {0}")]
    Unauthenticated(String),

    #[error("Payment rejected: {0}")]
    PaymentRejected(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    /// Payment was taken but the booking is not marked complete
    #[error("Payment captured for booking {booking_id} but completion failed: {reason}")]
    Inconsistent {
        attempt_id: Uuid,
        booking_id: BookingId,
        reason: String,
    },
}

impl From<CoreError> for CheckoutError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Unauthenticated(msg) => CheckoutError::Unauthenticated(msg),
            CoreError::ServiceUnavailable(msg) => CheckoutError::ServiceUnavailable(msg),
            CoreError::Rejected { reason, .. } => CheckoutError::PaymentRejected(reason),
            other => CheckoutError::ServiceUnavailable(other.to_string()),
        }
    }
}

impl From<SyncError> for CheckoutError {
    fn from(err: SyncError) -> Self {
        match err {
            SyncError::Core(core) => core.into(),
            SyncError::SessionChanged => CheckoutError::Unauthenticated("session ended".to_string()),
            other => CheckoutError::ServiceUnavailable(other.to_string()),
        }
    }
}

/// Clears the running flag when a checkout attempt ends
struct Running<'a>(&'a AtomicBool);

impl Drop for Running<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Armed once a payment is captured. Dropped while still armed, the attempt
/// ended before the booking was completed and is reported for reconciliation.
struct Captured<'a> {
    orchestrator: &'a CheckoutOrchestrator,
    attempt_id: Uuid,
    request: &'a PaymentRequest,
    armed: bool,
}

impl Captured<'_> {
    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for Captured<'_> {
    fn drop(&mut self) {
        if self.armed {
            let _ = self.orchestrator.inconsistent(
                self.attempt_id,
                self.request,
                "checkout abandoned before the booking was completed".to_string(),
            );
        }
    }
}

/// Drives validate, pay, complete for the canonical pending list.
///
/// Payment and completion are two calls to two services. If the second one
/// fails after the first succeeded the attempt ends `Inconsistent` and a
/// reconciliation event is published; it is never reported as a success.
pub struct CheckoutOrchestrator {
    session: Arc<Session>,
    synchronizer: Arc<BookingSynchronizer>,
    bookings: Arc<dyn BookingService>,
    payments: Arc<dyn PaymentGateway>,
    catalog: Arc<CatalogAccessor>,
    state: Mutex<CheckoutState>,
    running: AtomicBool,
    events: broadcast::Sender<StorefrontEvent>,
    call_timeout: Duration,
}

impl CheckoutOrchestrator {
    pub fn new(
        session: Arc<Session>,
        synchronizer: Arc<BookingSynchronizer>,
        bookings: Arc<dyn BookingService>,
        payments: Arc<dyn PaymentGateway>,
        catalog: Arc<CatalogAccessor>,
        events: broadcast::Sender<StorefrontEvent>,
        call_timeout: Duration,
    ) -> Self {
        Self {
            session,
            synchronizer,
            bookings,
            payments,
            catalog,
            state: Mutex::new(CheckoutState::Idle),
            running: AtomicBool::new(false),
            events,
            call_timeout,
        }
    }

    pub fn state(&self) -> CheckoutState {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Back to `Idle` unless an attempt is running
    pub fn reset(&self) {
        if !self.running.load(Ordering::SeqCst) {
            self.set_state(CheckoutState::Idle);
        }
    }

    /// Run one checkout attempt on its own task. The caller going away does
    /// not stop an attempt that has started.
    pub async fn checkout(self: &Arc<Self>, info: &CustomerInfo) -> Result<CheckoutReceipt, CheckoutError> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(CheckoutError::AlreadyInProgress);
        }

        let orchestrator = Arc::clone(self);
        let info = info.clone();
        let attempt = tokio::spawn(async move {
            let _running = Running(&orchestrator.running);
            orchestrator.run(&info).await
        });

        match attempt.await {
            Ok(result) => result,
            Err(err) => {
                error!("Checkout task ended abnormally: {}", err);
                Err(CheckoutError::ServiceUnavailable("checkout did not finish".to_string()))
            }
        }
    }

    async fn run(&self, info: &CustomerInfo) -> Result<CheckoutReceipt, CheckoutError> {
        let attempt_id = Uuid::new_v4();
        info!("Checkout {} started", attempt_id);

        self.set_state(CheckoutState::ValidatingInfo);
        let missing = info.missing_fields();
        if !missing.is_empty() {
            self.set_state(CheckoutState::Idle);
            return Err(CheckoutError::IncompleteCustomerInfo(missing));
        }

        let ticket = match self.session.ticket().await {
            Ok(ticket) => ticket,
            Err(err) => {
                self.set_state(CheckoutState::Idle);
                return Err(err.into());
            }
        };

        let pending = match self.synchronizer.refresh_as(&ticket).await {
            Ok(pending) => pending,
            Err(err) => {
                self.set_state(CheckoutState::Idle);
                return Err(err.into());
            }
        };
        let Some(first) = pending.first() else {
            self.set_state(CheckoutState::Idle);
            return Err(CheckoutError::NothingToCheckout);
        };

        let request = PaymentRequest {
            user_id: ticket.user_id(),
            booking_id: first.id,
            amount: pending.iter().map(|b| b.total_price).sum(),
        };

        self.set_state(CheckoutState::SubmittingPayment);
        let message = match self.pay(&ticket, &request).await {
            Ok(message) => message,
            Err(err) => {
                warn!("Checkout {} payment failed: {}", attempt_id, err);
                self.set_state(CheckoutState::Failed { reason: err.to_string() });
                return Err(err);
            }
        };
        info!("Checkout {} captured {} for booking {}", attempt_id, request.amount, request.booking_id);
        let mut captured = Captured {
            orchestrator: self,
            attempt_id,
            request: &request,
            armed: true,
        };

        if !self.session.is_current(&ticket) {
            captured.disarm();
            return Err(self.inconsistent(attempt_id, &request, "session ended after payment capture".to_string()));
        }

        self.set_state(CheckoutState::CompletingBooking);
        let completed = bounded(
            self.call_timeout,
            "complete booking",
            self.bookings.complete_booking(&ticket.token, request.booking_id),
        )
        .await;
        captured.disarm();
        if let Err(err) = completed {
            return Err(self.inconsistent(attempt_id, &request, err.to_string()));
        }

        self.synchronizer.clear();
        if let Err(err) = self.synchronizer.refresh_as(&ticket).await {
            warn!("Refresh after checkout {} failed: {}", attempt_id, err);
        }
        self.catalog.invalidate().await;

        let receipt = CheckoutReceipt {
            attempt_id,
            user_id: request.user_id,
            booking_id: request.booking_id,
            amount: request.amount,
            message,
            confirmed_at: Utc::now(),
        };
        info!("Checkout {} confirmed", attempt_id);
        let _ = self.events.send(StorefrontEvent::CheckoutConfirmed(CheckoutConfirmedEvent {
            attempt_id,
            user_id: receipt.user_id,
            booking_id: receipt.booking_id,
            amount: receipt.amount,
            timestamp: receipt.confirmed_at.timestamp(),
        }));
        self.set_state(CheckoutState::Confirmed(receipt.clone()));
        Ok(receipt)
    }

    async fn pay(&self, ticket: &SessionTicket, request: &PaymentRequest) -> Result<String, CheckoutError> {
        let outcome = bounded(
            self.call_timeout,
            "submit payment",
            self.payments.submit_payment(&ticket.token, request),
        )
        .await?;

        if outcome.succeeded() {
            Ok(outcome.message)
        } else if outcome.message.is_empty() {
            Err(CheckoutError::PaymentRejected("payment declined".to_string()))
        } else {
            Err(CheckoutError::PaymentRejected(outcome.message))
        }
    }

    fn inconsistent(&self, attempt_id: Uuid, request: &PaymentRequest, reason: String) -> CheckoutError {
        error!(
            target: "stagepass::reconciliation",
            "Checkout {} needs reconciliation: user {} paid {} for booking {} but it is not complete: {}",
            attempt_id, request.user_id, request.amount, request.booking_id, reason
        );
        let _ = self.events.send(StorefrontEvent::ReconciliationRequired(ReconciliationRequiredEvent {
            attempt_id,
            user_id: request.user_id,
            booking_id: request.booking_id,
            amount: request.amount,
            reason: reason.clone(),
            timestamp: Utc::now().timestamp(),
        }));
        self.set_state(CheckoutState::Failed { reason: reason.clone() });
        CheckoutError::Inconsistent {
            attempt_id,
            booking_id: request.booking_id,
            reason,
        }
    }

    fn set_state(&self, state: CheckoutState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{InMemoryBookingService, MockIdentityService, MockPaymentGateway, PaymentBehavior, StaticCatalog};
    use async_trait::async_trait;
    use stagepass_catalog::CatalogSettings;
    use stagepass_core::{CoreResult, Credential, MemoryCredentialStore, PaymentOutcome};
    use stagepass_shared::{CartLine, ConcertId, Masked, TicketTypeId};
    use std::sync::atomic::Ordering;

    const USER: UserId = UserId(7);

    struct Harness {
        session: Arc<Session>,
        bookings: Arc<InMemoryBookingService>,
        sync: Arc<BookingSynchronizer>,
        tx: broadcast::Sender<StorefrontEvent>,
    }

    impl Harness {
        async fn new() -> Self {
            let identity = MockIdentityService::new().with_user(USER, "ayu@example.com", "Ayu", "secret123");
            let session = Arc::new(Session::new(Arc::new(MemoryCredentialStore::new())));
            session
                .login(&identity, "ayu@example.com", &Masked::from("secret123"))
                .await
                .unwrap();

            let (tx, _) = broadcast::channel(32);
            let bookings = Arc::new(InMemoryBookingService::new(USER));
            let sync = Arc::new(BookingSynchronizer::new(
                session.clone(),
                bookings.clone(),
                tx.clone(),
                Duration::from_secs(5),
            ));
            Self { session, bookings, sync, tx }
        }

        fn orchestrator(&self, payments: Arc<dyn PaymentGateway>) -> Arc<CheckoutOrchestrator> {
            let catalog = Arc::new(CatalogAccessor::new(
                Arc::new(StaticCatalog::new(Vec::new())),
                CatalogSettings::default(),
                self.tx.clone(),
            ));
            Arc::new(CheckoutOrchestrator::new(
                self.session.clone(),
                self.sync.clone(),
                self.bookings.clone(),
                payments,
                catalog,
                self.tx.clone(),
                Duration::from_secs(5),
            ))
        }

        /// Same user, but every booking call takes `delay`
        async fn slow(delay: Duration) -> Self {
            let mut harness = Self::new().await;
            harness.bookings = Arc::new(InMemoryBookingService::new(USER).with_delay(delay));
            harness.sync = Arc::new(BookingSynchronizer::new(
                harness.session.clone(),
                harness.bookings.clone(),
                harness.tx.clone(),
                Duration::from_secs(5),
            ));
            harness
        }
    }

    fn info() -> CustomerInfo {
        CustomerInfo::new("Ayu", "ayu@example.com", "0811")
    }

    fn line(quantity: u32) -> CartLine {
        CartLine::new(ConcertId(1), TicketTypeId(7), quantity, Money::from_units(50))
    }

    #[tokio::test]
    async fn test_checkout_happy_path() {
        let harness = Harness::new().await;
        let payments = Arc::new(MockPaymentGateway::new(PaymentBehavior::Approve));
        let checkout = harness.orchestrator(payments.clone());
        let mut events = harness.tx.subscribe();

        let pending = harness.sync.add_to_cart(line(2)).await.unwrap();
        assert_eq!(pending.ticket_count, 2);
        assert_eq!(pending.total_price, Money::from_units(100));

        let receipt = checkout.checkout(&info()).await.unwrap();

        let paid = payments.requests();
        assert_eq!(paid.len(), 1);
        assert_eq!(paid[0].amount, Money::from_units(100));
        assert_eq!(paid[0].booking_id, pending.id);
        assert_eq!(paid[0].user_id, USER);
        assert_eq!(harness.bookings.complete_calls.load(Ordering::SeqCst), 1);

        assert!(harness.sync.cart_lines().is_empty());
        assert!(harness.sync.pending().is_empty());
        assert_eq!(checkout.state(), CheckoutState::Confirmed(receipt.clone()));

        let mut confirmed = false;
        while let Ok(event) = events.try_recv() {
            if let StorefrontEvent::CheckoutConfirmed(event) = event {
                assert_eq!(event.attempt_id, receipt.attempt_id);
                confirmed = true;
            }
        }
        assert!(confirmed);
    }

    #[tokio::test]
    async fn test_amount_sums_every_pending_booking() {
        let harness = Harness::new().await;
        let payments = Arc::new(MockPaymentGateway::new(PaymentBehavior::Approve));
        let checkout = harness.orchestrator(payments.clone());

        harness.sync.submit(&line(2)).await.unwrap();
        harness
            .sync
            .submit(&CartLine::new(ConcertId(2), TicketTypeId(9), 1, Money::from_cents(7550)))
            .await
            .unwrap();

        checkout.checkout(&info()).await.unwrap();
        assert_eq!(payments.requests()[0].amount, Money::from_cents(17550));
    }

    #[tokio::test]
    async fn test_declined_payment_leaves_bookings_alone() {
        let harness = Harness::new().await;
        let payments = Arc::new(MockPaymentGateway::new(PaymentBehavior::Decline("insufficient funds".into())));
        let checkout = harness.orchestrator(payments);
        harness.sync.submit(&line(2)).await.unwrap();

        let err = checkout.checkout(&info()).await.unwrap_err();

        assert_eq!(err, CheckoutError::PaymentRejected("insufficient funds".into()));
        assert!(matches!(checkout.state(), CheckoutState::Failed { .. }));
        assert_eq!(harness.sync.pending().len(), 1);
        assert_eq!(harness.bookings.complete_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_gateway_rejection_reason_is_kept() {
        let harness = Harness::new().await;
        let checkout = harness.orchestrator(Arc::new(MockPaymentGateway::new(PaymentBehavior::Reject("card expired".into()))));
        harness.sync.submit(&line(1)).await.unwrap();

        assert_eq!(
            checkout.checkout(&info()).await.unwrap_err(),
            CheckoutError::PaymentRejected("card expired".into())
        );
    }

    #[tokio::test]
    async fn test_unreachable_gateway_is_unavailable() {
        let harness = Harness::new().await;
        let checkout = harness.orchestrator(Arc::new(MockPaymentGateway::new(PaymentBehavior::Unavailable)));
        harness.sync.submit(&line(1)).await.unwrap();

        assert!(matches!(
            checkout.checkout(&info()).await,
            Err(CheckoutError::ServiceUnavailable(_))
        ));
        assert_eq!(harness.bookings.complete_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_completion_failure_is_inconsistent() {
        let harness = Harness::new().await;
        let checkout = harness.orchestrator(Arc::new(MockPaymentGateway::new(PaymentBehavior::Approve)));
        let mut events = harness.tx.subscribe();
        let booking = harness.sync.submit(&line(2)).await.unwrap();
        harness
            .bookings
            .fail_next_complete(CoreError::ServiceUnavailable("booking service down".into()));

        let err = checkout.checkout(&info()).await.unwrap_err();

        match err {
            CheckoutError::Inconsistent { booking_id, .. } => assert_eq!(booking_id, booking.id),
            other => panic!("expected Inconsistent, got {:?}", other),
        }
        assert!(matches!(checkout.state(), CheckoutState::Failed { .. }));

        let mut flagged = false;
        while let Ok(event) = events.try_recv() {
            if let StorefrontEvent::ReconciliationRequired(event) = event {
                assert_eq!(event.amount, Money::from_units(100));
                flagged = true;
            }
        }
        assert!(flagged);
    }

    #[tokio::test]
    async fn test_incomplete_info_makes_no_calls() {
        let harness = Harness::new().await;
        let payments = Arc::new(MockPaymentGateway::new(PaymentBehavior::Approve));
        let checkout = harness.orchestrator(payments.clone());
        let pending_calls = harness.bookings.pending_calls.load(Ordering::SeqCst);

        let err = checkout
            .checkout(&CustomerInfo::new("Ayu", "", " "))
            .await
            .unwrap_err();

        assert_eq!(err, CheckoutError::IncompleteCustomerInfo(vec!["email", "phone"]));
        assert_eq!(checkout.state(), CheckoutState::Idle);
        assert_eq!(harness.bookings.pending_calls.load(Ordering::SeqCst), pending_calls);
        assert!(payments.requests().is_empty());
    }

    #[tokio::test]
    async fn test_empty_pending_list_is_nothing_to_checkout() {
        let harness = Harness::new().await;
        let payments = Arc::new(MockPaymentGateway::new(PaymentBehavior::Approve));
        let checkout = harness.orchestrator(payments.clone());

        assert_eq!(checkout.checkout(&info()).await.unwrap_err(), CheckoutError::NothingToCheckout);
        assert_eq!(checkout.state(), CheckoutState::Idle);
        assert!(payments.requests().is_empty());
    }

    /// Signs the user out while the payment call is on the wire
    struct LogoutDuringPayment {
        session: Arc<Session>,
        inner: MockPaymentGateway,
    }

    #[async_trait]
    impl PaymentGateway for LogoutDuringPayment {
        async fn submit_payment(&self, token: &Credential, request: &PaymentRequest) -> CoreResult<PaymentOutcome> {
            self.session.logout().await;
            self.inner.submit_payment(token, request).await
        }
    }

    #[tokio::test]
    async fn test_logout_mid_checkout_stops_before_completion() {
        let harness = Harness::new().await;
        let checkout = harness.orchestrator(Arc::new(LogoutDuringPayment {
            session: harness.session.clone(),
            inner: MockPaymentGateway::new(PaymentBehavior::Approve),
        }));
        harness.sync.submit(&line(2)).await.unwrap();

        let err = checkout.checkout(&info()).await.unwrap_err();

        assert!(matches!(err, CheckoutError::Inconsistent { .. }));
        assert_eq!(harness.bookings.complete_calls.load(Ordering::SeqCst), 0);
    }

    /// Holds the payment call open so a second checkout can be attempted
    struct SlowGateway;

    #[async_trait]
    impl PaymentGateway for SlowGateway {
        async fn submit_payment(&self, _token: &Credential, _request: &PaymentRequest) -> CoreResult<PaymentOutcome> {
            tokio::time::sleep(Duration::from_secs(1)).await;
            Ok(PaymentOutcome {
                status: stagepass_core::PaymentStatus::Succeeded,
                message: String::new(),
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_checkout_at_a_time() {
        let harness = Harness::new().await;
        let checkout = harness.orchestrator(Arc::new(SlowGateway));
        harness.sync.submit(&line(1)).await.unwrap();

        let customer = info();
        let (first, second) = tokio::join!(checkout.checkout(&customer), checkout.checkout(&customer));

        assert!(first.is_ok());
        assert_eq!(second.unwrap_err(), CheckoutError::AlreadyInProgress);
    }

    #[tokio::test(start_paused = true)]
    async fn test_checkout_survives_caller_going_away() {
        let harness = Harness::slow(Duration::from_millis(100)).await;
        let payments = Arc::new(MockPaymentGateway::new(PaymentBehavior::Approve));
        let checkout = harness.orchestrator(payments.clone());
        harness.sync.submit(&line(2)).await.unwrap();

        let abandoned = tokio::time::timeout(Duration::from_millis(150), checkout.checkout(&info())).await;
        assert!(abandoned.is_err());
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert_eq!(payments.requests().len(), 1);
        assert_eq!(harness.bookings.complete_calls.load(Ordering::SeqCst), 1);
        assert!(matches!(checkout.state(), CheckoutState::Confirmed(_)));
        assert!(harness.bookings.rows().iter().all(|row| !row.is_pending()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_attempt_dropped_after_capture_is_reported() {
        let harness = Harness::slow(Duration::from_millis(100)).await;
        let payments = Arc::new(MockPaymentGateway::new(PaymentBehavior::Approve));
        let checkout = harness.orchestrator(payments.clone());
        let mut events = harness.tx.subscribe();
        harness.sync.submit(&line(2)).await.unwrap();

        let dropped = tokio::time::timeout(Duration::from_millis(150), checkout.run(&info())).await;
        assert!(dropped.is_err());

        assert_eq!(payments.requests().len(), 1);
        assert!(matches!(checkout.state(), CheckoutState::Failed { .. }));
        let mut flagged = false;
        while let Ok(event) = events.try_recv() {
            if let StorefrontEvent::ReconciliationRequired(event) = event {
                assert_eq!(event.amount, Money::from_units(100));
                flagged = true;
            }
        }
        assert!(flagged);
    }
}
