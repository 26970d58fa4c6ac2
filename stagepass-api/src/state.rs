use stagepass_catalog::{CatalogAccessor, CatalogSettings};
use stagepass_core::{BookingService, CatalogSource, CredentialStore, IdentityService, PaymentGateway, Session};
use stagepass_order::{BookingSynchronizer, CheckoutOrchestrator};
use stagepass_shared::StorefrontEvent;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

/// Backend services the storefront talks to
pub struct Services {
    pub identity: Arc<dyn IdentityService>,
    pub catalog: Arc<dyn CatalogSource>,
    pub bookings: Arc<dyn BookingService>,
    pub payments: Arc<dyn PaymentGateway>,
    pub credentials: Arc<dyn CredentialStore>,
}

#[derive(Clone)]
pub struct AppState {
    pub session: Arc<Session>,
    pub identity: Arc<dyn IdentityService>,
    pub catalog: Arc<CatalogAccessor>,
    pub bookings: Arc<BookingSynchronizer>,
    pub checkout: Arc<CheckoutOrchestrator>,
    pub events: broadcast::Sender<StorefrontEvent>,
}

impl AppState {
    pub fn new(services: Services, catalog_settings: CatalogSettings, call_timeout: Duration) -> Self {
        let (events, _) = broadcast::channel(100);
        let session = Arc::new(Session::new(services.credentials));

        let catalog = Arc::new(CatalogAccessor::new(services.catalog, catalog_settings, events.clone()));
        let bookings = Arc::new(BookingSynchronizer::new(
            session.clone(),
            services.bookings.clone(),
            events.clone(),
            call_timeout,
        ));
        let checkout = Arc::new(CheckoutOrchestrator::new(
            session.clone(),
            bookings.clone(),
            services.bookings,
            services.payments,
            catalog.clone(),
            events.clone(),
            call_timeout,
        ));

        Self {
            session,
            identity: services.identity,
            catalog,
            bookings,
            checkout,
            events,
        }
    }
}
