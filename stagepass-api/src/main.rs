use anyhow::Context;
use stagepass_api::{app, prime_pending, AppState, Services};
use stagepass_catalog::CatalogSettings;
use stagepass_shared::StorefrontEvent;
use stagepass_store::{Config, FileCredentialStore, HttpBookingService, HttpIdentityService, HttpPaymentGateway};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "stagepass_api=debug,tower_http=debug,stagepass=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().context("Failed to load config")?;
    tracing::info!("Starting StagePass storefront on port {}", config.server.port);

    let timeout = config.http.timeout();
    let booking_service = Arc::new(HttpBookingService::new(&config.services.booking_url, timeout)?);
    let services = Services {
        identity: Arc::new(HttpIdentityService::new(&config.services.identity_url, timeout)?),
        catalog: booking_service.clone(),
        bookings: booking_service,
        payments: Arc::new(HttpPaymentGateway::new(&config.services.payment_url, timeout)?),
        credentials: Arc::new(FileCredentialStore::new(&config.session.credential_path)),
    };

    let catalog_settings = CatalogSettings {
        cache_ttl: config.catalog.cache_ttl(),
        call_timeout: timeout,
    };
    let state = AppState::new(services, catalog_settings, timeout);

    spawn_event_log(&state);

    match state.session.restore(state.identity.as_ref()).await {
        Ok(Some(user)) => {
            tracing::info!("Resumed session for {}", user.email);
            prime_pending(&state).await;
        }
        Ok(None) => tracing::info!("No stored session"),
        Err(err) => tracing::warn!("Could not restore session, starting signed out: {}", err),
    }

    let app = app(state);

    let addr = SocketAddr::from(([127, 0, 0, 1], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(listener, app).await?;
    Ok(())
}

/// Mirror storefront events into the log
fn spawn_event_log(state: &AppState) {
    let mut events = state.events.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(StorefrontEvent::CatalogWarning(event)) => {
                    tracing::warn!(target: "stagepass::events", "Catalog degraded ({}): {}", event.source, event.message)
                }
                Ok(event) => tracing::info!(target: "stagepass::events", "{:?}", event),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!("Event log fell behind, skipped {} events", skipped)
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}
