use stagepass_core::{bounded, CatalogSource, CoreError};
use stagepass_shared::models::events::CatalogWarningEvent;
use stagepass_shared::{Concert, ConcertFilter, ConcertId, StorefrontEvent, TicketType, TicketTypeId};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, RwLock};
use tokio::time::Instant;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct CatalogSettings {
    /// How long a fetched listing or concert is served from cache
    pub cache_ttl: Duration,
    /// Upper bound on a single catalog call
    pub call_timeout: Duration,
}

impl Default for CatalogSettings {
    fn default() -> Self {
        Self {
            cache_ttl: Duration::from_secs(30),
            call_timeout: Duration::from_secs(10),
        }
    }
}

struct Listing {
    filter: ConcertFilter,
    concerts: Vec<Concert>,
    fetched_at: Instant,
}

#[derive(Default)]
struct CatalogCache {
    listing: Option<Listing>,
    by_id: HashMap<ConcertId, (Concert, Instant)>,
}

impl CatalogCache {
    /// Store a fetched concert, evicting lookups that have aged out
    fn remember(&mut self, concerts: &[Concert], now: Instant, ttl: Duration) {
        self.by_id.retain(|_, (_, fetched_at)| now.duration_since(*fetched_at) < ttl);
        for concert in concerts {
            self.by_id.insert(concert.id, (concert.clone(), now));
        }
    }
}

/// Typed, cached view of the catalog service.
///
/// Filtering happens server-side. The accessor keeps the last listing with
/// the filter that produced it and only goes back to the service when the
/// filter changes or the entry ages out.
pub struct CatalogAccessor {
    source: Arc<dyn CatalogSource>,
    settings: CatalogSettings,
    cache: RwLock<CatalogCache>,
    events: broadcast::Sender<StorefrontEvent>,
}

impl CatalogAccessor {
    pub fn new(source: Arc<dyn CatalogSource>, settings: CatalogSettings, events: broadcast::Sender<StorefrontEvent>) -> Self {
        Self {
            source,
            settings,
            cache: RwLock::new(CatalogCache::default()),
            events,
        }
    }

    /// Concerts matching `filter`
    pub async fn list(&self, filter: &ConcertFilter) -> Result<Vec<Concert>, CatalogError> {
        {
            let cache = self.cache.read().await;
            if let Some(listing) = &cache.listing {
                if listing.filter == *filter && listing.fetched_at.elapsed() < self.settings.cache_ttl {
                    debug!("Catalog listing served from cache");
                    return Ok(listing.concerts.clone());
                }
            }
        }

        let concerts = bounded(self.settings.call_timeout, "concert listing", self.source.list_concerts(filter)).await?;
        for concert in &concerts {
            validate_concert(concert)?;
        }

        let now = Instant::now();
        let mut cache = self.cache.write().await;
        cache.remember(&concerts, now, self.settings.cache_ttl);
        cache.listing = Some(Listing {
            filter: filter.clone(),
            concerts: concerts.clone(),
            fetched_at: now,
        });

        Ok(concerts)
    }

    /// A single concert, `CoreError::NotFound` when the catalog has no such id
    pub async fn get_by_id(&self, id: ConcertId) -> Result<Concert, CatalogError> {
        {
            let cache = self.cache.read().await;
            if let Some((concert, fetched_at)) = cache.by_id.get(&id) {
                if fetched_at.elapsed() < self.settings.cache_ttl {
                    return Ok(concert.clone());
                }
            }
        }

        let concert = bounded(self.settings.call_timeout, "concert lookup", self.source.get_concert(id)).await?;
        validate_concert(&concert)?;

        self.cache
            .write()
            .await
            .remember(std::slice::from_ref(&concert), Instant::now(), self.settings.cache_ttl);
        Ok(concert)
    }

    /// Concert and ticket type for a selection, used for price capture
    pub async fn ticket_type(&self, concert_id: ConcertId, ticket_type_id: TicketTypeId) -> Result<(Concert, TicketType), CatalogError> {
        let concert = self.get_by_id(concert_id).await?;
        let ticket_type = concert
            .ticket_type(ticket_type_id)
            .cloned()
            .ok_or(CatalogError::UnknownTicketType { concert_id, ticket_type_id })?;
        Ok((concert, ticket_type))
    }

    /// Cities with concerts. Never fails: an unreachable or malformed
    /// upstream yields an empty list plus a warning event.
    pub async fn cities(&self) -> Vec<String> {
        match bounded(self.settings.call_timeout, "city list", self.source.list_cities()).await {
            Ok(raw) => {
                let mut seen = HashSet::new();
                raw.into_iter()
                    .map(|c| c.trim().to_string())
                    .filter(|c| !c.is_empty() && seen.insert(c.clone()))
                    .collect()
            }
            Err(err) => {
                warn!("City list unavailable, continuing without it: {}", err);
                let _ = self.events.send(StorefrontEvent::CatalogWarning(CatalogWarningEvent {
                    source: "cities".to_string(),
                    message: err.to_string(),
                    timestamp: chrono::Utc::now().timestamp(),
                }));
                Vec::new()
            }
        }
    }

    /// Drop cached entries so seat counts are re-read on next access
    pub async fn invalidate(&self) {
        let mut cache = self.cache.write().await;
        cache.listing = None;
        cache.by_id.clear();
    }
}

fn validate_concert(concert: &Concert) -> Result<(), CatalogError> {
    let mut ids = HashSet::new();
    for ticket_type in &concert.ticket_types {
        if !ids.insert(ticket_type.id) {
            return Err(CatalogError::Malformed(format!(
                "concert {} lists ticket type {} twice",
                concert.id, ticket_type.id
            )));
        }
        if ticket_type.price.is_negative() {
            return Err(CatalogError::Malformed(format!(
                "ticket type {} of concert {} has a negative price",
                ticket_type.id, concert.id
            )));
        }
        if let Some(owner) = ticket_type.concert_id {
            if owner != concert.id {
                return Err(CatalogError::Malformed(format!(
                    "ticket type {} belongs to concert {}, listed under {}",
                    ticket_type.id, owner, concert.id
                )));
            }
        }
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CatalogError {
    #[error(transparent)]
    Service(#[from] CoreError),

    #[error("Concert {concert_id} has no ticket type {ticket_type_id}")]
    UnknownTicketType {
        concert_id: ConcertId,
        ticket_type_id: TicketTypeId,
    },

    #[error("Malformed catalog response: {0}")]
    Malformed(String),
}
