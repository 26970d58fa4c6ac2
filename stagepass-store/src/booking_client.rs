use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use stagepass_core::{BookingService, CatalogSource, CoreError, CoreResult, Credential};
use stagepass_shared::{BookingCreated, BookingId, Concert, ConcertFilter, ConcertId, NewBooking, PendingBooking};
use std::time::Duration;
use tracing::debug;

use crate::http::ServiceClient;

#[derive(Deserialize)]
struct ConcertList {
    #[serde(default)]
    concerts: Option<Vec<Concert>>,
}

#[derive(Deserialize)]
struct ConcertEnvelope {
    concert: Concert,
}

#[derive(Deserialize)]
struct PendingList {
    #[serde(default)]
    data: Option<Vec<PendingBooking>>,
}

/// Client for the booking service, which also serves the concert catalog
pub struct HttpBookingService {
    http: ServiceClient,
}

impl HttpBookingService {
    pub fn new(base_url: &str, timeout: Duration) -> CoreResult<Self> {
        Ok(Self {
            http: ServiceClient::new("booking service", base_url, timeout)?,
        })
    }
}

/// Accepts a bare array or a `{cities: [...]}` envelope and keeps the
/// string entries. Any other shape is an error.
fn parse_cities(body: Value) -> CoreResult<Vec<String>> {
    let entries = match body {
        Value::Array(entries) => entries,
        Value::Object(mut map) => match map.remove("cities") {
            Some(Value::Array(entries)) => entries,
            Some(Value::Null) => Vec::new(),
            _ => return Err(CoreError::ServiceUnavailable("malformed city list".to_string())),
        },
        _ => return Err(CoreError::ServiceUnavailable("malformed city list".to_string())),
    };

    Ok(entries
        .into_iter()
        .filter_map(|entry| match entry {
            Value::String(city) => Some(city),
            _ => None,
        })
        .collect())
}

#[async_trait]
impl CatalogSource for HttpBookingService {
    async fn list_concerts(&self, filter: &ConcertFilter) -> CoreResult<Vec<Concert>> {
        let list: ConcertList = self
            .http
            .json(self.http.get("/concerts").query(&filter.query_pairs()))
            .await?;
        Ok(list.concerts.unwrap_or_default())
    }

    async fn list_cities(&self) -> CoreResult<Vec<String>> {
        let body: Value = self.http.json(self.http.get("/concerts/cities")).await?;
        parse_cities(body)
    }

    async fn get_concert(&self, id: ConcertId) -> CoreResult<Concert> {
        let envelope: ConcertEnvelope = self.http.json(self.http.get(&format!("/concerts/{}", id))).await?;
        Ok(envelope.concert)
    }
}

#[async_trait]
impl BookingService for HttpBookingService {
    async fn create_booking(&self, token: &Credential, booking: &NewBooking) -> CoreResult<BookingCreated> {
        let response = self
            .http
            .send(self.http.post("/bookings").bearer_auth(token.expose()).json(booking))
            .await?;

        let text = response.text().await.unwrap_or_default();
        if text.trim().is_empty() {
            return Ok(BookingCreated::default());
        }
        serde_json::from_str(&text)
            .map_err(|e| CoreError::ServiceUnavailable(format!("malformed booking service response: {}", e)))
    }

    async fn delete_booking(&self, token: &Credential, id: BookingId) -> CoreResult<()> {
        self.http
            .send(self.http.delete(&format!("/bookings/{}", id)).bearer_auth(token.expose()))
            .await?;
        debug!("Deleted booking {}", id);
        Ok(())
    }

    async fn pending_bookings(&self, token: &Credential) -> CoreResult<Vec<PendingBooking>> {
        let list: PendingList = self
            .http
            .json(self.http.get("/bookings/pending").bearer_auth(token.expose()))
            .await?;
        Ok(list.data.unwrap_or_default())
    }

    async fn complete_booking(&self, token: &Credential, id: BookingId) -> CoreResult<()> {
        self.http
            .send(self.http.put(&format!("/bookings/{}/complete", id)).bearer_auth(token.expose()))
            .await?;
        Ok(())
    }
}
