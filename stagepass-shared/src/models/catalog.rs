use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};
use std::fmt;

use crate::money::{self, Money};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConcertId(pub i64);

impl fmt::Display for ConcertId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TicketTypeId(pub i64);

impl fmt::Display for TicketTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Sale status as published by the catalog service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConcertStatus {
    OnSale,
    Upcoming,
    SoldOut,
}

impl ConcertStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConcertStatus::OnSale => "on-sale",
            ConcertStatus::Upcoming => "upcoming",
            ConcertStatus::SoldOut => "sold-out",
        }
    }
}

/// A purchasable ticket class for one concert
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TicketType {
    pub id: TicketTypeId,
    #[serde(default)]
    pub concert_id: Option<ConcertId>,
    #[serde(rename = "type")]
    pub name: String,
    #[serde(with = "money::decimal")]
    pub price: Money,
    #[serde(default)]
    pub total_seats: u32,
    pub available_seats: u32,
}

impl TicketType {
    pub fn is_available(&self) -> bool {
        self.available_seats > 0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Concert {
    pub id: ConcertId,
    pub name: String,
    pub artist: String,
    pub venue: String,
    pub city: String,
    pub date: DateTime<Utc>,
    #[serde(default)]
    pub time: String,
    #[serde(default)]
    pub total_seats: u32,
    #[serde(default)]
    pub available_seats: u32,
    pub status: ConcertStatus,
    #[serde(default)]
    pub image_url: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "ticketTypes", default)]
    pub ticket_types: Vec<TicketType>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl Concert {
    pub fn ticket_type(&self, id: TicketTypeId) -> Option<&TicketType> {
        self.ticket_types.iter().find(|t| t.id == id)
    }
}

/// Server-side catalog filter. `None` means "all" for status and city.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConcertFilter {
    #[serde(default)]
    pub search: String,
    #[serde(default)]
    pub status: Option<ConcertStatus>,
    #[serde(default)]
    pub city: Option<String>,
}

impl ConcertFilter {
    pub const ALL: &'static str = "all";

    /// Query pairs in the shape the catalog service expects
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        vec![
            ("search", self.search.trim().to_string()),
            ("status", self.status.map(|s| s.as_str().to_string()).unwrap_or_else(|| Self::ALL.to_string())),
            ("city", self.city.clone().unwrap_or_else(|| Self::ALL.to_string())),
        ]
    }

    /// Same matching rule the catalog service applies: case-insensitive search
    /// over name, artist and venue, exact status and city.
    pub fn matches(&self, concert: &Concert) -> bool {
        let term = self.search.trim().to_lowercase();
        let search_ok = term.is_empty()
            || concert.name.to_lowercase().contains(&term)
            || concert.artist.to_lowercase().contains(&term)
            || concert.venue.to_lowercase().contains(&term);

        let status_ok = self.status.map_or(true, |s| s == concert.status);
        let city_ok = self.city.as_deref().map_or(true, |c| c == ConcertFilter::ALL || c == concert.city);

        search_ok && status_ok && city_ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_concert_deserialization() {
        let json = r#"
            {
                "id": 1,
                "name": "Summer Night",
                "artist": "Nadin Amizah",
                "venue": "Istora Senayan",
                "city": "Jakarta",
                "date": "2025-08-17T00:00:00Z",
                "time": "19:30",
                "total_seats": 500,
                "available_seats": 120,
                "status": "on-sale",
                "image_url": "https://img.example/1.jpg",
                "description": "Live",
                "ticketTypes": [
                    {"id": 10, "concert_id": 1, "type": "VIP", "price": 150.5, "total_seats": 50, "available_seats": 4}
                ],
                "created_at": "2025-01-01T00:00:00Z"
            }
        "#;
        let concert: Concert = serde_json::from_str(json).expect("Failed to deserialize");
        assert_eq!(concert.status, ConcertStatus::OnSale);
        let vip = concert.ticket_type(TicketTypeId(10)).unwrap();
        assert_eq!(vip.name, "VIP");
        assert_eq!(vip.price, Money::from_cents(15050));
    }

    #[test]
    fn test_filter_defaults_to_all() {
        let pairs = ConcertFilter::default().query_pairs();
        assert_eq!(pairs[1], ("status", "all".to_string()));
        assert_eq!(pairs[2], ("city", "all".to_string()));
    }
}
