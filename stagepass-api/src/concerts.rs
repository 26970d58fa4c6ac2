use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use stagepass_shared::{Concert, ConcertFilter, ConcertId, ConcertStatus};

use crate::{error::AppError, state::AppState};

/// Raw query string values; `all` or empty means no constraint
#[derive(Debug, Default, Deserialize)]
pub struct ConcertQuery {
    pub search: Option<String>,
    pub status: Option<String>,
    pub city: Option<String>,
}

impl ConcertQuery {
    fn into_filter(self) -> Result<ConcertFilter, AppError> {
        let status = match self.status.as_deref().map(str::trim) {
            None | Some("") | Some(ConcertFilter::ALL) => None,
            Some("on-sale") => Some(ConcertStatus::OnSale),
            Some("upcoming") => Some(ConcertStatus::Upcoming),
            Some("sold-out") => Some(ConcertStatus::SoldOut),
            Some(other) => return Err(AppError::Validation(format!("unknown concert status '{}'", other))),
        };
        let city = self
            .city
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty() && c != ConcertFilter::ALL);

        Ok(ConcertFilter {
            search: self.search.unwrap_or_default().trim().to_string(),
            status,
            city,
        })
    }
}

#[derive(Serialize)]
struct ConcertList {
    concerts: Vec<Concert>,
}

#[derive(Serialize)]
struct CityList {
    cities: Vec<String>,
}

#[derive(Serialize)]
struct ConcertDetail {
    concert: Concert,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/concerts", get(list_concerts))
        .route("/concerts/cities", get(list_cities))
        .route("/concerts/{id}", get(get_concert))
}

async fn list_concerts(
    State(state): State<AppState>,
    Query(query): Query<ConcertQuery>,
) -> Result<Json<ConcertList>, AppError> {
    let filter = query.into_filter()?;
    let concerts = state.catalog.list(&filter).await?;
    Ok(Json(ConcertList { concerts }))
}

async fn list_cities(State(state): State<AppState>) -> Json<CityList> {
    Json(CityList {
        cities: state.catalog.cities().await,
    })
}

async fn get_concert(State(state): State<AppState>, Path(id): Path<i64>) -> Result<Json<ConcertDetail>, AppError> {
    let concert = state.catalog.get_by_id(ConcertId(id)).await?;
    Ok(Json(ConcertDetail { concert }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_means_unfiltered() {
        let filter = ConcertQuery {
            search: Some("  tulus ".into()),
            status: Some("all".into()),
            city: Some("all".into()),
        }
        .into_filter()
        .unwrap();

        assert_eq!(filter.search, "tulus");
        assert_eq!(filter.status, None);
        assert_eq!(filter.city, None);
    }

    #[test]
    fn test_status_values() {
        let filter = ConcertQuery {
            status: Some("sold-out".into()),
            city: Some("Bali".into()),
            ..Default::default()
        }
        .into_filter()
        .unwrap();
        assert_eq!(filter.status, Some(ConcertStatus::SoldOut));
        assert_eq!(filter.city.as_deref(), Some("Bali"));

        assert!(ConcertQuery {
            status: Some("cancelled".into()),
            ..Default::default()
        }
        .into_filter()
        .is_err());
    }
}
