use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use stagepass_catalog::validate_selection;
use stagepass_order::SyncState;
use stagepass_shared::money::{self, Money};
use stagepass_shared::{BookingKey, CartLine, ConcertId, PendingBooking, TicketTypeId};

use crate::{error::AppError, state::AppState};

#[derive(Debug, Deserialize)]
pub struct AddItemRequest {
    pub concert_id: ConcertId,
    pub ticket_type_id: TicketTypeId,
    pub quantity: u32,
}

#[derive(Debug, Serialize)]
struct LineView {
    concert_id: ConcertId,
    ticket_type_id: TicketTypeId,
    quantity: u32,
    #[serde(with = "money::decimal")]
    unit_price: Money,
    #[serde(with = "money::decimal")]
    line_total: Money,
    state: SyncState,
}

#[derive(Debug, Serialize)]
struct CartView {
    /// Server-confirmed bookings, one entry per concert and ticket type
    pending: Vec<PendingBooking>,
    #[serde(with = "money::decimal")]
    pending_total: Money,
    /// Selections still on their way to the booking service
    lines: Vec<LineView>,
    #[serde(with = "money::decimal")]
    cart_total: Money,
}

#[derive(Debug, Serialize)]
struct AddItemResponse {
    booking: PendingBooking,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/cart", get(view_cart))
        .route("/cart/items", post(add_item))
        .route("/cart/items/{concert_id}/{ticket_type_id}", delete(remove_item))
        .route("/cart/refresh", post(refresh_cart))
}

fn cart_view(state: &AppState) -> CartView {
    let lines = state
        .bookings
        .cart_lines()
        .into_iter()
        .map(|line: CartLine| LineView {
            concert_id: line.concert_id,
            ticket_type_id: line.ticket_type_id,
            quantity: line.quantity,
            unit_price: line.unit_price,
            line_total: line.line_total(),
            state: state.bookings.state_of(&line.key()),
        })
        .collect();

    CartView {
        pending: state.bookings.pending_lines(),
        pending_total: state.bookings.pending_total(),
        lines,
        cart_total: state.bookings.cart_total(),
    }
}

async fn view_cart(State(state): State<AppState>) -> Json<CartView> {
    Json(cart_view(&state))
}

async fn refresh_cart(State(state): State<AppState>) -> Result<Json<CartView>, AppError> {
    state.bookings.refresh().await?;
    Ok(Json(cart_view(&state)))
}

async fn add_item(
    State(state): State<AppState>,
    Json(req): Json<AddItemRequest>,
) -> Result<(StatusCode, Json<AddItemResponse>), AppError> {
    state.session.ticket().await?;

    let (concert, ticket_type) = state.catalog.ticket_type(req.concert_id, req.ticket_type_id).await?;
    let key = BookingKey::new(req.concert_id, req.ticket_type_id);
    validate_selection(&concert, &ticket_type, req.quantity, state.bookings.held_quantity(&key))?;

    let line = CartLine::new(req.concert_id, req.ticket_type_id, req.quantity, ticket_type.price);
    let booking = state.bookings.add_to_cart(line).await?;
    Ok((StatusCode::CREATED, Json(AddItemResponse { booking })))
}

async fn remove_item(
    State(state): State<AppState>,
    Path((concert_id, ticket_type_id)): Path<(i64, i64)>,
) -> Result<StatusCode, AppError> {
    let key = BookingKey::new(ConcertId(concert_id), TicketTypeId(ticket_type_id));
    state.bookings.remove_from_cart(key).await?;
    Ok(StatusCode::NO_CONTENT)
}
