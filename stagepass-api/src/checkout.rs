use axum::{extract::State, routing::post, Json, Router};
use serde::Serialize;
use stagepass_order::{CheckoutReceipt, CheckoutState};
use stagepass_shared::CustomerInfo;

use crate::{error::AppError, state::AppState};

#[derive(Serialize)]
struct ReceiptResponse {
    receipt: CheckoutReceipt,
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/checkout", post(run_checkout).get(checkout_state))
}

async fn run_checkout(
    State(state): State<AppState>,
    Json(info): Json<CustomerInfo>,
) -> Result<Json<ReceiptResponse>, AppError> {
    let receipt = state.checkout.checkout(&info).await?;
    Ok(Json(ReceiptResponse { receipt }))
}

async fn checkout_state(State(state): State<AppState>) -> Json<CheckoutState> {
    Json(state.checkout.state())
}
