use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use stagepass_core::Registration;
use stagepass_shared::{Masked, User};
use tracing::warn;

use crate::{error::AppError, state::AppState};

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: Masked<String>,
}

#[derive(Debug, Serialize)]
struct SessionResponse {
    user: User,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/auth/login", post(login))
        .route("/auth/register", post(register))
        .route("/auth/logout", post(logout))
        .route("/auth/me", get(me))
}

/// Pull the pending list for a freshly established session
pub async fn prime_pending(state: &AppState) {
    if let Err(err) = state.bookings.refresh().await {
        warn!("Could not load pending bookings for the new session: {}", err);
    }
}

async fn login(State(state): State<AppState>, Json(req): Json<LoginRequest>) -> Result<Json<SessionResponse>, AppError> {
    let user = state
        .session
        .login(state.identity.as_ref(), req.email.trim(), &req.password)
        .await?;
    state.checkout.reset();
    prime_pending(&state).await;
    Ok(Json(SessionResponse { user }))
}

async fn register(
    State(state): State<AppState>,
    Json(req): Json<Registration>,
) -> Result<(StatusCode, Json<SessionResponse>), AppError> {
    if req.email.trim().is_empty() || req.name.trim().is_empty() || req.password.expose().is_empty() {
        return Err(AppError::Validation("email, password and name are required".to_string()));
    }

    let user = state.session.register(state.identity.as_ref(), &req).await?;
    state.checkout.reset();
    prime_pending(&state).await;
    Ok((StatusCode::CREATED, Json(SessionResponse { user })))
}

async fn logout(State(state): State<AppState>) -> StatusCode {
    state.session.logout().await;
    state.bookings.clear();
    state.checkout.reset();
    StatusCode::NO_CONTENT
}

async fn me(State(state): State<AppState>) -> Result<Json<SessionResponse>, AppError> {
    let user = state
        .session
        .user()
        .await
        .ok_or_else(|| AppError::Unauthenticated("no active session".to_string()))?;
    Ok(Json(SessionResponse { user }))
}
