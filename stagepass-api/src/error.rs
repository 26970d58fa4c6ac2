use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use stagepass_catalog::{CatalogError, SelectionError};
use stagepass_core::CoreError;
use stagepass_order::{CartError, CheckoutError, SyncError};

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    Unauthenticated(String),
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Unprocessable(String),
    #[error("{0}")]
    Rejected(String),
    #[error("{0}")]
    PaymentRejected(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    ServiceUnavailable(String),
    #[error("{0}")]
    Inconsistent(String),
}

impl AppError {
    fn kind(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::Unauthenticated(_) => (StatusCode::UNAUTHORIZED, "unauthenticated"),
            AppError::Validation(_) => (StatusCode::BAD_REQUEST, "validation_error"),
            AppError::Unprocessable(_) => (StatusCode::UNPROCESSABLE_ENTITY, "incomplete_customer_info"),
            AppError::Rejected(_) => (StatusCode::CONFLICT, "rejected"),
            AppError::PaymentRejected(_) => (StatusCode::PAYMENT_REQUIRED, "payment_rejected"),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            AppError::Conflict(_) => (StatusCode::CONFLICT, "conflict"),
            AppError::ServiceUnavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, "service_unavailable"),
            AppError::Inconsistent(_) => (StatusCode::INTERNAL_SERVER_ERROR, "inconsistent"),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, kind) = self.kind();
        if status.is_server_error() {
            tracing::error!("{} ({}): {}", status, kind, self);
        }

        let body = Json(json!({
            "error": kind,
            "message": self.to_string(),
        }));

        (status, body).into_response()
    }
}

impl From<CoreError> for AppError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Unauthenticated(msg) => AppError::Unauthenticated(msg),
            CoreError::ValidationError(msg) => AppError::Validation(msg),
            CoreError::Rejected { reason, .. } => AppError::Rejected(reason),
            CoreError::ServiceUnavailable(msg) => AppError::ServiceUnavailable(msg),
            CoreError::NotFound(msg) => AppError::NotFound(msg),
        }
    }
}

impl From<CatalogError> for AppError {
    fn from(err: CatalogError) -> Self {
        match err {
            CatalogError::Service(core) => core.into(),
            err @ CatalogError::UnknownTicketType { .. } => AppError::NotFound(err.to_string()),
            err @ CatalogError::Malformed(_) => AppError::ServiceUnavailable(err.to_string()),
        }
    }
}

impl From<SelectionError> for AppError {
    fn from(err: SelectionError) -> Self {
        AppError::Validation(err.to_string())
    }
}

impl From<CartError> for AppError {
    fn from(err: CartError) -> Self {
        AppError::Validation(err.to_string())
    }
}

impl From<SyncError> for AppError {
    fn from(err: SyncError) -> Self {
        match err {
            SyncError::Core(core) => core.into(),
            SyncError::Cart(cart) => cart.into(),
            err @ (SyncError::InFlight(_) | SyncError::SessionChanged) => AppError::Conflict(err.to_string()),
        }
    }
}

impl From<CheckoutError> for AppError {
    fn from(err: CheckoutError) -> Self {
        let message = err.to_string();
        match err {
            CheckoutError::IncompleteCustomerInfo(_) => AppError::Unprocessable(message),
            CheckoutError::NothingToCheckout => AppError::Validation(message),
            CheckoutError::AlreadyInProgress => AppError::Conflict(message),
            CheckoutError::Unauthenticated(_) => AppError::Unauthenticated(message),
            CheckoutError::PaymentRejected(reason) => AppError::PaymentRejected(reason),
            CheckoutError::ServiceUnavailable(_) => AppError::ServiceUnavailable(message),
            CheckoutError::Inconsistent { .. } => AppError::Inconsistent(message),
        }
    }
}
