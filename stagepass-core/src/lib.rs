pub mod identity;
pub mod payment;
pub mod repository;

use std::future::Future;
use std::time::Duration;

pub use identity::{Credential, CredentialStore, IdentityService, MemoryCredentialStore, Registration, Session, SessionTicket};
pub use payment::{PaymentGateway, PaymentOutcome, PaymentRequest, PaymentStatus};
pub use repository::{BookingService, CatalogSource};

/// Failure taxonomy shared by every service call the storefront makes
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoreError {
    #[error("Not authenticated: {0}")]
    Unauthenticated(String),
    #[error("Validation failed: {0}")]
    ValidationError(String),
    /// Business-rule rejection (4xx). `reason` is the server text, verbatim.
    #[error("{reason}")]
    Rejected { status: u16, reason: String },
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),
    #[error("Not found: {0}")]
    NotFound(String),
}

impl CoreError {
    /// Worth a manual retry by the user
    pub fn is_retryable(&self) -> bool {
        matches!(self, CoreError::ServiceUnavailable(_))
    }
}

pub type CoreResult<T> = Result<T, CoreError>;

/// Run a service call with an upper bound on its duration.
/// Expiry resolves to `ServiceUnavailable`.
pub async fn bounded<T, F>(limit: Duration, operation: &str, call: F) -> CoreResult<T>
where
    F: Future<Output = CoreResult<T>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!("{} timed out after {}ms", operation, limit.as_millis());
            Err(CoreError::ServiceUnavailable(format!(
                "{} timed out after {}ms",
                operation,
                limit.as_millis()
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_bounded_times_out() {
        let result: CoreResult<()> = bounded(Duration::from_secs(5), "pending bookings", async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        })
        .await;

        match result {
            Err(CoreError::ServiceUnavailable(msg)) => assert!(msg.contains("pending bookings")),
            other => panic!("expected timeout, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_bounded_passes_result_through() {
        let ok = bounded(Duration::from_secs(1), "noop", async { Ok(7) }).await;
        assert_eq!(ok, Ok(7));

        let rejected: CoreResult<()> = bounded(Duration::from_secs(1), "noop", async {
            Err(CoreError::Rejected { status: 409, reason: "sold out".into() })
        })
        .await;
        assert_eq!(rejected.unwrap_err().to_string(), "sold out");
    }
}
