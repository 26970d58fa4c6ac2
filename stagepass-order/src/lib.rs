pub mod cart;
pub mod mock;
pub mod orchestrator;
pub mod synchronizer;

pub use cart::{CartError, CartStore};
pub use orchestrator::{CheckoutError, CheckoutOrchestrator, CheckoutReceipt, CheckoutState};
pub use synchronizer::{BookingSynchronizer, SyncError, SyncState};
