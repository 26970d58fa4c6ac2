pub mod app_config;
pub mod booking_client;
pub mod credential_file;
pub mod http;
pub mod identity_client;
pub mod payment_client;

pub use app_config::Config;
pub use booking_client::HttpBookingService;
pub use credential_file::FileCredentialStore;
pub use identity_client::HttpIdentityService;
pub use payment_client::HttpPaymentGateway;
