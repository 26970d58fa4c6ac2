pub mod models;
pub mod money;
pub mod pii;

pub use models::booking::{BookingCreated, BookingId, BookingKey, BookingStatus, CartLine, NewBooking, PendingBooking};
pub use models::catalog::{Concert, ConcertFilter, ConcertId, ConcertStatus, TicketType, TicketTypeId};
pub use models::events::StorefrontEvent;
pub use models::user::{CustomerInfo, User, UserId};
pub use money::Money;
pub use pii::Masked;
