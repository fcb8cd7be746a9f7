pub mod booking;
pub mod item;
pub mod transaction;

pub use booking::{Booking, BookingStatus, BookingWindow, PartyRating};
pub use item::ItemListing;
pub use transaction::{
    LedgerEntry, LedgerMetadata, LedgerWrite, PaymentSource, TransactionStatus, BOOKING_PAYMENT,
    DEFAULT_CURRENCY, GATEWAY_NAME,
};
