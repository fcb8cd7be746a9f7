pub mod bookings;
pub mod conflicts;
pub mod database;
pub mod lifecycle;
pub mod memory;
pub mod metrics;
pub mod payments;
pub mod pricing;
pub mod razorpay;
pub mod store;

pub use bookings::BookingService;
pub use database::PgBookingStore;
pub use memory::InMemoryBookingStore;
pub use metrics::{get_metrics, init_metrics};
pub use payments::{PaymentService, WebhookOutcome};
pub use razorpay::RazorpayClient;
pub use store::{BookingStore, ItemCatalog};
