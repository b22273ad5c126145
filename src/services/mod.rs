pub mod cart;
pub mod catalog;
pub mod customers;
pub mod notifications;
pub mod orders;
pub mod paystack;
pub mod reconciliation;
pub mod stock;

pub use cart::CartService;
pub use catalog::CatalogService;
pub use customers::CustomerService;
pub use notifications::{LogMailer, Mailer, NotificationService};
pub use orders::OrderService;
pub use paystack::PaystackClient;
pub use reconciliation::ReconciliationService;
pub use stock::StockDeduction;
