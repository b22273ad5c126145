use crate::{
    config::AppConfig,
    db::DbPool,
    errors::ServiceError,
    events::EventSender,
    services::{
        CartService, CatalogService, CustomerService, LogMailer, NotificationService,
        OrderService, PaystackClient, ReconciliationService, StockDeduction,
    },
};
use std::sync::Arc;

pub mod admin;
pub mod carts;
pub mod checkout;
pub mod common;
pub mod orders;
pub mod payments;
pub mod products;

/// Aggregate of the services HTTP handlers reach through [`crate::AppState`].
#[derive(Clone)]
pub struct AppServices {
    pub catalog: Arc<CatalogService>,
    pub cart: Arc<CartService>,
    pub orders: Arc<OrderService>,
    pub customers: Arc<CustomerService>,
    pub stock: Arc<StockDeduction>,
    pub paystack: Arc<PaystackClient>,
    pub reconciliation: Arc<ReconciliationService>,
    pub notifications: Arc<NotificationService>,
}

impl AppServices {
    /// Wires the service graph: catalog feeds cart, stock deduction and the
    /// order builder; the gateway client is shared by the order builder and
    /// the reconciliation engine.
    pub fn new(
        db: Arc<DbPool>,
        event_sender: EventSender,
        config: &AppConfig,
    ) -> Result<Self, ServiceError> {
        let catalog = Arc::new(CatalogService::new(db.clone(), event_sender.clone()));
        let cart = Arc::new(CartService::new(db.clone(), event_sender.clone()));
        let customers = Arc::new(CustomerService::new(db.clone()));
        let stock = Arc::new(StockDeduction::new(
            db.clone(),
            catalog.clone(),
            event_sender.clone(),
        ));
        let paystack = Arc::new(PaystackClient::new(&config.paystack)?);
        let notifications = Arc::new(NotificationService::new(
            Arc::new(LogMailer),
            config.admin_email.clone(),
        ));
        let orders = Arc::new(OrderService::new(
            db.clone(),
            event_sender.clone(),
            cart.clone(),
            paystack.clone(),
            notifications.clone(),
            stock.clone(),
            config.paystack.callback_url.clone(),
        ));
        let reconciliation = Arc::new(ReconciliationService::new(
            db,
            paystack.clone(),
            stock.clone(),
            event_sender,
        ));

        Ok(Self {
            catalog,
            cart,
            orders,
            customers,
            stock,
            paystack,
            reconciliation,
            notifications,
        })
    }
}
