use crate::entities::{customer, order, order_item};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

/// Transport seam for the external notification collaborator.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), MailerError>;
}

#[derive(Debug, thiserror::Error)]
#[error("mail delivery failed: {0}")]
pub struct MailerError(pub String);

/// Default mailer: records the message in the application log. Production
/// deployments swap in a real transport behind the same trait.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), MailerError> {
        info!(to, subject, body_len = body.len(), "outbound notification");
        Ok(())
    }
}

/// Fire-and-forget order summaries for customer and admin. Every failure is
/// logged and swallowed: notification delivery must never affect order state.
pub struct NotificationService {
    mailer: Arc<dyn Mailer>,
    admin_email: Option<String>,
}

impl NotificationService {
    pub fn new(mailer: Arc<dyn Mailer>, admin_email: Option<String>) -> Self {
        Self {
            mailer,
            admin_email,
        }
    }

    pub async fn order_placed(
        &self,
        order: &order::Model,
        items: &[order_item::Model],
        customer: &customer::Model,
    ) {
        let subject = format!("Farmgate Order #{}", order.id);
        let body = order_summary(order, items, customer);

        if !customer.email.is_empty() {
            if let Err(err) = self.mailer.send(&customer.email, &subject, &body).await {
                warn!(order_id = order.id, "customer notification failed: {}", err);
            }
        }

        if let Some(admin_email) = &self.admin_email {
            let admin_subject = format!("[Admin] {}", subject);
            if let Err(err) = self.mailer.send(admin_email, &admin_subject, &body).await {
                warn!(order_id = order.id, "admin notification failed: {}", err);
            }
        }
    }
}

fn order_summary(
    order: &order::Model,
    items: &[order_item::Model],
    customer: &customer::Model,
) -> String {
    let items_text = if items.is_empty() {
        "- None".to_string()
    } else {
        items
            .iter()
            .map(|item| format!("- {} x{} @ ₦{}", item.product_name, item.quantity, item.unit_price))
            .collect::<Vec<_>>()
            .join("\n")
    };

    let customer_name = if order.full_name.is_empty() {
        customer.email.as_str()
    } else {
        order.full_name.as_str()
    };

    format!(
        "Order ID: {}\n\
         Customer: {}\n\
         Email: {}\n\
         Phone: {}\n\
         Delivery Method: {}\n\
         Address: {}\n\
         Payment Method: {}\n\
         Status: {}\n\
         Total: ₦{}\n\
         Items:\n{}\n",
        order.id,
        customer_name,
        customer.email,
        if order.phone.is_empty() { "-" } else { &order.phone },
        order.delivery_method.label(),
        if order.delivery_address.is_empty() {
            "-"
        } else {
            &order.delivery_address
        },
        order.payment_method.label(),
        order.status.label(),
        order.total_amount,
        items_text
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{
        customer::CustomerRole,
        order::{DeliveryMethod, OrderStatus, PaymentMethod},
    };
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn sample_order() -> (order::Model, Vec<order_item::Model>, customer::Model) {
        let order = order::Model {
            id: 11,
            customer_id: 3,
            full_name: "Amina Bello".into(),
            phone: "0801 234 5678".into(),
            delivery_method: DeliveryMethod::Pickup,
            payment_method: PaymentMethod::PayOnDelivery,
            delivery_address: String::new(),
            total_amount: dec!(2000.00),
            status: OrderStatus::AwaitingPayment,
            payment_reference: "ref123".into(),
            payment_verified_at: None,
            stock_deducted: false,
            created_at: Utc::now(),
        };
        let items = vec![order_item::Model {
            id: 1,
            order_id: 11,
            product_id: 5,
            product_name: "Broiler Chicken".into(),
            quantity: 2,
            unit_price: dec!(1000.00),
        }];
        let customer = customer::Model {
            id: 3,
            email: "amina@example.com".into(),
            full_name: "Amina Bello".into(),
            phone: "0801 234 5678".into(),
            role: CustomerRole::Customer,
            created_at: Utc::now(),
        };
        (order, items, customer)
    }

    #[test]
    fn summary_lists_items_and_totals() {
        let (order, items, customer) = sample_order();
        let body = order_summary(&order, &items, &customer);

        assert!(body.contains("Order ID: 11"));
        assert!(body.contains("- Broiler Chicken x2 @ ₦1000.00"));
        assert!(body.contains("Total: ₦2000.00"));
        assert!(body.contains("Delivery Method: Farm Pickup"));
        assert!(body.contains("Payment Method: Pay on Delivery"));
    }

    #[test]
    fn summary_renders_placeholders_for_missing_fields() {
        let (mut order, _, customer) = sample_order();
        order.phone = String::new();
        order.delivery_address = String::new();
        let body = order_summary(&order, &[], &customer);

        assert!(body.contains("Phone: -"));
        assert!(body.contains("Address: -"));
        assert!(body.contains("- None"));
    }
}
