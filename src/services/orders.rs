use crate::{
    entities::{
        customer,
        order::{self, DeliveryMethod, OrderStatus, PaymentMethod},
        order_item, Customer, Order, OrderItem,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::{
        cart::CartService,
        notifications::NotificationService,
        paystack::{to_minor_units, InitializeRequest, PaymentSessionMetadata, PaystackClient},
        stock::StockDeduction,
    },
};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

/// Builds orders out of carts and owns order lifecycle operations.
///
/// Checkout snapshots quantity and price into order items and computes the
/// total server-side; client-submitted prices never enter an order. The cart
/// is cleared only after the order row is durably committed.
#[derive(Clone)]
pub struct OrderService {
    db: Arc<DatabaseConnection>,
    event_sender: EventSender,
    cart: Arc<CartService>,
    paystack: Arc<PaystackClient>,
    notifications: Arc<NotificationService>,
    stock: Arc<StockDeduction>,
    callback_url: String,
}

/// Checkout form fields, snapshotted onto the order.
#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutInput {
    pub full_name: Option<String>,
    pub phone: Option<String>,
    pub delivery_method: DeliveryMethod,
    pub payment_method: PaymentMethod,
    pub delivery_address: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct OrderWithItems {
    pub order: order::Model,
    pub items: Vec<order_item::Model>,
}

#[derive(Debug, Serialize)]
pub struct PlacedOrder {
    pub order: order::Model,
    pub items: Vec<order_item::Model>,
    /// Present for gateway payments: where to send the customer next
    pub authorization_url: Option<String>,
}

impl OrderService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: EventSender,
        cart: Arc<CartService>,
        paystack: Arc<PaystackClient>,
        notifications: Arc<NotificationService>,
        stock: Arc<StockDeduction>,
        callback_url: String,
    ) -> Self {
        Self {
            db,
            event_sender,
            cart,
            paystack,
            notifications,
            stock,
            callback_url,
        }
    }

    async fn get_customer(&self, customer_id: i64) -> Result<customer::Model, ServiceError> {
        Customer::find_by_id(customer_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Customer {} not found", customer_id)))
    }

    /// Converts the session cart into a persisted order.
    ///
    /// Re-checks every line against current stock first; a line that lost a
    /// race with another shopper clamps the cart and aborts with
    /// `InsufficientStock` — no order is created. For gateway payments the
    /// hosted session is initiated after commit, so a gateway outage leaves a
    /// retryable `Pending` order rather than corrupting anything.
    #[instrument(skip(self, input))]
    pub async fn place_order(
        &self,
        customer_id: i64,
        session_key: &str,
        input: CheckoutInput,
    ) -> Result<PlacedOrder, ServiceError> {
        let customer = self.get_customer(customer_id).await?;

        let snapshot = self.cart.snapshot(session_key).await?;
        if snapshot.lines.is_empty() {
            return Err(ServiceError::ValidationError(
                "Your cart is empty".to_string(),
            ));
        }

        for line in &snapshot.lines {
            if line.quantity > line.product.stock {
                self.cart
                    .clamp_line(session_key, line.product.id, line.product.stock)
                    .await?;
                return Err(ServiceError::InsufficientStock(format!(
                    "{} stock reduced. Please review your cart.",
                    line.product.name
                )));
            }
        }

        if input.payment_method == PaymentMethod::PayOnDelivery
            && input.delivery_method != DeliveryMethod::Pickup
        {
            return Err(ServiceError::ValidationError(
                "Pay on delivery is only available for farm pickup".to_string(),
            ));
        }

        let full_name = input
            .full_name
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| {
                if customer.full_name.is_empty() {
                    customer.email.clone()
                } else {
                    customer.full_name.clone()
                }
            });
        let phone = input
            .phone
            .filter(|phone| !phone.trim().is_empty())
            .unwrap_or_else(|| customer.phone.clone());

        let reference = Uuid::new_v4().simple().to_string();
        let status = match input.payment_method {
            PaymentMethod::PayOnDelivery => OrderStatus::AwaitingPayment,
            PaymentMethod::Paystack => OrderStatus::Pending,
        };

        let txn = self.db.begin().await?;

        let order = order::ActiveModel {
            customer_id: Set(customer.id),
            full_name: Set(full_name),
            phone: Set(phone),
            delivery_method: Set(input.delivery_method),
            payment_method: Set(input.payment_method),
            delivery_address: Set(input.delivery_address.unwrap_or_default()),
            total_amount: Set(snapshot.total),
            status: Set(status),
            payment_reference: Set(reference),
            payment_verified_at: Set(None),
            stock_deducted: Set(false),
            created_at: Set(Utc::now()),
            ..Default::default()
        };
        let order = order.insert(&txn).await?;

        let mut items = Vec::with_capacity(snapshot.lines.len());
        for line in &snapshot.lines {
            let item = order_item::ActiveModel {
                order_id: Set(order.id),
                product_id: Set(line.product.id),
                product_name: Set(line.product.name.clone()),
                quantity: Set(line.quantity),
                unit_price: Set(line.product.price),
                ..Default::default()
            };
            items.push(item.insert(&txn).await?);
        }

        txn.commit().await?;

        self.cart.clear(session_key).await?;
        self.event_sender
            .send_or_log(Event::OrderPlaced(order.id))
            .await;

        // Best-effort; a notification failure must never roll back the order.
        {
            let notifications = self.notifications.clone();
            let order = order.clone();
            let items = items.clone();
            let customer = customer.clone();
            tokio::spawn(async move {
                notifications.order_placed(&order, &items, &customer).await;
            });
        }

        info!(
            "Placed order {} for customer {} (total ₦{}, {:?})",
            order.id, customer.id, order.total_amount, order.payment_method
        );

        let authorization_url = match order.payment_method {
            PaymentMethod::PayOnDelivery => None,
            PaymentMethod::Paystack => Some(self.initiate_payment(&customer, &order).await?),
        };

        Ok(PlacedOrder {
            order,
            items,
            authorization_url,
        })
    }

    /// Re-initiates the hosted payment session for an own, still-pending
    /// gateway order, reusing the order's reference as the idempotency key.
    #[instrument(skip(self))]
    pub async fn retry_payment(
        &self,
        customer_id: i64,
        order_id: i64,
    ) -> Result<String, ServiceError> {
        let order = Order::find_by_id(order_id)
            .filter(order::Column::CustomerId.eq(customer_id))
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        if order.payment_method != PaymentMethod::Paystack {
            return Err(ServiceError::InvalidOperation(
                "order is not paid through the gateway".to_string(),
            ));
        }
        if order.status != OrderStatus::Pending {
            return Err(ServiceError::InvalidOperation(
                "order is not awaiting gateway payment".to_string(),
            ));
        }

        let customer = self.get_customer(customer_id).await?;
        self.initiate_payment(&customer, &order).await
    }

    async fn initiate_payment(
        &self,
        customer: &customer::Model,
        order: &order::Model,
    ) -> Result<String, ServiceError> {
        let amount = to_minor_units(order.total_amount).ok_or_else(|| {
            ServiceError::InternalError("order total exceeds representable amount".to_string())
        })?;

        let request = InitializeRequest {
            email: customer.email.clone(),
            amount,
            reference: order.payment_reference.clone(),
            callback_url: self.callback_url.clone(),
            metadata: PaymentSessionMetadata {
                order_id: order.id,
                user_id: customer.id,
            },
        };

        Ok(self.paystack.initialize(&request).await?)
    }

    async fn items_for(&self, order_id: i64) -> Result<Vec<order_item::Model>, ServiceError> {
        Ok(OrderItem::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .order_by_asc(order_item::Column::Id)
            .all(&*self.db)
            .await?)
    }

    /// Customer-facing order history, newest first.
    pub async fn history(&self, customer_id: i64) -> Result<Vec<OrderWithItems>, ServiceError> {
        let orders = Order::find()
            .filter(order::Column::CustomerId.eq(customer_id))
            .order_by_desc(order::Column::CreatedAt)
            .all(&*self.db)
            .await?;

        let mut result = Vec::with_capacity(orders.len());
        for order in orders {
            let items = self.items_for(order.id).await?;
            result.push(OrderWithItems { order, items });
        }
        Ok(result)
    }

    /// Admin listing with pagination, newest first.
    pub async fn list_orders(
        &self,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<OrderWithItems>, u64), ServiceError> {
        let paginator = Order::find()
            .order_by_desc(order::Column::CreatedAt)
            .paginate(&*self.db, per_page.max(1));

        let total = paginator.num_items().await?;
        let orders = paginator.fetch_page(page.saturating_sub(1)).await?;

        let mut result = Vec::with_capacity(orders.len());
        for order in orders {
            let items = self.items_for(order.id).await?;
            result.push(OrderWithItems { order, items });
        }
        Ok((result, total))
    }

    pub async fn get_order(&self, order_id: i64) -> Result<OrderWithItems, ServiceError> {
        let order = Order::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;
        let items = self.items_for(order.id).await?;
        Ok(OrderWithItems { order, items })
    }

    pub async fn count_orders(&self) -> Result<u64, ServiceError> {
        Ok(Order::find().count(&*self.db).await?)
    }

    pub async fn count_orders_with_status(&self, status: OrderStatus) -> Result<u64, ServiceError> {
        Ok(Order::find()
            .filter(order::Column::Status.eq(status))
            .count(&*self.db)
            .await?)
    }

    /// Manual status transition from the admin surface. Marking an order
    /// `Completed` runs the (idempotent) stock deduction, exactly like the
    /// reconciliation paths.
    #[instrument(skip(self))]
    pub async fn set_status(
        &self,
        order_id: i64,
        new_status: OrderStatus,
    ) -> Result<order::Model, ServiceError> {
        let order = Order::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        if order.status == new_status {
            if new_status == OrderStatus::Completed {
                self.stock.deduct_for_order(order.id).await?;
            }
            return Ok(order);
        }

        let allowed = matches!(
            (order.status, new_status),
            (
                OrderStatus::Pending,
                OrderStatus::Completed | OrderStatus::Failed | OrderStatus::Cancelled
            ) | (
                OrderStatus::AwaitingPayment,
                OrderStatus::Completed | OrderStatus::Cancelled
            )
        );
        if !allowed {
            return Err(ServiceError::InvalidOperation(format!(
                "cannot move order from {} to {}",
                order.status.label(),
                new_status.label()
            )));
        }

        let old_status = order.status;
        let mut active: order::ActiveModel = order.into();
        active.status = Set(new_status);
        let updated = active.update(&*self.db).await?;

        self.event_sender
            .send_or_log(Event::OrderStatusChanged {
                order_id: updated.id,
                old_status: old_status.label().to_string(),
                new_status: new_status.label().to_string(),
            })
            .await;

        if new_status == OrderStatus::Completed {
            self.stock.deduct_for_order(updated.id).await?;
            self.event_sender
                .send_or_log(Event::OrderCompleted(updated.id))
                .await;
        }

        info!(
            "Order {} moved {} -> {}",
            updated.id,
            old_status.label(),
            new_status.label()
        );
        Ok(updated)
    }
}
