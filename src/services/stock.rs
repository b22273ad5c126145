use crate::{
    entities::{order, order_item, Order, OrderItem},
    errors::ServiceError,
    events::{Event, EventSender},
    services::catalog::CatalogService,
};
use sea_orm::{
    sea_query::Expr, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter,
};
use std::sync::Arc;
use tracing::{info, instrument};

/// Idempotent stock deduction for a completed order.
///
/// The order's `stock_deducted` flag is a one-shot: it is claimed with a
/// conditional update before any product row is touched, so the deduction
/// runs at most once no matter how many of the verify path, the webhook path
/// and the admin's manual completion invoke it, in-process or across
/// processes.
#[derive(Clone)]
pub struct StockDeduction {
    db: Arc<DatabaseConnection>,
    catalog: Arc<CatalogService>,
    event_sender: EventSender,
}

impl StockDeduction {
    pub fn new(
        db: Arc<DatabaseConnection>,
        catalog: Arc<CatalogService>,
        event_sender: EventSender,
    ) -> Self {
        Self {
            db,
            catalog,
            event_sender,
        }
    }

    /// Decrements catalog stock for every line of the order, floored at zero.
    /// Returns `true` when this call performed the deduction and `false` when
    /// the one-shot flag was already claimed.
    #[instrument(skip(self))]
    pub async fn deduct_for_order(&self, order_id: i64) -> Result<bool, ServiceError> {
        let claimed = Order::update_many()
            .col_expr(order::Column::StockDeducted, Expr::value(true))
            .filter(order::Column::Id.eq(order_id))
            .filter(order::Column::StockDeducted.eq(false))
            .exec(&*self.db)
            .await?
            .rows_affected
            == 1;

        if !claimed {
            return Ok(false);
        }

        let items = OrderItem::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .all(&*self.db)
            .await?;

        for item in &items {
            self.catalog
                .decrement_stock(item.product_id, item.quantity)
                .await?;
        }

        self.event_sender
            .send_or_log(Event::StockDeducted(order_id))
            .await;

        info!(
            "Deducted stock for order {} ({} line items)",
            order_id,
            items.len()
        );
        Ok(true)
    }
}
