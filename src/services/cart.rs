use crate::{
    entities::{cart, cart_item, product, Cart, CartItem},
    errors::ServiceError,
    events::{Event, EventSender},
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, ModelTrait,
    QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument};

/// Session-scoped cart store.
///
/// A cart is a plain mapping from product id to requested quantity, keyed by
/// the session-identity key. Quantities are clamped to current stock on every
/// write and totals are always recomputed from live catalog prices, so a cart
/// can never hold a stale price or an unfillable quantity at write time.
#[derive(Clone)]
pub struct CartService {
    db: Arc<DatabaseConnection>,
    event_sender: EventSender,
}

/// One priced cart line. Prices come from the catalog at read time.
#[derive(Debug, Clone, Serialize)]
pub struct CartLine {
    pub product: product::Model,
    pub quantity: i32,
    pub line_total: Decimal,
}

#[derive(Debug, Clone, Serialize)]
pub struct CartSnapshot {
    pub cart_id: i64,
    pub lines: Vec<CartLine>,
    pub total: Decimal,
}

/// Result of an add/update; `clamped` drives the "only N units available"
/// notice without failing the operation.
#[derive(Debug, Clone, Serialize)]
pub struct CartWriteOutcome {
    pub product_name: String,
    pub quantity: i32,
    pub clamped: bool,
    pub available_stock: i32,
}

impl CartService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: EventSender) -> Self {
        Self { db, event_sender }
    }

    async fn get_or_create<C: ConnectionTrait>(
        &self,
        conn: &C,
        session_key: &str,
    ) -> Result<cart::Model, ServiceError> {
        if let Some(existing) = Cart::find()
            .filter(cart::Column::SessionKey.eq(session_key))
            .one(conn)
            .await?
        {
            return Ok(existing);
        }

        let now = Utc::now();
        let cart = cart::ActiveModel {
            session_key: Set(session_key.to_string()),
            customer_id: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        };
        Ok(cart.insert(conn).await?)
    }

    /// Adds the requested quantity to the session's line for the product,
    /// clamping the resulting quantity to current stock. Refuses outright
    /// when the product has no stock at all.
    #[instrument(skip(self))]
    pub async fn add_item(
        &self,
        session_key: &str,
        product_id: i64,
        requested: i32,
    ) -> Result<CartWriteOutcome, ServiceError> {
        let txn = self.db.begin().await?;

        let product = product::Entity::find_by_id(product_id)
            .filter(product::Column::Archived.eq(false))
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", product_id)))?;

        if product.stock <= 0 {
            return Err(ServiceError::InsufficientStock(format!(
                "{} is out of stock",
                product.name
            )));
        }

        let cart = self.get_or_create(&txn, session_key).await?;

        let existing = CartItem::find()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .filter(cart_item::Column::ProductId.eq(product_id))
            .one(&txn)
            .await?;

        let current = existing.as_ref().map(|item| item.quantity).unwrap_or(0);
        let wanted = current + requested.max(1);
        let quantity = wanted.min(product.stock);

        match existing {
            Some(item) => {
                let mut item: cart_item::ActiveModel = item.into();
                item.quantity = Set(quantity);
                item.updated_at = Set(Utc::now());
                item.update(&txn).await?;
            }
            None => {
                let now = Utc::now();
                let item = cart_item::ActiveModel {
                    cart_id: Set(cart.id),
                    product_id: Set(product_id),
                    quantity: Set(quantity),
                    created_at: Set(now),
                    updated_at: Set(now),
                    ..Default::default()
                };
                item.insert(&txn).await?;
            }
        }

        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::CartItemAdded {
                cart_id: cart.id,
                product_id,
            })
            .await;

        info!(
            "Added to cart {}: product {} x{} (clamped: {})",
            cart.id,
            product_id,
            quantity,
            quantity != wanted
        );
        Ok(CartWriteOutcome {
            product_name: product.name,
            quantity,
            clamped: quantity != wanted,
            available_stock: product.stock,
        })
    }

    /// Sets a line's quantity. A quantity of zero or less removes the line;
    /// positive quantities are clamped to current stock. A line whose product
    /// has gone out of stock is removed.
    #[instrument(skip(self))]
    pub async fn update_item(
        &self,
        session_key: &str,
        product_id: i64,
        quantity: i32,
    ) -> Result<Option<CartWriteOutcome>, ServiceError> {
        if quantity <= 0 {
            self.remove_item(session_key, product_id).await?;
            return Ok(None);
        }

        let txn = self.db.begin().await?;

        let product = product::Entity::find_by_id(product_id)
            .filter(product::Column::Archived.eq(false))
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", product_id)))?;

        let cart = self.get_or_create(&txn, session_key).await?;

        if product.stock <= 0 {
            CartItem::delete_many()
                .filter(cart_item::Column::CartId.eq(cart.id))
                .filter(cart_item::Column::ProductId.eq(product_id))
                .exec(&txn)
                .await?;
            txn.commit().await?;
            return Err(ServiceError::InsufficientStock(format!(
                "{} is out of stock",
                product.name
            )));
        }

        let clamped_quantity = quantity.min(product.stock);

        let existing = CartItem::find()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .filter(cart_item::Column::ProductId.eq(product_id))
            .one(&txn)
            .await?;

        match existing {
            Some(item) => {
                let mut item: cart_item::ActiveModel = item.into();
                item.quantity = Set(clamped_quantity);
                item.updated_at = Set(Utc::now());
                item.update(&txn).await?;
            }
            None => {
                let now = Utc::now();
                let item = cart_item::ActiveModel {
                    cart_id: Set(cart.id),
                    product_id: Set(product_id),
                    quantity: Set(clamped_quantity),
                    created_at: Set(now),
                    updated_at: Set(now),
                    ..Default::default()
                };
                item.insert(&txn).await?;
            }
        }

        txn.commit().await?;

        Ok(Some(CartWriteOutcome {
            product_name: product.name,
            quantity: clamped_quantity,
            clamped: clamped_quantity != quantity,
            available_stock: product.stock,
        }))
    }

    #[instrument(skip(self))]
    pub async fn remove_item(
        &self,
        session_key: &str,
        product_id: i64,
    ) -> Result<(), ServiceError> {
        let cart = self.get_or_create(&*self.db, session_key).await?;

        CartItem::delete_many()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .filter(cart_item::Column::ProductId.eq(product_id))
            .exec(&*self.db)
            .await?;

        self.event_sender
            .send_or_log(Event::CartItemRemoved {
                cart_id: cart.id,
                product_id,
            })
            .await;

        Ok(())
    }

    /// Prices the cart against the live catalog. Lines whose product has been
    /// archived since they were added are silently dropped from the view —
    /// checkout re-validates anyway.
    pub async fn snapshot(&self, session_key: &str) -> Result<CartSnapshot, ServiceError> {
        let cart = self.get_or_create(&*self.db, session_key).await?;

        let items = cart
            .find_related(CartItem)
            .order_by_asc(cart_item::Column::Id)
            .all(&*self.db)
            .await?;

        let mut lines = Vec::with_capacity(items.len());
        let mut total = Decimal::ZERO;
        for item in items {
            let Some(product) = product::Entity::find_by_id(item.product_id)
                .filter(product::Column::Archived.eq(false))
                .one(&*self.db)
                .await?
            else {
                continue;
            };
            let line_total = product.price * Decimal::from(item.quantity);
            total += line_total;
            lines.push(CartLine {
                product,
                quantity: item.quantity,
                line_total,
            });
        }

        Ok(CartSnapshot {
            cart_id: cart.id,
            lines,
            total,
        })
    }

    /// Overwrites a line's quantity without stock inspection. Used by the
    /// order builder to clamp the cart after losing a stock race.
    pub async fn clamp_line(
        &self,
        session_key: &str,
        product_id: i64,
        quantity: i32,
    ) -> Result<(), ServiceError> {
        let cart = self.get_or_create(&*self.db, session_key).await?;

        if quantity <= 0 {
            CartItem::delete_many()
                .filter(cart_item::Column::CartId.eq(cart.id))
                .filter(cart_item::Column::ProductId.eq(product_id))
                .exec(&*self.db)
                .await?;
            return Ok(());
        }

        if let Some(item) = CartItem::find()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .filter(cart_item::Column::ProductId.eq(product_id))
            .one(&*self.db)
            .await?
        {
            let mut item: cart_item::ActiveModel = item.into();
            item.quantity = Set(quantity);
            item.updated_at = Set(Utc::now());
            item.update(&*self.db).await?;
        }

        Ok(())
    }

    /// Associates the cart with an authenticated customer.
    pub async fn attach_customer(
        &self,
        session_key: &str,
        customer_id: i64,
    ) -> Result<(), ServiceError> {
        let cart = self.get_or_create(&*self.db, session_key).await?;
        if cart.customer_id == Some(customer_id) {
            return Ok(());
        }

        let mut active: cart::ActiveModel = cart.into();
        active.customer_id = Set(Some(customer_id));
        active.updated_at = Set(Utc::now());
        active.update(&*self.db).await?;
        Ok(())
    }

    /// Empties the cart. Called after successful order placement and as a
    /// best-effort cleanup when a verified payment lands.
    #[instrument(skip(self))]
    pub async fn clear(&self, session_key: &str) -> Result<(), ServiceError> {
        let cart = self.get_or_create(&*self.db, session_key).await?;

        CartItem::delete_many()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .exec(&*self.db)
            .await?;

        self.event_sender.send_or_log(Event::CartCleared(cart.id)).await;
        info!("Cleared cart {}", cart.id);
        Ok(())
    }
}
