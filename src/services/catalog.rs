use crate::{
    entities::{
        product::{self, ProductCategory},
        Product,
    },
    errors::ServiceError,
    events::{Event, EventSender},
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, Set,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, instrument};

/// Read-mostly product catalog. Owns stock-quantity truth: the only writers
/// are staff edits and [`CatalogService::decrement_stock`].
#[derive(Clone)]
pub struct CatalogService {
    db: Arc<DatabaseConnection>,
    event_sender: EventSender,
}

impl CatalogService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: EventSender) -> Self {
        Self { db, event_sender }
    }

    /// Storefront listing: live products only, optionally filtered by category.
    pub async fn list_products(
        &self,
        category: Option<ProductCategory>,
    ) -> Result<Vec<product::Model>, ServiceError> {
        let mut query = Product::find().filter(product::Column::Archived.eq(false));
        if let Some(category) = category {
            query = query.filter(product::Column::Category.eq(category));
        }
        Ok(query.order_by_asc(product::Column::Name).all(&*self.db).await?)
    }

    /// Admin listing: every product, archived included.
    pub async fn list_all_products(&self) -> Result<Vec<product::Model>, ServiceError> {
        Ok(Product::find()
            .order_by_asc(product::Column::Name)
            .all(&*self.db)
            .await?)
    }

    pub async fn get_product(&self, id: i64) -> Result<product::Model, ServiceError> {
        Product::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", id)))
    }

    /// Storefront lookup: archived products are indistinguishable from absent
    /// ones.
    pub async fn get_active_product(&self, id: i64) -> Result<product::Model, ServiceError> {
        let product = self.get_product(id).await?;
        if product.archived {
            return Err(ServiceError::NotFound(format!("Product {} not found", id)));
        }
        Ok(product)
    }

    pub async fn count_products(&self) -> Result<u64, ServiceError> {
        Ok(Product::find().count(&*self.db).await?)
    }

    #[instrument(skip(self))]
    pub async fn create_product(
        &self,
        input: CreateProductInput,
    ) -> Result<product::Model, ServiceError> {
        if input.price < Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "price must not be negative".to_string(),
            ));
        }
        if input.stock < 0 {
            return Err(ServiceError::ValidationError(
                "stock must not be negative".to_string(),
            ));
        }

        let now = Utc::now();
        let product = product::ActiveModel {
            name: Set(input.name),
            category: Set(input.category),
            price: Set(input.price),
            stock: Set(input.stock),
            description: Set(input.description.unwrap_or_default()),
            image_url: Set(input.image_url),
            archived: Set(false),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        };

        let product = product.insert(&*self.db).await?;
        self.event_sender
            .send_or_log(Event::ProductCreated(product.id))
            .await;

        info!("Created product {}: {}", product.id, product.name);
        Ok(product)
    }

    #[instrument(skip(self))]
    pub async fn update_product(
        &self,
        id: i64,
        input: UpdateProductInput,
    ) -> Result<product::Model, ServiceError> {
        let product = self.get_product(id).await?;

        let mut active: product::ActiveModel = product.into();
        if let Some(name) = input.name {
            active.name = Set(name);
        }
        if let Some(category) = input.category {
            active.category = Set(category);
        }
        if let Some(price) = input.price {
            if price < Decimal::ZERO {
                return Err(ServiceError::ValidationError(
                    "price must not be negative".to_string(),
                ));
            }
            active.price = Set(price);
        }
        if let Some(stock) = input.stock {
            if stock < 0 {
                return Err(ServiceError::ValidationError(
                    "stock must not be negative".to_string(),
                ));
            }
            active.stock = Set(stock);
        }
        if let Some(description) = input.description {
            active.description = Set(description);
        }
        if let Some(image_url) = input.image_url {
            active.image_url = Set(Some(image_url));
        }
        active.updated_at = Set(Utc::now());

        let updated = active.update(&*self.db).await?;
        self.event_sender
            .send_or_log(Event::ProductUpdated(updated.id))
            .await;

        Ok(updated)
    }

    /// Soft delete. Historical order items keep their snapshots; the product
    /// simply stops being sellable.
    #[instrument(skip(self))]
    pub async fn archive_product(&self, id: i64) -> Result<product::Model, ServiceError> {
        let product = self.get_product(id).await?;

        let mut active: product::ActiveModel = product.into();
        active.archived = Set(true);
        active.updated_at = Set(Utc::now());

        let archived = active.update(&*self.db).await?;
        self.event_sender
            .send_or_log(Event::ProductArchived(archived.id))
            .await;

        info!("Archived product {}", archived.id);
        Ok(archived)
    }

    /// Atomically decrements stock, floored at zero. Implemented as a
    /// compare-and-swap conditional update so concurrent deductions can never
    /// drive stock negative or lose a write; a failed swap means another
    /// writer advanced the row, so re-read and retry.
    #[instrument(skip(self))]
    pub async fn decrement_stock(
        &self,
        product_id: i64,
        quantity: i32,
    ) -> Result<i32, ServiceError> {
        loop {
            let product = Product::find_by_id(product_id)
                .one(&*self.db)
                .await?
                .ok_or_else(|| {
                    ServiceError::NotFound(format!("Product {} not found", product_id))
                })?;

            let new_stock = (product.stock - quantity).max(0);

            let result = Product::update_many()
                .col_expr(product::Column::Stock, Expr::value(new_stock))
                .col_expr(product::Column::UpdatedAt, Expr::value(Utc::now()))
                .filter(product::Column::Id.eq(product_id))
                .filter(product::Column::Stock.eq(product.stock))
                .exec(&*self.db)
                .await?;

            if result.rows_affected == 1 {
                return Ok(new_stock);
            }
        }
    }
}

/// Input for creating a product
#[derive(Debug, Deserialize)]
pub struct CreateProductInput {
    pub name: String,
    pub category: ProductCategory,
    pub price: Decimal,
    pub stock: i32,
    pub description: Option<String>,
    pub image_url: Option<String>,
}

/// Input for updating a product; absent fields are left unchanged
#[derive(Debug, Deserialize, Default)]
pub struct UpdateProductInput {
    pub name: Option<String>,
    pub category: Option<ProductCategory>,
    pub price: Option<Decimal>,
    pub stock: Option<i32>,
    pub description: Option<String>,
    pub image_url: Option<String>,
}
