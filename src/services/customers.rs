use crate::{
    entities::{customer, customer::CustomerRole, order, Customer, Order},
    errors::ServiceError,
};
use rust_decimal::Decimal;
use sea_orm::{
    ColumnTrait, Condition, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder,
};
use serde::Serialize;
use std::sync::Arc;

/// Read-side customer directory for the admin surface. Account lifecycle is
/// owned by the external auth collaborator.
#[derive(Clone)]
pub struct CustomerService {
    db: Arc<DatabaseConnection>,
}

#[derive(Debug, Serialize)]
pub struct CustomerSummary {
    #[serde(flatten)]
    pub customer: customer::Model,
    pub total_orders: u64,
}

#[derive(Debug, Serialize)]
pub struct CustomerDetail {
    pub customer: customer::Model,
    pub total_orders: u64,
    pub total_spent: Decimal,
}

impl CustomerService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    pub async fn get_customer(&self, id: i64) -> Result<customer::Model, ServiceError> {
        Customer::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Customer {} not found", id)))
    }

    /// Customer listing with optional name/email search, newest first.
    pub async fn list_customers(
        &self,
        search: Option<&str>,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<CustomerSummary>, u64), ServiceError> {
        let mut query = Customer::find().filter(customer::Column::Role.eq(CustomerRole::Customer));

        if let Some(term) = search.map(str::trim).filter(|t| !t.is_empty()) {
            let pattern = format!("%{}%", term);
            query = query.filter(
                Condition::any()
                    .add(customer::Column::Email.like(pattern.clone()))
                    .add(customer::Column::FullName.like(pattern)),
            );
        }

        let paginator = query
            .order_by_desc(customer::Column::CreatedAt)
            .paginate(&*self.db, per_page.max(1));

        let total = paginator.num_items().await?;
        let customers = paginator.fetch_page(page.saturating_sub(1)).await?;

        let mut summaries = Vec::with_capacity(customers.len());
        for customer in customers {
            let total_orders = Order::find()
                .filter(order::Column::CustomerId.eq(customer.id))
                .count(&*self.db)
                .await?;
            summaries.push(CustomerSummary {
                customer,
                total_orders,
            });
        }

        Ok((summaries, total))
    }

    /// Single customer with order stats.
    pub async fn customer_detail(&self, id: i64) -> Result<CustomerDetail, ServiceError> {
        let customer = self.get_customer(id).await?;

        let orders = Order::find()
            .filter(order::Column::CustomerId.eq(customer.id))
            .all(&*self.db)
            .await?;
        let total_orders = orders.len() as u64;
        let total_spent: Decimal = orders.iter().map(|o| o.total_amount).sum();

        Ok(CustomerDetail {
            customer,
            total_orders,
            total_spent,
        })
    }
}
