use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Customer order. `total_amount` is computed from the line items at creation
/// and never changes afterwards; `status`, `payment_verified_at` and the
/// one-shot `stock_deducted` flag are the only fields mutated post-creation.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "orders")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub customer_id: i64,
    pub full_name: String,
    pub phone: String,
    pub delivery_method: DeliveryMethod,
    pub payment_method: PaymentMethod,
    #[sea_orm(column_type = "Text")]
    pub delivery_address: String,
    #[sea_orm(column_type = "Decimal(Some((10, 2)))")]
    pub total_amount: Decimal,
    pub status: OrderStatus,
    /// Opaque token correlating this order with a gateway transaction.
    #[sea_orm(unique)]
    pub payment_reference: String,
    #[sea_orm(nullable)]
    pub payment_verified_at: Option<DateTime<Utc>>,
    pub stock_deducted: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::order_item::Entity")]
    OrderItems,
    #[sea_orm(
        belongs_to = "super::customer::Entity",
        from = "Column::CustomerId",
        to = "super::customer::Column::Id"
    )]
    Customer,
}

impl Related<super::order_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::OrderItems.def()
    }
}

impl Related<super::customer::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Customer.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

/// Order status state machine:
/// `pending → {completed, failed, cancelled}`, `awaiting_payment →
/// {completed, cancelled}`. `completed`, `failed` and `cancelled` are
/// terminal.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumIter, DeriveActiveEnum, ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "awaiting_payment")]
    AwaitingPayment,
    #[sea_orm(string_value = "completed")]
    Completed,
    #[sea_orm(string_value = "failed")]
    Failed,
    #[sea_orm(string_value = "cancelled")]
    Cancelled,
}

impl OrderStatus {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::AwaitingPayment => "Awaiting Payment",
            Self::Completed => "Completed",
            Self::Failed => "Failed",
            Self::Cancelled => "Cancelled",
        }
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumIter, DeriveActiveEnum, ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "snake_case")]
pub enum DeliveryMethod {
    #[sea_orm(string_value = "delivery")]
    Delivery,
    #[sea_orm(string_value = "pickup")]
    Pickup,
}

impl DeliveryMethod {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Delivery => "Home Delivery",
            Self::Pickup => "Farm Pickup",
        }
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumIter, DeriveActiveEnum, ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    #[sea_orm(string_value = "paystack")]
    Paystack,
    #[sea_orm(string_value = "pay_on_delivery")]
    PayOnDelivery,
}

impl PaymentMethod {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Paystack => "Paystack",
            Self::PayOnDelivery => "Pay on Delivery",
        }
    }
}
