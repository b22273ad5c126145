use crate::{
    entities::{
        order::{self, OrderStatus, PaymentMethod},
        Order,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::{
        paystack::{
            to_minor_units, PaystackClient, TransactionRecord, CHARGE_SUCCESS_EVENT,
            GATEWAY_SUCCESS_STATUS,
        },
        stock::StockDeduction,
    },
};
use chrono::Utc;
use dashmap::DashMap;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, instrument, warn};

/// What the gateway told us about a transaction, normalized so the verify
/// redirect and the webhook feed the same decision logic.
#[derive(Debug, Clone)]
pub struct PaymentReport {
    pub reference: String,
    pub gateway_status: String,
    pub success: bool,
    pub amount_minor: i64,
    pub order_id: Option<i64>,
    pub customer_id: Option<i64>,
}

impl PaymentReport {
    pub fn from_verify(reference: &str, record: &TransactionRecord) -> Self {
        Self {
            reference: reference.to_string(),
            gateway_status: record.status.clone(),
            success: record.status == GATEWAY_SUCCESS_STATUS,
            amount_minor: record.amount,
            order_id: metadata_i64(&record.metadata, "order_id"),
            customer_id: metadata_i64(&record.metadata, "user_id"),
        }
    }

    pub fn from_webhook(event: &WebhookEvent) -> Option<Self> {
        let reference = event.data.reference.clone()?;
        Some(Self {
            reference,
            gateway_status: event
                .data
                .status
                .clone()
                .unwrap_or_else(|| event.event.clone()),
            success: event.event == CHARGE_SUCCESS_EVENT,
            amount_minor: event.data.amount.unwrap_or(0),
            order_id: metadata_i64(&event.data.metadata, "order_id"),
            customer_id: metadata_i64(&event.data.metadata, "user_id"),
        })
    }
}

/// Webhook envelope: `{event, data: {reference, amount, metadata, status}}`.
#[derive(Debug, Deserialize)]
pub struct WebhookEvent {
    pub event: String,
    #[serde(default)]
    pub data: WebhookData,
}

#[derive(Debug, Default, Deserialize)]
pub struct WebhookData {
    pub reference: Option<String>,
    pub amount: Option<i64>,
    pub status: Option<String>,
    #[serde(default)]
    pub metadata: Value,
}

/// Faults that move a pending order to `failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentFault {
    /// The gateway reported an unsuccessful transaction
    Declined,
    /// Paid amount differs from the order total in minor units
    AmountMismatch,
    /// Echoed metadata does not name this order and customer
    MetadataMismatch,
}

impl PaymentFault {
    pub fn message(&self) -> &'static str {
        match self {
            Self::Declined => "Payment was not successful",
            Self::AmountMismatch => "Payment amount mismatch",
            Self::MetadataMismatch => "Payment metadata mismatch",
        }
    }
}

/// Faults that reject the request without touching the order; treated as a
/// tampering signal rather than a normal payment failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntegrityFault {
    /// The order is not paid through the gateway at all
    MethodMismatch,
}

impl IntegrityFault {
    pub fn message(&self) -> &'static str {
        match self {
            Self::MethodMismatch => "Payment method mismatch",
        }
    }
}

/// Outcome of the pure reconciliation decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciliation {
    /// Transition to `completed`, record verification, deduct stock
    Complete,
    /// The same verified payment was already applied; no-op
    AlreadyCompleted,
    /// Mark the order `failed` (if still pending)
    Fail(PaymentFault),
    /// Leave the order untouched and reject the request
    Reject(IntegrityFault),
}

/// The shared decision function both reconciliation entry points apply.
///
/// Check order matters: a merely-unsuccessful transaction fails the order
/// without flagging metadata, and amount is validated before metadata so the
/// two faults stay distinguishable in logs and responses.
pub fn reconcile(order: &order::Model, report: &PaymentReport) -> Reconciliation {
    if order.payment_method != PaymentMethod::Paystack {
        return Reconciliation::Reject(IntegrityFault::MethodMismatch);
    }

    if !report.success {
        return Reconciliation::Fail(PaymentFault::Declined);
    }

    let expected_minor = to_minor_units(order.total_amount);
    if expected_minor != Some(report.amount_minor) {
        return Reconciliation::Fail(PaymentFault::AmountMismatch);
    }

    if report.order_id != Some(order.id) || report.customer_id != Some(order.customer_id) {
        return Reconciliation::Fail(PaymentFault::MetadataMismatch);
    }

    if order.status == OrderStatus::Completed {
        return Reconciliation::AlreadyCompleted;
    }

    Reconciliation::Complete
}

fn metadata_i64(metadata: &Value, key: &str) -> Option<i64> {
    match metadata.get(key)? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Result of applying a reconciliation decision.
#[derive(Debug, Clone, Copy)]
pub struct ReconcileOutcome {
    pub order_id: i64,
    pub status: OrderStatus,
    /// True when this call performed the pending→completed transition
    pub completed_now: bool,
}

/// Applies payment outcomes arriving from the verify redirect and the
/// webhook, in either order, twice, or concurrently, with exactly one
/// `completed` transition and exactly one stock deduction per order.
///
/// Two layers make that hold: a per-order async mutex serializes in-process
/// racers around the check-then-act sequence, and every status write is a
/// conditional update (`WHERE status = 'pending'`) so racers in other
/// processes degrade to the idempotent no-op.
pub struct ReconciliationService {
    db: Arc<DatabaseConnection>,
    paystack: Arc<PaystackClient>,
    stock: Arc<StockDeduction>,
    event_sender: EventSender,
    order_locks: DashMap<i64, Arc<Mutex<()>>>,
}

impl ReconciliationService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        paystack: Arc<PaystackClient>,
        stock: Arc<StockDeduction>,
        event_sender: EventSender,
    ) -> Self {
        Self {
            db,
            paystack,
            stock,
            event_sender,
            order_locks: DashMap::new(),
        }
    }

    fn order_lock(&self, order_id: i64) -> Arc<Mutex<()>> {
        self.order_locks
            .entry(order_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Verify path: the customer was redirected back from the gateway.
    /// The order lookup is scoped to the authenticated customer.
    #[instrument(skip(self))]
    pub async fn reconcile_verify(
        &self,
        customer_id: i64,
        reference: &str,
    ) -> Result<ReconcileOutcome, ServiceError> {
        let order = Order::find()
            .filter(order::Column::PaymentReference.eq(reference))
            .filter(order::Column::CustomerId.eq(customer_id))
            .one(&*self.db)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound("Order not found for this payment".to_string())
            })?;

        let record = self.paystack.verify(reference).await?;
        let report = PaymentReport::from_verify(reference, &record);

        self.apply(order.id, &report).await
    }

    /// Webhook path: gateway-initiated, authenticated solely by the body
    /// signature. Only `charge.success` events are acted on; everything else
    /// is acknowledged and dropped.
    ///
    /// Returns `Ok(None)` for events that were acknowledged without touching
    /// any order.
    #[instrument(skip(self, signature, body))]
    pub async fn reconcile_webhook(
        &self,
        signature: Option<&str>,
        body: &[u8],
    ) -> Result<Option<ReconcileOutcome>, ServiceError> {
        let signature = signature.ok_or_else(|| {
            ServiceError::IntegrityError("missing webhook signature".to_string())
        })?;

        if !self.paystack.verify_webhook_signature(body, signature) {
            warn!("Webhook signature verification failed");
            return Err(ServiceError::IntegrityError(
                "invalid webhook signature".to_string(),
            ));
        }

        let event: WebhookEvent = serde_json::from_slice(body).map_err(|_| {
            ServiceError::ValidationError("malformed webhook payload".to_string())
        })?;

        if event.event != CHARGE_SUCCESS_EVENT {
            info!("Ignoring webhook event: {}", event.event);
            return Ok(None);
        }

        let Some(report) = PaymentReport::from_webhook(&event) else {
            info!("Ignoring charge.success webhook without a reference");
            return Ok(None);
        };

        let order = Order::find()
            .filter(order::Column::PaymentReference.eq(report.reference.as_str()))
            .one(&*self.db)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!(
                    "no order with payment reference {}",
                    report.reference
                ))
            })?;

        self.apply(order.id, &report).await.map(Some)
    }

    /// Shared check-then-act sequence. Re-reads the order under the per-order
    /// lock so the decision always sees the latest persisted status.
    async fn apply(
        &self,
        order_id: i64,
        report: &PaymentReport,
    ) -> Result<ReconcileOutcome, ServiceError> {
        let lock = self.order_lock(order_id);
        let _guard = lock.lock().await;

        let order = Order::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        match reconcile(&order, report) {
            Reconciliation::Complete => {
                let result = Order::update_many()
                    .set(order::ActiveModel {
                        status: Set(OrderStatus::Completed),
                        payment_verified_at: Set(Some(Utc::now())),
                        ..Default::default()
                    })
                    .filter(order::Column::Id.eq(order_id))
                    .filter(order::Column::Status.eq(OrderStatus::Pending))
                    .exec(&*self.db)
                    .await?;

                if result.rows_affected == 1 {
                    self.stock.deduct_for_order(order_id).await?;
                    self.event_sender
                        .send_or_log(Event::OrderCompleted(order_id))
                        .await;
                    info!("Order {} completed via payment {}", order_id, report.reference);
                    return Ok(ReconcileOutcome {
                        order_id,
                        status: OrderStatus::Completed,
                        completed_now: true,
                    });
                }

                // Lost the conditional update: someone else moved the order.
                let current = Order::find_by_id(order_id)
                    .one(&*self.db)
                    .await?
                    .ok_or_else(|| {
                        ServiceError::NotFound(format!("Order {} not found", order_id))
                    })?;
                if current.status == OrderStatus::Completed {
                    self.stock.deduct_for_order(order_id).await?;
                }
                Ok(ReconcileOutcome {
                    order_id,
                    status: current.status,
                    completed_now: false,
                })
            }
            Reconciliation::AlreadyCompleted => {
                // Re-delivery of an applied payment; the one-shot flag makes
                // this deduction a no-op.
                self.stock.deduct_for_order(order_id).await?;
                Ok(ReconcileOutcome {
                    order_id,
                    status: OrderStatus::Completed,
                    completed_now: false,
                })
            }
            Reconciliation::Fail(fault) => {
                Order::update_many()
                    .set(order::ActiveModel {
                        status: Set(OrderStatus::Failed),
                        ..Default::default()
                    })
                    .filter(order::Column::Id.eq(order_id))
                    .filter(order::Column::Status.eq(OrderStatus::Pending))
                    .exec(&*self.db)
                    .await?;

                self.event_sender
                    .send_or_log(Event::PaymentFailed {
                        order_id,
                        reason: fault.message().to_string(),
                    })
                    .await;
                warn!(
                    "Payment for order {} rejected: {} (gateway status: {})",
                    order_id,
                    fault.message(),
                    report.gateway_status
                );
                Err(ServiceError::PaymentRejected(fault.message().to_string()))
            }
            Reconciliation::Reject(fault) => {
                warn!(
                    "Reconciliation request for order {} rejected: {}",
                    order_id,
                    fault.message()
                );
                Err(ServiceError::IntegrityError(fault.message().to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::order::DeliveryMethod;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    fn gateway_order(status: OrderStatus) -> order::Model {
        order::Model {
            id: 12,
            customer_id: 7,
            full_name: "Amina Bello".into(),
            phone: String::new(),
            delivery_method: DeliveryMethod::Delivery,
            payment_method: PaymentMethod::Paystack,
            delivery_address: "4 Farm Road".into(),
            total_amount: dec!(2000.00),
            status,
            payment_reference: "ref-abc".into(),
            payment_verified_at: None,
            stock_deducted: false,
            created_at: chrono::Utc::now(),
        }
    }

    fn matching_report() -> PaymentReport {
        PaymentReport {
            reference: "ref-abc".into(),
            gateway_status: "success".into(),
            success: true,
            amount_minor: 200_000,
            order_id: Some(12),
            customer_id: Some(7),
        }
    }

    #[test]
    fn successful_matching_payment_completes_pending_order() {
        let order = gateway_order(OrderStatus::Pending);
        assert_eq!(reconcile(&order, &matching_report()), Reconciliation::Complete);
    }

    #[test]
    fn repeat_delivery_is_a_noop() {
        let order = gateway_order(OrderStatus::Completed);
        assert_eq!(
            reconcile(&order, &matching_report()),
            Reconciliation::AlreadyCompleted
        );
    }

    #[test]
    fn declined_transaction_fails_without_flagging_metadata() {
        let order = gateway_order(OrderStatus::Pending);
        let report = PaymentReport {
            success: false,
            gateway_status: "failed".into(),
            // Deliberately corrupt amount and metadata: a declined
            // transaction must still surface as Declined.
            amount_minor: 1,
            order_id: None,
            customer_id: None,
            ..matching_report()
        };
        assert_eq!(
            reconcile(&order, &report),
            Reconciliation::Fail(PaymentFault::Declined)
        );
    }

    #[test]
    fn amount_mismatch_fails_the_order() {
        let order = gateway_order(OrderStatus::Pending);
        let report = PaymentReport {
            amount_minor: 199_999,
            ..matching_report()
        };
        assert_eq!(
            reconcile(&order, &report),
            Reconciliation::Fail(PaymentFault::AmountMismatch)
        );
    }

    #[test]
    fn metadata_mismatch_fails_the_order() {
        let order = gateway_order(OrderStatus::Pending);
        for (order_id, customer_id) in [(Some(13), Some(7)), (Some(12), Some(8)), (None, Some(7))] {
            let report = PaymentReport {
                order_id,
                customer_id,
                ..matching_report()
            };
            assert_eq!(
                reconcile(&order, &report),
                Reconciliation::Fail(PaymentFault::MetadataMismatch)
            );
        }
    }

    #[test]
    fn non_gateway_order_is_rejected_untouched() {
        let mut order = gateway_order(OrderStatus::AwaitingPayment);
        order.payment_method = PaymentMethod::PayOnDelivery;
        assert_eq!(
            reconcile(&order, &matching_report()),
            Reconciliation::Reject(IntegrityFault::MethodMismatch)
        );
    }

    #[test]
    fn metadata_accepts_string_encoded_ids() {
        let metadata = serde_json::json!({ "order_id": "12", "user_id": " 7 " });
        assert_eq!(metadata_i64(&metadata, "order_id"), Some(12));
        assert_eq!(metadata_i64(&metadata, "user_id"), Some(7));
    }

    #[test]
    fn metadata_rejects_non_numeric_values() {
        let metadata = serde_json::json!({ "order_id": [12], "user_id": true });
        assert_eq!(metadata_i64(&metadata, "order_id"), None);
        assert_eq!(metadata_i64(&metadata, "user_id"), None);
        assert_eq!(metadata_i64(&metadata, "missing"), None);
    }

    #[test]
    fn webhook_report_maps_charge_success() {
        let event: WebhookEvent = serde_json::from_str(
            r#"{
                "event": "charge.success",
                "data": {
                    "reference": "ref-abc",
                    "amount": 200000,
                    "status": "success",
                    "metadata": { "order_id": 12, "user_id": 7 }
                }
            }"#,
        )
        .expect("parse webhook");
        let report = PaymentReport::from_webhook(&event).expect("report");
        assert!(report.success);
        assert_eq!(report.amount_minor, 200_000);
        assert_eq!(report.order_id, Some(12));
        assert_eq!(report.customer_id, Some(7));
    }

    #[test]
    fn webhook_report_requires_a_reference() {
        let event: WebhookEvent =
            serde_json::from_str(r#"{ "event": "charge.success", "data": {} }"#)
                .expect("parse webhook");
        assert!(PaymentReport::from_webhook(&event).is_none());
    }

    proptest! {
        /// A report whose amount differs from the order total can never
        /// complete the order, whatever else it claims.
        #[test]
        fn wrong_amount_never_completes(amount in any::<i64>()) {
            let order = gateway_order(OrderStatus::Pending);
            prop_assume!(amount != 200_000);
            let report = PaymentReport { amount_minor: amount, ..matching_report() };
            prop_assert_ne!(reconcile(&order, &report), Reconciliation::Complete);
        }

        /// A report with mismatched metadata can never complete the order.
        #[test]
        fn wrong_metadata_never_completes(order_id in any::<i64>(), customer_id in any::<i64>()) {
            let order = gateway_order(OrderStatus::Pending);
            prop_assume!(order_id != 12 || customer_id != 7);
            let report = PaymentReport {
                order_id: Some(order_id),
                customer_id: Some(customer_id),
                ..matching_report()
            };
            prop_assert_ne!(reconcile(&order, &report), Reconciliation::Complete);
        }
    }
}
