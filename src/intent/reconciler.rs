//! Order reconciliation.
//!
//! Writes a successful payment outcome back into the local order record.
//! The reconciler is stateless and safe to retry; at-most-once delivery is
//! enforced by the controller's one-shot flag, and the order gateway
//! deduplicates on the idempotency key as a second line of defence.

use std::sync::Arc;

use tracing::info;

use crate::error::ReconcileError;
use crate::order::{
    OrderGateway, OrderPaymentFields, OrderPaymentPatch, OrderPaymentStatus, OrderSnapshot,
};

use super::provider::PaymentIntent;

/// Applies a terminal payment outcome to an order.
pub struct OrderReconciler {
    orders: Arc<dyn OrderGateway>,
}

impl OrderReconciler {
    pub fn new(orders: Arc<dyn OrderGateway>) -> Self {
        Self { orders }
    }

    /// Mark the order as paid via the order gateway.
    ///
    /// The idempotency key is stable per intent, so a retried call (after a
    /// transient gateway failure) reuses the same key and the backend
    /// deduplicates.
    pub async fn reconcile(
        &self,
        order: &OrderSnapshot,
        intent: &PaymentIntent,
        method: &str,
    ) -> Result<OrderPaymentFields, ReconcileError> {
        let patch = OrderPaymentPatch {
            payment_status: OrderPaymentStatus::Paid,
            payment_method: method.to_string(),
        };
        let idempotency_key = format!("reconcile:{}", intent.intent_id);

        let updated = self
            .orders
            .update_payment(&order.order_id, &patch, &idempotency_key)
            .await
            .map_err(|source| ReconcileError {
                order_id: order.order_id.clone(),
                source,
            })?;

        info!(
            order_id = %order.order_id,
            intent_id = %intent.intent_id,
            method = method,
            "payment reconciled into order"
        );
        Ok(updated)
    }
}

// ===========================================================================
// Tests
// ===========================================================================
