//! Order collaborator surface.
//!
//! The engine writes exactly two fields back to an order: `payment_status`
//! and `payment_method`. Everything else about the order (items, totals,
//! discounts) belongs to the order-management backend and is never read or
//! written here.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Method;
use serde::{Deserialize, Serialize};

use crate::api::ApiClient;
use crate::error::ApiError;

// ---------------------------------------------------------------------------
// Order types
// ---------------------------------------------------------------------------

/// Payment status recorded on an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderPaymentStatus {
    Unpaid,
    Paid,
    Refunded,
}

/// Read-only snapshot of the order a payment intent collects for, taken at
/// intent creation. Not a live link into the order store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderSnapshot {
    pub order_id: String,
    pub order_number: Option<String>,
    pub customer_name: Option<String>,
    /// Order total in minor currency units (e.g. centavos).
    pub total_amount: i64,
}

/// The two order fields this engine is allowed to write.
#[derive(Debug, Clone, Serialize)]
pub struct OrderPaymentPatch {
    pub payment_status: OrderPaymentStatus,
    pub payment_method: String,
}

/// Updated payment fields echoed back by the backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderPaymentFields {
    pub order_id: String,
    pub payment_status: OrderPaymentStatus,
    pub payment_method: Option<String>,
}

// ---------------------------------------------------------------------------
// Gateway trait
// ---------------------------------------------------------------------------

/// Order-update collaborator consumed by the reconciler.
///
/// Implementations must be idempotent per `idempotency_key`: applying the
/// same key twice leaves the order in the same state as applying it once.
#[async_trait]
pub trait OrderGateway: Send + Sync {
    async fn update_payment(
        &self,
        order_id: &str,
        patch: &OrderPaymentPatch,
        idempotency_key: &str,
    ) -> Result<OrderPaymentFields, ApiError>;
}

// ---------------------------------------------------------------------------
// HTTP implementation
// ---------------------------------------------------------------------------

/// Order gateway over the dashboard REST API.
pub struct HttpOrderGateway {
    api: Arc<ApiClient>,
}

impl HttpOrderGateway {
    pub fn new(api: Arc<ApiClient>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl OrderGateway for HttpOrderGateway {
    async fn update_payment(
        &self,
        order_id: &str,
        patch: &OrderPaymentPatch,
        idempotency_key: &str,
    ) -> Result<OrderPaymentFields, ApiError> {
        let path = format!("/api/pos/orders/{order_id}/payment");
        self.api
            .request(Method::PATCH, &path, Some(patch), Some(idempotency_key))
            .await
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payment_patch_wire_format() {
        let patch = OrderPaymentPatch {
            payment_status: OrderPaymentStatus::Paid,
            payment_method: "qr".to_string(),
        };
        let json = serde_json::to_value(&patch).expect("serialize patch");
        assert_eq!(
            json,
            serde_json::json!({
                "payment_status": "paid",
                "payment_method": "qr",
            })
        );
    }

    #[test]
    fn test_payment_fields_accepts_wire_values() {
        let fields: OrderPaymentFields = serde_json::from_value(serde_json::json!({
            "order_id": "ord-1",
            "payment_status": "unpaid",
            "payment_method": null,
        }))
        .expect("deserialize fields");
        assert_eq!(fields.payment_status, OrderPaymentStatus::Unpaid);
        assert!(fields.payment_method.is_none());
    }
}
