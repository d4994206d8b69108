//! Payment provider trait and intent types.
//!
//! Defines the [`PaymentProvider`] trait the controller drives, the wire
//! DTOs for the dashboard's QR payment API, and the in-memory
//! [`PaymentIntent`] record the engine tracks between ticks.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Method;
use serde::{Deserialize, Serialize};

use crate::api::ApiClient;
use crate::error::ApiError;
use crate::order::OrderSnapshot;

use super::status::IntentStatus;

// ---------------------------------------------------------------------------
// Wire DTOs
// ---------------------------------------------------------------------------

/// Provider response to intent creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedIntent {
    pub intent_id: String,
    pub status: IntentStatus,
    /// Amount in minor currency units.
    pub amount: i64,
    pub currency: String,
    pub expires_at: Option<DateTime<Utc>>,
    pub qr_code_url: Option<String>,
    pub qr_code_data: Option<String>,
}

/// Provider snapshot returned by status and cancel calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntentStatusUpdate {
    pub intent_id: String,
    pub status: IntentStatus,
    pub amount: i64,
    pub currency: String,
}

// ---------------------------------------------------------------------------
// In-memory record
// ---------------------------------------------------------------------------

/// The engine's record of the active payment intent.
///
/// `order` is a read-only snapshot taken at creation time. The record is
/// mutated only by the controller, in response to polled status updates or
/// an explicit cancel.
#[derive(Debug, Clone, Serialize)]
pub struct PaymentIntent {
    pub intent_id: String,
    pub status: IntentStatus,
    /// Amount in minor currency units. Display conversion is the caller's
    /// concern.
    pub amount: i64,
    pub currency: String,
    pub expires_at: Option<DateTime<Utc>>,
    pub qr_code_url: Option<String>,
    pub qr_code_data: Option<String>,
    pub order: OrderSnapshot,
}

impl PaymentIntent {
    pub(crate) fn from_created(created: CreatedIntent, order: OrderSnapshot) -> Self {
        Self {
            intent_id: created.intent_id,
            status: created.status,
            amount: created.amount,
            currency: created.currency,
            expires_at: created.expires_at,
            qr_code_url: created.qr_code_url,
            qr_code_data: created.qr_code_data,
            order,
        }
    }
}

// ---------------------------------------------------------------------------
// Provider trait
// ---------------------------------------------------------------------------

/// Payment provider collaborator driven by the controller.
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    /// Create a QR payment intent for the given order.
    async fn create_intent(&self, order: &OrderSnapshot) -> Result<CreatedIntent, ApiError>;

    /// Fetch the current remote status of an intent.
    async fn get_status(&self, intent_id: &str) -> Result<IntentStatusUpdate, ApiError>;

    /// Cancel an intent provider-side.
    async fn cancel_intent(&self, intent_id: &str) -> Result<IntentStatusUpdate, ApiError>;

    /// Value written to the order's `payment_method` on reconciliation.
    fn payment_method(&self) -> &'static str {
        "qr"
    }
}

// ---------------------------------------------------------------------------
// HTTP implementation
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateIntentRequest<'a> {
    order_id: &'a str,
    order_number: Option<&'a str>,
    customer_name: Option<&'a str>,
    /// Amount in minor currency units.
    amount: i64,
}

/// QR payment provider over the dashboard REST API.
pub struct HttpPaymentProvider {
    api: Arc<ApiClient>,
}

impl HttpPaymentProvider {
    pub fn new(api: Arc<ApiClient>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl PaymentProvider for HttpPaymentProvider {
    async fn create_intent(&self, order: &OrderSnapshot) -> Result<CreatedIntent, ApiError> {
        let body = CreateIntentRequest {
            order_id: &order.order_id,
            order_number: order.order_number.as_deref(),
            customer_name: order.customer_name.as_deref(),
            amount: order.total_amount,
        };
        self.api
            .request(Method::POST, "/api/pos/payments/qr/intents", Some(&body), None)
            .await
    }

    async fn get_status(&self, intent_id: &str) -> Result<IntentStatusUpdate, ApiError> {
        let path = format!("/api/pos/payments/qr/intents/{intent_id}");
        self.api
            .request::<_, ()>(Method::GET, &path, None, None)
            .await
    }

    async fn cancel_intent(&self, intent_id: &str) -> Result<IntentStatusUpdate, ApiError> {
        let path = format!("/api/pos/payments/qr/intents/{intent_id}/cancel");
        self.api
            .request::<_, ()>(Method::POST, &path, None, None)
            .await
    }
}

// ===========================================================================
// Tests
// ===========================================================================
