//! Error types for the payments engine.
//!
//! Split by concern: [`ApiError`] covers transport and protocol failures
//! talking to the dashboard backend, [`PaymentFlowError`] covers the intent
//! lifecycle, [`ReconcileError`] covers writing a payment outcome back into
//! an order, and [`ConfigError`] covers configuration loading.

use thiserror::Error;

use crate::intent::controller::FlowState;
use crate::intent::status::IntentStatus;

/// Failure talking to the dashboard backend.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Network-level failure (connect, timeout, TLS), already mapped to a
    /// user-presentable message.
    #[error("{0}")]
    Network(String),

    /// Backend replied with a non-success HTTP status.
    #[error("{message} (HTTP {status})")]
    Status { status: u16, message: String },

    /// Response body was not the JSON we expected.
    #[error("invalid JSON from backend: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Failure in the payment-intent lifecycle.
///
/// Polling errors are deliberately absent: a failed status check is retried
/// on the next tick and never surfaced per-tick.
#[derive(Debug, Error)]
pub enum PaymentFlowError {
    /// The provider rejected intent creation. Fatal to that attempt; no
    /// polling is started.
    #[error("payment intent creation failed: {0}")]
    CreateFailed(#[source] ApiError),

    /// The provider rejected cancellation. The intent is still live and
    /// polling continues.
    #[error("payment cancellation failed: {0}")]
    CancelFailed(#[source] ApiError),

    /// The requested operation is not allowed in the current flow state.
    #[error("operation not allowed while payment flow is {state}")]
    InvalidState { state: FlowState },

    /// There is no intent to act on.
    #[error("no active payment intent")]
    NoActiveIntent,

    /// The provider reported a status transition that violates the
    /// transition rules. The local state is untrustworthy afterwards, so
    /// polling stops.
    #[error("anomalous status transition {from} -> {to}")]
    TransitionAnomaly {
        from: IntentStatus,
        to: IntentStatus,
    },
}

/// Failure recording a successful payment on its order.
#[derive(Debug, Error)]
#[error("failed to record payment on order {order_id}: {source}")]
pub struct ReconcileError {
    pub order_id: String,
    #[source]
    pub source: ApiError,
}

/// Failure loading engine configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    MissingVar(&'static str),

    #[error("invalid value for {var}: {value}")]
    InvalidVar { var: &'static str, value: String },
}
