//! QR payment-intent engine for The Small back-office dashboard.
//!
//! The dashboard's inventory, menu, employee, and payroll screens are thin
//! CRUD over the backend REST API and live elsewhere. This crate owns the
//! one subsystem with real concurrency hazards: creating a QR payment
//! intent for an order, polling its remote status on a fixed cadence,
//! reconciling a successful payment into the order record exactly once,
//! and unwinding cleanly when the operator cancels the payment or walks
//! away mid-flow.
//!
//! Entry point is [`PaymentIntentController`]; the payment provider and
//! order backend are reached through the [`PaymentProvider`] and
//! [`OrderGateway`] traits, with HTTP implementations over the dashboard
//! API wired up by [`PaymentIntentController::from_config`].

pub mod api;
pub mod config;
pub mod error;
pub mod intent;
pub mod order;
pub mod telemetry;

pub use config::PaymentsConfig;
pub use error::{ApiError, ConfigError, PaymentFlowError, ReconcileError};
pub use intent::controller::{FlowSnapshot, FlowState, PaymentIntentController};
pub use intent::provider::{
    CreatedIntent, HttpPaymentProvider, IntentStatusUpdate, PaymentIntent, PaymentProvider,
};
pub use intent::reconciler::OrderReconciler;
pub use intent::scheduler::{PollingScheduler, SessionHandle, TickFlow};
pub use intent::status::{is_valid_transition, IntentStatus};
pub use order::{
    HttpOrderGateway, OrderGateway, OrderPaymentFields, OrderPaymentPatch, OrderPaymentStatus,
    OrderSnapshot,
};
