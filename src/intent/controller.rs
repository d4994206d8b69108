//! Payment-intent flow controller.
//!
//! Owns the single active payment intent, drives it through the polling
//! scheduler, reconciles a successful payment into its order exactly once,
//! and unwinds under user cancellation or host teardown.
//!
//! Locking discipline: flow state lives behind a std `Mutex` that is never
//! held across an await. Every provider call re-acquires the lock afterwards
//! and re-checks the flow state before applying its result; that re-check is
//! what serialises a user `cancel()` against an in-flight status check, and
//! what lets `close()` discard a tick that is already in flight.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use serde::Serialize;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use crate::api::ApiClient;
use crate::config::PaymentsConfig;
use crate::error::{ApiError, PaymentFlowError};
use crate::order::{HttpOrderGateway, OrderGateway, OrderSnapshot};

use super::provider::{HttpPaymentProvider, PaymentIntent, PaymentProvider};
use super::reconciler::OrderReconciler;
use super::scheduler::{CheckFn, PollingScheduler, SessionHandle, TickFlow};
use super::status::{is_valid_transition, IntentStatus};

// ---------------------------------------------------------------------------
// Flow state
// ---------------------------------------------------------------------------

/// Lifecycle state of the payment flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowState {
    Idle,
    Creating,
    Polling,
    Reconciling,
    Done,
    Cancelling,
    Cancelled,
    Failed,
    Expired,
}

impl FlowState {
    /// States in which the flow no longer advances on its own. A settled
    /// flow can be discarded and replaced by a new `create_intent`.
    pub fn is_settled(self) -> bool {
        matches!(
            self,
            Self::Idle | Self::Done | Self::Cancelled | Self::Failed | Self::Expired
        )
    }
}

impl fmt::Display for FlowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Creating => "creating",
            Self::Polling => "polling",
            Self::Reconciling => "reconciling",
            Self::Done => "done",
            Self::Cancelling => "cancelling",
            Self::Cancelled => "cancelled",
            Self::Failed => "failed",
            Self::Expired => "expired",
        };
        f.write_str(name)
    }
}

/// Point-in-time view of the flow, published to subscribers on every change.
#[derive(Debug, Clone, Serialize)]
pub struct FlowSnapshot {
    pub state: FlowState,
    pub intent: Option<PaymentIntent>,
    /// Set when polling stopped because of an anomalous status transition.
    pub anomaly: Option<String>,
}

impl FlowSnapshot {
    fn idle() -> Self {
        Self {
            state: FlowState::Idle,
            intent: None,
            anomaly: None,
        }
    }
}

struct FlowInner {
    state: FlowState,
    flow_id: Option<Uuid>,
    intent: Option<PaymentIntent>,
    reconciled: bool,
    session: Option<SessionHandle>,
    anomaly: Option<String>,
}

impl FlowInner {
    fn idle() -> Self {
        Self {
            state: FlowState::Idle,
            flow_id: None,
            intent: None,
            reconciled: false,
            session: None,
            anomaly: None,
        }
    }

    /// Whether a tick for `intent_id` may still act on this flow.
    fn is_live_for(&self, intent_id: &str) -> bool {
        matches!(self.state, FlowState::Polling | FlowState::Reconciling)
            && self.intent.as_ref().map(|i| i.intent_id.as_str()) == Some(intent_id)
    }
}

// ---------------------------------------------------------------------------
// Controller
// ---------------------------------------------------------------------------

/// Top-level orchestrator for one QR payment flow at a time.
pub struct PaymentIntentController {
    inner: Arc<ControllerInner>,
}

struct ControllerInner {
    provider: Arc<dyn PaymentProvider>,
    reconciler: OrderReconciler,
    scheduler: PollingScheduler,
    config: PaymentsConfig,
    shutdown: CancellationToken,
    flow: Mutex<FlowInner>,
    events: watch::Sender<FlowSnapshot>,
}

impl PaymentIntentController {
    pub fn new(
        provider: Arc<dyn PaymentProvider>,
        orders: Arc<dyn OrderGateway>,
        config: PaymentsConfig,
        shutdown: CancellationToken,
    ) -> Self {
        let (events, _) = watch::channel(FlowSnapshot::idle());
        Self {
            inner: Arc::new(ControllerInner {
                provider,
                reconciler: OrderReconciler::new(orders),
                scheduler: PollingScheduler::new(),
                config,
                shutdown,
                flow: Mutex::new(FlowInner::idle()),
                events,
            }),
        }
    }

    /// Build a controller wired to the HTTP provider and order gateway.
    pub fn from_config(
        config: PaymentsConfig,
        shutdown: CancellationToken,
    ) -> Result<Self, ApiError> {
        let api = Arc::new(ApiClient::new(&config)?);
        let provider = Arc::new(HttpPaymentProvider::new(Arc::clone(&api)));
        let orders = Arc::new(HttpOrderGateway::new(api));
        Ok(Self::new(provider, orders, config, shutdown))
    }

    /// Current flow snapshot.
    pub fn snapshot(&self) -> FlowSnapshot {
        self.inner.events.borrow().clone()
    }

    /// Subscribe to flow snapshots. The receiver always holds the latest
    /// published state.
    pub fn subscribe(&self) -> watch::Receiver<FlowSnapshot> {
        self.inner.events.subscribe()
    }

    /// Create a payment intent for `order` and start polling its status.
    ///
    /// Returns the intent record (including the QR payload for display).
    /// Fails without side effects if creation is rejected; fails with
    /// `InvalidState` if another flow is still active.
    pub async fn create_intent(
        &self,
        order: OrderSnapshot,
    ) -> Result<PaymentIntent, PaymentFlowError> {
        let inner = &self.inner;
        {
            let mut flow = inner.lock_flow();
            if !flow.state.is_settled() {
                return Err(PaymentFlowError::InvalidState { state: flow.state });
            }
            // A settled flow is discarded wholesale when a new one starts.
            *flow = FlowInner::idle();
            flow.state = FlowState::Creating;
            inner.publish(&flow);
        }

        let created = match inner.provider.create_intent(&order).await {
            Ok(created) => created,
            Err(e) => {
                let mut flow = inner.lock_flow();
                if flow.state == FlowState::Creating {
                    flow.state = FlowState::Idle;
                    inner.publish(&flow);
                }
                return Err(PaymentFlowError::CreateFailed(e));
            }
        };

        let mut flow = inner.lock_flow();
        // close() may have arrived while the create call was in flight; the
        // caller walked away, so don't start polling.
        if flow.state != FlowState::Creating {
            return Err(PaymentFlowError::InvalidState { state: flow.state });
        }

        let flow_id = Uuid::new_v4();
        let intent = PaymentIntent::from_created(created, order);
        let check = ControllerInner::check_fn(inner, intent.intent_id.clone());
        let handle = inner
            .scheduler
            .start(&intent.intent_id, check, inner.config.poll_interval);

        flow.state = FlowState::Polling;
        flow.flow_id = Some(flow_id);
        flow.intent = Some(intent.clone());
        flow.session = Some(handle);
        inner.publish(&flow);

        info!(
            flow_id = %flow_id,
            intent_id = %intent.intent_id,
            order_id = %intent.order.order_id,
            amount = intent.amount,
            "payment intent created, polling started"
        );
        Ok(intent)
    }

    /// Cancel the active intent provider-side. Only allowed while polling.
    ///
    /// On provider failure the intent is still live, so the flow resumes
    /// polling and the error is surfaced.
    pub async fn cancel(&self) -> Result<(), PaymentFlowError> {
        let inner = &self.inner;
        let intent_id = {
            let mut flow = inner.lock_flow();
            if flow.state != FlowState::Polling {
                return Err(PaymentFlowError::InvalidState { state: flow.state });
            }
            let Some(intent) = flow.intent.as_ref() else {
                return Err(PaymentFlowError::NoActiveIntent);
            };
            let intent_id = intent.intent_id.clone();
            // Moving to `cancelling` before the remote call is what makes a
            // racing in-flight status check discard its result.
            flow.state = FlowState::Cancelling;
            inner.publish(&flow);
            intent_id
        };

        match inner.provider.cancel_intent(&intent_id).await {
            Ok(update) => {
                let mut flow = inner.lock_flow();
                if let Some(session) = flow.session.take() {
                    inner.scheduler.stop(&session);
                }
                if flow.state == FlowState::Cancelling {
                    if let Some(intent) = flow.intent.as_mut() {
                        intent.status = update.status;
                    }
                    flow.state = FlowState::Cancelled;
                    inner.publish(&flow);
                }
                info!(intent_id = %intent_id, "payment intent cancelled");
                Ok(())
            }
            Err(e) => {
                let mut flow = inner.lock_flow();
                // The intent is still live remotely: resume watching it.
                if flow.state == FlowState::Cancelling {
                    flow.state = FlowState::Polling;
                    inner.publish(&flow);
                }
                Err(PaymentFlowError::CancelFailed(e))
            }
        }
    }

    /// Detach from the current flow: stop polling and discard the in-memory
    /// intent. Callable from any state, idempotent.
    ///
    /// This never touches the remote intent. A payment may still succeed
    /// provider-side after `close()`; closing means "stop watching", not
    /// "undo".
    pub fn close(&self) {
        self.inner.detach();
    }
}

impl ControllerInner {
    /// A poisoned flow lock can only come from a panicked tick; the state
    /// it left behind is still the source of truth.
    fn lock_flow(&self) -> MutexGuard<'_, FlowInner> {
        self.flow.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn publish(&self, flow: &FlowInner) {
        self.events.send_replace(FlowSnapshot {
            state: flow.state,
            intent: flow.intent.clone(),
            anomaly: flow.anomaly.clone(),
        });
    }

    fn detach(&self) {
        let mut flow = self.lock_flow();
        if flow.state == FlowState::Idle && flow.intent.is_none() {
            return;
        }
        if let Some(session) = flow.session.take() {
            self.scheduler.stop(&session);
        }
        info!(flow_id = ?flow.flow_id, state = %flow.state, "payment flow closed");
        *flow = FlowInner::idle();
        self.publish(&flow);
    }

    /// Build the status-check callback for one intent. The callback holds
    /// the intent id it was created for; a replaced flow fails the
    /// liveness guard and stops its own session.
    fn check_fn(inner: &Arc<ControllerInner>, intent_id: String) -> CheckFn {
        let inner = Arc::clone(inner);
        Arc::new(move || {
            let inner = Arc::clone(&inner);
            let intent_id = intent_id.clone();
            Box::pin(async move { inner.run_status_check(&intent_id).await })
        })
    }

    async fn run_status_check(&self, intent_id: &str) -> TickFlow {
        if self.shutdown.is_cancelled() {
            info!(intent_id, "shutdown requested, detaching from payment intent");
            self.detach();
            return TickFlow::Stop;
        }

        // Pre-flight: this tick may already belong to a dead flow.
        {
            let mut flow = self.lock_flow();
            if !flow.is_live_for(intent_id) {
                return TickFlow::Stop;
            }
            if self.config.enforce_expiry {
                let expired = flow
                    .intent
                    .as_ref()
                    .and_then(|i| i.expires_at)
                    .map(|at| Utc::now() > at)
                    .unwrap_or(false);
                if expired {
                    info!(intent_id, "payment intent expired, polling stopped");
                    flow.state = FlowState::Expired;
                    flow.session = None;
                    self.publish(&flow);
                    return TickFlow::Stop;
                }
            }
        }

        let update = match self.provider.get_status(intent_id).await {
            Ok(update) => update,
            Err(e) => {
                // Transient by policy: retried on the next tick, never
                // surfaced per-tick.
                warn!(intent_id, error = %e, "status check failed, will retry");
                return TickFlow::Continue;
            }
        };

        self.apply_status(intent_id, update.status).await
    }

    /// Apply a polled status under the flow lock, then run reconciliation
    /// (the only await) re-guarded afterwards.
    async fn apply_status(&self, intent_id: &str, observed: IntentStatus) -> TickFlow {
        let (order, intent) = {
            let mut flow = self.lock_flow();
            if self.shutdown.is_cancelled() || !flow.is_live_for(intent_id) {
                // cancel()/close() won the race; discard this result.
                return TickFlow::Stop;
            }
            let Some(current) = flow.intent.as_ref().map(|i| i.status) else {
                return TickFlow::Stop;
            };

            if !is_valid_transition(current, observed) {
                let anomaly = PaymentFlowError::TransitionAnomaly {
                    from: current,
                    to: observed,
                };
                warn!(
                    intent_id,
                    from = %current,
                    to = %observed,
                    "anomalous status transition, polling stopped"
                );
                flow.state = FlowState::Failed;
                flow.anomaly = Some(anomaly.to_string());
                flow.session = None;
                self.publish(&flow);
                return TickFlow::Stop;
            }

            if let Some(intent) = flow.intent.as_mut() {
                intent.status = observed;
            }

            match observed {
                IntentStatus::Succeeded if !flow.reconciled => {
                    let Some(intent) = flow.intent.clone() else {
                        return TickFlow::Stop;
                    };
                    flow.state = FlowState::Reconciling;
                    self.publish(&flow);
                    (intent.order.clone(), intent)
                }
                IntentStatus::Succeeded => {
                    return TickFlow::Stop;
                }
                IntentStatus::Cancelled => {
                    info!(intent_id, "payment intent cancelled provider-side");
                    flow.state = FlowState::Cancelled;
                    flow.session = None;
                    self.publish(&flow);
                    return TickFlow::Stop;
                }
                IntentStatus::Failed => {
                    info!(intent_id, "payment failed provider-side");
                    flow.state = FlowState::Failed;
                    flow.session = None;
                    self.publish(&flow);
                    return TickFlow::Stop;
                }
                _ => {
                    self.publish(&flow);
                    return TickFlow::Continue;
                }
            }
        };

        // Reconciliation, possibly a retry of an earlier failed attempt.
        // Losing a successful payment to a transient gateway error is worse
        // than a duplicate attempt, which the gateway deduplicates.
        match self
            .reconciler
            .reconcile(&order, &intent, self.provider.payment_method())
            .await
        {
            Ok(_) => {
                let mut flow = self.lock_flow();
                if !flow.is_live_for(intent_id) {
                    return TickFlow::Stop;
                }
                flow.reconciled = true;
                flow.state = FlowState::Done;
                flow.session = None;
                self.publish(&flow);
                info!(intent_id, "payment reconciled, flow complete");
                TickFlow::Stop
            }
            Err(e) => {
                warn!(intent_id, error = %e, "reconciliation failed, will retry");
                TickFlow::Continue
            }
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================
