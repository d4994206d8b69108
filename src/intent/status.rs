//! Payment-intent status model and transition rules.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Remote status of a payment intent. Wire values are snake_case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentStatus {
    AwaitingPaymentMethod,
    AwaitingNextAction,
    Processing,
    Succeeded,
    Cancelled,
    Failed,
}

impl IntentStatus {
    /// Terminal statuses accept no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Cancelled | Self::Failed)
    }

    /// Position along the forward progression of a payment. All terminal
    /// statuses share the final stage.
    fn stage(self) -> u8 {
        match self {
            Self::AwaitingPaymentMethod => 0,
            Self::AwaitingNextAction => 1,
            Self::Processing => 2,
            Self::Succeeded | Self::Cancelled | Self::Failed => 3,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::AwaitingPaymentMethod => "awaiting_payment_method",
            Self::AwaitingNextAction => "awaiting_next_action",
            Self::Processing => "processing",
            Self::Succeeded => "succeeded",
            Self::Cancelled => "cancelled",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for IntentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Check whether a polled status may replace the current one.
///
/// Re-observing the current status is always fine: steady polling sees the
/// same state many times, terminal states included. Otherwise only forward
/// progression is accepted. The provider may skip intermediate steps
/// (e.g. jump straight from `awaiting_payment_method` to `succeeded`), but
/// never moves backwards, and a terminal status never changes into a
/// different one.
pub fn is_valid_transition(from: IntentStatus, to: IntentStatus) -> bool {
    if from == to {
        return true;
    }
    if from.is_terminal() {
        return false;
    }
    from.stage() < to.stage()
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::IntentStatus::*;
    use super::*;

    #[test]
    fn test_terminal_classification() {
        assert!(!AwaitingPaymentMethod.is_terminal());
        assert!(!AwaitingNextAction.is_terminal());
        assert!(!Processing.is_terminal());
        assert!(Succeeded.is_terminal());
        assert!(Cancelled.is_terminal());
        assert!(Failed.is_terminal());
    }

    #[test]
    fn test_forward_transitions_allowed() {
        assert!(is_valid_transition(AwaitingPaymentMethod, AwaitingNextAction));
        assert!(is_valid_transition(AwaitingNextAction, Processing));
        assert!(is_valid_transition(Processing, Succeeded));
        assert!(is_valid_transition(Processing, Cancelled));
        assert!(is_valid_transition(Processing, Failed));
        // Providers may skip intermediate steps.
        assert!(is_valid_transition(AwaitingPaymentMethod, Succeeded));
        assert!(is_valid_transition(AwaitingPaymentMethod, Processing));
        assert!(is_valid_transition(AwaitingNextAction, Succeeded));
        // Cancellation is reachable from any non-terminal state.
        assert!(is_valid_transition(AwaitingPaymentMethod, Cancelled));
        assert!(is_valid_transition(AwaitingNextAction, Failed));
    }

    #[test]
    fn test_same_status_is_noop() {
        for status in [
            AwaitingPaymentMethod,
            AwaitingNextAction,
            Processing,
            Succeeded,
            Cancelled,
            Failed,
        ] {
            assert!(is_valid_transition(status, status));
        }
    }

    #[test]
    fn test_regressions_rejected() {
        assert!(!is_valid_transition(Processing, AwaitingNextAction));
        assert!(!is_valid_transition(Processing, AwaitingPaymentMethod));
        assert!(!is_valid_transition(AwaitingNextAction, AwaitingPaymentMethod));
    }

    #[test]
    fn test_terminal_states_absorb() {
        assert!(!is_valid_transition(Succeeded, Failed));
        assert!(!is_valid_transition(Succeeded, Cancelled));
        assert!(!is_valid_transition(Cancelled, Succeeded));
        assert!(!is_valid_transition(Failed, Succeeded));
        assert!(!is_valid_transition(Succeeded, Processing));
    }

    #[test]
    fn test_wire_values() {
        let status: IntentStatus =
            serde_json::from_str("\"awaiting_payment_method\"").expect("deserialize");
        assert_eq!(status, AwaitingPaymentMethod);
        assert_eq!(
            serde_json::to_string(&Succeeded).expect("serialize"),
            "\"succeeded\""
        );
        assert_eq!(Processing.as_str(), "processing");
    }
}
